//! ZIP packaging of sub-documents for download

use crate::error::SegmentError;
use crate::partition::SubDocument;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Download name of the packaged archive
pub const ARCHIVE_FILE_NAME: &str = "segmented_pdfs.zip";

/// Entry name for the 0-indexed segment of `original_name`
///
/// `report.pdf` -> `report_segment_1.pdf`
pub fn segment_file_name(original_name: &str, index: usize) -> String {
    let stem = original_name
        .strip_suffix(".pdf")
        .or_else(|| original_name.strip_suffix(".PDF"))
        .unwrap_or(original_name);
    let stem = if stem.is_empty() { "document" } else { stem };
    format!("{}_segment_{}.pdf", stem, index + 1)
}

/// Package every segment into one ZIP archive
pub fn package_zip(original_name: &str, segments: &[SubDocument]) -> Result<Vec<u8>, SegmentError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for segment in segments {
        let name = segment_file_name(original_name, segment.index);
        zip.start_file(name.as_str(), options)
            .map_err(|e| SegmentError::ArchiveError(format!("{}: {}", name, e)))?;
        zip.write_all(&segment.bytes)
            .map_err(|e| SegmentError::ArchiveError(format!("{}: {}", name, e)))?;
    }

    let cursor = zip
        .finish()
        .map_err(|e| SegmentError::ArchiveError(e.to_string()))?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Read;
    use zip::ZipArchive;

    fn segment(index: usize, bytes: &[u8]) -> SubDocument {
        SubDocument {
            index,
            pages: vec![index as u32 + 1],
            bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn test_segment_file_names() {
        assert_eq!(segment_file_name("report.pdf", 0), "report_segment_1.pdf");
        assert_eq!(segment_file_name("SCAN.PDF", 2), "SCAN_segment_3.pdf");
        assert_eq!(segment_file_name("notes", 1), "notes_segment_2.pdf");
        assert_eq!(segment_file_name(".pdf", 0), "document_segment_1.pdf");
    }

    #[test]
    fn test_archive_holds_one_entry_per_segment() {
        let segments = vec![segment(0, b"first"), segment(1, b"second")];
        let bytes = package_zip("report.pdf", &segments).unwrap();

        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 2);

        let mut content = String::new();
        archive
            .by_name("report_segment_2.pdf")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "second");
    }

    #[test]
    fn test_empty_archive_is_valid() {
        let bytes = package_zip("report.pdf", &[]).unwrap();
        let archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 0);
    }
}
