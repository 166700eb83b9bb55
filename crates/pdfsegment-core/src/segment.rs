//! End-to-end segmentation
//!
//! Document bytes -> layout -> cut boundaries -> sub-documents.

use crate::cuts::{select_cuts, CutCount};
use crate::error::SegmentError;
use crate::layout::extract_layout;
use crate::partition::{partition_cancellable, partition_spatial_cancellable, PartitionMode};
use crate::result::{SegmentMetrics, SegmentationResult};
use lopdf::Document;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Validate a raw cut count, then segment
///
/// The cut count is checked before the document is even parsed.
pub fn segment_document_checked(
    bytes: &[u8],
    cuts: i64,
    mode: PartitionMode,
) -> Result<SegmentationResult, SegmentError> {
    let cuts = CutCount::new(cuts)?;
    segment_document(bytes, cuts, mode)
}

/// Split a PDF at its largest vertical whitespace gaps
pub fn segment_document(
    bytes: &[u8],
    cuts: CutCount,
    mode: PartitionMode,
) -> Result<SegmentationResult, SegmentError> {
    segment_document_cancellable(bytes, cuts, mode, &AtomicBool::new(false))
}

/// [`segment_document`] that gives up with [`SegmentError::Cancelled`] once
/// `cancel` is set
///
/// The flag is checked between pipeline stages and between sub-documents.
pub fn segment_document_cancellable(
    bytes: &[u8],
    cuts: CutCount,
    mode: PartitionMode,
    cancel: &AtomicBool,
) -> Result<SegmentationResult, SegmentError> {
    let start = Instant::now();

    let doc = load_document(bytes)?;
    let layout = extract_layout(&doc)?;
    if cancel.load(Ordering::Relaxed) {
        return Err(SegmentError::Cancelled);
    }
    let page_count = layout.page_count() as u32;

    let coordinates = match mode {
        PartitionMode::Positional => layout.flattened(),
        PartitionMode::Spatial => layout.stacked(),
    };
    debug!(
        "Extracted {} glyph positions from {} pages",
        coordinates.len(),
        page_count
    );

    let boundaries = select_cuts(&coordinates, cuts);
    if boundaries.len() < cuts.get() {
        warn!(
            "Requested {} cuts but only {} gaps are available",
            cuts.get(),
            boundaries.len()
        );
    }

    let segments = match mode {
        PartitionMode::Positional => partition_cancellable(&doc, &boundaries, cancel)?,
        PartitionMode::Spatial => {
            partition_spatial_cancellable(&doc, &layout, &boundaries, cancel)?
        }
    };

    let metrics = SegmentMetrics {
        input_size_bytes: bytes.len(),
        output_size_bytes: segments.iter().map(|s| s.bytes.len()).sum(),
        page_count,
        requested_cuts: cuts.get(),
        processing_time_ms: start.elapsed().as_millis() as u64,
    };

    info!(
        "Segmented {} pages into {} parts ({:?}, {} cuts) in {}ms",
        page_count,
        segments.len(),
        mode,
        boundaries.len(),
        metrics.processing_time_ms
    );

    Ok(SegmentationResult {
        segments,
        cuts: boundaries,
        mode,
        metrics,
    })
}

/// Parse PDF bytes, rejecting unreadable or empty documents
pub fn load_document(bytes: &[u8]) -> Result<Document, SegmentError> {
    if bytes.is_empty() {
        return Err(SegmentError::InvalidDocument("empty input".into()));
    }

    let doc =
        Document::load_mem(bytes).map_err(|e| SegmentError::InvalidDocument(e.to_string()))?;

    if doc.get_pages().is_empty() {
        return Err(SegmentError::InvalidDocument("document has no pages".into()));
    }

    Ok(doc)
}
