//! PDF segmentation by vertical whitespace
//!
//! This crate splits a PDF into sub-documents at the largest vertical gaps
//! between lines of text, using lopdf as the document model.
//!
//! Pipeline:
//! - [`layout::extract_layout`]: per-page glyph Y-coordinates
//! - [`cuts::select_cuts`]: boundaries after the N largest gaps
//! - [`partition::partition`] / [`partition::partition_spatial`]: sub-documents
//! - [`archive::package_zip`]: optional ZIP packaging for delivery

pub mod archive;
pub mod cuts;
pub mod error;
pub mod layout;
pub mod partition;
pub mod result;
pub mod segment;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use archive::{package_zip, segment_file_name, ARCHIVE_FILE_NAME};
pub use cuts::{gap_list, select_cuts, CutCount, Gap};
pub use error::SegmentError;
pub use layout::{extract_layout, DocumentLayout, PageLayout};
pub use partition::{extract_pages, partition, partition_spatial, PartitionMode, SubDocument};
pub use result::{SegmentMetrics, SegmentationResult};
pub use segment::{
    load_document, segment_document, segment_document_cancellable, segment_document_checked,
};
