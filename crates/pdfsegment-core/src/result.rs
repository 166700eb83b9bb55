use crate::partition::{PartitionMode, SubDocument};
use serde::Serialize;

/// Output of one segmentation call
#[derive(Debug, Clone)]
pub struct SegmentationResult {
    pub segments: Vec<SubDocument>,
    /// Sorted cut boundaries that produced `segments`
    pub cuts: Vec<f64>,
    pub mode: PartitionMode,
    pub metrics: SegmentMetrics,
}

impl SegmentationResult {
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SegmentMetrics {
    pub input_size_bytes: usize,
    pub output_size_bytes: usize,
    pub page_count: u32,
    /// Cuts asked for by the caller
    pub requested_cuts: usize,
    pub processing_time_ms: u64,
}
