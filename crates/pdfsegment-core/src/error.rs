use thiserror::Error;

#[derive(Error, Debug)]
pub enum SegmentError {
    #[error("Invalid PDF file: {0}")]
    InvalidDocument(String),

    #[error("Number of cuts must be greater than zero (got {0})")]
    InvalidCutCount(i64),

    #[error("PDF operation failed: {0}")]
    OperationError(String),

    #[error("Archive error: {0}")]
    ArchiveError(String),

    #[error("Segmentation cancelled")]
    Cancelled,
}

impl SegmentError {
    /// True for errors caused by the caller's input rather than a collaborator failure
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            SegmentError::InvalidDocument(_) | SegmentError::InvalidCutCount(_)
        )
    }
}
