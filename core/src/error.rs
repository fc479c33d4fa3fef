use crate::index::{DocId, PageNumber};
use std::time::Duration;
use thiserror::Error;

/// Failures of the backing index store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Transient: the store could not be reached or an I/O call failed.
    #[error("index store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt index record: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<sled::Error> for StoreError {
    fn from(e: sled::Error) -> Self {
        match e {
            sled::Error::Io(io) => StoreError::Unavailable(io.to_string()),
            other => StoreError::Corrupt(other.to_string()),
        }
    }
}

impl From<bincode::Error> for StoreError {
    fn from(e: bincode::Error) -> Self {
        StoreError::Corrupt(e.to_string())
    }
}

/// Raised by a page source when document text cannot be produced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("cannot read document source '{storage_ref}': {reason}")]
    Source { storage_ref: String, reason: String },

    #[error("page {page} could not be extracted: {reason}")]
    Page { page: PageNumber, reason: String },
}

#[derive(Error, Debug)]
pub enum FolioError {
    /// Rejected before the store is touched.
    #[error("invalid request: {0}")]
    Validation(String),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("search timed out after {0:?}")]
    Timeout(Duration),

    #[error("document {0} not found")]
    NotFound(DocId),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, FolioError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_error_names_the_page() {
        let err = FolioError::from(ExtractionError::Page { page: 7, reason: "garbled stream".into() });
        assert!(err.to_string().contains("page 7"));
        assert!(matches!(err, FolioError::Extraction(_)));
    }

    #[test]
    fn only_unavailable_is_retryable() {
        assert!(StoreError::Unavailable("down".into()).is_retryable());
        assert!(!StoreError::Corrupt("bad bytes".into()).is_retryable());
    }

    #[test]
    fn sled_io_maps_to_unavailable() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        let err: StoreError = sled::Error::Io(io).into();
        assert!(err.is_retryable());
    }
}
