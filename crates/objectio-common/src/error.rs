//! Error types shared by the placement engine and the TS cache.

use thiserror::Error;

/// Common result type for ObjectIO operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds produced by placement and TS-cache operations.
///
/// The four non-internal variants map directly onto the error taxonomy
/// both components are specified against: a caller-supplied argument is
/// malformed, a referenced entity does not exist, an allocation could
/// not be satisfied, or an operation is recognized but deliberately
/// unimplemented.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("out of memory: {0}")]
    OutOfMemory(String),

    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    #[must_use]
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    #[must_use]
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    #[must_use]
    pub fn out_of_memory(msg: impl Into<String>) -> Self {
        Self::OutOfMemory(msg.into())
    }

    #[must_use]
    pub fn not_supported(msg: impl Into<String>) -> Self {
        Self::NotSupported(msg.into())
    }

    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// True for errors that indicate a transient resource shortage
    /// rather than a malformed request, so callers know which ones are
    /// worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::OutOfMemory(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_only_for_resource_errors() {
        assert!(Error::out_of_memory("ts table").is_retryable());
        assert!(!Error::invalid_argument("bad group size").is_retryable());
        assert!(!Error::not_found("target 7").is_retryable());
        assert!(!Error::not_supported("reintegration").is_retryable());
    }

    #[test]
    fn display_includes_message() {
        let err = Error::invalid_argument("group_size must be > 0");
        assert_eq!(err.to_string(), "invalid argument: group_size must be > 0");
    }
}
