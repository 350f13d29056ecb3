//! Error types for cache coordination
//!
//! This module defines custom error types for the memobatch library,
//! covering backend failures, batch scope misuse, and value encoding.

use thiserror::Error;

/// Main error type for cache operations
#[derive(Error, Debug)]
pub enum CacheError {
    /// A context-scoped operation was called with no batch context active
    #[error("No batch context is active")]
    OutOfContext,

    /// A hook was registered or triggered with an unrecognized event name
    #[error("Invalid hook event: {0}")]
    InvalidHookEvent(String),

    /// A batch scope was exited out of LIFO order
    #[error("Unbalanced batch scope: {0}")]
    UnbalancedScope(String),

    /// A batch context created by a different coordinator was entered
    #[error("Batch context belongs to a different cacher")]
    ForeignContext,

    /// Backend storage error - the external store failed or was unreachable
    #[error("Backend error: {0}")]
    Backend(String),

    /// Serialization/Deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error raised by a wrapped source function
    #[error(transparent)]
    Source(#[from] anyhow::Error),
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

impl From<String> for CacheError {
    fn from(s: String) -> Self {
        CacheError::Backend(s)
    }
}

impl From<&str> for CacheError {
    fn from(s: &str) -> Self {
        CacheError::Backend(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = CacheError::Backend("connection refused".to_string());
        assert_eq!(error.to_string(), "Backend error: connection refused");

        let hook_error = CacheError::InvalidHookEvent("calll".to_string());
        assert_eq!(hook_error.to_string(), "Invalid hook event: calll");

        let scope_error = CacheError::UnbalancedScope("expected top of stack".to_string());
        assert!(scope_error.to_string().contains("Unbalanced batch scope"));

        assert_eq!(
            CacheError::OutOfContext.to_string(),
            "No batch context is active"
        );
    }

    #[test]
    fn test_error_conversion() {
        let error: CacheError = "store unreachable".into();
        assert!(matches!(error, CacheError::Backend(_)));

        let error: CacheError = "store unreachable".to_string().into();
        assert!(matches!(error, CacheError::Backend(_)));
    }

    #[test]
    fn test_source_error_is_transparent() {
        let source = anyhow::anyhow!("row fetch failed");
        let error = CacheError::from(source);
        assert_eq!(error.to_string(), "row fetch failed");
    }
}
