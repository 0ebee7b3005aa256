//! Error types for engine and store operations.

use std::time::Duration;

use thiserror::Error;

/// Failures raised by pool, lease, and account stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A store call did not complete within its bound.
    #[error("store operation `{op}` timed out after {after:?}")]
    Timeout {
        /// Operation name.
        op: &'static str,
        /// Configured bound that elapsed.
        after: Duration,
    },
    /// Optimistic write kept losing to concurrent writers.
    #[error("write conflict: {0}")]
    Conflict(String),
    /// Backend-specific failure with context.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Errors produced by the allocation, release, and reclamation engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed input, rejected before any store mutation.
    #[error("validation error: {0}")]
    Validation(String),
    /// No pool tracks the requested resource.
    #[error("unknown resource: {0}")]
    UnknownResource(String),
    /// Every candidate pool lacks headroom for the request.
    #[error("resource exhausted: no pool of `{resource}` has {requested_tb} TB free")]
    ResourceExhausted {
        /// Resource name.
        resource: String,
        /// Requested amount in TB.
        requested_tb: f64,
    },
    /// Unrecognized size unit.
    #[error("unit conversion error: {0}")]
    UnitConversion(String),
    /// The backing pool does not hold enough allocated capacity to release.
    #[error("release error: {0}")]
    Release(String),
    /// Lease or pool absent.
    #[error("not found: {0}")]
    NotFound(String),
    /// Lease exists but its status forbids the operation.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Persistence failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::ResourceExhausted {
            resource: "disk".into(),
            requested_tb: 1.5,
        };
        assert_eq!(
            err.to_string(),
            "resource exhausted: no pool of `disk` has 1.5 TB free"
        );

        let err = EngineError::from(StoreError::Timeout {
            op: "pool.get",
            after: Duration::from_millis(250),
        });
        assert_eq!(
            err.to_string(),
            "store operation `pool.get` timed out after 250ms"
        );
        assert!(matches!(err, EngineError::Store(StoreError::Timeout { .. })));
    }

    #[test]
    fn test_validation_error_display() {
        let err = EngineError::Validation("magnitude must be positive".into());
        assert_eq!(err.to_string(), "validation error: magnitude must be positive");
    }
}
