//! Bounded store calls and optimistic version helpers.

use std::future::Future;
use std::time::Duration;

use crate::core::StoreError;

/// Limits applied to every store interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreBounds {
    /// Upper bound for a single store call.
    pub timeout: Duration,
    /// Attempts for one compare-and-swap loop before giving up.
    pub max_cas_retries: u32,
}

impl Default for StoreBounds {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            max_cas_retries: 16,
        }
    }
}

impl StoreBounds {
    /// Run a store future under the configured timeout.
    ///
    /// # Errors
    ///
    /// Propagates the store's own error, or [`StoreError::Timeout`] when the
    /// bound elapses first.
    pub async fn call<T, F>(&self, op: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .unwrap_or(Err(StoreError::Timeout {
                op,
                after: self.timeout,
            }))
    }

    /// Error returned when a CAS loop exhausts its retries.
    #[must_use]
    pub fn conflict(&self, what: impl std::fmt::Display) -> StoreError {
        StoreError::Conflict(format!(
            "{what}: gave up after {} concurrent updates",
            self.max_cas_retries
        ))
    }
}

/// Version a record holds after a successful conditional write.
#[must_use]
pub const fn next_version(expected: Option<u64>) -> u64 {
    match expected {
        Some(v) => v + 1,
        None => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_version() {
        assert_eq!(next_version(None), 1);
        assert_eq!(next_version(Some(7)), 8);
    }

    #[tokio::test]
    async fn test_call_times_out() {
        let bounds = StoreBounds {
            timeout: Duration::from_millis(20),
            max_cas_retries: 1,
        };
        let result: Result<(), StoreError> = bounds
            .call("slow", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(StoreError::Timeout { op: "slow", .. })));
    }

    #[tokio::test]
    async fn test_call_passes_through() {
        let bounds = StoreBounds::default();
        let value = bounds.call("fast", async { Ok(5) }).await.unwrap();
        assert_eq!(value, 5);
    }
}
