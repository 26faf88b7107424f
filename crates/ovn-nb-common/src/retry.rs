//! Bounded poll-and-retry for rows that another process is still creating.
//!
//! A port can be created on one API worker before the network created by a
//! sibling worker has reached this worker's northbound replica. Instead of
//! locking, the caller polls for the row a bounded number of times.

use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{NbError, NbResult};

/// How long to wait for a row to show up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Number of probes, including the first one.
    pub max_attempts: u32,
    /// Pause between probes in milliseconds.
    pub interval_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            interval_ms: 200,
        }
    }
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, interval_ms: u64) -> Self {
        Self {
            max_attempts,
            interval_ms,
        }
    }

    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Probes until `probe` reports the row present.
    ///
    /// Returns the number of probes made. Errors from `probe` abort the wait.
    pub async fn wait_for<F>(&self, table: &'static str, key: &str, mut probe: F) -> NbResult<u32>
    where
        F: FnMut() -> NbResult<bool>,
    {
        let attempts = self.max_attempts.max(1);
        for attempt in 1..=attempts {
            if probe()? {
                return Ok(attempt);
            }
            if attempt < attempts {
                debug!(
                    "{} row {} not present yet (attempt {}/{})",
                    table, key, attempt, attempts
                );
                tokio::time::sleep(self.interval()).await;
            }
        }
        Err(NbError::RetryExhausted {
            table,
            key: key.to_string(),
            attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_present_on_first_probe() {
        let policy = RetryPolicy::new(3, 1);
        let attempts = policy
            .wait_for("Logical_Switch", "neutron-n1", || Ok(true))
            .await
            .unwrap();
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn test_present_after_retries() {
        let policy = RetryPolicy::new(5, 1);
        let mut calls = 0;
        let attempts = policy
            .wait_for("Logical_Switch", "neutron-n1", || {
                calls += 1;
                Ok(calls >= 3)
            })
            .await
            .unwrap();
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_exhausted() {
        let policy = RetryPolicy::new(2, 1);
        let err = policy
            .wait_for("Logical_Switch", "neutron-n1", || Ok(false))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            NbError::RetryExhausted {
                table: "Logical_Switch",
                key: "neutron-n1".to_string(),
                attempts: 2,
            }
        );
    }

    #[tokio::test]
    async fn test_probe_error_aborts() {
        let policy = RetryPolicy::new(5, 1);
        let err = policy
            .wait_for("Logical_Switch", "neutron-n1", || Err(NbError::backend("down")))
            .await
            .unwrap_err();
        assert_eq!(err, NbError::backend("down"));
    }

    #[test]
    fn test_defaults() {
        let policy: RetryPolicy = serde_json::from_str("{\"interval_ms\": 50}").unwrap();
        assert_eq!(policy, RetryPolicy::new(10, 50));
    }
}
