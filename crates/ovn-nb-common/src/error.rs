//! Northbound database error types.

use thiserror::Error;

/// Result alias for northbound operations.
pub type NbResult<T> = Result<T, NbError>;

/// Error returned by a northbound read, commit or wait.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NbError {
    /// A command referenced a row that does not exist and did not tolerate
    /// its absence.
    #[error("{table} row not found: {key}")]
    RowNotFound { table: &'static str, key: String },

    /// An insert collided with an existing row.
    #[error("{table} row already exists: {key}")]
    RowExists { table: &'static str, key: String },

    /// A command handle was used that does not point at an earlier
    /// DHCP_Options insert in the same transaction.
    #[error("command handle {0} does not refer to a pending DHCP_Options insert")]
    UnresolvedHandle(usize),

    /// A bounded wait for a row gave up.
    #[error("{table} row {key} did not appear after {attempts} attempts")]
    RetryExhausted {
        table: &'static str,
        key: String,
        attempts: u32,
    },

    /// The backend itself failed (connection loss, lock poisoning).
    #[error("northbound backend error: {message}")]
    Backend { message: String },
}

impl NbError {
    /// Creates a row-not-found error.
    pub fn row_not_found(table: &'static str, key: impl Into<String>) -> Self {
        NbError::RowNotFound {
            table,
            key: key.into(),
        }
    }

    /// Creates a row-exists error.
    pub fn row_exists(table: &'static str, key: impl Into<String>) -> Self {
        NbError::RowExists {
            table,
            key: key.into(),
        }
    }

    /// Creates a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        NbError::Backend {
            message: message.into(),
        }
    }

    /// Returns true for errors that mean "the row is not there".
    ///
    /// Port status handling treats these as benign races with deletion.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            NbError::RowNotFound { .. } | NbError::RetryExhausted { .. }
        )
    }
}
