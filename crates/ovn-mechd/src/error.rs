//! Driver error type.

use ovn_nb_common::{NbError, PluginError};
use thiserror::Error;

/// Result alias for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// Errors raised by driver hooks.
///
/// Precommit hooks only ever return [`DriverError::InvalidInput`] (or a
/// plugin lookup failure during profile validation); postcommit hooks
/// propagate northbound failures unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    /// Rejected during validation. Nothing was written.
    #[error("Invalid input for {field}: {message}")]
    InvalidInput { field: String, message: String },

    #[error(transparent)]
    Nb(#[from] NbError),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    /// No chassis is registered for the host.
    #[error("Chassis for host {host} not found")]
    ChassisNotFound { host: String },

    #[error("Invalid configuration for {field}: {message}")]
    Config { field: String, message: String },
}

impl DriverError {
    pub fn invalid_input(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            message: message.into(),
        }
    }

    /// True when the error came from validation and the framework should
    /// roll back without touching the northbound database.
    pub fn is_validation(&self) -> bool {
        matches!(self, DriverError::InvalidInput { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_invalid_input_display() {
        let err = DriverError::invalid_input("binding:profile", "Invalid binding:profile. too many parameters");
        assert_eq!(
            err.to_string(),
            "Invalid input for binding:profile: Invalid binding:profile. too many parameters"
        );
        assert!(err.is_validation());
    }

    #[test]
    fn test_from_nb_error_is_transparent() {
        let err: DriverError = NbError::row_not_found("Logical_Switch", "neutron-n1").into();
        assert_eq!(err.to_string(), "Logical_Switch row not found: neutron-n1");
        assert!(!err.is_validation());
    }
}
