use thiserror::Error;

use crate::notify::Notification;

/// Errors that can occur when talking to the thermostat controller
#[derive(Error, Debug)]
pub enum ThermostatError {
    /// The request did not complete before its deadline
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout {
        /// Timeout duration in milliseconds
        timeout_ms: u64,
    },

    /// The controller rejected the request even after a session renewal
    #[error("Unauthorized - session renewal did not grant access")]
    Unauthorized,

    /// The controller answered with a non-success status
    #[error("Server error: status code {status}")]
    ServerError {
        /// HTTP status code returned by the controller
        status: u16,
    },

    /// The controller could not be reached at all
    #[error("Network unreachable: {0}")]
    NetworkUnreachable(String),

    /// The response body was not the expected JSON
    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The login exchange was refused
    #[error("Authentication failed: status code {status}")]
    AuthenticationFailed {
        /// HTTP status code returned by the login endpoint
        status: u16,
    },

    /// The controller answered in a shape this client does not understand
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Client settings are unusable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid command parameters
    #[error("Invalid command parameters: {0}")]
    InvalidParameters(String),
}

/// Result type for thermostat operations
pub type Result<T> = std::result::Result<T, ThermostatError>;

impl From<reqwest::Error> for ThermostatError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_builder() {
            Self::InvalidConfig(error.to_string())
        } else {
            Self::NetworkUnreachable(error.to_string())
        }
    }
}

impl ThermostatError {
    /// Check if this error indicates the controller could not be reached
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(self, Self::NetworkUnreachable(_) | Self::Timeout { .. })
    }

    /// Check if retrying later (without user action) may succeed
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::NetworkUnreachable(_) | Self::ServerError { .. }
        )
    }

    /// HTTP-style status code describing this error, when there is one
    ///
    /// Timeouts map to 408 and rejected sessions to 401.
    #[must_use]
    pub const fn status_code(&self) -> Option<u16> {
        match self {
            Self::Timeout { .. } => Some(408),
            Self::Unauthorized => Some(401),
            Self::ServerError { status } | Self::AuthenticationFailed { status } => Some(*status),
            _ => None,
        }
    }

    /// User-facing classification reported to notification subscribers
    ///
    /// Decode and protocol failures are reported like a server error.
    #[must_use]
    pub const fn notification(&self) -> Notification {
        match self {
            Self::Timeout { .. } => Notification::Timeout,
            Self::Unauthorized | Self::AuthenticationFailed { .. } => Notification::Unauthorized,
            Self::ServerError { status: 404 } => Notification::NotFound,
            Self::ServerError { status } => Notification::ServerError { status: *status },
            Self::NetworkUnreachable(_) | Self::InvalidConfig(_) => {
                Notification::NetworkUnreachable
            }
            Self::Decode(_) | Self::Protocol(_) | Self::InvalidParameters(_) => {
                Notification::ServerError { status: 500 }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let network_error = ThermostatError::NetworkUnreachable("refused".to_string());
        assert!(network_error.is_connection_error());
        assert!(network_error.is_recoverable());
        assert_eq!(network_error.status_code(), None);

        let timeout_error = ThermostatError::Timeout { timeout_ms: 1000 };
        assert!(timeout_error.is_connection_error());
        assert_eq!(timeout_error.status_code(), Some(408));

        let auth_error = ThermostatError::Unauthorized;
        assert!(!auth_error.is_connection_error());
        assert!(!auth_error.is_recoverable());
        assert_eq!(auth_error.status_code(), Some(401));
    }

    #[test]
    fn test_notification_mapping() {
        assert_eq!(
            ThermostatError::ServerError { status: 404 }.notification(),
            Notification::NotFound
        );
        assert_eq!(
            ThermostatError::ServerError { status: 503 }.notification(),
            Notification::ServerError { status: 503 }
        );
        assert_eq!(
            ThermostatError::Timeout { timeout_ms: 5 }.notification(),
            Notification::Timeout
        );
        assert_eq!(
            ThermostatError::NetworkUnreachable(String::new()).notification(),
            Notification::NetworkUnreachable
        );

        let decode = serde_json::from_str::<u32>("not json").unwrap_err();
        assert_eq!(
            ThermostatError::from(decode).notification(),
            Notification::ServerError { status: 500 }
        );
    }

    #[test]
    fn test_error_display() {
        let error = ThermostatError::InvalidParameters("min above max".to_string());
        let error_string = format!("{error}");
        assert!(error_string.contains("Invalid command parameters"));
        assert!(error_string.contains("min above max"));
    }
}
