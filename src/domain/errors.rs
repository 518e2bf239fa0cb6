//! Error taxonomy for the polling cycle
//!
//! Every component degrades to a `bool`/`Result` plus a log line; only the
//! cycle wrapper, the outer supervisor and the shutdown path act on these errors
//! system-wide.

use std::time::Duration;
use thiserror::Error;

/// Failures raised by a page driver implementation
#[derive(Error, Debug, Clone)]
pub enum DriverError {
    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("Element '{selector}' not found: {message}")]
    ElementMissing { selector: String, message: String },

    #[error("Browser launch failed: {0}")]
    Launch(String),

    #[error("Browser page is closed")]
    PageClosed,

    #[error("Credential artifact error: {0}")]
    Credentials(String),

    #[error("Browser call failed: {0}")]
    Protocol(String),
}

/// Errors that abort a polling cycle
#[derive(Error, Debug, Clone)]
pub enum CycleError {
    /// Navigation or I/O failure, retried by normal scheduling
    #[error("Transient I/O failure: {0}")]
    TransientIo(String),

    #[error("Operation '{operation}' timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    #[error("Session invalid: {0}")]
    SessionInvalid(String),

    #[error("Login failed: {0}")]
    LoginFailed(String),

    #[error("Circuit breaker is OPEN")]
    CircuitOpen,

    #[error("Browser fault: {0}")]
    BrowserFault(String),

    #[error("Shutdown in progress")]
    ShuttingDown,

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("Persistence failure: {0}")]
    Persistence(String),
}

impl CycleError {
    /// Create a timeout error for a named operation
    pub fn timeout(operation: &str, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.to_string(),
            after,
        }
    }

    /// Whether the error should escalate into a browser restart on its own
    pub fn is_browser_fault(&self) -> bool {
        matches!(self, Self::BrowserFault(_) | Self::Driver(DriverError::PageClosed))
    }
}

/// Configuration problems, fatal at startup only
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("Failed to read environment: {0}")]
    Source(#[from] config::ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_errors_convert_into_cycle_errors() {
        let err: CycleError = DriverError::PageClosed.into();
        assert!(err.is_browser_fault());
        assert_eq!(err.to_string(), "Browser page is closed");
    }

    #[test]
    fn timeout_message_names_operation() {
        let err = CycleError::timeout("login", Duration::from_secs(60));
        assert_eq!(err.to_string(), "Operation 'login' timed out after 60s");
        assert!(!err.is_browser_fault());
    }
}
