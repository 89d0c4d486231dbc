use std::fmt;
use thiserror::Error;
use tokio::time::Duration;

/// Main error type for the shunt proxy
#[derive(Error, Debug, Clone)]
pub enum ShuntError {
    /// Configuration related errors (no servers for a tenant, bad TOML, ...)
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Network related errors (connect refused, reset, DNS)
    #[error("Network error: {message}")]
    Network { message: String },

    /// Backend answered with a 5xx; the response is discarded
    #[error("Upstream error from {server}: status {status}")]
    Upstream { server: String, status: u16 },

    /// Outbound attempt exceeded its deadline
    #[error("Operation timed out after {duration:?}: {operation}")]
    Timeout {
        duration: Duration,
        operation: String,
    },

    /// Every candidate in the server set failed
    #[error("All candidates exhausted: {message}")]
    Exhausted { message: String },

    /// IO related errors
    #[error("IO error: {message}")]
    Io { message: String },

    /// Internal invariant violations
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ShuntError {
    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create an upstream error
    pub fn upstream<S: Into<String>>(server: S, status: u16) -> Self {
        Self::Upstream {
            server: server.into(),
            status,
        }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(duration: Duration, operation: S) -> Self {
        Self::Timeout {
            duration,
            operation: operation.into(),
        }
    }

    /// Create an exhausted-candidates error
    pub fn exhausted<S: Into<String>>(message: S) -> Self {
        Self::Exhausted {
            message: message.into(),
        }
    }

    /// Create an IO error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if the error may succeed against another server
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ShuntError::Network { .. } | ShuntError::Upstream { .. } | ShuntError::Timeout { .. }
        )
    }

    /// Check if the error should count against a server's circuit breaker
    pub fn should_trip_circuit(&self) -> bool {
        matches!(
            self,
            ShuntError::Network { .. } | ShuntError::Upstream { .. } | ShuntError::Timeout { .. }
        )
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ShuntError::Config { .. } => ErrorSeverity::Critical,
            ShuntError::Exhausted { .. } => ErrorSeverity::High,
            ShuntError::Internal { .. } => ErrorSeverity::High,
            ShuntError::Network { .. } => ErrorSeverity::Medium,
            ShuntError::Upstream { .. } => ErrorSeverity::Medium,
            ShuntError::Timeout { .. } => ErrorSeverity::Medium,
            ShuntError::Io { .. } => ErrorSeverity::Medium,
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Low => write!(f, "LOW"),
            ErrorSeverity::Medium => write!(f, "MEDIUM"),
            ErrorSeverity::High => write!(f, "HIGH"),
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Result type alias for shunt operations
pub type ShuntResult<T> = Result<T, ShuntError>;

impl From<std::io::Error> for ShuntError {
    fn from(err: std::io::Error) -> Self {
        ShuntError::io(format!("IO error: {}", err))
    }
}

impl From<hyper::Error> for ShuntError {
    fn from(err: hyper::Error) -> Self {
        if err.is_timeout() {
            ShuntError::timeout(Duration::from_secs(5), "HTTP request")
        } else if err.is_connect() {
            ShuntError::network(format!("Connection error: {}", err))
        } else {
            ShuntError::network(format!("HTTP error: {}", err))
        }
    }
}

impl From<toml::de::Error> for ShuntError {
    fn from(err: toml::de::Error) -> Self {
        ShuntError::config(format!("TOML parsing error: {}", err))
    }
}

impl From<hyper::http::uri::InvalidUri> for ShuntError {
    fn from(err: hyper::http::uri::InvalidUri) -> Self {
        ShuntError::config(format!("Invalid URI: {}", err))
    }
}

impl From<hyper::http::Error> for ShuntError {
    fn from(err: hyper::http::Error) -> Self {
        ShuntError::network(format!("HTTP error: {}", err))
    }
}

impl From<tokio::time::error::Elapsed> for ShuntError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        ShuntError::timeout(Duration::from_secs(5), "operation")
    }
}
