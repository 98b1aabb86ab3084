//! Bridge error types.
//!
//! [`BridgeError`] is the outcome taxonomy of a single call: every waiter
//! attached to a job receives a clone of the same value. Configuration
//! problems are reported separately at startup.

use serde::Serialize;
use thiserror::Error;

pub type BridgeResult<T> = Result<T, BridgeError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// Connector unreachable, dead, or returned unparseable data.
    /// Recovered by respawning the connector on the next call.
    #[error("Communication error: {0}")]
    Communication(String),

    /// No response within the allotted time. The job is abandoned.
    #[error("Timed out: {0}")]
    TimedOut(String),

    /// Well-formed error response from the remote service.
    #[error("Downstream error: {0}")]
    Downstream(String),

    /// An internal invariant was violated. Fatal to the call only.
    #[error("Bridge internal error: {0}")]
    Internal(String),
}

/// Stable classification of [`BridgeError`] for callers that map errors to
/// statuses (for example an HTTP handler choosing between retry and surfacing).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    CommunicationError,
    TimedOut,
    DownstreamError,
    BridgeInternalError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::CommunicationError => "communication_error",
            ErrorKind::TimedOut => "timed_out",
            ErrorKind::DownstreamError => "downstream_error",
            ErrorKind::BridgeInternalError => "bridge_internal_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl BridgeError {
    /// Outcome of any work refused or abandoned because the bridge stopped.
    pub fn shutting_down() -> Self {
        BridgeError::Internal("bridge shutting down".to_string())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::Communication(_) => ErrorKind::CommunicationError,
            BridgeError::TimedOut(_) => ErrorKind::TimedOut,
            BridgeError::Downstream(_) => ErrorKind::DownstreamError,
            BridgeError::Internal(_) => ErrorKind::BridgeInternalError,
        }
    }

    /// The message without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            BridgeError::Communication(msg)
            | BridgeError::TimedOut(msg)
            | BridgeError::Downstream(msg)
            | BridgeError::Internal(msg) => msg,
        }
    }

    pub fn is_communication(&self) -> bool {
        matches!(self, BridgeError::Communication(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, BridgeError::TimedOut(_))
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::Communication(err.to_string())
    }
}

/// Invalid configuration values, reported by `BridgeConfig::validate`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigValidationError {
    #[error("connector.path must not be empty")]
    EmptyConnectorPath,

    #[error("{field} must be a finite, non-negative number of seconds (got {value})")]
    InvalidDelay { field: &'static str, value: f64 },

    #[error("{field} must be a finite, positive number of seconds (got {value})")]
    InvalidTimeout { field: &'static str, value: f64 },

    #[error("{field} must be greater than zero")]
    ZeroTtl { field: &'static str },

    #[error("{field} must not exceed {max} seconds (got {value})")]
    TooLarge {
        field: &'static str,
        value: f64,
        max: f64,
    },

    #[error("cache.max_entries must be greater than zero when set")]
    ZeroCacheBound,
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error(transparent)]
    Invalid(#[from] ConfigValidationError),
}
