//! Error types shared across the scaltainer subsystems.
//!
//! Three recoverable kinds, always attributable to one service or one
//! service group: `Configuration` (malformed config or upstream data),
//! `Network` (transport failure talking to a metric source or
//! orchestrator), and `Warning` (expected, recoverable conditions logged
//! at warn severity). None of them terminates a tick; only `State` errors
//! raised during startup are fatal.

use thiserror::Error;

/// Result type alias for scaltainer operations.
pub type ScaleResult<T> = Result<T, ScaleError>;

/// Errors that can occur while observing metrics or driving replicas.
#[derive(Debug, Error)]
pub enum ScaleError {
    /// Malformed or missing configuration, or malformed upstream data,
    /// for one service. The affected service is skipped.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Transport or I/O failure against a metric source or orchestrator.
    /// Skips one service, or a whole group when raised during the batched
    /// metric fetch.
    #[error("network error: {0}")]
    Network(String),

    /// An expected, recoverable condition (metric missing for a configured
    /// service, empty service group). Logged at warn severity.
    #[error("{0}")]
    Warning(String),

    /// Unrecoverable startup failure (unreadable config, corrupt state
    /// file). Exits the process before the loop starts.
    #[error("state error: {0}")]
    State(String),
}

impl ScaleError {
    /// Whether this error should be logged at warn rather than error
    /// severity.
    pub fn is_warning(&self) -> bool {
        matches!(self, ScaleError::Warning(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warning_severity() {
        assert!(ScaleError::Warning("no services".into()).is_warning());
        assert!(!ScaleError::Configuration("bad".into()).is_warning());
        assert!(!ScaleError::Network("down".into()).is_warning());
    }

    #[test]
    fn display_includes_kind() {
        let e = ScaleError::Configuration("missing ratio".into());
        assert_eq!(e.to_string(), "configuration error: missing ratio");

        let e = ScaleError::Network("connection refused".into());
        assert_eq!(e.to_string(), "network error: connection refused");
    }
}
