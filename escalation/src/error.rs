//! Error types for the escalation core
//!
//! One enum per external collaborator so the engine can map each failure to
//! the most specific terminal state. None of these are retried within a cycle.

use crate::state_machine::IllegalTransition;
use std::path::PathBuf;
use thiserror::Error;

/// Failure of the reachability transport itself (not an unreachable host).
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The probe program or socket could not be started
    #[error("Probe transport unavailable for {host}: {message}")]
    Unavailable { host: String, message: String },

    /// The probe ran but exited abnormally
    #[error("Probe run failed for {host}: {message}")]
    RunFailed { host: String, message: String },

    /// The probe produced output that could not be read as statistics
    #[error("Unreadable probe statistics for {host}: {message}")]
    Unparseable { host: String, message: String },
}

/// Ticketing system failures.
///
/// `Malformed` is a data error and is treated by dedup as "information
/// absent"; the other variants abort the ticket path.
#[derive(Debug, Error)]
pub enum TicketError {
    /// Network failure, timeout, or request construction failure
    #[error("Ticketing request '{operation}' failed: {message}")]
    Transport { operation: String, message: String },

    /// Non-success HTTP status
    #[error("Ticketing request '{operation}' returned status {status}")]
    Status { operation: String, status: u16 },

    /// Response body could not be decoded
    #[error("Malformed ticketing response for '{operation}': {message}")]
    Malformed { operation: String, message: String },
}

impl TicketError {
    pub fn transport(operation: impl Into<String>, message: impl ToString) -> Self {
        Self::Transport {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    pub fn malformed(operation: impl Into<String>, message: impl ToString) -> Self {
        Self::Malformed {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    /// Whether this error means "the data was unreadable" rather than
    /// "the system could not be reached".
    pub fn is_data_error(&self) -> bool {
        matches!(self, Self::Malformed { .. })
    }
}

/// Remote session failures, reported as structured values rather than panics.
#[derive(Debug, Error)]
pub enum RemediationError {
    #[error("Could not connect to {host}:{port}: {message}")]
    Connect {
        host: String,
        port: u16,
        message: String,
    },

    #[error("Session handshake with {host} failed: {message}")]
    Handshake { host: String, message: String },

    #[error("Host key for {host} does not match pinned fingerprint (got {actual})")]
    HostKeyMismatch { host: String, actual: String },

    #[error("Authentication as '{username}' on {host} failed: {message}")]
    Authentication {
        host: String,
        username: String,
        message: String,
    },

    #[error("Command channel on {host} failed: {message}")]
    Channel { host: String, message: String },

    #[error("Command '{command}' exited with status {status}: {output}")]
    CommandFailed {
        command: String,
        status: i32,
        output: String,
    },
}

/// Event log and incident record persistence failures.
#[derive(Debug, Error)]
pub enum EventLogError {
    #[error("Event log I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Incident record at {path} could not be encoded: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors that stop the engine from producing a cycle outcome at all.
#[derive(Debug, Error)]
pub enum EscalationError {
    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),
}

/// Result type alias for escalation operations
pub type EscalationResult<T> = Result<T, EscalationError>;
