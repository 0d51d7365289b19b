//! Error types for the synchronization engine.
//!
//! Every fallible operation in the crate returns [`SyncError`]. Errors carry
//! structured context and classify themselves so callers can decide whether an
//! engine instance has to stop or whether the operation can simply be retried.
//!
//! ## Error Categories
//!
//! - **Window Errors**: a frame outside the retained history window (fatal)
//! - **Protocol Errors**: a peer sent something unexpected (closes that peer)
//! - **Join Errors**: no host available, or the host refused the join
//! - **Transport Errors**: the transport failed to deliver or connect
//! - **Configuration Errors**: invalid or unparseable engine parameters
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use tandem::SyncError;
//!
//! let error = SyncError::join_failed("no joinable hosts found");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::types::StateFrame;

/// Result type alias for engine operations.
pub type Result<T, E = SyncError> = std::result::Result<T, E>;

/// Main error type for engine operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SyncError {
    #[error("Frame {frame} is outside the history window [{start}, {end})")]
    WindowOutOfRange { frame: StateFrame, start: StateFrame, end: StateFrame },

    #[error("Protocol violation from {peer}: {details}")]
    Protocol { peer: String, details: String },

    #[error("Failed to join session: {reason}")]
    Join { reason: String },

    #[error("Host {host} refused the join: {reason}")]
    JoinRejected { host: String, reason: String },

    #[error("Transport failure: {reason}")]
    Transport {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Connection to {peer} is closed")]
    ConnectionClosed { peer: String },

    #[error("Invalid configuration for '{field}': {details}")]
    Config { field: String, details: String },

    #[error("Parse error in {context}: {details}")]
    Parse { context: String, details: String },

    #[error("Configuration file error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Engine has halted")]
    EngineHalted,
}

impl SyncError {
    /// Returns whether the engine instance that produced this error must stop.
    ///
    /// A frame outside the history window means peers have diverged beyond
    /// what the window can reconcile; continuing would break determinism.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::WindowOutOfRange { .. } | SyncError::EngineHalted)
    }

    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Join { .. } => true,
            SyncError::Transport { .. } => true,
            SyncError::Timeout { .. } => true,
            SyncError::ConnectionClosed { .. } => true,
            SyncError::JoinRejected { .. } => false,
            SyncError::WindowOutOfRange { .. } => false,
            SyncError::Protocol { .. } => false,
            SyncError::Config { .. } => false,
            SyncError::Parse { .. } => false,
            SyncError::File { .. } => false,
            SyncError::EngineHalted => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            SyncError::WindowOutOfRange { .. } => vec![
                "Increase max_frames so slower peers fit in the window",
                "Check for a peer whose clock runs far ahead",
                "Restart the engine and rejoin the session",
            ],
            SyncError::Protocol { .. } => vec![
                "Verify both peers run the same protocol version",
                "Check the transport preserves message order",
            ],
            SyncError::Join { .. } => vec![
                "Ensure a host is running and accepting joins",
                "Retry after the host finishes starting",
            ],
            SyncError::JoinRejected { .. } => vec![
                "Check the join payload the host expects",
                "Ask the host to accept new peers",
            ],
            SyncError::Transport { .. } => vec![
                "Check network connectivity",
                "Retry the operation",
            ],
            SyncError::ConnectionClosed { .. } => vec![
                "Reconnect to the session",
                "Check whether the remote peer shut down",
            ],
            SyncError::Config { .. } => vec![
                "Check frame_ms is positive",
                "Check delay is smaller than max_frames",
            ],
            SyncError::Parse { .. } => vec![
                "Check the configuration document is valid YAML",
                "Verify field names and value types",
            ],
            SyncError::File { .. } => vec![
                "Check file exists and is readable",
                "Check file permissions",
            ],
            SyncError::Timeout { .. } => vec![
                "Increase timeout duration",
                "Verify the host is responding",
            ],
            SyncError::EngineHalted => vec![
                "Inspect the engine logs for the fatal error",
                "Create a new engine and rejoin the session",
            ],
        }
    }

    /// Helper constructor for window range errors.
    pub fn out_of_range(frame: StateFrame, start: StateFrame, end: StateFrame) -> Self {
        SyncError::WindowOutOfRange { frame, start, end }
    }

    /// Helper constructor for protocol violations.
    pub fn protocol_violation(peer: impl Into<String>, details: impl Into<String>) -> Self {
        SyncError::Protocol { peer: peer.into(), details: details.into() }
    }

    /// Helper constructor for join failures.
    pub fn join_failed(reason: impl Into<String>) -> Self {
        SyncError::Join { reason: reason.into() }
    }

    /// Helper constructor for transport failures.
    pub fn transport_failed(reason: impl Into<String>) -> Self {
        SyncError::Transport { reason: reason.into(), source: None }
    }

    /// Helper constructor for transport failures with source.
    pub fn transport_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        SyncError::Transport { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for closed connections.
    pub fn connection_closed(peer: impl Into<String>) -> Self {
        SyncError::ConnectionClosed { peer: peer.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn invalid_config(field: impl Into<String>, details: impl Into<String>) -> Self {
        SyncError::Config { field: field.into(), details: details.into() }
    }

    /// Helper constructor for file errors with path context.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        SyncError::File { path, source }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::File { path: PathBuf::from("<unknown>"), source: err }
    }
}
