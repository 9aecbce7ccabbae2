//! Error types for the niri event stream session

use std::collections::TryReserveError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that end a watch session
#[derive(Debug, Error)]
pub enum WatchError {
    /// The NIRI_SOCKET environment variable is not set
    #[error("NIRI_SOCKET environment variable not set - is niri running?")]
    SocketNotSet,

    /// The socket path does not exist
    #[error("Niri socket not found at {path}")]
    SocketNotFound { path: PathBuf },

    /// Failed to connect to the niri socket
    #[error("Failed to connect to niri socket at {path}: {source}")]
    ConnectionFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to send the subscription request to niri
    #[error("Failed to send request to niri: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Failed to read from the event stream
    #[error("Failed to receive events from niri: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Failed to serialize the subscription request
    #[error("Failed to serialize request: {0}")]
    SerializeFailed(#[source] serde_json::Error),

    /// The line buffer could not grow to hold the incoming line
    #[error("Failed to grow line buffer to {requested} bytes: {source}")]
    BufferAllocation {
        requested: usize,
        #[source]
        source: TryReserveError,
    },

    /// Maximum retry attempts exceeded
    #[error("Failed to connect to niri after {attempts} attempts")]
    MaxRetriesExceeded { attempts: u32 },
}
