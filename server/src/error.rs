//! Error types for the channel, persistence, session and configuration layers.

use shared::{ClickReport, GeometryError, Target};
use std::time::Duration;
use thiserror::Error;

/// Failures of the duplex message channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The peer closed the connection or went away.
    #[error("channel closed by peer")]
    Closed,

    /// The underlying transport failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// A message arrived but is not the expected JSON shape.
    #[error("malformed message: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    /// A frame that cannot carry a JSON message (e.g. non UTF-8 binary).
    #[error("unsupported frame")]
    UnsupportedFrame,
}

/// Failures while writing a result record.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize observations: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Fewer bytes reached the file than were handed to it.
    #[error("short write: {written} of {intended} bytes")]
    ShortWrite { written: usize, intended: usize },
}

/// Reasons a session ended without completing all of its trials, or
/// completed them but could not store the results.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Missing, malformed or degenerate viewport message.
    #[error("handshake failed: {0}")]
    HandshakeDecode(String),

    #[error("failed to read click report for trial {trial}: {source}")]
    ChannelRead {
        trial: u32,
        #[source]
        source: ChannelError,
    },

    #[error("failed to send target for trial {trial}: {source}")]
    ChannelWrite {
        trial: u32,
        #[source]
        source: ChannelError,
    },

    #[error(transparent)]
    OutOfBounds(#[from] GeometryError),

    /// The report's echoed target does not match the target that was sent.
    #[error("click report for trial {trial} does not match the target sent")]
    Integrity {
        trial: u32,
        expected: Target,
        reported: Box<ClickReport>,
    },

    #[error("trial {trial} timed out after {after:?}")]
    Timeout { trial: u32, after: Duration },

    #[error("failed to persist results: {0}")]
    Persist(#[from] SinkError),
}

/// Invalid process or per-connection configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    SizeRange(#[from] GeometryError),

    #[error("trial count must be at least 1")]
    ZeroTrials,

    /// Labels end up in file names, so only a safe character set is allowed.
    #[error("invalid label {0:?}: use letters, digits, '-', '_' or '.'")]
    InvalidLabel(String),

    #[error("subject and condition must be given together")]
    IncompleteIdentity,
}
