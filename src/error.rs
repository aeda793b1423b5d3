//! Error types for pulselink.

use thiserror::Error;

/// Caller-supplied value outside the protocol domain.
///
/// Surfaced synchronously, before any I/O happens. The caller must fix the
/// input; nothing is sent to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A value fell outside its documented range.
    #[error("{field} value {value} outside [{min}, {max}]")]
    OutOfRange {
        /// Name of the offending field.
        field: &'static str,
        /// The rejected value.
        value: i64,
        /// Inclusive lower bound.
        min: i64,
        /// Inclusive upper bound.
        max: i64,
    },
}

impl ValidationError {
    /// Shorthand constructor used throughout the codec.
    pub(crate) fn out_of_range(
        field: &'static str,
        value: impl Into<i64>,
        min: i64,
        max: i64,
    ) -> Self {
        Self::OutOfRange {
            field,
            value: value.into(),
            min,
            max,
        }
    }
}

/// Unparseable inbound bytes.
///
/// Never fatal: the session logs and discards the offending bytes and keeps
/// the stream alive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Frame length or type byte did not match any known response shape.
    #[error("malformed frame: {0}")]
    Malformed(String),
}

/// Main error type for all pulselink operations.
#[derive(Debug, Error)]
pub enum PulseLinkError {
    /// I/O error during transport operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Input rejected before encoding.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Inbound bytes failed to decode.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The session task has shut down and no longer accepts commands.
    #[error("session closed")]
    SessionClosed,
}

/// Result type alias using PulseLinkError.
pub type Result<T> = std::result::Result<T, PulseLinkError>;
