//! Error types for the relay subsystem.

use thiserror::Error;

/// Failure reported by a transport half.
#[derive(Debug, Error)]
pub enum TransportError {
    /// I/O or protocol failure on the underlying socket.
    #[error("transport I/O error: {0}")]
    Io(String),

    /// The stream ended without a close handshake.
    #[error("connection reset without closing handshake")]
    Disconnected,

    /// A text frame was assembled from bytes that are not UTF-8.
    #[error("text payload is not valid UTF-8")]
    InvalidUtf8,
}

/// Errors surfaced by [`Connection`](crate::relay::Connection).
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The connection already reached a terminal state.
    #[error("connection is closed")]
    Closed,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Failure of the current logical message during reassembly.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReassemblyError {
    #[error("message of at least {size} bytes exceeds the {limit} byte limit")]
    MessageTooLarge { size: usize, limit: usize },
}

/// An assembled message could not be decoded into the inbound schema.
#[derive(Debug, Error)]
#[error("invalid inbound message: {0}")]
pub struct DecodeError(#[from] pub serde_json::Error);
