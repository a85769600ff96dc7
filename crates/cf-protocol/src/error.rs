//! Error types for the wire protocol.

use thiserror::Error;

pub type ProtocolResult<T> = Result<T, ProtocolError>;

#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Malformed or truncated packet. The connection cannot be resynchronised.
    #[error("Framing error: {what}")]
    Framing { what: String },

    /// The peer closed the stream between packets.
    #[error("connection closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The server answered a command with an error packet.
    #[error("command '{code}' failed: {message}")]
    Handler { code: char, message: String },

    #[error("unexpected packet: expected {expected}, got '{got}'")]
    UnexpectedPacket { expected: &'static str, got: char },
}

impl ProtocolError {
    pub fn framing(what: impl Into<String>) -> Self {
        Self::Framing { what: what.into() }
    }
}
