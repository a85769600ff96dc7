//! Remote control of a ctrlflow controller over a byte stream.
//!
//! Packets are tagged, length-prefixed little-endian frames (see
//! [`packet`]). A request is a command packet followed by the argument
//! packets its [`Command`] declares; the server answers with an optional
//! result or error packet and always finishes with an acknowledgment that
//! echoes the command code.

pub mod client;
pub mod command;
pub mod error;
pub mod packet;
pub mod server;

pub use client::{Client, TcpDuplex};
pub use command::{ArgKind, Command, CommandTable, Handler, Request};
pub use error::{ProtocolError, ProtocolResult};
pub use packet::{MAX_PAYLOAD, Packet, read_packet, write_packet};
pub use server::{Server, ServerConfig, ServerHandle, handle_connection, serve_request};
