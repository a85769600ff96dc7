//! Blocking client for the command server.

use std::io::{BufReader, BufWriter, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};

use cf_controls::{BlockKind, Options, SignalValue};
use serde_json::Value;
use tracing::debug;

use crate::error::{ProtocolError, ProtocolResult};
use crate::packet::{Packet, read_packet, write_packet};

/// Blocking client speaking the command protocol over any duplex stream.
///
/// Every method sends one request and waits for its acknowledgment;
/// handler failures come back as [`ProtocolError::Handler`].
pub struct Client<S: Read + Write> {
    stream: S,
}

/// Buffered halves of one TCP connection.
pub struct TcpDuplex {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl Read for TcpDuplex {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf)
    }
}

impl Write for TcpDuplex {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

impl Client<TcpDuplex> {
    /// Connect to a server over TCP.
    pub fn connect(addr: impl ToSocketAddrs) -> ProtocolResult<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        let reader = BufReader::new(stream.try_clone()?);
        let writer = BufWriter::new(stream);
        Ok(Self::new(TcpDuplex { reader, writer }))
    }
}

impl<S: Read + Write> Client<S> {
    /// Create a new client on an already open stream.
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Send one command and wait for its acknowledgment. Returns the result
    /// packet, if the command produced one.
    pub fn call(&mut self, code: u8, args: &[Packet]) -> ProtocolResult<Option<Packet>> {
        write_packet(&mut self.stream, &Packet::Command(code))?;
        for arg in args {
            write_packet(&mut self.stream, arg)?;
        }
        self.stream.flush()?;
        debug!(code = %(code as char), "request sent");

        let mut result = None;
        let mut failure = None;
        loop {
            match read_packet(&mut self.stream)? {
                Packet::Ack(ack) if ack == code => break,
                Packet::Ack(ack) => {
                    return Err(ProtocolError::UnexpectedPacket {
                        expected: "acknowledgment of the request",
                        got: ack as char,
                    });
                }
                Packet::Error(message) => failure = Some(message),
                Packet::Command(_) => {
                    return Err(ProtocolError::UnexpectedPacket {
                        expected: "reply",
                        got: 'C',
                    });
                }
                packet => result = Some(packet),
            }
        }
        match failure {
            Some(message) => Err(ProtocolError::Handler {
                code: code as char,
                message,
            }),
            None => Ok(result),
        }
    }

    fn call_str(&mut self, code: u8, args: &[Packet]) -> ProtocolResult<String> {
        match self.call(code, args)? {
            Some(Packet::Str(s)) => Ok(s),
            other => Err(unexpected("string", other)),
        }
    }

    fn call_signal(&mut self, code: u8, name: &str) -> ProtocolResult<SignalValue> {
        match self.call(code, &[Packet::Str(name.to_string())])? {
            Some(p @ Packet::Array(_)) => p.into_signal().ok_or(ProtocolError::UnexpectedPacket {
                expected: "array",
                got: 'P',
            }),
            other => Err(unexpected("array", other)),
        }
    }

    fn call_unit(&mut self, code: u8, args: &[Packet]) -> ProtocolResult<()> {
        match self.call(code, args)? {
            None => Ok(()),
            other => Err(unexpected("no result", other)),
        }
    }

    /// Help text for one command, or for all of them.
    pub fn help(&mut self, code: Option<char>) -> ProtocolResult<String> {
        let code = code.map(String::from).unwrap_or_default();
        self.call_str(b'h', &[Packet::Str(code)])
    }

    /// Get the controller's `info` text for `what`.
    pub fn info(&mut self, what: &str) -> ProtocolResult<String> {
        self.call_str(b'i', &[Packet::Str(what.to_string())])
    }

    /// Add a signal initialised to zero.
    pub fn add_signal(&mut self, name: &str) -> ProtocolResult<()> {
        self.call_unit(b'G', &[Packet::Str(name.to_string())])
    }

    pub fn set_signal(&mut self, name: &str, value: f64) -> ProtocolResult<()> {
        self.call_unit(b'A', &[Packet::Str(name.to_string()), Packet::Double(value)])
    }

    /// Get a signal's current value.
    pub fn get_signal(&mut self, name: &str) -> ProtocolResult<SignalValue> {
        self.call_signal(b'g', name)
    }

    pub fn remove_signal(&mut self, name: &str) -> ProtocolResult<()> {
        self.call_unit(b'L', &[Packet::Str(name.to_string())])
    }

    pub fn add_source(&mut self, name: &str, block: &BlockKind, outputs: &[&str]) -> ProtocolResult<()> {
        self.call_unit(
            b'O',
            &[Packet::Str(name.to_string()), kind_doc(block)?, names(outputs)],
        )
    }

    /// Append a filter built from `block`.
    pub fn add_filter(
        &mut self,
        name: &str,
        block: &BlockKind,
        inputs: &[&str],
        outputs: &[&str],
    ) -> ProtocolResult<()> {
        self.call_unit(
            b'F',
            &[
                Packet::Str(name.to_string()),
                kind_doc(block)?,
                names(inputs),
                names(outputs),
            ],
        )
    }

    pub fn add_sink(&mut self, name: &str, block: &BlockKind, inputs: &[&str]) -> ProtocolResult<()> {
        self.call_unit(
            b'S',
            &[Packet::Str(name.to_string()), kind_doc(block)?, names(inputs)],
        )
    }

    pub fn set_source(&mut self, name: &str, options: &Options) -> ProtocolResult<()> {
        self.call_unit(b'U', &[Packet::Str(name.to_string()), options_doc(options)?])
    }

    /// Apply options to a filter.
    pub fn set_filter(&mut self, name: &str, options: &Options) -> ProtocolResult<()> {
        self.call_unit(b'T', &[Packet::Str(name.to_string()), options_doc(options)?])
    }

    pub fn set_sink(&mut self, name: &str, options: &Options) -> ProtocolResult<()> {
        self.call_unit(b'I', &[Packet::Str(name.to_string()), options_doc(options)?])
    }

    pub fn remove_source(&mut self, name: &str) -> ProtocolResult<()> {
        self.call_unit(b'R', &[Packet::Str(name.to_string())])
    }

    pub fn remove_filter(&mut self, name: &str) -> ProtocolResult<()> {
        self.call_unit(b'E', &[Packet::Str(name.to_string())])
    }

    pub fn remove_sink(&mut self, name: &str) -> ProtocolResult<()> {
        self.call_unit(b'K', &[Packet::Str(name.to_string())])
    }

    pub fn read_source(&mut self, name: &str) -> ProtocolResult<SignalValue> {
        self.call_signal(b'Q', name)
    }

    /// Read a sink's accumulated data.
    pub fn read_sink(&mut self, name: &str) -> ProtocolResult<SignalValue> {
        self.call_signal(b'N', name)
    }

    /// Start the controller's scheduling thread.
    pub fn start(&mut self) -> ProtocolResult<()> {
        self.call_unit(b's', &[])
    }

    /// Stop the controller and wait for its thread.
    pub fn stop(&mut self) -> ProtocolResult<()> {
        self.call_unit(b't', &[])
    }

    /// Tick period in seconds.
    pub fn get_period(&mut self) -> ProtocolResult<f64> {
        match self.call(b'p', &[])? {
            Some(Packet::Double(secs)) => Ok(secs),
            other => Err(unexpected("double", other)),
        }
    }

    pub fn set_period(&mut self, secs: f64) -> ProtocolResult<()> {
        self.call_unit(b'P', &[Packet::Double(secs)])
    }
}

fn unexpected(expected: &'static str, got: Option<Packet>) -> ProtocolError {
    ProtocolError::UnexpectedPacket {
        expected,
        got: got.map_or('-', |p| p.tag() as char),
    }
}

fn names(list: &[&str]) -> Packet {
    Packet::Json(Value::from(list.to_vec()))
}

fn kind_doc(kind: &BlockKind) -> ProtocolResult<Packet> {
    serde_json::to_value(kind)
        .map(Packet::Json)
        .map_err(|e| ProtocolError::framing(format!("cannot encode block description: {e}")))
}

fn options_doc(options: &Options) -> ProtocolResult<Packet> {
    serde_json::to_value(options)
        .map(Packet::Json)
        .map_err(|e| ProtocolError::framing(format!("cannot encode options: {e}")))
}
