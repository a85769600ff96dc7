//! Command server.
//!
//! Every accepted connection gets its own thread running
//! [`handle_connection`]. Requests on one connection are answered in order;
//! the controller's lock serialises mutations across connections.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use cf_runtime::Controller;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::command::{CommandTable, Request};
use crate::error::{ProtocolError, ProtocolResult};
use crate::packet::{Packet, read_packet, write_packet};

fn default_bind_addr() -> String {
    "127.0.0.1:9999".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

/// Answer one request: an optional result or error packet, then the
/// acknowledgment. Only I/O and framing problems are returned as errors.
pub fn serve_request<S: Read + Write>(
    stream: &mut S,
    controller: &Controller,
    table: &CommandTable,
) -> ProtocolResult<()> {
    let code = match read_packet(stream)? {
        Packet::Command(code) => code,
        other => {
            let tag = other.tag();
            let message = format!("Command expected, '{}' received", tag as char);
            warn!(%message, "protocol violation");
            write_packet(stream, &Packet::Error(message))?;
            write_packet(stream, &Packet::Ack(tag))?;
            stream.flush()?;
            return Ok(());
        }
    };

    let Some(command) = table.get(code) else {
        let message = format!("unknown command '{}'", code as char);
        warn!(%message, "protocol violation");
        write_packet(stream, &Packet::Error(message))?;
        write_packet(stream, &Packet::Ack(code))?;
        stream.flush()?;
        return Ok(());
    };

    let mut args = Vec::with_capacity(command.args.len());
    for _ in &command.args {
        args.push(read_packet(stream).map_err(|e| match e {
            ProtocolError::Closed => ProtocolError::framing("stream closed inside a request"),
            other => other,
        })?);
    }
    debug!(code = %(code as char), command = command.name, "dispatching");

    let mismatch = command
        .args
        .iter()
        .zip(&args)
        .position(|(kind, packet)| !kind.matches(packet));
    let outcome = match mismatch {
        Some(i) => Err(format!(
            "argument {} of '{}' must be '{}', got '{}'",
            i + 1,
            code as char,
            command.args[i],
            args[i].tag() as char
        )),
        None => {
            let mut request = Request::new(controller, table, args);
            (command.handler)(&mut request).map_err(|e| e.to_string())
        }
    };

    match outcome {
        Ok(Some(result)) => write_packet(stream, &result)?,
        Ok(None) => {}
        Err(message) => {
            warn!(code = %(code as char), error = %message, "command failed");
            write_packet(stream, &Packet::Error(message))?;
        }
    }
    write_packet(stream, &Packet::Ack(code))?;
    stream.flush()?;
    Ok(())
}

/// Serve requests until the peer closes the stream.
pub fn handle_connection<S: Read + Write>(
    mut stream: S,
    controller: &Controller,
    table: &CommandTable,
) -> ProtocolResult<()> {
    loop {
        match serve_request(&mut stream, controller, table) {
            Ok(()) => {}
            Err(ProtocolError::Closed) => return Ok(()),
            Err(err) => return Err(err),
        }
    }
}

/// TCP command server bound to an address.
pub struct Server {
    listener: TcpListener,
    controller: Arc<Controller>,
    table: Arc<CommandTable>,
}

impl Server {
    /// Bind the listening socket for `controller`.
    pub fn bind(config: &ServerConfig, controller: Arc<Controller>) -> ProtocolResult<Self> {
        let listener = TcpListener::bind(&config.bind_addr)?;
        Ok(Self {
            listener,
            controller,
            table: Arc::new(CommandTable::standard()),
        })
    }

    /// Replace the standard command table.
    pub fn with_table(mut self, table: CommandTable) -> Self {
        self.table = Arc::new(table);
        self
    }

    pub fn local_addr(&self) -> ProtocolResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the accept loop on a background thread.
    pub fn spawn(self) -> ProtocolResult<ServerHandle> {
        let addr = self.local_addr()?;
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let thread = thread::Builder::new()
            .name("cf-server".to_string())
            .spawn(move || self.accept_loop(&flag))?;
        info!(%addr, "command server listening");
        Ok(ServerHandle {
            addr,
            shutdown,
            thread: Some(thread),
        })
    }

    fn accept_loop(&self, shutdown: &AtomicBool) {
        for stream in self.listener.incoming() {
            if shutdown.load(Ordering::Acquire) {
                break;
            }
            match stream {
                Ok(stream) => self.spawn_connection(stream),
                Err(err) => warn!("accept failed: {err}"),
            }
        }
        debug!("accept loop finished");
    }

    fn spawn_connection(&self, stream: TcpStream) {
        let peer = stream
            .peer_addr()
            .map_or_else(|_| "unknown".to_string(), |a| a.to_string());
        if let Err(err) = stream.set_nodelay(true) {
            debug!(%peer, "set_nodelay failed: {err}");
        }
        let controller = Arc::clone(&self.controller);
        let table = Arc::clone(&self.table);
        let name = format!("cf-conn-{peer}");
        let spawned = thread::Builder::new().name(name).spawn(move || {
            info!(%peer, "connection opened");
            match handle_connection(stream, &controller, &table) {
                Ok(()) => info!(%peer, "connection closed"),
                Err(err) => warn!(%peer, "connection dropped: {err}"),
            }
        });
        if let Err(err) = spawned {
            warn!("could not spawn connection thread: {err}");
        }
    }
}

/// Running server; dropping it shuts the accept loop down.
#[derive(Debug)]
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ServerHandle {
    /// Address the server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting connections. Open connections run until their peers
    /// disconnect.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.shutdown.store(true, Ordering::Release);
        // wake the blocking accept
        if let Err(err) = TcpStream::connect(self.addr) {
            debug!("shutdown wake-up connect failed: {err}");
        }
        if thread.join().is_err() {
            warn!("accept thread panicked");
        }
        info!(addr = %self.addr, "command server stopped");
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
