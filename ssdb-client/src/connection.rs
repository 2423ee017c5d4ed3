//! # Connection
//!
//! Purpose: Own one TCP socket with buffered input and output and run strict
//! request-then-response exchanges over it.
//!
//! ## Design Principles
//! 1. **Sticky Failure**: The first I/O or framing error is remembered and
//!    every later command fails with `BrokenConnection`. After a failed read
//!    the stream position is unknown, so nothing on it can be trusted.
//! 2. **Explicit Flush**: `send` only fills the output buffer; `flush`
//!    delivers it. `execute` composes send, flush and receive.
//! 3. **Buffer Reuse**: Encoding and line buffers live on the connection.

use std::io::{BufReader, BufWriter, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{ClientError, ClientResult};
use crate::protocol::{encode_command, read_response, Arg};
use crate::response::Response;

/// Socket timeouts applied when dialing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Optional TCP connect timeout.
    pub connect_timeout: Option<Duration>,
    /// Optional TCP read timeout.
    pub read_timeout: Option<Duration>,
    /// Optional TCP write timeout.
    pub write_timeout: Option<Duration>,
}

/// Single TCP connection with reusable buffers.
pub struct Connection {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
    line_buf: Vec<u8>,
    write_buf: Vec<u8>,
    connected: bool,
    err: Option<String>,
}

impl Connection {
    /// Dials `addr` (`host:port`), trying each resolved address in turn.
    pub fn connect(addr: &str, options: &ConnectOptions) -> ClientResult<Self> {
        let stream = connect_stream(addr, options)?;
        if let Some(timeout) = options.read_timeout {
            stream.set_read_timeout(Some(timeout))?;
        }
        if let Some(timeout) = options.write_timeout {
            stream.set_write_timeout(Some(timeout))?;
        }
        // Disable Nagle to keep request latency low for small payloads.
        stream.set_nodelay(true)?;
        debug!(addr, "connection established");
        Self::from_stream(stream)
    }

    /// Wraps an already connected socket.
    pub fn from_stream(stream: TcpStream) -> ClientResult<Self> {
        let read_half = stream.try_clone()?;
        Ok(Connection {
            reader: BufReader::new(read_half),
            writer: BufWriter::new(stream),
            line_buf: Vec::with_capacity(32),
            write_buf: Vec::with_capacity(256),
            connected: true,
            err: None,
        })
    }

    /// Encodes a command into the output buffer without flushing it.
    pub fn send(&mut self, cmd: &str, args: &[Arg<'_>]) -> ClientResult<()> {
        self.ensure_usable()?;
        self.write_buf.clear();
        encode_command(cmd, args, &mut self.write_buf);
        let result = self.writer.write_all(&self.write_buf);
        self.track(result.map_err(ClientError::from))
    }

    /// Delivers everything buffered by `send`.
    pub fn flush(&mut self) -> ClientResult<()> {
        self.ensure_usable()?;
        let result = self.writer.flush();
        self.track(result.map_err(ClientError::from))
    }

    /// Reads one complete response.
    pub fn receive(&mut self) -> ClientResult<Response> {
        self.ensure_usable()?;
        let result = read_response(&mut self.reader, &mut self.line_buf);
        self.track(result).map(Response::new)
    }

    /// Sends one command and waits for its response.
    ///
    /// A non-`ok` status is returned as a normal `Response`; only transport
    /// and framing failures are errors here, and they break the connection.
    pub fn execute(&mut self, cmd: &str, args: &[Arg<'_>]) -> ClientResult<Response> {
        self.send(cmd, args)?;
        self.flush()?;
        self.receive()
    }

    /// Closes the socket. Later commands fail with `BrokenConnection`.
    pub fn close(&mut self) {
        if !self.connected {
            return;
        }
        self.connected = false;
        if self.err.is_none() {
            self.err = Some("connection closed".to_string());
        }
        // Unflushed output is discarded with the socket.
        let _ = self.writer.get_ref().shutdown(Shutdown::Both);
    }

    /// The sticky error, if the connection has failed.
    pub fn err(&self) -> Option<&str> {
        self.err.as_deref()
    }

    /// True until the connection fails or is closed.
    pub fn is_connected(&self) -> bool {
        self.connected && self.err.is_none()
    }

    fn ensure_usable(&self) -> ClientResult<()> {
        match &self.err {
            Some(reason) => Err(ClientError::BrokenConnection(reason.clone())),
            None => Ok(()),
        }
    }

    fn track<T>(&mut self, result: ClientResult<T>) -> ClientResult<T> {
        if let Err(err) = &result {
            warn!(error = %err, "connection marked broken");
            self.err = Some(err.to_string());
        }
        result
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.writer.get_ref().peer_addr().ok())
            .field("connected", &self.connected)
            .field("err", &self.err)
            .finish()
    }
}

fn connect_stream(addr: &str, options: &ConnectOptions) -> ClientResult<TcpStream> {
    let addrs = addr
        .to_socket_addrs()
        .map_err(|_| ClientError::InvalidAddress(addr.to_string()))?;

    let mut last_err = None;
    for socket_addr in addrs {
        let attempt = match options.connect_timeout {
            Some(timeout) => TcpStream::connect_timeout(&socket_addr, timeout),
            None => TcpStream::connect(socket_addr),
        };
        match attempt {
            Ok(stream) => return Ok(stream),
            Err(err) => last_err = Some(err),
        }
    }

    match last_err {
        Some(err) => Err(ClientError::Io(err)),
        None => Err(ClientError::InvalidAddress(addr.to_string())),
    }
}
