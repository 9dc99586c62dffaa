use std::io;
use std::net::SocketAddr;

use mio::{Registry, Token};
use tracing::{debug, trace, warn};

use crate::error::Result;
use crate::net::socket::{Connection, SocketState};
use crate::net::tcp::traits::{ClientProxy, SocketName};

/// Lifecycle of one accepted connection. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Closed,
}

/// State for one accepted connection: its socket and its buffers.
pub struct ClientSession {
    name: SocketName,
    peer_addr: SocketAddr,
    socket: Option<Box<dyn Connection>>,
    recv_buffer: Vec<u8>,
    send_buffer: Vec<u8>,
    bytes_received: u64,
}

/// Outcome of one drain pass over a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Drained {
    pub bytes: usize,
    pub lost: bool,
}

impl ClientSession {
    pub fn new(name: SocketName, peer_addr: SocketAddr, socket: Box<dyn Connection>) -> Self {
        Self {
            name,
            peer_addr,
            socket: Some(socket),
            recv_buffer: Vec::new(),
            send_buffer: Vec::new(),
            bytes_received: 0,
        }
    }

    pub fn name(&self) -> &SocketName {
        &self.name
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn state(&self) -> SessionState {
        if self.socket.is_some() {
            SessionState::Connected
        } else {
            SessionState::Closed
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Bytes from the most recent read.
    pub fn received(&self) -> &[u8] {
        &self.recv_buffer
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    /// Bytes queued for sending and not yet written.
    pub fn pending_send(&self) -> &[u8] {
        &self.send_buffer
    }

    /// Appends to the send buffer. Nothing is written until [`flush`](Self::flush).
    pub fn queue_send(&mut self, data: &[u8]) {
        self.send_buffer.extend_from_slice(data);
    }

    /// Writes as much of the send buffer as the socket takes without
    /// blocking and returns the number of bytes written.
    pub fn flush(&mut self) -> Result<usize> {
        let Some(socket) = self.socket.as_mut() else {
            return Err(io::Error::from(io::ErrorKind::NotConnected).into());
        };
        let mut written = 0;
        while written < self.send_buffer.len() {
            match socket.send(&self.send_buffer[written..])? {
                0 => break,
                n => written += n,
            }
        }
        self.send_buffer.drain(..written);
        Ok(written)
    }

    /// Releases the socket and drops the last read. Returns `true` only on
    /// the Connected -> Closed transition, so callers fire the disconnect
    /// hook once.
    pub fn close(&mut self) -> bool {
        self.recv_buffer.clear();
        match self.socket.take() {
            Some(mut socket) => {
                socket.close();
                true
            }
            None => false,
        }
    }

    pub(crate) fn register(&mut self, registry: &Registry, token: Token) -> io::Result<()> {
        match self.socket.as_mut() {
            Some(socket) => socket.register(registry, token),
            None => Ok(()),
        }
    }

    /// Reads everything the socket reports as pending, handing each read to
    /// the proxy. Closes the session when the socket is no longer connected
    /// or a read fails.
    pub(crate) fn drain(&mut self, proxy: &dyn ClientProxy) -> Drained {
        let name = self.name.clone();
        let mut bytes = 0;

        let connected = self
            .socket
            .as_ref()
            .is_some_and(|socket| socket.state() == SocketState::Connected);
        if !connected {
            self.close();
            return Drained { bytes, lost: true };
        }

        loop {
            let Some(socket) = self.socket.as_mut() else {
                return Drained { bytes, lost: true };
            };

            let pending = match socket.pending_data() {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    debug!(session = %name, error = %e, "pending data query failed");
                    self.close();
                    return Drained { bytes, lost: true };
                }
            };

            self.recv_buffer.resize(pending, 0);
            match socket.recv(&mut self.recv_buffer) {
                Ok(0) => {
                    self.recv_buffer.clear();
                    break;
                }
                Ok(read) => {
                    self.recv_buffer.truncate(read);
                    bytes += read;
                    self.bytes_received += read as u64;
                    trace!(session = %name, bytes = read, "received");
                    if let Err(e) = proxy.on_data_received(&name, self) {
                        warn!(session = %name, error = %e, "on_data_received hook failed");
                    }
                }
                Err(e) => {
                    debug!(session = %name, error = %e, "receive failed");
                    self.close();
                    return Drained { bytes, lost: true };
                }
            }
        }

        Drained { bytes, lost: false }
    }
}
