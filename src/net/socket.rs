//! Socket abstraction consumed by the polling loop.
//!
//! The loop never touches an OS socket directly. It drives two small traits:
//!
//! ```text
//!   Listener                         Connection
//!   ├── state()                      ├── state()
//!   ├── has_pending_connection()     ├── set_nonblocking()
//!   ├── accept() ──────────────────▶ ├── pending_data()
//!   ├── local_addr()                 ├── recv() / send()
//!   └── close()                      └── close()
//! ```
//!
//! Every call is expected to return immediately. The hot path only calls
//! `accept` after `has_pending_connection` said yes and only calls `recv`
//! with the size `pending_data` reported, so an implementation backed by a
//! non-blocking handle never stalls the loop.
//!
//! [`TcpListenerSocket`] and [`TcpConnectionSocket`] implement the traits on
//! top of `mio`; [`bind_listener`] builds the listener with `socket2`.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr};

use mio::net::{TcpListener, TcpStream};
use mio::{Interest, Registry, Token};
use socket2::{Domain, Protocol, Socket, Type};
use tracing::debug;

use crate::net::tcp::config::ServerConfig;

/// Connection-state query result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Connected,
    NotConnected,
}

/// A freshly accepted connection and the peer it came from.
pub struct Accepted {
    pub connection: Box<dyn Connection>,
    pub peer_addr: SocketAddr,
}

/// Listening socket as seen by the polling loop.
pub trait Listener: Send {
    /// `Connected` while the listener is operable.
    fn state(&self) -> SocketState;

    /// Non-blocking check for a queued connection.
    fn has_pending_connection(&mut self) -> io::Result<bool>;

    /// Takes the next queued connection. `Ok(None)` means nothing usable was
    /// returned and no session should be created.
    fn accept(&mut self) -> io::Result<Option<Accepted>>;

    fn local_addr(&self) -> io::Result<SocketAddr>;

    /// Releases the OS handle. Calling it twice is a no-op.
    fn close(&mut self);

    /// Hooks the socket into the engine's poller so readiness cuts idle waits short.
    fn register(&mut self, registry: &Registry, token: Token) -> io::Result<()> {
        let _ = (registry, token);
        Ok(())
    }
}

/// Accepted connection as seen by the polling loop.
pub trait Connection: Send {
    fn state(&self) -> SocketState;

    fn set_nonblocking(&mut self) -> io::Result<()>;

    /// Number of bytes that can be read right now. Zero ends the current
    /// drain; it does not mean the peer is gone.
    fn pending_data(&mut self) -> io::Result<usize>;

    /// Reads into `buf`. An `Err` is a failed receive and closes the session.
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn send(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Releases the OS handle. Calling it twice is a no-op.
    fn close(&mut self);

    fn register(&mut self, registry: &Registry, token: Token) -> io::Result<()> {
        let _ = (registry, token);
        Ok(())
    }
}

/// Binds a reusable, non-blocking listener with symmetric buffer sizing.
pub fn bind_listener(config: &ServerConfig) -> io::Result<TcpListenerSocket> {
    let addr = config.socket_addr();
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.set_send_buffer_size(config.rw_buffer_size)?;
    socket.set_recv_buffer_size(config.rw_buffer_size)?;
    socket.bind(&addr.into())?;
    socket.listen(config.backlog)?;

    let listener = TcpListener::from_std(socket.into());
    Ok(TcpListenerSocket::new(listener, config.rw_buffer_size, config.no_delay))
}

/// mio-backed [`Listener`].
///
/// mio offers no "is a connection queued" query, so the check accepts one
/// connection and holds it until [`Listener::accept`] collects it.
pub struct TcpListenerSocket {
    inner: Option<TcpListener>,
    stashed: Option<(TcpStream, SocketAddr)>,
    registry: Option<Registry>,
    rw_buffer_size: usize,
    no_delay: bool,
}

impl TcpListenerSocket {
    pub fn new(listener: TcpListener, rw_buffer_size: usize, no_delay: bool) -> Self {
        Self {
            inner: Some(listener),
            stashed: None,
            registry: None,
            rw_buffer_size,
            no_delay,
        }
    }

    fn wrap(&self, stream: TcpStream, peer_addr: SocketAddr) -> Accepted {
        if let Err(e) = stream.set_nodelay(self.no_delay) {
            debug!(peer = %peer_addr, error = %e, "failed to set TCP_NODELAY");
        }
        Accepted {
            connection: Box::new(TcpConnectionSocket::new(stream, self.rw_buffer_size)),
            peer_addr,
        }
    }
}

impl Listener for TcpListenerSocket {
    /// `NotConnected` once closed or when the OS reports a pending socket
    /// error. Reading the error clears it, so the caller is expected to tear
    /// the listener down on the first `NotConnected`.
    fn state(&self) -> SocketState {
        match self.inner.as_ref() {
            Some(listener) => listener_state(listener.take_error()),
            None => SocketState::NotConnected,
        }
    }

    fn has_pending_connection(&mut self) -> io::Result<bool> {
        if self.stashed.is_some() {
            return Ok(true);
        }
        let Some(listener) = self.inner.as_ref() else {
            return Ok(false);
        };
        match listener.accept() {
            Ok(pair) => {
                self.stashed = Some(pair);
                Ok(true)
            }
            Err(e) if would_block(&e) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn accept(&mut self) -> io::Result<Option<Accepted>> {
        if let Some((stream, peer_addr)) = self.stashed.take() {
            return Ok(Some(self.wrap(stream, peer_addr)));
        }
        let Some(listener) = self.inner.as_ref() else {
            return Ok(None);
        };
        match listener.accept() {
            Ok((stream, peer_addr)) => Ok(Some(self.wrap(stream, peer_addr))),
            Err(e) if would_block(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        match self.inner.as_ref() {
            Some(listener) => listener.local_addr(),
            None => Err(io::ErrorKind::NotConnected.into()),
        }
    }

    fn close(&mut self) {
        // a stashed stream was never handed out, dropping it resets the peer
        self.stashed = None;
        if let Some(mut listener) = self.inner.take() {
            if let Some(registry) = self.registry.take() {
                let _ = registry.deregister(&mut listener);
            }
        }
    }

    fn register(&mut self, registry: &Registry, token: Token) -> io::Result<()> {
        let Some(listener) = self.inner.as_mut() else {
            return Ok(());
        };
        if let Some(previous) = self.registry.take() {
            let _ = previous.deregister(listener);
        }
        registry.register(listener, token, Interest::READABLE)?;
        self.registry = Some(registry.try_clone()?);
        Ok(())
    }
}

/// mio-backed [`Connection`].
///
/// Pending data is measured by peeking into a scratch buffer of the
/// configured size, so a single report never exceeds that size.
pub struct TcpConnectionSocket {
    stream: Option<TcpStream>,
    registry: Option<Registry>,
    peer_closed: bool,
    scratch: Vec<u8>,
}

impl TcpConnectionSocket {
    pub fn new(stream: TcpStream, rw_buffer_size: usize) -> Self {
        Self {
            stream: Some(stream),
            registry: None,
            peer_closed: false,
            scratch: vec![0; rw_buffer_size.max(1)],
        }
    }
}

impl Connection for TcpConnectionSocket {
    fn state(&self) -> SocketState {
        if self.stream.is_some() && !self.peer_closed {
            SocketState::Connected
        } else {
            SocketState::NotConnected
        }
    }

    fn set_nonblocking(&mut self) -> io::Result<()> {
        // mio streams are created non-blocking
        Ok(())
    }

    fn pending_data(&mut self) -> io::Result<usize> {
        let Some(stream) = self.stream.as_ref() else {
            return Ok(0);
        };
        if self.peer_closed {
            return Ok(0);
        }
        match stream.peek(&mut self.scratch) {
            Ok(0) => {
                self.peer_closed = true;
                Ok(0)
            }
            Ok(n) => Ok(n),
            Err(e) if would_block(&e) => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(io::ErrorKind::NotConnected.into());
        };
        match stream.read(buf) {
            Ok(0) if !buf.is_empty() => {
                self.peer_closed = true;
                Err(io::ErrorKind::UnexpectedEof.into())
            }
            Ok(n) => Ok(n),
            Err(e) if would_block(&e) => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(io::ErrorKind::NotConnected.into());
        };
        match stream.write(buf) {
            Err(e) if would_block(&e) => Ok(0),
            other => other,
        }
    }

    fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Some(registry) = self.registry.take() {
                let _ = registry.deregister(&mut stream);
            }
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    fn register(&mut self, registry: &Registry, token: Token) -> io::Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(());
        };
        if let Some(previous) = self.registry.take() {
            let _ = previous.deregister(stream);
        }
        registry.register(stream, token, Interest::READABLE)?;
        self.registry = Some(registry.try_clone()?);
        Ok(())
    }
}

impl Drop for TcpConnectionSocket {
    fn drop(&mut self) {
        self.close();
    }
}

fn listener_state(pending_error: io::Result<Option<io::Error>>) -> SocketState {
    match pending_error {
        Ok(None) => SocketState::Connected,
        Ok(Some(e)) | Err(e) => {
            debug!(error = %e, "listener reported a socket error");
            SocketState::NotConnected
        }
    }
}

fn would_block(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}
