//! TCP servers and their client sessions.
//!
//! A [`Server`] owns one listener and the sessions accepted from it. The
//! polling thread services each server once per sweep:
//!
//! ```text
//! Server::service()
//!   listener connected? ──no──▶ teardown()
//!        │                        - fire before-close hooks (once)
//!        │ yes                    - close listener
//!        ▼                        - close + evict every session
//!   accept one pending connection     - on_disconnected per session
//!        - derive SocketName from the peer address
//!        - same name already present? close it, on_disconnected
//!        - insert ClientSession, on_connected
//!        ▼
//!   drain every session
//!        - read each pending chunk, on_data_received
//!        - not connected / read failed? close, on_disconnected
//!        - evict the lost sessions
//! ```
//!
//! Server states move one way only:
//!
//! ```text
//! Listening ──▶ Closing ──▶ Closed
//! ```
//!
//! A closed server cannot listen again; bind a new one to reuse the address.
//!
//! ## Shared access
//!
//! Servers are shared between the host (through the `Arc<Server>` handed out
//! on creation) and the polling thread. Mutable socket state sits behind a
//! per-server mutex that the polling thread holds while servicing; host-side
//! queries take it briefly. Proxy hooks run while it is held, so a hook must
//! never call back into its server.

pub mod config;
pub mod session;
pub mod traits;

use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::error::{NetworkError, Result};
use crate::net::socket::{bind_listener, Listener, SocketState};
use crate::poll::PollHandle;
use crate::utils::lock;
use config::ServerConfig;
use session::ClientSession;
use traits::{ClientProxy, SocketName};

/// Observer run once, right before a server releases its sockets.
pub type BeforeCloseHook = Box<dyn Fn(&Server) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServerState {
    Listening = 0,
    Closing = 1,
    Closed = 2,
}

impl ServerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ServerState::Listening,
            1 => ServerState::Closing,
            _ => ServerState::Closed,
        }
    }
}

/// A listening endpoint and the sessions accepted from it.
pub struct Server {
    name: SocketName,
    config: ServerConfig,
    local_addr: SocketAddr,
    proxy: Arc<dyn ClientProxy>,
    state: AtomicU8,
    close_requested: AtomicBool,
    before_close: Mutex<Vec<BeforeCloseHook>>,
    io: Mutex<ServerIo>,
}

struct ServerIo {
    listener: Option<Box<dyn Listener>>,
    // id of the poller the sockets are registered with
    registered_with: Option<u64>,
    sessions: HashMap<SocketName, ClientSession>,
}

impl Server {
    /// Binds a listener for `config` and wraps it in a listening server.
    pub fn bind(config: ServerConfig, proxy: Arc<dyn ClientProxy>) -> Result<Self> {
        let addr = config.socket_addr();
        let listener =
            bind_listener(&config).map_err(|source| NetworkError::Bind { addr, source })?;
        Self::from_listener(Box::new(listener), config, proxy)
    }

    /// Wraps an already bound and listening socket.
    pub fn from_listener(
        listener: Box<dyn Listener>,
        config: ServerConfig,
        proxy: Arc<dyn ClientProxy>,
    ) -> Result<Self> {
        let local_addr = listener.local_addr()?;
        let name = SocketName::from(local_addr);
        info!(server = %name, buffer_size = config.rw_buffer_size, "listener bound");

        Ok(Self {
            name,
            config,
            local_addr,
            proxy,
            state: AtomicU8::new(ServerState::Listening as u8),
            close_requested: AtomicBool::new(false),
            before_close: Mutex::new(Vec::new()),
            io: Mutex::new(ServerIo {
                listener: Some(listener),
                registered_with: None,
                sessions: HashMap::new(),
            }),
        })
    }

    pub fn name(&self) -> &SocketName {
        &self.name
    }

    /// The ip the server was asked to bind.
    pub fn ip(&self) -> IpAddr {
        self.config.ip
    }

    /// The bound port, resolved when an ephemeral port was requested.
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn rw_buffer_size(&self) -> usize {
        self.config.rw_buffer_size
    }

    pub fn state(&self) -> ServerState {
        ServerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_listening(&self) -> bool {
        self.state() == ServerState::Listening
    }

    pub fn session_count(&self) -> usize {
        lock(&self.io).sessions.len()
    }

    pub fn session_names(&self) -> Vec<SocketName> {
        lock(&self.io).sessions.keys().cloned().collect()
    }

    /// Adds an observer for the Listening -> Closing transition.
    ///
    /// Hooks run on the thread performing the teardown, in registration
    /// order, while the listener and sessions are still open. Hooks added
    /// after the transition never run.
    pub fn on_before_close<F>(&self, hook: F)
    where
        F: Fn(&Server) + Send + Sync + 'static,
    {
        lock(&self.before_close).push(Box::new(hook));
    }

    /// Makes the listener report not-connected; the polling thread tears the
    /// server down on its next sweep.
    pub fn close(&self) {
        self.close_requested.store(true, Ordering::Release);
    }

    /// Queues `data` on a session and flushes what the socket takes without
    /// blocking.
    ///
    /// Must not be called from a proxy hook; hooks queue on the session they
    /// are handed instead.
    pub fn send_to(&self, name: &SocketName, data: &[u8]) -> Result<usize> {
        let mut io = lock(&self.io);
        let session = io
            .sessions
            .get_mut(name)
            .ok_or_else(|| NetworkError::SessionNotFound(name.clone()))?;
        session.queue_send(data);
        session.flush()
    }

    /// One sweep step for this server. Returns the number of bytes received.
    pub(crate) fn service(&self, poll: &mut PollHandle) -> usize {
        if self.state() != ServerState::Listening {
            return 0;
        }

        let mut io = lock(&self.io);
        let listening = !self.close_requested.load(Ordering::Acquire)
            && io
                .listener
                .as_ref()
                .is_some_and(|listener| listener.state() == SocketState::Connected);
        if !listening {
            drop(io);
            self.teardown();
            return 0;
        }

        if io.registered_with != Some(poll.id()) {
            self.register_sockets(&mut io, poll);
        }
        self.accept_pending(&mut io, poll);
        self.drain_sessions(&mut io)
    }

    /// Registers the listener and every session with `poll`. Runs again
    /// whenever the engine is restarted with a new poller.
    fn register_sockets(&self, io: &mut ServerIo, poll: &mut PollHandle) {
        io.registered_with = Some(poll.id());
        if let Some(listener) = io.listener.as_mut() {
            let token = poll.next_token();
            if let Err(e) = listener.register(poll.registry(), token) {
                warn!(server = %self.name, error = %e, "failed to register listener with poller");
            }
        }
        for (name, session) in io.sessions.iter_mut() {
            let token = poll.next_token();
            if let Err(e) = session.register(poll.registry(), token) {
                debug!(session = %name, error = %e, "failed to register connection with poller");
            }
        }
    }

    fn accept_pending(&self, io: &mut ServerIo, poll: &mut PollHandle) {
        let Some(listener) = io.listener.as_mut() else {
            return;
        };

        match listener.has_pending_connection() {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                debug!(server = %self.name, error = %e, "pending connection query failed");
                return;
            }
        }

        let accepted = match listener.accept() {
            Ok(Some(accepted)) => accepted,
            Ok(None) => return,
            Err(e) => {
                debug!(server = %self.name, error = %e, "accept failed");
                return;
            }
        };

        let name = SocketName::from(accepted.peer_addr);
        let mut connection = accepted.connection;
        if let Err(e) = connection.set_nonblocking() {
            warn!(server = %self.name, session = %name, error = %e, "could not make connection non-blocking");
            connection.close();
            return;
        }
        let token = poll.next_token();
        if let Err(e) = connection.register(poll.registry(), token) {
            debug!(session = %name, error = %e, "failed to register connection with poller");
        }

        if let Some(mut prior) = io.sessions.remove(&name) {
            info!(server = %self.name, session = %name, "replacing session with the same name");
            if prior.close() {
                self.notify_disconnected(&name, &mut prior);
            }
        }

        info!(server = %self.name, session = %name, "client connected");
        let session = io
            .sessions
            .entry(name.clone())
            .or_insert(ClientSession::new(name.clone(), accepted.peer_addr, connection));
        if let Err(e) = self.proxy.on_connected(&name, session) {
            warn!(session = %name, error = %e, "on_connected hook failed");
        }
    }

    fn drain_sessions(&self, io: &mut ServerIo) -> usize {
        let mut moved = 0;
        let mut lost = Vec::new();

        for (name, session) in io.sessions.iter_mut() {
            let drained = session.drain(&*self.proxy);
            moved += drained.bytes;
            if drained.lost {
                info!(server = %self.name, session = %name, "client disconnected");
                self.notify_disconnected(name, session);
                lost.push(name.clone());
            }
        }

        for name in lost {
            io.sessions.remove(&name);
        }
        moved
    }

    /// Closes the listener and every session. Runs the before-close hooks
    /// and the rest of the teardown only on the first call; returns whether
    /// this call performed it.
    pub(crate) fn teardown(&self) -> bool {
        if self
            .state
            .compare_exchange(
                ServerState::Listening as u8,
                ServerState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return false;
        }

        info!(server = %self.name, "closing server");
        let hooks = std::mem::take(&mut *lock(&self.before_close));
        for hook in &hooks {
            hook(self);
        }

        let mut io = lock(&self.io);
        if let Some(mut listener) = io.listener.take() {
            listener.close();
        }
        let sessions: Vec<_> = io.sessions.drain().collect();
        for (name, mut session) in sessions {
            if session.close() {
                self.notify_disconnected(&name, &mut session);
            }
        }
        drop(io);

        self.state
            .store(ServerState::Closed as u8, Ordering::Release);
        info!(server = %self.name, "server closed");
        true
    }

    fn notify_disconnected(&self, name: &SocketName, session: &mut ClientSession) {
        if let Err(e) = self.proxy.on_disconnected(name, session) {
            warn!(session = %name, error = %e, "on_disconnected hook failed");
        }
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("name", &self.name)
            .field("local_addr", &self.local_addr)
            .field("rw_buffer_size", &self.config.rw_buffer_size)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
