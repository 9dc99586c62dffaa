//! # AsyncNet
//! A minimal multi-server TCP engine. It accepts connections on any number of
//! listening sockets, keeps a registry of connected clients per server, drains
//! incoming bytes without blocking and hands them to a callback interface, all
//! from one dedicated background thread so the host's own threads never wait
//! on socket I/O.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────┐    ┌──────────────┐    ┌────────────────┐
//! │  AsyncNet   │───▶│   Reactor    │───▶│ ServerRegistry │
//! │  (facade)   │    │ (poll thread)│    │   (lockfree)   │
//! └─────────────┘    └──────────────┘    └────────────────┘
//!                            │                    │
//!                            ▼                    ▼
//!                    ┌──────────────┐    ┌────────────────┐
//!                    │  PollHandle  │    │ Server ──▶     │
//!                    │ (idle waits) │    │ ClientSession  │
//!                    └──────────────┘    └────────────────┘
//! ```
//!
//! The [`Reactor`](reactor::Reactor) sweeps every registered server, accepting
//! new sessions and draining existing ones, then paces itself: a sweep that
//! moved more than a threshold of bytes yields and sweeps again, a quieter one
//! waits up to a millisecond for socket readiness.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use asyncnet::net::tcp::{session::ClientSession, traits::{ClientProxy, SocketName}};
//! use asyncnet::{error::Result, AsyncNet};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl ClientProxy for Printer {
//!     fn on_data_received(&self, name: &SocketName, session: &mut ClientSession) -> Result<()> {
//!         println!("{name}: {:?}", session.received());
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> Result<()> {
//!     let net = AsyncNet::default();
//!     let server = net.create_server(Arc::new(Printer), "127.0.0.1", 9000, 64 * 1024)?;
//!     server.on_before_close(|server| println!("{} closing", server.name()));
//!
//!     net.start()?;
//!     // ... host application runs ...
//!     net.stop();
//!     Ok(())
//! }
//! ```
//!
//! - [`AsyncNet`]: server creation and engine lifecycle
//! - [`net::tcp::traits::ClientProxy`]: hooks invoked on connect, data and disconnect
//! - [`net::socket`]: the socket contract the engine drives
//! - [`reactor`]: the polling loop
//! - [`event`]: channel-based proxy for handing data to other threads

pub mod config;
pub mod error;
pub mod event;
pub mod net;
pub mod poll;
pub mod reactor;
pub mod registry;
mod utils;

use std::sync::{Arc, Mutex};
use std::thread::{Builder, JoinHandle};

use tracing::{info, warn};

pub use config::EngineConfig;
pub use event::{AsyncMsg, ChannelProxy};
pub use net::tcp::config::ServerConfig;
pub use net::tcp::{Server, ServerState};

use crate::{
    error::{NetworkError, Result},
    net::tcp::traits::{ClientProxy, SocketName},
    reactor::{Reactor, ShutdownHandle},
    registry::ServerRegistry,
    utils::lock,
};

/// Handle to a server created by [`AsyncNet::create_server`].
pub type ServerHandle = Arc<Server>;

/// A convenient prelude module that re-exports commonly used types and traits.
///
/// ```rust
/// use asyncnet::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{NetworkError, Result};
    pub use crate::event::{AsyncMsg, ChannelProxy};
    pub use crate::net::errors::NetworkEvent;
    pub use crate::net::tcp::session::ClientSession;
    pub use crate::net::tcp::traits::{ClientProxy, NoOpProxy, SocketName};
    pub use crate::{AsyncNet, EngineConfig, Server, ServerConfig, ServerHandle, ServerState};
}

struct Worker {
    shutdown: ShutdownHandle,
    thread: JoinHandle<()>,
}

impl Worker {
    fn is_alive(&self) -> bool {
        !self.thread.is_finished()
    }

    fn join(self) {
        self.shutdown.shutdown();
        if self.thread.join().is_err() {
            warn!("polling thread panicked");
        }
    }
}

/// The engine facade: a registry of named servers plus the polling thread
/// that services them.
///
/// Servers may be created before or after [`start`](Self::start); the
/// polling thread picks new ones up on its next sweep. Dropping the facade
/// stops the thread and closes every server still listening, firing their
/// before-close hooks and disconnect callbacks.
///
/// ## Example
///
/// ```rust,no_run
/// use asyncnet::{AsyncNet, EngineConfig};
/// use asyncnet::net::NoOpProxy;
/// use std::{sync::Arc, time::Duration};
///
/// let net = AsyncNet::new(
///     EngineConfig::builder()
///         .pacing_threshold(4096)
///         .idle_sleep(Duration::from_micros(500))
///         .build(),
/// );
/// net.create_server(Arc::new(NoOpProxy), "", 9000, 64 * 1024)?;
/// net.start()?;
/// # Ok::<(), asyncnet::error::NetworkError>(())
/// ```
pub struct AsyncNet {
    config: EngineConfig,
    servers: Arc<ServerRegistry>,
    worker: Mutex<Option<Worker>>,
}

impl Default for AsyncNet {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl AsyncNet {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            servers: Arc::new(ServerRegistry::new()),
            worker: Mutex::new(None),
        }
    }

    /// Binds a listener on `ip:port` and registers a server for it.
    ///
    /// An empty `ip` binds every IPv4 interface. `rw_buffer_size` sizes the
    /// listener's send and receive buffers and each read.
    ///
    /// ## Errors
    ///
    /// Returns an error, and registers nothing, if:
    /// - `ip` is not a valid address
    /// - the listener cannot be bound
    /// - a live server already owns the resulting name
    pub fn create_server(
        &self,
        proxy: Arc<dyn ClientProxy>,
        ip: &str,
        port: u16,
        rw_buffer_size: usize,
    ) -> Result<ServerHandle> {
        let config = ServerConfig::from_ip(ip, port, rw_buffer_size)?;
        self.create_server_with(proxy, config)
    }

    /// Like [`create_server`](Self::create_server) with full control over the
    /// listener configuration.
    pub fn create_server_with(
        &self,
        proxy: Arc<dyn ClientProxy>,
        config: ServerConfig,
    ) -> Result<ServerHandle> {
        self.add_server(Server::bind(config, proxy)?)
    }

    /// Registers a server built around an already listening socket.
    pub fn add_server(&self, server: Server) -> Result<ServerHandle> {
        let server = self.servers.insert(server)?;
        info!(server = %server.name(), "server registered");
        Ok(server)
    }

    pub fn server(&self, name: &SocketName) -> Option<ServerHandle> {
        self.servers.get(name)
    }

    pub fn servers(&self) -> Vec<ServerHandle> {
        self.servers.snapshot()
    }

    /// Spawns the polling thread. A thread that died from a panicking proxy
    /// hook is reaped and replaced.
    ///
    /// ## Errors
    ///
    /// - [`NetworkError::AlreadyRunning`] if the thread is already running
    /// - [`NetworkError::Io`] if the poller or the thread cannot be created
    pub fn start(&self) -> Result<()> {
        let mut worker = lock(&self.worker);
        if worker.as_ref().is_some_and(Worker::is_alive) {
            return Err(NetworkError::AlreadyRunning);
        }
        if let Some(dead) = worker.take() {
            dead.join();
        }

        let mut reactor = Reactor::new(self.servers.clone(), self.config.clone())?;
        let shutdown = reactor.get_shutdown_handle();
        let thread = Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || reactor.run())?;

        *worker = Some(Worker { shutdown, thread });
        Ok(())
    }

    /// Requests a stop and joins the polling thread. Servers stay registered
    /// and resume on the next [`start`](Self::start). Does nothing if the
    /// thread is not running.
    pub fn stop(&self) {
        if let Some(worker) = lock(&self.worker).take() {
            worker.join();
        }
    }

    /// `false` once stopped, or after a proxy hook panicked on the polling
    /// thread.
    pub fn is_running(&self) -> bool {
        lock(&self.worker).as_ref().is_some_and(Worker::is_alive)
    }
}

impl Drop for AsyncNet {
    fn drop(&mut self) {
        self.stop();
        for server in self.servers.snapshot() {
            server.teardown();
            self.servers.evict_closed(&server);
        }
    }
}
