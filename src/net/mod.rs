//! Networking layer driven by the polling engine.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Host Application                       │
//! │  ┌──────────────┐          ┌─────────────────┐              │
//! │  │   AsyncNet   │          │   Your Proxy    │              │
//! │  │ create_server│          │  (ClientProxy)  │              │
//! │  └──────┬───────┘          └────────▲────────┘              │
//! └─────────┼───────────────────────────┼───────────────────────┘
//!           │ insert                    │ on_connected
//!           ▼                           │ on_data_received
//! ┌─────────────────────────────────────┼───────────────────────┐
//! │                 Polling thread      │ on_disconnected       │
//! │  ┌──────────────┐    ┌──────────────┴──┐    ┌────────────┐  │
//! │  │ServerRegistry│──▶│ Server::service │──▶│ClientSession│  │
//! │  │  (lockfree)  │    │ accept / drain  │    │   drain    │  │
//! │  └──────────────┘    └─────────────────┘    └────────────┘  │
//! └────────────┬────────────────────────────────────────────────┘
//!              │ Listener / Connection traits
//!              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │           mio non-blocking sockets (socket2 listeners)      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The polling thread sweeps every server in turn. Each sweep accepts at most
//! one pending connection per server, then drains every session of that
//! server, handing each read to the server's proxy. Nothing in a sweep
//! blocks: accepts and reads only happen after a non-blocking query reported
//! work.
//!
//! # Example
//!
//! ```rust,no_run
//! use asyncnet::net::tcp::{session::ClientSession, traits::{ClientProxy, SocketName}};
//! use asyncnet::{error::Result, AsyncNet};
//! use std::sync::Arc;
//!
//! struct Echo;
//!
//! impl ClientProxy for Echo {
//!     fn on_data_received(&self, _name: &SocketName, session: &mut ClientSession) -> Result<()> {
//!         let data = session.received().to_vec();
//!         session.queue_send(&data);
//!         session.flush()?;
//!         Ok(())
//!     }
//! }
//!
//! # fn main() -> Result<()> {
//! let net = AsyncNet::default();
//! let server = net.create_server(Arc::new(Echo), "127.0.0.1", 9000, 64 * 1024)?;
//! net.start()?;
//! println!("echoing on {}", server.local_addr());
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub mod socket;
pub mod tcp;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{NetworkError, NetworkEvent};
pub use socket::{Connection, Listener, SocketState};
pub use tcp::traits::{ClientProxy, NoOpProxy, SocketName};
