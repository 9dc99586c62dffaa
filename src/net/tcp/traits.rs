use crate::error::Result;
use crate::net::tcp::session::ClientSession;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

/// Identity derived from a network address.
///
/// Sessions are keyed by their peer address and servers by their bound local
/// address, both rendered as `ip:port`. Two connections from the same peer
/// address derive the same name, which is what makes replacement possible.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SocketName(Arc<str>);

impl SocketName {
    pub fn new(name: impl AsRef<str>) -> Self {
        SocketName(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<SocketAddr> for SocketName {
    fn from(addr: SocketAddr) -> Self {
        SocketName::new(addr.to_string())
    }
}

impl From<&str> for SocketName {
    fn from(name: &str) -> Self {
        SocketName::new(name)
    }
}

impl fmt::Display for SocketName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Receiver of connection events for one or more servers.
///
/// Every method has a default that does nothing, so an implementation binds
/// only the hooks it cares about.
///
/// ## Execution Context
///
/// Hooks run synchronously on the polling thread, in the order bytes were
/// read. A slow hook stalls every server on the engine; hand heavy work to
/// another thread (see [`ChannelProxy`](crate::event::ChannelProxy)).
/// Hooks must not call back into the owning [`Server`](super::Server), whose
/// state is locked for the duration of the call.
///
/// ## Error Handling
///
/// An `Err` returned from a hook is logged and otherwise ignored. Session
/// lifetime is decided by the socket alone.
pub trait ClientProxy: Send + Sync + 'static {
    /// Called once a newly accepted session is registered.
    fn on_connected(&self, name: &SocketName, session: &mut ClientSession) -> Result<()> {
        let _ = (name, session);
        Ok(())
    }

    /// Called after every successful read; the bytes are in
    /// [`ClientSession::received`].
    fn on_data_received(&self, name: &SocketName, session: &mut ClientSession) -> Result<()> {
        let _ = (name, session);
        Ok(())
    }

    /// Called exactly once when a session closes, after its socket is released.
    fn on_disconnected(&self, name: &SocketName, session: &mut ClientSession) -> Result<()> {
        let _ = (name, session);
        Ok(())
    }
}

/// Proxy with no hooks bound.
#[derive(Debug, Default, Clone)]
pub struct NoOpProxy;

impl ClientProxy for NoOpProxy {}
