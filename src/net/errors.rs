use crate::net::tcp::traits::SocketName;
use std::io;
use std::net::SocketAddr;

/// Errors surfaced to the host by the engine facade and server handles.
///
/// Socket failures inside the polling loop never reach this type: they are
/// scoped to the session or server that produced them and only logged.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),

    #[error("Bind Error: could not listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Invalid bind address {0:?}")]
    InvalidAddress(String),

    #[error("Server {0} is already listening")]
    ServerExists(SocketName),

    #[error("Polling engine is already running")]
    AlreadyRunning,

    #[error("Session {0} not found")]
    SessionNotFound(SocketName),

    #[error("Handler Error: {0}")]
    Handler(String),
}

/// Connection lifecycle notifications, as forwarded by
/// [`ChannelProxy`](crate::event::ChannelProxy).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    Connected(SocketName, SocketAddr),
    Data(crate::event::AsyncMsg),
    Disconnected(SocketName),
}
