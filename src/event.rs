use std::sync::mpsc::{channel, Receiver, Sender};

use crate::error::{NetworkError, Result};
use crate::net::errors::NetworkEvent;
use crate::net::tcp::session::ClientSession;
use crate::net::tcp::traits::{ClientProxy, SocketName};

/// Bytes received from one session, detached from the polling thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncMsg {
    pub session_name: SocketName,
    pub data: Vec<u8>,
}

/// Proxy that forwards every event over a channel so the consumer does its
/// work on its own thread and the polling loop never waits on it.
#[derive(Debug, Clone)]
pub struct ChannelProxy {
    sender: Sender<NetworkEvent>,
}

impl ChannelProxy {
    pub fn new() -> (Self, Receiver<NetworkEvent>) {
        let (sender, receiver) = channel();
        (Self { sender }, receiver)
    }

    fn forward(&self, event: NetworkEvent) -> Result<()> {
        self.sender
            .send(event)
            .map_err(|_| NetworkError::Handler("event receiver dropped".to_string()))
    }
}

impl ClientProxy for ChannelProxy {
    fn on_connected(&self, name: &SocketName, session: &mut ClientSession) -> Result<()> {
        self.forward(NetworkEvent::Connected(name.clone(), session.peer_addr()))
    }

    fn on_data_received(&self, name: &SocketName, session: &mut ClientSession) -> Result<()> {
        self.forward(NetworkEvent::Data(AsyncMsg {
            session_name: name.clone(),
            data: session.received().to_vec(),
        }))
    }

    fn on_disconnected(&self, name: &SocketName, _session: &mut ClientSession) -> Result<()> {
        self.forward(NetworkEvent::Disconnected(name.clone()))
    }
}
