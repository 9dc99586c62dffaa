//! Hands every connection event to the main thread over a channel.
//!
//! Try it with `nc 127.0.0.1 8081` and type a few lines; send `quit` to stop.

use std::sync::Arc;

use asyncnet::prelude::*;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let (proxy, events) = ChannelProxy::new();
    let net = AsyncNet::default();
    let server = net.create_server(Arc::new(proxy), "127.0.0.1", 8081, 64 * 1024)?;
    net.start()?;
    info!("consuming events from {}", server.local_addr());

    for event in events {
        match event {
            NetworkEvent::Connected(name, peer) => info!(client = %name, %peer, "connected"),
            NetworkEvent::Data(AsyncMsg { session_name, data }) => {
                let text = String::from_utf8_lossy(&data);
                info!(client = %session_name, text = %text.trim_end(), "data");
                if text.trim() == "quit" {
                    break;
                }
                if let Err(e) = server.send_to(&session_name, b"ok\n") {
                    warn!(client = %session_name, error = %e, "reply failed");
                }
            }
            NetworkEvent::Disconnected(name) => info!(client = %name, "disconnected"),
        }
    }

    net.stop();
    Ok(())
}
