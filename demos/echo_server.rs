use std::io::BufRead;
use std::sync::Arc;

use asyncnet::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// echoes every chunk back to the client that sent it.
struct EchoProxy;

impl ClientProxy for EchoProxy {
    fn on_connected(&self, name: &SocketName, session: &mut ClientSession) -> Result<()> {
        info!(client = %name, peer = %session.peer_addr(), "client connected");
        Ok(())
    }

    fn on_data_received(&self, name: &SocketName, session: &mut ClientSession) -> Result<()> {
        let data = session.received().to_vec();
        info!(
            client = %name,
            bytes = data.len(),
            text = %String::from_utf8_lossy(&data).trim_end(),
            "received"
        );

        session.queue_send(&data);
        session.flush()?;
        Ok(())
    }

    fn on_disconnected(&self, name: &SocketName, session: &mut ClientSession) -> Result<()> {
        info!(client = %name, total = session.bytes_received(), "client disconnected");
        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let net = AsyncNet::default();
    let server = net.create_server(Arc::new(EchoProxy), "127.0.0.1", 8080, 64 * 1024)?;
    server.on_before_close(|server| {
        info!(server = %server.name(), sessions = server.session_count(), "shutting down");
    });

    net.start()?;
    info!("echo server listening on {}, press enter to stop", server.local_addr());

    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;

    net.stop();
    Ok(())
}
