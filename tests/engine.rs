//! End-to-end tests over loopback sockets.

use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::thread;
use std::time::{Duration, Instant};

use asyncnet::net::tcp::session::ClientSession;
use asyncnet::net::tcp::traits::{ClientProxy, SocketName};
use asyncnet::prelude::*;

static TRACING: Once = Once::new();

fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn wait_until<F: FnMut() -> bool>(mut condition: F) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

#[derive(Default)]
struct Collector {
    connected: Mutex<Vec<SocketName>>,
    data: Mutex<Vec<(SocketName, Vec<u8>)>>,
    disconnected: Mutex<Vec<SocketName>>,
}

impl Collector {
    fn bytes(&self) -> Vec<u8> {
        self.data
            .lock()
            .unwrap()
            .iter()
            .flat_map(|(_, data)| data.clone())
            .collect()
    }
}

impl ClientProxy for Collector {
    fn on_connected(&self, name: &SocketName, _session: &mut ClientSession) -> Result<()> {
        self.connected.lock().unwrap().push(name.clone());
        Ok(())
    }

    fn on_data_received(&self, name: &SocketName, session: &mut ClientSession) -> Result<()> {
        self.data
            .lock()
            .unwrap()
            .push((name.clone(), session.received().to_vec()));
        Ok(())
    }

    fn on_disconnected(&self, name: &SocketName, _session: &mut ClientSession) -> Result<()> {
        self.disconnected.lock().unwrap().push(name.clone());
        Ok(())
    }
}

struct Echo;

impl ClientProxy for Echo {
    fn on_data_received(&self, _name: &SocketName, session: &mut ClientSession) -> Result<()> {
        let data = session.received().to_vec();
        session.queue_send(&data);
        session.flush()?;
        Ok(())
    }
}

fn engine_with(proxy: Arc<dyn ClientProxy>) -> (AsyncNet, ServerHandle) {
    init_tracing();
    let net = AsyncNet::default();
    let server = net.create_server(proxy, "127.0.0.1", 0, 16 * 1024).unwrap();
    net.start().unwrap();
    (net, server)
}

#[test]
fn test_ping_delivered_once() {
    let collector = Arc::new(Collector::default());
    let (net, server) = engine_with(collector.clone());

    let mut client = TcpStream::connect(server.local_addr()).unwrap();
    let client_name = SocketName::from(client.local_addr().unwrap());
    client.write_all(b"PING").unwrap();

    assert!(wait_until(|| collector.bytes() == b"PING"));
    let data = collector.data.lock().unwrap().clone();
    assert_eq!(data, vec![(client_name.clone(), b"PING".to_vec())]);
    assert_eq!(*collector.connected.lock().unwrap(), vec![client_name]);

    net.stop();
}

#[test]
fn test_server_named_after_bound_address() {
    let (net, server) = engine_with(Arc::new(NoOpProxy));

    assert_ne!(server.port(), 0);
    assert_eq!(server.name().to_string(), format!("127.0.0.1:{}", server.port()));
    assert!(Arc::ptr_eq(&net.server(server.name()).unwrap(), &server));
}

#[test]
fn test_large_payload_arrives_intact() {
    let collector = Arc::new(Collector::default());
    let (_net, server) = engine_with(collector.clone());

    let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    let mut client = TcpStream::connect(server.local_addr()).unwrap();
    client.write_all(&payload).unwrap();

    assert!(wait_until(|| collector.bytes().len() == payload.len()));
    assert_eq!(collector.bytes(), payload);
}

#[test]
fn test_client_disconnect_evicts_session() {
    let collector = Arc::new(Collector::default());
    let (_net, server) = engine_with(collector.clone());

    let client = TcpStream::connect(server.local_addr()).unwrap();
    let client_name = SocketName::from(client.local_addr().unwrap());
    assert!(wait_until(|| server.session_count() == 1));

    client.shutdown(Shutdown::Both).unwrap();
    drop(client);

    assert!(wait_until(|| server.session_count() == 0));
    assert_eq!(*collector.disconnected.lock().unwrap(), vec![client_name]);
    assert!(server.is_listening());
}

#[test]
fn test_close_fires_hook_once_and_closes_sessions() {
    let collector = Arc::new(Collector::default());
    let (net, server) = engine_with(collector.clone());
    let fired = Arc::new(AtomicUsize::new(0));
    {
        let fired = fired.clone();
        server.on_before_close(move |_| {
            fired.fetch_add(1, Ordering::SeqCst);
        });
    }

    let mut client = TcpStream::connect(server.local_addr()).unwrap();
    assert!(wait_until(|| server.session_count() == 1));

    server.close();
    assert!(wait_until(|| server.state() == ServerState::Closed));
    assert!(wait_until(|| net.server(server.name()).is_none()));
    // a few more sweeps must not fire the hook again
    thread::sleep(Duration::from_millis(20));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(collector.disconnected.lock().unwrap().len(), 1);

    client
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let mut buf = [0u8; 8];
    // the session socket was shut down, so the client sees EOF or a reset
    assert!(!matches!(client.read(&mut buf), Ok(n) if n > 0));
}

#[test]
fn test_closed_address_can_be_rebound() {
    let (net, server) = engine_with(Arc::new(NoOpProxy));
    let addr = server.local_addr();

    server.close();
    assert!(wait_until(|| server.state() == ServerState::Closed));

    let rebound = net
        .create_server(Arc::new(NoOpProxy), "127.0.0.1", addr.port(), 16 * 1024)
        .unwrap();
    assert_eq!(rebound.name(), server.name());
    assert!(rebound.is_listening());
}

#[test]
fn test_live_address_cannot_be_registered_twice() {
    let (net, server) = engine_with(Arc::new(NoOpProxy));

    let err = net
        .create_server(Arc::new(NoOpProxy), "127.0.0.1", server.port(), 16 * 1024)
        .unwrap_err();
    assert!(matches!(
        err,
        NetworkError::Bind { .. } | NetworkError::ServerExists(_)
    ));
    assert_eq!(net.servers().len(), 1);
}

#[test]
fn test_echo_through_session_send_buffer() {
    let (_net, server) = engine_with(Arc::new(Echo));

    let mut client = TcpStream::connect(server.local_addr()).unwrap();
    client
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    client.write_all(b"hello").unwrap();

    let mut buf = [0u8; 5];
    client.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"hello");
}

#[test]
fn test_send_to_from_host() {
    let (_net, server) = engine_with(Arc::new(NoOpProxy));

    let mut client = TcpStream::connect(server.local_addr()).unwrap();
    client
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let name = SocketName::from(client.local_addr().unwrap());
    assert!(wait_until(|| server.session_count() == 1));

    server.send_to(&name, b"PONG").unwrap();
    let mut buf = [0u8; 4];
    client.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"PONG");
}

#[test]
fn test_servers_are_independent() {
    let collector_a = Arc::new(Collector::default());
    let collector_b = Arc::new(Collector::default());
    init_tracing();
    let net = AsyncNet::default();
    let a = net
        .create_server(collector_a.clone(), "127.0.0.1", 0, 4096)
        .unwrap();
    let b = net
        .create_server(collector_b.clone(), "127.0.0.1", 0, 4096)
        .unwrap();
    net.start().unwrap();

    TcpStream::connect(a.local_addr()).unwrap().write_all(b"to-a").unwrap();
    TcpStream::connect(b.local_addr()).unwrap().write_all(b"to-b").unwrap();

    assert!(wait_until(|| collector_a.bytes() == b"to-a"));
    assert!(wait_until(|| collector_b.bytes() == b"to-b"));

    b.close();
    assert!(wait_until(|| b.state() == ServerState::Closed));
    assert!(a.is_listening());
}

fn ping_round_trip(server: &Server, collector: &Collector) -> Duration {
    let before = collector.bytes().len();
    let started = Instant::now();
    let mut client = TcpStream::connect(server.local_addr()).unwrap();
    client.write_all(b"PING").unwrap();
    assert!(wait_until(|| collector.bytes().len() == before + 4));
    started.elapsed()
}

#[test]
fn test_restart_keeps_sockets_waking_the_poller() {
    init_tracing();
    let collector = Arc::new(Collector::default());
    let net = AsyncNet::new(
        EngineConfig::builder()
            .idle_sleep(Duration::from_secs(2))
            .build(),
    );
    let server = net
        .create_server(collector.clone(), "127.0.0.1", 0, 16 * 1024)
        .unwrap();

    net.start().unwrap();
    // let the first sweep register the listener before connecting
    thread::sleep(Duration::from_millis(50));
    assert!(ping_round_trip(&server, &collector) < Duration::from_secs(1));

    net.stop();
    net.start().unwrap();
    thread::sleep(Duration::from_millis(50));
    assert!(ping_round_trip(&server, &collector) < Duration::from_secs(1));

    net.stop();
}

#[test]
fn test_channel_proxy_hands_off_messages() {
    let (proxy, events) = ChannelProxy::new();
    let (_net, server) = engine_with(Arc::new(proxy));

    let mut client = TcpStream::connect(server.local_addr()).unwrap();
    let name = SocketName::from(client.local_addr().unwrap());
    client.write_all(b"PING").unwrap();

    let connected = events.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(matches!(connected, NetworkEvent::Connected(ref n, _) if *n == name));

    let mut received = Vec::new();
    while received.len() < 4 {
        match events.recv_timeout(Duration::from_secs(5)).unwrap() {
            NetworkEvent::Data(AsyncMsg { session_name, data }) => {
                assert_eq!(session_name, name);
                received.extend(data);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(received, b"PING");
}
