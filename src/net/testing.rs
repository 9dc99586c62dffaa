//! Scripted sockets and a recording proxy for unit tests.

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{NetworkError, Result};
use crate::net::socket::{Accepted, Connection, Listener, SocketState};
use crate::net::tcp::session::ClientSession;
use crate::net::tcp::traits::{ClientProxy, SocketName};

enum Step {
    Data(Vec<u8>),
    RecvError,
}

#[derive(Default)]
struct ConnectionState {
    script: Mutex<VecDeque<Step>>,
    sent: Mutex<Vec<u8>>,
    disconnected: AtomicBool,
    closes: AtomicUsize,
    recv_calls: AtomicUsize,
}

/// Connection whose pending data is a queue of scripted chunks.
#[derive(Clone, Default)]
pub(crate) struct FakeConnection {
    state: Arc<ConnectionState>,
}

impl FakeConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_data(&self, data: &[u8]) {
        self.state.script.lock().unwrap().push_back(Step::Data(data.to_vec()));
    }

    pub fn push_recv_error(&self) {
        self.state.script.lock().unwrap().push_back(Step::RecvError);
    }

    pub fn disconnect(&self) {
        self.state.disconnected.store(true, Ordering::SeqCst);
    }

    pub fn close_count(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    pub fn recv_calls(&self) -> usize {
        self.state.recv_calls.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<u8> {
        self.state.sent.lock().unwrap().clone()
    }
}

impl Connection for FakeConnection {
    fn state(&self) -> SocketState {
        if self.state.disconnected.load(Ordering::SeqCst) || self.close_count() > 0 {
            SocketState::NotConnected
        } else {
            SocketState::Connected
        }
    }

    fn set_nonblocking(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn pending_data(&mut self) -> io::Result<usize> {
        Ok(match self.state.script.lock().unwrap().front() {
            Some(Step::Data(data)) => data.len(),
            Some(Step::RecvError) => 1,
            None => 0,
        })
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.state.recv_calls.fetch_add(1, Ordering::SeqCst);
        match self.state.script.lock().unwrap().pop_front() {
            Some(Step::Data(data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                Ok(n)
            }
            Some(Step::RecvError) => Err(io::ErrorKind::ConnectionReset.into()),
            None => Ok(0),
        }
    }

    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.state.sent.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn close(&mut self) {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
    }
}

struct ListenerState {
    local_addr: SocketAddr,
    queue: Mutex<VecDeque<Option<(SocketAddr, FakeConnection)>>>,
    disconnected: AtomicBool,
    closes: AtomicUsize,
}

/// Listener whose pending connections are queued by the test.
#[derive(Clone)]
pub(crate) struct FakeListener {
    state: Arc<ListenerState>,
}

impl FakeListener {
    pub fn new() -> Self {
        Self::with_addr("127.0.0.1:9000")
    }

    pub fn with_addr(local_addr: &str) -> Self {
        Self {
            state: Arc::new(ListenerState {
                local_addr: local_addr.parse().unwrap(),
                queue: Mutex::default(),
                disconnected: AtomicBool::new(false),
                closes: AtomicUsize::new(0),
            }),
        }
    }

    pub fn push_connection(&self, peer_addr: &str) -> FakeConnection {
        let conn = FakeConnection::new();
        let addr = peer_addr.parse().unwrap();
        self.state
            .queue
            .lock()
            .unwrap()
            .push_back(Some((addr, conn.clone())));
        conn
    }

    /// Queues a pending connection whose accept yields no handle.
    pub fn push_unusable(&self) {
        self.state.queue.lock().unwrap().push_back(None);
    }

    pub fn disconnect(&self) {
        self.state.disconnected.store(true, Ordering::SeqCst);
    }

    pub fn close_count(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }
}

impl Listener for FakeListener {
    fn state(&self) -> SocketState {
        if self.state.disconnected.load(Ordering::SeqCst) || self.close_count() > 0 {
            SocketState::NotConnected
        } else {
            SocketState::Connected
        }
    }

    fn has_pending_connection(&mut self) -> io::Result<bool> {
        Ok(!self.state.queue.lock().unwrap().is_empty())
    }

    fn accept(&mut self) -> io::Result<Option<Accepted>> {
        Ok(self
            .state
            .queue
            .lock()
            .unwrap()
            .pop_front()
            .flatten()
            .map(|(peer_addr, conn)| Accepted {
                connection: Box::new(conn),
                peer_addr,
            }))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.state.local_addr)
    }

    fn close(&mut self) {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RecordedEvent {
    Connected(SocketName),
    Data(SocketName, Vec<u8>),
    Disconnected(SocketName),
}

/// Proxy that records every hook invocation.
#[derive(Default)]
pub(crate) struct Recorder {
    events: Mutex<Vec<RecordedEvent>>,
    fail: bool,
}

impl Recorder {
    pub fn failing() -> Self {
        Self {
            events: Mutex::default(),
            fail: true,
        }
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                RecordedEvent::Data(_, data) => Some(data),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: RecordedEvent) -> Result<()> {
        self.events.lock().unwrap().push(event);
        if self.fail {
            return Err(NetworkError::Handler("recorder told to fail".into()));
        }
        Ok(())
    }
}

impl ClientProxy for Recorder {
    fn on_connected(&self, name: &SocketName, _session: &mut ClientSession) -> Result<()> {
        self.record(RecordedEvent::Connected(name.clone()))
    }

    fn on_data_received(&self, name: &SocketName, session: &mut ClientSession) -> Result<()> {
        self.record(RecordedEvent::Data(name.clone(), session.received().to_vec()))
    }

    fn on_disconnected(&self, name: &SocketName, _session: &mut ClientSession) -> Result<()> {
        self.record(RecordedEvent::Disconnected(name.clone()))
    }
}
