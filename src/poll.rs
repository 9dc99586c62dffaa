use std::{
    io,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use mio::{Events, Poll, Registry, Token, Waker};

pub const WAKE_TOKEN: Token = Token(0);

static NEXT_POLL_ID: AtomicU64 = AtomicU64::new(1);

/// The engine's poller.
///
/// Sockets are registered so an idle wait returns as soon as any of them
/// becomes readable; the sweep itself never depends on the reported events.
pub struct PollHandle {
    id: u64,
    poller: Poll,
    events: Events,
    waker: Arc<Waker>,
    next_token: usize,
}

impl PollHandle {
    pub fn new(events_capacity: usize) -> io::Result<Self> {
        let poller = Poll::new()?;
        let waker = Waker::new(poller.registry(), WAKE_TOKEN)?;
        Ok(PollHandle {
            id: NEXT_POLL_ID.fetch_add(1, Ordering::Relaxed),
            poller,
            events: Events::with_capacity(events_capacity.max(1)),
            waker: Arc::new(waker),
            next_token: WAKE_TOKEN.0 + 1,
        })
    }

    /// Distinguishes pollers so sockets know when they must register again.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn registry(&self) -> &Registry {
        self.poller.registry()
    }

    pub fn next_token(&mut self) -> Token {
        let token = Token(self.next_token);
        self.next_token = self.next_token.checked_add(1).unwrap_or(WAKE_TOKEN.0 + 1);
        token
    }

    pub fn waker(&self) -> Arc<Waker> {
        self.waker.clone()
    }

    /// Blocks for at most `timeout`, returning the number of readiness events.
    pub fn wait(&mut self, timeout: Duration) -> io::Result<usize> {
        match self.poller.poll(&mut self.events, Some(timeout)) {
            Ok(()) => Ok(self.events.iter().count()),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(0),
            Err(e) => Err(e),
        }
    }

    pub fn wake(&self) -> io::Result<()> {
        self.waker.wake()
    }
}
