use std::{
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
};

use mio::Waker;
use tracing::{debug, info, warn};

use crate::{config::EngineConfig, poll::PollHandle, registry::ServerRegistry};

/// What the loop does between two sweeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// Bounded wait; the last sweep moved little or nothing.
    Sleep,
    /// Give up the time slice and sweep again right away.
    Yield,
}

pub fn pacing_for(bytes_moved: usize, threshold: usize) -> Pacing {
    if bytes_moved <= threshold {
        Pacing::Sleep
    } else {
        Pacing::Yield
    }
}

/// The polling engine: sweeps every registered server until shut down.
pub struct Reactor {
    poll_handle: PollHandle,
    servers: Arc<ServerRegistry>,
    running: Arc<AtomicBool>,
    config: EngineConfig,
}

impl Reactor {
    pub fn new(servers: Arc<ServerRegistry>, config: EngineConfig) -> io::Result<Self> {
        Ok(Self {
            poll_handle: PollHandle::new(config.events_capacity)?,
            servers,
            running: Arc::new(AtomicBool::new(true)),
            config,
        })
    }

    pub fn get_shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            running: self.running.clone(),
            waker: self.poll_handle.waker(),
        }
    }

    /// Runs sweeps until a shutdown is requested. The stop flag is checked
    /// once per full sweep; I/O failures never end the loop.
    pub fn run(&mut self) {
        info!("polling engine started");
        while self.running.load(Ordering::Acquire) {
            let moved = self.sweep();
            self.pace(moved);
        }
        info!("polling engine stopped");
    }

    /// Services every registered server once and evicts the ones that
    /// closed. Returns the bytes received during the sweep.
    pub fn sweep(&mut self) -> usize {
        let mut moved = 0;
        for server in self.servers.snapshot() {
            moved += server.service(&mut self.poll_handle);
            if !server.is_listening() {
                self.servers.evict_closed(&server);
            }
        }
        moved
    }

    fn pace(&mut self, moved: usize) -> Pacing {
        let pacing = pacing_for(moved, self.config.pacing_threshold);
        match pacing {
            Pacing::Yield => thread::yield_now(),
            Pacing::Sleep => {
                if let Err(e) = self.poll_handle.wait(self.config.idle_sleep) {
                    warn!(error = %e, "poll wait failed, sleeping instead");
                    thread::sleep(self.config.idle_sleep);
                }
            }
        }
        pacing
    }
}

/// Requests a cooperative stop from any thread.
#[derive(Clone)]
pub struct ShutdownHandle {
    running: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
        if let Err(e) = self.waker.wake() {
            debug!(error = %e, "failed to wake polling engine");
        }
    }
}
