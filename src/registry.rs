use std::sync::{Arc, Mutex};

use lockfree::map::Map as LockfreeMap;
use tracing::debug;

use crate::error::{NetworkError, Result};
use crate::net::tcp::{Server, ServerState};
use crate::net::tcp::traits::SocketName;
use crate::utils::lock;

/// Named servers shared between the host and the polling thread.
///
/// The map is lock-free, so the host may insert while a sweep is walking it;
/// a server inserted mid-sweep is picked up on the next one.
pub struct ServerRegistry {
    servers: LockfreeMap<SocketName, Arc<Server>>,
    // serializes the check-then-insert in `insert`
    insert_lock: Mutex<()>,
}

impl ServerRegistry {
    pub fn new() -> Self {
        Self {
            servers: LockfreeMap::new(),
            insert_lock: Mutex::new(()),
        }
    }

    /// Registers `server` under its name. A live server with the same name
    /// is never displaced; a closed one is.
    pub fn insert(&self, server: Server) -> Result<Arc<Server>> {
        let _guard = lock(&self.insert_lock);
        if let Some(existing) = self.servers.get(server.name()) {
            if existing.val().state() != ServerState::Closed {
                return Err(NetworkError::ServerExists(server.name().clone()));
            }
        }

        let server = Arc::new(server);
        self.servers.insert(server.name().clone(), server.clone());
        Ok(server)
    }

    pub fn get(&self, name: &SocketName) -> Option<Arc<Server>> {
        self.servers.get(name).map(|entry| entry.val().clone())
    }

    /// Clones out the current servers so none is borrowed while serviced.
    pub fn snapshot(&self) -> Vec<Arc<Server>> {
        self.servers.iter().map(|entry| entry.val().clone()).collect()
    }

    /// Drops `server` from the map if it is closed and still the entry
    /// registered under its name.
    pub fn evict_closed(&self, server: &Arc<Server>) -> bool {
        let removed = self
            .servers
            .remove_with(server.name(), |(_, current)| {
                Arc::ptr_eq(current, server) && current.state() == ServerState::Closed
            })
            .is_some();
        if removed {
            debug!(server = %server.name(), "evicted closed server");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.servers.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ServerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
