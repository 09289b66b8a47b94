//! Client id → live connection registry.
//!
//! One entry per client id. A reconnecting client replaces its old entry.
//! Removal goes by connection handle, not by id, so a close event from a
//! connection that has already been superseded cannot evict the fresh one.
//!
//! The map is split into shards, each behind its own lock. An id always lands
//! in the same shard, so operations on different ids rarely contend and no
//! operation ever holds more than one shard lock.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use pulselink_protocol::ConnectionId;

use crate::connection::ConnectionHandle;

/// Default number of shards.
const SHARD_COUNT: usize = 16;

type Shard = RwLock<HashMap<ConnectionId, ConnectionHandle>>;

/// Concurrent registry of connected clients.
#[derive(Debug)]
pub struct ConnectionRegistry {
    shards: Box<[Shard]>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::with_shards(SHARD_COUNT)
    }

    /// Creates a registry with `count` shards (at least one).
    pub fn with_shards(count: usize) -> Self {
        let shards = (0..count.max(1))
            .map(|_| RwLock::new(HashMap::new()))
            .collect();
        Self { shards }
    }

    /// Maps `id` to `conn`, replacing any previous connection for that id.
    ///
    /// Returns the replaced connection if it was a different one.
    pub fn put(&self, id: ConnectionId, conn: ConnectionHandle) -> Option<ConnectionHandle> {
        conn.bind(id);
        let previous = write(self.shard(id)).insert(id, conn.clone());
        previous.filter(|old| *old != conn)
    }

    /// Returns the live connection for `id`.
    pub fn get(&self, id: ConnectionId) -> Option<ConnectionHandle> {
        read(self.shard(id)).get(&id).cloned()
    }

    /// Removes every entry that currently points at `conn`.
    ///
    /// Entries that were taken over by a newer connection are left alone.
    /// Returns the ids that were released.
    pub fn remove(&self, conn: &ConnectionHandle) -> Vec<ConnectionId> {
        let mut released = Vec::new();
        for id in conn.take_bound() {
            let mut shard = write(self.shard(id));
            if shard.get(&id).is_some_and(|current| current == conn) {
                shard.remove(&id);
                released.push(id);
            }
        }
        released
    }

    /// Number of registered ids.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| read(s).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| read(s).is_empty())
    }

    /// Snapshot of registered ids, sorted.
    pub fn ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self
            .shards
            .iter()
            .flat_map(|s| read(s).keys().copied().collect::<Vec<_>>())
            .collect();
        ids.sort_unstable();
        ids
    }

    fn shard(&self, id: ConnectionId) -> &Shard {
        let index = (id.get() % self.shards.len() as u64) as usize;
        &self.shards[index]
    }
}

// A panic while holding a shard lock cannot leave a HashMap half-updated from
// our point of view, so poisoned locks are entered anyway.
fn read(shard: &Shard) -> RwLockReadGuard<'_, HashMap<ConnectionId, ConnectionHandle>> {
    shard.read().unwrap_or_else(PoisonError::into_inner)
}

fn write(shard: &Shard) -> RwLockWriteGuard<'_, HashMap<ConnectionId, ConnectionHandle>> {
    shard.write().unwrap_or_else(PoisonError::into_inner)
}
