//! Connection slot table.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::connection::ConnectionId;

/// Bounded table of live connections.
///
/// The lock is held only for the insert/remove itself.
#[derive(Debug)]
pub struct Slots {
    capacity: usize,
    next_id: AtomicU64,
    live: Mutex<HashMap<ConnectionId, SocketAddr>>,
}

impl Slots {
    #[must_use]
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity,
            next_id: AtomicU64::new(1),
            live: Mutex::new(HashMap::new()),
        })
    }

    /// Claim a slot for `peer`, or `None` if the table is full.
    ///
    /// The slot is released when the returned guard is dropped.
    pub fn acquire(self: &Arc<Self>, peer: SocketAddr) -> Option<SlotGuard> {
        let mut live = self.live.lock();
        if live.len() >= self.capacity {
            return None;
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        live.insert(id, peer);
        Some(SlotGuard {
            id,
            slots: Arc::clone(self),
        })
    }

    /// Number of occupied slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// An occupied slot.
#[derive(Debug)]
pub struct SlotGuard {
    id: ConnectionId,
    slots: Arc<Slots>,
}

impl SlotGuard {
    /// Identifier of the connection holding this slot.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.slots.live.lock().remove(&self.id);
    }
}
