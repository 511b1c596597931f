//! Pick identifier allocation.
//!
//! Every instance gets a unique pick id, encoded as an RGBA color written to
//! a per-instance vertex attribute. The pick pass renders these colors into
//! an offscreen target; reading a pixel back recovers the id. Ids are unique
//! process-wide while allocated and are recycled on release.

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;

use parking_lot::Mutex;

/// Color-encodable pick identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PickId(NonZeroU32);

impl PickId {
    pub fn get(&self) -> u32 {
        self.0.get()
    }

    /// Encode as a normalized RGBA color, little-endian byte order. Distinct
    /// ids always produce distinct colors at 8 bits per channel.
    pub fn to_color(&self) -> [f32; 4] {
        let v = self.0.get();
        [
            (v & 0xff) as f32 / 255.0,
            ((v >> 8) & 0xff) as f32 / 255.0,
            ((v >> 16) & 0xff) as f32 / 255.0,
            ((v >> 24) & 0xff) as f32 / 255.0,
        ]
    }
}

/// Process-wide pick id allocator: monotonic counter plus a recycled-id free
/// list. Blocks are handed out in ascending order so a primitive that
/// re-dispatches the same instance set sees a stable assignment order.
pub struct PickRegistry {
    next: AtomicU32,
    free: Mutex<Vec<u32>>,
}

impl PickRegistry {
    pub fn new() -> Self {
        Self {
            next: AtomicU32::new(1),
            free: Mutex::new(Vec::new()),
        }
    }

    /// Shared registry. Lazily constructed; callers may also own a private
    /// registry for isolation.
    pub fn global() -> &'static PickRegistry {
        static REGISTRY: OnceLock<PickRegistry> = OnceLock::new();
        REGISTRY.get_or_init(PickRegistry::new)
    }

    /// Allocate `count` ids, smallest recycled ids first, in ascending order.
    pub fn allocate_block(&self, count: usize) -> Vec<PickId> {
        let mut ids = Vec::with_capacity(count);
        {
            let mut free = self.free.lock();
            free.sort_unstable();
            let take = count.min(free.len());
            for raw in free.drain(..take) {
                // Free list only ever holds previously allocated nonzero ids.
                if let Some(id) = NonZeroU32::new(raw) {
                    ids.push(PickId(id));
                }
            }
        }
        while ids.len() < count {
            let raw = self.next.fetch_add(1, Ordering::Relaxed);
            if let Some(id) = NonZeroU32::new(raw) {
                ids.push(PickId(id));
            }
        }
        ids
    }

    /// Return ids to the free list.
    pub fn release(&self, ids: &[PickId]) {
        let mut free = self.free.lock();
        free.extend(ids.iter().map(|id| id.get()));
    }
}

impl Default for PickRegistry {
    fn default() -> Self {
        Self::new()
    }
}
