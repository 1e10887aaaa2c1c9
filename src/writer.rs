//! The writer side: a debounced update queue and a batch-apply loop that
//! renders, compresses, and installs per-prefix payloads under the write
//! lock, or deletes them when the upstream route disappears.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use crate::alloc::Allocator;
use crate::error::RegionError;
use crate::lock::RegionLock;
use crate::payload;
use crate::prefix::Prefix;
use crate::region::Region;
use crate::tree;

/// How old a queue entry must be before a repeat notification reinserts it
/// at the FIFO tail instead of leaving its position alone.
const DEBOUNCE: Duration = Duration::from_secs(10);

/// Upper bound on entries applied per write-lock acquisition, so a writer
/// holding the lock can't starve readers indefinitely under a writer-prefer
/// policy.
const BATCH_SIZE: usize = 16;

/// Supplies the rendered textual payload for a prefix at apply time (not at
/// notify time): the writer only remembers which prefixes changed, and asks
/// for the current rendering when it actually gets around to applying the
/// update. `None` means the prefix currently has no route and should be
/// deleted from the tree.
pub trait RouteSource {
    fn render(&self, prefix: Prefix) -> Option<Vec<u8>>;
}

struct QueueEntry {
    prefix: Prefix,
    born: Instant,
}

/// A debounced FIFO of distinct prefixes awaiting application.
#[derive(Default)]
struct WriterQueue {
    born: HashMap<Prefix, Instant>,
    order: VecDeque<Prefix>,
}

impl WriterQueue {
    fn notify(&mut self, prefix: Prefix, now: Instant) {
        match self.born.get(&prefix).copied() {
            None => {
                self.born.insert(prefix, now);
                self.order.push_back(prefix);
            }
            Some(born) if now.saturating_duration_since(born) < DEBOUNCE => {
                // Within the debounce window: move to the tail, keeping the
                // original creation timestamp.
                self.order.retain(|p| *p != prefix);
                self.order.push_back(prefix);
            }
            Some(_) => {
                // Stale; leave its existing FIFO position alone.
            }
        }
    }

    fn pop_front(&mut self) -> Option<QueueEntry> {
        let prefix = self.order.pop_front()?;
        let born = self.born.remove(&prefix).unwrap_or(Instant::now());
        Some(QueueEntry { prefix, born })
    }

    /// Re-enqueue at the tail without disturbing the debounce clock,
    /// used when a batch runs out of free blocks partway through.
    fn push_back_retry(&mut self, entry: QueueEntry) {
        self.born.insert(entry.prefix, entry.born);
        self.order.push_back(entry.prefix);
    }

    fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

pub struct WriterConfig {
    pub shm: String,
    pub size: u32,
}

/// Owns the region, its lock, the local allocator, and the pending-update
/// queue. One `Writer` per process; a second writer against the same `shm`
/// name fails at [`Region::create`].
pub struct Writer {
    region: Region,
    lock: RegionLock,
    alloc: Allocator,
    queue: WriterQueue,
}

impl Writer {
    pub fn create(config: &WriterConfig) -> Result<Self, RegionError> {
        let (region, lock) = Region::create(&config.shm, config.size)?;
        let alloc = Allocator::new(region.block_count());
        Ok(Self {
            region,
            lock,
            alloc,
            queue: WriterQueue::default(),
        })
    }

    /// Record that `prefix` changed upstream. Debounces repeat notifications
    /// within [`DEBOUNCE`] of the last one.
    pub fn notify(&mut self, prefix: Prefix) {
        self.queue.notify(prefix, Instant::now());
    }

    /// Apply up to [`BATCH_SIZE`] queued entries under the write lock.
    ///
    /// Returns `true` if the queue still has work left and the caller should
    /// reschedule another tick.
    pub fn apply_batch(&mut self, routes: &dyn RouteSource) -> bool {
        let _guard = self.lock.write();
        let mut applied = 0;

        while applied < BATCH_SIZE {
            let Some(entry) = self.queue.pop_front() else {
                break;
            };

            match routes.render(entry.prefix) {
                Some(payload) => {
                    // SAFETY: the write guard is held for the duration of this call.
                    let leaf = unsafe { tree::get(&self.region, &mut self.alloc, entry.prefix) };
                    match leaf {
                        Some(idx) => {
                            // SAFETY: `idx` was just obtained under the write lock.
                            let result =
                                unsafe { payload::write(&self.region, &mut self.alloc, idx, &payload) };
                            if result.is_err() {
                                tracing::warn!(prefix = ?entry.prefix, "codec rejected payload, dropping entry");
                            }
                        }
                        None => {
                            tracing::warn!("region full, re-enqueuing and stopping batch");
                            self.queue.push_back_retry(entry);
                            return !self.queue.is_empty();
                        }
                    }
                }
                None => {
                    // SAFETY: the write guard is held for the duration of this call.
                    unsafe { tree::delete(&self.region, &mut self.alloc, entry.prefix) };
                }
            }

            applied += 1;
        }

        !self.queue.is_empty()
    }

    pub fn block_count(&self) -> u32 {
        self.region.block_count()
    }
}
