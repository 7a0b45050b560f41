//! Fixed-capacity worker pool with backpressure and slot recycling, ported
//! from the original thread factory's semaphore-gated, table-based design.
//!
//! Three synchronization primitives do the work the original split across
//! `pthread_t` tagging and two semaphores:
//!
//! - a counting [`Semaphore`] bounds how many workers run at once
//!   (`fCreationLimiter`);
//! - a binary [`Semaphore`] serializes each worker's non-concurrent
//!   initialization phase (`fInitLock`), released by the worker itself once
//!   its init call returns, not by [`WorkerPool::spawn`];
//! - a parallel `Vec<AtomicBool>` marks which slots hold an exited-but-not-
//!   yet-joined thread, replacing the original's odd/even `pthread_t`
//!   tagging (Rust's `JoinHandle` can't be retrieved by the thread it
//!   belongs to, so `spawn`'s own wrapper flags the slot done when the
//!   worker's body returns, instead of the worker doing it itself).

mod semaphore;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

use semaphore::Semaphore;

/// Failure modes for pool operations.
#[derive(Debug, Error)]
pub enum PoolError {
    /// `capacity` was zero; a pool with no worker slots can never run
    /// anything.
    #[error("worker pool capacity must be at least 1")]
    ZeroCapacity,
    /// The OS refused to create a new thread.
    #[error("failed to spawn worker thread: {0}")]
    SpawnFailed(#[from] std::io::Error),
    /// `spawn` was called after `shutdown` had already flipped the pool into
    /// its shutting-down state.
    #[error("worker pool is shutting down, no new workers may be spawned")]
    ShuttingDown,
}

enum Slot {
    Free,
    Occupied(JoinHandle<()>),
}

/// A bounded pool of OS threads, reused across events as they finish.
pub struct WorkerPool {
    creation_limiter: Semaphore,
    init_lock: Semaphore,
    slots: Mutex<Vec<Slot>>,
    done: Vec<AtomicBool>,
    capacity: usize,
    shutting_down: AtomicBool,
}

impl WorkerPool {
    /// Creates a pool bounded to `capacity` concurrently-running workers.
    /// This is the pool's one-shot configuration step: there is no separate
    /// `configure` call, since a `WorkerPool` is only ever built once and
    /// shared thereafter behind an `Arc`.
    pub fn new(capacity: usize) -> Result<Self, PoolError> {
        if capacity == 0 {
            return Err(PoolError::ZeroCapacity);
        }
        let mut slots = Vec::with_capacity(capacity);
        let mut done = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            slots.push(Slot::Free);
            done.push(AtomicBool::new(false));
        }
        Ok(Self {
            creation_limiter: Semaphore::new(capacity),
            init_lock: Semaphore::new(1),
            slots: Mutex::new(slots),
            done,
            capacity,
            shutting_down: AtomicBool::new(false),
        })
    }

    /// The fixed number of workers this pool will ever run concurrently.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Blocks until a worker slot is free, acquires the pool-wide init
    /// lock, then spawns `body` on a reused or fresh OS thread. `body` must
    /// call [`WorkerPool::release_init_lock`] itself once it has finished
    /// the portion of its work that must not run concurrently with another
    /// worker's init phase — the lock is intentionally still held when this
    /// call returns. The slot is marked reapable automatically once `body`
    /// returns, regardless of how it exits.
    pub fn spawn<F>(pool: &Arc<WorkerPool>, body: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        if pool.shutting_down.load(Ordering::Acquire) {
            return Err(PoolError::ShuttingDown);
        }

        pool.creation_limiter.acquire();
        pool.init_lock.acquire();

        let index = {
            let mut slots = pool.slots.lock();
            pool.find_slot(&mut slots)
        };

        let pool_for_thread = Arc::clone(pool);
        let result = std::thread::Builder::new().spawn(move || {
            body();
            pool_for_thread.mark_done(index);
        });

        let mut slots = pool.slots.lock();
        match result {
            Ok(handle) => {
                slots[index] = Slot::Occupied(handle);
                debug!(slot = index, "spawned worker");
                Ok(())
            }
            Err(err) => {
                slots[index] = Slot::Free;
                pool.init_lock.release();
                pool.creation_limiter.release();
                Err(PoolError::SpawnFailed(err))
            }
        }
    }

    /// Called by a running worker, from inside its own thread, to release
    /// the pool-wide init lock once its non-concurrent initialization phase
    /// has finished.
    pub fn release_init_lock(&self) {
        self.init_lock.release();
    }

    /// Re-acquires the pool-wide init lock. Used by a pilot worker between
    /// events in its chunk, where each event's init phase must still be
    /// serialized against every other worker's init phase even though the
    /// pilot itself was only spawned once.
    pub fn acquire_init_lock(&self) {
        self.init_lock.acquire();
    }

    /// Marks `slot` reapable and frees a capacity permit for the next
    /// `spawn`. Called automatically by the wrapper `spawn` installs around
    /// a worker's body; not normally called directly.
    fn mark_done(&self, slot: usize) {
        self.done[slot].store(true, Ordering::Release);
        self.creation_limiter.release();
    }

    fn find_slot(&self, slots: &mut [Slot]) -> usize {
        for (i, slot) in slots.iter_mut().enumerate() {
            if self.done[i].load(Ordering::Acquire) {
                if let Slot::Occupied(handle) = std::mem::replace(slot, Slot::Free) {
                    if handle.join().is_err() {
                        warn!(slot = i, "worker thread panicked");
                    }
                }
                self.done[i].store(false, Ordering::Release);
                return i;
            }
        }
        for (i, slot) in slots.iter().enumerate() {
            if matches!(slot, Slot::Free) {
                return i;
            }
        }
        unreachable!("capacity permit granted but no free or reapable slot found")
    }

    /// Blocks until every currently running worker has exited, without
    /// preventing new workers from being spawned afterward. Mirrors the
    /// original's drain-then-restore pattern on the creation limiter.
    pub fn wait_all(&self) {
        for _ in 0..self.capacity {
            self.creation_limiter.acquire();
        }
        for _ in 0..self.capacity {
            self.creation_limiter.release();
        }
    }

    /// Flips the pool into its shutting-down state (every subsequent
    /// `spawn` call fails with [`PoolError::ShuttingDown`]), waits for all
    /// workers to finish, then joins every remaining slot. Call once, when
    /// the pool is being torn down. In-flight workers already spawned are
    /// unaffected and run to completion.
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
        self.wait_all();
        let mut slots = self.slots.lock();
        for (i, slot) in slots.iter_mut().enumerate() {
            if let Slot::Occupied(handle) = std::mem::replace(slot, Slot::Free) {
                if handle.join().is_err() {
                    warn!(slot = i, "worker thread panicked during shutdown");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn rejects_zero_capacity() {
        assert!(matches!(WorkerPool::new(0), Err(PoolError::ZeroCapacity)));
    }

    #[test]
    fn runs_more_events_than_capacity_by_reusing_slots() {
        let pool = Arc::new(WorkerPool::new(2).unwrap());
        let completed = Arc::new(AtomicUsize::new(0));
        for _ in 0..6 {
            let pool2 = Arc::clone(&pool);
            let completed2 = Arc::clone(&completed);
            WorkerPool::spawn(&pool, move || {
                pool2.release_init_lock();
                completed2.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        pool.wait_all();
        assert_eq!(completed.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn never_exceeds_capacity_concurrently() {
        let capacity = 3;
        let pool = Arc::new(WorkerPool::new(capacity).unwrap());
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        for _ in 0..12 {
            let pool2 = Arc::clone(&pool);
            let in_flight2 = Arc::clone(&in_flight);
            let max_seen2 = Arc::clone(&max_seen);
            WorkerPool::spawn(&pool, move || {
                pool2.release_init_lock();
                let now = in_flight2.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen2.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(std::time::Duration::from_millis(5));
                in_flight2.fetch_sub(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        pool.wait_all();
        assert!(max_seen.load(Ordering::SeqCst) <= capacity);
    }

    #[test]
    fn shutdown_joins_every_remaining_slot() {
        let pool = Arc::new(WorkerPool::new(2).unwrap());
        for _ in 0..2 {
            let pool2 = Arc::clone(&pool);
            WorkerPool::spawn(&pool, move || {
                pool2.release_init_lock();
            })
            .unwrap();
        }
        pool.shutdown();
    }

    #[test]
    fn spawn_after_shutdown_is_rejected() {
        let pool = Arc::new(WorkerPool::new(2).unwrap());
        pool.shutdown();
        let result = WorkerPool::spawn(&pool, || {});
        assert!(matches!(result, Err(PoolError::ShuttingDown)));
    }
}
