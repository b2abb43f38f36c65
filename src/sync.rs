//! Synchronization primitives used to hand accepted connections from the dispatcher to the
//! worker pool.
//!
//! [`Semaphore`] is a counting semaphore built from a `Mutex` and a `Condvar`.
//! [`WorkQueue`] bundles a [`BoundedQueue`] with its lock, a capacity semaphore, a work
//! semaphore and the shutdown flag, so none of that state is reachable from outside.
//!
//! Lock order, for both producers and consumers: permit first, then the queue lock. Releases
//! happen in reverse.
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};

use tracing::debug;

use crate::error::{KvsError, Result};
use crate::queue::BoundedQueue;

/// A counting semaphore.
#[derive(Debug)]
pub struct Semaphore {
    permits: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    /// creates a semaphore holding `permits` permits
    pub fn new(permits: usize) -> Self {
        Semaphore {
            permits: Mutex::new(permits),
            available: Condvar::new(),
        }
    }

    /// blocks until a permit is available and takes it
    pub fn acquire(&self) -> Result<()> {
        let mut permits = self.permits.lock()?;
        while *permits == 0 {
            permits = self.available.wait(permits)?;
        }
        *permits -= 1;
        Ok(())
    }

    /// takes a permit if one is available, without blocking
    #[cfg(test)]
    pub(crate) fn try_acquire(&self) -> Result<bool> {
        let mut permits = self.permits.lock()?;
        if *permits == 0 {
            return Ok(false);
        }
        *permits -= 1;
        Ok(true)
    }

    /// returns one permit, waking a single waiter
    pub fn release(&self) -> Result<()> {
        self.release_n(1)
    }

    /// returns `n` permits, waking up to `n` waiters
    pub fn release_n(&self, n: usize) -> Result<()> {
        let mut permits = self.permits.lock()?;
        *permits += n;
        for _ in 0..n {
            self.available.notify_one();
        }
        Ok(())
    }

    /// the number of permits currently available
    pub fn available(&self) -> Result<usize> {
        Ok(*self.permits.lock()?)
    }
}

/// A bounded, blocking, multi-producer multi-consumer handoff queue with a shutdown signal.
///
/// Producers call [`admit`](WorkQueue::admit), which blocks while the queue is full.
/// Consumers call [`claim`](WorkQueue::claim), which blocks until work arrives or the queue
/// is [closed](WorkQueue::close).
#[derive(Debug)]
pub struct WorkQueue<T> {
    queue: Mutex<BoundedQueue<T>>,
    // free slots in `queue`
    capacity: Semaphore,
    // items pushed but not yet claimed, plus shutdown wake-ups
    work: Semaphore,
    shutting_down: AtomicBool,
}

impl<T> WorkQueue<T> {
    /// creates an open queue that holds at most `capacity` items
    pub fn new(capacity: usize) -> Self {
        WorkQueue {
            queue: Mutex::new(BoundedQueue::with_capacity(capacity)),
            capacity: Semaphore::new(capacity),
            work: Semaphore::new(0),
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Admits one item produced by `accept`.
    ///
    /// Blocks until a slot is free, then calls `accept` while holding the queue lock, pushes
    /// the item and signals one unit of work. If `accept` fails, the capacity permit is
    /// returned and the error is passed back to the caller.
    pub fn admit<F>(&self, accept: F) -> Result<()>
    where
        F: FnOnce() -> io::Result<T>,
    {
        self.capacity.acquire()?;
        let mut queue = self.queue.lock()?;
        let item = match accept() {
            Ok(item) => item,
            Err(e) => {
                drop(queue);
                self.capacity.release()?;
                return Err(e.into());
            }
        };
        if queue.push(item).is_err() {
            return Err(KvsError::Sync(
                "queue is full while a capacity permit is held".to_string(),
            ));
        }
        self.work.release()?;
        drop(queue);
        Ok(())
    }

    /// pushes an already constructed `item`, blocking while the queue is full
    #[cfg(test)]
    pub(crate) fn push(&self, item: T) -> Result<()> {
        self.admit(|| Ok(item))
    }

    /// Waits for work and takes the oldest item.
    ///
    /// Returns `Ok(None)` once the queue has been closed. A consumer woken after the close
    /// never dequeues, even if items are still queued.
    pub fn claim(&self) -> Result<Option<T>> {
        self.work.acquire()?;
        if self.is_shutting_down() {
            return Ok(None);
        }
        let mut queue = self.queue.lock()?;
        let item = queue.pop().ok_or_else(|| {
            KvsError::Sync("work permit held but the queue is empty".to_string())
        })?;
        self.capacity.release()?;
        drop(queue);
        Ok(Some(item))
    }

    /// Sets the shutdown flag and wakes `consumers` blocked consumers.
    ///
    /// Only the first call has an effect.
    pub fn close(&self, consumers: usize) -> Result<()> {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        debug!(consumers, "closing work queue");
        self.work.release_n(consumers)
    }

    /// `true` once [`close`](WorkQueue::close) has been called
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// number of queued items
    pub fn len(&self) -> Result<usize> {
        Ok(self.queue.lock()?.len())
    }

    /// `true` when no items are queued
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.queue.lock()?.is_empty())
    }

    /// the maximum number of queued items
    pub fn capacity(&self) -> Result<usize> {
        Ok(self.queue.lock()?.capacity())
    }

    /// the number of free slots, as counted by the capacity permits
    pub fn available_capacity(&self) -> Result<usize> {
        self.capacity.available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_utils::thread;
    use std::collections::HashSet;
    use std::sync::mpsc;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_millis(300);

    #[test]
    fn semaphore_counts_permits() {
        let sem = Semaphore::new(2);
        assert!(sem.try_acquire().unwrap());
        sem.acquire().unwrap();
        assert!(!sem.try_acquire().unwrap());
        sem.release_n(3).unwrap();
        assert_eq!(sem.available().unwrap(), 3);
    }

    #[test]
    fn semaphore_release_wakes_waiter() {
        let sem = Semaphore::new(0);
        thread::scope(|s| {
            let waiter = s.spawn(|_| sem.acquire());
            std::thread::sleep(Duration::from_millis(50));
            sem.release().unwrap();
            waiter.join().unwrap().unwrap();
        })
        .unwrap();
        assert_eq!(sem.available().unwrap(), 0);
    }

    #[test]
    fn admissions_beyond_capacity_block_until_claimed() {
        let q = WorkQueue::new(10);
        let (tx, rx) = mpsc::channel();

        thread::scope(|s| {
            let producer = &q;
            s.spawn(move |_| {
                for i in 0..12 {
                    producer.push(i).unwrap();
                    tx.send(i).unwrap();
                }
            });

            for expected in 0..10 {
                assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), expected);
            }
            // the 11th and 12th admissions are waiting for free slots
            assert!(rx.recv_timeout(WAIT).is_err());
            assert_eq!(q.len().unwrap(), 10);
            assert_eq!(q.available_capacity().unwrap(), 0);

            assert_eq!(q.claim().unwrap(), Some(0));
            assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 10);
            assert!(rx.recv_timeout(WAIT).is_err());

            assert_eq!(q.claim().unwrap(), Some(1));
            assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 11);
        })
        .unwrap();

        assert_eq!(q.len().unwrap(), 10);
    }

    #[test]
    fn capacity_is_conserved_at_rest() {
        let q = WorkQueue::new(4);
        for i in 0..3 {
            q.push(i).unwrap();
        }
        q.claim().unwrap();
        q.push(9).unwrap();
        q.claim().unwrap();
        let cap = q.capacity().unwrap();
        assert_eq!(q.available_capacity().unwrap() + q.len().unwrap(), cap);
    }

    #[test]
    fn failed_accept_returns_the_capacity_permit() {
        let q: WorkQueue<u32> = WorkQueue::new(2);
        let result = q.admit(|| Err(io::Error::new(io::ErrorKind::Other, "accept failed")));
        assert!(matches!(result, Err(KvsError::Io(_))));
        assert_eq!(q.available_capacity().unwrap(), 2);
        assert!(q.is_empty().unwrap());
    }

    #[test]
    fn close_wakes_every_blocked_consumer() {
        let q: WorkQueue<u32> = WorkQueue::new(4);
        thread::scope(|s| {
            let consumers: Vec<_> = (0..3).map(|_| s.spawn(|_| q.claim())).collect();
            std::thread::sleep(Duration::from_millis(50));
            q.close(3).unwrap();
            for c in consumers {
                assert_eq!(c.join().unwrap().unwrap(), None);
            }
        })
        .unwrap();
        assert!(q.is_shutting_down());
    }

    #[test]
    fn claim_after_close_leaves_queued_items_in_place() {
        let q = WorkQueue::new(4);
        q.push(1).unwrap();
        q.push(2).unwrap();
        q.close(2).unwrap();

        assert_eq!(q.claim().unwrap(), None);
        assert_eq!(q.claim().unwrap(), None);
        assert_eq!(q.len().unwrap(), 2);
        assert_eq!(q.available_capacity().unwrap(), 2);
    }

    #[test]
    fn consumers_never_claim_the_same_item() {
        let q = WorkQueue::new(10);
        let total = 200;

        let claimed = thread::scope(|s| {
            let consumers: Vec<_> = (0..4)
                .map(|_| {
                    s.spawn(|_| {
                        let mut mine = Vec::new();
                        while let Some(item) = q.claim().unwrap() {
                            mine.push(item);
                        }
                        mine
                    })
                })
                .collect();

            for i in 0..total {
                q.push(i).unwrap();
            }
            while !q.is_empty().unwrap() {
                std::thread::sleep(Duration::from_millis(5));
            }
            q.close(4).unwrap();

            consumers
                .into_iter()
                .flat_map(|c| c.join().unwrap())
                .collect::<Vec<_>>()
        })
        .unwrap();

        assert_eq!(claimed.len(), total);
        let unique: HashSet<_> = claimed.iter().collect();
        assert_eq!(unique.len(), total);
    }
}
