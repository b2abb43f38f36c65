//! A fixed capacity FIFO ring buffer.
//!
//! [`BoundedQueue`] has no blocking semantics and no locking of its own. The server only
//! touches it through [`WorkQueue`](crate::sync::WorkQueue), which holds it behind a mutex and
//! pairs it with the capacity and work permits.

/// A fixed capacity, first-in first-out queue backed by a ring of slots.
#[derive(Debug)]
pub struct BoundedQueue<T> {
    slots: Vec<Option<T>>,
    // index of the oldest item
    head: usize,
    // number of items currently held
    len: usize,
}

impl<T> BoundedQueue<T> {
    /// creates an empty queue that can hold at most `capacity` items
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be greater than zero");
        BoundedQueue {
            slots: (0..capacity).map(|_| None).collect(),
            head: 0,
            len: 0,
        }
    }

    /// appends `item` to the back of the queue.
    ///
    /// Returns the item back in `Err` without modifying the queue if it is full.
    pub fn push(&mut self, item: T) -> Result<(), T> {
        if self.is_full() {
            return Err(item);
        }
        let tail = (self.head + self.len) % self.capacity();
        self.slots[tail] = Some(item);
        self.len += 1;
        Ok(())
    }

    /// removes and returns the oldest item, or `None` if the queue is empty
    pub fn pop(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let item = self.slots[self.head].take();
        self.head = (self.head + 1) % self.capacity();
        self.len -= 1;
        item
    }

    /// number of items in the queue
    pub fn len(&self) -> usize {
        self.len
    }

    /// the maximum number of items the queue can hold
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// `true` if the queue holds no items
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// `true` if the queue holds `capacity` items
    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::BoundedQueue;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};
    use std::collections::VecDeque;

    #[test]
    fn push_fails_when_full_and_leaves_queue_untouched() {
        let mut q = BoundedQueue::with_capacity(2);
        assert!(q.push(1).is_ok());
        assert!(q.push(2).is_ok());
        assert!(q.is_full());
        assert_eq!(q.push(3), Err(3));
        assert_eq!(q.len(), 2);
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
    }

    #[test]
    fn pop_on_empty_returns_none() {
        let mut q: BoundedQueue<u32> = BoundedQueue::with_capacity(3);
        assert!(q.is_empty());
        assert_eq!(q.pop(), None);
        assert_eq!(q.len(), 0);
    }

    #[test]
    fn fifo_order_survives_wrap_around() {
        let mut q = BoundedQueue::with_capacity(3);
        for round in 0..5 {
            q.push(round * 10).unwrap();
            q.push(round * 10 + 1).unwrap();
            assert_eq!(q.pop(), Some(round * 10));
            assert_eq!(q.pop(), Some(round * 10 + 1));
        }
        assert!(q.is_empty());
    }

    #[test]
    #[should_panic]
    fn zero_capacity_is_rejected() {
        let _ = BoundedQueue::<u8>::with_capacity(0);
    }

    #[test]
    fn random_sequences_respect_bounds_and_order() {
        let mut rng = SmallRng::seed_from_u64(0x5eed);
        let capacity = 10;
        let mut q = BoundedQueue::with_capacity(capacity);
        let mut model = VecDeque::new();
        let mut next = 0u32;

        for _ in 0..10_000 {
            if rng.gen_bool(0.55) {
                let pushed = q.push(next).is_ok();
                assert_eq!(pushed, model.len() < capacity);
                if pushed {
                    model.push_back(next);
                }
                next += 1;
            } else {
                assert_eq!(q.pop(), model.pop_front());
            }
            assert!(q.len() <= capacity);
            assert_eq!(q.len(), model.len());
            assert_eq!(q.is_full(), model.len() == capacity);
        }
    }
}
