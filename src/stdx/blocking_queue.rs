//! Bounded Blocking MPSC FIFO
//!
//! # Purpose
//!
//! The channel primitive between the balancer and its workers. Each device
//! owns two of these: a load queue (balancer pushes commands, the worker
//! pops them) and a response queue (the worker pushes results, the balancer
//! pops them).
//!
//! # Correctness Invariants
//!
//! - **FIFO**: items are popped in push order. Commands issued to a device
//!   must execute in issue order; this queue is what provides that.
//! - **Bounded**: `len() <= capacity` at all times. `push` blocks while the
//!   queue is full rather than growing or dropping.
//! - **No lost wakeups**: every successful push signals a waiting consumer,
//!   every successful pop signals a waiting producer.
//!
//! # Performance Characteristics
//!
//! | Operation   | Cost                     |
//! |-------------|--------------------------|
//! | push()      | Lock + check + notify    |
//! | pop()       | Lock + condvar wait      |
//! | len()       | Lock + read              |
//!
//! This is appropriate for command-level traffic (one command per device
//! per round, bounded single-grain submissions), NOT for per-item hot
//! paths in the millions per second.
//!
//! # Design Notes
//!
//! - Mutex + Condvar rather than a lock-free ring: producers are the caller
//!   thread plus at most one worker (re-enqueueing its own follow-up
//!   command), consumers block anyway, and there is no subtle memory
//!   ordering to get wrong.
//! - Locks are poison-tolerant: shutdown pushes a stop command from a drop
//!   path, and a panicking producer elsewhere must not wedge that.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

/// Fixed-capacity blocking FIFO queue.
///
/// # Thread Safety
///
/// Safe to share across threads via `Arc<BlockingQueue<T>>`. Any number of
/// producers and consumers may operate concurrently; each item is delivered
/// to exactly one consumer.
#[derive(Debug)]
pub struct BlockingQueue<T> {
    /// Maximum number of queued items (immutable after construction).
    capacity: usize,
    items: Mutex<VecDeque<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T> BlockingQueue<T> {
    /// Create a new queue with the given capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Arc<Self> {
        assert!(capacity > 0, "BlockingQueue capacity must be > 0");
        Arc::new(Self {
            capacity,
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        })
    }

    /// Lock the item store, recovering from poisoning.
    ///
    /// A panic in a producer must not prevent shutdown commands from being
    /// enqueued; the queue's invariants hold under the lock regardless of
    /// where the panicking thread was.
    #[inline]
    fn lock_items(&self) -> MutexGuard<'_, VecDeque<T>> {
        match self.items.lock() {
            Ok(guard) => guard,
            Err(poison) => poison.into_inner(),
        }
    }

    /// Total capacity of this queue.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current number of queued items.
    ///
    /// # Note
    ///
    /// This is a snapshot and may be stale by the time you use it. The
    /// balancer's admission scan treats it as a hint, not a reservation.
    pub fn len(&self) -> usize {
        self.lock_items().len()
    }

    /// Returns `true` when no items are queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enqueue `item`, blocking while the queue is full.
    pub fn push(&self, item: T) {
        let mut items = self.lock_items();
        while items.len() >= self.capacity {
            items = match self.not_full.wait(items) {
                Ok(guard) => guard,
                Err(poison) => poison.into_inner(),
            };
        }
        items.push_back(item);
        debug_assert!(items.len() <= self.capacity);
        drop(items);
        self.not_empty.notify_one();
    }

    /// Enqueue `item` without blocking.
    ///
    /// Returns `Err(item)` if the queue is full.
    pub fn try_push(&self, item: T) -> Result<(), T> {
        let mut items = self.lock_items();
        if items.len() >= self.capacity {
            return Err(item);
        }
        items.push_back(item);
        drop(items);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Dequeue the oldest item, blocking while the queue is empty.
    pub fn pop(&self) -> T {
        let mut items = self.lock_items();
        loop {
            if let Some(item) = items.pop_front() {
                drop(items);
                self.not_full.notify_one();
                return item;
            }
            items = match self.not_empty.wait(items) {
                Ok(guard) => guard,
                Err(poison) => poison.into_inner(),
            };
        }
    }

    /// Dequeue the oldest item without blocking.
    ///
    /// Returns `None` if the queue is empty.
    pub fn try_pop(&self) -> Option<T> {
        let mut items = self.lock_items();
        let item = items.pop_front();
        drop(items);
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::VecDeque;

    #[derive(Debug, Clone, Copy)]
    enum Op {
        Push(u32),
        Pop,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![any::<u32>().prop_map(Op::Push), Just(Op::Pop)]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(
            crate::test_utils::proptest_cases(64)
        ))]

        /// Single-threaded model check: the queue behaves like a bounded
        /// VecDeque for any interleaving of pushes and pops.
        #[test]
        fn matches_deque_model(ops in proptest::collection::vec(op_strategy(), 0..300)) {
            let q = BlockingQueue::new(8);
            let mut shadow = VecDeque::new();

            for op in ops {
                match op {
                    Op::Push(v) => match q.try_push(v) {
                        Ok(()) => shadow.push_back(v),
                        Err(returned) => {
                            prop_assert_eq!(returned, v);
                            prop_assert_eq!(shadow.len(), 8);
                        }
                    },
                    Op::Pop => {
                        let got = q.try_pop();
                        prop_assert_eq!(got, shadow.pop_front());
                    }
                }
                prop_assert_eq!(q.len(), shadow.len());
            }
        }
    }
}
