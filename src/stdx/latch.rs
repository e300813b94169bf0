//! One-shot startup gate.
//!
//! Worker threads are spawned at device registration time, before the
//! caller has necessarily registered any work. Each worker waits on the
//! latch once at startup; the balancer opens it when the first round (or
//! single-grain submission) begins, and again from its drop path so that a
//! balancer that never ran still releases its workers for shutdown.
//!
//! Opening is idempotent and permanent: once open, `wait` never blocks
//! again.

use std::sync::{Condvar, Mutex, MutexGuard};

/// A gate that starts closed and can be opened exactly once.
#[derive(Debug, Default)]
pub struct Latch {
    opened: Mutex<bool>,
    cv: Condvar,
}

impl Latch {
    /// Creates a closed latch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the flag, recovering from poisoning.
    ///
    /// `open` runs from the balancer's drop path; a panic elsewhere must
    /// not turn shutdown into a deadlock.
    #[inline]
    fn lock_opened(&self) -> MutexGuard<'_, bool> {
        match self.opened.lock() {
            Ok(guard) => guard,
            Err(poison) => poison.into_inner(),
        }
    }

    /// Opens the latch and wakes all waiters. Idempotent.
    pub fn open(&self) {
        let mut opened = self.lock_opened();
        if !*opened {
            *opened = true;
            drop(opened);
            self.cv.notify_all();
        }
    }

    /// Blocks until the latch is open. Returns immediately once opened.
    pub fn wait(&self) {
        let mut opened = self.lock_opened();
        while !*opened {
            opened = match self.cv.wait(opened) {
                Ok(guard) => guard,
                Err(poison) => poison.into_inner(),
            };
        }
    }

    /// Returns `true` when the latch has been opened.
    pub fn is_open(&self) -> bool {
        *self.lock_opened()
    }
}
