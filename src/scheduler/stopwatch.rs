//! Scoped nanosecond timer.
//!
//! Records a monotonic timestamp on construction and writes the elapsed
//! nanoseconds into a caller-supplied slot when dropped. The write happens
//! exactly once, on every exit path — including unwinding — which is what
//! makes the measurement trustworthy around untrusted grain callbacks.
//!
//! Used on both sides of the engine: the balancer times a whole round, a
//! worker times the execution of its assigned grain range.

use std::time::Instant;

/// Writes elapsed nanoseconds into `target` on drop.
///
/// # Example
///
/// ```
/// use balancer_rs::Stopwatch;
///
/// let mut elapsed_ns = 0u64;
/// {
///     let _timer = Stopwatch::new(&mut elapsed_ns);
///     // ... timed work ...
/// }
/// // elapsed_ns now holds the scope's duration.
/// ```
#[derive(Debug)]
pub struct Stopwatch<'a> {
    target: &'a mut u64,
    start: Instant,
}

impl<'a> Stopwatch<'a> {
    /// Starts the timer.
    pub fn new(target: &'a mut u64) -> Self {
        Self {
            target,
            start: Instant::now(),
        }
    }
}

impl Drop for Stopwatch<'_> {
    fn drop(&mut self) {
        // Instant::elapsed is monotonic; saturate rather than wrap on the
        // (centuries-long) u64 boundary.
        let nanos = self.start.elapsed().as_nanos();
        *self.target = u64::try_from(nanos).unwrap_or(u64::MAX);
    }
}
