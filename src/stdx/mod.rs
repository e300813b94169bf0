//! Small, self-contained concurrency and data-structure primitives.
//!
//! # Scope
//! `stdx` hosts the narrow building blocks the balancer is assembled from.
//! They are tuned for predictable behavior under a handful of long-lived
//! threads rather than general-purpose ergonomics.
//!
//! # Module map
//! - `blocking_queue`: bounded, blocking MPSC FIFO used for the per-device
//!   command and response channels.
//! - `device_set`: growable word-packed bitset of device indices.
//! - `latch`: one-shot open/wait gate for deferred worker startup.

pub mod blocking_queue;
pub mod device_set;
pub mod latch;

pub use blocking_queue::BlockingQueue;
pub use device_set::DeviceSet;
pub use latch::Latch;
