//! Adaptive work distribution across heterogeneous compute devices.
//!
//! A fixed pool of devices of unknown, unequal performance (mixed GPU
//! generations, CPU workers, a remote accelerator) executes a list of
//! independent work units ("grains"). Every round, the engine partitions
//! the grains across devices so the round's wall-clock time shrinks,
//! measures what each device actually delivered, and re-partitions from a
//! smoothed history of those measurements.
//!
//! The engine never touches device APIs itself: grains are bundles of five
//! opaque callbacks — init, input, compute, output, sync — and the three
//! before sync may launch work asynchronously. Workers can interleave the
//! input/compute/output callbacks of neighboring grains (a 3-way software
//! pipeline) to keep a device's copy-in, execute, and copy-out paths busy
//! at once.
//!
//! Two scheduling paths share the per-device workers:
//!
//! - **Batch rounds** ([`LoadBalancer::run`]): every registered grain runs
//!   once, partitioned by measured throughput.
//! - **Single submissions** ([`LoadBalancer::run_single_async`] /
//!   [`LoadBalancer::sync_single`]): one grain at a time, routed to the
//!   least-loaded device, with the sync deferred so independent
//!   submissions overlap.
//!
//! # Example
//!
//! ```
//! use balancer_rs::{ComputeDevice, GrainOfWork, LoadBalancer};
//!
//! let mut balancer = LoadBalancer::<u32, u64>::new();
//!
//! // Two devices; the state value (here just an ordinal) is passed to
//! // every callback by value.
//! for gpu in 0..2u32 {
//!     balancer.add_device(ComputeDevice::new(gpu));
//! }
//!
//! // Eight single-phase grains counting their own executions.
//! for _ in 0..8 {
//!     balancer.add_work(GrainOfWork::from_compute(0u64, |_gpu: u32, runs: &mut u64| {
//!         *runs += 1;
//!     }));
//! }
//!
//! for _round in 0..3 {
//!     let _elapsed_ns = balancer.run(false);
//! }
//!
//! let shares = balancer.relative_performances();
//! assert_eq!(shares.len(), 2);
//! ```
//!
//! # Concurrency model
//!
//! One OS thread per registered device plus the caller's thread; no other
//! pool. Workers block popping their command queue; the caller blocks
//! popping response queues inside `run` and `sync_single`. Commands to one
//! device execute in FIFO order; across devices there is no ordering.
//! Grain state migrates between devices across rounds but is mutated by at
//! most one worker at any instant.
//!
//! Registration must complete before the first round. There is no
//! cancellation: a callback that never returns blocks its worker, and
//! eventually the balancer. Shutdown is cooperative — dropping the
//! balancer enqueues a stop command per device and joins every worker
//! before releasing shared state.

pub mod scheduler;
pub mod stdx;

#[cfg(test)]
pub mod test_utils;

pub use scheduler::{
    BalancerConfig, ComputeDevice, ErrorSink, GrainCache, GrainOfWork, LoadBalancer, NullSink,
    PhaseFn, PhaseKind, StderrSink, Stopwatch, VecSink, DEFAULT_ADMISSION_LIMIT,
    DEFAULT_QUEUE_CAPACITY, SMOOTHING_WINDOW,
};
pub use stdx::BlockingQueue;
