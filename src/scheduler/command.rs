//! Command and response messages between the balancer and its workers.

use crate::scheduler::grain::GrainOfWork;

/// Response `msg` value for a successfully executed command.
///
/// Workers currently have no failure path of their own (grain callbacks
/// carry no error channel), so every response they produce uses this value;
/// the balancer still treats anything else as a device failure and reports
/// it to the error sink.
pub(crate) const RESPONSE_OK: u32 = 1;

/// A command consumed by exactly one device worker, in FIFO order.
pub(crate) enum Command<D, G> {
    /// Exit the worker loop; the thread terminates.
    Stop,

    /// Execute the five-phase life cycle over a contiguous grain range.
    RunRange {
        start: usize,
        len: usize,
        pipelined: bool,
    },

    /// Run the asynchronous phases of one grain, then re-enqueue a
    /// `SingleSync` for it on the same load queue. Carries a handle clone;
    /// the paired sync command observes the same grain state.
    SingleAsync(GrainOfWork<D, G>),

    /// Synchronize a previously submitted grain and publish its timing.
    SingleSync(GrainOfWork<D, G>),
}

/// Worker-to-balancer completion record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Response {
    /// [`RESPONSE_OK`] on success; any other value is reported to the
    /// operator error sink.
    pub msg: u32,
    /// Device-side elapsed nanoseconds for the completed command.
    pub ns: u64,
}
