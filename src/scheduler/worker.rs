//! Per-device worker threads.
//!
//! Exactly one long-lived thread per registered device. A worker:
//!
//! 1. waits on the startup latch (opened by the balancer when the first
//!    round or single-grain submission begins, or at shutdown);
//! 2. blocking-pops commands from its load queue and executes them in FIFO
//!    order until it sees `Stop`.
//!
//! # Range execution
//!
//! `RunRange` drives the five-phase life cycle over a contiguous slice of
//! the shared grain list, grain-major:
//!
//! - an init pass that runs `init` at most once per (grain, device);
//! - the three async-capable phases, either as three sequential passes or —
//!   when pipelining is requested and the range has at least 3 grains — in
//!   a 3-way software pipeline that keeps copy-in, execute, and copy-out
//!   callbacks of *different* grains in flight together:
//!
//! ```text
//!   prologue   in[0]  in[1]  cp[0]
//!   steady j   in[j]  cp[j-1]  out[j-2]        j = 2 .. len-1
//!   epilogue   cp[len-1]  out[len-2]  out[len-1]
//! ```
//!
//! - a final sync pass that blocks until every grain's round-effects are
//!   visible.
//!
//! The whole range is timed with a device-side [`Stopwatch`], and the
//! elapsed time is published on the response queue. The balancer feeds it
//! into the next round's quota computation.
//!
//! # Single-grain submissions
//!
//! `SingleAsync` stamps the grain, runs init (if needed) plus the three
//! async-capable phases, then re-enqueues a `SingleSync` for the same grain
//! on its *own* load queue — without responding. The worker is immediately
//! free to pull further submissions, so independent grains overlap their
//! async phases; each `SingleSync` later blocks in `sync`, measures the
//! submission round-trip, and responds.

use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};

use crate::scheduler::command::{Command, Response, RESPONSE_OK};
use crate::scheduler::grain::{GrainOfWork, PhaseKind};
use crate::scheduler::stopwatch::Stopwatch;
use crate::stdx::{BlockingQueue, Latch};

/// Everything a worker borrows from the balancer, by `Arc`.
///
/// Workers never see the balancer itself or each other; the balancer owns
/// the `JoinHandle` and joins it before releasing any of this.
pub(crate) struct WorkerHandles<D, G> {
    pub device_index: usize,
    pub grains: Arc<RwLock<Vec<GrainOfWork<D, G>>>>,
    pub gate: Arc<Latch>,
    pub load: Arc<BlockingQueue<Command<D, G>>>,
    pub responses: Arc<BlockingQueue<Response>>,
}

/// Spawns the worker thread for one device.
///
/// The worker holds its own copy of the device state and passes a clone
/// into every callback invocation.
pub(crate) fn spawn_worker<D, G>(handles: WorkerHandles<D, G>, device_state: D) -> JoinHandle<()>
where
    D: Clone + Send + 'static,
    G: Send + 'static,
{
    thread::Builder::new()
        .name(format!("balancer-worker-{}", handles.device_index))
        .spawn(move || worker_loop(handles, device_state))
        .expect("failed to spawn worker thread")
}

fn worker_loop<D, G>(handles: WorkerHandles<D, G>, device_state: D)
where
    D: Clone + Send + 'static,
    G: Send + 'static,
{
    handles.gate.wait();

    loop {
        match handles.load.pop() {
            Command::Stop => break,

            Command::RunRange {
                start,
                len,
                pipelined,
            } => {
                let mut elapsed = 0u64;
                {
                    let _timer = Stopwatch::new(&mut elapsed);
                    run_range(&handles, &device_state, start, len, pipelined);
                }
                handles.responses.push(Response {
                    msg: RESPONSE_OK,
                    ns: elapsed,
                });
            }

            Command::SingleAsync(grain) => {
                grain.stamp_submitted();
                if !grain.is_ready(handles.device_index) {
                    grain.run_phase(PhaseKind::Init, device_state.clone());
                    grain.make_ready(handles.device_index);
                }
                grain.run_phase(PhaseKind::Input, device_state.clone());
                grain.run_phase(PhaseKind::Compute, device_state.clone());
                grain.run_phase(PhaseKind::Output, device_state.clone());
                // No response yet: queue the sync behind any further
                // submissions so their async phases can overlap.
                handles.load.push(Command::SingleSync(grain));
            }

            Command::SingleSync(grain) => {
                grain.run_phase(PhaseKind::Sync, device_state.clone());
                handles.responses.push(Response {
                    msg: RESPONSE_OK,
                    ns: grain.ns_since_submitted(),
                });
            }
        }
    }
}

/// Executes the five-phase life cycle over `grains[start .. start + len]`.
fn run_range<D, G>(
    handles: &WorkerHandles<D, G>,
    device_state: &D,
    start: usize,
    len: usize,
    pipelined: bool,
) where
    D: Clone,
{
    let grains = handles.grains.read().expect("grain list lock poisoned");
    assert!(
        start + len <= grains.len(),
        "range [{start}, {}) exceeds grain list of {}",
        start + len,
        grains.len()
    );
    let range = &grains[start..start + len];
    let device = handles.device_index;

    for grain in range {
        if !grain.is_ready(device) {
            grain.run_phase(PhaseKind::Init, device_state.clone());
            grain.make_ready(device);
        }
    }

    if !pipelined || len < 3 {
        for grain in range {
            grain.run_phase(PhaseKind::Input, device_state.clone());
        }
        for grain in range {
            grain.run_phase(PhaseKind::Compute, device_state.clone());
        }
        for grain in range {
            grain.run_phase(PhaseKind::Output, device_state.clone());
        }
    } else {
        // 3-way software pipeline: one launch per stream per step.
        range[0].run_phase(PhaseKind::Input, device_state.clone());
        range[1].run_phase(PhaseKind::Input, device_state.clone());
        range[0].run_phase(PhaseKind::Compute, device_state.clone());

        for j in 2..len {
            range[j].run_phase(PhaseKind::Input, device_state.clone());
            range[j - 1].run_phase(PhaseKind::Compute, device_state.clone());
            range[j - 2].run_phase(PhaseKind::Output, device_state.clone());
        }

        range[len - 1].run_phase(PhaseKind::Compute, device_state.clone());
        range[len - 2].run_phase(PhaseKind::Output, device_state.clone());
        range[len - 1].run_phase(PhaseKind::Output, device_state.clone());
    }

    for grain in range {
        grain.run_phase(PhaseKind::Sync, device_state.clone());
    }
}
