//! Measurement-driven load balancer.
//!
//! # Overview
//!
//! [`LoadBalancer`] owns a list of grains, a list of devices, and one
//! worker thread per device. Each call to [`LoadBalancer::run`] is a round:
//! the balancer re-partitions the grain list into contiguous per-device
//! ranges sized from measured throughput, dispatches one range command per
//! device, and collects per-device timings for the next round.
//!
//! ```text
//!                    ┌─────────────────────────────────────────────────┐
//!                    │                 LoadBalancer                    │
//!                    │                                                 │
//!   run() ───────────┼── quotas from smoothed rates ──┐                │
//!                    │                                ▼                │
//!                    │   load queues:    [ Worker 0 ][ Worker 1 ] ...  │
//!                    │                       │ range     │ range       │
//!                    │                       ▼           ▼             │
//!                    │   response queues: timings ── ns_dev[i] ────────┼── next round
//!                    └─────────────────────────────────────────────────┘
//! ```
//!
//! # Quota algorithm
//!
//! Per round, with `D` devices and `N` grains:
//!
//! 1. instantaneous rate `(quota[i] + 0.1) / ns_dev[i]`, normalized. The
//!    0.1 bias keeps a device that received no work last round from being
//!    pinned at zero forever.
//! 2. the normalized vector overwrites row `run_count % K` of a K-deep
//!    history ring (K = [`SMOOTHING_WINDOW`]); the smoothed performance is
//!    the column mean.
//! 3. integer quotas by `floor(perf[i] * N)`; the rounding deficit is
//!    distributed round-robin, one grain at a time, starting at device
//!    `sum % D`.
//!
//! With stable device throughputs the partition converges within a few
//! rounds to one proportional to true throughput, which is what minimizes
//! the round's wall-clock makespan.
//!
//! # Invariants
//!
//! - `sum(quota) == N` whenever range commands are dispatched.
//! - Ranges are contiguous, disjoint, and cover `[0, N)`; `starts` is the
//!   prefix sum of `quota`.
//! - Smoothed performances sum to ≈1 (floating-point tolerance).
//! - The history ring holds exactly K×D entries from the first run onward.
//! - Per device, responses are consumed one-to-one with dispatched
//!   commands, in order.
//!
//! # Caller contract
//!
//! Registration is not safe to run concurrently with rounds: finish
//! `add_device`/`add_work` before the first `run`. A grain callback that
//! never returns permanently blocks its worker and, because `run` waits on
//! every non-empty device, the balancer with it; there is no cancellation
//! or timeout. See the crate docs for the full concurrency model.

use std::sync::{Arc, RwLock};
use std::thread;

use crate::scheduler::command::{Command, Response, RESPONSE_OK};
use crate::scheduler::device::ComputeDevice;
use crate::scheduler::error_sink::{ErrorSink, StderrSink};
use crate::scheduler::grain::GrainOfWork;
use crate::scheduler::stopwatch::Stopwatch;
use crate::scheduler::worker::{spawn_worker, WorkerHandles};
use crate::stdx::{BlockingQueue, Latch};

/// Rounds of smoothing: quotas follow the mean of this many recent
/// normalized rate vectors.
pub const SMOOTHING_WINDOW: usize = 5;

/// Default capacity of each per-device command and response queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Default single-grain admission bound: a device whose load queue has
/// reached this depth is not eligible for new submissions.
pub const DEFAULT_ADMISSION_LIMIT: usize = 25;

/// Rate credit granted to a device regardless of its last quota, so a
/// zero-quota round cannot pin a device at zero throughput forever.
const ZERO_QUOTA_BIAS: f64 = 0.1;

/// Balancer tuning knobs.
///
/// All defaults match the sizes the engine was measured with; raise
/// `queue_capacity` only together with `admission_limit`, which must stay
/// below it for the single-grain path to keep its backpressure meaning.
#[derive(Clone, Copy, Debug)]
pub struct BalancerConfig {
    /// Capacity of each per-device load and response queue.
    pub queue_capacity: usize,

    /// Load-queue depth at and above which `run_single_async` refuses to
    /// pick a device.
    pub admission_limit: usize,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            admission_limit: DEFAULT_ADMISSION_LIMIT,
        }
    }
}

impl BalancerConfig {
    /// Validate configuration. Panics on invalid values.
    pub fn validate(&self) {
        assert!(self.queue_capacity > 0, "queue_capacity must be > 0");
        assert!(self.admission_limit > 0, "admission_limit must be > 0");
        assert!(
            self.admission_limit <= self.queue_capacity,
            "admission_limit {} exceeds queue_capacity {}",
            self.admission_limit,
            self.queue_capacity
        );
    }
}

/// One registered device: its queues and its worker thread handle.
struct DeviceLane<D, G> {
    load: Arc<BlockingQueue<Command<D, G>>>,
    responses: Arc<BlockingQueue<Response>>,
    worker: Option<thread::JoinHandle<()>>,
}

/// Adaptive work distributor over heterogeneous devices.
///
/// See the module docs for the algorithm and the caller contract, and the
/// crate docs for a usage example.
pub struct LoadBalancer<D, G> {
    config: BalancerConfig,
    grains: Arc<RwLock<Vec<GrainOfWork<D, G>>>>,
    lanes: Vec<DeviceLane<D, G>>,
    gate: Arc<Latch>,

    /// Last device-side elapsed ns per device; 1 until first measured.
    ns_dev: Vec<u64>,
    /// Grains assigned to each device this round.
    quota: Vec<usize>,
    /// First grain index of each device's range; prefix sum of `quota`.
    starts: Vec<usize>,
    /// Smoothed normalized performance per device.
    performances: Vec<f64>,
    /// Ring of the last K normalized rate vectors, row-major K×D.
    /// Empty until the first run sizes it.
    history: Vec<f64>,
    run_count: usize,

    error_sink: Box<dyn ErrorSink>,
}

impl<D, G> LoadBalancer<D, G>
where
    D: Clone + Send + 'static,
    G: Send + 'static,
{
    /// Creates an empty balancer with default configuration and the
    /// stderr error sink.
    pub fn new() -> Self {
        Self::with_config(BalancerConfig::default())
    }

    /// Creates an empty balancer with the given configuration.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid.
    pub fn with_config(config: BalancerConfig) -> Self {
        config.validate();
        Self {
            config,
            grains: Arc::new(RwLock::new(Vec::new())),
            lanes: Vec::new(),
            gate: Arc::new(Latch::new()),
            ns_dev: Vec::new(),
            quota: Vec::new(),
            starts: Vec::new(),
            performances: Vec::new(),
            history: Vec::new(),
            run_count: 0,
            error_sink: Box::new(StderrSink),
        }
    }

    /// Replaces the operator error sink.
    pub fn set_error_sink(&mut self, sink: Box<dyn ErrorSink>) {
        self.error_sink = sink;
    }

    /// Registers a device and spawns its worker thread.
    ///
    /// The new device starts with quota 1 and a sentinel measurement of
    /// 1 ns so the first round measures every device.
    ///
    /// # Panics
    ///
    /// Panics if called after the first round; the smoothing history is
    /// sized to the device count at that point.
    pub fn add_device(&mut self, device: ComputeDevice<D>) {
        assert!(
            self.history.is_empty(),
            "devices must be registered before the first run"
        );

        let device_index = self.lanes.len();
        let load = BlockingQueue::new(self.config.queue_capacity);
        let responses = BlockingQueue::new(self.config.queue_capacity);

        let worker = spawn_worker(
            WorkerHandles {
                device_index,
                grains: Arc::clone(&self.grains),
                gate: Arc::clone(&self.gate),
                load: Arc::clone(&load),
                responses: Arc::clone(&responses),
            },
            device.state(),
        );

        self.lanes.push(DeviceLane {
            load,
            responses,
            worker: Some(worker),
        });
        self.ns_dev.push(1);
        self.quota.push(1);
        self.starts.push(0);
        self.performances.push(1.0);
    }

    /// Registers a grain at the next index.
    ///
    /// Grains keep their registration index for the balancer's lifetime;
    /// ranges dispatched to devices are index ranges into this list.
    pub fn add_work(&mut self, grain: GrainOfWork<D, G>) {
        self.grains
            .write()
            .expect("grain list lock poisoned")
            .push(grain);
    }

    /// Number of registered devices.
    pub fn device_count(&self) -> usize {
        self.lanes.len()
    }

    /// Number of registered grains.
    pub fn grain_count(&self) -> usize {
        self.grains.read().expect("grain list lock poisoned").len()
    }

    /// Runs one round: re-partitions the grain list from measured
    /// throughput, executes every range, and returns the round's elapsed
    /// nanoseconds.
    ///
    /// With `pipelined` set, workers interleave the input/compute/output
    /// callbacks of neighboring grains in a 3-way overlap; otherwise each
    /// phase runs as its own pass over the range.
    ///
    /// # Panics
    ///
    /// Panics if no devices are registered.
    pub fn run(&mut self, pipelined: bool) -> u64 {
        let device_count = self.lanes.len();
        assert!(device_count > 0, "run requires at least one device");
        let grain_count = self.grain_count();

        self.gate.open();

        if self.history.is_empty() {
            self.history = vec![1.0 / device_count as f64; SMOOTHING_WINDOW * device_count];
        }
        debug_assert_eq!(self.history.len(), SMOOTHING_WINDOW * device_count);

        // Instantaneous normalized rates from the last round's quotas and
        // measurements overwrite the oldest history row.
        let rates = normalized_rates(&self.quota, &self.ns_dev);
        let row = self.run_count % SMOOTHING_WINDOW;
        self.history[row * device_count..(row + 1) * device_count].copy_from_slice(&rates);
        self.run_count += 1;

        for (i, performance) in self.performances.iter_mut().enumerate() {
            let column_sum: f64 = (0..SMOOTHING_WINDOW)
                .map(|k| self.history[k * device_count + i])
                .sum();
            *performance = column_sum / SMOOTHING_WINDOW as f64;
        }

        self.quota = integer_partition(&self.performances, grain_count);
        self.starts = prefix_starts(&self.quota);

        assert_eq!(
            self.quota.iter().sum::<usize>(),
            grain_count,
            "partition must cover every grain exactly once"
        );

        let mut elapsed = 0u64;
        {
            let _round = Stopwatch::new(&mut elapsed);

            for i in 0..device_count {
                if self.quota[i] == 0 {
                    continue;
                }
                self.lanes[i].load.push(Command::RunRange {
                    start: self.starts[i],
                    len: self.quota[i],
                    pipelined,
                });
            }

            // Same device order as dispatch; a zero-quota device keeps its
            // previous measurement.
            for i in 0..device_count {
                if self.quota[i] == 0 {
                    continue;
                }
                let response = self.lanes[i].responses.pop();
                if response.msg != RESPONSE_OK {
                    self.error_sink.device_failed(i);
                }
                // Clamped so a coarse clock can never feed a zero divisor
                // into the next round's rates.
                self.ns_dev[i] = response.ns.max(1);
            }
        }
        elapsed
    }

    /// Submits one grain for asynchronous execution on the least-loaded
    /// eligible device and returns that device's index.
    ///
    /// Eligible means a load-queue depth below the admission limit; if no
    /// device qualifies, the call yields and rescans until one does. The
    /// grain's response must later be collected with [`Self::sync_single`]
    /// on the returned device.
    ///
    /// # Panics
    ///
    /// Panics if no devices are registered.
    pub fn run_single_async(&mut self, grain: GrainOfWork<D, G>) -> usize {
        assert!(
            !self.lanes.is_empty(),
            "run_single_async requires at least one device"
        );
        self.gate.open();

        let device = loop {
            let mut best: Option<(usize, usize)> = None;
            for (i, lane) in self.lanes.iter().enumerate() {
                let depth = lane.load.len();
                if depth >= self.config.admission_limit {
                    continue;
                }
                if best.map_or(true, |(_, best_depth)| depth < best_depth) {
                    best = Some((i, depth));
                }
            }
            if let Some((i, _)) = best {
                break i;
            }
            // Every device is saturated; admission pressure is transient
            // because workers are draining their queues.
            std::hint::spin_loop();
            thread::yield_now();
        };

        self.lanes[device].load.push(Command::SingleAsync(grain));
        device
    }

    /// Collects one single-grain response from `device_index`, returning
    /// the measured nanoseconds from submission processing to sync
    /// completion.
    ///
    /// Call once per prior [`Self::run_single_async`] that returned this
    /// device, in the order results are desired; responses per device
    /// arrive in submission order.
    ///
    /// # Panics
    ///
    /// Panics if `device_index` is out of range.
    pub fn sync_single(&mut self, device_index: usize) -> u64 {
        assert!(
            device_index < self.lanes.len(),
            "device index {device_index} out of range"
        );
        let response = self.lanes[device_index].responses.pop();
        if response.msg != RESPONSE_OK {
            self.error_sink.device_failed(device_index);
        }
        response.ns
    }

    /// Returns each device's share of total measured throughput, as
    /// percentages summing to ≈100 once at least one round has run.
    pub fn relative_performances(&self) -> Vec<f64> {
        self.performances.iter().map(|p| p * 100.0).collect()
    }

    /// Grains assigned to each device in the most recent round.
    pub fn quotas(&self) -> &[usize] {
        &self.quota
    }

    /// First grain index of each device's range in the most recent round.
    pub fn range_starts(&self) -> &[usize] {
        &self.starts
    }
}

impl<D, G> Default for LoadBalancer<D, G>
where
    D: Clone + Send + 'static,
    G: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<D, G> Drop for LoadBalancer<D, G> {
    /// Stops and joins every worker before any shared state is released.
    fn drop(&mut self) {
        // Workers that never saw a round are still parked on the gate.
        self.gate.open();
        for lane in &self.lanes {
            lane.load.push(Command::Stop);
        }
        for lane in &mut self.lanes {
            if let Some(worker) = lane.worker.take() {
                let _ = worker.join();
            }
        }
    }
}

/// Normalized per-device rates from last round's quotas and measurements.
///
/// Every entry is positive (the bias sees to it), and the vector sums to 1.
fn normalized_rates(quota: &[usize], ns_dev: &[u64]) -> Vec<f64> {
    debug_assert_eq!(quota.len(), ns_dev.len());
    let mut rates: Vec<f64> = quota
        .iter()
        .zip(ns_dev)
        .map(|(&q, &ns)| (q as f64 + ZERO_QUOTA_BIAS) / ns as f64)
        .collect();
    let total: f64 = rates.iter().sum();
    debug_assert!(total > 0.0);
    for rate in &mut rates {
        *rate /= total;
    }
    rates
}

/// Splits `total` grains into integer quotas proportional to `performances`.
///
/// Floor assignment first, then the rounding deficit is handed out
/// round-robin one grain at a time, starting at device `sum % D`.
fn integer_partition(performances: &[f64], total: usize) -> Vec<usize> {
    let device_count = performances.len();
    debug_assert!(device_count > 0);

    let mut quota: Vec<usize> = performances
        .iter()
        .map(|p| (p * total as f64) as usize)
        .collect();

    let mut assigned: usize = quota.iter().sum();
    assert!(
        assigned <= total,
        "floor quotas {assigned} exceed grain count {total}"
    );
    while assigned < total {
        quota[assigned % device_count] += 1;
        assigned += 1;
    }
    quota
}

/// Prefix sum of quotas: the first grain index of each device's range.
fn prefix_starts(quota: &[usize]) -> Vec<usize> {
    let mut starts = Vec::with_capacity(quota.len());
    let mut next = 0;
    for &q in quota {
        starts.push(next);
        next += q;
    }
    starts
}
