//! Grains: the unit of schedulable work.
//!
//! # Shape
//!
//! A grain bundles five type-erased callbacks — one per phase of the grain
//! life cycle — together with its mutable, caller-typed state:
//!
//! | Phase   | When invoked                                  | Contract |
//! |---------|-----------------------------------------------|----------|
//! | init    | first time this grain meets this device       | may be synchronous |
//! | input   | every round                                   | may launch asynchronously |
//! | compute | every round                                   | may launch asynchronously |
//! | output  | every round                                   | may launch asynchronously |
//! | sync    | every round, last                             | must block until the grain's async work is done |
//!
//! "May launch asynchronously" means the engine assumes nothing about a
//! callback's observable effects until `sync` returns. That is the seam
//! that lets copy-in, execute, and copy-out overlap on real accelerators.
//!
//! # Handle semantics
//!
//! `GrainOfWork` is a cheap clonable handle; clones share the grain state,
//! the per-device ready set, and the single-submission timestamp. The
//! single-grain async path relies on this: the submit command and its
//! follow-up sync command carry clones of one grain and must observe the
//! same state. At most one worker runs a given grain at any instant, so
//! the interior lock is effectively uncontended.
//!
//! Callbacks must not call back into their own grain handle; the interior
//! lock is held while a phase runs.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use crate::stdx::DeviceSet;

/// One of the five grain phases.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhaseKind {
    Init,
    Input,
    Compute,
    Output,
    Sync,
}

/// Type-erased phase callback.
///
/// Receives the device state by value and the grain state by exclusive
/// reference. Grain state migrates between devices across rounds; callbacks
/// must treat it as migrating storage.
pub type PhaseFn<D, G> = Box<dyn FnMut(D, &mut G) + Send + 'static>;

pub(crate) struct Phases<D, G> {
    pub init: PhaseFn<D, G>,
    pub input: PhaseFn<D, G>,
    pub compute: PhaseFn<D, G>,
    pub output: PhaseFn<D, G>,
    pub sync: PhaseFn<D, G>,
}

struct Inner<D, G> {
    phases: Phases<D, G>,
    state: G,
    /// Devices whose init phase has already run for this grain.
    ready: DeviceSet,
    /// Set when a worker begins processing a single-grain submission;
    /// consumed by the paired sync command to compute the round-trip time.
    submitted_at: Option<Instant>,
}

/// A unit of work scheduled as a whole. See the module docs for the phase
/// contract and handle semantics.
pub struct GrainOfWork<D, G> {
    inner: Arc<Mutex<Inner<D, G>>>,
}

impl<D, G> Clone for GrainOfWork<D, G> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

fn no_op<D: 'static, G: 'static>() -> PhaseFn<D, G> {
    Box::new(|_, _| {})
}

impl<D, G> GrainOfWork<D, G> {
    /// Creates a grain from its five phase callbacks, in life-cycle order.
    pub fn new<I, P, C, O, S>(state: G, init: I, input: P, compute: C, output: O, sync: S) -> Self
    where
        I: FnMut(D, &mut G) + Send + 'static,
        P: FnMut(D, &mut G) + Send + 'static,
        C: FnMut(D, &mut G) + Send + 'static,
        O: FnMut(D, &mut G) + Send + 'static,
        S: FnMut(D, &mut G) + Send + 'static,
    {
        Self::from_phases(
            state,
            Phases {
                init: Box::new(init),
                input: Box::new(input),
                compute: Box::new(compute),
                output: Box::new(output),
                sync: Box::new(sync),
            },
        )
    }

    /// Creates a single-phase grain: only `compute` does anything.
    ///
    /// The convenience form for synchronous workloads that have no
    /// transfer phases to overlap.
    pub fn from_compute<C>(state: G, compute: C) -> Self
    where
        D: 'static,
        G: 'static,
        C: FnMut(D, &mut G) + Send + 'static,
    {
        Self::from_phases(
            state,
            Phases {
                init: no_op(),
                input: no_op(),
                compute: Box::new(compute),
                output: no_op(),
                sync: no_op(),
            },
        )
    }

    pub(crate) fn from_phases(state: G, phases: Phases<D, G>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                phases,
                state,
                ready: DeviceSet::new(),
                submitted_at: None,
            })),
        }
    }

    #[inline]
    fn lock(&self) -> MutexGuard<'_, Inner<D, G>> {
        self.inner.lock().expect("grain lock poisoned")
    }

    /// Runs one phase callback with a copy of the device state.
    pub(crate) fn run_phase(&self, phase: PhaseKind, device_state: D) {
        let mut inner = self.lock();
        let inner = &mut *inner;
        let callback = match phase {
            PhaseKind::Init => &mut inner.phases.init,
            PhaseKind::Input => &mut inner.phases.input,
            PhaseKind::Compute => &mut inner.phases.compute,
            PhaseKind::Output => &mut inner.phases.output,
            PhaseKind::Sync => &mut inner.phases.sync,
        };
        callback(device_state, &mut inner.state);
    }

    /// Returns whether init has run for this grain on `device_index`.
    pub fn is_ready(&self, device_index: usize) -> bool {
        self.lock().ready.contains(device_index)
    }

    /// Records that init has run for this grain on `device_index`.
    pub fn make_ready(&self, device_index: usize) {
        self.lock().ready.insert(device_index);
    }

    /// Replaces all five callbacks, preserving state and the ready set.
    pub(crate) fn set_phases(&self, phases: Phases<D, G>) {
        self.lock().phases = phases;
    }

    /// Marks the start of a single-grain submission's processing.
    pub(crate) fn stamp_submitted(&self) {
        self.lock().submitted_at = Some(Instant::now());
    }

    /// Nanoseconds since [`Self::stamp_submitted`], saturating.
    ///
    /// # Panics
    ///
    /// Panics if the grain was never stamped; the worker stamps every
    /// single-grain submission before its paired sync command can run.
    pub(crate) fn ns_since_submitted(&self) -> u64 {
        let submitted = self
            .lock()
            .submitted_at
            .expect("grain synced without a prior submission");
        u64::try_from(submitted.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    /// Reads the grain state under the interior lock.
    ///
    /// Intended for inspection after rounds have completed; do not call
    /// from inside a phase callback of the same grain.
    pub fn with_state<R>(&self, f: impl FnOnce(&G) -> R) -> R {
        f(&self.lock().state)
    }
}
