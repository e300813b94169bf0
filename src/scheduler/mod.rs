//! Adaptive scheduler: measurement-driven distribution of grains across
//! heterogeneous devices.
//!
//! # Architecture
//!
//! ```text
//!            ┌────────────────────────────────────────────────────────┐
//!            │                     LoadBalancer                       │
//!            │                                                        │
//!  add_work  │  grains: [g0 g1 g2 .......................... gN-1]   │
//!  ─────────►│            └──────┬──────┴───────┬──────────────┘      │
//!            │      quota/starts │              │    (re-partitioned  │
//!            │                   ▼              ▼       every round)  │
//!            │   load queue ► [Worker 0]    [Worker 1]  ... one per   │
//!            │                    │             │           device    │
//!            │   response queue ◄─┴─ elapsed ns ┘                     │
//!            └────────────────────────────────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`balancer`] | Public façade: registration, rounds, quotas, history |
//! | [`worker`] | Per-device threads: command loop, five-phase execution |
//! | [`grain`] | Grain handles: five phase callbacks + migrating state |
//! | [`device`] | Opaque device-state holder |
//! | [`cache`] | Integer-keyed grain memo (callback refresh, state kept) |
//! | [`command`] | Command/response messages (crate-internal) |
//! | [`stopwatch`] | Scoped nanosecond timer |
//! | [`error_sink`] | Operator reporting for failed responses |
//!
//! # Non-Negotiable Invariants
//!
//! - **Complete partition**: every round dispatches each grain index to
//!   exactly one device.
//! - **Init once**: a grain's init phase runs at most once per
//!   (grain, device) for the balancer's lifetime.
//! - **Per-device FIFO**: commands execute, and responses are consumed, in
//!   issue order on each device. Across devices there is no ordering.
//! - **Join before release**: destruction stops and joins every worker
//!   before shared storage goes away.

pub mod balancer;
pub mod cache;
pub(crate) mod command;
pub mod device;
pub mod error_sink;
pub mod grain;
pub mod stopwatch;
pub(crate) mod worker;

pub use balancer::{
    BalancerConfig, LoadBalancer, DEFAULT_ADMISSION_LIMIT, DEFAULT_QUEUE_CAPACITY,
    SMOOTHING_WINDOW,
};
pub use cache::GrainCache;
pub use device::ComputeDevice;
pub use error_sink::{ErrorSink, NullSink, StderrSink, VecSink};
pub use grain::{GrainOfWork, PhaseFn, PhaseKind};
pub use stopwatch::Stopwatch;
