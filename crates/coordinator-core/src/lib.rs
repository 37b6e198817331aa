//! The coordinator's state machine, free of any transport concerns.
//!
//! Everything here is synchronous and deterministic given its inputs: the
//! `coordinator` binary owns a `Mutex<ClusterState>` and feeds it parsed
//! requests plus a timestamp; this crate never calls `Utc::now()` itself so
//! the scenarios in the specification's testable-properties section can be
//! driven with fixed clocks.

mod state;

pub use state::{ClusterState, CoordinatorError, WorkerRecord};
