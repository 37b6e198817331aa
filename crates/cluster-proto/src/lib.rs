//! Wire format and solver grammar shared by the coordinator and worker.
//!
//! Neither module here depends on an HTTP client or server: the coordinator
//! and worker binaries each bring their own transport, but agree on these
//! types for the `/worker/status` request/response cycle and on how a
//! solver file is parsed into a combination space.

mod run_mode;
mod solver;
mod wire;

pub use run_mode::RunMode;
pub use solver::{Solver, SolverError};
pub use wire::{
    CompletedCombination, ConsoleCommand, ConsoleCommandKind, ConsoleSnapshot, RunningCombination,
    SolvedEntry, WorkerSnapshot, WorkerStatus, WorkerStatusRequest, WorkerStatusResponse,
};
