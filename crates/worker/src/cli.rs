use std::path::PathBuf;

use clap::Parser;

/// `worker <server_url> <token> <worker_id> <cores>` per spec.md §6; the
/// working directory and solver binary path were literal constants in the
/// source, surfaced here as overridable flags in the teacher's habit of
/// turning hardcoded paths into flags.
#[derive(Debug, Clone, Parser)]
#[command(name = "worker", version, about = "cold cluster worker agent")]
pub struct Cli {
    /// Base URL of the coordinator, e.g. `http://cluster.example:5000/`.
    pub server_url: String,

    /// Bearer token presented on every `/worker/status` report.
    pub token: String,

    /// Stable identifier for this worker; reused across restarts so the
    /// coordinator can reattach to its completion history.
    pub worker_id: String,

    /// Maximum number of solver subprocesses to run concurrently.
    pub cores: u32,

    /// Private working directory for this worker's solver subprocesses.
    #[arg(long, env = "COLD_WORKING_DIR")]
    pub working_dir: Option<PathBuf>,

    /// Path to the `cold` solver binary.
    #[arg(long, env = "COLD_SOLVER_BIN", default_value = "bin/cold")]
    pub solver_bin: PathBuf,
}

impl Cli {
    pub fn working_dir(&self) -> PathBuf {
        self.working_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("workers/{}", self.worker_id)))
    }
}
