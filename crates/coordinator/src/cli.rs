use std::path::PathBuf;

use clap::Parser;

/// `coordinator <worker_token>` per spec.md §6; operator credentials and the
/// remaining knobs are environment-backed flags in the teacher's `clap`
/// style rather than a config file the source never had.
#[derive(Debug, Clone, Parser)]
#[command(name = "coordinator", version, about = "cold cluster coordinator")]
pub struct Cli {
    /// Bearer token workers must present on `/worker/status`.
    pub worker_token: String,

    /// Address to bind the HTTP server on.
    #[arg(long, env = "COLD_BIND", default_value = "0.0.0.0:5000")]
    pub bind: String,

    /// HTTP Basic auth username for the operator console.
    #[arg(long, env = "COLD_CONSOLE_USER")]
    pub console_user: String,

    /// HTTP Basic auth password for the operator console.
    #[arg(long, env = "COLD_CONSOLE_PASS")]
    pub console_pass: String,

    /// Directory containing `*.solve` catalog entries.
    #[arg(long, env = "COLD_SOLVERS_DIR", default_value = "solvers")]
    pub solvers_dir: PathBuf,

    /// Directory containing the console's static assets
    /// (`index.html`, `view.js`, `style.css`).
    #[arg(long, env = "COLD_ASSETS_DIR", default_value = "console")]
    pub assets_dir: PathBuf,
}
