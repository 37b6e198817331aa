use serde::{Deserialize, Serialize};

/// The cluster-wide directive sent to every worker on each status reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Workers kill in-flight subprocesses and assign no new work. Completion
    /// reports are still accepted.
    Stopped,
    /// Workers are dispatched work up to `cores * 2` in-flight combinations.
    Running,
    /// Safety-idle: no work assigned, no subprocesses run, auto-stop on
    /// exhaustion is suppressed.
    Disarmed,
}

impl Default for RunMode {
    fn default() -> Self {
        RunMode::Stopped
    }
}
