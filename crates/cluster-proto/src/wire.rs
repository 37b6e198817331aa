//! Request/response DTOs for `/worker/status` and `/console_update`.
//!
//! Optional fields follow the "absent ≡ empty" convention noted in the
//! design notes: a missing `combinations_completed` means no completions to
//! report, not an error.

use serde::{Deserialize, Serialize};

use crate::RunMode;

/// One combination a worker reports as still in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningCombination {
    pub combination: u64,
    pub programs_completed: u64,
}

/// One combination a worker reports as finished, with any solutions found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedCombination {
    pub combination: u64,
    pub programs_completed: u64,
    #[serde(default)]
    pub solutions: Vec<String>,
}

/// Body of `POST /worker/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerStatusRequest {
    pub token: String,
    pub worker_id: String,
    pub cores: u32,
    #[serde(default)]
    pub combinations_queued: Vec<u64>,
    #[serde(default)]
    pub combinations_running: Vec<RunningCombination>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combinations_completed: Option<Vec<CompletedCombination>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_status: Option<bool>,
}

/// Response to `POST /worker/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerStatusResponse {
    pub status: RunMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_combinations: Option<Vec<u64>>,
}

/// Per-worker liveness as derived for the operator console; distinct from
/// `RunMode`, which is the cluster-wide directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Active,
    Inactive,
    Disarmed,
}

/// A command posted to `/console_update`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleCommandKind {
    Run,
    Stop,
    Arm,
    Disarm,
    Reset,
}

/// Body of `POST /console_update`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleCommand {
    pub command: ConsoleCommandKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solver: Option<String>,
}

/// One worker's row in the console snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSnapshot {
    pub worker_id: String,
    pub cores: u32,
    pub run_rate: Option<u64>,
    pub programs_run: u64,
    pub assemblies_completed: usize,
    pub status: WorkerStatus,
}

/// One completed combination flattened out of a worker's completion set, for
/// the console's `solved` list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolvedEntry {
    pub combination: u64,
    pub programs_completed: u64,
}

/// Response to `POST /console_update`, and the initial snapshot served to a
/// freshly loaded console.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleSnapshot {
    pub status: RunMode,
    pub programs_run: u64,
    pub workers: Vec<WorkerSnapshot>,
    pub solutions: Vec<String>,
    pub unsolved: Vec<u64>,
    pub solved: Vec<SolvedEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_optional_fields_deserialize_as_empty() {
        let json = r#"{"token":"t","worker_id":"w1","cores":4,
            "combinations_queued":[],"combinations_running":[]}"#;
        let req: WorkerStatusRequest = serde_json::from_str(json).unwrap();
        assert!(req.combinations_completed.is_none());
        assert!(req.first_status.is_none());
        assert!(req.combinations_queued.is_empty());
    }

    #[test]
    fn response_omits_absent_optionals() {
        let resp = WorkerStatusResponse {
            status: RunMode::Stopped,
            solver: None,
            next_combinations: None,
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(!json.contains("solver"));
        assert!(!json.contains("next_combinations"));
    }

    #[test]
    fn run_mode_wire_strings_match_spec() {
        assert_eq!(serde_json::to_string(&RunMode::Running).unwrap(), "\"running\"");
        assert_eq!(serde_json::to_string(&RunMode::Stopped).unwrap(), "\"stopped\"");
        assert_eq!(serde_json::to_string(&RunMode::Disarmed).unwrap(), "\"disarmed\"");
    }

    #[test]
    fn console_command_round_trips() {
        let json = r#"{"command":"run","solver":"pattern a\ndepth 1"}"#;
        let cmd: ConsoleCommand = serde_json::from_str(json).unwrap();
        assert_eq!(cmd.command, ConsoleCommandKind::Run);
        assert_eq!(cmd.solver.as_deref(), Some("pattern a\ndepth 1"));
    }
}
