use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use cluster_proto::{
    ConsoleCommand, ConsoleCommandKind, ConsoleSnapshot, RunMode, Solver, SolverError, SolvedEntry,
    WorkerSnapshot, WorkerStatus, WorkerStatusRequest, WorkerStatusResponse,
};

/// A worker is considered `active` in the console snapshot if it checked in
/// within this window; otherwise it's `inactive` unless it was last told to
/// disarm.
const ACTIVE_WINDOW_SECS: i64 = 5;

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("reset requires a solver")]
    ResetMissingSolver,
    #[error("invalid solver: {0}")]
    InvalidSolver(#[from] SolverError),
}

#[derive(Debug, Clone)]
struct CompletedEntry {
    combination: u64,
    programs_completed: u64,
    solutions: Vec<String>,
}

/// Coordinator-side bookkeeping for one worker. Never removed once created;
/// a worker that stops checking in simply goes quiescent.
#[derive(Debug, Clone)]
pub struct WorkerRecord {
    worker_id: String,
    cores: u32,
    last_checkin: Option<DateTime<Utc>>,
    last_status_sent: Option<RunMode>,
    last_solver_sent: Option<String>,
    running: Vec<(u64, u64)>,
    queued: Vec<u64>,
    completed: Vec<CompletedEntry>,
    run_samples: Vec<(u64, DateTime<Utc>)>,
    programs_run: u64,
    run_rate: Option<u64>,
}

impl WorkerRecord {
    fn new(worker_id: String, cores: u32) -> Self {
        WorkerRecord {
            worker_id,
            cores,
            last_checkin: None,
            last_status_sent: None,
            last_solver_sent: None,
            running: Vec::new(),
            queued: Vec::new(),
            completed: Vec::new(),
            run_samples: Vec::new(),
            programs_run: 0,
            run_rate: None,
        }
    }

    /// Wipe the per-solver-generation history a `reset` clears; the
    /// registration itself (`worker_id`, `cores`, last-seen bookkeeping)
    /// survives.
    fn clear_generation(&mut self) {
        self.completed.clear();
        self.run_samples.clear();
        self.running.clear();
        self.queued.clear();
        self.programs_run = 0;
        self.run_rate = None;
    }

    fn has_completed(&self, combination: u64) -> bool {
        self.completed.iter().any(|c| c.combination == combination)
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn cores(&self) -> u32 {
        self.cores
    }
}

/// The coordinator's entire authoritative state: the active solver
/// generation, the combinations still to solve, and per-worker bookkeeping.
///
/// Holds no lock and does no I/O; the `coordinator` binary is responsible
/// for serializing access (one `Mutex<ClusterState>`) and for supplying
/// `now` so behavior stays reproducible in tests.
#[derive(Debug, Clone)]
pub struct ClusterState {
    run_mode: RunMode,
    solver: Option<Solver>,
    unsolved: Vec<u64>,
    cursor: usize,
    total_programs_run: u64,
    solutions: Vec<String>,
    workers: BTreeMap<String, WorkerRecord>,
}

impl Default for ClusterState {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterState {
    pub fn new() -> Self {
        ClusterState {
            run_mode: RunMode::Stopped,
            solver: None,
            unsolved: Vec::new(),
            cursor: 0,
            total_programs_run: 0,
            solutions: Vec::new(),
            workers: BTreeMap::new(),
        }
    }

    /// Bootstrap with an already-loaded solver, mirroring the source's
    /// "default to the first solver on disk" startup behavior. The cluster
    /// starts `stopped`; the operator still has to issue `run`.
    pub fn bootstrap(solver: Solver) -> Self {
        let mut state = Self::new();
        state.reset(solver);
        state
    }

    pub fn run_mode(&self) -> RunMode {
        self.run_mode
    }

    pub fn solver_text(&self) -> Option<&str> {
        self.solver.as_ref().map(|s| s.text.as_str())
    }

    pub fn unsolved(&self) -> &[u64] {
        &self.unsolved
    }

    pub fn total_programs_run(&self) -> u64 {
        self.total_programs_run
    }

    /// Install `solver` as the active generation: recompute the combination
    /// space, wipe accumulated throughput and solutions, and clear every
    /// worker's completion/sample history. Worker registrations themselves
    /// are retained (invariant: reset never drops a worker).
    fn reset(&mut self, solver: Solver) {
        let total = solver.total_combinations();
        self.unsolved = (0..total).collect();
        self.cursor = 0;
        self.total_programs_run = 0;
        self.solutions.clear();
        self.solver = Some(solver);

        for worker in self.workers.values_mut() {
            worker.clear_generation();
        }
    }

    /// Apply an operator command from `/console_update`. See the run-mode
    /// state machine table: `run` and `reset` install a solver (resetting
    /// derived state if it differs from what's active); `stop` halts
    /// dispatch without discarding the solver or `unsolved`; `disarm` is a
    /// safety-idle that suppresses auto-stop; `arm` clears a prior disarm.
    /// `arm` issued while `running` has no defined transition and is a
    /// no-op (see DESIGN.md).
    pub fn apply_console_command(&mut self, cmd: ConsoleCommand) -> Result<(), CoordinatorError> {
        match cmd.command {
            ConsoleCommandKind::Run => self.command_run(cmd.solver)?,
            ConsoleCommandKind::Stop => self.run_mode = RunMode::Stopped,
            ConsoleCommandKind::Arm => {
                if self.run_mode != RunMode::Running {
                    self.run_mode = RunMode::Stopped;
                }
            }
            ConsoleCommandKind::Disarm => self.run_mode = RunMode::Disarmed,
            ConsoleCommandKind::Reset => {
                let text = cmd.solver.ok_or(CoordinatorError::ResetMissingSolver)?;
                let solver = Solver::parse(&text)?;
                self.reset(solver);
                if self.run_mode != RunMode::Disarmed {
                    self.run_mode = RunMode::Stopped;
                }
            }
        }
        Ok(())
    }

    fn command_run(&mut self, solver_text: Option<String>) -> Result<(), CoordinatorError> {
        if let Some(text) = solver_text {
            let differs = self
                .solver
                .as_ref()
                .map(|s| s.text != text)
                .unwrap_or(true);
            if differs {
                let solver = Solver::parse(&text)?;
                self.reset(solver);
            }
            self.run_mode = RunMode::Running;
        } else if self.solver.is_some() {
            // No new solver supplied: resume dispatch against whatever
            // generation is already active (e.g. re-arming after `stop`).
            self.run_mode = RunMode::Running;
        }
        // Else: no solver has ever been installed. Per spec.md §7, the
        // coordinator simply refuses the transition and stays `stopped`.
        Ok(())
    }

    /// The worker-report handler of spec.md §4.1, steps 2-8 (step 1,
    /// authentication, is the HTTP layer's job since it owns the configured
    /// token). `now` is supplied by the caller so throughput sampling and
    /// liveness are reproducible under test.
    pub fn handle_worker_report(
        &mut self,
        req: WorkerStatusRequest,
        now: DateTime<Utc>,
    ) -> WorkerStatusResponse {
        let worker = self
            .workers
            .entry(req.worker_id.clone())
            .or_insert_with(|| WorkerRecord::new(req.worker_id.clone(), req.cores));

        worker.last_checkin = Some(now);
        worker.running = req
            .combinations_running
            .iter()
            .map(|r| (r.combination, r.programs_completed))
            .collect();
        worker.queued = req.combinations_queued.clone();

        if self.run_mode == RunMode::Running {
            for cc in req.combinations_completed.into_iter().flatten() {
                if !worker.has_completed(cc.combination) {
                    worker.completed.push(CompletedEntry {
                        combination: cc.combination,
                        programs_completed: cc.programs_completed,
                        solutions: cc.solutions.clone(),
                    });
                    self.total_programs_run += cc.programs_completed;
                    self.solutions.extend(cc.solutions);
                }
                self.unsolved.retain(|&c| c != cc.combination);
            }
        }

        if self.run_mode != RunMode::Disarmed && self.unsolved.is_empty() {
            self.run_mode = RunMode::Stopped;
        }

        let worker = self.workers.get_mut(&req.worker_id).expect("just inserted");
        sample_throughput(worker, self.run_mode, now);

        let mut response = WorkerStatusResponse {
            status: self.run_mode,
            solver: None,
            next_combinations: None,
        };

        let solver_text = self.solver.as_ref().map(|s| s.text.clone());
        let send_solver = req.first_status.unwrap_or(false)
            || worker.last_solver_sent.is_none()
            || worker.last_solver_sent != solver_text;
        if send_solver {
            response.solver = solver_text.clone();
            worker.last_solver_sent = solver_text;
        }
        worker.last_status_sent = Some(self.run_mode);

        if self.run_mode == RunMode::Running {
            let current = (worker.running.len() + worker.queued.len()) as i64;
            let ideal = i64::from(worker.cores) * 2;
            let needed = (ideal - current).min(self.unsolved.len() as i64);
            if needed > 0 {
                response.next_combinations = Some(self.assign(needed as usize));
            }
        }

        response
    }

    /// Advance `cursor` by one, wrapping modulo the *current* size of
    /// `unsolved`, for each of `count` assignments. This is the "advance by
    /// one modulo current size" idiom spec.md §9 calls out as easy to
    /// mis-port into a clamp-once read.
    fn assign(&mut self, count: usize) -> Vec<u64> {
        let mut assigned = Vec::with_capacity(count);
        for _ in 0..count {
            if self.cursor >= self.unsolved.len() {
                self.cursor = 0;
            }
            assigned.push(self.unsolved[self.cursor]);
            self.cursor += 1;
        }
        assigned
    }

    /// The `/console_update` snapshot: cluster-wide counters plus a
    /// per-worker row with derived liveness.
    pub fn snapshot(&self, now: DateTime<Utc>) -> ConsoleSnapshot {
        let mut solved = Vec::new();
        let workers = self
            .workers
            .values()
            .map(|w| {
                solved.extend(w.completed.iter().map(|c| SolvedEntry {
                    combination: c.combination,
                    programs_completed: c.programs_completed,
                }));
                WorkerSnapshot {
                    worker_id: w.worker_id.clone(),
                    cores: w.cores,
                    run_rate: w.run_rate,
                    programs_run: w.programs_run,
                    assemblies_completed: w.completed.len(),
                    status: worker_status(w, now),
                }
            })
            .collect();

        ConsoleSnapshot {
            status: self.run_mode,
            programs_run: self.total_programs_run,
            workers,
            solutions: self.solutions.clone(),
            unsolved: self.unsolved.clone(),
            solved,
        }
    }
}

fn worker_status(worker: &WorkerRecord, now: DateTime<Utc>) -> WorkerStatus {
    if worker.last_status_sent == Some(RunMode::Disarmed) {
        return WorkerStatus::Disarmed;
    }
    match worker.last_checkin {
        Some(last) if (now - last).num_seconds() < ACTIVE_WINDOW_SECS => WorkerStatus::Active,
        _ => WorkerStatus::Inactive,
    }
}

/// Append this tick's `(programs_run, now)` sample, trim to the last 3, and
/// recompute `run_rate`.
///
/// The source's rate expression (`later.sample - earlier.sample / dt`) binds
/// division tighter than subtraction, so it computes `later - (earlier/dt)`
/// rather than the intuitive `(later - earlier)/dt`. DESIGN.md records the
/// decision to reproduce that expression verbatim rather than silently
/// "fix" it, per spec.md §9's open question — the scenario in spec.md §8 #6
/// is defined against it.
fn sample_throughput(worker: &mut WorkerRecord, run_mode: RunMode, now: DateTime<Utc>) {
    let programs_run: u64 = worker
        .completed
        .iter()
        .map(|c| c.programs_completed)
        .chain(worker.running.iter().map(|&(_, pc)| pc))
        .sum();
    worker.programs_run = programs_run;

    worker.run_samples.push((programs_run, now));
    if worker.run_samples.len() > 3 {
        worker.run_samples.remove(0);
    }

    if worker.run_samples.len() <= 1 || run_mode != RunMode::Running {
        worker.run_rate = None;
        return;
    }

    let mut rates = Vec::with_capacity(worker.run_samples.len() - 1);
    for window in worker.run_samples.windows(2) {
        let (earlier_sample, earlier_at) = window[0];
        let (later_sample, later_at) = window[1];
        let dt = (later_at - earlier_at).num_milliseconds() as f64 / 1000.0;
        if dt <= 0.0 {
            continue;
        }
        rates.push(later_sample as f64 - (earlier_sample as f64 / dt));
    }

    worker.run_rate = if rates.is_empty() {
        None
    } else {
        let mean = rates.iter().sum::<f64>() / rates.len() as f64;
        Some(mean.ceil() as u64)
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use cluster_proto::{CompletedCombination, RunningCombination};

    fn solver(patterns: &[&str], depth: u32) -> Solver {
        let mut text = String::new();
        for p in patterns {
            text.push_str(&format!("pattern {p}\n"));
        }
        text.push_str(&format!("depth {depth}\n"));
        Solver::parse(&text).unwrap()
    }

    fn report(worker_id: &str, cores: u32) -> WorkerStatusRequest {
        WorkerStatusRequest {
            token: "unused".to_string(),
            worker_id: worker_id.to_string(),
            cores,
            combinations_queued: Vec::new(),
            combinations_running: Vec::new(),
            combinations_completed: None,
            first_status: None,
        }
    }

    fn t(offset_secs: i64) -> DateTime<Utc> {
        DateTime::UNIX_EPOCH + chrono::Duration::seconds(offset_secs)
    }

    /// Scenario 1: single worker, single solver, full sweep.
    #[test]
    fn full_sweep_auto_stops() {
        let mut state = ClusterState::new();
        state
            .apply_console_command(ConsoleCommand {
                command: ConsoleCommandKind::Run,
                solver: Some("pattern a\npattern b\ndepth 2".to_string()),
            })
            .unwrap();
        assert_eq!(state.run_mode(), RunMode::Running);
        assert_eq!(state.unsolved().len(), 4);

        let mut req = report("w1", 2);
        req.first_status = Some(true);
        let resp = state.handle_worker_report(req, t(0));
        assert_eq!(resp.status, RunMode::Running);
        assert!(resp.solver.is_some());
        let mut assigned = resp.next_combinations.unwrap();
        assigned.sort_unstable();
        assert_eq!(assigned, vec![0, 1, 2, 3]);

        let mut total_reported = 0u64;
        for (i, combo) in assigned.iter().copied().enumerate() {
            let mut req = report("w1", 2);
            req.combinations_completed = Some(vec![CompletedCombination {
                combination: combo,
                programs_completed: 10 + i as u64,
                solutions: Vec::new(),
            }]);
            total_reported += 10 + i as u64;
            let resp = state.handle_worker_report(req, t(1 + i as i64));
            if i < 3 {
                assert_eq!(resp.status, RunMode::Running);
            } else {
                assert_eq!(resp.status, RunMode::Stopped);
            }
        }

        assert!(state.unsolved().is_empty());
        assert_eq!(state.total_programs_run(), total_reported);
        assert_eq!(state.run_mode(), RunMode::Stopped);
    }

    /// Scenario 2: two workers both report completing the same index; both
    /// contributions count toward throughput, but `unsolved` drops it once.
    #[test]
    fn duplicate_completion_across_workers_both_count() {
        let mut state = ClusterState::new();
        state
            .apply_console_command(ConsoleCommand {
                command: ConsoleCommandKind::Run,
                solver: Some("pattern a\ndepth 3".to_string()),
            })
            .unwrap();

        let mut req_a = report("w1", 1);
        req_a.combinations_completed = Some(vec![CompletedCombination {
            combination: 0,
            programs_completed: 5,
            solutions: Vec::new(),
        }]);
        state.handle_worker_report(req_a, t(0));

        let mut req_b = report("w2", 1);
        req_b.combinations_completed = Some(vec![CompletedCombination {
            combination: 0,
            programs_completed: 7,
            solutions: Vec::new(),
        }]);
        state.handle_worker_report(req_b, t(0));

        assert_eq!(state.total_programs_run(), 12);
        assert!(!state.unsolved().contains(&0));
    }

    /// R1: redelivering an identical completion report is a no-op for
    /// `unsolved` and `total_programs_run`.
    #[test]
    fn redelivered_completion_is_idempotent() {
        let mut state = ClusterState::new();
        state
            .apply_console_command(ConsoleCommand {
                command: ConsoleCommandKind::Run,
                solver: Some("pattern a\ndepth 2".to_string()),
            })
            .unwrap();

        let mut req = report("w1", 1);
        req.combinations_completed = Some(vec![CompletedCombination {
            combination: 0,
            programs_completed: 9,
            solutions: vec!["sol".to_string()],
        }]);
        state.handle_worker_report(req.clone(), t(0));
        let before_unsolved = state.unsolved().to_vec();
        let before_total = state.total_programs_run();

        state.handle_worker_report(req, t(1));
        assert_eq!(state.unsolved(), before_unsolved.as_slice());
        assert_eq!(state.total_programs_run(), before_total);
    }

    /// Scenario 3: a solver change mid-run resets derived state.
    #[test]
    fn solver_change_resets_state() {
        let mut state = ClusterState::new();
        state
            .apply_console_command(ConsoleCommand {
                command: ConsoleCommandKind::Run,
                solver: Some("pattern a\ndepth 2".to_string()),
            })
            .unwrap();
        let mut req = report("w1", 1);
        req.combinations_completed = Some(vec![CompletedCombination {
            combination: 0,
            programs_completed: 3,
            solutions: Vec::new(),
        }]);
        state.handle_worker_report(req, t(0));
        assert_eq!(state.total_programs_run(), 3);

        state
            .apply_console_command(ConsoleCommand {
                command: ConsoleCommandKind::Run,
                solver: Some("pattern a\npattern b\npattern c\ndepth 2".to_string()),
            })
            .unwrap();

        assert_eq!(state.total_programs_run(), 0);
        assert_eq!(state.unsolved().len(), 9);

        let mut req2 = report("w1", 1);
        req2.first_status = Some(true);
        let resp = state.handle_worker_report(req2, t(1));
        assert!(resp.solver.is_some());
        assert!(resp.next_combinations.is_some());
    }

    /// Scenario 4: disarm suppresses dispatch and auto-stop; arm returns to
    /// `stopped` without losing the retained `unsolved`/cursor.
    #[test]
    fn disarm_then_rearm_retains_progress() {
        let mut state = ClusterState::new();
        state
            .apply_console_command(ConsoleCommand {
                command: ConsoleCommandKind::Run,
                solver: Some("pattern a\npattern b\ndepth 1".to_string()),
            })
            .unwrap();

        state
            .apply_console_command(ConsoleCommand {
                command: ConsoleCommandKind::Disarm,
                solver: None,
            })
            .unwrap();
        let resp = state.handle_worker_report(report("w1", 1), t(0));
        assert_eq!(resp.status, RunMode::Disarmed);
        assert!(resp.next_combinations.is_none());

        state
            .apply_console_command(ConsoleCommand {
                command: ConsoleCommandKind::Arm,
                solver: None,
            })
            .unwrap();
        assert_eq!(state.run_mode(), RunMode::Stopped);

        state
            .apply_console_command(ConsoleCommand {
                command: ConsoleCommandKind::Run,
                solver: Some("pattern a\npattern b\ndepth 1".to_string()),
            })
            .unwrap();
        assert_eq!(state.run_mode(), RunMode::Running);
        assert_eq!(state.unsolved().len(), 2);
    }

    /// Scenario 5: a worker that restarts with the same id reuses its
    /// history and forces a solver resend via `first_status`.
    #[test]
    fn worker_restart_reuses_history_and_resends_solver() {
        let mut state = ClusterState::new();
        state
            .apply_console_command(ConsoleCommand {
                command: ConsoleCommandKind::Run,
                solver: Some("pattern a\npattern b\ndepth 2".to_string()),
            })
            .unwrap();

        let mut first = report("w1", 2);
        first.first_status = Some(true);
        first.combinations_completed = Some(vec![CompletedCombination {
            combination: 0,
            programs_completed: 4,
            solutions: Vec::new(),
        }]);
        state.handle_worker_report(first, t(0));

        // worker restarts: a later report carries first_status again.
        let mut restarted = report("w1", 2);
        restarted.first_status = Some(true);
        let resp = state.handle_worker_report(restarted, t(5));
        assert!(resp.solver.is_some());
        assert_eq!(state.total_programs_run(), 4);
    }

    /// P6: a worker whose last check-in is stale reports `inactive`.
    #[test]
    fn stale_worker_is_inactive() {
        let mut state = ClusterState::new();
        state
            .apply_console_command(ConsoleCommand {
                command: ConsoleCommandKind::Run,
                solver: Some("pattern a\ndepth 1".to_string()),
            })
            .unwrap();
        state.handle_worker_report(report("w1", 1), t(0));

        let snap = state.snapshot(t(10));
        assert_eq!(snap.workers[0].status, WorkerStatus::Inactive);

        let snap = state.snapshot(t(2));
        assert_eq!(snap.workers[0].status, WorkerStatus::Active);
    }

    /// P5: replies never offer more than `2*cores` in-flight work, and hit
    /// exactly that ceiling when enough unsolved combinations remain.
    #[test]
    fn assignment_respects_two_cores_ceiling() {
        let mut state = ClusterState::new();
        state
            .apply_console_command(ConsoleCommand {
                command: ConsoleCommandKind::Run,
                solver: Some("pattern a\npattern b\ndepth 4".to_string()),
            })
            .unwrap();

        let resp = state.handle_worker_report(report("w1", 3), t(0));
        assert_eq!(resp.next_combinations.as_ref().map(Vec::len), Some(6));
    }

    /// Scenario 6: the throughput window's exact arithmetic.
    #[test]
    fn run_rate_matches_documented_arithmetic() {
        let mut state = ClusterState::new();
        state
            .apply_console_command(ConsoleCommand {
                command: ConsoleCommandKind::Run,
                solver: Some("pattern a\ndepth 5".to_string()),
            })
            .unwrap();

        for (secs, total) in [(0, 100u64), (1, 300), (2, 600)] {
            let mut req = report("w1", 1);
            req.combinations_running = vec![RunningCombination {
                combination: 0,
                programs_completed: total,
            }];
            state.handle_worker_report(req, t(secs));
        }

        let snap = state.snapshot(t(2));
        assert_eq!(snap.workers[0].run_rate, Some(250));
    }

    /// R2 lives in cluster-proto; this checks the coordinator-side
    /// consequence: re-running with textually identical solver content is
    /// not a reset.
    #[test]
    fn identical_solver_text_is_not_a_reset() {
        let mut state = ClusterState::new();
        let text = "pattern a\ndepth 2".to_string();
        state
            .apply_console_command(ConsoleCommand {
                command: ConsoleCommandKind::Run,
                solver: Some(text.clone()),
            })
            .unwrap();
        let mut req = report("w1", 1);
        req.combinations_completed = Some(vec![CompletedCombination {
            combination: 0,
            programs_completed: 2,
            solutions: Vec::new(),
        }]);
        state.handle_worker_report(req, t(0));
        assert_eq!(state.total_programs_run(), 2);

        state
            .apply_console_command(ConsoleCommand {
                command: ConsoleCommandKind::Run,
                solver: Some(text),
            })
            .unwrap();
        assert_eq!(state.total_programs_run(), 2);
    }

    #[test]
    fn missing_solver_refuses_to_run() {
        let mut state = ClusterState::new();
        state
            .apply_console_command(ConsoleCommand {
                command: ConsoleCommandKind::Run,
                solver: None,
            })
            .unwrap();
        assert_eq!(state.run_mode(), RunMode::Stopped);
    }

    #[test]
    fn reset_requires_solver_text() {
        let mut state = ClusterState::new();
        let err = state
            .apply_console_command(ConsoleCommand {
                command: ConsoleCommandKind::Reset,
                solver: None,
            })
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::ResetMissingSolver));
    }
}
