mod cli;
mod process;
mod solutions;

use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use cluster_proto::{
    CompletedCombination, RunMode, RunningCombination, WorkerStatusRequest, WorkerStatusResponse,
};
use reqwest::Url;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::process::RunningProcess;

fn reset_working_dir(dir: &Path) -> anyhow::Result<()> {
    let _ = std::fs::remove_dir_all(dir);
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create working directory {}", dir.display()))
}

/// Kill every live subprocess and wait on them; safe to call repeatedly.
fn kill_all(processes: &mut Vec<RunningProcess>) {
    for p in processes.iter_mut() {
        p.kill_and_wait();
    }
    processes.clear();
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let status_url = Url::parse(&cli.server_url)
        .context("invalid server URL")?
        .join("worker/status")
        .context("invalid server URL")?;

    let working_dir = cli.working_dir();
    let solver_file = working_dir.join("solver.solve");
    // Creating the working directory is the one startup failure spec.md §7
    // treats as fatal to the worker.
    reset_working_dir(&working_dir)?;

    let http = reqwest::blocking::Client::new();

    let mut queue: Vec<u64> = Vec::new();
    let mut processes: Vec<RunningProcess> = Vec::new();
    let mut first_status = true;

    info!(worker_id = %cli.worker_id, cores = cli.cores, "worker starting");

    loop {
        let completed = reap(&mut processes, &working_dir);
        let running: Vec<RunningCombination> = processes
            .iter()
            .map(|p| RunningCombination {
                combination: p.combination,
                programs_completed: p.programs_completed,
            })
            .collect();

        let request = WorkerStatusRequest {
            token: cli.token.clone(),
            worker_id: cli.worker_id.clone(),
            cores: cli.cores,
            combinations_queued: queue.clone(),
            combinations_running: running,
            combinations_completed: (!completed.is_empty()).then_some(completed),
            first_status: first_status.then_some(true),
        };

        let response = match send_report(&http, status_url.clone(), &request) {
            Some(response) => response,
            None => {
                sleep(Duration::from_secs(1));
                continue;
            }
        };
        first_status = false;

        if response.status != RunMode::Running {
            kill_all(&mut processes);
        }

        if let Some(solver_text) = response.solver {
            kill_all(&mut processes);
            if let Err(err) = reset_working_dir(&working_dir) {
                warn!(%err, "failed to reset working directory for new solver");
            }
            if let Err(err) = std::fs::write(&solver_file, solver_text) {
                warn!(%err, "failed to write new solver file");
            }
        }

        if let Some(next) = response.next_combinations {
            queue.extend(next);
        }

        launch_ready(
            &mut queue,
            &mut processes,
            &cli.solver_bin,
            &solver_file,
            &working_dir,
            cli.cores as usize,
        );

        sleep(Duration::from_secs(if response.status == RunMode::Disarmed {
            30
        } else {
            1
        }));
    }
}

/// Drain stdout and reap any finished children, turning each into a
/// completion record (including any solutions scraped from disk). A child
/// that exits without ever emitting a `total:` line is still reported
/// complete with `programs_completed = 0` (spec.md §7).
fn reap(processes: &mut Vec<RunningProcess>, working_dir: &Path) -> Vec<CompletedCombination> {
    for p in processes.iter_mut() {
        p.drain_stdout();
    }

    let mut completed = Vec::new();
    let mut still_running = Vec::with_capacity(processes.len());
    for mut p in processes.drain(..) {
        match p.try_wait() {
            Ok(Some(_status)) => {
                let solutions = solutions::scrape(working_dir, p.combination);
                completed.push(CompletedCombination {
                    combination: p.combination,
                    programs_completed: p.programs_completed,
                    solutions,
                });
            }
            Ok(None) => still_running.push(p),
            Err(err) => {
                warn!(combination = p.combination, %err, "failed to poll subprocess, treating as still running");
                still_running.push(p);
            }
        }
    }
    *processes = still_running;
    completed
}

fn send_report(
    http: &reqwest::blocking::Client,
    url: Url,
    request: &WorkerStatusRequest,
) -> Option<WorkerStatusResponse> {
    let response = match http.post(url).json(request).send() {
        Ok(response) => response,
        Err(err) => {
            warn!(%err, "error connecting to cluster server");
            return None;
        }
    };

    if !response.status().is_success() {
        warn!(status = %response.status(), "error connecting to cluster server");
        return None;
    }

    match response.json::<WorkerStatusResponse>() {
        Ok(body) => Some(body),
        Err(err) => {
            warn!(%err, "malformed response from cluster server");
            None
        }
    }
}

/// Launch subprocesses off the head of `queue` until `cores` are in flight.
fn launch_ready(
    queue: &mut Vec<u64>,
    processes: &mut Vec<RunningProcess>,
    solver_bin: &Path,
    solver_file: &Path,
    working_dir: &Path,
    cores: usize,
) {
    while !queue.is_empty() && processes.len() < cores {
        let combination = queue.remove(0);
        match RunningProcess::spawn(solver_bin, solver_file, combination, working_dir) {
            Ok(process) => processes.push(process),
            Err(err) => {
                warn!(combination, %err, "failed to launch solver subprocess, retrying next tick");
                queue.insert(0, combination);
                break;
            }
        }
    }
}
