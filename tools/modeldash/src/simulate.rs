//! Deterministic batch driver: a worker pool that walks each model through the
//! job lifecycle and reports every transition to the dashboard.

use crate::config::BatchConfig;
use crate::dashboard::DashboardCoordinator;
use crate::errors::DashboardError;
use crate::logging::append_run_log;
use crate::runtime::Clock;
use crate::tracker::{AggregateSummary, ModelStatusTracker};
use crate::types::{JobPhase, JobSpec};
use crossbeam_channel::unbounded;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

pub const DEFAULT_FAILURE_REASON: &str = "simulated failure";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    pub jobs: Vec<JobSpec>,
    pub parallelism: usize,
    pub base: Duration,
    pub jitter_ms: u64,
    pub rate_limit: Duration,
    /// key -> failure reason
    pub failures: BTreeMap<String, String>,
    pub rate_limited: BTreeSet<String>,
}

impl BatchPlan {
    pub fn from_config(batch: &BatchConfig) -> Self {
        let failures = batch
            .fail
            .iter()
            .map(|entry| match entry.split_once('=') {
                Some((key, reason)) if !reason.trim().is_empty() => {
                    (key.trim().to_string(), reason.trim().to_string())
                }
                Some((key, _)) => (key.trim().to_string(), DEFAULT_FAILURE_REASON.to_string()),
                None => (entry.trim().to_string(), DEFAULT_FAILURE_REASON.to_string()),
            })
            .collect();
        Self {
            jobs: batch.models.iter().map(|model| JobSpec::for_model(model)).collect(),
            parallelism: batch.parallelism.max(1) as usize,
            base: Duration::from_millis(batch.base_ms),
            jitter_ms: batch.jitter_ms,
            rate_limit: Duration::from_millis(batch.rate_limit_ms),
            failures,
            rate_limited: batch.rate_limit.iter().map(|key| key.trim().to_string()).collect(),
        }
    }

    /// `base + sha256(key) mod jitter`, stable across runs.
    pub fn duration_for(&self, key: &str) -> Duration {
        if self.jitter_ms == 0 {
            return self.base;
        }
        let digest = Sha256::digest(key.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        self.base + Duration::from_millis(u64::from_be_bytes(head) % self.jitter_ms)
    }
}

/// Runs every job of `plan` on `plan.parallelism` threads and returns the
/// final counts. The first dashboard error stops the pool and is returned.
pub fn run_simulated_batch(
    plan: &BatchPlan,
    dashboard: &DashboardCoordinator,
    clock: Arc<dyn Clock>,
) -> Result<AggregateSummary, DashboardError> {
    let record = ModelStatusTracker::with_clock(&plan.jobs, Arc::clone(&clock))?;
    let (job_tx, job_rx) = unbounded::<JobSpec>();
    for job in &plan.jobs {
        let _ = job_tx.send(job.clone());
    }
    drop(job_tx);

    let first_error: Mutex<Option<DashboardError>> = Mutex::new(None);
    let workers = plan.parallelism.min(plan.jobs.len()).max(1);
    thread::scope(|scope| {
        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let clock = Arc::clone(&clock);
            let record = &record;
            let first_error = &first_error;
            scope.spawn(move || {
                for job in job_rx.iter() {
                    if first_error
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .is_some()
                    {
                        break;
                    }
                    if let Err(err) = run_job(plan, &job, dashboard, record, clock.as_ref()) {
                        first_error
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .get_or_insert(err);
                        break;
                    }
                }
            });
        }
    });

    if let Some(err) = first_error.into_inner().unwrap_or_else(PoisonError::into_inner) {
        return Err(err);
    }
    Ok(record.summary())
}

fn run_job(
    plan: &BatchPlan,
    job: &JobSpec,
    dashboard: &DashboardCoordinator,
    record: &ModelStatusTracker,
    clock: &dyn Clock,
) -> Result<(), DashboardError> {
    let key = job.key.as_str();
    let total = plan.duration_for(key);
    let half = total / 2;
    let mut elapsed = Duration::ZERO;

    transition(dashboard, record, key, JobPhase::Starting, Duration::ZERO, "")?;
    append_run_log("debug", "batch.job.started", json!({ "key": key }));
    transition(dashboard, record, key, JobPhase::Processing, Duration::ZERO, "")?;
    clock.sleep(half);
    elapsed += half;

    if plan.rate_limited.contains(key) {
        record.update_rate_limited(key, plan.rate_limit);
        dashboard.update_rate_limited(key, plan.rate_limit)?;
        append_run_log(
            "info",
            "batch.job.rate_limited",
            json!({ "key": key, "retry_after_ms": plan.rate_limit.as_millis() as u64 }),
        );
        clock.sleep(plan.rate_limit);
        elapsed += plan.rate_limit;
        transition(dashboard, record, key, JobPhase::Processing, Duration::ZERO, "")?;
    }

    clock.sleep(total - half);
    elapsed += total - half;

    match plan.failures.get(key) {
        Some(reason) => {
            transition(dashboard, record, key, JobPhase::Failed, elapsed, reason)?;
            append_run_log(
                "warn",
                "batch.job.failed",
                json!({ "key": key, "duration_ms": elapsed.as_millis() as u64, "reason": reason }),
            );
        }
        None => {
            transition(dashboard, record, key, JobPhase::Completed, elapsed, "")?;
            append_run_log(
                "info",
                "batch.job.completed",
                json!({ "key": key, "duration_ms": elapsed.as_millis() as u64 }),
            );
        }
    }
    Ok(())
}

fn transition(
    dashboard: &DashboardCoordinator,
    record: &ModelStatusTracker,
    key: &str,
    phase: JobPhase,
    duration: Duration,
    error_message: &str,
) -> Result<(), DashboardError> {
    record.update_status(key, phase, duration, error_message);
    dashboard.update_status(key, phase, duration, error_message)
}

#[cfg(test)]
mod tests {
    use super::{run_simulated_batch, BatchPlan, DEFAULT_FAILURE_REASON};
    use crate::config::BatchConfig;
    use crate::dashboard::{DashboardCoordinator, DashboardOptions};
    use crate::runtime::{FakeClock, FakeTerminal};
    use crate::types::{JobPhase, JobSpec};
    use std::sync::Arc;
    use std::time::Duration;

    fn batch(models: &[&str]) -> BatchConfig {
        BatchConfig {
            models: models.iter().map(|m| m.to_string()).collect(),
            ..BatchConfig::default()
        }
    }

    fn plain_dashboard() -> DashboardCoordinator {
        DashboardCoordinator::new(
            DashboardOptions {
                spinner_tick: None,
                ..DashboardOptions::default()
            },
            Arc::new(FakeTerminal::new(false)),
        )
    }

    #[test]
    fn plan_parses_failure_reasons() {
        let mut cfg = batch(&["gpt-4o", "phi-3"]);
        cfg.fail = vec!["gpt-4o=timeout".to_string(), "phi-3".to_string()];
        let plan = BatchPlan::from_config(&cfg);
        assert_eq!(plan.failures.get("gpt-4o").map(String::as_str), Some("timeout"));
        assert_eq!(
            plan.failures.get("phi-3").map(String::as_str),
            Some(DEFAULT_FAILURE_REASON)
        );
        assert_eq!(plan.jobs[0], JobSpec::new("gpt-4o", "gpt-4o (openai)"));
    }

    #[test]
    fn durations_are_deterministic_and_bounded() {
        let plan = BatchPlan::from_config(&batch(&[]));
        let a = plan.duration_for("gpt-4o");
        assert_eq!(a, plan.duration_for("gpt-4o"));
        assert!(a >= Duration::from_millis(400) && a < Duration::from_millis(1000));

        let mut flat = batch(&[]);
        flat.jitter_ms = 0;
        assert_eq!(BatchPlan::from_config(&flat).duration_for("x"), Duration::from_millis(400));
    }

    #[test]
    fn batch_reports_failures_and_rate_limits() {
        let mut cfg = batch(&["a", "b", "c"]);
        cfg.fail = vec!["b=timeout".to_string()];
        cfg.rate_limit = vec!["c".to_string()];
        cfg.parallelism = 2;
        let plan = BatchPlan::from_config(&cfg);
        let clock = FakeClock::default();
        let dashboard = plain_dashboard();
        dashboard.start_tracking(&plan.jobs).expect("start");

        let summary = run_simulated_batch(&plan, &dashboard, Arc::new(clock.clone())).expect("batch");
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.completion_rate, 1.0);

        let snapshot = dashboard.snapshot().expect("snapshot");
        assert_eq!(snapshot.jobs[1].phase, JobPhase::Failed);
        assert_eq!(snapshot.jobs[1].error_message.as_deref(), Some("timeout"));
        assert!(clock.sleeps().contains(&Duration::from_millis(1500)));
    }

    #[test]
    fn write_failure_stops_the_pool() {
        let terminal = FakeTerminal::new(false);
        let dashboard = DashboardCoordinator::new(
            DashboardOptions {
                spinner_tick: None,
                ..DashboardOptions::default()
            },
            Arc::new(terminal.clone()),
        );
        let plan = BatchPlan::from_config(&batch(&["a", "b"]));
        dashboard.start_tracking(&plan.jobs).expect("start");
        terminal.set_fail_writes(true);
        let result = run_simulated_batch(&plan, &dashboard, Arc::new(FakeClock::default()));
        assert!(result.is_err());
    }
}
