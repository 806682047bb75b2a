//! Concurrent per-job status store for one batch.

use crate::errors::DashboardError;
use crate::runtime::{Clock, ProductionClock};
use crate::types::{JobPhase, JobSpec};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobState {
    pub key: String,
    pub display_name: String,
    /// 1-based, fixed at construction.
    pub index: usize,
    pub phase: JobPhase,
    pub duration: Duration,
    pub retry_after: Option<Duration>,
    pub error_message: Option<String>,
    pub last_update: SystemTime,
}

/// Ordered copy of every job, taken under the tracker lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub jobs: Vec<JobState>,
    pub started_at: SystemTime,
}

impl StatusSnapshot {
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn summary(&self) -> AggregateSummary {
        AggregateSummary::from_jobs(&self.jobs)
    }

    pub fn all_terminal(&self) -> bool {
        self.jobs.iter().all(|job| job.phase.is_terminal())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AggregateSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub rate_limited: usize,
    /// Jobs in `Starting` or `Processing`.
    pub processing: usize,
    pub queued: usize,
    pub completion_rate: f64,
    pub success_rate: f64,
}

impl AggregateSummary {
    pub fn from_jobs(jobs: &[JobState]) -> Self {
        let mut summary = Self {
            total: jobs.len(),
            completed: 0,
            failed: 0,
            rate_limited: 0,
            processing: 0,
            queued: 0,
            completion_rate: 0.0,
            success_rate: 0.0,
        };
        for job in jobs {
            match job.phase {
                JobPhase::Queued => summary.queued += 1,
                JobPhase::Starting | JobPhase::Processing => summary.processing += 1,
                JobPhase::RateLimited => summary.rate_limited += 1,
                JobPhase::Completed => summary.completed += 1,
                JobPhase::Failed => summary.failed += 1,
            }
        }
        let resolved = summary.resolved();
        if summary.total > 0 {
            summary.completion_rate = resolved as f64 / summary.total as f64;
        }
        if resolved > 0 {
            summary.success_rate = summary.completed as f64 / resolved as f64;
        }
        summary
    }

    /// Completed plus failed.
    pub fn resolved(&self) -> usize {
        self.completed + self.failed
    }
}

struct TrackerState {
    jobs: Vec<JobState>,
    positions: HashMap<String, usize>,
}

/// Fixed-cardinality key -> state store. Safe to share across threads.
///
/// The tracker stores whatever it is told; transitions are not validated.
/// Updates for unknown keys are dropped.
pub struct ModelStatusTracker {
    state: RwLock<TrackerState>,
    started_at: SystemTime,
    clock: Arc<dyn Clock>,
}

impl ModelStatusTracker {
    pub fn new(jobs: &[JobSpec]) -> Result<Self, DashboardError> {
        Self::with_clock(jobs, Arc::new(ProductionClock))
    }

    pub fn with_clock(jobs: &[JobSpec], clock: Arc<dyn Clock>) -> Result<Self, DashboardError> {
        let started_at = clock.now();
        let mut positions = HashMap::with_capacity(jobs.len());
        let mut states = Vec::with_capacity(jobs.len());
        for (position, spec) in jobs.iter().enumerate() {
            if positions.insert(spec.key.clone(), position).is_some() {
                return Err(DashboardError::DuplicateJobKey(spec.key.clone()));
            }
            states.push(JobState {
                key: spec.key.clone(),
                display_name: spec.display_name.clone(),
                index: position + 1,
                phase: JobPhase::Queued,
                duration: Duration::ZERO,
                retry_after: None,
                error_message: None,
                last_update: started_at,
            });
        }
        Ok(Self {
            state: RwLock::new(TrackerState {
                jobs: states,
                positions,
            }),
            started_at,
            clock,
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, TrackerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, TrackerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Overwrites the job's phase plus the fields that phase carries.
    /// Returns `false` only for an unknown key.
    pub fn update_status(
        &self,
        key: &str,
        phase: JobPhase,
        duration: Duration,
        error_message: &str,
    ) -> bool {
        let now = self.clock.now();
        let mut state = self.write();
        let Some(job) = job_mut(&mut state, key) else {
            return false;
        };
        job.phase = phase;
        match phase {
            JobPhase::Completed => {
                job.duration = duration;
                job.error_message = None;
                job.retry_after = None;
            }
            JobPhase::Failed => {
                if !duration.is_zero() {
                    job.duration = duration;
                }
                job.error_message = (!error_message.is_empty()).then(|| error_message.to_string());
                job.retry_after = None;
            }
            JobPhase::RateLimited => {}
            JobPhase::Queued | JobPhase::Starting | JobPhase::Processing => {
                job.retry_after = None;
            }
        }
        job.last_update = now;
        true
    }

    /// Marks the job rate limited. Accumulated duration is kept.
    pub fn update_rate_limited(&self, key: &str, retry_after: Duration) -> bool {
        let now = self.clock.now();
        let mut state = self.write();
        let Some(job) = job_mut(&mut state, key) else {
            return false;
        };
        job.phase = JobPhase::RateLimited;
        job.retry_after = Some(retry_after);
        job.last_update = now;
        true
    }

    pub fn len(&self) -> usize {
        self.read().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().jobs.is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.read().jobs.iter().map(|job| job.key.clone()).collect()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            jobs: self.read().jobs.clone(),
            started_at: self.started_at,
        }
    }

    pub fn summary(&self) -> AggregateSummary {
        AggregateSummary::from_jobs(&self.read().jobs)
    }

    pub fn all_terminal(&self) -> bool {
        self.read().jobs.iter().all(|job| job.phase.is_terminal())
    }

    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.clock
            .now()
            .duration_since(self.started_at)
            .unwrap_or(Duration::ZERO)
    }
}

fn job_mut<'a>(state: &'a mut TrackerState, key: &str) -> Option<&'a mut JobState> {
    let position = *state.positions.get(key)?;
    state.jobs.get_mut(position)
}
