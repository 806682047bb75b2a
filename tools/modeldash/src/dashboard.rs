//! The façade callers drive: start, update from any thread, refresh, finish.
//!
//! One mutex guards the tracker, the renderer and the lifecycle. Every public
//! method holds it for its whole duration, render included, so terminal output
//! is a strictly ordered sequence of complete frames. The spinner ticker takes
//! the same mutex for its tick-driven redraws.

use crate::errors::DashboardError;
use crate::logging::append_run_log;
use crate::renderer::{RendererOptions, StatusRenderer};
use crate::runtime::{Clock, ProductionClock, Terminal};
use crate::spinner::{TickFlow, DEFAULT_TICK};
use crate::tracker::{AggregateSummary, ModelStatusTracker, StatusSnapshot};
use crate::types::{JobPhase, JobSpec, Lifecycle};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone)]
pub struct DashboardOptions {
    /// Suppresses all non-essential rendering.
    pub quiet: bool,
    /// Suppresses per-job lines; banners are the caller's business.
    pub no_progress: bool,
    /// `None` disables the spinner ticker.
    pub spinner_tick: Option<Duration>,
    pub renderer: RendererOptions,
}

impl Default for DashboardOptions {
    fn default() -> Self {
        Self {
            quiet: false,
            no_progress: false,
            spinner_tick: Some(DEFAULT_TICK),
            renderer: RendererOptions::default(),
        }
    }
}

/// Run-log events collected while the dashboard lock is held. Written by
/// `flush` once the guard is gone, so updates never wait on log file I/O.
#[derive(Default)]
struct PendingLog(Vec<(&'static str, &'static str, Value)>);

impl PendingLog {
    fn push(&mut self, level: &'static str, event_type: &'static str, payload: Value) {
        self.0.push((level, event_type, payload));
    }

    fn flush(self) {
        for (level, event_type, payload) in self.0 {
            append_run_log(level, event_type, payload);
        }
    }
}

struct Session {
    tracker: ModelStatusTracker,
    renderer: StatusRenderer,
    batch_id: String,
}

struct DashboardState {
    lifecycle: Lifecycle,
    session: Option<Session>,
}

impl DashboardState {
    fn tracking_session(&mut self) -> Option<&mut Session> {
        if self.lifecycle != Lifecycle::Tracking {
            return None;
        }
        self.session.as_mut()
    }
}

impl Session {
    fn render(&mut self, force_full: bool, pending: &mut PendingLog) -> Result<(), DashboardError> {
        let snapshot = self.tracker.snapshot();
        let result = self.renderer.render(&snapshot, force_full);
        if let Some(width) = self.renderer.take_width_fallback() {
            pending.push(
                "debug",
                "renderer.width.fallback",
                json!({ "batch_id": self.batch_id, "fallback_width": width }),
            );
        }
        result
    }
}

/// Cheap to clone; clones share one dashboard.
#[derive(Clone)]
pub struct DashboardCoordinator {
    shared: Arc<Mutex<DashboardState>>,
    options: Arc<DashboardOptions>,
    terminal: Arc<dyn Terminal>,
    clock: Arc<dyn Clock>,
}

fn lock(shared: &Mutex<DashboardState>) -> MutexGuard<'_, DashboardState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DashboardCoordinator {
    pub fn new(options: DashboardOptions, terminal: Arc<dyn Terminal>) -> Self {
        Self::with_clock(options, terminal, Arc::new(ProductionClock))
    }

    pub fn with_clock(
        options: DashboardOptions,
        terminal: Arc<dyn Terminal>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            shared: Arc::new(Mutex::new(DashboardState {
                lifecycle: Lifecycle::Idle,
                session: None,
            })),
            options: Arc::new(options),
            terminal,
            clock,
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        lock(&self.shared).lifecycle
    }

    /// Builds the tracker and renderer for `jobs` and draws the first frame.
    /// No-op in quiet or no-progress mode, or when not `Idle`.
    pub fn start_tracking(&self, jobs: &[JobSpec]) -> Result<(), DashboardError> {
        let mut pending = PendingLog::default();
        let result = self.start_locked(jobs, &mut pending);
        pending.flush();
        result
    }

    fn start_locked(&self, jobs: &[JobSpec], pending: &mut PendingLog) -> Result<(), DashboardError> {
        let mut state = lock(&self.shared);
        if self.options.quiet || self.options.no_progress || state.lifecycle != Lifecycle::Idle {
            pending.push(
                "debug",
                "dashboard.start.skipped",
                json!({
                    "quiet": self.options.quiet,
                    "no_progress": self.options.no_progress,
                    "lifecycle": format!("{:?}", state.lifecycle),
                }),
            );
            return Ok(());
        }

        let tracker = ModelStatusTracker::with_clock(jobs, Arc::clone(&self.clock))?;
        let renderer = StatusRenderer::new(Arc::clone(&self.terminal), self.options.renderer.clone());
        let batch_id = batch_id(jobs, tracker.started_at());
        pending.push(
            "info",
            "dashboard.start",
            json!({
                "batch_id": batch_id,
                "jobs": jobs.len(),
                "interactive": renderer.is_interactive(),
            }),
        );

        let mut session = Session {
            tracker,
            renderer,
            batch_id,
        };
        session.render(false, pending)?;
        if let Some(period) = self.options.spinner_tick {
            let weak = Arc::downgrade(&self.shared);
            session
                .renderer
                .start_ticker(period, move || tick(&weak))?;
        }
        state.session = Some(session);
        state.lifecycle = Lifecycle::Tracking;
        Ok(())
    }

    pub fn update_status(
        &self,
        key: &str,
        phase: JobPhase,
        duration: Duration,
        error_message: &str,
    ) -> Result<(), DashboardError> {
        self.with_session(|session, pending| {
            if !session.tracker.update_status(key, phase, duration, error_message) {
                log_unknown_key(session, key, phase, pending);
                return Ok(());
            }
            session.render(false, pending)
        })
    }

    pub fn update_rate_limited(&self, key: &str, retry_after: Duration) -> Result<(), DashboardError> {
        self.with_session(|session, pending| {
            if !session.tracker.update_rate_limited(key, retry_after) {
                log_unknown_key(session, key, JobPhase::RateLimited, pending);
                return Ok(());
            }
            session.render(false, pending)
        })
    }

    /// Redraws the current state without changing it.
    pub fn refresh_display(&self) -> Result<(), DashboardError> {
        self.with_session(|session, pending| session.render(false, pending))
    }

    /// Recomputes layout from the current terminal width and draws a fresh
    /// frame without moving the cursor up first.
    pub fn force_redraw(&self) -> Result<(), DashboardError> {
        self.with_session(|session, pending| {
            session.renderer.request_layout_recompute();
            session.render(true, pending)
        })
    }

    pub fn snapshot(&self) -> Option<StatusSnapshot> {
        lock(&self.shared)
            .session
            .as_ref()
            .map(|session| session.tracker.snapshot())
    }

    pub fn summary(&self) -> Option<AggregateSummary> {
        lock(&self.shared)
            .session
            .as_ref()
            .map(|session| session.tracker.summary())
    }

    /// Stops the ticker, clears the interactive frame and moves to `Finished`.
    /// Returns the final summary the first time, `None` afterwards.
    pub fn finish_tracking(&self) -> Result<Option<AggregateSummary>, DashboardError> {
        let mut pending = PendingLog::default();
        let (ticker, result) = {
            let mut state = lock(&self.shared);
            if state.lifecycle != Lifecycle::Tracking {
                if state.lifecycle == Lifecycle::Idle {
                    state.lifecycle = Lifecycle::Finished;
                }
                return Ok(None);
            }
            state.lifecycle = Lifecycle::Finished;
            let Some(session) = state.session.as_mut() else {
                return Ok(None);
            };
            let ticker = session.renderer.detach_ticker();
            let summary = session.tracker.summary();
            pending.push(
                "info",
                "dashboard.finish",
                json!({
                    "batch_id": session.batch_id,
                    "elapsed_ms": session.tracker.elapsed().as_millis() as u64,
                    "summary": summary,
                }),
            );
            let result = session.renderer.clear().map(|()| Some(summary));
            (ticker, result)
        };
        // Joined outside the lock: a tick may be waiting on it.
        drop(ticker);
        pending.flush();
        result
    }

    /// Runs `op` on the tracking session under the lock; no-op outside `Tracking`.
    fn with_session<F>(&self, op: F) -> Result<(), DashboardError>
    where
        F: FnOnce(&mut Session, &mut PendingLog) -> Result<(), DashboardError>,
    {
        let mut pending = PendingLog::default();
        let result = {
            let mut state = lock(&self.shared);
            match state.tracking_session() {
                Some(session) => op(session, &mut pending),
                None => Ok(()),
            }
        };
        pending.flush();
        result
    }
}

fn tick(weak: &Weak<Mutex<DashboardState>>) -> Result<TickFlow, DashboardError> {
    let Some(shared) = weak.upgrade() else {
        return Ok(TickFlow::Stop);
    };
    let mut pending = PendingLog::default();
    let flow = {
        let mut state = lock(&shared);
        match state.tracking_session() {
            None => Ok(TickFlow::Stop),
            Some(session) => {
                session.renderer.advance_spinner();
                if session.tracker.all_terminal() {
                    Ok(TickFlow::Continue)
                } else {
                    session.render(false, &mut pending).map(|()| TickFlow::Continue)
                }
            }
        }
    };
    pending.flush();
    flow
}

fn log_unknown_key(session: &Session, key: &str, phase: JobPhase, pending: &mut PendingLog) {
    pending.push(
        "debug",
        "dashboard.update.unknown_key",
        json!({
            "batch_id": session.batch_id,
            "key": key,
            "phase": phase.as_str(),
        }),
    );
}

/// Short correlation id for one batch: SHA-256 over the ordered keys and start time.
pub fn batch_id(jobs: &[JobSpec], started_at: SystemTime) -> String {
    let mut hasher = Sha256::new();
    for job in jobs {
        hasher.update(job.key.as_bytes());
        hasher.update([0u8]);
    }
    let nanos = started_at
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    hasher.update(nanos.to_le_bytes());
    let digest = hasher.finalize();
    digest
        .iter()
        .take(6)
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{batch_id, DashboardCoordinator, DashboardOptions};
    use crate::runtime::FakeTerminal;
    use crate::types::{JobPhase, JobSpec, Lifecycle};
    use std::sync::Arc;
    use std::time::{Duration, SystemTime};

    fn options() -> DashboardOptions {
        DashboardOptions {
            spinner_tick: None,
            ..DashboardOptions::default()
        }
    }

    #[test]
    fn batch_id_is_stable_and_order_sensitive() {
        let a = [JobSpec::new("a", "a"), JobSpec::new("b", "b")];
        let b = [JobSpec::new("b", "b"), JobSpec::new("a", "a")];
        let at = SystemTime::UNIX_EPOCH + Duration::from_secs(7);
        assert_eq!(batch_id(&a, at), batch_id(&a, at));
        assert_ne!(batch_id(&a, at), batch_id(&b, at));
        assert_eq!(batch_id(&a, at).len(), 12);
    }

    #[test]
    fn updates_before_start_are_ignored() {
        let terminal = FakeTerminal::new(false);
        let dashboard = DashboardCoordinator::new(options(), Arc::new(terminal.clone()));
        dashboard
            .update_status("a", JobPhase::Completed, Duration::ZERO, "")
            .expect("update");
        dashboard.refresh_display().expect("refresh");
        assert_eq!(dashboard.lifecycle(), Lifecycle::Idle);
        assert!(terminal.writes().is_empty());
    }

    #[test]
    fn unknown_keys_do_not_render() {
        let terminal = FakeTerminal::new(false);
        let dashboard = DashboardCoordinator::new(options(), Arc::new(terminal.clone()));
        dashboard.start_tracking(&[JobSpec::new("a", "a")]).expect("start");
        let before = terminal.writes().len();
        dashboard
            .update_status("ghost", JobPhase::Completed, Duration::ZERO, "")
            .expect("update");
        assert_eq!(terminal.writes().len(), before);
    }

    #[test]
    fn second_start_is_a_no_op() {
        let terminal = FakeTerminal::new(false);
        let dashboard = DashboardCoordinator::new(options(), Arc::new(terminal.clone()));
        dashboard.start_tracking(&[JobSpec::new("a", "a")]).expect("start");
        dashboard
            .start_tracking(&[JobSpec::new("x", "x"), JobSpec::new("y", "y")])
            .expect("restart");
        assert_eq!(dashboard.snapshot().map(|s| s.len()), Some(1));
    }
}
