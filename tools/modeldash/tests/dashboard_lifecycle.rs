use modeldash::dashboard::{DashboardCoordinator, DashboardOptions};
use modeldash::errors::DashboardError;
use modeldash::renderer::RendererOptions;
use modeldash::runtime::FakeTerminal;
use modeldash::style::{ColorScheme, SymbolProvider};
use modeldash::types::{JobPhase, JobSpec, Lifecycle};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn jobs(keys: &[&str]) -> Vec<JobSpec> {
    keys.iter().map(|k| JobSpec::new(*k, *k)).collect()
}

fn interactive_options(tick: Option<Duration>) -> DashboardOptions {
    DashboardOptions {
        spinner_tick: tick,
        renderer: RendererOptions {
            interactive: true,
            colors: ColorScheme::disabled(),
            symbols: SymbolProvider::unicode(),
            ..RendererOptions::default()
        },
        ..DashboardOptions::default()
    }
}

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

#[test]
fn lifecycle_moves_idle_tracking_finished() {
    let terminal = FakeTerminal::new(true);
    let dashboard = DashboardCoordinator::new(interactive_options(None), Arc::new(terminal.clone()));
    assert_eq!(dashboard.lifecycle(), Lifecycle::Idle);
    assert_eq!(dashboard.finish_tracking().expect("finish idle"), None);
    assert_eq!(dashboard.lifecycle(), Lifecycle::Finished);

    dashboard.start_tracking(&jobs(&["a"])).expect("start after finish");
    assert_eq!(dashboard.lifecycle(), Lifecycle::Finished);
    assert!(terminal.writes().is_empty());
}

#[test]
fn finish_returns_the_summary_once_and_clears_the_frame() {
    let terminal = FakeTerminal::new(true);
    let dashboard = DashboardCoordinator::new(interactive_options(None), Arc::new(terminal.clone()));
    dashboard.start_tracking(&jobs(&["a", "b", "c"])).expect("start");
    dashboard
        .update_status("a", JobPhase::Completed, Duration::from_millis(850), "")
        .expect("update");
    dashboard
        .update_status("b", JobPhase::Failed, Duration::ZERO, "timeout")
        .expect("update");

    let summary = dashboard.finish_tracking().expect("finish").expect("summary");
    assert_eq!((summary.total, summary.completed, summary.failed, summary.queued), (3, 1, 1, 1));
    let last = terminal.writes().last().cloned().unwrap_or_default();
    assert_eq!(last.matches("\x1b[5A").count(), 2);

    assert_eq!(dashboard.finish_tracking().expect("second finish"), None);
    let writes = terminal.writes().len();
    dashboard
        .update_status("c", JobPhase::Completed, Duration::ZERO, "")
        .expect("late update");
    dashboard.refresh_display().expect("late refresh");
    dashboard.force_redraw().expect("late redraw");
    assert_eq!(terminal.writes().len(), writes);
}

#[test]
fn quiet_and_no_progress_never_touch_the_terminal() {
    for options in [
        DashboardOptions {
            quiet: true,
            ..interactive_options(Some(Duration::from_millis(1)))
        },
        DashboardOptions {
            no_progress: true,
            ..interactive_options(Some(Duration::from_millis(1)))
        },
    ] {
        let terminal = FakeTerminal::new(true);
        let dashboard = DashboardCoordinator::new(options, Arc::new(terminal.clone()));
        dashboard.start_tracking(&jobs(&["a"])).expect("start");
        dashboard
            .update_status("a", JobPhase::Completed, Duration::ZERO, "")
            .expect("update");
        thread::sleep(Duration::from_millis(10));
        assert_eq!(dashboard.finish_tracking().expect("finish"), None);
        assert!(terminal.writes().is_empty());
    }
}

#[test]
fn write_failures_reach_the_caller() {
    let terminal = FakeTerminal::new(true);
    let dashboard = DashboardCoordinator::new(interactive_options(None), Arc::new(terminal.clone()));
    dashboard.start_tracking(&jobs(&["a"])).expect("start");
    terminal.set_fail_writes(true);
    let err = dashboard
        .update_status("a", JobPhase::Processing, Duration::ZERO, "")
        .err();
    assert!(matches!(err, Some(DashboardError::Io(_))));
    assert!(dashboard.refresh_display().is_err());
    assert!(dashboard.finish_tracking().is_err());
    assert_eq!(dashboard.lifecycle(), Lifecycle::Finished);
}

#[test]
fn failed_first_frame_leaves_the_dashboard_idle() {
    let terminal = FakeTerminal::new(true);
    terminal.set_fail_writes(true);
    let dashboard = DashboardCoordinator::new(
        interactive_options(Some(Duration::from_millis(1))),
        Arc::new(terminal.clone()),
    );
    assert!(dashboard.start_tracking(&jobs(&["a"])).is_err());
    assert_eq!(dashboard.lifecycle(), Lifecycle::Idle);
}

#[test]
fn spinner_ticks_redraw_until_finish() {
    let terminal = FakeTerminal::new(true);
    let dashboard = DashboardCoordinator::new(
        interactive_options(Some(Duration::from_millis(2))),
        Arc::new(terminal.clone()),
    );
    dashboard.start_tracking(&jobs(&["a", "b"])).expect("start");
    dashboard
        .update_status("a", JobPhase::Processing, Duration::ZERO, "")
        .expect("update");
    let after_update = terminal.writes().len();
    assert!(wait_for(|| terminal.writes().len() >= after_update + 3));

    dashboard.finish_tracking().expect("finish");
    let settled = terminal.writes().len();
    thread::sleep(Duration::from_millis(20));
    assert_eq!(terminal.writes().len(), settled);
}

#[test]
fn ticks_stop_drawing_once_everything_is_terminal() {
    let terminal = FakeTerminal::new(true);
    let dashboard = DashboardCoordinator::new(
        interactive_options(Some(Duration::from_millis(2))),
        Arc::new(terminal.clone()),
    );
    dashboard.start_tracking(&jobs(&["a"])).expect("start");
    dashboard
        .update_status("a", JobPhase::Completed, Duration::from_millis(5), "")
        .expect("update");
    let settled = terminal.writes().len();
    thread::sleep(Duration::from_millis(20));
    assert_eq!(terminal.writes().len(), settled);
    dashboard.finish_tracking().expect("finish");
}

#[test]
fn concurrent_updates_render_complete_frames() {
    let terminal = FakeTerminal::new(true);
    let dashboard = DashboardCoordinator::new(
        interactive_options(Some(Duration::from_millis(1))),
        Arc::new(terminal.clone()),
    );
    let keys = (0..16).map(|i| format!("m{i}")).collect::<Vec<_>>();
    let specs = keys.iter().map(|k| JobSpec::new(k.clone(), k.clone())).collect::<Vec<_>>();
    dashboard.start_tracking(&specs).expect("start");

    let handles = keys
        .into_iter()
        .map(|key| {
            let dashboard = dashboard.clone();
            thread::spawn(move || {
                dashboard.update_status(&key, JobPhase::Processing, Duration::ZERO, "")?;
                dashboard.update_rate_limited(&key, Duration::from_millis(5))?;
                dashboard.update_status(&key, JobPhase::Completed, Duration::from_millis(7), "")
            })
        })
        .collect::<Vec<_>>();
    for handle in handles {
        handle.join().expect("join").expect("update");
    }

    let summary = dashboard.finish_tracking().expect("finish").expect("summary");
    assert_eq!(summary.completed, 16);
    let frame_lines = 16 + 2;
    for write in terminal.writes().iter().skip(1) {
        let lines = write.matches('\n').count();
        assert!(lines == frame_lines || write.starts_with("\x1b[18A"), "{write:?}");
    }
}

#[test]
fn many_dashboards_start_and_stop_without_leaking_tickers() {
    for _ in 0..100 {
        let terminal = FakeTerminal::new(true);
        let dashboard = DashboardCoordinator::new(
            interactive_options(Some(Duration::from_millis(1))),
            Arc::new(terminal),
        );
        dashboard.start_tracking(&jobs(&["a", "b"])).expect("start");
        dashboard.finish_tracking().expect("finish");
    }
    for _ in 0..20 {
        let dashboard = DashboardCoordinator::new(
            interactive_options(Some(Duration::from_millis(1))),
            Arc::new(FakeTerminal::new(true)),
        );
        dashboard.start_tracking(&jobs(&["a"])).expect("start");
        drop(dashboard);
    }
}
