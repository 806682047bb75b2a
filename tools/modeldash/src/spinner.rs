//! Spinner animation state and the background ticker that drives it.

use crate::errors::DashboardError;
use crate::logging::append_run_log;
use crossbeam_channel::{bounded, select, tick, Sender};
use serde_json::json;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread;
use std::time::Duration;

pub const DEFAULT_TICK: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct Spinner {
    frames: &'static [&'static str],
    position: usize,
}

impl Spinner {
    pub fn new(frames: &'static [&'static str]) -> Self {
        Self {
            frames,
            position: 0,
        }
    }

    pub fn current(&self) -> &'static str {
        if self.frames.is_empty() {
            return " ";
        }
        self.frames[self.position % self.frames.len()]
    }

    pub fn advance(&mut self) {
        self.position = self.position.wrapping_add(1);
    }
}

/// What the ticker does after a tick callback returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickFlow {
    Continue,
    Stop,
}

/// Periodic background task. Dropping the ticker stops it and joins the thread.
pub struct Ticker {
    done: Option<Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Ticker {
    /// Calls `on_tick` every `period` until stopped, until the callback asks to
    /// stop, or until it fails or panics. Failures and panics are logged.
    pub fn spawn<F>(period: Duration, mut on_tick: F) -> Result<Self, DashboardError>
    where
        F: FnMut() -> Result<TickFlow, DashboardError> + Send + 'static,
    {
        let (done_tx, done_rx) = bounded::<()>(0);
        let handle = thread::Builder::new()
            .name("modeldash-ticker".to_string())
            .spawn(move || {
                let ticks = tick(period);
                loop {
                    select! {
                        recv(done_rx) -> _ => break,
                        recv(ticks) -> _ => {
                            match catch_unwind(AssertUnwindSafe(&mut on_tick)) {
                                Ok(Ok(TickFlow::Continue)) => {}
                                Ok(Ok(TickFlow::Stop)) => break,
                                Ok(Err(err)) => {
                                    append_run_log(
                                        "error",
                                        "ticker.tick.failed",
                                        json!({ "error": err.to_string() }),
                                    );
                                    break;
                                }
                                Err(panic) => {
                                    append_run_log(
                                        "error",
                                        "ticker.tick.panicked",
                                        json!({ "message": panic_message(panic.as_ref()) }),
                                    );
                                    break;
                                }
                            }
                        }
                    }
                }
            })
            .map_err(|e| DashboardError::Ticker(e.to_string()))?;
        Ok(Self {
            done: Some(done_tx),
            handle: Some(handle),
        })
    }

    /// Signals the thread to exit without waiting for it.
    pub fn signal_stop(&mut self) {
        drop(self.done.take());
    }

    /// Signals and joins. Idempotent.
    pub fn stop(&mut self) {
        self.signal_stop();
        let Some(handle) = self.handle.take() else {
            return;
        };
        // The last owner can be dropped from inside a tick; joining there would self-deadlock.
        if handle.thread().id() == thread::current().id() {
            return;
        }
        let _ = handle.join();
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = panic.downcast_ref::<&str>() {
        return (*text).to_string();
    }
    if let Some(text) = panic.downcast_ref::<String>() {
        return text.clone();
    }
    "non-string panic payload".to_string()
}

#[cfg(test)]
mod tests {
    use super::{Spinner, TickFlow, Ticker};
    use crate::errors::DashboardError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn spinner_cycles_through_frames() {
        let mut spinner = Spinner::new(&["a", "b", "c"]);
        let seen = (0..4)
            .map(|_| {
                let frame = spinner.current();
                spinner.advance();
                frame
            })
            .collect::<Vec<_>>();
        assert_eq!(seen, vec!["a", "b", "c", "a"]);
        assert_eq!(Spinner::new(&[]).current(), " ");
    }

    #[test]
    fn ticker_calls_back_until_stopped() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let mut ticker = Ticker::spawn(Duration::from_millis(5), move || {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(TickFlow::Continue)
        })
        .expect("spawn");
        assert!(wait_for(|| count.load(Ordering::SeqCst) >= 3));
        ticker.stop();
        assert!(!ticker.is_running());
        let after_stop = count.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(count.load(Ordering::SeqCst), after_stop);
        ticker.stop();
    }

    #[test]
    fn ticker_exits_on_stop_flow_error_and_panic() {
        let mut stopping = Ticker::spawn(Duration::from_millis(2), || Ok(TickFlow::Stop)).expect("spawn");
        let mut failing = Ticker::spawn(Duration::from_millis(2), || {
            Err(DashboardError::Io("broken pipe".to_string()))
        })
        .expect("spawn");
        let mut panicking = Ticker::spawn(Duration::from_millis(2), || -> Result<TickFlow, DashboardError> {
            panic!("tick exploded")
        })
        .expect("spawn");

        assert!(wait_for(|| !stopping.is_running()));
        assert!(wait_for(|| !failing.is_running()));
        assert!(wait_for(|| !panicking.is_running()));
        stopping.stop();
        failing.stop();
        panicking.stop();
    }

    #[test]
    fn many_tickers_start_and_stop_cleanly() {
        for _ in 0..50 {
            let ticker = Ticker::spawn(Duration::from_millis(1), || Ok(TickFlow::Continue)).expect("spawn");
            drop(ticker);
        }
    }
}
