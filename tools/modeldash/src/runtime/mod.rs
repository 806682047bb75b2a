use crate::errors::DashboardError;
use std::collections::HashMap;
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
    fn sleep(&self, duration: Duration);
}

pub trait FileSystem: Send + Sync {
    fn read_to_string(&self, path: &Path) -> Result<String, DashboardError>;
    fn exists(&self, path: &Path) -> bool;
}

/// The one output surface the dashboard writes to.
pub trait Terminal: Send + Sync {
    fn is_tty(&self) -> bool;
    /// Column count, or `None` when the size cannot be queried.
    fn width(&self) -> Option<u16>;
    /// Writes `text` verbatim and flushes.
    fn write_raw(&self, text: &str) -> Result<(), DashboardError>;

    fn write_line(&self, line: &str) -> Result<(), DashboardError> {
        self.write_raw(&format!("{line}\n"))
    }
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct ProductionClock;

impl Clock for ProductionClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

pub struct ProductionFileSystem;

impl FileSystem for ProductionFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, DashboardError> {
        std::fs::read_to_string(path)
            .map_err(|e| DashboardError::Io(format!("{}: {e}", path.display())))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

pub struct ProductionTerminal;

impl Terminal for ProductionTerminal {
    fn is_tty(&self) -> bool {
        std::io::stdout().is_terminal()
    }

    fn width(&self) -> Option<u16> {
        crossterm::terminal::size()
            .ok()
            .map(|(cols, _)| cols)
            .filter(|cols| *cols > 0)
    }

    fn write_raw(&self, text: &str) -> Result<(), DashboardError> {
        let mut out = std::io::stdout().lock();
        out.write_all(text.as_bytes())?;
        out.flush()?;
        Ok(())
    }
}

pub struct ProductionRuntime {
    pub clock: Arc<dyn Clock>,
    pub file_system: Arc<dyn FileSystem>,
    pub terminal: Arc<dyn Terminal>,
}

impl ProductionRuntime {
    pub fn new() -> Self {
        Self {
            clock: Arc::new(ProductionClock),
            file_system: Arc::new(ProductionFileSystem),
            terminal: Arc::new(ProductionTerminal),
        }
    }
}

impl Default for ProductionRuntime {
    fn default() -> Self {
        Self::new()
    }
}

// ── Fakes ────────────────────────────────────────────────────────────────────

/// Clock whose `sleep` advances time instantly and records the request.
#[derive(Clone)]
pub struct FakeClock {
    now: Arc<Mutex<SystemTime>>,
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl FakeClock {
    pub fn new(now: SystemTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
            sleeps: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        locked(&self.sleeps).clone()
    }

    pub fn advance(&self, by: Duration) {
        let mut now = locked(&self.now);
        *now += by;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new(SystemTime::UNIX_EPOCH)
    }
}

impl Clock for FakeClock {
    fn now(&self) -> SystemTime {
        *locked(&self.now)
    }

    fn sleep(&self, duration: Duration) {
        locked(&self.sleeps).push(duration);
        self.advance(duration);
    }
}

#[derive(Default, Clone)]
pub struct FakeFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, String>>>,
}

impl FakeFileSystem {
    pub fn with_file(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        let fs = Self::default();
        locked(&fs.files).insert(path.into(), contents.into());
        fs
    }
}

impl FileSystem for FakeFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, DashboardError> {
        locked(&self.files)
            .get(path)
            .cloned()
            .ok_or_else(|| DashboardError::Io(format!("missing file {}", path.display())))
    }

    fn exists(&self, path: &Path) -> bool {
        locked(&self.files).contains_key(path)
    }
}

/// In-memory terminal. Every `write_raw` call is kept as one chunk.
#[derive(Clone)]
pub struct FakeTerminal {
    pub is_tty: bool,
    width: Arc<Mutex<Option<u16>>>,
    writes: Arc<Mutex<Vec<String>>>,
    fail_writes: Arc<Mutex<bool>>,
}

impl FakeTerminal {
    pub fn new(is_tty: bool) -> Self {
        Self {
            is_tty,
            width: Arc::new(Mutex::new(Some(80))),
            writes: Arc::new(Mutex::new(Vec::new())),
            fail_writes: Arc::new(Mutex::new(false)),
        }
    }

    pub fn with_width(self, width: Option<u16>) -> Self {
        *locked(&self.width) = width;
        self
    }

    pub fn set_width(&self, width: Option<u16>) {
        *locked(&self.width) = width;
    }

    /// Makes every later write fail like a closed pipe.
    pub fn set_fail_writes(&self, fail: bool) {
        *locked(&self.fail_writes) = fail;
    }

    pub fn writes(&self) -> Vec<String> {
        locked(&self.writes).clone()
    }

    pub fn output(&self) -> String {
        locked(&self.writes).concat()
    }

    pub fn clear(&self) {
        locked(&self.writes).clear();
    }
}

impl Default for FakeTerminal {
    fn default() -> Self {
        Self::new(false)
    }
}

impl Terminal for FakeTerminal {
    fn is_tty(&self) -> bool {
        self.is_tty
    }

    fn width(&self) -> Option<u16> {
        *locked(&self.width)
    }

    fn write_raw(&self, text: &str) -> Result<(), DashboardError> {
        if *locked(&self.fail_writes) {
            return Err(DashboardError::Io("broken pipe".to_string()));
        }
        locked(&self.writes).push(text.to_string());
        Ok(())
    }
}
