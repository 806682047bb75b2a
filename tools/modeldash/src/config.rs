use crate::errors::DashboardError;
use crate::logging::{is_known_level, DEFAULT_DISK_BUDGET_BYTES, DEFAULT_MAX_PAYLOAD_BYTES};
use crate::runtime::FileSystem;
use crate::types::Toggle;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "modeldash.toml";

#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub working_dir: Option<PathBuf>,
    pub parallelism: Option<u32>,
    pub quiet: bool,
    pub no_progress: bool,
    pub interactive: Option<Toggle>,
    pub no_color: bool,
    pub ascii: bool,
    pub models: Vec<String>,
    pub fail: Vec<String>,
    pub rate_limit: Vec<String>,
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    pub display: DisplayConfig,
    pub layout: LayoutSettings,
    pub logging: LoggingConfig,
    pub batch: BatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DisplayConfig {
    pub quiet: bool,
    pub no_progress: bool,
    pub interactive: Toggle,
    pub color: Toggle,
    pub ascii: bool,
    pub spinner_tick_ms: u64,
    pub ci_header_every: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LayoutSettings {
    pub fallback_width: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    pub path: Option<PathBuf>,
    pub min_level: String,
    pub max_payload_bytes: usize,
    pub budget_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchConfig {
    pub models: Vec<String>,
    pub parallelism: u32,
    pub base_ms: u64,
    pub jitter_ms: u64,
    pub rate_limit_ms: u64,
    /// `KEY` or `KEY=REASON`.
    pub fail: Vec<String>,
    pub rate_limit: Vec<String>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            quiet: false,
            no_progress: false,
            interactive: Toggle::Auto,
            color: Toggle::Auto,
            ascii: false,
            spinner_tick_ms: 100,
            ci_header_every: 1,
        }
    }
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self { fallback_width: 80 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            path: None,
            min_level: "info".to_string(),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            budget_bytes: DEFAULT_DISK_BUDGET_BYTES,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            models: Vec::new(),
            parallelism: 4,
            base_ms: 400,
            jitter_ms: 600,
            rate_limit_ms: 1500,
            fail: Vec::new(),
            rate_limit: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialAppConfig {
    display: Option<PartialDisplayConfig>,
    layout: Option<PartialLayoutSettings>,
    logging: Option<PartialLoggingConfig>,
    batch: Option<PartialBatchConfig>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialDisplayConfig {
    quiet: Option<bool>,
    no_progress: Option<bool>,
    interactive: Option<Toggle>,
    color: Option<Toggle>,
    ascii: Option<bool>,
    spinner_tick_ms: Option<u64>,
    ci_header_every: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialLayoutSettings {
    fallback_width: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialLoggingConfig {
    path: Option<PathBuf>,
    min_level: Option<String>,
    max_payload_bytes: Option<usize>,
    budget_bytes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialBatchConfig {
    models: Option<Vec<String>>,
    parallelism: Option<u32>,
    base_ms: Option<u64>,
    jitter_ms: Option<u64>,
    rate_limit_ms: Option<u64>,
    fail: Option<Vec<String>>,
    rate_limit: Option<Vec<String>>,
}

/// Resolves the working directory, then layers defaults, the config file and
/// CLI overrides, in that order.
pub fn load_config(
    overrides: &CliOverrides,
    process_cwd: &Path,
    fs: &dyn FileSystem,
) -> Result<(AppConfig, PathBuf), DashboardError> {
    let working_dir = match &overrides.working_dir {
        Some(path) => absolutize_path(process_cwd, path),
        None => process_cwd.to_path_buf(),
    };
    let mut cfg = AppConfig::default();

    let config_path = match &overrides.config_path {
        Some(path) => Some(absolutize_path(&working_dir, path)),
        None => {
            let candidate = working_dir.join(DEFAULT_CONFIG_FILE);
            fs.exists(&candidate).then_some(candidate)
        }
    };
    if let Some(path) = config_path {
        let file_contents = fs.read_to_string(&path)?;
        let partial: PartialAppConfig = toml::from_str(&file_contents)
            .map_err(|e| DashboardError::ConfigParse(format!("{}: {e}", path.display())))?;
        merge_partial_config(&mut cfg, partial);
    }

    apply_cli_overrides(&mut cfg, overrides);
    if let Some(path) = cfg.logging.path.take() {
        cfg.logging.path = Some(absolutize_path(&working_dir, &path));
    }
    validate_config(&cfg)?;
    Ok((cfg, working_dir))
}

fn merge_partial_config(cfg: &mut AppConfig, partial: PartialAppConfig) {
    if let Some(display) = partial.display {
        if let Some(value) = display.quiet {
            cfg.display.quiet = value;
        }
        if let Some(value) = display.no_progress {
            cfg.display.no_progress = value;
        }
        if let Some(value) = display.interactive {
            cfg.display.interactive = value;
        }
        if let Some(value) = display.color {
            cfg.display.color = value;
        }
        if let Some(value) = display.ascii {
            cfg.display.ascii = value;
        }
        if let Some(value) = display.spinner_tick_ms {
            cfg.display.spinner_tick_ms = value;
        }
        if let Some(value) = display.ci_header_every {
            cfg.display.ci_header_every = value;
        }
    }

    if let Some(layout) = partial.layout {
        if let Some(value) = layout.fallback_width {
            cfg.layout.fallback_width = value;
        }
    }

    if let Some(logging) = partial.logging {
        if let Some(value) = logging.path {
            cfg.logging.path = Some(value);
        }
        if let Some(value) = logging.min_level {
            cfg.logging.min_level = value;
        }
        if let Some(value) = logging.max_payload_bytes {
            cfg.logging.max_payload_bytes = value;
        }
        if let Some(value) = logging.budget_bytes {
            cfg.logging.budget_bytes = value;
        }
    }

    if let Some(batch) = partial.batch {
        if let Some(value) = batch.models {
            cfg.batch.models = value;
        }
        if let Some(value) = batch.parallelism {
            cfg.batch.parallelism = value;
        }
        if let Some(value) = batch.base_ms {
            cfg.batch.base_ms = value;
        }
        if let Some(value) = batch.jitter_ms {
            cfg.batch.jitter_ms = value;
        }
        if let Some(value) = batch.rate_limit_ms {
            cfg.batch.rate_limit_ms = value;
        }
        if let Some(value) = batch.fail {
            cfg.batch.fail = value;
        }
        if let Some(value) = batch.rate_limit {
            cfg.batch.rate_limit = value;
        }
    }
}

fn apply_cli_overrides(cfg: &mut AppConfig, overrides: &CliOverrides) {
    if let Some(parallelism) = overrides.parallelism {
        cfg.batch.parallelism = parallelism;
    }
    if overrides.quiet {
        cfg.display.quiet = true;
    }
    if overrides.no_progress {
        cfg.display.no_progress = true;
    }
    if let Some(interactive) = overrides.interactive {
        cfg.display.interactive = interactive;
    }
    if overrides.no_color {
        cfg.display.color = Toggle::Never;
    }
    if overrides.ascii {
        cfg.display.ascii = true;
    }
    if !overrides.models.is_empty() {
        cfg.batch.models = overrides.models.clone();
    }
    if !overrides.fail.is_empty() {
        cfg.batch.fail = overrides.fail.clone();
    }
    if !overrides.rate_limit.is_empty() {
        cfg.batch.rate_limit = overrides.rate_limit.clone();
    }
    if let Some(path) = &overrides.log_file {
        cfg.logging.path = Some(path.clone());
    }
}

pub fn validate_config(cfg: &AppConfig) -> Result<(), DashboardError> {
    if cfg.batch.parallelism == 0 {
        return Err(DashboardError::InvalidConfig(
            "batch.parallelism must be >= 1".to_string(),
        ));
    }
    if cfg.layout.fallback_width == 0 {
        return Err(DashboardError::InvalidConfig(
            "layout.fallback_width must be >= 1".to_string(),
        ));
    }
    if cfg.logging.max_payload_bytes < 16 {
        return Err(DashboardError::InvalidConfig(
            "logging.max_payload_bytes must be >= 16".to_string(),
        ));
    }
    if !is_known_level(&cfg.logging.min_level) {
        return Err(DashboardError::InvalidConfig(format!(
            "logging.min_level must be one of debug, info, warn, error (got {:?})",
            cfg.logging.min_level
        )));
    }
    Ok(())
}

fn absolutize_path(base: &Path, value: &Path) -> PathBuf {
    if value.is_absolute() {
        value.to_path_buf()
    } else {
        base.join(value)
    }
}
