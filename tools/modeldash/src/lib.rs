pub mod config;
pub mod dashboard;
pub mod detection;
pub mod errors;
pub mod layout;
pub mod logging;
pub mod provider;
pub mod renderer;
pub mod runtime;
pub mod simulate;
pub mod spinner;
pub mod style;
pub mod text;
pub mod tracker;
pub mod types;

use clap::{error::ErrorKind, Parser, ValueEnum};
use config::{load_config, AppConfig, CliOverrides};
use dashboard::{DashboardCoordinator, DashboardOptions};
use detection::{colors_enabled, resolve_interactive, unicode_supported, EnvMap};
use errors::DashboardError;
use logging::{append_run_log, init_run_log, structured_fallback_line, JsonlLogger};
use renderer::{status_phrase, RendererOptions};
use runtime::ProductionRuntime;
use serde_json::json;
use simulate::{run_simulated_batch, BatchPlan};
use std::sync::Arc;
use std::time::Duration;
use style::{ColorScheme, SymbolProvider};
use tracker::AggregateSummary;
use types::Toggle;

#[derive(Debug, Clone, Parser)]
#[command(name = "modeldash")]
#[command(about = "Live status dashboard for batches of model runs")]
pub struct Cli {
    /// Model to run; repeat for a batch. Overrides `batch.models`.
    #[arg(long = "model")]
    pub models: Vec<String>,
    #[arg(long)]
    pub config: Option<std::path::PathBuf>,
    #[arg(long)]
    pub working_dir: Option<std::path::PathBuf>,
    #[arg(long)]
    pub parallelism: Option<u32>,
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
    #[arg(long, default_value_t = false)]
    pub no_progress: bool,
    #[arg(long, value_enum)]
    pub interactive: Option<CliToggle>,
    #[arg(long, default_value_t = false)]
    pub no_color: bool,
    #[arg(long, default_value_t = false)]
    pub ascii: bool,
    /// Make KEY fail, optionally with a reason: `KEY=REASON`.
    #[arg(long = "fail", value_name = "KEY[=REASON]")]
    pub fail: Vec<String>,
    /// Make KEY hit one rate limit before finishing.
    #[arg(long = "rate-limit", value_name = "KEY")]
    pub rate_limit: Vec<String>,
    #[arg(long)]
    pub log_file: Option<std::path::PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliToggle {
    Auto,
    Always,
    Never,
}

impl From<CliToggle> for Toggle {
    fn from(value: CliToggle) -> Self {
        match value {
            CliToggle::Auto => Toggle::Auto,
            CliToggle::Always => Toggle::Always,
            CliToggle::Never => Toggle::Never,
        }
    }
}

pub fn run() -> Result<i32, DashboardError> {
    let args = std::env::args_os().collect::<Vec<_>>();
    let env = std::env::vars_os().collect::<Vec<_>>();
    let cwd = std::env::current_dir().map_err(|e| DashboardError::Io(e.to_string()))?;
    let runtime = ProductionRuntime::new();
    run_with_runtime(&args, &env, &cwd, &runtime)
}

pub fn run_with_runtime(
    args: &[std::ffi::OsString],
    env: &[(std::ffi::OsString, std::ffi::OsString)],
    cwd: &std::path::Path,
    runtime: &ProductionRuntime,
) -> Result<i32, DashboardError> {
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                runtime.terminal.write_raw(&error.to_string())?;
                return Ok(0);
            }
            _ => return Err(DashboardError::Cli(error.to_string())),
        },
    };

    let env_map = env_to_map(env);
    let overrides = CliOverrides {
        config_path: cli.config.clone(),
        working_dir: cli.working_dir.clone(),
        parallelism: cli.parallelism,
        quiet: cli.quiet,
        no_progress: cli.no_progress,
        interactive: cli.interactive.map(Toggle::from),
        no_color: cli.no_color,
        ascii: cli.ascii,
        models: cli.models.clone(),
        fail: cli.fail.clone(),
        rate_limit: cli.rate_limit.clone(),
        log_file: cli.log_file.clone(),
    };
    let (cfg, working_dir) = load_config(&overrides, cwd, runtime.file_system.as_ref())?;

    if let Some(path) = &cfg.logging.path {
        init_run_log(JsonlLogger {
            path: path.clone(),
            min_level: cfg.logging.min_level.clone(),
            max_payload_bytes: cfg.logging.max_payload_bytes,
            budget_bytes: cfg.logging.budget_bytes,
        });
    }
    append_run_log(
        "info",
        "run.config.loaded",
        json!({
            "working_dir": working_dir.display().to_string(),
            "models": cfg.batch.models.len(),
            "parallelism": cfg.batch.parallelism,
        }),
    );

    if cfg.batch.models.is_empty() {
        return Err(DashboardError::Cli(
            "no models to run: pass --model or set batch.models".to_string(),
        ));
    }

    let options = dashboard_options(&cfg, &env_map, runtime);
    let colors = options.renderer.colors;
    let interactive = options.renderer.interactive;
    let quiet = cfg.display.quiet;
    let plan = BatchPlan::from_config(&cfg.batch);

    if !quiet {
        runtime.terminal.write_line(&colors.section_header(&format!(
            "Running {} model(s), parallelism {}",
            plan.jobs.len(),
            plan.parallelism
        )))?;
    }

    let dashboard = DashboardCoordinator::with_clock(
        options,
        Arc::clone(&runtime.terminal),
        Arc::clone(&runtime.clock),
    );
    dashboard.start_tracking(&plan.jobs)?;
    let outcome = run_simulated_batch(&plan, &dashboard, Arc::clone(&runtime.clock));
    let finished = dashboard.finish_tracking();
    let summary = outcome?;
    finished?;

    if !quiet {
        if !interactive {
            if let Some(snapshot) = dashboard.snapshot() {
                for job in &snapshot.jobs {
                    let (status, _) = status_phrase(job);
                    runtime.terminal.write_line(&structured_fallback_line(
                        job.index,
                        &job.key,
                        job.phase.as_str(),
                        &status,
                    ))?;
                }
            }
        }
        runtime.terminal.write_line(&done_line(&summary, &colors))?;
    }

    Ok(if summary.failed > 0 { 1 } else { 0 })
}

fn dashboard_options(cfg: &AppConfig, env: &EnvMap, runtime: &ProductionRuntime) -> DashboardOptions {
    let interactive =
        resolve_interactive(cfg.display.interactive, env, runtime.terminal.as_ref()).is_ok();
    let unicode = !cfg.display.ascii && unicode_supported(env);
    DashboardOptions {
        quiet: cfg.display.quiet,
        no_progress: cfg.display.no_progress,
        spinner_tick: (cfg.display.spinner_tick_ms > 0)
            .then(|| Duration::from_millis(cfg.display.spinner_tick_ms)),
        renderer: RendererOptions {
            interactive,
            colors: ColorScheme::new(interactive && colors_enabled(env, cfg.display.color, interactive)),
            symbols: SymbolProvider::select(unicode),
            fallback_width: cfg.layout.fallback_width,
            ci_header_every: cfg.display.ci_header_every,
        },
    }
}

fn done_line(summary: &AggregateSummary, colors: &ColorScheme) -> String {
    let text = format!(
        "Done: {} completed, {} failed of {} (success {:.0}%)",
        summary.completed,
        summary.failed,
        summary.total,
        summary.success_rate * 100.0
    );
    if summary.failed > 0 {
        colors.warning(&text)
    } else {
        colors.success(&text)
    }
}

fn env_to_map(env: &[(std::ffi::OsString, std::ffi::OsString)]) -> EnvMap {
    let mut map = EnvMap::new();
    for (key, value) in env {
        if let (Some(key), Some(value)) = (key.to_str(), value.to_str()) {
            map.insert(key.to_string(), value.to_string());
        }
    }
    map
}
