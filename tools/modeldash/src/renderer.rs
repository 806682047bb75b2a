//! Turns a `StatusSnapshot` into terminal output.
//!
//! Two protocols share this type:
//!
//! - Interactive (TTY): each frame overwrites the previous one in place. The
//!   renderer remembers how many lines it drew last time and moves the cursor up
//!   by exactly that many lines before redrawing, erasing each line as it goes.
//!   Non-terminal jobs show an animated spinner advanced by a background ticker.
//! - Non-interactive (CI, pipes): every call appends a self-contained block of
//!   plain text. No cursor control, no spinner, no ANSI styling.
//!
//! Name and counter column widths are frozen on the first render of a batch so
//! rows do not jitter; `request_layout_recompute` thaws them (e.g. on resize).

use crate::errors::DashboardError;
use crate::layout::{self, LayoutConfig};
use crate::runtime::Terminal;
use crate::spinner::{Spinner, TickFlow, Ticker};
use crate::style::{ColorScheme, SymbolProvider, Tone};
use crate::text::{display_width, format_duration, pad_left, pad_right, truncate_with_ellipsis};
use crate::tracker::{JobState, StatusSnapshot};
use crate::types::JobPhase;
use crossterm::cursor::MoveUp;
use crossterm::terminal::{Clear, ClearType};
use crossterm::Command;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_FALLBACK_WIDTH: u16 = 80;
const INDICATOR_WIDTH: usize = 1;

#[derive(Debug, Clone)]
pub struct RendererOptions {
    pub interactive: bool,
    pub colors: ColorScheme,
    pub symbols: SymbolProvider,
    pub fallback_width: u16,
    /// Non-interactive header cadence: every k-th block, 0 = never.
    pub ci_header_every: u32,
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            interactive: false,
            colors: ColorScheme::disabled(),
            symbols: SymbolProvider::ascii(),
            fallback_width: DEFAULT_FALLBACK_WIDTH,
            ci_header_every: 1,
        }
    }
}

/// State carried between renders of one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderFrame {
    pub line_count_of_last_frame: usize,
    pub cached_name_column_width: Option<usize>,
    pub cached_index_column_width: Option<usize>,
}

pub struct StatusRenderer {
    terminal: Arc<dyn Terminal>,
    options: RendererOptions,
    frame: RenderFrame,
    layout: Option<LayoutConfig>,
    recompute_layout: bool,
    spinner: Spinner,
    ticker: Option<Ticker>,
    blocks_written: u64,
    width_fallback: Option<u16>,
}

impl StatusRenderer {
    pub fn new(terminal: Arc<dyn Terminal>, options: RendererOptions) -> Self {
        let spinner = Spinner::new(options.symbols.spinner);
        Self {
            terminal,
            options,
            frame: RenderFrame::default(),
            layout: None,
            recompute_layout: false,
            spinner,
            ticker: None,
            blocks_written: 0,
            width_fallback: None,
        }
    }

    pub fn is_interactive(&self) -> bool {
        self.options.interactive
    }

    pub fn frame(&self) -> &RenderFrame {
        &self.frame
    }

    pub fn layout(&self) -> Option<LayoutConfig> {
        self.layout
    }

    /// Recompute layout and column widths on the next render.
    pub fn request_layout_recompute(&mut self) {
        self.recompute_layout = true;
    }

    /// The fallback width used by the last layout computation that could not
    /// query the terminal, if not yet taken.
    pub fn take_width_fallback(&mut self) -> Option<u16> {
        self.width_fallback.take()
    }

    pub fn advance_spinner(&mut self) {
        self.spinner.advance();
    }

    /// Draws `snapshot`. A forced render skips the cursor-up, starting a fresh
    /// frame below whatever is on screen.
    pub fn render(&mut self, snapshot: &StatusSnapshot, force_full: bool) -> Result<(), DashboardError> {
        if self.options.interactive {
            self.render_interactive(snapshot, force_full)
        } else {
            self.render_plain(snapshot)
        }
    }

    fn render_interactive(&mut self, snapshot: &StatusSnapshot, force_full: bool) -> Result<(), DashboardError> {
        let lines = self.compose_interactive(snapshot);
        let mut out = String::new();
        if self.frame.line_count_of_last_frame > 0 && !force_full {
            push_command(&mut out, MoveUp(clamp_u16(self.frame.line_count_of_last_frame)));
        }
        for line in &lines {
            out.push('\r');
            push_command(&mut out, Clear(ClearType::CurrentLine));
            out.push_str(line);
            out.push('\n');
        }
        self.terminal.write_raw(&out)?;
        self.frame.line_count_of_last_frame = lines.len();
        Ok(())
    }

    fn render_plain(&mut self, snapshot: &StatusSnapshot) -> Result<(), DashboardError> {
        let lines = self.compose_plain(snapshot);
        let mut out = lines.join("\n");
        out.push('\n');
        self.terminal.write_raw(&out)?;
        self.blocks_written += 1;
        Ok(())
    }

    /// Erases the last interactive frame and leaves the cursor where it began.
    /// Non-interactive output is append-only, so there is nothing to clear.
    pub fn clear(&mut self) -> Result<(), DashboardError> {
        let lines = self.frame.line_count_of_last_frame;
        if !self.options.interactive || lines == 0 {
            self.frame.line_count_of_last_frame = 0;
            return Ok(());
        }
        let mut out = String::new();
        push_command(&mut out, MoveUp(clamp_u16(lines)));
        for _ in 0..lines {
            out.push('\r');
            push_command(&mut out, Clear(ClearType::CurrentLine));
            out.push('\n');
        }
        push_command(&mut out, MoveUp(clamp_u16(lines)));
        self.terminal.write_raw(&out)?;
        self.frame.line_count_of_last_frame = 0;
        Ok(())
    }

    /// Starts the spinner ticker. Only interactive renderers animate; a zero
    /// period or an already running ticker makes this a no-op.
    pub fn start_ticker<F>(&mut self, period: Duration, on_tick: F) -> Result<(), DashboardError>
    where
        F: FnMut() -> Result<TickFlow, DashboardError> + Send + 'static,
    {
        if !self.options.interactive || period.is_zero() || self.ticker.is_some() {
            return Ok(());
        }
        self.ticker = Some(Ticker::spawn(period, on_tick)?);
        Ok(())
    }

    pub fn ticker_running(&self) -> bool {
        self.ticker.as_ref().is_some_and(Ticker::is_running)
    }

    /// Stops and joins the ticker. Safe to call repeatedly or without a ticker.
    pub fn stop(&mut self) {
        if let Some(mut ticker) = self.ticker.take() {
            ticker.stop();
        }
    }

    /// Signals the ticker and hands it back so the caller can join it after
    /// releasing any lock the tick callback needs.
    pub fn detach_ticker(&mut self) -> Option<Ticker> {
        let mut ticker = self.ticker.take()?;
        ticker.signal_stop();
        Some(ticker)
    }

    // ── Frame composition ────────────────────────────────────────────────────

    fn resolve_layout(&mut self) -> LayoutConfig {
        if let (Some(layout), false) = (self.layout, self.recompute_layout) {
            return layout;
        }
        let width = match self.terminal.width() {
            Some(width) => width,
            None => {
                self.width_fallback = Some(self.options.fallback_width);
                self.options.fallback_width.max(1)
            }
        };
        let computed = layout::calculate(width);
        self.layout = Some(computed);
        if self.recompute_layout {
            self.frame.cached_name_column_width = None;
            self.frame.cached_index_column_width = None;
            self.recompute_layout = false;
        }
        computed
    }

    fn index_width(&mut self, total: usize) -> usize {
        *self
            .frame
            .cached_index_column_width
            .get_or_insert_with(|| counter_width(total))
    }

    fn name_width(&mut self, snapshot: &StatusSnapshot, ceiling: usize) -> usize {
        *self.frame.cached_name_column_width.get_or_insert_with(|| {
            let longest = snapshot
                .jobs
                .iter()
                .map(|job| display_width(&job.display_name))
                .max()
                .unwrap_or(1);
            longest.clamp(1, ceiling.max(1))
        })
    }

    fn compose_interactive(&mut self, snapshot: &StatusSnapshot) -> Vec<String> {
        let layout = self.resolve_layout();
        let total = snapshot.len();
        let index_w = self.index_width(total);
        let name_ceiling = layout
            .name_column_width
            .saturating_sub(INDICATOR_WIDTH + 1 + index_w + 1);
        let name_w = self.name_width(snapshot, name_ceiling);
        let status_w = layout.status_column_width.max(1);
        let colors = self.options.colors;

        let row_width = INDICATOR_WIDTH + 1 + index_w + 1 + name_w + layout.min_padding + status_w;
        let line_width = row_width.min(layout.terminal_width).max(1);

        let mut lines = Vec::with_capacity(total + 2);
        for job in &snapshot.jobs {
            let (glyph, glyph_tone) = self.indicator(job);
            let counter = format_counter(job.index, total, index_w);
            let name = pad_right(&truncate_with_ellipsis(&job.display_name, name_w), name_w);
            let (status, status_tone) = status_phrase(job);
            let status = pad_left(&truncate_with_ellipsis(&status, status_w), status_w);
            lines.push(format!(
                "{} {} {}{}{}",
                colors.paint(glyph_tone, glyph),
                colors.muted(&counter),
                colors.model_name(&name),
                " ".repeat(layout.min_padding),
                colors.paint(status_tone, &status),
            ));
        }

        lines.push(colors.muted(&self.options.symbols.separator.repeat(line_width)));
        lines.push(self.progress_line(snapshot, line_width));
        lines
    }

    fn progress_line(&self, snapshot: &StatusSnapshot, line_width: usize) -> String {
        let summary = snapshot.summary();
        let percent = (summary.completion_rate * 100.0).round() as usize;
        let suffix = format!(" {percent:>3}% ({}/{})", summary.resolved(), summary.total);
        let bar_w = line_width
            .saturating_sub(display_width(&suffix) + 2)
            .max(1);
        let filled = ((summary.completion_rate * bar_w as f64).round() as usize).min(bar_w);
        let symbols = &self.options.symbols;
        let colors = self.options.colors;
        let bar_tone = if summary.failed > 0 { Tone::Warning } else { Tone::Success };
        format!(
            "[{}{}]{}",
            colors.paint(bar_tone, &symbols.bar_filled.repeat(filled)),
            colors.muted(&symbols.bar_empty.repeat(bar_w - filled)),
            colors.info(&suffix),
        )
    }

    fn indicator(&self, job: &JobState) -> (&'static str, Tone) {
        let symbols = &self.options.symbols;
        match job.phase {
            JobPhase::Queued => (symbols.bullet, Tone::Muted),
            JobPhase::Starting | JobPhase::Processing => (self.spinner.current(), Tone::Info),
            JobPhase::RateLimited => (symbols.warning, Tone::Warning),
            JobPhase::Completed => (symbols.success, Tone::Success),
            JobPhase::Failed => (symbols.error, Tone::Error),
        }
    }

    fn compose_plain(&mut self, snapshot: &StatusSnapshot) -> Vec<String> {
        let total = snapshot.len();
        let index_w = self.index_width(total);
        let name_w = self.name_width(snapshot, usize::MAX);
        let symbols = &self.options.symbols;

        let mut lines = Vec::with_capacity(total + 1);
        let every = u64::from(self.options.ci_header_every);
        if every > 0 && self.blocks_written % every == 0 {
            let summary = snapshot.summary();
            lines.push(format!(
                "Status Update — {}/{} completed ({:.0}%)",
                summary.resolved(),
                summary.total,
                summary.completion_rate * 100.0
            ));
        }
        for job in &snapshot.jobs {
            let glyph = match job.phase {
                JobPhase::Completed => symbols.success,
                JobPhase::Failed => symbols.error,
                JobPhase::RateLimited => symbols.warning,
                JobPhase::Queued | JobPhase::Starting | JobPhase::Processing => symbols.bullet,
            };
            let (status, _) = status_phrase(job);
            lines.push(format!(
                "{glyph} {} {}  {status}",
                format_counter(job.index, total, index_w),
                pad_right(&job.display_name, name_w),
            ));
        }
        lines
    }
}

impl Drop for StatusRenderer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Status text for one job, e.g. `completed (850ms)` or `retry in 2.0s`.
pub fn status_phrase(job: &JobState) -> (String, Tone) {
    match job.phase {
        JobPhase::Queued => ("queued".to_string(), Tone::Muted),
        JobPhase::Starting => ("starting...".to_string(), Tone::Info),
        JobPhase::Processing => ("processing...".to_string(), Tone::Info),
        JobPhase::RateLimited => match job.retry_after {
            Some(wait) => (format!("throttled, retry in {}", format_duration(wait)), Tone::Warning),
            None => ("throttled".to_string(), Tone::Warning),
        },
        JobPhase::Completed => (format!("completed ({})", format_duration(job.duration)), Tone::Success),
        JobPhase::Failed => match job.error_message.as_deref() {
            Some(reason) => (format!("failed ({})", reason.replace('\n', " ")), Tone::Error),
            None => ("failed".to_string(), Tone::Error),
        },
    }
}

/// Width of `[N/N]` for a batch of `total` jobs.
pub fn counter_width(total: usize) -> usize {
    2 * digits(total) + 3
}

/// `[03/12]`: the index is zero-padded to the digit count of `total`.
pub fn format_counter(index: usize, total: usize, width: usize) -> String {
    let digits = digits(total);
    pad_right(&format!("[{index:0digits$}/{total}]"), width)
}

fn digits(value: usize) -> usize {
    value.max(1).to_string().len()
}

fn push_command(out: &mut String, command: impl Command) {
    // Writing into a String cannot fail.
    let _ = command.write_ansi(out);
}

fn clamp_u16(value: usize) -> u16 {
    u16::try_from(value).unwrap_or(u16::MAX)
}
