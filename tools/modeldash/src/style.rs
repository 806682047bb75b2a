//! Presentation collaborators: semantic colors and the glyph set.
//!
//! Both are chosen once from the environment (see `detection`) and are only
//! ever applied to text that has already been measured and truncated.

use crossterm::style::Stylize;

/// Semantic color role. Text and tone are kept apart until final write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Success,
    Warning,
    Error,
    Info,
    Muted,
    ModelName,
    SectionHeader,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorScheme {
    enabled: bool,
}

impl ColorScheme {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn disabled() -> Self {
        Self::new(false)
    }

    pub fn paint(&self, tone: Tone, text: &str) -> String {
        if !self.enabled || text.is_empty() {
            return text.to_string();
        }
        match tone {
            Tone::Success => text.green().to_string(),
            Tone::Warning => text.yellow().to_string(),
            Tone::Error => text.red().to_string(),
            Tone::Info => text.cyan().to_string(),
            Tone::Muted => text.dark_grey().to_string(),
            Tone::ModelName => text.bold().to_string(),
            Tone::SectionHeader => text.bold().underlined().to_string(),
        }
    }

    pub fn success(&self, text: &str) -> String {
        self.paint(Tone::Success, text)
    }

    pub fn warning(&self, text: &str) -> String {
        self.paint(Tone::Warning, text)
    }

    pub fn error(&self, text: &str) -> String {
        self.paint(Tone::Error, text)
    }

    pub fn info(&self, text: &str) -> String {
        self.paint(Tone::Info, text)
    }

    pub fn muted(&self, text: &str) -> String {
        self.paint(Tone::Muted, text)
    }

    pub fn model_name(&self, text: &str) -> String {
        self.paint(Tone::ModelName, text)
    }

    pub fn section_header(&self, text: &str) -> String {
        self.paint(Tone::SectionHeader, text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolProvider {
    pub success: &'static str,
    pub error: &'static str,
    pub warning: &'static str,
    pub bullet: &'static str,
    pub separator: &'static str,
    pub bar_filled: &'static str,
    pub bar_empty: &'static str,
    pub spinner: &'static [&'static str],
}

const BRAILLE_SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const ASCII_SPINNER: &[&str] = &["|", "/", "-", "\\"];

impl SymbolProvider {
    pub fn unicode() -> Self {
        Self {
            success: "✓",
            error: "✗",
            warning: "⚠",
            bullet: "•",
            separator: "─",
            bar_filled: "█",
            bar_empty: "░",
            spinner: BRAILLE_SPINNER,
        }
    }

    pub fn ascii() -> Self {
        Self {
            success: "+",
            error: "x",
            warning: "!",
            bullet: "*",
            separator: "-",
            bar_filled: "#",
            bar_empty: "-",
            spinner: ASCII_SPINNER,
        }
    }

    pub fn select(unicode: bool) -> Self {
        if unicode {
            Self::unicode()
        } else {
            Self::ascii()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ColorScheme, SymbolProvider, Tone};
    use crate::text::display_width;

    #[test]
    fn disabled_scheme_is_identity() {
        let colors = ColorScheme::disabled();
        for tone in [Tone::Success, Tone::Error, Tone::ModelName, Tone::SectionHeader] {
            assert_eq!(colors.paint(tone, "gpt-4o"), "gpt-4o");
        }
    }

    #[test]
    fn painted_text_keeps_its_display_width() {
        let colors = ColorScheme::new(true);
        assert_eq!(display_width(&colors.success("completed (850ms)")), 17);
        assert_eq!(display_width(&colors.section_header("Status")), 6);
    }

    #[test]
    fn every_glyph_is_one_cell_wide() {
        for symbols in [SymbolProvider::unicode(), SymbolProvider::ascii()] {
            for glyph in [
                symbols.success,
                symbols.error,
                symbols.warning,
                symbols.bullet,
                symbols.separator,
                symbols.bar_filled,
                symbols.bar_empty,
            ]
            .iter()
            .chain(symbols.spinner.iter())
            {
                assert_eq!(display_width(glyph), 1, "{glyph:?}");
            }
        }
    }

    #[test]
    fn ascii_set_is_pure_ascii() {
        let symbols = SymbolProvider::ascii();
        assert!(symbols.spinner.iter().all(|frame| frame.is_ascii()));
        assert!(symbols.success.is_ascii() && symbols.error.is_ascii());
    }
}
