//! Width-aware string helpers.
//!
//! Every measurement here works on the de-styled view of a string: ANSI escape
//! sequences are stripped first and the remainder is measured in terminal cells
//! (`unicode-width`), never in bytes.

use regex::Regex;
use std::borrow::Cow;
use std::sync::OnceLock;
use std::time::Duration;
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

pub const ELLIPSIS: char = '…';

fn ansi_pattern() -> Option<&'static Regex> {
    static ANSI: OnceLock<Option<Regex>> = OnceLock::new();
    ANSI.get_or_init(|| {
        // CSI sequences (colors, cursor motion), OSC sequences (titles, links), bare escapes.
        Regex::new(r"\x1b\[[0-?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[@-_]").ok()
    })
    .as_ref()
}

pub fn strip_ansi(text: &str) -> Cow<'_, str> {
    if !text.contains('\x1b') {
        return Cow::Borrowed(text);
    }
    match ansi_pattern() {
        Some(pattern) => pattern.replace_all(text, ""),
        None => Cow::Borrowed(text),
    }
}

/// Visible column width of `text` after removing styling.
pub fn display_width(text: &str) -> usize {
    UnicodeWidthStr::width(strip_ansi(text).as_ref())
}

/// Cuts `text` so it occupies exactly `max_width` cells, ending in `…`.
///
/// Text that already fits is returned unchanged (styling included). Text that
/// does not fit is de-styled before cutting so no escape sequence is split.
/// Cuts only at grapheme-cluster boundaries. A cluster that would straddle the
/// limit is dropped and the gap is filled with spaces, which keeps the result
/// at exactly `max_width` cells.
pub fn truncate_with_ellipsis(text: &str, max_width: usize) -> String {
    if max_width == 0 {
        return String::new();
    }
    if display_width(text) <= max_width {
        return text.to_string();
    }
    let plain = strip_ansi(text);
    let budget = max_width - 1;
    let mut out = String::new();
    let mut used = 0usize;
    for cluster in plain.graphemes(true) {
        let w = UnicodeWidthStr::width(cluster);
        if used + w > budget {
            break;
        }
        out.push_str(cluster);
        used += w;
    }
    out.extend(std::iter::repeat(' ').take(budget - used));
    out.push(ELLIPSIS);
    out
}

/// Pads with trailing spaces up to `width` display cells.
pub fn pad_right(text: &str, width: usize) -> String {
    let gap = width.saturating_sub(display_width(text));
    format!("{text}{}", " ".repeat(gap))
}

/// Pads with leading spaces up to `width` display cells.
pub fn pad_left(text: &str, width: usize) -> String {
    let gap = width.saturating_sub(display_width(text));
    format!("{}{text}", " ".repeat(gap))
}

/// `850ms`, `2.0s`, `1m05s`.
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        return format!("{millis}ms");
    }
    let secs = duration.as_secs_f64();
    if secs < 60.0 {
        return format!("{secs:.1}s");
    }
    let whole = duration.as_secs();
    format!("{}m{:02}s", whole / 60, whole % 60)
}

#[cfg(test)]
mod tests {
    use super::{display_width, format_duration, pad_left, pad_right, strip_ansi, truncate_with_ellipsis};
    use std::time::Duration;

    #[test]
    fn strip_removes_color_and_cursor_sequences() {
        assert_eq!(strip_ansi("\x1b[32mok\x1b[0m"), "ok");
        assert_eq!(strip_ansi("\x1b[5A\x1b[2Kline"), "line");
        assert_eq!(strip_ansi("\x1b]0;title\x07x"), "x");
        assert_eq!(strip_ansi("plain"), "plain");
    }

    #[test]
    fn display_width_counts_cells_not_bytes() {
        assert_eq!(display_width("\x1b[1;36mgpt-4o\x1b[0m"), 6);
        assert_eq!(display_width("✓"), 1);
        assert_eq!(display_width("模型"), 4);
        assert_eq!(display_width("é"), 1);
    }

    #[test]
    fn short_text_is_unchanged() {
        assert_eq!(truncate_with_ellipsis("claude", 20), "claude");
        assert_eq!(truncate_with_ellipsis("\x1b[31mred\x1b[0m", 3), "\x1b[31mred\x1b[0m");
    }

    #[test]
    fn long_text_hits_exact_width() {
        let out = truncate_with_ellipsis("claude-3-5-sonnet-latest", 10);
        assert_eq!(out, "claude-3-…");
        assert_eq!(display_width(&out), 10);

        let colored = truncate_with_ellipsis("\x1b[36mgemini-1.5-pro-002\x1b[0m", 8);
        assert!(!colored.contains('\x1b'));
        assert_eq!(display_width(&colored), 8);
    }

    #[test]
    fn wide_glyphs_never_overflow() {
        for width in 1..12 {
            let out = truncate_with_ellipsis("模型模型模型模型", width);
            assert_eq!(display_width(&out), width, "width {width}: {out:?}");
        }
    }

    #[test]
    fn joined_emoji_are_kept_whole_or_dropped_whole() {
        let scientist = "👩\u{200D}🔬";
        for width in 1..8 {
            let out = truncate_with_ellipsis(&format!("{scientist}-lab-model"), width);
            assert!(!out.ends_with("\u{200D}…"), "width {width}: {out:?}");
            assert!(
                out.contains(scientist) || !out.contains('\u{200D}'),
                "width {width}: {out:?}"
            );
            assert!(display_width(&out) <= width, "width {width}: {out:?}");
        }
        let out = truncate_with_ellipsis(&format!("{scientist}-lab-model"), 2);
        assert_eq!(out, " …");
    }

    #[test]
    fn combining_marks_stay_with_their_base() {
        let out = truncate_with_ellipsis("ae\u{301}bcdef", 3);
        assert_eq!(out, "ae\u{301}…");
        let out = truncate_with_ellipsis("e\u{301}e\u{301}e\u{301}xyz", 3);
        assert_eq!(out, "e\u{301}e\u{301}…");
        assert_eq!(display_width(&out), 3);
    }

    #[test]
    fn padding_uses_display_width() {
        assert_eq!(pad_right("\x1b[1mab\x1b[0m", 4), "\x1b[1mab\x1b[0m  ");
        assert_eq!(pad_left("ab", 4), "  ab");
        assert_eq!(pad_right("toolong", 3), "toolong");
    }

    #[test]
    fn durations_format_by_magnitude() {
        assert_eq!(format_duration(Duration::from_millis(850)), "850ms");
        assert_eq!(format_duration(Duration::from_millis(2000)), "2.0s");
        assert_eq!(format_duration(Duration::from_millis(12_340)), "12.3s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m05s");
    }
}
