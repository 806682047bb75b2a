//! Column allocation for the status table, derived purely from terminal width.

use serde::Serialize;

pub const NARROW_BELOW: u16 = 50;
pub const WIDE_ABOVE: u16 = 120;
pub const WIDE_CAP: u16 = 160;
pub const TINY_BELOW: u16 = 20;

pub const STATUS_FLOOR: usize = 15;
pub const WIDE_NAME: usize = 45;
pub const WIDE_STATUS: usize = 25;
pub const WIDE_FILE_NAME: usize = 60;
pub const WIDE_FILE_SIZE: usize = 12;
pub const WIDE_PADDING: usize = 3;
const STANDARD_PADDING: usize = 2;
const NARROW_PADDING: usize = 1;
const TINY_FILE_SIZE: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LayoutConfig {
    pub terminal_width: usize,
    pub name_column_width: usize,
    pub status_column_width: usize,
    pub file_name_width: usize,
    pub file_size_width: usize,
    pub min_padding: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutRegime {
    Narrow,
    Standard,
    Wide,
}

pub fn regime_for(width: u16) -> LayoutRegime {
    if width < NARROW_BELOW {
        LayoutRegime::Narrow
    } else if width <= WIDE_ABOVE {
        LayoutRegime::Standard
    } else {
        LayoutRegime::Wide
    }
}

/// Allocates column widths for a terminal `width` columns wide.
///
/// Every returned width is at least 1. Name + status + padding never exceeds
/// the terminal width, except below 20 columns where an exact fit is impossible.
pub fn calculate(width: u16) -> LayoutConfig {
    match regime_for(width) {
        LayoutRegime::Narrow => narrow(width as usize),
        LayoutRegime::Standard => standard(width as usize),
        LayoutRegime::Wide => wide(width as usize),
    }
}

fn narrow(width: usize) -> LayoutConfig {
    let min_padding = NARROW_PADDING;
    if width < TINY_BELOW as usize {
        let available = width.saturating_sub(min_padding);
        let name = (available / 2).max(1);
        let status = available.saturating_sub(name).max(1);
        return LayoutConfig {
            terminal_width: width,
            name_column_width: name,
            status_column_width: status,
            file_name_width: width.saturating_sub(TINY_FILE_SIZE + min_padding).max(1),
            file_size_width: TINY_FILE_SIZE,
            min_padding,
        };
    }

    let available = width - min_padding;
    let name = available * 60 / 100;
    let file_size = (available / 4).max(TINY_FILE_SIZE);
    LayoutConfig {
        terminal_width: width,
        name_column_width: name,
        status_column_width: available - name,
        file_name_width: available - file_size,
        file_size_width: file_size,
        min_padding,
    }
}

fn standard(width: usize) -> LayoutConfig {
    proportional(width, width)
}

fn proportional(terminal_width: usize, width: usize) -> LayoutConfig {
    let min_padding = STANDARD_PADDING;
    let available = width - min_padding;
    // Names never get more than the wide-screen allocation, so widening the
    // terminal never shrinks the name column.
    let mut name = (available * 65 / 100).min(WIDE_NAME);
    let mut status = available - name;
    if status < STATUS_FLOOR {
        status = STATUS_FLOOR;
        name = available - STATUS_FLOOR;
    }
    let file_name = available * 75 / 100;
    LayoutConfig {
        terminal_width,
        name_column_width: name,
        status_column_width: status,
        file_name_width: file_name,
        file_size_width: available - file_name,
        min_padding,
    }
}

fn wide(width: usize) -> LayoutConfig {
    let effective = width.min(WIDE_CAP as usize);
    let fits = WIDE_NAME + WIDE_STATUS + WIDE_PADDING <= effective
        && WIDE_FILE_NAME + WIDE_FILE_SIZE + WIDE_PADDING <= effective;
    if !fits {
        return proportional(width, effective);
    }
    LayoutConfig {
        terminal_width: width,
        name_column_width: WIDE_NAME,
        status_column_width: WIDE_STATUS,
        file_name_width: WIDE_FILE_NAME,
        file_size_width: WIDE_FILE_SIZE,
        min_padding: WIDE_PADDING,
    }
}
