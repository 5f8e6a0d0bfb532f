//! A screen: one grid plus cursor, margins, tab stops and the operations
//! VT functions perform on them. The terminal owns two full screens
//! (primary, alternate) and two one-line status screens sharing this type.

use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

use crate::cell::{Cell, Pen};
use crate::cursor::Cursor;
use crate::grid::{
    CellLocation, Grid, LineFlags, Margins, MaxHistoryLineCount, PageSize,
};

/// Which buffer a screen instance is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenType {
    Primary,
    Alternate,
    /// Host-writable or indicator status line.
    Status,
}

/// Visibility of the status line area (DECSSDT).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusDisplayType {
    #[default]
    None,
    Indicator,
    HostWritable,
}

/// Whether the status line sits above or below the main display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusDisplayPosition {
    Top,
    #[default]
    Bottom,
}

/// Target of host writes (DECSASD).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActiveStatusDisplay {
    #[default]
    Main,
    StatusLine,
}

/// Tab stops: a uniform interval until the application sets or clears an
/// explicit stop, after which a sorted column list takes over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabStops {
    Uniform(u16),
    Explicit(Vec<u16>),
}

impl Default for TabStops {
    fn default() -> Self {
        TabStops::Uniform(8)
    }
}

impl TabStops {
    /// Next stop strictly right of `column`, clamped to the last column.
    pub fn next(&self, column: u16, columns: u16) -> u16 {
        let last = columns.saturating_sub(1);
        match self {
            TabStops::Uniform(width) => {
                let next = (column / width + 1) * width;
                next.min(last)
            }
            TabStops::Explicit(stops) => stops
                .iter()
                .copied()
                .find(|&stop| stop > column)
                .unwrap_or(last)
                .min(last),
        }
    }

    /// Previous stop strictly left of `column`.
    pub fn previous(&self, column: u16) -> u16 {
        match self {
            TabStops::Uniform(width) => {
                if column == 0 {
                    0
                } else {
                    (column - 1) / width * width
                }
            }
            TabStops::Explicit(stops) => stops
                .iter()
                .rev()
                .copied()
                .find(|&stop| stop < column)
                .unwrap_or(0),
        }
    }

    fn materialize(&mut self, columns: u16) -> &mut Vec<u16> {
        if let TabStops::Uniform(width) = *self {
            let stops = (0..columns).step_by(width.max(1) as usize).collect();
            *self = TabStops::Explicit(stops);
        }
        match self {
            TabStops::Explicit(stops) => stops,
            TabStops::Uniform(_) => unreachable!(),
        }
    }

    /// HTS: set a stop at `column`.
    pub fn set(&mut self, column: u16, columns: u16) {
        let stops = self.materialize(columns);
        if let Err(idx) = stops.binary_search(&column) {
            stops.insert(idx, column);
        }
    }

    /// TBC 0: clear the stop at `column`.
    pub fn clear(&mut self, column: u16, columns: u16) {
        let stops = self.materialize(columns);
        if let Ok(idx) = stops.binary_search(&column) {
            stops.remove(idx);
        }
    }

    /// TBC 3: clear every stop.
    pub fn clear_all(&mut self) {
        *self = TabStops::Explicit(Vec::new());
    }
}

/// Grid plus cursor state; executes the screen-local VT operations.
#[derive(Debug)]
pub struct Screen {
    grid: Grid,
    pub cursor: Cursor,
    saved_cursor: Option<Cursor>,
    margins: Margins,
    pub tab_stops: TabStops,
    screen_type: ScreenType,
    /// Remembered for REP.
    last_cluster: Option<String>,
}

impl Screen {
    pub fn new(screen_type: ScreenType, page: PageSize, max_history: MaxHistoryLineCount) -> Self {
        // The alternate and status screens never retain history.
        let max_history = match screen_type {
            ScreenType::Primary => max_history,
            _ => MaxHistoryLineCount::Finite(0),
        };
        Self {
            grid: Grid::new(page, max_history),
            cursor: Cursor::default(),
            saved_cursor: None,
            margins: Margins::full(page),
            tab_stops: TabStops::default(),
            screen_type,
            last_cluster: None,
        }
    }

    pub fn screen_type(&self) -> ScreenType {
        self.screen_type
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut Grid {
        &mut self.grid
    }

    pub fn page_size(&self) -> PageSize {
        self.grid.page_size()
    }

    pub fn margins(&self) -> Margins {
        self.margins
    }

    /// Margins with the horizontal pair widened to the page unless
    /// LeftRightMargin mode is on.
    pub fn effective_margins(&self, lr_margin_mode: bool) -> Margins {
        if lr_margin_mode {
            self.margins
        } else {
            Margins {
                left: 0,
                right: self.page_size().columns.saturating_sub(1),
                ..self.margins
            }
        }
    }

    fn row(&self) -> u16 {
        self.cursor.position.line.max(0) as u16
    }

    fn column(&self) -> u16 {
        self.cursor.position.column.max(0) as u16
    }

    /// DECSTBM. Invalid ranges (top >= bottom after clamping) are ignored.
    /// Returns whether the margins were accepted; the cursor homes on
    /// success.
    pub fn set_vertical_margins(&mut self, top: u16, bottom: u16) -> bool {
        let last = self.page_size().lines.saturating_sub(1);
        let top = top.min(last);
        let bottom = bottom.min(last);
        if top >= bottom {
            return false;
        }
        self.margins.top = top;
        self.margins.bottom = bottom;
        true
    }

    /// DECSLRM, honoured only when LeftRightMargin mode is set (the caller
    /// checks).
    pub fn set_horizontal_margins(&mut self, left: u16, right: u16) -> bool {
        let last = self.page_size().columns.saturating_sub(1);
        let left = left.min(last);
        let right = right.min(last);
        if left >= right {
            return false;
        }
        self.margins.left = left;
        self.margins.right = right;
        true
    }

    pub fn reset_margins(&mut self) {
        self.margins = Margins::full(self.page_size());
    }

    /// Write a batch of text at the cursor. Returns lines pushed into
    /// history by implied scrolling.
    pub fn write_text(&mut self, text: &str, insert_mode: bool, lr_margin_mode: bool) -> usize {
        let mut pushed = 0;
        for cluster in text.graphemes(true) {
            pushed += self.write_cluster(cluster, insert_mode, lr_margin_mode);
        }
        pushed
    }

    fn write_cluster(&mut self, cluster: &str, insert_mode: bool, lr_margin_mode: bool) -> usize {
        let margins = self.effective_margins(lr_margin_mode);
        let mut pushed = 0;

        // Apply charset translation to plain ASCII; it only affects
        // single-byte graphics.
        let mapped;
        let cluster = if cluster.len() == 1 {
            let c = cluster.chars().next().unwrap_or(' ');
            let translated = self.cursor.charsets.map(c);
            if translated != c {
                mapped = translated.to_string();
                &mapped
            } else {
                cluster
            }
        } else {
            cluster
        };

        let width = UnicodeWidthStr::width(cluster).clamp(0, 2) as u16;
        if width == 0 {
            // Combining mark: attach to the previously written cell.
            if let Some(c) = cluster.chars().next() {
                let (row, column) = (self.row(), self.column());
                let target = if column > 0 && !self.cursor.wrap_pending {
                    column - 1
                } else {
                    column
                };
                self.grid
                    .at_mut(row as i32, target as i32)
                    .push_combining(c);
            }
            return 0;
        }

        // A pending wrap, or a wide character that cannot fit before the
        // right margin, moves to the next line first.
        let wide_overflow = width == 2
            && self.column() > margins.left
            && self.column() + width > margins.right + 1;
        if (self.cursor.wrap_pending || wide_overflow) && self.cursor.auto_wrap {
            self.grid
                .line_at_mut(self.row() as i32)
                .flags
                .insert(LineFlags::WRAPPABLE);
            self.cursor.position.column = margins.left as i32;
            pushed += self.linefeed(lr_margin_mode);
            self.grid
                .line_at_mut(self.row() as i32)
                .flags
                .insert(LineFlags::WRAPPED);
            self.cursor.wrap_pending = false;
        }

        let (row, mut column) = (self.row(), self.column());

        // A wide character that no longer fits moves back inside the
        // margin instead of splitting.
        if !self.cursor.auto_wrap && column + width > margins.right + 1 {
            column = margins.right + 1 - width;
            self.cursor.position.column = column as i32;
        }

        if insert_mode {
            self.grid
                .insert_chars(row, column, width, margins.right, &self.cursor.pen);
        }

        let pen = self.cursor.pen.clone();
        self.grid.at_mut(row as i32, column as i32).write(cluster, &pen);
        if width == 2 && column + 1 <= margins.right {
            *self.grid.at_mut(row as i32, column as i32 + 1) = Cell::wide_spacer(&pen);
        }
        if self.cursor.auto_wrap {
            self.grid
                .line_at_mut(row as i32)
                .flags
                .insert(LineFlags::WRAPPABLE);
        }
        self.last_cluster = Some(cluster.to_string());

        if column + width <= margins.right {
            self.cursor.position.column = (column + width) as i32;
        } else if self.cursor.auto_wrap {
            self.cursor.wrap_pending = true;
        } else {
            self.cursor.position.column = margins.right as i32;
        }
        pushed
    }

    /// REP: repeat the last written cluster `count` times.
    pub fn repeat_last(&mut self, count: u16, insert_mode: bool, lr_margin_mode: bool) -> usize {
        let Some(cluster) = self.last_cluster.clone() else {
            return 0;
        };
        let mut pushed = 0;
        for _ in 0..count.min(2048) {
            pushed += self.write_cluster(&cluster, insert_mode, lr_margin_mode);
        }
        pushed
    }

    /// LF/IND: move down, scrolling at the bottom margin. Returns lines
    /// pushed into history.
    pub fn linefeed(&mut self, lr_margin_mode: bool) -> usize {
        let margins = self.effective_margins(lr_margin_mode);
        self.cursor.wrap_pending = false;
        if self.row() == margins.bottom {
            self.grid.scroll_up(1, margins, &self.cursor.pen)
        } else {
            if self.row() < self.page_size().lines.saturating_sub(1) {
                self.cursor.position.line += 1;
            }
            0
        }
    }

    /// RI: move up, scrolling down at the top margin.
    pub fn reverse_index(&mut self, lr_margin_mode: bool) {
        let margins = self.effective_margins(lr_margin_mode);
        self.cursor.wrap_pending = false;
        if self.row() == margins.top {
            self.grid.scroll_down(1, margins, &self.cursor.pen);
        } else if self.row() > 0 {
            self.cursor.position.line -= 1;
        }
    }

    /// DECBI: cursor left, scrolling the region right at the left margin.
    pub fn back_index(&mut self, lr_margin_mode: bool) {
        let margins = self.effective_margins(lr_margin_mode);
        if self.column() == margins.left {
            self.grid
                .insert_columns(margins.left, 1, margins, &self.cursor.pen);
        } else {
            self.cursor.position.column -= 1;
        }
    }

    /// DECFI: cursor right, scrolling the region left at the right margin.
    pub fn forward_index(&mut self, lr_margin_mode: bool) {
        let margins = self.effective_margins(lr_margin_mode);
        if self.column() == margins.right {
            self.grid
                .delete_columns(margins.left, 1, margins, &self.cursor.pen);
        } else {
            self.cursor.position.column += 1;
        }
    }

    pub fn carriage_return(&mut self, lr_margin_mode: bool) {
        let margins = self.effective_margins(lr_margin_mode);
        self.cursor.wrap_pending = false;
        self.cursor.position.column = if self.column() >= margins.left {
            margins.left as i32
        } else {
            0
        };
    }

    pub fn backspace(&mut self) {
        self.cursor.wrap_pending = false;
        if self.cursor.position.column > 0 {
            self.cursor.position.column -= 1;
        }
    }

    /// HT: advance to the next tab stop (never wraps).
    pub fn horizontal_tab(&mut self) {
        let columns = self.page_size().columns;
        self.cursor.position.column = self.tab_stops.next(self.column(), columns) as i32;
        self.cursor.wrap_pending = false;
    }

    /// CBT: back `n` tab stops.
    pub fn backward_tab(&mut self, n: u16) {
        for _ in 0..n {
            self.cursor.position.column = self.tab_stops.previous(self.column()) as i32;
        }
        self.cursor.wrap_pending = false;
    }

    /// CHT: forward `n` tab stops.
    pub fn forward_tab(&mut self, n: u16) {
        for _ in 0..n {
            self.horizontal_tab();
        }
    }

    pub fn move_up(&mut self, n: u16) {
        let min_row = if self.margins.contains_line(self.row()) {
            self.margins.top
        } else {
            0
        };
        self.cursor.position.line = self.row().saturating_sub(n).max(min_row) as i32;
        self.cursor.wrap_pending = false;
    }

    pub fn move_down(&mut self, n: u16) {
        let max_row = if self.margins.contains_line(self.row()) {
            self.margins.bottom
        } else {
            self.page_size().lines.saturating_sub(1)
        };
        self.cursor.position.line = (self.row().saturating_add(n)).min(max_row) as i32;
        self.cursor.wrap_pending = false;
    }

    pub fn move_forward(&mut self, n: u16, lr_margin_mode: bool) {
        let margins = self.effective_margins(lr_margin_mode);
        let max_col = if margins.contains_column(self.column()) {
            margins.right
        } else {
            self.page_size().columns.saturating_sub(1)
        };
        self.cursor.position.column = (self.column().saturating_add(n)).min(max_col) as i32;
        self.cursor.wrap_pending = false;
    }

    pub fn move_backward(&mut self, n: u16, lr_margin_mode: bool) {
        let margins = self.effective_margins(lr_margin_mode);
        let min_col = if margins.contains_column(self.column()) {
            margins.left
        } else {
            0
        };
        self.cursor.position.column = self.column().saturating_sub(n).max(min_col) as i32;
        self.cursor.wrap_pending = false;
    }

    /// CUP/HVP with 0-based coordinates. Origin mode relocates to the
    /// margin box and clamps within it.
    pub fn move_to(&mut self, line: u16, column: u16, lr_margin_mode: bool) {
        let margins = self.effective_margins(lr_margin_mode);
        let (line, column) = if self.cursor.origin_mode {
            (
                (margins.top + line).min(margins.bottom),
                (margins.left + column).min(margins.right),
            )
        } else {
            (
                line.min(self.page_size().lines.saturating_sub(1)),
                column.min(self.page_size().columns.saturating_sub(1)),
            )
        };
        self.cursor.position = CellLocation::new(line as i32, column as i32);
        self.cursor.wrap_pending = false;
    }

    pub fn move_to_column(&mut self, column: u16, lr_margin_mode: bool) {
        let current_line = self.row();
        self.move_to_internal_axis(Some(current_line), column, lr_margin_mode);
    }

    pub fn move_to_line(&mut self, line: u16, lr_margin_mode: bool) {
        let current_column = self.column();
        let margins = self.effective_margins(lr_margin_mode);
        let line = if self.cursor.origin_mode {
            (margins.top + line).min(margins.bottom)
        } else {
            line.min(self.page_size().lines.saturating_sub(1))
        };
        self.cursor.position = CellLocation::new(line as i32, current_column as i32);
        self.cursor.wrap_pending = false;
    }

    fn move_to_internal_axis(&mut self, line: Option<u16>, column: u16, lr_margin_mode: bool) {
        let margins = self.effective_margins(lr_margin_mode);
        let column = if self.cursor.origin_mode {
            (margins.left + column).min(margins.right)
        } else {
            column.min(self.page_size().columns.saturating_sub(1))
        };
        let line = line.unwrap_or(self.row());
        self.cursor.position = CellLocation::new(line as i32, column as i32);
        self.cursor.wrap_pending = false;
    }

    /// CNL/CPL: column to the left margin, then move.
    pub fn next_line(&mut self, n: u16, lr_margin_mode: bool) {
        self.move_down(n);
        self.cursor.position.column = self.effective_margins(lr_margin_mode).left as i32;
    }

    pub fn previous_line(&mut self, n: u16, lr_margin_mode: bool) {
        self.move_up(n);
        self.cursor.position.column = self.effective_margins(lr_margin_mode).left as i32;
    }

    pub fn save_cursor(&mut self) {
        self.saved_cursor = Some(self.cursor.clone());
    }

    /// DECRC. Restoring without a prior save resets to a default cursor,
    /// per DEC semantics.
    pub fn restore_cursor(&mut self) {
        let page = self.page_size();
        let mut cursor = self.saved_cursor.clone().unwrap_or_default();
        cursor.position.line = cursor.position.line.min(page.lines as i32 - 1);
        cursor.position.column = cursor.position.column.min(page.columns as i32 - 1);
        self.cursor = cursor;
    }

    /// ED: erase in display. Mode 3 (scrollback) is handled a level up.
    pub fn erase_in_display(&mut self, mode: u16) {
        let pen = self.cursor.pen.clone();
        let columns = self.page_size().columns;
        let lines = self.page_size().lines;
        let mut erase_full_line = |grid: &mut Grid, line: u16| {
            let row = grid.line_at_mut(line as i32);
            row.erase_range(0, columns, &pen);
            row.flags = LineFlags::empty();
        };
        match mode {
            0 => {
                self.erase_in_line(0);
                for line in (self.row() + 1)..lines {
                    erase_full_line(&mut self.grid, line);
                }
            }
            1 => {
                self.erase_in_line(1);
                for line in 0..self.row() {
                    erase_full_line(&mut self.grid, line);
                }
            }
            2 => {
                for line in 0..lines {
                    erase_full_line(&mut self.grid, line);
                }
            }
            _ => {}
        }
    }

    /// EL: erase in line.
    pub fn erase_in_line(&mut self, mode: u16) {
        let pen = self.cursor.pen.clone();
        let columns = self.page_size().columns;
        let (row, column) = (self.row(), self.column());
        match mode {
            0 => self
                .grid
                .line_at_mut(row as i32)
                .erase_range(column, columns, &pen),
            1 => self
                .grid
                .line_at_mut(row as i32)
                .erase_range(0, column + 1, &pen),
            2 => self
                .grid
                .line_at_mut(row as i32)
                .erase_range(0, columns, &pen),
            _ => {}
        }
    }

    /// ECH: erase `n` cells at the cursor without moving it.
    pub fn erase_chars(&mut self, n: u16) {
        let pen = self.cursor.pen.clone();
        let (row, column) = (self.row(), self.column());
        self.grid.erase_chars(row, column, n.max(1), &pen);
    }

    /// IL: only acts with the cursor inside the vertical margins.
    pub fn insert_lines(&mut self, n: u16, lr_margin_mode: bool) {
        let margins = self.effective_margins(lr_margin_mode);
        if margins.contains_line(self.row()) {
            let pen = self.cursor.pen.clone();
            let row = self.row();
            self.grid.insert_lines(row, n.max(1), margins, &pen);
            self.cursor.position.column = margins.left as i32;
        }
    }

    /// DL.
    pub fn delete_lines(&mut self, n: u16, lr_margin_mode: bool) {
        let margins = self.effective_margins(lr_margin_mode);
        if margins.contains_line(self.row()) {
            let pen = self.cursor.pen.clone();
            let row = self.row();
            self.grid.delete_lines(row, n.max(1), margins, &pen);
            self.cursor.position.column = margins.left as i32;
        }
    }

    /// ICH.
    pub fn insert_chars(&mut self, n: u16, lr_margin_mode: bool) {
        let margins = self.effective_margins(lr_margin_mode);
        let pen = self.cursor.pen.clone();
        let (row, column) = (self.row(), self.column());
        self.grid
            .insert_chars(row, column, n.max(1), margins.right, &pen);
    }

    /// DCH.
    pub fn delete_chars(&mut self, n: u16, lr_margin_mode: bool) {
        let margins = self.effective_margins(lr_margin_mode);
        let pen = self.cursor.pen.clone();
        let (row, column) = (self.row(), self.column());
        self.grid
            .delete_chars(row, column, n.max(1), margins.right, &pen);
    }

    /// DECIC: insert columns at the cursor within the margins.
    pub fn insert_columns(&mut self, n: u16, lr_margin_mode: bool) {
        let margins = self.effective_margins(lr_margin_mode);
        if margins.contains_line(self.row()) && margins.contains_column(self.column()) {
            let pen = self.cursor.pen.clone();
            let column = self.column();
            self.grid.insert_columns(column, n.max(1), margins, &pen);
        }
    }

    /// DECDC.
    pub fn delete_columns(&mut self, n: u16, lr_margin_mode: bool) {
        let margins = self.effective_margins(lr_margin_mode);
        if margins.contains_line(self.row()) && margins.contains_column(self.column()) {
            let pen = self.cursor.pen.clone();
            let column = self.column();
            self.grid.delete_columns(column, n.max(1), margins, &pen);
        }
    }

    /// SU: scroll the region up without moving the cursor. Returns lines
    /// pushed to history.
    pub fn scroll_up(&mut self, n: u16, lr_margin_mode: bool) -> usize {
        let margins = self.effective_margins(lr_margin_mode);
        let pen = self.cursor.pen.clone();
        self.grid.scroll_up(n.max(1), margins, &pen)
    }

    /// SD.
    pub fn scroll_down(&mut self, n: u16, lr_margin_mode: bool) {
        let margins = self.effective_margins(lr_margin_mode);
        let pen = self.cursor.pen.clone();
        self.grid.scroll_down(n.max(1), margins, &pen);
    }

    /// SETMARK: flag the cursor line for jump-to-mark.
    pub fn mark_line(&mut self) {
        let row = self.row();
        self.grid
            .line_at_mut(row as i32)
            .flags
            .insert(LineFlags::MARKED);
    }

    /// DECALN: fill the page with `E`, reset margins, home the cursor.
    pub fn alignment_pattern(&mut self) {
        self.reset_margins();
        self.cursor.position = CellLocation::new(0, 0);
        self.cursor.wrap_pending = false;
        let pen = Pen::default();
        let page = self.page_size();
        for line in 0..page.lines {
            let row = self.grid.line_at_mut(line as i32);
            for cell in &mut row.cells {
                cell.write("E", &pen);
            }
        }
    }

    /// Clear the page and home the cursor (alt-screen enter).
    pub fn clear_page(&mut self) {
        let page = self.page_size();
        for line in 0..page.lines {
            self.grid.line_at_mut(line as i32).clear();
        }
        self.cursor.position = CellLocation::new(0, 0);
        self.cursor.wrap_pending = false;
    }

    /// Resize grid + cursor + margins. `reflow` applies to wrappable
    /// content (TextReflow mode; the alternate screen never reflows).
    pub fn resize(&mut self, page: PageSize, reflow: bool) {
        let reflow = reflow && self.screen_type == ScreenType::Primary;
        let cursor = self.grid.resize(page, self.cursor.position, reflow);
        self.cursor.position = cursor;
        self.cursor.wrap_pending = false;
        self.margins = Margins::full(page);
        if let TabStops::Explicit(stops) = &mut self.tab_stops {
            stops.retain(|&stop| stop < page.columns);
        }
    }

    /// Soft-reset portion owned by the screen (DECSTR).
    pub fn soft_reset(&mut self) {
        self.cursor.origin_mode = false;
        self.cursor.auto_wrap = false;
        self.cursor.wrap_pending = false;
        self.cursor.pen.reset();
        self.saved_cursor = None;
        self.reset_margins();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::MaxHistoryLineCount;

    fn screen(lines: u16, columns: u16) -> Screen {
        Screen::new(
            ScreenType::Primary,
            PageSize::new(lines, columns),
            MaxHistoryLineCount::Finite(50),
        )
    }

    fn page_text(screen: &Screen, line: i32) -> String {
        screen.grid().line_at(line).text_trimmed()
    }

    #[test]
    fn write_advances_cursor() {
        let mut s = screen(10, 20);
        s.write_text("Hi", false, false);
        assert_eq!(page_text(&s, 0), "Hi");
        assert_eq!(s.cursor.position, CellLocation::new(0, 2));
        assert!(!s.cursor.wrap_pending);
    }

    #[test]
    fn autowrap_defers_until_next_char() {
        let mut s = screen(2, 5);
        s.write_text("AAAAAAA", false, false);
        assert_eq!(page_text(&s, 0), "AAAAA");
        assert!(s
            .grid()
            .line_at(0)
            .flags
            .contains(LineFlags::WRAPPABLE));
        assert_eq!(page_text(&s, 1), "AA");
        assert!(s.grid().line_at(1).flags.contains(LineFlags::WRAPPED));
        assert_eq!(s.cursor.position, CellLocation::new(1, 2));
    }

    #[test]
    fn no_autowrap_overwrites_last_column() {
        let mut s = screen(2, 5);
        s.cursor.auto_wrap = false;
        s.write_text("ABCDEFG", false, false);
        assert_eq!(page_text(&s, 0), "ABCDG");
        assert_eq!(s.cursor.position, CellLocation::new(0, 4));
    }

    #[test]
    fn wide_chars_place_spacers() {
        let mut s = screen(2, 6);
        s.write_text("a世b", false, false);
        assert_eq!(s.cursor.position, CellLocation::new(0, 4));
        assert!(s.grid().at(0, 1).is_wide());
        assert!(s.grid().at(0, 2).is_wide_spacer());
        assert_eq!(s.grid().at(0, 3).base_char(), 'b');
    }

    #[test]
    fn combining_mark_attaches_to_previous_cell() {
        let mut s = screen(2, 10);
        s.write_text("e", false, false);
        s.write_text("\u{0301}", false, false);
        assert_eq!(s.grid().at(0, 0).text(), "e\u{0301}");
        assert_eq!(s.cursor.position, CellLocation::new(0, 1));
    }

    #[test]
    fn linefeed_scrolls_at_bottom_margin() {
        let mut s = screen(4, 4);
        s.set_vertical_margins(1, 2);
        s.move_to(2, 0, false);
        s.write_text("X", false, false);
        let pushed = s.linefeed(false);
        // Region scrolls never touch history.
        assert_eq!(pushed, 0);
        assert_eq!(page_text(&s, 1), "X");
        assert_eq!(s.cursor.position.line, 2);
    }

    #[test]
    fn origin_mode_relocates_cup() {
        let mut s = screen(24, 80);
        s.set_vertical_margins(5, 20);
        s.cursor.origin_mode = true;
        s.move_to(0, 0, false);
        assert_eq!(s.cursor.position.line, 5);
        s.move_to(30, 0, false);
        assert_eq!(s.cursor.position.line, 20, "clamped to bottom margin");
    }

    #[test]
    fn tab_stops_uniform_and_explicit() {
        let mut s = screen(2, 32);
        s.horizontal_tab();
        assert_eq!(s.cursor.position.column, 8);
        s.tab_stops.clear_all();
        s.tab_stops.set(3, 32);
        s.tab_stops.set(11, 32);
        s.move_to(0, 0, false);
        s.horizontal_tab();
        assert_eq!(s.cursor.position.column, 3);
        s.horizontal_tab();
        assert_eq!(s.cursor.position.column, 11);
        s.horizontal_tab();
        assert_eq!(s.cursor.position.column, 31, "truncates to page width");
        s.backward_tab(1);
        assert_eq!(s.cursor.position.column, 11);
    }

    #[test]
    fn erase_uses_current_background() {
        use crate::color::Color;
        let mut s = screen(2, 4);
        s.write_text("AB", false, false);
        s.cursor.pen.bg = Color::Indexed(3);
        s.move_to(0, 0, false);
        s.erase_in_line(0);
        assert_eq!(s.grid().at(0, 0).bg, Color::Indexed(3));
        assert_eq!(s.grid().at(0, 0).base_char(), ' ');
    }

    #[test]
    fn save_restore_cursor_round_trips() {
        let mut s = screen(10, 10);
        s.move_to(4, 6, false);
        s.cursor.auto_wrap = false;
        s.save_cursor();
        s.move_to(0, 0, false);
        s.cursor.auto_wrap = true;
        s.restore_cursor();
        assert_eq!(s.cursor.position, CellLocation::new(4, 6));
        assert!(!s.cursor.auto_wrap);
    }

    #[test]
    fn alignment_pattern_fills_page() {
        let mut s = screen(3, 4);
        s.set_vertical_margins(1, 2);
        s.alignment_pattern();
        for line in 0..3 {
            assert_eq!(page_text(&s, line), "EEEE");
        }
        assert_eq!(s.margins(), Margins::full(s.page_size()));
        assert_eq!(s.cursor.position, CellLocation::new(0, 0));
    }

    #[test]
    fn insert_lines_respects_margins() {
        let mut s = screen(4, 3);
        for (i, t) in ["aaa", "bbb", "ccc", "ddd"].iter().enumerate() {
            s.move_to(i as u16, 0, false);
            s.write_text(t, false, false);
        }
        s.set_vertical_margins(1, 2);
        s.move_to(1, 0, false);
        s.insert_lines(1, false);
        assert_eq!(page_text(&s, 0), "aaa");
        assert_eq!(page_text(&s, 1), "");
        assert_eq!(page_text(&s, 2), "bbb");
        assert_eq!(page_text(&s, 3), "ddd");
    }
}
