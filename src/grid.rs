use std::collections::VecDeque;

use bitflags::bitflags;

use crate::cell::{Cell, Pen};

/// Signed line addressing: negative offsets reach into history, `0` is the
/// first line of the active page.
pub type LineOffset = i32;
/// Signed column addressing, for symmetry with [`LineOffset`].
pub type ColumnOffset = i32;

/// A cell position in grid coordinates. Ordered line-major so selection
/// endpoints can be compared directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct CellLocation {
    pub line: LineOffset,
    pub column: ColumnOffset,
}

impl CellLocation {
    pub const fn new(line: LineOffset, column: ColumnOffset) -> Self {
        Self { line, column }
    }
}

/// Page dimensions in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSize {
    pub lines: u16,
    pub columns: u16,
}

impl PageSize {
    pub const fn new(lines: u16, columns: u16) -> Self {
        Self { lines, columns }
    }
}

/// Scrollback retention policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxHistoryLineCount {
    Finite(usize),
    Infinite,
}

impl MaxHistoryLineCount {
    fn allows(&self, count: usize) -> bool {
        match self {
            MaxHistoryLineCount::Finite(n) => count <= *n,
            MaxHistoryLineCount::Infinite => true,
        }
    }
}

/// The scrolling region, inclusive on all edges. Horizontal margins are
/// only consulted when the screen has LeftRightMargin mode enabled; callers
/// pass full-width margins otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Margins {
    pub top: u16,
    pub bottom: u16,
    pub left: u16,
    pub right: u16,
}

impl Margins {
    pub fn full(page: PageSize) -> Self {
        Self {
            top: 0,
            bottom: page.lines.saturating_sub(1),
            left: 0,
            right: page.columns.saturating_sub(1),
        }
    }

    pub fn contains_line(&self, line: u16) -> bool {
        (self.top..=self.bottom).contains(&line)
    }

    pub fn contains_column(&self, column: u16) -> bool {
        (self.left..=self.right).contains(&column)
    }

    fn is_full(&self, page: PageSize) -> bool {
        *self == Self::full(page)
    }
}

bitflags! {
    /// Per-line flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct LineFlags: u8 {
        /// Content may be re-broken on resize
        const WRAPPABLE = 1 << 0;
        /// This line logically continues the previous one
        const WRAPPED   = 1 << 1;
        /// User/application marker for jump-to-mark
        const MARKED    = 1 << 2;
    }
}

/// A single row of cells, always exactly as wide as the grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub cells: Vec<Cell>,
    pub flags: LineFlags,
}

impl Line {
    pub fn new(columns: u16) -> Self {
        Self {
            cells: vec![Cell::default(); columns as usize],
            flags: LineFlags::empty(),
        }
    }

    pub fn blank(columns: u16, pen: &Pen) -> Self {
        Self {
            cells: vec![Cell::blank(pen); columns as usize],
            flags: LineFlags::empty(),
        }
    }

    pub fn len(&self) -> u16 {
        self.cells.len() as u16
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Erase cells in `[start, end)` with the pen's background.
    pub fn erase_range(&mut self, start: u16, end: u16, pen: &Pen) {
        let end = (end as usize).min(self.cells.len());
        for cell in &mut self.cells[(start as usize).min(end)..end] {
            cell.erase(pen);
        }
    }

    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            cell.clear();
        }
        self.flags = LineFlags::empty();
    }

    /// True when every cell is a plain blank.
    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(Cell::is_blank)
    }

    /// Line text with trailing whitespace stripped; wide spacers skipped.
    pub fn text_trimmed(&self) -> String {
        let mut out = String::new();
        for cell in &self.cells {
            if cell.is_wide_spacer() {
                continue;
            }
            cell.append_text(&mut out);
        }
        out.truncate(out.trim_end().len());
        out
    }

    /// Number of trailing blank cells, used by reflow to avoid carrying
    /// padding into rewrapped lines.
    fn trailing_blanks(&self) -> usize {
        self.cells
            .iter()
            .rev()
            .take_while(|c| c.is_blank())
            .count()
    }

    fn resize_width(&mut self, columns: u16) {
        self.cells.resize(columns as usize, Cell::default());
    }
}

/// Lines of cells, logically split into history (`-H..-1`) and the active
/// page (`0..lines-1`). Stored as a deque so full-page scrolling rotates in
/// O(1) instead of moving cells.
#[derive(Debug)]
pub struct Grid {
    lines: VecDeque<Line>,
    page: PageSize,
    max_history: MaxHistoryLineCount,
}

impl Grid {
    pub fn new(page: PageSize, max_history: MaxHistoryLineCount) -> Self {
        let mut lines = VecDeque::with_capacity(page.lines as usize);
        for _ in 0..page.lines {
            lines.push_back(Line::new(page.columns));
        }
        Self {
            lines,
            page,
            max_history,
        }
    }

    pub fn page_size(&self) -> PageSize {
        self.page
    }

    pub fn history_line_count(&self) -> usize {
        self.lines.len() - self.page.lines as usize
    }

    pub fn max_history(&self) -> MaxHistoryLineCount {
        self.max_history
    }

    pub fn set_max_history(&mut self, max: MaxHistoryLineCount) {
        self.max_history = max;
        self.enforce_history_cap();
    }

    pub fn total_line_count(&self) -> usize {
        self.lines.len()
    }

    fn slot(&self, offset: LineOffset) -> usize {
        let idx = self.history_line_count() as i64 + offset as i64;
        debug_assert!(idx >= 0 && (idx as usize) < self.lines.len());
        idx.clamp(0, self.lines.len() as i64 - 1) as usize
    }

    /// True when `offset` addresses a retained line.
    pub fn contains_line(&self, offset: LineOffset) -> bool {
        let idx = self.history_line_count() as i64 + offset as i64;
        idx >= 0 && (idx as usize) < self.lines.len()
    }

    pub fn line_at(&self, offset: LineOffset) -> &Line {
        &self.lines[self.slot(offset)]
    }

    pub fn line_at_mut(&mut self, offset: LineOffset) -> &mut Line {
        let slot = self.slot(offset);
        &mut self.lines[slot]
    }

    pub fn at(&self, line: LineOffset, column: ColumnOffset) -> &Cell {
        &self.line_at(line).cells[column.max(0) as usize]
    }

    pub fn at_mut(&mut self, line: LineOffset, column: ColumnOffset) -> &mut Cell {
        let column = column.max(0) as usize;
        &mut self.line_at_mut(line).cells[column]
    }

    /// Scroll the margin region up by `n`. Full-page scrolls rotate the
    /// deque and feed history; region scrolls never touch history. Returns
    /// the number of lines pushed into history.
    pub fn scroll_up(&mut self, n: u16, margins: Margins, pen: &Pen) -> usize {
        if n == 0 {
            return 0;
        }
        let span = margins.bottom - margins.top + 1;
        let n = n.min(span);

        if margins.is_full(self.page) {
            for _ in 0..n {
                self.lines.push_back(Line::blank(self.page.columns, pen));
            }
            let pushed = n as usize;
            self.enforce_history_cap();
            self.assert_consistent();
            return pushed;
        }

        if margins.left == 0 && margins.right == self.page.columns.saturating_sub(1) {
            // Vertical sub-region, full width: rotate whole lines.
            for _ in 0..n {
                let top_slot = self.slot(margins.top as LineOffset);
                self.lines.remove(top_slot);
                let bottom_slot = self.slot(margins.bottom as LineOffset);
                self.lines
                    .insert(bottom_slot, Line::blank(self.page.columns, pen));
            }
        } else {
            // Horizontal margins active: move cell ranges.
            for line in margins.top..=margins.bottom {
                let src_line = line + n;
                for col in margins.left..=margins.right {
                    let replacement = if src_line <= margins.bottom {
                        self.at(src_line as LineOffset, col as ColumnOffset).clone()
                    } else {
                        Cell::blank(pen)
                    };
                    *self.at_mut(line as LineOffset, col as ColumnOffset) = replacement;
                }
            }
        }
        self.assert_consistent();
        0
    }

    /// Scroll the margin region down by `n`, dropping lines off the bottom.
    pub fn scroll_down(&mut self, n: u16, margins: Margins, pen: &Pen) {
        if n == 0 {
            return;
        }
        let span = margins.bottom - margins.top + 1;
        let n = n.min(span);

        if margins.left == 0 && margins.right == self.page.columns.saturating_sub(1) {
            for _ in 0..n {
                let bottom_slot = self.slot(margins.bottom as LineOffset);
                self.lines.remove(bottom_slot);
                let top_slot = self.slot(margins.top as LineOffset);
                self.lines
                    .insert(top_slot, Line::blank(self.page.columns, pen));
            }
        } else {
            for line in (margins.top..=margins.bottom).rev() {
                for col in margins.left..=margins.right {
                    let replacement = if line >= margins.top + n {
                        self.at((line - n) as LineOffset, col as ColumnOffset).clone()
                    } else {
                        Cell::blank(pen)
                    };
                    *self.at_mut(line as LineOffset, col as ColumnOffset) = replacement;
                }
            }
        }
        self.assert_consistent();
    }

    /// IL: insert `n` blank lines at `at`, shifting lines below down within
    /// the margin region.
    pub fn insert_lines(&mut self, at: u16, n: u16, margins: Margins, pen: &Pen) {
        let margins = Margins {
            top: at,
            ..margins
        };
        self.scroll_down(n, margins, pen);
    }

    /// DL: delete `n` lines at `at`, scrolling the remainder of the region up.
    pub fn delete_lines(&mut self, at: u16, n: u16, margins: Margins, pen: &Pen) {
        let margins = Margins {
            top: at,
            ..margins
        };
        // Deleting inside a region never feeds history.
        if margins.left == 0 && margins.right == self.page.columns.saturating_sub(1) {
            let n = n.min(margins.bottom - margins.top + 1);
            for _ in 0..n {
                let top_slot = self.slot(margins.top as LineOffset);
                self.lines.remove(top_slot);
                let bottom_slot = self.slot(margins.bottom as LineOffset);
                self.lines
                    .insert(bottom_slot, Line::blank(self.page.columns, pen));
            }
            self.assert_consistent();
        } else {
            self.scroll_up(n, margins, pen);
        }
    }

    /// DECIC: insert `n` blank columns at `at_column` within the margins,
    /// shifting columns right.
    pub fn insert_columns(&mut self, at_column: u16, n: u16, margins: Margins, pen: &Pen) {
        let n = n.min(margins.right.saturating_sub(at_column) + 1);
        for line in margins.top..=margins.bottom {
            for col in ((at_column + n)..=margins.right).rev() {
                let src = self.at(line as LineOffset, (col - n) as ColumnOffset).clone();
                *self.at_mut(line as LineOffset, col as ColumnOffset) = src;
            }
            for col in at_column..(at_column + n).min(margins.right + 1) {
                *self.at_mut(line as LineOffset, col as ColumnOffset) = Cell::blank(pen);
            }
        }
    }

    /// DECDC: delete `n` columns at `at_column`, shifting columns left.
    pub fn delete_columns(&mut self, at_column: u16, n: u16, margins: Margins, pen: &Pen) {
        let n = n.min(margins.right.saturating_sub(at_column) + 1);
        for line in margins.top..=margins.bottom {
            for col in at_column..=margins.right {
                let src_col = col + n;
                let replacement = if src_col <= margins.right {
                    self.at(line as LineOffset, src_col as ColumnOffset).clone()
                } else {
                    Cell::blank(pen)
                };
                *self.at_mut(line as LineOffset, col as ColumnOffset) = replacement;
            }
        }
    }

    /// ICH: insert blank cells at the cursor, shifting the tail right up to
    /// the right margin.
    pub fn insert_chars(&mut self, line: u16, at: u16, n: u16, right: u16, pen: &Pen) {
        let right = right.min(self.page.columns.saturating_sub(1));
        if at > right {
            return;
        }
        let n = n.min(right - at + 1);
        let row = self.line_at_mut(line as LineOffset);
        for col in ((at + n)..=right).rev() {
            row.cells[col as usize] = row.cells[(col - n) as usize].clone();
        }
        for col in at..at + n {
            row.cells[col as usize] = Cell::blank(pen);
        }
    }

    /// DCH: delete cells at the cursor, shifting the tail left from the
    /// right margin.
    pub fn delete_chars(&mut self, line: u16, at: u16, n: u16, right: u16, pen: &Pen) {
        let right = right.min(self.page.columns.saturating_sub(1));
        if at > right {
            return;
        }
        let n = n.min(right - at + 1);
        let row = self.line_at_mut(line as LineOffset);
        for col in at..=right {
            let src = col + n;
            row.cells[col as usize] = if src <= right {
                row.cells[src as usize].clone()
            } else {
                Cell::blank(pen)
            };
        }
    }

    /// ECH: erase `n` cells from `at` without moving anything.
    pub fn erase_chars(&mut self, line: u16, at: u16, n: u16, pen: &Pen) {
        let end = (at as u32 + n as u32).min(self.page.columns as u32) as u16;
        self.line_at_mut(line as LineOffset).erase_range(at, end, pen);
    }

    /// Drop all history lines (ED 3).
    pub fn clear_history(&mut self) {
        let history = self.history_line_count();
        for _ in 0..history {
            self.lines.pop_front();
        }
        if let Some(front) = self.lines.front_mut() {
            front.flags.remove(LineFlags::WRAPPED);
        }
        self.assert_consistent();
    }

    /// Find the next `MARKED` line above `from` (exclusive).
    pub fn find_marker_upwards(&self, from: LineOffset) -> Option<LineOffset> {
        let mut offset = from - 1;
        while self.contains_line(offset) {
            if self.line_at(offset).flags.contains(LineFlags::MARKED) {
                return Some(offset);
            }
            offset -= 1;
        }
        None
    }

    /// Find the next `MARKED` line below `from` (exclusive).
    pub fn find_marker_downwards(&self, from: LineOffset) -> Option<LineOffset> {
        let mut offset = from + 1;
        while self.contains_line(offset) {
            if self.line_at(offset).flags.contains(LineFlags::MARKED) {
                return Some(offset);
            }
            offset += 1;
        }
        None
    }

    fn enforce_history_cap(&mut self) {
        while !self.max_history.allows(self.history_line_count()) {
            self.lines.pop_front();
            if let Some(front) = self.lines.front_mut() {
                front.flags.remove(LineFlags::WRAPPED);
            }
        }
    }

    /// Resize the grid. Returns the relocated cursor for a cursor given in
    /// page coordinates. With `reflow` set, wrappable logical lines are
    /// re-broken to the new width; otherwise lines truncate or pad.
    pub fn resize(
        &mut self,
        new_page: PageSize,
        cursor: CellLocation,
        reflow: bool,
    ) -> CellLocation {
        let mut cursor = cursor;

        if new_page.columns != self.page.columns {
            cursor = if reflow {
                self.reflow_columns(new_page.columns, cursor)
            } else {
                for line in self.lines.iter_mut() {
                    line.resize_width(new_page.columns);
                }
                CellLocation::new(
                    cursor.line,
                    cursor.column.min(new_page.columns.saturating_sub(1) as i32),
                )
            };
            self.page.columns = new_page.columns;
        }

        if new_page.lines != self.page.lines {
            cursor = self.resize_lines(new_page.lines, cursor);
        }

        self.enforce_history_cap();
        self.assert_consistent();
        cursor
    }

    fn resize_lines(&mut self, new_lines: u16, cursor: CellLocation) -> CellLocation {
        let absolute = self.history_line_count() as i64 + cursor.line as i64;

        if new_lines < self.page.lines {
            // Trim trailing blank lines below the cursor before pushing
            // page content into history.
            let mut excess = (self.page.lines - new_lines) as usize;
            while excess > 0
                && self.lines.len() as i64 - 1 > absolute
                && self.lines.back().map(Line::is_blank).unwrap_or(false)
            {
                self.lines.pop_back();
                excess -= 1;
            }
        } else {
            while (self.lines.len() as u16) < new_lines {
                self.lines.push_back(Line::new(self.page.columns));
            }
        }

        self.page.lines = new_lines;
        let new_history = self.lines.len() as i64 - new_lines as i64;
        let line = (absolute - new_history).clamp(0, new_lines as i64 - 1) as i32;
        CellLocation::new(line, cursor.column)
    }

    fn reflow_columns(&mut self, new_columns: u16, cursor: CellLocation) -> CellLocation {
        let cursor_absolute = self.history_line_count() as i64 + cursor.line as i64;
        let old_lines: Vec<Line> = std::mem::take(&mut self.lines).into();

        let mut new_lines: VecDeque<Line> = VecDeque::with_capacity(old_lines.len());
        let mut new_cursor_slot = None;
        let mut new_cursor_col = cursor.column;

        let mut i = 0usize;
        while i < old_lines.len() {
            // A logical line is a non-wrapped line plus its wrapped
            // continuations.
            let start = i;
            i += 1;
            while i < old_lines.len() && old_lines[i].flags.contains(LineFlags::WRAPPED) {
                i += 1;
            }
            let group = &old_lines[start..i];
            let wrappable = group[0].flags.contains(LineFlags::WRAPPABLE);
            let marked = group
                .iter()
                .any(|l| l.flags.contains(LineFlags::MARKED));

            // Locate the cursor within this logical line, as a flat cell
            // index, before the content is re-broken.
            let mut cursor_flat = None;
            if (start as i64..i as i64).contains(&cursor_absolute) {
                let within = (cursor_absolute - start as i64) as usize;
                let flat = within * group[0].cells.len() + cursor.column.max(0) as usize;
                cursor_flat = Some(flat);
            }

            if !wrappable {
                // Not reflowable: truncate or pad each physical line.
                for (k, line) in group.iter().enumerate() {
                    let mut line = line.clone();
                    line.resize_width(new_columns);
                    if start as i64 + k as i64 == cursor_absolute {
                        new_cursor_slot = Some(new_lines.len());
                        new_cursor_col =
                            cursor.column.min(new_columns.saturating_sub(1) as i32);
                    }
                    new_lines.push_back(line);
                }
                continue;
            }

            // Flatten, dropping the padding after the last content cell.
            let mut flat: Vec<Cell> = Vec::new();
            for (k, line) in group.iter().enumerate() {
                let keep = if k + 1 == group.len() {
                    line.cells.len() - line.trailing_blanks()
                } else {
                    line.cells.len()
                };
                flat.extend(line.cells.iter().take(keep).cloned());
            }

            // Re-break at the new width. Wide characters never split across
            // physical lines.
            let mut pieces: Vec<Line> = Vec::new();
            let mut current: Vec<Cell> = Vec::new();
            let mut flat_index_of_current_start = 0usize;
            for (flat_idx, cell) in flat.iter().enumerate() {
                let cell_cols = if cell.is_wide() { 2 } else { 1 };
                if current.len() + cell_cols > new_columns as usize && !current.is_empty() {
                    current.resize(new_columns as usize, Cell::default());
                    let mut line = Line {
                        cells: std::mem::take(&mut current),
                        flags: LineFlags::WRAPPABLE,
                    };
                    if !pieces.is_empty() {
                        line.flags.insert(LineFlags::WRAPPED);
                    }
                    pieces.push(line);
                    flat_index_of_current_start = flat_idx;
                }
                if let Some(target) = cursor_flat {
                    if target == flat_idx {
                        new_cursor_slot = Some(new_lines.len() + pieces.len());
                        new_cursor_col = (flat_idx - flat_index_of_current_start) as i32;
                    }
                }
                current.push(cell.clone());
            }
            // Cursor past the content end lands at the end of the last piece.
            if let Some(target) = cursor_flat {
                if target >= flat.len() && new_cursor_slot.is_none() {
                    let tail_len = current.len();
                    new_cursor_slot = Some(new_lines.len() + pieces.len());
                    new_cursor_col = (tail_len as i32
                        + (target - flat.len()) as i32)
                        .min(new_columns.saturating_sub(1) as i32);
                }
            }
            current.resize(new_columns as usize, Cell::default());
            let mut last = Line {
                cells: current,
                flags: LineFlags::WRAPPABLE,
            };
            if !pieces.is_empty() {
                last.flags.insert(LineFlags::WRAPPED);
            }
            pieces.push(last);
            if marked {
                pieces[0].flags.insert(LineFlags::MARKED);
            }
            new_lines.extend(pieces);
        }

        if new_lines.is_empty() {
            new_lines.push_back(Line::new(new_columns));
        }
        // Keep at least a full page of lines.
        while (new_lines.len() as u16) < self.page.lines {
            new_lines.push_back(Line::new(new_columns));
        }

        // Let blank lines below the cursor absorb wrap growth instead of
        // pushing page content into history.
        let cursor_slot = new_cursor_slot.unwrap_or(new_lines.len().saturating_sub(1));
        while new_lines.len() > self.page.lines as usize
            && new_lines.len() - 1 > cursor_slot
            && new_lines.back().map(Line::is_blank).unwrap_or(false)
        {
            new_lines.pop_back();
        }

        self.lines = new_lines;

        let new_history = self.lines.len() as i64 - self.page.lines as i64;
        let line = match new_cursor_slot {
            Some(slot) => (slot as i64 - new_history).clamp(0, self.page.lines as i64 - 1),
            None => cursor.line as i64,
        };
        CellLocation::new(
            line as i32,
            new_cursor_col.clamp(0, new_columns.saturating_sub(1) as i32),
        )
    }

    #[cfg(debug_assertions)]
    fn assert_consistent(&self) {
        assert!(self.lines.len() >= self.page.lines as usize);
        for (i, line) in self.lines.iter().enumerate() {
            assert_eq!(line.len(), self.page.columns, "line {i} width mismatch");
            if line.flags.contains(LineFlags::WRAPPED) {
                assert!(i > 0, "wrapped line without predecessor");
                assert!(
                    self.lines[i - 1].flags.contains(LineFlags::WRAPPABLE),
                    "wrapped line {i} follows non-wrappable line"
                );
            }
        }
    }

    #[cfg(not(debug_assertions))]
    fn assert_consistent(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_text(grid: &mut Grid, line: LineOffset, text: &str) {
        let pen = Pen::default();
        for (i, ch) in text.chars().enumerate() {
            let mut buf = [0u8; 4];
            grid.at_mut(line, i as i32)
                .write(ch.encode_utf8(&mut buf), &pen);
        }
    }

    fn line_text(grid: &Grid, line: LineOffset) -> String {
        grid.line_at(line).text_trimmed()
    }

    #[test]
    fn full_page_scroll_feeds_history() {
        let pen = Pen::default();
        let mut grid = Grid::new(PageSize::new(3, 4), MaxHistoryLineCount::Finite(5));
        write_text(&mut grid, 0, "AAAA");
        write_text(&mut grid, 1, "BBBB");
        write_text(&mut grid, 2, "CCCC");

        let pushed = grid.scroll_up(1, Margins::full(grid.page_size()), &pen);
        assert_eq!(pushed, 1);
        assert_eq!(grid.history_line_count(), 1);
        assert_eq!(line_text(&grid, -1), "AAAA");
        assert_eq!(line_text(&grid, 0), "BBBB");
        assert_eq!(line_text(&grid, 1), "CCCC");
        assert_eq!(line_text(&grid, 2), "");
    }

    #[test]
    fn history_cap_evicts_oldest() {
        let pen = Pen::default();
        let mut grid = Grid::new(PageSize::new(2, 4), MaxHistoryLineCount::Finite(2));
        for i in 0..6 {
            write_text(&mut grid, 0, &format!("L{i}"));
            grid.scroll_up(1, Margins::full(grid.page_size()), &pen);
        }
        assert_eq!(grid.history_line_count(), 2);
    }

    #[test]
    fn region_scroll_leaves_history_alone() {
        let pen = Pen::default();
        let mut grid = Grid::new(PageSize::new(4, 4), MaxHistoryLineCount::Finite(10));
        for (i, t) in ["AAAA", "BBBB", "CCCC", "DDDD"].iter().enumerate() {
            write_text(&mut grid, i as i32, t);
        }
        let margins = Margins {
            top: 1,
            bottom: 2,
            left: 0,
            right: 3,
        };
        let pushed = grid.scroll_up(1, margins, &pen);
        assert_eq!(pushed, 0);
        assert_eq!(grid.history_line_count(), 0);
        assert_eq!(line_text(&grid, 0), "AAAA");
        assert_eq!(line_text(&grid, 1), "CCCC");
        assert_eq!(line_text(&grid, 2), "");
        assert_eq!(line_text(&grid, 3), "DDDD");
    }

    #[test]
    fn horizontal_margin_scroll_moves_cell_ranges() {
        let pen = Pen::default();
        let mut grid = Grid::new(PageSize::new(2, 4), MaxHistoryLineCount::Finite(0));
        write_text(&mut grid, 0, "ABCD");
        write_text(&mut grid, 1, "EFGH");
        let margins = Margins {
            top: 0,
            bottom: 1,
            left: 1,
            right: 2,
        };
        grid.scroll_up(1, margins, &pen);
        assert_eq!(line_text(&grid, 0), "AFGD");
        assert_eq!(line_text(&grid, 1), "E  H");
    }

    #[test]
    fn insert_and_delete_chars_respect_right_margin() {
        let pen = Pen::default();
        let mut grid = Grid::new(PageSize::new(1, 6), MaxHistoryLineCount::Finite(0));
        write_text(&mut grid, 0, "ABCDEF");
        grid.insert_chars(0, 1, 2, 3, &pen);
        assert_eq!(line_text(&grid, 0), "A  BEF");
        grid.delete_chars(0, 1, 2, 3, &pen);
        assert_eq!(line_text(&grid, 0), "AB  EF");
    }

    #[test]
    fn reflow_shrink_rewraps_and_tracks_cursor() {
        let mut grid = Grid::new(PageSize::new(2, 6), MaxHistoryLineCount::Finite(10));
        write_text(&mut grid, 0, "ABCDEF");
        grid.line_at_mut(0).flags.insert(LineFlags::WRAPPABLE);

        let cursor = grid.resize(PageSize::new(2, 4), CellLocation::new(0, 5), true);
        // "ABCDEF" rewraps as "ABCD" / "EF"; the cursor followed 'F'.
        assert_eq!(line_text(&grid, 0), "ABCD");
        assert_eq!(line_text(&grid, 1), "EF");
        assert!(grid.line_at(1).flags.contains(LineFlags::WRAPPED));
        assert_eq!(cursor, CellLocation::new(1, 1));
    }

    #[test]
    fn reflow_grow_rejoins_wrapped_lines() {
        let mut grid = Grid::new(PageSize::new(2, 4), MaxHistoryLineCount::Finite(10));
        write_text(&mut grid, 0, "ABCD");
        write_text(&mut grid, 1, "EF");
        grid.line_at_mut(0).flags.insert(LineFlags::WRAPPABLE);
        grid.line_at_mut(1)
            .flags
            .insert(LineFlags::WRAPPABLE | LineFlags::WRAPPED);

        let cursor = grid.resize(PageSize::new(2, 8), CellLocation::new(1, 1), true);
        assert_eq!(line_text(&grid, 0), "ABCDEF");
        assert_eq!(cursor, CellLocation::new(0, 5));
    }

    #[test]
    fn reflow_round_trip_restores_page() {
        let mut grid = Grid::new(PageSize::new(3, 8), MaxHistoryLineCount::Finite(20));
        write_text(&mut grid, 0, "ABCDEFGH");
        grid.line_at_mut(0).flags.insert(LineFlags::WRAPPABLE);
        write_text(&mut grid, 1, "XY");
        grid.line_at_mut(1).flags.insert(LineFlags::WRAPPABLE);

        let before: Vec<String> = (0..3).map(|i| line_text(&grid, i)).collect();
        let cursor = CellLocation::new(1, 2);
        let cursor = grid.resize(PageSize::new(3, 5), cursor, true);
        let cursor = grid.resize(PageSize::new(3, 8), cursor, true);
        let after: Vec<String> = (0..3).map(|i| line_text(&grid, i)).collect();
        assert_eq!(before, after);
        assert_eq!(cursor.column, 2);
    }

    #[test]
    fn non_wrappable_lines_truncate_on_shrink() {
        let mut grid = Grid::new(PageSize::new(1, 6), MaxHistoryLineCount::Finite(0));
        write_text(&mut grid, 0, "ABCDEF");
        let _ = grid.resize(PageSize::new(1, 3), CellLocation::new(0, 0), true);
        assert_eq!(line_text(&grid, 0), "ABC");
    }

    #[test]
    fn shrinking_height_trims_blank_tail_before_history() {
        let mut grid = Grid::new(PageSize::new(4, 4), MaxHistoryLineCount::Finite(10));
        write_text(&mut grid, 0, "AAAA");
        let cursor = grid.resize(PageSize::new(2, 4), CellLocation::new(0, 0), true);
        assert_eq!(grid.history_line_count(), 0);
        assert_eq!(cursor, CellLocation::new(0, 0));
        assert_eq!(line_text(&grid, 0), "AAAA");
    }

    #[test]
    fn marker_scan_finds_marked_lines() {
        let pen = Pen::default();
        let mut grid = Grid::new(PageSize::new(3, 4), MaxHistoryLineCount::Finite(5));
        grid.line_at_mut(0).flags.insert(LineFlags::MARKED);
        grid.scroll_up(1, Margins::full(grid.page_size()), &pen);
        assert_eq!(grid.find_marker_upwards(1), Some(-1));
        assert_eq!(grid.find_marker_downwards(-1), None);
    }
}
