//! Grid-coordinate selections: linear, word-wise, full-line and
//! rectangular, with text extraction and scroll tracking.

use crate::grid::{CellLocation, Grid, LineFlags, LineOffset};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionKind {
    Linear,
    WordWise,
    FullLine,
    Rectangular,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionState {
    Waiting,
    InProgress,
    Complete,
}

/// Delimiters used to snap word-wise selection endpoints.
pub const DEFAULT_WORD_DELIMITERS: &str = " \t\"'`()[]{}<>,;:|";

#[derive(Debug, Clone)]
pub struct Selection {
    pub kind: SelectionKind,
    pub state: SelectionState,
    /// The initial press position; endpoints derive from it on extend.
    anchor: CellLocation,
    from: CellLocation,
    to: CellLocation,
    word_delimiters: String,
}

impl Selection {
    pub fn new(kind: SelectionKind, anchor: CellLocation) -> Self {
        Self {
            kind,
            state: SelectionState::Waiting,
            anchor,
            from: anchor,
            to: anchor,
            word_delimiters: DEFAULT_WORD_DELIMITERS.to_string(),
        }
    }

    pub fn with_word_delimiters(mut self, delimiters: &str) -> Self {
        self.word_delimiters = delimiters.to_string();
        self
    }

    pub fn from(&self) -> CellLocation {
        self.from
    }

    pub fn to(&self) -> CellLocation {
        self.to
    }

    /// Extend toward `p`, recomputing both endpoints from the anchor.
    pub fn extend(&mut self, grid: &Grid, p: CellLocation) {
        self.state = SelectionState::InProgress;
        let (mut a, mut b) = if p < self.anchor {
            (p, self.anchor)
        } else {
            (self.anchor, p)
        };
        match self.kind {
            SelectionKind::Linear => {}
            SelectionKind::WordWise => {
                a = snap_left(grid, a, &self.word_delimiters);
                b = snap_right(grid, b, &self.word_delimiters);
            }
            SelectionKind::FullLine => {
                a.column = 0;
                b.column = grid.page_size().columns.saturating_sub(1) as i32;
            }
            SelectionKind::Rectangular => {
                // Corners stay as given; ranges normalise on use.
            }
        }
        self.from = a;
        self.to = b;
    }

    pub fn complete(&mut self) {
        if self.state == SelectionState::InProgress {
            self.state = SelectionState::Complete;
        }
    }

    fn column_range(&self) -> (i32, i32) {
        if self.from.column <= self.to.column {
            (self.from.column, self.to.column)
        } else {
            (self.to.column, self.from.column)
        }
    }

    /// True when the cell at `loc` is inside the selection.
    pub fn contains(&self, loc: CellLocation) -> bool {
        if self.state == SelectionState::Waiting {
            return false;
        }
        let (from, to) = (self.from, self.to);
        match self.kind {
            SelectionKind::Linear | SelectionKind::WordWise => {
                if loc.line < from.line || loc.line > to.line {
                    false
                } else if from.line == to.line {
                    (from.column..=to.column).contains(&loc.column)
                } else if loc.line == from.line {
                    loc.column >= from.column
                } else if loc.line == to.line {
                    loc.column <= to.column
                } else {
                    true
                }
            }
            SelectionKind::FullLine => (from.line..=to.line).contains(&loc.line),
            SelectionKind::Rectangular => {
                let (left, right) = self.column_range();
                (from.line..=to.line).contains(&loc.line)
                    && (left..=right).contains(&loc.column)
            }
        }
    }

    /// Shift with the grid as it scrolls by `n` lines. Returns false (and
    /// should be cleared) once an endpoint leaves the retained range.
    pub fn apply_scroll(&mut self, n: i32, history_limit: usize, page_lines: u16) -> bool {
        self.anchor.line -= n;
        self.from.line -= n;
        self.to.line -= n;
        let lowest = -(history_limit.min(i32::MAX as usize) as i32);
        let highest = page_lines as i32;
        for endpoint in [self.from, self.to] {
            if endpoint.line < lowest || endpoint.line >= highest {
                return false;
            }
        }
        true
    }

    /// Extract the selected text. Line boundaries become `\n` unless the
    /// next line is a wrapping continuation and the selection covers the
    /// previous line's right edge. Trailing whitespace is stripped per
    /// emitted line; FullLine ends with a trailing newline.
    pub fn extract_text(&self, grid: &Grid) -> String {
        if self.state == SelectionState::Waiting {
            return String::new();
        }
        let columns = grid.page_size().columns as i32;
        let (from, to) = (self.from, self.to);

        let mut out = String::new();
        let mut pending = String::new();
        for line in from.line..=to.line {
            if !grid.contains_line(line) {
                continue;
            }
            let (start, end) = match self.kind {
                SelectionKind::FullLine => (0, columns - 1),
                SelectionKind::Rectangular => self.column_range(),
                SelectionKind::Linear | SelectionKind::WordWise => {
                    let start = if line == from.line { from.column } else { 0 };
                    let end = if line == to.line { to.column } else { columns - 1 };
                    (start, end)
                }
            };
            let row = grid.line_at(line);
            for col in start.max(0)..=end.min(columns - 1) {
                let cell = &row.cells[col as usize];
                if cell.is_wide_spacer() {
                    continue;
                }
                cell.append_text(&mut pending);
            }

            let joins_next = line < to.line
                && self.kind != SelectionKind::Rectangular
                && end >= columns - 1
                && grid.contains_line(line + 1)
                && grid
                    .line_at(line + 1)
                    .flags
                    .contains(LineFlags::WRAPPED);
            if line == to.line {
                pending.truncate(pending.trim_end().len());
                out.push_str(&pending);
                pending.clear();
            } else if !joins_next {
                pending.truncate(pending.trim_end().len());
                out.push_str(&pending);
                out.push('\n');
                pending.clear();
            }
        }
        if self.kind == SelectionKind::FullLine {
            out.push('\n');
        }
        out
    }
}

fn is_word_char(grid: &Grid, line: LineOffset, column: i32, delimiters: &str) -> bool {
    if !grid.contains_line(line) || column < 0 {
        return false;
    }
    let row = grid.line_at(line);
    match row.cells.get(column as usize) {
        Some(cell) => !delimiters.contains(cell.base_char()),
        None => false,
    }
}

fn snap_left(grid: &Grid, mut loc: CellLocation, delimiters: &str) -> CellLocation {
    if !is_word_char(grid, loc.line, loc.column, delimiters) {
        return loc;
    }
    while loc.column > 0 && is_word_char(grid, loc.line, loc.column - 1, delimiters) {
        loc.column -= 1;
    }
    loc
}

fn snap_right(grid: &Grid, mut loc: CellLocation, delimiters: &str) -> CellLocation {
    if !is_word_char(grid, loc.line, loc.column, delimiters) {
        return loc;
    }
    let columns = grid.page_size().columns as i32;
    while loc.column + 1 < columns && is_word_char(grid, loc.line, loc.column + 1, delimiters) {
        loc.column += 1;
    }
    loc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Pen;
    use crate::grid::{MaxHistoryLineCount, PageSize};

    fn grid_with(lines: &[&str]) -> Grid {
        let columns = lines.iter().map(|l| l.len()).max().unwrap_or(1) as u16;
        let mut grid = Grid::new(
            PageSize::new(lines.len() as u16, columns),
            MaxHistoryLineCount::Finite(10),
        );
        let pen = Pen::default();
        for (i, text) in lines.iter().enumerate() {
            for (j, ch) in text.chars().enumerate() {
                let mut buf = [0u8; 4];
                grid.at_mut(i as i32, j as i32)
                    .write(ch.encode_utf8(&mut buf), &pen);
            }
        }
        grid
    }

    #[test]
    fn linear_selection_spans_reading_order() {
        let grid = grid_with(&["hello world", "second line"]);
        let mut selection = Selection::new(SelectionKind::Linear, CellLocation::new(0, 6));
        selection.extend(&grid, CellLocation::new(1, 5));
        selection.complete();
        assert_eq!(selection.state, SelectionState::Complete);
        assert!(selection.contains(CellLocation::new(0, 10)));
        assert!(selection.contains(CellLocation::new(1, 0)));
        assert!(!selection.contains(CellLocation::new(0, 2)));
        assert_eq!(selection.extract_text(&grid), "world\nsecon");
    }

    #[test]
    fn wrapped_lines_join_without_newline() {
        let mut grid = grid_with(&["abcd", "efgh"]);
        grid.line_at_mut(0).flags.insert(LineFlags::WRAPPABLE);
        grid.line_at_mut(1).flags.insert(LineFlags::WRAPPED);
        let mut selection = Selection::new(SelectionKind::Linear, CellLocation::new(0, 0));
        selection.extend(&grid, CellLocation::new(1, 3));
        assert_eq!(selection.extract_text(&grid), "abcdefgh");
    }

    #[test]
    fn partial_right_edge_still_breaks_line() {
        let mut grid = grid_with(&["abcd", "efgh"]);
        grid.line_at_mut(1).flags.insert(LineFlags::WRAPPED);
        grid.line_at_mut(0).flags.insert(LineFlags::WRAPPABLE);
        let mut selection = Selection::new(SelectionKind::Rectangular, CellLocation::new(0, 0));
        selection.extend(&grid, CellLocation::new(1, 2));
        assert_eq!(selection.extract_text(&grid), "abc\nefg");
    }

    #[test]
    fn word_wise_snaps_to_boundaries() {
        let grid = grid_with(&["foo bar-baz qux"]);
        let mut selection = Selection::new(SelectionKind::WordWise, CellLocation::new(0, 5));
        selection.extend(&grid, CellLocation::new(0, 9));
        // "bar-baz" is one word under the default delimiters.
        assert_eq!(selection.extract_text(&grid), "bar-baz");
    }

    #[test]
    fn full_line_selects_whole_lines_with_trailing_newline() {
        let grid = grid_with(&["first", "last "]);
        let mut selection = Selection::new(SelectionKind::FullLine, CellLocation::new(0, 3));
        selection.extend(&grid, CellLocation::new(1, 0));
        assert_eq!(selection.extract_text(&grid), "first\nlast\n");
    }

    #[test]
    fn rectangular_selects_column_block() {
        let grid = grid_with(&["abcdef", "ghijkl", "mnopqr"]);
        let mut selection = Selection::new(SelectionKind::Rectangular, CellLocation::new(0, 4));
        selection.extend(&grid, CellLocation::new(2, 1));
        assert!(selection.contains(CellLocation::new(1, 2)));
        assert!(!selection.contains(CellLocation::new(1, 5)));
        assert_eq!(selection.extract_text(&grid), "bcde\nhijk\nnopq");
    }

    #[test]
    fn scroll_shifts_then_clears_selection() {
        let grid = grid_with(&["hello", "world"]);
        let mut selection = Selection::new(SelectionKind::Linear, CellLocation::new(0, 0));
        selection.extend(&grid, CellLocation::new(0, 4));
        assert!(selection.apply_scroll(1, 3, 2));
        assert_eq!(selection.from().line, -1);
        // Falling past the history cap clears it.
        assert!(!selection.apply_scroll(3, 3, 2));
    }
}
