//! Builds a [`RenderBuffer`] from the live emulator state: palette
//! resolution, selection/search/cursor overlays, status lines. Two builds
//! without an intervening mutation produce identical buffers.

use crate::cell::{Cell, CellAttrs};
use crate::color::{ColorPalette, ColorRole, RgbColor};
use crate::cursor::CursorDisplay;
use crate::grid::CellLocation;
use crate::modes::DecMode;
use crate::screen::{Screen, StatusDisplayPosition, StatusDisplayType};
use crate::state::EmulatorState;

pub use super::frame::{
    RenderBuffer, RenderCell, RenderCursor, RenderImageFragment, RenderLine, StyledSpan,
};

/// Per-frame inputs owned by the terminal façade rather than the emulator
/// state (atomics in the concurrency model).
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOverlays<'a> {
    pub hovered_hyperlink: Option<&'a str>,
    pub cursor_blink_visible: bool,
}

pub fn build_render_buffer(
    state: &EmulatorState,
    overlays: RenderOverlays<'_>,
    into: &mut RenderBuffer,
) {
    into.clear();
    let total = state.total_size();
    into.lines_total = total.lines;
    into.columns_total = total.columns;

    let status = state.status_display();
    let position = state.settings.status_display_position;
    let main_rows = state.page_size().lines;
    let main_start: u16 = match (status, position) {
        (StatusDisplayType::None, _) => 0,
        (_, StatusDisplayPosition::Top) => 1,
        (_, StatusDisplayPosition::Bottom) => 0,
    };

    build_main_rows(state, overlays, into, main_start, main_rows);

    match (status, position) {
        (StatusDisplayType::None, _) => {}
        (kind, position) => {
            let row = match position {
                StatusDisplayPosition::Top => 0,
                StatusDisplayPosition::Bottom => main_start + main_rows,
            };
            build_status_row(state, into, kind, row);
        }
    }
}

fn build_main_rows(
    state: &EmulatorState,
    overlays: RenderOverlays<'_>,
    into: &mut RenderBuffer,
    screen_row_base: u16,
    rows: u16,
) {
    let screen = state.active_screen();
    let grid = screen.grid();
    let palette = &state.palette;
    let reverse_video = state.modes.enabled(DecMode::ReverseVideo);
    let top = state.viewport.top_line();

    let cursor = screen.cursor.position;
    let cursor_visible = state.modes.enabled(DecMode::VisibleCursor)
        && (overlays.cursor_blink_visible
            || screen.cursor.display == CursorDisplay::Steady)
        && (top..top + rows as i32).contains(&cursor.line);

    for row in 0..rows {
        let offset = top + row as i32;
        let screen_row = screen_row_base + row;
        if !grid.contains_line(offset) {
            continue;
        }
        let line = grid.line_at(offset);
        let matches = match &state.search_pattern {
            Some(pattern) if !pattern.is_empty() => search_match_columns(line.cells.as_slice(), pattern),
            _ => Vec::new(),
        };

        let mut spans: Vec<StyledSpan> = Vec::new();
        for (column, cell) in line.cells.iter().enumerate() {
            if cell.is_wide_spacer() {
                continue;
            }
            let column = column as u16;
            let location = CellLocation::new(offset, column as i32);
            let selected = state
                .selection
                .as_ref()
                .map(|s| s.contains(location))
                .unwrap_or(false);
            let (fg, bg) = resolve_colors(cell, palette, reverse_video, selected);
            let decoration_color =
                palette.resolve(cell.underline_color, ColorRole::DefaultForeground);
            let is_cursor_cell =
                cursor_visible && offset == cursor.line && column as i32 == cursor.column;
            let hyperlink = cell.hyperlink.as_ref().map(|l| l.uri.clone());
            let hovered = match (&hyperlink, overlays.hovered_hyperlink) {
                (Some(uri), Some(hover)) => uri == hover,
                _ => false,
            };

            into.cells.push(RenderCell {
                line: screen_row,
                column,
                text: cell.text(),
                width: cell.width(),
                fg,
                bg,
                decoration_color,
                attrs: cell.attrs.bits(),
                underline: cell.underline,
                cursor: is_cursor_cell,
                selected,
                search_match: matches.contains(&column),
                hyperlink: hyperlink.clone(),
                hyperlink_hover: hovered,
                image: cell.image.as_ref().map(|fragment| RenderImageFragment {
                    image_id: fragment.rasterized.image.id,
                    line: fragment.line,
                    column: fragment.column,
                }),
                preedit: if is_cursor_cell {
                    state.preedit.clone()
                } else {
                    None
                },
            });

            push_span_cell(&mut spans, cell, column, fg, bg, hyperlink);
        }
        into.lines.push(RenderLine {
            line: screen_row,
            spans,
        });
    }

    if cursor_visible {
        into.cursor = Some(RenderCursor {
            line: screen_row_base + (cursor.line - top) as u16,
            column: cursor.column.max(0) as u16,
            shape: screen.cursor.shape,
            blink: screen.cursor.display == CursorDisplay::Blink,
        });
    }
}

fn build_status_row(
    state: &EmulatorState,
    into: &mut RenderBuffer,
    kind: StatusDisplayType,
    screen_row: u16,
) {
    let palette = &state.palette;
    match kind {
        StatusDisplayType::None => {}
        StatusDisplayType::Indicator => {
            // The indicator line renders inverted against the defaults.
            let fg = palette.role(ColorRole::DefaultBackground);
            let bg = palette.role(ColorRole::DefaultForeground);
            let text = state.indicator_line();
            let columns = state.total_size().columns as usize;
            let mut spans = Vec::new();
            let mut chars: Vec<char> = text.chars().collect();
            chars.truncate(columns);
            for (column, c) in chars.iter().enumerate() {
                into.cells.push(RenderCell {
                    line: screen_row,
                    column: column as u16,
                    text: c.to_string(),
                    width: 1,
                    fg,
                    bg,
                    decoration_color: fg,
                    attrs: CellAttrs::empty().bits(),
                    underline: Default::default(),
                    cursor: false,
                    selected: false,
                    search_match: false,
                    hyperlink: None,
                    hyperlink_hover: false,
                    image: None,
                    preedit: None,
                });
            }
            spans.push(StyledSpan {
                column: 0,
                text: chars.into_iter().collect(),
                fg,
                bg,
                attrs: CellAttrs::empty().bits(),
                underline: Default::default(),
                hyperlink: None,
            });
            into.lines.push(RenderLine {
                line: screen_row,
                spans,
            });
        }
        StatusDisplayType::HostWritable => {
            build_host_status_row(state, &state.host_writable_status, into, screen_row);
        }
    }
}

fn build_host_status_row(
    state: &EmulatorState,
    status: &Screen,
    into: &mut RenderBuffer,
    screen_row: u16,
) {
    let palette = &state.palette;
    let line = status.grid().line_at(0);
    let mut spans: Vec<StyledSpan> = Vec::new();
    for (column, cell) in line.cells.iter().enumerate() {
        if cell.is_wide_spacer() {
            continue;
        }
        let column = column as u16;
        let (fg, bg) = resolve_colors(cell, palette, false, false);
        into.cells.push(RenderCell {
            line: screen_row,
            column,
            text: cell.text(),
            width: cell.width(),
            fg,
            bg,
            decoration_color: palette.resolve(cell.underline_color, ColorRole::DefaultForeground),
            attrs: cell.attrs.bits(),
            underline: cell.underline,
            cursor: false,
            selected: false,
            search_match: false,
            hyperlink: None,
            hyperlink_hover: false,
            image: None,
            preedit: None,
        });
        push_span_cell(&mut spans, cell, column, fg, bg, None);
    }
    into.lines.push(RenderLine {
        line: screen_row,
        spans,
    });
}

fn resolve_colors(
    cell: &Cell,
    palette: &ColorPalette,
    reverse_video: bool,
    selected: bool,
) -> (RgbColor, RgbColor) {
    if selected {
        return (
            palette.role(ColorRole::HighlightForeground),
            palette.role(ColorRole::HighlightBackground),
        );
    }
    let mut fg = palette.resolve(cell.fg, ColorRole::DefaultForeground);
    let mut bg = palette.resolve(cell.bg, ColorRole::DefaultBackground);
    if reverse_video != cell.attrs.contains(CellAttrs::INVERSE) {
        std::mem::swap(&mut fg, &mut bg);
    }
    (fg, bg)
}

fn push_span_cell(
    spans: &mut Vec<StyledSpan>,
    cell: &Cell,
    column: u16,
    fg: RgbColor,
    bg: RgbColor,
    hyperlink: Option<String>,
) {
    let splittable = match spans.last() {
        Some(span) => {
            span.fg != fg
                || span.bg != bg
                || span.attrs != cell.attrs.bits()
                || span.underline != cell.underline
                || span.hyperlink != hyperlink
                || span.column as usize + span.text.chars().count() != column as usize
        }
        None => true,
    };
    if splittable {
        spans.push(StyledSpan {
            column,
            text: cell.text(),
            fg,
            bg,
            attrs: cell.attrs.bits(),
            underline: cell.underline,
            hyperlink,
        });
    } else if let Some(span) = spans.last_mut() {
        cell.append_text(&mut span.text);
    }
}

/// Columns where a fresh match of `pattern` begins, comparing base
/// characters only.
fn search_match_columns(cells: &[Cell], pattern: &str) -> Vec<u16> {
    let pattern: Vec<char> = pattern.chars().collect();
    if pattern.is_empty() {
        return Vec::new();
    }
    let row: Vec<(u16, char)> = cells
        .iter()
        .enumerate()
        .filter(|(_, c)| !c.is_wide_spacer())
        .map(|(i, c)| (i as u16, c.base_char()))
        .collect();
    let mut matches = Vec::new();
    if row.len() < pattern.len() {
        return matches;
    }
    for start in 0..=(row.len() - pattern.len()) {
        if (0..pattern.len()).all(|k| row[start + k].1 == pattern[k]) {
            matches.push(row[start].0);
        }
    }
    matches
}
