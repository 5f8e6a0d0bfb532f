//! The synchronous emulator state: screens, modes, palette, viewport,
//! selection, images and hyperlinks, plus the reply and event queues the
//! terminal façade drains after each parse. All mutation happens under the
//! terminal mutex; host callbacks never fire from in here.

use std::sync::Arc;

use crate::cell::Cell;
use crate::color::{ColorPalette, PaletteStack};
use crate::cursor::{CursorDisplay, CursorShape};
use crate::functions::VtType;
use crate::grid::{CellLocation, MaxHistoryLineCount, PageSize};
use crate::hyperlink::HyperlinkRegistry;
use crate::image::{ImageFragment, ImagePool, SixelRasterizer};
use crate::modes::{AnsiMode, DecMode, ModeStore};
use crate::screen::{
    ActiveStatusDisplay, Screen, ScreenType, StatusDisplayPosition, StatusDisplayType,
};
use crate::selection::Selection;
use crate::viewport::Viewport;

/// Cursor placement after a non-scrolling Sixel image: DEC leaves the
/// cursor at the image's right edge, xterm homes the row below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SixelCursorConformance {
    #[default]
    Dec,
    Xterm,
}

/// Construction-time knobs; everything else is a mode or a host call.
#[derive(Debug, Clone)]
pub struct EmulatorSettings {
    pub page_size: PageSize,
    pub max_history: MaxHistoryLineCount,
    pub terminal_id: VtType,
    pub term_name: String,
    pub version: (u16, u16, u16),
    pub sixel_cursor_conformance: SixelCursorConformance,
    pub allow_clipboard_read: bool,
    /// Pixel size of one cell, used for Sixel slicing and pixel reports.
    pub cell_pixels: (u16, u16),
    pub max_image_size: (u32, u32),
    pub status_display_position: StatusDisplayPosition,
}

impl Default for EmulatorSettings {
    fn default() -> Self {
        Self {
            page_size: PageSize::new(24, 80),
            max_history: MaxHistoryLineCount::Finite(10_000),
            terminal_id: VtType::VT525,
            term_name: "xterm-256color".to_string(),
            version: (0, 1, 0),
            sixel_cursor_conformance: SixelCursorConformance::default(),
            allow_clipboard_read: false,
            cell_pixels: (8, 16),
            max_image_size: (4096, 4096),
            status_display_position: StatusDisplayPosition::default(),
        }
    }
}

/// Host-facing happenings queued under the lock and delivered afterwards.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingEvent {
    Bell,
    WindowTitleChanged(String),
    TabNameChanged(String),
    CopyToClipboard(String),
    Notify { title: String, body: String },
    RequestResizeCells(PageSize),
    RequestResizePixels { width: u16, height: u16 },
    RequestCaptureBuffer { lines: u16, logical: bool },
    BufferChanged(ScreenType),
    SetTerminalProfile(String),
    ScrollOffsetChanged(usize),
    CursorPositionChanged,
    Inspect,
}

pub struct EmulatorState {
    pub(crate) primary: Screen,
    pub(crate) alternate: Screen,
    pub(crate) active_screen: ScreenType,
    pub(crate) host_writable_status: Screen,
    pub(crate) status_display: StatusDisplayType,
    pub(crate) active_display: ActiveStatusDisplay,
    pub(crate) modes: ModeStore,
    pub(crate) palette: ColorPalette,
    pub(crate) palette_stack: PaletteStack,
    pub(crate) viewport: Viewport,
    pub(crate) selection: Option<Selection>,
    pub(crate) hyperlinks: HyperlinkRegistry,
    pub(crate) images: Arc<ImagePool>,
    pub(crate) sixel_rasterizer: Option<Arc<dyn SixelRasterizer>>,
    pub(crate) settings: EmulatorSettings,
    pub(crate) window_title: String,
    pub(crate) title_stack: Vec<String>,
    pub(crate) search_pattern: Option<String>,
    pub(crate) preedit: Option<String>,
    pub(crate) replies: Vec<u8>,
    pub(crate) events: Vec<PendingEvent>,
    /// Conformance change to propagate into the sequence builder.
    pub(crate) pending_conformance: Option<VtType>,
    /// Application keypad mode (DECKPAM/DECKPNM), read by the input
    /// generator.
    pub(crate) application_keypad: bool,
    /// Screen content changed since the last render snapshot.
    pub(crate) dirty: bool,
    /// The full window size, including any visible status line.
    total_size: PageSize,
}

impl EmulatorState {
    pub fn new(settings: EmulatorSettings, sixel: Option<Arc<dyn SixelRasterizer>>) -> Self {
        let page = settings.page_size;
        let (max_w, max_h) = settings.max_image_size;
        Self {
            primary: Screen::new(ScreenType::Primary, page, settings.max_history),
            alternate: Screen::new(ScreenType::Alternate, page, MaxHistoryLineCount::Finite(0)),
            active_screen: ScreenType::Primary,
            host_writable_status: Screen::new(
                ScreenType::Status,
                PageSize::new(1, page.columns),
                MaxHistoryLineCount::Finite(0),
            ),
            status_display: StatusDisplayType::None,
            active_display: ActiveStatusDisplay::Main,
            modes: ModeStore::with_defaults(),
            palette: ColorPalette::default(),
            palette_stack: PaletteStack::default(),
            viewport: Viewport::default(),
            selection: None,
            hyperlinks: HyperlinkRegistry::default(),
            images: Arc::new(ImagePool::new(max_w, max_h)),
            sixel_rasterizer: sixel,
            settings,
            window_title: String::new(),
            title_stack: Vec::new(),
            search_pattern: None,
            preedit: None,
            replies: Vec::new(),
            events: Vec::new(),
            pending_conformance: None,
            application_keypad: false,
            dirty: true,
            total_size: page,
        }
    }

    /// The screen VT output currently addresses: the status line when the
    /// application selected it via DECSASD, otherwise the active buffer.
    pub(crate) fn target_screen_mut(&mut self) -> &mut Screen {
        if self.active_display == ActiveStatusDisplay::StatusLine
            && self.status_display == StatusDisplayType::HostWritable
        {
            &mut self.host_writable_status
        } else {
            self.active_screen_mut()
        }
    }

    pub fn active_screen(&self) -> &Screen {
        match self.active_screen {
            ScreenType::Alternate => &self.alternate,
            _ => &self.primary,
        }
    }

    pub(crate) fn active_screen_mut(&mut self) -> &mut Screen {
        match self.active_screen {
            ScreenType::Alternate => &mut self.alternate,
            _ => &mut self.primary,
        }
    }

    pub fn screen_type(&self) -> ScreenType {
        self.active_screen
    }

    pub fn page_size(&self) -> PageSize {
        self.active_screen().page_size()
    }

    pub fn window_title(&self) -> &str {
        &self.window_title
    }

    pub fn terminal_id(&self) -> VtType {
        self.settings.terminal_id
    }

    pub fn set_terminal_id(&mut self, id: VtType) {
        self.settings.terminal_id = id;
        self.pending_conformance = Some(id);
    }

    pub(crate) fn reply(&mut self, bytes: impl AsRef<[u8]>) {
        self.replies.extend_from_slice(bytes.as_ref());
    }

    pub(crate) fn emit(&mut self, event: PendingEvent) {
        self.events.push(event);
    }

    pub fn take_replies(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.replies)
    }

    pub fn take_events(&mut self) -> Vec<PendingEvent> {
        std::mem::take(&mut self.events)
    }

    /// Propagate a full-page scroll into history to the viewport and
    /// selection so both stay anchored to their content (or clear).
    pub(crate) fn on_history_push(&mut self, pushed: usize) {
        if pushed == 0 {
            return;
        }
        let history = self.active_screen().grid().history_line_count();
        if !self.viewport.is_at_bottom() {
            self.viewport.scroll_up(pushed, history);
            let offset = self.viewport.scroll_offset();
            self.emit(PendingEvent::ScrollOffsetChanged(offset));
        }
        let history_limit = match self.active_screen().grid().max_history() {
            MaxHistoryLineCount::Finite(n) => n,
            MaxHistoryLineCount::Infinite => usize::MAX,
        };
        let page_lines = self.page_size().lines;
        let retained = match &mut self.selection {
            Some(selection) => selection.apply_scroll(pushed as i32, history_limit, page_lines),
            None => true,
        };
        if !retained {
            self.selection = None;
        }
    }

    /// Switch buffers (DECSET 47/1047/1049 family).
    pub(crate) fn switch_to_alternate(&mut self) {
        if self.active_screen != ScreenType::Alternate {
            self.active_screen = ScreenType::Alternate;
            self.selection = None;
            self.viewport.scroll_to_bottom();
            self.emit(PendingEvent::BufferChanged(ScreenType::Alternate));
            self.dirty = true;
        }
    }

    pub(crate) fn switch_to_primary(&mut self) {
        if self.active_screen != ScreenType::Primary {
            self.active_screen = ScreenType::Primary;
            self.selection = None;
            self.emit(PendingEvent::BufferChanged(ScreenType::Primary));
            self.dirty = true;
        }
    }

    /// Resize the whole terminal to `total` cells; the main screens get
    /// whatever the status line leaves over.
    pub fn resize(&mut self, total: PageSize) {
        self.total_size = total;
        let main = self.main_page_size();
        let reflow = self.modes.enabled(DecMode::TextReflow);
        self.primary.resize(main, reflow);
        self.alternate.resize(main, false);
        self.host_writable_status
            .resize(PageSize::new(1, total.columns), false);
        self.selection = None;
        let history = self.primary.grid().history_line_count();
        if self.viewport.clamp(history) {
            let offset = self.viewport.scroll_offset();
            self.emit(PendingEvent::ScrollOffsetChanged(offset));
        }
        self.dirty = true;
    }

    pub fn total_size(&self) -> PageSize {
        self.total_size
    }

    fn main_page_size(&self) -> PageSize {
        let status_lines = if self.status_display == StatusDisplayType::None {
            0
        } else {
            1
        };
        PageSize::new(
            self.total_size.lines.saturating_sub(status_lines).max(1),
            self.total_size.columns,
        )
    }

    /// DECSSDT: switching status-line visibility resizes the main display.
    pub(crate) fn set_status_display(&mut self, display: StatusDisplayType) {
        if self.status_display == display {
            return;
        }
        self.status_display = display;
        if display != StatusDisplayType::HostWritable {
            self.active_display = ActiveStatusDisplay::Main;
        }
        let main = self.main_page_size();
        let reflow = self.modes.enabled(DecMode::TextReflow);
        self.primary.resize(main, reflow);
        self.alternate.resize(main, false);
        self.dirty = true;
    }

    pub fn status_display(&self) -> StatusDisplayType {
        self.status_display
    }

    /// Content of the system-generated indicator status line.
    pub(crate) fn indicator_line(&self) -> String {
        let screen = self.active_screen();
        let position = screen.cursor.position;
        let mut text = format!(
            "{} | {},{}",
            self.settings.term_name,
            position.line + 1,
            position.column + 1
        );
        if self.modes.ansi_enabled(AnsiMode::Insert) {
            text.push_str(" | INS");
        }
        if self.active_screen == ScreenType::Alternate {
            text.push_str(" | ALT");
        }
        if !self.viewport.is_at_bottom() {
            text.push_str(&format!(" | +{}", self.viewport.scroll_offset()));
        }
        if let Some(pattern) = &self.search_pattern {
            text.push_str(&format!(" | /{pattern}"));
        }
        text
    }

    pub fn set_max_history(&mut self, max: MaxHistoryLineCount) {
        self.settings.max_history = max;
        self.primary.grid_mut().set_max_history(max);
        let history = self.primary.grid().history_line_count();
        self.viewport.clamp(history);
        self.dirty = true;
    }

    /// RIS: full state reset, keeping the window size and host settings.
    pub(crate) fn hard_reset(&mut self) {
        let total = self.total_size;
        let was_alternate = self.active_screen == ScreenType::Alternate;
        self.status_display = StatusDisplayType::None;
        self.active_display = ActiveStatusDisplay::Main;
        let main = self.main_page_size();
        self.primary = Screen::new(ScreenType::Primary, main, self.settings.max_history);
        self.alternate = Screen::new(ScreenType::Alternate, main, MaxHistoryLineCount::Finite(0));
        self.host_writable_status = Screen::new(
            ScreenType::Status,
            PageSize::new(1, total.columns),
            MaxHistoryLineCount::Finite(0),
        );
        self.active_screen = ScreenType::Primary;
        self.modes = ModeStore::with_defaults();
        self.palette = ColorPalette::default();
        self.palette_stack = PaletteStack::default();
        self.viewport = Viewport::default();
        self.selection = None;
        self.hyperlinks = HyperlinkRegistry::default();
        self.application_keypad = false;
        self.preedit = None;
        if was_alternate {
            self.emit(PendingEvent::BufferChanged(ScreenType::Primary));
        }
        self.dirty = true;
    }

    /// DECSTR: the soft subset. Cursor-affecting modes reset; content and
    /// title survive.
    pub(crate) fn soft_reset(&mut self) {
        self.modes.set(DecMode::Origin, false);
        self.modes.set(DecMode::UseApplicationCursorKeys, false);
        self.modes.set(DecMode::AutoWrap, false);
        self.modes.set(DecMode::VisibleCursor, true);
        self.modes.set(DecMode::LeftRightMargin, false);
        self.modes.set_ansi(AnsiMode::Insert, false);
        self.modes.set_ansi(AnsiMode::KeyboardAction, false);
        self.active_screen_mut().soft_reset();
        self.dirty = true;
    }

    /// Place a rasterized Sixel image at the cursor per the scrolling mode
    /// and conformance setting.
    pub(crate) fn place_image(&mut self, rasterized: Arc<crate::image::RasterizedImage>) {
        let scrolling = self.modes.enabled(DecMode::SixelScrolling);
        let lr_margins = self.modes.enabled(DecMode::LeftRightMargin);
        let conformance = self.settings.sixel_cursor_conformance;
        let screen = self.active_screen_mut();
        let page = screen.page_size();
        let image_lines = rasterized.lines;
        let image_columns = rasterized.columns;

        let start_column = if scrolling {
            screen.cursor.position.column.max(0) as u16
        } else {
            0
        };
        let mut pushed = 0usize;
        if scrolling {
            for image_line in 0..image_lines {
                let row = screen.cursor.position.line.max(0) as u16;
                place_image_row(screen, &rasterized, image_line, row, start_column);
                if image_line + 1 < image_lines {
                    pushed += screen.linefeed(lr_margins);
                }
            }
            // Row after the image, back at the starting column.
            pushed += screen.linefeed(lr_margins);
            screen.cursor.position.column = start_column as i32;
        } else {
            for image_line in 0..image_lines.min(page.lines) {
                place_image_row(screen, &rasterized, image_line, image_line, 0);
            }
            match conformance {
                SixelCursorConformance::Dec => {
                    let edge = image_columns.min(page.columns.saturating_sub(1));
                    screen.cursor.position.column = edge as i32;
                }
                SixelCursorConformance::Xterm => {
                    let below = image_lines.min(page.lines.saturating_sub(1));
                    screen.cursor.position = CellLocation::new(below as i32, 0);
                }
            }
        }
        self.on_history_push(pushed);
        self.dirty = true;
    }

    /// Drop images whose cells are all gone; called opportunistically after
    /// mutations.
    pub fn collect_images(&mut self) {
        self.images.collect_unreferenced();
    }

    pub fn image_pool(&self) -> Arc<ImagePool> {
        Arc::clone(&self.images)
    }

    pub fn cursor_shape(&self) -> CursorShape {
        self.active_screen().cursor.shape
    }

    pub fn cursor_display(&self) -> CursorDisplay {
        self.active_screen().cursor.display
    }
}

fn place_image_row(
    screen: &mut Screen,
    rasterized: &Arc<crate::image::RasterizedImage>,
    image_line: u16,
    row: u16,
    start_column: u16,
) {
    let page = screen.page_size();
    let pen = screen.cursor.pen.clone();
    for image_column in 0..rasterized.columns {
        let column = start_column + image_column;
        if column >= page.columns || row >= page.lines {
            continue;
        }
        let cell = screen.grid_mut().at_mut(row as i32, column as i32);
        *cell = Cell::blank(&pen);
        cell.image = Some(ImageFragment {
            rasterized: Arc::clone(rasterized),
            line: image_line,
            column: image_column,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> EmulatorState {
        EmulatorState::new(EmulatorSettings::default(), None)
    }

    #[test]
    fn status_line_visibility_resizes_main_display() {
        let mut state = state();
        assert_eq!(state.page_size(), PageSize::new(24, 80));
        state.set_status_display(StatusDisplayType::Indicator);
        assert_eq!(state.page_size(), PageSize::new(23, 80));
        state.set_status_display(StatusDisplayType::None);
        assert_eq!(state.page_size(), PageSize::new(24, 80));
    }

    #[test]
    fn alternate_switch_emits_buffer_changed() {
        let mut state = state();
        state.switch_to_alternate();
        assert_eq!(state.screen_type(), ScreenType::Alternate);
        let events = state.take_events();
        assert!(events.contains(&PendingEvent::BufferChanged(ScreenType::Alternate)));
        // Switching again is a no-op.
        state.switch_to_alternate();
        assert!(state.take_events().is_empty());
    }

    #[test]
    fn history_push_keeps_scrolled_viewport_stable() {
        let mut state = state();
        // Create some history.
        for _ in 0..5 {
            let pushed = {
                let screen = state.active_screen_mut();
                screen.move_to(23, 0, false);
                screen.linefeed(false)
            };
            state.on_history_push(pushed);
        }
        state.viewport.scroll_up(3, 5);
        let pushed = {
            let screen = state.active_screen_mut();
            screen.move_to(23, 0, false);
            screen.linefeed(false)
        };
        state.on_history_push(pushed);
        assert_eq!(state.viewport.scroll_offset(), 4);
    }

    #[test]
    fn hard_reset_returns_to_primary_defaults() {
        let mut state = state();
        state.switch_to_alternate();
        state.modes.set(DecMode::Origin, true);
        state.hard_reset();
        assert_eq!(state.screen_type(), ScreenType::Primary);
        assert!(!state.modes.enabled(DecMode::Origin));
        assert!(state.modes.enabled(DecMode::AutoWrap));
    }
}
