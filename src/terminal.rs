//! The terminal façade: owns the emulator state, parser, input generator
//! and render buffers, runs the PTY reader thread, and exposes the host
//! API. All screen mutation happens under one mutex; host callbacks and
//! PTY writes happen after it is released.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::buffer::BufferPool;
use crate::events::Events;
use crate::functions::{Function, VtType};
use crate::grid::{CellLocation, MaxHistoryLineCount, PageSize};
use crate::image::SixelRasterizer;
use crate::input::{InputGenerator, Key, KeyEventKind, Modifiers, MouseButton, MousePosition};
use crate::modes::DecMode;
use crate::parser::Parser;
use crate::pty::{PixelSize, Pty};
use crate::render::{
    build_render_buffer, RenderBufferRef, RenderDoubleBuffer, RenderOverlays,
};
use crate::selection::{Selection, SelectionKind, SelectionState};
use crate::sequence::{Sequence, SequenceBuilder, SequenceHandler};
use crate::state::{EmulatorSettings, EmulatorState, PendingEvent};

/// How the reader loop treats parsed VT input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    #[default]
    Normal,
    /// Queue parsed sequences without mutating the screen.
    Waiting,
    /// Apply one queued action per resume, then wait again.
    SingleStep,
    /// Run until the pending queue is empty, then wait.
    BreakAtEmptyQueue,
}

/// A parsed action captured while execution is suspended.
#[derive(Debug, Clone)]
enum QueuedAction {
    Text(String),
    Control(u8),
    Sequence(Function, Sequence),
}

#[derive(Debug, Default)]
struct TraceHandler {
    queue: std::collections::VecDeque<QueuedAction>,
}

struct Inner {
    state: EmulatorState,
    builder: SequenceBuilder,
    parser: Parser,
    input: InputGenerator,
    trace: TraceHandler,
}

/// Routes parsed events either into the emulator state or the trace queue
/// depending on the execution mode.
struct Executor<'a> {
    state: &'a mut EmulatorState,
    trace: &'a mut TraceHandler,
    live: bool,
}

impl SequenceHandler for Executor<'_> {
    fn write_text(&mut self, text: &str) {
        if self.live {
            self.state.write_text(text);
        } else {
            self.trace.queue.push_back(QueuedAction::Text(text.to_string()));
        }
    }

    fn execute_control(&mut self, control: u8) {
        if self.live {
            self.state.execute_control(control);
        } else {
            self.trace.queue.push_back(QueuedAction::Control(control));
        }
    }

    fn handle(&mut self, function: Function, seq: &Sequence) {
        if self.live {
            self.state.handle(function, seq);
        } else {
            self.trace
                .queue
                .push_back(QueuedAction::Sequence(function, seq.clone()));
        }
    }
}

impl Inner {
    fn parse(&mut self, bytes: &[u8], live: bool) {
        let mut executor = Executor {
            state: &mut self.state,
            trace: &mut self.trace,
            live,
        };
        let mut bound = self.builder.bind(&mut executor);
        self.parser.advance(&mut bound, bytes);
        bound.finish();
        if let Some(level) = self.state.pending_conformance.take() {
            self.builder.set_conformance(level);
        }
        let columns = self.state.page_size().columns;
        self.builder.set_max_bulk_text_width(columns.max(16) as usize);
    }

    /// Apply one queued action. Returns false when the queue is empty.
    fn apply_one_queued(&mut self) -> bool {
        let Some(action) = self.trace.queue.pop_front() else {
            return false;
        };
        match action {
            QueuedAction::Text(text) => self.state.write_text(&text),
            QueuedAction::Control(control) => self.state.execute_control(control),
            QueuedAction::Sequence(function, seq) => self.state.handle(function, &seq),
        }
        true
    }
}

struct Shared {
    inner: Mutex<Inner>,
    pty: Arc<dyn Pty>,
    events: Arc<dyn Events>,
    render: RenderDoubleBuffer,
    pool: BufferPool,
    running: AtomicBool,
    execution_mode: Mutex<ExecutionMode>,
    execution_changed: Condvar,
    refresh_interval_nanos: AtomicU64,
    hovered_hyperlink: Mutex<Option<String>>,
    cursor_blink_visible: AtomicBool,
    last_blink_toggle: Mutex<Instant>,
    /// Set while DEC mode 2026 suppresses refreshes; expires after 4s.
    synchronized_since: Mutex<Option<Instant>>,
    was_batching: AtomicBool,
}

/// Upper bound on a synchronized-output (mode 2026) pause.
const SYNCHRONIZED_OUTPUT_CAP: Duration = Duration::from_secs(4);
const CURSOR_BLINK_INTERVAL: Duration = Duration::from_millis(500);

pub struct Terminal {
    shared: Arc<Shared>,
    reader: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl Terminal {
    pub fn new(
        pty: Arc<dyn Pty>,
        events: Arc<dyn Events>,
        settings: EmulatorSettings,
        sixel: Option<Arc<dyn SixelRasterizer>>,
    ) -> Self {
        let state = EmulatorState::new(settings, sixel);
        let builder = SequenceBuilder::new(state.terminal_id());
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                state,
                builder,
                parser: Parser::new(),
                input: InputGenerator::new(),
                trace: TraceHandler::default(),
            }),
            pty,
            events,
            render: RenderDoubleBuffer::default(),
            pool: BufferPool::new(4, 16 * 1024),
            running: AtomicBool::new(true),
            execution_mode: Mutex::new(ExecutionMode::Normal),
            execution_changed: Condvar::new(),
            refresh_interval_nanos: AtomicU64::new(
                Duration::from_secs_f64(1.0 / 60.0).as_nanos() as u64
            ),
            hovered_hyperlink: Mutex::new(None),
            cursor_blink_visible: AtomicBool::new(true),
            last_blink_toggle: Mutex::new(Instant::now()),
            synchronized_since: Mutex::new(None),
            was_batching: AtomicBool::new(false),
        });

        let thread_shared = Arc::clone(&shared);
        let reader = std::thread::Builder::new()
            .name("terminal-reader".to_string())
            .spawn(move || reader_loop(thread_shared))
            .expect("spawn terminal reader thread");

        Self {
            shared,
            reader: Mutex::new(Some(reader)),
        }
    }

    fn refresh_interval(&self) -> Duration {
        Duration::from_nanos(self.shared.refresh_interval_nanos.load(Ordering::Acquire))
    }

    /// Parse bytes as if they had arrived from the PTY. Callable from host
    /// threads.
    pub fn write_to_screen(&self, bytes: &[u8]) {
        process_bytes(&self.shared, bytes);
    }

    /// Current page size of the active screen.
    pub fn page_size(&self) -> PageSize {
        self.shared.inner.lock().state.page_size()
    }

    pub fn window_title(&self) -> String {
        self.shared.inner.lock().state.window_title().to_string()
    }

    // ---- input -----------------------------------------------------------

    pub fn send_key(&self, key: Key, modifiers: Modifiers, kind: KeyEventKind) -> bool {
        let produced = {
            let mut inner = self.shared.inner.lock();
            let keypad = inner.state.application_keypad;
            let Inner { state, input, .. } = &mut *inner;
            input.key(key, modifiers, kind, &state.modes, keypad)
        };
        if produced {
            self.flush_input();
        }
        produced
    }

    pub fn send_char(&self, c: char, modifiers: Modifiers, kind: KeyEventKind) -> bool {
        let produced = {
            let mut inner = self.shared.inner.lock();
            let Inner { state, input, .. } = &mut *inner;
            input.character(c, modifiers, kind, &state.modes)
        };
        if produced {
            self.flush_input();
        }
        produced
    }

    /// Mouse press. When the application tracks the mouse the event is
    /// forwarded; otherwise wheel buttons scroll the viewport (or map to
    /// cursor keys on the alternate screen with mode 1007).
    pub fn send_mouse_press(
        &self,
        button: MouseButton,
        modifiers: Modifiers,
        position: MousePosition,
    ) -> bool {
        let mut scroll_event = None;
        let produced = {
            let mut inner = self.shared.inner.lock();
            let Inner { state, input, .. } = &mut *inner;
            if input.mouse_press(button, modifiers, position, &state.modes) {
                true
            } else {
                match button {
                    MouseButton::WheelUp | MouseButton::WheelDown => {
                        let up = button == MouseButton::WheelUp;
                        if state.screen_type() == crate::screen::ScreenType::Alternate
                            && state.modes.enabled(DecMode::MouseAlternateScroll)
                        {
                            let key = if up { Key::Up } else { Key::Down };
                            for _ in 0..3 {
                                input.key(
                                    key,
                                    Modifiers::empty(),
                                    KeyEventKind::Press,
                                    &state.modes,
                                    state.application_keypad,
                                );
                            }
                            true
                        } else {
                            let history = state.active_screen().grid().history_line_count();
                            let changed = if up {
                                state.viewport.scroll_up(3, history)
                            } else {
                                state.viewport.scroll_down(3)
                            };
                            if changed {
                                state.dirty = true;
                                scroll_event = Some(state.viewport.scroll_offset());
                            }
                            false
                        }
                    }
                    _ => false,
                }
            }
        };
        if let Some(offset) = scroll_event {
            self.shared.events.on_scroll_offset_changed(offset);
            self.shared.events.screen_updated();
        }
        if produced {
            self.flush_input();
        }
        produced
    }

    pub fn send_mouse_release(
        &self,
        button: MouseButton,
        modifiers: Modifiers,
        position: MousePosition,
    ) -> bool {
        let produced = {
            let mut inner = self.shared.inner.lock();
            let Inner { state, input, .. } = &mut *inner;
            input.mouse_release(button, modifiers, position, &state.modes)
        };
        if produced {
            self.flush_input();
        }
        produced
    }

    pub fn send_mouse_move(&self, modifiers: Modifiers, position: MousePosition) -> bool {
        let produced = {
            let mut inner = self.shared.inner.lock();
            let Inner { state, input, .. } = &mut *inner;
            input.mouse_move(modifiers, position, &state.modes)
        };
        if produced {
            self.flush_input();
        }
        produced
    }

    pub fn send_focus_in(&self) {
        let produced = {
            let mut inner = self.shared.inner.lock();
            let Inner { state, input, .. } = &mut *inner;
            input.focus_change(true, &state.modes)
        };
        if produced {
            self.flush_input();
        }
    }

    pub fn send_focus_out(&self) {
        let produced = {
            let mut inner = self.shared.inner.lock();
            let Inner { state, input, .. } = &mut *inner;
            input.focus_change(false, &state.modes)
        };
        if produced {
            self.flush_input();
        }
    }

    pub fn send_paste(&self, text: &str) {
        {
            let mut inner = self.shared.inner.lock();
            let Inner { state, input, .. } = &mut *inner;
            input.paste(text, &state.modes);
        }
        self.flush_input();
    }

    pub fn send_raw_input(&self, bytes: &[u8]) {
        self.shared.inner.lock().input.raw(bytes);
        self.flush_input();
    }

    /// Forward buffered input-generator bytes to the PTY as one write
    /// attempt per flush; partial writes retry.
    fn flush_input(&self) {
        let bytes = self.shared.inner.lock().input.take();
        write_all_to_pty(&self.shared, &bytes);
    }

    // ---- selection -------------------------------------------------------

    pub fn start_selection(&self, kind: SelectionKind, at: CellLocation) {
        let mut inner = self.shared.inner.lock();
        inner.state.selection = Some(Selection::new(kind, at));
        inner.state.dirty = true;
    }

    pub fn extend_selection(&self, to: CellLocation) {
        let mut inner = self.shared.inner.lock();
        let Inner { state, .. } = &mut *inner;
        if let Some(selection) = &mut state.selection {
            let grid = match state.active_screen {
                crate::screen::ScreenType::Alternate => state.alternate.grid(),
                _ => state.primary.grid(),
            };
            selection.extend(grid, to);
            state.dirty = true;
        }
    }

    pub fn complete_selection(&self) {
        let completed = {
            let mut inner = self.shared.inner.lock();
            match &mut inner.state.selection {
                Some(selection) => {
                    selection.complete();
                    selection.state == SelectionState::Complete
                }
                None => false,
            }
        };
        if completed {
            self.shared.events.on_selection_completed();
        }
    }

    pub fn clear_selection(&self) {
        let mut inner = self.shared.inner.lock();
        inner.state.selection = None;
        inner.state.dirty = true;
    }

    pub fn selected_text(&self) -> Option<String> {
        let inner = self.shared.inner.lock();
        let selection = inner.state.selection.as_ref()?;
        Some(selection.extract_text(inner.state.active_screen().grid()))
    }

    // ---- viewport --------------------------------------------------------

    pub fn scroll_viewport_up(&self, lines: usize) -> bool {
        let (changed, offset) = {
            let mut inner = self.shared.inner.lock();
            let history = inner.state.active_screen().grid().history_line_count();
            let changed = inner.state.viewport.scroll_up(lines, history);
            inner.state.dirty |= changed;
            (changed, inner.state.viewport.scroll_offset())
        };
        if changed {
            self.shared.events.on_scroll_offset_changed(offset);
        }
        changed
    }

    pub fn scroll_viewport_down(&self, lines: usize) -> bool {
        let (changed, offset) = {
            let mut inner = self.shared.inner.lock();
            let changed = inner.state.viewport.scroll_down(lines);
            inner.state.dirty |= changed;
            (changed, inner.state.viewport.scroll_offset())
        };
        if changed {
            self.shared.events.on_scroll_offset_changed(offset);
        }
        changed
    }

    pub fn scroll_viewport_to_bottom(&self) -> bool {
        let changed = {
            let mut inner = self.shared.inner.lock();
            let changed = inner.state.viewport.scroll_to_bottom();
            inner.state.dirty |= changed;
            changed
        };
        if changed {
            self.shared.events.on_scroll_offset_changed(0);
        }
        changed
    }

    pub fn scroll_offset(&self) -> usize {
        self.shared.inner.lock().state.viewport.scroll_offset()
    }

    // ---- settings --------------------------------------------------------

    /// Resize the grid first, then the PTY, so the reader never parses
    /// against stale dimensions.
    pub fn resize_screen(&self, size: PageSize, pixels: Option<PixelSize>) -> io::Result<()> {
        {
            let mut inner = self.shared.inner.lock();
            inner.state.resize(size);
            self.shared.pty.resize(size, pixels)?;
        }
        self.shared.events.screen_updated();
        Ok(())
    }

    pub fn set_refresh_rate(&self, hz: f64) {
        let hz = hz.clamp(1.0, 480.0);
        let nanos = Duration::from_secs_f64(1.0 / hz).as_nanos() as u64;
        self.shared
            .refresh_interval_nanos
            .store(nanos, Ordering::Release);
    }

    pub fn set_max_history_line_count(&self, max: MaxHistoryLineCount) {
        self.shared.inner.lock().state.set_max_history(max);
    }

    pub fn set_terminal_id(&self, id: VtType) {
        let mut inner = self.shared.inner.lock();
        inner.state.set_terminal_id(id);
        if let Some(level) = inner.state.pending_conformance.take() {
            inner.builder.set_conformance(level);
        }
    }

    pub fn set_color_palette(&self, palette: crate::color::ColorPalette) {
        let mut inner = self.shared.inner.lock();
        inner.state.palette = palette;
        inner.state.dirty = true;
    }

    pub fn push_color_palette(&self) {
        let mut inner = self.shared.inner.lock();
        let Inner { state, .. } = &mut *inner;
        state.palette_stack.push(&state.palette);
    }

    pub fn pop_color_palette(&self) {
        let mut inner = self.shared.inner.lock();
        let Inner { state, .. } = &mut *inner;
        if let Some(palette) = state.palette_stack.pop() {
            state.palette = palette;
            state.dirty = true;
        }
    }

    pub fn set_cursor_shape(&self, shape: crate::cursor::CursorShape) {
        let mut inner = self.shared.inner.lock();
        inner.state.active_screen_mut().cursor.shape = shape;
        inner.state.dirty = true;
    }

    pub fn set_cursor_display(&self, display: crate::cursor::CursorDisplay) {
        let mut inner = self.shared.inner.lock();
        inner.state.active_screen_mut().cursor.display = display;
        inner.state.dirty = true;
    }

    /// Pin a mode so the application cannot change it.
    pub fn freeze_mode(&self, mode: DecMode, value: bool) {
        self.shared.inner.lock().state.modes.freeze(mode, value);
    }

    pub fn set_mode(&self, mode: DecMode, value: bool) {
        let mut inner = self.shared.inner.lock();
        inner.state.set_dec_mode_by_code(mode.code(), value);
    }

    pub fn mode_enabled(&self, mode: DecMode) -> bool {
        self.shared.inner.lock().state.modes.enabled(mode)
    }

    pub fn set_hovered_hyperlink(&self, uri: Option<String>) {
        *self.shared.hovered_hyperlink.lock() = uri;
    }

    pub fn set_preedit(&self, preedit: Option<String>) {
        let mut inner = self.shared.inner.lock();
        inner.state.preedit = preedit;
        inner.state.dirty = true;
    }

    pub fn set_search_pattern(&self, pattern: Option<String>) {
        let mut inner = self.shared.inner.lock();
        inner.state.search_pattern = pattern;
        inner.state.dirty = true;
    }

    // ---- execution modes -------------------------------------------------

    pub fn set_execution_mode(&self, mode: ExecutionMode) {
        {
            let mut current = self.shared.execution_mode.lock();
            *current = mode;
        }
        self.shared.execution_changed.notify_all();
        self.shared.pty.wakeup_reader();
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        *self.shared.execution_mode.lock()
    }

    /// Number of parsed actions waiting in the trace queue.
    pub fn pending_sequence_count(&self) -> usize {
        self.shared.inner.lock().trace.queue.len()
    }

    // ---- frame lifecycle -------------------------------------------------

    /// Periodic housekeeping: cursor blink and the synchronized-output
    /// cap. Returns true when a refresh is worthwhile.
    pub fn tick(&self, now: Instant) -> bool {
        let mut needs_refresh = false;

        {
            let mut last = self.shared.last_blink_toggle.lock();
            if now.duration_since(*last) >= CURSOR_BLINK_INTERVAL {
                *last = now;
                let previous = self.shared.cursor_blink_visible.load(Ordering::Acquire);
                self.shared
                    .cursor_blink_visible
                    .store(!previous, Ordering::Release);
                needs_refresh = true;
            }
        }

        let expired = {
            let since = self.shared.synchronized_since.lock();
            matches!(*since, Some(start) if now.duration_since(start) >= SYNCHRONIZED_OUTPUT_CAP)
        };
        if expired {
            let mut inner = self.shared.inner.lock();
            inner.state.set_dec_mode_by_code(2026, false);
            drop(inner);
            *self.shared.synchronized_since.lock() = None;
            self.shared.render.request_refresh();
            needs_refresh = true;
        }

        needs_refresh
    }

    /// Rebuild the back buffer and swap it to the front, honouring the
    /// refresh-rate gate and BatchedRendering. Returns true on swap.
    pub fn refresh_render_buffer(&self, force: bool) -> bool {
        let now = Instant::now();
        if !force && self.batching_active(now) {
            return false;
        }
        let interval = if force {
            Duration::ZERO
        } else {
            self.refresh_interval()
        };
        let hovered = self.shared.hovered_hyperlink.lock().clone();
        let blink_visible = self.shared.cursor_blink_visible.load(Ordering::Acquire);
        let inner = self.shared.inner.lock();
        let swapped = self.shared.render.refresh_with(now, interval, |back| {
            build_render_buffer(
                &inner.state,
                RenderOverlays {
                    hovered_hyperlink: hovered.as_deref(),
                    cursor_blink_visible: blink_visible,
                },
                back,
            );
        });
        drop(inner);
        if swapped {
            self.shared.events.render_buffer_updated();
        }
        swapped
    }

    fn batching_active(&self, now: Instant) -> bool {
        let batching = {
            let inner = self.shared.inner.lock();
            inner.state.modes.enabled(DecMode::BatchedRendering)
        };
        if !batching {
            *self.shared.synchronized_since.lock() = None;
            return false;
        }
        let mut since = self.shared.synchronized_since.lock();
        match *since {
            None => {
                *since = Some(now);
                true
            }
            Some(start) => now.duration_since(start) < SYNCHRONIZED_OUTPUT_CAP,
        }
    }

    /// Force a refresh pass even if the reader is blocked.
    pub fn break_loop_and_refresh_render_buffer(&self) {
        self.shared.render.request_refresh();
        self.shared.pty.wakeup_reader();
        self.refresh_render_buffer(true);
    }

    /// RAII read access to the front buffer; safe without the state mutex.
    pub fn render_buffer(&self) -> RenderBufferRef<'_> {
        self.shared.render.front()
    }

    // ---- lifecycle -------------------------------------------------------

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn close(&self) {
        if !self.shared.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.shared.pty.close();
        self.shared.pty.wakeup_reader();
        self.shared.execution_changed.notify_all();
        if let Some(handle) = self.reader.lock().take() {
            let _ = handle.join();
        }
        self.shared.events.on_closed();
    }
}

impl Drop for Terminal {
    fn drop(&mut self) {
        self.close();
    }
}

/// One write attempt per flush; partial writes retry until done or error.
fn write_all_to_pty(shared: &Arc<Shared>, bytes: &[u8]) {
    let mut written = 0;
    while written < bytes.len() {
        match shared.pty.write(&bytes[written..]) {
            Ok(0) => break,
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::debug!(error = %e, "pty write failed, dropping remaining input");
                break;
            }
        }
    }
}

/// Parse a byte fragment under the state mutex, then deliver queued
/// replies and events outside it.
fn process_bytes(shared: &Arc<Shared>, bytes: &[u8]) {
    let live = *shared.execution_mode.lock() == ExecutionMode::Normal;
    let (replies, pending, screen_changed, batching) = {
        let mut inner = shared.inner.lock();
        let cursor_before = inner.state.active_screen().cursor.position;
        inner.parse(bytes, live);
        inner.state.collect_images();
        let replies = inner.state.take_replies();
        let mut pending = inner.state.take_events();
        if inner.state.active_screen().cursor.position != cursor_before {
            pending.push(PendingEvent::CursorPositionChanged);
        }
        let changed = inner.state.dirty;
        inner.state.dirty = false;
        let batching = inner.state.modes.enabled(DecMode::BatchedRendering);
        (replies, pending, changed, batching)
    };

    if !replies.is_empty() {
        write_all_to_pty(shared, &replies);
    }
    deliver_events(shared, pending);

    let was_batching = shared.was_batching.swap(batching, Ordering::AcqRel);
    if was_batching && !batching {
        // Mode 2026 cleared: flush the accumulated updates at once.
        *shared.synchronized_since.lock() = None;
        shared.render.request_refresh();
        shared.events.screen_updated();
    } else if screen_changed && !batching {
        shared.events.screen_updated();
    }
}

fn deliver_events(shared: &Arc<Shared>, pending: Vec<PendingEvent>) {
    for event in pending {
        match event {
            PendingEvent::Bell => shared.events.bell(),
            PendingEvent::WindowTitleChanged(title) => shared.events.set_window_title(&title),
            PendingEvent::TabNameChanged(name) => shared.events.set_tab_name(&name),
            PendingEvent::CopyToClipboard(text) => shared.events.copy_to_clipboard(&text),
            PendingEvent::Notify { title, body } => shared.events.notify(&title, &body),
            PendingEvent::RequestResizeCells(size) => {
                shared.events.request_window_resize_cells(size)
            }
            PendingEvent::RequestResizePixels { width, height } => {
                shared.events.request_window_resize_pixels(width, height)
            }
            PendingEvent::RequestCaptureBuffer { lines, logical } => {
                shared.events.request_capture_buffer(lines, logical)
            }
            PendingEvent::BufferChanged(screen) => shared.events.buffer_changed(screen),
            PendingEvent::SetTerminalProfile(name) => shared.events.set_terminal_profile(&name),
            PendingEvent::ScrollOffsetChanged(offset) => {
                shared.events.on_scroll_offset_changed(offset)
            }
            PendingEvent::CursorPositionChanged => shared.events.cursor_position_changed(),
            PendingEvent::Inspect => shared.events.inspect(),
        }
    }

    let discarded = {
        let inner = shared.inner.lock();
        inner.state.image_pool().drain_discarded()
    };
    for image in discarded {
        shared.events.discard_image(&image);
    }
}

/// The reader thread: timed PTY reads, parse under the mutex, notify.
fn reader_loop(shared: Arc<Shared>) {
    while shared.running.load(Ordering::Acquire) {
        // Execution-mode gate.
        loop {
            if !shared.running.load(Ordering::Acquire) {
                return;
            }
            let mode = *shared.execution_mode.lock();
            match mode {
                ExecutionMode::Normal => break,
                ExecutionMode::Waiting => {
                    let mut guard = shared.execution_mode.lock();
                    while *guard == ExecutionMode::Waiting
                        && shared.running.load(Ordering::Acquire)
                    {
                        shared.execution_changed.wait(&mut guard);
                    }
                }
                ExecutionMode::SingleStep => {
                    let applied = shared.inner.lock().apply_one_queued();
                    if applied {
                        shared.events.screen_updated();
                    }
                    *shared.execution_mode.lock() = ExecutionMode::Waiting;
                }
                ExecutionMode::BreakAtEmptyQueue => {
                    let mut applied_any = false;
                    {
                        let mut inner = shared.inner.lock();
                        while inner.apply_one_queued() {
                            applied_any = true;
                        }
                    }
                    if applied_any {
                        shared.events.screen_updated();
                    }
                    *shared.execution_mode.lock() = ExecutionMode::Waiting;
                }
            }
        }

        let timeout = Duration::from_nanos(
            shared.refresh_interval_nanos.load(Ordering::Acquire),
        ) * 8;
        let mut buffer = shared.pool.acquire();
        let max = buffer.capacity();
        match shared.pty.read(&mut buffer, timeout, max) {
            Ok(Some((n, _fast_pipe))) if n > 0 => {
                let bytes = buffer.filled().to_vec();
                drop(buffer);
                process_bytes(&shared, &bytes);
            }
            Ok(_) => continue,
            Err(e)
                if e.kind() == io::ErrorKind::Interrupted
                    || e.kind() == io::ErrorKind::WouldBlock =>
            {
                continue;
            }
            Err(e) => {
                tracing::error!(error = %e, "pty read failed, closing terminal");
                shared.running.store(false, Ordering::Release);
                shared.pty.close();
                shared.events.on_closed();
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferObject;
    use crate::events::NullEvents;

    /// A scripted PTY: `read` hands out queued chunks, writes accumulate.
    struct FakePty {
        chunks: Mutex<std::collections::VecDeque<Vec<u8>>>,
        written: Mutex<Vec<u8>>,
        closed: AtomicBool,
        size: Mutex<PageSize>,
    }

    impl FakePty {
        fn new() -> Self {
            Self {
                chunks: Mutex::new(std::collections::VecDeque::new()),
                written: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
                size: Mutex::new(PageSize::new(24, 80)),
            }
        }

        fn feed(&self, bytes: &[u8]) {
            self.chunks.lock().push_back(bytes.to_vec());
        }

        fn written(&self) -> Vec<u8> {
            self.written.lock().clone()
        }
    }

    impl Pty for FakePty {
        fn page_size(&self) -> PageSize {
            *self.size.lock()
        }

        fn read(
            &self,
            into: &mut BufferObject,
            _timeout: Duration,
            max: usize,
        ) -> io::Result<Option<(usize, bool)>> {
            if self.is_closed() {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"));
            }
            match self.chunks.lock().pop_front() {
                Some(chunk) => {
                    let n = chunk.len().min(max).min(into.capacity());
                    into.writable()[..n].copy_from_slice(&chunk[..n]);
                    into.set_filled(n);
                    Ok(Some((n, false)))
                }
                None => {
                    // Behave like a timeout so the loop spins gently.
                    std::thread::sleep(Duration::from_millis(1));
                    Ok(None)
                }
            }
        }

        fn write(&self, bytes: &[u8]) -> io::Result<usize> {
            self.written.lock().extend_from_slice(bytes);
            Ok(bytes.len())
        }

        fn resize(&self, cells: PageSize, _pixels: Option<PixelSize>) -> io::Result<()> {
            *self.size.lock() = cells;
            Ok(())
        }

        fn wakeup_reader(&self) {}

        fn close(&self) {
            self.closed.store(true, Ordering::Release);
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::Acquire)
        }
    }

    fn wait_for<F: Fn() -> bool>(predicate: F) {
        for _ in 0..500 {
            if predicate() {
                return;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        panic!("condition not reached in time");
    }

    /// Route tracing output through the test harness; `RUST_LOG` narrows
    /// it when debugging a single test.
    fn init_tracing() {
        use tracing_subscriber::EnvFilter;
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| "squall=debug".into()),
            )
            .with_test_writer()
            .try_init();
    }

    fn terminal_with_fake_pty() -> (Terminal, Arc<FakePty>) {
        init_tracing();
        let pty = Arc::new(FakePty::new());
        let terminal = Terminal::new(
            Arc::clone(&pty) as Arc<dyn Pty>,
            Arc::new(NullEvents),
            EmulatorSettings::default(),
            None,
        );
        (terminal, pty)
    }

    #[test]
    fn reader_thread_parses_pty_output() {
        let (terminal, pty) = terminal_with_fake_pty();
        pty.feed(b"hello");
        wait_for(|| {
            terminal.refresh_render_buffer(true);
            let front = terminal.render_buffer();
            front
                .cells
                .iter()
                .any(|cell| cell.line == 0 && cell.column == 0 && cell.text == "h")
        });
        terminal.close();
    }

    #[test]
    fn replies_flow_back_to_the_pty() {
        let (terminal, pty) = terminal_with_fake_pty();
        pty.feed(b"\x1b[5n");
        wait_for(|| pty.written().windows(4).any(|w| w == b"\x1b[0n"));
        terminal.close();
    }

    #[test]
    fn write_to_screen_bypasses_the_pty() {
        let (terminal, _pty) = terminal_with_fake_pty();
        terminal.write_to_screen(b"\x1b[2;2HZ");
        terminal.refresh_render_buffer(true);
        let front = terminal.render_buffer();
        assert!(front
            .cells
            .iter()
            .any(|cell| cell.line == 1 && cell.column == 1 && cell.text == "Z"));
        drop(front);
        terminal.close();
    }

    #[test]
    fn waiting_mode_queues_without_mutating() {
        let (terminal, _pty) = terminal_with_fake_pty();
        terminal.set_execution_mode(ExecutionMode::Waiting);
        terminal.write_to_screen(b"queued\x1b[2J");
        assert!(terminal.pending_sequence_count() >= 2);
        terminal.refresh_render_buffer(true);
        {
            let front = terminal.render_buffer();
            assert!(!front.cells.iter().any(|cell| cell.text == "q"));
        }

        // SingleStep applies exactly one queued action.
        let before = terminal.pending_sequence_count();
        terminal.set_execution_mode(ExecutionMode::SingleStep);
        wait_for(|| terminal.pending_sequence_count() == before - 1);

        // BreakAtEmptyQueue drains the rest.
        terminal.set_execution_mode(ExecutionMode::BreakAtEmptyQueue);
        wait_for(|| terminal.pending_sequence_count() == 0);
        terminal.refresh_render_buffer(true);
        {
            let front = terminal.render_buffer();
            assert!(front.cells.iter().any(|cell| cell.text == "q"));
        }
        terminal.close();
    }

    #[test]
    fn key_input_reaches_the_pty() {
        let (terminal, pty) = terminal_with_fake_pty();
        terminal.send_char('l', Modifiers::empty(), KeyEventKind::Press);
        terminal.send_key(Key::Enter, Modifiers::empty(), KeyEventKind::Press);
        wait_for(|| pty.written().ends_with(b"l\r"));
        terminal.close();
    }

    #[test]
    fn bracketed_paste_wraps_after_mode_set() {
        let (terminal, pty) = terminal_with_fake_pty();
        terminal.write_to_screen(b"\x1b[?2004h");
        terminal.send_paste("hi");
        wait_for(|| {
            let written = pty.written();
            written
                .windows(8)
                .any(|w| w == b"\x1b[200~hi")
        });
        terminal.close();
    }

    #[test]
    fn render_buffer_is_deterministic_without_mutation() {
        let (terminal, _pty) = terminal_with_fake_pty();
        terminal.write_to_screen(b"\x1b[1;31mhello\x1b[0m world");
        terminal.refresh_render_buffer(true);
        let first: Vec<_> = terminal.render_buffer().cells.clone();
        terminal.refresh_render_buffer(true);
        let second: Vec<_> = terminal.render_buffer().cells.clone();
        assert_eq!(first, second);
        terminal.close();
    }

    #[test]
    fn batched_rendering_gates_refresh() {
        let (terminal, _pty) = terminal_with_fake_pty();
        terminal.write_to_screen(b"\x1b[?2026h");
        assert!(!terminal.refresh_render_buffer(false));
        terminal.write_to_screen(b"\x1b[?2026l");
        assert!(terminal.refresh_render_buffer(false) || terminal.refresh_render_buffer(true));
        terminal.close();
    }

    #[test]
    fn selection_survives_api_round_trip() {
        let (terminal, _pty) = terminal_with_fake_pty();
        terminal.write_to_screen(b"hello world");
        terminal.start_selection(SelectionKind::Linear, CellLocation::new(0, 0));
        terminal.extend_selection(CellLocation::new(0, 4));
        terminal.complete_selection();
        assert_eq!(terminal.selected_text().as_deref(), Some("hello"));
        terminal.close();
    }

    #[test]
    fn close_is_idempotent() {
        let (terminal, pty) = terminal_with_fake_pty();
        terminal.close();
        terminal.close();
        assert!(pty.is_closed());
        assert!(!terminal.is_running());
    }
}
