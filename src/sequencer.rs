//! Function execution: routes every resolved catalogue entry onto the
//! emulator state. Replies are queued 7-bit-safe and drained by the
//! terminal façade after the parse.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;

use crate::cell::{CellAttrs, UnderlineStyle};
use crate::color::{Color, ColorRole, RgbColor};
use crate::cursor::{CharsetId, CharsetIndex, CursorDisplay, CursorShape};
use crate::functions::{Function, VtType};
use crate::grid::PageSize;
use crate::modes::{AnsiMode, DecMode};
use crate::screen::{ActiveStatusDisplay, StatusDisplayType};
use crate::sequence::{Sequence, SequenceHandler};
use crate::state::{EmulatorState, PendingEvent};

impl SequenceHandler for EmulatorState {
    fn write_text(&mut self, text: &str) {
        let insert = self.modes.ansi_enabled(AnsiMode::Insert);
        let lr = self.modes.enabled(DecMode::LeftRightMargin);
        let pushed = self.target_screen_mut().write_text(text, insert, lr);
        self.on_history_push(pushed);
        self.dirty = true;
    }

    fn execute_control(&mut self, control: u8) {
        let lr = self.modes.enabled(DecMode::LeftRightMargin);
        match control {
            0x07 => self.emit(PendingEvent::Bell),
            0x08 => self.target_screen_mut().backspace(),
            0x09 => self.target_screen_mut().horizontal_tab(),
            0x0A | 0x0B | 0x0C => {
                let pushed = self.target_screen_mut().linefeed(lr);
                self.on_history_push(pushed);
                if self.modes.ansi_enabled(AnsiMode::AutomaticNewline) {
                    self.target_screen_mut().carriage_return(lr);
                }
            }
            0x0D => self.target_screen_mut().carriage_return(lr),
            0x0E => self
                .target_screen_mut()
                .cursor
                .charsets
                .lock_shift_gl(CharsetIndex::G1),
            0x0F => self
                .target_screen_mut()
                .cursor
                .charsets
                .lock_shift_gl(CharsetIndex::G0),
            _ => {}
        }
        self.dirty = true;
    }

    fn handle(&mut self, function: Function, seq: &Sequence) {
        let lr = self.modes.enabled(DecMode::LeftRightMargin);
        match function {
            // C0 entries arrive via execute_control; nothing to do here.
            Function::Bel
            | Function::Bs
            | Function::Tab
            | Function::Lf
            | Function::Vt
            | Function::Ff
            | Function::Cr
            | Function::Ls0
            | Function::Ls1 => {}

            Function::Cuu => self.target_screen_mut().move_up(seq.param_or(0, 1)),
            Function::Cud => self.target_screen_mut().move_down(seq.param_or(0, 1)),
            Function::Cuf => self.target_screen_mut().move_forward(seq.param_or(0, 1), lr),
            Function::Cub => self
                .target_screen_mut()
                .move_backward(seq.param_or(0, 1), lr),
            Function::Cnl => self.target_screen_mut().next_line(seq.param_or(0, 1), lr),
            Function::Cpl => self
                .target_screen_mut()
                .previous_line(seq.param_or(0, 1), lr),
            Function::Cha | Function::Hpa => self
                .target_screen_mut()
                .move_to_column(seq.param_or(0, 1) - 1, lr),
            Function::Hpr => self.target_screen_mut().move_forward(seq.param_or(0, 1), lr),
            Function::Vpa => self
                .target_screen_mut()
                .move_to_line(seq.param_or(0, 1) - 1, lr),
            Function::Cup | Function::Hvp => {
                let line = seq.param_or(0, 1) - 1;
                let column = seq.param_or(1, 1) - 1;
                self.target_screen_mut().move_to(line, column, lr);
            }
            Function::Cbt => self.target_screen_mut().backward_tab(seq.param_or(0, 1)),
            Function::Cht => self.target_screen_mut().forward_tab(seq.param_or(0, 1)),

            Function::Ind => {
                let pushed = self.target_screen_mut().linefeed(lr);
                self.on_history_push(pushed);
            }
            Function::Nel => {
                let pushed = self.target_screen_mut().linefeed(lr);
                self.target_screen_mut().carriage_return(lr);
                self.on_history_push(pushed);
            }
            Function::Ri => self.target_screen_mut().reverse_index(lr),
            Function::DecBi => self.target_screen_mut().back_index(lr),
            Function::DecFi => self.target_screen_mut().forward_index(lr),
            Function::DecSc => self.target_screen_mut().save_cursor(),
            Function::DecRc => self.target_screen_mut().restore_cursor(),
            Function::DecKpam => self.application_keypad = true,
            Function::DecKpnm => self.application_keypad = false,
            Function::DecAln => self.target_screen_mut().alignment_pattern(),

            Function::ScsG0Special => self.designate(CharsetIndex::G0, CharsetId::DecSpecialGraphics),
            Function::ScsG0Usascii => self.designate(CharsetIndex::G0, CharsetId::UsAscii),
            Function::ScsG1Special => self.designate(CharsetIndex::G1, CharsetId::DecSpecialGraphics),
            Function::ScsG1Usascii => self.designate(CharsetIndex::G1, CharsetId::UsAscii),
            Function::ScsG2Special => self.designate(CharsetIndex::G2, CharsetId::DecSpecialGraphics),
            Function::ScsG2Usascii => self.designate(CharsetIndex::G2, CharsetId::UsAscii),
            Function::ScsG3Special => self.designate(CharsetIndex::G3, CharsetId::DecSpecialGraphics),
            Function::ScsG3Usascii => self.designate(CharsetIndex::G3, CharsetId::UsAscii),
            Function::Ss2 => self
                .target_screen_mut()
                .cursor
                .charsets
                .single_shift(CharsetIndex::G2),
            Function::Ss3 => self
                .target_screen_mut()
                .cursor
                .charsets
                .single_shift(CharsetIndex::G3),

            Function::Hts => {
                let screen = self.target_screen_mut();
                let column = screen.cursor.position.column.max(0) as u16;
                let columns = screen.page_size().columns;
                screen.tab_stops.set(column, columns);
            }
            Function::Tbc => match seq.param_or(0, 0) {
                0 => {
                    let screen = self.target_screen_mut();
                    let column = screen.cursor.position.column.max(0) as u16;
                    let columns = screen.page_size().columns;
                    screen.tab_stops.clear(column, columns);
                }
                3 => self.target_screen_mut().tab_stops.clear_all(),
                other => tracing::info!(mode = other, "TBC with unsupported mode, ignored"),
            },

            Function::Ed => match seq.param_or(0, 0) {
                mode @ 0..=2 => self.active_screen_mut().erase_in_display(mode),
                3 => {
                    self.primary.grid_mut().clear_history();
                    let changed = self.viewport.clamp(0);
                    if changed {
                        let offset = self.viewport.scroll_offset();
                        self.emit(PendingEvent::ScrollOffsetChanged(offset));
                    }
                }
                other => tracing::info!(mode = other, "ED with invalid selector, ignored"),
            },
            Function::El => self.target_screen_mut().erase_in_line(seq.param_or(0, 0)),
            Function::Ech => self.target_screen_mut().erase_chars(seq.param_or(0, 1)),
            Function::Ich => self.target_screen_mut().insert_chars(seq.param_or(0, 1), lr),
            Function::Dch => self.target_screen_mut().delete_chars(seq.param_or(0, 1), lr),
            Function::Il => self.target_screen_mut().insert_lines(seq.param_or(0, 1), lr),
            Function::Dl => self.target_screen_mut().delete_lines(seq.param_or(0, 1), lr),
            Function::DecIc => self
                .target_screen_mut()
                .insert_columns(seq.param_or(0, 1), lr),
            Function::DecDc => self
                .target_screen_mut()
                .delete_columns(seq.param_or(0, 1), lr),
            Function::Su => {
                let pushed = self.target_screen_mut().scroll_up(seq.param_or(0, 1), lr);
                self.on_history_push(pushed);
            }
            Function::Sd => self.target_screen_mut().scroll_down(seq.param_or(0, 1), lr),
            Function::Rep => {
                let insert = self.modes.ansi_enabled(AnsiMode::Insert);
                let pushed = self
                    .target_screen_mut()
                    .repeat_last(seq.param_or(0, 1), insert, lr);
                self.on_history_push(pushed);
            }
            Function::SetMark => self.target_screen_mut().mark_line(),

            Function::DecStbm => {
                let screen = self.active_screen_mut();
                let lines = screen.page_size().lines;
                let top = seq.param_or(0, 1);
                let bottom = seq.param_or(1, lines);
                if screen.set_vertical_margins(top - 1, bottom.saturating_sub(1)) {
                    screen.move_to(0, 0, lr);
                } else {
                    tracing::info!(top, bottom, "DECSTBM with invalid margins, ignored");
                }
            }
            Function::DecSlrm => {
                if self.modes.enabled(DecMode::LeftRightMargin) {
                    let screen = self.active_screen_mut();
                    let columns = screen.page_size().columns;
                    let left = seq.param_or(0, 1);
                    let right = seq.param_or(1, columns);
                    if screen.set_horizontal_margins(left - 1, right.saturating_sub(1)) {
                        screen.move_to(0, 0, true);
                    } else {
                        tracing::info!(left, right, "DECSLRM with invalid margins, ignored");
                    }
                } else {
                    tracing::debug!("DECSLRM without LeftRightMargin mode, ignored");
                }
            }
            Function::ScoSc => {
                if self.modes.enabled(DecMode::LeftRightMargin) {
                    // With DECLRMM set, `CSI s` is DECSLRM with defaults.
                    let screen = self.active_screen_mut();
                    let columns = screen.page_size().columns;
                    screen.set_horizontal_margins(0, columns.saturating_sub(1));
                    screen.move_to(0, 0, true);
                } else {
                    self.target_screen_mut().save_cursor();
                }
            }
            Function::ScoRc => self.target_screen_mut().restore_cursor(),

            Function::Sgr => self.handle_sgr(seq),
            Function::Sm => self.set_ansi_modes(seq, true),
            Function::Rm => self.set_ansi_modes(seq, false),
            Function::DecSm => self.set_dec_modes(seq, true),
            Function::DecRm => self.set_dec_modes(seq, false),
            Function::DecRqm => self.report_dec_mode(seq.param_or(0, 0)),
            Function::DecRqmAnsi => self.report_ansi_mode(seq.param_or(0, 0)),
            Function::XtSave => {
                let modes: Vec<DecMode> =
                    seq.params.iter().filter_map(DecMode::from_code).collect();
                self.modes.save(&modes);
            }
            Function::XtRestore => {
                let modes: Vec<DecMode> =
                    seq.params.iter().filter_map(DecMode::from_code).collect();
                for (mode, value) in self.modes.restore(&modes) {
                    self.apply_mode_side_effects(mode.code(), value);
                }
            }

            Function::Da1 => self.send_primary_device_attributes(),
            Function::Da2 => self.send_secondary_device_attributes(seq),
            Function::Da3 => {
                if seq.param_or(0, 0) == 0 {
                    self.reply(b"\x1bP!|00000000\x1b\\");
                }
            }
            Function::AnsiDsr => match seq.param_or(0, 0) {
                5 => self.reply(b"\x1b[0n"),
                6 => self.report_cursor_position(false),
                other => tracing::debug!(request = other, "DSR unsupported, ignored"),
            },
            Function::Dsr => match seq.param_or(0, 0) {
                5 => self.reply(b"\x1b[0n"),
                6 => self.report_cursor_position(true),
                15 => self.reply(b"\x1b[?13n"), // no printer
                25 => self.reply(b"\x1b[?21n"), // UDKs locked
                other => tracing::debug!(request = other, "DEC DSR unsupported, ignored"),
            },

            Function::DecScusr => {
                let cursor = &mut self.target_screen_mut().cursor;
                match seq.param_or(0, 1) {
                    0 | 1 => {
                        cursor.shape = CursorShape::Block;
                        cursor.display = CursorDisplay::Blink;
                    }
                    2 => {
                        cursor.shape = CursorShape::Block;
                        cursor.display = CursorDisplay::Steady;
                    }
                    3 => {
                        cursor.shape = CursorShape::Underline;
                        cursor.display = CursorDisplay::Blink;
                    }
                    4 => {
                        cursor.shape = CursorShape::Underline;
                        cursor.display = CursorDisplay::Steady;
                    }
                    5 => {
                        cursor.shape = CursorShape::Bar;
                        cursor.display = CursorDisplay::Blink;
                    }
                    6 => {
                        cursor.shape = CursorShape::Bar;
                        cursor.display = CursorDisplay::Steady;
                    }
                    other => tracing::debug!(style = other, "DECSCUSR unknown style, ignored"),
                }
            }
            Function::DecScl => {
                let level = match seq.param_or(0, 0) {
                    61 => Some(VtType::VT100),
                    62 => Some(VtType::VT220),
                    63 => Some(VtType::VT340),
                    64 => Some(VtType::VT420),
                    65 => Some(VtType::VT525),
                    other => {
                        tracing::info!(level = other, "DECSCL unknown level, ignored");
                        None
                    }
                };
                if let Some(level) = level {
                    self.set_terminal_id(level);
                }
            }
            Function::DecStr => self.soft_reset(),
            Function::Ris => self.hard_reset(),

            Function::DecSasd => match seq.param_or(0, 0) {
                0 => self.active_display = ActiveStatusDisplay::Main,
                1 => {
                    if self.status_display == StatusDisplayType::HostWritable {
                        self.active_display = ActiveStatusDisplay::StatusLine;
                    } else {
                        tracing::info!("DECSASD without host-writable status line, ignored");
                    }
                }
                other => tracing::info!(target = other, "DECSASD unknown target, ignored"),
            },
            Function::DecSsdt => match seq.param_or(0, 0) {
                0 => self.set_status_display(StatusDisplayType::None),
                1 => self.set_status_display(StatusDisplayType::Indicator),
                2 => self.set_status_display(StatusDisplayType::HostWritable),
                other => tracing::info!(kind = other, "DECSSDT unknown type, ignored"),
            },

            Function::DecScpp => {
                let columns = match seq.param_or(0, 80) {
                    80 => 80,
                    132 => 132,
                    other => {
                        tracing::info!(columns = other, "DECSCPP unsupported width, ignored");
                        return;
                    }
                };
                let lines = self.total_size().lines;
                self.emit(PendingEvent::RequestResizeCells(PageSize::new(
                    lines, columns,
                )));
            }
            Function::DecSnls => {
                let lines = seq.param_or(0, self.total_size().lines);
                let columns = self.total_size().columns;
                self.emit(PendingEvent::RequestResizeCells(PageSize::new(
                    lines, columns,
                )));
            }
            Function::WinManip => self.window_manipulation(seq),
            Function::XtCapture => {
                let logical = seq.param_or(0, 0) == 1;
                let lines = seq.param_or(1, self.page_size().lines);
                self.emit(PendingEvent::RequestCaptureBuffer { lines, logical });
            }
            Function::XtVersion => {
                let (major, minor, patch) = self.settings.version;
                let reply = format!(
                    "\x1bP>|{} {}.{}.{}\x1b\\",
                    self.settings.term_name, major, minor, patch
                );
                self.reply(reply);
            }
            Function::XtSmGraphics => self.graphics_attributes(seq),
            Function::XtPushColors => {
                self.palette_stack.push(&self.palette);
            }
            Function::XtPopColors => {
                if let Some(palette) = self.palette_stack.pop() {
                    self.palette = palette;
                    self.dirty = true;
                }
            }
            Function::XtReportColors => {
                let depth = self.palette_stack.depth();
                self.reply(format!("\x1b[{depth};{depth}#Q"));
            }

            Function::DecRqss => self.report_status_string(seq),
            Function::DecSixel => self.handle_sixel(seq),
            Function::Stp => {
                let profile = seq.payload_str().to_string();
                self.emit(PendingEvent::SetTerminalProfile(profile));
            }
            Function::XtGetTcap => self.handle_xtgettcap(seq),

            Function::SetTitle => {
                let title = seq.payload_str().to_string();
                self.window_title = title.clone();
                self.emit(PendingEvent::WindowTitleChanged(title.clone()));
                self.emit(PendingEvent::TabNameChanged(title));
            }
            Function::SetIcon => {
                let name = seq.payload_str().to_string();
                self.emit(PendingEvent::TabNameChanged(name));
            }
            Function::SetWinTitle => {
                let title = seq.payload_str().to_string();
                self.window_title = title.clone();
                self.emit(PendingEvent::WindowTitleChanged(title));
            }
            Function::SetColPal => self.handle_osc_color_palette(seq),
            Function::ResetColPal => self.handle_osc_reset_palette(seq),
            Function::Hyperlink => self.handle_osc_hyperlink(seq),
            Function::ColorFg => self.handle_osc_dynamic_color(seq, 10, ColorRole::DefaultForeground),
            Function::ColorBg => self.handle_osc_dynamic_color(seq, 11, ColorRole::DefaultBackground),
            Function::ColorCursor => self.handle_osc_dynamic_color(seq, 12, ColorRole::Cursor),
            Function::ColorMouseFg => {
                self.handle_osc_dynamic_color(seq, 13, ColorRole::MouseForeground)
            }
            Function::ColorMouseBg => {
                self.handle_osc_dynamic_color(seq, 14, ColorRole::MouseBackground)
            }
            Function::ResetColorFg => self.reset_dynamic_color(ColorRole::DefaultForeground),
            Function::ResetColorBg => self.reset_dynamic_color(ColorRole::DefaultBackground),
            Function::ResetColorCursor => self.reset_dynamic_color(ColorRole::Cursor),
            Function::ResetColorMouseFg => self.reset_dynamic_color(ColorRole::MouseForeground),
            Function::ResetColorMouseBg => self.reset_dynamic_color(ColorRole::MouseBackground),
            Function::Clipboard => self.handle_osc_clipboard(seq),
            Function::Notify => self.handle_osc_notify(seq),
        }
        self.dirty = true;
    }
}

impl EmulatorState {
    fn designate(&mut self, index: CharsetIndex, id: CharsetId) {
        self.target_screen_mut().cursor.charsets.designate(index, id);
    }

    fn handle_sgr(&mut self, seq: &Sequence) {
        let pen = &mut self.target_screen_mut().cursor.pen;
        if seq.params.is_empty() {
            let hyperlink = pen.hyperlink.take();
            pen.reset();
            pen.hyperlink = hyperlink;
            return;
        }

        let mut i = 0;
        while i < seq.params.len() {
            let sub = seq.params.subparams(i);
            let value = sub.first().copied().unwrap_or(0);
            match value {
                0 => {
                    let hyperlink = pen.hyperlink.take();
                    pen.reset();
                    pen.hyperlink = hyperlink;
                }
                1 => pen.attrs.insert(CellAttrs::BOLD),
                2 => pen.attrs.insert(CellAttrs::FAINT),
                3 => pen.attrs.insert(CellAttrs::ITALIC),
                4 => {
                    pen.underline = match sub.get(1).copied() {
                        None | Some(1) => UnderlineStyle::Single,
                        Some(0) => UnderlineStyle::None,
                        Some(2) => UnderlineStyle::Double,
                        Some(3) => UnderlineStyle::Curly,
                        Some(4) => UnderlineStyle::Dotted,
                        Some(5) => UnderlineStyle::Dashed,
                        Some(_) => UnderlineStyle::Single,
                    };
                }
                5 => pen.attrs.insert(CellAttrs::BLINK_SLOW),
                6 => pen.attrs.insert(CellAttrs::BLINK_RAPID),
                7 => pen.attrs.insert(CellAttrs::INVERSE),
                8 => pen.attrs.insert(CellAttrs::HIDDEN),
                9 => pen.attrs.insert(CellAttrs::CROSSED_OUT),
                21 => pen.attrs.remove(CellAttrs::BOLD),
                22 => pen.attrs.remove(CellAttrs::BOLD | CellAttrs::FAINT),
                23 => pen.attrs.remove(CellAttrs::ITALIC),
                24 => pen.underline = UnderlineStyle::None,
                25 => pen
                    .attrs
                    .remove(CellAttrs::BLINK_SLOW | CellAttrs::BLINK_RAPID),
                27 => pen.attrs.remove(CellAttrs::INVERSE),
                28 => pen.attrs.remove(CellAttrs::HIDDEN),
                29 => pen.attrs.remove(CellAttrs::CROSSED_OUT),
                30..=37 => pen.fg = Color::Indexed(value as u8 - 30),
                38 => {
                    if let Some(color) = extended_color(seq, &mut i) {
                        pen.fg = color;
                    }
                }
                39 => pen.fg = Color::Default,
                40..=47 => pen.bg = Color::Indexed(value as u8 - 40),
                48 => {
                    if let Some(color) = extended_color(seq, &mut i) {
                        pen.bg = color;
                    }
                }
                49 => pen.bg = Color::Default,
                51 => pen.attrs.insert(CellAttrs::FRAMED),
                53 => pen.attrs.insert(CellAttrs::OVERLINED),
                54 => pen.attrs.remove(CellAttrs::FRAMED),
                55 => pen.attrs.remove(CellAttrs::OVERLINED),
                58 => {
                    if let Some(color) = extended_color(seq, &mut i) {
                        pen.underline_color = color;
                    }
                }
                59 => pen.underline_color = Color::Default,
                90..=97 => pen.fg = Color::Indexed(value as u8 - 90 + 8),
                100..=107 => pen.bg = Color::Indexed(value as u8 - 100 + 8),
                other => tracing::debug!(sgr = other, "unsupported SGR attribute, ignored"),
            }
            i += 1;
        }
    }

    fn set_ansi_modes(&mut self, seq: &Sequence, enable: bool) {
        for code in seq.params.iter() {
            match AnsiMode::from_code(code) {
                Some(mode) => self.modes.set_ansi(mode, enable),
                None => tracing::debug!(code, "unknown ANSI mode, ignored"),
            }
        }
    }

    fn set_dec_modes(&mut self, seq: &Sequence, enable: bool) {
        let codes: Vec<u16> = seq.params.iter().collect();
        for code in codes {
            self.set_dec_mode_by_code(code, enable);
        }
    }

    pub(crate) fn set_dec_mode_by_code(&mut self, code: u16, enable: bool) {
        let Some(mode) = DecMode::from_code(code) else {
            tracing::debug!(code, "unknown DEC mode, ignored");
            return;
        };
        if self.modes.is_frozen(mode) {
            tracing::info!(code, "attempt to change frozen mode, ignored");
            return;
        }
        self.modes.set(mode, enable);
        self.apply_mode_side_effects(code, enable);
    }

    fn apply_mode_side_effects(&mut self, code: u16, enable: bool) {
        match code {
            3 => {
                // DECCOLM: honoured only when 80<->132 switching is allowed.
                if self.modes.enabled(DecMode::AllowColumns80to132) {
                    let columns = if enable { 132 } else { 80 };
                    let lines = self.total_size().lines;
                    self.emit(PendingEvent::RequestResizeCells(PageSize::new(
                        lines, columns,
                    )));
                    self.active_screen_mut().erase_in_display(2);
                    self.active_screen_mut().reset_margins();
                    self.active_screen_mut().move_to(0, 0, false);
                }
            }
            2 => {
                if enable {
                    let charsets = &mut self.target_screen_mut().cursor.charsets;
                    for index in [
                        CharsetIndex::G0,
                        CharsetIndex::G1,
                        CharsetIndex::G2,
                        CharsetIndex::G3,
                    ] {
                        charsets.designate(index, CharsetId::UsAscii);
                    }
                }
            }
            6 => {
                let lr = self.modes.enabled(DecMode::LeftRightMargin);
                let screen = self.active_screen_mut();
                screen.cursor.origin_mode = enable;
                screen.move_to(0, 0, lr);
            }
            7 => {
                let screen = self.active_screen_mut();
                screen.cursor.auto_wrap = enable;
                if !enable {
                    screen.cursor.wrap_pending = false;
                }
            }
            47 => {
                if enable {
                    self.switch_to_alternate();
                } else {
                    self.switch_to_primary();
                }
            }
            1047 => {
                if enable {
                    self.switch_to_alternate();
                    self.alternate.clear_page();
                } else {
                    self.switch_to_primary();
                }
            }
            1048 => {
                if enable {
                    self.active_screen_mut().save_cursor();
                } else {
                    self.active_screen_mut().restore_cursor();
                }
            }
            1049 => {
                if enable {
                    self.primary.save_cursor();
                    self.switch_to_alternate();
                    self.alternate.clear_page();
                } else {
                    self.switch_to_primary();
                    self.primary.restore_cursor();
                }
            }
            69 => {
                if !enable {
                    // Leaving DECLRMM resets the horizontal margins.
                    let screen = self.active_screen_mut();
                    let columns = screen.page_size().columns;
                    screen.set_horizontal_margins(0, columns.saturating_sub(1));
                }
            }
            46 => {
                if enable {
                    self.emit(PendingEvent::Inspect);
                }
            }
            _ => {}
        }
    }

    fn report_dec_mode(&mut self, code: u16) {
        // 0 unknown, 1 set, 2 reset, 3 permanently set, 4 permanently reset.
        let value = match DecMode::from_code(code) {
            None => 0,
            Some(mode) => match (self.modes.enabled(mode), self.modes.is_frozen(mode)) {
                (true, false) => 1,
                (false, false) => 2,
                (true, true) => 3,
                (false, true) => 4,
            },
        };
        self.reply(format!("\x1b[?{code};{value}$y"));
    }

    fn report_ansi_mode(&mut self, code: u16) {
        let value = match AnsiMode::from_code(code) {
            None => 0,
            Some(mode) => {
                if self.modes.ansi_enabled(mode) {
                    1
                } else {
                    2
                }
            }
        };
        self.reply(format!("\x1b[{code};{value}$y"));
    }

    fn send_primary_device_attributes(&mut self) {
        // Feature codes: 1 columns-132, 4 sixel, 8 UDKs, 22 ANSI color,
        // 29 text locator.
        let reply = match self.settings.terminal_id {
            VtType::VT100 => "\x1b[?1;2c".to_string(),
            id => {
                let class = match id {
                    VtType::VT220 | VtType::VT240 => 62,
                    VtType::VT320 | VtType::VT330 | VtType::VT340 => 63,
                    VtType::VT420 => 64,
                    _ => 65,
                };
                format!("\x1b[?{class};1;4;8;22;29c")
            }
        };
        self.reply(reply);
    }

    fn send_secondary_device_attributes(&mut self, seq: &Sequence) {
        if seq.param_or(0, 0) != 0 {
            return;
        }
        let (major, minor, patch) = self.settings.version;
        let version = (major as u32 * 100 + minor as u32) * 100 + patch as u32;
        let id = self.settings.terminal_id.id();
        self.reply(format!("\x1b[>{id};{version};0c"));
    }

    fn report_cursor_position(&mut self, extended: bool) {
        let screen = self.active_screen();
        let margins = screen.margins();
        let position = screen.cursor.position;
        let (mut line, mut column) = (position.line.max(0) as u16, position.column.max(0) as u16);
        if screen.cursor.origin_mode {
            line = line.saturating_sub(margins.top);
            if self.modes.enabled(DecMode::LeftRightMargin) {
                column = column.saturating_sub(margins.left);
            }
        }
        let reply = if extended {
            format!("\x1b[{};{};1R", line + 1, column + 1)
        } else {
            format!("\x1b[{};{}R", line + 1, column + 1)
        };
        self.reply(reply);
    }

    fn window_manipulation(&mut self, seq: &Sequence) {
        match seq.param_or(0, 0) {
            4 => {
                let height = seq.param_or(1, 0);
                let width = seq.param_or(2, 0);
                self.emit(PendingEvent::RequestResizePixels { width, height });
            }
            8 => {
                let lines = seq.param_or(1, self.total_size().lines);
                let columns = seq.param_or(2, self.total_size().columns);
                self.emit(PendingEvent::RequestResizeCells(PageSize::new(
                    lines, columns,
                )));
            }
            14 => {
                let page = self.page_size();
                let (cell_w, cell_h) = self.settings.cell_pixels;
                self.reply(format!(
                    "\x1b[4;{};{}t",
                    page.lines * cell_h,
                    page.columns * cell_w
                ));
            }
            18 => {
                let page = self.page_size();
                self.reply(format!("\x1b[8;{};{}t", page.lines, page.columns));
            }
            19 => {
                let page = self.page_size();
                self.reply(format!("\x1b[9;{};{}t", page.lines, page.columns));
            }
            22 => self.title_stack.push(self.window_title.clone()),
            23 => {
                if let Some(title) = self.title_stack.pop() {
                    self.window_title = title.clone();
                    self.emit(PendingEvent::WindowTitleChanged(title));
                }
            }
            op => tracing::debug!(op, "window manipulation unsupported, ignored"),
        }
    }

    fn graphics_attributes(&mut self, seq: &Sequence) {
        let item = seq.param_or(0, 0);
        let action = seq.param_or(1, 0);
        match (item, action) {
            // Color registers: read / read-limit.
            (1, 1) | (1, 2) => self.reply(b"\x1b[?1;0;256S".to_vec()),
            // Sixel geometry: read / read-limit.
            (2, 1) | (2, 2) => {
                let (w, h) = self.settings.max_image_size;
                self.reply(format!("\x1b[?2;0;{w};{h}S"));
            }
            (item, _) => self.reply(format!("\x1b[?{item};3;0S")),
        }
    }

    fn report_status_string(&mut self, seq: &Sequence) {
        let query = seq.payload_str().to_string();
        let screen = self.active_screen();
        let setting = match query.as_str() {
            "m" => Some(format!("{}m", sgr_parameters(&screen.cursor.pen))),
            "\"p" => {
                let level = match self.settings.terminal_id {
                    VtType::VT100 => 61,
                    VtType::VT220 | VtType::VT240 => 62,
                    VtType::VT320 | VtType::VT330 | VtType::VT340 => 63,
                    VtType::VT420 => 64,
                    _ => 65,
                };
                Some(format!("{level};1\"p"))
            }
            " q" => {
                let style = match (screen.cursor.shape, screen.cursor.display) {
                    (CursorShape::Block, CursorDisplay::Blink) => 1,
                    (CursorShape::Block, CursorDisplay::Steady) => 2,
                    (CursorShape::Underline, CursorDisplay::Blink) => 3,
                    (CursorShape::Underline, CursorDisplay::Steady) => 4,
                    (CursorShape::Bar, CursorDisplay::Blink) => 5,
                    (CursorShape::Bar, CursorDisplay::Steady) => 6,
                };
                Some(format!("{style} q"))
            }
            "r" => {
                let margins = screen.margins();
                Some(format!("{};{}r", margins.top + 1, margins.bottom + 1))
            }
            "s" => {
                let margins = screen.margins();
                Some(format!("{};{}s", margins.left + 1, margins.right + 1))
            }
            _ => None,
        };
        match setting {
            Some(setting) => self.reply(format!("\x1bP1$r{setting}\x1b\\")),
            None => {
                tracing::debug!(query, "DECRQSS unknown setting");
                self.reply(b"\x1bP0$r\x1b\\");
            }
        }
    }

    fn handle_sixel(&mut self, seq: &Sequence) {
        let Some(rasterizer) = self.sixel_rasterizer.clone() else {
            tracing::debug!("sixel data received without a rasterizer, ignored");
            return;
        };
        let Some(decoded) = rasterizer.rasterize(&seq.payload) else {
            tracing::info!("sixel payload failed to rasterize, ignored");
            return;
        };
        let (cell_w, cell_h) = self.settings.cell_pixels;
        match self.images.rasterize(decoded, cell_w, cell_h) {
            Some(rasterized) => self.place_image(rasterized),
            None => {
                // Too large: rejected with the cursor untouched.
            }
        }
    }

    fn handle_xtgettcap(&mut self, seq: &Sequence) {
        let raw = seq.payload_str().to_string();
        if raw.trim().is_empty() {
            self.reply(b"\x1bP0+r\x1b\\");
            return;
        }
        let mut pairs: Vec<String> = Vec::new();
        for item in raw.split(';') {
            if item.is_empty() {
                continue;
            }
            let Some(name) = decode_hex_ascii(item) else {
                self.reply(b"\x1bP0+r\x1b\\");
                return;
            };
            let Some(value) = self.tcap_value(&name) else {
                self.reply(b"\x1bP0+r\x1b\\");
                return;
            };
            pairs.push(format!(
                "{}={}",
                encode_hex_ascii(&name),
                encode_hex_ascii(&value)
            ));
        }
        if pairs.is_empty() {
            self.reply(b"\x1bP0+r\x1b\\");
        } else {
            self.reply(format!("\x1bP1+r{}\x1b\\", pairs.join(";")));
        }
    }

    /// Capability values needed by tmux and modern TUIs.
    fn tcap_value(&self, name: &str) -> Option<String> {
        match name {
            "TN" | "name" => Some(self.settings.term_name.clone()),
            "Co" | "colors" => Some("256".to_string()),
            "RGB" | "Tc" => Some("8".to_string()),
            "Ms" => Some("\x1b]52;%p1%s;%p2%s\x07".to_string()),
            "Ss" => Some("\x1b[%p1%d q".to_string()),
            "Se" => Some("\x1b[2 q".to_string()),
            "kcuu1" => Some("\x1bOA".to_string()),
            "kcud1" => Some("\x1bOB".to_string()),
            "kcuf1" => Some("\x1bOC".to_string()),
            "kcub1" => Some("\x1bOD".to_string()),
            _ => None,
        }
    }

    fn handle_osc_color_palette(&mut self, seq: &Sequence) {
        let payload = seq.payload_str().to_string();
        let mut parts = payload.split(';');
        while let (Some(index), Some(spec)) = (parts.next(), parts.next()) {
            let Ok(index) = index.parse::<u8>() else {
                tracing::debug!("OSC 4 with non-numeric index, ignored");
                continue;
            };
            if spec == "?" {
                let color = self.palette.indexed(index);
                self.reply(format!("\x1b]4;{index};{}\x1b\\", color.to_x11_spec()));
            } else if let Some(color) = parse_color_spec(spec) {
                self.palette.set_indexed(index, color);
                self.dirty = true;
            } else {
                tracing::debug!(spec, "OSC 4 with unparsable color, ignored");
            }
        }
    }

    fn handle_osc_reset_palette(&mut self, seq: &Sequence) {
        let payload = seq.payload_str().to_string();
        if payload.is_empty() {
            for index in 0..=u8::MAX {
                self.palette.reset_indexed(index);
            }
        } else {
            for part in payload.split(';') {
                if let Ok(index) = part.parse::<u8>() {
                    self.palette.reset_indexed(index);
                }
            }
        }
        self.dirty = true;
    }

    fn handle_osc_dynamic_color(&mut self, seq: &Sequence, code: u16, role: ColorRole) {
        let payload = seq.payload_str().to_string();
        if payload == "?" {
            let color = self.palette.role(role);
            self.reply(format!("\x1b]{code};{}\x1b\\", color.to_x11_spec()));
        } else if let Some(color) = parse_color_spec(&payload) {
            self.palette.set_role(role, color);
            self.dirty = true;
        } else {
            tracing::debug!(code, payload, "dynamic color OSC unparsable, ignored");
        }
    }

    fn reset_dynamic_color(&mut self, role: ColorRole) {
        self.palette.reset_role(role);
        self.dirty = true;
    }

    fn handle_osc_hyperlink(&mut self, seq: &Sequence) {
        let payload = seq.payload_str().to_string();
        let (params, uri) = payload.split_once(';').unwrap_or((payload.as_str(), ""));
        if uri.is_empty() {
            self.target_screen_mut().cursor.pen.hyperlink = None;
            self.hyperlinks.prune();
            return;
        }
        let id = params.split(':').find_map(|kv| {
            kv.strip_prefix("id=")
                .filter(|id| !id.is_empty())
        });
        let link = self.hyperlinks.resolve(id, uri);
        self.target_screen_mut().cursor.pen.hyperlink = Some(link);
    }

    fn handle_osc_clipboard(&mut self, seq: &Sequence) {
        let payload = seq.payload_str().to_string();
        let Some((target, data)) = payload.split_once(';') else {
            return;
        };
        if !matches!(target, "" | "c" | "p" | "s") {
            tracing::debug!(target, "OSC 52 unknown clipboard target, ignored");
            return;
        }
        if data == "?" {
            // Clipboard reading is host-configured and off by default.
            if !self.settings.allow_clipboard_read {
                tracing::debug!("OSC 52 read request ignored");
            }
            return;
        }
        match BASE64_STANDARD.decode(data.as_bytes()) {
            Ok(decoded) => {
                let text = String::from_utf8_lossy(&decoded).to_string();
                self.emit(PendingEvent::CopyToClipboard(text));
            }
            Err(_) => tracing::debug!("OSC 52 with invalid base64, ignored"),
        }
    }

    fn handle_osc_notify(&mut self, seq: &Sequence) {
        let payload = seq.payload_str().to_string();
        let mut parts = payload.splitn(3, ';');
        if parts.next() != Some("notify") {
            return;
        }
        let title = parts.next().unwrap_or("").to_string();
        let body = parts.next().unwrap_or("").to_string();
        self.emit(PendingEvent::Notify { title, body });
    }
}

/// Both extended-color grammars: `38:2:[cs]:R:G:B` / `38:5:P` with colons,
/// and the legacy `38;2;R;G;B` / `38;5;P` with semicolons (which consumes
/// following parameters; `i` is advanced accordingly).
fn extended_color(seq: &Sequence, i: &mut usize) -> Option<Color> {
    let sub = seq.params.subparams(*i);
    if sub.len() > 1 {
        match sub.get(1).copied() {
            Some(5) => sub.get(2).map(|&p| Color::Indexed(p as u8)),
            Some(2) => {
                // With 6 entries the third is a color-space id; skip it.
                let rgb = if sub.len() >= 6 { &sub[3..6] } else { sub.get(2..5)? };
                Some(Color::Rgb(rgb[0] as u8, rgb[1] as u8, rgb[2] as u8))
            }
            _ => None,
        }
    } else {
        match seq.param_opt(*i + 1) {
            Some(5) => {
                let color = seq.param_opt(*i + 2).map(|p| Color::Indexed(p as u8));
                if color.is_some() {
                    *i += 2;
                }
                color
            }
            Some(2) => {
                let r = seq.param_opt(*i + 2)?;
                let g = seq.param_opt(*i + 3)?;
                let b = seq.param_opt(*i + 4)?;
                *i += 4;
                Some(Color::Rgb(r as u8, g as u8, b as u8))
            }
            _ => None,
        }
    }
}

/// Rebuild the SGR parameter string for DECRQSS.
fn sgr_parameters(pen: &crate::cell::Pen) -> String {
    let mut parts = vec!["0".to_string()];
    let flags = [
        (CellAttrs::BOLD, "1"),
        (CellAttrs::FAINT, "2"),
        (CellAttrs::ITALIC, "3"),
        (CellAttrs::BLINK_SLOW, "5"),
        (CellAttrs::BLINK_RAPID, "6"),
        (CellAttrs::INVERSE, "7"),
        (CellAttrs::HIDDEN, "8"),
        (CellAttrs::CROSSED_OUT, "9"),
        (CellAttrs::FRAMED, "51"),
        (CellAttrs::OVERLINED, "53"),
    ];
    for (flag, code) in flags {
        if pen.attrs.contains(flag) {
            parts.push(code.to_string());
        }
    }
    match pen.underline {
        UnderlineStyle::None => {}
        UnderlineStyle::Single => parts.push("4".to_string()),
        UnderlineStyle::Double => parts.push("4:2".to_string()),
        UnderlineStyle::Curly => parts.push("4:3".to_string()),
        UnderlineStyle::Dotted => parts.push("4:4".to_string()),
        UnderlineStyle::Dashed => parts.push("4:5".to_string()),
    }
    match pen.fg {
        Color::Default => {}
        Color::Indexed(i) if i < 8 => parts.push(format!("{}", 30 + i)),
        Color::Indexed(i) if i < 16 => parts.push(format!("{}", 90 + i - 8)),
        Color::Indexed(i) => parts.push(format!("38;5;{i}")),
        Color::Rgb(r, g, b) => parts.push(format!("38;2;{r};{g};{b}")),
    }
    match pen.bg {
        Color::Default => {}
        Color::Indexed(i) if i < 8 => parts.push(format!("{}", 40 + i)),
        Color::Indexed(i) if i < 16 => parts.push(format!("{}", 100 + i - 8)),
        Color::Indexed(i) => parts.push(format!("48;5;{i}")),
        Color::Rgb(r, g, b) => parts.push(format!("48;2;{r};{g};{b}")),
    }
    parts.join(";")
}

/// `rgb:RR/GG/BB` and `#RRGGBB` color specifications.
fn parse_color_spec(spec: &str) -> Option<RgbColor> {
    if let Some(hex) = spec.strip_prefix('#') {
        if hex.len() == 6 {
            let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
            let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
            let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
            return Some(RgbColor::new(r, g, b));
        }
        return None;
    }
    RgbColor::parse_x11_spec(spec)
}

fn decode_hex_ascii(input: &str) -> Option<String> {
    if input.len() % 2 != 0 {
        return None;
    }
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(input.len() / 2);
    let mut i = 0;
    while i + 1 < bytes.len() {
        let pair = std::str::from_utf8(&bytes[i..i + 2]).ok()?;
        out.push(u8::from_str_radix(pair, 16).ok()?);
        i += 2;
    }
    String::from_utf8(out).ok()
}

fn encode_hex_ascii(input: &str) -> String {
    input.bytes().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::screen::ScreenType;
    use crate::sequence::SequenceBuilder;
    use crate::state::EmulatorSettings;

    fn feed(state: &mut EmulatorState, builder: &mut SequenceBuilder, bytes: &[u8]) {
        let mut parser = Parser::new();
        let mut bound = builder.bind(state);
        parser.advance(&mut bound, bytes);
        bound.finish();
    }

    fn emulator() -> (EmulatorState, SequenceBuilder) {
        let state = EmulatorState::new(EmulatorSettings::default(), None);
        let builder = SequenceBuilder::new(state.terminal_id());
        (state, builder)
    }

    fn cell_text(state: &EmulatorState, line: i32, column: i32) -> String {
        state.active_screen().grid().at(line, column).text()
    }

    #[test]
    fn cursor_positioning_then_write() {
        let (mut state, mut builder) = emulator();
        feed(&mut state, &mut builder, b"\x1b[5;7HX");
        assert_eq!(cell_text(&state, 4, 6), "X");
        let cursor = state.active_screen().cursor.position;
        assert_eq!((cursor.line, cursor.column), (4, 7));
        assert!(!state.active_screen().cursor.wrap_pending);
    }

    #[test]
    fn sgr_colors_and_reset() {
        let (mut state, mut builder) = emulator();
        feed(&mut state, &mut builder, b"\x1b[1;31mX\x1b[0mY");
        let x = state.active_screen().grid().at(0, 0);
        assert_eq!(x.fg, Color::Indexed(1));
        assert!(x.attrs.contains(CellAttrs::BOLD));
        let y = state.active_screen().grid().at(0, 1);
        assert_eq!(y.fg, Color::Default);
        assert!(y.attrs.is_empty());
    }

    #[test]
    fn sgr_extended_colors_both_grammars() {
        let (mut state, mut builder) = emulator();
        feed(&mut state, &mut builder, b"\x1b[38;2;128;64;32m");
        assert_eq!(
            state.active_screen().cursor.pen.fg,
            Color::Rgb(128, 64, 32)
        );
        feed(&mut state, &mut builder, b"\x1b[38:5:196m");
        assert_eq!(state.active_screen().cursor.pen.fg, Color::Indexed(196));
        feed(&mut state, &mut builder, b"\x1b[48;5;17m");
        assert_eq!(state.active_screen().cursor.pen.bg, Color::Indexed(17));
    }

    #[test]
    fn sgr_underline_variants() {
        let (mut state, mut builder) = emulator();
        feed(&mut state, &mut builder, b"\x1b[4:3m");
        assert_eq!(
            state.active_screen().cursor.pen.underline,
            UnderlineStyle::Curly
        );
        feed(&mut state, &mut builder, b"\x1b[24m");
        assert_eq!(
            state.active_screen().cursor.pen.underline,
            UnderlineStyle::None
        );
    }

    #[test]
    fn decrqm_reports_mode_states() {
        let (mut state, mut builder) = emulator();
        feed(&mut state, &mut builder, b"\x1b[?7$p");
        assert_eq!(state.take_replies(), b"\x1b[?7;1$y");

        state.modes.freeze(DecMode::AutoWrap, true);
        feed(&mut state, &mut builder, b"\x1b[?7$p");
        assert_eq!(state.take_replies(), b"\x1b[?7;3$y");

        feed(&mut state, &mut builder, b"\x1b[?9999$p");
        assert_eq!(state.take_replies(), b"\x1b[?9999;0$y");

        // Recognised but never set reports Reset.
        feed(&mut state, &mut builder, b"\x1b[?2004$p");
        assert_eq!(state.take_replies(), b"\x1b[?2004;2$y");
    }

    #[test]
    fn frozen_mode_changes_are_ignored() {
        let (mut state, mut builder) = emulator();
        state.modes.freeze(DecMode::AutoWrap, true);
        feed(&mut state, &mut builder, b"\x1b[?7l");
        assert!(state.modes.enabled(DecMode::AutoWrap));
    }

    #[test]
    fn alternate_screen_round_trip_restores_primary() {
        let (mut state, mut builder) = emulator();
        feed(&mut state, &mut builder, b"P");
        feed(&mut state, &mut builder, b"\x1b[?1049h");
        assert_eq!(state.screen_type(), ScreenType::Alternate);
        feed(&mut state, &mut builder, b"hello");
        assert_eq!(cell_text(&state, 0, 0), "h");
        feed(&mut state, &mut builder, b"\x1b[?1049l");
        assert_eq!(state.screen_type(), ScreenType::Primary);
        assert_eq!(cell_text(&state, 0, 0), "P");
        // Cursor restored to the position saved at 1049h (after "P").
        assert_eq!(state.active_screen().cursor.position.column, 1);
    }

    #[test]
    fn device_status_reports() {
        let (mut state, mut builder) = emulator();
        feed(&mut state, &mut builder, b"\x1b[5n");
        assert_eq!(state.take_replies(), b"\x1b[0n");

        feed(&mut state, &mut builder, b"\x1b[3;4H\x1b[6n");
        assert_eq!(state.take_replies(), b"\x1b[3;4R");

        feed(&mut state, &mut builder, b"\x1b[?6n");
        assert_eq!(state.take_replies(), b"\x1b[3;4;1R");
    }

    #[test]
    fn device_attributes() {
        let (mut state, mut builder) = emulator();
        feed(&mut state, &mut builder, b"\x1b[c");
        assert_eq!(state.take_replies(), b"\x1b[?65;1;4;8;22;29c");

        feed(&mut state, &mut builder, b"\x1b[>c");
        assert_eq!(state.take_replies(), b"\x1b[>525;100;0c");
    }

    #[test]
    fn decrqss_round_trips_settings() {
        let (mut state, mut builder) = emulator();
        feed(&mut state, &mut builder, b"\x1b[3;10r");
        feed(&mut state, &mut builder, b"\x1bP$qr\x1b\\");
        assert_eq!(state.take_replies(), b"\x1bP1$r3;10r\x1b\\");

        feed(&mut state, &mut builder, b"\x1bP$qx\x1b\\");
        assert_eq!(state.take_replies(), b"\x1bP0$r\x1b\\");
    }

    #[test]
    fn xtgettcap_known_and_unknown() {
        let (mut state, mut builder) = emulator();
        // "TN" hex-encoded.
        feed(&mut state, &mut builder, b"\x1bP+q544e\x1b\\");
        let reply = state.take_replies();
        let reply = String::from_utf8_lossy(&reply).to_string();
        assert!(reply.starts_with("\x1bP1+r"));
        assert!(reply.contains("544e=787465726d2d323536636f6c6f72"));

        // Unknown capability fails the whole query.
        feed(&mut state, &mut builder, b"\x1bP+q5858\x1b\\");
        assert_eq!(state.take_replies(), b"\x1bP0+r\x1b\\");
    }

    #[test]
    fn osc_hyperlink_pen_applies_and_clears() {
        let (mut state, mut builder) = emulator();
        feed(
            &mut state,
            &mut builder,
            b"\x1b]8;id=foo;https://e\x1b\\A\x1b]8;;\x1b\\B",
        );
        let a = state.active_screen().grid().at(0, 0);
        let link = a.hyperlink.as_ref().expect("A carries the hyperlink");
        assert_eq!(link.uri, "https://e");
        assert_eq!(link.id.as_deref(), Some("foo"));
        let b = state.active_screen().grid().at(0, 1);
        assert!(b.hyperlink.is_none());
    }

    #[test]
    fn hyperlink_released_when_cells_overwritten() {
        let (mut state, mut builder) = emulator();
        feed(&mut state, &mut builder, b"\x1b]8;id=gc;https://x\x1b\\A\x1b]8;;\x1b\\");
        assert_eq!(state.hyperlinks.live_count(), 1);
        // Overwrite the only cell holding the link.
        feed(&mut state, &mut builder, b"\x1b[1;1HZ");
        state.hyperlinks.prune();
        assert_eq!(state.hyperlinks.live_count(), 0);
    }

    #[test]
    fn osc_52_copies_to_clipboard_event() {
        let (mut state, mut builder) = emulator();
        feed(&mut state, &mut builder, b"\x1b]52;c;aGVsbG8=\x07");
        let events = state.take_events();
        assert!(events.contains(&PendingEvent::CopyToClipboard("hello".to_string())));
    }

    #[test]
    fn osc_color_query_replies_with_current_value() {
        let (mut state, mut builder) = emulator();
        feed(&mut state, &mut builder, b"\x1b]4;1;?\x07");
        let reply = state.take_replies();
        let reply = String::from_utf8_lossy(&reply).to_string();
        assert!(reply.starts_with("\x1b]4;1;rgb:"));

        feed(&mut state, &mut builder, b"\x1b]4;1;#102030\x07");
        assert_eq!(state.palette.indexed(1), RgbColor::new(0x10, 0x20, 0x30));
    }

    #[test]
    fn window_title_and_tab_name_events() {
        let (mut state, mut builder) = emulator();
        feed(&mut state, &mut builder, b"\x1b]2;hello title\x07");
        assert_eq!(state.window_title(), "hello title");
        let events = state.take_events();
        assert!(events
            .contains(&PendingEvent::WindowTitleChanged("hello title".to_string())));
    }

    #[test]
    fn scroll_into_history_from_bottom() {
        let (mut state, mut builder) = emulator();
        // 3-line screen for the classic IND-at-bottom scenario.
        state.resize(PageSize::new(3, 4));
        feed(&mut state, &mut builder, b"AAAA\r\nBBBB\r\nCCCC");
        feed(&mut state, &mut builder, b"\x1b[3;1H\n");
        let grid = state.active_screen().grid();
        assert_eq!(grid.history_line_count(), 1);
        assert_eq!(grid.line_at(-1).text_trimmed(), "AAAA");
        assert_eq!(grid.line_at(0).text_trimmed(), "BBBB");
        assert_eq!(grid.line_at(1).text_trimmed(), "CCCC");
        assert_eq!(grid.line_at(2).text_trimmed(), "");
        let cursor = state.active_screen().cursor.position;
        assert_eq!((cursor.line, cursor.column), (2, 0));
    }

    #[test]
    fn rep_repeats_last_cluster() {
        let (mut state, mut builder) = emulator();
        feed(&mut state, &mut builder, b"A\x1b[3b");
        let text: String = (0..4).map(|i| cell_text(&state, 0, i)).collect();
        assert_eq!(text, "AAAA");
    }

    #[test]
    fn decaln_fills_screen() {
        let (mut state, mut builder) = emulator();
        state.resize(PageSize::new(2, 3));
        feed(&mut state, &mut builder, b"\x1b#8");
        assert_eq!(
            state.active_screen().grid().line_at(0).text_trimmed(),
            "EEE"
        );
    }

    #[test]
    fn mode_132_columns_requires_permission() {
        let (mut state, mut builder) = emulator();
        feed(&mut state, &mut builder, b"\x1b[?3h");
        assert!(state.take_events().is_empty());

        feed(&mut state, &mut builder, b"\x1b[?40h\x1b[?3h");
        let events = state.take_events();
        assert!(events
            .contains(&PendingEvent::RequestResizeCells(PageSize::new(24, 132))));
    }

    #[test]
    fn status_display_switching_writes_to_status_line() {
        let (mut state, mut builder) = emulator();
        // DECSSDT 2 (host-writable), DECSASD 1 (status line active).
        feed(&mut state, &mut builder, b"\x1b[2$~\x1b[1$}status!\x1b[0$}");
        assert_eq!(state.page_size().lines, 23);
        assert_eq!(
            state.host_writable_status.grid().line_at(0).text_trimmed(),
            "status!"
        );
        // Main display writes go back to the primary screen.
        feed(&mut state, &mut builder, b"main");
        assert_eq!(cell_text(&state, 0, 0), "m");
    }
}
