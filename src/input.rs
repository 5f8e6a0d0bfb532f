//! The input generator: serialises key, mouse, focus and paste events into
//! the byte sequences the child expects, honouring the terminal's input
//! modes. Bytes accumulate in the generator's own buffer; the terminal
//! façade flushes them to the PTY in one write per flush.

use bitflags::bitflags;

use crate::modes::{AnsiMode, DecMode, ModeStore};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Modifiers: u8 {
        const SHIFT   = 1 << 0;
        const ALT     = 1 << 1;
        const CONTROL = 1 << 2;
        const META    = 1 << 3;
    }
}

impl Modifiers {
    /// The `1 + bitmap` encoding xterm appends to CSI parameters.
    fn xterm_parameter(self) -> u8 {
        let mut value = 1;
        if self.contains(Modifiers::SHIFT) {
            value += 1;
        }
        if self.contains(Modifiers::ALT) {
            value += 2;
        }
        if self.contains(Modifiers::CONTROL) {
            value += 4;
        }
        if self.contains(Modifiers::META) {
            value += 8;
        }
        value
    }
}

/// Non-character keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Up,
    Down,
    Right,
    Left,
    Home,
    End,
    PageUp,
    PageDown,
    Insert,
    Delete,
    Backspace,
    Tab,
    Enter,
    Escape,
    F(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEventKind {
    Press,
    Repeat,
    Release,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
    WheelUp,
    WheelDown,
}

impl MouseButton {
    fn code(self) -> u8 {
        match self {
            MouseButton::Left => 0,
            MouseButton::Middle => 1,
            MouseButton::Right => 2,
            MouseButton::WheelUp => 64,
            MouseButton::WheelDown => 65,
        }
    }
}

/// Cell plus optional pixel position of a pointer event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MousePosition {
    pub line: u16,
    pub column: u16,
    pub pixel_x: u16,
    pub pixel_y: u16,
}

#[derive(Debug, Default)]
pub struct InputGenerator {
    buffer: Vec<u8>,
    /// Button held during motion, for button-tracking mode.
    active_button: Option<MouseButton>,
}

impl InputGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain everything generated since the last flush.
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Encode a special key. Returns false when the event produced no
    /// bytes (e.g. release events).
    pub fn key(
        &mut self,
        key: Key,
        modifiers: Modifiers,
        kind: KeyEventKind,
        modes: &ModeStore,
        application_keypad: bool,
    ) -> bool {
        if kind == KeyEventKind::Release {
            return false;
        }
        if modes.ansi_enabled(AnsiMode::KeyboardAction) {
            return false;
        }
        let _ = application_keypad;
        let application = modes.enabled(DecMode::UseApplicationCursorKeys);
        let parameter = modifiers.xterm_parameter();

        match key {
            Key::Up | Key::Down | Key::Right | Key::Left | Key::Home | Key::End => {
                let letter = match key {
                    Key::Up => b'A',
                    Key::Down => b'B',
                    Key::Right => b'C',
                    Key::Left => b'D',
                    Key::Home => b'H',
                    Key::End => b'F',
                    _ => unreachable!(),
                };
                if parameter > 1 {
                    self.push(format!("\x1b[1;{parameter}{}", letter as char).as_bytes());
                } else if application {
                    self.push(&[0x1b, b'O', letter]);
                } else {
                    self.push(&[0x1b, b'[', letter]);
                }
            }
            Key::Insert | Key::Delete | Key::PageUp | Key::PageDown => {
                let number = match key {
                    Key::Insert => 2,
                    Key::Delete => 3,
                    Key::PageUp => 5,
                    Key::PageDown => 6,
                    _ => unreachable!(),
                };
                if parameter > 1 {
                    self.push(format!("\x1b[{number};{parameter}~").as_bytes());
                } else {
                    self.push(format!("\x1b[{number}~").as_bytes());
                }
            }
            Key::F(n @ 1..=4) => {
                let letter = [b'P', b'Q', b'R', b'S'][n as usize - 1];
                if parameter > 1 {
                    self.push(format!("\x1b[1;{parameter}{}", letter as char).as_bytes());
                } else {
                    self.push(&[0x1b, b'O', letter]);
                }
            }
            Key::F(n @ 5..=12) => {
                let number = match n {
                    5 => 15,
                    6 => 17,
                    7 => 18,
                    8 => 19,
                    9 => 20,
                    10 => 21,
                    11 => 23,
                    _ => 24,
                };
                if parameter > 1 {
                    self.push(format!("\x1b[{number};{parameter}~").as_bytes());
                } else {
                    self.push(format!("\x1b[{number}~").as_bytes());
                }
            }
            Key::F(_) => return false,
            Key::Backspace => {
                if modifiers.contains(Modifiers::CONTROL) {
                    self.push(&[0x08]);
                } else {
                    self.push(&[0x7f]);
                }
            }
            Key::Tab => {
                if modifiers.contains(Modifiers::SHIFT) {
                    self.push(b"\x1b[Z");
                } else {
                    self.push(b"\t");
                }
            }
            Key::Enter => self.push(b"\r"),
            Key::Escape => self.push(b"\x1b"),
        }
        true
    }

    /// Encode a character key, applying control/alt transformations.
    pub fn character(
        &mut self,
        c: char,
        modifiers: Modifiers,
        kind: KeyEventKind,
        modes: &ModeStore,
    ) -> bool {
        if kind == KeyEventKind::Release {
            return false;
        }
        if modes.ansi_enabled(AnsiMode::KeyboardAction) {
            return false;
        }
        if modifiers.contains(Modifiers::ALT) {
            self.push(&[0x1b]);
        }
        if modifiers.contains(Modifiers::CONTROL) {
            let byte = match c {
                'a'..='z' => Some(c as u8 - b'a' + 1),
                'A'..='Z' => Some(c as u8 - b'A' + 1),
                ' ' | '@' => Some(0x00),
                '[' => Some(0x1b),
                '\\' => Some(0x1c),
                ']' => Some(0x1d),
                '^' => Some(0x1e),
                '_' => Some(0x1f),
                _ => None,
            };
            if let Some(byte) = byte {
                self.push(&[byte]);
                return true;
            }
        }
        let mut utf8 = [0u8; 4];
        self.push(c.encode_utf8(&mut utf8).as_bytes());
        true
    }

    pub fn mouse_press(
        &mut self,
        button: MouseButton,
        modifiers: Modifiers,
        position: MousePosition,
        modes: &ModeStore,
    ) -> bool {
        if !mouse_reporting_enabled(modes) {
            return false;
        }
        self.active_button = Some(button);
        self.encode_mouse(button.code(), modifiers, position, false, modes);
        true
    }

    pub fn mouse_release(
        &mut self,
        button: MouseButton,
        modifiers: Modifiers,
        position: MousePosition,
        modes: &ModeStore,
    ) -> bool {
        self.active_button = None;
        if !mouse_reporting_enabled(modes) || modes.enabled(DecMode::MouseProtocolX10) {
            return false;
        }
        self.encode_mouse(button.code(), modifiers, position, true, modes);
        true
    }

    pub fn mouse_move(
        &mut self,
        modifiers: Modifiers,
        position: MousePosition,
        modes: &ModeStore,
    ) -> bool {
        let any_motion = modes.enabled(DecMode::MouseProtocolAnyEventTracking);
        let button_motion = modes.enabled(DecMode::MouseProtocolButtonTracking);
        let button = match (any_motion, button_motion, self.active_button) {
            (true, _, held) => held,
            (false, true, Some(held)) => Some(held),
            _ => return false,
        };
        // Motion events add 32 to the button code; no button is code 3.
        let code = button.map(MouseButton::code).unwrap_or(3) + 32;
        self.encode_mouse(code, modifiers, position, false, modes);
        true
    }

    fn encode_mouse(
        &mut self,
        code: u8,
        modifiers: Modifiers,
        position: MousePosition,
        release: bool,
        modes: &ModeStore,
    ) {
        let mut code = code;
        if modifiers.contains(Modifiers::SHIFT) {
            code += 4;
        }
        if modifiers.contains(Modifiers::ALT) {
            code += 8;
        }
        if modifiers.contains(Modifiers::CONTROL) {
            code += 16;
        }

        let column = position.column + 1;
        let line = position.line + 1;

        if modes.enabled(DecMode::MouseSgrPixels) {
            let suffix = if release { 'm' } else { 'M' };
            self.push(
                format!(
                    "\x1b[<{code};{};{}{suffix}",
                    position.pixel_x + 1,
                    position.pixel_y + 1
                )
                .as_bytes(),
            );
        } else if modes.enabled(DecMode::MouseSgr) {
            let suffix = if release { 'm' } else { 'M' };
            self.push(format!("\x1b[<{code};{column};{line}{suffix}").as_bytes());
        } else if modes.enabled(DecMode::MouseUrxvt) {
            let code = if release { 3 + 32 } else { code + 32 };
            self.push(format!("\x1b[{code};{column};{line}M").as_bytes());
        } else {
            // Legacy X10 byte encoding, clamped to its 223-cell range.
            let code = if release { 3 + 32 } else { code + 32 };
            let clamp = |v: u16| (v.min(223) as u8).saturating_add(32);
            self.push(&[0x1b, b'[', b'M', code, clamp(column), clamp(line)]);
        }
    }

    /// FocusTracking reports focus changes as CSI I / CSI O.
    pub fn focus_change(&mut self, focused: bool, modes: &ModeStore) -> bool {
        if !modes.enabled(DecMode::FocusTracking) {
            return false;
        }
        self.push(if focused { b"\x1b[I" } else { b"\x1b[O" });
        true
    }

    /// Paste, bracketed when the application asked for it. Any bracket
    /// terminator embedded in the text is stripped so the paste cannot
    /// escape the bracket.
    pub fn paste(&mut self, text: &str, modes: &ModeStore) {
        if modes.enabled(DecMode::BracketedPaste) {
            let sanitized = text.replace("\x1b[201~", "");
            self.push(b"\x1b[200~");
            self.push(sanitized.as_bytes());
            self.push(b"\x1b[201~");
        } else {
            self.push(text.as_bytes());
        }
    }

    pub fn raw(&mut self, bytes: &[u8]) {
        self.push(bytes);
    }
}

fn mouse_reporting_enabled(modes: &ModeStore) -> bool {
    modes.enabled(DecMode::MouseProtocolX10)
        || modes.enabled(DecMode::MouseProtocolNormalTracking)
        || modes.enabled(DecMode::MouseProtocolButtonTracking)
        || modes.enabled(DecMode::MouseProtocolAnyEventTracking)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn modes() -> ModeStore {
        ModeStore::with_defaults()
    }

    fn position(line: u16, column: u16) -> MousePosition {
        MousePosition {
            line,
            column,
            pixel_x: column * 8,
            pixel_y: line * 16,
        }
    }

    #[test]
    fn cursor_keys_follow_application_mode() {
        let mut generator = InputGenerator::new();
        let mut modes = modes();
        generator.key(
            Key::Up,
            Modifiers::empty(),
            KeyEventKind::Press,
            &modes,
            false,
        );
        assert_eq!(generator.take(), b"\x1b[A");

        modes.set(DecMode::UseApplicationCursorKeys, true);
        generator.key(
            Key::Up,
            Modifiers::empty(),
            KeyEventKind::Press,
            &modes,
            false,
        );
        assert_eq!(generator.take(), b"\x1bOA");
    }

    #[test]
    fn modified_keys_use_xterm_parameters() {
        let mut generator = InputGenerator::new();
        let modes = modes();
        generator.key(
            Key::Right,
            Modifiers::CONTROL,
            KeyEventKind::Press,
            &modes,
            false,
        );
        assert_eq!(generator.take(), b"\x1b[1;5C");

        generator.key(
            Key::Delete,
            Modifiers::SHIFT,
            KeyEventKind::Press,
            &modes,
            false,
        );
        assert_eq!(generator.take(), b"\x1b[3;2~");
    }

    #[test]
    fn control_characters_map_to_c0() {
        let mut generator = InputGenerator::new();
        let modes = modes();
        generator.character('c', Modifiers::CONTROL, KeyEventKind::Press, &modes);
        assert_eq!(generator.take(), vec![0x03]);

        generator.character('x', Modifiers::ALT, KeyEventKind::Press, &modes);
        assert_eq!(generator.take(), b"\x1bx");
    }

    #[test]
    fn release_events_produce_nothing() {
        let mut generator = InputGenerator::new();
        let modes = modes();
        assert!(!generator.character('a', Modifiers::empty(), KeyEventKind::Release, &modes));
        assert!(generator.is_empty());
    }

    #[test]
    fn sgr_mouse_reports_press_and_release() {
        let mut generator = InputGenerator::new();
        let mut modes = modes();
        // No reporting without a protocol enabled.
        assert!(!generator.mouse_press(
            MouseButton::Left,
            Modifiers::empty(),
            position(4, 9),
            &modes
        ));

        modes.set(DecMode::MouseProtocolNormalTracking, true);
        modes.set(DecMode::MouseSgr, true);
        generator.mouse_press(
            MouseButton::Left,
            Modifiers::empty(),
            position(4, 9),
            &modes,
        );
        assert_eq!(generator.take(), b"\x1b[<0;10;5M");
        generator.mouse_release(
            MouseButton::Left,
            Modifiers::empty(),
            position(4, 9),
            &modes,
        );
        assert_eq!(generator.take(), b"\x1b[<0;10;5m");
    }

    #[test]
    fn motion_requires_tracking_mode() {
        let mut generator = InputGenerator::new();
        let mut modes = modes();
        modes.set(DecMode::MouseProtocolNormalTracking, true);
        modes.set(DecMode::MouseSgr, true);
        assert!(!generator.mouse_move(Modifiers::empty(), position(1, 1), &modes));

        modes.set(DecMode::MouseProtocolButtonTracking, true);
        generator.mouse_press(
            MouseButton::Left,
            Modifiers::empty(),
            position(1, 1),
            &modes,
        );
        generator.take();
        assert!(generator.mouse_move(Modifiers::empty(), position(1, 2), &modes));
        assert_eq!(generator.take(), b"\x1b[<32;3;2M");
    }

    #[test]
    fn bracketed_paste_wraps_and_sanitizes() {
        let mut generator = InputGenerator::new();
        let mut modes = modes();
        generator.paste("hello", &modes);
        assert_eq!(generator.take(), b"hello");

        modes.set(DecMode::BracketedPaste, true);
        generator.paste("a\x1b[201~b", &modes);
        assert_eq!(generator.take(), b"\x1b[200~ab\x1b[201~");
    }

    #[test]
    fn focus_reports_follow_mode() {
        let mut generator = InputGenerator::new();
        let mut modes = modes();
        assert!(!generator.focus_change(true, &modes));
        modes.set(DecMode::FocusTracking, true);
        generator.focus_change(true, &modes);
        generator.focus_change(false, &modes);
        assert_eq!(generator.take(), b"\x1b[I\x1b[O");
    }
}
