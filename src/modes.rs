use std::collections::HashMap;

/// ANSI (non-private) modes settable via SM/RM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnsiMode {
    KeyboardAction,
    Insert,
    SendReceive,
    AutomaticNewline,
}

impl AnsiMode {
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            2 => Some(AnsiMode::KeyboardAction),
            4 => Some(AnsiMode::Insert),
            12 => Some(AnsiMode::SendReceive),
            20 => Some(AnsiMode::AutomaticNewline),
            _ => None,
        }
    }

    pub fn code(self) -> u16 {
        match self {
            AnsiMode::KeyboardAction => 2,
            AnsiMode::Insert => 4,
            AnsiMode::SendReceive => 12,
            AnsiMode::AutomaticNewline => 20,
        }
    }

    fn bit(self) -> u32 {
        match self {
            AnsiMode::KeyboardAction => 1 << 0,
            AnsiMode::Insert => 1 << 1,
            AnsiMode::SendReceive => 1 << 2,
            AnsiMode::AutomaticNewline => 1 << 3,
        }
    }
}

/// DEC private modes settable via DECSET/DECRST (`CSI ? Pm h/l`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecMode {
    UseApplicationCursorKeys,
    DesignateCharsetUsAscii,
    Columns132,
    SmoothScroll,
    ReverseVideo,
    Origin,
    AutoWrap,
    MouseProtocolX10,
    ShowToolbar,
    BlinkingCursor,
    PrinterExtend,
    VisibleCursor,
    ShowScrollbar,
    AllowColumns80to132,
    DebugLogging,
    UseAlternateScreen,
    LeftRightMargin,
    SixelScrolling,
    MouseProtocolNormalTracking,
    MouseProtocolHighlightTracking,
    MouseProtocolButtonTracking,
    MouseProtocolAnyEventTracking,
    FocusTracking,
    MouseExtended,
    MouseSgr,
    MouseAlternateScroll,
    MouseUrxvt,
    MouseSgrPixels,
    SaveCursor,
    ExtendedAltScreen,
    UsePrivateColorRegisters,
    BracketedPaste,
    BatchedRendering,
    TextReflow,
}

impl DecMode {
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(DecMode::UseApplicationCursorKeys),
            2 => Some(DecMode::DesignateCharsetUsAscii),
            3 => Some(DecMode::Columns132),
            4 => Some(DecMode::SmoothScroll),
            5 => Some(DecMode::ReverseVideo),
            6 => Some(DecMode::Origin),
            7 => Some(DecMode::AutoWrap),
            9 => Some(DecMode::MouseProtocolX10),
            10 => Some(DecMode::ShowToolbar),
            12 => Some(DecMode::BlinkingCursor),
            19 => Some(DecMode::PrinterExtend),
            25 => Some(DecMode::VisibleCursor),
            30 => Some(DecMode::ShowScrollbar),
            40 => Some(DecMode::AllowColumns80to132),
            46 => Some(DecMode::DebugLogging),
            47 | 1047 => Some(DecMode::UseAlternateScreen),
            69 => Some(DecMode::LeftRightMargin),
            80 => Some(DecMode::SixelScrolling),
            1000 => Some(DecMode::MouseProtocolNormalTracking),
            1001 => Some(DecMode::MouseProtocolHighlightTracking),
            1002 => Some(DecMode::MouseProtocolButtonTracking),
            1003 => Some(DecMode::MouseProtocolAnyEventTracking),
            1004 => Some(DecMode::FocusTracking),
            1005 => Some(DecMode::MouseExtended),
            1006 => Some(DecMode::MouseSgr),
            1007 => Some(DecMode::MouseAlternateScroll),
            1015 => Some(DecMode::MouseUrxvt),
            1016 => Some(DecMode::MouseSgrPixels),
            1048 => Some(DecMode::SaveCursor),
            1049 => Some(DecMode::ExtendedAltScreen),
            1070 => Some(DecMode::UsePrivateColorRegisters),
            2004 => Some(DecMode::BracketedPaste),
            2026 => Some(DecMode::BatchedRendering),
            2027 => Some(DecMode::TextReflow),
            _ => None,
        }
    }

    pub fn code(self) -> u16 {
        match self {
            DecMode::UseApplicationCursorKeys => 1,
            DecMode::DesignateCharsetUsAscii => 2,
            DecMode::Columns132 => 3,
            DecMode::SmoothScroll => 4,
            DecMode::ReverseVideo => 5,
            DecMode::Origin => 6,
            DecMode::AutoWrap => 7,
            DecMode::MouseProtocolX10 => 9,
            DecMode::ShowToolbar => 10,
            DecMode::BlinkingCursor => 12,
            DecMode::PrinterExtend => 19,
            DecMode::VisibleCursor => 25,
            DecMode::ShowScrollbar => 30,
            DecMode::AllowColumns80to132 => 40,
            DecMode::DebugLogging => 46,
            DecMode::UseAlternateScreen => 47,
            DecMode::LeftRightMargin => 69,
            DecMode::SixelScrolling => 80,
            DecMode::MouseProtocolNormalTracking => 1000,
            DecMode::MouseProtocolHighlightTracking => 1001,
            DecMode::MouseProtocolButtonTracking => 1002,
            DecMode::MouseProtocolAnyEventTracking => 1003,
            DecMode::FocusTracking => 1004,
            DecMode::MouseExtended => 1005,
            DecMode::MouseSgr => 1006,
            DecMode::MouseAlternateScroll => 1007,
            DecMode::MouseUrxvt => 1015,
            DecMode::MouseSgrPixels => 1016,
            DecMode::SaveCursor => 1048,
            DecMode::ExtendedAltScreen => 1049,
            DecMode::UsePrivateColorRegisters => 1070,
            DecMode::BracketedPaste => 2004,
            DecMode::BatchedRendering => 2026,
            DecMode::TextReflow => 2027,
        }
    }
}

/// Dense bit storage indexed by DEC mode numeric code.
#[derive(Debug, Clone, Default)]
struct DenseBits {
    words: [u64; Self::WORDS],
}

impl DenseBits {
    // Covers every known DEC private mode code (max 2027).
    const WORDS: usize = 32;
    const CAPACITY: u16 = (Self::WORDS * 64) as u16;

    fn get(&self, code: u16) -> bool {
        debug_assert!(code < Self::CAPACITY);
        self.words[(code / 64) as usize] & (1u64 << (code % 64)) != 0
    }

    fn set(&mut self, code: u16, value: bool) {
        debug_assert!(code < Self::CAPACITY);
        let word = &mut self.words[(code / 64) as usize];
        if value {
            *word |= 1u64 << (code % 64);
        } else {
            *word &= !(1u64 << (code % 64));
        }
    }
}

/// Mode storage: packed ANSI bits, dense DEC bitset, a parallel frozen
/// bitset, and the XTSAVE/XTRESTORE stacks.
#[derive(Debug, Default)]
pub struct ModeStore {
    ansi: u32,
    dec: DenseBits,
    frozen: DenseBits,
    saved: HashMap<DecMode, Vec<bool>>,
}

impl ModeStore {
    /// Store with the conventional power-on defaults set.
    pub fn with_defaults() -> Self {
        let mut store = Self::default();
        for mode in [
            DecMode::AutoWrap,
            DecMode::VisibleCursor,
            DecMode::SixelScrolling,
            DecMode::TextReflow,
        ] {
            store.dec.set(mode.code(), true);
        }
        store
    }

    pub fn enabled(&self, mode: DecMode) -> bool {
        self.dec.get(mode.code())
    }

    /// Set a DEC mode. Returns false (leaving the mode untouched) when the
    /// mode is frozen.
    pub fn set(&mut self, mode: DecMode, value: bool) -> bool {
        if self.is_frozen(mode) {
            return false;
        }
        self.dec.set(mode.code(), value);
        true
    }

    pub fn is_frozen(&self, mode: DecMode) -> bool {
        self.frozen.get(mode.code())
    }

    /// Pin a mode to a fixed value. BatchedRendering can never be frozen;
    /// a frozen render gate would wedge the refresh pipeline.
    pub fn freeze(&mut self, mode: DecMode, value: bool) {
        if mode == DecMode::BatchedRendering {
            return;
        }
        self.dec.set(mode.code(), value);
        self.frozen.set(mode.code(), true);
    }

    pub fn unfreeze(&mut self, mode: DecMode) {
        self.frozen.set(mode.code(), false);
    }

    pub fn ansi_enabled(&self, mode: AnsiMode) -> bool {
        self.ansi & mode.bit() != 0
    }

    pub fn set_ansi(&mut self, mode: AnsiMode, value: bool) {
        if value {
            self.ansi |= mode.bit();
        } else {
            self.ansi &= !mode.bit();
        }
    }

    /// XTSAVE: push the current value of each mode.
    pub fn save(&mut self, modes: &[DecMode]) {
        for &mode in modes {
            let value = self.enabled(mode);
            self.saved.entry(mode).or_default().push(value);
        }
    }

    /// XTRESTORE: pop and reapply the saved value of each mode. Modes with
    /// no saved value are left unchanged.
    pub fn restore(&mut self, modes: &[DecMode]) -> Vec<(DecMode, bool)> {
        let mut restored = Vec::new();
        for &mode in modes {
            if let Some(value) = self.saved.get_mut(&mode).and_then(Vec::pop) {
                if self.set(mode, value) {
                    restored.push((mode, value));
                }
            }
        }
        restored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_include_autowrap_and_cursor() {
        let store = ModeStore::with_defaults();
        assert!(store.enabled(DecMode::AutoWrap));
        assert!(store.enabled(DecMode::VisibleCursor));
        assert!(!store.enabled(DecMode::Origin));
    }

    #[test]
    fn frozen_modes_reject_changes() {
        let mut store = ModeStore::with_defaults();
        store.freeze(DecMode::AutoWrap, true);
        assert!(!store.set(DecMode::AutoWrap, false));
        assert!(store.enabled(DecMode::AutoWrap));
        store.unfreeze(DecMode::AutoWrap);
        assert!(store.set(DecMode::AutoWrap, false));
        assert!(!store.enabled(DecMode::AutoWrap));
    }

    #[test]
    fn batched_rendering_cannot_freeze() {
        let mut store = ModeStore::with_defaults();
        store.freeze(DecMode::BatchedRendering, true);
        assert!(!store.is_frozen(DecMode::BatchedRendering));
        assert!(store.set(DecMode::BatchedRendering, false));
    }

    #[test]
    fn save_restore_round_trips() {
        let mut store = ModeStore::with_defaults();
        store.set(DecMode::BracketedPaste, true);
        store.save(&[DecMode::BracketedPaste]);
        store.set(DecMode::BracketedPaste, false);
        store.restore(&[DecMode::BracketedPaste]);
        assert!(store.enabled(DecMode::BracketedPaste));
    }

    #[test]
    fn mode_codes_round_trip() {
        for code in [1u16, 6, 7, 25, 47, 69, 80, 1006, 1049, 2004, 2026, 2027] {
            let mode = DecMode::from_code(code).unwrap();
            if code != 47 {
                assert_eq!(mode.code(), code);
            }
        }
        assert_eq!(
            DecMode::from_code(1047),
            Some(DecMode::UseAlternateScreen)
        );
        assert_eq!(DecMode::from_code(9999), None);
    }
}
