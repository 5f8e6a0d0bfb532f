//! The static VT function catalogue: every control function the terminal
//! understands, keyed by category, leader, intermediate and final byte.
//! Selection is a binary search over a sorted table; OSC functions are
//! keyed by their numeric code instead.

use std::cmp::Ordering;

/// Broad sequence category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FunctionCategory {
    C0,
    Esc,
    Csi,
    Osc,
    Dcs,
}

/// DEC terminal conformance levels, ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum VtType {
    VT100,
    VT220,
    VT240,
    VT320,
    VT330,
    VT340,
    VT420,
    VT510,
    VT520,
    VT525,
}

impl VtType {
    /// Numeric id used in DA2 replies.
    pub fn id(self) -> u16 {
        match self {
            VtType::VT100 => 100,
            VtType::VT220 => 220,
            VtType::VT240 => 240,
            VtType::VT320 => 320,
            VtType::VT330 => 330,
            VtType::VT340 => 340,
            VtType::VT420 => 420,
            VtType::VT510 => 510,
            VtType::VT520 => 520,
            VtType::VT525 => 525,
        }
    }
}

/// Where a non-DEC function comes from. Extension functions are active at
/// every conformance level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VtExtension {
    None,
    Xterm,
    Urxvt,
    Vendor,
}

/// Every function the sequencer can execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    // C0
    Bel,
    Bs,
    Tab,
    Lf,
    Vt,
    Ff,
    Cr,
    Ls0,
    Ls1,
    // ESC
    DecAln,
    DecBi,
    DecFi,
    DecKpam,
    DecKpnm,
    DecRc,
    DecSc,
    Hts,
    Ind,
    Nel,
    Ri,
    Ris,
    ScsG0Special,
    ScsG0Usascii,
    ScsG1Special,
    ScsG1Usascii,
    ScsG2Special,
    ScsG2Usascii,
    ScsG3Special,
    ScsG3Usascii,
    Ss2,
    Ss3,
    // CSI
    Cbt,
    Cha,
    Cht,
    Cnl,
    Cpl,
    Cub,
    Cud,
    Cuf,
    Cup,
    Cuu,
    Da1,
    Da2,
    Da3,
    Dch,
    DecDc,
    DecIc,
    DecRm,
    DecRqm,
    DecRqmAnsi,
    DecSasd,
    DecScl,
    DecScpp,
    DecScusr,
    DecSlrm,
    DecSm,
    DecSnls,
    DecSsdt,
    DecStbm,
    DecStr,
    Dl,
    Dsr,
    AnsiDsr,
    Ech,
    Ed,
    El,
    Hpa,
    Hpr,
    Hvp,
    Ich,
    Il,
    Rep,
    Rm,
    ScoSc,
    ScoRc,
    Sd,
    SetMark,
    Sgr,
    Sm,
    Su,
    Tbc,
    Vpa,
    WinManip,
    XtCapture,
    XtPopColors,
    XtPushColors,
    XtReportColors,
    XtRestore,
    XtSave,
    XtSmGraphics,
    XtVersion,
    // DCS
    DecRqss,
    DecSixel,
    Stp,
    XtGetTcap,
    // OSC
    SetTitle,
    SetIcon,
    SetWinTitle,
    SetColPal,
    Hyperlink,
    ColorFg,
    ColorBg,
    ColorCursor,
    ColorMouseFg,
    ColorMouseBg,
    Clipboard,
    ResetColPal,
    ResetColorFg,
    ResetColorBg,
    ResetColorCursor,
    ResetColorMouseFg,
    ResetColorMouseBg,
    Notify,
}

/// Upper bound on CSI/DCS parameters, shared with the sequence builder.
pub const ARGS_MAX: u8 = 16;

/// One catalogue entry.
#[derive(Debug, Clone, Copy)]
pub struct FunctionDef {
    pub category: FunctionCategory,
    /// 0, or one of `<`, `=`, `>`, `?`.
    pub leader: u8,
    /// 0, or one byte in 0x20..=0x2F.
    pub intermediate: u8,
    /// Final byte in 0x40..=0x7E (or the control byte for C0, the numeric
    /// code for OSC).
    pub final_byte: u8,
    pub min_params: u8,
    pub max_params: u8,
    pub conformance: VtType,
    pub extension: VtExtension,
    pub id: Function,
}

const fn c0(byte: u8, id: Function) -> FunctionDef {
    FunctionDef {
        category: FunctionCategory::C0,
        leader: 0,
        intermediate: 0,
        final_byte: byte,
        min_params: 0,
        max_params: 0,
        conformance: VtType::VT100,
        extension: VtExtension::None,
        id,
    }
}

const fn esc(intermediate: u8, final_byte: u8, vt: VtType, id: Function) -> FunctionDef {
    FunctionDef {
        category: FunctionCategory::Esc,
        leader: 0,
        intermediate,
        final_byte,
        min_params: 0,
        max_params: 0,
        conformance: vt,
        extension: VtExtension::None,
        id,
    }
}

const fn csi(
    leader: u8,
    min_params: u8,
    max_params: u8,
    intermediate: u8,
    final_byte: u8,
    vt: VtType,
    id: Function,
) -> FunctionDef {
    FunctionDef {
        category: FunctionCategory::Csi,
        leader,
        intermediate,
        final_byte,
        min_params,
        max_params,
        conformance: vt,
        extension: VtExtension::None,
        id,
    }
}

const fn csi_ext(
    leader: u8,
    min_params: u8,
    max_params: u8,
    intermediate: u8,
    final_byte: u8,
    extension: VtExtension,
    id: Function,
) -> FunctionDef {
    FunctionDef {
        category: FunctionCategory::Csi,
        leader,
        intermediate,
        final_byte,
        min_params,
        max_params,
        conformance: VtType::VT100,
        extension,
        id,
    }
}

const fn dcs(
    leader: u8,
    min_params: u8,
    max_params: u8,
    intermediate: u8,
    final_byte: u8,
    vt: VtType,
    extension: VtExtension,
    id: Function,
) -> FunctionDef {
    FunctionDef {
        category: FunctionCategory::Dcs,
        leader,
        intermediate,
        final_byte,
        min_params,
        max_params,
        conformance: vt,
        extension,
        id,
    }
}

const fn osc(code: u16, id: Function) -> OscDef {
    OscDef { code, id }
}

/// OSC functions are selected by numeric code, not final byte.
#[derive(Debug, Clone, Copy)]
pub struct OscDef {
    pub code: u16,
    pub id: Function,
}

/// The ESC/CSI/DCS catalogue, sorted by
/// `(category, final_byte, leader, intermediate, min_params)` for binary
/// search. C0 entries lead for completeness; they are dispatched directly
/// from `execute`.
pub static FUNCTIONS: &[FunctionDef] = &[
    // C0
    c0(0x07, Function::Bel),
    c0(0x08, Function::Bs),
    c0(0x09, Function::Tab),
    c0(0x0A, Function::Lf),
    c0(0x0B, Function::Vt),
    c0(0x0C, Function::Ff),
    c0(0x0D, Function::Cr),
    c0(0x0E, Function::Ls1),
    c0(0x0F, Function::Ls0),
    // ESC, ordered by final byte then intermediate
    esc(b'(', b'0', VtType::VT100, Function::ScsG0Special),
    esc(b')', b'0', VtType::VT100, Function::ScsG1Special),
    esc(b'*', b'0', VtType::VT220, Function::ScsG2Special),
    esc(b'+', b'0', VtType::VT220, Function::ScsG3Special),
    esc(0, b'6', VtType::VT100, Function::DecBi),
    esc(0, b'7', VtType::VT100, Function::DecSc),
    esc(0, b'8', VtType::VT100, Function::DecRc),
    esc(b'#', b'8', VtType::VT100, Function::DecAln),
    esc(0, b'9', VtType::VT100, Function::DecFi),
    esc(0, b'=', VtType::VT100, Function::DecKpam),
    esc(0, b'>', VtType::VT100, Function::DecKpnm),
    esc(b'(', b'B', VtType::VT100, Function::ScsG0Usascii),
    esc(b')', b'B', VtType::VT100, Function::ScsG1Usascii),
    esc(b'*', b'B', VtType::VT220, Function::ScsG2Usascii),
    esc(b'+', b'B', VtType::VT220, Function::ScsG3Usascii),
    esc(0, b'D', VtType::VT100, Function::Ind),
    esc(0, b'E', VtType::VT100, Function::Nel),
    esc(0, b'H', VtType::VT100, Function::Hts),
    esc(0, b'M', VtType::VT100, Function::Ri),
    esc(0, b'N', VtType::VT220, Function::Ss2),
    esc(0, b'O', VtType::VT220, Function::Ss3),
    esc(0, b'c', VtType::VT100, Function::Ris),
    // CSI, ordered by final byte then leader then intermediate
    csi(0, 0, 1, 0, b'@', VtType::VT420, Function::Ich),
    csi(0, 0, 1, 0, b'A', VtType::VT100, Function::Cuu),
    csi(0, 0, 1, 0, b'B', VtType::VT100, Function::Cud),
    csi(0, 0, 1, 0, b'C', VtType::VT100, Function::Cuf),
    csi(0, 0, 1, 0, b'D', VtType::VT100, Function::Cub),
    csi(0, 0, 1, 0, b'E', VtType::VT100, Function::Cnl),
    csi(0, 0, 1, 0, b'F', VtType::VT100, Function::Cpl),
    csi(0, 0, 1, 0, b'G', VtType::VT100, Function::Cha),
    csi(0, 0, 2, 0, b'H', VtType::VT100, Function::Cup),
    csi(0, 0, 1, 0, b'I', VtType::VT100, Function::Cht),
    csi(0, 0, ARGS_MAX, 0, b'J', VtType::VT100, Function::Ed),
    csi(0, 0, 1, 0, b'K', VtType::VT100, Function::El),
    csi(0, 0, 1, 0, b'L', VtType::VT100, Function::Il),
    csi(0, 0, 1, 0, b'M', VtType::VT100, Function::Dl),
    csi_ext(b'>', 0, 0, 0, b'M', VtExtension::Vendor, Function::SetMark),
    csi(0, 0, 1, 0, b'P', VtType::VT100, Function::Dch),
    csi_ext(0, 0, ARGS_MAX, b'#', b'P', VtExtension::Xterm, Function::XtPushColors),
    csi_ext(0, 0, ARGS_MAX, b'#', b'Q', VtExtension::Xterm, Function::XtPopColors),
    csi_ext(0, 0, 0, b'#', b'R', VtExtension::Xterm, Function::XtReportColors),
    csi(0, 0, 1, 0, b'S', VtType::VT100, Function::Su),
    csi_ext(b'?', 2, 4, 0, b'S', VtExtension::Xterm, Function::XtSmGraphics),
    csi(0, 0, 1, 0, b'T', VtType::VT100, Function::Sd),
    csi(0, 0, 1, 0, b'X', VtType::VT420, Function::Ech),
    csi(0, 0, 1, 0, b'Z', VtType::VT100, Function::Cbt),
    csi(0, 1, 1, 0, b'`', VtType::VT100, Function::Hpa),
    csi(0, 1, 1, 0, b'a', VtType::VT100, Function::Hpr),
    csi(0, 1, 1, 0, b'b', VtType::VT100, Function::Rep),
    csi(0, 0, 1, 0, b'c', VtType::VT100, Function::Da1),
    csi(0, 0, 1, b'=', b'c', VtType::VT100, Function::Da3),
    csi(0, 0, 1, b'>', b'c', VtType::VT100, Function::Da2),
    csi(0, 0, 1, 0, b'd', VtType::VT100, Function::Vpa),
    csi(0, 0, 2, 0, b'f', VtType::VT100, Function::Hvp),
    csi(0, 0, 1, 0, b'g', VtType::VT100, Function::Tbc),
    csi(0, 1, ARGS_MAX, 0, b'h', VtType::VT100, Function::Sm),
    csi(0, 1, ARGS_MAX, b'?', b'h', VtType::VT100, Function::DecSm),
    csi(0, 1, ARGS_MAX, 0, b'l', VtType::VT100, Function::Rm),
    csi(0, 1, ARGS_MAX, b'?', b'l', VtType::VT100, Function::DecRm),
    csi(0, 0, ARGS_MAX, 0, b'm', VtType::VT100, Function::Sgr),
    csi(0, 1, 1, 0, b'n', VtType::VT100, Function::AnsiDsr),
    csi(0, 1, 1, b'?', b'n', VtType::VT100, Function::Dsr),
    csi(0, 0, 0, b'!', b'p', VtType::VT100, Function::DecStr),
    csi(0, 2, 2, b'"', b'p', VtType::VT220, Function::DecScl),
    csi(0, 1, 1, b'$', b'p', VtType::VT100, Function::DecRqmAnsi),
    csi(0, 1, 1, b'?', b'p', VtType::VT100, Function::DecRqm),
    csi(0, 0, 1, b' ', b'q', VtType::VT520, Function::DecScusr),
    csi_ext(b'>', 0, 1, 0, b'q', VtExtension::Xterm, Function::XtVersion),
    csi(0, 0, 2, 0, b'r', VtType::VT100, Function::DecStbm),
    csi_ext(0, 0, ARGS_MAX, b'?', b'r', VtExtension::Xterm, Function::XtRestore),
    csi(0, 0, 0, 0, b's', VtType::VT100, Function::ScoSc),
    csi(0, 1, 2, 0, b's', VtType::VT420, Function::DecSlrm),
    csi_ext(0, 0, ARGS_MAX, b'?', b's', VtExtension::Xterm, Function::XtSave),
    csi_ext(0, 1, 3, 0, b't', VtExtension::Xterm, Function::WinManip),
    csi_ext(b'>', 0, 2, 0, b't', VtExtension::Vendor, Function::XtCapture),
    csi(0, 0, 0, 0, b'u', VtType::VT100, Function::ScoRc),
    csi(0, 0, 1, b'$', b'|', VtType::VT100, Function::DecScpp),
    csi(0, 0, 1, b'*', b'|', VtType::VT420, Function::DecSnls),
    csi(0, 0, 1, b'$', b'}', VtType::VT420, Function::DecSasd),
    csi(0, 0, 1, b'\'', b'}', VtType::VT420, Function::DecIc),
    csi(0, 0, 1, b'$', b'~', VtType::VT320, Function::DecSsdt),
    csi(0, 0, 1, b'\'', b'~', VtType::VT420, Function::DecDc),
    // DCS
    dcs(0, 1, 1, b'$', b'p', VtType::VT100, VtExtension::Vendor, Function::Stp),
    dcs(0, 0, 3, 0, b'q', VtType::VT330, VtExtension::None, Function::DecSixel),
    dcs(0, 0, 0, b'$', b'q', VtType::VT420, VtExtension::None, Function::DecRqss),
    dcs(0, 0, 0, b'+', b'q', VtType::VT100, VtExtension::Xterm, Function::XtGetTcap),
];

/// OSC catalogue, sorted by code.
pub static OSC_FUNCTIONS: &[OscDef] = &[
    osc(0, Function::SetTitle),
    osc(1, Function::SetIcon),
    osc(2, Function::SetWinTitle),
    osc(4, Function::SetColPal),
    osc(8, Function::Hyperlink),
    osc(10, Function::ColorFg),
    osc(11, Function::ColorBg),
    osc(12, Function::ColorCursor),
    osc(13, Function::ColorMouseFg),
    osc(14, Function::ColorMouseBg),
    osc(52, Function::Clipboard),
    osc(104, Function::ResetColPal),
    osc(110, Function::ResetColorFg),
    osc(111, Function::ResetColorBg),
    osc(112, Function::ResetColorCursor),
    osc(113, Function::ResetColorMouseFg),
    osc(114, Function::ResetColorMouseBg),
    osc(777, Function::Notify),
];

/// Selection key built by the sequence builder from an accumulated sequence.
#[derive(Debug, Clone, Copy)]
pub struct FunctionSelector {
    pub category: FunctionCategory,
    pub leader: u8,
    pub intermediate: u8,
    pub final_byte: u8,
    pub argc: u8,
}

fn compare(def: &FunctionDef, sel: &FunctionSelector) -> Ordering {
    def.category
        .cmp(&sel.category)
        .then_with(|| def.final_byte.cmp(&sel.final_byte))
        .then_with(|| def.leader.cmp(&sel.leader))
        .then_with(|| def.intermediate.cmp(&sel.intermediate))
        .then_with(|| {
            if sel.argc < def.min_params {
                Ordering::Greater
            } else if sel.argc > def.max_params {
                Ordering::Less
            } else {
                Ordering::Equal
            }
        })
}

/// The catalogue partitioned by conformance level. Extension functions are
/// always active; DEC functions are active when their conformance level is
/// at or below the configured terminal id.
#[derive(Debug)]
pub struct SupportedSequences {
    level: VtType,
    active: Vec<&'static FunctionDef>,
    disabled: Vec<&'static FunctionDef>,
}

impl SupportedSequences {
    pub fn new(level: VtType) -> Self {
        let mut supported = Self {
            level,
            active: Vec::new(),
            disabled: Vec::new(),
        };
        supported.rebuild();
        supported
    }

    pub fn level(&self) -> VtType {
        self.level
    }

    /// Promote/demote entries for a new conformance level.
    pub fn set_conformance(&mut self, level: VtType) {
        self.level = level;
        self.rebuild();
    }

    fn rebuild(&mut self) {
        self.active.clear();
        self.disabled.clear();
        for def in FUNCTIONS {
            let active = def.extension != VtExtension::None || def.conformance <= self.level;
            if active {
                self.active.push(def);
            } else {
                self.disabled.push(def);
            }
        }
    }

    /// Binary-search the active partition. `None` means the sequence is
    /// unknown or above the conformance level; the caller logs and ignores.
    pub fn select(&self, sel: FunctionSelector) -> Option<&'static FunctionDef> {
        self.active
            .binary_search_by(|def| compare(def, &sel))
            .ok()
            .map(|idx| self.active[idx])
    }

    /// True when the selector matches a known function that the current
    /// level disables (logged as unsupported-at-level rather than unknown).
    pub fn is_disabled(&self, sel: FunctionSelector) -> bool {
        self.disabled
            .iter()
            .any(|def| compare(def, &sel) == Ordering::Equal)
    }

    pub fn select_osc(&self, code: u16) -> Option<Function> {
        OSC_FUNCTIONS
            .binary_search_by(|def| def.code.cmp(&code))
            .ok()
            .map(|idx| OSC_FUNCTIONS[idx].id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sel(
        category: FunctionCategory,
        leader: u8,
        intermediate: u8,
        final_byte: u8,
        argc: u8,
    ) -> FunctionSelector {
        FunctionSelector {
            category,
            leader,
            intermediate,
            final_byte,
            argc,
        }
    }

    #[test]
    fn table_is_sorted_for_binary_search() {
        for pair in FUNCTIONS.windows(2) {
            let a = &pair[0];
            let b = &pair[1];
            let key = |d: &FunctionDef| (d.category, d.final_byte, d.leader, d.intermediate, d.min_params);
            assert!(
                key(a) <= key(b),
                "catalogue out of order between {:?} and {:?}",
                a.id,
                b.id
            );
        }
        for pair in OSC_FUNCTIONS.windows(2) {
            assert!(pair[0].code < pair[1].code);
        }
    }

    #[test]
    fn selects_by_leader_and_intermediate() {
        let supported = SupportedSequences::new(VtType::VT525);
        let cup = supported
            .select(sel(FunctionCategory::Csi, 0, 0, b'H', 2))
            .unwrap();
        assert_eq!(cup.id, Function::Cup);

        let decsm = supported
            .select(sel(FunctionCategory::Csi, b'?', 0, b'h', 1))
            .unwrap();
        assert_eq!(decsm.id, Function::DecSm);

        let decrqm = supported
            .select(sel(FunctionCategory::Csi, b'?', b'$', b'p', 1))
            .unwrap();
        assert_eq!(decrqm.id, Function::DecRqm);
    }

    #[test]
    fn argc_disambiguates_shared_finals() {
        let supported = SupportedSequences::new(VtType::VT525);
        let save = supported
            .select(sel(FunctionCategory::Csi, 0, 0, b's', 0))
            .unwrap();
        assert_eq!(save.id, Function::ScoSc);
        let slrm = supported
            .select(sel(FunctionCategory::Csi, 0, 0, b's', 2))
            .unwrap();
        assert_eq!(slrm.id, Function::DecSlrm);
    }

    #[test]
    fn conformance_level_disables_later_functions() {
        let supported = SupportedSequences::new(VtType::VT100);
        let selector = sel(FunctionCategory::Csi, 0, 0, b'X', 1);
        assert!(supported.select(selector).is_none(), "ECH is VT420");
        assert!(supported.is_disabled(selector));

        let mut supported = supported;
        supported.set_conformance(VtType::VT420);
        assert_eq!(supported.select(selector).unwrap().id, Function::Ech);
        assert!(!supported.is_disabled(selector));
    }

    #[test]
    fn osc_lookup_by_code() {
        let supported = SupportedSequences::new(VtType::VT525);
        assert_eq!(supported.select_osc(8), Some(Function::Hyperlink));
        assert_eq!(supported.select_osc(52), Some(Function::Clipboard));
        assert_eq!(supported.select_osc(9999), None);
    }

    #[test]
    fn unknown_sequences_select_nothing() {
        let supported = SupportedSequences::new(VtType::VT525);
        assert!(supported
            .select(sel(FunctionCategory::Csi, b'<', 0, b'z', 0))
            .is_none());
    }
}
