use serde::Serialize;

/// Terminal color representation supporting 16-color, 256-color, and truecolor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    Default,
    Indexed(u8),
    Rgb(u8, u8, u8),
}

impl Default for Color {
    fn default() -> Self {
        Color::Default
    }
}

/// A concrete RGB value, produced by palette resolution for render output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RgbColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl RgbColor {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Format as `rgb:rrrr/gggg/bbbb` with 16-bit components, the grammar
    /// xterm uses for color query replies.
    pub fn to_x11_spec(self) -> String {
        let scale = |v: u8| v as u16 * 0x0101;
        format!(
            "rgb:{:04x}/{:04x}/{:04x}",
            scale(self.r),
            scale(self.g),
            scale(self.b)
        )
    }

    /// Parse an `rgb:RR/GG/BB` specification (8-bit per channel form).
    pub fn parse_x11_spec(spec: &str) -> Option<Self> {
        let rest = spec.strip_prefix("rgb:")?;
        let mut parts = rest.split('/');
        let r = parse_hex_channel(parts.next()?)?;
        let g = parse_hex_channel(parts.next()?)?;
        let b = parse_hex_channel(parts.next()?)?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self { r, g, b })
    }
}

/// Accepts 1-4 hex digits per channel, scaling down to 8 bits.
fn parse_hex_channel(s: &str) -> Option<u8> {
    if s.is_empty() || s.len() > 4 {
        return None;
    }
    let v = u16::from_str_radix(s, 16).ok()?;
    Some(match s.len() {
        1 => (v * 0x11) as u8,
        2 => v as u8,
        3 => (v >> 4) as u8,
        _ => (v >> 8) as u8,
    })
}

/// Dynamic color roles addressable via OSC 10..19 and friends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorRole {
    DefaultForeground,
    DefaultBackground,
    Cursor,
    MouseForeground,
    MouseBackground,
    HighlightForeground,
    HighlightBackground,
}

/// The full palette: 16 ANSI + 240 indexed entries plus dynamic roles.
/// Supports an xterm-style save/restore stack (XTPUSHCOLORS/XTPOPCOLORS).
#[derive(Debug, Clone, PartialEq)]
pub struct ColorPalette {
    indexed: [RgbColor; 256],
    pub default_foreground: RgbColor,
    pub default_background: RgbColor,
    pub cursor: RgbColor,
    pub mouse_foreground: RgbColor,
    pub mouse_background: RgbColor,
    pub highlight_foreground: RgbColor,
    pub highlight_background: RgbColor,
}

impl Default for ColorPalette {
    fn default() -> Self {
        let mut indexed = [RgbColor::new(0, 0, 0); 256];
        for (i, slot) in indexed.iter_mut().enumerate() {
            *slot = standard_indexed(i as u8);
        }
        Self {
            indexed,
            default_foreground: RgbColor::new(0xd4, 0xd4, 0xd4),
            default_background: RgbColor::new(0x0e, 0x0e, 0x0e),
            cursor: RgbColor::new(0xd4, 0xd4, 0xd4),
            mouse_foreground: RgbColor::new(0xd4, 0xd4, 0xd4),
            mouse_background: RgbColor::new(0x0e, 0x0e, 0x0e),
            highlight_foreground: RgbColor::new(0x0e, 0x0e, 0x0e),
            highlight_background: RgbColor::new(0xa9, 0xb1, 0xd6),
        }
    }
}

impl ColorPalette {
    pub fn indexed(&self, index: u8) -> RgbColor {
        self.indexed[index as usize]
    }

    pub fn set_indexed(&mut self, index: u8, color: RgbColor) {
        self.indexed[index as usize] = color;
    }

    pub fn reset_indexed(&mut self, index: u8) {
        self.indexed[index as usize] = standard_indexed(index);
    }

    pub fn role(&self, role: ColorRole) -> RgbColor {
        match role {
            ColorRole::DefaultForeground => self.default_foreground,
            ColorRole::DefaultBackground => self.default_background,
            ColorRole::Cursor => self.cursor,
            ColorRole::MouseForeground => self.mouse_foreground,
            ColorRole::MouseBackground => self.mouse_background,
            ColorRole::HighlightForeground => self.highlight_foreground,
            ColorRole::HighlightBackground => self.highlight_background,
        }
    }

    pub fn set_role(&mut self, role: ColorRole, color: RgbColor) {
        match role {
            ColorRole::DefaultForeground => self.default_foreground = color,
            ColorRole::DefaultBackground => self.default_background = color,
            ColorRole::Cursor => self.cursor = color,
            ColorRole::MouseForeground => self.mouse_foreground = color,
            ColorRole::MouseBackground => self.mouse_background = color,
            ColorRole::HighlightForeground => self.highlight_foreground = color,
            ColorRole::HighlightBackground => self.highlight_background = color,
        }
    }

    pub fn reset_role(&mut self, role: ColorRole) {
        let defaults = ColorPalette::default();
        self.set_role(role, defaults.role(role));
    }

    /// Resolve a cell color against this palette. `default_for` is the role
    /// substituted for `Color::Default` (foreground or background).
    pub fn resolve(&self, color: Color, default_for: ColorRole) -> RgbColor {
        match color {
            Color::Default => self.role(default_for),
            Color::Indexed(i) => self.indexed(i),
            Color::Rgb(r, g, b) => RgbColor::new(r, g, b),
        }
    }
}

/// Save/restore stack for palettes (XTPUSHCOLORS / XTPOPCOLORS).
#[derive(Debug, Default)]
pub struct PaletteStack {
    saved: Vec<ColorPalette>,
}

impl PaletteStack {
    /// xterm caps the palette stack at 10 entries.
    const MAX_DEPTH: usize = 10;

    pub fn push(&mut self, palette: &ColorPalette) {
        if self.saved.len() == Self::MAX_DEPTH {
            self.saved.remove(0);
        }
        self.saved.push(palette.clone());
    }

    pub fn pop(&mut self) -> Option<ColorPalette> {
        self.saved.pop()
    }

    pub fn depth(&self) -> usize {
        self.saved.len()
    }
}

/// Standard xterm value for a 256-color palette index.
/// The first 16 are the conventional ANSI colors, 16-231 a 6x6x6 cube,
/// 232-255 a grayscale ramp.
pub fn standard_indexed(index: u8) -> RgbColor {
    match index {
        0 => RgbColor::new(0x15, 0x16, 0x1e),
        1 => RgbColor::new(0xf7, 0x76, 0x8e),
        2 => RgbColor::new(0x9e, 0xce, 0x6a),
        3 => RgbColor::new(0xe0, 0xaf, 0x68),
        4 => RgbColor::new(0x7a, 0xa2, 0xf7),
        5 => RgbColor::new(0xbb, 0x9a, 0xf7),
        6 => RgbColor::new(0x7d, 0xcf, 0xff),
        7 => RgbColor::new(0xa9, 0xb1, 0xd6),
        8 => RgbColor::new(0x41, 0x48, 0x68),
        9 => RgbColor::new(0xff, 0x9e, 0x9e),
        10 => RgbColor::new(0xb9, 0xf2, 0x7c),
        11 => RgbColor::new(0xff, 0x9e, 0x64),
        12 => RgbColor::new(0x82, 0xaa, 0xff),
        13 => RgbColor::new(0xd4, 0xb0, 0xff),
        14 => RgbColor::new(0xa9, 0xe1, 0xff),
        15 => RgbColor::new(0xc0, 0xca, 0xf5),
        16..=231 => {
            let idx = index - 16;
            let r = idx / 36;
            let g = (idx % 36) / 6;
            let b = idx % 6;
            let to_val = |v: u8| if v == 0 { 0 } else { 55 + 40 * v };
            RgbColor::new(to_val(r), to_val(g), to_val(b))
        }
        232..=255 => {
            let v = 8 + 10 * (index - 232);
            RgbColor::new(v, v, v)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_cube_resolution() {
        // Index 196 is pure red in the 6x6x6 cube.
        assert_eq!(standard_indexed(196), RgbColor::new(255, 0, 0));
        // Grayscale ramp start.
        assert_eq!(standard_indexed(232), RgbColor::new(8, 8, 8));
    }

    #[test]
    fn resolve_substitutes_roles_for_default() {
        let palette = ColorPalette::default();
        assert_eq!(
            palette.resolve(Color::Default, ColorRole::DefaultForeground),
            palette.default_foreground
        );
        assert_eq!(
            palette.resolve(Color::Rgb(1, 2, 3), ColorRole::DefaultForeground),
            RgbColor::new(1, 2, 3)
        );
    }

    #[test]
    fn x11_spec_round_trip() {
        let c = RgbColor::new(0x12, 0x34, 0x56);
        let spec = c.to_x11_spec();
        assert_eq!(spec, "rgb:1212/3434/5656");
        // The parser accepts the 2-digit form applications send.
        assert_eq!(RgbColor::parse_x11_spec("rgb:12/34/56"), Some(c));
        assert_eq!(RgbColor::parse_x11_spec("rgb:12/34"), None);
    }

    #[test]
    fn palette_stack_caps_depth() {
        let palette = ColorPalette::default();
        let mut stack = PaletteStack::default();
        for _ in 0..12 {
            stack.push(&palette);
        }
        assert_eq!(stack.depth(), 10);
        assert!(stack.pop().is_some());
        assert_eq!(stack.depth(), 9);
    }
}
