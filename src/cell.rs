use std::sync::Arc;

use bitflags::bitflags;
use unicode_width::UnicodeWidthChar;

use crate::color::Color;
use crate::hyperlink::Hyperlink;
use crate::image::ImageFragment;

bitflags! {
    /// Cell text attributes as a compact bitflag set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct CellAttrs: u16 {
        const BOLD          = 1 << 0;
        const FAINT         = 1 << 1;
        const ITALIC        = 1 << 2;
        const BLINK_SLOW    = 1 << 3;
        const BLINK_RAPID   = 1 << 4;
        const INVERSE       = 1 << 5;
        const HIDDEN        = 1 << 6;
        const CROSSED_OUT   = 1 << 7;
        const FRAMED        = 1 << 8;
        const OVERLINED     = 1 << 9;
    }
}

bitflags! {
    /// Per-cell flags for wide character tracking and search/selection marks.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct CellFlags: u8 {
        /// This cell holds a wide (2-column) character
        const WIDE_CHAR   = 1 << 0;
        /// This cell is the trailing spacer of a wide character
        const WIDE_SPACER = 1 << 1;
        /// Transient mark used by selection and search highlighting
        const DIRTY       = 1 << 2;
    }
}

/// Underline variant selected via SGR 4:0..4:5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, serde::Serialize)]
pub enum UnderlineStyle {
    #[default]
    None,
    Single,
    Double,
    Curly,
    Dotted,
    Dashed,
}

/// The active graphics rendition: everything SGR can change, plus the
/// hyperlink inherited by newly written cells (OSC 8).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pen {
    pub fg: Color,
    pub bg: Color,
    pub underline_color: Color,
    pub attrs: CellAttrs,
    pub underline: UnderlineStyle,
    pub hyperlink: Option<Arc<Hyperlink>>,
}

impl Pen {
    pub fn reset(&mut self) {
        *self = Pen::default();
    }
}

/// A single terminal cell: a grapheme cluster plus its rendition.
///
/// The base character is stored inline; combining marks beyond it go into
/// `extra`, so the common ASCII case stays allocation-free.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cell {
    ch: char,
    extra: Option<Box<str>>,
    pub fg: Color,
    pub bg: Color,
    pub underline_color: Color,
    pub attrs: CellAttrs,
    pub underline: UnderlineStyle,
    pub flags: CellFlags,
    pub hyperlink: Option<Arc<Hyperlink>>,
    pub image: Option<ImageFragment>,
}

impl Cell {
    /// A blank cell written with the given pen's background.
    pub fn blank(pen: &Pen) -> Self {
        Self {
            ch: ' ',
            bg: pen.bg,
            ..Default::default()
        }
    }

    /// Write a grapheme cluster into this cell under `pen`.
    pub fn write(&mut self, cluster: &str, pen: &Pen) {
        let mut chars = cluster.chars();
        self.ch = chars.next().unwrap_or(' ');
        let rest = chars.as_str();
        self.extra = if rest.is_empty() {
            None
        } else {
            Some(rest.into())
        };
        self.fg = pen.fg;
        self.bg = pen.bg;
        self.underline_color = pen.underline_color;
        self.attrs = pen.attrs;
        self.underline = pen.underline;
        self.hyperlink = pen.hyperlink.clone();
        self.image = None;
        self.flags = if self.width() == 2 {
            CellFlags::WIDE_CHAR
        } else {
            CellFlags::empty()
        };
    }

    /// Append a zero-width code point (combining mark) to the cluster.
    pub fn push_combining(&mut self, c: char) {
        let mut s = self
            .extra
            .take()
            .map(String::from)
            .unwrap_or_default();
        s.push(c);
        self.extra = Some(s.into_boxed_str());
    }

    /// Create the trailing spacer for a wide character.
    pub fn wide_spacer(pen: &Pen) -> Self {
        Self {
            ch: ' ',
            bg: pen.bg,
            flags: CellFlags::WIDE_SPACER,
            ..Default::default()
        }
    }

    /// Reset the cell to the default blank state.
    pub fn clear(&mut self) {
        *self = Cell {
            ch: ' ',
            ..Default::default()
        };
    }

    /// Erase the cell using the pen's current background color (per ECMA-48
    /// erases keep the active background).
    pub fn erase(&mut self, pen: &Pen) {
        *self = Cell::blank(pen);
    }

    pub fn base_char(&self) -> char {
        self.ch
    }

    /// The full grapheme cluster as text.
    pub fn text(&self) -> String {
        match &self.extra {
            None => self.ch.to_string(),
            Some(extra) => {
                let mut s = String::with_capacity(1 + extra.len());
                s.push(self.ch);
                s.push_str(extra);
                s
            }
        }
    }

    /// Append the cluster to `out` without allocating an intermediate.
    pub fn append_text(&self, out: &mut String) {
        out.push(self.ch);
        if let Some(extra) = &self.extra {
            out.push_str(extra);
        }
    }

    /// Display width of the cluster (1 or 2 columns).
    pub fn width(&self) -> u16 {
        UnicodeWidthChar::width(self.ch).unwrap_or(1).clamp(1, 2) as u16
    }

    /// True when the cell holds a plain space with no rendition of note.
    pub fn is_blank(&self) -> bool {
        self.ch == ' '
            && self.extra.is_none()
            && self.image.is_none()
            && !self.flags.contains(CellFlags::WIDE_SPACER)
    }

    pub fn is_wide(&self) -> bool {
        self.flags.contains(CellFlags::WIDE_CHAR)
    }

    pub fn is_wide_spacer(&self) -> bool {
        self.flags.contains(CellFlags::WIDE_SPACER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_sets_rendition_from_pen() {
        let pen = Pen {
            fg: Color::Indexed(1),
            bg: Color::Indexed(4),
            attrs: CellAttrs::BOLD,
            ..Default::default()
        };
        let mut cell = Cell::default();
        cell.write("X", &pen);
        assert_eq!(cell.base_char(), 'X');
        assert_eq!(cell.fg, Color::Indexed(1));
        assert_eq!(cell.bg, Color::Indexed(4));
        assert!(cell.attrs.contains(CellAttrs::BOLD));
        assert_eq!(cell.width(), 1);
    }

    #[test]
    fn wide_character_flags() {
        let pen = Pen::default();
        let mut cell = Cell::default();
        cell.write("世", &pen);
        assert_eq!(cell.width(), 2);
        assert!(cell.is_wide());
        let spacer = Cell::wide_spacer(&pen);
        assert!(spacer.is_wide_spacer());
    }

    #[test]
    fn combining_marks_join_the_cluster() {
        let pen = Pen::default();
        let mut cell = Cell::default();
        cell.write("e", &pen);
        cell.push_combining('\u{0301}');
        assert_eq!(cell.text(), "e\u{0301}");
        assert_eq!(cell.width(), 1);
    }

    #[test]
    fn erase_keeps_pen_background() {
        let pen = Pen {
            bg: Color::Indexed(2),
            ..Default::default()
        };
        let mut cell = Cell::default();
        cell.write("A", &pen);
        cell.erase(&pen);
        assert_eq!(cell.base_char(), ' ');
        assert_eq!(cell.bg, Color::Indexed(2));
        assert_eq!(cell.fg, Color::Default);
        assert!(cell.attrs.is_empty());
    }
}
