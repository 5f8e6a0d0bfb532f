//! Flat, immutable render records. A front end draws one [`RenderBuffer`]
//! without ever touching the live grid.

use std::time::Instant;

use serde::Serialize;

use crate::cell::UnderlineStyle;
use crate::color::RgbColor;
use crate::cursor::CursorShape;

/// One visible cell, fully resolved: palette colors applied, overlays
/// (selection, search, cursor, hover) folded in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderCell {
    /// Screen coordinates, 0-based from the top-left of the window.
    pub line: u16,
    pub column: u16,
    pub text: String,
    pub width: u16,
    pub fg: RgbColor,
    pub bg: RgbColor,
    pub decoration_color: RgbColor,
    /// Raw style bits ([`crate::cell::CellAttrs`]).
    pub attrs: u16,
    pub underline: UnderlineStyle,
    pub cursor: bool,
    pub selected: bool,
    pub search_match: bool,
    pub hyperlink: Option<String>,
    pub hyperlink_hover: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<RenderImageFragment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preedit: Option<String>,
}

/// Reference to one cell's slice of a pooled image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RenderImageFragment {
    pub image_id: u64,
    pub line: u16,
    pub column: u16,
}

/// A contiguous run of cells sharing one style, for batched shaping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StyledSpan {
    pub column: u16,
    pub text: String,
    pub fg: RgbColor,
    pub bg: RgbColor,
    pub attrs: u16,
    pub underline: UnderlineStyle,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hyperlink: Option<String>,
}

/// One visible row as coalesced spans.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderLine {
    pub line: u16,
    pub spans: Vec<StyledSpan>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RenderCursor {
    pub line: u16,
    pub column: u16,
    pub shape: CursorShape,
    pub blink: bool,
}

/// A complete frame snapshot.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RenderBuffer {
    pub frame_id: u64,
    pub lines_total: u16,
    pub columns_total: u16,
    pub cells: Vec<RenderCell>,
    pub lines: Vec<RenderLine>,
    pub cursor: Option<RenderCursor>,
    #[serde(skip)]
    pub timestamp: Option<Instant>,
}

impl RenderBuffer {
    pub fn clear(&mut self) {
        self.cells.clear();
        self.lines.clear();
        self.cursor = None;
        self.timestamp = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::RgbColor;

    fn cell(text: &str) -> RenderCell {
        RenderCell {
            line: 0,
            column: 1,
            text: text.to_string(),
            width: 1,
            fg: RgbColor::new(0xd4, 0xd4, 0xd4),
            bg: RgbColor::new(0x0e, 0x0e, 0x0e),
            decoration_color: RgbColor::new(0xd4, 0xd4, 0xd4),
            attrs: 0,
            underline: UnderlineStyle::None,
            cursor: false,
            selected: false,
            search_match: false,
            hyperlink: None,
            hyperlink_hover: false,
            image: None,
            preedit: None,
        }
    }

    #[test]
    fn render_buffer_serializes_for_ipc() {
        let buffer = RenderBuffer {
            frame_id: 7,
            lines_total: 1,
            columns_total: 2,
            cells: vec![cell("A")],
            lines: Vec::new(),
            cursor: Some(RenderCursor {
                line: 0,
                column: 1,
                shape: CursorShape::Block,
                blink: true,
            }),
            timestamp: Some(Instant::now()),
        };
        let json = serde_json::to_value(&buffer).expect("frame serializes");
        assert_eq!(json["frame_id"], 7);
        assert_eq!(json["cells"][0]["text"], "A");
        assert_eq!(json["cells"][0]["fg"]["r"], 0xd4);
        assert_eq!(json["cursor"]["shape"], "Block");
        // The timestamp is process-local and stays off the wire.
        assert!(json.get("timestamp").is_none());
    }

    #[test]
    fn absent_overlays_are_omitted_from_the_wire_format() {
        let json = serde_json::to_value(cell("x")).expect("cell serializes");
        assert!(json.get("image").is_none());
        assert!(json.get("preedit").is_none());
        // Always-present flags still appear, even when false.
        assert_eq!(json["selected"], false);
    }
}
