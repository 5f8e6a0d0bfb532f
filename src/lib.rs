//! squall — a terminal emulator core.
//!
//! Consumes the byte stream of a child process over a PTY, interprets it
//! as VT control functions (ANSI/ECMA-48, DEC VT100..VT525, xterm and
//! contemporary extensions), maintains a character grid with scrollback,
//! and exposes immutable render-buffer snapshots for a front end to draw.
//!
//! The host wires a [`pty::Pty`] and an [`events::Events`] sink into a
//! [`terminal::Terminal`]; rendering is pull-based via
//! [`terminal::Terminal::refresh_render_buffer`] and
//! [`terminal::Terminal::render_buffer`].

pub mod buffer;
pub mod cell;
pub mod color;
pub mod cursor;
pub mod events;
pub mod functions;
pub mod grid;
pub mod hyperlink;
pub mod image;
pub mod input;
pub mod modes;
pub mod parser;
pub mod pty;
pub mod render;
pub mod screen;
pub mod selection;
pub mod sequence;
mod sequencer;
pub mod state;
pub mod terminal;
pub mod viewport;

pub use cell::{Cell, CellAttrs, CellFlags, Pen, UnderlineStyle};
pub use color::{Color, ColorPalette, ColorRole, RgbColor};
pub use cursor::{CursorDisplay, CursorShape};
pub use events::{Events, NullEvents, ViMode};
pub use functions::VtType;
pub use grid::{CellLocation, ColumnOffset, Grid, LineFlags, LineOffset, MaxHistoryLineCount, PageSize};
pub use input::{Key, KeyEventKind, Modifiers, MouseButton, MousePosition};
pub use modes::{AnsiMode, DecMode};
pub use pty::{PixelSize, ProcessPty, Pty};
pub use render::{RenderBuffer, RenderBufferRef, RenderBufferState, RenderCell, RenderCursor};
pub use screen::{Screen, ScreenType, StatusDisplayPosition, StatusDisplayType};
pub use selection::{Selection, SelectionKind, SelectionState};
pub use state::{EmulatorSettings, SixelCursorConformance};
pub use terminal::{ExecutionMode, Terminal};
pub use viewport::Viewport;
