//! The host-facing event sink. The terminal never calls these while
//! holding its state mutex; implementations may re-enter the host API.

use crate::grid::PageSize;
use crate::image::Image;
use crate::screen::ScreenType;

/// Input interpretation modes a host UI may surface (vi-style navigation
/// of the scrollback).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViMode {
    Insert,
    Normal,
    Visual,
}

/// Everything the core can tell its host. All methods default to no-ops so
/// hosts implement only what they surface.
pub trait Events: Send + Sync {
    /// Screen contents changed; a refresh may be worthwhile.
    fn screen_updated(&self) {}
    /// A new front render buffer is available.
    fn render_buffer_updated(&self) {}
    fn bell(&self) {}
    fn buffer_changed(&self, _screen: ScreenType) {}
    fn set_window_title(&self, _title: &str) {}
    fn set_tab_name(&self, _name: &str) {}
    fn copy_to_clipboard(&self, _text: &str) {}
    fn open_document(&self, _location: &str) {}
    fn notify(&self, _title: &str, _body: &str) {}
    fn request_window_resize_cells(&self, _size: PageSize) {}
    fn request_window_resize_pixels(&self, _width: u16, _height: u16) {}
    fn request_capture_buffer(&self, _lines: u16, _logical: bool) {}
    /// An image left the grid; release any GPU-side resources.
    fn discard_image(&self, _image: &Image) {}
    /// Host debug hook.
    fn inspect(&self) {}
    fn on_closed(&self) {}
    fn on_selection_completed(&self) {}
    fn input_mode_changed(&self, _mode: ViMode) {}
    fn set_terminal_profile(&self, _name: &str) {}
    fn cursor_position_changed(&self) {}
    fn on_scroll_offset_changed(&self, _offset: usize) {}
}

/// Sink that ignores everything; useful for tests and headless use.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEvents;

impl Events for NullEvents {}
