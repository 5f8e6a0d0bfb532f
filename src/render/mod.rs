//! Frame assembly: flat render records, the deterministic builder, and the
//! double-buffered swap discipline.

pub mod builder;
pub mod double_buffer;
pub mod frame;

pub use builder::{build_render_buffer, RenderOverlays};
pub use double_buffer::{RenderBufferRef, RenderBufferState, RenderDoubleBuffer};
pub use frame::{
    RenderBuffer, RenderCell, RenderCursor, RenderImageFragment, RenderLine, StyledSpan,
};
