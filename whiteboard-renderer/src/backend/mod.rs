//! Rendering backend implementations.

pub mod raster;
pub mod recording;

use whiteboard_core::DrawCommand;

use crate::RenderResult;

/// Trait for rendering backends.
///
/// A backend owns a drawing surface. It does not know about logs or
/// sessions; the [`ReplayEngine`](crate::ReplayEngine) feeds it commands
/// in order.
pub trait RenderBackend {
    /// Reset the surface to its background.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface cannot be reset.
    fn clear(&mut self) -> RenderResult<()>;

    /// Draw one command on top of the current surface.
    ///
    /// # Errors
    ///
    /// Returns an error if drawing fails.
    fn draw(&mut self, command: &DrawCommand) -> RenderResult<()>;

    /// Resize the rendering surface. Contents are discarded.
    ///
    /// # Errors
    ///
    /// Returns an error if resizing fails.
    fn resize(&mut self, width: u32, height: u32) -> RenderResult<()>;

    /// Current surface size in pixels.
    fn size(&self) -> (u32, u32);
}
