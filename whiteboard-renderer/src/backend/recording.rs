//! Backend that records operations instead of drawing.
//!
//! Useful for asserting what the replay engine asked for, and in which
//! order, without comparing pixels.

use whiteboard_core::{CommandKind, DrawCommand};

use crate::RenderResult;

use super::RenderBackend;

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderOp {
    /// Surface reset.
    Clear,
    /// A command was drawn.
    Draw(DrawCommand),
    /// Surface resized.
    Resize {
        /// New width.
        width: u32,
        /// New height.
        height: u32,
    },
}

/// Recording renderer.
#[derive(Debug, Clone)]
pub struct RecordingBackend {
    ops: Vec<RenderOp>,
    width: u32,
    height: u32,
}

impl RecordingBackend {
    /// Create a new recording backend.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ops: Vec::new(),
            width: 800,
            height: 600,
        }
    }

    /// Everything recorded so far.
    #[must_use]
    pub fn ops(&self) -> &[RenderOp] {
        &self.ops
    }

    /// Forget recorded operations.
    pub fn reset(&mut self) {
        self.ops.clear();
    }

    /// Commands drawn since the last clear, in order.
    #[must_use]
    pub fn visible(&self) -> Vec<&DrawCommand> {
        let start = self
            .ops
            .iter()
            .rposition(|op| matches!(op, RenderOp::Clear | RenderOp::Resize { .. }))
            .map_or(0, |i| i + 1);
        self.ops[start..]
            .iter()
            .filter_map(|op| match op {
                RenderOp::Draw(cmd) => Some(cmd),
                _ => None,
            })
            .collect()
    }
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderBackend for RecordingBackend {
    fn clear(&mut self) -> RenderResult<()> {
        self.ops.push(RenderOp::Clear);
        Ok(())
    }

    fn draw(&mut self, command: &DrawCommand) -> RenderResult<()> {
        if command.kind() == CommandKind::Clear {
            return self.clear();
        }
        tracing::trace!(kind = %command.kind(), "Recording draw");
        self.ops.push(RenderOp::Draw(command.clone()));
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> RenderResult<()> {
        self.width = width;
        self.height = height;
        self.ops.push(RenderOp::Resize { width, height });
        Ok(())
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
