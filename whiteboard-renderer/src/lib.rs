//! # Whiteboard Renderer
//!
//! Client side of the whiteboard: mirrors a session's command log, turns
//! pointer gestures into drawing commands, and replays the log onto a
//! render backend.
//!
//! ## Pipeline
//!
//! ```text
//! ┌──────────────┐   commands   ┌──────────────┐   draw calls   ┌──────────────┐
//! │ ClientCanvas │ ───────────► │ ReplayEngine │ ─────────────► │ RenderBackend│
//! │  - replica   │              │              │                │  - Raster    │
//! │  - strokes   │              │              │                │  - Recording │
//! └──────────────┘              └──────────────┘                └──────────────┘
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod client;
pub mod error;
pub mod replay;
pub mod stroke;

pub use backend::raster::RasterBackend;
pub use backend::recording::{RecordingBackend, RenderOp};
pub use backend::RenderBackend;
pub use client::{ClientCanvas, ClientReplica, ReplicaUpdate};
pub use error::{RenderError, RenderResult};
pub use replay::ReplayEngine;
pub use stroke::{PointerEvent, PointerPhase, StrokeBuilder, Tool};

use whiteboard_core::Color;

/// Configuration for the raster renderer.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Surface width in pixels.
    pub width: u32,
    /// Surface height in pixels.
    pub height: u32,
    /// Enable anti-aliasing.
    pub anti_aliasing: bool,
    /// Color the surface is reset to.
    pub background: Color,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            anti_aliasing: true,
            background: Color::WHITE,
        }
    }
}
