//! CPU raster backend built on tiny-skia.
//!
//! Produces real pixels, so two replicas can be compared byte for byte.

use tiny_skia::{FillRule, LineCap, LineJoin, Paint, Path, PathBuilder, Pixmap, Stroke, Transform};
use whiteboard_core::{Color, DrawCommand, Point, Segment, Shape, Style};

use crate::{RenderError, RenderResult, RendererConfig};

use super::RenderBackend;

/// Raster renderer backed by a [`Pixmap`].
pub struct RasterBackend {
    pixmap: Pixmap,
    background: Color,
    anti_alias: bool,
}

impl RasterBackend {
    /// Create a raster backend.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::InvalidSurfaceSize`] if either dimension is zero.
    pub fn new(config: &RendererConfig) -> RenderResult<Self> {
        let mut backend = Self {
            pixmap: new_pixmap(config.width, config.height)?,
            background: config.background,
            anti_alias: config.anti_aliasing,
        };
        backend.fill_background();
        Ok(backend)
    }

    /// The underlying pixmap.
    #[must_use]
    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    /// Raw premultiplied RGBA bytes of the surface.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.pixmap.data()
    }

    /// Color of one pixel, or `None` outside the surface.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<Color> {
        self.pixmap.pixel(x, y).map(|p| {
            let c = p.demultiply();
            Color::rgba(c.red(), c.green(), c.blue(), c.alpha())
        })
    }

    /// Whether every pixel equals the background.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        let bg = to_skia(self.background).premultiply().to_color_u8();
        self.pixmap.pixels().iter().all(|p| *p == bg)
    }

    /// Encode the surface as PNG.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Encode`] if PNG encoding fails.
    pub fn encode_png(&self) -> RenderResult<Vec<u8>> {
        self.pixmap
            .encode_png()
            .map_err(|e| RenderError::Encode(e.to_string()))
    }

    fn fill_background(&mut self) {
        self.pixmap.fill(to_skia(self.background));
    }

    fn paint(&self, color: Color) -> Paint<'static> {
        let mut paint = Paint::default();
        paint.set_color_rgba8(color.r, color.g, color.b, color.a);
        paint.anti_alias = self.anti_alias;
        paint
    }

    fn fill_disc(&mut self, center: Point, radius: f32, color: Color) {
        let Some(path) = PathBuilder::from_circle(center.x, center.y, radius) else {
            tracing::trace!(?center, radius, "Skipping degenerate disc");
            return;
        };
        let paint = self.paint(color);
        self.pixmap
            .fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
    }

    fn stroke(&mut self, path: &Path, style: Style) {
        let paint = self.paint(style.color);
        let stroke = Stroke {
            width: style.line_width,
            line_cap: LineCap::Round,
            line_join: LineJoin::Round,
            ..Stroke::default()
        };
        self.pixmap
            .stroke_path(path, &paint, &stroke, Transform::identity(), None);
    }

    fn stroke_segments(&mut self, segments: &[Segment], style: Style) {
        let mut pb = PathBuilder::new();
        let mut cursor: Option<Point> = None;
        for segment in segments {
            if segment.start == segment.end {
                // A zero-length round-capped stroke renders as a dot.
                self.fill_disc(segment.start, style.line_width / 2.0, style.color);
                continue;
            }
            if cursor != Some(segment.start) {
                pb.move_to(segment.start.x, segment.start.y);
            }
            pb.line_to(segment.end.x, segment.end.y);
            cursor = Some(segment.end);
        }
        if let Some(path) = pb.finish() {
            self.stroke(&path, style);
        }
    }
}

impl RenderBackend for RasterBackend {
    fn clear(&mut self) -> RenderResult<()> {
        self.fill_background();
        Ok(())
    }

    fn draw(&mut self, command: &DrawCommand) -> RenderResult<()> {
        let style = command.style();
        match command.shape() {
            Shape::Dot { at } => self.fill_disc(*at, style.line_width / 2.0, style.color),
            Shape::Line { start, end } => {
                self.stroke_segments(&[Segment::new(*start, *end)], style);
            }
            Shape::PencilStroke { segments } => self.stroke_segments(segments, style),
            Shape::Circle {
                center,
                radius,
                filled,
            } => {
                if *radius <= 0.0 {
                    tracing::trace!(?center, "Skipping zero radius circle");
                } else if *filled {
                    self.fill_disc(*center, *radius, style.color);
                } else if let Some(path) = PathBuilder::from_circle(center.x, center.y, *radius) {
                    self.stroke(&path, style);
                } else {
                    tracing::trace!(?center, radius, "Skipping degenerate circle outline");
                }
            }
            Shape::Clear => self.fill_background(),
        }
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> RenderResult<()> {
        self.pixmap = new_pixmap(width, height)?;
        self.fill_background();
        tracing::debug!("Raster surface resized to {}x{}", width, height);
        Ok(())
    }

    fn size(&self) -> (u32, u32) {
        (self.pixmap.width(), self.pixmap.height())
    }
}

fn new_pixmap(width: u32, height: u32) -> RenderResult<Pixmap> {
    Pixmap::new(width, height).ok_or(RenderError::InvalidSurfaceSize { width, height })
}

fn to_skia(color: Color) -> tiny_skia::Color {
    tiny_skia::Color::from_rgba8(color.r, color.g, color.b, color.a)
}
