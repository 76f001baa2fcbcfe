//! Turns pointer input into drawing commands.
//!
//! Pointer motion between press and release is buffered into a single
//! pending command, so one gesture is one log entry and one undo step.
//! The command is emitted when the pointer is released, or when it leaves
//! the surface while still pressed.

use whiteboard_core::{CommandResult, DrawCommand, Point, Segment, Style};

/// Active drawing tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tool {
    /// Freehand stroke.
    #[default]
    Pencil,
    /// Straight line from press to release.
    Line,
    /// Circle centered on the press point, passing through the release point.
    Circle,
    /// Single dot at the press point.
    Dot,
}

/// Phase of a pointer event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerPhase {
    /// Button pressed.
    Down,
    /// Pointer moved.
    Move,
    /// Button released.
    Up,
    /// Pointer left the surface.
    Leave,
}

/// A pointer event in canvas coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    /// Event phase.
    pub phase: PointerPhase,
    /// Pointer position. Ignored for [`PointerPhase::Leave`].
    pub point: Point,
}

impl PointerEvent {
    /// Create a pointer event.
    #[must_use]
    pub const fn new(phase: PointerPhase, point: Point) -> Self {
        Self { phase, point }
    }
}

#[derive(Debug, Clone)]
enum Pending {
    Pencil { last: Point, segments: Vec<Segment> },
    Line { start: Point, end: Point },
    Circle { center: Point, edge: Point },
    Dot { at: Point },
}

impl Pending {
    fn begin(tool: Tool, at: Point) -> Self {
        match tool {
            Tool::Pencil => Self::Pencil {
                last: at,
                segments: Vec::new(),
            },
            Tool::Line => Self::Line { start: at, end: at },
            Tool::Circle => Self::Circle {
                center: at,
                edge: at,
            },
            Tool::Dot => Self::Dot { at },
        }
    }

    fn extend(&mut self, to: Point) {
        match self {
            Self::Pencil { last, segments } => {
                if *last != to {
                    segments.push(Segment::new(*last, to));
                    *last = to;
                }
            }
            Self::Line { end, .. } => *end = to,
            Self::Circle { edge, .. } => *edge = to,
            Self::Dot { .. } => {}
        }
    }

    /// `None` for a pencil gesture that never moved.
    fn build(&self, style: Style, filled: bool) -> Option<CommandResult<DrawCommand>> {
        match self {
            Self::Pencil { segments, .. } if segments.is_empty() => None,
            Self::Pencil { segments, .. } => Some(DrawCommand::pencil(segments.clone(), style)),
            Self::Line { start, end } => Some(DrawCommand::line(*start, *end, style)),
            Self::Circle { center, edge } => Some(DrawCommand::circle(
                *center,
                center.distance_to(*edge),
                filled,
                style,
            )),
            Self::Dot { at } => Some(DrawCommand::dot(*at, style)),
        }
    }
}

/// Buffers one pointer gesture into a pending command.
#[derive(Debug, Clone, Default)]
pub struct StrokeBuilder {
    tool: Tool,
    style: Style,
    filled: bool,
    pending: Option<Pending>,
}

impl StrokeBuilder {
    /// Create a builder for the given tool and style.
    #[must_use]
    pub fn new(tool: Tool, style: Style) -> Self {
        Self {
            tool,
            style,
            filled: false,
            pending: None,
        }
    }

    /// The active tool.
    #[must_use]
    pub fn tool(&self) -> Tool {
        self.tool
    }

    /// Switch tools. Any gesture in progress is discarded.
    pub fn set_tool(&mut self, tool: Tool) {
        if self.pending.take().is_some() {
            tracing::debug!(?tool, "Tool changed mid-gesture, discarding pending stroke");
        }
        self.tool = tool;
    }

    /// The style applied to new commands.
    #[must_use]
    pub fn style(&self) -> Style {
        self.style
    }

    /// Set the style applied to new commands.
    pub fn set_style(&mut self, style: Style) {
        self.style = style;
    }

    /// Whether circles are filled.
    #[must_use]
    pub fn filled(&self) -> bool {
        self.filled
    }

    /// Fill circles instead of stroking them.
    pub fn set_filled(&mut self, filled: bool) {
        self.filled = filled;
    }

    /// Whether a gesture is in progress.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.pending.is_some()
    }

    /// The command the current gesture would produce if released now.
    #[must_use]
    pub fn preview(&self) -> Option<DrawCommand> {
        self.pending
            .as_ref()
            .and_then(|p| p.build(self.style, self.filled))
            .and_then(Result::ok)
    }

    /// Feed one pointer event.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError`](whiteboard_core::CommandError) if the
    /// finished gesture does not form a valid command, for instance with a
    /// non-positive line width. The gesture is discarded either way.
    pub fn handle(&mut self, event: PointerEvent) -> CommandResult<Option<DrawCommand>> {
        match event.phase {
            PointerPhase::Down => {
                self.press(event.point);
                Ok(None)
            }
            PointerPhase::Move => {
                self.motion(event.point);
                Ok(None)
            }
            PointerPhase::Up => self.release(event.point),
            PointerPhase::Leave => self.leave(),
        }
    }

    /// Start a gesture.
    pub fn press(&mut self, at: Point) {
        if self.pending.is_some() {
            tracing::debug!("Press without release, restarting gesture");
        }
        self.pending = Some(Pending::begin(self.tool, at));
    }

    /// Extend the current gesture. Ignored when not pressed.
    pub fn motion(&mut self, to: Point) {
        if let Some(pending) = self.pending.as_mut() {
            pending.extend(to);
        }
    }

    /// Finish the gesture at `at`.
    ///
    /// # Errors
    ///
    /// See [`StrokeBuilder::handle`].
    pub fn release(&mut self, at: Point) -> CommandResult<Option<DrawCommand>> {
        self.motion(at);
        self.finish()
    }

    /// The pointer left the surface; finish any gesture at its last point.
    ///
    /// # Errors
    ///
    /// See [`StrokeBuilder::handle`].
    pub fn leave(&mut self) -> CommandResult<Option<DrawCommand>> {
        self.finish()
    }

    fn finish(&mut self) -> CommandResult<Option<DrawCommand>> {
        match self.pending.take() {
            Some(pending) => pending.build(self.style, self.filled).transpose(),
            None => Ok(None),
        }
    }
}
