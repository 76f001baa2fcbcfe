//! Drawing commands - the entries of a session log.
//!
//! A [`DrawCommand`] is immutable once built and always valid: the only
//! ways to obtain one are the checked constructors and deserialization
//! through [`CommandPayload`], both of which reject incomplete geometry.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::error::{CommandError, CommandResult};

/// Default stroke width in pixels.
pub const DEFAULT_LINE_WIDTH: f32 = 1.0;

/// A point in canvas coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// X position (pixels from left).
    pub x: f32,
    /// Y position (pixels from top).
    pub y: f32,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance_to(self, other: Self) -> f32 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    /// Whether both coordinates are finite.
    #[must_use]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// One straight piece of a pencil stroke.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Segment start.
    pub start: Point,
    /// Segment end.
    pub end: Point,
}

impl Segment {
    /// Create a new segment.
    #[must_use]
    pub const fn new(start: Point, end: Point) -> Self {
        Self { start, end }
    }
}

/// Discriminant of a [`Shape`], as named on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CommandKind {
    /// A single dot.
    Dot,
    /// A straight line.
    Line,
    /// A freehand stroke.
    PencilStroke,
    /// A circle outline or disc.
    Circle,
    /// Wipe the surface.
    Clear,
}

impl CommandKind {
    /// Wire name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dot => "dot",
            Self::Line => "line",
            Self::PencilStroke => "pencilStroke",
            Self::Circle => "circle",
            Self::Clear => "clear",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Geometry of a drawing command.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// A dot whose diameter is the line width.
    Dot {
        /// Dot center.
        at: Point,
    },
    /// A straight line.
    Line {
        /// Line start.
        start: Point,
        /// Line end.
        end: Point,
    },
    /// Connected segments sharing one style, committed as one undo step.
    PencilStroke {
        /// Stroke segments in drawing order.
        segments: Vec<Segment>,
    },
    /// A circle; a zero radius is legal.
    Circle {
        /// Circle center.
        center: Point,
        /// Circle radius.
        radius: f32,
        /// Fill the disc instead of stroking the outline.
        filled: bool,
    },
    /// Reset the surface. Earlier commands stay in the log for undo.
    Clear,
}

impl Shape {
    /// The kind of this shape.
    #[must_use]
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Dot { .. } => CommandKind::Dot,
            Self::Line { .. } => CommandKind::Line,
            Self::PencilStroke { .. } => CommandKind::PencilStroke,
            Self::Circle { .. } => CommandKind::Circle,
            Self::Clear => CommandKind::Clear,
        }
    }
}

/// Stroke style shared by every part of a command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Style {
    /// Stroke width in pixels, always positive.
    pub line_width: f32,
    /// Stroke (and fill) color.
    pub color: Color,
}

impl Style {
    /// Create a style.
    #[must_use]
    pub const fn new(line_width: f32, color: Color) -> Self {
        Self { line_width, color }
    }
}

impl Default for Style {
    fn default() -> Self {
        Self {
            line_width: DEFAULT_LINE_WIDTH,
            color: Color::BLACK,
        }
    }
}

/// A validated, immutable drawing command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CommandPayload", into = "CommandPayload")]
pub struct DrawCommand {
    shape: Shape,
    style: Style,
}

impl DrawCommand {
    /// Build a command, validating geometry and style.
    ///
    /// The style of a [`Shape::Clear`] is irrelevant and normalized to the
    /// default.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError`] if the geometry is incomplete or degenerate,
    /// or if the line width is not a positive finite number.
    pub fn new(shape: Shape, style: Style) -> CommandResult<Self> {
        let kind = shape.kind();
        if kind == CommandKind::Clear {
            return Ok(Self::clear());
        }

        if !style.line_width.is_finite() {
            return Err(CommandError::NonFinite {
                kind,
                field: "lineWidth",
            });
        }
        if style.line_width <= 0.0 {
            return Err(CommandError::InvalidLineWidth(style.line_width));
        }

        match &shape {
            Shape::Dot { at } => check_point(kind, "start", *at)?,
            Shape::Line { start, end } => {
                check_point(kind, "start", *start)?;
                check_point(kind, "end", *end)?;
            }
            Shape::PencilStroke { segments } => {
                if segments.is_empty() {
                    return Err(CommandError::EmptyStroke);
                }
                for segment in segments {
                    check_point(kind, "actions", segment.start)?;
                    check_point(kind, "actions", segment.end)?;
                }
            }
            Shape::Circle { center, radius, .. } => {
                check_point(kind, "start", *center)?;
                if !radius.is_finite() {
                    return Err(CommandError::NonFinite {
                        kind,
                        field: "radius",
                    });
                }
                if *radius < 0.0 {
                    return Err(CommandError::NegativeRadius(*radius));
                }
            }
            Shape::Clear => {}
        }

        Ok(Self { shape, style })
    }

    /// A dot.
    ///
    /// # Errors
    ///
    /// See [`DrawCommand::new`].
    pub fn dot(at: Point, style: Style) -> CommandResult<Self> {
        Self::new(Shape::Dot { at }, style)
    }

    /// A straight line.
    ///
    /// # Errors
    ///
    /// See [`DrawCommand::new`].
    pub fn line(start: Point, end: Point, style: Style) -> CommandResult<Self> {
        Self::new(Shape::Line { start, end }, style)
    }

    /// A pencil stroke made of the given segments.
    ///
    /// # Errors
    ///
    /// See [`DrawCommand::new`].
    pub fn pencil(segments: Vec<Segment>, style: Style) -> CommandResult<Self> {
        Self::new(Shape::PencilStroke { segments }, style)
    }

    /// A circle.
    ///
    /// # Errors
    ///
    /// See [`DrawCommand::new`].
    pub fn circle(center: Point, radius: f32, filled: bool, style: Style) -> CommandResult<Self> {
        Self::new(
            Shape::Circle {
                center,
                radius,
                filled,
            },
            style,
        )
    }

    /// A clear command.
    #[must_use]
    pub fn clear() -> Self {
        Self {
            shape: Shape::Clear,
            style: Style::default(),
        }
    }

    /// The command geometry.
    #[must_use]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// The command style.
    #[must_use]
    pub fn style(&self) -> Style {
        self.style
    }

    /// The command kind.
    #[must_use]
    pub fn kind(&self) -> CommandKind {
        self.shape.kind()
    }

    /// Whether this command wipes the surface.
    #[must_use]
    pub fn is_clear(&self) -> bool {
        matches!(self.shape, Shape::Clear)
    }
}

fn check_point(kind: CommandKind, field: &'static str, point: Point) -> CommandResult<()> {
    if point.is_finite() {
        Ok(())
    } else {
        Err(CommandError::NonFinite { kind, field })
    }
}

fn default_line_width() -> f32 {
    DEFAULT_LINE_WIDTH
}

/// Wire form of a drawing command.
///
/// Every geometry field is optional here; [`DrawCommand::try_from`]
/// checks that the fields required by `kind` are present.
///
/// - `dot`: `start`
/// - `line`: `start`, `end`
/// - `pencilStroke`: non-empty `actions`
/// - `circle`: `start` plus `radius` or `end` (radius = distance to `end`)
/// - `clear`: nothing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandPayload {
    /// Command kind.
    pub kind: CommandKind,
    /// Start point, dot position or circle center.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<Point>,
    /// Line end or a point on the circle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<Point>,
    /// Explicit circle radius.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<f32>,
    /// Pencil stroke segments.
    #[serde(default, skip_serializing_if = "Vec::is_empty", alias = "segments")]
    pub actions: Vec<Segment>,
    /// Stroke width in pixels.
    #[serde(default = "default_line_width")]
    pub line_width: f32,
    /// Stroke color.
    #[serde(default)]
    pub color: Color,
    /// Fill a circle.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub filled: bool,
}

impl CommandPayload {
    /// An empty payload of the given kind with default style.
    #[must_use]
    pub fn new(kind: CommandKind) -> Self {
        Self {
            kind,
            start: None,
            end: None,
            radius: None,
            actions: Vec::new(),
            line_width: DEFAULT_LINE_WIDTH,
            color: Color::BLACK,
            filled: false,
        }
    }
}

impl TryFrom<CommandPayload> for DrawCommand {
    type Error = CommandError;

    fn try_from(payload: CommandPayload) -> Result<Self, Self::Error> {
        let kind = payload.kind;
        let missing = |field| CommandError::MissingField { kind, field };
        let style = Style::new(payload.line_width, payload.color);

        let shape = match kind {
            CommandKind::Dot => Shape::Dot {
                at: payload.start.ok_or_else(|| missing("start"))?,
            },
            CommandKind::Line => Shape::Line {
                start: payload.start.ok_or_else(|| missing("start"))?,
                end: payload.end.ok_or_else(|| missing("end"))?,
            },
            CommandKind::PencilStroke => Shape::PencilStroke {
                segments: payload.actions,
            },
            CommandKind::Circle => {
                let center = payload.start.ok_or_else(|| missing("start"))?;
                let radius = match (payload.radius, payload.end) {
                    (Some(radius), _) => radius,
                    (None, Some(edge)) => center.distance_to(edge),
                    (None, None) => return Err(missing("end")),
                };
                Shape::Circle {
                    center,
                    radius,
                    filled: payload.filled,
                }
            }
            CommandKind::Clear => Shape::Clear,
        };

        Self::new(shape, style)
    }
}

impl From<DrawCommand> for CommandPayload {
    fn from(command: DrawCommand) -> Self {
        let mut payload = Self::new(command.kind());
        payload.line_width = command.style.line_width;
        payload.color = command.style.color;

        match command.shape {
            Shape::Dot { at } => payload.start = Some(at),
            Shape::Line { start, end } => {
                payload.start = Some(start);
                payload.end = Some(end);
            }
            Shape::PencilStroke { segments } => payload.actions = segments,
            Shape::Circle {
                center,
                radius,
                filled,
            } => {
                payload.start = Some(center);
                payload.radius = Some(radius);
                payload.filled = filled;
            }
            Shape::Clear => {}
        }
        payload
    }
}
