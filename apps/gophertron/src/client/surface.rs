use crate::client::canvas::Canvas;
use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::{Color, Style};
use ratatui::symbols::Marker;
use ratatui::text::Span;
use ratatui::widgets::canvas::{Canvas as CanvasWidget, Line as CanvasLine};
use ratatui::widgets::{Block, Borders, Widget};
use std::str::FromStr;
use tracing::debug;

pub const DEFAULT_SURFACE_WIDTH: f64 = 500.0;
pub const DEFAULT_SURFACE_HEIGHT: f64 = 500.0;

const FALLBACK_COLOR: Color = Color::White;
const TEXT_COLOR: Color = Color::Gray;
// Strokes at least this wide are drawn with half blocks instead of braille dots.
const WIDE_STROKE: f64 = 5.0;

type Point = (f64, f64);

#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub from: Point,
    pub to: Point,
    pub color: Color,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub text: String,
    pub at: Point,
    pub color: Color,
}

/// Canvas backed by a display list that is painted into a terminal frame
/// with ratatui's canvas widget.
///
/// `stroke` commits the segments added since the previous `stroke` or
/// `begin_path` in the current stroke color, so consecutive strokes with
/// different colors keep their own segments.
#[derive(Debug, Clone)]
pub struct TerminalSurface {
    width: f64,
    height: f64,
    segments: Vec<Segment>,
    labels: Vec<Label>,
    pending: Vec<(Point, Point)>,
    pen: Option<Point>,
    stroke_color: Color,
    line_width: f64,
    dirty: bool,
}

impl TerminalSurface {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width: width.max(1.0),
            height: height.max(1.0),
            segments: Vec::new(),
            labels: Vec::new(),
            pending: Vec::new(),
            pen: None,
            stroke_color: FALLBACK_COLOR,
            line_width: 1.0,
            dirty: true,
        }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn line_width(&self) -> f64 {
        self.line_width
    }

    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    // Surface y grows downward, the widget's y grows upward.
    fn flip(&self, y: f64) -> f64 {
        self.height - y
    }

    fn marker(&self) -> Marker {
        if self.line_width >= WIDE_STROKE {
            Marker::HalfBlock
        } else {
            Marker::Braille
        }
    }
}

impl Default for TerminalSurface {
    fn default() -> Self {
        Self::new(DEFAULT_SURFACE_WIDTH, DEFAULT_SURFACE_HEIGHT)
    }
}

/// Parse a CSS-ish color (`#b71c1c`, `red`, `light-blue`).
pub fn parse_color(value: &str) -> Option<Color> {
    Color::from_str(value.trim()).ok()
}

impl Canvas for TerminalSurface {
    fn clear(&mut self) {
        self.segments.clear();
        self.labels.clear();
        self.pending.clear();
        self.pen = None;
        self.dirty = true;
    }

    fn begin_path(&mut self) {
        self.pending.clear();
        self.pen = None;
    }

    // Non-finite points are ignored, leaving the pen where it was.
    fn move_to(&mut self, x: f64, y: f64) {
        if !(x.is_finite() && y.is_finite()) {
            return;
        }
        self.pen = Some((x, y));
    }

    fn line_to(&mut self, x: f64, y: f64) {
        if !(x.is_finite() && y.is_finite()) {
            return;
        }
        // Without a current point, line_to only starts a subpath.
        if let Some(from) = self.pen {
            self.pending.push((from, (x, y)));
        }
        self.pen = Some((x, y));
    }

    fn stroke(&mut self) {
        let color = self.stroke_color;
        self.segments.extend(
            self.pending
                .drain(..)
                .map(|(from, to)| Segment { from, to, color }),
        );
        self.dirty = true;
    }

    fn set_line_width(&mut self, width: f64) {
        if width.is_finite() && width > 0.0 {
            self.line_width = width;
        }
    }

    fn set_stroke_color(&mut self, color: &str) {
        self.stroke_color = parse_color(color).unwrap_or_else(|| {
            debug!(target: "gophertron::surface", color, "unrecognized stroke color");
            FALLBACK_COLOR
        });
    }

    fn fill_text(&mut self, text: &str, x: f64, y: f64) {
        self.labels.push(Label {
            text: text.to_string(),
            at: (x, y),
            color: TEXT_COLOR,
        });
        self.dirty = true;
    }
}

impl Widget for &TerminalSurface {
    fn render(self, area: Rect, buf: &mut Buffer) {
        CanvasWidget::default()
            .block(Block::default().borders(Borders::ALL).title(" gophertron "))
            .marker(self.marker())
            .x_bounds([0.0, self.width])
            .y_bounds([0.0, self.height])
            .paint(|ctx| {
                for segment in &self.segments {
                    ctx.draw(&CanvasLine::new(
                        segment.from.0,
                        self.flip(segment.from.1),
                        segment.to.0,
                        self.flip(segment.to.1),
                        segment.color,
                    ));
                }
                for label in &self.labels {
                    ctx.print(
                        label.at.0,
                        self.flip(label.at.1),
                        Span::styled(label.text.clone(), Style::default().fg(label.color)),
                    );
                }
            })
            .render(area, buf);
    }
}
