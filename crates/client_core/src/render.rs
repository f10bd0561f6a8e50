//! Pure scene drawing from a merged view.

use std::fmt::Write as _;

use shared::domain::{Coordinate, DriverStatus};
use tracing::debug;

use crate::store::MergedView;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color(pub &'static str);

pub const EDGE_STROKE: Color = Color("#999");
pub const EDGE_LABEL: Color = Color("#333");
pub const NODE_FILL: Color = Color("#50bfe6");
pub const NODE_LABEL: Color = Color("#fff");
pub const DRIVER_ON_TRIP: Color = Color("#ffb84d");
pub const DRIVER_IDLE: Color = Color("#f4d03f");
pub const DRIVER_LABEL: Color = Color("#000");

const EDGE_WIDTH: f64 = 2.0;
const NODE_RADIUS: f64 = 16.0;
const MARKER_SIZE: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Font {
    pub size: f64,
    pub bold: bool,
}

const WEIGHT_FONT: Font = Font {
    size: 12.0,
    bold: false,
};
const NODE_FONT: Font = Font {
    size: 12.0,
    bold: true,
};
const DRIVER_FONT: Font = Font {
    size: 11.0,
    bold: false,
};

/// 2-D drawing target.
pub trait Surface {
    fn clear(&mut self);
    fn line(&mut self, from: Coordinate, to: Coordinate, stroke: Color, width: f64);
    fn circle(&mut self, center: Coordinate, radius: f64, fill: Color);
    fn rect(&mut self, origin: Coordinate, width: f64, height: f64, fill: Color);
    fn text(&mut self, at: Coordinate, text: &str, fill: Color, font: Font);
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Line {
        from: Coordinate,
        to: Coordinate,
        stroke: Color,
        width: f64,
    },
    Circle {
        center: Coordinate,
        radius: f64,
        fill: Color,
    },
    Rect {
        origin: Coordinate,
        width: f64,
        height: f64,
        fill: Color,
    },
    Text {
        at: Coordinate,
        text: String,
        fill: Color,
        font: Font,
    },
}

/// Recording surface; the value broadcast to front-ends after each pass.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Scene {
    pub commands: Vec<DrawCommand>,
}

impl Scene {
    pub fn circles(&self) -> usize {
        self.commands
            .iter()
            .filter(|command| matches!(command, DrawCommand::Circle { .. }))
            .count()
    }

    pub fn rects(&self) -> usize {
        self.commands
            .iter()
            .filter(|command| matches!(command, DrawCommand::Rect { .. }))
            .count()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.commands.iter().filter_map(|command| match command {
            DrawCommand::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn to_svg(&self, width: u32, height: u32) -> String {
        let mut out = format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{width}\" height=\"{height}\" viewBox=\"0 0 {width} {height}\">\n"
        );
        for command in &self.commands {
            let _ = match command {
                DrawCommand::Line {
                    from,
                    to,
                    stroke,
                    width,
                } => writeln!(
                    out,
                    "  <line x1=\"{}\" y1=\"{}\" x2=\"{}\" y2=\"{}\" stroke=\"{}\" stroke-width=\"{}\"/>",
                    from.x, from.y, to.x, to.y, stroke.0, width
                ),
                DrawCommand::Circle {
                    center,
                    radius,
                    fill,
                } => writeln!(
                    out,
                    "  <circle cx=\"{}\" cy=\"{}\" r=\"{}\" fill=\"{}\"/>",
                    center.x, center.y, radius, fill.0
                ),
                DrawCommand::Rect {
                    origin,
                    width,
                    height,
                    fill,
                } => writeln!(
                    out,
                    "  <rect x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" fill=\"{}\"/>",
                    origin.x, origin.y, width, height, fill.0
                ),
                DrawCommand::Text { at, text, fill, font } => writeln!(
                    out,
                    "  <text x=\"{}\" y=\"{}\" fill=\"{}\" font-family=\"Arial\" font-size=\"{}\"{}>{}</text>",
                    at.x,
                    at.y,
                    fill.0,
                    font.size,
                    if font.bold { " font-weight=\"bold\"" } else { "" },
                    escape_xml(text)
                ),
            };
        }
        out.push_str("</svg>\n");
        out
    }
}

fn escape_xml(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

impl Surface for Scene {
    fn clear(&mut self) {
        self.commands.clear();
    }

    fn line(&mut self, from: Coordinate, to: Coordinate, stroke: Color, width: f64) {
        self.commands.push(DrawCommand::Line {
            from,
            to,
            stroke,
            width,
        });
    }

    fn circle(&mut self, center: Coordinate, radius: f64, fill: Color) {
        self.commands.push(DrawCommand::Circle {
            center,
            radius,
            fill,
        });
    }

    fn rect(&mut self, origin: Coordinate, width: f64, height: f64, fill: Color) {
        self.commands.push(DrawCommand::Rect {
            origin,
            width,
            height,
            fill,
        });
    }

    fn text(&mut self, at: Coordinate, text: &str, fill: Color, font: Font) {
        self.commands.push(DrawCommand::Text {
            at,
            text: text.to_string(),
            fill,
            font,
        });
    }
}

pub fn driver_color(status: DriverStatus) -> Color {
    match status {
        DriverStatus::OnTrip => DRIVER_ON_TRIP,
        DriverStatus::Idle => DRIVER_IDLE,
    }
}

fn format_weight(weight: f64) -> String {
    if weight.fract() == 0.0 {
        format!("{weight:.0}")
    } else {
        weight.to_string()
    }
}

/// Draws edges, then nodes, then drivers. Output depends only on `view`.
pub fn draw(view: &MergedView, surface: &mut dyn Surface) {
    let snapshot = &view.snapshot;
    surface.clear();

    for edge in &snapshot.edges {
        let (Some(&from), Some(&to)) = (snapshot.nodes.get(&edge.from), snapshot.nodes.get(&edge.to))
        else {
            debug!(from = %edge.from, to = %edge.to, "render: skipping dangling edge");
            continue;
        };
        surface.line(from, to, EDGE_STROKE, EDGE_WIDTH);
        let mid = from.midpoint(to);
        surface.text(
            Coordinate::new(mid.x + 6.0, mid.y + 6.0),
            &format_weight(edge.weight),
            EDGE_LABEL,
            WEIGHT_FONT,
        );
    }

    for (node_id, &at) in &snapshot.nodes {
        surface.circle(at, NODE_RADIUS, NODE_FILL);
        surface.text(
            Coordinate::new(at.x - 6.0, at.y + 5.0),
            node_id.as_str(),
            NODE_LABEL,
            NODE_FONT,
        );
    }

    for (driver_id, driver) in &snapshot.drivers {
        let Some(&at) = snapshot.nodes.get(&driver.location) else {
            debug!(driver = %driver_id, node = %driver.location, "render: driver off the map");
            continue;
        };
        surface.rect(
            Coordinate::new(at.x - 10.0, at.y - 12.0),
            MARKER_SIZE,
            MARKER_SIZE,
            driver_color(driver.status),
        );
        surface.text(
            Coordinate::new(at.x - 8.0, at.y + 4.0),
            driver_id.as_str(),
            DRIVER_LABEL,
            DRIVER_FONT,
        );
    }
}

pub fn render_scene(view: &MergedView) -> Scene {
    let mut scene = Scene::default();
    draw(view, &mut scene);
    scene
}

#[cfg(test)]
#[path = "tests/render_tests.rs"]
mod tests;
