//! Sample points for shape playback.
//!
//! All geometry is built in surface pixels (y down) so arc length and
//! rotations are isotropic; playback converts to texcoords per tick.

use glam::Vec2;

use super::{ShapeInstance, ShapeKind};
use crate::grid::SurfaceSize;

const STROKE_SEGMENTS: usize = 16;
const ROUND_SEGMENTS: usize = 64;
const EDGE_SEGMENTS: usize = 8;

fn rotate(v: Vec2, degrees: f32) -> Vec2 {
    Vec2::from_angle(degrees.to_radians()).rotate(v)
}

fn subdivide(points: &mut Vec<Vec2>, a: Vec2, b: Vec2, segments: usize) {
    for i in 1..=segments {
        points.push(a.lerp(b, i as f32 / segments as f32));
    }
}

fn closed_curve(centre: Vec2, radii: Vec2, rotation: f32) -> Vec<Vec2> {
    (0..=ROUND_SEGMENTS)
        .map(|i| {
            let theta = i as f32 / ROUND_SEGMENTS as f32 * std::f32::consts::TAU;
            centre + rotate(Vec2::new(theta.cos(), theta.sin()) * radii, rotation)
        })
        .collect()
}

/// Every numeric pair in an SVG path string, in order. Commands are ignored,
/// so curves are traced through their control points.
pub fn svg_numeric_pairs(path_data: &str) -> Vec<Vec2> {
    let mut numbers = Vec::new();
    let mut current = String::new();
    let flush = |current: &mut String, numbers: &mut Vec<f32>| {
        if !current.is_empty() {
            if let Ok(n) = current.parse::<f32>() {
                numbers.push(n);
            }
            current.clear();
        }
    };

    for ch in path_data.chars() {
        match ch {
            '0'..='9' | '.' => {
                // A second decimal point starts a new number ("1.5.5")
                if ch == '.' && current.contains('.') {
                    flush(&mut current, &mut numbers);
                }
                current.push(ch);
            }
            '-' | '+' => {
                if !current.ends_with(['e', 'E']) {
                    flush(&mut current, &mut numbers);
                }
                current.push(ch);
            }
            'e' | 'E' if !current.is_empty() => current.push(ch),
            _ => flush(&mut current, &mut numbers),
        }
    }
    flush(&mut current, &mut numbers);

    numbers
        .chunks_exact(2)
        .map(|pair| Vec2::new(pair[0], pair[1]))
        .collect()
}

/// Build the pixel-space sample sequence for one occurrence.
pub fn sample_points(instance: &ShapeInstance, surface: SurfaceSize) -> Vec<Vec2> {
    let size = surface.as_vec2();
    let anchor = Vec2::new(instance.x, instance.y) / 100.0 * size;

    match &instance.kind {
        ShapeKind::Stroke(p) => {
            let end = anchor + rotate(Vec2::X * p.length, p.angle);
            let mut points = vec![anchor];
            subdivide(&mut points, anchor, end, STROKE_SEGMENTS);
            points
        }
        ShapeKind::Circle(p) => closed_curve(anchor, Vec2::splat(p.radius), 0.0),
        ShapeKind::Ellipse(p) => {
            closed_curve(anchor, Vec2::new(p.radius_x, p.radius_y), p.rotation)
        }
        ShapeKind::Rectangle(p) => {
            let half = Vec2::new(p.width, p.height) * 0.5;
            let corners = [
                Vec2::new(-half.x, -half.y),
                Vec2::new(half.x, -half.y),
                Vec2::new(half.x, half.y),
                Vec2::new(-half.x, half.y),
            ]
            .map(|c| anchor + rotate(c, p.rotation));
            let mut points = vec![corners[0]];
            for i in 0..4 {
                subdivide(&mut points, corners[i], corners[(i + 1) % 4], EDGE_SEGMENTS);
            }
            points
        }
        ShapeKind::Path(p) => {
            let Some(first) = p.points.first() else {
                return Vec::new();
            };
            let first = Vec2::new(first.x, first.y);
            p.points
                .iter()
                .map(|pt| anchor + (Vec2::new(pt.x, pt.y) - first) / 100.0 * size * p.scale)
                .collect()
        }
        ShapeKind::Svg(p) => svg_numeric_pairs(&p.path_data)
            .into_iter()
            .map(|pt| anchor + rotate(pt * p.scale, p.rotation))
            .collect(),
    }
}

/// Sample points with cumulative arc length, for constant-speed tracing.
#[derive(Clone, Debug, PartialEq)]
pub struct Polyline {
    points: Vec<Vec2>,
    cumulative: Vec<f32>,
}

impl Polyline {
    pub fn new(points: Vec<Vec2>) -> Self {
        let mut cumulative = Vec::with_capacity(points.len());
        let mut total = 0.0;
        for (i, p) in points.iter().enumerate() {
            if i > 0 {
                total += p.distance(points[i - 1]);
            }
            cumulative.push(total);
        }
        Self { points, cumulative }
    }

    pub fn points(&self) -> &[Vec2] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn length(&self) -> f32 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    /// Point at fraction `t` of the arc length. Zero-length lines stay on
    /// their first point.
    pub fn point_at(&self, t: f32) -> Option<Vec2> {
        let first = *self.points.first()?;
        let total = self.length();
        if total <= 1e-4 {
            return Some(first);
        }
        let target = t.clamp(0.0, 1.0) * total;
        let i = self.cumulative.partition_point(|&d| d < target);
        if i == 0 {
            return Some(first);
        }
        if i >= self.points.len() {
            return self.points.last().copied();
        }
        let (d0, d1) = (self.cumulative[i - 1], self.cumulative[i]);
        let span = d1 - d0;
        let f = if span > 1e-6 { (target - d0) / span } else { 1.0 };
        Some(self.points[i - 1].lerp(self.points[i], f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::{CircleProps, PathPoint, PathProps, RectangleProps, StrokeProps, SvgProps};

    const SURFACE: SurfaceSize = SurfaceSize {
        width: 400,
        height: 200,
    };

    fn instance(kind: ShapeKind) -> ShapeInstance {
        ShapeInstance {
            x: 50.0,
            y: 50.0,
            force: 1.0,
            kind,
        }
    }

    #[test]
    fn test_stroke_runs_from_anchor() {
        let pts = sample_points(
            &instance(ShapeKind::Stroke(StrokeProps {
                length: 100.0,
                angle: 90.0,
                speed: 1.0,
            })),
            SURFACE,
        );
        assert_eq!(pts.len(), STROKE_SEGMENTS + 1);
        assert_eq!(pts[0], Vec2::new(200.0, 100.0));
        // Clockwise on screen: 90 degrees points down
        assert!((pts[STROKE_SEGMENTS] - Vec2::new(200.0, 200.0)).length() < 1e-3);
    }

    #[test]
    fn test_circle_is_closed_at_radius() {
        let pts = sample_points(
            &instance(ShapeKind::Circle(CircleProps {
                radius: 30.0,
                speed: 1.0,
            })),
            SURFACE,
        );
        let centre = Vec2::new(200.0, 100.0);
        assert!((pts[0] - *pts.last().unwrap()).length() < 1e-3);
        assert!(pts.iter().all(|p| (p.distance(centre) - 30.0).abs() < 1e-3));
    }

    #[test]
    fn test_rectangle_perimeter() {
        let pts = sample_points(
            &instance(ShapeKind::Rectangle(RectangleProps {
                width: 80.0,
                height: 50.0,
                rotation: 0.0,
                speed: 1.0,
            })),
            SURFACE,
        );
        assert_eq!(pts.len(), 4 * EDGE_SEGMENTS + 1);
        assert!((Polyline::new(pts).length() - 260.0).abs() < 1e-2);
    }

    #[test]
    fn test_path_is_relative_to_first_point() {
        let pts = sample_points(
            &ShapeInstance {
                x: 10.0,
                y: 10.0,
                force: 1.0,
                kind: ShapeKind::Path(PathProps {
                    points: vec![PathPoint { x: 10.0, y: 10.0 }, PathPoint { x: 20.0, y: 10.0 }],
                    scale: 2.0,
                    speed: 1.0,
                }),
            },
            SURFACE,
        );
        assert_eq!(pts, vec![Vec2::new(40.0, 20.0), Vec2::new(120.0, 20.0)]);
    }

    #[test]
    fn test_svg_numbers() {
        assert_eq!(
            svg_numeric_pairs("M0,0 C50,50 100,0 150,50"),
            vec![
                Vec2::ZERO,
                Vec2::new(50.0, 50.0),
                Vec2::new(100.0, 0.0),
                Vec2::new(150.0, 50.0)
            ]
        );
        assert_eq!(
            svg_numeric_pairs("M-1.5-2 l1e1,.5.5"),
            vec![Vec2::new(-1.5, -2.0), Vec2::new(10.0, 0.5)]
        );
        let pts = sample_points(&instance(ShapeKind::Svg(SvgProps::default())), SURFACE);
        assert_eq!(pts[0], Vec2::new(200.0, 100.0));
    }

    #[test]
    fn test_polyline_arc_length_sampling() {
        let line = Polyline::new(vec![Vec2::ZERO, Vec2::new(10.0, 0.0), Vec2::new(10.0, 30.0)]);
        assert_eq!(line.length(), 40.0);
        assert_eq!(line.point_at(0.0), Some(Vec2::ZERO));
        assert_eq!(line.point_at(0.25), Some(Vec2::new(10.0, 0.0)));
        assert_eq!(line.point_at(0.5), Some(Vec2::new(10.0, 10.0)));
        assert_eq!(line.point_at(2.0), Some(Vec2::new(10.0, 30.0)));
    }

    #[test]
    fn test_degenerate_polylines() {
        assert_eq!(Polyline::new(Vec::new()).point_at(0.5), None);
        let dot = Polyline::new(vec![Vec2::ONE, Vec2::ONE]);
        assert_eq!(dot.point_at(0.7), Some(Vec2::ONE));
    }
}
