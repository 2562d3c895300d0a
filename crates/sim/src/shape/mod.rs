//! Scripted initial shapes.
//!
//! A [`Shape`] is the immutable descriptor stored in page markup. Every
//! scheduled occurrence draws a fresh [`ShapeInstance`] from it (position,
//! angle, speed, size and force perturbed by the configured ranges), builds
//! its sample points and is then animated by [`ShapePlayback`].

pub mod geometry;
pub mod playback;

pub use geometry::{sample_points, Polyline};
pub use playback::{schedule_times, ShapePlayback};

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Error raised for a single unusable shape descriptor.
#[derive(Debug, thiserror::Error)]
pub enum ShapeError {
    #[error("malformed shape list: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown shape type `{0}`")]
    UnknownType(String),
    #[error("invalid props for {kind} shape: {source}")]
    Props {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Where a shape's color comes from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeColorMode {
    /// Use the instance color generator
    #[default]
    Gradient,
    /// Use the shape's own hex color
    Fixed,
}

/// Most repeats a shape may schedule.
pub const MAX_REPEAT: u32 = 1000;

/// Playback timing, all in milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Timing {
    pub delay: f64,
    pub duration: f64,
    /// Extra occurrences after the first
    pub repeat: u32,
    pub repeat_delay: f64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            delay: 0.0,
            duration: 500.0,
            repeat: 0,
            repeat_delay: 0.0,
        }
    }
}

/// Uniform perturbation range `[min, max]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Range(pub f32, pub f32);

impl Range {
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f32 {
        let (lo, hi) = if self.0 <= self.1 {
            (self.0, self.1)
        } else {
            (self.1, self.0)
        };
        if hi - lo <= f32::EPSILON {
            lo
        } else {
            rng.gen_range(lo..=hi)
        }
    }
}

/// Per-field randomization ranges.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomRanges {
    /// Percent of surface width
    pub x: Range,
    /// Percent of surface height
    pub y: Range,
    /// Degrees
    pub angle: Range,
    /// Added to the speed multiplier
    pub speed: Range,
    /// Percent change of every size
    pub size: Range,
    /// Added to the force multiplier
    pub force: Range,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StrokeProps {
    pub length: f32,
    /// Degrees, clockwise on screen
    pub angle: f32,
    pub speed: f32,
}

impl Default for StrokeProps {
    fn default() -> Self {
        Self {
            length: 100.0,
            angle: 0.0,
            speed: 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CircleProps {
    pub radius: f32,
    pub speed: f32,
}

impl Default for CircleProps {
    fn default() -> Self {
        Self {
            radius: 50.0,
            speed: 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EllipseProps {
    pub radius_x: f32,
    pub radius_y: f32,
    pub rotation: f32,
    pub speed: f32,
}

impl Default for EllipseProps {
    fn default() -> Self {
        Self {
            radius_x: 60.0,
            radius_y: 40.0,
            rotation: 0.0,
            speed: 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RectangleProps {
    pub width: f32,
    pub height: f32,
    pub rotation: f32,
    pub speed: f32,
}

impl Default for RectangleProps {
    fn default() -> Self {
        Self {
            width: 80.0,
            height: 50.0,
            rotation: 0.0,
            speed: 1.0,
        }
    }
}

/// A point of a free-drawn path, in percent of the surface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PathPoint {
    pub x: f32,
    pub y: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PathProps {
    pub points: Vec<PathPoint>,
    pub scale: f32,
    pub speed: f32,
}

impl Default for PathProps {
    fn default() -> Self {
        Self {
            points: Vec::new(),
            scale: 1.0,
            speed: 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SvgProps {
    /// Path description string; only its numeric pairs are used
    pub path_data: String,
    pub scale: f32,
    pub rotation: f32,
    pub speed: f32,
}

impl Default for SvgProps {
    fn default() -> Self {
        Self {
            path_data: "M0,0 C50,50 100,0 150,50".to_string(),
            scale: 1.0,
            rotation: 0.0,
            speed: 1.0,
        }
    }
}

/// Geometry of a shape with its type-specific parameters.
#[derive(Clone, Debug, PartialEq)]
pub enum ShapeKind {
    Stroke(StrokeProps),
    Circle(CircleProps),
    Ellipse(EllipseProps),
    Rectangle(RectangleProps),
    Path(PathProps),
    Svg(SvgProps),
}

impl ShapeKind {
    pub fn name(&self) -> &'static str {
        match self {
            ShapeKind::Stroke(_) => "stroke",
            ShapeKind::Circle(_) => "circle",
            ShapeKind::Ellipse(_) => "ellipse",
            ShapeKind::Rectangle(_) => "rectangle",
            ShapeKind::Path(_) => "path",
            ShapeKind::Svg(_) => "svg",
        }
    }

    pub fn speed(&self) -> f32 {
        match self {
            ShapeKind::Stroke(p) => p.speed,
            ShapeKind::Circle(p) => p.speed,
            ShapeKind::Ellipse(p) => p.speed,
            ShapeKind::Rectangle(p) => p.speed,
            ShapeKind::Path(p) => p.speed,
            ShapeKind::Svg(p) => p.speed,
        }
    }

    fn parse(kind: &str, props: serde_json::Value) -> Result<Self, ShapeError> {
        fn props_of<T: serde::de::DeserializeOwned>(
            kind: &str,
            props: serde_json::Value,
        ) -> Result<T, ShapeError> {
            let props = if props.is_null() {
                serde_json::Value::Object(Default::default())
            } else {
                props
            };
            serde_json::from_value(props).map_err(|source| ShapeError::Props {
                kind: kind.to_string(),
                source,
            })
        }

        Ok(match kind {
            "stroke" | "line" => ShapeKind::Stroke(props_of(kind, props)?),
            "circle" => ShapeKind::Circle(props_of(kind, props)?),
            "ellipse" => ShapeKind::Ellipse(props_of(kind, props)?),
            "rectangle" => ShapeKind::Rectangle(props_of(kind, props)?),
            "path" => ShapeKind::Path(props_of(kind, props)?),
            "svg" => ShapeKind::Svg(props_of(kind, props)?),
            other => return Err(ShapeError::UnknownType(other.to_string())),
        })
    }

    /// Perturbed copy: angle/rotation, speed and size.
    fn perturbed(&self, angle: f32, speed: f32, size_pct: f32) -> Self {
        let size = (1.0 + size_pct / 100.0).max(0.0);
        let speed_of = |s: f32| (s + speed).max(0.0);
        match self {
            ShapeKind::Stroke(p) => ShapeKind::Stroke(StrokeProps {
                length: p.length * size,
                angle: p.angle + angle,
                speed: speed_of(p.speed),
            }),
            ShapeKind::Circle(p) => ShapeKind::Circle(CircleProps {
                radius: p.radius * size,
                speed: speed_of(p.speed),
            }),
            ShapeKind::Ellipse(p) => ShapeKind::Ellipse(EllipseProps {
                radius_x: p.radius_x * size,
                radius_y: p.radius_y * size,
                rotation: p.rotation + angle,
                speed: speed_of(p.speed),
            }),
            ShapeKind::Rectangle(p) => ShapeKind::Rectangle(RectangleProps {
                width: p.width * size,
                height: p.height * size,
                rotation: p.rotation + angle,
                speed: speed_of(p.speed),
            }),
            ShapeKind::Path(p) => ShapeKind::Path(PathProps {
                points: p.points.clone(),
                scale: p.scale * size,
                speed: speed_of(p.speed),
            }),
            ShapeKind::Svg(p) => ShapeKind::Svg(SvgProps {
                path_data: p.path_data.clone(),
                scale: p.scale * size,
                rotation: p.rotation + angle,
                speed: speed_of(p.speed),
            }),
        }
    }
}

/// Serialized form of a shape, before its props are typed.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawShape {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    x: f32,
    y: f32,
    color_mode: ShapeColorMode,
    color: String,
    color_speed: f32,
    randomize_color: bool,
    force: f32,
    timing: Timing,
    random: RandomRanges,
    props: serde_json::Value,
}

impl Default for RawShape {
    fn default() -> Self {
        Self {
            id: String::new(),
            kind: "stroke".to_string(),
            x: 50.0,
            y: 50.0,
            color_mode: ShapeColorMode::Gradient,
            color: "#ff6b6b".to_string(),
            color_speed: 1.0,
            randomize_color: true,
            force: 1.0,
            timing: Timing::default(),
            random: RandomRanges::default(),
            props: serde_json::Value::Null,
        }
    }
}

/// Immutable shape descriptor.
#[derive(Clone, Debug, PartialEq)]
pub struct Shape {
    pub id: String,
    /// Percent of surface width
    pub x: f32,
    /// Percent of surface height, from the top
    pub y: f32,
    pub color_mode: ShapeColorMode,
    pub color: String,
    /// Hue turns over one full occurrence
    pub color_speed: f32,
    /// Pick a new color for every occurrence instead of reusing the first
    pub randomize_color: bool,
    pub force: f32,
    pub timing: Timing,
    pub random: RandomRanges,
    pub kind: ShapeKind,
}

impl TryFrom<RawShape> for Shape {
    type Error = ShapeError;

    fn try_from(raw: RawShape) -> Result<Self, Self::Error> {
        let kind = ShapeKind::parse(&raw.kind, raw.props)?;
        let mut timing = raw.timing;
        if timing.repeat > MAX_REPEAT {
            log::warn!(
                "Shape `{}` repeats {} times, clamping to {}",
                raw.id,
                timing.repeat,
                MAX_REPEAT
            );
            timing.repeat = MAX_REPEAT;
        }
        Ok(Self {
            id: raw.id,
            x: raw.x,
            y: raw.y,
            color_mode: raw.color_mode,
            color: raw.color,
            color_speed: raw.color_speed,
            randomize_color: raw.randomize_color,
            force: raw.force,
            timing,
            random: raw.random,
            kind,
        })
    }
}

impl Shape {
    /// Parse one shape from a JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ShapeError> {
        let raw: RawShape = serde_json::from_value(value)?;
        Shape::try_from(raw)
    }

    /// Draw one randomized occurrence.
    pub fn instantiate<R: Rng + ?Sized>(&self, rng: &mut R) -> ShapeInstance {
        let dx = self.random.x.sample(rng);
        let dy = self.random.y.sample(rng);
        let angle = self.random.angle.sample(rng);
        let speed = self.random.speed.sample(rng);
        let size = self.random.size.sample(rng);
        let force = self.random.force.sample(rng);

        ShapeInstance {
            x: self.x + dx,
            y: self.y + dy,
            force: (self.force + force).max(0.0),
            kind: self.kind.perturbed(angle, speed, size),
        }
    }
}

/// One randomized occurrence of a shape.
#[derive(Clone, Debug, PartialEq)]
pub struct ShapeInstance {
    pub x: f32,
    pub y: f32,
    pub force: f32,
    pub kind: ShapeKind,
}

/// Parse the serialized shape list. A malformed list yields no shapes;
/// individual malformed shapes are skipped. Both are logged.
pub fn parse_shapes(json: &str) -> Vec<Shape> {
    if json.trim().is_empty() {
        return Vec::new();
    }
    let values: Vec<serde_json::Value> = match serde_json::from_str(json) {
        Ok(values) => values,
        Err(e) => {
            log::warn!("Ignoring initial shapes: {}", ShapeError::from(e));
            return Vec::new();
        }
    };
    values
        .into_iter()
        .enumerate()
        .filter_map(|(i, value)| match Shape::from_value(value) {
            Ok(shape) => Some(shape),
            Err(e) => {
                log::warn!("Skipping shape #{}: {}", i, e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_parse_full_shape() {
        let shapes = parse_shapes(
            r#"[{"id": "a", "type": "circle", "x": 25, "y": 75, "force": 2,
                 "timing": {"delay": 100, "duration": 500, "repeat": 2, "repeatDelay": 50},
                 "random": {"x": [-5, 5], "size": [-10, 10]},
                 "props": {"radius": 30, "speed": 0.8}}]"#,
        );
        assert_eq!(shapes.len(), 1);
        let s = &shapes[0];
        assert_eq!(s.id, "a");
        assert_eq!(s.timing.repeat, 2);
        assert_eq!(s.random.x, Range(-5.0, 5.0));
        assert_eq!(
            s.kind,
            ShapeKind::Circle(CircleProps {
                radius: 30.0,
                speed: 0.8
            })
        );
    }

    #[test]
    fn test_repeat_is_clamped() {
        let shapes = parse_shapes(
            r#"[{"type": "circle", "timing": {"repeat": 4000000000}},
                {"type": "circle", "timing": {"repeat": 1000}}]"#,
        );
        assert_eq!(shapes.len(), 2);
        assert_eq!(shapes[0].timing.repeat, MAX_REPEAT);
        assert_eq!(shapes[1].timing.repeat, 1000);
    }

    #[test]
    fn test_defaults_and_line_alias() {
        let shapes = parse_shapes(r#"[{"type": "line"}, {"type": "svg"}]"#);
        assert_eq!(shapes.len(), 2);
        assert_eq!(shapes[0].kind, ShapeKind::Stroke(StrokeProps::default()));
        assert_eq!(shapes[0].x, 50.0);
        assert_eq!(shapes[0].color_mode, ShapeColorMode::Gradient);
        assert!(matches!(shapes[1].kind, ShapeKind::Svg(ref p) if p.scale == 1.0));
    }

    #[test]
    fn test_bad_shapes_are_skipped() {
        let shapes = parse_shapes(
            r#"[{"type": "hexagon"}, {"type": "circle", "props": {"radius": "big"}}, {"type": "circle"}]"#,
        );
        assert_eq!(shapes.len(), 1);
        assert!(parse_shapes("{oops").is_empty());
        assert!(parse_shapes("").is_empty());
    }

    #[test]
    fn test_instances_stay_within_ranges() {
        let shape = Shape::from_value(serde_json::json!({
            "type": "stroke",
            "x": 50, "y": 50, "force": 1,
            "random": {"x": [-10, 10], "y": [-10, 10], "angle": [-45, 45],
                       "speed": [-0.5, 0.5], "size": [-50, 50], "force": [0, 1]},
            "props": {"length": 100, "angle": 0, "speed": 1}
        }))
        .unwrap();

        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..100 {
            let inst = shape.instantiate(&mut rng);
            assert!((40.0..=60.0).contains(&inst.x));
            assert!((40.0..=60.0).contains(&inst.y));
            assert!((1.0..=2.0).contains(&inst.force));
            let ShapeKind::Stroke(p) = inst.kind else {
                panic!("kind changed");
            };
            assert!((50.0..=150.0).contains(&p.length));
            assert!((-45.0..=45.0).contains(&p.angle));
            assert!((0.5..=1.5).contains(&p.speed));
        }
        // The descriptor itself never changes
        assert_eq!(shape.x, 50.0);
    }

    #[test]
    fn test_zero_ranges_reproduce_descriptor() {
        let shape = Shape::from_value(serde_json::json!({"type": "circle", "x": 10, "y": 20})).unwrap();
        let inst = shape.instantiate(&mut StdRng::seed_from_u64(0));
        assert_eq!((inst.x, inst.y, inst.force), (10.0, 20.0, 1.0));
        assert_eq!(inst.kind, shape.kind);
    }
}
