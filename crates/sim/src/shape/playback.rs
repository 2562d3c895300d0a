//! Scheduling and animation of shape occurrences.

use glam::{Vec2, Vec3};
use rand::Rng;

use super::geometry::{sample_points, Polyline};
use super::{Shape, ShapeColorMode, Timing, MAX_REPEAT};
use crate::color::{parse_hex, post_process, rotate_hue, ColorGenerator, FALLBACK_COLOR};
use crate::config::SimConfig;
use crate::grid::SurfaceSize;
use crate::pointer::{correct_delta, texcoord};
use crate::splat::Injection;

/// Slowest playback speed an occurrence can be randomized down to.
pub const MIN_SPEED: f32 = 0.1;

/// Start times (ms after load) of every occurrence of a shape.
///
/// The delay is waited again before each repeat, so occurrence `i` starts
/// at `delay + i * (delay + duration + repeatDelay)`. At most
/// [`MAX_REPEAT`] repeats are scheduled.
pub fn schedule_times(timing: &Timing) -> Vec<f64> {
    let period = timing.delay + timing.duration + timing.repeat_delay;
    (0..=timing.repeat.min(MAX_REPEAT))
        .map(|i| timing.delay + i as f64 * period)
        .collect()
}

pub fn ease_in_out_cubic(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
    }
}

/// One running occurrence.
#[derive(Clone, Debug)]
struct Animation {
    shape: usize,
    polyline: Polyline,
    start_ms: f64,
    duration_ms: f64,
    force: f32,
    color: Vec3,
    color_mode: ShapeColorMode,
    color_speed: f32,
    /// Last traced position, surface pixels
    last: Vec2,
}

/// Owns the shape list and every running occurrence. A single poll per tick
/// advances all of them.
#[derive(Clone, Debug, Default)]
pub struct ShapePlayback {
    shapes: Vec<Shape>,
    active: Vec<Animation>,
    /// Color of each shape's first occurrence, reused when it does not
    /// randomize its color
    cached_colors: Vec<Option<Vec3>>,
}

impl ShapePlayback {
    pub fn new(shapes: Vec<Shape>) -> Self {
        let cached_colors = vec![None; shapes.len()];
        Self {
            shapes,
            active: Vec::new(),
            cached_colors,
        }
    }

    pub fn shapes(&self) -> &[Shape] {
        &self.shapes
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Every `(shape index, occurrence index, start ms)` to schedule at load.
    pub fn occurrences(&self) -> Vec<(usize, u32, f64)> {
        self.shapes
            .iter()
            .enumerate()
            .flat_map(|(index, shape)| {
                schedule_times(&shape.timing)
                    .into_iter()
                    .enumerate()
                    .map(move |(i, at)| (index, i as u32, at))
            })
            .collect()
    }

    fn color_for<R: Rng + ?Sized>(
        &mut self,
        index: usize,
        colors: &mut ColorGenerator,
        config: &SimConfig,
        rng: &mut R,
    ) -> Vec3 {
        let shape = &self.shapes[index];
        if !shape.randomize_color {
            if let Some(color) = self.cached_colors[index] {
                return color;
            }
        }
        let color = match shape.color_mode {
            ShapeColorMode::Gradient => colors.generate(config, rng),
            ShapeColorMode::Fixed => {
                let rgb = parse_hex(&shape.color).unwrap_or_else(|| {
                    log::warn!("Shape `{}` has invalid color `{}`", shape.id, shape.color);
                    FALLBACK_COLOR
                });
                post_process(config, rgb)
            }
        };
        self.cached_colors[index] = Some(color);
        color
    }

    /// Start occurrence `iteration` of shape `index` at `now_ms`.
    #[allow(clippy::too_many_arguments)]
    pub fn start<R: Rng + ?Sized>(
        &mut self,
        index: usize,
        iteration: u32,
        now_ms: f64,
        surface: SurfaceSize,
        colors: &mut ColorGenerator,
        config: &SimConfig,
        rng: &mut R,
    ) {
        let Some(shape) = self.shapes.get(index) else {
            log::warn!("No shape #{} to start", index);
            return;
        };
        let instance = shape.instantiate(rng);
        let duration = shape.timing.duration;
        let color_mode = shape.color_mode;
        let color_speed = shape.color_speed;
        let polyline = Polyline::new(sample_points(&instance, surface));
        let Some(first) = polyline.point_at(0.0) else {
            log::debug!("Shape #{} occurrence {} has no points", index, iteration);
            return;
        };
        let speed = instance.kind.speed().max(MIN_SPEED);
        let color = self.color_for(index, colors, config, rng);

        log::debug!(
            "Starting shape #{} ({}) occurrence {}",
            index,
            instance.kind.name(),
            iteration
        );
        self.active.push(Animation {
            shape: index,
            polyline,
            start_ms: now_ms,
            duration_ms: duration / speed as f64,
            force: instance.force,
            color,
            color_mode,
            color_speed,
            last: first,
        });
    }

    /// Advance every running occurrence to `now_ms` and return this tick's
    /// injections. Finished occurrences are dropped.
    pub fn poll(&mut self, now_ms: f64, surface: SurfaceSize) -> Vec<Injection> {
        let aspect = surface.aspect();
        let mut injections = Vec::new();

        self.active.retain_mut(|anim| {
            let progress = if anim.duration_ms <= 0.0 {
                1.0
            } else {
                ((now_ms - anim.start_ms) / anim.duration_ms).clamp(0.0, 1.0) as f32
            };
            let Some(point) = anim.polyline.point_at(ease_in_out_cubic(progress)) else {
                return false;
            };

            let from = texcoord(anim.last, surface);
            let to = texcoord(point, surface);
            anim.last = point;
            let delta = correct_delta(to - from, aspect) * anim.force;
            if delta != Vec2::ZERO {
                // Only gradient shapes cycle their hue
                let color = match anim.color_mode {
                    ShapeColorMode::Gradient => rotate_hue(anim.color, anim.color_speed * progress),
                    ShapeColorMode::Fixed => anim.color,
                };
                injections.push(Injection {
                    point: to,
                    delta,
                    color,
                });
            }
            progress < 1.0
        });
        injections
    }

    /// Indices of shapes that currently have a running occurrence.
    pub fn running_shapes(&self) -> Vec<usize> {
        self.active.iter().map(|a| a.shape).collect()
    }

    pub fn stop_all(&mut self) {
        self.active.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::parse_shapes;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const SURFACE: SurfaceSize = SurfaceSize {
        width: 400,
        height: 400,
    };

    #[test]
    fn test_schedule_rewaits_delay() {
        let timing = Timing {
            delay: 100.0,
            duration: 500.0,
            repeat: 2,
            repeat_delay: 50.0,
        };
        assert_eq!(schedule_times(&timing), vec![100.0, 750.0, 1400.0]);
        assert_eq!(schedule_times(&Timing::default()), vec![0.0]);
    }

    #[test]
    fn test_easing_endpoints_and_symmetry() {
        assert_eq!(ease_in_out_cubic(0.0), 0.0);
        assert_eq!(ease_in_out_cubic(1.0), 1.0);
        assert!((ease_in_out_cubic(0.5) - 0.5).abs() < 1e-6);
        assert!((ease_in_out_cubic(0.25) + ease_in_out_cubic(0.75) - 1.0).abs() < 1e-6);
        assert!(ease_in_out_cubic(0.1) < 0.1);
    }

    fn playback(json: &str) -> ShapePlayback {
        ShapePlayback::new(parse_shapes(json))
    }

    #[test]
    fn test_stroke_traces_to_completion() {
        let mut shapes = playback(
            r#"[{"type": "stroke", "x": 25, "y": 50, "timing": {"duration": 1000},
                 "props": {"length": 200, "angle": 0}}]"#,
        );
        let mut rng = StdRng::seed_from_u64(3);
        let mut colors = ColorGenerator::new();
        let config = SimConfig::default();
        shapes.start(0, 0, 0.0, SURFACE, &mut colors, &config, &mut rng);
        assert_eq!(shapes.active_count(), 1);

        let mut total = Vec2::ZERO;
        for step in 1..=20 {
            let injections = shapes.poll(step as f64 * 50.0, SURFACE);
            for inj in &injections {
                assert!(inj.delta.x > 0.0 && inj.delta.y.abs() < 1e-6);
                total += inj.delta;
            }
        }
        // 200 px across a 400 px square surface
        assert!((total.x - 0.5).abs() < 1e-4);
        assert_eq!(shapes.active_count(), 0);
    }

    #[test]
    fn test_speed_shortens_duration() {
        let mut shapes = playback(
            r#"[{"type": "stroke", "timing": {"duration": 1000}, "props": {"speed": 2}}]"#,
        );
        let mut rng = StdRng::seed_from_u64(3);
        shapes.start(0, 0, 0.0, SURFACE, &mut ColorGenerator::new(), &SimConfig::default(), &mut rng);
        shapes.poll(499.0, SURFACE);
        assert_eq!(shapes.active_count(), 1);
        shapes.poll(500.0, SURFACE);
        assert_eq!(shapes.active_count(), 0);
    }

    #[test]
    fn test_fixed_color_is_cached_unless_randomized() {
        let mut shapes = playback(
            r##"[{"type": "circle", "colorMode": "fixed", "color": "#00ff00", "randomizeColor": false},
                 {"type": "circle", "colorMode": "gradient", "randomizeColor": false}]"##,
        );
        let mut rng = StdRng::seed_from_u64(9);
        let mut colors = ColorGenerator::new();
        let config = SimConfig::default();

        let fixed = shapes.color_for(0, &mut colors, &config, &mut rng);
        assert_eq!(fixed, post_process(&config, Vec3::Y));

        let first = shapes.color_for(1, &mut colors, &config, &mut rng);
        let second = shapes.color_for(1, &mut colors, &config, &mut rng);
        assert_eq!(first, second);
    }

    #[test]
    fn test_fixed_color_does_not_cycle() {
        let mut shapes = playback(
            r##"[{"type": "stroke", "colorMode": "fixed", "color": "#00ff00",
                  "timing": {"duration": 1000}, "props": {"length": 200}}]"##,
        );
        let mut rng = StdRng::seed_from_u64(4);
        let config = SimConfig::default();
        shapes.start(0, 0, 0.0, SURFACE, &mut ColorGenerator::new(), &config, &mut rng);

        let base = post_process(&config, Vec3::Y);
        let injections = shapes.poll(500.0, SURFACE);
        assert!(!injections.is_empty());
        for inj in &injections {
            assert_eq!(inj.color, base);
        }
    }

    #[test]
    fn test_gradient_color_cycles() {
        let mut shapes = playback(
            r#"[{"type": "stroke", "colorSpeed": 1, "randomizeColor": false,
                 "timing": {"duration": 1000}, "props": {"length": 200}}]"#,
        );
        let mut rng = StdRng::seed_from_u64(4);
        let mut colors = ColorGenerator::new();
        let config = SimConfig::default();
        shapes.start(0, 0, 0.0, SURFACE, &mut colors, &config, &mut rng);
        let base = shapes.color_for(0, &mut colors, &config, &mut rng);

        let injections = shapes.poll(500.0, SURFACE);
        assert!(!injections.is_empty());
        assert!(injections.iter().all(|inj| inj.color != base));
    }

    #[test]
    fn test_schedule_caps_repeats() {
        let timing = Timing {
            repeat: u32::MAX,
            ..Timing::default()
        };
        assert_eq!(schedule_times(&timing).len(), MAX_REPEAT as usize + 1);
    }

    #[test]
    fn test_occurrences_cover_every_repeat() {
        let shapes = playback(
            r#"[{"type": "circle", "timing": {"delay": 100, "duration": 500, "repeat": 2, "repeatDelay": 50}},
                {"type": "stroke"}]"#,
        );
        assert_eq!(
            shapes.occurrences(),
            vec![(0, 0, 100.0), (0, 1, 750.0), (0, 2, 1400.0), (1, 0, 0.0)]
        );
    }
}
