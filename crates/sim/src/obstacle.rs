//! Obstacle field derived from host element bounds.
//!
//! Obstacles are stored as normalized boxes (y up, like every grid), but
//! every distance the settings express in pixels is evaluated in surface
//! pixels so a 20 px soft edge stays 20 px regardless of grid resolution.

use glam::{Vec2, Vec4};

use crate::config::{ElementInteraction, ObstacleMode};
use crate::host::Rect;

/// Delay between instance construction and the first obstacle recompute,
/// letting the host layout settle.
pub const OBSTACLE_SETTLE_MS: f64 = 100.0;
/// Force falloff never divides by less than this many pixels.
pub const MIN_FORCE_DISTANCE_PX: f32 = 10.0;
/// Angular frequency of the turbulence phase, radians per second.
pub const TURBULENCE_FREQUENCY: f32 = 2.0;

/// One element's bounding box relative to the render surface.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Obstacle {
    pub min: Vec2,
    pub max: Vec2,
}

impl Obstacle {
    /// Convert page-space element bounds into normalized surface space.
    ///
    /// Returns `None` when the element does not overlap the surface.
    pub fn from_rects(element: &Rect, surface: &Rect) -> Option<Self> {
        if surface.width <= 0.0 || surface.height <= 0.0 {
            return None;
        }
        let left = (element.left - surface.left) / surface.width;
        let right = (element.left + element.width - surface.left) / surface.width;
        let top = (element.top - surface.top) / surface.height;
        let bottom = (element.top + element.height - surface.top) / surface.height;

        if right <= 0.0 || left >= 1.0 || bottom <= 0.0 || top >= 1.0 {
            return None;
        }
        Some(Self {
            min: Vec2::new(left, 1.0 - bottom),
            max: Vec2::new(right, 1.0 - top),
        })
    }

    pub fn centre(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }
}

/// Result of evaluating the field at one point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ObstacleEffect {
    pub blocked: bool,
    pub force_delta: Vec2,
    /// Color multiplier in `[0, 1]`
    pub opacity: f32,
}

impl Default for ObstacleEffect {
    fn default() -> Self {
        Self {
            blocked: false,
            force_delta: Vec2::ZERO,
            opacity: 1.0,
        }
    }
}

impl ObstacleEffect {
    /// Continuous effect on a live velocity texel over `dt` seconds.
    pub fn apply_to_velocity(&self, velocity: Vec2, dt: f32) -> Vec2 {
        if self.blocked {
            Vec2::ZERO
        } else {
            velocity + self.force_delta * dt
        }
    }

    /// Continuous effect on a live dye texel over `dt` seconds. Reduced
    /// opacity fades the dye at a rate of ten per second.
    pub fn apply_to_dye(&self, dye: Vec4, dt: f32) -> Vec4 {
        if self.blocked {
            Vec4::ZERO
        } else {
            dye * (1.0 - (1.0 - self.opacity) * (dt * 10.0).min(1.0))
        }
    }

    fn combine(self, other: ObstacleEffect) -> Self {
        Self {
            blocked: self.blocked || other.blocked,
            force_delta: self.force_delta + other.force_delta,
            opacity: self.opacity.min(other.opacity),
        }
    }
}

/// Everything needed to evaluate one obstacle, in the layout shared with the
/// GPU obstacle pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ObstacleStamp {
    pub mode: ObstacleMode,
    pub min: Vec2,
    pub max: Vec2,
    pub surface_px: Vec2,
    pub strength: f32,
    /// Soft-edge fade, field reach or turbulence scale depending on mode (px)
    pub radius: f32,
    pub time_s: f32,
}

impl ObstacleStamp {
    /// Evaluate this obstacle at normalized `point`.
    pub fn effect_at(&self, point: Vec2) -> ObstacleEffect {
        let pp = point * self.surface_px;
        let lo = self.min * self.surface_px;
        let hi = self.max * self.surface_px;
        let centre = (lo + hi) * 0.5;
        let half = (hi - lo) * 0.5;

        let offset = pp - centre;
        let outside = (offset.abs() - half).max(Vec2::ZERO);
        let edge_dist = outside.length();
        let inside = offset.x.abs() <= half.x && offset.y.abs() <= half.y;

        let d = offset.length();
        let dir = if d > 1e-4 { offset / d } else { Vec2::ZERO };
        let size = (hi - lo).max_element();

        let mut effect = ObstacleEffect::default();
        match self.mode {
            ObstacleMode::HardCorner => {
                if inside {
                    effect.blocked = true;
                    effect.opacity = 0.0;
                }
            }
            ObstacleMode::SoftEdge => {
                if inside {
                    effect.blocked = true;
                    effect.opacity = 0.0;
                } else if self.radius > 0.0 {
                    effect.opacity = (edge_dist / self.radius).clamp(0.0, 1.0);
                }
            }
            ObstacleMode::ForceField | ObstacleMode::AttractField => {
                let reach = self.radius + 0.5 * size;
                if d < reach {
                    let sign = if self.mode == ObstacleMode::ForceField {
                        1.0
                    } else {
                        -1.0
                    };
                    let magnitude = self.strength * reach / d.max(MIN_FORCE_DISTANCE_PX);
                    effect.force_delta = dir * magnitude * sign;
                }
                if inside && self.mode == ObstacleMode::ForceField {
                    effect.blocked = true;
                    effect.opacity = 0.0;
                }
            }
            ObstacleMode::Turbulence => {
                let in_double = offset.x.abs() <= 2.0 * half.x && offset.y.abs() <= 2.0 * half.y;
                if !inside && in_double {
                    let phase = self.time_s * TURBULENCE_FREQUENCY + d / self.radius.max(1.0);
                    let perpendicular = Vec2::new(-dir.y, dir.x);
                    effect.force_delta = perpendicular * self.strength * phase.sin();
                }
            }
        }
        effect
    }
}

/// Current set of obstacles for one instance.
#[derive(Clone, Debug)]
pub struct ObstacleField {
    settings: ElementInteraction,
    obstacles: Vec<Obstacle>,
    surface_px: Vec2,
}

impl ObstacleField {
    pub fn new(settings: ElementInteraction) -> Self {
        Self {
            settings,
            obstacles: Vec::new(),
            surface_px: Vec2::ONE,
        }
    }

    pub fn settings(&self) -> &ElementInteraction {
        &self.settings
    }

    pub fn obstacles(&self) -> &[Obstacle] {
        &self.obstacles
    }

    pub fn is_active(&self) -> bool {
        self.settings.enabled && !self.obstacles.is_empty()
    }

    /// Replace every obstacle from fresh layout bounds.
    pub fn rebuild(&mut self, surface: &Rect, elements: &[Rect]) {
        self.surface_px = Vec2::new(surface.width.max(1.0), surface.height.max(1.0));
        self.obstacles = elements
            .iter()
            .filter_map(|element| Obstacle::from_rects(element, surface))
            .collect();
        log::debug!("Obstacle field rebuilt with {} obstacles", self.obstacles.len());
    }

    pub fn clear(&mut self) {
        self.obstacles.clear();
    }

    /// One stamp per obstacle, for continuous application.
    pub fn stamps(&self, time_ms: f64) -> Vec<ObstacleStamp> {
        let (strength, radius) = self.settings.strength_and_radius();
        let time_s = (time_ms / 1000.0) as f32;
        self.obstacles
            .iter()
            .map(|o| ObstacleStamp {
                mode: self.settings.mode,
                min: o.min,
                max: o.max,
                surface_px: self.surface_px,
                strength,
                radius,
                time_s,
            })
            .collect()
    }

    /// Combined effect of every obstacle at normalized `point`.
    ///
    /// Blocking is the union, forces add up and opacity takes the minimum.
    pub fn evaluate(&self, point: Vec2, time_ms: f64) -> ObstacleEffect {
        if !self.settings.enabled {
            return ObstacleEffect::default();
        }
        self.stamps(time_ms)
            .iter()
            .fold(ObstacleEffect::default(), |acc, stamp| acc.combine(stamp.effect_at(point)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SURFACE: Rect = Rect {
        left: 0.0,
        top: 0.0,
        width: 400.0,
        height: 400.0,
    };

    // 100x100 px box in the middle of the surface
    const ELEMENT: Rect = Rect {
        left: 150.0,
        top: 150.0,
        width: 100.0,
        height: 100.0,
    };

    fn field(mode: ObstacleMode) -> ObstacleField {
        let settings = ElementInteraction {
            enabled: true,
            mode,
            ..ElementInteraction::default()
        };
        let mut field = ObstacleField::new(settings);
        field.rebuild(&SURFACE, &[ELEMENT]);
        field
    }

    fn px(x: f32, y: f32) -> Vec2 {
        Vec2::new(x / 400.0, y / 400.0)
    }

    #[test]
    fn test_rect_conversion_flips_y() {
        let element = Rect {
            left: 0.0,
            top: 0.0,
            width: 200.0,
            height: 100.0,
        };
        let o = Obstacle::from_rects(&element, &SURFACE).unwrap();
        assert_eq!(o.min, Vec2::new(0.0, 0.75));
        assert_eq!(o.max, Vec2::new(0.5, 1.0));

        let offscreen = Rect {
            left: 500.0,
            ..element
        };
        assert!(Obstacle::from_rects(&offscreen, &SURFACE).is_none());
    }

    #[test]
    fn test_hard_corner_blocks_inside_only() {
        let f = field(ObstacleMode::HardCorner);
        let e = f.evaluate(px(200.0, 200.0), 0.0);
        assert!(e.blocked);
        assert_eq!(e.opacity, 0.0);

        let e = f.evaluate(px(20.0, 20.0), 0.0);
        assert_eq!(e, ObstacleEffect::default());
    }

    #[test]
    fn test_soft_edge_fades_over_radius() {
        let f = field(ObstacleMode::SoftEdge);
        // 10 px right of the box edge with a 20 px radius
        let e = f.evaluate(px(260.0, 200.0), 0.0);
        assert!(!e.blocked);
        assert!((e.opacity - 0.5).abs() < 1e-4);
        // Force is never attenuated
        assert_eq!(e.force_delta, Vec2::ZERO);

        let e = f.evaluate(px(300.0, 200.0), 0.0);
        assert_eq!(e.opacity, 1.0);
    }

    #[test]
    fn test_force_field_pushes_away_and_attract_pulls() {
        let push = field(ObstacleMode::ForceField).evaluate(px(300.0, 200.0), 0.0);
        assert!(!push.blocked);
        assert!(push.force_delta.x > 0.0);
        assert!(push.force_delta.y.abs() < 1e-4);

        let pull = field(ObstacleMode::AttractField).evaluate(px(300.0, 200.0), 0.0);
        assert!(pull.force_delta.x < 0.0);
        assert!((push.force_delta + pull.force_delta).length() < 1e-3);

        // Inside: force field blocks, attract field does not
        assert!(field(ObstacleMode::ForceField).evaluate(px(210.0, 200.0), 0.0).blocked);
        assert!(!field(ObstacleMode::AttractField).evaluate(px(210.0, 200.0), 0.0).blocked);

        // Beyond radius + half size (80 + 50 px from the centre)
        let none = field(ObstacleMode::ForceField).evaluate(px(340.0, 200.0), 0.0);
        assert_eq!(none.force_delta, Vec2::ZERO);
    }

    #[test]
    fn test_force_falls_off_with_distance() {
        let f = field(ObstacleMode::ForceField);
        let near = f.evaluate(px(260.0, 200.0), 0.0).force_delta.length();
        let far = f.evaluate(px(320.0, 200.0), 0.0).force_delta.length();
        assert!(near > far);
    }

    #[test]
    fn test_turbulence_is_perpendicular_and_ring_shaped() {
        let f = field(ObstacleMode::Turbulence);
        // Inside the box: nothing
        assert_eq!(f.evaluate(px(200.0, 200.0), 0.0).force_delta, Vec2::ZERO);
        // Outside twice the size: nothing
        assert_eq!(f.evaluate(px(380.0, 200.0), 0.0).force_delta, Vec2::ZERO);

        let e = f.evaluate(px(270.0, 200.0), 400.0);
        assert!(!e.blocked);
        // Radial direction is +x, so the force is vertical
        assert!(e.force_delta.x.abs() < 1e-4);
        assert!(e.force_delta.y.abs() > 0.0);

        // Phase varies with time
        let later = f.evaluate(px(270.0, 200.0), 1200.0);
        assert!((later.force_delta.y - e.force_delta.y).abs() > 1e-3);
    }

    #[test]
    fn test_continuous_application() {
        let blocked = ObstacleEffect {
            blocked: true,
            force_delta: Vec2::ZERO,
            opacity: 0.0,
        };
        assert_eq!(blocked.apply_to_velocity(Vec2::ONE, 0.016), Vec2::ZERO);
        assert_eq!(blocked.apply_to_dye(Vec4::ONE, 0.016), Vec4::ZERO);

        let pushed = ObstacleEffect {
            blocked: false,
            force_delta: Vec2::new(100.0, 0.0),
            opacity: 0.5,
        };
        assert_eq!(pushed.apply_to_velocity(Vec2::ZERO, 0.5), Vec2::new(50.0, 0.0));
        // dt * 10 saturates at 1, so half opacity halves the dye
        assert_eq!(pushed.apply_to_dye(Vec4::ONE, 0.5), Vec4::splat(0.5));
    }

    #[test]
    fn test_disabled_field_is_inert() {
        let mut f = field(ObstacleMode::HardCorner);
        f.settings.enabled = false;
        assert_eq!(f.evaluate(px(200.0, 200.0), 0.0), ObstacleEffect::default());
        assert!(!f.is_active());
    }
}
