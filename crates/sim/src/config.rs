//! Simulation configuration.
//!
//! The authoring layer serializes these settings as camelCase JSON into the
//! page markup. Every key is optional; missing keys take the defaults below,
//! resolved once when the configuration is parsed.
//!
//! The resulting [`SimConfig`] is a live snapshot: scroll rules and the
//! calm-down damper may overwrite numeric fields while the simulation runs,
//! every other component only reads it.

use serde::{Deserialize, Serialize};

use crate::scroll::ScrollAnimations;

/// Error raised when a serialized configuration cannot be used.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("malformed settings JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown numeric property `{0}`")]
    UnknownProperty(String),
}

/// How injection colors are picked.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    /// Fully random hue
    #[default]
    Rainbow,
    /// Random hue inside `[hue_min, hue_max]`, wrapping through 0°
    Huerange,
    /// Smoothly drifting hue shared by every injection of the instance
    Gradient,
    /// Fixed hex color
    Single,
}

/// Compositing mode of the final display pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlendMode {
    #[default]
    Normal,
    Screen,
    Multiply,
    Lighten,
    Additive,
}

/// Obstacle behaviour for elements matched by the interaction selectors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ObstacleMode {
    #[default]
    HardCorner,
    SoftEdge,
    ForceField,
    AttractField,
    Turbulence,
}

impl ObstacleMode {
    /// Stable numeric id shared with the GPU obstacle shader.
    pub fn as_u32(self) -> u32 {
        match self {
            ObstacleMode::HardCorner => 0,
            ObstacleMode::SoftEdge => 1,
            ObstacleMode::ForceField => 2,
            ObstacleMode::AttractField => 3,
            ObstacleMode::Turbulence => 4,
        }
    }
}

/// Element interaction ("obstacle field") settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ElementInteraction {
    pub enabled: bool,
    /// Comma separated selector list evaluated against the host page
    pub selectors: String,
    /// Recompute obstacle bounds on every scroll event
    pub track_scroll: bool,
    pub mode: ObstacleMode,
    /// Fade distance outside the box in pixels (soft edge mode)
    pub soft_edge_radius: f32,
    pub force_field_strength: f32,
    /// Reach beyond half the element size in pixels
    pub force_field_radius: f32,
    pub attract_field_strength: f32,
    pub attract_field_radius: f32,
    pub turbulence_intensity: f32,
    /// Spatial period of the turbulence phase in pixels
    pub turbulence_scale: f32,
    /// Attenuate/redirect splats at the moment they are injected
    pub affect_new_splats: bool,
    /// Apply the obstacle effect to the live grids every tick
    pub affect_existing_fluid: bool,
}

impl Default for ElementInteraction {
    fn default() -> Self {
        Self {
            enabled: false,
            selectors: String::new(),
            track_scroll: false,
            mode: ObstacleMode::HardCorner,
            soft_edge_radius: 20.0,
            force_field_strength: 50.0,
            force_field_radius: 80.0,
            attract_field_strength: 50.0,
            attract_field_radius: 80.0,
            turbulence_intensity: 30.0,
            turbulence_scale: 50.0,
            affect_new_splats: true,
            affect_existing_fluid: false,
        }
    }
}

impl ElementInteraction {
    /// Strength and reach radius for the active mode.
    pub fn strength_and_radius(&self) -> (f32, f32) {
        match self.mode {
            ObstacleMode::HardCorner => (0.0, 0.0),
            ObstacleMode::SoftEdge => (0.0, self.soft_edge_radius),
            ObstacleMode::ForceField => (self.force_field_strength, self.force_field_radius),
            ObstacleMode::AttractField => (self.attract_field_strength, self.attract_field_radius),
            ObstacleMode::Turbulence => (self.turbulence_intensity, self.turbulence_scale),
        }
    }
}

/// Full simulation configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SimConfig {
    // Grids
    pub sim_resolution: u32,
    pub dye_resolution: u32,

    // Solver
    pub density_dissipation: f32,
    pub velocity_dissipation: f32,
    /// Warm-start damping applied to last frame's pressure
    pub pressure: f32,
    pub pressure_iterations: u32,
    pub curl: f32,

    // Injection
    pub splat_radius: f32,
    pub splat_force: f32,
    pub projection_distance: f32,

    /// Dye decay multiplier, higher fades faster
    pub fade_speed: f32,
    /// Simulation time scale
    pub animation_speed: f32,

    // Bloom
    pub bloom: bool,
    pub bloom_intensity: f32,
    pub bloom_threshold: f32,
    pub bloom_soft_knee: f32,
    pub bloom_iterations: u32,
    pub bloom_resolution: u32,

    // Calm down
    pub calm_down: bool,
    /// Idle time in milliseconds before damping starts
    pub calm_down_delay: f32,
    pub calm_down_strength: f32,

    // Color generation
    pub color_mode: ColorMode,
    pub hue_min: f32,
    pub hue_max: f32,
    pub gradient_speed: f32,
    pub fixed_color: String,
    /// Pointer travel in pixels before a new color is picked (0 = every move)
    pub color_change_distance: f32,
    pub color_saturation: f32,
    pub color_brightness: f32,
    pub saturation_boost: f32,
    pub prevent_overblending: bool,
    pub max_color_intensity: f32,
    pub dark_mode: bool,

    // Display
    pub blend_mode: BlendMode,
    pub negative_bloom: bool,
    /// CSS `saturate()` percentage applied at display time
    pub css_saturate: f32,

    // Frame loop
    pub paused: bool,
    pub fps_cap: Option<f32>,

    pub element_interaction: ElementInteraction,
    pub scroll_animations: ScrollAnimations,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            sim_resolution: 128,
            dye_resolution: 1024,
            density_dissipation: 0.97,
            velocity_dissipation: 0.98,
            pressure: 0.8,
            pressure_iterations: 20,
            curl: 30.0,
            splat_radius: 0.25,
            splat_force: 6000.0,
            projection_distance: 1.0,
            fade_speed: 1.0,
            animation_speed: 1.0,
            bloom: true,
            bloom_intensity: 0.8,
            bloom_threshold: 0.6,
            bloom_soft_knee: 0.7,
            bloom_iterations: 8,
            bloom_resolution: 256,
            calm_down: false,
            calm_down_delay: 2000.0,
            calm_down_strength: 0.9,
            color_mode: ColorMode::Rainbow,
            hue_min: 0.0,
            hue_max: 360.0,
            gradient_speed: 0.5,
            fixed_color: "#ff00ff".to_string(),
            color_change_distance: 0.0,
            color_saturation: 1.0,
            color_brightness: 0.15,
            saturation_boost: 1.0,
            prevent_overblending: false,
            max_color_intensity: 1.0,
            dark_mode: false,
            blend_mode: BlendMode::Normal,
            negative_bloom: false,
            css_saturate: 100.0,
            paused: false,
            fps_cap: None,
            element_interaction: ElementInteraction::default(),
            scroll_animations: ScrollAnimations::default(),
        }
    }
}

impl SimConfig {
    /// Parse a serialized configuration.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parse a serialized configuration, falling back to defaults on malformed
    /// input. Blank input is treated as "no settings".
    pub fn from_json_or_default(json: &str) -> Self {
        if json.trim().is_empty() {
            return Self::default();
        }
        match Self::from_json(json) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Ignoring fluid settings: {}", e);
                Self::default()
            }
        }
    }

    /// Dye dissipation after applying the fade speed multiplier.
    pub fn effective_density_dissipation(&self) -> f32 {
        self.density_dissipation * self.fade_speed.max(0.0)
    }

    /// Read a numeric property by its serialized (camelCase) name.
    pub fn property(&self, name: &str) -> Option<f32> {
        let value = match name {
            "densityDissipation" => self.density_dissipation,
            "velocityDissipation" => self.velocity_dissipation,
            "pressure" => self.pressure,
            "curl" => self.curl,
            "splatRadius" => self.splat_radius,
            "splatForce" => self.splat_force,
            "projectionDistance" => self.projection_distance,
            "fadeSpeed" => self.fade_speed,
            "animationSpeed" => self.animation_speed,
            "bloomIntensity" => self.bloom_intensity,
            "bloomThreshold" => self.bloom_threshold,
            "calmDownDelay" => self.calm_down_delay,
            "calmDownStrength" => self.calm_down_strength,
            "hueMin" => self.hue_min,
            "hueMax" => self.hue_max,
            "gradientSpeed" => self.gradient_speed,
            "colorChangeDistance" => self.color_change_distance,
            "colorSaturation" => self.color_saturation,
            "colorBrightness" => self.color_brightness,
            "saturationBoost" => self.saturation_boost,
            "maxColorIntensity" => self.max_color_intensity,
            "cssSaturate" => self.css_saturate,
            _ => return None,
        };
        Some(value)
    }

    /// Overwrite a numeric property by its serialized (camelCase) name.
    pub fn set_property(&mut self, name: &str, value: f32) -> Result<(), ConfigError> {
        let slot = match name {
            "densityDissipation" => &mut self.density_dissipation,
            "velocityDissipation" => &mut self.velocity_dissipation,
            "pressure" => &mut self.pressure,
            "curl" => &mut self.curl,
            "splatRadius" => &mut self.splat_radius,
            "splatForce" => &mut self.splat_force,
            "projectionDistance" => &mut self.projection_distance,
            "fadeSpeed" => &mut self.fade_speed,
            "animationSpeed" => &mut self.animation_speed,
            "bloomIntensity" => &mut self.bloom_intensity,
            "bloomThreshold" => &mut self.bloom_threshold,
            "calmDownDelay" => &mut self.calm_down_delay,
            "calmDownStrength" => &mut self.calm_down_strength,
            "hueMin" => &mut self.hue_min,
            "hueMax" => &mut self.hue_max,
            "gradientSpeed" => &mut self.gradient_speed,
            "colorChangeDistance" => &mut self.color_change_distance,
            "colorSaturation" => &mut self.color_saturation,
            "colorBrightness" => &mut self.color_brightness,
            "saturationBoost" => &mut self.saturation_boost,
            "maxColorIntensity" => &mut self.max_color_intensity,
            "cssSaturate" => &mut self.css_saturate,
            _ => return Err(ConfigError::UnknownProperty(name.to_string())),
        };
        *slot = value;
        Ok(())
    }
}
