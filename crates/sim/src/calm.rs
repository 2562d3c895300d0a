//! Idle "calm-down" damping of the velocity field.

use crate::config::SimConfig;

/// Length of the blend from base to calm dissipation, in milliseconds.
pub const CALM_RAMP_MS: f64 = 1000.0;

/// Velocity dissipation to use after `idle_ms` without injections.
///
/// Equals the configured base dissipation until `calm_down_delay` has passed,
/// then blends linearly to `calm_down_strength` over [`CALM_RAMP_MS`].
pub fn effective_velocity_dissipation(config: &SimConfig, idle_ms: f64) -> f32 {
    if !config.calm_down {
        return config.velocity_dissipation;
    }
    let t = ((idle_ms - config.calm_down_delay as f64) / CALM_RAMP_MS).clamp(0.0, 1.0) as f32;
    config.velocity_dissipation * (1.0 - t) + config.calm_down_strength * t
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calm_config() -> SimConfig {
        SimConfig {
            calm_down: true,
            calm_down_delay: 2000.0,
            calm_down_strength: 0.9,
            ..SimConfig::default()
        }
    }

    #[test]
    fn test_before_delay_uses_base() {
        let config = calm_config();
        assert_eq!(effective_velocity_dissipation(&config, 0.0), config.velocity_dissipation);
        assert_eq!(effective_velocity_dissipation(&config, 2000.0), config.velocity_dissipation);
    }

    #[test]
    fn test_after_ramp_is_exact() {
        let config = calm_config();
        assert_eq!(effective_velocity_dissipation(&config, 3000.0), 0.9);
        assert_eq!(effective_velocity_dissipation(&config, 60_000.0), 0.9);
    }

    #[test]
    fn test_ramp_is_linear() {
        let config = calm_config();
        let mid = effective_velocity_dissipation(&config, 2500.0);
        let expected = (config.velocity_dissipation + 0.9) * 0.5;
        assert!((mid - expected).abs() < 1e-6);
    }

    #[test]
    fn test_disabled_ignores_idle_time() {
        let mut config = calm_config();
        config.calm_down = false;
        assert_eq!(effective_velocity_dissipation(&config, 10_000.0), config.velocity_dissipation);
    }
}
