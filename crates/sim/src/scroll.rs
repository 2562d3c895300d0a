//! Scroll-linked parameter animation.
//!
//! Each rule maps an interval of page scroll offset onto an interval of
//! values for one numeric config property.

use serde::{Deserialize, Serialize};

use crate::config::SimConfig;

/// One scroll rule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScrollRule {
    pub id: String,
    /// Config property name (camelCase, as serialized)
    pub property: String,
    pub scroll_start: f32,
    pub scroll_end: f32,
    pub value_start: f32,
    pub value_end: f32,
}

impl Default for ScrollRule {
    fn default() -> Self {
        Self {
            id: String::new(),
            property: "colorSaturation".to_string(),
            scroll_start: 0.0,
            scroll_end: 500.0,
            value_start: 1.0,
            value_end: 0.5,
        }
    }
}

impl ScrollRule {
    /// Value of the property at the given scroll offset.
    ///
    /// Linear inside `[scroll_start, scroll_end]`, clamped to the end values
    /// outside it. A degenerate interval acts as a step at `scroll_start`.
    pub fn value_at(&self, offset: f32) -> f32 {
        let span = self.scroll_end - self.scroll_start;
        let t = if span.abs() <= f32::EPSILON {
            if offset >= self.scroll_start {
                1.0
            } else {
                0.0
            }
        } else {
            ((offset - self.scroll_start) / span).clamp(0.0, 1.0)
        };
        self.value_start * (1.0 - t) + self.value_end * t
    }
}

/// Scroll animation block of the config.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScrollAnimations {
    pub enabled: bool,
    pub rules: Vec<ScrollRule>,
}

/// Apply every rule in order; later rules targeting the same property win.
///
/// Returns the number of rules that were applied. Rules naming unknown
/// properties are skipped.
pub fn apply_rules(rules: &[ScrollRule], offset: f32, config: &mut SimConfig) -> usize {
    let mut applied = 0;
    for rule in rules {
        match config.set_property(&rule.property, rule.value_at(offset)) {
            Ok(()) => applied += 1,
            Err(e) => log::debug!("Skipping scroll rule {:?}: {}", rule.id, e),
        }
    }
    applied
}
