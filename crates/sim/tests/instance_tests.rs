//! Integration tests for the per-surface instance
//! Run with: cargo test -p sim
//!
//! A recording backend stands in for the solver so every injection, step
//! and obstacle stamp the instance issues can be inspected.

use std::convert::Infallible;

use glam::Vec2;
use sim::backend::{FluidBackend, StepParams};
use sim::display::DisplayParams;
use sim::grid::{GridSizes, SurfaceSize};
use sim::obstacle::{ObstacleStamp, OBSTACLE_SETTLE_MS};
use sim::splat::{Splat, STARTUP_COLOR_GAIN, STARTUP_FORCE, STARTUP_SPLATS};
use sim::{
    parse_shapes, FluidInstance, Frame, InputEvent, InstanceSetup, ManualClock, PointerId,
    SimConfig, StaticPage, SurfaceRegistry, SurfaceSpec,
};

#[derive(Default)]
struct Recorder {
    resizes: Vec<GridSizes>,
    splats: Vec<Splat>,
    steps: Vec<StepParams>,
    stamps: usize,
    renders: usize,
}

impl FluidBackend for Recorder {
    fn resize(&mut self, sizes: &GridSizes) {
        self.resizes.push(sizes.clone());
    }

    fn splat(&mut self, splat: &Splat, _aspect: f32) {
        self.splats.push(*splat);
    }

    fn step(&mut self, params: &StepParams) {
        self.steps.push(*params);
    }

    fn apply_obstacle(&mut self, _stamp: &ObstacleStamp, _dt: f32) {
        self.stamps += 1;
    }

    fn render(&mut self, _display: &DisplayParams) {
        self.renders += 1;
    }
}

const PAGE: &str = r#"{
    "scroll": 0,
    "surfaces": [
        {"id": "hero", "rect": {"left": 0, "top": 0, "width": 400, "height": 200},
         "fluidEnabled": true, "settings": "{\"curl\": 10}", "shapes": ""},
        {"id": "broken", "rect": {"left": 0, "top": 200, "width": 400, "height": 200},
         "fluidEnabled": true, "settings": "{not json", "shapes": "[{\"type\": \"blob\"}]"}
    ],
    "elements": [
        {"tag": "aside", "classes": ["panel"],
         "rect": {"left": 100, "top": 50, "width": 200, "height": 100}}
    ]
}"#;

fn page() -> StaticPage {
    StaticPage::from_json(PAGE).unwrap()
}

fn build(
    config: SimConfig,
    shapes: &str,
    clock: &ManualClock,
    seed: u64,
) -> FluidInstance<Recorder, ManualClock> {
    let setup = InstanceSetup {
        id: "hero".into(),
        config,
        shapes: parse_shapes(shapes),
        surface: SurfaceSize::new(400, 200),
        seed,
    };
    FluidInstance::new(setup, clock.clone(), &page(), |_| Ok::<_, Infallible>(Recorder::default()))
        .unwrap()
}

#[test]
fn test_startup_splats_when_no_shapes() {
    for seed in 0..16 {
        let clock = ManualClock::new(0.0);
        let fluid = build(SimConfig::default(), "[]", &clock, seed);
        let splats = &fluid.backend().splats;
        assert!(STARTUP_SPLATS.contains(&splats.len()), "{} splats", splats.len());
        for s in splats {
            assert!(s.force.abs().max_element() <= STARTUP_FORCE * 0.5);
            assert!((0.0..=1.0).contains(&s.point.x) && (0.0..=1.0).contains(&s.point.y));
            // Default brightness 0.15, boosted by the startup gain
            assert!(s.color.max_element() <= 0.15 * STARTUP_COLOR_GAIN + 1e-4);
        }
    }
}

#[test]
fn test_shape_occurrences_follow_schedule() {
    let clock = ManualClock::new(0.0);
    let mut fluid = build(
        SimConfig::default(),
        r#"[{"type": "stroke", "timing": {"delay": 100, "duration": 500, "repeat": 2, "repeatDelay": 50}}]"#,
        &clock,
        1,
    );
    let page = page();
    assert!(fluid.backend().splats.is_empty());
    assert_eq!(fluid.pending_timers(), 3);

    let mut starts = Vec::new();
    let mut was_running = false;
    for t in (0..=2000).step_by(10) {
        clock.set(t as f64);
        fluid.tick(&page);
        let running = fluid.shapes().active_count() > 0;
        if running && !was_running {
            starts.push(t);
        }
        was_running = running;
    }
    assert_eq!(starts, vec![100, 750, 1400]);
    assert_eq!(fluid.pending_timers(), 0);
    assert!(!fluid.backend().splats.is_empty());
}

#[test]
fn test_pointer_force_scaled_by_splat_force() {
    let clock = ManualClock::new(0.0);
    let config = SimConfig {
        splat_force: 1000.0,
        projection_distance: 2.0,
        ..SimConfig::default()
    };
    let mut fluid = build(config, r#"[{"type": "circle", "timing": {"delay": 99999}}]"#, &clock, 2);
    let page = page();

    fluid.push_input(InputEvent::PointerDown { id: PointerId::Touch(1), position: Vec2::new(200.0, 100.0) });
    fluid.push_input(InputEvent::PointerMove { id: PointerId::Touch(1), position: Vec2::new(240.0, 100.0) });
    clock.advance(16.0);
    fluid.tick(&page);

    let splats = &fluid.backend().splats;
    assert_eq!(splats.len(), 1);
    // 40 px of 400, landscape: x is uncorrected
    assert!((splats[0].force.x - 0.1 * 1000.0 * 2.0).abs() < 1e-3);
    assert!(splats[0].force.y.abs() < 1e-6);
    assert!((splats[0].point - Vec2::new(0.6, 0.5)).length() < 1e-6);
}

#[test]
fn test_calm_down_after_idle() {
    let clock = ManualClock::new(0.0);
    let config = SimConfig {
        calm_down: true,
        calm_down_delay: 1000.0,
        calm_down_strength: 0.5,
        velocity_dissipation: 0.98,
        ..SimConfig::default()
    };
    let mut fluid = build(config, r#"[{"type": "circle", "timing": {"delay": 99999}}]"#, &clock, 3);
    let page = page();

    clock.set(500.0);
    fluid.tick(&page);
    clock.set(3000.0);
    fluid.tick(&page);

    let steps = &fluid.backend().steps;
    assert_eq!(steps[0].velocity_dissipation, 0.98);
    assert_eq!(steps[1].velocity_dissipation, 0.5);
}

#[test]
fn test_scroll_rules_at_load_and_on_scroll() {
    let clock = ManualClock::new(0.0);
    let config = SimConfig::from_json(
        r#"{"scrollAnimations": {"enabled": true, "rules": [
            {"property": "curl", "scrollStart": 0, "scrollEnd": 100, "valueStart": 0, "valueEnd": 50}
        ]}}"#,
    )
    .unwrap();
    let mut fluid = build(config, "[]", &clock, 4);
    assert_eq!(fluid.config().curl, 0.0);

    fluid.push_input(InputEvent::Scroll { offset: 50.0 });
    clock.advance(16.0);
    fluid.tick(&page());
    assert_eq!(fluid.config().curl, 25.0);
    assert_eq!(fluid.backend().steps[0].curl, 25.0);
}

#[test]
fn test_paused_instance_skips_but_tracks_input() {
    let clock = ManualClock::new(0.0);
    let config = SimConfig { paused: true, ..SimConfig::default() };
    let mut fluid = build(config, "[]", &clock, 5);

    fluid.push_input(InputEvent::PointerMove { id: PointerId::Mouse, position: Vec2::new(100.0, 100.0) });
    clock.advance(16.0);
    assert_eq!(fluid.tick(&page()), Frame::Skip);
    assert!(fluid.backend().steps.is_empty());
    assert_eq!(fluid.backend().renders, 0);
    assert!(fluid.pointers().mouse().moved);
}

#[test]
fn test_existing_fluid_obstacles_stamped_every_tick() {
    let clock = ManualClock::new(0.0);
    let mut config = SimConfig::default();
    config.element_interaction.enabled = true;
    config.element_interaction.selectors = "aside.panel".into();
    config.element_interaction.affect_existing_fluid = true;
    let mut fluid = build(config, "[]", &clock, 6);
    let page = page();

    clock.advance(16.0);
    fluid.tick(&page);
    assert_eq!(fluid.backend().stamps, 0);

    clock.advance(OBSTACLE_SETTLE_MS);
    fluid.tick(&page);
    clock.advance(16.0);
    fluid.tick(&page);
    assert_eq!(fluid.backend().stamps, 2);
}

#[test]
fn test_invalid_selectors_leave_no_obstacles() {
    let clock = ManualClock::new(0.0);
    let mut config = SimConfig::default();
    config.element_interaction.enabled = true;
    config.element_interaction.selectors = "aside > p".into();
    let mut fluid = build(config, "[]", &clock, 7);

    clock.advance(OBSTACLE_SETTLE_MS + 1.0);
    assert!(matches!(fluid.tick(&page()), Frame::Run { .. }));
    assert!(fluid.obstacles().obstacles().is_empty());
}

#[test]
fn test_registry_initializes_each_surface_once() {
    let page = page();
    let clock = ManualClock::new(0.0);
    let mut registry: SurfaceRegistry<FluidInstance<Recorder, ManualClock>> = SurfaceRegistry::new();
    let mut factory = |spec: &SurfaceSpec| {
        let surface = SurfaceSize::new(spec.rect.width as u32, spec.rect.height as u32);
        let setup = InstanceSetup::from_markup(&spec.id, &spec.settings, &spec.shapes, surface).with_seed(0);
        FluidInstance::new(setup, clock.clone(), &page, |_| Ok::<_, Infallible>(Recorder::default()))
    };

    assert_eq!(registry.initialize_all(&page, &mut factory), 2);
    assert_eq!(registry.initialize_all(&page, &mut factory), 0);
    assert_eq!(registry.len(), 2);

    assert_eq!(registry.get("hero").map(|f| f.config().curl), Some(10.0));
    // Malformed markup falls back to defaults and startup splats
    let broken = registry.get("broken").unwrap();
    assert_eq!(broken.config(), &SimConfig::default());
    assert!(broken.shapes().is_empty());
    assert!(!broken.backend().splats.is_empty());
}
