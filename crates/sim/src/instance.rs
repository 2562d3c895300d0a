//! One fluid backdrop bound to one render surface.
//!
//! `FluidInstance` owns everything a surface needs: the live config, the
//! solver backend, its clock and RNG, pointers, obstacles, scroll rules,
//! shape playback, timers and the frame loop. Nothing is global; two
//! instances on the same page never share mutable state.

use glam::Vec2;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::backend::{FluidBackend, StepParams};
use crate::calm::effective_velocity_dissipation;
use crate::color::ColorGenerator;
use crate::config::SimConfig;
use crate::display::DisplayParams;
use crate::grid::{GridSizes, SurfaceSize};
use crate::host::Layout;
use crate::obstacle::{ObstacleField, OBSTACLE_SETTLE_MS};
use crate::pointer::PointerSet;
use crate::scheduler::{Clock, Frame, FrameLoop, InputEvent, InputQueue, TimerQueue};
use crate::scroll::{apply_rules, ScrollRule};
use crate::shape::{parse_shapes, Shape, ShapePlayback};
use crate::splat::{splat_radius, startup_splats, Injection, Splat};

/// Deferred work owned by an instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Timer {
    /// Start occurrence `iteration` of shape `index`
    Shape { index: usize, iteration: u32 },
    /// Re-query obstacle bounds once layout has settled
    RecomputeObstacles,
}

/// Everything needed to bring an instance up.
#[derive(Clone, Debug)]
pub struct InstanceSetup {
    pub id: String,
    pub config: SimConfig,
    pub shapes: Vec<Shape>,
    pub surface: SurfaceSize,
    pub seed: u64,
}

impl InstanceSetup {
    /// Build from the serialized settings and shape strings stored in markup.
    /// Malformed data falls back to defaults (logged).
    pub fn from_markup(id: &str, settings: &str, shapes: &str, surface: SurfaceSize) -> Self {
        Self {
            id: id.to_string(),
            config: SimConfig::from_json_or_default(settings),
            shapes: parse_shapes(shapes),
            surface,
            seed: rand::random(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

pub struct FluidInstance<B: FluidBackend, C: Clock> {
    id: String,
    config: SimConfig,
    scroll_rules: Vec<ScrollRule>,
    backend: B,
    clock: C,
    rng: StdRng,
    colors: ColorGenerator,
    pointers: PointerSet,
    obstacles: ObstacleField,
    shapes: ShapePlayback,
    timers: TimerQueue<Timer>,
    frames: FrameLoop,
    input: InputQueue,
    surface: SurfaceSize,
    sizes: GridSizes,
    last_injection_ms: f64,
    scroll_offset: f32,
}

impl<B: FluidBackend, C: Clock> FluidInstance<B, C> {
    /// Create the instance and run its load sequence: scroll rules are
    /// applied for the current offset, shapes are scheduled (or random
    /// startup splats injected when there are none) and the first obstacle
    /// computation is queued.
    ///
    /// `make_backend` receives the grid sizes for the initial surface.
    pub fn new<E>(
        setup: InstanceSetup,
        clock: C,
        layout: &dyn Layout,
        make_backend: impl FnOnce(&GridSizes) -> Result<B, E>,
    ) -> Result<Self, E> {
        let InstanceSetup {
            id,
            config,
            shapes,
            surface,
            seed,
        } = setup;

        let sizes = GridSizes::for_surface(&config, surface);
        let backend = make_backend(&sizes)?;
        let now = clock.now_ms();
        let scroll_rules = if config.scroll_animations.enabled {
            config.scroll_animations.rules.clone()
        } else {
            Vec::new()
        };

        let mut instance = Self {
            id,
            obstacles: ObstacleField::new(config.element_interaction.clone()),
            config,
            scroll_rules,
            backend,
            clock,
            rng: StdRng::seed_from_u64(seed),
            colors: ColorGenerator::new(),
            pointers: PointerSet::new(),
            shapes: ShapePlayback::new(shapes),
            timers: TimerQueue::new(),
            frames: FrameLoop::new(now),
            input: InputQueue::new(),
            surface,
            sizes,
            last_injection_ms: now,
            scroll_offset: layout.scroll_offset(),
        };
        instance.load(now);
        Ok(instance)
    }

    fn load(&mut self, now: f64) {
        self.apply_scroll_rules();

        if self.shapes.is_empty() {
            let aspect = self.surface.aspect();
            let splats = startup_splats(&self.config, &mut self.colors, &mut self.rng, aspect);
            log::debug!("`{}`: {} startup splats", self.id, splats.len());
            for splat in &splats {
                self.backend.splat(splat, aspect);
            }
        } else {
            for (index, iteration, at) in self.shapes.occurrences() {
                self.timers.schedule(now + at, Timer::Shape { index, iteration });
            }
        }

        if self.config.element_interaction.enabled {
            self.timers
                .schedule(now + OBSTACLE_SETTLE_MS, Timer::RecomputeObstacles);
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn surface(&self) -> SurfaceSize {
        self.surface
    }

    pub fn sizes(&self) -> &GridSizes {
        &self.sizes
    }

    pub fn pointers(&self) -> &PointerSet {
        &self.pointers
    }

    pub fn obstacles(&self) -> &ObstacleField {
        &self.obstacles
    }

    pub fn shapes(&self) -> &ShapePlayback {
        &self.shapes
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn scroll_offset(&self) -> f32 {
        self.scroll_offset
    }

    pub fn is_cancelled(&self) -> bool {
        self.frames.is_cancelled()
    }

    // ========================================================================
    // Frame
    // ========================================================================

    /// Queue host input for the next tick.
    pub fn push_input(&mut self, event: InputEvent) {
        self.input.push(event);
    }

    /// Run one frame.
    ///
    /// Input is drained on every frame that is not cancelled, so pointer
    /// state and resizes stay current while paused; timers, injections and
    /// the solver only run on `Frame::Run`.
    pub fn tick(&mut self, layout: &dyn Layout) -> Frame {
        let now = self.clock.now_ms();
        let frame = self.frames.poll(now, &self.config);
        if frame == Frame::Cancelled {
            return frame;
        }

        for event in self.input.drain() {
            self.handle_input(event, now, layout);
        }

        let Frame::Run { dt } = frame else {
            return frame;
        };

        for timer in self.timers.drain_due(now) {
            match timer {
                Timer::Shape { index, iteration } => self.shapes.start(
                    index,
                    iteration,
                    now,
                    self.surface,
                    &mut self.colors,
                    &self.config,
                    &mut self.rng,
                ),
                Timer::RecomputeObstacles => self.recompute_obstacles(layout),
            }
        }

        let mut injections = self.shapes.poll(now, self.surface);
        injections.extend(self.pointers.drain_moved());
        for injection in injections {
            self.inject(injection, now);
        }

        let velocity_dissipation =
            effective_velocity_dissipation(&self.config, now - self.last_injection_ms);
        self.backend
            .step(&StepParams::from_config(&self.config, dt, velocity_dissipation));

        if self.obstacles.is_active() && self.obstacles.settings().affect_existing_fluid {
            for stamp in self.obstacles.stamps(now) {
                self.backend.apply_obstacle(&stamp, dt);
            }
        }

        self.backend.render(&DisplayParams::from_config(&self.config));
        frame
    }

    fn handle_input(&mut self, event: InputEvent, now: f64, layout: &dyn Layout) {
        match event {
            InputEvent::PointerDown { id, position } => {
                let color = self.colors.generate(&self.config, &mut self.rng);
                self.pointers.down(id, position, self.surface, color);
            }
            InputEvent::PointerMove { id, position } => {
                let colors = &mut self.colors;
                let rng = &mut self.rng;
                let config = &self.config;
                self.pointers.move_to(
                    id,
                    position,
                    self.surface,
                    config.color_change_distance,
                    || colors.generate(config, rng),
                );
            }
            InputEvent::PointerUp { id } => self.pointers.up(id),
            InputEvent::Scroll { offset } => {
                self.scroll_offset = offset;
                self.apply_scroll_rules();
                let interaction = self.obstacles.settings();
                if interaction.enabled && interaction.track_scroll {
                    self.recompute_obstacles(layout);
                }
            }
            InputEvent::Resize { width, height } => self.resize(width, height, now),
        }
    }

    fn apply_scroll_rules(&mut self) {
        if self.scroll_rules.is_empty() {
            return;
        }
        let applied = apply_rules(&self.scroll_rules, self.scroll_offset, &mut self.config);
        log::trace!(
            "`{}`: {} scroll rules at offset {}",
            self.id,
            applied,
            self.scroll_offset
        );
    }

    fn resize(&mut self, width: u32, height: u32, now: f64) {
        let new = SurfaceSize::new(width, height);
        self.backend.resize_surface(width, height);
        if new.width > 0 && new.height > 0 {
            self.surface = new;
        }
        if !self.sizes.surface.needs_realloc(new) {
            return;
        }

        self.sizes = GridSizes::for_surface(&self.config, new);
        log::info!(
            "`{}`: surface {}x{}, sim {}x{}, dye {}x{}",
            self.id,
            width,
            height,
            self.sizes.sim.width,
            self.sizes.sim.height,
            self.sizes.dye.width,
            self.sizes.dye.height
        );
        self.backend.resize(&self.sizes);
        if self.config.element_interaction.enabled {
            self.timers
                .schedule(now + OBSTACLE_SETTLE_MS, Timer::RecomputeObstacles);
        }
    }

    fn recompute_obstacles(&mut self, layout: &dyn Layout) {
        let selectors = self.obstacles.settings().selectors.clone();
        let Some(surface) = layout.surface_rect(&self.id) else {
            log::warn!("`{}`: surface is no longer in the layout", self.id);
            self.obstacles.clear();
            return;
        };
        if selectors.trim().is_empty() {
            self.obstacles.clear();
            return;
        }
        match layout.query_selector_all(&selectors) {
            Ok(rects) => self.obstacles.rebuild(&surface, &rects),
            Err(e) => {
                log::warn!("`{}`: invalid obstacle selectors: {}", self.id, e);
                self.obstacles.clear();
            }
        }
    }

    /// Shared injection path for pointers and shapes.
    fn inject(&mut self, injection: Injection, now: f64) {
        let aspect = self.surface.aspect();
        let mut force =
            injection.delta * self.config.splat_force * self.config.projection_distance;
        let mut color = injection.color;

        if self.obstacles.is_active() && self.obstacles.settings().affect_new_splats {
            let effect = self.obstacles.evaluate(injection.point, now);
            if effect.blocked {
                return;
            }
            force += effect.force_delta;
            color *= effect.opacity;
        }

        self.backend.splat(
            &Splat {
                point: injection.point,
                force,
                color,
                radius: splat_radius(&self.config, aspect),
            },
            aspect,
        );
        self.last_injection_ms = now;
    }

    /// Inject a splat at a normalized point, bypassing pointers.
    pub fn splat_at(&mut self, point: Vec2, delta: Vec2) {
        let now = self.clock.now_ms();
        let color = self.colors.generate(&self.config, &mut self.rng);
        self.inject(Injection { point, delta, color }, now);
    }

    /// Stop the frame loop and drop every timer and queued event. The
    /// instance ignores all further ticks.
    pub fn teardown(&mut self) {
        self.frames.cancel();
        self.timers.cancel_all();
        self.input.clear();
        self.shapes.stop_all();
        log::info!("`{}`: torn down", self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::StaticPage;
    use crate::scheduler::{ManualClock, PointerId};
    use crate::solver::CpuFluid;
    use std::convert::Infallible;

    fn page() -> StaticPage {
        StaticPage::from_json(
            r#"{"surfaces": [{"id": "s", "rect": {"left": 0, "top": 0, "width": 200, "height": 100},
                 "fluidEnabled": true}],
                "elements": [{"tag": "div", "classes": ["card"],
                 "rect": {"left": 50, "top": 25, "width": 100, "height": 50}}]}"#,
        )
        .unwrap()
    }

    fn small_config() -> SimConfig {
        SimConfig {
            sim_resolution: 16,
            dye_resolution: 32,
            bloom: false,
            pressure_iterations: 4,
            ..SimConfig::default()
        }
    }

    fn instance(
        config: SimConfig,
        shapes: Vec<Shape>,
        clock: &ManualClock,
    ) -> FluidInstance<CpuFluid, ManualClock> {
        let setup = InstanceSetup {
            id: "s".into(),
            config,
            shapes,
            surface: SurfaceSize::new(200, 100),
            seed: 5,
        };
        FluidInstance::new(setup, clock.clone(), &page(), |sizes| {
            Ok::<_, Infallible>(CpuFluid::new(sizes))
        })
        .unwrap()
    }

    #[test]
    fn test_startup_splats_without_shapes() {
        let clock = ManualClock::new(0.0);
        let fluid = instance(small_config(), Vec::new(), &clock);
        assert!(fluid.backend().dye().max_abs() > 0.0);
        assert_eq!(fluid.pending_timers(), 0);
    }

    #[test]
    fn test_shapes_replace_startup_splats() {
        let clock = ManualClock::new(0.0);
        let shapes = parse_shapes(r#"[{"type": "stroke", "timing": {"delay": 100, "repeat": 1}}]"#);
        let fluid = instance(small_config(), shapes, &clock);
        assert_eq!(fluid.backend().dye().max_abs(), 0.0);
        assert_eq!(fluid.pending_timers(), 2);
    }

    #[test]
    fn test_pointer_motion_injects_and_steps() {
        let clock = ManualClock::new(0.0);
        let mut fluid = instance(small_config(), parse_shapes("[]"), &clock);
        let page = page();
        // Clear startup dye so the pointer is the only source
        fluid.backend_mut().dye_mut().fill(glam::Vec4::ZERO);

        fluid.push_input(InputEvent::PointerMove {
            id: PointerId::Mouse,
            position: Vec2::new(100.0, 50.0),
        });
        fluid.push_input(InputEvent::PointerMove {
            id: PointerId::Mouse,
            position: Vec2::new(120.0, 50.0),
        });
        clock.advance(16.0);
        assert!(matches!(fluid.tick(&page), Frame::Run { .. }));
        assert!(fluid.backend().dye().max_abs() > 0.0);
        assert_eq!(fluid.backend().steps(), 1);
    }

    #[test]
    fn test_obstacle_blocks_new_splats() {
        let clock = ManualClock::new(0.0);
        let mut config = small_config();
        config.element_interaction.enabled = true;
        config.element_interaction.selectors = ".card".into();
        let mut fluid = instance(config, parse_shapes(r#"[{"type": "circle", "timing": {"delay": 60000}}]"#), &clock);
        let page = page();

        clock.advance(OBSTACLE_SETTLE_MS + 1.0);
        fluid.tick(&page);
        assert_eq!(fluid.obstacles().obstacles().len(), 1);

        fluid.backend_mut().dye_mut().fill(glam::Vec4::ZERO);
        // Centre of the card is blocked
        fluid.splat_at(Vec2::new(0.5, 0.5), Vec2::new(0.01, 0.0));
        assert_eq!(fluid.backend().dye().max_abs(), 0.0);
        fluid.splat_at(Vec2::new(0.05, 0.05), Vec2::new(0.01, 0.0));
        assert!(fluid.backend().dye().max_abs() > 0.0);
    }

    #[test]
    fn test_small_resize_keeps_grids() {
        let clock = ManualClock::new(0.0);
        let mut fluid = instance(small_config(), Vec::new(), &clock);
        let page = page();
        let before = fluid.sizes().clone();

        fluid.push_input(InputEvent::Resize { width: 201, height: 101 });
        clock.advance(16.0);
        fluid.tick(&page);
        assert_eq!(fluid.sizes(), &before);
        assert!(fluid.backend().dye().max_abs() > 0.0);

        fluid.push_input(InputEvent::Resize { width: 100, height: 200 });
        clock.advance(16.0);
        fluid.tick(&page);
        assert_eq!(fluid.surface(), SurfaceSize::new(100, 200));
        assert!(fluid.sizes().sim.height > fluid.sizes().sim.width);
    }

    #[test]
    fn test_teardown_cancels_everything() {
        let clock = ManualClock::new(0.0);
        let shapes = parse_shapes(r#"[{"type": "stroke", "timing": {"delay": 100}}]"#);
        let mut fluid = instance(small_config(), shapes, &clock);
        fluid.push_input(InputEvent::Scroll { offset: 10.0 });
        fluid.teardown();

        assert_eq!(fluid.pending_timers(), 0);
        clock.advance(500.0);
        assert_eq!(fluid.tick(&page()), Frame::Cancelled);
        assert_eq!(fluid.backend().steps(), 0);
        assert_eq!(fluid.scroll_offset(), 0.0);
    }
}
