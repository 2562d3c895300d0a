//! Frame loop, timers, clocks and the input queue.
//!
//! Nothing here touches a real timer: the host drives [`FrameLoop::poll`]
//! from its per-frame callback and every deadline is compared against an
//! injected [`Clock`], so tests can advance time by hand.

use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Instant;

use glam::Vec2;

use crate::config::SimConfig;

/// Upper bound on a single simulation timestep, in seconds.
pub const MAX_DT: f32 = 1.0 / 60.0;

// ============================================================================
// CLOCKS
// ============================================================================

/// Monotonic millisecond clock.
pub trait Clock {
    fn now_ms(&self) -> f64;
}

/// Wall clock measured from construction.
#[derive(Clone, Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Hand-driven clock. Clones share the same time.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now: Rc<Cell<f64>>,
}

impl ManualClock {
    pub fn new(start_ms: f64) -> Self {
        Self {
            now: Rc::new(Cell::new(start_ms)),
        }
    }

    pub fn set(&self, ms: f64) {
        self.now.set(ms);
    }

    pub fn advance(&self, ms: f64) {
        self.now.set(self.now.get() + ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        self.now.get()
    }
}

// ============================================================================
// FRAME LOOP
// ============================================================================

/// Outcome of one frame-loop poll.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Frame {
    /// The loop was cancelled; the host should stop polling
    Cancelled,
    /// Paused or under the fps cap; nothing to do this frame
    Skip,
    /// Run one tick with this timestep (seconds)
    Run { dt: f32 },
}

/// Cancellable repeating task.
#[derive(Clone, Debug)]
pub struct FrameLoop {
    last_ms: f64,
    cancelled: bool,
    frames: u64,
}

impl FrameLoop {
    pub fn new(start_ms: f64) -> Self {
        Self {
            last_ms: start_ms,
            cancelled: false,
            frames: 0,
        }
    }

    /// Decide what this frame does.
    ///
    /// The pause flag is checked first, then the fps cap. A skipped frame
    /// does not advance the loop's notion of "last frame".
    pub fn poll(&mut self, now_ms: f64, config: &SimConfig) -> Frame {
        if self.cancelled {
            return Frame::Cancelled;
        }
        if config.paused {
            return Frame::Skip;
        }
        let elapsed_ms = (now_ms - self.last_ms).max(0.0);
        if let Some(fps) = config.fps_cap.filter(|fps| *fps > 0.0) {
            if elapsed_ms < 1000.0 / fps as f64 {
                return Frame::Skip;
            }
        }
        self.last_ms = now_ms;
        self.frames += 1;
        let dt = ((elapsed_ms / 1000.0) as f32).min(MAX_DT) * config.animation_speed.max(0.0);
        Frame::Run { dt }
    }

    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Frames that actually ran.
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

// ============================================================================
// TIMERS
// ============================================================================

/// Handle returned by [`TimerQueue::schedule`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

#[derive(Clone, Debug)]
struct Timer<T> {
    id: TimerId,
    due_ms: f64,
    payload: T,
}

/// One-shot timers owned (and cancelled) by a single instance.
#[derive(Clone, Debug)]
pub struct TimerQueue<T> {
    timers: Vec<Timer<T>>,
    next_id: u64,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self {
            timers: Vec::new(),
            next_id: 0,
        }
    }
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, due_ms: f64, payload: T) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.timers.push(Timer {
            id,
            due_ms,
            payload,
        });
        id
    }

    /// Returns false if the timer already fired or was cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.timers.len();
        self.timers.retain(|t| t.id != id);
        self.timers.len() != before
    }

    pub fn cancel_all(&mut self) {
        self.timers.clear();
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Due times of every pending timer, in scheduling order.
    pub fn pending_due_times(&self) -> Vec<f64> {
        self.timers.iter().map(|t| t.due_ms).collect()
    }

    /// Remove and return every timer due at `now_ms`, earliest first
    /// (scheduling order breaks ties).
    pub fn drain_due(&mut self, now_ms: f64) -> Vec<T> {
        let mut due = Vec::new();
        let mut i = 0;
        while i < self.timers.len() {
            if self.timers[i].due_ms <= now_ms {
                due.push(self.timers.remove(i));
            } else {
                i += 1;
            }
        }
        due.sort_by(|a, b| a.due_ms.total_cmp(&b.due_ms).then(a.id.cmp(&b.id)));
        due.into_iter().map(|t| t.payload).collect()
    }
}

// ============================================================================
// INPUT
// ============================================================================

/// Identity of a pointing device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PointerId {
    /// The primary mouse, always pointer slot 0
    Mouse,
    /// A touch contact by host identifier
    Touch(u64),
}

/// Host input, positions in surface pixels with y down.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InputEvent {
    PointerDown { id: PointerId, position: Vec2 },
    PointerMove { id: PointerId, position: Vec2 },
    PointerUp { id: PointerId },
    /// New page scroll offset in pixels
    Scroll { offset: f32 },
    /// New surface size in pixels
    Resize { width: u32, height: u32 },
}

/// Input buffered between ticks and drained exactly once per tick.
#[derive(Clone, Debug, Default)]
pub struct InputQueue {
    events: VecDeque<InputEvent>,
}

impl InputQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: InputEvent) {
        self.events.push_back(event);
    }

    pub fn drain(&mut self) -> Vec<InputEvent> {
        self.events.drain(..).collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
