//! Pointer and touch capture.

use glam::{Vec2, Vec3};

use crate::grid::SurfaceSize;
use crate::splat::Injection;
use crate::scheduler::PointerId;

/// Per-device pointer state.
#[derive(Clone, Debug, PartialEq)]
pub struct Pointer {
    pub id: PointerId,
    /// Normalized position, y up
    pub texcoord: Vec2,
    pub prev_texcoord: Vec2,
    /// Aspect-corrected normalized delta of the last move
    pub delta: Vec2,
    pub down: bool,
    pub moved: bool,
    pub color: Vec3,
    /// Pixels travelled since the color last changed
    pub travel_px: f32,
}

impl Pointer {
    fn new(id: PointerId) -> Self {
        Self {
            id,
            texcoord: Vec2::ZERO,
            prev_texcoord: Vec2::ZERO,
            delta: Vec2::ZERO,
            down: false,
            moved: false,
            color: Vec3::ZERO,
            travel_px: 0.0,
        }
    }
}

/// Convert a surface pixel position (y down) into a normalized texcoord (y up).
pub fn texcoord(position: Vec2, surface: SurfaceSize) -> Vec2 {
    let size = surface.as_vec2();
    Vec2::new(position.x / size.x, 1.0 - position.y / size.y)
}

/// Scale a normalized delta so equal pixel motion gives equal force on
/// both axes: x shrinks on portrait surfaces, y shrinks on landscape ones.
pub fn correct_delta(delta: Vec2, aspect: f32) -> Vec2 {
    let mut d = delta;
    if aspect < 1.0 {
        d.x *= aspect;
    }
    if aspect > 1.0 {
        d.y /= aspect;
    }
    d
}

/// Every live pointer. Slot 0 is always the mouse; touches are appended on
/// contact and removed on release.
#[derive(Clone, Debug)]
pub struct PointerSet {
    pointers: Vec<Pointer>,
}

impl Default for PointerSet {
    fn default() -> Self {
        Self::new()
    }
}

impl PointerSet {
    pub fn new() -> Self {
        Self {
            pointers: vec![Pointer::new(PointerId::Mouse)],
        }
    }

    pub fn len(&self) -> usize {
        self.pointers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pointers.is_empty()
    }

    pub fn get(&self, id: PointerId) -> Option<&Pointer> {
        self.pointers.iter().find(|p| p.id == id)
    }

    pub fn mouse(&self) -> &Pointer {
        &self.pointers[0]
    }

    fn slot_mut(&mut self, id: PointerId) -> Option<&mut Pointer> {
        self.pointers.iter_mut().find(|p| p.id == id)
    }

    /// Contact start. Creates the touch slot if needed.
    pub fn down(&mut self, id: PointerId, position: Vec2, surface: SurfaceSize, color: Vec3) {
        if self.slot_mut(id).is_none() {
            self.pointers.push(Pointer::new(id));
        }
        let Some(pointer) = self.slot_mut(id) else {
            return;
        };
        let tc = texcoord(position, surface);
        pointer.down = true;
        pointer.moved = false;
        pointer.texcoord = tc;
        pointer.prev_texcoord = tc;
        pointer.delta = Vec2::ZERO;
        pointer.color = color;
        pointer.travel_px = 0.0;
    }

    /// Pointer motion. The mouse is tracked while hovering; touches only
    /// while in contact.
    ///
    /// `new_color` is called when the travelled distance reaches
    /// `color_change_distance` pixels (every move when that is zero).
    pub fn move_to(
        &mut self,
        id: PointerId,
        position: Vec2,
        surface: SurfaceSize,
        color_change_distance: f32,
        mut new_color: impl FnMut() -> Vec3,
    ) {
        let Some(pointer) = self.slot_mut(id) else {
            return;
        };
        if id != PointerId::Mouse && !pointer.down {
            return;
        }

        let tc = texcoord(position, surface);
        pointer.prev_texcoord = pointer.texcoord;
        pointer.texcoord = tc;
        let raw = pointer.texcoord - pointer.prev_texcoord;
        pointer.delta = correct_delta(raw, surface.aspect());
        pointer.moved = pointer.delta != Vec2::ZERO;

        if pointer.moved {
            pointer.travel_px += (raw * surface.as_vec2()).length();
            if color_change_distance <= 0.0 || pointer.travel_px >= color_change_distance {
                pointer.color = new_color();
                pointer.travel_px = 0.0;
            }
        }
    }

    /// Contact end. The mouse slot persists; touch slots are removed.
    pub fn up(&mut self, id: PointerId) {
        match id {
            PointerId::Mouse => self.pointers[0].down = false,
            PointerId::Touch(_) => self.pointers.retain(|p| p.id != id),
        }
    }

    /// Take every moved pointer's pending injection, clearing `moved`.
    pub fn drain_moved(&mut self) -> Vec<Injection> {
        self.pointers
            .iter_mut()
            .filter(|p| p.moved)
            .map(|p| {
                p.moved = false;
                Injection {
                    point: p.texcoord,
                    delta: p.delta,
                    color: p.color,
                }
            })
            .collect()
    }
}
