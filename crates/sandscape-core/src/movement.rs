//! Weight-ordered movement rules per type class.

use crate::codec::{TypeClass, head};
use crate::simulation::Simulation;

/// Outcome of a movement attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Motion {
    Moved,
    /// Did not move, but some alternative move is currently open.
    Restless,
    Settled,
}

impl Motion {
    pub(crate) const fn moved(self) -> bool {
        matches!(self, Motion::Moved)
    }

    pub(crate) const fn restless(self) -> bool {
        matches!(self, Motion::Restless)
    }

    const fn from_open(open: bool) -> Self {
        if open { Motion::Restless } else { Motion::Settled }
    }
}

impl Simulation {
    pub(crate) fn resolve_movement(&mut self, x: i32, y: i32, class: TypeClass) -> Motion {
        match class {
            TypeClass::Air | TypeClass::Static => Motion::Settled,
            TypeClass::Falling => {
                if self.try_move(x, y, x, y + 1) {
                    Motion::Moved
                } else {
                    Motion::Settled
                }
            }
            TypeClass::Powder => self.slide_powder(x, y, false),
            TypeClass::PowderWide => self.slide_powder(x, y, true),
            TypeClass::PowderWet => self.slide_wet(x, y),
            TypeClass::PowderFloating => self.drift_floating(x, y),
            TypeClass::Fluid => self.flow(x, y, 1),
            TypeClass::FluidWide => self.flow(x, y, 3),
        }
    }

    /// Straight down, then both diagonals in a random order. Wide powders
    /// may also land two columns over when the cell beside them is lighter.
    fn slide_powder(&mut self, x: i32, y: i32, wide: bool) -> Motion {
        if self.try_move(x, y, x, y + 1) {
            return Motion::Moved;
        }
        let dir = self.rng.sign();
        if self.try_move(x, y, x + dir, y + 1) || self.try_move(x, y, x - dir, y + 1) {
            return Motion::Moved;
        }
        if wide && self.can_enter(x, y, x + dir, y) && self.try_move(x, y, x + 2 * dir, y + 1) {
            return Motion::Moved;
        }
        Motion::Settled
    }

    /// Wet powder only slides diagonally some of the time.
    fn slide_wet(&mut self, x: i32, y: i32) -> Motion {
        if self.try_move(x, y, x, y + 1) {
            return Motion::Moved;
        }
        let dir = self.rng.sign();
        if self.rng.chance(self.config.behavior.wet_slide_chance) {
            if self.try_move(x, y, x + dir, y + 1) || self.try_move(x, y, x - dir, y + 1) {
                return Motion::Moved;
            }
            return Motion::Settled;
        }
        Motion::from_open(self.can_enter(x, y, x + dir, y + 1) || self.can_enter(x, y, x - dir, y + 1))
    }

    /// Floating powders fall like powder through lighter cells and rise
    /// through denser fluids by swapping with the fluid above.
    fn drift_floating(&mut self, x: i32, y: i32) -> Motion {
        if self.try_move(x, y, x, y + 1) {
            return Motion::Moved;
        }
        let dir = self.rng.sign();
        if self.try_move(x, y, x + dir, y + 1) || self.try_move(x, y, x - dir, y + 1) {
            return Motion::Moved;
        }
        let buried = self
            .grid
            .cell(x, y - 1)
            .and_then(|above| above.type_class().ok())
            .is_some_and(TypeClass::is_fluid)
            && self.can_enter(x, y - 1, x, y);
        if !buried {
            return Motion::Settled;
        }
        if self.rng.chance(self.config.behavior.float_rise_chance) && self.try_move(x, y - 1, x, y) {
            return Motion::Moved;
        }
        Motion::Restless
    }

    /// Down, else a lateral run of up to `reach` steps toward a random side.
    fn flow(&mut self, x: i32, y: i32, reach: u32) -> Motion {
        if self.try_move(x, y, x, y + 1) {
            return Motion::Moved;
        }
        let dir = self.rng.sign();
        let mut cx = x;
        for _ in 0..reach {
            if !self.try_move(cx, y, cx + dir, y) {
                break;
            }
            cx += dir;
        }
        if cx != x {
            return Motion::Moved;
        }
        Motion::from_open(self.can_enter(x, y, x - dir, y))
    }

    /// Map a target into the grid, wrapping past the bottom row when
    /// fall-through is enabled.
    fn resolve_target(&self, tx: i32, ty: i32) -> Option<(i32, i32)> {
        if self.grid.in_bounds(tx, ty) {
            return Some((tx, ty));
        }
        let height = self.grid.height() as i32;
        if self.config.boundary.fall_through && ty >= height {
            let wrapped = ty - height;
            if self.grid.in_bounds(tx, wrapped) {
                return Some((tx, wrapped));
            }
        }
        None
    }

    /// Whether the cell at `(x, y)` is heavier than the one at the target.
    pub(crate) fn can_enter(&self, x: i32, y: i32, tx: i32, ty: i32) -> bool {
        let Some((tx, ty)) = self.resolve_target(tx, ty) else {
            return false;
        };
        let src = self.grid.head_at(self.grid.index(x, y));
        let dst = self.grid.head_at(self.grid.index(tx, ty));
        head::weight(src) > head::weight(dst)
    }

    /// Swap `(x, y)` with the target when the source is strictly heavier.
    /// Both positions are stamped for this tick and their chunks woken.
    pub(crate) fn try_move(&mut self, x: i32, y: i32, tx: i32, ty: i32) -> bool {
        let Some((tx, ty)) = self.resolve_target(tx, ty) else {
            return false;
        };
        let src = self.grid.index(x, y);
        let dst = self.grid.index(tx, ty);
        if head::weight(self.grid.head_at(src)) <= head::weight(self.grid.head_at(dst)) {
            return false;
        }
        self.grid.swap_indices(src, dst);
        self.stamp_index(src);
        self.stamp_index(dst);
        self.chunks.touch(x, y);
        self.chunks.touch(tx, ty);
        self.scratch.moves += 1;
        true
    }
}
