use crate::codec::{BEHAVIOR_SOIL, TYPE_STATIC, TypeClass, WEIGHT_STATIC, head};
use crate::elements::Element;
use crate::simulation::Simulation;

const NEIGHBORHOOD: [(i32, i32); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

impl Simulation {
    /// Roots extend downward (occasionally diagonally) while their growth
    /// counter lasts. Exhausted roots occasionally bind nearby loose
    /// material into static ground.
    pub(super) fn step_root(&mut self, x: i32, y: i32, remaining: u32) -> bool {
        let tuning = self.config.behavior;
        if remaining == 0 {
            if self.rng.chance(tuning.root_harden_chance) {
                self.harden_around(x, y);
            }
            return false;
        }
        if !self.rng.chance(tuning.root_growth_chance) {
            return tuning.root_growth_chance > 0.0 && self.root_has_room(x, y);
        }
        if self.root_can_enter(x, y + 1) {
            self.extend_root(x, y, x, y + 1, remaining);
            return true;
        }
        if self.rng.chance(tuning.root_diagonal_chance) {
            let dir = self.rng.sign();
            if self.root_can_enter(x + dir, y + 1) {
                self.extend_root(x, y, x + dir, y + 1, remaining);
                return true;
            }
        }
        self.root_has_room(x, y)
    }

    /// Whether the tip can still extend straight down or diagonally.
    fn root_has_room(&self, x: i32, y: i32) -> bool {
        let diagonal = self.config.behavior.root_diagonal_chance > 0.0;
        self.root_can_enter(x, y + 1)
            || (diagonal && (self.root_can_enter(x - 1, y + 1) || self.root_can_enter(x + 1, y + 1)))
    }

    fn root_can_enter(&self, x: i32, y: i32) -> bool {
        self.grid
            .cell(x, y)
            .is_some_and(|cell| cell.is_air() || cell.behavior_code() == BEHAVIOR_SOIL)
    }

    /// The new tip inherits the counter minus one; the old tip stops growing.
    fn extend_root(&mut self, x: i32, y: i32, tx: i32, ty: i32, remaining: u32) {
        self.write(tx, ty, Element::TreeRoot.cell_at(tx, ty).with_aux(remaining - 1));
        let word = self.grid.head_at(self.grid.index(x, y));
        self.write_head(x, y, head::with_aux(word, 0));
    }

    fn harden_around(&mut self, x: i32, y: i32) {
        for (dx, dy) in NEIGHBORHOOD {
            let (nx, ny) = (x + dx, y + dy);
            let Some(cell) = self.grid.cell(nx, ny) else {
                continue;
            };
            let loose = cell
                .type_class()
                .is_ok_and(|class| class.is_powder() || class == TypeClass::Falling);
            if loose {
                let word = head::with_type_class(cell.head, TYPE_STATIC);
                self.write_head(nx, ny, head::with_weight(word, WEIGHT_STATIC));
            }
        }
    }
}
