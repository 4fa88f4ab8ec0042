use crate::codec::{Behavior, NIBBLE_MAX};
use crate::elements::Element;
use crate::simulation::Simulation;

const ORTHOGONAL: [(i32, i32); 4] = [(0, -1), (0, 1), (-1, 0), (1, 0)];
const DIAGONAL: [(i32, i32); 4] = [(-1, -1), (1, -1), (-1, 1), (1, 1)];

impl Simulation {
    /// Leaves age slowly (tree growth passes reset them) and wither into
    /// dead leaves at full vitality. Leaves cut off from the tree or buried
    /// under material revert to the default cell.
    /// Ageing alone does not keep the chunk awake.
    pub(super) fn step_leaf(&mut self, x: i32, y: i32, vitality: u32) -> bool {
        let tuning = self.config.behavior;
        let detached = tuning.leaf_check_chance > 0.0 && self.leaf_detached(x, y);
        if detached && self.rng.chance(tuning.leaf_check_chance) {
            self.write(x, y, self.default_cell);
            return true;
        }
        if self.rng.chance(tuning.leaf_age_chance) {
            let vitality = vitality + 1;
            if vitality >= NIBBLE_MAX {
                self.write(x, y, Element::DeadLeaf.cell_at(x, y));
                return true;
            }
            let idx = self.grid.index(x, y);
            let cell = self.grid.cell_at_index(idx).with_aux(vitality);
            self.grid.put(idx, cell);
        }
        detached
    }

    /// Orphaned: no tree part among the eight neighbours. Buried: every
    /// orthogonal neighbour is foreign, non-air material.
    fn leaf_detached(&self, x: i32, y: i32) -> bool {
        let is_tree = |px: i32, py: i32| {
            self.grid
                .cell(px, py)
                .and_then(|cell| cell.behavior().ok())
                .is_some_and(Behavior::is_tree_part)
        };
        let orphaned = !ORTHOGONAL
            .iter()
            .chain(DIAGONAL.iter())
            .any(|&(dx, dy)| is_tree(x + dx, y + dy));
        let buried = ORTHOGONAL.iter().all(|&(dx, dy)| {
            let (px, py) = (x + dx, y + dy);
            self.grid
                .cell(px, py)
                .is_none_or(|cell| !cell.is_air() && !is_tree(px, py))
        });
        orphaned || buried
    }
}

#[cfg(test)]
mod tests {
    use crate::elements::Element;
    use crate::simulation::Simulation;
    use crate::{BehaviorTuning, SandboxConfig};

    fn canopy(tuning: BehaviorTuning) -> Simulation {
        let config = SandboxConfig {
            width: 8,
            height: 8,
            chunk_size: 4,
            rng_seed: Some(12),
            behavior: tuning,
            ..SandboxConfig::default()
        };
        Simulation::new(config).expect("sim")
    }

    #[test]
    fn leaves_age_into_dead_leaves() {
        let mut sim = canopy(BehaviorTuning {
            leaf_age_chance: 1.0,
            leaf_check_chance: 0.0,
            ..BehaviorTuning::default()
        });
        sim.set_cell(3, 3, Element::TreeTrunk.cell()).expect("set");
        sim.set_cell(3, 2, Element::TreeLeaf.cell_with_aux(13)).expect("set");
        sim.step_leaf(3, 2, 13);
        assert_eq!(sim.grid().cell(3, 2).expect("cell").aux(), 14);
        sim.step_leaf(3, 2, 14);
        assert!(Element::DeadLeaf.matches(sim.grid().cell(3, 2).expect("cell")));
    }

    #[test]
    fn orphaned_leaves_revert_to_default() {
        let mut sim = canopy(BehaviorTuning {
            leaf_age_chance: 0.0,
            leaf_check_chance: 1.0,
            ..BehaviorTuning::default()
        });
        sim.set_cell(5, 5, Element::TreeLeaf.cell()).expect("set");
        sim.step_leaf(5, 5, 0);
        assert_eq!(sim.grid().cell(5, 5), Some(sim.default_cell()));
    }

    #[test]
    fn attached_leaves_survive_checks() {
        let mut sim = canopy(BehaviorTuning {
            leaf_age_chance: 0.0,
            leaf_check_chance: 1.0,
            ..BehaviorTuning::default()
        });
        sim.set_cell(2, 2, Element::TreeLeaf.cell()).expect("set");
        sim.set_cell(2, 3, Element::TreeTrunk.cell()).expect("set");
        assert!(!sim.step_leaf(2, 2, 0), "attached leaves let the chunk sleep");
        assert!(Element::TreeLeaf.matches(sim.grid().cell(2, 2).expect("cell")));
    }

    #[test]
    fn buried_leaves_revert() {
        let mut sim = canopy(BehaviorTuning {
            leaf_age_chance: 0.0,
            leaf_check_chance: 1.0,
            ..BehaviorTuning::default()
        });
        sim.fill_rect(0, 0, 8, 8, Element::Sand);
        sim.set_cell(4, 4, Element::TreeLeaf.cell()).expect("set");
        sim.set_cell(3, 3, Element::TreeTrunk.cell()).expect("set");
        sim.step_leaf(4, 4, 0);
        assert_eq!(sim.grid().cell(4, 4), Some(sim.default_cell()));
    }
}
