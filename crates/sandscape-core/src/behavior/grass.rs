use crate::codec::{BEHAVIOR_GRASS, BEHAVIOR_SOIL, WEIGHT_POWDER, head};
use crate::elements::Element;
use crate::simulation::Simulation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cover {
    Flooded,
    Buried,
    Light,
}

impl Simulation {
    /// Grass dies under heavy cover, grows upward while its stage lasts, and
    /// spreads onto nearby air-over-soil sites. Returns whether the blade
    /// changed or still has something left to do.
    pub(super) fn step_grass(&mut self, x: i32, y: i32, stage: u32) -> bool {
        let tuning = self.config.behavior;
        if !self.rng.chance(tuning.grass_chance) {
            return tuning.grass_chance > 0.0 && self.grass_pending(x, y, stage);
        }

        if let Some(cover) = self.grass_cover(x, y) {
            let dies = match cover {
                Cover::Flooded => self.rng.chance(tuning.grass_flood_death),
                Cover::Buried => true,
                Cover::Light => false,
            };
            if dies {
                self.write(x, y, Element::Soil.cell_at(x, y));
                return true;
            }
            return cover == Cover::Flooded && tuning.grass_flood_death > 0.0;
        }

        if stage > 0 && self.grid.cell(x, y - 1).is_some_and(|above| above.is_air()) {
            self.write(x, y - 1, Element::Grass.cell_at(x, y - 1).with_aux(stage - 1));
            let word = self.grid.head_at(self.grid.index(x, y));
            self.write_head(x, y, head::with_aux(word, 0));
            return true;
        }

        let dir = self.rng.sign();
        let site = self
            .grass_site(x, y, dir)
            .or_else(|| self.grass_site(x, y, -dir));
        if let Some((sx, sy)) = site {
            let stage = 1 + self.rng.next_int(tuning.grass_max_stage.max(1));
            self.write(sx, sy, Element::Grass.cell_at(sx, sy).with_aux(stage));
            return true;
        }
        false
    }

    /// Whether a successful roll would change anything around this blade.
    fn grass_pending(&self, x: i32, y: i32, stage: u32) -> bool {
        match self.grass_cover(x, y) {
            Some(Cover::Flooded) => self.config.behavior.grass_flood_death > 0.0,
            Some(Cover::Buried) => true,
            Some(Cover::Light) => false,
            None => {
                (stage > 0 && self.grid.cell(x, y - 1).is_some_and(|above| above.is_air()))
                    || self.grass_site(x, y, -1).is_some()
                    || self.grass_site(x, y, 1).is_some()
            }
        }
    }

    /// Foreign material sitting on the blade, if any.
    fn grass_cover(&self, x: i32, y: i32) -> Option<Cover> {
        let above = self.grid.cell(x, y - 1)?;
        if above.is_air() || above.behavior_code() == BEHAVIOR_GRASS {
            return None;
        }
        Some(if above.type_class().is_ok_and(|class| class.is_fluid()) {
            Cover::Flooded
        } else if above.weight() >= WEIGHT_POWDER {
            Cover::Buried
        } else {
            Cover::Light
        })
    }

    /// First spread site on side `dir` (diagonal up, level, diagonal down):
    /// air with soil below and air or the sky above.
    fn grass_site(&self, x: i32, y: i32, dir: i32) -> Option<(i32, i32)> {
        [-1, 0, 1].into_iter().map(|dy| (x + dir, y + dy)).find(|&(sx, sy)| {
            self.grid.cell(sx, sy).is_some_and(|c| c.is_air())
                && self.behavior_at(sx, sy + 1) == Some(BEHAVIOR_SOIL)
                && self.grid.cell(sx, sy - 1).is_none_or(|c| c.is_air())
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::elements::Element;
    use crate::simulation::Simulation;
    use crate::{BehaviorTuning, SandboxConfig};

    fn eager() -> Simulation {
        let config = SandboxConfig {
            width: 8,
            height: 8,
            chunk_size: 4,
            rng_seed: Some(2),
            behavior: BehaviorTuning {
                grass_chance: 1.0,
                grass_flood_death: 1.0,
                ..BehaviorTuning::default()
            },
            ..SandboxConfig::default()
        };
        Simulation::new(config).expect("sim")
    }

    #[test]
    fn grass_grows_upward_and_hands_down_its_stage() {
        let mut sim = eager();
        sim.set_cell(3, 6, Element::Grass.cell_with_aux(2)).expect("set");
        assert!(sim.step_grass(3, 6, 2));
        let blade = sim.grid().cell(3, 5).expect("cell");
        assert!(Element::Grass.matches(blade));
        assert_eq!(blade.aux(), 1);
        assert_eq!(sim.grid().cell(3, 6).expect("cell").aux(), 0);
    }

    #[test]
    fn buried_grass_turns_to_soil() {
        let mut sim = eager();
        sim.set_cell(3, 6, Element::Grass.cell()).expect("set");
        sim.set_cell(3, 5, Element::Sand.cell()).expect("set");
        sim.step_grass(3, 6, 3);
        assert!(Element::Soil.matches(sim.grid().cell(3, 6).expect("cell")));
    }

    #[test]
    fn grass_spreads_onto_soil() {
        let mut sim = eager();
        sim.fill_rect(0, 7, 8, 8, Element::Soil);
        sim.set_cell(4, 6, Element::Grass.cell_with_aux(0)).expect("set");
        assert!(sim.step_grass(4, 6, 0));
        let spread = [3, 5]
            .into_iter()
            .any(|x| Element::Grass.matches(sim.grid().cell(x, 6).expect("cell")));
        assert!(spread);
    }

    #[test]
    fn grass_with_nothing_to_do_is_not_restless() {
        let mut sim = eager();
        // Top row: no room to grow and no soil to spread onto.
        sim.set_cell(3, 0, Element::Grass.cell_with_aux(2)).expect("set");
        assert!(!sim.step_grass(3, 0, 2));
        assert!(Element::Grass.matches(sim.grid().cell(3, 0).expect("cell")));

        let mut idle = Simulation::new(SandboxConfig {
            behavior: BehaviorTuning {
                grass_chance: 0.0,
                ..BehaviorTuning::default()
            },
            ..sim.config().clone()
        })
        .expect("sim");
        idle.set_cell(3, 0, Element::Grass.cell_with_aux(2)).expect("set");
        assert!(!idle.step_grass(3, 0, 2));
    }

    #[test]
    fn grass_that_can_grow_stays_restless_between_rolls() {
        let mut sim = Simulation::new(SandboxConfig {
            width: 8,
            height: 8,
            chunk_size: 4,
            rng_seed: Some(2),
            behavior: BehaviorTuning {
                grass_chance: 1e-6,
                ..BehaviorTuning::default()
            },
            ..SandboxConfig::default()
        })
        .expect("sim");
        sim.set_cell(3, 6, Element::Grass.cell_with_aux(2)).expect("set");
        assert!(sim.step_grass(3, 6, 2));
        assert!(sim.grid().cell(3, 5).is_some_and(|c| c.is_air()));
    }
}
