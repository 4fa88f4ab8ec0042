use crate::codec::{BEHAVIOR_FISH_BODY, BEHAVIOR_FISH_HEAD, Cell, WEIGHT_WATER};
use crate::elements::Element;
use crate::simulation::Simulation;

impl Simulation {
    /// The head drives the fish: it checks the body is attached, sinks
    /// through anything lighter than water, tracks dryness and swims.
    pub(super) fn step_fish_head(&mut self, x: i32, y: i32, dryness: u32) -> bool {
        let tuning = self.config.behavior;
        let Some(bx) = [x - 1, x + 1]
            .into_iter()
            .find(|&bx| self.behavior_at(bx, y) == Some(BEHAVIOR_FISH_BODY))
        else {
            self.write(x, y, Element::FishCorpse.cell_at(x, y));
            return true;
        };

        if self.relocate_fish((x, y), (bx, y), (0, 1), |cell| cell.weight() < WEIGHT_WATER) {
            return true;
        }

        if self.rng.chance(tuning.fish_sense_chance) {
            let water = self.water_around(x, y) + self.water_around(bx, y);
            if water < tuning.fish_min_water {
                let dryness = dryness + 1;
                if dryness >= tuning.fish_dry_limit {
                    self.write(x, y, Element::FishCorpse.cell_at(x, y));
                    self.write(bx, y, Element::FishCorpse.cell_at(bx, y));
                    return true;
                }
                self.set_aux(x, y, dryness);
            } else if dryness != 0 {
                self.set_aux(x, y, 0);
            }
            return true;
        }

        if self.rng.chance(tuning.fish_swim_chance) {
            let dx = self.rng.next_int(3) as i32 - 1;
            let dy = self.rng.next_int(3) as i32 - 1;
            if (dx, dy) != (0, 0) {
                self.relocate_fish((x, y), (bx, y), (dx, dy), |cell| {
                    Element::Water.matches(cell)
                });
            }
        }
        true
    }

    /// A body without an adjacent head dies.
    pub(super) fn step_fish_body(&mut self, x: i32, y: i32) -> bool {
        let attached = [x - 1, x + 1]
            .into_iter()
            .any(|hx| self.behavior_at(hx, y) == Some(BEHAVIOR_FISH_HEAD));
        if !attached {
            self.write(x, y, Element::FishCorpse.cell_at(x, y));
        }
        true
    }

    fn set_aux(&mut self, x: i32, y: i32, aux: u32) {
        let idx = self.grid.index(x, y);
        let cell = self.grid.cell_at_index(idx).with_aux(aux);
        self.grid.put(idx, cell);
    }

    /// Water cells in the 3x3 block around `(x, y)`.
    fn water_around(&self, x: i32, y: i32) -> u32 {
        let mut count = 0;
        for dy in -1..=1 {
            for dx in -1..=1 {
                if self
                    .grid
                    .cell(x + dx, y + dy)
                    .is_some_and(|cell| Element::Water.matches(cell))
                {
                    count += 1;
                }
            }
        }
        count
    }

    /// Shift both fish cells by `(dx, dy)`. Destinations must be in bounds
    /// and either part of the fish or accepted by `accept`. Cells displaced
    /// from newly occupied positions refill the vacated ones, so the move
    /// never creates or destroys material.
    fn relocate_fish(
        &mut self,
        head: (i32, i32),
        body: (i32, i32),
        (dx, dy): (i32, i32),
        accept: impl Fn(Cell) -> bool,
    ) -> bool {
        let sources = [head, body];
        let targets = [(head.0 + dx, head.1 + dy), (body.0 + dx, body.1 + dy)];
        for &(tx, ty) in &targets {
            if sources.contains(&(tx, ty)) {
                continue;
            }
            match self.grid.cell(tx, ty) {
                Some(cell) if accept(cell) => {}
                _ => return false,
            }
        }

        let head_cell = self.grid.cell_at_index(self.grid.index(head.0, head.1));
        let body_cell = self.grid.cell_at_index(self.grid.index(body.0, body.1));
        let displaced: Vec<Cell> = targets
            .iter()
            .filter(|target| !sources.contains(target))
            .map(|&(tx, ty)| self.grid.cell_at_index(self.grid.index(tx, ty)))
            .collect();
        let vacated = sources.iter().filter(|source| !targets.contains(source));
        for (&(vx, vy), &filler) in vacated.zip(&displaced) {
            self.write(vx, vy, filler);
        }
        self.write(targets[0].0, targets[0].1, head_cell);
        self.write(targets[1].0, targets[1].1, body_cell);
        for &(tx, ty) in &targets {
            let idx = self.grid.index(tx, ty);
            self.stamp_index(idx);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use crate::codec::WEIGHT_WATER;
    use crate::elements::Element;
    use crate::simulation::Simulation;
    use crate::{BehaviorTuning, SandboxConfig};

    fn pond(tuning: BehaviorTuning) -> Simulation {
        let config = SandboxConfig {
            width: 10,
            height: 10,
            chunk_size: 5,
            rng_seed: Some(21),
            behavior: tuning,
            ..SandboxConfig::default()
        };
        Simulation::new(config).expect("sim")
    }

    fn census(sim: &Simulation, element: Element) -> usize {
        sim.grid()
            .iter()
            .filter(|(_, _, cell)| element.matches(*cell))
            .count()
    }

    #[test]
    fn headless_bodies_and_lone_heads_die() {
        let mut sim = pond(BehaviorTuning::default());
        sim.set_cell(2, 2, Element::FishHead.cell()).expect("set");
        sim.set_cell(7, 7, Element::FishBody.cell()).expect("set");
        sim.step_fish_head(2, 2, 0);
        sim.step_fish_body(7, 7);
        assert_eq!(census(&sim, Element::FishCorpse), 2);
    }

    #[test]
    fn fish_sink_through_air_as_a_pair() {
        let mut sim = pond(BehaviorTuning::default());
        sim.set_cell(4, 3, Element::FishHead.cell()).expect("set");
        sim.set_cell(5, 3, Element::FishBody.cell()).expect("set");
        assert!(sim.step_fish_head(4, 3, 0));
        assert!(Element::FishHead.matches(sim.grid().cell(4, 4).expect("cell")));
        assert!(Element::FishBody.matches(sim.grid().cell(5, 4).expect("cell")));
        assert!(sim.grid().cell(4, 3).expect("cell").is_air());
    }

    #[test]
    fn stranded_fish_dry_out() {
        let mut sim = pond(BehaviorTuning {
            fish_sense_chance: 1.0,
            fish_dry_limit: 2,
            ..BehaviorTuning::default()
        });
        sim.fill_rect(0, 9, 10, 10, Element::Rock);
        sim.set_cell(4, 8, Element::FishHead.cell()).expect("set");
        sim.set_cell(5, 8, Element::FishBody.cell()).expect("set");
        sim.step_fish_head(4, 8, 0);
        assert_eq!(sim.grid().cell(4, 8).expect("cell").aux(), 1);
        sim.step_fish_head(4, 8, 1);
        assert_eq!(census(&sim, Element::FishCorpse), 2);
    }

    #[test]
    fn swimming_conserves_water() {
        let mut sim = pond(BehaviorTuning {
            fish_sense_chance: 0.0,
            fish_swim_chance: 1.0,
            ..BehaviorTuning::default()
        });
        sim.fill_rect(0, 0, 10, 10, Element::Water);
        sim.set_cell(4, 5, Element::FishHead.cell()).expect("set");
        sim.set_cell(5, 5, Element::FishBody.cell()).expect("set");
        let water = census(&sim, Element::Water);
        for _ in 0..20 {
            let (hx, hy, _) = sim
                .grid()
                .iter()
                .find(|(_, _, c)| Element::FishHead.matches(*c))
                .expect("head");
            sim.step_fish_head(hx, hy, 0);
        }
        assert_eq!(census(&sim, Element::Water), water);
        assert_eq!(census(&sim, Element::FishHead), 1);
        assert_eq!(census(&sim, Element::FishBody), 1);
        assert!(Element::FishHead.cell().weight() > WEIGHT_WATER);
    }
}
