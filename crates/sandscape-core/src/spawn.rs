//! Post-tick extension hook and the stock spawners.
//!
//! Extensions run after every tick in registration order. They see the grid,
//! the chunk map and the shared random stream through [`SpawnContext`], so a
//! seeded run stays reproducible with extensions installed.

use serde::{Deserialize, Serialize};

use crate::Tick;
use crate::chunks::ChunkMap;
use crate::codec::{BEHAVIOR_SOIL, Cell};
use crate::elements::Element;
use crate::grid::{Grid, GridError};
use crate::random::RandomSource;
use crate::templates::TEMPLATE_COUNT;

/// Mutable view handed to extensions after a tick.
#[derive(Debug)]
pub struct SpawnContext<'a> {
    grid: &'a mut Grid,
    chunks: &'a mut ChunkMap,
    rng: &'a mut RandomSource,
    tick: Tick,
}

impl<'a> SpawnContext<'a> {
    pub(crate) fn new(
        grid: &'a mut Grid,
        chunks: &'a mut ChunkMap,
        rng: &'a mut RandomSource,
        tick: Tick,
    ) -> Self {
        Self {
            grid,
            chunks,
            rng,
            tick,
        }
    }

    #[must_use]
    pub fn grid(&self) -> &Grid {
        &*self.grid
    }

    pub fn rng(&mut self) -> &mut RandomSource {
        &mut *self.rng
    }

    /// Tick that just completed.
    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    /// Write a cell and wake its chunk.
    pub fn set_cell(&mut self, x: i32, y: i32, cell: Cell) -> Result<(), GridError> {
        self.grid.set_cell(x, y, cell)?;
        self.chunks.touch(x, y);
        Ok(())
    }

    pub fn mark_touched(&mut self, x: i32, y: i32) -> Result<(), GridError> {
        self.grid.get_head(x, y)?;
        self.chunks.touch(x, y);
        Ok(())
    }
}

/// Hook invoked after each tick; returns the number of cells it inserted.
pub trait SpawnExtension: Send {
    fn name(&self) -> &'static str;
    fn after_tick(&mut self, ctx: &mut SpawnContext<'_>) -> usize;
}

/// Drops fish pairs into open water.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FishSpawner {
    /// Ticks between spawn rolls.
    pub interval: u64,
    /// Chance a roll spawns anything.
    pub chance: f32,
    /// Random positions tried per roll.
    pub attempts: u32,
    /// Water cells required in the 3x4 block around the pair.
    pub min_water: u32,
}

impl Default for FishSpawner {
    fn default() -> Self {
        Self {
            interval: 120,
            chance: 0.5,
            attempts: 16,
            min_water: 8,
        }
    }
}

impl FishSpawner {
    fn water_block(grid: &Grid, x: i32, y: i32) -> u32 {
        let mut water = 0;
        for dy in -1..=1 {
            for dx in -1..=2 {
                if grid
                    .cell(x + dx, y + dy)
                    .is_some_and(|cell| Element::Water.matches(cell))
                {
                    water += 1;
                }
            }
        }
        water
    }
}

impl SpawnExtension for FishSpawner {
    fn name(&self) -> &'static str {
        "fish"
    }

    fn after_tick(&mut self, ctx: &mut SpawnContext<'_>) -> usize {
        if self.interval == 0 || !ctx.tick().0.is_multiple_of(self.interval) {
            return 0;
        }
        if !ctx.rng().chance(self.chance) {
            return 0;
        }
        let (width, height) = (ctx.grid().width(), ctx.grid().height());
        if width < 2 {
            return 0;
        }
        for _ in 0..self.attempts {
            let x = ctx.rng().next_int(width - 1) as i32;
            let y = ctx.rng().next_int(height) as i32;
            let grid = ctx.grid();
            let open = [x, x + 1]
                .iter()
                .all(|&px| grid.cell(px, y).is_some_and(|c| Element::Water.matches(c)));
            if !open || Self::water_block(grid, x, y) < self.min_water {
                continue;
            }
            let (head_x, body_x) = if ctx.rng().coin() { (x, x + 1) } else { (x + 1, x) };
            let placed = ctx
                .set_cell(head_x, y, Element::FishHead.cell_at(head_x, y))
                .and_then(|()| ctx.set_cell(body_x, y, Element::FishBody.cell_at(body_x, y)));
            if placed.is_ok() {
                return 2;
            }
        }
        0
    }
}

/// Plants grass or tree markers on exposed soil.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedSpawner {
    pub interval: u64,
    pub chance: f32,
    pub attempts: u32,
    /// Share of plantings that become tree markers rather than grass.
    pub tree_fraction: f32,
}

impl Default for SeedSpawner {
    fn default() -> Self {
        Self {
            interval: 90,
            chance: 0.5,
            attempts: 8,
            tree_fraction: 0.15,
        }
    }
}

impl SpawnExtension for SeedSpawner {
    fn name(&self) -> &'static str {
        "seed"
    }

    fn after_tick(&mut self, ctx: &mut SpawnContext<'_>) -> usize {
        if self.interval == 0 || !ctx.tick().0.is_multiple_of(self.interval) {
            return 0;
        }
        if !ctx.rng().chance(self.chance) {
            return 0;
        }
        let (width, height) = (ctx.grid().width(), ctx.grid().height() as i32);
        for _ in 0..self.attempts {
            let x = ctx.rng().next_int(width) as i32;
            let grid = ctx.grid();
            let surface = (0..height).find(|&y| grid.cell(x, y).is_some_and(|c| !c.is_air()));
            let Some(surface) = surface else {
                continue;
            };
            let soil = grid
                .cell(x, surface)
                .is_some_and(|c| c.behavior_code() == BEHAVIOR_SOIL);
            if surface == 0 || !soil {
                continue;
            }
            let y = surface - 1;
            let cell = if ctx.rng().chance(self.tree_fraction) {
                let template = ctx.rng().next_int(TEMPLATE_COUNT as u32);
                Element::TreeSeed.cell_at(x, y).with_aux(template)
            } else {
                Element::Grass.cell_at(x, y)
            };
            if ctx.set_cell(x, y, cell).is_ok() {
                return 1;
            }
        }
        0
    }
}
