//! Per-tick chunk scheduling.
//!
//! Each tick snapshots the live chunk set, clears it, and scans the snapshot
//! bottom-up. Cells that moved or still could move keep their chunk alive;
//! moves and writes wake the chunks they touch; inactive chunks next to busy
//! or freshly written ones are probed along the shared edge. Chunks only go
//! quiet on full passes.

use tracing::{debug, error, trace};

use crate::codec::{
    BEHAVIOR_FISH_BODY, BEHAVIOR_FISH_HEAD, BEHAVIOR_GRASS, BEHAVIOR_TREE, BEHAVIOR_TREE_LEAF,
    BEHAVIOR_TREE_ROOT, Behavior, Cell, TYPE_AIR, TYPE_STATIC, TypeClass, head,
};
use crate::simulation::Simulation;
use crate::spawn::SpawnContext;
use crate::{SimulationError, Tick, TickEvents};

/// Counters gathered while scanning.
#[derive(Debug, Default, Clone, Copy)]
struct PassStats {
    active_chunks: usize,
    cells_processed: usize,
}

impl Simulation {
    /// Advance the scene by one tick.
    ///
    /// An unknown type-class or behavior code encountered while scanning is
    /// fatal: the error carries the offending coordinates and every later
    /// call returns [`SimulationError::Halted`].
    pub fn tick(&mut self) -> Result<TickEvents, SimulationError> {
        if self.halted {
            return Err(SimulationError::Halted);
        }
        self.advance_stamp();
        self.scratch.moves = 0;
        let full_pass = self.choose_pass_mode();

        let stats = match self.run_pass(full_pass) {
            Ok(stats) => stats,
            Err(err) => {
                self.halted = true;
                error!(tick = self.tick.0, error = %err, "simulation halted");
                return Err(err);
            }
        };

        if self.config.boundary.erasing {
            self.erase_border();
        }

        let next_tick = self.tick.next();
        let spawned = self.run_extensions(next_tick);
        self.tick = next_tick;
        self.stage_snapshot();

        let events = TickEvents {
            tick: self.tick,
            full_pass,
            active_chunks: stats.active_chunks,
            cells_processed: stats.cells_processed,
            moves: self.scratch.moves,
            spawned,
        };
        trace!(
            tick = events.tick.0,
            full_pass,
            active_chunks = events.active_chunks,
            moves = events.moves,
            "tick processed"
        );
        Ok(events)
    }

    fn choose_pass_mode(&mut self) -> bool {
        let drawn = self.rng.chance(self.config.sequential_pass_chance);
        let forced = self.pass_streak >= self.config.max_ticks_between_full_pass;
        let full = drawn || forced;
        self.pass_streak = if full { 0 } else { self.pass_streak + 1 };
        full
    }

    fn run_pass(&mut self, full_pass: bool) -> Result<PassStats, SimulationError> {
        let mut scheduled = std::mem::take(&mut self.scratch.scheduled);
        let mut touched = std::mem::take(&mut self.scratch.touched);
        let mut still_active = std::mem::take(&mut self.scratch.still_active);
        let mut chunk_order = std::mem::take(&mut self.scratch.chunk_order);
        let mut columns = std::mem::take(&mut self.scratch.columns);

        self.chunks.begin_tick(&mut scheduled, &mut touched);
        still_active.clear();
        still_active.resize(scheduled.len(), 0);

        let result = self.scan_rows(
            full_pass,
            &scheduled,
            &mut still_active,
            &mut chunk_order,
            &mut columns,
        );

        if result.is_ok() {
            self.settle_chunks(full_pass, &scheduled, &touched, &still_active);
        }

        self.scratch.scheduled = scheduled;
        self.scratch.touched = touched;
        self.scratch.still_active = still_active;
        self.scratch.chunk_order = chunk_order;
        self.scratch.columns = columns;
        result
    }

    fn scan_rows(
        &mut self,
        full_pass: bool,
        scheduled: &[bool],
        still_active: &mut [u32],
        chunk_order: &mut Vec<u32>,
        columns: &mut Vec<i32>,
    ) -> Result<PassStats, SimulationError> {
        let size = self.chunks.chunk_size();
        let cols = self.chunks.cols();
        let height = self.grid.height();
        let width = self.grid.width() as i32;
        let mut stats = PassStats {
            active_chunks: scheduled.iter().filter(|&&on| on).count(),
            cells_processed: 0,
        };

        for cy in (0..self.chunks.rows()).rev() {
            chunk_order.clear();
            chunk_order.extend(0..cols);
            self.rng.shuffle(chunk_order);

            columns.clear();
            if full_pass {
                let ascending = self.rng.coin();
                columns.extend((0..size as i32).map(|c| {
                    if ascending { c } else { size as i32 - 1 - c }
                }));
            } else {
                for _ in 0..size {
                    columns.push(self.rng.next_int(size) as i32);
                }
            }

            let row_top = cy * size;
            let row_bottom = (row_top + size).min(height);
            if !(0..cols).any(|cx| scheduled[self.chunks.index(cx, cy)]) {
                continue;
            }

            for y in (row_top..row_bottom).rev() {
                let y = y as i32;
                for &cx in chunk_order.iter() {
                    let chunk = self.chunks.index(cx, cy);
                    if !scheduled[chunk] {
                        continue;
                    }
                    let x0 = (cx * size) as i32;
                    for &dx in columns.iter() {
                        let x = x0 + dx;
                        if x >= width {
                            continue;
                        }
                        let idx = self.grid.index(x, y);
                        if self.is_stamped(idx) {
                            continue;
                        }
                        stats.cells_processed += 1;
                        if self.step_cell(x, y)? {
                            still_active[chunk] += 1;
                        }
                    }
                }
            }
        }
        Ok(stats)
    }

    /// Movement first; behaviors only run for cells that stayed put.
    /// Returns whether the cell should keep its chunk awake.
    fn step_cell(&mut self, x: i32, y: i32) -> Result<bool, SimulationError> {
        let idx = self.grid.index(x, y);
        let word = self.grid.head_at(idx);
        let code = head::type_class(word);
        if code == TYPE_AIR {
            return Ok(false);
        }
        let class = TypeClass::try_from(code)
            .map_err(|_| SimulationError::UnknownTypeClass { x, y, code })?;
        let motion = self.resolve_movement(x, y, class);
        if motion.moved() {
            return Ok(true);
        }
        let code = head::behavior(word);
        let behavior = Behavior::try_from(code)
            .map_err(|_| SimulationError::UnknownBehavior { x, y, code })?;
        let lively = self.dispatch_behavior(x, y, behavior, word);
        Ok(motion.restless() || lively)
    }

    /// Keep restless chunks alive (always, on sampled passes) and wake
    /// inactive chunks whose shared edge with a busy neighbour is unstable.
    /// A neighbour counts as busy when it is scheduled for the next tick or
    /// was written since the previous tick began.
    fn settle_chunks(
        &mut self,
        full_pass: bool,
        scheduled: &[bool],
        touched: &[bool],
        still_active: &[u32],
    ) {
        let mut quiesced = 0usize;
        for (chunk, &was_scheduled) in scheduled.iter().enumerate() {
            if !was_scheduled {
                continue;
            }
            if !full_pass || still_active[chunk] > 0 {
                self.chunks.wake(chunk);
            } else {
                quiesced += 1;
            }
        }

        // Probe against the set decided above so wakes do not cascade.
        let mut woken = std::mem::take(&mut self.scratch.woken);
        woken.clear();
        woken.extend((0..scheduled.len()).filter(|&chunk| {
            !self.chunks.is_active(chunk)
                && self
                    .chunks
                    .neighbors(chunk)
                    .filter(|&n| self.chunks.is_active(n) || touched[n])
                    .any(|n| self.edge_unstable(chunk, n))
        }));
        for &chunk in &woken {
            self.chunks.wake(chunk);
        }
        let woken_count = woken.len();
        self.scratch.woken = woken;
        if quiesced > 0 || woken_count > 0 {
            trace!(quiesced, woken = woken_count, "chunk set adjusted");
        }
    }

    /// Whether any cell pair straddling the edge between two adjacent chunks
    /// could interact: different weight and at least one side mobile or live.
    fn edge_unstable(&self, chunk: usize, neighbor: usize) -> bool {
        let a = self.chunks.bounds(chunk);
        let b = self.chunks.bounds(neighbor);
        // Inner cell of the run, step along the edge, offset across it.
        let (start, step, across, len) = if a.y0 == b.y1 {
            ((a.x0, a.y0), (1, 0), (0, -1), a.x1 - a.x0)
        } else if a.y1 == b.y0 {
            ((a.x0, a.y1 - 1), (1, 0), (0, 1), a.x1 - a.x0)
        } else if a.x0 == b.x1 {
            ((a.x0, a.y0), (0, 1), (-1, 0), a.y1 - a.y0)
        } else {
            ((a.x1 - 1, a.y0), (0, 1), (1, 0), a.y1 - a.y0)
        };
        (0..len).any(|i| {
            let (x, y) = (start.0 + step.0 * i, start.1 + step.1 * i);
            match (self.grid.cell(x, y), self.grid.cell(x + across.0, y + across.1)) {
                (Some(p), Some(q)) => cells_interact(p, q),
                _ => false,
            }
        })
    }

    /// Reset the outermost ring to the default cell, touching only cells
    /// that differ.
    fn erase_border(&mut self) {
        let (w, h) = (self.grid.width() as i32, self.grid.height() as i32);
        for x in 0..w {
            self.reset_cell(x, 0);
            self.reset_cell(x, h - 1);
        }
        for y in 1..h - 1 {
            self.reset_cell(0, y);
            self.reset_cell(w - 1, y);
        }
    }

    fn reset_cell(&mut self, x: i32, y: i32) {
        let idx = self.grid.index(x, y);
        if self.grid.cell_at_index(idx) != self.default_cell {
            self.write(x, y, self.default_cell);
        }
    }

    fn run_extensions(&mut self, tick: Tick) -> usize {
        if self.extensions.is_empty() {
            return 0;
        }
        let mut extensions = std::mem::take(&mut self.extensions);
        let mut ctx = SpawnContext::new(&mut self.grid, &mut self.chunks, &mut self.rng, tick);
        let mut spawned = 0;
        for extension in &mut extensions {
            let inserted = extension.after_tick(&mut ctx);
            if inserted > 0 {
                debug!(
                    extension = extension.name(),
                    inserted,
                    tick = tick.0,
                    "extension spawned cells"
                );
            }
            spawned += inserted;
        }
        self.extensions = extensions;
        spawned
    }

    fn stage_snapshot(&mut self) {
        let interval = u64::from(self.config.snapshot_interval);
        if interval == 0 || !self.tick.0.is_multiple_of(interval) {
            return;
        }
        let snapshot = self.export_snapshot();
        self.sink.on_snapshot(&snapshot);
    }
}

/// Behaviors that can change a cell without any movement.
const fn is_live_behavior(code: u32) -> bool {
    matches!(
        code,
        BEHAVIOR_GRASS
            | BEHAVIOR_TREE
            | BEHAVIOR_TREE_ROOT
            | BEHAVIOR_TREE_LEAF
            | BEHAVIOR_FISH_HEAD
            | BEHAVIOR_FISH_BODY
    )
}

fn cells_interact(a: Cell, b: Cell) -> bool {
    let mobile = |cell: Cell| !matches!(cell.type_code(), TYPE_AIR | TYPE_STATIC);
    a.weight() != b.weight()
        && (mobile(a)
            || mobile(b)
            || is_live_behavior(a.behavior_code())
            || is_live_behavior(b.behavior_code()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::Element;

    #[test]
    fn interaction_needs_a_weight_difference_and_a_mover() {
        let sand = Element::Sand.cell();
        let air = Element::Air.cell();
        let rock = Element::Rock.cell();
        assert!(cells_interact(sand, air));
        assert!(!cells_interact(sand, Element::Soil.cell()));
        assert!(!cells_interact(rock, air));
        assert!(cells_interact(Element::Grass.cell(), air));
        assert!(!cells_interact(Element::Wood.cell(), air));
    }
}
