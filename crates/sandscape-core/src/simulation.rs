//! Simulation facade: owns the grid, the chunk map, the random stream and the
//! registered extensions, and exposes the editing and query surface used by
//! hosts. The per-tick algorithm lives in the scheduler module.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::chunks::{ChunkCoord, ChunkMap};
use crate::codec::Cell;
use crate::elements::Element;
use crate::grid::Grid;
use crate::random::RandomSource;
use crate::snapshot::{FORMAT_VERSION, NullSink, Snapshot, SnapshotMeta, SnapshotSink};
use crate::spawn::SpawnExtension;
use crate::templates::TemplateRegistry;
use crate::{SandboxConfig, SimulationError, Tick};

/// Buffers reused across ticks.
#[derive(Debug, Default)]
pub(crate) struct TickScratch {
    pub(crate) scheduled: Vec<bool>,
    pub(crate) touched: Vec<bool>,
    pub(crate) still_active: Vec<u32>,
    pub(crate) chunk_order: Vec<u32>,
    pub(crate) columns: Vec<i32>,
    pub(crate) woken: Vec<usize>,
    pub(crate) template_stack: Vec<u32>,
    pub(crate) moves: usize,
}

/// A running falling-sand scene.
pub struct Simulation {
    pub(crate) config: SandboxConfig,
    pub(crate) grid: Grid,
    pub(crate) chunks: ChunkMap,
    pub(crate) rng: RandomSource,
    pub(crate) templates: Arc<TemplateRegistry>,
    pub(crate) default_cell: Cell,
    pub(crate) tick: Tick,
    pub(crate) halted: bool,
    /// Per-cell tick stamp marking cells already moved this tick.
    pub(crate) stamps: Vec<u32>,
    pub(crate) stamp: u32,
    /// Consecutive sampled (non-full) passes.
    pub(crate) pass_streak: u32,
    pub(crate) scratch: TickScratch,
    pub(crate) extensions: Vec<Box<dyn SpawnExtension>>,
    pub(crate) sink: Box<dyn SnapshotSink>,
}

impl fmt::Debug for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("config", &self.config)
            .field("tick", &self.tick)
            .field("halted", &self.halted)
            .field("active_chunks", &self.chunks.active_count())
            .field("extensions", &self.extensions.len())
            .finish()
    }
}

impl Simulation {
    /// Build a scene filled with the configured default element.
    pub fn new(config: SandboxConfig) -> Result<Self, SimulationError> {
        Self::with_templates(config, Arc::new(TemplateRegistry::new()))
    }

    /// Build a scene that shares an existing template registry.
    pub fn with_templates(
        config: SandboxConfig,
        templates: Arc<TemplateRegistry>,
    ) -> Result<Self, SimulationError> {
        config.validate()?;
        let default_cell = config.default_element.cell();
        let grid = Grid::new(config.width, config.height, default_cell)?;
        let rng = config.seeded_rng();
        info!(
            width = config.width,
            height = config.height,
            chunk_size = config.chunk_size,
            seed = rng.seed(),
            "simulation created"
        );
        Ok(Self::assemble(config, grid, rng, templates, default_cell))
    }

    fn assemble(
        config: SandboxConfig,
        grid: Grid,
        rng: RandomSource,
        templates: Arc<TemplateRegistry>,
        default_cell: Cell,
    ) -> Self {
        let chunks = ChunkMap::new(config.width, config.height, config.chunk_size);
        let cells = grid.len();
        Self {
            chunks,
            grid,
            rng,
            templates,
            default_cell,
            tick: Tick::zero(),
            halted: false,
            stamps: vec![0; cells],
            stamp: 0,
            pass_streak: 0,
            scratch: TickScratch::default(),
            extensions: Vec::new(),
            sink: Box::new(NullSink),
            config,
        }
    }

    /// Resume a scene from a snapshot. Grid dimensions, boundary flags and the
    /// random stream come from the snapshot; everything else from `config`.
    pub fn from_snapshot(
        config: SandboxConfig,
        snapshot: &Snapshot,
    ) -> Result<Self, SimulationError> {
        Self::from_snapshot_with_templates(config, snapshot, Arc::new(TemplateRegistry::new()))
    }

    pub fn from_snapshot_with_templates(
        mut config: SandboxConfig,
        snapshot: &Snapshot,
        templates: Arc<TemplateRegistry>,
    ) -> Result<Self, SimulationError> {
        let meta = &snapshot.meta;
        if meta.format_version != FORMAT_VERSION {
            return Err(SimulationError::Snapshot("unsupported format version"));
        }
        if meta.default_cell.validate().is_err() {
            return Err(SimulationError::Snapshot("default cell is corrupt"));
        }
        config.width = meta.width;
        config.height = meta.height;
        config.rng_seed = Some(meta.seed);
        config.boundary.fall_through = meta.fall_through;
        config.boundary.erasing = meta.erasing;
        config.validate()?;

        let grid = Grid::from_buffers(
            snapshot.heads.clone(),
            snapshot.tails.clone(),
            meta.width,
            meta.height,
        )?;
        let rng = RandomSource::restore(meta.seed, meta.rng_word_pos);
        let mut sim = Self::assemble(config, grid, rng, templates, meta.default_cell);
        sim.tick = Tick(meta.tick);
        sim.pass_streak = meta.pass_streak;
        match &meta.active_chunks {
            Some(indices) => sim.chunks.restore_active(indices),
            None => sim.chunks.activate_all(),
        }
        if let Some(indices) = &meta.touched_chunks {
            sim.chunks.restore_touched(indices);
        }
        info!(
            tick = meta.tick,
            width = meta.width,
            height = meta.height,
            "simulation restored from snapshot"
        );
        Ok(sim)
    }

    /// Capture the full scene state.
    #[must_use]
    pub fn export_snapshot(&self) -> Snapshot {
        let (heads, tails) = self.grid.export_buffers();
        Snapshot {
            meta: SnapshotMeta {
                format_version: FORMAT_VERSION,
                width: self.grid.width(),
                height: self.grid.height(),
                seed: self.rng.seed(),
                rng_word_pos: self.rng.word_pos(),
                tick: self.tick.0,
                fall_through: self.config.boundary.fall_through,
                erasing: self.config.boundary.erasing,
                default_cell: self.default_cell,
                pass_streak: self.pass_streak,
                active_chunks: Some(self.chunks.active_indices()),
                touched_chunks: Some(self.chunks.touched_indices()),
            },
            heads: heads.to_vec(),
            tails: tails.to_vec(),
        }
    }

    /// Replace the snapshot sink.
    pub fn set_sink(&mut self, sink: Box<dyn SnapshotSink>) {
        self.sink = sink;
    }

    /// Register an extension that runs after every tick, in registration order.
    pub fn add_extension(&mut self, extension: Box<dyn SpawnExtension>) {
        debug!(extension = extension.name(), "spawn extension registered");
        self.extensions.push(extension);
    }

    #[must_use]
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    #[must_use]
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    #[must_use]
    pub fn chunks(&self) -> &ChunkMap {
        &self.chunks
    }

    /// Ticks processed so far.
    #[must_use]
    pub const fn tick_count(&self) -> Tick {
        self.tick
    }

    /// Whether a fatal dispatch error stopped the simulation.
    #[must_use]
    pub const fn is_halted(&self) -> bool {
        self.halted
    }

    #[must_use]
    pub const fn default_cell(&self) -> Cell {
        self.default_cell
    }

    #[must_use]
    pub fn seed(&self) -> u64 {
        self.rng.seed()
    }

    #[must_use]
    pub fn templates(&self) -> &Arc<TemplateRegistry> {
        &self.templates
    }

    /// Schedule the chunk containing `(x, y)` for the next tick.
    pub fn mark_touched(&mut self, x: i32, y: i32) -> Result<(), SimulationError> {
        self.grid.get_head(x, y)?;
        self.chunks.touch(x, y);
        Ok(())
    }

    /// Overwrite one cell and wake its chunk. The cell is stored as given.
    pub fn set_cell(&mut self, x: i32, y: i32, cell: Cell) -> Result<(), SimulationError> {
        self.grid.set_cell(x, y, cell)?;
        self.chunks.touch(x, y);
        Ok(())
    }

    /// Paint a filled disc of `element`, clipped to the grid. Returns the
    /// number of cells written.
    pub fn paint(&mut self, x: i32, y: i32, radius: u32, element: Element) -> usize {
        let (w, h) = (i64::from(self.grid.width()), i64::from(self.grid.height()));
        let (cx, cy) = (i64::from(x), i64::from(y));
        let r = i64::from(radius).min(w + h);
        let r2 = i128::from(r) * i128::from(r);
        let mut painted = 0;
        for py in (cy - r).max(0)..=(cy + r).min(h - 1) {
            for px in (cx - r).max(0)..=(cx + r).min(w - 1) {
                let (dx, dy) = (i128::from(px - cx), i128::from(py - cy));
                if dx * dx + dy * dy > r2 {
                    continue;
                }
                let (px, py) = (px as i32, py as i32);
                self.write(px, py, element.cell_at(px, py));
                painted += 1;
            }
        }
        painted
    }

    /// Fill the half-open rectangle `[x0, x1) x [y0, y1)`, clipped to the grid.
    pub fn fill_rect(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, element: Element) -> usize {
        let (w, h) = (self.grid.width() as i32, self.grid.height() as i32);
        let (x0, x1) = (x0.clamp(0, w), x1.clamp(0, w));
        let (y0, y1) = (y0.clamp(0, h), y1.clamp(0, h));
        let mut filled = 0;
        for y in y0..y1 {
            for x in x0..x1 {
                self.write(x, y, element.cell_at(x, y));
                filled += 1;
            }
        }
        filled
    }

    /// Chunks written since the last drain.
    #[must_use]
    pub fn changed_chunks(&self) -> Vec<ChunkCoord> {
        self.chunks.changed_chunks()
    }

    /// Drain the changed set (renderers call this once per frame).
    pub fn take_changed_chunks(&mut self) -> Vec<ChunkCoord> {
        self.chunks.take_changed()
    }

    /// Chunks scheduled for the next tick.
    #[must_use]
    pub fn active_chunks(&self) -> Vec<ChunkCoord> {
        self.chunks.active_chunks()
    }

    #[must_use]
    pub fn is_chunk_active(&self, cx: u32, cy: u32) -> bool {
        cx < self.chunks.cols()
            && cy < self.chunks.rows()
            && self.chunks.is_active(self.chunks.index(cx, cy))
    }

    /// In-bounds write that wakes the owning chunk.
    #[inline]
    pub(crate) fn write(&mut self, x: i32, y: i32, cell: Cell) {
        let idx = self.grid.index(x, y);
        self.grid.put(idx, cell);
        self.chunks.touch(x, y);
    }

    /// In-bounds head rewrite (tail untouched) that wakes the owning chunk.
    #[inline]
    pub(crate) fn write_head(&mut self, x: i32, y: i32, head: u32) {
        let idx = self.grid.index(x, y);
        let cell = self.grid.cell_at_index(idx);
        self.grid.put(idx, Cell::new(head, cell.tail));
        self.chunks.touch(x, y);
    }

    #[inline]
    pub(crate) fn is_stamped(&self, idx: usize) -> bool {
        self.stamps[idx] == self.stamp
    }

    #[inline]
    pub(crate) fn stamp_index(&mut self, idx: usize) {
        self.stamps[idx] = self.stamp;
    }

    /// Advance the move stamp, clearing the buffer when the counter wraps.
    pub(crate) fn advance_stamp(&mut self) {
        self.stamp = self.stamp.wrapping_add(1);
        if self.stamp == 0 {
            self.stamps.fill(0);
            self.stamp = 1;
        }
    }
}
