//! Core types shared across the Sandscape workspace.
//!
//! The simulation is a grid of bit-packed cells evolved at a fixed tick rate.
//! Per-tick cost is bounded by a chunk scheduler that only scans regions that
//! were touched recently; movement follows a coarse weight ordering and
//! non-moving cells run small per-behavior state machines.

pub mod behavior;
pub mod chunks;
pub mod codec;
pub mod elements;
pub mod grid;
mod movement;
pub mod random;
mod scheduler;
pub mod simulation;
pub mod snapshot;
pub mod spawn;
pub mod templates;

pub use behavior::BehaviorState;
pub use chunks::{ChunkCoord, ChunkMap};
pub use codec::{Behavior, Cell, CodecError, TypeClass};
pub use elements::Element;
pub use grid::{Grid, GridError};
pub use random::RandomSource;
pub use simulation::Simulation;
pub use snapshot::{FORMAT_VERSION, NullSink, Snapshot, SnapshotMeta, SnapshotSink};
pub use spawn::{FishSpawner, SeedSpawner, SpawnContext, SpawnExtension};
pub use templates::{NodeKind, TEMPLATE_COUNT, TemplateNode, TemplateRegistry, TreeTemplate};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Simulation clock (ticks processed since the scene was created).
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub struct Tick(pub u64);

impl Tick {
    /// Returns the next sequential tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }
}

/// Events emitted after processing a simulation tick.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TickEvents {
    pub tick: Tick,
    /// Whether this tick visited every column of every active chunk.
    pub full_pass: bool,
    /// Chunks scanned during this tick.
    pub active_chunks: usize,
    pub cells_processed: usize,
    pub moves: usize,
    /// Cells inserted by spawn extensions after the pass.
    pub spawned: usize,
}

/// Errors that can occur when constructing or advancing a simulation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SimulationError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error("unknown type class {code} at ({x}, {y})")]
    UnknownTypeClass { x: i32, y: i32, code: u32 },
    #[error("unknown behavior code {code} at ({x}, {y})")]
    UnknownBehavior { x: i32, y: i32, code: u32 },
    #[error("simulation halted after a fatal dispatch error")]
    Halted,
    #[error("snapshot rejected: {0}")]
    Snapshot(&'static str),
}

/// Edge handling policies applied to movement and after each tick.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct BoundaryMode {
    /// Cells falling past the bottom row re-enter at row 0 of the same column.
    pub fall_through: bool,
    /// The outermost ring is reset to the default element after every tick.
    pub erasing: bool,
}

/// Probabilities and limits for the per-behavior state machines.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BehaviorTuning {
    /// Chance per tick that a grass cell runs its growth step.
    pub grass_chance: f32,
    /// Chance that a flooded grass cell dies when its growth step runs.
    pub grass_flood_death: f32,
    /// Largest grow-stage assigned to freshly spread grass.
    pub grass_max_stage: u32,
    /// Chance per tick that a tree marker runs a template growth pass.
    pub tree_growth_chance: f32,
    /// Health-stage drop (0..=15 units) in one evaluation that kills a tree.
    pub tree_death_drop: u32,
    /// Remaining-growth counter given to freshly painted roots.
    pub root_growth: u32,
    /// Chance per tick that a growing root extends.
    pub root_growth_chance: f32,
    /// Chance that a blocked root tries a diagonal step instead.
    pub root_diagonal_chance: f32,
    /// Chance per tick that an exhausted root hardens its neighbourhood.
    pub root_harden_chance: f32,
    /// Chance per tick that a leaf's vitality counter advances.
    pub leaf_age_chance: f32,
    /// Chance per tick that a leaf checks whether it is orphaned or buried.
    pub leaf_check_chance: f32,
    /// Chance per tick that a fish samples its surroundings for water.
    pub fish_sense_chance: f32,
    /// Water cells a fish needs around it to stay wet.
    pub fish_min_water: u32,
    /// Dryness count at which a fish dies.
    pub fish_dry_limit: u32,
    /// Chance per tick that a fish tries to swim.
    pub fish_swim_chance: f32,
    /// Chance per tick that wet powder attempts a diagonal slide.
    pub wet_slide_chance: f32,
    /// Chance per tick that a floating powder rises through a denser fluid.
    pub float_rise_chance: f32,
}

impl Default for BehaviorTuning {
    fn default() -> Self {
        Self {
            grass_chance: 0.02,
            grass_flood_death: 0.1,
            grass_max_stage: 4,
            tree_growth_chance: 0.004,
            tree_death_drop: 5,
            root_growth: 6,
            root_growth_chance: 0.05,
            root_diagonal_chance: 0.2,
            root_harden_chance: 0.001,
            leaf_age_chance: 0.002,
            leaf_check_chance: 0.02,
            fish_sense_chance: 0.05,
            fish_min_water: 3,
            fish_dry_limit: 8,
            fish_swim_chance: 0.1,
            wet_slide_chance: 0.25,
            float_rise_chance: 0.5,
        }
    }
}

impl BehaviorTuning {
    fn validate(&self) -> Result<(), SimulationError> {
        let chances = [
            self.grass_chance,
            self.grass_flood_death,
            self.tree_growth_chance,
            self.root_growth_chance,
            self.root_diagonal_chance,
            self.root_harden_chance,
            self.leaf_age_chance,
            self.leaf_check_chance,
            self.fish_sense_chance,
            self.fish_swim_chance,
            self.wet_slide_chance,
            self.float_rise_chance,
        ];
        if chances.iter().any(|p| !(0.0..=1.0).contains(p)) {
            return Err(SimulationError::InvalidConfig(
                "behavior chances must lie in [0, 1]",
            ));
        }
        if self.grass_max_stage > codec::NIBBLE_MAX || self.root_growth > codec::NIBBLE_MAX {
            return Err(SimulationError::InvalidConfig(
                "grass_max_stage and root_growth must fit a nibble",
            ));
        }
        if self.tree_death_drop == 0 || self.tree_death_drop > codec::NIBBLE_MAX {
            return Err(SimulationError::InvalidConfig(
                "tree_death_drop must lie in 1..=15",
            ));
        }
        if self.fish_dry_limit == 0 || self.fish_dry_limit > codec::NIBBLE_MAX {
            return Err(SimulationError::InvalidConfig(
                "fish_dry_limit must lie in 1..=15",
            ));
        }
        if self.fish_min_water > 16 {
            return Err(SimulationError::InvalidConfig(
                "fish_min_water cannot exceed the sampled neighbourhood",
            ));
        }
        Ok(())
    }
}

/// Static configuration for a Sandscape scene.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SandboxConfig {
    /// Grid width in cells.
    pub width: u32,
    /// Grid height in cells.
    pub height: u32,
    /// Edge length of a scheduler chunk in cells.
    pub chunk_size: u32,
    /// Optional RNG seed for reproducible runs.
    pub rng_seed: Option<u64>,
    pub boundary: BoundaryMode,
    /// Element filling fresh scenes, erased borders and orphaned leaves.
    pub default_element: Element,
    /// Probability that a tick is a full sequential pass.
    pub sequential_pass_chance: f32,
    /// Upper bound on consecutive ticks without a full pass.
    pub max_ticks_between_full_pass: u32,
    /// Interval (ticks) between snapshot sink calls. 0 disables snapshots.
    pub snapshot_interval: u32,
    pub behavior: BehaviorTuning,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            width: 256,
            height: 192,
            chunk_size: 16,
            rng_seed: None,
            boundary: BoundaryMode::default(),
            default_element: Element::Air,
            sequential_pass_chance: 0.5,
            max_ticks_between_full_pass: 4,
            snapshot_interval: 0,
            behavior: BehaviorTuning::default(),
        }
    }
}

impl SandboxConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), SimulationError> {
        if self.width == 0 || self.height == 0 {
            return Err(SimulationError::InvalidConfig(
                "grid dimensions must be non-zero",
            ));
        }
        if self.chunk_size < 4 {
            return Err(SimulationError::InvalidConfig(
                "chunk_size must be at least 4",
            ));
        }
        if !(0.0..=1.0).contains(&self.sequential_pass_chance) {
            return Err(SimulationError::InvalidConfig(
                "sequential_pass_chance must lie in [0, 1]",
            ));
        }
        if self.max_ticks_between_full_pass == 0 {
            return Err(SimulationError::InvalidConfig(
                "max_ticks_between_full_pass must be positive",
            ));
        }
        self.behavior.validate()
    }

    /// Returns the configured RNG, generating a seed from entropy if absent.
    fn seeded_rng(&self) -> RandomSource {
        match self.rng_seed {
            Some(seed) => RandomSource::new(seed),
            None => RandomSource::from_entropy(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert_eq!(SandboxConfig::default().validate(), Ok(()));
    }

    #[test]
    fn invalid_configs_are_rejected() {
        let zero = SandboxConfig {
            width: 0,
            ..SandboxConfig::default()
        };
        assert!(matches!(
            zero.validate(),
            Err(SimulationError::InvalidConfig(_))
        ));

        let tiny_chunks = SandboxConfig {
            chunk_size: 2,
            ..SandboxConfig::default()
        };
        assert!(tiny_chunks.validate().is_err());

        let mut bad_tuning = SandboxConfig::default();
        bad_tuning.behavior.grass_chance = 1.5;
        assert!(bad_tuning.validate().is_err());

        let mut bad_drop = SandboxConfig::default();
        bad_drop.behavior.tree_death_drop = 0;
        assert!(bad_drop.validate().is_err());
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = SandboxConfig {
            rng_seed: Some(7),
            boundary: BoundaryMode {
                fall_through: true,
                erasing: false,
            },
            default_element: Element::Water,
            ..SandboxConfig::default()
        };
        let json = serde_json::to_string(&config).expect("serialize");
        let back: SandboxConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, config);

        let partial: SandboxConfig =
            serde_json::from_str(r#"{"width": 64, "height": 32}"#).expect("partial");
        assert_eq!(partial.width, 64);
        assert_eq!(partial.chunk_size, SandboxConfig::default().chunk_size);
    }

    #[test]
    fn tick_advances() {
        assert_eq!(Tick::zero().next().next(), Tick(2));
    }
}
