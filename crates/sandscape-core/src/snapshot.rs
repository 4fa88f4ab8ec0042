//! Scene snapshots and the sink trait used to hand them to storage.

use serde::{Deserialize, Serialize};

use crate::codec::Cell;

/// Current snapshot layout version.
pub const FORMAT_VERSION: u16 = 1;

/// Everything besides the raw buffers needed to resume a scene.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub format_version: u16,
    pub width: u32,
    pub height: u32,
    pub seed: u64,
    /// Keystream position of the RNG at capture time.
    pub rng_word_pos: u128,
    pub tick: u64,
    pub fall_through: bool,
    pub erasing: bool,
    pub default_cell: Cell,
    /// Consecutive sampled ticks since the last full pass.
    #[serde(default)]
    pub pass_streak: u32,
    /// Scheduled chunk indices; absent means every chunk is scheduled.
    #[serde(default)]
    pub active_chunks: Option<Vec<u32>>,
    /// Chunks written during the captured tick; absent means every chunk.
    #[serde(default)]
    pub touched_chunks: Option<Vec<u32>>,
}

/// Full scene capture: metadata plus both row-major word buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub meta: SnapshotMeta,
    pub heads: Vec<u32>,
    pub tails: Vec<u32>,
}

impl Snapshot {
    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.heads.len()
    }
}

/// Receives periodic snapshots from the simulation.
pub trait SnapshotSink: Send {
    fn on_snapshot(&mut self, snapshot: &Snapshot);
}

/// No-op snapshot sink.
#[derive(Debug, Default)]
pub struct NullSink;

impl SnapshotSink for NullSink {
    fn on_snapshot(&mut self, _snapshot: &Snapshot) {}
}
