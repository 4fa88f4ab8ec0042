//! Application shell for Sandscape: configuration files, starter scenes, the
//! fixed-rate runner and the terminal frame sink.

use std::path::Path;

use anyhow::{Context, Result};
use sandscape_core::{FishSpawner, SandboxConfig, SeedSpawner, Simulation};
use serde::{Deserialize, Serialize};

pub mod runner;
pub mod scene;
pub mod terminal;

pub use runner::{Frame, FrameSink, NullFrameSink, RunReport, Runner, RunnerConfig};
pub use scene::Scene;
pub use terminal::{Palette, TerminalSession, TerminalSink};

/// Snapshot persistence settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotSettings {
    /// Directory receiving `snapshot-<tick>.sand` files; `None` disables writing.
    pub dir: Option<std::path::PathBuf>,
    /// Newest files kept in `dir`.
    pub keep: usize,
}

impl Default for SnapshotSettings {
    fn default() -> Self {
        Self { dir: None, keep: 8 }
    }
}

/// Top-level JSON configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub sandbox: SandboxConfig,
    pub runner: RunnerConfig,
    pub scene: Scene,
    pub snapshots: SnapshotSettings,
    /// Periodic fish stocking; absent disables it.
    pub fish: Option<FishSpawner>,
    /// Periodic grass and tree planting; absent disables it.
    pub seeds: Option<SeedSpawner>,
}

impl AppConfig {
    /// Parse a JSON configuration file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config {}", path.display()))
    }

    /// Register the configured spawn extensions on `sim`.
    pub fn install_extensions(&self, sim: &mut Simulation) {
        if let Some(fish) = self.fish {
            sim.add_extension(Box::new(fish));
        }
        if let Some(seeds) = self.seeds {
            sim.add_extension(Box::new(seeds));
        }
    }
}
