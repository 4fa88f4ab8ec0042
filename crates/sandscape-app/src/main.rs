use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use sandscape_app::{AppConfig, NullFrameSink, Palette, Runner, Scene, TerminalSink};
use sandscape_core::{Element, Simulation};
use sandscape_storage::{SnapshotLoader, SnapshotPipeline, load_snapshot};
use tracing::{info, warn};

const DEFAULT_HEADLESS_TICKS: u64 = 600;

#[derive(Parser, Debug)]
#[command(
    name = "sandscape",
    version,
    about = "Falling-sand cellular automaton sandbox"
)]
struct Cli {
    /// JSON configuration file; flags below override its values.
    #[arg(long, env = "SANDSCAPE_CONFIG")]
    config: Option<PathBuf>,

    /// Starter scene painted onto a fresh grid.
    #[arg(long, value_enum)]
    scene: Option<Scene>,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    #[arg(long)]
    chunk_size: Option<u32>,

    /// Seed for reproducible runs (entropy when absent).
    #[arg(long, env = "SANDSCAPE_SEED")]
    seed: Option<u64>,

    /// Element used for fresh cells and the erased border.
    #[arg(long, value_parser = parse_element)]
    default_element: Option<Element>,

    /// Cells falling off the bottom re-enter at the top.
    #[arg(long)]
    fall_through: bool,

    /// Reset the outermost ring to the default element every tick.
    #[arg(long)]
    erasing: bool,

    /// Simulation ticks to run; unbounded when rendering to the terminal.
    #[arg(long)]
    ticks: Option<u64>,

    #[arg(long)]
    sim_hz: Option<f64>,

    #[arg(long)]
    render_hz: Option<f64>,

    /// Run without a terminal, as fast as possible, and log a summary.
    #[arg(long)]
    headless: bool,

    /// Plain glyphs even when the terminal supports true colour.
    #[arg(long)]
    no_color: bool,

    /// Directory receiving periodic snapshots.
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,

    /// Ticks between snapshots.
    #[arg(long)]
    snapshot_interval: Option<u32>,

    /// Resume from a snapshot file instead of building a scene.
    #[arg(long, conflicts_with = "scene")]
    resume: Option<PathBuf>,

    /// Resume from the newest snapshot in `--snapshot-dir`.
    #[arg(long, conflicts_with_all = ["scene", "resume"])]
    resume_latest: bool,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    let mut sim = bootstrap_simulation(&cli, &config)?;
    config.install_extensions(&mut sim);
    if let Some(dir) = &config.snapshots.dir {
        let pipeline = SnapshotPipeline::new(dir, config.snapshots.keep)
            .with_context(|| format!("failed to open snapshot directory {}", dir.display()))?;
        sim.set_sink(Box::new(pipeline));
    }

    let mut runner_config = config.runner;
    if cli.headless {
        runner_config.real_time = false;
        runner_config.render_hz = 0.0;
    }
    let mut runner = Runner::new(runner_config).context("invalid runner configuration")?;
    let ticks = cli.ticks.unwrap_or(if cli.headless {
        DEFAULT_HEADLESS_TICKS
    } else {
        u64::MAX
    });

    info!(
        width = sim.grid().width(),
        height = sim.grid().height(),
        seed = sim.seed(),
        headless = cli.headless,
        "starting Sandscape"
    );
    let report = if cli.headless {
        runner.run(&mut sim, &mut NullFrameSink, ticks)
    } else {
        let palette = if cli.no_color {
            Palette::Plain
        } else {
            Palette::detect()
        };
        let mut sink = TerminalSink::interactive(palette)?;
        let report = runner.run(&mut sim, &mut sink, ticks);
        // Restore the terminal before anything else is logged.
        drop(sink);
        report
    }
    .context("simulation aborted")?;

    if let Some(err) = &report.render_error {
        warn!(error = %err, "rendering stopped early");
    }
    info!(
        ticks = report.ticks,
        frames = report.frames,
        final_tick = report.final_tick.0,
        moves = report.moves,
        spawned = report.spawned,
        full_passes = report.full_passes,
        exit_requested = report.exit_requested,
        active_chunks = sim.active_chunks().len(),
        "run summary"
    );
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

fn parse_element(raw: &str) -> Result<Element, String> {
    Element::from_name(raw).ok_or_else(|| format!("unknown element `{raw}`"))
}

fn resolve_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    let sandbox = &mut config.sandbox;
    if let Some(width) = cli.width {
        sandbox.width = width;
    }
    if let Some(height) = cli.height {
        sandbox.height = height;
    }
    if let Some(chunk_size) = cli.chunk_size {
        sandbox.chunk_size = chunk_size;
    }
    if cli.seed.is_some() {
        sandbox.rng_seed = cli.seed;
    }
    if let Some(element) = cli.default_element {
        sandbox.default_element = element;
    }
    sandbox.boundary.fall_through |= cli.fall_through;
    sandbox.boundary.erasing |= cli.erasing;
    if let Some(interval) = cli.snapshot_interval {
        sandbox.snapshot_interval = interval;
    }
    if let Some(hz) = cli.sim_hz {
        config.runner.sim_hz = hz;
    }
    if let Some(hz) = cli.render_hz {
        config.runner.render_hz = hz;
    }
    if let Some(scene) = cli.scene {
        config.scene = scene;
    }
    if cli.snapshot_dir.is_some() {
        config.snapshots.dir.clone_from(&cli.snapshot_dir);
    }
    if config.snapshots.dir.is_some() && config.sandbox.snapshot_interval == 0 {
        warn!("snapshot directory set but snapshot_interval is 0; no snapshots will be written");
    }
    Ok(config)
}

fn bootstrap_simulation(cli: &Cli, config: &AppConfig) -> Result<Simulation> {
    let snapshot = if let Some(path) = &cli.resume {
        Some(
            load_snapshot(path)
                .with_context(|| format!("failed to load snapshot {}", path.display()))?,
        )
    } else if cli.resume_latest {
        let dir = config
            .snapshots
            .dir
            .as_ref()
            .context("--resume-latest needs a snapshot directory")?;
        let store = sandscape_storage::SnapshotStore::open(dir)?;
        let latest = store
            .load_latest(&SnapshotLoader::new())?
            .with_context(|| format!("no snapshots in {}", dir.display()))?;
        Some(latest)
    } else {
        None
    };

    match snapshot {
        Some(snapshot) => {
            info!(tick = snapshot.meta.tick, "resuming from snapshot");
            Simulation::from_snapshot(config.sandbox.clone(), &snapshot)
                .context("snapshot does not fit the configuration")
        }
        None => {
            let mut sim =
                Simulation::new(config.sandbox.clone()).context("invalid sandbox configuration")?;
            config.scene.build(&mut sim);
            Ok(sim)
        }
    }
}
