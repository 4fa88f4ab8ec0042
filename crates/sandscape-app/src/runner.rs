//! Serial fixed-rate driver: one simulation timer and one render timer fired
//! in deadline order on the calling thread.

use std::time::{Duration, Instant};

use sandscape_core::{ChunkCoord, Grid, Simulation, SimulationError, Tick};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

const DEFAULT_SIM_HZ: f64 = 60.0;
const DEFAULT_RENDER_HZ: f64 = 20.0;

/// Timer rates for [`Runner`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Simulation ticks per second.
    pub sim_hz: f64,
    /// Frames per second; zero disables rendering.
    pub render_hz: f64,
    /// Sleep until each deadline. When false the timers run on a virtual
    /// clock as fast as the host allows, preserving their interleaving.
    pub real_time: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            sim_hz: DEFAULT_SIM_HZ,
            render_hz: DEFAULT_RENDER_HZ,
            real_time: true,
        }
    }
}

/// Read-only view handed to a [`FrameSink`].
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub tick: Tick,
    pub grid: &'a Grid,
    /// Chunks written since the previous frame.
    pub changed: &'a [ChunkCoord],
    pub chunk_size: u32,
}

/// Render target fed by the render timer.
pub trait FrameSink {
    fn present(&mut self, frame: &Frame<'_>) -> anyhow::Result<()>;

    /// Checked after every presented frame; `true` ends the run.
    fn exit_requested(&self) -> bool {
        false
    }
}

/// Discards frames.
#[derive(Debug, Default)]
pub struct NullFrameSink;

impl FrameSink for NullFrameSink {
    fn present(&mut self, _frame: &Frame<'_>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Outcome of a [`Runner::run`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub ticks: u64,
    pub frames: u64,
    pub final_tick: Tick,
    pub moves: u64,
    pub spawned: u64,
    pub full_passes: u64,
    /// Set when the render timer stopped because the sink failed.
    pub render_error: Option<String>,
    /// The sink asked to stop before every tick ran.
    pub exit_requested: bool,
}

/// Drives a simulation and a frame sink at independent fixed rates. Ticks and
/// renders never interleave; a render failure stops only the render timer.
#[derive(Debug, Clone)]
pub struct Runner {
    config: RunnerConfig,
    changed: Vec<ChunkCoord>,
}

impl Runner {
    pub fn new(config: RunnerConfig) -> Result<Self, SimulationError> {
        if !(config.sim_hz.is_finite() && config.sim_hz > 0.0) {
            return Err(SimulationError::InvalidConfig("sim_hz must be positive"));
        }
        if !(config.render_hz.is_finite() && config.render_hz >= 0.0) {
            return Err(SimulationError::InvalidConfig(
                "render_hz must be zero or positive",
            ));
        }
        Ok(Self {
            config,
            changed: Vec::new(),
        })
    }

    #[must_use]
    pub const fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run `ticks` simulation ticks, rendering in between at `render_hz`. A
    /// last frame is presented after the final tick while rendering is alive.
    pub fn run(
        &mut self,
        sim: &mut Simulation,
        sink: &mut dyn FrameSink,
        ticks: u64,
    ) -> Result<RunReport, SimulationError> {
        let mut rendering = self.config.render_hz > 0.0;
        let mut renders_due = 0u64;
        let mut report = RunReport {
            final_tick: sim.tick_count(),
            ..RunReport::default()
        };
        let started = Instant::now();
        info!(
            ticks,
            sim_hz = self.config.sim_hz,
            render_hz = self.config.render_hz,
            "run started"
        );

        while report.ticks < ticks {
            // Render deadline j / render_hz against tick deadline k / sim_hz,
            // cross-multiplied so equal deadlines compare exactly.
            let render_first = rendering
                && renders_due as f64 * self.config.sim_hz
                    <= report.ticks as f64 * self.config.render_hz;
            if render_first {
                if self.config.real_time {
                    wait_until(started, renders_due as f64 / self.config.render_hz);
                }
                renders_due += 1;
                rendering = self.render(sim, sink, &mut report);
                if sink.exit_requested() {
                    info!(tick = sim.tick_count().0, "exit requested by frame sink");
                    report.exit_requested = true;
                    break;
                }
                continue;
            }
            if self.config.real_time {
                wait_until(started, report.ticks as f64 / self.config.sim_hz);
            }
            let events = sim.tick()?;
            report.ticks += 1;
            report.final_tick = events.tick;
            report.moves += events.moves as u64;
            report.spawned += events.spawned as u64;
            report.full_passes += u64::from(events.full_pass);
        }
        if rendering && !report.exit_requested {
            self.render(sim, sink, &mut report);
        }

        info!(
            ticks = report.ticks,
            frames = report.frames,
            final_tick = report.final_tick.0,
            moves = report.moves,
            "run finished"
        );
        Ok(report)
    }

    /// Present one frame; returns whether rendering should continue.
    fn render(
        &mut self,
        sim: &mut Simulation,
        sink: &mut dyn FrameSink,
        report: &mut RunReport,
    ) -> bool {
        self.changed = sim.take_changed_chunks();
        let frame = Frame {
            tick: sim.tick_count(),
            grid: sim.grid(),
            changed: &self.changed,
            chunk_size: sim.chunks().chunk_size(),
        };
        match sink.present(&frame) {
            Ok(()) => {
                report.frames += 1;
                debug!(tick = frame.tick.0, changed = self.changed.len(), "frame presented");
                true
            }
            Err(err) => {
                let message = format!("{err:#}");
                error!(tick = frame.tick.0, error = %message, "render failed; render timer stopped");
                report.render_error = Some(message);
                false
            }
        }
    }
}

fn wait_until(started: Instant, offset_secs: f64) {
    let deadline = started + Duration::from_secs_f64(offset_secs);
    let now = Instant::now();
    if deadline > now {
        std::thread::sleep(deadline - now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sandscape_core::{Element, SandboxConfig};

    fn virtual_runner(sim_hz: f64, render_hz: f64) -> Runner {
        Runner::new(RunnerConfig {
            sim_hz,
            render_hz,
            real_time: false,
        })
        .expect("runner")
    }

    fn small_sim() -> Simulation {
        let mut sim = Simulation::new(SandboxConfig {
            width: 16,
            height: 16,
            chunk_size: 8,
            rng_seed: Some(1),
            ..SandboxConfig::default()
        })
        .expect("sim");
        sim.paint(8, 3, 2, Element::Sand);
        sim
    }

    #[derive(Default)]
    struct Recorder {
        ticks: Vec<u64>,
    }

    impl FrameSink for Recorder {
        fn present(&mut self, frame: &Frame<'_>) -> anyhow::Result<()> {
            self.ticks.push(frame.tick.0);
            Ok(())
        }
    }

    #[test]
    fn renders_interleave_at_the_configured_ratio() {
        let mut sim = small_sim();
        let mut sink = Recorder::default();
        let report = virtual_runner(60.0, 20.0)
            .run(&mut sim, &mut sink, 12)
            .expect("run");
        assert_eq!(report.ticks, 12);
        assert_eq!(sink.ticks, vec![0, 3, 6, 9, 12]);
        assert_eq!(report.frames, 5);
        assert_eq!(report.final_tick, Tick(12));
    }

    struct QuitAfter {
        frames: usize,
    }

    impl FrameSink for QuitAfter {
        fn present(&mut self, _frame: &Frame<'_>) -> anyhow::Result<()> {
            self.frames = self.frames.saturating_sub(1);
            Ok(())
        }

        fn exit_requested(&self) -> bool {
            self.frames == 0
        }
    }

    #[test]
    fn sinks_can_end_the_run_early() {
        let mut sim = small_sim();
        let report = virtual_runner(60.0, 20.0)
            .run(&mut sim, &mut QuitAfter { frames: 2 }, 100)
            .expect("run");
        assert!(report.exit_requested);
        assert_eq!(report.frames, 2);
        assert_eq!(report.ticks, 3);
        assert_eq!(sim.tick_count(), Tick(3));
    }

    #[test]
    fn zero_render_rate_never_presents() {
        let mut sim = small_sim();
        let mut sink = Recorder::default();
        let report = virtual_runner(60.0, 0.0)
            .run(&mut sim, &mut sink, 5)
            .expect("run");
        assert!(sink.ticks.is_empty());
        assert_eq!(report.frames, 0);
    }

    #[test]
    fn invalid_rates_are_rejected() {
        assert!(
            Runner::new(RunnerConfig {
                sim_hz: 0.0,
                ..RunnerConfig::default()
            })
            .is_err()
        );
        assert!(
            Runner::new(RunnerConfig {
                render_hz: -1.0,
                ..RunnerConfig::default()
            })
            .is_err()
        );
    }
}
