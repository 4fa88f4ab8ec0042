//! Starter scenes painted onto a fresh simulation.

use clap::ValueEnum;
use sandscape_core::{Element, Simulation, TEMPLATE_COUNT};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Scene {
    /// Nothing but the default element.
    Empty,
    /// Rolling soil with a pond, sand dunes, grass and a few trees.
    #[default]
    Valley,
    /// A walled tank of water with fish and a gravel bed.
    Aquarium,
    /// Sand pouring through a funnel into oil and water.
    Hourglass,
}

impl Scene {
    /// Paint the scene; returns the number of cells written.
    pub fn build(self, sim: &mut Simulation) -> usize {
        let (w, h) = (sim.grid().width() as i32, sim.grid().height() as i32);
        let written = match self {
            Scene::Empty => 0,
            Scene::Valley => valley(sim, w, h),
            Scene::Aquarium => aquarium(sim, w, h),
            Scene::Hourglass => hourglass(sim, w, h),
        };
        info!(scene = ?self, written, "scene built");
        written
    }
}

fn valley(sim: &mut Simulation, w: i32, h: i32) -> usize {
    let mut written = sim.fill_rect(0, h - 2, w, h, Element::Rock);
    let base = h - 2;
    let mut surface = Vec::with_capacity(w as usize);
    for x in 0..w {
        // Two gentle hills; the pond sits in the dip between them.
        let phase = x as f32 / w as f32 * std::f32::consts::TAU;
        let rise = ((phase.sin() + 1.0) * h as f32 / 10.0) as i32 + h / 8;
        let top = base - rise;
        written += sim.fill_rect(x, top, x + 1, base, Element::Soil);
        surface.push(top);
    }

    let (centre, half) = (w * 3 / 4, (w / 10).max(2));
    let depth = (h / 10).max(2);
    let pond = (centre - half).max(0)..(centre + half).min(w);
    for x in pond.clone() {
        let t = (x - centre) as f32 / half as f32;
        let dip = ((1.0 - t * t) * depth as f32) as i32;
        let top = surface[x as usize];
        written += sim.fill_rect(x, top, x + 1, (top + dip).min(base), Element::Water);
    }

    written += sim.paint(w / 4, h / 4, (h / 10).max(1) as u32, Element::Sand);
    written += sim.paint(w / 2, h / 6, (h / 14).max(1) as u32, Element::Gravel);

    for (i, x) in (2..w - 2).step_by(7).enumerate() {
        let y = surface[x as usize] - 1;
        if pond.contains(&x) || y <= 0 || sim.grid().cell(x, y).is_none_or(|c| !c.is_air()) {
            continue;
        }
        let cell = if i % 5 == 2 {
            Element::TreeSeed.cell_with_aux(i as u32 % TEMPLATE_COUNT as u32)
        } else {
            Element::Grass.cell_at(x, y)
        };
        if sim.set_cell(x, y, cell).is_ok() {
            written += 1;
        }
    }
    written
}

fn aquarium(sim: &mut Simulation, w: i32, h: i32) -> usize {
    let mut written = sim.fill_rect(0, 0, 1, h, Element::Wall);
    written += sim.fill_rect(w - 1, 0, w, h, Element::Wall);
    written += sim.fill_rect(0, h - 1, w, h, Element::Wall);
    written += sim.fill_rect(1, h / 4, w - 1, h - 1, Element::Water);
    written += sim.fill_rect(1, h - 1 - h / 10, w - 1, h - 1, Element::Gravel);
    for i in 0..(w / 16).max(1) {
        let x = 2 + i * 12;
        let y = h / 2 + (i % 3) * 2;
        if x + 1 >= w - 1 {
            break;
        }
        let placed = sim
            .set_cell(x, y, Element::FishHead.cell_at(x, y))
            .and_then(|()| sim.set_cell(x + 1, y, Element::FishBody.cell_at(x + 1, y)));
        if placed.is_ok() {
            written += 2;
        }
    }
    written
}

fn hourglass(sim: &mut Simulation, w: i32, h: i32) -> usize {
    let mid = h / 2;
    let neck = (w / 32).max(1);
    let mut written = 0;
    for y in h / 6..mid {
        // Funnel walls narrowing towards the neck.
        let inset = (y - h / 6) * (w / 2 - neck) / (mid - h / 6).max(1);
        written += sim.fill_rect(inset, y, inset + 1, y + 1, Element::Wall);
        written += sim.fill_rect(w - 1 - inset, y, w - inset, y + 1, Element::Wall);
    }
    written += sim.fill_rect(w / 4, 1, w * 3 / 4, h / 6, Element::Sand);
    written += sim.fill_rect(0, h - h / 6, w, h - h / 12, Element::Water);
    written += sim.fill_rect(0, h - h / 12, w, h, Element::Oil);
    written
}
