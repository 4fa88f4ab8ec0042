use std::sync::Arc;

use tracing::debug;

use crate::codec::{
    BEHAVIOR_GRASS, BEHAVIOR_SOIL, BEHAVIOR_TREE_LEAF, BEHAVIOR_TREE_TRUNK, NIBBLE_MAX, head,
};
use crate::elements::Element;
use crate::simulation::Simulation;
use crate::templates::{NodeKind, TemplateNode};

/// What a template cell currently holds relative to its node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Site {
    Grown,
    Growable,
    Blocked,
}

/// Result of one template walk.
#[derive(Debug, Clone, Copy)]
struct Survey {
    /// Health the walk implies, in sixteenths.
    stage: u32,
    /// Growable cells found (painted when growing).
    open: usize,
}

impl Simulation {
    /// Growth pass for a tree anchor. Walks the template from the base,
    /// painting missing cells, only descending past nodes that were already
    /// fully grown. The stage nibble tracks health in sixteenths; a sharp drop
    /// kills the tree and leaves wood behind. Returns whether the tree changed
    /// or a later pass still would.
    pub(super) fn step_tree(&mut self, x: i32, y: i32, template_id: u32, health: u32) -> bool {
        let tuning = self.config.behavior;
        if !self.rng.chance(tuning.tree_growth_chance) {
            if tuning.tree_growth_chance <= 0.0 {
                return false;
            }
            let survey = self.survey_tree(x, y, template_id, false);
            return survey.open > 0 || survey.stage != health;
        }

        let survey = self.survey_tree(x, y, template_id, true);
        let stage = survey.stage;
        if health > stage && health - stage > tuning.tree_death_drop {
            debug!(x, y, health, stage, "tree died");
            self.write(x, y, Element::Wood.cell_at(x, y));
            return true;
        }
        if stage != health {
            let word = self.grid.head_at(self.grid.index(x, y));
            self.write_head(x, y, head::with_stage(word, stage));
        }
        if survey.open > 0 {
            debug!(x, y, template = template_id, painted = survey.open, stage, "tree grew");
        }
        survey.open > 0 || stage != health
    }

    /// Walk the template rooted at `(x, y)`. With `grow` set, growable cells
    /// are painted and grown leaves refreshed; otherwise the grid is left
    /// untouched and growable cells are only counted.
    fn survey_tree(&mut self, x: i32, y: i32, template_id: u32, grow: bool) -> Survey {
        let templates = Arc::clone(&self.templates);
        let template = templates.get(template_id);
        let mut stack = std::mem::take(&mut self.scratch.template_stack);
        let mut grown = 0usize;
        let mut open = 0usize;
        template.walk(&mut stack, |node| {
            let mut complete = true;
            for (px, py) in node.cells_at(x, y) {
                match self.tree_site(px, py, node.kind) {
                    Site::Grown => {
                        grown += 1;
                        if grow && node.kind == NodeKind::Leaf {
                            self.refresh_leaf(px, py);
                        }
                    }
                    Site::Growable => {
                        if grow {
                            self.paint_node_cell(px, py, node);
                        }
                        grown += 1;
                        open += 1;
                        complete = false;
                    }
                    Site::Blocked => complete = false,
                }
            }
            complete
        });
        self.scratch.template_stack = stack;

        let total = template.cell_count().max(1);
        let stage = ((grown as f32 / total as f32) * NIBBLE_MAX as f32).round() as u32;
        Survey {
            stage: stage.min(NIBBLE_MAX),
            open,
        }
    }

    fn tree_site(&self, x: i32, y: i32, kind: NodeKind) -> Site {
        let Some(cell) = self.grid.cell(x, y) else {
            return Site::Blocked;
        };
        let code = cell.behavior_code();
        // Leaf brushes may overlap the trunk they hang from.
        if code == kind.behavior() || (kind == NodeKind::Leaf && code == BEHAVIOR_TREE_TRUNK) {
            return Site::Grown;
        }
        let growable = cell.is_air()
            || code == BEHAVIOR_GRASS
            || code == BEHAVIOR_SOIL
            || (code == BEHAVIOR_TREE_LEAF && kind != NodeKind::Leaf);
        if growable {
            Site::Growable
        } else {
            Site::Blocked
        }
    }

    fn paint_node_cell(&mut self, x: i32, y: i32, node: &TemplateNode) {
        let cell = node.kind.element().cell_at(x, y);
        let cell = match node.kind {
            NodeKind::Root => cell.with_aux(self.config.behavior.root_growth),
            NodeKind::Leaf => cell.with_aux(0),
            NodeKind::Trunk => cell,
        };
        self.write(x, y, cell);
    }

    fn refresh_leaf(&mut self, x: i32, y: i32) {
        let idx = self.grid.index(x, y);
        let cell = self.grid.cell_at_index(idx);
        if cell.behavior_code() == BEHAVIOR_TREE_LEAF && cell.aux() != 0 {
            self.grid.put(idx, cell.with_aux(0));
        }
    }
}
