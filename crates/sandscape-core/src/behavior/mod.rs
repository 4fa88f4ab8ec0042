//! Behavior dispatch for cells that did not move this tick.
//!
//! The behavior nibble selects a state machine; the aux and stage nibbles hold
//! its per-cell state. [`BehaviorState`] decodes both into one enum so each
//! handler receives typed state instead of raw bits.

mod fish;
mod grass;
mod leaf;
mod root;
mod tree;

use crate::codec::{Behavior, Cell, CodecError, head};
use crate::simulation::Simulation;

/// Decoded per-cell behavior state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BehaviorState {
    /// Soil, inert, trunk and plain cells: nothing to run.
    Idle,
    Grass { stage: u32 },
    Tree { template: u32, health: u32 },
    Root { remaining: u32 },
    Leaf { vitality: u32 },
    FishHead { dryness: u32 },
    FishBody,
}

impl BehaviorState {
    /// Pair a decoded behavior tag with the state stored in `word`.
    #[must_use]
    pub fn from_parts(behavior: Behavior, word: u32) -> Self {
        let aux = head::aux(word);
        match behavior {
            Behavior::None | Behavior::Soil | Behavior::Inert | Behavior::TreeTrunk => {
                BehaviorState::Idle
            }
            Behavior::Grass => BehaviorState::Grass { stage: aux },
            Behavior::Tree => BehaviorState::Tree {
                template: aux,
                health: head::stage(word),
            },
            Behavior::TreeRoot => BehaviorState::Root { remaining: aux },
            Behavior::TreeLeaf => BehaviorState::Leaf { vitality: aux },
            Behavior::FishHead => BehaviorState::FishHead { dryness: aux },
            Behavior::FishBody => BehaviorState::FishBody,
        }
    }

    /// Decode a cell's behavior state.
    pub fn decode(cell: Cell) -> Result<Self, CodecError> {
        Ok(Self::from_parts(cell.behavior()?, cell.head))
    }
}

impl Simulation {
    /// Run the state machine for `behavior`. Returns whether the cell wants
    /// its chunk kept awake.
    pub(crate) fn dispatch_behavior(
        &mut self,
        x: i32,
        y: i32,
        behavior: Behavior,
        word: u32,
    ) -> bool {
        match BehaviorState::from_parts(behavior, word) {
            BehaviorState::Idle => false,
            BehaviorState::Grass { stage } => self.step_grass(x, y, stage),
            BehaviorState::Tree { template, health } => self.step_tree(x, y, template, health),
            BehaviorState::Root { remaining } => self.step_root(x, y, remaining),
            BehaviorState::Leaf { vitality } => self.step_leaf(x, y, vitality),
            BehaviorState::FishHead { dryness } => self.step_fish_head(x, y, dryness),
            BehaviorState::FishBody => self.step_fish_body(x, y),
        }
    }

    /// Behavior code at `(x, y)`, or `None` outside the grid.
    pub(crate) fn behavior_at(&self, x: i32, y: i32) -> Option<u32> {
        self.grid.cell(x, y).map(Cell::behavior_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::Element;

    #[test]
    fn decode_extracts_typed_state() {
        assert_eq!(
            BehaviorState::decode(Element::Grass.cell_with_aux(2)),
            Ok(BehaviorState::Grass { stage: 2 })
        );
        let marker = Element::TreeSeed.cell_with_aux(7);
        let marker = Cell::new(head::with_stage(marker.head, 11), marker.tail);
        assert_eq!(
            BehaviorState::decode(marker),
            Ok(BehaviorState::Tree {
                template: 7,
                health: 11
            })
        );
        assert_eq!(
            BehaviorState::decode(Element::TreeTrunk.cell()),
            Ok(BehaviorState::Idle)
        );
        let bogus = Cell::new(head::with_behavior(Element::Rock.cell().head, 12), 0);
        assert_eq!(
            BehaviorState::decode(bogus),
            Err(CodecError::UnknownBehavior(12))
        );
    }
}
