//! Procedurally generated tree templates.
//!
//! A template is a small tree of nodes (arena-indexed) describing trunk, root
//! and leaf placements relative to a tree's anchor cell. Templates are built
//! from fixed seeds on first use and shared read-only afterwards.

use std::sync::OnceLock;

use crate::codec::{BEHAVIOR_TREE_LEAF, BEHAVIOR_TREE_ROOT, BEHAVIOR_TREE_TRUNK};
use crate::elements::Element;
use crate::random::RandomSource;

/// Number of distinct templates a tree marker's aux nibble can select.
pub const TEMPLATE_COUNT: usize = 16;

const TEMPLATE_SEED: u64 = 0x5A4D_7EE5_0000_0001;

const SINGLE: [(i32, i32); 1] = [(0, 0)];
const PLUS: [(i32, i32); 5] = [(0, 0), (-1, 0), (1, 0), (0, -1), (0, 1)];
const DISC: [(i32, i32); 9] = [
    (0, 0),
    (-1, 0),
    (1, 0),
    (0, -1),
    (0, 1),
    (-1, -1),
    (1, -1),
    (-2, 0),
    (2, 0),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Trunk,
    Root,
    Leaf,
}

impl NodeKind {
    /// Behavior code of a correctly grown cell for this node.
    #[must_use]
    pub const fn behavior(self) -> u32 {
        match self {
            NodeKind::Trunk => BEHAVIOR_TREE_TRUNK,
            NodeKind::Root => BEHAVIOR_TREE_ROOT,
            NodeKind::Leaf => BEHAVIOR_TREE_LEAF,
        }
    }

    #[must_use]
    pub const fn element(self) -> Element {
        match self {
            NodeKind::Trunk => Element::TreeTrunk,
            NodeKind::Root => Element::TreeRoot,
            NodeKind::Leaf => Element::TreeLeaf,
        }
    }
}

/// Brush footprints a node can paint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Brush {
    Single,
    Plus,
    Disc,
}

impl Brush {
    #[must_use]
    pub fn cells(self) -> &'static [(i32, i32)] {
        match self {
            Brush::Single => &SINGLE,
            Brush::Plus => &PLUS,
            Brush::Disc => &DISC,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TemplateNode {
    /// Offset from the anchor cell (y grows downward).
    pub offset: (i32, i32),
    pub kind: NodeKind,
    pub brush: Brush,
    /// Arena indices of the nodes that grow once this one is complete.
    pub children: Vec<u32>,
}

impl TemplateNode {
    /// Absolute brush cells for a tree anchored at `(x, y)`.
    pub fn cells_at(&self, x: i32, y: i32) -> impl Iterator<Item = (i32, i32)> + '_ {
        let (ox, oy) = self.offset;
        self.brush
            .cells()
            .iter()
            .map(move |&(bx, by)| (x + ox + bx, y + oy + by))
    }
}

#[derive(Debug, Clone)]
pub struct TreeTemplate {
    id: u32,
    nodes: Vec<TemplateNode>,
    cell_count: usize,
}

impl TreeTemplate {
    /// Build template `id` from its fixed seed. Node 0 is the trunk base
    /// directly above the anchor; trunk and root chains hang off it.
    #[must_use]
    pub fn generate(id: u32) -> Self {
        let mut rng =
            RandomSource::new(TEMPLATE_SEED ^ u64::from(id).wrapping_mul(0x9E37_79B9_7F4A_7C15));
        let mut template = Self {
            id,
            nodes: Vec::new(),
            cell_count: 0,
        };

        let base = template.push(None, (0, -1), NodeKind::Trunk, Brush::Single);

        let mut root_parent = template.push(Some(base), (0, 1), NodeKind::Root, Brush::Single);
        let root_dir = rng.sign();
        let root_depth = 1 + rng.next_int(2) as i32;
        for step in 1..=root_depth {
            let x = if step == root_depth { root_dir } else { 0 };
            root_parent = template.push(
                Some(root_parent),
                (x, 1 + step),
                NodeKind::Root,
                Brush::Single,
            );
        }

        let height = 5 + rng.next_int(6) as i32;
        let mut x = 0;
        let mut parent = base;
        let mut trunk = Vec::with_capacity(height as usize);
        for level in 2..=height {
            if level > 3 && rng.chance(0.2) {
                x += rng.sign();
            }
            parent = template.push(Some(parent), (x, -level), NodeKind::Trunk, Brush::Single);
            trunk.push((parent, x, level));
        }

        for &(node, tx, level) in trunk.iter().filter(|(_, _, level)| *level * 2 > height) {
            if !rng.chance(0.45) {
                continue;
            }
            let dir = rng.sign();
            let length = 2 + rng.next_int(3) as i32;
            let mut branch_parent = node;
            let mut tip = (tx, -level);
            for step in 1..=length {
                tip = (tx + dir * step, -level - step / 2);
                branch_parent =
                    template.push(Some(branch_parent), tip, NodeKind::Trunk, Brush::Single);
            }
            template.push(Some(branch_parent), tip, NodeKind::Leaf, Brush::Plus);
        }

        let crown = template.push(Some(parent), (x, -height - 1), NodeKind::Leaf, Brush::Disc);
        for _ in 0..2 + rng.next_int(3) {
            let dx = rng.next_int(5) as i32 - 2;
            let dy = rng.next_int(3) as i32;
            template.push(
                Some(crown),
                (x + dx, -height - 2 - dy),
                NodeKind::Leaf,
                Brush::Plus,
            );
        }

        template
    }

    fn push(
        &mut self,
        parent: Option<usize>,
        offset: (i32, i32),
        kind: NodeKind,
        brush: Brush,
    ) -> usize {
        let index = self.nodes.len();
        self.nodes.push(TemplateNode {
            offset,
            kind,
            brush,
            children: Vec::new(),
        });
        self.cell_count += brush.cells().len();
        if let Some(parent) = parent {
            self.nodes[parent].children.push(index as u32);
        }
        index
    }

    #[must_use]
    pub const fn id(&self) -> u32 {
        self.id
    }

    #[must_use]
    pub fn nodes(&self) -> &[TemplateNode] {
        &self.nodes
    }

    #[must_use]
    pub fn node(&self, index: usize) -> &TemplateNode {
        &self.nodes[index]
    }

    /// Total brush cells across all nodes (the health denominator).
    #[must_use]
    pub const fn cell_count(&self) -> usize {
        self.cell_count
    }

    /// Depth-first walk from the base node with an explicit stack. `visit`
    /// returns whether the walk should descend into the node's children.
    pub fn walk(&self, stack: &mut Vec<u32>, mut visit: impl FnMut(&TemplateNode) -> bool) {
        stack.clear();
        if self.nodes.is_empty() {
            return;
        }
        stack.push(0);
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index as usize];
            if visit(node) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
    }
}

/// Lazily-built, read-only table of every template.
#[derive(Debug)]
pub struct TemplateRegistry {
    slots: [OnceLock<TreeTemplate>; TEMPLATE_COUNT],
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| OnceLock::new()),
        }
    }

    /// Template for a marker's aux value, generating it on first request.
    pub fn get(&self, id: u32) -> &TreeTemplate {
        let id = id % TEMPLATE_COUNT as u32;
        self.slots[id as usize].get_or_init(|| TreeTemplate::generate(id))
    }

    /// Number of templates generated so far.
    #[must_use]
    pub fn built_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.get().is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_is_deterministic() {
        let a = TreeTemplate::generate(5);
        let b = TreeTemplate::generate(5);
        let offsets = |t: &TreeTemplate| t.nodes().iter().map(|n| n.offset).collect::<Vec<_>>();
        assert_eq!(offsets(&a), offsets(&b));
        assert_eq!(a.cell_count(), b.cell_count());
    }

    #[test]
    fn templates_have_every_part() {
        for id in 0..TEMPLATE_COUNT as u32 {
            let template = TreeTemplate::generate(id);
            let has = |kind| template.nodes().iter().any(|n| n.kind == kind);
            assert!(has(NodeKind::Trunk) && has(NodeKind::Root) && has(NodeKind::Leaf));
            assert_eq!(template.node(0).offset, (0, -1));
            assert!(template.nodes().iter().all(|n| n.offset != (0, 0)));
        }
    }

    #[test]
    fn walk_respects_descend_flag() {
        let template = TreeTemplate::generate(2);
        let mut stack = Vec::new();
        let mut visited = 0;
        template.walk(&mut stack, |_| {
            visited += 1;
            false
        });
        assert_eq!(visited, 1);

        let mut all = 0;
        template.walk(&mut stack, |_| {
            all += 1;
            true
        });
        assert_eq!(all, template.nodes().len());
    }

    #[test]
    fn registry_builds_lazily() {
        let registry = TemplateRegistry::new();
        assert_eq!(registry.built_count(), 0);
        let first = registry.get(3).cell_count();
        assert_eq!(registry.get(3 + TEMPLATE_COUNT as u32).cell_count(), first);
        assert_eq!(registry.built_count(), 1);
    }
}
