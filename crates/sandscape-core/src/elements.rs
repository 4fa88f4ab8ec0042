//! Element catalogue: named presets for every cell the core constructs.

use serde::{Deserialize, Serialize};

use crate::codec::{
    BEHAVIOR_FISH_BODY, BEHAVIOR_FISH_HEAD, BEHAVIOR_GRASS, BEHAVIOR_INERT, BEHAVIOR_NONE,
    BEHAVIOR_SOIL, BEHAVIOR_TREE, BEHAVIOR_TREE_LEAF, BEHAVIOR_TREE_ROOT, BEHAVIOR_TREE_TRUNK,
    Cell, NIBBLE_MAX, TYPE_AIR, TYPE_FALLING, TYPE_FLUID, TYPE_FLUID_WIDE, TYPE_POWDER,
    TYPE_POWDER_FLOATING, TYPE_POWDER_WET, TYPE_POWDER_WIDE, TYPE_STATIC, WEIGHT_AIR,
    WEIGHT_HEAVY, WEIGHT_LIGHT, WEIGHT_OIL, WEIGHT_POWDER, WEIGHT_STATIC, WEIGHT_WATER, head,
    tail,
};

/// Fish are a touch denser than the water they swim in.
const WEIGHT_FISH: u32 = WEIGHT_WATER + 1;

/// Physical and visual defaults for one element.
#[derive(Debug, Clone, Copy)]
struct Profile {
    type_class: u32,
    weight: u32,
    behavior: u32,
    aux: u32,
    rgb: [u8; 3],
    background: bool,
    blur: bool,
}

impl Profile {
    const fn solid(type_class: u32, weight: u32, behavior: u32, rgb: [u8; 3]) -> Self {
        Self {
            type_class,
            weight,
            behavior,
            aux: 0,
            rgb,
            background: false,
            blur: false,
        }
    }

    const fn with_aux(mut self, aux: u32) -> Self {
        self.aux = aux;
        self
    }

    const fn blurred(mut self) -> Self {
        self.blur = true;
        self
    }
}

/// Named element presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Element {
    Air,
    Sand,
    WetSand,
    Ash,
    Gravel,
    Sawdust,
    Soil,
    Water,
    Oil,
    Rock,
    Wall,
    Wood,
    Grass,
    TreeSeed,
    TreeTrunk,
    TreeRoot,
    TreeLeaf,
    DeadLeaf,
    FishHead,
    FishBody,
    FishCorpse,
}

impl Element {
    pub const ALL: [Element; 21] = [
        Element::Air,
        Element::Sand,
        Element::WetSand,
        Element::Ash,
        Element::Gravel,
        Element::Sawdust,
        Element::Soil,
        Element::Water,
        Element::Oil,
        Element::Rock,
        Element::Wall,
        Element::Wood,
        Element::Grass,
        Element::TreeSeed,
        Element::TreeTrunk,
        Element::TreeRoot,
        Element::TreeLeaf,
        Element::DeadLeaf,
        Element::FishHead,
        Element::FishBody,
        Element::FishCorpse,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Element::Air => "air",
            Element::Sand => "sand",
            Element::WetSand => "wet_sand",
            Element::Ash => "ash",
            Element::Gravel => "gravel",
            Element::Sawdust => "sawdust",
            Element::Soil => "soil",
            Element::Water => "water",
            Element::Oil => "oil",
            Element::Rock => "rock",
            Element::Wall => "wall",
            Element::Wood => "wood",
            Element::Grass => "grass",
            Element::TreeSeed => "tree_seed",
            Element::TreeTrunk => "tree_trunk",
            Element::TreeRoot => "tree_root",
            Element::TreeLeaf => "tree_leaf",
            Element::DeadLeaf => "dead_leaf",
            Element::FishHead => "fish_head",
            Element::FishBody => "fish_body",
            Element::FishCorpse => "fish_corpse",
        }
    }

    /// Parse a lower-case element name (`"wet_sand"`, `"water"`, ...).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|element| element.name() == name)
    }

    const fn profile(self) -> Profile {
        match self {
            Element::Air => Profile {
                type_class: TYPE_AIR,
                weight: WEIGHT_AIR,
                behavior: BEHAVIOR_NONE,
                aux: 0,
                rgb: [18, 18, 26],
                background: true,
                blur: false,
            },
            Element::Sand => {
                Profile::solid(TYPE_POWDER, WEIGHT_POWDER, BEHAVIOR_NONE, [214, 186, 120])
            }
            Element::WetSand => Profile::solid(
                TYPE_POWDER_WET,
                WEIGHT_POWDER + 1,
                BEHAVIOR_NONE,
                [168, 140, 92],
            ),
            Element::Ash => Profile::solid(
                TYPE_POWDER_WIDE,
                WEIGHT_POWDER - 1,
                BEHAVIOR_NONE,
                [150, 148, 146],
            ),
            Element::Gravel => {
                Profile::solid(TYPE_FALLING, WEIGHT_HEAVY, BEHAVIOR_NONE, [118, 118, 116])
            }
            Element::Sawdust => Profile::solid(
                TYPE_POWDER_FLOATING,
                WEIGHT_LIGHT,
                BEHAVIOR_NONE,
                [204, 164, 112],
            ),
            Element::Soil => {
                Profile::solid(TYPE_POWDER, WEIGHT_POWDER, BEHAVIOR_SOIL, [110, 78, 48])
            }
            Element::Water => {
                Profile::solid(TYPE_FLUID_WIDE, WEIGHT_WATER, BEHAVIOR_NONE, [40, 90, 210])
                    .blurred()
            }
            Element::Oil => {
                Profile::solid(TYPE_FLUID, WEIGHT_OIL, BEHAVIOR_NONE, [62, 50, 32]).blurred()
            }
            Element::Rock => {
                Profile::solid(TYPE_STATIC, WEIGHT_STATIC, BEHAVIOR_NONE, [110, 110, 116])
            }
            Element::Wall => {
                Profile::solid(TYPE_STATIC, WEIGHT_STATIC, BEHAVIOR_NONE, [80, 80, 92])
            }
            Element::Wood => {
                Profile::solid(TYPE_STATIC, WEIGHT_STATIC, BEHAVIOR_INERT, [120, 80, 40])
            }
            Element::Grass => {
                Profile::solid(TYPE_STATIC, WEIGHT_STATIC, BEHAVIOR_GRASS, [62, 170, 60])
                    .with_aux(3)
            }
            Element::TreeSeed => {
                Profile::solid(TYPE_STATIC, WEIGHT_STATIC, BEHAVIOR_TREE, [98, 68, 38])
            }
            Element::TreeTrunk => {
                Profile::solid(TYPE_STATIC, WEIGHT_STATIC, BEHAVIOR_TREE_TRUNK, [112, 76, 42])
            }
            Element::TreeRoot => {
                Profile::solid(TYPE_STATIC, WEIGHT_STATIC, BEHAVIOR_TREE_ROOT, [132, 96, 60])
                    .with_aux(6)
            }
            Element::TreeLeaf => {
                Profile::solid(TYPE_STATIC, WEIGHT_STATIC, BEHAVIOR_TREE_LEAF, [48, 140, 52])
            }
            Element::DeadLeaf => Profile::solid(
                TYPE_POWDER_FLOATING,
                WEIGHT_LIGHT,
                BEHAVIOR_NONE,
                [152, 120, 58],
            ),
            Element::FishHead => {
                Profile::solid(TYPE_STATIC, WEIGHT_FISH, BEHAVIOR_FISH_HEAD, [240, 140, 40])
            }
            Element::FishBody => {
                Profile::solid(TYPE_STATIC, WEIGHT_FISH, BEHAVIOR_FISH_BODY, [220, 112, 30])
            }
            Element::FishCorpse => {
                Profile::solid(TYPE_POWDER, WEIGHT_FISH, BEHAVIOR_NONE, [140, 112, 92])
            }
        }
    }

    /// Canonical cell for this element.
    #[must_use]
    pub fn cell(self) -> Cell {
        let profile = self.profile();
        self.build(profile, profile.rgb)
    }

    /// Canonical cell with an explicit auxiliary value (truncated to a nibble).
    #[must_use]
    pub fn cell_with_aux(self, aux: u32) -> Cell {
        let mut cell = self.cell();
        cell.head = head::with_aux(cell.head, aux.min(NIBBLE_MAX));
        cell
    }

    /// Cell with a deterministic per-position colour jitter. Air is never jittered.
    #[must_use]
    pub fn cell_at(self, x: i32, y: i32) -> Cell {
        let profile = self.profile();
        if profile.background {
            return self.build(profile, profile.rgb);
        }
        let hash = (x.wrapping_mul(374_761_393) ^ y.wrapping_mul(668_265_263)) as u32;
        let variation = (hash >> 7 & 0x0F) as i16 - 8;
        let rgb = profile
            .rgb
            .map(|channel| (i16::from(channel) + variation).clamp(0, 255) as u8);
        self.build(profile, rgb)
    }

    /// Whether `cell` is an instance of this element (colour and aux ignored).
    #[must_use]
    pub fn matches(self, cell: Cell) -> bool {
        let profile = self.profile();
        cell.type_code() == profile.type_class
            && cell.behavior_code() == profile.behavior
            && cell.weight() == head::weight(self.cell().head)
    }

    fn build(self, profile: Profile, rgb: [u8; 3]) -> Cell {
        Cell::new(
            head::pack(
                profile.type_class,
                profile.weight,
                profile.behavior,
                profile.aux,
            ),
            tail::pack(rgb, profile.background, profile.blur),
        )
    }
}

impl std::fmt::Display for Element {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Behavior;

    #[test]
    fn every_preset_is_a_valid_cell() {
        for element in Element::ALL {
            let cell = element.cell();
            assert_eq!(cell.validate(), Ok(()), "{element} must satisfy the codec");
            assert!(element.matches(cell));
            assert_eq!(Element::from_name(element.name()), Some(element));
        }
    }

    #[test]
    fn density_ordering() {
        let w = |e: Element| e.cell().weight();
        assert!(w(Element::Gravel) > w(Element::Sand));
        assert!(w(Element::Sand) > w(Element::Water));
        assert!(w(Element::Water) > w(Element::Oil));
        assert!(w(Element::Oil) > w(Element::Sawdust));
        assert!(w(Element::Sawdust) > w(Element::Air));
        assert!(w(Element::FishHead) > w(Element::Water));
    }

    #[test]
    fn jitter_is_deterministic_and_keeps_fields() {
        let a = Element::Sand.cell_at(4, 9);
        let b = Element::Sand.cell_at(4, 9);
        assert_eq!(a, b);
        assert_eq!(a.head, Element::Sand.cell().head);
        assert_eq!(Element::Air.cell_at(3, 3), Element::Air.cell());
    }

    #[test]
    fn behaviors_decode() {
        assert_eq!(Element::Grass.cell().behavior(), Ok(Behavior::Grass));
        assert_eq!(Element::TreeSeed.cell().behavior(), Ok(Behavior::Tree));
        assert_eq!(Element::Wood.cell().behavior(), Ok(Behavior::Inert));
        assert_eq!(Element::Grass.cell().aux(), 3);
        assert_eq!(Element::TreeLeaf.cell_with_aux(40).aux(), NIBBLE_MAX);
    }
}
