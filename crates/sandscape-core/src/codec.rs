//! Bit-packed cell representation.
//!
//! A cell is two 32-bit words. The *head* carries the physical and behavioral
//! fields, the *tail* carries colour and render flags. All field access goes
//! through the free functions in [`head`] and [`tail`]; callers never touch bit
//! offsets directly.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when a decoded field has no meaning in the current layout.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    #[error("unknown type class {0}")]
    UnknownTypeClass(u32),
    #[error("unknown behavior code {0}")]
    UnknownBehavior(u32),
    #[error("type class {type_class} cannot carry weight {weight}")]
    WeightMismatch { type_class: u32, weight: u32 },
    #[error("reserved head bits set: {0:#x}")]
    ReservedBits(u32),
}

pub const TYPE_AIR: u32 = 0;
pub const TYPE_STATIC: u32 = 1;
pub const TYPE_FALLING: u32 = 2;
pub const TYPE_POWDER: u32 = 3;
pub const TYPE_POWDER_WIDE: u32 = 4;
pub const TYPE_POWDER_WET: u32 = 5;
pub const TYPE_POWDER_FLOATING: u32 = 6;
pub const TYPE_FLUID: u32 = 7;
pub const TYPE_FLUID_WIDE: u32 = 8;

pub const WEIGHT_AIR: u32 = 0;
pub const WEIGHT_LIGHT: u32 = 2;
pub const WEIGHT_OIL: u32 = 3;
pub const WEIGHT_WATER: u32 = 4;
pub const WEIGHT_POWDER: u32 = 6;
pub const WEIGHT_HEAVY: u32 = 8;
pub const WEIGHT_STATIC: u32 = 15;

pub const BEHAVIOR_NONE: u32 = 0;
pub const BEHAVIOR_SOIL: u32 = 1;
pub const BEHAVIOR_GRASS: u32 = 2;
pub const BEHAVIOR_TREE: u32 = 3;
pub const BEHAVIOR_TREE_ROOT: u32 = 4;
pub const BEHAVIOR_TREE_TRUNK: u32 = 5;
pub const BEHAVIOR_TREE_LEAF: u32 = 6;
pub const BEHAVIOR_FISH_HEAD: u32 = 7;
pub const BEHAVIOR_FISH_BODY: u32 = 8;
pub const BEHAVIOR_INERT: u32 = 9;

/// Largest value any nibble field can hold.
pub const NIBBLE_MAX: u32 = 0xF;

/// Coarse physical category driving the movement rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeClass {
    Air,
    Static,
    Falling,
    Powder,
    PowderWide,
    PowderWet,
    PowderFloating,
    Fluid,
    FluidWide,
}

impl TypeClass {
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            TypeClass::Air => TYPE_AIR,
            TypeClass::Static => TYPE_STATIC,
            TypeClass::Falling => TYPE_FALLING,
            TypeClass::Powder => TYPE_POWDER,
            TypeClass::PowderWide => TYPE_POWDER_WIDE,
            TypeClass::PowderWet => TYPE_POWDER_WET,
            TypeClass::PowderFloating => TYPE_POWDER_FLOATING,
            TypeClass::Fluid => TYPE_FLUID,
            TypeClass::FluidWide => TYPE_FLUID_WIDE,
        }
    }

    /// Whether cells of this class are ever moved by the movement rules.
    #[must_use]
    pub const fn is_mobile(self) -> bool {
        !matches!(self, TypeClass::Air | TypeClass::Static)
    }

    #[must_use]
    pub const fn is_fluid(self) -> bool {
        matches!(self, TypeClass::Fluid | TypeClass::FluidWide)
    }

    #[must_use]
    pub const fn is_powder(self) -> bool {
        matches!(
            self,
            TypeClass::Powder
                | TypeClass::PowderWide
                | TypeClass::PowderWet
                | TypeClass::PowderFloating
        )
    }
}

impl TryFrom<u32> for TypeClass {
    type Error = CodecError;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        Ok(match code {
            TYPE_AIR => TypeClass::Air,
            TYPE_STATIC => TypeClass::Static,
            TYPE_FALLING => TypeClass::Falling,
            TYPE_POWDER => TypeClass::Powder,
            TYPE_POWDER_WIDE => TypeClass::PowderWide,
            TYPE_POWDER_WET => TypeClass::PowderWet,
            TYPE_POWDER_FLOATING => TypeClass::PowderFloating,
            TYPE_FLUID => TypeClass::Fluid,
            TYPE_FLUID_WIDE => TypeClass::FluidWide,
            other => return Err(CodecError::UnknownTypeClass(other)),
        })
    }
}

/// Tag selecting the state machine that runs for a cell that did not move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Behavior {
    None,
    Soil,
    Grass,
    Tree,
    TreeRoot,
    TreeTrunk,
    TreeLeaf,
    FishHead,
    FishBody,
    Inert,
}

impl Behavior {
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Behavior::None => BEHAVIOR_NONE,
            Behavior::Soil => BEHAVIOR_SOIL,
            Behavior::Grass => BEHAVIOR_GRASS,
            Behavior::Tree => BEHAVIOR_TREE,
            Behavior::TreeRoot => BEHAVIOR_TREE_ROOT,
            Behavior::TreeTrunk => BEHAVIOR_TREE_TRUNK,
            Behavior::TreeLeaf => BEHAVIOR_TREE_LEAF,
            Behavior::FishHead => BEHAVIOR_FISH_HEAD,
            Behavior::FishBody => BEHAVIOR_FISH_BODY,
            Behavior::Inert => BEHAVIOR_INERT,
        }
    }

    /// Parts of a living tree (marker, trunk, roots, leaves).
    #[must_use]
    pub const fn is_tree_part(self) -> bool {
        matches!(
            self,
            Behavior::Tree | Behavior::TreeRoot | Behavior::TreeTrunk | Behavior::TreeLeaf
        )
    }
}

impl TryFrom<u32> for Behavior {
    type Error = CodecError;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        Ok(match code {
            BEHAVIOR_NONE => Behavior::None,
            BEHAVIOR_SOIL => Behavior::Soil,
            BEHAVIOR_GRASS => Behavior::Grass,
            BEHAVIOR_TREE => Behavior::Tree,
            BEHAVIOR_TREE_ROOT => Behavior::TreeRoot,
            BEHAVIOR_TREE_TRUNK => Behavior::TreeTrunk,
            BEHAVIOR_TREE_LEAF => Behavior::TreeLeaf,
            BEHAVIOR_FISH_HEAD => Behavior::FishHead,
            BEHAVIOR_FISH_BODY => Behavior::FishBody,
            BEHAVIOR_INERT => Behavior::Inert,
            other => return Err(CodecError::UnknownBehavior(other)),
        })
    }
}

#[inline]
const fn read(word: u32, shift: u32, mask: u32) -> u32 {
    (word >> shift) & mask
}

#[inline]
fn write(word: u32, shift: u32, mask: u32, value: u32) -> u32 {
    debug_assert!(value <= mask, "field value {value} exceeds mask {mask:#x}");
    (word & !(mask << shift)) | ((value & mask) << shift)
}

/// Field accessors for the head word.
pub mod head {
    use super::{TYPE_AIR, WEIGHT_AIR, read, write};

    const TYPE_SHIFT: u32 = 0;
    const WEIGHT_SHIFT: u32 = 4;
    const BEHAVIOR_SHIFT: u32 = 8;
    const AUX_SHIFT: u32 = 12;
    const TEMPERATURE_SHIFT: u32 = 16;
    const STAGE_SHIFT: u32 = 24;
    const NIBBLE: u32 = 0xF;
    const BYTE: u32 = 0xFF;

    /// Default temperature stored in freshly packed heads.
    pub const AMBIENT_TEMPERATURE: u32 = 20;

    /// Pack a head word, normalising the air/weight invariant.
    #[must_use]
    pub fn pack(type_class: u32, weight: u32, behavior: u32, aux: u32) -> u32 {
        let weight = if type_class == TYPE_AIR {
            WEIGHT_AIR
        } else {
            weight.max(1)
        };
        let mut word = 0;
        word = write(word, TYPE_SHIFT, NIBBLE, type_class);
        word = write(word, WEIGHT_SHIFT, NIBBLE, weight);
        word = write(word, BEHAVIOR_SHIFT, NIBBLE, behavior);
        word = write(word, AUX_SHIFT, NIBBLE, aux);
        write(word, TEMPERATURE_SHIFT, BYTE, AMBIENT_TEMPERATURE)
    }

    #[inline]
    #[must_use]
    pub const fn type_class(head: u32) -> u32 {
        read(head, TYPE_SHIFT, NIBBLE)
    }

    #[inline]
    #[must_use]
    pub const fn weight(head: u32) -> u32 {
        read(head, WEIGHT_SHIFT, NIBBLE)
    }

    #[inline]
    #[must_use]
    pub const fn behavior(head: u32) -> u32 {
        read(head, BEHAVIOR_SHIFT, NIBBLE)
    }

    #[inline]
    #[must_use]
    pub const fn aux(head: u32) -> u32 {
        read(head, AUX_SHIFT, NIBBLE)
    }

    #[inline]
    #[must_use]
    pub const fn temperature(head: u32) -> u32 {
        read(head, TEMPERATURE_SHIFT, BYTE)
    }

    #[inline]
    #[must_use]
    pub const fn stage(head: u32) -> u32 {
        read(head, STAGE_SHIFT, NIBBLE)
    }

    /// Change the type class, keeping the air/weight invariant intact.
    #[must_use]
    pub fn with_type_class(head: u32, type_class: u32) -> u32 {
        let head = write(head, TYPE_SHIFT, NIBBLE, type_class);
        if type_class == TYPE_AIR {
            write(head, WEIGHT_SHIFT, NIBBLE, WEIGHT_AIR)
        } else if weight(head) == WEIGHT_AIR {
            write(head, WEIGHT_SHIFT, NIBBLE, 1)
        } else {
            head
        }
    }

    /// Change the weight class. Air keeps weight zero; other classes at least one.
    #[must_use]
    pub fn with_weight(head: u32, weight: u32) -> u32 {
        let weight = if type_class(head) == TYPE_AIR {
            WEIGHT_AIR
        } else {
            weight.max(1)
        };
        write(head, WEIGHT_SHIFT, NIBBLE, weight)
    }

    #[must_use]
    pub fn with_behavior(head: u32, behavior: u32) -> u32 {
        write(head, BEHAVIOR_SHIFT, NIBBLE, behavior)
    }

    #[must_use]
    pub fn with_aux(head: u32, aux: u32) -> u32 {
        write(head, AUX_SHIFT, NIBBLE, aux)
    }

    #[must_use]
    pub fn with_temperature(head: u32, temperature: u32) -> u32 {
        write(head, TEMPERATURE_SHIFT, BYTE, temperature)
    }

    #[must_use]
    pub fn with_stage(head: u32, stage: u32) -> u32 {
        write(head, STAGE_SHIFT, NIBBLE, stage)
    }

    /// Reserved high bits must stay clear in every valid head.
    #[must_use]
    pub const fn reserved_bits(head: u32) -> u32 {
        head >> 28
    }
}

/// Field accessors for the tail word.
pub mod tail {
    use super::{read, write};

    const RED_SHIFT: u32 = 0;
    const GREEN_SHIFT: u32 = 8;
    const BLUE_SHIFT: u32 = 16;
    const BYTE: u32 = 0xFF;
    const BACKGROUND_BIT: u32 = 1 << 24;
    const BLUR_BIT: u32 = 1 << 25;

    #[must_use]
    pub fn pack(rgb: [u8; 3], background: bool, blur: bool) -> u32 {
        let mut word = 0;
        word = write(word, RED_SHIFT, BYTE, u32::from(rgb[0]));
        word = write(word, GREEN_SHIFT, BYTE, u32::from(rgb[1]));
        word = write(word, BLUE_SHIFT, BYTE, u32::from(rgb[2]));
        with_background(with_blur(word, blur), background)
    }

    #[inline]
    #[must_use]
    pub const fn rgb(tail: u32) -> [u8; 3] {
        [
            read(tail, RED_SHIFT, BYTE) as u8,
            read(tail, GREEN_SHIFT, BYTE) as u8,
            read(tail, BLUE_SHIFT, BYTE) as u8,
        ]
    }

    #[must_use]
    pub fn with_rgb(tail: u32, rgb: [u8; 3]) -> u32 {
        let flags = tail & (BACKGROUND_BIT | BLUR_BIT);
        pack(rgb, false, false) | flags
    }

    #[inline]
    #[must_use]
    pub const fn is_background(tail: u32) -> bool {
        tail & BACKGROUND_BIT != 0
    }

    #[inline]
    #[must_use]
    pub const fn is_blur(tail: u32) -> bool {
        tail & BLUR_BIT != 0
    }

    #[must_use]
    pub const fn with_background(tail: u32, on: bool) -> u32 {
        if on {
            tail | BACKGROUND_BIT
        } else {
            tail & !BACKGROUND_BIT
        }
    }

    #[must_use]
    pub const fn with_blur(tail: u32, on: bool) -> u32 {
        if on { tail | BLUR_BIT } else { tail & !BLUR_BIT }
    }
}

/// One grid position's packed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Cell {
    pub head: u32,
    pub tail: u32,
}

impl Cell {
    #[must_use]
    pub const fn new(head: u32, tail: u32) -> Self {
        Self { head, tail }
    }

    /// Same cell with the aux nibble replaced.
    #[must_use]
    pub fn with_aux(self, aux: u32) -> Self {
        Self::new(head::with_aux(self.head, aux), self.tail)
    }

    #[inline]
    #[must_use]
    pub const fn type_code(self) -> u32 {
        head::type_class(self.head)
    }

    #[inline]
    #[must_use]
    pub const fn weight(self) -> u32 {
        head::weight(self.head)
    }

    #[inline]
    #[must_use]
    pub const fn behavior_code(self) -> u32 {
        head::behavior(self.head)
    }

    #[inline]
    #[must_use]
    pub const fn aux(self) -> u32 {
        head::aux(self.head)
    }

    #[inline]
    #[must_use]
    pub const fn is_air(self) -> bool {
        head::type_class(self.head) == TYPE_AIR
    }

    /// Decoded type class, failing for codes outside the current layout.
    pub fn type_class(self) -> Result<TypeClass, CodecError> {
        TypeClass::try_from(self.type_code())
    }

    /// Decoded behavior, failing for codes outside the current layout.
    pub fn behavior(self) -> Result<Behavior, CodecError> {
        Behavior::try_from(self.behavior_code())
    }

    #[must_use]
    pub const fn rgb(self) -> [u8; 3] {
        tail::rgb(self.tail)
    }

    /// Checks every field contract of the current layout.
    pub fn validate(self) -> Result<(), CodecError> {
        let class = self.type_class()?;
        self.behavior()?;
        if (class == TypeClass::Air) != (self.weight() == WEIGHT_AIR) {
            return Err(CodecError::WeightMismatch {
                type_class: self.type_code(),
                weight: self.weight(),
            });
        }
        match head::reserved_bits(self.head) {
            0 => Ok(()),
            bits => Err(CodecError::ReservedBits(bits)),
        }
    }
}
