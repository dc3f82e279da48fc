//! The register-file shadow map (TS): one [`crate::value::ValueHandle`]
//! slot per 4-byte-aligned byte offset into the modeled guest register
//! file, for the single currently-running guest thread (per the spec's
//! single-guest-thread-at-a-time non-goal).

use crate::consts::{
    TS_SIZE_BYTES,
    TS_SLOT_BYTES,
};
use crate::ir::TsOffset;
use crate::value::ValueHandle;

/// Register-file shadow map. Every occupied slot holds exactly one
/// reference to its value in the value pool's ref-count accounting —
/// callers are responsible for calling `Pool::own`/`Pool::disown` around
/// `set`, matching the spec's "every pointer in TS contributes exactly one
/// reference" invariant.
#[derive(Debug)]
pub struct Registers {
    slots: Vec<Option<ValueHandle>>,
}

impl Registers {
    /// A fresh register file with every slot empty.
    pub fn new() -> Self {
        Registers {
            slots: vec![None; TS_SIZE_BYTES / TS_SLOT_BYTES],
        }
    }

    fn index(offset: TsOffset) -> usize {
        debug_assert!(
            offset.0 as usize % TS_SLOT_BYTES == 0,
            "TS offset must be 4-byte aligned"
        );
        offset.0 as usize / TS_SLOT_BYTES
    }

    /// Read the slot at `offset`.
    pub fn get(&self, offset: TsOffset) -> Option<ValueHandle> {
        self.slots.get(Self::index(offset)).copied().flatten()
    }

    /// Overwrite the slot at `offset`, returning whatever was there before
    /// so the caller can disown it.
    pub fn set(&mut self, offset: TsOffset, value: Option<ValueHandle>) -> Option<ValueHandle> {
        let idx = Self::index(offset);
        std::mem::replace(&mut self.slots[idx], value)
    }
}

impl Default for Registers {
    fn default() -> Self {
        Registers::new()
    }
}
