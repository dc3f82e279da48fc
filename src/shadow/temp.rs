//! Shadow temps: the tuple of shadow values attached to one guest IR temp,
//! and the per-block table + debt list that owns them.

use crate::consts::MAX_TEMP_BLOCKS;
use crate::ir::TempId;
use crate::value::ValueHandle;

/// A fixed-arity tuple of up to four shadow values (one per 4-byte float
/// block), attached to a single guest IR temp. Arity is 1, 2, or 4,
/// matching a single float, a double, or a 128-bit SIMD value.
#[derive(Debug, Clone, Copy)]
pub struct ShadowTemp {
    blocks: [Option<ValueHandle>; MAX_TEMP_BLOCKS],
    arity: u8,
}

impl ShadowTemp {
    /// A temp of the given arity with every block empty.
    pub fn empty(arity: usize) -> Self {
        debug_assert!(matches!(arity, 1 | 2 | 4), "shadow temp arity must be 1, 2 or 4");
        ShadowTemp {
            blocks: [None; MAX_TEMP_BLOCKS],
            arity: arity as u8,
        }
    }

    /// Number of float blocks this temp covers.
    pub fn arity(&self) -> usize {
        self.arity as usize
    }

    /// The value handle at block `i`, if any.
    pub fn get(&self, i: usize) -> Option<ValueHandle> {
        self.blocks.get(i).copied().flatten()
    }

    /// Set the value handle at block `i`.
    pub fn set(&mut self, i: usize, value: Option<ValueHandle>) {
        self.blocks[i] = value;
    }

    /// Every occupied block, in order.
    pub fn iter(&self) -> impl Iterator<Item = Option<ValueHandle>> + '_ {
        self.blocks[..self.arity()].iter().copied()
    }
}

/// Per-block table of [`ShadowTemp`]s plus the debt list of every temp
/// written during the block, so block-exit cleanup can disown exactly once
/// each. Scoped to one guest block at a time: [`TempTable::reset`] clears
/// it at block entry, matching the spec's "no interprocedural flow"
/// invariant for temp-level shadow state.
#[derive(Debug, Default)]
pub struct TempTable {
    slots: Vec<Option<ShadowTemp>>,
    debt: Vec<TempId>,
}

impl TempTable {
    /// An empty table.
    pub fn new() -> Self {
        TempTable::default()
    }

    /// Clear every slot and the debt list, sizing for `temp_count` temps.
    /// Called at the start of instrumenting (or executing) a fresh block.
    pub fn reset(&mut self, temp_count: usize) {
        self.slots.clear();
        self.slots.resize(temp_count, None);
        self.debt.clear();
    }

    /// Store a temp's shadow, adding it to the block's debt list.
    pub fn store(&mut self, temp: TempId, value: ShadowTemp) {
        self.slots[temp.0 as usize] = Some(value);
        self.debt.push(temp);
    }

    /// Look up a temp's shadow, if any.
    pub fn load(&self, temp: TempId) -> Option<ShadowTemp> {
        self.slots.get(temp.0 as usize).copied().flatten()
    }

    /// Clear a temp's shadow without disowning it (the caller has already
    /// taken ownership, e.g. to move it into a result).
    pub fn clear(&mut self, temp: TempId) {
        self.slots[temp.0 as usize] = None;
    }

    /// Every temp written during this block, for end-of-block cleanup.
    pub fn debt(&self) -> &[TempId] {
        &self.debt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_then_load_round_trips() {
        let mut table = TempTable::new();
        table.reset(4);
        let mut st = ShadowTemp::empty(2);
        st.set(0, Some(ValueHandle::for_test(7)));
        table.store(TempId(1), st);
        let loaded = table.load(TempId(1)).unwrap();
        assert_eq!(loaded.get(0), Some(ValueHandle::for_test(7)));
    }

    #[test]
    fn store_adds_to_debt_list_once() {
        let mut table = TempTable::new();
        table.reset(4);
        table.store(TempId(0), ShadowTemp::empty(1));
        table.store(TempId(2), ShadowTemp::empty(1));
        assert_eq!(table.debt(), &[TempId(0), TempId(2)]);
    }

    #[test]
    fn reset_clears_debt_and_slots() {
        let mut table = TempTable::new();
        table.reset(2);
        table.store(TempId(0), ShadowTemp::empty(1));
        table.reset(2);
        assert!(table.debt().is_empty());
        assert!(table.load(TempId(0)).is_none());
    }
}
