//! The memory shadow map (MS): a chained hash table keyed by guest memory
//! address, holding one optional shadow value per 4-byte unit.
//!
//! `hashbrown::HashMap` gives us the chained-bucket behavior the spec
//! describes idiomatically; only addresses currently holding a shadow are
//! present as keys; a missing key and a present key mapped to `None` are
//! treated identically by callers (`get` returns `Option<ValueHandle>`
//! either way), so we just never insert empty slots.

use hashbrown::HashMap;

use crate::consts::TS_SLOT_BYTES;
use crate::shadow::temp::ShadowTemp;
use crate::value::ValueHandle;

/// Guest memory address.
pub type Addr = u64;

/// Memory-shadow map, plus a per-address "important"/"force-tracked" mark
/// set used by the `MARK_IMPORTANT`/`FORCE_TRACK` client requests.
#[derive(Debug, Default)]
pub struct Memory {
    units: HashMap<Addr, ValueHandle>,
    important: hashbrown::HashSet<Addr>,
}

impl Memory {
    /// An empty memory-shadow map.
    pub fn new() -> Self {
        Memory::default()
    }

    /// Fast first-bucket probe for one 4-byte unit: the in-IR path the
    /// spec calls out as needing to stay cheap. `hashbrown`'s `get` is
    /// already O(1) single-probe in the common case, so this is just a
    /// named seam rather than a hand-rolled bucket walk — a port that
    /// wanted to emit this inline into generated machine code would call
    /// this exact method.
    pub fn fast_probe(&self, addr: Addr) -> Option<ValueHandle> {
        self.units.get(&addr).copied()
    }

    /// Read one 4-byte unit's shadow.
    pub fn get(&self, addr: Addr) -> Option<ValueHandle> {
        self.fast_probe(addr)
    }

    /// Write (or clear) one 4-byte unit's shadow, returning the previous
    /// occupant so the caller can disown it.
    pub fn set(&mut self, addr: Addr, value: Option<ValueHandle>) -> Option<ValueHandle> {
        match value {
            Some(v) => self.units.insert(addr, v),
            None => self.units.remove(&addr),
        }
    }

    /// Read a multi-unit region into a [`ShadowTemp`] of the matching
    /// arity. `size` must be 4, 8, or 16 bytes.
    pub fn mem_get(&self, addr: Addr, size: usize) -> ShadowTemp {
        let arity = size / TS_SLOT_BYTES;
        let mut temp = ShadowTemp::empty(arity.max(1));
        for i in 0..arity {
            temp.set(i, self.get(addr + (i * TS_SLOT_BYTES) as u64));
        }
        temp
    }

    /// Write a multi-unit region from a [`ShadowTemp`], returning the
    /// previous occupants (for disowning) in block order.
    pub fn mem_set(&mut self, addr: Addr, temp: &ShadowTemp) -> Vec<Option<ValueHandle>> {
        (0..temp.arity())
            .map(|i| self.set(addr + (i * TS_SLOT_BYTES) as u64, temp.get(i)))
            .collect()
    }

    /// Clear a multi-unit region, returning the previous occupants.
    pub fn mem_clear(&mut self, addr: Addr, size: usize) -> Vec<Option<ValueHandle>> {
        let arity = size / TS_SLOT_BYTES;
        (0..arity)
            .map(|i| self.set(addr + (i * TS_SLOT_BYTES) as u64, None))
            .collect()
    }

    /// Mark an address "important" (`MARK_IMPORTANT`), regardless of
    /// whether it currently holds a shadow.
    pub fn mark_important(&mut self, addr: Addr) {
        self.important.insert(addr);
    }

    /// Mark an address "important" only if it currently holds a shadow
    /// (`MAYBE_MARK_IMPORTANT`).
    pub fn maybe_mark_important(&mut self, addr: Addr) {
        if self.get(addr).is_some() {
            self.important.insert(addr);
        }
    }

    /// Whether an address has been marked important.
    pub fn is_important(&self, addr: Addr) -> bool {
        self.important.contains(&addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwritten_unit_is_none() {
        let mem = Memory::new();
        assert!(mem.get(0x1000).is_none());
    }

    #[test]
    fn mem_set_then_mem_get_round_trips_a_double() {
        let mut mem = Memory::new();
        let mut temp = ShadowTemp::empty(2);
        temp.set(0, Some(ValueHandle::for_test(1)));
        temp.set(1, Some(ValueHandle::for_test(2)));
        mem.mem_set(0x2000, &temp);
        let loaded = mem.mem_get(0x2000, 8);
        assert_eq!(loaded.get(0), Some(ValueHandle::for_test(1)));
        assert_eq!(loaded.get(1), Some(ValueHandle::for_test(2)));
    }

    #[test]
    fn mem_clear_removes_units_and_returns_previous() {
        let mut mem = Memory::new();
        mem.set(0x10, Some(ValueHandle::for_test(9)));
        let prev = mem.mem_clear(0x10, 4);
        assert_eq!(prev, vec![Some(ValueHandle::for_test(9))]);
        assert!(mem.get(0x10).is_none());
    }

    #[test]
    fn maybe_mark_important_is_noop_without_a_shadow() {
        let mut mem = Memory::new();
        mem.maybe_mark_important(0x30);
        assert!(!mem.is_important(0x30));
        mem.set(0x30, Some(ValueHandle::for_test(1)));
        mem.maybe_mark_important(0x30);
        assert!(mem.is_important(0x30));
    }

    #[test]
    fn mark_important_works_without_a_shadow() {
        let mut mem = Memory::new();
        mem.mark_important(0x40);
        assert!(mem.is_important(0x40));
    }
}
