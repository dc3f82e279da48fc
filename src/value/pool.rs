//! Free-list-backed allocator for [`ShadowValue`]s.
//!
//! Values are recycled, never freed: `disown` on a value whose reference
//! count drops to zero clears its influence set and pushes its slot index
//! onto a single free list (the original's `freedVals` stack — unlike
//! shadow temps, shadow values are a uniform size regardless of
//! [`FloatKind`], so one free list suffices instead of one per arity).

use crate::real::{
    FloatKind,
    Real,
};
use crate::value::{
    ShadowValue,
    ValueHandle,
};

/// Snapshot of pool occupancy, exposed for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolStats {
    /// Number of slots currently holding a live value.
    pub live: usize,
    /// Number of slots parked on the free list, ready for reuse.
    pub free: usize,
}

/// Owns every [`ShadowValue`] in the engine behind a slab of slots, handed
/// out and recycled through [`ValueHandle`]s.
#[derive(Debug, Default)]
pub struct Pool {
    slots: Vec<ShadowValue>,
    free: Vec<u32>,
    live: usize,
}

impl Pool {
    /// An empty pool.
    pub fn new() -> Self {
        Pool::default()
    }

    /// Allocate a value initialized from `concrete`, rounded into `kind`'s
    /// working precision. Reference count starts at 1.
    pub fn make_value(&mut self, kind: FloatKind, concrete: f64) -> ValueHandle {
        let real = Real::from_f64(kind, concrete);
        self.alloc_with(kind, real)
    }

    /// Allocate a value with an uninitialized `real`, for callers (such as
    /// [`crate::exec::executor`]) about to fill it in immediately via
    /// [`crate::real::Real::add`]-style operators rather than a leaf
    /// conversion.
    pub fn make_bare(&mut self, kind: FloatKind) -> ValueHandle {
        self.alloc_with(kind, Real::zero(kind))
    }

    fn alloc_with(&mut self, kind: FloatKind, real: Real) -> ValueHandle {
        self.live += 1;
        if let Some(idx) = self.free.pop() {
            self.slots[idx as usize].reset(kind, real);
            ValueHandle(idx)
        } else {
            let idx = self.slots.len() as u32;
            self.slots.push(ShadowValue::new(kind, real));
            ValueHandle(idx)
        }
    }

    /// Increment a value's reference count. A no-op would be unsound here:
    /// unlike the original's `NULL`-tolerant `ownShadowValue`, handles in
    /// this port are always valid, so callers holding an `Option<ValueHandle>`
    /// must check for `None` themselves before calling.
    pub fn own(&mut self, handle: ValueHandle) {
        self.slot_mut(handle).ref_count += 1;
    }

    /// Decrement a value's reference count, recycling its slot once it
    /// reaches zero.
    pub fn disown(&mut self, handle: ValueHandle) {
        let slot = self.slot_mut(handle);
        debug_assert!(slot.ref_count() >= 1, "disown of a value with no owners");
        slot.ref_count -= 1;
        if slot.ref_count() == 0 {
            slot.influences = None;
            slot.expr = None;
            self.free.push(handle.0);
            self.live -= 1;
        }
    }

    /// Borrow a value.
    pub fn get(&self, handle: ValueHandle) -> &ShadowValue {
        &self.slots[handle.0 as usize]
    }

    /// Mutably borrow a value. Only sound to use before the value's
    /// reference count exceeds 1, per the pool's sharing invariant.
    pub fn get_mut(&mut self, handle: ValueHandle) -> &mut ShadowValue {
        self.slot_mut(handle)
    }

    fn slot_mut(&mut self, handle: ValueHandle) -> &mut ShadowValue {
        &mut self.slots[handle.0 as usize]
    }

    /// Current occupancy, for tests and diagnostics.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            live: self.live,
            free: self.free.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn make_value_starts_with_one_reference() {
        let mut pool = Pool::new();
        let h = pool.make_value(FloatKind::Double, 3.5);
        assert_eq!(pool.get(h).ref_count(), 1);
        assert_eq!(pool.get(h).real.get_double(), 3.5);
    }

    #[test]
    fn disown_to_zero_recycles_slot() {
        let mut pool = Pool::new();
        let h = pool.make_value(FloatKind::Single, 1.0);
        pool.disown(h);
        assert_eq!(pool.stats().live, 0);
        assert_eq!(pool.stats().free, 1);

        let h2 = pool.make_value(FloatKind::Single, 2.0);
        assert_eq!(h2.0, h.0, "recycled slot index should be reused");
    }

    #[test]
    fn own_then_disown_twice_keeps_value_alive_once() {
        let mut pool = Pool::new();
        let h = pool.make_value(FloatKind::Double, 9.0);
        pool.own(h);
        assert_eq!(pool.get(h).ref_count(), 2);
        pool.disown(h);
        assert_eq!(pool.stats().live, 1);
        pool.disown(h);
        assert_eq!(pool.stats().live, 0);
    }

    #[test]
    fn disowning_clears_influences() {
        let mut pool = Pool::new();
        let h = pool.make_value(FloatKind::Double, 1.0);
        pool.get_mut(h).influences = Some(Default::default());
        pool.disown(h);
        // The slot was recycled bare; reuse it and confirm no stale state leaks.
        let h2 = pool.make_value(FloatKind::Double, 1.0);
        assert!(pool.get(h2).influences.is_none());
    }
}
