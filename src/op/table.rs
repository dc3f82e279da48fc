//! Process-wide table of [`ShadowOpInfo`] records, keyed by the
//! `(op_code, op_addr)` pair that uniquely identifies a static instruction.

use hashbrown::HashMap;

use crate::op::info::{
    OpCode,
    ShadowOpInfo,
};

/// Stable handle to a [`ShadowOpInfo`] living in an [`OpTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
#[display(fmt = "op{}", _0)]
pub struct OpInfoHandle(pub(crate) u32);

impl OpInfoHandle {
    /// Construct a handle directly, for tests that need one without going
    /// through a full [`OpTable`].
    #[cfg(test)]
    pub fn for_test(idx: u32) -> Self {
        OpInfoHandle(idx)
    }
}

/// Owns one [`ShadowOpInfo`] per static `(op_code, op_addr)` pair observed
/// during instrumentation, handed out through stable [`OpInfoHandle`]s so
/// that instrumented blocks can cache the handle for an instruction instead
/// of re-resolving it on every execution.
#[derive(Debug, Default)]
pub struct OpTable {
    infos: Vec<ShadowOpInfo>,
    index: HashMap<(OpCodeKey, u64), u32>,
}

/// `OpCode` is already `Hash + Eq`; this newtype exists only so the map key
/// tuple reads clearly at call sites.
type OpCodeKey = OpCode;

impl OpTable {
    /// An empty table.
    pub fn new() -> Self {
        OpTable::default()
    }

    /// Look up (or lazily create) the single [`ShadowOpInfo`] for this
    /// `(op_code, op_addr)` pair.
    pub fn get_or_create(&mut self, op_code: OpCode, op_addr: u64, block_addr: u64) -> OpInfoHandle {
        if let Some(&idx) = self.index.get(&(op_code, op_addr)) {
            return OpInfoHandle(idx);
        }
        let idx = self.infos.len() as u32;
        self.infos.push(ShadowOpInfo::new(op_code, op_addr, block_addr));
        self.index.insert((op_code, op_addr), idx);
        OpInfoHandle(idx)
    }

    /// Borrow an op-info record.
    pub fn get(&self, handle: OpInfoHandle) -> &ShadowOpInfo {
        &self.infos[handle.0 as usize]
    }

    /// Mutably borrow an op-info record.
    pub fn get_mut(&mut self, handle: OpInfoHandle) -> &mut ShadowOpInfo {
        &mut self.infos[handle.0 as usize]
    }

    /// Iterate every op-info record observed so far, for report emission.
    pub fn iter(&self) -> impl Iterator<Item = (OpInfoHandle, &ShadowOpInfo)> {
        self.infos
            .iter()
            .enumerate()
            .map(|(i, info)| (OpInfoHandle(i as u32), info))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_op_and_addr_yields_same_handle() {
        let mut table = OpTable::new();
        let a = table.get_or_create(OpCode::Add, 0x1000, 0x0f00);
        let b = table.get_or_create(OpCode::Add, 0x1000, 0x0f00);
        assert_eq!(a, b);
    }

    #[test]
    fn different_addr_yields_different_handle() {
        let mut table = OpTable::new();
        let a = table.get_or_create(OpCode::Add, 0x1000, 0x0f00);
        let b = table.get_or_create(OpCode::Add, 0x1008, 0x0f00);
        assert_ne!(a, b);
    }
}
