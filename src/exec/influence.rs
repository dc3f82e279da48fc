//! Influence sets: the ops whose local error contributed meaningfully to a
//! downstream shadow value.

use crate::op::OpInfoHandle;

/// A deduplicated list of ops that contributed significant local error to a
/// value, propagated alongside it through every subsequent operation.
#[derive(Debug, Clone, Default)]
pub struct InfluenceSet {
    ops: Vec<OpInfoHandle>,
}

impl InfluenceSet {
    /// An empty influence set.
    pub fn new() -> Self {
        InfluenceSet::default()
    }

    /// Ops named by this set.
    pub fn ops(&self) -> &[OpInfoHandle] {
        &self.ops
    }

    /// Add `op` to the set if it is not already present.
    pub fn insert(&mut self, op: OpInfoHandle) {
        if !self.ops.contains(&op) {
            self.ops.push(op);
        }
    }

    /// Union of `self` with every influence in `other`.
    pub fn union(&mut self, other: &InfluenceSet) {
        for &op in &other.ops {
            self.insert(op);
        }
    }

    /// Build the union of several argument influence sets, optionally
    /// tagging the result with the op whose local error just exceeded
    /// threshold.
    pub fn combine(args: &[Option<&InfluenceSet>], tag: Option<OpInfoHandle>) -> Option<Self> {
        let mut result = InfluenceSet::new();
        for arg in args.iter().flatten() {
            result.union(arg);
        }
        if let Some(op) = tag {
            result.insert(op);
        }
        if result.ops.is_empty() {
            None
        } else {
            Some(result)
        }
    }
}
