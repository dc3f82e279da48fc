//! Shadow values: the reference-counted real-precision counterpart to a
//! concrete float produced or consumed by the guest program.

pub mod pool;

use std::rc::Rc;

use crate::exec::influence::InfluenceSet;
use crate::expr::value_ast::ValueAstNode;
use crate::real::{
    FloatKind,
    Real,
};

/// Handle to a [`ShadowValue`] living in a [`pool::Pool`]. Stable across
/// recycling: a handle is only valid between the `make_*` call that
/// returned it and the matching `disown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
#[display(fmt = "v{}", _0)]
pub struct ValueHandle(pub(crate) u32);

impl ValueHandle {
    /// Construct a handle directly, for tests that need one without going
    /// through a full [`pool::Pool`].
    #[cfg(test)]
    pub fn for_test(idx: u32) -> Self {
        ValueHandle(idx)
    }
}

/// A single shadowed float: an arbitrary-precision real, the kind of
/// concrete float it mirrors, the symbolic expression that produced it (if
/// any), the set of ops whose local error it carries forward, and a
/// reference count.
///
/// Invariant: `ref_count >= 1` for the lifetime of any live value; mutation
/// of `real`/`expr` after `ref_count` has exceeded 1 is forbidden by
/// convention — every operator allocates a fresh result value instead of
/// mutating a shared one.
#[derive(Debug)]
pub struct ShadowValue {
    /// The shadowed arbitrary-precision value.
    pub real: Real,
    /// Which concrete precision this value mirrors.
    pub kind: FloatKind,
    /// The per-trace expression node that produced this value, if it came
    /// from a shadowed op rather than a leaf fabrication.
    pub expr: Option<Rc<ValueAstNode>>,
    /// Ops whose local error contributed meaningfully to this value.
    pub influences: Option<InfluenceSet>,
    ref_count: u32,
}

impl ShadowValue {
    pub(crate) fn new(kind: FloatKind, real: Real) -> Self {
        ShadowValue {
            real,
            kind,
            expr: None,
            influences: None,
            ref_count: 1,
        }
    }

    /// Current reference count.
    pub fn ref_count(&self) -> u32 {
        self.ref_count
    }

    fn reset(&mut self, kind: FloatKind, real: Real) {
        self.real = real;
        self.kind = kind;
        self.expr = None;
        self.influences = None;
        self.ref_count = 1;
    }
}
