//! The guest intermediate representation the instrumenter consumes.
//!
//! The host dynamic-recompilation framework that produces these blocks is
//! an external collaborator (per `spec.md` section 1) — this module gives
//! its IR a concrete enough shape (mirroring VEX's `IRSB`/`IRTemp`/`IRExpr`)
//! that [`crate::ir::instrument`] can be implemented and tested standalone.

pub mod instrument;
pub mod status;

use crate::op::OpCode;
use crate::real::FloatKind;

/// Index of a guest IR temporary within its enclosing block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
#[display(fmt = "t{}", _0)]
pub struct TempId(pub u32);

/// Byte offset into the modeled guest register file (TS).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
#[display(fmt = "ts+{:#x}", _0)]
pub struct TsOffset(pub u32);

/// The guest-IR type of a temp or expression result. Only the float kinds
/// carry shadow state; everything else passes through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrType {
    /// Non-floating-point value of some width; the instrumenter never
    /// shadows these.
    NonFloat,
    /// 32-bit IEEE float.
    F32,
    /// 64-bit IEEE float.
    F64,
    /// Four packed 32-bit floats (128-bit SIMD).
    V128F32x4,
    /// Two packed 64-bit floats (128-bit SIMD).
    V128F64x2,
}

impl IrType {
    /// Number of 4-byte float blocks this type occupies, or 0 for
    /// non-float types.
    pub const fn blocks(self) -> usize {
        match self {
            IrType::NonFloat => 0,
            IrType::F32 => 1,
            IrType::F64 => 2,
            IrType::V128F32x4 | IrType::V128F64x2 => 4,
        }
    }

    /// Whether this type carries shadow state at all.
    pub const fn is_float(self) -> bool {
        !matches!(self, IrType::NonFloat)
    }

    /// Which [`FloatKind`] this type shadows at, and how many SIMD
    /// channels (operand lanes) it carries — 1 for a scalar float/double,
    /// or the lane count for a packed type. `None` for non-float types.
    pub const fn float_kind_and_channels(self) -> Option<(FloatKind, usize)> {
        match self {
            IrType::NonFloat => None,
            IrType::F32 => Some((FloatKind::Single, 1)),
            IrType::F64 => Some((FloatKind::Double, 1)),
            IrType::V128F32x4 => Some((FloatKind::Single, 4)),
            IrType::V128F64x2 => Some((FloatKind::Double, 2)),
        }
    }
}

/// A literal constant operand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal {
    /// Non-float constant; instrumentation ignores its bit pattern.
    NonFloat,
    /// Constant single-precision float.
    F32(f32),
    /// Constant double-precision float.
    F64(f64),
}

/// A guest IR expression, flattened so each statement performs at most one
/// operation (the instrumenter's `NotFlattened` bug fires on nested
/// expressions it wasn't built to walk).
#[derive(Debug, Clone)]
pub enum Expr {
    /// A literal constant.
    Const(Literal),
    /// Read of a previously written temp.
    RdTmp(TempId),
    /// Read of the register file at a statically known offset.
    Get {
        /// Byte offset into TS.
        offset: TsOffset,
        /// Type of the value read.
        ty: IrType,
    },
    /// Read of the register file at a dynamically computed offset into an
    /// array of `len` elements of `elem_ty`, based at `descr_offset` with
    /// index `idx + bias`.
    GetI {
        /// Base byte offset of the array.
        descr_offset: TsOffset,
        /// Index temp, added to `bias` and reduced modulo the array
        /// length before indexing.
        idx: TempId,
        /// Constant bias added to `idx`.
        bias: i32,
        /// Number of elements in the array.
        len: u32,
        /// Element type.
        elem_ty: IrType,
    },
    /// Memory load at a dynamically computed address.
    Load {
        /// Address temp.
        addr: TempId,
        /// Type of the loaded value.
        ty: IrType,
    },
    /// If-then-else selecting between two already-computed temps.
    Ite {
        /// Guard temp (non-float).
        cond: TempId,
        /// Value when `cond` is true.
        then_temp: TempId,
        /// Value when `cond` is false.
        else_temp: TempId,
    },
    /// Unary float op (`neg`, `abs`, `sqrt`, ...).
    Unop {
        /// Which operation.
        op: OpCode,
        /// Operand temp.
        arg: TempId,
    },
    /// Binary float op (`add`, `sub`, `mul`, `div`, ...).
    Binop {
        /// Which operation.
        op: OpCode,
        /// Operand temps.
        args: [TempId; 2],
    },
    /// Ternary float op (`fma`).
    Triop {
        /// Which operation.
        op: OpCode,
        /// Operand temps.
        args: [TempId; 3],
    },
    /// A non-float-producing helper call; instrumentation passes through
    /// without shadowing.
    CCall,
}

/// A guest IR statement.
#[derive(Debug, Clone)]
pub enum Stmt {
    /// No-op padding statement.
    NoOp,
    /// Instruction-boundary marker.
    IMark {
        /// Address of the marked instruction.
        addr: u64,
    },
    /// ABI hint (e.g. stack redzone); shadow-transparent.
    AbiHint,
    /// Memory-bus-event marker; shadow-transparent.
    Mbe,
    /// Write the register file at a statically known offset.
    Put {
        /// Destination offset.
        offset: TsOffset,
        /// Value to write.
        data: Expr,
    },
    /// Write the register file at a dynamically computed offset.
    PutI {
        /// Base byte offset of the array.
        descr_offset: TsOffset,
        /// Index temp.
        idx: TempId,
        /// Constant bias added to `idx`.
        bias: i32,
        /// Number of elements in the array.
        len: u32,
        /// Element type.
        elem_ty: IrType,
        /// Value to write.
        data: Expr,
    },
    /// Assign a temp's value.
    WrTmp {
        /// Destination temp.
        temp: TempId,
        /// Destination type (needed before the defining expression has
        /// been evaluated for shadow-status bookkeeping).
        ty: IrType,
        /// Defining expression.
        expr: Expr,
    },
    /// Unconditional memory store.
    Store {
        /// Address temp.
        addr: TempId,
        /// Value to store.
        data: Expr,
        /// Type of the stored value.
        ty: IrType,
    },
    /// Guarded memory store.
    StoreG {
        /// Guard temp.
        guard: TempId,
        /// Address temp.
        addr: TempId,
        /// Value to store.
        data: Expr,
        /// Type of the stored value.
        ty: IrType,
    },
    /// Guarded memory load into a temp (the unconditional form is a
    /// `WrTmp` over `Expr::Load`).
    LoadG {
        /// Destination temp.
        dest: TempId,
        /// Guard temp.
        guard: TempId,
        /// Address temp.
        addr: TempId,
        /// Value used when the guard is false.
        alt: TempId,
        /// Type of the loaded value.
        ty: IrType,
    },
    /// Compare-and-swap; never produces floats, shadow pass-through.
    Cas,
    /// Load-linked/store-conditional; never produces floats.
    Llsc,
    /// Helper-function call with side effects outside the modeled state;
    /// shadow pass-through.
    Dirty,
    /// Conditional block exit.
    Exit {
        /// Guard temp.
        guard: TempId,
    },
}

/// One guest block: a flat sequence of statements plus the type of every
/// temp it declares, mirroring VEX's `IRSB` + `IRTypeEnv`.
#[derive(Debug, Clone, Default)]
pub struct Block {
    /// Address of the block's first instruction, for `ShadowOpInfo`
    /// bookkeeping.
    pub addr: u64,
    /// Statements in program order.
    pub stmts: Vec<Stmt>,
    /// Type of each temp, indexed by `TempId::0`.
    pub temp_types: Vec<IrType>,
}

impl Block {
    /// Type of a temp, or `None` if out of range.
    pub fn temp_type(&self, temp: TempId) -> Option<IrType> {
        self.temp_types.get(temp.0 as usize).copied()
    }
}
