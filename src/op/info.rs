//! The per-static-instruction record and its aggregated statistics.

use crate::expr::op_ast::OpAstId;
use strum::{
    Display,
    EnumIter,
};

/// Transcendental and library-style operations shadowed through the
/// `PERFORM_OP`/`PERFORM_OPF` client requests, i.e. the ones the libm
/// replacement mechanism intercepts rather than ones the guest IR encodes
/// natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Display)]
#[strum(serialize_all = "lowercase")]
pub enum WrappedOp {
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Atan2,
    Sinh,
    Cosh,
    Tanh,
    Exp,
    Log,
    Log2,
    Log10,
    Pow,
}

/// Identifies which computation a [`ShadowOpInfo`] shadows: either a native
/// guest-IR float op (the common case, instrumented statically by
/// [`crate::ir::instrument`]) or a wrapped libm call / user-defined special
/// op arriving dynamically through a client request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    /// `a + b`
    Add,
    /// `a - b`
    Sub,
    /// `a * b`
    Mul,
    /// `a / b`
    Div,
    /// `-a`
    Neg,
    /// `|a|`
    Abs,
    /// `sqrt(a)`
    Sqrt,
    /// `a * b + c`, rounded once.
    Fma,
    /// A libm-style call shadowed via `PERFORM_OP`/`PERFORM_OPF`.
    Wrapped(WrappedOp),
    /// A user-defined binary op shadowed via `PERFORM_SPECIAL_OP`,
    /// identified by the opaque id the client program passed.
    Special(u32),
}

impl OpCode {
    /// Number of float arguments this op code takes.
    pub const fn arity(self) -> usize {
        match self {
            OpCode::Neg | OpCode::Abs | OpCode::Sqrt => 1,
            OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div | OpCode::Special(_) => 2,
            OpCode::Fma => 3,
            OpCode::Wrapped(w) => match w {
                WrappedOp::Atan2 | WrappedOp::Pow => 2,
                _ => 1,
            },
        }
    }

    /// The symbol used when rendering this op in a symbolic expression,
    /// e.g. `(+ x y)` vs `(sin x)`.
    pub fn symbol(self) -> &'static str {
        match self {
            OpCode::Add => "+",
            OpCode::Sub => "-",
            OpCode::Mul => "*",
            OpCode::Div => "/",
            OpCode::Neg => "neg",
            OpCode::Abs => "abs",
            OpCode::Sqrt => "sqrt",
            OpCode::Fma => "fma",
            OpCode::Wrapped(w) => wrapped_symbol(w),
            OpCode::Special(_) => "special",
        }
    }

    /// A word-form name for this op, used as the `plain-name` field of the
    /// S-expression report format (distinct from [`OpCode::symbol`], which
    /// favors infix operators like `+` for the rendered expression itself).
    pub fn plain_name(self) -> &'static str {
        match self {
            OpCode::Add => "add",
            OpCode::Sub => "sub",
            OpCode::Mul => "mul",
            OpCode::Div => "div",
            OpCode::Neg => "neg",
            OpCode::Abs => "abs",
            OpCode::Sqrt => "sqrt",
            OpCode::Fma => "fma",
            OpCode::Wrapped(w) => wrapped_symbol(w),
            OpCode::Special(_) => "special",
        }
    }
}

fn wrapped_symbol(op: WrappedOp) -> &'static str {
    match op {
        WrappedOp::Sin => "sin",
        WrappedOp::Cos => "cos",
        WrappedOp::Tan => "tan",
        WrappedOp::Asin => "asin",
        WrappedOp::Acos => "acos",
        WrappedOp::Atan => "atan",
        WrappedOp::Atan2 => "atan2",
        WrappedOp::Sinh => "sinh",
        WrappedOp::Cosh => "cosh",
        WrappedOp::Tanh => "tanh",
        WrappedOp::Exp => "exp",
        WrappedOp::Log => "log",
        WrappedOp::Log2 => "log2",
        WrappedOp::Log10 => "log10",
        WrappedOp::Pow => "pow",
    }
}

/// Running max/mean error tracker. `num_evals` is assumed never to overflow
/// a 64-bit counter in a realistic run, per the original's implicit
/// saturating-double accumulation.
#[derive(Debug, Clone, Copy)]
pub struct ErrorAggregate {
    /// Largest error (in bits) observed so far, or `-1.0` if never updated.
    pub max_error: f64,
    /// Sum of all observed errors, for computing the running mean.
    pub total_error: f64,
    /// Number of times this aggregate has been updated.
    pub num_evals: u64,
}

impl Default for ErrorAggregate {
    fn default() -> Self {
        ErrorAggregate {
            max_error: -1.0,
            total_error: 0.0,
            num_evals: 0,
        }
    }
}

impl ErrorAggregate {
    /// Fold a freshly observed error (in bits) into the running statistics,
    /// returning the error that was just recorded.
    pub fn record(&mut self, error_bits: f64) -> f64 {
        if error_bits > self.max_error {
            self.max_error = error_bits;
        }
        self.total_error += error_bits;
        self.num_evals += 1;
        error_bits
    }

    /// Mean error across every recorded evaluation.
    pub fn mean_error(&self) -> f64 {
        if self.num_evals == 0 {
            0.0
        } else {
            self.total_error / (self.num_evals as f64)
        }
    }
}

/// Observed min/max of one operand across every evaluation of an op,
/// optionally split by sign when `detailed_ranges` is enabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct RangeRecord {
    /// Range over non-negative observations (or all observations, when
    /// ranges are not split by sign).
    pub positive: Range,
    /// Range over negative observations, populated only when
    /// `detailed_ranges` is set.
    pub negative: Option<Range>,
}

impl RangeRecord {
    /// Record one observed operand value.
    pub fn update(&mut self, value: f64, detailed: bool) {
        if detailed && value < 0.0 {
            self.negative.get_or_insert_with(Range::unset).extend(value);
        } else {
            self.positive.extend(value);
        }
    }
}

/// A simple observed min/max interval.
#[derive(Debug, Clone, Copy)]
pub struct Range {
    /// Smallest value observed, or `f64::INFINITY` if none yet.
    pub min: f64,
    /// Largest value observed, or `f64::NEG_INFINITY` if none yet.
    pub max: f64,
}

impl Range {
    fn unset() -> Self {
        Range {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    fn extend(&mut self, value: f64) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }
}

impl Default for Range {
    fn default() -> Self {
        Range::unset()
    }
}

/// Local error (against concrete-args-evaluated-in-reals) and global error
/// (against the true concrete result), plus per-argument observed ranges.
#[derive(Debug, Clone)]
pub struct Aggregate {
    /// Error between the shadow result and the concrete result.
    pub global_error: ErrorAggregate,
    /// Error between the shadow result and what the concrete op would
    /// produce if its inputs were exact.
    pub local_error: ErrorAggregate,
    /// One [`RangeRecord`] per float argument position.
    pub input_ranges: Vec<RangeRecord>,
}

impl Aggregate {
    /// A fresh, empty aggregate sized for `nargs` float arguments.
    pub fn new(nargs: usize) -> Self {
        Aggregate {
            global_error: ErrorAggregate::default(),
            local_error: ErrorAggregate::default(),
            input_ranges: vec![RangeRecord::default(); nargs],
        }
    }
}

/// A source location resolved through the host's debug-info collaborator.
#[derive(Debug, Clone)]
pub struct SourceLoc {
    /// Enclosing function name.
    pub function: String,
    /// Source file path, if known.
    pub file: Option<String>,
    /// Source line, if known.
    pub line: Option<u32>,
}

/// The per-static-instruction record: exactly one per `(op_code, op_addr)`
/// pair, kept in a process-wide [`crate::op::table::OpTable`].
#[derive(Debug, Clone)]
pub struct ShadowOpInfo {
    /// Which computation this instruction performs.
    pub op_code: OpCode,
    /// Address of the instruction itself.
    pub op_addr: u64,
    /// Address of the enclosing block, for diagnostics.
    pub block_addr: u64,
    /// The generalized op-AST accumulated across every trace of this
    /// instruction, once at least one trace has been observed.
    pub expr: Option<OpAstId>,
    /// Aggregated error and range statistics.
    pub agg: Aggregate,
}

impl ShadowOpInfo {
    /// A freshly created info record with empty aggregates.
    pub fn new(op_code: OpCode, op_addr: u64, block_addr: u64) -> Self {
        ShadowOpInfo {
            op_code,
            op_addr,
            block_addr,
            expr: None,
            agg: Aggregate::new(op_code.arity()),
        }
    }
}
