//! Engine-wide error types.
//!
//! The spec's error-handling design draws a line between invariant
//! violations in the instrumenter/executor (the original tool's
//! `tl_assert` fail-fast aborts) and everything else (report-file I/O,
//! unrecognized client requests). [`Bug`] covers the former; [`EngineError`]
//! the latter. Neither is raised for a missing shadow on a read or for
//! NaN/Inf propagation — those are specified as non-errors.

use crate::ir::TempId;

/// What kind of internal invariant was violated. Each variant names the
/// specific check that failed, mirroring the `tl_assert2` messages in the
/// original instrumenter and executor.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BugVariant {
    /// A guest temp was read before ever being written in this block.
    #[error("temp {0:?} read before written")]
    UninitializedTemp(TempId),
    /// A `Temp <- Temp` copy's source and destination disagree on arity.
    #[error("temp arity mismatch: source has {source} blocks, dest expects {dest}")]
    TempArityMismatch {
        /// Arity of the source temp.
        source: usize,
        /// Arity the destination statement expected.
        dest: usize,
    },
    /// An op's declared argument count didn't match its `OpCode::arity()`.
    #[error("op {op_code} expects {expected} float args, got {actual}")]
    ArityMismatch {
        /// The op in question, rendered as text since `OpCode` lives in a
        /// lower layer than this error type.
        op_code: String,
        /// Arity the op code declares.
        expected: usize,
        /// Arguments actually supplied.
        actual: usize,
    },
    /// A block's debt list still named a temp after end-of-block cleanup
    /// ran, i.e. the same temp was debted twice or cleanup ran twice.
    #[error("temp {0:?} disowned twice from the block debt list")]
    DebtListDoubleFree(TempId),
    /// IR fed to the instrumenter was not in the flattened (one operation
    /// per statement) form it requires.
    #[error("guest IR block was not in flattened form")]
    NotFlattened,
}

/// An internal invariant violation: in the original tool these `tl_assert`
/// fail fast. A library has no tool-wide abort convention, so this port
/// surfaces them as a typed, propagated error instead — still effectively
/// fatal for the default embedding, which is free to `unwrap`/`expect` at
/// its own top level.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("herbshadow bug: {variant}")]
pub struct Bug {
    /// Which invariant was violated.
    pub variant: BugVariant,
}

impl Bug {
    /// Wrap a [`BugVariant`] into a [`Bug`].
    pub fn new(variant: BugVariant) -> Self {
        Bug { variant }
    }
}

impl From<BugVariant> for Bug {
    fn from(variant: BugVariant) -> Self {
        Bug::new(variant)
    }
}

/// Errors surfaced by the engine's outer shell: file I/O and the client
/// request dispatcher. Neither aborts the guest program.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The configured report file could not be opened for writing.
    /// Per the spec, this is reported to the diagnostic channel and the
    /// program otherwise continues cleanly — the engine just never writes
    /// a report.
    #[error("failed to open report file {path}: {source}")]
    ReportFileOpen {
        /// Path that failed to open.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Writing the report itself failed partway through.
    #[error("failed to write report: {0}")]
    ReportWrite(#[source] std::io::Error),
}

/// Convenience alias for fallible engine-internal operations.
pub type Result<T> = std::result::Result<T, Bug>;
