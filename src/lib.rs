//! Shadow-value engine for dynamic floating-point accuracy instrumentation.
//!
//! This crate is the core of a dynamic binary instrumentation tool: it
//! runs alongside a dynamic-recompilation host, rewrites each translated
//! guest block to carry an arbitrary-precision "shadow" computation beside
//! the concrete float computation, and at program exit reports the
//! expressions responsible for the largest divergence between the two.
//!
//! The dynamic-recompilation host itself, the arbitrary-precision real
//! library's bignum internals (beyond the [`real::Real`] wrapper), and the
//! libm interception mechanism are external collaborators named through
//! [`host`] traits and [`ir::instrument::GuestState`], not designed here.
//!
//! [`engine::Engine`] is the facade an embedder drives: instrument blocks
//! as the host translates them, dispatch client requests as the guest
//! program issues them, and finish to emit the report.

#![deny(unsafe_code)]
#![deny(unused_must_use)]
#![warn(missing_docs)]

pub mod config;
pub mod consts;
pub mod engine;
pub mod error;
pub mod exec;
pub mod expr;
pub mod host;
pub mod ir;
pub mod op;
pub mod real;
pub mod report;
pub mod requests;
pub mod shadow;
pub mod value;

pub mod prelude {
    //! Commonly used types for embedders driving the engine.
    pub use crate::config::{
        Config,
        ReportFormat,
    };
    pub use crate::engine::Engine;
    pub use crate::error::{
        Bug,
        BugVariant,
        EngineError,
    };
    pub use crate::host::{
        DebugInfo,
        FixedThread,
        NullDebugInfo,
        RunningThread,
        ThreadId,
    };
    pub use crate::ir::instrument::GuestState;
    pub use crate::ir::{
        Block,
        Expr,
        IrType,
        Literal,
        Stmt,
        TempId,
        TsOffset,
    };
    pub use crate::op::OpCode;
    pub use crate::requests::{
        ClientRequest,
        RequestOutcome,
    };
}
