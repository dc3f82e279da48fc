//! Symbolic expression tracking: per-trace value-ASTs, the generalized
//! cross-trace op-AST they fold into, and report rendering.

pub mod generalize;
pub mod op_ast;
pub mod report;
pub mod value_ast;

pub use generalize::generalize;
pub use op_ast::{
    convert,
    OpAstArena,
    OpAstId,
    OpAstNode,
};
pub use report::{
    build_report,
    ReportEntry,
};
pub use value_ast::ValueAstNode;
