//! Engine configuration: every option named in `spec.md` section 6, plus
//! defaults matching the original tool's published ones. CLI/option parsing
//! itself stays an external collaborator (an embedder constructs `Config`
//! however it likes); this struct is just the settled, typed surface.

/// How the final report is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// `<expr>\n<op> in <fn> at <file>:<line> (address <hex>)\n...` blocks.
    Human,
    /// One parenthesized S-expression line per op.
    SExpr,
}

/// Every tunable named in the specification's External Interfaces section.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// Suppress ops whose generalized expression is a subtree of another
    /// reported op ("subexpression suppression").
    pub report_exprs: bool,
    /// Human-readable vs. S-expression report rendering.
    pub human_readable: bool,
    /// Trace every shadow-temp/shadow-value move to the diagnostic
    /// channel. Corresponds to the original's `print_moves`.
    pub print_moves: bool,
    /// Trace each op's computed/shadowed argument values.
    pub print_inputs: bool,
    /// Trace local/global error as each op executes.
    pub print_errors: bool,
    /// Track separate positive/negative input ranges per operand instead
    /// of one combined range.
    pub detailed_ranges: bool,
    /// Disable the pure-zero-multiplication short-circuit.
    pub dont_ignore_pure_zeroes: bool,
    /// Disable shadow real-valued computation entirely (concrete-only
    /// pass-through); exists in the original as an escape hatch for
    /// isolating instrumentation overhead from shadow-computation cost.
    pub no_reals: bool,
    /// Enable the add/sub compensation short-circuit.
    pub compensation_detection: bool,
    /// Track per-argument input ranges at all (independent of whether they
    /// are split by sign).
    pub use_ranges: bool,
    /// Annotate report addresses with their containing object file.
    pub print_object_files: bool,
    /// Local/global error, in bits, above which symbolic expression
    /// tracking and influence propagation fire for an op.
    pub error_threshold: f64,
    /// Trace each op's symbolic operator and argument value identities.
    pub print_semantic_ops: bool,
    /// Trace op-AST generalization as each trace folds in.
    pub print_expr_updates: bool,
    /// Two-character tag a `ClientRequest`'s first argument must carry to
    /// be recognized as belonging to this tool.
    pub tool_tag: [u8; 2],
    /// Path the final report is written to, if any. `None` disables report
    /// emission (useful for embedding the engine purely for its
    /// aggregates).
    pub report_path: Option<std::path::PathBuf>,
}

impl Config {
    /// The report format implied by `human_readable`.
    pub fn report_format(&self) -> ReportFormat {
        if self.human_readable {
            ReportFormat::Human
        } else {
            ReportFormat::SExpr
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            report_exprs: true,
            human_readable: true,
            print_moves: false,
            print_inputs: false,
            print_errors: false,
            detailed_ranges: false,
            dont_ignore_pure_zeroes: false,
            no_reals: false,
            compensation_detection: true,
            use_ranges: false,
            print_object_files: false,
            error_threshold: 1.0,
            print_semantic_ops: false,
            print_expr_updates: false,
            tool_tag: crate::consts::TOOL_TAG,
            report_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_report_format_is_human() {
        assert_eq!(Config::default().report_format(), ReportFormat::Human);
    }

    #[test]
    fn human_readable_false_selects_sexpr() {
        let cfg = Config {
            human_readable: false,
            ..Config::default()
        };
        assert_eq!(cfg.report_format(), ReportFormat::SExpr);
    }
}
