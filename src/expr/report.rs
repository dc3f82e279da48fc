//! Rendering generalized op-ASTs into the final error report.

use crate::consts::VARIABLE_NAMES;
use crate::op::{
    OpInfoHandle,
    OpTable,
};

use super::op_ast::{
    OpAstArena,
    OpAstId,
    OpAstNode,
};

/// One line of the final report: the op that was measured, its worst and
/// mean error in bits, and (when requested) its symbolic expression.
#[derive(Debug, Clone)]
pub struct ReportEntry {
    /// The op this entry describes.
    pub op: OpInfoHandle,
    /// Largest global error observed, in bits.
    pub max_error: f64,
    /// Mean global error observed, in bits.
    pub mean_error: f64,
    /// Rendered expression, if one was ever generalized for this op.
    pub expression: Option<String>,
}

/// Build the final sorted report, subexpression-suppressed when
/// `report_exprs` is enabled.
///
/// Ops whose generalized expression appears as a subtree of another
/// reported op's expression are suppressed: their contribution is already
/// visible in the larger expression, and the human-readable report reads
/// better without redundant single-op lines for every intermediate step.
/// When `report_exprs` is `false` this suppression is skipped and every op
/// with a generalized expression is reported, intermediate subexpressions
/// included.
pub fn build_report(arena: &OpAstArena, table: &OpTable, human_readable: bool, report_exprs: bool) -> Vec<ReportEntry> {
    let candidates: Vec<(OpInfoHandle, OpAstId)> = table
        .iter()
        .filter_map(|(handle, info)| info.expr.map(|id| (handle, id)))
        .collect();

    let roots: Vec<(OpInfoHandle, OpAstId)> = if report_exprs {
        candidates
            .iter()
            .copied()
            .filter(|&(handle, _)| {
                !candidates
                    .iter()
                    .any(|&(other, root)| other != handle && is_descendant(arena, handle, root))
            })
            .collect()
    } else {
        candidates.clone()
    };

    let mut entries: Vec<ReportEntry> = roots
        .into_iter()
        .map(|(handle, id)| {
            let info = table.get(handle);
            ReportEntry {
                op: handle,
                max_error: info.agg.global_error.max_error,
                mean_error: info.agg.global_error.mean_error(),
                expression: human_readable.then(|| render(arena, id)),
            }
        })
        .collect();

    entries.sort_by(|a, b| b.max_error.partial_cmp(&a.max_error).unwrap());
    entries
}

/// Does the subtree rooted at `root` contain a branch node for `needle`?
fn is_descendant(arena: &OpAstArena, needle: OpInfoHandle, root: OpAstId) -> bool {
    match arena.get(root) {
        OpAstNode::Branch { op_info, args, .. } => {
            *op_info == needle || args.iter().any(|&a| is_descendant(arena, needle, a))
        }
        _ => false,
    }
}

/// Render a node as an S-expression, e.g. `(+ x y)` or `(sin 0.500000)`.
pub fn render(arena: &OpAstArena, id: OpAstId) -> String {
    match arena.get(id) {
        OpAstNode::Constant(v) => format_const(*v),
        OpAstNode::Variable => "x".to_string(),
        OpAstNode::Branch {
            op_code,
            args,
            var_groups,
            ..
        } => {
            let mut s = format!("({}", op_code.symbol());
            for &a in args {
                s.push(' ');
                match arena.get(a) {
                    OpAstNode::Constant(v) => s.push_str(&format_const(*v)),
                    OpAstNode::Variable => s.push_str(name_for(var_groups, a)),
                    OpAstNode::Branch { .. } => s.push_str(&render(arena, a)),
                }
            }
            s.push(')');
            s
        }
    }
}

fn format_const(v: f64) -> String {
    format!("{:.6}", v)
}

fn name_for(var_groups: &[Vec<OpAstId>], id: OpAstId) -> &'static str {
    var_groups
        .iter()
        .position(|g| g.contains(&id))
        .map(|gi| VARIABLE_NAMES[gi % VARIABLE_NAMES.len()])
        .unwrap_or("x")
}

/// A parsed S-expression, used to check that rendering round-trips.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedExpr {
    /// A named variable leaf.
    Var(String),
    /// A constant leaf.
    Const(f64),
    /// An operator applied to its arguments.
    Branch(String, Vec<ParsedExpr>),
}

/// Parse a rendered expression back into a [`ParsedExpr`] tree.
pub fn parse(input: &str) -> Option<ParsedExpr> {
    let mut chars = input.trim().chars().peekable();
    let expr = parse_expr(&mut chars)?;
    Some(expr)
}

fn parse_expr(chars: &mut std::iter::Peekable<std::str::Chars>) -> Option<ParsedExpr> {
    skip_ws(chars);
    match chars.peek()? {
        '(' => {
            chars.next();
            skip_ws(chars);
            let op = parse_token(chars)?;
            let mut args = Vec::new();
            loop {
                skip_ws(chars);
                match chars.peek() {
                    Some(')') => {
                        chars.next();
                        break;
                    }
                    Some(_) => args.push(parse_expr(chars)?),
                    None => return None,
                }
            }
            Some(ParsedExpr::Branch(op, args))
        }
        _ => {
            let token = parse_token(chars)?;
            match token.parse::<f64>() {
                Ok(v) => Some(ParsedExpr::Const(v)),
                Err(_) => Some(ParsedExpr::Var(token)),
            }
        }
    }
}

fn parse_token(chars: &mut std::iter::Peekable<std::str::Chars>) -> Option<String> {
    let mut token = String::new();
    while let Some(&c) = chars.peek() {
        if c == '(' || c == ')' || c.is_whitespace() {
            break;
        }
        token.push(c);
        chars.next();
    }
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

fn skip_ws(chars: &mut std::iter::Peekable<std::str::Chars>) {
    while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
        chars.next();
    }
}

/// Structural equality up to variable renaming: two parsed expressions
/// match if they have the same shape and the same constants, treating
/// variable names as placeholders assigned in first-seen order.
pub fn alpha_equivalent(a: &ParsedExpr, b: &ParsedExpr) -> bool {
    let mut map = std::collections::HashMap::new();
    alpha_eq_inner(a, b, &mut map)
}

fn alpha_eq_inner<'a>(
    a: &'a ParsedExpr,
    b: &'a ParsedExpr,
    map: &mut std::collections::HashMap<&'a str, &'a str>,
) -> bool {
    match (a, b) {
        (ParsedExpr::Const(x), ParsedExpr::Const(y)) => x.to_bits() == y.to_bits(),
        (ParsedExpr::Var(x), ParsedExpr::Var(y)) => match map.get(x.as_str()) {
            Some(mapped) => *mapped == y.as_str(),
            None => {
                map.insert(x.as_str(), y.as_str());
                true
            }
        },
        (ParsedExpr::Branch(op_a, args_a), ParsedExpr::Branch(op_b, args_b)) => {
            op_a == op_b
                && args_a.len() == args_b.len()
                && args_a
                    .iter()
                    .zip(args_b)
                    .all(|(x, y)| alpha_eq_inner(x, y, map))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::value_ast::ValueAstNode;
    use crate::op::OpCode;

    #[test]
    fn renders_two_distinct_leaves_as_x_y() {
        let mut arena = OpAstArena::new();
        let mut table = OpTable::new();
        let op = table.get_or_create(OpCode::Add, 0x1, 0x0);
        let val = ValueAstNode::branch(
            op,
            OpCode::Add,
            vec![ValueAstNode::leaf(1.0), ValueAstNode::leaf(2.0)],
        );
        let id = super::super::op_ast::convert(&mut arena, &mut table, &val);
        assert_eq!(render(&arena, id), "(+ x y)");
    }

    #[test]
    fn renders_repeated_leaf_as_single_name() {
        let mut arena = OpAstArena::new();
        let mut table = OpTable::new();
        let op = table.get_or_create(OpCode::Add, 0x1, 0x0);
        let leaf = ValueAstNode::leaf(3.0);
        let val = ValueAstNode::branch(op, OpCode::Add, vec![leaf.clone(), leaf]);
        let id = super::super::op_ast::convert(&mut arena, &mut table, &val);
        assert_eq!(render(&arena, id), "(+ x x)");
    }

    #[test]
    fn round_trips_through_parse() {
        let parsed = parse("(+ x y)").unwrap();
        let expected = ParsedExpr::Branch(
            "+".into(),
            vec![ParsedExpr::Var("x".into()), ParsedExpr::Var("y".into())],
        );
        assert!(alpha_equivalent(&parsed, &expected));
    }

    #[test]
    fn alpha_equivalence_ignores_variable_spelling() {
        let a = parse("(+ x y)").unwrap();
        let b = parse("(+ a b)").unwrap();
        assert!(alpha_equivalent(&a, &b));
    }

    #[test]
    fn alpha_equivalence_respects_repetition() {
        let a = parse("(+ x x)").unwrap();
        let b = parse("(+ a b)").unwrap();
        assert!(!alpha_equivalent(&a, &b));
    }

    #[test]
    fn parses_constants() {
        let parsed = parse("(sin 0.500000)").unwrap();
        match parsed {
            ParsedExpr::Branch(op, args) => {
                assert_eq!(op, "sin");
                assert_eq!(args, vec![ParsedExpr::Const(0.5)]);
            }
            _ => panic!(),
        }
    }
}
