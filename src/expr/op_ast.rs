//! The generalized, cross-trace op expression tree.
//!
//! Every [`crate::op::ShadowOpInfo`] accumulates at most one [`OpAstId`],
//! pointing into a process-wide [`OpAstArena`]. The tree starts out as an
//! exact copy of the first trace's [`crate::expr::value_ast::ValueAstNode`]
//! and is only ever abstracted further (leaves collapse from constants to
//! variables, branches collapse to variables, variable groups split) by
//! [`crate::expr::generalize`] — never rebuilt from scratch, so the
//! abstraction only ever grows more permissive.

use std::rc::Rc;

use crate::op::{
    OpCode,
    OpInfoHandle,
    OpTable,
};

use super::value_ast::ValueAstNode;

/// Stable index into an [`OpAstArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpAstId(u32);

/// A node in the generalized op expression tree.
#[derive(Debug, Clone)]
pub enum OpAstNode {
    /// Every trace observed a different value here: fully abstracted.
    Variable,
    /// Every trace so far has produced this exact value.
    Constant(f64),
    /// Every trace so far has reached this position via the same op.
    Branch {
        /// The instruction this branch generalizes.
        op_info: OpInfoHandle,
        /// Which operation it performs.
        op_code: OpCode,
        /// Argument subtrees, in argument order; stable once created.
        args: Vec<OpAstId>,
        /// Partition of `args` into equivalence classes of positions that
        /// have so far always carried equal leaf values. Positions whose
        /// argument is itself a [`OpAstNode::Branch`] always form their own
        /// singleton class: subexpression identity, not flattened leaf
        /// values, is what's being compared there.
        var_groups: Vec<Vec<OpAstId>>,
    },
}

/// Owns every [`OpAstNode`] ever built, across every static op.
#[derive(Debug, Default)]
pub struct OpAstArena {
    nodes: Vec<OpAstNode>,
}

impl OpAstArena {
    /// An empty arena.
    pub fn new() -> Self {
        OpAstArena::default()
    }

    /// Borrow a node.
    pub fn get(&self, id: OpAstId) -> &OpAstNode {
        &self.nodes[id.0 as usize]
    }

    /// Mutably borrow a node.
    pub fn get_mut(&mut self, id: OpAstId) -> &mut OpAstNode {
        &mut self.nodes[id.0 as usize]
    }

    fn push(&mut self, node: OpAstNode) -> OpAstId {
        let id = OpAstId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }
}

/// Convert this trace's value-AST into the generalized op-AST, creating new
/// nodes the first time an op is seen and reusing (sharing) an already
/// generalized op's own expression whenever this trace's value came from an
/// op already recorded in `table`.
pub fn convert(arena: &mut OpAstArena, table: &mut OpTable, node: &Rc<ValueAstNode>) -> OpAstId {
    match &**node {
        ValueAstNode::Leaf { value } => arena.push(OpAstNode::Constant(*value)),
        ValueAstNode::Branch {
            op_info,
            op_code,
            args,
        } => {
            if let Some(existing) = table.get(*op_info).expr {
                return existing;
            }
            let arg_ids: Vec<OpAstId> = args.iter().map(|a| convert(arena, table, a)).collect();
            let var_groups = build_var_groups(args, &arg_ids);
            let id = arena.push(OpAstNode::Branch {
                op_info: *op_info,
                op_code: *op_code,
                args: arg_ids,
                var_groups,
            });
            table.get_mut(*op_info).expr = Some(id);
            id
        }
    }
}

/// Partition `arg_ids` into equivalence classes: two leaf positions land in
/// the same class iff their value-AST arguments are leaves with bit-equal
/// double values. Every branch-valued position gets its own singleton
/// class.
fn build_var_groups(val_args: &[Rc<ValueAstNode>], arg_ids: &[OpAstId]) -> Vec<Vec<OpAstId>> {
    let mut groups: Vec<Vec<OpAstId>> = Vec::new();
    let mut value_to_group: hashbrown::HashMap<u64, usize> = hashbrown::HashMap::new();
    for (val_arg, &id) in val_args.iter().zip(arg_ids) {
        match &**val_arg {
            ValueAstNode::Leaf { value } => {
                let key = value.to_bits();
                let gi = *value_to_group.entry(key).or_insert_with(|| {
                    groups.push(Vec::new());
                    groups.len() - 1
                });
                groups[gi].push(id);
            }
            ValueAstNode::Branch { .. } => {
                groups.push(vec![id]);
            }
        }
    }
    groups
}
