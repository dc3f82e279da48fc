//! Folding a new trace's value-AST into an already-generalized op-AST.
//!
//! Generalization only ever abstracts further: a [`OpAstNode::Constant`]
//! that disagrees with the new trace becomes a [`OpAstNode::Variable`], a
//! [`OpAstNode::Branch`] whose op no longer matches becomes a `Variable`,
//! and `var_groups` only ever splits, never merges. Once a position is a
//! `Variable` it stays one forever, so the set of traces an op-AST "accepts"
//! only grows over time.

use std::rc::Rc;

use super::op_ast::{
    OpAstArena,
    OpAstId,
    OpAstNode,
};
use super::value_ast::ValueAstNode;

/// Fold `val` — this trace's value-AST for the value that previously built
/// (or last generalized) `id` — into the op-AST rooted at `id`.
pub fn generalize(arena: &mut OpAstArena, id: OpAstId, val: &Rc<ValueAstNode>) {
    let diverged = match (arena.get(id), &**val) {
        (OpAstNode::Constant(c), ValueAstNode::Leaf { value }) => value.to_bits() != c.to_bits(),
        (OpAstNode::Constant(_), ValueAstNode::Branch { .. }) => true,
        (OpAstNode::Variable, _) => false,
        (OpAstNode::Branch { op_info, .. }, ValueAstNode::Branch { op_info: val_op, .. }) => {
            val_op != op_info
        }
        (OpAstNode::Branch { .. }, ValueAstNode::Leaf { .. }) => true,
    };

    if diverged {
        if !matches!(arena.get(id), OpAstNode::Variable) {
            *arena.get_mut(id) = OpAstNode::Variable;
        }
        return;
    }

    if let OpAstNode::Branch { .. } = arena.get(id) {
        let (child_ids, val_args) = match (arena.get(id), &**val) {
            (OpAstNode::Branch { args, .. }, ValueAstNode::Branch { args: val_args, .. }) => {
                (args.clone(), val_args.clone())
            }
            _ => unreachable!("checked above"),
        };
        for (child_id, child_val) in child_ids.iter().zip(val_args.iter()) {
            generalize(arena, *child_id, child_val);
        }
        regeneralize_var_groups(arena, id, &val_args);
    }
}

/// Re-partition `id`'s `var_groups` against this trace's argument values,
/// splitting any existing group whose members no longer carry equal leaf
/// values. Groups never merge back together: monotonicity requires that
/// once two positions are known to differ, they stay distinguished.
fn regeneralize_var_groups(arena: &mut OpAstArena, id: OpAstId, val_args: &[Rc<ValueAstNode>]) {
    let (arg_ids, old_groups) = match arena.get(id) {
        OpAstNode::Branch {
            args, var_groups, ..
        } => (args.clone(), var_groups.clone()),
        _ => unreachable!(),
    };

    let position_of = |needle: OpAstId| arg_ids.iter().position(|&a| a == needle);
    let value_at = |pos: usize| match &*val_args[pos] {
        ValueAstNode::Leaf { value } => Some(*value),
        ValueAstNode::Branch { .. } => None,
    };

    let mut new_groups: Vec<Vec<OpAstId>> = Vec::new();
    for group in old_groups {
        let mut buckets: Vec<(Option<u64>, Vec<OpAstId>)> = Vec::new();
        for member in group {
            let key = position_of(member).and_then(value_at).map(f64::to_bits);
            match buckets.iter_mut().find(|(k, _)| *k == key) {
                Some((_, members)) => members.push(member),
                None => buckets.push((key, vec![member])),
            }
        }
        new_groups.extend(buckets.into_iter().map(|(_, members)| members));
    }

    if let OpAstNode::Branch { var_groups, .. } = arena.get_mut(id) {
        *var_groups = new_groups;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::op_ast::convert;
    use crate::op::{
        OpCode,
        OpTable,
    };

    #[test]
    fn constant_disagreement_becomes_variable() {
        let mut arena = OpAstArena::new();
        let id = arena_push_constant(&mut arena, 1.0);
        generalize(&mut arena, id, &ValueAstNode::leaf(2.0));
        assert!(matches!(arena.get(id), OpAstNode::Variable));
    }

    #[test]
    fn constant_agreement_stays_constant() {
        let mut arena = OpAstArena::new();
        let id = arena_push_constant(&mut arena, 1.0);
        generalize(&mut arena, id, &ValueAstNode::leaf(1.0));
        assert!(matches!(arena.get(id), OpAstNode::Constant(v) if *v == 1.0));
    }

    #[test]
    fn variable_is_a_sink() {
        let mut arena = OpAstArena::new();
        let id = arena_push_constant(&mut arena, 1.0);
        generalize(&mut arena, id, &ValueAstNode::leaf(2.0));
        generalize(&mut arena, id, &ValueAstNode::leaf(1.0));
        assert!(matches!(arena.get(id), OpAstNode::Variable));
    }

    #[test]
    fn differing_op_collapses_branch_to_variable() {
        let mut arena = OpAstArena::new();
        let mut table = OpTable::new();
        let add = table.get_or_create(OpCode::Add, 0x10, 0x0);
        let sub = table.get_or_create(OpCode::Sub, 0x20, 0x0);
        let first = ValueAstNode::branch(
            add,
            OpCode::Add,
            vec![ValueAstNode::leaf(1.0), ValueAstNode::leaf(2.0)],
        );
        let id = convert(&mut arena, &mut table, &first);
        let second = ValueAstNode::branch(
            sub,
            OpCode::Sub,
            vec![ValueAstNode::leaf(1.0), ValueAstNode::leaf(2.0)],
        );
        generalize(&mut arena, id, &second);
        assert!(matches!(arena.get(id), OpAstNode::Variable));
    }

    #[test]
    fn var_groups_split_when_values_diverge() {
        let mut arena = OpAstArena::new();
        let mut table = OpTable::new();
        let op = table.get_or_create(OpCode::Add, 0x10, 0x0);
        let leaf = ValueAstNode::leaf(5.0);
        let first = ValueAstNode::branch(op, OpCode::Add, vec![leaf.clone(), leaf]);
        let id = convert(&mut arena, &mut table, &first);
        match arena.get(id) {
            OpAstNode::Branch { var_groups, .. } => assert_eq!(var_groups.len(), 1),
            _ => panic!(),
        }

        let second = ValueAstNode::branch(
            op,
            OpCode::Add,
            vec![ValueAstNode::leaf(5.0), ValueAstNode::leaf(6.0)],
        );
        generalize(&mut arena, id, &second);
        match arena.get(id) {
            OpAstNode::Branch { var_groups, .. } => assert_eq!(var_groups.len(), 2),
            _ => panic!(),
        }
    }

    #[test]
    fn var_groups_never_remerge() {
        let mut arena = OpAstArena::new();
        let mut table = OpTable::new();
        let op = table.get_or_create(OpCode::Add, 0x10, 0x0);
        let first = ValueAstNode::branch(
            op,
            OpCode::Add,
            vec![ValueAstNode::leaf(5.0), ValueAstNode::leaf(6.0)],
        );
        let id = convert(&mut arena, &mut table, &first);

        let coincidentally_equal = ValueAstNode::branch(
            op,
            OpCode::Add,
            vec![ValueAstNode::leaf(7.0), ValueAstNode::leaf(7.0)],
        );
        generalize(&mut arena, id, &coincidentally_equal);
        match arena.get(id) {
            OpAstNode::Branch { var_groups, .. } => assert_eq!(var_groups.len(), 2),
            _ => panic!(),
        }
    }

    fn arena_push_constant(arena: &mut OpAstArena, value: f64) -> OpAstId {
        let mut table = OpTable::new();
        let leaf = ValueAstNode::leaf(value);
        convert(arena, &mut table, &leaf)
    }
}
