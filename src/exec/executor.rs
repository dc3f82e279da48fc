//! The shadow-op executor (C4): runtime dispatch for instrumented float
//! ops. Performs the real-valued computation, computes local and global
//! error against the concrete computation, and builds/updates the
//! symbolic expression and influence set.

use std::rc::Rc;

use crate::config::Config;
use crate::expr::{
    generalize,
    op_ast,
    OpAstArena,
    ValueAstNode,
};
use crate::ir::IrType;
use crate::op::{
    ulp_error,
    OpCode,
    OpInfoHandle,
    OpTable,
};
use crate::real::{
    FloatKind,
    Real,
};
use crate::shadow::temp::ShadowTemp;
use crate::value::pool::Pool;
use crate::value::ValueHandle;
use crate::exec::influence::InfluenceSet;

/// Where one operand of a shadow op comes from.
#[derive(Debug, Clone, Copy)]
pub enum ArgSource {
    /// No shadow temp at all — either a constant IR operand (the
    /// original's temp index -1) or a live temp whose slot happened to be
    /// null. Every block is fabricated fresh from the concrete bytes and
    /// disowned again once the op completes.
    Constant,
    /// An existing shadow temp. Missing blocks within it are still
    /// fabricated (never an error, per the spec's "missing shadow on a
    /// read" rule), but the temp as a whole survives the op and the
    /// caller is expected to write the (possibly now more complete)
    /// temp back wherever it came from.
    Temp(ShadowTemp),
}

/// Resolve every argument to a concrete, fully-populated [`ShadowTemp`],
/// fabricating any missing block from its captured concrete value. Returns
/// the resolved temps; `args` is updated in place so the caller can write
/// newly fabricated `Temp` blocks back into the owning container.
fn resolve_args(
    pool: &mut Pool,
    kind: FloatKind,
    blocks: usize,
    args: &mut [ArgSource],
    concrete_args: &[[f64; 4]],
) -> Vec<ShadowTemp> {
    args.iter_mut()
        .enumerate()
        .map(|(i, arg)| {
            let mut temp = match arg {
                ArgSource::Constant => ShadowTemp::empty(blocks),
                ArgSource::Temp(t) => *t,
            };
            for b in 0..blocks {
                if temp.get(b).is_none() && is_operand_block(kind, b) {
                    let handle = pool.make_value(kind, concrete_args[i][channel_of(kind, b)]);
                    temp.set(b, Some(handle));
                }
            }
            if let ArgSource::Temp(slot) = arg {
                *slot = temp;
            }
            temp
        })
        .collect()
}

/// Whether block `b` is one this kind actually computes on. A `Double`
/// occupies two 4-byte blocks per channel but only the first carries a
/// value; the second is always null, per the spec's TS invariant.
fn is_operand_block(kind: FloatKind, b: usize) -> bool {
    match kind {
        FloatKind::Single => true,
        FloatKind::Double => b % 2 == 0,
    }
}

/// Which SIMD channel block `b` belongs to.
fn channel_of(kind: FloatKind, b: usize) -> usize {
    match kind {
        FloatKind::Single => b,
        FloatKind::Double => b / 2,
    }
}

/// Apply `op_code` to `args` (already real-valued) in arbitrary-precision
/// real arithmetic. Transcendentals/user ops arriving through client
/// requests rather than native IR ops re-round the host's own `f64`
/// evaluation instead of computing their own high-precision reference,
/// per the spec's description of the libm-replacement collaborator.
pub fn execute_real_op(op_code: OpCode, args: &[&Real], concrete_result: f64, kind: FloatKind) -> Real {
    match op_code {
        OpCode::Add => args[0].add(args[1]),
        OpCode::Sub => args[0].sub(args[1]),
        OpCode::Mul => args[0].mul(args[1]),
        OpCode::Div => args[0].div(args[1]),
        OpCode::Neg => args[0].neg(),
        OpCode::Abs => args[0].abs(),
        OpCode::Sqrt => args[0].sqrt(),
        OpCode::Fma => args[0].fma(args[1], args[2]),
        OpCode::Wrapped(_) | OpCode::Special(_) => Real::apply_f64(kind, concrete_result),
    }
}

/// Execute one static float op over every SIMD channel of `ty`, producing
/// its result shadow temp. Mirrors `executeShadowOp`/`executeChannelShadowOp`
/// in the original tool, collapsed into one call since this port has no
/// separate argument-temp-allocation pass.
#[allow(clippy::too_many_arguments)]
pub fn execute_shadow_op(
    pool: &mut Pool,
    table: &mut OpTable,
    arena: &mut OpAstArena,
    config: &Config,
    info: OpInfoHandle,
    op_code: OpCode,
    ty: IrType,
    args: &mut [ArgSource],
    concrete_args: &[[f64; 4]],
    concrete_result: [f64; 4],
) -> ShadowTemp {
    let (kind, channels) = ty
        .float_kind_and_channels()
        .expect("execute_shadow_op called on a non-float result type");
    let blocks = ty.blocks();
    let resolved = resolve_args(pool, kind, blocks, args, concrete_args);

    let mut result = ShadowTemp::empty(blocks);
    for c in 0..channels {
        let block = match kind {
            FloatKind::Single => c,
            FloatKind::Double => c * 2,
        };
        let handle = execute_channel(
            pool,
            table,
            arena,
            config,
            info,
            op_code,
            kind,
            &resolved,
            block,
            concrete_args,
            concrete_result[c],
        );
        result.set(block, Some(handle));
    }

    for (arg, source) in resolved.iter().zip(args.iter()) {
        if matches!(source, ArgSource::Constant) {
            for b in 0..blocks {
                if let Some(h) = arg.get(b) {
                    pool.disown(h);
                }
            }
        }
    }

    result
}

#[allow(clippy::too_many_arguments)]
fn execute_channel(
    pool: &mut Pool,
    table: &mut OpTable,
    arena: &mut OpAstArena,
    config: &Config,
    info: OpInfoHandle,
    op_code: OpCode,
    kind: FloatKind,
    args: &[ShadowTemp],
    block: usize,
    concrete_args: &[[f64; 4]],
    concrete_result: f64,
) -> ValueHandle {
    let channel = channel_of(kind, block);
    let handles: Vec<ValueHandle> = args.iter().map(|a| a.get(block).expect("operand block fabricated above")).collect();
    let channel_concrete: Vec<f64> = concrete_args.iter().map(|row| row[channel]).collect();

    if !config.dont_ignore_pure_zeroes
        && !config.no_reals
        && op_code == OpCode::Mul
        && is_pure_zero_mul(pool, &handles, &channel_concrete)
    {
        let result = pool.make_value(kind, 0.0);
        return result;
    }

    let real_handle = pool.make_bare(kind);
    {
        let reals: Vec<Real> = handles.iter().map(|h| pool.get(*h).real.clone()).collect();
        let refs: Vec<&Real> = reals.iter().collect();
        let real = if config.no_reals {
            Real::from_f64(kind, concrete_result)
        } else {
            execute_real_op(op_code, &refs, concrete_result, kind)
        };
        pool.get_mut(real_handle).real = real;
    }

    let local_error = if config.no_reals {
        0.0
    } else {
        let concrete_reals: Vec<Real> = channel_concrete.iter().map(|&v| Real::from_f64(kind, v)).collect();
        let concrete_refs: Vec<&Real> = concrete_reals.iter().collect();
        let local_reference = execute_real_op(op_code, &concrete_refs, concrete_result, kind);
        ulp_error(&pool.get(real_handle).real, local_reference.get_double())
    };
    let global_error = ulp_error(&pool.get(real_handle).real, concrete_result);

    {
        let info_rec = table.get_mut(info);
        info_rec.agg.local_error.record(local_error);
        info_rec.agg.global_error.record(global_error);
        if config.use_ranges {
            for (i, &v) in channel_concrete.iter().enumerate() {
                info_rec.agg.input_ranges[i].update(v, config.detailed_ranges);
            }
        }
    }

    let value_ast = if global_error > config.error_threshold {
        let arg_nodes: Vec<Rc<ValueAstNode>> = handles
            .iter()
            .zip(channel_concrete.iter())
            .map(|(h, &concrete)| {
                pool.get(*h)
                    .expr
                    .clone()
                    .unwrap_or_else(|| ValueAstNode::leaf(concrete))
            })
            .collect();
        Some(ValueAstNode::branch(info, op_code, arg_nodes))
    } else {
        None
    };

    if let Some(val_ast) = &value_ast {
        let existing = table.get(info).expr;
        match existing {
            None => {
                op_ast::convert(arena, table, val_ast);
            }
            Some(id) => generalize::generalize(arena, id, val_ast),
        }
    }
    pool.get_mut(real_handle).expr = value_ast.or_else(|| Some(ValueAstNode::leaf(concrete_result)));

    let compensated = if config.compensation_detection && !config.no_reals {
        try_compensate(pool, op_code, &handles, &channel_concrete, real_handle, concrete_result)
    } else {
        None
    };

    let influences = compensated.unwrap_or_else(|| {
        let influence_refs: Vec<Option<&InfluenceSet>> =
            handles.iter().map(|h| pool.get(*h).influences.as_ref()).collect();
        let tag = (local_error >= config.error_threshold).then_some(info);
        InfluenceSet::combine(&influence_refs, tag)
    });
    pool.get_mut(real_handle).influences = influences;

    real_handle
}

/// Pure-zero multiplication short-circuit: either operand is concretely
/// zero and the other operand's shadow real is not NaN.
fn is_pure_zero_mul(pool: &Pool, handles: &[ValueHandle], concrete: &[f64]) -> bool {
    if handles.len() != 2 {
        return false;
    }
    let other_not_nan = |i: usize| !pool.get(handles[i]).real.is_nan();
    (concrete[0] == 0.0 && other_not_nan(1)) || (concrete[1] == 0.0 && other_not_nan(0))
}

/// Add/sub compensation short-circuit: an operand is exactly zero in the
/// reals and the output's ULP error doesn't exceed that operand's own
/// input error. On success, returns the surviving operand's cloned
/// influence set (callers use this in place of the normal union); `None`
/// otherwise, signalling the caller should fall back to normal influence
/// propagation.
fn try_compensate(
    pool: &Pool,
    op_code: OpCode,
    handles: &[ValueHandle],
    concrete: &[f64],
    result: ValueHandle,
    concrete_result: f64,
) -> Option<Option<InfluenceSet>> {
    if handles.len() != 2 || !matches!(op_code, OpCode::Add | OpCode::Sub) {
        return None;
    }
    let zero_operand = if op_code == OpCode::Add && pool.get(handles[0]).real.get_double() == 0.0 {
        Some(1)
    } else if pool.get(handles[1]).real.get_double() == 0.0 {
        Some(0)
    } else {
        None
    }?;
    let input_error = ulp_error(&pool.get(handles[zero_operand]).real, concrete[zero_operand]);
    let output_error = ulp_error(&pool.get(result).real, concrete_result);
    if output_error <= input_error {
        Some(pool.get(handles[zero_operand]).influences.clone())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::{
        OpCode,
        OpTable,
    };

    fn setup() -> (Pool, OpTable, OpAstArena, Config) {
        (Pool::new(), OpTable::new(), OpAstArena::new(), Config::default())
    }

    #[test]
    fn single_add_reports_nonzero_error_and_two_variables() {
        let (mut pool, mut table, mut arena, config) = setup();
        let info = table.get_or_create(OpCode::Add, 0x100, 0x0);
        let a = pool.make_value(FloatKind::Double, 1e20);
        let b = pool.make_value(FloatKind::Double, 1.0);
        let mut args = [ArgSource::Temp(temp_of(a)), ArgSource::Temp(temp_of(b))];
        let concrete_args = [[1e20, 0.0, 0.0, 0.0], [1.0, 0.0, 0.0, 0.0]];
        let concrete_result = [1e20_f64 + 1.0, 0.0, 0.0, 0.0]; // native f64, loses the +1
        let result = execute_shadow_op(
            &mut pool,
            &mut table,
            &mut arena,
            &config,
            info,
            OpCode::Add,
            IrType::F64,
            &mut args,
            &concrete_args,
            concrete_result,
        );
        let rv = pool.get(result.get(0).unwrap());
        assert!(rv.real.get_double() != concrete_result[0] || table.get(info).agg.global_error.max_error >= 0.0);
        assert!(table.get(info).expr.is_some(), "error should exceed threshold and register an expression");
    }

    #[test]
    fn fused_same_value_assigns_one_variable_group() {
        let (mut pool, mut table, mut arena, config) = setup();
        let info = table.get_or_create(OpCode::Add, 0x200, 0x0);
        let a = pool.make_value(FloatKind::Double, 3.14);
        let mut args = [ArgSource::Temp(temp_of(a)), ArgSource::Temp(temp_of(a))];
        pool.own(a);
        let concrete_args = [[3.14, 0.0, 0.0, 0.0], [3.14, 0.0, 0.0, 0.0]];
        let concrete_result = [3.14_f64 + 3.14 + 1e-10, 0.0, 0.0, 0.0];
        let _ = execute_shadow_op(
            &mut pool,
            &mut table,
            &mut arena,
            &config,
            info,
            OpCode::Add,
            IrType::F64,
            &mut args,
            &concrete_args,
            concrete_result,
        );
        if let Some(id) = table.get(info).expr {
            if let crate::expr::OpAstNode::Branch { var_groups, .. } = arena.get(id) {
                assert_eq!(var_groups.len(), 1);
            }
        }
    }

    #[test]
    fn pure_zero_mul_accrues_no_error_and_no_influences() {
        let (mut pool, mut table, mut arena, config) = setup();
        let info = table.get_or_create(OpCode::Mul, 0x300, 0x0);
        let zero = pool.make_value(FloatKind::Double, 0.0);
        let x = pool.make_value(FloatKind::Double, 7.5);
        let mut args = [ArgSource::Temp(temp_of(zero)), ArgSource::Temp(temp_of(x))];
        let concrete_args = [[0.0, 0.0, 0.0, 0.0], [7.5, 0.0, 0.0, 0.0]];
        let concrete_result = [0.0, 0.0, 0.0, 0.0];
        let result = execute_shadow_op(
            &mut pool,
            &mut table,
            &mut arena,
            &config,
            info,
            OpCode::Mul,
            IrType::F64,
            &mut args,
            &concrete_args,
            concrete_result,
        );
        let rv = pool.get(result.get(0).unwrap());
        assert_eq!(rv.real.get_double(), 0.0);
        assert!(rv.influences.is_none());
        assert_eq!(table.get(info).agg.global_error.num_evals, 0);
    }

    fn temp_of(h: ValueHandle) -> ShadowTemp {
        let mut t = ShadowTemp::empty(2);
        t.set(0, Some(h));
        t
    }
}
