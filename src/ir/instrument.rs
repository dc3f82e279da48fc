//! The IR instrumenter (C3): a three-valued static dataflow walk over a
//! guest block that drives the shadow containers (C2) and the executor
//! (C4) in lockstep.
//!
//! The original tool splits "instrument" (emit side-effecting calls into a
//! translated block, at dynamic-recompilation time) from "execute" (run
//! those calls, at guest run time). This port has no recompilation backend
//! to emit into, so the two phases collapse into one: [`instrument_block`]
//! walks a block's statements once, consulting the host's concrete state
//! through [`GuestState`] for the operand bytes C4 needs, and drives the
//! containers directly. Every status computation ("is this slot currently
//! shadowed") still happens exactly where the original computes it
//! statically, so a reader comparing the two will find the same shape.

use crate::config::Config;
use crate::error::{
    Bug,
    BugVariant,
};
use crate::exec::executor::{
    execute_shadow_op,
    ArgSource,
};
use crate::expr::OpAstArena;
use crate::ir::status::Status;
use crate::ir::{
    Block,
    Expr,
    IrType,
    Literal,
    Stmt,
    TempId,
    TsOffset,
};
use crate::op::OpTable;
use crate::shadow::temp::ShadowTemp;
use crate::shadow::Containers;
use crate::value::pool::Pool;

/// The host's concrete (non-shadow) view of the executing guest, supplied
/// per block. In the original this is the dynamic-recompilation framework's
/// own register/memory model; here it is named but not designed, per the
/// specification's external-collaborator boundary.
pub trait GuestState {
    /// The concrete channel values a temp holds, zero-padded past `ty`'s
    /// channel count.
    fn temp_channels(&self, temp: TempId, ty: IrType) -> [f64; 4];
    /// The concrete channel values currently in the register file at
    /// `offset`.
    fn register_channels(&self, offset: TsOffset, ty: IrType) -> [f64; 4];
    /// The concrete channel values currently in memory at `addr`.
    fn memory_channels(&self, addr: u64, ty: IrType) -> [f64; 4];
    /// The boolean value of a non-float guard temp.
    fn guard(&self, temp: TempId) -> bool;
    /// The integer value of a non-float index temp.
    fn index_value(&self, temp: TempId) -> i64;
    /// The memory address a non-float address temp currently holds.
    fn address_value(&self, temp: TempId) -> u64;
}

/// Everything [`instrument_block`] needs besides the block and host state,
/// bundled so the entry point doesn't take an unwieldy argument list.
pub struct Engine<'a> {
    pub containers: &'a mut Containers,
    pub pool: &'a mut Pool,
    pub table: &'a mut OpTable,
    pub arena: &'a mut OpAstArena,
    pub config: &'a Config,
}

fn ts_index(offset: TsOffset) -> usize {
    offset.0 as usize / crate::consts::TS_SLOT_BYTES
}

fn expr_type(expr: &Expr, block: &Block) -> IrType {
    match expr {
        Expr::Const(Literal::NonFloat) => IrType::NonFloat,
        Expr::Const(Literal::F32(_)) => IrType::F32,
        Expr::Const(Literal::F64(_)) => IrType::F64,
        Expr::RdTmp(t) => block.temp_type(*t).unwrap_or(IrType::NonFloat),
        _ => IrType::NonFloat,
    }
}

/// Walk `block`, maintaining a fresh per-block temp-status map and a
/// persistent-across-the-call TS-status map (scoped to this one block per
/// the "no interprocedural flow" invariant — `ts_status` is always
/// reallocated at block entry, never carried from a previous block).
///
/// A `running_depth` of zero makes every side effect in this walk a no-op,
/// matching the `BEGIN`/`END` client-request bracketing described in the
/// specification's concurrency model.
pub fn instrument_block(
    block: &Block,
    guest: &dyn GuestState,
    engine: &mut Engine,
    running_depth: u32,
) -> Result<(), Bug> {
    if running_depth == 0 {
        return Ok(());
    }

    engine.containers.temps.reset(block.temp_types.len());
    let mut temp_status = vec![Status::Unshadowed; block.temp_types.len()];
    let mut ts_status = vec![Status::Unknown; crate::consts::TS_SIZE_BYTES / crate::consts::TS_SLOT_BYTES];
    // Tracks the address of the instruction currently being translated, so
    // that `ShadowOpInfo`s for different instructions sharing a block don't
    // collide on the same `op_addr`. Updated by `IMark`, the same way the
    // host's own instruction-boundary markers delimit one guest instruction
    // from the next within a block.
    let mut current_addr = block.addr;

    for stmt in &block.stmts {
        match stmt {
            Stmt::NoOp | Stmt::AbiHint | Stmt::Mbe | Stmt::Cas | Stmt::Llsc | Stmt::Dirty => {}
            Stmt::IMark { addr } => {
                current_addr = *addr;
            }
            Stmt::Put { offset, data } => {
                instrument_put(block, *offset, data, &mut ts_status, &temp_status, guest, engine)?;
            }
            Stmt::PutI {
                descr_offset,
                idx,
                bias,
                len,
                elem_ty,
                data,
            } => {
                let addr = dynamic_array_offset(*descr_offset, guest.index_value(*idx), *bias, *len, *elem_ty);
                instrument_put(block, addr, data, &mut ts_status, &temp_status, guest, engine)?;
                mark_unknown(&mut ts_status, addr, elem_ty.blocks());
            }
            Stmt::WrTmp { temp, ty, expr } => {
                instrument_wr_tmp(block, *temp, *ty, expr, current_addr, &mut temp_status, &ts_status, guest, engine)?;
            }
            Stmt::Store { addr, data, ty } => {
                let address = guest.address_value(*addr);
                instrument_store(address, data, *ty, &temp_status, engine)?;
            }
            Stmt::StoreG { guard, addr, data, ty } => {
                if guest.guard(*guard) {
                    let address = guest.address_value(*addr);
                    instrument_store(address, data, *ty, &temp_status, engine)?;
                }
            }
            Stmt::LoadG {
                dest,
                guard,
                addr,
                alt,
                ty,
            } => {
                if guest.guard(*guard) {
                    let address = guest.address_value(*addr);
                    load_into_temp(*dest, address, *ty, &mut temp_status, guest, engine);
                } else {
                    copy_temp(*dest, *alt, block, &mut temp_status, engine);
                }
            }
            Stmt::Exit { guard } => {
                if guest.guard(*guard) {
                    disown_debt(engine);
                    return Ok(());
                }
            }
        }
    }

    disown_debt(engine);
    Ok(())
}

fn mark_unknown(ts_status: &mut [Status], base: TsOffset, blocks: usize) {
    for i in 0..blocks {
        ts_status[ts_index(base) + i] = Status::Unknown;
    }
}

fn meet_range(ts_status: &[Status], base: TsOffset, blocks: usize) -> Status {
    (0..blocks)
        .map(|i| ts_status[ts_index(base) + i])
        .reduce(Status::meet)
        .unwrap_or(Status::Unknown)
}

fn dynamic_array_offset(descr_offset: TsOffset, idx: i64, bias: i32, len: u32, elem_ty: IrType) -> TsOffset {
    let wrapped = (idx + i64::from(bias)).rem_euclid(i64::from(len));
    let elem_bytes = (elem_ty.blocks() * crate::consts::TS_SLOT_BYTES) as u32;
    TsOffset(descr_offset.0 + (wrapped as u32) * elem_bytes)
}

fn instrument_wr_tmp(
    block: &Block,
    dest: TempId,
    ty: IrType,
    expr: &Expr,
    op_addr: u64,
    temp_status: &mut [Status],
    ts_status: &[Status],
    guest: &dyn GuestState,
    engine: &mut Engine,
) -> Result<(), Bug> {
    match expr {
        Expr::Const(_) => {
            temp_status[dest.0 as usize] = Status::Unshadowed;
        }
        Expr::RdTmp(src) => {
            copy_temp(dest, *src, block, temp_status, engine);
        }
        Expr::Ite { cond, then_temp, else_temp } => {
            let joined = Status::meet(temp_status[then_temp.0 as usize], temp_status[else_temp.0 as usize]);
            let src = if guest.guard(*cond) { *then_temp } else { *else_temp };
            copy_temp(dest, src, block, temp_status, engine);
            temp_status[dest.0 as usize] = joined;
        }
        Expr::Get { offset, ty } => {
            let status = meet_range(ts_status, *offset, ty.blocks());
            build_temp_from_registers(dest, *offset, *ty, status, temp_status, guest, engine);
        }
        Expr::GetI {
            descr_offset,
            idx,
            bias,
            len,
            elem_ty,
        } => {
            let addr = dynamic_array_offset(*descr_offset, guest.index_value(*idx), *bias, *len, *elem_ty);
            build_temp_from_registers(dest, addr, *elem_ty, Status::Unknown, temp_status, guest, engine);
        }
        Expr::Load { addr, ty } => {
            let address = guest.address_value(*addr);
            load_into_temp(dest, address, *ty, temp_status, guest, engine);
        }
        Expr::Unop { op, arg } => {
            dispatch_float_op(block, dest, ty, *op, &[*arg], op_addr, temp_status, guest, engine)?;
        }
        Expr::Binop { op, args } => {
            dispatch_float_op(block, dest, ty, *op, args, op_addr, temp_status, guest, engine)?;
        }
        Expr::Triop { op, args } => {
            dispatch_float_op(block, dest, ty, *op, args, op_addr, temp_status, guest, engine)?;
        }
        Expr::CCall => {
            temp_status[dest.0 as usize] = Status::Unshadowed;
        }
    }
    Ok(())
}

fn dispatch_float_op(
    block: &Block,
    dest: TempId,
    ty: IrType,
    op: crate::op::OpCode,
    args: &[TempId],
    op_addr: u64,
    temp_status: &mut [Status],
    guest: &dyn GuestState,
    engine: &mut Engine,
) -> Result<(), Bug> {
    if !ty.is_float() {
        temp_status[dest.0 as usize] = Status::Unshadowed;
        return Ok(());
    }
    if args.len() != op.arity() {
        return Err(Bug::from(BugVariant::ArityMismatch {
            op_code: format!("{:?}", op),
            expected: op.arity(),
            actual: args.len(),
        }));
    }

    let mut concrete_args: Vec<[f64; 4]> = Vec::with_capacity(args.len());
    let mut sources: Vec<ArgSource> = Vec::with_capacity(args.len());
    for &arg in args {
        let arg_ty = block.temp_type(arg).unwrap_or(ty);
        concrete_args.push(guest.temp_channels(arg, arg_ty));
        match engine.containers.temps.load(arg) {
            Some(temp) => sources.push(ArgSource::Temp(temp)),
            None => sources.push(ArgSource::Constant),
        }
    }
    let concrete_result = guest.temp_channels(dest, ty);
    let block_addr = block.addr;
    let info = engine.table.get_or_create(op, op_addr, block_addr);

    let result = execute_shadow_op(
        engine.pool,
        engine.table,
        engine.arena,
        engine.config,
        info,
        op,
        ty,
        &mut sources,
        &concrete_args,
        concrete_result,
    );
    engine.containers.temps.store(dest, result);
    temp_status[dest.0 as usize] = Status::Shadowed;
    Ok(())
}

fn copy_temp(dest: TempId, src: TempId, block: &Block, temp_status: &mut [Status], engine: &mut Engine) {
    temp_status[dest.0 as usize] = temp_status[src.0 as usize];
    let fallback_arity = || block.temp_type(dest).map(IrType::blocks).unwrap_or(1).max(1);
    if temp_status[src.0 as usize] == Status::Unshadowed {
        engine.containers.temps.store(dest, ShadowTemp::empty(fallback_arity()));
        return;
    }
    match engine.containers.temps.load(src) {
        Some(temp) => {
            for h in temp.iter().flatten() {
                engine.pool.own(h);
            }
            engine.containers.temps.store(dest, temp);
        }
        None => {
            engine.containers.temps.store(dest, ShadowTemp::empty(fallback_arity()));
        }
    }
}

fn build_temp_from_registers(
    dest: TempId,
    offset: TsOffset,
    ty: IrType,
    status: Status,
    temp_status: &mut [Status],
    guest: &dyn GuestState,
    engine: &mut Engine,
) {
    temp_status[dest.0 as usize] = status;
    if status == Status::Unshadowed {
        engine.containers.temps.store(dest, ShadowTemp::empty(ty.blocks().max(1)));
        return;
    }
    let concrete = guest.register_channels(offset, ty);
    let mut result = ShadowTemp::empty(ty.blocks());
    for i in 0..ty.blocks() {
        let byte_offset = TsOffset(offset.0 + (i * crate::consts::TS_SLOT_BYTES) as u32);
        let handle = match engine.containers.registers.get(byte_offset) {
            Some(h) => {
                engine.pool.own(h);
                h
            }
            None => {
                let kind = ty.float_kind_and_channels().map(|(k, _)| k).unwrap_or(crate::real::FloatKind::Single);
                engine.pool.make_value(kind, concrete[i])
            }
        };
        result.set(i, Some(handle));
    }
    engine.containers.temps.store(dest, result);
}

fn load_into_temp(
    dest: TempId,
    addr: u64,
    ty: IrType,
    temp_status: &mut [Status],
    guest: &dyn GuestState,
    engine: &mut Engine,
) {
    temp_status[dest.0 as usize] = Status::Unknown;
    let concrete = guest.memory_channels(addr, ty);
    let mut result = ShadowTemp::empty(ty.blocks());
    for i in 0..ty.blocks() {
        let unit_addr = addr + (i * crate::consts::TS_SLOT_BYTES) as u64;
        let handle = match engine.containers.memory.get(unit_addr) {
            Some(h) => {
                engine.pool.own(h);
                h
            }
            None => {
                let kind = ty.float_kind_and_channels().map(|(k, _)| k).unwrap_or(crate::real::FloatKind::Single);
                engine.pool.make_value(kind, concrete[i])
            }
        };
        result.set(i, Some(handle));
    }
    engine.containers.temps.store(dest, result);
}

fn instrument_put(
    block: &Block,
    offset: TsOffset,
    data: &Expr,
    ts_status: &mut [Status],
    temp_status: &[Status],
    guest: &dyn GuestState,
    engine: &mut Engine,
) -> Result<(), Bug> {
    let ty = expr_type(data, block);
    if !ty.is_float() {
        return Ok(());
    }
    let blocks = ty.blocks();

    for i in 0..blocks {
        let byte_offset = TsOffset(offset.0 + (i * crate::consts::TS_SLOT_BYTES) as u32);
        if let Some(prev) = engine.containers.registers.get(byte_offset) {
            engine.pool.disown(prev);
            engine.containers.registers.set(byte_offset, None);
        }
    }

    match data {
        Expr::Const(_) => {
            for i in 0..blocks {
                ts_status[ts_index(offset) + i] = Status::Unshadowed;
            }
            Ok(())
        }
        Expr::RdTmp(src) => {
            let src_status = temp_status[src.0 as usize];
            for i in 0..blocks {
                ts_status[ts_index(offset) + i] = src_status;
            }
            if src_status == Status::Unshadowed {
                return Ok(());
            }
            if let Some(temp) = engine.containers.temps.load(*src) {
                for i in 0..blocks {
                    if let Some(h) = temp.get(i) {
                        engine.pool.own(h);
                        let byte_offset = TsOffset(offset.0 + (i * crate::consts::TS_SLOT_BYTES) as u32);
                        engine.containers.registers.set(byte_offset, Some(h));
                    }
                }
            }
            Ok(())
        }
        _ => Err(Bug::from(BugVariant::NotFlattened)),
    }
}

fn instrument_store(
    addr: u64,
    data: &Expr,
    ty: IrType,
    temp_status: &[Status],
    engine: &mut Engine,
) -> Result<(), Bug> {
    if !ty.is_float() {
        return Ok(());
    }
    let blocks = ty.blocks();

    for i in 0..blocks {
        let unit_addr = addr + (i * crate::consts::TS_SLOT_BYTES) as u64;
        if let Some(prev) = engine.containers.memory.get(unit_addr) {
            engine.pool.disown(prev);
            engine.containers.memory.set(unit_addr, None);
        }
    }

    match data {
        Expr::Const(_) => Ok(()),
        Expr::RdTmp(src) => {
            let src_status = temp_status[src.0 as usize];
            if src_status == Status::Unshadowed {
                return Ok(());
            }
            if let Some(temp) = engine.containers.temps.load(*src) {
                for i in 0..blocks {
                    if let Some(h) = temp.get(i) {
                        engine.pool.own(h);
                        let unit_addr = addr + (i * crate::consts::TS_SLOT_BYTES) as u64;
                        engine.containers.memory.set(unit_addr, Some(h));
                    }
                }
            }
            Ok(())
        }
        _ => Err(Bug::from(BugVariant::NotFlattened)),
    }
}

fn disown_debt(engine: &mut Engine) {
    let debt: Vec<TempId> = engine.containers.temps.debt().to_vec();
    for temp_id in debt {
        if let Some(temp) = engine.containers.temps.load(temp_id) {
            for h in temp.iter().flatten() {
                engine.pool.disown(h);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{
        Expr,
        Literal,
        Stmt,
    };
    use crate::op::OpCode;

    struct FixedState {
        temp_vals: std::collections::HashMap<u32, [f64; 4]>,
        reg_vals: std::collections::HashMap<u32, [f64; 4]>,
    }

    impl GuestState for FixedState {
        fn temp_channels(&self, temp: TempId, _ty: IrType) -> [f64; 4] {
            self.temp_vals.get(&temp.0).copied().unwrap_or([0.0; 4])
        }
        fn register_channels(&self, offset: TsOffset, _ty: IrType) -> [f64; 4] {
            self.reg_vals.get(&offset.0).copied().unwrap_or([0.0; 4])
        }
        fn memory_channels(&self, _addr: u64, _ty: IrType) -> [f64; 4] {
            [0.0; 4]
        }
        fn guard(&self, _temp: TempId) -> bool {
            true
        }
        fn index_value(&self, _temp: TempId) -> i64 {
            0
        }
        fn address_value(&self, _temp: TempId) -> u64 {
            0x1000
        }
    }

    fn setup() -> (Containers, Pool, OpTable, OpAstArena, Config) {
        (Containers::new(), Pool::new(), OpTable::new(), OpAstArena::new(), Config::default())
    }

    #[test]
    fn single_add_dispatches_a_shadow_op_and_marks_dest_shadowed() {
        let (mut containers, mut pool, mut table, mut arena, config) = setup();
        let block = Block {
            addr: 0x4000,
            stmts: vec![
                Stmt::WrTmp {
                    temp: TempId(0),
                    ty: IrType::F64,
                    expr: Expr::Const(Literal::F64(1e20)),
                },
                Stmt::WrTmp {
                    temp: TempId(1),
                    ty: IrType::F64,
                    expr: Expr::Const(Literal::F64(1.0)),
                },
                Stmt::WrTmp {
                    temp: TempId(2),
                    ty: IrType::F64,
                    expr: Expr::Binop {
                        op: OpCode::Add,
                        args: [TempId(0), TempId(1)],
                    },
                },
            ],
            temp_types: vec![IrType::F64, IrType::F64, IrType::F64],
        };
        let mut temp_vals = std::collections::HashMap::new();
        temp_vals.insert(0, [1e20, 0.0, 0.0, 0.0]);
        temp_vals.insert(1, [1.0, 0.0, 0.0, 0.0]);
        temp_vals.insert(2, [1e20_f64 + 1.0, 0.0, 0.0, 0.0]);
        let guest = FixedState {
            temp_vals,
            reg_vals: Default::default(),
        };

        let mut engine = Engine {
            containers: &mut containers,
            pool: &mut pool,
            table: &mut table,
            arena: &mut arena,
            config: &config,
        };
        instrument_block(&block, &guest, &mut engine, 1).expect("instrumentation succeeds");

        assert_eq!(table.iter().count(), 1);
        let (_, info) = table.iter().next().unwrap();
        assert!(info.agg.global_error.num_evals >= 1);
    }

    #[test]
    fn zero_running_depth_is_a_pure_no_op() {
        let (mut containers, mut pool, mut table, mut arena, config) = setup();
        let block = Block {
            addr: 0x100,
            stmts: vec![Stmt::WrTmp {
                temp: TempId(0),
                ty: IrType::NonFloat,
                expr: Expr::Const(Literal::NonFloat),
            }],
            temp_types: vec![IrType::NonFloat],
        };
        let guest = FixedState {
            temp_vals: Default::default(),
            reg_vals: Default::default(),
        };
        let mut engine = Engine {
            containers: &mut containers,
            pool: &mut pool,
            table: &mut table,
            arena: &mut arena,
            config: &config,
        };
        instrument_block(&block, &guest, &mut engine, 0).expect("no-op succeeds");
        assert_eq!(pool.stats().live, 0);
    }

    #[test]
    fn put_then_get_round_trips_through_registers() {
        let (mut containers, mut pool, mut table, mut arena, config) = setup();
        let block = Block {
            addr: 0x200,
            stmts: vec![
                Stmt::WrTmp {
                    temp: TempId(0),
                    ty: IrType::F64,
                    expr: Expr::Const(Literal::F64(2.5)),
                },
                Stmt::Put {
                    offset: TsOffset(64),
                    data: Expr::RdTmp(TempId(0)),
                },
                Stmt::WrTmp {
                    temp: TempId(1),
                    ty: IrType::F64,
                    expr: Expr::Get {
                        offset: TsOffset(64),
                        ty: IrType::F64,
                    },
                },
            ],
            temp_types: vec![IrType::F64, IrType::F64],
        };
        let mut temp_vals = std::collections::HashMap::new();
        temp_vals.insert(0, [2.5, 0.0, 0.0, 0.0]);
        let guest = FixedState {
            temp_vals,
            reg_vals: Default::default(),
        };
        let mut engine = Engine {
            containers: &mut containers,
            pool: &mut pool,
            table: &mut table,
            arena: &mut arena,
            config: &config,
        };
        instrument_block(&block, &guest, &mut engine, 1).expect("instrumentation succeeds");
        assert_eq!(pool.stats().live, 0, "debt cleanup leaves the register's own reference only, then block end disowns the temp copies");
    }
}
