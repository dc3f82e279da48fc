//! The engine facade: owns every piece of pervasive global state the
//! original tool kept as process-wide singletons — the value pool, the
//! shadow containers, the op-info table, the op-AST arena, and the
//! running-depth counter — behind one object, per the specification's own
//! design note that a clean redesign would encapsulate them this way.
//!
//! Lifecycle mirrors the original's `init_instrumentation` → (many
//! instrumented blocks and client requests) → `finish_instrumentation` →
//! `write_output`: [`Engine::new`], repeated [`Engine::instrument_block`] /
//! [`Engine::handle_request`] calls, then [`Engine::finish`].

use crate::config::Config;
use crate::error::Bug;
use crate::expr::{
    OpAstArena,
    ReportEntry,
};
use crate::host::{
    DebugInfo,
    NullDebugInfo,
};
use crate::ir::instrument::{
    instrument_block,
    Engine as InstrumentCtx,
    GuestState,
};
use crate::ir::Block;
use crate::op::OpTable;
use crate::report;
use crate::requests::{
    check_tag,
    ClientRequest,
    Dispatcher,
    RequestOutcome,
};
use crate::shadow::Containers;
use crate::value::pool::Pool;

/// Everything the shadow-value engine needs to instrument blocks, dispatch
/// client requests, and emit a final report — bundled so an embedder only
/// has to thread one object through the host's translation and execution
/// callbacks.
pub struct Engine {
    config: Config,
    containers: Containers,
    pool: Pool,
    table: OpTable,
    arena: OpAstArena,
    running_depth: u32,
    debug_info: Box<dyn DebugInfo>,
}

impl Engine {
    /// A fresh engine, with no host debug-info resolution wired up yet.
    /// Equivalent to the original's `init_instrumentation`.
    pub fn new(config: Config) -> Self {
        Engine {
            config,
            containers: Containers::new(),
            pool: Pool::new(),
            table: OpTable::new(),
            arena: OpAstArena::new(),
            running_depth: 0,
            debug_info: Box::new(NullDebugInfo),
        }
    }

    /// Wire in a host-provided source-location resolver, used only at
    /// report-emission time.
    pub fn with_debug_info(mut self, debug_info: impl DebugInfo + 'static) -> Self {
        self.debug_info = Box::new(debug_info);
        self
    }

    /// The engine's configuration, for embedders that need to inspect it
    /// (e.g. to check `tool_tag` before decoding a client request).
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Current `BEGIN`/`END` nesting depth.
    pub fn running_depth(&self) -> u32 {
        self.running_depth
    }

    /// Instrument one guest block: the static walk described in the
    /// specification's C3, driving C2 and C4 as it goes. A no-op while
    /// `running_depth` is zero.
    #[tracing::instrument(name = "instrument_block", skip(self, block, guest), fields(addr = %format_args!("{:#x}", block.addr)))]
    pub fn instrument_block(&mut self, block: &Block, guest: &dyn GuestState) -> Result<(), Bug> {
        let depth = self.running_depth;
        let mut ctx = InstrumentCtx {
            containers: &mut self.containers,
            pool: &mut self.pool,
            table: &mut self.table,
            arena: &mut self.arena,
            config: &self.config,
        };
        instrument_block(block, guest, &mut ctx, depth)?;
        if self.config.print_errors {
            for (handle, info) in self.table.iter() {
                tracing::debug!(
                    op = %handle,
                    max_error = info.agg.global_error.max_error,
                    mean_error = info.agg.global_error.mean_error(),
                    "shadow op error aggregate"
                );
            }
        }
        Ok(())
    }

    /// Handle one decoded client request, after checking its tag against
    /// [`Config::tool_tag`]. Returns [`RequestOutcome::NotHandled`] for a
    /// mismatched tag, per the "unknown client request" rule — the tag
    /// itself is the host's job to extract from the raw request array.
    pub fn handle_request(&mut self, tag: [u8; 2], request: ClientRequest) -> RequestOutcome {
        if !check_tag(tag, &self.config) {
            return RequestOutcome::NotHandled;
        }
        let mut dispatcher = Dispatcher {
            running_depth: self.running_depth,
            containers: &mut self.containers,
            pool: &mut self.pool,
            table: &mut self.table,
            detailed_ranges: self.config.detailed_ranges,
        };
        let outcome = dispatcher.dispatch(request);
        self.running_depth = dispatcher.running_depth;
        outcome
    }

    /// Build the final sorted, subexpression-suppressed report without
    /// writing it anywhere, for embedders that want the data directly.
    pub fn report(&self) -> Vec<ReportEntry> {
        crate::expr::report::build_report(&self.arena, &self.table, true, self.config.report_exprs)
    }

    /// Build the report and write it to `Config::report_path`, if set.
    /// Equivalent to the original's `finish_instrumentation` followed by
    /// `write_output`. A failure to open the report file is returned to
    /// the caller rather than propagated as a guest-visible error, per the
    /// specification's error-handling design.
    pub fn finish(&self) -> Result<Vec<ReportEntry>, crate::error::EngineError> {
        let entries = self.report();
        report::write_report(&entries, &self.table, &self.arena, self.debug_info.as_ref(), &self.config)?;
        Ok(entries)
    }

    /// Occupancy of the value pool, for diagnostics.
    pub fn pool_stats(&self) -> crate::value::pool::PoolStats {
        self.pool.stats()
    }

    /// Number of distinct static ops observed so far, for diagnostics and
    /// tests — distinct from [`Engine::report`], whose length also depends
    /// on each op's accrued error clearing [`Config::error_threshold`].
    pub fn op_count(&self) -> usize {
        self.table.iter().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{
        Expr,
        IrType,
        Literal,
        Stmt,
        TempId,
        TsOffset,
    };
    use crate::op::OpCode;
    use std::collections::HashMap;

    struct FixedState {
        temp_vals: HashMap<u32, [f64; 4]>,
    }

    impl GuestState for FixedState {
        fn temp_channels(&self, temp: TempId, _ty: IrType) -> [f64; 4] {
            self.temp_vals.get(&temp.0).copied().unwrap_or([0.0; 4])
        }
        fn register_channels(&self, _offset: TsOffset, _ty: IrType) -> [f64; 4] {
            [0.0; 4]
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
            0
        }
    }

    fn add_block() -> (Block, FixedState) {
        let block = Block {
            addr: 0x5000,
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
        let mut temp_vals = HashMap::new();
        temp_vals.insert(0, [1e20, 0.0, 0.0, 0.0]);
        temp_vals.insert(1, [1.0, 0.0, 0.0, 0.0]);
        temp_vals.insert(2, [1e20_f64 + 1.0, 0.0, 0.0, 0.0]);
        (block, FixedState { temp_vals })
    }

    #[test]
    fn blocks_are_no_ops_until_begin_is_dispatched() {
        let mut engine = Engine::new(Config::default());
        let (block, guest) = add_block();
        engine.instrument_block(&block, &guest).unwrap();
        assert!(engine.report().is_empty(), "no BEGIN yet, so nothing should be shadowed");
    }

    #[test]
    fn begin_then_instrument_then_finish_reports_one_op() {
        let mut engine = Engine::new(Config::default());
        assert_eq!(engine.handle_request(*b"HS", ClientRequest::Begin), RequestOutcome::Handled);
        let (block, guest) = add_block();
        engine.instrument_block(&block, &guest).unwrap();
        // Whether the add's accrued error clears `error_threshold` (and so
        // appears in the rendered report) depends on the exact rounding of
        // the fixture's inputs; the op itself is unconditionally recorded.
        assert_eq!(engine.op_count(), 1);
        engine.finish().unwrap();
    }

    #[test]
    fn mismatched_tag_is_not_handled() {
        let mut engine = Engine::new(Config::default());
        assert_eq!(
            engine.handle_request(*b"XX", ClientRequest::Begin),
            RequestOutcome::NotHandled
        );
        assert_eq!(engine.running_depth(), 0);
    }

    #[test]
    fn end_after_block_leaves_the_pool_empty() {
        let mut engine = Engine::new(Config::default());
        engine.handle_request(*b"HS", ClientRequest::Begin);
        let (block, guest) = add_block();
        engine.instrument_block(&block, &guest).unwrap();
        engine.handle_request(*b"HS", ClientRequest::End);
        assert_eq!(engine.pool_stats().live, 0);
    }
}
