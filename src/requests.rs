//! The client-request dispatcher: the guest-program-visible macros
//! (`HERBGRIND_BEGIN`-style requests in the original) translated into an
//! entry point the engine exposes to the host.
//!
//! Extracting a request's payload out of the guest program's raw `UWord[]`
//! array and memory is the host's job (per the specification's
//! external-collaborator boundary); this module starts from the already
//! decoded [`ClientRequest`].

use crate::config::Config;
use crate::exec::executor::execute_real_op;
use crate::op::{
    OpCode,
    OpTable,
    WrappedOp,
};
use crate::real::{
    FloatKind,
    Real,
};
use crate::shadow::memory::Addr;
use crate::shadow::Containers;
use crate::value::pool::Pool;

/// A decoded client request, addressed by the specification's table in
/// section 6.
#[derive(Debug, Clone)]
pub enum ClientRequest {
    /// Increment the running depth.
    Begin,
    /// Decrement the running depth.
    End,
    /// Shadow a libm-style double op: `op(args) == result`.
    PerformOp {
        /// Which transcendental was called.
        op: WrappedOp,
        /// The concrete double arguments, in call order.
        args: Vec<f64>,
        /// The concrete double result the host's libm produced.
        result: f64,
        /// Address the instruction performing this call is tagged to, for
        /// op-info identity.
        call_addr: u64,
    },
    /// Same as [`ClientRequest::PerformOp`] but at single precision.
    PerformOpf {
        /// Which transcendental was called.
        op: WrappedOp,
        /// The concrete single-precision arguments, in call order.
        args: Vec<f32>,
        /// The concrete single-precision result.
        result: f32,
        /// Address tagging this call site.
        call_addr: u64,
    },
    /// Shadow a user-defined binary op identified by an opaque id.
    PerformSpecialOp {
        /// Client-chosen identifier for the op.
        op_id: u32,
        /// First operand.
        a: f64,
        /// Second operand.
        b: f64,
        /// Concrete result.
        result: f64,
        /// Address tagging this call site.
        call_addr: u64,
    },
    /// Mark the memory-shadow unit at `addr` important, unconditionally.
    MarkImportant {
        /// Guest memory address.
        addr: Addr,
    },
    /// Mark `addr` important only if a shadow is currently present there.
    MaybeMarkImportant {
        /// Guest memory address.
        addr: Addr,
    },
    /// As [`ClientRequest::MaybeMarkImportant`], with an extra client-chosen
    /// index the host attaches for its own bookkeeping (not interpreted by
    /// this engine).
    MaybeMarkImportantWithIndex {
        /// Guest memory address.
        addr: Addr,
        /// Client-chosen index, opaque to this engine.
        index: u32,
    },
    /// Force tracking of a memory slot regardless of its current status.
    ForceTrack {
        /// Guest memory address.
        addr: Addr,
    },
}

/// Whether the engine recognized and handled a client request, per the
/// specification's "unknown client request returns not-handled" rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The request was recognized and acted on.
    Handled,
    /// The request's tag didn't match this engine's configured tag, or the
    /// request code was unrecognized; the host should route it elsewhere.
    NotHandled,
}

/// Check a request's tag against the engine's configured tag before
/// dispatching, per the specification's "first two characters must match
/// the tool's tag" rule.
pub fn check_tag(tag: [u8; 2], config: &Config) -> bool {
    tag == config.tool_tag
}

/// Bundles the running-depth counter with the shadow containers, pool, and
/// op table that client requests mutate.
pub struct Dispatcher<'a> {
    /// Nesting depth of `BEGIN`/`END` brackets; instrumentation side
    /// effects are no-ops while this is zero.
    pub running_depth: u32,
    /// Shadow containers, for memory-marking requests.
    pub containers: &'a mut Containers,
    /// Value pool, for `PERFORM_OP`-family requests.
    pub pool: &'a mut Pool,
    /// Op table, for `PERFORM_OP`-family op-info identity.
    pub table: &'a mut OpTable,
    /// Whether observed operand ranges should be split by sign, mirroring
    /// [`Config::detailed_ranges`].
    pub detailed_ranges: bool,
}

impl<'a> Dispatcher<'a> {
    /// Handle one decoded request, tag already checked by the caller.
    pub fn dispatch(&mut self, request: ClientRequest) -> RequestOutcome {
        match request {
            ClientRequest::Begin => {
                self.running_depth += 1;
                RequestOutcome::Handled
            }
            ClientRequest::End => {
                self.running_depth = self.running_depth.saturating_sub(1);
                RequestOutcome::Handled
            }
            ClientRequest::PerformOp { op, args, result, call_addr } => {
                self.perform_wrapped(op, FloatKind::Double, &args, result, call_addr);
                RequestOutcome::Handled
            }
            ClientRequest::PerformOpf { op, args, result, call_addr } => {
                let args_f64: Vec<f64> = args.iter().map(|&a| a as f64).collect();
                self.perform_wrapped(op, FloatKind::Single, &args_f64, result as f64, call_addr);
                RequestOutcome::Handled
            }
            ClientRequest::PerformSpecialOp { op_id, a, b, result, call_addr } => {
                self.perform_special(op_id, a, b, result, call_addr);
                RequestOutcome::Handled
            }
            ClientRequest::MarkImportant { addr } => {
                self.containers.memory.mark_important(addr);
                RequestOutcome::Handled
            }
            ClientRequest::MaybeMarkImportant { addr } => {
                self.containers.memory.maybe_mark_important(addr);
                RequestOutcome::Handled
            }
            ClientRequest::MaybeMarkImportantWithIndex { addr, .. } => {
                self.containers.memory.maybe_mark_important(addr);
                RequestOutcome::Handled
            }
            ClientRequest::ForceTrack { addr } => {
                self.containers.memory.mark_important(addr);
                RequestOutcome::Handled
            }
        }
    }

    fn perform_wrapped(&mut self, op: WrappedOp, kind: FloatKind, args: &[f64], result: f64, call_addr: u64) {
        if self.running_depth == 0 {
            return;
        }
        let info = self.table.get_or_create(OpCode::Wrapped(op), call_addr, call_addr);
        let reals: Vec<Real> = args.iter().map(|&a| Real::from_f64(kind, a)).collect();
        let refs: Vec<&Real> = reals.iter().collect();
        let shadow_result = execute_real_op(OpCode::Wrapped(op), &refs, result, kind);
        let error = crate::op::ulp_error(&shadow_result, result);
        let record = &mut self.table.get_mut(info).agg;
        record.global_error.record(error);
        record.local_error.record(error);
        let handle = self.pool.make_bare(kind);
        self.pool.get_mut(handle).real = shadow_result;
        self.pool.disown(handle);
    }

    fn perform_special(&mut self, op_id: u32, a: f64, b: f64, result: f64, call_addr: u64) {
        if self.running_depth == 0 {
            return;
        }
        let info = self.table.get_or_create(OpCode::Special(op_id), call_addr, call_addr);
        let kind = FloatKind::Double;
        // A user-defined op has no known real-valued semantics to shadow
        // against, so the host's own result stands in as the reference; only
        // the input ranges are worth recording.
        let shadow_result = Real::apply_f64(kind, result);
        let error = crate::op::ulp_error(&shadow_result, result);
        let record = &mut self.table.get_mut(info).agg;
        record.global_error.record(error);
        record.local_error.record(error);
        for (i, v) in [a, b].into_iter().enumerate() {
            if let Some(slot) = record.input_ranges.get_mut(i) {
                slot.update(v, self.detailed_ranges);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Containers, Pool, OpTable) {
        (Containers::new(), Pool::new(), OpTable::new())
    }

    #[test]
    fn begin_end_brackets_depth() {
        let (mut containers, mut pool, mut table) = setup();
        let mut d = Dispatcher {
            running_depth: 0,
            containers: &mut containers,
            pool: &mut pool,
            table: &mut table,
            detailed_ranges: false,
        };
        assert_eq!(d.dispatch(ClientRequest::Begin), RequestOutcome::Handled);
        assert_eq!(d.running_depth, 1);
        assert_eq!(d.dispatch(ClientRequest::End), RequestOutcome::Handled);
        assert_eq!(d.running_depth, 0);
    }

    #[test]
    fn end_below_zero_saturates_rather_than_panicking() {
        let (mut containers, mut pool, mut table) = setup();
        let mut d = Dispatcher {
            running_depth: 0,
            containers: &mut containers,
            pool: &mut pool,
            table: &mut table,
            detailed_ranges: false,
        };
        d.dispatch(ClientRequest::End);
        assert_eq!(d.running_depth, 0);
    }

    #[test]
    fn mark_important_sets_the_flag_even_without_a_shadow() {
        let (mut containers, mut pool, mut table) = setup();
        let mut d = Dispatcher {
            running_depth: 1,
            containers: &mut containers,
            pool: &mut pool,
            table: &mut table,
            detailed_ranges: false,
        };
        d.dispatch(ClientRequest::MarkImportant { addr: 0x800 });
        assert!(d.containers.memory.is_important(0x800));
    }

    #[test]
    fn perform_op_records_error_against_an_op_info() {
        let (mut containers, mut pool, mut table) = setup();
        let mut d = Dispatcher {
            running_depth: 1,
            containers: &mut containers,
            pool: &mut pool,
            table: &mut table,
            detailed_ranges: false,
        };
        d.dispatch(ClientRequest::PerformOp {
            op: WrappedOp::Sin,
            args: vec![1.0],
            result: 1.0_f64.sin(),
            call_addr: 0x9000,
        });
        assert_eq!(table.iter().count(), 1);
    }
}
