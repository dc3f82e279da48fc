//! The shadow-op executor (C4): runtime dispatch for instrumented float
//! ops, plus the influence-set bookkeeping it threads through every
//! computed shadow value.

pub mod executor;
pub mod influence;

pub use executor::{
    execute_real_op,
    execute_shadow_op,
    ArgSource,
};
pub use influence::InfluenceSet;
