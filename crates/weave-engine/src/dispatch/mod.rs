//! Dispatch tables
//!
//! [`LinkedUnit`] is what a blueprint runs: one body per method slot, either
//! fused into a native forward or chain hand-off, or kept as a decoded stub
//! for the interpreter.

mod convert;
mod exec;
mod link;

pub(crate) use convert::check_arguments;
pub(crate) use exec::CallFrame;
pub use link::{LinkError, LinkedBody, LinkedUnit, ReturnConversion};
