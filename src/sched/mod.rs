//! Scheduler-facing state and the hooks the interrupt path calls.
//!
//! Which thread runs next is decided elsewhere; this module only holds the
//! slots that decision is written into.

pub mod context;
pub mod trait_def;

pub use context::SchedulerContext;
pub use trait_def::KernelHooks;
