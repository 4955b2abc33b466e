//! Collaborator interface the interrupt path calls out to.

use super::context::SchedulerContext;

/// Kernel bookkeeping invoked by the trampoline.
///
/// `enter_interrupt` and `exit_interrupt` default to the counter kept in
/// [`SchedulerContext`]; implementors normally only supply
/// `interrupt_handler`. Overriding the defaults is how tests observe the
/// exact call sequence.
pub trait KernelHooks {
    /// Increment the nesting depth and return the post-increment value.
    fn enter_interrupt(&self, sched: &SchedulerContext) -> usize {
        sched.enter_interrupt()
    }

    /// Decrement the nesting depth. `true` makes the trampoline switch to
    /// `sched.next()` instead of resuming the interrupted thread.
    fn exit_interrupt(&self, sched: &SchedulerContext) -> bool {
        sched.exit_interrupt()
    }

    /// Service whatever raised the interrupt.
    ///
    /// Runs with IRQs masked and FIQs enabled. May call
    /// [`SchedulerContext::request_switch`] to preempt the interrupted thread.
    fn interrupt_handler(&self, sched: &SchedulerContext);
}
