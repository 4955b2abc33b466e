//! The switching core.
//!
//! [`Kernel`] ties the architecture primitives to the scheduler context. It
//! owns the three switch paths:
//!
//! - the voluntary switch, entered from thread code ([`Kernel::context_switch`])
//! - the structured half of the IRQ trampoline ([`Kernel::interrupt_entry`])
//! - the interrupt-context switch at the trampoline's tail
//!   ([`Kernel::switch_in_from_interrupt`])
//!
//! The architecture port saves registers and resumes contexts; everything in
//! between runs here, with IRQ and FIQ masked.

use crate::arch::{Arch, SwitchHook};
use crate::errors::{fatal, KernelFault, SwitchError};
use crate::sched::{KernelHooks, SchedulerContext};
use crate::thread::{ThreadControlBlock, ThreadState};

/// Main kernel handle.
///
/// # Type Parameters
///
/// * `A` - Architecture implementation
/// * `H` - Interrupt bookkeeping and dispatch
pub struct Kernel<A: Arch, H: KernelHooks> {
    arch: A,
    hooks: H,
    sched: SchedulerContext,
}

impl<A: Arch, H: KernelHooks> Kernel<A, H> {
    pub const fn new(arch: A, hooks: H) -> Self {
        Self {
            arch,
            hooks,
            sched: SchedulerContext::new(),
        }
    }

    pub fn arch(&self) -> &A {
        &self.arch
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn sched(&self) -> &SchedulerContext {
        &self.sched
    }

    /// Route the IRQ trampoline to this kernel.
    ///
    /// # Safety
    ///
    /// The kernel must outlive all interrupt handling (i.e., for the lifetime
    /// of the system).
    pub unsafe fn register_global(&'static self) {
        log::debug!("registering irq entry");
        unsafe {
            self.arch
                .install_irq_entry(self as *const Self as *const (), Self::irq_entry_shim);
        }
    }

    /// Run `first` with nothing saved.
    ///
    /// On hardware this only returns on error. Against the simulated CPU it
    /// returns once `first`'s context is loaded.
    pub fn start(&self, first: &'static ThreadControlBlock) -> Result<(), SwitchError> {
        if self.sched.current().is_some() {
            return Err(SwitchError::AlreadyStarted);
        }

        self.arch.mask_all();
        self.sched.set_current(first);
        first.set_state(ThreadState::Running);
        log::debug!("starting thread {}", first.id());

        // SAFETY: TCBs always hold a complete saved context while not running.
        unsafe { self.arch.resume_context(first.saved_sp()) };
        Ok(())
    }

    /// Voluntary context switch from the running thread to `sched.next()`.
    ///
    /// Returns when the calling thread is switched back in. The calling
    /// thread's interrupt state is part of its saved context and is
    /// reinstated on that resume.
    pub fn context_switch(&self) -> Result<(), SwitchError> {
        let depth = self.sched.nesting();
        if depth > 0 {
            return Err(SwitchError::InInterruptContext(depth));
        }
        let current = self.sched.current().ok_or(SwitchError::NotStarted)?;
        let next = self.sched.next().ok_or(SwitchError::NoNextThread)?;
        log::trace!("yield {} -> {}", current.id(), next.id());

        let hook: SwitchHook = Self::switch_out_shim;
        // SAFETY: thread context (nesting is 0) and `self` outlives the call.
        unsafe { self.arch.context_switch(self as *const Self as *const (), hook) };
        Ok(())
    }

    /// Middle of the voluntary switch: `sp` is the outgoing thread's saved
    /// context. Runs with IRQ and FIQ masked.
    fn switch_out(&self, sp: usize) -> usize {
        let prev = match self.sched.current() {
            Some(prev) => prev,
            None => fatal(KernelFault::NoCurrentThread),
        };
        let next = match self.sched.next() {
            Some(next) => next,
            None => fatal(KernelFault::SwitchWithoutNext),
        };

        prev.set_saved_sp(sp);
        prev.set_state(ThreadState::Ready);
        self.sched.set_current(next);
        next.set_state(ThreadState::Running);

        next.saved_sp()
    }

    /// Structured half of the IRQ trampoline.
    ///
    /// `sp` is the interrupted context, already complete on the interrupted
    /// stack. Returns the context to resume: `sp` itself, or the next
    /// thread's when the outermost exit asks for a switch.
    pub fn interrupt_entry(&self, sp: usize) -> usize {
        let depth = self.hooks.enter_interrupt(&self.sched);

        // Only the outermost level records where the thread stopped.
        if depth == 1 {
            if let Some(current) = self.sched.current() {
                current.set_saved_sp(sp);
            }
        }

        self.arch.mask_irq_only();
        self.hooks.interrupt_handler(&self.sched);
        self.arch.mask_all();

        if self.hooks.exit_interrupt(&self.sched) {
            debug_assert_eq!(self.sched.nesting(), 0);
            self.switch_in_from_interrupt()
        } else {
            sp
        }
    }

    /// Interrupt-context switch.
    ///
    /// Nothing is saved here: the outgoing thread's context and saved stack
    /// pointer were recorded on outermost entry. Only reachable from the
    /// tail of [`interrupt_entry`](Self::interrupt_entry).
    fn switch_in_from_interrupt(&self) -> usize {
        let next = match self.sched.next() {
            Some(next) => next,
            None => fatal(KernelFault::SwitchWithoutNext),
        };

        if let Some(prev) = self.sched.current() {
            log::trace!("preempt {} -> {}", prev.id(), next.id());
            prev.set_state(ThreadState::Ready);
        }
        self.sched.set_current(next);
        next.set_state(ThreadState::Running);

        next.saved_sp()
    }

    extern "C" fn switch_out_shim(kernel: *const (), sp: usize) -> usize {
        // SAFETY: `context_switch` passes `self` as `kernel`.
        let kernel = unsafe { &*(kernel as *const Self) };
        kernel.switch_out(sp)
    }

    extern "C" fn irq_entry_shim(kernel: *const (), sp: usize) -> usize {
        // SAFETY: `register_global` installed a `&'static Self`.
        let kernel = unsafe { &*(kernel as *const Self) };
        kernel.interrupt_entry(sp)
    }
}

// Safety: single core; every mutation happens with IRQs masked.
unsafe impl<A: Arch, H: KernelHooks> Send for Kernel<A, H> {}
unsafe impl<A: Arch, H: KernelHooks> Sync for Kernel<A, H> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::sim::SimArch;
    use crate::mem::Stack;
    use crate::thread::ThreadId;
    use alloc::boxed::Box;

    struct NoDevices;

    impl KernelHooks for NoDevices {
        fn interrupt_handler(&self, _sched: &SchedulerContext) {}
    }

    extern "C" fn entry(_: usize) {}

    fn leak_tcb(id: usize) -> &'static ThreadControlBlock {
        let stack = Stack::with_size(1024).unwrap();
        let tcb = ThreadControlBlock::new(ThreadId::new(id).unwrap(), stack, entry, id).unwrap();
        Box::leak(Box::new(tcb))
    }

    fn kernel() -> &'static Kernel<SimArch, NoDevices> {
        Box::leak(Box::new(Kernel::new(SimArch::new(), NoDevices)))
    }

    #[test]
    fn test_switch_before_start_is_refused() {
        let k = kernel();
        assert_eq!(k.context_switch(), Err(SwitchError::NotStarted));
    }

    #[test]
    fn test_start_twice_is_refused() {
        let k = kernel();
        let t1 = leak_tcb(1);
        assert_eq!(k.start(t1), Ok(()));
        assert_eq!(k.start(t1), Err(SwitchError::AlreadyStarted));
    }

    #[test]
    fn test_start_loads_seeded_context() {
        let k = kernel();
        let t1 = leak_tcb(1);
        let top = t1.stack().unwrap().top();
        k.start(t1).unwrap();

        let regs = k.arch().registers();
        assert_eq!(regs.pc, (entry as usize) & !1);
        assert_eq!(regs.r[0], 1);
        assert_eq!(regs.sp, top);
        assert!(!regs.cpsr.irq_masked());
        assert_eq!(t1.state(), ThreadState::Running);
    }

    #[test]
    fn test_switch_without_next_is_refused() {
        let k = kernel();
        k.start(leak_tcb(1)).unwrap();
        assert_eq!(k.context_switch(), Err(SwitchError::NoNextThread));
    }

    #[test]
    fn test_switch_inside_interrupt_is_refused() {
        let k = kernel();
        k.start(leak_tcb(1)).unwrap();
        k.sched().set_next(leak_tcb(2));
        k.sched().enter_interrupt();
        assert_eq!(k.context_switch(), Err(SwitchError::InInterruptContext(1)));
        k.sched().exit_interrupt();
    }

    #[test]
    fn test_voluntary_switch_swaps_current() {
        let k = kernel();
        let t1 = leak_tcb(1);
        let t2 = leak_tcb(2);
        k.start(t1).unwrap();
        k.sched().set_next(t2);

        k.context_switch().unwrap();

        assert_eq!(k.sched().current().map(|t| t.id()), Some(t2.id()));
        assert_eq!(t1.state(), ThreadState::Ready);
        assert_eq!(t2.state(), ThreadState::Running);
        assert_eq!(k.arch().registers().r[0], 2);
    }

    #[test]
    fn test_interrupt_entry_without_switch_returns_same_sp() {
        let k = kernel();
        let t1 = leak_tcb(1);
        k.start(t1).unwrap();

        let sp = t1.saved_sp();
        assert_eq!(k.interrupt_entry(sp - 64), sp - 64);
        assert_eq!(t1.saved_sp(), sp - 64);
        assert_eq!(k.sched().nesting(), 0);
    }

    #[test]
    #[should_panic(expected = "interrupt switch with no next thread")]
    fn test_interrupt_switch_without_next_is_fatal() {
        let k = kernel();
        k.start(leak_tcb(1)).unwrap();
        k.switch_in_from_interrupt();
    }
}
