//! Process-wide switching state: current thread, next thread, nesting depth.
//!
//! There is a single writer at any time by construction: every mutation
//! happens inside a switch path or interrupt bookkeeping, both of which run
//! with IRQs masked on a single core. The fields are atomics only so that the
//! object can live in a `static`; they are never used for read-modify-write.

use crate::errors::{fatal, KernelFault};
use crate::thread::ThreadControlBlock;
use core::ptr;
use portable_atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};

type Tcb = ThreadControlBlock;

pub struct SchedulerContext {
    current: AtomicPtr<Tcb>,
    next: AtomicPtr<Tcb>,
    nesting: AtomicUsize,
    switch_requested: AtomicBool,
}

impl SchedulerContext {
    pub const fn new() -> Self {
        Self {
            current: AtomicPtr::new(ptr::null_mut()),
            next: AtomicPtr::new(ptr::null_mut()),
            nesting: AtomicUsize::new(0),
            switch_requested: AtomicBool::new(false),
        }
    }

    /// The thread whose context is logically active.
    pub fn current(&self) -> Option<&'static Tcb> {
        // SAFETY: only `&'static Tcb` values are ever stored.
        unsafe { self.current.load(Ordering::Acquire).as_ref() }
    }

    /// The thread the scheduler wants to run next.
    pub fn next(&self) -> Option<&'static Tcb> {
        // SAFETY: as above.
        unsafe { self.next.load(Ordering::Acquire).as_ref() }
    }

    /// Name the thread a following voluntary switch will resume.
    pub fn set_next(&self, tcb: &'static Tcb) {
        self.next.store(tcb as *const Tcb as *mut Tcb, Ordering::Release);
    }

    /// Called from interrupt context: name `tcb` as next and ask the
    /// trampoline to switch when nesting unwinds to zero.
    ///
    /// Naming the interrupted thread itself still performs a full switch.
    pub fn request_switch(&self, tcb: &'static Tcb) {
        self.set_next(tcb);
        self.switch_requested.store(true, Ordering::Release);
    }

    pub fn switch_pending(&self) -> bool {
        self.switch_requested.load(Ordering::Acquire)
    }

    pub(crate) fn set_current(&self, tcb: &'static Tcb) {
        self.current.store(tcb as *const Tcb as *mut Tcb, Ordering::Release);
    }

    /// Current interrupt nesting depth. Zero means thread context.
    pub fn nesting(&self) -> usize {
        self.nesting.load(Ordering::Acquire)
    }

    pub fn in_interrupt(&self) -> bool {
        self.nesting() > 0
    }

    /// Default `enter_interrupt` bookkeeping: bump the nesting depth and
    /// return the new value.
    pub fn enter_interrupt(&self) -> usize {
        let depth = self.nesting.load(Ordering::Acquire) + 1;
        self.nesting.store(depth, Ordering::Release);
        log::trace!("irq enter, nesting {}", depth);
        depth
    }

    /// Default `exit_interrupt` bookkeeping: drop the nesting depth and
    /// report whether the trampoline should switch threads.
    ///
    /// The switch request is consumed only once nesting reaches zero, so a
    /// request raised at depth N survives the inner exits.
    pub fn exit_interrupt(&self) -> bool {
        let depth = self.nesting.load(Ordering::Acquire);
        if depth == 0 {
            fatal(KernelFault::NestingUnderflow);
        }
        let depth = depth - 1;
        self.nesting.store(depth, Ordering::Release);
        log::trace!("irq exit, nesting {}", depth);

        if depth == 0 && self.switch_requested.load(Ordering::Acquire) {
            self.switch_requested.store(false, Ordering::Release);
            true
        } else {
            false
        }
    }
}

impl Default for SchedulerContext {
    fn default() -> Self {
        Self::new()
    }
}
