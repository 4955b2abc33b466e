//! Test helper utilities: thread fixtures and a scripted interrupt dispatcher.

use crate::arch::sim::{RegisterFile, SimArch};
use crate::arch::{Arch, Mode, Psr, PsrFlags};
use crate::context::{SavedContext, Word, GENERAL_REGS};
use crate::kernel::Kernel;
use crate::mem::Stack;
use crate::sched::{KernelHooks, SchedulerContext};
use crate::thread::{ThreadControlBlock, ThreadId};
use alloc::boxed::Box;
use alloc::vec::Vec;
use spin::Mutex;

pub(crate) type Tcb = ThreadControlBlock;
pub(crate) type SimKernel = Kernel<SimArch, ScriptedHooks>;

extern "C" fn idle_entry(_arg: usize) {}

/// A thread with its own stack that starts in `idle_entry(id)`.
pub(crate) fn leak_thread(id: usize) -> &'static Tcb {
    let stack = Stack::with_size(4096).unwrap();
    let tcb = Tcb::new(ThreadId::new(id).unwrap(), stack, idle_entry, id).unwrap();
    Box::leak(Box::new(tcb))
}

/// Kernel on `sim`, registered as the IRQ target.
pub(crate) fn boot(sim: &SimArch, hooks: ScriptedHooks) -> &'static SimKernel {
    let kernel: &'static SimKernel = Box::leak(Box::new(Kernel::new(sim.clone(), hooks)));
    unsafe { kernel.register_global() };
    kernel
}

/// Register values a running thread might hold, derived from `seed`.
///
/// Keeps the thread's current stack pointer; everything else is replaced.
pub(crate) fn thread_registers(sim: &SimArch, seed: Word, flags: PsrFlags) -> RegisterFile {
    let mut r = [0; GENERAL_REGS];
    for (i, reg) in r.iter_mut().enumerate() {
        *reg = seed.wrapping_mul(0x0101).wrapping_add(i as Word);
    }
    RegisterFile {
        r,
        sp: sim.registers().sp,
        lr: 0x4000_0000 | (seed << 2),
        pc: 0x8000_0000 | (seed << 4),
        cpsr: Psr::new(Mode::Supervisor, flags),
    }
}

/// The record a suspension of `regs` must produce.
pub(crate) fn frame_of(regs: &RegisterFile) -> SavedContext {
    SavedContext {
        cpsr: regs.cpsr.bits() as Word,
        r: regs.r,
        lr: regs.lr,
        pc: regs.pc,
    }
}

/// What the trampoline called, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HookCall {
    Enter(usize),
    Handler(HandlerView),
    Exit { nesting: usize, switch: bool },
}

/// State the dispatcher observed when it ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct HandlerView {
    pub(crate) depth: usize,
    pub(crate) irq_masked: bool,
    pub(crate) fiq_masked: bool,
    pub(crate) current: Option<ThreadId>,
    pub(crate) current_saved_sp: Option<usize>,
    pub(crate) current_context: Option<SavedContext>,
}

/// Fake dispatcher.
///
/// Each handler run records what it sees, optionally names a thread to
/// switch to, and optionally raises one more IRQ from inside itself until
/// `nest_to` levels are active.
pub(crate) struct ScriptedHooks {
    sim: SimArch,
    nest_to: usize,
    switch_at: Mutex<Option<(usize, &'static Tcb)>>,
    calls: Mutex<Vec<HookCall>>,
}

impl ScriptedHooks {
    pub(crate) fn new(sim: &SimArch) -> Self {
        Self {
            sim: sim.clone(),
            nest_to: 1,
            switch_at: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn nest_to(mut self, depth: usize) -> Self {
        self.nest_to = depth;
        self
    }

    /// Request a switch to `tcb` from the handler running at `depth`. One-shot.
    pub(crate) fn switch_at(&self, depth: usize, tcb: &'static Tcb) {
        *self.switch_at.lock() = Some((depth, tcb));
    }

    pub(crate) fn calls(&self) -> Vec<HookCall> {
        self.calls.lock().clone()
    }

    pub(crate) fn handler_views(&self) -> Vec<HandlerView> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                HookCall::Handler(view) => Some(*view),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn clear(&self) {
        self.calls.lock().clear();
    }
}

impl KernelHooks for ScriptedHooks {
    fn enter_interrupt(&self, sched: &SchedulerContext) -> usize {
        let depth = sched.enter_interrupt();
        self.calls.lock().push(HookCall::Enter(depth));
        depth
    }

    fn exit_interrupt(&self, sched: &SchedulerContext) -> bool {
        let switch = sched.exit_interrupt();
        self.calls.lock().push(HookCall::Exit {
            nesting: sched.nesting(),
            switch,
        });
        switch
    }

    fn interrupt_handler(&self, sched: &SchedulerContext) {
        let depth = sched.nesting();
        let cpsr = self.sim.cpsr();
        let current = sched.current();
        let view = HandlerView {
            depth,
            irq_masked: cpsr.irq_masked(),
            fiq_masked: cpsr.fiq_masked(),
            current: current.map(|t| t.id()),
            current_saved_sp: current.map(|t| t.saved_sp()),
            current_context: current.map(|t| unsafe { t.saved_context() }),
        };
        self.calls.lock().push(HookCall::Handler(view));

        let request = {
            let mut slot = self.switch_at.lock();
            if matches!(*slot, Some((at, _)) if at == depth) {
                slot.take().map(|(_, tcb)| tcb)
            } else {
                None
            }
        };
        if let Some(tcb) = request {
            sched.request_switch(tcb);
        }

        if depth < self.nest_to {
            // Let the next level in.
            self.sim.enable_interrupts();
            self.sim.raise_irq();
            self.sim.mask_irq_only();
        }
    }
}
