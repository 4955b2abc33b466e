//! Register-level model of a banked-mode ARM core for host builds.
//!
//! The model keeps a register file, the CPSR, the IRQ-mode banked `lr` and
//! `spsr`, a dedicated IRQ stack and one IRQ line. Saved contexts are written
//! to real memory (the thread's [`Stack`](crate::mem::Stack)), so the kernel
//! logic runs unchanged against it. Threads do not execute: "running" a
//! thread means its values sit in the register file, and a test plays the
//! thread by editing them.
//!
//! Never hold the machine lock across a call back into the kernel; the
//! interrupt path re-enters the model.

use super::psr::{Mode, Psr, PsrFlags};
use super::status::CpuStatus;
use super::{Arch, SwitchHook, IRQ_PIPELINE_OFFSET};
use crate::config::{IRQ_RESCUE_WORDS, IRQ_STACK_SIZE};
use crate::context::{SavedContext, Word, GENERAL_REGS};
use crate::errors::{fatal, KernelFault};

use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::Mutex;

/// Visible registers of the current mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterFile {
    pub r: [Word; GENERAL_REGS],
    pub sp: usize,
    pub lr: Word,
    pub pc: Word,
    pub cpsr: Psr,
}

impl Default for RegisterFile {
    /// Reset state: supervisor mode, both interrupt classes masked.
    fn default() -> Self {
        Self {
            r: [0; GENERAL_REGS],
            sp: 0,
            lr: 0,
            pc: 0,
            cpsr: Psr::new(Mode::Supervisor, PsrFlags::I | PsrFlags::F),
        }
    }
}

/// Things the model observed, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// A thread's context was pushed by a voluntary switch.
    Suspended { pc: Word, sp: usize },
    /// The IRQ line was taken while executing at `pc`.
    IrqTaken { pc: Word },
    /// The IRQ line was raised while masked.
    IrqPended,
    /// A saved context was restored. `cpsr` is the status in force at the
    /// first resumed instruction.
    Resumed { pc: Word, sp: usize, cpsr: Psr },
}

#[derive(Clone, Copy)]
struct IrqVector {
    kernel: usize,
    hook: SwitchHook,
}

struct Machine {
    regs: RegisterFile,
    lr_irq: Word,
    spsr_irq: Psr,
    irq_stack: Vec<Word>,
    irq_stack_peak: usize,
    pending_irqs: usize,
    vector: Option<IrqVector>,
    events: Vec<Event>,
}

/// Host stand-in for the hardware port. Clones share one machine.
#[derive(Clone)]
pub struct SimArch {
    machine: Arc<Mutex<Machine>>,
}

impl SimArch {
    pub fn new() -> Self {
        Self {
            machine: Arc::new(Mutex::new(Machine {
                regs: RegisterFile::default(),
                lr_irq: 0,
                spsr_irq: Psr::default(),
                irq_stack: Vec::with_capacity(IRQ_STACK_SIZE / core::mem::size_of::<Word>()),
                irq_stack_peak: 0,
                pending_irqs: 0,
                vector: None,
                events: Vec::new(),
            })),
        }
    }

    pub fn registers(&self) -> RegisterFile {
        self.machine.lock().regs
    }

    /// Overwrite the register file, as if the running thread had computed
    /// these values.
    pub fn set_registers(&self, regs: RegisterFile) {
        self.machine.lock().regs = regs;
        self.deliver_pending();
    }

    pub fn cpsr(&self) -> Psr {
        self.machine.lock().regs.cpsr
    }

    pub fn set_cpsr(&self, cpsr: Psr) {
        self.machine.lock().regs.cpsr = cpsr;
        self.deliver_pending();
    }

    pub fn events(&self) -> Vec<Event> {
        self.machine.lock().events.clone()
    }

    pub fn clear_events(&self) {
        self.machine.lock().events.clear();
    }

    pub fn pending_irqs(&self) -> usize {
        self.machine.lock().pending_irqs
    }

    /// Words currently parked on the IRQ stack.
    pub fn irq_stack_depth(&self) -> usize {
        self.machine.lock().irq_stack.len()
    }

    /// Deepest the IRQ stack has been.
    pub fn irq_stack_peak(&self) -> usize {
        self.machine.lock().irq_stack_peak
    }

    /// Assert the IRQ line once. Taken immediately when IRQs are enabled,
    /// otherwise left pending until they are.
    pub fn raise_irq(&self) {
        {
            let mut m = self.machine.lock();
            m.pending_irqs += 1;
            if m.regs.cpsr.irq_masked() {
                m.events.push(Event::IrqPended);
            }
        }
        self.deliver_pending();
    }

    fn deliver_pending(&self) {
        loop {
            {
                let mut m = self.machine.lock();
                if m.pending_irqs == 0 || m.regs.cpsr.irq_masked() || m.vector.is_none() {
                    return;
                }
                m.pending_irqs -= 1;
            }
            self.take_irq();
        }
    }

    /// Hardware exception entry followed by the trampoline.
    fn take_irq(&self) {
        let (vector, sp) = {
            let mut guard = self.machine.lock();
            let m = &mut *guard;
            let vector = match m.vector {
                Some(vector) => vector,
                None => return,
            };

            // Exception entry: bank the return link and status, enter IRQ mode.
            let pc = m.regs.pc;
            m.events.push(Event::IrqTaken { pc });
            m.lr_irq = pc.wrapping_add(IRQ_PIPELINE_OFFSET);
            m.spsr_irq = m.regs.cpsr;
            m.regs.cpsr = m.regs.cpsr.with_mode(Mode::Irq).with(PsrFlags::I);

            // 1. Rescue the working registers onto the IRQ stack.
            m.irq_stack.extend_from_slice(&m.regs.r[1..1 + IRQ_RESCUE_WORDS]);
            m.irq_stack_peak = m.irq_stack_peak.max(m.irq_stack.len());

            // 2. Resume address.
            let resume = m.lr_irq.wrapping_sub(IRQ_PIPELINE_OFFSET);
            m.regs.r[2] = resume;

            // 3. Interrupted status, before the mode change loses it.
            let status = m.spsr_irq;
            m.regs.r[3] = status.bits() as Word;

            // 4. Back to thread mode; the full context goes on the thread's stack.
            m.regs.cpsr = Psr::new(Mode::Supervisor, PsrFlags::I | PsrFlags::F);
            let at = m.irq_stack.len() - IRQ_RESCUE_WORDS;
            let rescued = m.irq_stack.split_off(at);
            m.regs.r[1] = at;

            let mut r = m.regs.r;
            r[1..1 + IRQ_RESCUE_WORDS].copy_from_slice(&rescued);
            let frame = SavedContext {
                cpsr: status.bits() as Word,
                r,
                lr: m.regs.lr,
                pc: resume,
            };
            // SAFETY: the running thread's sp points into its own stack.
            let sp = unsafe { frame.push(m.regs.sp) };
            m.regs.sp = sp;
            (vector, sp)
        };

        let resume_sp = (vector.hook)(vector.kernel as *const (), sp);
        // SAFETY: the kernel returns either `sp` or another thread's saved context.
        unsafe { self.resume_context(resume_sp) };
    }
}

impl Default for SimArch {
    fn default() -> Self {
        Self::new()
    }
}

impl Arch for SimArch {
    fn save_and_mask(&self) -> CpuStatus {
        let mut m = self.machine.lock();
        let old = m.regs.cpsr;
        m.regs.cpsr = old.with(PsrFlags::I | PsrFlags::F);
        CpuStatus::from_psr(old)
    }

    fn restore(&self, status: CpuStatus) {
        {
            // Control byte only, like `msr cpsr_c`.
            let mut m = self.machine.lock();
            let bits = (m.regs.cpsr.bits() & !0xFF) | (status.psr().bits() & 0xFF);
            m.regs.cpsr = Psr::from_bits(bits);
        }
        self.deliver_pending();
    }

    fn mask_irq_only(&self) {
        let mut m = self.machine.lock();
        m.regs.cpsr = m.regs.cpsr.with(PsrFlags::I).without(PsrFlags::F);
    }

    fn mask_all(&self) {
        let mut m = self.machine.lock();
        m.regs.cpsr = m.regs.cpsr.with(PsrFlags::I | PsrFlags::F);
    }

    fn enable_interrupts(&self) {
        {
            let mut m = self.machine.lock();
            m.regs.cpsr = m.regs.cpsr.without(PsrFlags::I | PsrFlags::F);
        }
        self.deliver_pending();
    }

    fn interrupts_enabled(&self) -> bool {
        !self.machine.lock().regs.cpsr.irq_masked()
    }

    unsafe fn context_switch(&self, kernel: *const (), hook: SwitchHook) {
        let sp = {
            let mut m = self.machine.lock();
            let status = m.regs.cpsr;
            let frame = SavedContext {
                cpsr: status.bits() as Word,
                r: m.regs.r,
                lr: m.regs.lr,
                pc: m.regs.pc,
            };
            // SAFETY: the caller's sp points into its own stack.
            let sp = unsafe { frame.push(m.regs.sp) };
            m.regs.sp = sp;
            m.regs.cpsr = status.with(PsrFlags::I | PsrFlags::F);
            m.events.push(Event::Suspended { pc: frame.pc, sp });
            sp
        };

        let next_sp = hook(kernel, sp);
        unsafe { self.resume_context(next_sp) };
    }

    unsafe fn resume_context(&self, sp: usize) {
        if sp == 0 {
            fatal(KernelFault::NullStackPointer);
        }
        {
            let mut m = self.machine.lock();
            // SAFETY: caller guarantees a complete context at `sp`.
            let (frame, sp_after) = unsafe { SavedContext::pop(sp) };
            // Registers, pc and status land together.
            m.regs = RegisterFile {
                r: frame.r,
                sp: sp_after,
                lr: frame.lr,
                pc: frame.pc,
                cpsr: frame.psr(),
            };
            m.events.push(Event::Resumed {
                pc: frame.pc,
                sp: sp_after,
                cpsr: frame.psr(),
            });
        }
        self.deliver_pending();
    }

    unsafe fn install_irq_entry(&self, kernel: *const (), hook: SwitchHook) {
        self.machine.lock().vector = Some(IrqVector {
            kernel: kernel as usize,
            hook,
        });
        self.deliver_pending();
    }
}
