//! Hardware port for ARM-state cores with banked SVC/IRQ/FIQ modes
//! (ARM9/ARM11/Cortex-A class, not M-profile).
//!
//! Threads run in SVC mode on their own stacks. The pieces that have to be
//! written as instructions are here: the voluntary save sequence, steps 1-4
//! of the IRQ trampoline, and the resume intrinsic that restores the status
//! word and jumps in one `ldmfd ... {pc}^`. Everything between the save and
//! the resume is the kernel's Rust code, reached through a [`SwitchHook`].
//!
//! Saved context layout (`SavedContext`, 32-bit words):
//! - cpsr: offset 0
//! - r0-r12: offsets 4-52
//! - lr: offset 56
//! - pc: offset 60

use super::psr::{Mode, PsrFlags, IRQ_FIQ_MASK};
use super::status::CpuStatus;
use super::{Arch, Psr, SwitchHook, IRQ_PIPELINE_OFFSET};
use crate::config::{IRQ_RESCUE_WORDS, IRQ_STACK_SIZE};
use crate::context::SavedContext;
use core::arch::{asm, naked_asm};
use core::ptr::null_mut;
use portable_atomic::{AtomicPtr, AtomicUsize, Ordering};

/// SVC mode, IRQ and FIQ masked.
const SVC_MASKED: u32 = Mode::Supervisor as u32 | IRQ_FIQ_MASK;
/// IRQ mode, IRQ and FIQ masked.
const IRQ_MASKED: u32 = Mode::Irq as u32 | IRQ_FIQ_MASK;

/// Offset of the pc slot from sp after `r0-r12, lr` are pushed and before
/// the status word is.
const PC_SLOT: usize = SavedContext::PC_OFFSET - 4;

// The register lists below hard-code the record layout.
const _: () = assert!(SavedContext::SIZE == 64);
const _: () = assert!(SavedContext::PC_OFFSET == 60);
const _: () = assert!(IRQ_RESCUE_WORDS == 3);

/// Kernel object the trampoline passes to its hook.
#[no_mangle]
static PREEMPT_IRQ_KERNEL: AtomicPtr<()> = AtomicPtr::new(null_mut());

/// Hook the trampoline calls with the saved stack pointer; 0 when unset.
#[no_mangle]
static PREEMPT_IRQ_HOOK: AtomicUsize = AtomicUsize::new(0);

#[repr(C, align(8))]
pub struct IrqStack {
    data: [u8; IRQ_STACK_SIZE],
}

/// Dedicated IRQ-mode stack. Only ever holds the rescued working registers.
pub static mut IRQ_STACK: IrqStack = IrqStack {
    data: [0; IRQ_STACK_SIZE],
};

#[inline]
pub fn irq_stack_top() -> usize {
    unsafe {
        let ptr = core::ptr::addr_of_mut!(IRQ_STACK);
        (*ptr).data.as_mut_ptr().add(IRQ_STACK_SIZE) as usize
    }
}

/// The hardware port.
pub struct Arm32;

impl Arch for Arm32 {
    fn save_and_mask(&self) -> CpuStatus {
        let old: u32;
        unsafe {
            asm!(
                "mrs {old}, cpsr",
                "orr {tmp}, {old}, #{mask}",
                "msr cpsr_c, {tmp}",
                old = out(reg) old,
                tmp = out(reg) _,
                mask = const IRQ_FIQ_MASK,
                options(nostack, preserves_flags)
            );
        }
        CpuStatus::from_psr(Psr::from_bits(old))
    }

    fn restore(&self, status: CpuStatus) {
        unsafe {
            asm!(
                "msr cpsr_c, {status}",
                status = in(reg) status.psr().bits(),
                options(nostack, preserves_flags)
            );
        }
    }

    fn mask_irq_only(&self) {
        unsafe {
            asm!(
                "mrs {tmp}, cpsr",
                "bic {tmp}, {tmp}, #{f}",
                "orr {tmp}, {tmp}, #{i}",
                "msr cpsr_c, {tmp}",
                tmp = out(reg) _,
                f = const PsrFlags::F.bits(),
                i = const PsrFlags::I.bits(),
                options(nostack, preserves_flags)
            );
        }
    }

    fn mask_all(&self) {
        unsafe {
            asm!(
                "mrs {tmp}, cpsr",
                "orr {tmp}, {tmp}, #{mask}",
                "msr cpsr_c, {tmp}",
                tmp = out(reg) _,
                mask = const IRQ_FIQ_MASK,
                options(nostack, preserves_flags)
            );
        }
    }

    fn enable_interrupts(&self) {
        unsafe {
            asm!(
                "mrs {tmp}, cpsr",
                "bic {tmp}, {tmp}, #{mask}",
                "msr cpsr_c, {tmp}",
                tmp = out(reg) _,
                mask = const IRQ_FIQ_MASK,
                options(nostack, preserves_flags)
            );
        }
    }

    fn interrupts_enabled(&self) -> bool {
        let cpsr: u32;
        unsafe {
            asm!(
                "mrs {cpsr}, cpsr",
                cpsr = out(reg) cpsr,
                options(nomem, nostack, preserves_flags)
            );
        }
        !Psr::from_bits(cpsr).irq_masked()
    }

    unsafe fn context_switch(&self, kernel: *const (), hook: SwitchHook) {
        unsafe { switch_voluntary(kernel, hook) }
    }

    unsafe fn resume_context(&self, sp: usize) {
        unsafe { resume_context(sp) }
    }

    unsafe fn install_irq_entry(&self, kernel: *const (), hook: SwitchHook) {
        PREEMPT_IRQ_KERNEL.store(kernel as *mut (), Ordering::Release);
        PREEMPT_IRQ_HOOK.store(hook as usize, Ordering::Release);
    }
}

/// Voluntary switch.
///
/// Pushes the resume address (our return address), `r0-r12, lr` and the
/// caller's CPSR, then masks IRQ/FIQ and calls `hook(kernel, sp)`. The
/// returned stack pointer is resumed. A Thumb caller is recorded as such so
/// that the resume lands back in Thumb state.
#[unsafe(naked)]
#[instruction_set(arm::a32)]
unsafe extern "C" fn switch_voluntary(kernel: *const (), hook: SwitchHook) {
    naked_asm!(
        "stmfd sp!, {{lr}}",
        "stmfd sp!, {{r0-r12, lr}}",
        "mrs r4, cpsr",
        "tst lr, #1",
        "orrne r4, r4, #{thumb}",
        "bicne r5, lr, #1",
        "strne r5, [sp, #{pc_slot}]",
        "stmfd sp!, {{r4}}",

        // Saved status is the caller's; mask for the rest of the switch.
        "mrs r4, cpsr",
        "orr r4, r4, #{mask}",
        "msr cpsr_c, r4",

        // r0 = kernel, r1 = saved sp
        "mov r4, r1",
        "mov r1, sp",
        "blx r4",
        "b {resume}",

        thumb = const PsrFlags::T.bits(),
        pc_slot = const PC_SLOT,
        mask = const IRQ_FIQ_MASK,
        resume = sym resume_context,
    );
}

/// Resume the saved context at `sp` (passed in r0).
///
/// `ldmfd ... {pc}^` copies SPSR into CPSR as it loads pc, so the thread's
/// interrupt mask takes effect exactly at its first instruction.
#[unsafe(naked)]
#[instruction_set(arm::a32)]
unsafe extern "C" fn resume_context(sp: usize) -> ! {
    naked_asm!(
        "msr cpsr_c, #{svc_masked}",
        "mov sp, r0",
        "ldmfd sp!, {{r4}}",
        "msr spsr_cxsf, r4",
        "ldmfd sp!, {{r0-r12, lr, pc}}^",
        svc_masked = const SVC_MASKED,
    );
}

/// IRQ entry point. The IRQ slot of the vector table branches here.
///
/// Steps 1-4 save the interrupted context onto the interrupted thread's own
/// stack; the hook (the kernel's `interrupt_entry`) does the nesting
/// bookkeeping and dispatch and returns the context to resume.
#[unsafe(naked)]
#[no_mangle]
#[instruction_set(arm::a32)]
pub unsafe extern "C" fn irq_trampoline() -> ! {
    naked_asm!(
        // 1. Working registers onto the IRQ stack.
        "stmfd sp!, {{r1-r3}}",
        "mov r1, sp",
        "add sp, sp, #{rescue_bytes}",
        // 2. Resume address.
        "sub r2, lr, #{pipeline}",
        // 3. Interrupted status, before the mode change discards SPSR_irq.
        "mrs r3, spsr",
        // 4. Thread mode; full context onto the thread's stack.
        "msr cpsr_c, #{svc_masked}",
        "stmfd sp!, {{r2}}",
        "stmfd sp!, {{lr}}",
        "stmfd sp!, {{r4-r12}}",
        "ldmia r1, {{r4-r6}}",
        "stmfd sp!, {{r4-r6}}",
        "stmfd sp!, {{r0}}",
        "stmfd sp!, {{r3}}",

        // r0 = kernel, r1 = saved sp; keep the call 8-byte aligned.
        "mov r1, sp",
        "bic sp, sp, #7",
        "ldr r2, ={hook}",
        "ldr r2, [r2]",
        "cmp r2, #0",
        "moveq r0, r1",
        "beq 1f",
        "ldr r0, ={kernel}",
        "ldr r0, [r0]",
        "blx r2",
        "1:",
        "b {resume}",
        ".ltorg",

        rescue_bytes = const IRQ_RESCUE_WORDS * 4,
        pipeline = const IRQ_PIPELINE_OFFSET,
        svc_masked = const SVC_MASKED,
        hook = sym PREEMPT_IRQ_HOOK,
        kernel = sym PREEMPT_IRQ_KERNEL,
        resume = sym resume_context,
    );
}

/// Exception vector table.
///
/// Must be placed 32-byte aligned (the `.vectors` section in the linker
/// script). Only the IRQ slot is live; the others park the core. Reset does
/// not vector through VBAR, so its slot is unused once installed.
#[unsafe(naked)]
#[no_mangle]
#[link_section = ".vectors"]
#[instruction_set(arm::a32)]
pub unsafe extern "C" fn exception_vectors() -> ! {
    naked_asm!(
        "b .",                  // reset
        "b .",                  // undefined instruction
        "b .",                  // supervisor call
        "b .",                  // prefetch abort
        "b .",                  // data abort
        "b .",                  // reserved
        "ldr pc, ={irq}",       // IRQ
        "b .",                  // FIQ
        ".ltorg",
        irq = sym irq_trampoline,
    );
}

/// Point VBAR at [`exception_vectors`].
///
/// # Safety
///
/// Must be called once during boot with interrupts masked.
#[cfg(target_feature = "v7")]
pub unsafe fn install_vector_table() {
    let base = exception_vectors as usize;
    debug_assert_eq!(base & 0x1F, 0, "vector table must be 32-byte aligned");
    unsafe {
        asm!(
            "mcr p15, 0, {base}, c12, c0, 0",
            "isb",
            base = in(reg) base,
            options(nostack, preserves_flags)
        );
    }
}

/// Give IRQ mode its dedicated stack.
///
/// # Safety
///
/// Must be called once during boot, in a privileged mode, with interrupts
/// masked.
pub unsafe fn init_mode_stacks() {
    let top = irq_stack_top();
    unsafe {
        asm!(
            "mrs {saved}, cpsr",
            "msr cpsr_c, #{irq_masked}",
            "mov sp, {top}",
            "msr cpsr_c, {saved}",
            saved = out(reg) _,
            top = in(reg) top,
            irq_masked = const IRQ_MASKED,
            options(preserves_flags)
        );
    }
}
