#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![forbid(unreachable_pub)]

//! Preemptive context switching for banked-mode ARM cores.
//!
//! This library is the switching core of a small RTOS: it saves and
//! restores thread contexts, voluntarily or from the IRQ trampoline, on
//! classic ARM cores that bank SVC/IRQ/FIQ modes (ARM9, ARM11, Cortex-A in
//! AArch32 state). Deciding which thread runs next is left to the
//! scheduler built on top.
//!
//! # Target Platform
//!
//! - **Hardware**: `target_arch = "arm"`, not M-profile, e.g.
//!   `armv7a-none-eabi`, `armv5te-none-eabi`
//! - **Host**: every other target builds against [`arch::sim::SimArch`], a
//!   register-level model of the same CPU, which the test suite uses
//!
//! # Quick Start
//!
//! ```ignore
//! use preemptive_arm::{DefaultArch, Kernel, KernelHooks, SchedulerContext};
//! use spin::Lazy;
//!
//! struct Board;
//!
//! impl KernelHooks for Board {
//!     fn interrupt_handler(&self, sched: &SchedulerContext) {
//!         if let Some(next) = timer_tick() {
//!             sched.request_switch(next);
//!         }
//!     }
//! }
//!
//! static KERNEL: Lazy<Kernel<DefaultArch, Board>> =
//!     Lazy::new(|| Kernel::new(preemptive_arm::arch::arm32::Arm32, Board));
//!
//! fn kernel_main(first: &'static ThreadControlBlock) -> ! {
//!     unsafe {
//!         preemptive_arm::arch::arm32::init_mode_stacks();
//!         KERNEL.register_global();
//!     }
//!     KERNEL.start(first).expect("kernel already started");
//!     unreachable!()
//! }
//! ```
//!
//! # Architecture
//!
//! - [`arch`]: status-register control and the save/resume primitives
//! - [`context`]: the saved-context record shared by every switch path
//! - [`kernel`]: voluntary switch, interrupt entry/exit, interrupt-context switch
//! - [`sched`]: current/next thread slots, nesting depth, bookkeeping hooks

// Core modules
pub mod arch;
pub mod config;
pub mod context;
pub mod errors;
pub mod kernel;
pub mod logging;
pub mod mem;
pub mod sched;
pub mod thread;

#[cfg(test)]
mod tests;

#[cfg(test)]
extern crate std;

extern crate alloc;

// Panic handler for bare metal
#[cfg(all(not(test), target_arch = "arm", not(target_feature = "mclass")))]
use core::panic::PanicInfo;

#[cfg(all(not(test), target_arch = "arm", not(target_feature = "mclass")))]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    // Mask IRQ and FIQ, report, halt
    unsafe {
        core::arch::asm!(
            "mrs {tmp}, cpsr",
            "orr {tmp}, {tmp}, #0xC0",
            "msr cpsr_c, {tmp}",
            tmp = out(reg) _,
            options(nostack)
        );
    }
    crate::pl011_println!("panic: {}", info);
    loop {
        #[cfg(target_feature = "v7")]
        unsafe {
            core::arch::asm!("wfi", options(nomem, nostack));
        }
        #[cfg(not(target_feature = "v7"))]
        core::hint::spin_loop();
    }
}

// ============================================================================
// Public API
// ============================================================================

// Architecture abstraction
pub use arch::{Arch, CpuStatus, CriticalSection, DefaultArch, Mode, Psr, PsrFlags};

// Kernel
pub use kernel::Kernel;

// Scheduler-facing state
pub use sched::{KernelHooks, SchedulerContext};

// Threads
pub use context::SavedContext;
pub use thread::{ThreadControlBlock, ThreadEntry, ThreadId, ThreadState};

// Memory
pub use mem::Stack;

// Errors
pub use errors::{ContextError, KernelError, KernelFault, KernelResult, SwitchError};
