//! Architecture abstraction for the switching core.
//!
//! Everything that cannot be written as ordinary structured code lives
//! behind [`Arch`]: reading and writing the status register, pushing a full
//! register set, and the atomic "restore status and jump" that ends every
//! switch. The kernel logic around those primitives is shared between the
//! hardware port and the host model.

pub mod psr;
pub mod status;

pub use psr::{Mode, Psr, PsrFlags};
pub use status::{with_interrupts_masked, CpuStatus, CriticalSection};

/// Callback a switch primitive hands the just-saved stack pointer to.
///
/// Receives an opaque pointer to the kernel object and the address of the
/// saved context; returns the address of the context to resume.
pub type SwitchHook = extern "C" fn(kernel: *const (), sp: usize) -> usize;

/// Difference between the link value the CPU banks on IRQ entry and the
/// address of the interrupted instruction.
pub const IRQ_PIPELINE_OFFSET: usize = 4;

/// Architecture abstraction trait.
///
/// # Safety
///
/// Implementations manipulate the processor directly. The `unsafe` methods
/// transfer control between threads and have the preconditions listed on
/// each.
pub trait Arch {
    /// Read the status word, mask IRQ and FIQ, and return the old word.
    fn save_and_mask(&self) -> CpuStatus;

    /// Reinstate the interrupt state captured in `status`.
    fn restore(&self, status: CpuStatus);

    /// Mask IRQ only, leaving FIQ deliverable. Used while the interrupt
    /// dispatcher runs.
    fn mask_irq_only(&self);

    /// Mask IRQ and FIQ.
    fn mask_all(&self);

    /// Unmask IRQ and FIQ.
    fn enable_interrupts(&self);

    /// Whether IRQs are currently deliverable.
    fn interrupts_enabled(&self) -> bool;

    /// Suspend the running thread and resume another.
    ///
    /// Pushes the full register set and status word of the caller onto its
    /// own stack as a [`SavedContext`](crate::context::SavedContext) whose
    /// resume address is this call's return address, masks IRQ and FIQ,
    /// calls `hook(kernel, sp)` and resumes the context at the returned
    /// stack pointer. Returns when the suspended thread is resumed.
    ///
    /// # Safety
    ///
    /// - Must be called in the privileged thread mode, never from an
    ///   interrupt handler
    /// - `hook` must return the address of a complete saved context
    /// - `kernel` must stay valid for the duration of the call
    unsafe fn context_switch(&self, kernel: *const (), hook: SwitchHook);

    /// Restore the saved context at `sp`.
    ///
    /// The status word and the jump to the resume address take effect as a
    /// single step. On hardware this never returns.
    ///
    /// # Safety
    ///
    /// `sp` must point at a complete saved context.
    unsafe fn resume_context(&self, sp: usize);

    /// Route the IRQ trampoline to `hook(kernel, sp)`.
    ///
    /// # Safety
    ///
    /// `kernel` must outlive all interrupt handling.
    unsafe fn install_irq_entry(&self, kernel: *const (), hook: SwitchHook);
}

// Classic banked-mode ARM (not M-profile).
#[cfg(all(target_arch = "arm", not(target_feature = "mclass")))]
pub mod arm32;
#[cfg(all(target_arch = "arm", not(target_feature = "mclass")))]
pub mod uart_pl011;

#[cfg(any(test, not(all(target_arch = "arm", not(target_feature = "mclass")))))]
pub mod sim;

#[cfg(all(target_arch = "arm", not(target_feature = "mclass")))]
pub use arm32::Arm32 as DefaultArch;

// Everything else runs against the register-level model.
#[cfg(not(all(target_arch = "arm", not(target_feature = "mclass"))))]
pub use sim::SimArch as DefaultArch;
