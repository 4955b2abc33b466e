//! Stack-resident saved context of a suspended thread.
//!
//! Every suspension path (voluntary switch, IRQ entry) writes exactly this
//! record and every resume path reads exactly this record. The hardware
//! port's `stmfd`/`ldmfd` register lists are checked against the field
//! offsets below at compile time, so there is one definition of the order.
//!
//! Layout, lowest address first (the stack pointer stored in the TCB points
//! at `cpsr`):
//!
//! ```text
//! sp + 0          cpsr
//! sp + 1 word     r0
//! ...
//! sp + 13 words   r12
//! sp + 14 words   lr
//! sp + 15 words   pc (resume address)
//! ```

use crate::arch::psr::{Psr, PsrFlags};
use crate::config::{STACK_ALIGN, THREAD_INITIAL_MODE};
use crate::errors::ContextError;
use core::mem::{offset_of, size_of};

/// A machine word. 32 bits on the hardware target.
pub type Word = usize;

/// Number of general-purpose registers saved besides sp/lr/pc.
pub const GENERAL_REGS: usize = 13;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SavedContext {
    /// Status register at suspension time (mode, mask bits, flags).
    pub cpsr: Word,
    /// r0-r12.
    pub r: [Word; GENERAL_REGS],
    /// Link register of the suspended mode.
    pub lr: Word,
    /// Address execution resumes at.
    pub pc: Word,
}

const WORD: usize = size_of::<Word>();

const _: () = assert!(offset_of!(SavedContext, cpsr) == 0);
const _: () = assert!(offset_of!(SavedContext, r) == WORD);
const _: () = assert!(offset_of!(SavedContext, lr) == 14 * WORD);
const _: () = assert!(offset_of!(SavedContext, pc) == 15 * WORD);
const _: () = assert!(size_of::<SavedContext>() == SavedContext::WORDS * WORD);

impl SavedContext {
    /// Bumped whenever the field order changes.
    pub const LAYOUT_VERSION: u32 = 1;

    /// Record length in words.
    pub const WORDS: usize = 16;

    /// Record length in bytes.
    pub const SIZE: usize = size_of::<Self>();

    /// Byte offset of the resume address inside the frame.
    pub const PC_OFFSET: usize = offset_of!(SavedContext, pc);

    /// Synthetic context for a thread that has never run.
    ///
    /// Resuming it starts `entry(arg)` in the initial thread mode with both
    /// interrupt classes enabled; returning from `entry` jumps to `exit`.
    /// An entry address with bit 0 set starts in Thumb state.
    pub fn initial(entry: Word, arg: Word, exit: Word) -> Self {
        let mut status = Psr::new(THREAD_INITIAL_MODE, PsrFlags::empty());
        if entry & 1 != 0 {
            status = status.with(PsrFlags::T);
        }

        let mut r = [0; GENERAL_REGS];
        r[0] = arg;

        Self {
            cpsr: status.bits() as Word,
            r,
            lr: exit,
            pc: entry & !1,
        }
    }

    pub fn psr(&self) -> Psr {
        Psr::from_bits(self.cpsr as u32)
    }

    /// Write this record below `sp` and return the new stack pointer.
    ///
    /// # Safety
    ///
    /// `[sp - SIZE, sp)` must be writable memory owned by the thread whose
    /// context this is, and `sp` must be word aligned.
    pub unsafe fn push(&self, sp: usize) -> usize {
        debug_assert_eq!(sp % WORD, 0);
        let frame = sp - Self::SIZE;
        unsafe { core::ptr::write(frame as *mut Self, *self) };
        frame
    }

    /// Read the record at `sp` and return it with the stack pointer above it.
    ///
    /// # Safety
    ///
    /// `sp` must point at a record written by [`SavedContext::push`] (or by
    /// the hardware port, which uses the same layout).
    pub unsafe fn pop(sp: usize) -> (Self, usize) {
        let ctx = unsafe { Self::read_at(sp) };
        (ctx, sp + Self::SIZE)
    }

    /// Read the record at `sp` without moving the stack pointer.
    ///
    /// # Safety
    ///
    /// Same as [`SavedContext::pop`].
    pub unsafe fn read_at(sp: usize) -> Self {
        debug_assert_eq!(sp % WORD, 0);
        unsafe { core::ptr::read(sp as *const Self) }
    }

    /// Seed a fresh stack with an initial context.
    ///
    /// `stack_top` is the highest address of the stack (exclusive); it is
    /// rounded down to [`STACK_ALIGN`]. Returns the saved stack pointer to
    /// store in the thread's control block.
    ///
    /// # Safety
    ///
    /// `[stack_base, stack_top)` must be writable memory reserved for the
    /// thread and not in use by anything else.
    pub unsafe fn seed(
        stack_base: usize,
        stack_top: usize,
        entry: Word,
        arg: Word,
        exit: Word,
    ) -> Result<usize, ContextError> {
        if stack_base % WORD != 0 {
            return Err(ContextError::Misaligned(stack_base));
        }
        let top = stack_top & !(STACK_ALIGN - 1);
        if top <= stack_base || top - stack_base < Self::SIZE {
            return Err(ContextError::StackTooSmall(stack_top.saturating_sub(stack_base)));
        }
        let ctx = Self::initial(entry, arg, exit);
        Ok(unsafe { ctx.push(top) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::psr::Mode;
    use alloc::vec;

    #[test]
    fn test_initial_context_arm_entry() {
        let ctx = SavedContext::initial(0x8000, 42, 0x9000);
        assert_eq!(ctx.pc, 0x8000);
        assert_eq!(ctx.r[0], 42);
        assert!(ctx.r[1..].iter().all(|&r| r == 0));
        assert_eq!(ctx.lr, 0x9000);
        assert_eq!(ctx.psr().mode(), Some(Mode::Supervisor));
        assert!(!ctx.psr().irq_masked());
        assert!(!ctx.psr().fiq_masked());
        assert!(!ctx.psr().is_thumb());
    }

    #[test]
    fn test_initial_context_thumb_entry() {
        let ctx = SavedContext::initial(0x8001, 0, 0);
        assert_eq!(ctx.pc, 0x8000);
        assert!(ctx.psr().is_thumb());
    }

    #[test]
    fn test_push_pop_mirror() {
        let mut buf = vec![0usize; 64];
        let top = buf.as_mut_ptr() as usize + buf.len() * WORD;

        let mut ctx = SavedContext::initial(0x1234, 7, 0x5678);
        ctx.r[12] = 0xCAFE;

        let sp = unsafe { ctx.push(top) };
        assert_eq!(top - sp, SavedContext::SIZE);
        // The status word sits at the lowest address.
        assert_eq!(buf[buf.len() - SavedContext::WORDS], ctx.cpsr);
        assert_eq!(buf[buf.len() - 1], 0x1234);

        let (back, sp_after) = unsafe { SavedContext::pop(sp) };
        assert_eq!(back, ctx);
        assert_eq!(sp_after, top);
    }

    #[test]
    fn test_seed_rejects_small_stack() {
        let mut buf = vec![0usize; 4];
        let base = buf.as_mut_ptr() as usize;
        let top = base + buf.len() * WORD;
        let err = unsafe { SavedContext::seed(base, top, 0x100, 0, 0) };
        assert!(matches!(err, Err(ContextError::StackTooSmall(_))));
    }

    #[test]
    fn test_seed_aligns_top() {
        let mut buf = vec![0u64; 64];
        let base = buf.as_mut_ptr() as usize;
        let top = base + 64 * 8 - 4;
        let sp = unsafe { SavedContext::seed(base, top, 0x100, 1, 0) }.unwrap();
        assert_eq!((sp + SavedContext::SIZE) % STACK_ALIGN, 0);
        let ctx = unsafe { SavedContext::read_at(sp) };
        assert_eq!(ctx.pc, 0x100);
        assert_eq!(ctx.r[0], 1);
    }
}
