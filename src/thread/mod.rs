//! Thread control blocks, as far as the switching core sees them.
//!
//! The scheduler owns the TCBs. The switch paths read and write exactly one
//! field, the saved stack pointer, at the fixed offset [`SAVED_SP_OFFSET`],
//! and flip the READY/RUNNING state of the threads they swap.

use crate::context::SavedContext;
use crate::errors::ContextError;
use crate::mem::Stack;
use core::mem::offset_of;
use core::num::NonZeroUsize;
use portable_atomic::{AtomicU8, AtomicUsize, Ordering};

/// Thread entry point. Receives the argument seeded into r0.
pub type ThreadEntry = extern "C" fn(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(NonZeroUsize);

impl core::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ThreadId {
    /// Create a thread ID. Returns `None` for zero.
    pub const fn new(id: usize) -> Option<Self> {
        match NonZeroUsize::new(id) {
            Some(id) => Some(Self(id)),
            None => None,
        }
    }

    /// Create a new thread ID.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `id` is non-zero.
    pub const unsafe fn new_unchecked(id: usize) -> Self {
        Self(unsafe { NonZeroUsize::new_unchecked(id) })
    }

    /// Get the raw ID value.
    pub fn get(self) -> usize {
        self.0.get()
    }
}

/// Lifecycle states this core moves threads between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ThreadState {
    Ready = 0,
    Running = 1,
}

/// Per-thread record shared between the scheduler and the switch paths.
#[repr(C)]
#[derive(Debug)]
pub struct ThreadControlBlock {
    /// Address of this thread's saved context while it is suspended.
    /// Stale while the thread runs.
    saved_sp: AtomicUsize,
    id: ThreadId,
    state: AtomicU8,
    stack: Option<Stack>,
}

/// Byte offset of the saved stack pointer inside [`ThreadControlBlock`].
///
/// The hardware port and any assembly written against this crate rely on it.
pub const SAVED_SP_OFFSET: usize = offset_of!(ThreadControlBlock, saved_sp);

const _: () = assert!(SAVED_SP_OFFSET == 0);

impl ThreadControlBlock {
    /// Create a thread whose first resume calls `entry(arg)` on `stack`.
    ///
    /// Returning from `entry` lands in [`park_on_return`].
    pub fn new(
        id: ThreadId,
        stack: Stack,
        entry: ThreadEntry,
        arg: usize,
    ) -> Result<Self, ContextError> {
        let exit: extern "C" fn() -> ! = park_on_return;
        // SAFETY: the stack is owned by this TCB and unused so far.
        let sp = unsafe {
            SavedContext::seed(stack.base(), stack.top(), entry as usize, arg, exit as usize)?
        };
        Ok(Self {
            saved_sp: AtomicUsize::new(sp),
            id,
            state: AtomicU8::new(ThreadState::Ready as u8),
            stack: Some(stack),
        })
    }

    /// Wrap a context that was already laid out by someone else.
    ///
    /// # Safety
    ///
    /// `saved_sp` must point at a complete [`SavedContext`] on memory that
    /// outlives this TCB.
    pub const unsafe fn from_raw(id: ThreadId, saved_sp: usize) -> Self {
        Self {
            saved_sp: AtomicUsize::new(saved_sp),
            id,
            state: AtomicU8::new(ThreadState::Ready as u8),
            stack: None,
        }
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// Where the suspended register set lives.
    pub fn saved_sp(&self) -> usize {
        self.saved_sp.load(Ordering::Acquire)
    }

    /// Only the switch paths record suspension points.
    pub(crate) fn set_saved_sp(&self, sp: usize) {
        self.saved_sp.store(sp, Ordering::Release);
    }

    pub fn state(&self) -> ThreadState {
        match self.state.load(Ordering::Acquire) {
            1 => ThreadState::Running,
            _ => ThreadState::Ready,
        }
    }

    pub(crate) fn set_state(&self, state: ThreadState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn stack(&self) -> Option<&Stack> {
        self.stack.as_ref()
    }

    /// Copy of the saved context. Only meaningful while the thread is READY.
    ///
    /// # Safety
    ///
    /// The thread must be suspended, so that `saved_sp` is current.
    pub unsafe fn saved_context(&self) -> SavedContext {
        unsafe { SavedContext::read_at(self.saved_sp()) }
    }
}

/// Where a thread goes when its entry function returns.
pub extern "C" fn park_on_return() -> ! {
    log::warn!("thread entry returned; parking");
    loop {
        #[cfg(all(target_arch = "arm", target_feature = "v7"))]
        unsafe {
            core::arch::asm!("wfi", options(nomem, nostack));
        }
        #[cfg(not(all(target_arch = "arm", target_feature = "v7")))]
        core::hint::spin_loop();
    }
}
