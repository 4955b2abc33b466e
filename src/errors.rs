//! Error handling for the switching core.
//!
//! Two kinds of failure exist. Precondition failures are detected before
//! any register is touched and come back as [`KernelError`]. Invariant
//! violations inside a switch path cannot be recovered from (the affected
//! thread's registers are already gone), so they are reported through
//! [`fatal`] and halt the kernel.

use core::fmt;

/// Result type for kernel operations.
pub type KernelResult<T> = Result<T, KernelError>;

/// Umbrella error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// A switch was refused before anything was saved
    Switch(SwitchError),
    /// A context could not be seeded
    Context(ContextError),
    /// `logging::init` was called twice
    LoggerAlreadySet,
}

/// Reasons a switch request is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchError {
    /// No thread is current yet; call `Kernel::start` first
    NotStarted,
    /// `Kernel::start` was already called
    AlreadyStarted,
    /// The scheduler did not name a next thread
    NoNextThread,
    /// Voluntary switches are only legal from thread context
    InInterruptContext(usize),
}

/// Errors while building a thread's initial context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    /// The stack cannot hold a saved context (size in bytes)
    StackTooSmall(usize),
    /// The stack base is not word aligned
    Misaligned(usize),
}

/// Invariant violations that halt the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelFault {
    /// `exit_interrupt` ran with the nesting counter already at zero
    NestingUnderflow,
    /// An interrupt-context switch was requested without a next thread
    SwitchWithoutNext,
    /// A resume was attempted with a null saved stack pointer
    NullStackPointer,
    /// A switch path ran before any thread was current
    NoCurrentThread,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::Switch(e) => write!(f, "switch refused: {}", e),
            KernelError::Context(e) => write!(f, "context error: {}", e),
            KernelError::LoggerAlreadySet => write!(f, "logger already installed"),
        }
    }
}

impl fmt::Display for SwitchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwitchError::NotStarted => write!(f, "no current thread"),
            SwitchError::AlreadyStarted => write!(f, "kernel already started"),
            SwitchError::NoNextThread => write!(f, "next thread not set"),
            SwitchError::InInterruptContext(depth) => {
                write!(f, "called from interrupt context (nesting {})", depth)
            }
        }
    }
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextError::StackTooSmall(size) => write!(f, "stack too small: {} bytes", size),
            ContextError::Misaligned(addr) => write!(f, "stack base misaligned: {:#x}", addr),
        }
    }
}

impl fmt::Display for KernelFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelFault::NestingUnderflow => write!(f, "interrupt nesting underflow"),
            KernelFault::SwitchWithoutNext => write!(f, "interrupt switch with no next thread"),
            KernelFault::NullStackPointer => write!(f, "resume from null stack pointer"),
            KernelFault::NoCurrentThread => write!(f, "switch path with no current thread"),
        }
    }
}

impl From<SwitchError> for KernelError {
    fn from(error: SwitchError) -> Self {
        KernelError::Switch(error)
    }
}

impl From<ContextError> for KernelError {
    fn from(error: ContextError) -> Self {
        KernelError::Context(error)
    }
}

/// Report an invariant violation and halt.
#[cold]
#[track_caller]
pub fn fatal(fault: KernelFault) -> ! {
    log::error!("fatal kernel fault: {}", fault);
    panic!("fatal kernel fault: {}", fault)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_display_messages() {
        let err: KernelError = SwitchError::InInterruptContext(2).into();
        assert_eq!(
            err.to_string(),
            "switch refused: called from interrupt context (nesting 2)"
        );
        let err: KernelError = ContextError::Misaligned(0x1003).into();
        assert_eq!(err.to_string(), "context error: stack base misaligned: 0x1003");
    }

    #[test]
    #[should_panic(expected = "interrupt nesting underflow")]
    fn test_fatal_panics_with_fault() {
        fatal(KernelFault::NestingUnderflow);
    }
}
