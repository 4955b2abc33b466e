//! Compile-time configuration for the switching core.

use crate::arch::psr::Mode;

/// Size in bytes of the dedicated IRQ-mode stack.
///
/// The trampoline only parks three working registers there before moving
/// to the interrupted thread's stack, so this stays small.
pub const IRQ_STACK_SIZE: usize = 256;

/// Number of working registers (r1-r3) the trampoline rescues onto the
/// IRQ stack before the interrupted thread's stack is used.
pub const IRQ_RESCUE_WORDS: usize = 3;

/// Smallest thread stack accepted when seeding a context.
///
/// One saved context plus room for a few nested interrupt frames.
pub const MIN_THREAD_STACK: usize = 512;

/// Stack pointer alignment required by the AAPCS at public interfaces.
pub const STACK_ALIGN: usize = 8;

/// Value written at the low end of a thread stack by `Stack::install_canary`.
pub const STACK_CANARY: usize = 0xDEAD_BEEF;

/// Processor mode a freshly seeded thread starts in.
pub const THREAD_INITIAL_MODE: Mode = Mode::Supervisor;

/// Log level used by `logging::init_default`.
pub const DEFAULT_LOG_LEVEL: log::LevelFilter = log::LevelFilter::Info;
