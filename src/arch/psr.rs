//! Program status register model.
//!
//! The same bit layout is used by the hardware port (as an immediate for
//! `msr`/`mrs`) and by the host model, so both agree on what "masked" means.

use bitflags::bitflags;
use core::fmt;

bitflags! {
    /// Condition and control flags of the CPSR/SPSR.
    pub struct PsrFlags: u32 {
        const N = 1 << 31;
        const Z = 1 << 30;
        const C = 1 << 29;
        const V = 1 << 28;
        /// IRQ disable.
        const I = 1 << 7;
        /// FIQ disable.
        const F = 1 << 6;
        /// Thumb execution state.
        const T = 1 << 5;
    }
}

/// Mask of the mode field, bits [4:0].
pub const MODE_MASK: u32 = 0x1F;

/// Both interrupt-disable bits.
pub const IRQ_FIQ_MASK: u32 = PsrFlags::I.bits() | PsrFlags::F.bits();

/// Processor modes with banked registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Mode {
    User = 0x10,
    Fiq = 0x11,
    Irq = 0x12,
    Supervisor = 0x13,
    Abort = 0x17,
    Undefined = 0x1B,
    System = 0x1F,
}

impl Mode {
    /// Decode a mode field. Returns `None` for reserved encodings.
    pub const fn from_bits(bits: u32) -> Option<Self> {
        match bits & MODE_MASK {
            0x10 => Some(Mode::User),
            0x11 => Some(Mode::Fiq),
            0x12 => Some(Mode::Irq),
            0x13 => Some(Mode::Supervisor),
            0x17 => Some(Mode::Abort),
            0x1B => Some(Mode::Undefined),
            0x1F => Some(Mode::System),
            _ => None,
        }
    }

    /// Whether this mode runs with privilege.
    pub const fn is_privileged(self) -> bool {
        !matches!(self, Mode::User)
    }
}

/// A raw program status word.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct Psr(u32);

impl Psr {
    /// Build a status word for `mode` with the given flags set.
    pub const fn new(mode: Mode, flags: PsrFlags) -> Self {
        Self(mode as u32 | flags.bits())
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn mode(self) -> Option<Mode> {
        Mode::from_bits(self.0)
    }

    pub const fn flags(self) -> PsrFlags {
        PsrFlags::from_bits_truncate(self.0)
    }

    pub const fn with_mode(self, mode: Mode) -> Self {
        Self((self.0 & !MODE_MASK) | mode as u32)
    }

    pub const fn with(self, flags: PsrFlags) -> Self {
        Self(self.0 | flags.bits())
    }

    pub const fn without(self, flags: PsrFlags) -> Self {
        Self(self.0 & !flags.bits())
    }

    /// True when IRQs are disabled.
    pub const fn irq_masked(self) -> bool {
        self.0 & PsrFlags::I.bits() != 0
    }

    /// True when FIQs are disabled.
    pub const fn fiq_masked(self) -> bool {
        self.0 & PsrFlags::F.bits() != 0
    }

    pub const fn is_thumb(self) -> bool {
        self.0 & PsrFlags::T.bits() != 0
    }
}

impl fmt::Debug for Psr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode() {
            Some(mode) => write!(f, "Psr({:?}, {:?})", mode, self.flags()),
            None => write!(f, "Psr({:#x})", self.0),
        }
    }
}
