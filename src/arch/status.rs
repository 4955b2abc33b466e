//! CPU status control: the critical-section primitive everything else leans on.

use super::psr::Psr;
use super::Arch;

/// Status word captured by [`Arch::save_and_mask`].
///
/// Opaque on purpose: the only thing to do with it is hand it back to
/// [`Arch::restore`], which reinstates whatever interrupt state existed at
/// capture time (possibly already masked).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "dropping a status token leaves interrupts masked"]
pub struct CpuStatus(Psr);

impl CpuStatus {
    pub(crate) const fn from_psr(psr: Psr) -> Self {
        Self(psr)
    }

    pub(crate) const fn psr(self) -> Psr {
        self.0
    }

    /// Whether IRQs were enabled when this token was captured.
    pub const fn irqs_were_enabled(self) -> bool {
        !self.0.irq_masked()
    }
}

/// RAII form of `save_and_mask` / `restore`.
///
/// Guards nest: an inner guard restores the already-masked state, so only
/// the outermost drop re-enables interrupts.
pub struct CriticalSection<'a, A: Arch> {
    arch: &'a A,
    saved: Option<CpuStatus>,
}

impl<'a, A: Arch> CriticalSection<'a, A> {
    pub fn enter(arch: &'a A) -> Self {
        let saved = arch.save_and_mask();
        Self {
            arch,
            saved: Some(saved),
        }
    }

    /// The status that will be restored on drop.
    pub fn saved(&self) -> Option<CpuStatus> {
        self.saved
    }
}

impl<A: Arch> Drop for CriticalSection<'_, A> {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            self.arch.restore(saved);
        }
    }
}

/// Run `f` with IRQ and FIQ masked.
pub fn with_interrupts_masked<A: Arch, R>(arch: &A, f: impl FnOnce() -> R) -> R {
    let _cs = CriticalSection::enter(arch);
    f()
}
