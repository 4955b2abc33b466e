//! Thread stack regions.
//!
//! A [`Stack`] is either carved out of a `'static` buffer (the usual case on
//! bare metal) or allocated from the global allocator when one exists.

use crate::config::{MIN_THREAD_STACK, STACK_ALIGN, STACK_CANARY};
use crate::errors::ContextError;
use core::ptr::NonNull;

use alloc::alloc::{alloc_zeroed, dealloc, handle_alloc_error, Layout};

/// A contiguous region reserved for one thread's stack.
///
/// Stacks grow down: [`Stack::top`] is where the first push lands below.
pub struct Stack {
    /// Lowest address of the region
    memory: NonNull<u8>,
    /// Region size in bytes
    size: usize,
    /// Whether `memory` came from the global allocator
    owned: bool,
}

// The region is only touched by the thread that owns it and by the switch
// paths, which run with interrupts masked.
unsafe impl Send for Stack {}
unsafe impl Sync for Stack {}

impl Stack {
    /// Allocate a zeroed stack of `size` bytes.
    pub fn with_size(size: usize) -> Result<Self, ContextError> {
        if size < MIN_THREAD_STACK {
            return Err(ContextError::StackTooSmall(size));
        }
        let layout = Layout::from_size_align(size, STACK_ALIGN)
            .map_err(|_| ContextError::StackTooSmall(size))?;
        let ptr = unsafe { alloc_zeroed(layout) };
        let memory = match NonNull::new(ptr) {
            Some(memory) => memory,
            None => handle_alloc_error(layout),
        };
        Ok(Self {
            memory,
            size,
            owned: true,
        })
    }

    /// Use a static buffer as a stack.
    pub fn from_static(buf: &'static mut [usize]) -> Result<Self, ContextError> {
        let size = core::mem::size_of_val(buf);
        if size < MIN_THREAD_STACK {
            return Err(ContextError::StackTooSmall(size));
        }
        // A slice pointer is never null.
        let memory = NonNull::from(buf).cast::<u8>();
        Ok(Self {
            memory,
            size,
            owned: false,
        })
    }

    /// Lowest address of the region.
    pub fn base(&self) -> usize {
        self.memory.as_ptr() as usize
    }

    /// Highest usable address, rounded down to [`STACK_ALIGN`].
    pub fn top(&self) -> usize {
        (self.base() + self.size) & !(STACK_ALIGN - 1)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether `addr` lies inside the region (top inclusive).
    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.base() && addr <= self.base() + self.size
    }

    /// Write the canary word at the low end of the stack.
    pub fn install_canary(&self) {
        unsafe { core::ptr::write_volatile(self.base() as *mut usize, STACK_CANARY) };
    }

    /// Whether the canary word is still intact.
    pub fn check_canary(&self) -> bool {
        unsafe { core::ptr::read_volatile(self.base() as *const usize) == STACK_CANARY }
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        if self.owned {
            // Same layout as in `with_size`, which already validated it.
            if let Ok(layout) = Layout::from_size_align(self.size, STACK_ALIGN) {
                unsafe { dealloc(self.memory.as_ptr(), layout) };
            }
        }
    }
}

impl core::fmt::Debug for Stack {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Stack")
            .field("base", &format_args!("{:#x}", self.base()))
            .field("size", &self.size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::boxed::Box;
    use alloc::vec;

    #[test]
    fn test_stack_alignment_and_bounds() {
        let stack = Stack::with_size(4096).unwrap();
        assert_eq!(stack.base() % STACK_ALIGN, 0);
        assert_eq!(stack.top() % STACK_ALIGN, 0);
        assert_eq!(stack.top() - stack.base(), 4096);
        assert!(stack.contains(stack.top()));
        assert!(!stack.contains(stack.top() + 1));
    }

    #[test]
    fn test_stack_too_small() {
        assert_eq!(
            Stack::with_size(64).unwrap_err(),
            ContextError::StackTooSmall(64)
        );
    }

    #[test]
    fn test_static_stack() {
        let buf: &'static mut [usize] = Box::leak(vec![0usize; 256].into_boxed_slice());
        let len = core::mem::size_of_val(buf);
        let stack = Stack::from_static(buf).unwrap();
        assert_eq!(stack.size(), len);
    }

    #[test]
    fn test_stack_canary() {
        let stack = Stack::with_size(1024).unwrap();
        stack.install_canary();
        assert!(stack.check_canary());
        unsafe { core::ptr::write_volatile(stack.base() as *mut usize, 0) };
        assert!(!stack.check_canary());
    }
}
