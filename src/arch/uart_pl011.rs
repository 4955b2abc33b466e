//! PL011 UART console.
//!
//! Transmit-only driver used as the log sink and by the panic handler.
//! Boards place the PL011 at different addresses (0x101F1000 on
//! VersatilePB, 0x1000_9000 on RealView/vexpress), so the base is passed to
//! [`init`]. Output before `init` is dropped.

use core::fmt::{self, Write};
use core::ptr::{read_volatile, write_volatile};
use portable_atomic::{AtomicUsize, Ordering};

// Register offsets
const DR: usize = 0x00; // Data Register
const FR: usize = 0x18; // Flag Register
const IBRD: usize = 0x24; // Integer Baud Rate Divisor
const FBRD: usize = 0x28; // Fractional Baud Rate Divisor
const LCRH: usize = 0x2C; // Line Control Register
const CR: usize = 0x30; // Control Register
const ICR: usize = 0x44; // Interrupt Clear Register

// Flag register bits
const FR_TXFF: u32 = 1 << 5; // Transmit FIFO full

static BASE: AtomicUsize = AtomicUsize::new(0);

/// Initialize the PL011 at `base` for 8N1 output at `baud`.
///
/// # Safety
///
/// `base` must be the MMIO address of a PL011 clocked at `clock_hz`. Must be
/// called once during system initialization.
pub unsafe fn init(base: usize, clock_hz: u32, baud: u32) {
    // Divider = clock / (16 * baud), fractional part in 1/64ths.
    let div_x64 = (clock_hz as u64 * 4) / baud as u64;
    let ibrd = (div_x64 >> 6) as u32;
    let fbrd = (div_x64 & 0x3F) as u32;

    unsafe {
        // Disable while configuring
        write_volatile((base + CR) as *mut u32, 0);
        write_volatile((base + ICR) as *mut u32, 0x7FF);
        write_volatile((base + IBRD) as *mut u32, ibrd);
        write_volatile((base + FBRD) as *mut u32, fbrd);
        // WLEN=8, FEN=1
        write_volatile((base + LCRH) as *mut u32, (1 << 4) | (1 << 5) | (1 << 6));
        // UARTEN, TXE
        write_volatile((base + CR) as *mut u32, (1 << 0) | (1 << 8));
    }
    BASE.store(base, Ordering::Release);
}

/// Send a single byte over UART.
pub fn send_byte(byte: u8) {
    let base = BASE.load(Ordering::Acquire);
    if base == 0 {
        return;
    }
    unsafe {
        while read_volatile((base + FR) as *const u32) & FR_TXFF != 0 {
            core::hint::spin_loop();
        }
        write_volatile((base + DR) as *mut u32, byte as u32);
    }
}

/// Send a string over UART.
pub fn send_str(s: &str) {
    for byte in s.bytes() {
        if byte == b'\n' {
            send_byte(b'\r');
        }
        send_byte(byte);
    }
}

/// Writer for use with `write!`.
pub struct UartWriter;

impl Write for UartWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        send_str(s);
        Ok(())
    }
}

/// Log sink for [`crate::logging::init`].
pub fn write_fmt(args: fmt::Arguments<'_>) {
    let _ = UartWriter.write_fmt(args);
}

/// Print a formatted string to the PL011 console.
#[macro_export]
macro_rules! pl011_print {
    ($($arg:tt)*) => {
        $crate::arch::uart_pl011::write_fmt(format_args!($($arg)*))
    };
}

/// Print a formatted string to the PL011 console with a newline.
#[macro_export]
macro_rules! pl011_println {
    () => {
        $crate::pl011_print!("\n")
    };
    ($($arg:tt)*) => {{
        $crate::pl011_print!($($arg)*);
        $crate::pl011_print!("\n");
    }};
}
