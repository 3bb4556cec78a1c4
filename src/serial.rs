//! COM1 serial console. Grounded on the teacher's `uart.rs` (same
//! `Mutex<T: fmt::Write>` plus `_print`/`print!`/`println!` shape), swapped
//! from ARM64 MMIO to the x86 UART's port-mapped registers.

use crate::machine;
use core::fmt;
use spin::Mutex;

const COM1: u16 = 0x3F8;

struct SerialPort {
    base: u16,
}

impl SerialPort {
    const fn new(base: u16) -> Self {
        SerialPort { base }
    }

    fn init(&self) {
        machine::outportb(self.base + 1, 0x00); // disable interrupts
        machine::outportb(self.base + 3, 0x80); // enable DLAB
        machine::outportb(self.base, 0x03); // divisor low byte: 38400 baud
        machine::outportb(self.base + 1, 0x00); // divisor high byte
        machine::outportb(self.base + 3, 0x03); // 8 bits, no parity, one stop bit
        machine::outportb(self.base + 2, 0xC7); // enable + clear FIFO, 14-byte threshold
        machine::outportb(self.base + 4, 0x0B); // IRQs enabled, RTS/DSR set
    }

    fn line_is_empty(&self) -> bool {
        machine::inportb(self.base + 5) & 0x20 != 0
    }

    fn write_byte(&self, byte: u8) {
        while !self.line_is_empty() {}
        machine::outportb(self.base, byte);
    }
}

impl fmt::Write for SerialPort {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            self.write_byte(byte);
        }
        Ok(())
    }
}

static SERIAL: Mutex<SerialPort> = Mutex::new(SerialPort::new(COM1));

pub fn init() {
    SERIAL.lock().init();
}

pub fn _print(args: fmt::Arguments) {
    use core::fmt::Write;
    SERIAL.lock().write_fmt(args).unwrap();
}

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::serial::_print(format_args!($($arg)*)));
}

#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}
