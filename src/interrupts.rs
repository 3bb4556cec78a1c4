//! Remapped IRQ dispatch (vectors 32-47, renumbered here as lines 0-15).
//! Grounded on the original's `InterruptHandler::register_handler` /
//! timer-on-line-0 setup. Deliberately does not call into the scheduler:
//! this is a cooperative kernel, so the timer line only advances a tick
//! counter and an unregistered line is silently acknowledged rather than
//! treated as fatal, since spurious IRQs are routine on real hardware.

use spin::Mutex;
use core::sync::atomic::{AtomicU64, Ordering};

pub trait InterruptHandler: Sync {
    fn handle_interrupt(&self);
}

const LINES: usize = 16;

static HANDLERS: Mutex<[Option<&'static dyn InterruptHandler>; LINES]> = Mutex::new([None; LINES]);
static TICKS: AtomicU64 = AtomicU64::new(0);

pub fn register_handler(line: u8, handler: &'static dyn InterruptHandler) {
    HANDLERS.lock()[line as usize] = Some(handler);
}

pub fn dispatch(line: u8) {
    if line == 0 {
        TICKS.fetch_add(1, Ordering::Relaxed);
    }
    if let Some(handler) = HANDLERS.lock()[line as usize] {
        handler.handle_interrupt();
    }
}

pub fn ticks() -> u64 {
    TICKS.load(Ordering::Relaxed)
}
