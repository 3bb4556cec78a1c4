//! Kernel heap, backing the `alloc` collections used by the scheduler's
//! ready queue and the handler tables in `idt`/`interrupts`.
//!
//! Grounded on the teacher's `memory::init`, which sizes the heap from
//! linker-provided `__heap_start`/`__heap_end` symbols. The global
//! allocator itself is compiled out under `cfg(test)` so hosted unit
//! tests run against std's allocator instead of a physical-address-based
//! one that makes no sense off real hardware.

#[cfg(not(test))]
use linked_list_allocator::LockedHeap;

#[cfg(not(test))]
#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

#[cfg(not(test))]
extern "C" {
    static __heap_start: u8;
    static __heap_end: u8;
}

#[cfg(not(test))]
pub fn init() {
    let heap_start = unsafe { &__heap_start as *const u8 as usize };
    let heap_end = unsafe { &__heap_end as *const u8 as usize };
    let heap_size = heap_end - heap_start;
    unsafe {
        ALLOCATOR.lock().init(heap_start as *mut u8, heap_size);
    }
}

#[cfg(test)]
pub fn init() {}
