#![cfg_attr(not(test), no_std)]
#![feature(abi_x86_interrupt)]
#![cfg_attr(not(test), feature(naked_functions))]
#![cfg_attr(not(test), feature(custom_test_frameworks))]
#![cfg_attr(not(test), test_runner(crate::test_framework::test_runner))]
#![cfg_attr(not(test), reexport_test_harness_main = "test_main")]

// Unit tests (the #[cfg(test)] mod in frame_pool.rs, paging.rs, vm_pool.rs
// and scheduler.rs) run hosted, against std, with the kernel's own
// #[global_allocator] switched off (see heap.rs) — the same trick several
// no_std kernels in this space use to keep logic testable without a real
// boot. The `kernel_tests` binary is the complement: it boots for real and
// exercises this same module tree on bare metal / QEMU.
extern crate alloc;

pub mod config;
pub mod disk;
pub mod exceptions;
pub mod frame_pool;
pub mod gdt;
pub mod heap;
pub mod idt;
pub mod interrupts;
pub mod machine;
pub mod paging;
pub mod panic;
pub mod pic;
pub mod scheduler;
pub mod serial;
pub mod test_framework;
pub mod thread;
pub mod vm_pool;

/// Runs the full boot sequence shared by the `kernel` binary and the
/// `kernel_tests` smoke-test binary, so the two never drift apart.
#[cfg(not(test))]
pub fn boot() {
    gdt::init();
    serial::init();
    idt::init();
    pic::init();
    heap::init();
    machine::enable_interrupts();
}
