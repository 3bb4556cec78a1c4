#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![feature(abi_x86_interrupt)]
#![feature(naked_functions)]
#![test_runner(cont_kernel::test_framework::test_runner)]
#![reexport_test_harness_main = "test_main"]

extern crate alloc;
extern crate cont_kernel;

use core::panic::PanicInfo;

use cont_kernel::config;
use cont_kernel::frame_pool::ContFramePool;
use cont_kernel::paging::{self, PageTable};
use cont_kernel::scheduler;
use cont_kernel::thread::Thread;
use cont_kernel::println;
use cont_kernel::vm_pool::VMPool;

#[no_mangle]
pub extern "C" fn kernel_main() -> ! {
    cont_kernel::boot();
    println!("cont_kernel booting");

    let kernel_pool = ContFramePool::new(
        config::KERNEL_POOL_START_FRAME,
        config::KERNEL_POOL_N_FRAMES,
        0,
        0,
    );
    let process_pool = ContFramePool::new(
        config::PROCESS_POOL_START_FRAME,
        config::PROCESS_POOL_N_FRAMES,
        0,
        0,
    );
    process_pool.mark_inaccessible(config::MEM_HOLE_START_FRAME, config::MEM_HOLE_N_FRAMES);
    println!("frame pools initialized");

    paging::init_paging(kernel_pool, process_pool, config::SHARED_REGION_SIZE);
    let page_table: &'static PageTable = alloc::boxed::Box::leak(alloc::boxed::Box::new(PageTable::new()));
    page_table.load();
    PageTable::enable_paging();
    println!("paging enabled");

    let process_vm = VMPool::new(config::SHARED_REGION_SIZE, 16 * config::PAGE_SIZE, page_table);
    println!("process VMPool registered at {:#x}", config::SHARED_REGION_SIZE);
    let _ = process_vm;

    Thread::init_boot();
    let worker = Thread::new(idle_worker, 4096);
    scheduler::add(worker);

    #[cfg(test)]
    test_main();

    loop {
        scheduler::yield_now();
    }
}

fn idle_worker() -> ! {
    loop {
        scheduler::yield_now();
    }
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    cont_kernel::panic::handle(info)
}
