#![no_std]
#![no_main]

extern crate alloc;
extern crate cont_kernel;

use core::panic::PanicInfo;

use cont_kernel::config;
use cont_kernel::frame_pool::ContFramePool;
use cont_kernel::paging::{self, PageTable};
use cont_kernel::test_framework::{TestResult, TestRunner};
use cont_kernel::vm_pool::VMPool;
use cont_kernel::{assert_eq_test, assert_test, panic as panic_runtime, println};

type TestFn = fn() -> TestResult;

const TESTS: &[(&str, TestFn)] = &[
    ("frame_pool_allocation_is_page_aligned", frame_pool_allocation_is_page_aligned),
    ("frame_pool_allocations_do_not_overlap", frame_pool_allocations_do_not_overlap),
    ("vm_pool_allocation_is_legitimate", vm_pool_allocation_is_legitimate),
];

#[no_mangle]
pub extern "C" fn kernel_main() -> ! {
    cont_kernel::boot();
    panic_runtime::set_handler(kernel_test_panic_handler);

    run_tests();
    println!("kernel test suite completed");
    loop {}
}

fn run_tests() {
    let mut runner = TestRunner::new();
    for &(name, test) in TESTS {
        runner.run_test(name, test);
    }
    runner.summary();
    if !runner.all_passed() {
        panic!("kernel test suite had failures");
    }
}

fn test_pools() -> (&'static ContFramePool, &'static ContFramePool) {
    let kernel_pool = ContFramePool::new(config::KERNEL_POOL_START_FRAME, config::KERNEL_POOL_N_FRAMES, 0, 0);
    let process_pool = ContFramePool::new(
        config::PROCESS_POOL_START_FRAME,
        config::PROCESS_POOL_N_FRAMES,
        0,
        0,
    );
    (kernel_pool, process_pool)
}

fn frame_pool_allocation_is_page_aligned() -> TestResult {
    let (kernel_pool, _) = test_pools();
    let frame = kernel_pool.get_frames(1);
    let addr = frame * config::PAGE_SIZE;
    assert_eq_test!(addr % config::PAGE_SIZE, 0);
    TestResult::Passed
}

fn frame_pool_allocations_do_not_overlap() -> TestResult {
    let (kernel_pool, _) = test_pools();
    let first = kernel_pool.get_frames(2);
    let second = kernel_pool.get_frames(2);
    assert_test!(second >= first + 2);
    TestResult::Passed
}

fn vm_pool_allocation_is_legitimate() -> TestResult {
    let (kernel_pool, process_pool) = test_pools();
    paging::init_paging(kernel_pool, process_pool, config::SHARED_REGION_SIZE);
    let page_table: &'static PageTable = alloc::boxed::Box::leak(alloc::boxed::Box::new(PageTable::new()));
    page_table.load();
    PageTable::enable_paging();

    let pool = VMPool::new(config::SHARED_REGION_SIZE, 8 * config::PAGE_SIZE, page_table);
    let region = pool.allocate(config::PAGE_SIZE).expect("allocate one page");
    assert_test!(pool.is_legitimate(region));
    TestResult::Passed
}

fn kernel_test_panic_handler(info: &PanicInfo) -> ! {
    println!("kernel test panic: {}", info);
    loop {}
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    panic_runtime::handle(info)
}
