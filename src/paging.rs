//! Two-level x86 page-table manager: lazy fault-driven population of
//! page directories/tables, consulting the registered `VMPool` chain to
//! decide whether a faulting address is legitimate.

extern crate alloc;

use crate::config::{ENTRIES_PER_PAGE, PAGE_SIZE};
use crate::frame_pool::ContFramePool;
use crate::machine;
use crate::vm_pool::VMPool;
use alloc::boxed::Box;
use core::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};

bitflags::bitflags! {
    /// Low-order flag bits shared by page-directory and page-table
    /// entries on x86. The high bits of an entry are the frame number;
    /// these occupy the low 12.
    struct PageFlags: u32 {
        const PRESENT = 1 << 0;
        const WRITABLE = 1 << 1;
        const USER_ACCESSIBLE = 1 << 2;
    }
}

const PDE_PRESENT_WRITABLE_SUPERVISOR: u32 = PageFlags::PRESENT.bits() | PageFlags::WRITABLE.bits();
const PDE_NOT_PRESENT: u32 = PageFlags::WRITABLE.bits();
const PTE_NOT_PRESENT: u32 = PageFlags::WRITABLE.bits() | PageFlags::USER_ACCESSIBLE.bits();
const PTE_PRESENT_WRITABLE_SUPERVISOR: u32 = PageFlags::PRESENT.bits() | PageFlags::WRITABLE.bits();
const PTE_PRESENT_WRITABLE_USER: u32 =
    PageFlags::PRESENT.bits() | PageFlags::WRITABLE.bits() | PageFlags::USER_ACCESSIBLE.bits();
const PRESENT_BIT: u32 = PageFlags::PRESENT.bits();

static KERNEL_POOL: AtomicPtr<ContFramePool> = AtomicPtr::new(core::ptr::null_mut());
static PROCESS_POOL: AtomicPtr<ContFramePool> = AtomicPtr::new(core::ptr::null_mut());
static SHARED_SIZE: AtomicUsize = AtomicUsize::new(0);
static PAGING_ENABLED: AtomicBool = AtomicBool::new(false);
static CURRENT: AtomicPtr<PageTable> = AtomicPtr::new(core::ptr::null_mut());

/// One-time static initialization recording the two frame pools new page
/// tables draw from and `shared_size`, kept for API symmetry with the
/// original three-argument `init`; `PageTable::new` identity-maps all
/// 1024 entries of its first page table regardless of this value, same
/// as the original.
pub fn init_paging(kernel_pool: &'static ContFramePool, process_pool: &'static ContFramePool, shared_size: usize) {
    KERNEL_POOL.store(kernel_pool as *const _ as *mut _, Ordering::SeqCst);
    PROCESS_POOL.store(process_pool as *const _ as *mut _, Ordering::SeqCst);
    SHARED_SIZE.store(shared_size, Ordering::SeqCst);
}

fn kernel_pool() -> &'static ContFramePool {
    unsafe { &*KERNEL_POOL.load(Ordering::SeqCst) }
}

fn process_pool() -> &'static ContFramePool {
    unsafe { &*PROCESS_POOL.load(Ordering::SeqCst) }
}

fn frame_ptr(frame_no: usize) -> *mut u32 {
    (frame_no * PAGE_SIZE) as *mut u32
}

unsafe fn fill_table(table: *mut u32, value_for_entry: impl Fn(usize) -> u32) {
    for i in 0..ENTRIES_PER_PAGE {
        core::ptr::write_volatile(table.add(i), value_for_entry(i));
    }
}

/// A single page-directory's worth of address-space state, plus the
/// chain of VMPools registered against it for fault legitimacy checks.
pub struct PageTable {
    page_directory: *mut u32,
    vm_pools: AtomicPtr<VMPoolNode>,
}

struct VMPoolNode {
    pool: *const VMPool,
    next: *mut VMPoolNode,
}

unsafe impl Send for PageTable {}
unsafe impl Sync for PageTable {}

impl PageTable {
    /// Builds a fresh page directory: directory entry 0 points at a page
    /// table identity-mapping the entire first 4MB, frame-for-page,
    /// supervisor-writable; every other directory entry starts
    /// not-present. `shared_size` only governs how much of that identity
    /// map the rest of the kernel treats as the always-resident shared
    /// region (see `VMPool::new`'s caller in `main.rs`) — the table
    /// itself carries all 1024 entries present, matching the original's
    /// unconditional `page_table[frame_num] = (frame_num<<12)+3` loop.
    pub fn new() -> PageTable {
        let pd_frame = kernel_pool().get_frames(1);
        let page_directory = frame_ptr(pd_frame);

        let pt_frame = kernel_pool().get_frames(1);
        let page_table = frame_ptr(pt_frame);
        unsafe {
            fill_table(page_table, |i| ((i as u32) << 12) | PTE_PRESENT_WRITABLE_SUPERVISOR);
            core::ptr::write_volatile(
                page_directory,
                (pt_frame as u32) << 12 | PDE_PRESENT_WRITABLE_SUPERVISOR,
            );
            for i in 1..ENTRIES_PER_PAGE {
                core::ptr::write_volatile(page_directory.add(i), PDE_NOT_PRESENT);
            }
        }

        PageTable {
            page_directory,
            vm_pools: AtomicPtr::new(core::ptr::null_mut()),
        }
    }

    /// Records `self` as the current page table and writes its physical
    /// address into the paging-base control register.
    pub fn load(&'static self) {
        CURRENT.store(self as *const _ as *mut _, Ordering::SeqCst);
        machine::write_cr3(self.page_directory as u32);
    }

    /// Sets the paging-enable bit in the paging control register and
    /// flips the module-wide enabled flag.
    pub fn enable_paging() {
        machine::write_cr0(machine::read_cr0() | (1 << 31));
        PAGING_ENABLED.store(true, Ordering::SeqCst);
    }

    pub fn is_paging_enabled() -> bool {
        PAGING_ENABLED.load(Ordering::SeqCst)
    }

    /// Inserts a VMPool at the head of this page table's chain. Called
    /// from `VMPool::new`.
    pub fn register_pool(&self, pool: &'static VMPool) {
        let node = Box::leak(Box::new(VMPoolNode {
            pool: pool as *const VMPool,
            next: core::ptr::null_mut(),
        }));
        let mut prev = self.vm_pools.load(Ordering::SeqCst);
        loop {
            node.next = prev;
            match self.vm_pools.compare_exchange_weak(
                prev,
                node,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(actual) => prev = actual,
            }
        }
    }

    /// Walks the VMPool chain; true if any registered pool considers
    /// `addr` legitimate.
    pub fn check_address(&self, addr: u32) -> bool {
        let mut cursor = self.vm_pools.load(Ordering::SeqCst);
        while !cursor.is_null() {
            let node = unsafe { &*cursor };
            let pool = unsafe { &*node.pool };
            if pool.is_legitimate(addr as usize) {
                return true;
            }
            cursor = node.next;
        }
        false
    }

    /// The page-fault handler (exception vector 14). Reads the faulting
    /// address from the fault-address register, checks legitimacy
    /// against the VMPool chain (aborting if none claim it), lazily
    /// allocates a page-table frame if the directory entry is absent,
    /// then installs a fresh process-pool frame at the faulting page.
    pub fn handle_fault() {
        let addr = machine::read_cr2();
        let p1 = (addr >> 22) as usize;
        let p2 = ((addr >> 12) & 0x3FF) as usize;

        let current = unsafe { &*CURRENT.load(Ordering::SeqCst) };
        if !current.check_address(addr) {
            panic!("page fault at unmapped address {:#x}", addr);
        }

        let pde = unsafe { core::ptr::read_volatile(current.page_directory.add(p1)) };
        if pde & PRESENT_BIT == 0 {
            let pt_frame = kernel_pool().get_frames(1);
            let page_table = frame_ptr(pt_frame);
            unsafe {
                fill_table(page_table, |_| PTE_NOT_PRESENT);
                core::ptr::write_volatile(
                    current.page_directory.add(p1),
                    (pt_frame as u32) << 12 | PDE_PRESENT_WRITABLE_SUPERVISOR,
                );
            }
        }

        let pde = unsafe { core::ptr::read_volatile(current.page_directory.add(p1)) };
        let page_table = ((pde >> 12) << 12) as *mut u32; // mask flag bits before treating as a pointer
        let frame_no = process_pool().get_frames(1);
        unsafe {
            core::ptr::write_volatile(
                page_table.add(p2),
                (frame_no as u32) << 12 | PTE_PRESENT_WRITABLE_USER,
            );
        }
    }

    /// Releases the physical frame backing `page_no`, if one is
    /// installed, and resets the page-table entry to not-present. A
    /// no-op if the directory entry or the page-table entry is already
    /// absent (double-free is silent, per spec).
    pub fn free_page(&self, page_no: u32) {
        let p1 = (page_no >> 22) as usize;
        let p2 = ((page_no >> 12) & 0x3FF) as usize;

        let pde = unsafe { core::ptr::read_volatile(self.page_directory.add(p1)) };
        if pde & PRESENT_BIT == 0 {
            return;
        }
        let page_table = ((pde >> 12) << 12) as *mut u32;
        let pte = unsafe { core::ptr::read_volatile(page_table.add(p2)) };
        if pte & PRESENT_BIT == 0 {
            return;
        }

        ContFramePool::release_frames((pte >> 12) as usize);
        unsafe {
            core::ptr::write_volatile(page_table.add(p2), PTE_NOT_PRESENT);
        }
        machine::write_cr3(self.page_directory as u32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm_pool::VMPool;
    use alloc::alloc::{alloc_zeroed, Layout};

    /// Backs a pool of frame numbers with real heap memory so
    /// `frame_no * PAGE_SIZE` is always a dereferenceable address, the
    /// same trick `frame_pool::tests::make_pool` uses.
    fn make_region(n_frames: usize) -> usize {
        let layout = Layout::from_size_align(n_frames * PAGE_SIZE, PAGE_SIZE).unwrap();
        let mem = unsafe { alloc_zeroed(layout) };
        mem as usize / PAGE_SIZE
    }

    fn fresh_table() -> &'static mut PageTable {
        let base = make_region(600);
        let kernel_pool = ContFramePool::new(base, 64, 0, 0);
        let process_pool = ContFramePool::new(base + 64, 64, 0, 0);
        init_paging(kernel_pool, process_pool, 0);
        Box::leak(Box::new(PageTable::new()))
    }

    #[test]
    fn new_identity_maps_every_entry_of_the_first_page_table() {
        let base = make_region(16);
        let kernel_pool = ContFramePool::new(base, 8, 0, 0);
        let process_pool = ContFramePool::new(base + 8, 8, 0, 0);
        // shared_size is deliberately small: the fill must ignore it and
        // still map every entry of the first page table.
        init_paging(kernel_pool, process_pool, 2 * PAGE_SIZE);

        let table = PageTable::new();
        let pt_frame = unsafe { core::ptr::read_volatile(table.page_directory) } >> 12;
        let pt = frame_ptr(pt_frame as usize);
        for i in 0..ENTRIES_PER_PAGE {
            let pte = unsafe { core::ptr::read_volatile(pt.add(i)) };
            assert_eq!(pte & PRESENT_BIT, PRESENT_BIT);
            assert_eq!(pte >> 12, i as u32);
        }

        for i in 1..ENTRIES_PER_PAGE {
            let pde = unsafe { core::ptr::read_volatile(table.page_directory.add(i)) };
            assert_eq!(pde, PDE_NOT_PRESENT);
        }
    }

    #[test]
    fn handle_fault_installs_one_frame_and_is_idempotent_within_page() {
        let table = fresh_table();
        table.load();
        PageTable::enable_paging();
        let pool = VMPool::new(0x0040_0000, 4 * PAGE_SIZE, table);

        machine::set_fault_address(0x0040_0000);
        PageTable::handle_fault();

        let p1 = 0x0040_0000u32 >> 22;
        let pde = unsafe { core::ptr::read_volatile(table.page_directory.add(p1 as usize)) };
        assert_eq!(pde & PRESENT_BIT, PRESENT_BIT);
        let pt = ((pde >> 12) << 12) as *mut u32;
        let pte = unsafe { core::ptr::read_volatile(pt) };
        assert_eq!(pte & PRESENT_BIT, PRESENT_BIT);
        let first_frame = pte >> 12;

        // A second write inside the same page hits the already-installed
        // entry and causes no further fault handling.
        machine::set_fault_address(0x0040_0FFC);
        let pte_unchanged = unsafe { core::ptr::read_volatile(pt) };
        assert_eq!(pte_unchanged >> 12, first_frame);

        // A write to the next page faults again, installing a new frame.
        machine::set_fault_address(0x0040_1000);
        PageTable::handle_fault();
        let pte_next = unsafe { core::ptr::read_volatile(pt.add(1)) };
        assert_eq!(pte_next & PRESENT_BIT, PRESENT_BIT);
        assert_ne!(pte_next >> 12, first_frame);

        let _ = pool;
    }

    #[test]
    #[should_panic]
    fn handle_fault_on_unregistered_address_is_fatal() {
        let table = fresh_table();
        table.load();
        PageTable::enable_paging();
        let _pool = VMPool::new(0x0040_0000, PAGE_SIZE, table);

        machine::set_fault_address(0x0090_0000);
        PageTable::handle_fault();
    }

    #[test]
    fn free_page_releases_frame_and_resets_entry() {
        let table = fresh_table();
        table.load();
        PageTable::enable_paging();
        let _pool = VMPool::new(0x0040_0000, PAGE_SIZE, table);

        machine::set_fault_address(0x0040_0000);
        PageTable::handle_fault();

        table.free_page(0x0040_0000);

        let p1 = 0x0040_0000u32 >> 22;
        let pde = unsafe { core::ptr::read_volatile(table.page_directory.add(p1 as usize)) };
        let pt = ((pde >> 12) << 12) as *mut u32;
        let pte = unsafe { core::ptr::read_volatile(pt) };
        assert_eq!(pte, PTE_NOT_PRESENT);
    }

    #[test]
    fn free_page_with_absent_directory_entry_is_a_silent_no_op() {
        let table = fresh_table();
        table.load();
        // Directory entry for this address was never installed; freeing
        // it must not dereference a bogus page-table pointer.
        table.free_page(0x0080_0000);
    }

    #[test]
    fn register_pool_and_check_address() {
        let table = fresh_table();
        let pool = VMPool::new(0x0050_0000, 4 * PAGE_SIZE, table);
        assert!(table.check_address(0x0050_0000));
        assert!(!table.check_address(0x00A0_0000));
        let _ = pool;
    }
}
