//! Virtual-memory region pool: carves `[base_address, base_address +
//! size)` into variable-size allocated regions, tracked in a
//! fixed-capacity `heapless::Vec` that lives on the pool's own first
//! page (the pool needs memory before any other allocator exists to
//! bootstrap it, so the free-list has to live inside the region it
//! manages).

use crate::config::PAGE_SIZE;
use crate::paging::PageTable;
use core::sync::atomic::{AtomicUsize, Ordering};
use heapless::Vec as RegionVec;
use spin::Mutex;

pub const MAX_REGION_LIST_SIZE: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VMPoolError {
    RegionTableFull,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Region {
    base: usize,
    size: usize,
}

struct Descriptors {
    regions: RegionVec<Region, MAX_REGION_LIST_SIZE>,
}

pub struct VMPool {
    base_address: usize,
    size_frames: usize,
    page_table: &'static PageTable,
    descriptors: Mutex<Descriptors>,
    next_frames_taken: AtomicUsize,
}

impl VMPool {
    /// `size_bytes` is the pool's total address-range size; it is stored
    /// internally as a frame count. The pool's first page is reserved to
    /// host the descriptor array itself and seeded as descriptor 0.
    pub fn new(base_address: usize, size_bytes: usize, page_table: &'static PageTable) -> &'static VMPool {
        extern crate alloc;
        let mut regions = RegionVec::new();
        regions
            .push(Region {
                base: base_address,
                size: PAGE_SIZE,
            })
            .expect("a fresh descriptor list has room for its first entry");
        let descriptors = Descriptors { regions };

        let pool = alloc::boxed::Box::leak(alloc::boxed::Box::new(VMPool {
            base_address,
            size_frames: size_bytes / PAGE_SIZE,
            page_table,
            descriptors: Mutex::new(descriptors),
            next_frames_taken: AtomicUsize::new(0),
        }));
        page_table.register_pool(pool);
        pool
    }

    fn frames_to_bytes(size_bytes: usize) -> usize {
        ((size_bytes + PAGE_SIZE - 1) / PAGE_SIZE) * PAGE_SIZE
    }

    /// First-fit allocation between existing regions; appends after the
    /// last region if no interior gap is large enough. Backing frames are
    /// not touched here — they are installed lazily on page fault.
    pub fn allocate(&self, size_bytes: usize) -> Result<usize, VMPoolError> {
        let k_bytes = Self::frames_to_bytes(size_bytes);
        let mut desc = self.descriptors.lock();
        let live = desc.regions.len();

        for i in 0..live.saturating_sub(1) {
            let gap = desc.regions[i + 1].base - (desc.regions[i].base + desc.regions[i].size);
            if k_bytes <= gap {
                let new_base = desc.regions[i].base + desc.regions[i].size;
                desc.regions
                    .insert(
                        i + 1,
                        Region {
                            base: new_base,
                            size: k_bytes,
                        },
                    )
                    .map_err(|_| VMPoolError::RegionTableFull)?;
                return Ok(new_base);
            }
        }

        let new_base = desc.regions[live - 1].base + desc.regions[live - 1].size;
        desc.regions
            .push(Region {
                base: new_base,
                size: k_bytes,
            })
            .map_err(|_| VMPoolError::RegionTableFull)?;
        Ok(new_base)
    }

    /// Releases the region starting at `start_address`: every
    /// frame-aligned offset within it is torn down via
    /// `PageTable::free_page`, then the descriptor is removed and every
    /// entry after it shifts down. A silent no-op if no region has that
    /// base.
    pub fn release(&self, start_address: usize) {
        let mut desc = self.descriptors.lock();
        for i in 0..desc.regions.len() {
            if desc.regions[i].base == start_address {
                let size = desc.regions[i].size;
                let mut offset = 0;
                while offset < size {
                    self.page_table.free_page((start_address + offset) as u32);
                    offset += PAGE_SIZE;
                }
                desc.regions.remove(i);
                return;
            }
        }
    }

    /// True if `addr` is the pool's descriptor-page anchor, or falls
    /// inside some currently-allocated region.
    pub fn is_legitimate(&self, addr: usize) -> bool {
        if addr == self.base_address {
            return true;
        }
        let desc = self.descriptors.lock();
        desc.regions
            .iter()
            .any(|region| region.base <= addr && addr < region.base + region.size)
    }

    #[cfg(test)]
    fn descriptor_snapshot(&self) -> alloc::vec::Vec<(usize, usize)> {
        let desc = self.descriptors.lock();
        desc.regions.iter().map(|r| (r.base, r.size)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PAGE_SIZE;
    use crate::frame_pool::ContFramePool;
    use crate::paging;
    use alloc::alloc::{alloc_zeroed, Layout};

    fn make_address_space() -> (&'static PageTable, usize) {
        let region_pages = 512usize;
        let layout = Layout::from_size_align(region_pages * PAGE_SIZE, PAGE_SIZE).unwrap();
        let mem = unsafe { alloc_zeroed(layout) };
        let base_frame_no = mem as usize / PAGE_SIZE;

        let kernel_pool = ContFramePool::new(base_frame_no, 64, 0, 0);
        let process_pool = ContFramePool::new(base_frame_no + 64, 64, 0, 0);
        paging::init_paging(kernel_pool, process_pool, 0);

        let table: &'static PageTable = alloc::boxed::Box::leak(alloc::boxed::Box::new(PageTable::new()));
        table.load();
        (table, mem as usize + 256 * PAGE_SIZE)
    }

    #[test]
    fn first_fit_reuses_released_gap() {
        let (table, base) = make_address_space();
        let pool = VMPool::new(base, 32 * PAGE_SIZE, table);

        let a = pool.allocate(PAGE_SIZE).unwrap(); // 4 KiB
        let b = pool.allocate(2 * PAGE_SIZE).unwrap(); // 8 KiB
        let c = pool.allocate(PAGE_SIZE).unwrap(); // 4 KiB
        let _ = a;
        pool.release(b);

        let reused = pool.allocate(2 * PAGE_SIZE).unwrap();
        assert_eq!(reused, b);

        let appended = pool.allocate(3 * PAGE_SIZE).unwrap();
        assert!(appended >= c + PAGE_SIZE);
    }

    #[test]
    fn descriptors_stay_sorted_and_compacted() {
        let (table, base) = make_address_space();
        let pool = VMPool::new(base, 32 * PAGE_SIZE, table);

        let a = pool.allocate(PAGE_SIZE).unwrap();
        let b = pool.allocate(PAGE_SIZE).unwrap();
        let _c = pool.allocate(PAGE_SIZE).unwrap();
        pool.release(b);

        let snap = pool.descriptor_snapshot();
        let mut prev = 0usize;
        for (i, (base_i, size_i)) in snap.iter().enumerate() {
            assert!(*size_i > 0);
            if i > 0 {
                assert!(*base_i > prev);
            }
            prev = *base_i + *size_i;
        }
        let _ = a;
    }

    #[test]
    fn legitimacy_matches_allocated_regions() {
        let (table, base) = make_address_space();
        let pool = VMPool::new(base, 16 * PAGE_SIZE, table);

        assert!(pool.is_legitimate(base));

        let r = pool.allocate(2 * PAGE_SIZE).unwrap();
        assert!(pool.is_legitimate(r));
        assert!(pool.is_legitimate(r + PAGE_SIZE));
        assert!(pool.is_legitimate(r + 2 * PAGE_SIZE - 1));
        assert!(!pool.is_legitimate(r + 4 * PAGE_SIZE));
    }
}
