//! Bootstrap memory-map constants shared by the frame pools and the page table.

/// Size of a physical page frame and of a page-table/page-directory entry's
/// natural alignment unit.
pub const PAGE_SIZE: usize = 4096;

/// Entries per page directory / page table (x86 32-bit, non-PAE).
pub const ENTRIES_PER_PAGE: usize = 1024;

const MB: usize = 1 << 20;

/// `[2 MB, 4 MB)` in frame numbers — frames reserved for kernel-owned
/// allocations (page directories, page tables, VMPool metadata pages).
pub const KERNEL_POOL_START_FRAME: usize = (2 * MB) / PAGE_SIZE;
pub const KERNEL_POOL_N_FRAMES: usize = (2 * MB) / PAGE_SIZE;

/// `[4 MB, 32 MB)` — frames backing process/user memory.
pub const PROCESS_POOL_START_FRAME: usize = (4 * MB) / PAGE_SIZE;
pub const PROCESS_POOL_N_FRAMES: usize = (28 * MB) / PAGE_SIZE;

/// `[15 MB, 16 MB)` — a physical hole (legacy ISA / BIOS reservation on the
/// reference machine) that must never be handed out.
pub const MEM_HOLE_START_FRAME: usize = (15 * MB) / PAGE_SIZE;
pub const MEM_HOLE_N_FRAMES: usize = MB / PAGE_SIZE;

/// Size of the identity-mapped kernel prefix installed by every page table.
pub const SHARED_REGION_SIZE: usize = 4 * MB;
