//! Contiguous physical frame allocator.
//!
//! Frames are tracked two bits at a time in a byte-packed bitmap: four
//! frame descriptors per byte, most-significant pair first. A run of
//! allocated frames is represented as exactly one `HeadOfSequence` frame
//! followed by zero or more `Allocated` frames, so `release_frames` can
//! recover the run length without a side table.

extern crate alloc;

use crate::config::PAGE_SIZE;
use alloc::boxed::Box;
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};
use spin::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Free,
    HeadOfSequence,
    Allocated,
    Inaccessible,
}

impl FrameState {
    fn bits(self) -> u8 {
        match self {
            FrameState::Free => 0b00,
            FrameState::HeadOfSequence => 0b01,
            FrameState::Allocated => 0b10,
            FrameState::Inaccessible => 0b11,
        }
    }

    fn from_bits(bits: u8) -> FrameState {
        match bits & 0b11 {
            0b00 => FrameState::Free,
            0b01 => FrameState::HeadOfSequence,
            0b10 => FrameState::Allocated,
            0b11 => FrameState::Inaccessible,
            _ => unreachable!(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    OutOfFrames,
    InvalidRelease,
}

/// A typed view of a two-bit-per-frame bitmap. `base` is the address the
/// bitmap bytes live at (either inside the pool itself or in a
/// caller-supplied management range); `n_frames` bounds valid indices.
struct Bitmap {
    base: *mut u8,
    n_frames: usize,
}

unsafe impl Send for Bitmap {}

impl Bitmap {
    fn byte_offset(index: usize) -> (usize, u32) {
        (index / 4, 6 - 2 * (index % 4) as u32)
    }

    fn get(&self, index: usize) -> FrameState {
        debug_assert!(index < self.n_frames);
        let (byte, shift) = Self::byte_offset(index);
        let byte_val = unsafe { ptr::read_volatile(self.base.add(byte)) };
        FrameState::from_bits(byte_val >> shift)
    }

    fn set(&mut self, index: usize, state: FrameState) {
        debug_assert!(index < self.n_frames);
        let (byte, shift) = Self::byte_offset(index);
        unsafe {
            let mut byte_val = ptr::read_volatile(self.base.add(byte));
            byte_val &= !(0b11 << shift);
            byte_val |= state.bits() << shift;
            ptr::write_volatile(self.base.add(byte), byte_val);
        }
    }

    fn set_run(&mut self, base: usize, n: usize, state: FrameState) {
        for i in base..base + n {
            self.set(i, state);
        }
    }
}

struct Inner {
    base_frame_no: usize,
    n_frames: usize,
    #[allow(dead_code)]
    info_frame_no: usize,
    #[allow(dead_code)]
    n_info_frames: usize,
    bitmap: Bitmap,
}

impl Inner {
    /// First-fit, lowest-address search for `n` contiguous `Free` frames.
    /// Returns the pool-relative index of the run's head.
    fn find_run(&self, n: usize) -> Option<usize> {
        let mut last_head = 0usize;
        let mut count = 0usize;
        for i in 0..self.n_frames {
            if self.bitmap.get(i) == FrameState::Free {
                count += 1;
                if count >= n {
                    return Some(last_head);
                }
            } else {
                last_head = i + 1;
                count = 0;
            }
        }
        None
    }
}

pub struct ContFramePool {
    inner: Mutex<Inner>,
    next: AtomicPtr<ContFramePool>,
}

/// Global singly linked list of live pools, anchored at `HEAD`, used
/// solely to route `release_frames(frame_no)` to its owning pool. New
/// pools are inserted at the head (the original source spliced new pools
/// as `head->next`, silently losing everything but the first two pools —
/// that bug is not reproduced here: see DESIGN.md).
static HEAD: AtomicPtr<ContFramePool> = AtomicPtr::new(ptr::null_mut());

// SAFETY: pools are allocated once at boot and leaked for the remainder
// of execution; `inner` is behind its own lock and `next` is only ever
// written once, at construction, before the pool is published to `HEAD`.
unsafe impl Sync for ContFramePool {}

impl ContFramePool {
    /// Creates a pool owning `[base_frame_no, base_frame_no + n_frames)`.
    ///
    /// If `info_frame_no` and `n_info_frames` are both zero, the bitmap is
    /// placed in the first `needed_info_frames(n_frames)` frames of the
    /// pool itself, and those frames are marked as a single allocated run
    /// so the allocator never hands them out. Otherwise the bitmap lives
    /// at `info_frame_no` in a caller-managed frame range.
    ///
    /// Panics if `n_frames` is not a multiple of 4 (the bitmap would not
    /// be byte-aligned) or if the info frames cannot hold `n_frames`
    /// descriptors.
    pub fn new(
        base_frame_no: usize,
        n_frames: usize,
        info_frame_no: usize,
        n_info_frames: usize,
    ) -> &'static ContFramePool {
        assert!(n_frames % 4 == 0, "n_frames must be a multiple of 4");

        let (info_frame_no, n_info_frames) = if info_frame_no == 0 && n_info_frames == 0 {
            (base_frame_no, Self::needed_info_frames(n_frames))
        } else {
            (info_frame_no, n_info_frames)
        };
        assert!(n_frames <= PAGE_SIZE * 4 * n_info_frames);

        let bitmap_base = (info_frame_no * PAGE_SIZE) as *mut u8;
        let mut bitmap = Bitmap {
            base: bitmap_base,
            n_frames,
        };
        bitmap.set_run(0, n_frames, FrameState::Free);

        let bitmap_is_internal = info_frame_no == base_frame_no;
        if bitmap_is_internal {
            bitmap.set(0, FrameState::HeadOfSequence);
            if n_info_frames > 1 {
                bitmap.set_run(1, n_info_frames - 1, FrameState::Allocated);
            }
        }

        let pool = ContFramePool {
            inner: Mutex::new(Inner {
                base_frame_no,
                n_frames,
                info_frame_no,
                n_info_frames,
                bitmap,
            }),
            next: AtomicPtr::new(ptr::null_mut()),
        };

        // Pools are long-lived kernel singletons with no teardown path;
        // leaking the allocation is intentional.
        let leaked: &'static mut ContFramePool = Box::leak(Box::new(pool));

        let mut prev = HEAD.load(Ordering::SeqCst);
        loop {
            leaked.next.store(prev, Ordering::SeqCst);
            match HEAD.compare_exchange_weak(
                prev,
                leaked as *mut ContFramePool,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(actual) => prev = actual,
            }
        }

        leaked
    }

    /// Reserve a contiguous run of `n` frames. Precondition: `n > 0`.
    /// This is the fatal-on-failure entry point used by internal callers
    /// (the page-table manager) that have no recovery path; see
    /// `try_get_frames` for a non-fatal variant.
    pub fn get_frames(&self, n: usize) -> usize {
        self.try_get_frames(n).expect("frame pool exhausted")
    }

    /// Same as `get_frames` but returns `Err(FrameError::OutOfFrames)`
    /// instead of panicking when no run of `n` free frames exists.
    pub fn try_get_frames(&self, n: usize) -> Result<usize, FrameError> {
        assert!(n > 0);
        let mut inner = self.inner.lock();
        let last_head = inner.find_run(n).ok_or(FrameError::OutOfFrames)?;
        inner.bitmap.set(last_head, FrameState::HeadOfSequence);
        if n > 1 {
            inner
                .bitmap
                .set_run(last_head + 1, n - 1, FrameState::Allocated);
        }
        Ok(last_head + inner.base_frame_no)
    }

    /// Marks `[base, base + n)` (absolute frame numbers) as
    /// `Inaccessible`. Used by the bootstrap to reserve physical-memory
    /// holes the allocator must never search into.
    pub fn mark_inaccessible(&self, base: usize, n: usize) {
        assert!(n > 0);
        let mut inner = self.inner.lock();
        let rel = base - inner.base_frame_no;
        inner.bitmap.set_run(rel, n, FrameState::Inaccessible);
    }

    /// Releases the run beginning at `first_frame_no`, a static operation
    /// since the caller knows only the frame number, not which pool owns
    /// it. Walks the global pool list to find the owner, then clears the
    /// head and every contiguous `Allocated` frame that follows. Panics
    /// if no pool owns the frame or if it is not currently a head.
    pub fn release_frames(first_frame_no: usize) {
        Self::try_release_frames(first_frame_no).expect("release of frame not currently a head");
    }

    pub fn try_release_frames(first_frame_no: usize) -> Result<(), FrameError> {
        let mut cursor = HEAD.load(Ordering::SeqCst);
        while !cursor.is_null() {
            let pool = unsafe { &*cursor };
            let mut inner = pool.inner.lock();
            if first_frame_no >= inner.base_frame_no
                && first_frame_no < inner.base_frame_no + inner.n_frames
            {
                let rel = first_frame_no - inner.base_frame_no;
                if inner.bitmap.get(rel) != FrameState::HeadOfSequence {
                    return Err(FrameError::InvalidRelease);
                }
                inner.bitmap.set(rel, FrameState::Free);
                let mut cur = rel + 1;
                while cur < inner.n_frames && inner.bitmap.get(cur) == FrameState::Allocated {
                    inner.bitmap.set(cur, FrameState::Free);
                    cur += 1;
                }
                return Ok(());
            }
            drop(inner);
            cursor = pool.next.load(Ordering::SeqCst);
        }
        Err(FrameError::InvalidRelease)
    }

    pub fn needed_info_frames(n_frames: usize) -> usize {
        (n_frames + PAGE_SIZE * 4 - 1) / (PAGE_SIZE * 4)
    }

    #[cfg(test)]
    fn frame_state(&self, absolute_frame_no: usize) -> FrameState {
        let inner = self.inner.lock();
        inner.bitmap.get(absolute_frame_no - inner.base_frame_no)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::alloc::{alloc_zeroed, Layout};

    /// Host-test stand-in for a physical pool: a heap allocation playing
    /// the role of frame-addressed memory, with `base_frame_no` chosen so
    /// `frame_no * PAGE_SIZE` lands inside it.
    fn make_pool(n_frames: usize) -> (&'static ContFramePool, usize) {
        let n_info = ContFramePool::needed_info_frames(n_frames);
        let total_frames = n_frames + n_info;
        let layout = Layout::from_size_align(total_frames * PAGE_SIZE, PAGE_SIZE).unwrap();
        let region = unsafe { alloc_zeroed(layout) };
        let base_frame_no = region as usize / PAGE_SIZE;
        let pool = ContFramePool::new(base_frame_no, n_frames, 0, 0);
        (pool, base_frame_no)
    }

    #[test]
    fn contiguity_after_get_frames() {
        let (pool, base) = make_pool(64);
        let f = pool.get_frames(5);
        assert_eq!(pool.frame_state(f), FrameState::HeadOfSequence);
        for i in 1..5 {
            assert_eq!(pool.frame_state(f + i), FrameState::Allocated);
        }
        assert!(f >= base);
    }

    #[test]
    fn round_trip_restores_free() {
        let (pool, base) = make_pool(64);
        let n_info = ContFramePool::needed_info_frames(64);
        let f1 = pool.get_frames(3);
        let f2 = pool.get_frames(4);
        ContFramePool::release_frames(f1);
        ContFramePool::release_frames(f2);
        for i in n_info..64 {
            assert_eq!(pool.frame_state(base + i), FrameState::Free);
        }
    }

    #[test]
    fn lowest_address_first_fit() {
        let (pool, base) = make_pool(64);
        // Consume everything, then release three runs at known offsets
        // so the next get_frames must pick the lowest one.
        let n_info = ContFramePool::needed_info_frames(64);
        let a = pool.get_frames(4); // right after info frames
        let b = pool.get_frames(4);
        let _c = pool.get_frames(4);
        ContFramePool::release_frames(a);
        ContFramePool::release_frames(b);
        let got = pool.get_frames(4);
        assert_eq!(got, base + n_info);
    }

    #[test]
    fn run_boundaries_exact() {
        let (pool, _base) = make_pool(32);
        let f = pool.get_frames(6);
        ContFramePool::release_frames(f);
        // The frame right after the run must be untouched by the release
        // (it was never part of the run, so it stays Free throughout).
        assert_eq!(pool.frame_state(f), FrameState::Free);
        assert_eq!(pool.frame_state(f + 5), FrameState::Free);
    }

    #[test]
    fn mark_inaccessible_excludes_hole() {
        let (pool, base) = make_pool(64);
        let n_info = ContFramePool::needed_info_frames(64);
        pool.mark_inaccessible(base + 40, 8);
        for _ in 0..20 {
            let f = pool.get_frames(2);
            let rel = f - base;
            assert!(!(rel >= 40 && rel < 48));
        }
        let _ = n_info;
    }

    #[test]
    #[should_panic]
    fn release_non_head_is_fatal() {
        let (pool, base) = make_pool(32);
        let f = pool.get_frames(4);
        let _ = base;
        ContFramePool::release_frames(f + 1);
    }
}
