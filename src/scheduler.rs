//! Cooperative FIFO scheduler. Grounded on the teacher's
//! `ProcessManager`: same ready-queue-plus-current-thread shape, but the
//! teacher's queue was a `VecDeque<u32>` guarded by one outer `Mutex`,
//! while the scheduler mutates an intrusive linked list and brackets
//! every mutation with `disable_interrupts`/`enable_interrupts` directly,
//! matching this spec's "queue mutations run with interrupts masked"
//! requirement rather than relying on a lock that could block in
//! interrupt context.

use crate::machine;
use crate::thread::Thread;
use core::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

/// Intrusive singly linked FIFO, sentinel-free: `head` is the oldest
/// runnable thread, `tail` the most recently queued. Callers must already
/// hold interrupts disabled for every method here.
struct Queue {
    head: AtomicPtr<Thread>,
    tail: AtomicPtr<Thread>,
    len: AtomicUsize,
}

impl Queue {
    const fn new() -> Queue {
        Queue {
            head: AtomicPtr::new(core::ptr::null_mut()),
            tail: AtomicPtr::new(core::ptr::null_mut()),
            len: AtomicUsize::new(0),
        }
    }

    fn push(&self, t: &'static mut Thread) {
        t.next.store(core::ptr::null_mut(), Ordering::Relaxed);
        let t_ptr = t as *mut Thread;
        let tail = self.tail.swap(t_ptr, Ordering::SeqCst);
        if tail.is_null() {
            self.head.store(t_ptr, Ordering::SeqCst);
        } else {
            unsafe { (*tail).next.store(t_ptr, Ordering::SeqCst) };
        }
        self.len.fetch_add(1, Ordering::SeqCst);
    }

    fn pop(&self) -> Option<&'static mut Thread> {
        let head = self.head.load(Ordering::SeqCst);
        if head.is_null() {
            return None;
        }
        let next = unsafe { (*head).next.load(Ordering::SeqCst) };
        self.head.store(next, Ordering::SeqCst);
        if next.is_null() {
            self.tail.store(core::ptr::null_mut(), Ordering::SeqCst);
        }
        self.len.fetch_sub(1, Ordering::SeqCst);
        Some(unsafe { &mut *head })
    }

    /// Linearly scans and unlinks the first node matching `t` by
    /// pointer, if present.
    fn delete(&self, t: *mut Thread) -> bool {
        let mut prev: *mut Thread = core::ptr::null_mut();
        let mut cur = self.head.load(Ordering::SeqCst);
        while !cur.is_null() {
            if cur == t {
                let next = unsafe { (*cur).next.load(Ordering::SeqCst) };
                if prev.is_null() {
                    self.head.store(next, Ordering::SeqCst);
                } else {
                    unsafe { (*prev).next.store(next, Ordering::SeqCst) };
                }
                if next.is_null() {
                    self.tail.store(prev, Ordering::SeqCst);
                }
                self.len.fetch_sub(1, Ordering::SeqCst);
                return true;
            }
            prev = cur;
            cur = unsafe { (*cur).next.load(Ordering::SeqCst) };
        }
        false
    }

    fn is_empty(&self) -> bool {
        self.head.load(Ordering::SeqCst).is_null()
    }
}

static READY: Queue = Queue::new();

/// Threads that terminated themselves and so could not free their own
/// stack mid-call (see `terminate`). Reaped one at a time on the next
/// call to `terminate` for some other thread.
static ZOMBIES: Queue = Queue::new();

/// Test-only instrumentation: counts calls to `yield_now`, so tests of
/// yield-until-ready adapters (e.g. `disk::BlockingDisk`) can assert an
/// exact number of yields rather than just that at least one happened.
#[cfg(test)]
static YIELD_COUNT: AtomicUsize = AtomicUsize::new(0);

#[cfg(test)]
pub fn reset_yield_count() {
    YIELD_COUNT.store(0, Ordering::SeqCst);
}

#[cfg(test)]
pub fn yield_count() -> usize {
    YIELD_COUNT.load(Ordering::SeqCst)
}

/// Appends `t` to the ready queue. `add` and `resume` are the same
/// operation under two names, matching the original's API surface.
pub fn resume(t: &'static mut Thread) {
    machine::disable_interrupts();
    READY.push(t);
    machine::enable_interrupts();
}

pub fn add(t: &'static mut Thread) {
    resume(t);
}

/// Gives up the CPU. If no other thread is ready, returns immediately
/// with interrupts re-enabled and the caller keeps running. Otherwise the
/// head of the ready queue is dispatched; the caller is not automatically
/// re-queued — call `resume(current)` first if it should run again.
pub fn yield_now() {
    #[cfg(test)]
    YIELD_COUNT.fetch_add(1, Ordering::SeqCst);

    machine::disable_interrupts();
    if READY.is_empty() {
        machine::enable_interrupts();
        return;
    }
    let next = READY.pop().expect("checked non-empty above");
    machine::enable_interrupts();
    Thread::dispatch_to(next);
}

/// Destroys `t`. If it is not the currently running thread it is first
/// removed from the ready queue (a no-op if it isn't on it — e.g. it is
/// blocked), then its stack and control block are freed immediately. A
/// thread terminating itself cannot free its own stack from inside this
/// call — that would pull the floor out from under the frame currently
/// executing on it — so it is parked on a zombie list instead and
/// destroyed the next time `terminate` runs for some other thread. A
/// thread terminating itself must not have called `resume(self)`
/// beforehand, since it is then by construction off the ready queue
/// while it runs; `terminate` never removes the caller from underneath
/// itself.
pub fn terminate(t: &'static mut Thread) {
    machine::disable_interrupts();
    let t_ptr = t as *mut Thread;
    let is_current = Thread::current().map(|c| c as *const Thread as *mut Thread) == Some(t_ptr);
    if !is_current {
        READY.delete(t_ptr);
    }
    let reaped = ZOMBIES.pop();
    if is_current {
        ZOMBIES.push(t);
    }
    machine::enable_interrupts();

    if let Some(z) = reaped {
        unsafe { crate::thread::destroy(z) };
    }
    if !is_current {
        unsafe { crate::thread::destroy(t) };
    }
    yield_now();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::Thread;
    use alloc::vec;

    fn dummy_entry() -> ! {
        loop {}
    }

    fn make_thread() -> &'static mut Thread {
        Thread::new(dummy_entry, 4096)
    }

    #[test]
    fn fifo_dispatch_order() {
        crate::thread::DISPATCH_LOG.lock().clear();
        let t1 = make_thread();
        let t2 = make_thread();
        let t3 = make_thread();
        let (id1, id2, id3) = (t1.id(), t2.id(), t3.id());

        add(t1);
        add(t2);
        add(t3);

        yield_now();
        yield_now();
        yield_now();

        assert_eq!(*crate::thread::DISPATCH_LOG.lock(), vec![id1, id2, id3]);
    }

    #[test]
    fn yield_with_empty_queue_is_a_no_op() {
        assert!(READY.is_empty());
        yield_now();
        assert!(READY.is_empty());
    }

    #[test]
    fn delete_removes_interior_node() {
        let t1 = make_thread();
        let t2 = make_thread();
        let t3 = make_thread();
        let t2_ptr = t2 as *mut Thread;

        machine::disable_interrupts();
        READY.push(t1);
        READY.push(t2);
        READY.push(t3);
        assert!(READY.delete(t2_ptr));
        assert!(!READY.delete(t2_ptr));
        machine::enable_interrupts();

        let first = READY.pop().unwrap();
        let second = READY.pop().unwrap();
        assert!(READY.pop().is_none());
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn terminate_of_a_non_current_thread_frees_it_immediately() {
        let bystander = make_thread();
        let victim = make_thread();
        let victim_ptr = victim as *mut Thread;
        add(bystander);

        terminate(victim);

        // victim was never queued, so terminate found nothing to unlink;
        // the pointer is dangling now, but delete() never dereferences a
        // non-matching node, so checking this is still sound.
        assert!(!READY.delete(victim_ptr));
        assert!(ZOMBIES.is_empty());
    }

    #[test]
    fn terminate_of_the_current_thread_defers_destruction_to_a_zombie_list() {
        let t1 = make_thread();
        Thread::dispatch_to(t1);
        let other = make_thread();
        add(other);

        terminate(t1);
        assert!(!ZOMBIES.is_empty());

        // A later terminate for someone else reaps the pending zombie.
        let bystander = make_thread();
        terminate(bystander);
        assert!(ZOMBIES.is_empty());
    }
}
