//! Kernel thread control block. Grounded on the teacher's `Process`
//! struct (`pid`, `state`, `stack_pointer`, `registers`) generalized from
//! a single-architecture process table entry into the lighter-weight
//! `Thread` this spec's scheduler moves around: no page-table-per-thread,
//! no syscall ABI, just an id, a stack, and a saved stack pointer.

extern crate alloc;

use alloc::boxed::Box;
use core::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

static NEXT_ID: AtomicUsize = AtomicUsize::new(1);
static CURRENT: AtomicPtr<Thread> = AtomicPtr::new(core::ptr::null_mut());

pub type EntryFn = fn() -> !;

pub struct Thread {
    id: usize,
    stack: Option<Box<[u8]>>,
    esp: u32,
    entry: Option<EntryFn>,
    pub(crate) next: AtomicPtr<Thread>,
}

impl Thread {
    /// Builds a thread with its own stack. The stack is pre-populated so
    /// the first `dispatch_to` lands in `thread_trampoline`, which reads
    /// `entry` back out of the thread and calls it.
    pub fn new(entry: EntryFn, stack_bytes: usize) -> &'static mut Thread {
        let mut stack = alloc::vec![0u8; stack_bytes].into_boxed_slice();
        let top = (stack.as_mut_ptr() as usize + stack_bytes) & !0xF;

        // Layout switch_to()'s epilogue expects to pop, from low to
        // high: ebx, esi, edi, ebp, return address.
        let mut sp = top - 5 * core::mem::size_of::<u32>();
        unsafe {
            core::ptr::write((sp + 16) as *mut u32, thread_trampoline as usize as u32);
            core::ptr::write((sp + 12) as *mut u32, 0); // ebp
            core::ptr::write((sp + 8) as *mut u32, 0); // edi
            core::ptr::write((sp + 4) as *mut u32, 0); // esi
            core::ptr::write(sp as *mut u32, 0); // ebx
        }

        let thread = Box::new(Thread {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            stack: Some(stack),
            esp: sp as u32,
            entry: Some(entry),
            next: AtomicPtr::new(core::ptr::null_mut()),
        });
        let _ = &mut sp;
        Box::leak(thread)
    }

    /// Wraps the thread of execution already running at boot time (which
    /// owns no separately-allocated stack of its own) so the scheduler has
    /// a `Thread` to record as current before the first real dispatch.
    pub fn init_boot() -> &'static mut Thread {
        let thread = Box::new(Thread {
            id: 0,
            stack: None,
            esp: 0,
            entry: None,
            next: AtomicPtr::new(core::ptr::null_mut()),
        });
        let boot = Box::leak(thread);
        CURRENT.store(boot as *mut Thread, Ordering::SeqCst);
        boot
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Returns the thread that is currently executing.
    pub fn current() -> Option<&'static Thread> {
        let ptr = CURRENT.load(Ordering::SeqCst);
        if ptr.is_null() {
            None
        } else {
            Some(unsafe { &*ptr })
        }
    }

    /// Switches execution to `next`. Must be called with interrupts
    /// enabled, per the scheduler's contract, so the newly running thread
    /// can still receive the timer tick.
    #[cfg(not(test))]
    pub fn dispatch_to(next: &'static mut Thread) {
        let prev = CURRENT.swap(next as *mut Thread, Ordering::SeqCst);
        unsafe {
            switch_to(&mut (*prev).esp as *mut u32, next.esp);
        }
    }

    #[cfg(test)]
    pub fn dispatch_to(next: &'static mut Thread) {
        DISPATCH_LOG.lock().push(next.id);
        CURRENT.store(next as *mut Thread, Ordering::SeqCst);
    }
}

/// Frees `t`'s stack and control block. Safety: `t` must not be the
/// currently executing thread — its call frames live inside `t.stack`,
/// and freeing that memory out from under the running frame is
/// undefined behavior. `scheduler::terminate` only calls this on threads
/// it has confirmed are not current, parking a self-terminating thread
/// on a zombie list to be destroyed by a later call instead.
pub unsafe fn destroy(t: &'static mut Thread) {
    drop(Box::from_raw(t as *mut Thread));
}

#[cfg(not(test))]
extern "C" fn thread_trampoline() -> ! {
    let current = Thread::current().expect("thread_trampoline with no current thread");
    let entry = current.entry.expect("thread_trampoline on a stackless thread");
    entry()
}

/// Saves the four callee-saved registers and the return address on the
/// outgoing thread's stack, swaps `esp`, and restores the same four
/// registers from the incoming thread's stack before returning into
/// whatever address its stack frame holds (either back into a previously
/// suspended `yield()` call, or into `thread_trampoline` the first time).
#[cfg(not(test))]
#[naked]
unsafe extern "C" fn switch_to(prev_esp_slot: *mut u32, next_esp: u32) {
    core::arch::asm!(
        "push ebp",
        "push edi",
        "push esi",
        "push ebx",
        "mov eax, [esp + 20]",
        "mov [eax], esp",
        "mov esp, [esp + 24]",
        "pop ebx",
        "pop esi",
        "pop edi",
        "pop ebp",
        "ret",
        options(noreturn)
    )
}

#[cfg(test)]
pub static DISPATCH_LOG: spin::Mutex<alloc::vec::Vec<usize>> = spin::Mutex::new(alloc::vec::Vec::new());
