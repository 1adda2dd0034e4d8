// Thread Control
//
// Keeps a `CpuContext` register-save shape and raw `switch_context` /
// `switch_to_context` extern declarations (neither has a linked
// implementation anywhere in this kernel — they are the hand-off points a
// real `switch.S` would fill in) and layers the full scheduling data model
// on top: base/effective priority, donation bookkeeping, MLFQ fields, and the
// sleep timestamp.
//
// `switch_context` is modeled as a cooperative register swap, not an
// interrupt return: it does not touch RFLAGS. That is what lets a caller's
// `without_interrupts` bracket (see `synch.rs`) stay in effect across a
// suspend-and-resume — the switch never re-enables interrupts mid-flight.

#![allow(dead_code)]

use core::sync::atomic::{AtomicU64, Ordering};

use crate::donation;
use crate::fixed_point::Fixed;
use crate::mm::pmm::{self, PAGE_SIZE};
use crate::sched;
use crate::state::{self, ReapRequest};
use crate::synch::LockId;

pub const PRI_MIN: u8 = 0;
pub const PRI_DEFAULT: u8 = 31;
pub const PRI_MAX: u8 = 63;
pub const NICE_MIN: i8 = -20;
pub const NICE_MAX: i8 = 20;

const KERNEL_STACK_PAGES: usize = 4;
const STACK_CANARY: u64 = 0xDEAD_BEEF_CAFE_BABE;

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(u64);

impl ThreadId {
    /// tid 0 is reserved for the initial/idle thread; every later `create`
    /// draws from the same monotonic counter.
    fn alloc() -> Self {
        Self(NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Running,
    Ready,
    Blocked,
    Dying,
}

/// Full general-purpose register file plus the bits needed to resume
/// execution: instruction pointer, stack pointer, and the callee-saved GPRs
/// a cooperative switch needs to preserve. RFLAGS is deliberately absent —
/// see the module comment.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct CpuContext {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub rbx: u64,
    pub rbp: u64,
    pub rip: u64,
    pub rsp: u64,
}

impl CpuContext {
    pub const fn zero() -> Self {
        Self {
            r15: 0,
            r14: 0,
            r13: 0,
            r12: 0,
            rbx: 0,
            rbp: 0,
            rip: 0,
            rsp: 0,
        }
    }

    /// Builds the initial context for a brand-new kernel thread: `rip` points
    /// at `trampoline`, and `rsp` is the top of its freshly allocated stack.
    /// `arg` rides in `rbx`, the one callee-saved register the trampoline
    /// contract reads before anything else clobbers it.
    pub fn new_kernel(trampoline: extern "C" fn() -> !, stack_top: u64, arg: u64) -> Self {
        Self {
            r15: 0,
            r14: 0,
            r13: 0,
            r12: 0,
            rbx: arg,
            rbp: 0,
            rip: trampoline as u64,
            rsp: stack_top,
        }
    }
}

pub struct Thread {
    pub id: ThreadId,
    pub name: &'static str,
    pub state: ThreadState,
    pub base_priority: u8,
    pub effective_priority: u8,
    pub nice: i8,
    pub recent_cpu: Fixed,
    pub wake_tick: u64,
    /// Sorted by `lock.max_donated_priority` descending (invariant L1).
    pub locks_held: alloc::vec::Vec<LockId>,
    pub lock_waiting: Option<LockId>,
    pub context: CpuContext,
    pub kernel_stack: u64,
    pub kernel_stack_base: u64,
    pub kernel_stack_pages: usize,
    pub entry_fn: Option<extern "C" fn(u64)>,
    pub entry_arg: u64,
}

impl Thread {
    fn stack_canary_ptr(&self) -> *const u64 {
        self.kernel_stack_base as *const u64
    }

    /// Checks the sentinel word at the base of this thread's stack. A
    /// mismatch means the stack overflowed downward into it — fatal,
    /// detected here rather than on every access.
    pub fn validate_stack(&self) -> bool {
        unsafe { self.stack_canary_ptr().read_volatile() == STACK_CANARY }
    }
}

extern "C" {
    /// Saves the current register file into `*from`, restores `*to`, and
    /// returns in the context of `to`. No implementation is linked in this
    /// tree; see the module comment.
    fn switch_context(from: *mut CpuContext, to: *const CpuContext);
    /// Jumps directly into `to` without saving anything, used only to
    /// dispatch the very first thread at boot.
    pub(crate) fn switch_to_context(to: *const CpuContext) -> !;
}

/// Runs at the entry of every thread created by `create`. Invokes the
/// thread's real function with its argument, then exits — the trampoline
/// frame `create` builds by hand on the new stack so a thread that simply
/// returns still unwinds into `thread::exit` rather than into garbage.
extern "C" fn thread_trampoline() -> ! {
    let (entry, arg) = state::with_state(|st| {
        let cur = st.current_thread();
        let t = st.thread(cur);
        (t.entry_fn, t.entry_arg)
    });
    if let Some(f) = entry {
        f(arg);
    }
    exit()
}

pub fn init() {
    crate::log_info!("thread", "thread control initialized");
}

/// Builds the idle thread (tid 0) and registers it with the scheduler. Must
/// run exactly once, before any other thread is created.
pub fn init_idle(idle_entry: extern "C" fn() -> !) -> ThreadId {
    let id = ThreadId::alloc();
    debug_assert_eq!(id.raw(), 0, "idle thread must be the first allocated");
    let (base, pages) = alloc_stack();
    let stack_top = base + (pages * PAGE_SIZE) as u64;
    unsafe {
        (base as *mut u64).write_volatile(STACK_CANARY);
    }
    let thread = Thread {
        id,
        name: "idle",
        state: ThreadState::Ready,
        base_priority: PRI_MIN,
        effective_priority: PRI_MIN,
        nice: 0,
        recent_cpu: Fixed::ZERO,
        wake_tick: 0,
        locks_held: alloc::vec::Vec::new(),
        lock_waiting: None,
        context: CpuContext::new_kernel(idle_entry, stack_top, 0),
        kernel_stack: stack_top,
        kernel_stack_base: base,
        kernel_stack_pages: pages,
        entry_fn: None,
        entry_arg: 0,
    };
    state::with_state(|st| {
        st.insert_thread(thread);
        st.idle = Some(id);
    });
    id
}

/// Installs a placeholder thread at `PRI_DEFAULT`, standing in for kmain's
/// own boot-time execution before the scheduler has a real first thread to
/// dispatch. Without it, `current` would be idle (`PRI_MIN`) while kmain
/// creates the boot-time thread set, and
/// `thread::create`'s preemption check in `sched::on_thread_created` would
/// fire on the very first thread created at a normal priority, yielding away
/// from kmain before it finished setting up.
///
/// Its `context` is never resumed: `thread::jump_to` discards whatever is
/// "current" the moment the scheduler takes over for the first time, so
/// there is no trampoline or stack to give it.
pub fn init_boot() -> ThreadId {
    let id = ThreadId::alloc();
    let thread = Thread {
        id,
        name: "boot",
        state: ThreadState::Running,
        base_priority: PRI_DEFAULT,
        effective_priority: PRI_DEFAULT,
        nice: 0,
        recent_cpu: Fixed::ZERO,
        wake_tick: 0,
        locks_held: alloc::vec::Vec::new(),
        lock_waiting: None,
        context: CpuContext::zero(),
        kernel_stack: 0,
        kernel_stack_base: 0,
        kernel_stack_pages: 0,
        entry_fn: None,
        entry_arg: 0,
    };
    state::with_state(|st| {
        st.insert_thread(thread);
    });
    id
}

fn alloc_stack() -> (u64, usize) {
    let base =
        pmm::alloc_pages_zeroed(KERNEL_STACK_PAGES).expect("out of memory for kernel stack");
    (base as u64, KERNEL_STACK_PAGES)
}

/// Creates a new thread at `priority`, ready to run. Returns `None` if no
/// stack page is available — the one recoverable error in thread creation.
pub fn create(
    name: &'static str,
    priority: u8,
    entry: extern "C" fn(u64),
    arg: u64,
) -> Option<ThreadId> {
    debug_assert!(priority <= PRI_MAX);
    let base = pmm::alloc_pages_zeroed(KERNEL_STACK_PAGES)?;
    let pages = KERNEL_STACK_PAGES;
    let base = base as u64;
    let stack_top = base + (pages * PAGE_SIZE) as u64;
    unsafe {
        (base as *mut u64).write_volatile(STACK_CANARY);
    }

    let id = ThreadId::alloc();
    let thread = Thread {
        id,
        name,
        state: ThreadState::Ready,
        base_priority: priority,
        effective_priority: priority,
        nice: 0,
        recent_cpu: Fixed::ZERO,
        wake_tick: 0,
        locks_held: alloc::vec::Vec::new(),
        lock_waiting: None,
        context: CpuContext::new_kernel(thread_trampoline, stack_top, 0),
        kernel_stack: stack_top,
        kernel_stack_base: base,
        kernel_stack_pages: pages,
        entry_fn: Some(entry),
        entry_arg: arg,
    };

    state::with_state(|st| {
        st.insert_thread(thread);
    });
    sched::on_thread_created(id);
    Some(id)
}

/// Current thread's tid.
pub fn current() -> ThreadId {
    state::with_state(|st| st.current_thread())
}

pub fn name(id: ThreadId) -> &'static str {
    state::with_state(|st| st.thread(id).name)
}

/// Assumes interrupts are already disabled and the caller has already set
/// the current thread's state to `Blocked` and linked it into whatever wait
/// structure it belongs on. Invokes the scheduler and does not return until
/// this thread is unblocked again.
pub fn block() {
    let cur = current();
    sched::dispatch_next_from_blocked(cur);
}

/// Transitions `t` to READY and inserts it into the ready queue by priority.
/// Never yields on its own — the caller decides whether to.
pub fn unblock(t: ThreadId) {
    state::with_state(|st| {
        debug_assert_eq!(st.thread(t).state, ThreadState::Blocked);
        st.thread_mut(t).state = ThreadState::Ready;
    });
    sched::mark_ready(t);
}

/// `yield`: gives up the CPU if another ready thread is at least as
/// important; otherwise a no-op. Not named `yield` since that is a Rust
/// keyword.
pub fn yield_now() {
    sched::yield_current();
}

pub fn exit() -> ! {
    sched::dispatch_and_die();
}

pub fn set_priority(new_base: u8) {
    debug_assert!(new_base <= PRI_MAX);
    let cur = current();
    let (mlfqs, dropped) = state::with_state(|st| {
        if st.mlfqs_enabled {
            return (true, false);
        }
        st.thread_mut(cur).base_priority = new_base;
        let new_effective = st.recompute_effective_priority(cur);
        let old_effective = st.thread(cur).effective_priority;
        st.thread_mut(cur).effective_priority = new_effective;
        (false, new_effective < old_effective)
    });
    if mlfqs {
        // Forbidden under MLFQ; callers simply ignore the request.
        return;
    }
    donation::propagate(cur);
    if dropped {
        sched::yield_if_outranked(cur);
    }
}

pub fn get_priority() -> u8 {
    state::with_state(|st| st.thread(st.current_thread()).effective_priority)
}

/// Effective priority of an arbitrary thread, not just the current one.
/// Used by diagnostics and by `tests.rs` to observe donation in flight on a
/// thread other than the one calling this.
pub fn effective_priority_of(id: ThreadId) -> u8 {
    state::with_state(|st| st.thread(id).effective_priority)
}

pub fn set_nice(nice: i8) {
    debug_assert!((NICE_MIN..=NICE_MAX).contains(&nice));
    let cur = current();
    state::with_state(|st| {
        st.thread_mut(cur).nice = nice;
    });
    crate::mlfq::recompute_priority_for(cur);
    sched::yield_if_outranked(cur);
}

pub fn get_nice() -> i8 {
    state::with_state(|st| st.thread(st.current_thread()).nice)
}

pub fn get_recent_cpu() -> i32 {
    state::with_state(|st| {
        st.thread(st.current_thread())
            .recent_cpu
            .to_scaled_round(100)
    })
}

pub fn get_load_avg() -> i32 {
    state::with_state(|st| st.load_avg.to_scaled_round(100))
}

/// Calls `action` once for every live thread, in arena order, with interrupts
/// disabled for the whole walk (mirrors `thread_foreach`).
pub fn foreach<F: FnMut(ThreadId, &Thread)>(mut action: F) {
    state::with_state(|st| {
        for slot in st.threads.iter() {
            if let Some(t) = slot {
                action(t.id, t);
            }
        }
    });
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadStats {
    pub total: usize,
    pub running: usize,
    pub ready: usize,
    pub blocked: usize,
    pub dying: usize,
}

pub fn stats() -> ThreadStats {
    let mut s = ThreadStats::default();
    foreach(|_, t| {
        s.total += 1;
        match t.state {
            ThreadState::Running => s.running += 1,
            ThreadState::Ready => s.ready += 1,
            ThreadState::Blocked => s.blocked += 1,
            ThreadState::Dying => s.dying += 1,
        }
    });
    s
}

/// Performs the actual register-set swap from `from` to `to`. Drains any
/// reap request left over from an earlier `exit()` first (this thread still
/// owns a valid stack to run that free on), then, if `from` is itself dying,
/// installs a fresh reap request before leaving — so the *next* thread to
/// switch away frees it.
pub(crate) fn switch_to(from: ThreadId, to: ThreadId, from_is_dying: bool) {
    let pending = state::with_state(|st| st.reap_pending.take());
    if let Some(req) = pending {
        pmm::free_pages(req.stack_base as usize, req.stack_pages);
    }

    let (from_ctx, to_ctx, to_stack_top) = state::with_state(|st| {
        if from_is_dying {
            st.thread_mut(from).state = ThreadState::Dying;
            st.reap_pending = Some(ReapRequest {
                stack_base: st.thread(from).kernel_stack_base,
                stack_pages: st.thread(from).kernel_stack_pages,
            });
        }
        let from_ptr = &mut st.thread_mut(from).context as *mut CpuContext;
        let to_thread = st.thread(to);
        let to_ptr = &to_thread.context as *const CpuContext;
        (from_ptr, to_ptr, to_thread.kernel_stack)
    });

    crate::arch::gdt::set_rsp0(to_stack_top);

    unsafe {
        switch_context(from_ctx, to_ctx);
    }
}

/// Dispatches straight into `to` without saving any outgoing context. Used
/// exactly once, at boot, to start the first thread.
pub(crate) fn jump_to(to: ThreadId) -> ! {
    let (to_ctx, to_stack_top) = state::with_state(|st| {
        let t = st.thread(to);
        (&t.context as *const CpuContext, t.kernel_stack)
    });
    crate::arch::gdt::set_rsp0(to_stack_top);
    unsafe { switch_to_context(to_ctx) }
}
