// Scheduler Driver
//
// Owns the one piece of policy every other module here defers to: which
// thread runs next. `thread.rs` and `synch.rs` only ever ask this module to
// pick, never pick for themselves — this is the only file that touches
// `state.ready` directly.
//
// The ready queue is a single `OrderedList<ThreadId>` spanning the whole
// PRI_MIN..=PRI_MAX range rather than a fixed array of per-level queues:
// with priority donation in play a thread's position has to move the instant
// its effective priority changes, which a fixed set of level buckets can't
// express without its own re-sort anyway. One ordered list, kept sorted by
// `effective_priority` descending with FIFO among ties, serves both dispatch
// and donation reinsertion.

#![allow(dead_code)]

use core::sync::atomic::{AtomicUsize, Ordering};

use alloc::vec::Vec;

use crate::alarm;
use crate::mlfq;
use crate::state::{self, KernelState};
use crate::thread::{self, ThreadId, ThreadState};

/// Time slice length in timer ticks before a running thread is forced to
/// yield to whatever else is ready.
pub const SLICE_TICKS: u32 = 4;

/// Timer frequency in Hz. Also used by `interrupts::init_timer` and by
/// `mlfq` to find the once-a-second boundary.
pub const TIMER_FREQ: u32 = 100;

/// Nesting depth of `tick()` calls. A plain counter rather than a bool: this
/// kernel never actually nests interrupts (EOI happens at the end of the
/// handler, not re-entrantly), but tracking depth rather than a flag costs
/// nothing and matches the general shape of "defer while busy, flush once the
/// outermost caller is done".
static TICK_DEPTH: AtomicUsize = AtomicUsize::new(0);

fn in_tick_context() -> bool {
    TICK_DEPTH.load(Ordering::Relaxed) > 0
}

/// Marks `initial` as the one already "running" before the first real
/// dispatch, and latches the boot-time scheduler policy choice (`-o mlfqs`
/// vs. fixed-priority donation). `initial` is ordinarily `thread::init_boot`'s
/// placeholder rather than idle itself — see that function's comment for why
/// kmain needs a non-idle, `PRI_DEFAULT` thread occupying `current` while it
/// creates the rest of the boot-time thread set. Must be called once, after
/// `thread::init_idle`, before any other thread is created — `mlfqs_enabled`
/// is not meant to change afterward.
pub fn init(initial: ThreadId, mlfqs_enabled: bool) {
    state::with_state(|st| {
        st.current = Some(initial);
        st.slice_remaining = SLICE_TICKS;
        st.mlfqs_enabled = mlfqs_enabled;
    });
    crate::log_info!(
        "sched",
        "scheduler initialized, initial tid={}, mlfqs={}",
        initial.raw(),
        mlfqs_enabled
    );
}

/// Re-sorts the ready queue by each thread's current effective priority,
/// stable so FIFO order among equal priorities is preserved. A thread
/// already sitting in the ready queue (not running, not blocked) can still
/// have its effective priority change under it — donation to a holder that
/// was preempted while holding the contested lock, or the MLFQ per-4-tick
/// recompute — so both callers resort rather than relying on enqueue-time
/// position alone.
pub(crate) fn resort_ready(st: &mut KernelState) {
    let mut keyed: Vec<(ThreadId, u8)> = st
        .ready
        .iter()
        .map(|&id| (id, st.thread(id).effective_priority))
        .collect();
    keyed.sort_by_key(|&(_, prio)| core::cmp::Reverse(prio));
    st.ready.reorder(keyed.into_iter().map(|(id, _)| id).collect());
}

/// Inserts `t` into the ready queue at its current effective priority.
fn insert_ready(st: &mut KernelState, t: ThreadId) {
    let prio = st.thread(t).effective_priority;
    let pos = st
        .ready
        .iter()
        .position(|&id| st.thread(id).effective_priority < prio)
        .unwrap_or(st.ready.len());
    st.ready.insert_at(pos, t);
}

/// Called once by `thread::create`, right after the new thread has been
/// inserted into the arena in the READY state. Enqueues it and, if it now
/// outranks whatever is running, yields immediately — thread creation always
/// runs from ordinary thread context, never from an interrupt, so there's no
/// reason to defer this one.
pub fn on_thread_created(id: ThreadId) {
    let should_yield = state::with_state(|st| {
        insert_ready(st, id);
        let cur = st.current_thread();
        st.thread(id).effective_priority > st.thread(cur).effective_priority
    });
    if should_yield {
        yield_current();
    }
}

/// Transitions `t` (already READY in the arena) into the ready queue. Never
/// yields — callers decide that separately via `yield_if_outranked`.
pub fn mark_ready(t: ThreadId) {
    state::with_state(|st| insert_ready(st, t));
}

/// Picks the next thread to run, preferring the ready queue's head and
/// falling back to idle. Resets the slice counter for whichever thread gets
/// the CPU.
fn pick_next(st: &mut KernelState) -> ThreadId {
    let next = st
        .ready
        .pop_front()
        .or(st.idle)
        .expect("no idle thread registered");
    st.thread_mut(next).state = ThreadState::Running;
    st.current = Some(next);
    st.slice_remaining = SLICE_TICKS;
    next
}

/// Dispatches away from a thread that is already blocked or sleeping (its
/// state and wait-queue membership have already been set up by the caller;
/// this function never touches the ready queue on `cur`'s behalf). Returns
/// once `cur` is unblocked and redispatched.
pub fn dispatch_next_from_blocked(cur: ThreadId) {
    let next = state::with_state(pick_next);
    thread::switch_to(cur, next, false);
}

/// Dispatches away from a thread that is exiting and will never run again.
pub fn dispatch_and_die() -> ! {
    let cur = state::with_state(|st| st.current_thread());
    let next = state::with_state(pick_next);
    thread::switch_to(cur, next, true);
    unreachable!("a dying thread was resumed")
}

/// `thread_yield`: if the ready queue's head is at least as important as the
/// current thread, gives up the CPU to it and requeues itself; otherwise a
/// no-op. Safe to call from ordinary thread context; within an interrupt
/// handler use `yield_if_outranked`/the tick-end flush instead, since a
/// context switch can't happen mid-interrupt.
pub fn yield_current() {
    crate::util::without_interrupts(|| {
        let next = state::with_state(|st| {
            let cur = st.current_thread();
            if Some(cur) == st.idle {
                return st.ready.pop_front();
            }
            let cur_prio = st.thread(cur).effective_priority;
            let outranked = st
                .ready
                .front()
                .map(|&t| st.thread(t).effective_priority >= cur_prio)
                .unwrap_or(false);
            if !outranked {
                return None;
            }
            st.ready.pop_front()
        });
        let Some(next) = next else { return };
        let cur = state::with_state(|st| {
            let cur = st.current_thread();
            if Some(cur) != st.idle {
                st.thread_mut(cur).state = ThreadState::Ready;
                insert_ready(st, cur);
            }
            st.thread_mut(next).state = ThreadState::Running;
            st.current = Some(next);
            st.slice_remaining = SLICE_TICKS;
            cur
        });
        thread::switch_to(cur, next, false);
    });
}

/// Checks whether the ready queue's head now outranks the running thread and
/// either yields right away (ordinary context) or records the need to yield
/// for the next tick-end flush (interrupt context, where a context switch
/// can't happen directly). `_hint` is the thread whose unblock/priority
/// change triggered this check; unused beyond documenting call sites, since
/// the check itself only cares about the queue head.
pub fn yield_if_outranked(_hint: ThreadId) {
    let should = state::with_state(|st| {
        let cur = st.current_thread();
        let cur_prio = st.thread(cur).effective_priority;
        st.ready
            .front()
            .map(|&t| st.thread(t).effective_priority > cur_prio)
            .unwrap_or(false)
    });
    if !should {
        return;
    }
    if in_tick_context() {
        state::with_state(|st| st.yield_pending = true);
    } else {
        yield_current();
    }
}

/// Picks the first thread to run at boot. Unlike every later dispatch there
/// is no outgoing context to save — the caller is expected to follow this up
/// with `thread::jump_to`, not `switch_to`.
pub fn schedule() -> ThreadId {
    state::with_state(pick_next)
}

/// The kernel's single timer-tick entry point: one ISR feeds both the alarm
/// clock and, when enabled, the MLFQ estimator. Advances the tick
/// counter, wakes any sleepers due, recomputes MLFQ priorities on schedule,
/// decrements the running thread's time slice, and — only once every nested
/// call has unwound — flushes a pending deferred yield.
pub fn tick() {
    TICK_DEPTH.fetch_add(1, Ordering::Relaxed);

    let now = state::with_state(|st| {
        st.ticks += 1;
        st.ticks
    });

    alarm::tick(now);

    let mlfqs = state::with_state(|st| st.mlfqs_enabled);
    if mlfqs {
        mlfq::on_tick(now);
    }

    let slice_expired = state::with_state(|st| {
        if st.slice_remaining > 0 {
            st.slice_remaining -= 1;
        }
        st.slice_remaining == 0
    });
    if slice_expired {
        state::with_state(|st| st.yield_pending = true);
    }

    if TICK_DEPTH.fetch_sub(1, Ordering::Relaxed) == 1 {
        let pending = state::with_state(|st| core::mem::take(&mut st.yield_pending));
        if pending {
            yield_current();
        }
    }
}

/// Snapshot of the ready queue's thread ids, highest priority first. Used by
/// `tests.rs` and diagnostics; never consulted by scheduling logic itself.
pub fn ready_queue_snapshot() -> Vec<ThreadId> {
    state::with_state(|st| st.ready.iter().copied().collect())
}

/// The scheduler's own monotonic tick count, advanced once per `tick()`
/// call. Distinct from `interrupts::get_ticks`, which counts raw timer IRQs
/// — this one is what `alarm`/`mlfq` actually key off.
pub fn current_tick() -> u64 {
    state::with_state(|st| st.ticks)
}
