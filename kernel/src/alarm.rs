// Alarm Clock — Timed Sleep
//
// Sleeping threads block instead of busy-waiting: each one sits on
// `state.sleeping`, ordered by ascending wake tick with FIFO among ties, so
// `tick()` only ever has to look at the front to decide who wakes next.

#![allow(dead_code)]

use crate::sched;
use crate::state::{self, KernelState};
use crate::thread::{self, ThreadId, ThreadState};
use crate::util::without_interrupts;

fn insert_sleeping(st: &mut KernelState, t: ThreadId) {
    let wake = st.thread(t).wake_tick;
    let pos = st
        .sleeping
        .iter()
        .position(|&id| st.thread(id).wake_tick > wake)
        .unwrap_or(st.sleeping.len());
    st.sleeping.insert_at(pos, t);
}

/// Puts the calling thread to sleep for `ticks` timer ticks. A `ticks` of
/// zero is a pure yield rather than blocking for a wake time that has
/// already passed.
pub fn sleep(ticks: u64) {
    if ticks == 0 {
        thread::yield_now();
        return;
    }

    without_interrupts(|| {
        let cur = state::with_state(|st| {
            let cur = st.current_thread();
            let wake_at = st.ticks + ticks;
            st.thread_mut(cur).wake_tick = wake_at;
            st.thread_mut(cur).state = ThreadState::Blocked;
            insert_sleeping(st, cur);
            cur
        });
        sched::dispatch_next_from_blocked(cur);
    });
}

/// Called once per timer tick (from `sched::tick`, before any MLFQ
/// bookkeeping) with the freshly advanced tick count. Wakes every sleeper
/// whose wake time has arrived, in ascending wake-time order.
pub fn tick(now: u64) {
    loop {
        let woken = state::with_state(|st| match st.sleeping.front() {
            Some(&tid) if st.thread(tid).wake_tick <= now => {
                st.sleeping.pop_front();
                Some(tid)
            }
            _ => None,
        });
        match woken {
            Some(tid) => {
                thread::unblock(tid);
                sched::yield_if_outranked(tid);
            }
            None => break,
        }
    }
}
