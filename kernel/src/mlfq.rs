// Multi-Level Feedback Queue Estimator
//
// Implements the classic `load_avg`/`recent_cpu`/priority-recompute triangle
// over 17.14 fixed-point arithmetic (see `fixed_point.rs`). Gated entirely
// behind `state.mlfqs_enabled`; `sched::tick` only calls into this module
// when that flag is set, so nothing here needs to re-check it.

#![allow(dead_code)]

use alloc::vec::Vec;

use crate::fixed_point::Fixed;
use crate::sched::TIMER_FREQ;
use crate::state::{self, KernelState};
use crate::thread::{ThreadId, PRI_MAX, PRI_MIN};

/// recent_cpu += 1 for the running thread, once per tick, unless it's idle.
pub fn on_tick(now: u64) {
    bump_running_recent_cpu();
    if now % (TIMER_FREQ as u64) == 0 {
        recompute_load_avg_and_recent_cpu();
    }
    if now % 4 == 0 {
        recompute_all_priorities();
    }
}

fn bump_running_recent_cpu() {
    state::with_state(|st| {
        let cur = st.current_thread();
        if Some(cur) != st.idle {
            let t = st.thread_mut(cur);
            t.recent_cpu = t.recent_cpu.add_int(1);
        }
    });
}

fn live_thread_ids(st: &KernelState) -> Vec<ThreadId> {
    st.threads
        .iter()
        .filter_map(|slot| slot.as_ref().map(|t| t.id))
        .collect()
}

/// Once a second: `load_avg = (59/60) * load_avg + (1/60) * ready_threads`,
/// where `ready_threads` counts the running thread too unless it's idle; then
/// every thread's `recent_cpu` decays by the same `(2*load_avg)/(2*load_avg+1)`
/// factor and adds its own niceness.
fn recompute_load_avg_and_recent_cpu() {
    state::with_state(|st| {
        let ready_threads = st.ready.len() + if st.current != st.idle { 1 } else { 0 };

        let fifty_nine_sixtieths = Fixed::from_int(59).div(Fixed::from_int(60));
        let one_sixtieth = Fixed::from_int(1).div(Fixed::from_int(60));
        st.load_avg = fifty_nine_sixtieths
            .mul(st.load_avg)
            .add(one_sixtieth.mul_int(ready_threads as i32));

        let two_load = st.load_avg.mul_int(2);
        let decay = two_load.div(two_load.add_int(1));

        for id in live_thread_ids(st) {
            let nice = st.thread(id).nice;
            let t = st.thread_mut(id);
            t.recent_cpu = decay.mul(t.recent_cpu).add_int(nice as i32);
        }
    });
}

/// Every 4 ticks: `priority = PRI_MAX - (recent_cpu / 4) - (nice * 2)`,
/// clamped to the valid range, for every thread — then the ready queue is
/// re-sorted to match.
fn recompute_all_priorities() {
    state::with_state(|st| {
        for id in live_thread_ids(st) {
            apply_priority_formula(st, id);
        }
        resort_ready_queue(st);
    });
}

fn apply_priority_formula(st: &mut KernelState, id: ThreadId) {
    let recent_cpu_term = st.thread(id).recent_cpu.div_int(4).to_int_trunc();
    let nice_term = (st.thread(id).nice as i32) * 2;
    let raw = PRI_MAX as i32 - recent_cpu_term - nice_term;
    let clamped = raw.clamp(PRI_MIN as i32, PRI_MAX as i32) as u8;
    st.thread_mut(id).effective_priority = clamped;
}

fn resort_ready_queue(st: &mut KernelState) {
    crate::sched::resort_ready(st);
}

/// Recomputes one thread's priority immediately, outside the normal 4-tick
/// schedule — used by `thread::set_nice`, which takes effect right away
/// rather than waiting for the next recompute boundary.
pub fn recompute_priority_for(id: ThreadId) {
    state::with_state(|st| {
        apply_priority_formula(st, id);
        resort_ready_queue(st);
    });
}
