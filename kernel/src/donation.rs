// Priority-Donation Engine
//
// One `propagate` walk handles both the "raise a holder's priority" and the
// "recurse through a chain of held locks" cases. Trigger points are lock
// acquisition on a held lock, lock release, and `set_priority` — all three
// call into here; none of them implement the walk themselves.

#![allow(dead_code)]

use crate::state;
use crate::synch::resort_semaphore_waiters;
use crate::thread::ThreadId;

/// Recomputes `t`'s effective priority, then — if `t` is itself blocked on a
/// lock — walks the donation chain: reinsert `t` into its lock's waiter
/// list at its new priority, raise the lock's `max_donated_priority` if `t`
/// now tops it, and if that pushes the lock's holder's effective priority
/// up, recurse on the holder. Bounded by the number of threads: every step
/// either strictly raises a priority or stops.
pub fn propagate(t: ThreadId) {
    let (waiting_on, holder_to_check) = state::with_state(|st| {
        if st.mlfqs_enabled {
            return (None, None);
        }
        let new_effective = st.recompute_effective_priority(t);
        st.thread_mut(t).effective_priority = new_effective;

        let Some(lock_id) = st.thread(t).lock_waiting else {
            return (None, None);
        };

        let sem = st.lock(lock_id).semaphore;
        resort_semaphore_waiters(st, sem);

        let t_eff = st.thread(t).effective_priority;
        if t_eff > st.lock(lock_id).max_donated_priority {
            st.lock_mut(lock_id).max_donated_priority = t_eff;
        }

        let holder = st.lock(lock_id).holder;
        (Some(lock_id), holder)
    });

    let Some(lock_id) = waiting_on else {
        return;
    };
    let Some(holder) = holder_to_check else {
        return;
    };

    let should_recurse = state::with_state(|st| {
        let donated = st.lock(lock_id).max_donated_priority;
        if st.thread(holder).effective_priority < donated {
            st.thread_mut(holder).effective_priority = donated;
            // The holder may be sitting in the ready queue rather than
            // running (e.g. preempted right after acquiring the lock by
            // the very thread now donating to it) — its queue position was
            // fixed at enqueue time and won't reflect this new priority
            // unless resorted here.
            crate::sched::resort_ready(st);
            true
        } else {
            false
        }
    });

    if should_recurse {
        propagate(holder);
    }
}
