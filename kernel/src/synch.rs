// Synchronization Primitives — Semaphore, Lock, Condition Variable
//
// Every public operation here that can block brackets its *entire* body —
// check, maybe-enqueue, maybe-switch-away, and the post-wake retry — in one
// top-level `without_interrupts` call. That single bracket is what rules out
// a lost wakeup: another thread's `up` can only run during a window where
// interrupts are truly disabled, and the context switch itself never
// re-enables them (see `thread::switch_to`), so the calling thread's retry
// loop always sees a state at least as fresh as the one it last observed.

#![allow(dead_code)]

use alloc::vec::Vec;

use crate::sched;
use crate::state::{self, KernelState};
use crate::thread::{ThreadId, ThreadState};
use crate::util::without_interrupts;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SemaphoreId(usize);

impl SemaphoreId {
    pub(crate) fn from_index(i: usize) -> Self {
        Self(i)
    }
    pub(crate) fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LockId(usize);

impl LockId {
    pub(crate) fn from_index(i: usize) -> Self {
        Self(i)
    }
    pub(crate) fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CondVarId(usize);

impl CondVarId {
    pub(crate) fn from_index(i: usize) -> Self {
        Self(i)
    }
    pub(crate) fn index(self) -> usize {
        self.0
    }
}

/// Waiters are kept as a plain `Vec` rather than `OrderedList` here: they are
/// re-sorted wholesale on every `up` (a donation may have changed a waiter's
/// priority since it was enqueued), so a
/// `sort_by_key` over a `Vec` is exactly as cheap as maintaining order
/// incrementally and simpler to read.
pub struct SemaphoreInner {
    pub value: u32,
    pub waiters: Vec<ThreadId>,
}

pub struct LockInner {
    pub semaphore: SemaphoreId,
    pub holder: Option<ThreadId>,
    pub max_donated_priority: u8,
}

pub(crate) fn resort_semaphore_waiters(st: &mut KernelState, id: SemaphoreId) {
    // Stable sort descending by priority; ties keep arrival order (Vec
    // preserves insertion order going in, and sort_by_key is stable).
    let waiters = &st.semaphores[id.index()].waiters;
    let priorities: Vec<u8> = waiters
        .iter()
        .map(|&tid| st.thread(tid).effective_priority)
        .collect();
    let mut indexed: Vec<usize> = (0..waiters.len()).collect();
    indexed.sort_by_key(|&i| core::cmp::Reverse(priorities[i]));
    let reordered: Vec<ThreadId> = indexed.iter().map(|&i| waiters[i]).collect();
    st.semaphores[id.index()].waiters = reordered;
}

/// A standalone counting semaphore. Also the building
/// block `Lock` and `CondVar` are layered on.
pub struct Semaphore(SemaphoreId);

impl Semaphore {
    pub fn new(value: u32) -> Self {
        Self(state::with_state(|st| st.alloc_semaphore(value)))
    }

    pub fn down(&self) {
        sema_down(self.0);
    }

    pub fn try_down(&self) -> bool {
        sema_try_down(self.0)
    }

    pub fn up(&self) {
        sema_up(self.0);
    }

    pub fn value(&self) -> u32 {
        state::with_state(|st| st.semaphore(self.0).value)
    }
}

pub(crate) fn sema_down(id: SemaphoreId) {
    without_interrupts(|| loop {
        let acquired = state::with_state(|st| {
            if st.semaphore(id).value > 0 {
                st.semaphore_mut(id).value -= 1;
                true
            } else {
                let cur = st.current_thread();
                st.semaphore_mut(id).waiters.push(cur);
                resort_semaphore_waiters(st, id);
                st.thread_mut(cur).state = ThreadState::Blocked;
                false
            }
        });
        if acquired {
            return;
        }
        let cur = state::with_state(|st| st.current_thread());
        sched::dispatch_next_from_blocked(cur);
    });
}

pub(crate) fn sema_try_down(id: SemaphoreId) -> bool {
    state::with_state(|st| {
        if st.semaphore(id).value > 0 {
            st.semaphore_mut(id).value -= 1;
            true
        } else {
            false
        }
    })
}

pub(crate) fn sema_up(id: SemaphoreId) {
    without_interrupts(|| {
        let woken = state::with_state(|st| {
            resort_semaphore_waiters(st, id);
            let waiters = &mut st.semaphore_mut(id).waiters;
            let woken = if waiters.is_empty() {
                None
            } else {
                Some(waiters.remove(0))
            };
            if let Some(tid) = woken {
                st.thread_mut(tid).state = ThreadState::Ready;
            }
            st.semaphore_mut(id).value += 1;
            woken
        });
        if let Some(tid) = woken {
            sched::mark_ready(tid);
            sched::yield_if_outranked(tid);
        }
    });
}

/// Mutual-exclusion lock over a capacity-1 semaphore, with priority-donation
/// bookkeeping. Non-recursive: re-acquiring a lock the
/// current thread already holds is a programmer error.
pub struct Lock {
    id: LockId,
}

impl Lock {
    pub fn new() -> Self {
        let sem = state::with_state(|st| st.alloc_semaphore(1));
        let id = state::with_state(|st| st.alloc_lock(sem));
        Self { id }
    }

    pub fn id(&self) -> LockId {
        self.id
    }

    pub fn acquire(&self) {
        lock_acquire(self.id);
    }

    pub fn try_acquire(&self) -> bool {
        lock_try_acquire(self.id)
    }

    pub fn release(&self) {
        lock_release(self.id);
    }

    pub fn held_by_current(&self) -> bool {
        state::with_state(|st| st.lock(self.id).holder == Some(st.current_thread()))
    }
}

impl Default for Lock {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn lock_acquire(id: LockId) {
    without_interrupts(|| {
        let (cur, sem, already_held, contended) = state::with_state(|st| {
            let cur = st.current_thread();
            let lock = st.lock(id);
            let already_held = lock.holder == Some(cur);
            let contended = !st.mlfqs_enabled && lock.holder.is_some();
            (cur, lock.semaphore, already_held, contended)
        });
        debug_assert!(!already_held, "lock re-acquired by its own holder");

        if contended {
            state::with_state(|st| {
                st.thread_mut(cur).lock_waiting = Some(id);
            });
            crate::donation::propagate(cur);
        }

        sema_down(sem);

        state::with_state(|st| {
            st.thread_mut(cur).lock_waiting = None;
            st.lock_mut(id).holder = Some(cur);
            if !st.mlfqs_enabled {
                let top = st
                    .semaphore(sem)
                    .waiters
                    .first()
                    .map(|&t| st.thread(t).effective_priority)
                    .unwrap_or(crate::thread::PRI_MIN);
                st.lock_mut(id).max_donated_priority = top;
                st.thread_mut(cur).locks_held.push(id);
                // L1: locks_held sorted by each lock's max_donated_priority descending.
                let mut held = st.thread(cur).locks_held.clone();
                held.sort_by_key(|&l| core::cmp::Reverse(st.lock(l).max_donated_priority));
                st.thread_mut(cur).locks_held = held;
            }
        });
    });
}

pub(crate) fn lock_try_acquire(id: LockId) -> bool {
    state::with_state(|st| {
        let sem = st.lock(id).semaphore;
        if st.semaphore(sem).value == 0 {
            return false;
        }
        let cur = st.current_thread();
        st.semaphore_mut(sem).value -= 1;
        st.lock_mut(id).holder = Some(cur);
        if !st.mlfqs_enabled {
            st.lock_mut(id).max_donated_priority = crate::thread::PRI_MIN;
            st.thread_mut(cur).locks_held.push(id);
        }
        true
    })
}

pub(crate) fn lock_release(id: LockId) {
    without_interrupts(|| {
        let (cur, sem, dropped) = state::with_state(|st| {
            let cur = st.current_thread();
            debug_assert!(
                st.lock(id).holder == Some(cur),
                "lock released by a thread that does not hold it"
            );
            let sem = st.lock(id).semaphore;
            let mut dropped = false;
            if !st.mlfqs_enabled {
                st.thread_mut(cur).locks_held.retain(|&l| l != id);
                let new_effective = st.recompute_effective_priority(cur);
                let old_effective = st.thread(cur).effective_priority;
                st.thread_mut(cur).effective_priority = new_effective;
                dropped = new_effective < old_effective;
                st.lock_mut(id).max_donated_priority = crate::thread::PRI_MIN;
            }
            st.lock_mut(id).holder = None;
            (cur, sem, dropped)
        });
        sema_up(sem);
        if dropped {
            sched::yield_if_outranked(cur);
        }
    });
}

/// A gate semaphore backing one `cond_wait` call: capacity 0, exactly one
/// waiter, used only to let `cond_signal` wake a specific waiter by name.
pub struct CondVar {
    id: CondVarId,
}

impl CondVar {
    pub fn new() -> Self {
        Self {
            id: state::with_state(|st| st.alloc_condvar()),
        }
    }

    pub fn wait(&self, lock: &Lock) {
        cond_wait(self.id, lock.id());
    }

    pub fn signal(&self, lock: &Lock) {
        cond_signal(self.id, lock.id());
    }

    pub fn broadcast(&self, lock: &Lock) {
        cond_broadcast(self.id, lock.id());
    }
}

impl Default for CondVar {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn cond_wait(id: CondVarId, lock: LockId) {
    debug_assert!(
        state::with_state(|st| st.lock(lock).holder == Some(st.current_thread())),
        "cond_wait called without holding the associated lock"
    );
    let gate = state::with_state(|st| {
        let gate = st.alloc_semaphore(0);
        st.condvar_waiters_mut(id).push(gate);
        gate
    });
    lock_release(lock);
    sema_down(gate);
    lock_acquire(lock);
}

fn resort_condvar_waiters(st: &mut KernelState, id: CondVarId) {
    let gates = st.condvar_waiters(id).clone();
    let mut indexed: Vec<(SemaphoreId, u8)> = gates
        .iter()
        .map(|&g| {
            let prio = st
                .semaphore(g)
                .waiters
                .first()
                .map(|&t| st.thread(t).effective_priority)
                .unwrap_or(crate::thread::PRI_MIN);
            (g, prio)
        })
        .collect();
    indexed.sort_by_key(|&(_, prio)| core::cmp::Reverse(prio));
    *st.condvar_waiters_mut(id) = indexed.into_iter().map(|(g, _)| g).collect();
}

pub(crate) fn cond_signal(id: CondVarId, _lock: LockId) {
    let gate = state::with_state(|st| {
        if st.condvar_waiters(id).is_empty() {
            None
        } else {
            resort_condvar_waiters(st, id);
            Some(st.condvar_waiters_mut(id).remove(0))
        }
    });
    if let Some(g) = gate {
        sema_up(g);
    }
}

pub(crate) fn cond_broadcast(id: CondVarId, lock: LockId) {
    loop {
        let gate = state::with_state(|st| {
            if st.condvar_waiters(id).is_empty() {
                None
            } else {
                resort_condvar_waiters(st, id);
                Some(st.condvar_waiters_mut(id).remove(0))
            }
        });
        match gate {
            Some(g) => sema_up(g),
            None => break,
        }
        let _ = lock;
    }
}
