// Central Scheduler State
//
// The concurrency model here rests on a single invariant: every scheduler
// data structure (ready queue, wait queues, sleep queue, the thread table,
// lock/semaphore bookkeeping, donation state) is protected by one thing —
// interrupts being disabled — and nothing else. This module makes that
// invariant literal: one `spin::Mutex<KernelState>`, entered only through
// `with_state`, which wraps `util::without_interrupts`.
//
// Every other module in the scheduling core (thread, synch, donation, alarm,
// mlfq, sched) reaches scheduler state exclusively through this file. None of
// them take their own lock.

#![allow(dead_code)]

use alloc::boxed::Box;
use alloc::vec::Vec;
use spin::Mutex;

use crate::fixed_point::Fixed;
use crate::ordered_list::OrderedList;
use crate::synch::{CondVarId, LockId, LockInner, SemaphoreId, SemaphoreInner};
use crate::thread::{Thread, ThreadId};
use crate::util::without_interrupts;

pub struct ReapRequest {
    pub stack_base: u64,
    pub stack_pages: usize,
}

pub struct KernelState {
    pub threads: Vec<Option<Box<Thread>>>,
    pub locks: Vec<LockInner>,
    pub semaphores: Vec<SemaphoreInner>,
    pub condvars: Vec<Vec<SemaphoreId>>,
    pub ready: OrderedList<ThreadId>,
    pub sleeping: OrderedList<ThreadId>,
    pub current: Option<ThreadId>,
    pub idle: Option<ThreadId>,
    pub ticks: u64,
    pub load_avg: Fixed,
    pub mlfqs_enabled: bool,
    pub yield_pending: bool,
    pub reap_pending: Option<ReapRequest>,
    /// Ticks left in the running thread's time slice. Owned and reset by
    /// `sched.rs`; every other module treats it as opaque.
    pub slice_remaining: u32,
}

impl KernelState {
    const fn new() -> Self {
        Self {
            threads: Vec::new(),
            locks: Vec::new(),
            semaphores: Vec::new(),
            condvars: Vec::new(),
            ready: OrderedList::new(),
            sleeping: OrderedList::new(),
            current: None,
            idle: None,
            ticks: 0,
            load_avg: Fixed::ZERO,
            mlfqs_enabled: false,
            yield_pending: false,
            reap_pending: None,
            slice_remaining: 0,
        }
    }

    pub fn thread(&self, id: ThreadId) -> &Thread {
        self.threads[id.index()]
            .as_deref()
            .expect("thread id no longer present in arena")
    }

    pub fn thread_mut(&mut self, id: ThreadId) -> &mut Thread {
        self.threads[id.index()]
            .as_deref_mut()
            .expect("thread id no longer present in arena")
    }

    pub fn insert_thread(&mut self, thread: Thread) -> ThreadId {
        let id = thread.id;
        let idx = id.index();
        if idx >= self.threads.len() {
            self.threads.resize_with(idx + 1, || None);
        }
        self.threads[idx] = Some(Box::new(thread));
        id
    }

    pub fn lock(&self, id: LockId) -> &LockInner {
        &self.locks[id.index()]
    }

    pub fn lock_mut(&mut self, id: LockId) -> &mut LockInner {
        &mut self.locks[id.index()]
    }

    pub fn alloc_lock(&mut self, semaphore: SemaphoreId) -> LockId {
        let id = LockId::from_index(self.locks.len());
        self.locks.push(LockInner {
            semaphore,
            holder: None,
            max_donated_priority: crate::thread::PRI_MIN,
        });
        id
    }

    pub fn semaphore(&self, id: SemaphoreId) -> &SemaphoreInner {
        &self.semaphores[id.index()]
    }

    pub fn semaphore_mut(&mut self, id: SemaphoreId) -> &mut SemaphoreInner {
        &mut self.semaphores[id.index()]
    }

    pub fn alloc_semaphore(&mut self, value: u32) -> SemaphoreId {
        let id = SemaphoreId::from_index(self.semaphores.len());
        self.semaphores.push(SemaphoreInner {
            value,
            waiters: Vec::new(),
        });
        id
    }

    pub fn condvar_waiters(&self, id: CondVarId) -> &Vec<SemaphoreId> {
        &self.condvars[id.index()]
    }

    pub fn condvar_waiters_mut(&mut self, id: CondVarId) -> &mut Vec<SemaphoreId> {
        &mut self.condvars[id.index()]
    }

    pub fn alloc_condvar(&mut self) -> CondVarId {
        let id = CondVarId::from_index(self.condvars.len());
        self.condvars.push(Vec::new());
        id
    }

    /// Every thread whose effective priority is at least `priority`, ready or
    /// running, currently outranks a thread that just requested `priority` —
    /// used by thread creation's "yield if the new thread outranks me" rule.
    pub fn highest_ready_priority(&self) -> u8 {
        self.ready
            .front()
            .map(|&id| self.thread(id).effective_priority)
            .unwrap_or(crate::thread::PRI_MIN)
    }

    pub fn current_thread(&self) -> ThreadId {
        self.current.expect("no current thread scheduled yet")
    }

    /// L3: effective priority is the max of a thread's own base priority and
    /// the highest `max_donated_priority` among locks it currently holds.
    /// Only meaningful when MLFQ is disabled; callers gate on that.
    pub fn recompute_effective_priority(&self, id: ThreadId) -> u8 {
        let thread = self.thread(id);
        let donated = thread
            .locks_held
            .iter()
            .map(|&l| self.lock(l).max_donated_priority)
            .max()
            .unwrap_or(crate::thread::PRI_MIN);
        thread.base_priority.max(donated)
    }
}

static STATE: Mutex<KernelState> = Mutex::new(KernelState::new());

/// The sole entry point into scheduler state. Disables interrupts for the
/// duration of `f`, making the single critical-section invariant literal.
/// Safe to call from within another `with_state` call already in
/// progress on this thread (nested `without_interrupts` is a no-op), but
/// must never be held across a real context switch — see `thread::switch_to`
/// for how blocking operations avoid that.
pub fn with_state<R>(f: impl FnOnce(&mut KernelState) -> R) -> R {
    without_interrupts(|| {
        let mut guard = STATE.lock();
        f(&mut guard)
    })
}
