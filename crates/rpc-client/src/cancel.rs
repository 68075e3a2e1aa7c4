//! Suppression of completion callbacks for cancelled calls.
//!
//! Cancelling never aborts the network round-trip. The executing task
//! always runs to completion; it asks the tracker, right before invoking
//! its callback, whether it was cancelled in the meantime. The answer is
//! one-shot: the identity is forgotten once observed.
//!
//! Identities are [`TaskId`]s drawn from a per-client counter, so they are
//! never reused while a task is in flight.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Identity of a submitted call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

#[derive(Debug, Default)]
struct TrackerState {
    /// Tasks that have not yet reached their completion point.
    running: HashSet<TaskId>,
    /// Subset of `running` whose completion must be suppressed.
    cancelled: HashSet<TaskId>,
}

/// Registry of in-flight and cancelled task identities.
///
/// Both sets live under one lock so a `cancel` racing with a completing
/// task either lands before the completion check (callback suppressed) or
/// is rejected (task already done). No identity is ever left behind.
#[derive(Debug, Default)]
pub struct CancellationTracker {
    state: Mutex<TrackerState>,
    next_id: AtomicU64,
}

impl CancellationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an identity for a task about to be scheduled.
    pub fn register(&self) -> TaskId {
        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.state.lock().running.insert(id);
        id
    }

    /// Record `id` as cancelled.
    ///
    /// Returns `false` when the task already completed (or was never
    /// registered), in which case there is nothing left to suppress.
    pub fn cancel(&self, id: TaskId) -> bool {
        let mut state = self.state.lock();
        if !state.running.contains(&id) {
            return false;
        }
        state.cancelled.insert(id);
        true
    }

    /// Mark `id` as completed and report whether it had been cancelled.
    ///
    /// Called by the executing task immediately before its callback.
    pub fn is_cancelled_and_consume(&self, id: TaskId) -> bool {
        let mut state = self.state.lock();
        state.running.remove(&id);
        state.cancelled.remove(&id)
    }

    /// Drop all bookkeeping for `id`. Called when a call future ends,
    /// whether it completed or was discarded unrun.
    pub fn forget(&self, id: TaskId) {
        let mut state = self.state.lock();
        state.running.remove(&id);
        state.cancelled.remove(&id);
    }

    pub fn is_running(&self, id: TaskId) -> bool {
        self.state.lock().running.contains(&id)
    }

    /// Number of tasks still awaiting their completion point.
    pub fn in_flight(&self) -> usize {
        self.state.lock().running.len()
    }

    /// Number of cancellations not yet observed by their task.
    pub fn pending_cancellations(&self) -> usize {
        self.state.lock().cancelled.len()
    }
}
