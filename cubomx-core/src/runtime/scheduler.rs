//! Task Scheduler
//!
//! The scheduler holds the three kinds of deferred work the runtime knows
//! about. None of them run on their own: the runtime drains them at well
//! defined points, which keeps ordering deterministic under test.
//!
//! # Queues
//!
//! 1. Microtasks run at every checkpoint (after `start`, after an event
//!    dispatch, on every poll of a completion), in FIFO order, including
//!    microtasks queued while draining.
//!
//! 2. Animation frame callbacks run on [`Runtime::frame`]. Callbacks
//!    requested while a frame runs wait for the next frame.
//!
//! 3. Timers run on [`Runtime::advance`], in deadline order, against a
//!    virtual clock that only moves when advanced.
//!
//! [`Runtime::frame`]: super::Runtime::frame
//! [`Runtime::advance`]: super::Runtime::advance

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

/// A deferred unit of work.
pub type Task = Box<dyn FnOnce() + Send>;

/// Identifies a pending timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

struct Timer {
    id: TimerId,
    deadline: Duration,
    task: Task,
}

/// Microtask, animation-frame and timer queues.
pub struct Scheduler {
    microtasks: Mutex<VecDeque<Task>>,
    frames: Mutex<Vec<Task>>,
    timers: Mutex<Vec<Timer>>,
    now: Mutex<Duration>,
    next_timer: AtomicU64,
}

impl Scheduler {
    /// Create an empty scheduler with the clock at zero.
    pub fn new() -> Self {
        Self {
            microtasks: Mutex::new(VecDeque::new()),
            frames: Mutex::new(Vec::new()),
            timers: Mutex::new(Vec::new()),
            now: Mutex::new(Duration::ZERO),
            next_timer: AtomicU64::new(0),
        }
    }

    pub fn queue_microtask(&self, task: Task) {
        self.microtasks.lock().push_back(task);
    }

    /// Run microtasks until the queue is empty. Returns how many ran.
    pub fn run_microtasks(&self) -> usize {
        let mut ran = 0;
        loop {
            // Pop in its own statement so the lock is released before the
            // task runs.
            let task = self.microtasks.lock().pop_front();
            let Some(task) = task else {
                return ran;
            };
            task();
            ran += 1;
        }
    }

    pub fn request_frame(&self, task: Task) {
        self.frames.lock().push(task);
    }

    /// Take the callbacks registered for the next frame.
    pub fn take_frame(&self) -> Vec<Task> {
        std::mem::take(&mut *self.frames.lock())
    }

    /// Run `task` once the clock has advanced by `delay`.
    pub fn set_timeout(&self, delay: Duration, task: Task) -> TimerId {
        let id = TimerId(self.next_timer.fetch_add(1, Ordering::Relaxed));
        let deadline = *self.now.lock() + delay;
        self.timers.lock().push(Timer { id, deadline, task });
        id
    }

    /// Cancel a timer. Returns whether it was still pending.
    pub fn clear_timeout(&self, id: TimerId) -> bool {
        let mut timers = self.timers.lock();
        let before = timers.len();
        timers.retain(|t| t.id != id);
        timers.len() != before
    }

    /// Remove the earliest timer due at or before `until` and move the clock
    /// to its deadline.
    pub fn pop_due(&self, until: Duration) -> Option<Task> {
        let mut timers = self.timers.lock();
        let index = timers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.deadline <= until)
            .min_by_key(|(_, t)| (t.deadline, t.id))
            .map(|(i, _)| i)?;
        let timer = timers.remove(index);
        let mut now = self.now.lock();
        *now = (*now).max(timer.deadline);
        Some(timer.task)
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        *self.now.lock()
    }

    pub(crate) fn set_now(&self, now: Duration) {
        let mut current = self.now.lock();
        *current = (*current).max(now);
    }

    /// Number of queued microtasks, frame callbacks and timers.
    pub fn pending(&self) -> (usize, usize, usize) {
        (
            self.microtasks.lock().len(),
            self.frames.lock().len(),
            self.timers.lock().len(),
        )
    }

    /// Drop everything and reset the clock.
    pub fn clear(&self) {
        self.microtasks.lock().clear();
        self.frames.lock().clear();
        self.timers.lock().clear();
        *self.now.lock() = Duration::ZERO;
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
