//! Request scheduler
//!
//! Pending tasks wait in a FIFO queue and at most `max_concurrency` run at
//! once. Each running task holds an [`ActiveSlot`]; dropping it (completion,
//! failure, panic or cancellation) frees the slot and admits the next task, so
//! the queue drains itself without a dedicated loop.

use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_MAX_CONCURRENCY: usize = 6;

/// Unit of work admitted by the scheduler
pub type QueueTask = BoxFuture<'static, ()>;

#[derive(Default)]
struct SchedulerState {
    queue: VecDeque<QueueTask>,
    active: usize,
}

/// Bounded FIFO task scheduler
pub struct Scheduler {
    max_concurrency: usize,
    state: Mutex<SchedulerState>,
}

impl Scheduler {
    pub fn new(max_concurrency: usize) -> Arc<Self> {
        Arc::new(Self {
            max_concurrency: max_concurrency.max(1),
            state: Mutex::new(SchedulerState::default()),
        })
    }

    /// Append `task` to the queue and try to start it.
    pub fn enqueue(self: &Arc<Self>, task: QueueTask) {
        {
            let mut state = self.state.lock();
            state.queue.push_back(task);
            debug!(
                "Task queued (active={}, queued={})",
                state.active,
                state.queue.len()
            );
        }
        self.admit_next();
    }

    /// Start the head task if a slot is free.
    pub fn admit_next(self: &Arc<Self>) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("No runtime available, leaving queued tasks pending");
                return;
            }
        };

        let task = {
            let mut state = self.state.lock();
            if state.active >= self.max_concurrency {
                return;
            }
            match state.queue.pop_front() {
                Some(task) => {
                    state.active += 1;
                    task
                }
                None => return,
            }
        };

        let slot = ActiveSlot {
            scheduler: Arc::clone(self),
        };
        handle.spawn(async move {
            let _slot = slot;
            task.await;
        });
    }

    fn release(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            state.active = state.active.saturating_sub(1);
        }
        self.admit_next();
    }

    /// Drop every task that has not started yet. Returns how many were dropped.
    pub fn drain(&self) -> usize {
        let pending: Vec<QueueTask> = {
            let mut state = self.state.lock();
            state.queue.drain(..).collect()
        };
        pending.len()
    }

    pub fn active_requests(&self) -> usize {
        self.state.lock().active
    }

    pub fn queued_requests(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }
}

/// Occupied concurrency slot, released on drop
struct ActiveSlot {
    scheduler: Arc<Scheduler>,
}

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        self.scheduler.release();
    }
}
