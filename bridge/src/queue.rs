//! FIFO job queue with an in-flight index for request deduplication.
//!
//! Lock order: pending index shard, then queue. The worker only ever takes one
//! of them at a time. Once drained the queue is closed and refuses new work.

use std::{collections::VecDeque, sync::Arc};

use dashmap::{mapref::entry::Entry, DashMap};
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::{
    cache::CacheClass,
    error::BridgeError,
    job::{Arguments, Job, JobHandle, JobKey},
};

#[derive(Default)]
struct QueueState {
    jobs: VecDeque<Arc<Job>>,
    closed: bool,
}

pub struct JobQueue {
    queue: Mutex<QueueState>,
    /// Jobs that are queued or in flight, plus finished jobs the worker has
    /// not yet retired.
    pending: DashMap<JobKey, Arc<Job>>,
    ready: Notify,
}

impl JobQueue {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(QueueState::default()),
            pending: DashMap::new(),
            ready: Notify::new(),
        }
    }

    /// Returns a handle on the job for `key`, creating and enqueueing the job
    /// only if no job with that key is pending. After [`drain`](Self::drain)
    /// the returned handle resolves at once with a shutdown error.
    pub fn submit(
        &self,
        key: JobKey,
        tool_name: &str,
        arguments: Arguments,
        class: CacheClass,
    ) -> JobHandle {
        let handle = match self.pending.entry(key) {
            Entry::Occupied(entry) => entry.get().subscribe(true),
            Entry::Vacant(entry) => {
                let job = Arc::new(Job::new(entry.key().clone(), tool_name, arguments, class));
                let handle = job.subscribe(false);
                let mut state = self.queue.lock();
                if state.closed {
                    job.finish(Err(BridgeError::shutting_down()));
                    return handle;
                }
                state.jobs.push_back(Arc::clone(&job));
                drop(state);
                entry.insert(job);
                handle
            }
        };
        if !handle.is_attached() {
            self.ready.notify_one();
        }
        handle
    }

    /// Removes and returns the head of the queue, waiting while it is empty.
    /// Cancel safe.
    pub async fn pop(&self) -> Arc<Job> {
        loop {
            let next = self.queue.lock().jobs.pop_front();
            if let Some(job) = next {
                return job;
            }
            self.ready.notified().await;
        }
    }

    pub fn try_pop(&self) -> Option<Arc<Job>> {
        self.queue.lock().jobs.pop_front()
    }

    /// Drops the job from the in-flight index. A newer job under the same key
    /// is left alone.
    pub fn retire(&self, job: &Arc<Job>) {
        self.pending
            .remove_if(job.key(), |_, current| Arc::ptr_eq(current, job));
    }

    /// Closes the queue and empties it, returning the jobs that never started.
    pub fn drain(&self) -> Vec<Arc<Job>> {
        let mut state = self.queue.lock();
        state.closed = true;
        state.jobs.drain(..).collect()
    }

    pub fn is_closed(&self) -> bool {
        self.queue.lock().closed
    }

    pub fn depth(&self) -> usize {
        self.queue.lock().jobs.len()
    }

    pub fn queued_keys(&self) -> Vec<String> {
        self.queue
            .lock()
            .jobs
            .iter()
            .map(|job| job.key().to_string())
            .collect()
    }

    /// Keys of jobs that are queued or in flight, sorted.
    pub fn in_flight_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .pending
            .iter()
            .filter(|entry| !entry.value().state().is_terminal())
            .map(|entry| entry.key().to_string())
            .collect();
        keys.sort();
        keys
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}
