//! The single worker task: the only code path that talks to the connector.
//!
//! Jobs are taken from the queue in FIFO order and executed one at a time,
//! with a fixed pause between consecutive remote calls.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    cache::ResultCache,
    connector::ToolCaller,
    error::BridgeError,
    job::Job,
    metrics::BridgeMetrics,
    queue::JobQueue,
};

/// Liveness flags published by the worker for `inspect`.
#[derive(Debug, Default)]
pub struct WorkerStatus {
    running: AtomicBool,
    connector_alive: AtomicBool,
}

impl WorkerStatus {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn is_connector_alive(&self) -> bool {
        self.connector_alive.load(Ordering::Acquire)
    }

    fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    fn set_connector_alive(&self, alive: bool) {
        self.connector_alive.store(alive, Ordering::Release);
    }
}

/// How a popped job was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Execution {
    /// Answered from the cache, no remote call.
    Cached,
    /// A remote call was made.
    Remote,
    /// Interrupted by shutdown.
    Cancelled,
}

pub struct Worker<C: ToolCaller> {
    caller: C,
    queue: Arc<JobQueue>,
    cache: Arc<ResultCache>,
    metrics: Arc<BridgeMetrics>,
    status: Arc<WorkerStatus>,
    call_delay: Duration,
    job_timeout: Duration,
    shutdown: CancellationToken,
}

impl<C: ToolCaller> Worker<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        caller: C,
        queue: Arc<JobQueue>,
        cache: Arc<ResultCache>,
        metrics: Arc<BridgeMetrics>,
        status: Arc<WorkerStatus>,
        call_delay: Duration,
        job_timeout: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            caller,
            queue,
            cache,
            metrics,
            status,
            call_delay,
            job_timeout,
            shutdown,
        }
    }

    /// Runs until the shutdown token is cancelled.
    pub async fn run(mut self) {
        self.status.set_running(true);
        info!(
            call_delay_ms = self.call_delay.as_millis() as u64,
            job_timeout_ms = self.job_timeout.as_millis() as u64,
            "Bridge worker started"
        );

        loop {
            let job = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                job = self.queue.pop() => job,
            };

            let execution = self.execute(&job).await;
            self.queue.retire(&job);

            match execution {
                Execution::Cancelled => break,
                Execution::Cached => {}
                Execution::Remote => {
                    if !self.call_delay.is_zero() {
                        tokio::select! {
                            biased;
                            _ = self.shutdown.cancelled() => break,
                            _ = tokio::time::sleep(self.call_delay) => {}
                        }
                    }
                }
            }
        }

        self.stop().await;
    }

    async fn execute(&mut self, job: &Arc<Job>) -> Execution {
        // A result may have been cached after the caller's own lookup.
        if let Some(value) = self.cache.lookup(job.key()) {
            debug!(key = %job.key(), "Cache hit on dequeue");
            job.finish(Ok(value));
            return Execution::Cached;
        }
        if !job.start() {
            warn!(key = %job.key(), state = ?job.state(), "Dequeued job was not queued");
            return Execution::Cached;
        }

        debug!(key = %job.key(), waiters = job.waiter_count(), "Calling connector");
        self.metrics.record_call_start();
        let started = Instant::now();

        let outcome = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => {
                job.finish(Err(BridgeError::shutting_down()));
                return Execution::Cancelled;
            }
            outcome = self.caller.call(job.tool_name(), job.arguments(), self.job_timeout) => outcome,
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        self.metrics.record_call_end(
            outcome.is_ok(),
            matches!(outcome, Err(BridgeError::TimedOut(_))),
            elapsed_ms,
        );
        match &outcome {
            Ok(_) => debug!(key = %job.key(), elapsed_ms, "Call completed"),
            Err(e) => {
                if e.is_communication() {
                    self.metrics.record_communication_error();
                }
                warn!(key = %job.key(), kind = %e.kind(), error = %e.message(), elapsed_ms, "Call failed");
            }
        }
        self.status.set_connector_alive(self.caller.is_alive());

        // Waiters are released before the cache write.
        let cached = outcome.as_ref().ok().cloned();
        job.finish(outcome);
        if let Some(value) = cached {
            self.cache.store(job.key().clone(), value, job.class());
        }
        Execution::Remote
    }

    async fn stop(&mut self) {
        let drained = self.queue.drain();
        if !drained.is_empty() {
            info!(count = drained.len(), "Failing queued jobs on shutdown");
        }
        for job in drained {
            job.finish(Err(BridgeError::shutting_down()));
            self.queue.retire(&job);
        }
        self.caller.shutdown().await;
        self.status.set_connector_alive(false);
        self.status.set_running(false);
        info!("Bridge worker stopped");
    }
}
