//! Caller-facing façade.
//!
//! Many tasks may call [`Bridge::invoke`] concurrently. Cache hits return
//! immediately; everything else becomes a job (or joins an identical pending
//! job) executed by the single worker task.

use std::{num::NonZeroUsize, sync::Arc, time::Duration};

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    cache::{CachedKey, ResultCache},
    config::BridgeConfig,
    connector::{Correlator, ProcessSupervisor, ToolCaller},
    error::{BridgeError, BridgeResult, ConfigValidationError},
    job::{Arguments, JobKey},
    metrics::{BridgeMetrics, MetricsSnapshot},
    queue::JobQueue,
    worker::{Worker, WorkerStatus},
};

/// Per-call overrides for [`Bridge::invoke_with`].
#[derive(Debug, Clone, Copy, Default)]
pub struct InvokeOptions {
    /// Skip the cache lookup and drop any cached entry for this key.
    pub refresh: bool,
    /// Overrides the configured wait timeout.
    pub wait_timeout: Option<Duration>,
}

/// Point-in-time view of the bridge.
#[derive(Debug, Clone, Serialize)]
pub struct BridgeStatus {
    pub queue_depth: usize,
    pub in_flight_keys: Vec<String>,
    pub call_delay_seconds: f64,
    pub queued_keys: Vec<String>,
    pub job_timeout_seconds: f64,
    pub wait_timeout_seconds: f64,
    pub cached_entries: usize,
    pub cached_keys: Vec<CachedKey>,
    pub worker_alive: bool,
    pub connector_alive: bool,
    pub metrics: MetricsSnapshot,
}

pub struct Bridge {
    config: BridgeConfig,
    cache: Arc<ResultCache>,
    queue: Arc<JobQueue>,
    metrics: Arc<BridgeMetrics>,
    status: Arc<WorkerStatus>,
    shutdown_token: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Bridge {
    /// Starts a bridge that drives the configured connector process.
    ///
    /// Must be called from within a Tokio runtime. The connector is spawned
    /// lazily by the first remote call.
    pub fn start(config: BridgeConfig) -> Result<Self, ConfigValidationError> {
        config.validate()?;
        let metrics = Arc::new(BridgeMetrics::new());
        let supervisor = ProcessSupervisor::new(config.connector.clone(), Arc::clone(&metrics));
        let correlator = Correlator::new(
            supervisor,
            config.connector.handshake_timeout(),
            config.connector.client_name.clone(),
        );
        Ok(Self::spawn(config, correlator, metrics))
    }

    /// Starts a bridge on top of an arbitrary [`ToolCaller`].
    pub fn with_caller<C: ToolCaller>(
        config: BridgeConfig,
        caller: C,
    ) -> Result<Self, ConfigValidationError> {
        config.validate()?;
        Ok(Self::spawn(config, caller, Arc::new(BridgeMetrics::new())))
    }

    fn spawn<C: ToolCaller>(config: BridgeConfig, caller: C, metrics: Arc<BridgeMetrics>) -> Self {
        let ttls = config.cache.ttls();
        let cache = match config.cache.max_entries.and_then(NonZeroUsize::new) {
            Some(bound) => ResultCache::with_capacity(ttls, bound),
            None => ResultCache::new(ttls),
        };
        let cache = Arc::new(cache);
        let queue = Arc::new(JobQueue::new());
        let status = Arc::new(WorkerStatus::default());
        let shutdown_token = CancellationToken::new();

        let worker = Worker::new(
            caller,
            Arc::clone(&queue),
            Arc::clone(&cache),
            Arc::clone(&metrics),
            Arc::clone(&status),
            config.call_delay(),
            config.job_timeout(),
            shutdown_token.clone(),
        );
        let handle = tokio::spawn(worker.run());
        info!(
            connector = %config.connector.path,
            endpoint = ?config.connector.endpoint,
            "Bridge started"
        );

        Self {
            config,
            cache,
            queue,
            metrics,
            status,
            shutdown_token,
            worker: Mutex::new(Some(handle)),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Invokes a remote tool, waiting at most the configured wait timeout.
    pub async fn invoke(&self, tool_name: &str, arguments: Arguments) -> BridgeResult<Value> {
        self.invoke_with(tool_name, arguments, InvokeOptions::default())
            .await
    }

    pub async fn invoke_with(
        &self,
        tool_name: &str,
        arguments: Arguments,
        options: InvokeOptions,
    ) -> BridgeResult<Value> {
        self.metrics.record_invocation();
        if self.shutdown_token.is_cancelled() {
            return Err(BridgeError::shutting_down());
        }

        let key = JobKey::new(tool_name, &arguments);
        if options.refresh {
            self.cache.remove(&key);
        } else if let Some(value) = self.cache.lookup(&key) {
            self.metrics.record_cache_hit();
            debug!(key = %key, "Cache hit");
            return Ok(value);
        }
        self.metrics.record_cache_miss();

        let class = self.config.cache.classify(tool_name);
        let handle = self.queue.submit(key, tool_name, arguments, class);
        if handle.is_attached() {
            self.metrics.record_dedup_join();
            debug!(key = %handle.key(), "Joined pending job");
        }
        let wait = options
            .wait_timeout
            .unwrap_or_else(|| self.config.wait_timeout());
        handle.wait(wait).await
    }

    /// Drops every cached result. Returns how many entries were removed.
    pub fn clear_cache(&self) -> usize {
        let cleared = self.cache.clear();
        info!(cleared, "Cache cleared");
        cleared
    }

    pub fn inspect(&self) -> BridgeStatus {
        let cached_keys = self.cache.snapshot();
        let worker_task_alive = self
            .worker
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished());
        BridgeStatus {
            queue_depth: self.queue.depth(),
            in_flight_keys: self.queue.in_flight_keys(),
            call_delay_seconds: self.config.call_delay_secs,
            queued_keys: self.queue.queued_keys(),
            job_timeout_seconds: self.config.job_timeout_secs,
            wait_timeout_seconds: self.config.wait_timeout_secs,
            cached_entries: cached_keys.len(),
            cached_keys,
            worker_alive: worker_task_alive && self.status.is_running(),
            connector_alive: self.status.is_connector_alive(),
            metrics: self.metrics.snapshot(),
        }
    }

    /// Stops the worker, fails queued jobs and terminates the connector.
    pub async fn shutdown(&self) {
        self.shutdown_token.cancel();
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Bridge worker terminated abnormally");
            }
        }
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.shutdown_token.cancel();
    }
}
