//! Jobs: one unit of work per distinct (tool, arguments) pair.
//!
//! A [`Job`] is shared between the queue, the worker and every caller waiting
//! on it. Its outcome travels through a `watch` channel so any number of
//! waiters can attach, including after the job already finished, and all of
//! them observe the same value.

use std::{fmt, sync::Arc, time::Duration};

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::{sync::watch, time::Instant};

use crate::{
    cache::CacheClass,
    error::{BridgeError, BridgeResult},
};

/// Tool call arguments.
pub type Arguments = Map<String, Value>;

/// Final result of a job, shared by every waiter.
pub type JobOutcome = BridgeResult<Value>;

/// Deterministic dedup and cache key: `<tool>:<canonical arguments>`.
///
/// Object keys are sorted recursively, so argument order never changes the
/// key. Array order is significant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobKey(Arc<str>);

impl JobKey {
    pub fn new(tool_name: &str, arguments: &Arguments) -> Self {
        let canonical = canonicalize(&Value::Object(arguments.clone()));
        Self(Arc::from(format!("{}:{}", tool_name, canonical)))
    }

    /// Wraps an already-built key string.
    pub fn from_raw(raw: &str) -> Self {
        Self(Arc::from(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), canonicalize(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Lifecycle of a job. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    InFlight,
    Done,
    Failed,
    TimedOut,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Failed | JobState::TimedOut)
    }

    fn for_outcome(outcome: &JobOutcome) -> Self {
        match outcome {
            Ok(_) => JobState::Done,
            Err(BridgeError::TimedOut(_)) => JobState::TimedOut,
            Err(_) => JobState::Failed,
        }
    }
}

pub struct Job {
    key: JobKey,
    tool_name: String,
    arguments: Arguments,
    class: CacheClass,
    state: Mutex<JobState>,
    outcome_tx: watch::Sender<Option<JobOutcome>>,
    created_at: Instant,
    completed_at: Mutex<Option<Instant>>,
}

impl Job {
    pub fn new(key: JobKey, tool_name: &str, arguments: Arguments, class: CacheClass) -> Self {
        let (outcome_tx, _) = watch::channel(None);
        Self {
            key,
            tool_name: tool_name.to_string(),
            arguments,
            class,
            state: Mutex::new(JobState::Queued),
            outcome_tx,
            created_at: Instant::now(),
            completed_at: Mutex::new(None),
        }
    }

    pub fn key(&self) -> &JobKey {
        &self.key
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    pub fn arguments(&self) -> &Arguments {
        &self.arguments
    }

    pub fn class(&self) -> CacheClass {
        self.class
    }

    pub fn state(&self) -> JobState {
        *self.state.lock()
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn completed_at(&self) -> Option<Instant> {
        *self.completed_at.lock()
    }

    /// Number of live handles currently attached.
    pub fn waiter_count(&self) -> usize {
        self.outcome_tx.receiver_count()
    }

    /// Attaches a new waiter. `attached` records whether the caller joined a
    /// job somebody else created.
    pub fn subscribe(&self, attached: bool) -> JobHandle {
        JobHandle {
            key: self.key.clone(),
            rx: self.outcome_tx.subscribe(),
            attached,
        }
    }

    /// Queued -> InFlight. Returns false if the job was not queued.
    pub fn start(&self) -> bool {
        let mut state = self.state.lock();
        if *state != JobState::Queued {
            return false;
        }
        *state = JobState::InFlight;
        true
    }

    /// Publishes the outcome and wakes every waiter. Only the first call has
    /// any effect; returns whether this call was it.
    pub fn finish(&self, outcome: JobOutcome) -> bool {
        {
            let mut state = self.state.lock();
            if state.is_terminal() {
                return false;
            }
            *state = JobState::for_outcome(&outcome);
        }
        *self.completed_at.lock() = Some(Instant::now());
        self.outcome_tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome);
            true
        })
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("key", &self.key)
            .field("state", &self.state())
            .field("class", &self.class)
            .field("waiters", &self.waiter_count())
            .finish()
    }
}

/// A caller's attachment to a job.
#[derive(Debug)]
pub struct JobHandle {
    key: JobKey,
    rx: watch::Receiver<Option<JobOutcome>>,
    attached: bool,
}

impl JobHandle {
    pub fn key(&self) -> &JobKey {
        &self.key
    }

    /// True when this handle joined an already queued or in-flight job.
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Waits for the job's outcome for at most `timeout`. Giving up does not
    /// cancel the job.
    pub async fn wait(mut self, timeout: Duration) -> JobOutcome {
        let waited = tokio::time::timeout(timeout, self.rx.wait_for(Option::is_some)).await;
        let outcome = match waited {
            Ok(Ok(slot)) => slot.as_ref().cloned().unwrap_or_else(|| {
                Err(BridgeError::Internal(format!(
                    "job {} signalled completion without an outcome",
                    self.key
                )))
            }),
            Ok(Err(_)) => Err(BridgeError::Internal(format!(
                "job {} was dropped before completing",
                self.key
            ))),
            Err(_) => Err(BridgeError::TimedOut(format!(
                "gave up waiting for {} after {:.1}s",
                self.key,
                timeout.as_secs_f64()
            ))),
        };
        outcome
    }
}
