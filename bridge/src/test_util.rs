//! In-process fakes shared by unit tests.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::time::Instant;

use crate::{
    connector::ToolCaller,
    error::{BridgeError, BridgeResult},
    job::Arguments,
};

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub tool: String,
    pub arguments: Arguments,
    pub at: Instant,
}

/// Calls observed by a [`FakeCaller`], shared with the test body.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<RecordedCall>>>);

impl CallLog {
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.0.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.0.lock().len()
    }

    fn record(&self, tool: &str, arguments: &Arguments) {
        self.0.lock().push(RecordedCall {
            tool: tool.to_string(),
            arguments: arguments.clone(),
            at: Instant::now(),
        });
    }
}

type Behavior = Box<dyn FnMut(&str, &Arguments) -> BridgeResult<Value> + Send>;

pub struct FakeCaller {
    log: CallLog,
    behavior: Behavior,
    latency: Duration,
}

impl FakeCaller {
    pub fn new<F>(log: CallLog, behavior: F) -> Self
    where
        F: FnMut(&str, &Arguments) -> BridgeResult<Value> + Send + 'static,
    {
        Self {
            log,
            behavior: Box::new(behavior),
            latency: Duration::ZERO,
        }
    }

    /// Answers every call with `{"tool": ..., "arguments": ...}`.
    pub fn echo(log: CallLog) -> Self {
        Self::new(log, |tool, arguments| {
            Ok(json!({ "tool": tool, "arguments": arguments }))
        })
    }

    /// Simulated time each call takes.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

#[async_trait]
impl ToolCaller for FakeCaller {
    async fn call(
        &mut self,
        tool_name: &str,
        arguments: &Arguments,
        timeout: Duration,
    ) -> BridgeResult<Value> {
        self.log.record(tool_name, arguments);
        if self.latency >= timeout {
            tokio::time::sleep(timeout).await;
            return Err(BridgeError::TimedOut(format!("{} did not answer", tool_name)));
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        (self.behavior)(tool_name, arguments)
    }
}
