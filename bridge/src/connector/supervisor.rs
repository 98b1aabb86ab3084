//! Connector process lifecycle.
//!
//! At most one connector process exists at a time. A process that exits or
//! stops speaking the protocol is discarded and replaced lazily, the next time
//! a call needs it.

use std::{process::Stdio, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines},
    process::{Child, ChildStdin, ChildStdout, Command},
};
use tracing::{debug, info, warn};

use super::{backoff::RespawnBackoff, FrameTransport};
use crate::{
    config::ConnectorConfig,
    error::{BridgeError, BridgeResult},
    metrics::BridgeMetrics,
};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

struct ConnectorProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    pid: Option<u32>,
    ready: bool,
}

impl ConnectorProcess {
    fn has_exited(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(None) => false,
            Ok(Some(status)) => {
                info!(pid = ?self.pid, %status, "Connector process exited");
                true
            }
            Err(e) => {
                warn!(pid = ?self.pid, error = %e, "Failed to poll connector process");
                true
            }
        }
    }
}

/// Owns the connector child process and its stdio pipes.
pub struct ProcessSupervisor {
    config: ConnectorConfig,
    process: Option<ConnectorProcess>,
    backoff: RespawnBackoff,
    consecutive_failures: u32,
    spawned: u64,
    metrics: Arc<BridgeMetrics>,
}

impl ProcessSupervisor {
    pub fn new(config: ConnectorConfig, metrics: Arc<BridgeMetrics>) -> Self {
        Self::with_backoff(config, metrics, RespawnBackoff::default())
    }

    pub fn with_backoff(
        config: ConnectorConfig,
        metrics: Arc<BridgeMetrics>,
        backoff: RespawnBackoff,
    ) -> Self {
        Self {
            config,
            process: None,
            backoff,
            consecutive_failures: 0,
            spawned: 0,
            metrics,
        }
    }

    /// Pid of the current process, if one is running.
    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(|p| p.pid)
    }

    /// Number of processes started so far.
    pub fn spawn_count(&self) -> u64 {
        self.spawned
    }

    fn spawn(&self) -> BridgeResult<ConnectorProcess> {
        let mut cmd = Command::new(&self.config.path);
        cmd.args(self.config.command_args())
            .envs(&self.config.envs)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            BridgeError::Communication(format!(
                "failed to spawn connector '{}': {}",
                self.config.path, e
            ))
        })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            BridgeError::Communication("connector stdin was not captured".to_string())
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            BridgeError::Communication("connector stdout was not captured".to_string())
        })?;

        Ok(ConnectorProcess {
            pid: child.id(),
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            ready: false,
        })
    }

    fn current(&mut self) -> BridgeResult<&mut ConnectorProcess> {
        self.process
            .as_mut()
            .ok_or_else(|| BridgeError::Communication("connector is not running".to_string()))
    }
}

#[async_trait]
impl FrameTransport for ProcessSupervisor {
    async fn ensure_alive(&mut self) -> BridgeResult<bool> {
        if let Some(process) = self.process.as_mut() {
            if !process.has_exited() {
                return Ok(false);
            }
            self.process = None;
        }

        let delay = self.backoff.delay_after(self.consecutive_failures);
        if !delay.is_zero() {
            debug!(
                failures = self.consecutive_failures,
                delay_ms = delay.as_millis() as u64,
                "Delaying connector respawn"
            );
            tokio::time::sleep(delay).await;
        }

        match self.spawn() {
            Ok(process) => {
                if self.spawned > 0 {
                    self.metrics.record_respawn();
                }
                self.spawned += 1;
                info!(
                    path = %self.config.path,
                    pid = ?process.pid,
                    spawn = self.spawned,
                    "Started connector process"
                );
                self.process = Some(process);
                Ok(true)
            }
            Err(e) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                warn!(
                    error = %e,
                    failures = self.consecutive_failures,
                    "Connector spawn failed"
                );
                Err(e)
            }
        }
    }

    async fn write_frame(&mut self, frame: &[u8]) -> BridgeResult<()> {
        let process = self.current()?;
        process.stdin.write_all(frame).await?;
        process.stdin.flush().await?;
        Ok(())
    }

    async fn read_frame(&mut self) -> BridgeResult<Option<String>> {
        let process = self.current()?;
        Ok(process.stdout.next_line().await?)
    }

    fn mark_ready(&mut self) {
        if let Some(process) = self.process.as_mut() {
            process.ready = true;
            self.consecutive_failures = 0;
        }
    }

    fn mark_failed(&mut self, reason: &str) {
        let Some(mut process) = self.process.take() else {
            return;
        };
        if !process.ready {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        }
        warn!(pid = ?process.pid, reason, "Discarding connector process");
        if let Err(e) = process.child.start_kill() {
            debug!(pid = ?process.pid, error = %e, "Connector kill failed");
        }
    }

    fn is_alive(&mut self) -> bool {
        match self.process.as_mut() {
            Some(process) => !process.has_exited(),
            None => false,
        }
    }

    async fn shutdown(&mut self) {
        let Some(process) = self.process.take() else {
            return;
        };
        let ConnectorProcess {
            mut child,
            stdin,
            pid,
            ..
        } = process;
        // Closing stdin asks a well-behaved connector to exit.
        drop(stdin);
        match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
            Ok(Ok(status)) => info!(?pid, %status, "Connector process stopped"),
            Ok(Err(e)) => warn!(?pid, error = %e, "Failed to wait for connector process"),
            Err(_) => {
                warn!(?pid, "Connector did not exit in time, killing it");
                if let Err(e) = child.kill().await {
                    warn!(?pid, error = %e, "Failed to kill connector process");
                }
            }
        }
    }
}
