//! Downstream connector: the supervised child process and the request
//! correlation on top of its stdio stream.
//!
//! - [`ProcessSupervisor`] owns the process and implements [`FrameTransport`].
//! - [`Correlator`] frames tool calls, performs the handshake after each spawn
//!   and matches responses by id. It implements [`ToolCaller`], the seam the
//!   worker calls through.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::{error::BridgeResult, job::Arguments};

pub mod backoff;
pub mod correlator;
pub mod protocol;
pub mod supervisor;

pub use backoff::RespawnBackoff;
pub use correlator::Correlator;
pub use supervisor::ProcessSupervisor;

/// Executes one remote tool call at a time. Only the worker holds a
/// `ToolCaller`, which is what keeps calls on the wire strictly sequential.
#[async_trait]
pub trait ToolCaller: Send + 'static {
    async fn call(
        &mut self,
        tool_name: &str,
        arguments: &Arguments,
        timeout: Duration,
    ) -> BridgeResult<Value>;

    /// Whether the downstream side is currently up.
    fn is_alive(&mut self) -> bool {
        true
    }

    async fn shutdown(&mut self) {}
}

/// Newline-delimited frame I/O with a restartable peer.
#[async_trait]
pub trait FrameTransport: Send + 'static {
    /// Makes sure a peer is running. Returns `true` when a new one was
    /// started and still needs its handshake.
    async fn ensure_alive(&mut self) -> BridgeResult<bool>;

    async fn write_frame(&mut self, frame: &[u8]) -> BridgeResult<()>;

    /// Next frame without its line terminator, `None` at end of stream.
    /// Must be cancel safe: the caller races it against a deadline.
    async fn read_frame(&mut self) -> BridgeResult<Option<String>>;

    /// The current peer finished its handshake.
    fn mark_ready(&mut self);

    /// Abandons the current peer; the next `ensure_alive` starts a new one.
    fn mark_failed(&mut self, reason: &str);

    fn is_alive(&mut self) -> bool;

    async fn shutdown(&mut self);
}
