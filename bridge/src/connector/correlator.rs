//! Request/response correlation over a [`FrameTransport`].
//!
//! Requests get strictly increasing ids. Because calls are sequential, any
//! response whose id is lower than the current request belongs to a call that
//! was already abandoned (timed out) and is dropped.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use super::{
    protocol::{self, Frame, RpcResponse},
    FrameTransport, ToolCaller,
};
use crate::{
    error::{BridgeError, BridgeResult},
    job::Arguments,
};

pub struct Correlator<T: FrameTransport> {
    transport: T,
    next_id: u64,
    ready: bool,
    handshake_timeout: Duration,
    client_name: String,
}

impl<T: FrameTransport> Correlator<T> {
    pub fn new(transport: T, handshake_timeout: Duration, client_name: impl Into<String>) -> Self {
        Self {
            transport,
            next_id: 1,
            ready: false,
            handshake_timeout,
            client_name: client_name.into(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Brings up the transport and runs the handshake when the peer is new.
    /// Respawn backoff and handshake both count against the call deadline.
    async fn ensure_ready(&mut self, call_deadline: Instant) -> BridgeResult<()> {
        let fresh = match timeout_at(call_deadline, self.transport.ensure_alive()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(BridgeError::TimedOut(
                    "connector was not started before the deadline".to_string(),
                ))
            }
        };
        if !fresh && self.ready {
            return Ok(());
        }

        let handshake_deadline = Instant::now() + self.handshake_timeout;
        let deadline = handshake_deadline.min(call_deadline);
        match self.handshake(deadline).await {
            Ok(()) => {
                self.ready = true;
                self.transport.mark_ready();
                info!("Connector handshake completed");
                Ok(())
            }
            Err(e) => {
                self.ready = false;
                let reason = format!("handshake failed: {}", e.message());
                self.transport.mark_failed(&reason);
                if call_deadline <= handshake_deadline && Instant::now() >= call_deadline {
                    Err(BridgeError::TimedOut(reason))
                } else {
                    Err(BridgeError::Communication(reason))
                }
            }
        }
    }

    async fn handshake(&mut self, deadline: Instant) -> BridgeResult<()> {
        let id = self.allocate_id();
        let request = protocol::initialize_request(id, &self.client_name)?;
        self.send(&request, deadline).await?;
        let response = self.await_response(id, deadline).await?;
        if let Some(error) = response.error {
            return Err(BridgeError::Communication(format!(
                "initialize rejected: {} (code {})",
                error.message, error.code
            )));
        }
        let notification = protocol::initialized_notification()?;
        self.send(&notification, deadline).await
    }

    /// A write cut short leaves a torn frame on the stream, so it is a
    /// communication failure rather than a timeout.
    async fn send(&mut self, frame: &[u8], deadline: Instant) -> BridgeResult<()> {
        match timeout_at(deadline, self.transport.write_frame(frame)).await {
            Ok(result) => result,
            Err(_) => Err(BridgeError::Communication(
                "timed out writing to connector".to_string(),
            )),
        }
    }

    /// Reads frames until the response for `id` arrives.
    async fn await_response(&mut self, id: u64, deadline: Instant) -> BridgeResult<RpcResponse> {
        loop {
            let line = match timeout_at(deadline, self.transport.read_frame()).await {
                Ok(Ok(Some(line))) => line,
                Ok(Ok(None)) => {
                    return Err(BridgeError::Communication(
                        "connector closed its output".to_string(),
                    ))
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    return Err(BridgeError::TimedOut(format!(
                        "no response to request {} before the deadline",
                        id
                    )))
                }
            };

            match protocol::decode_frame(&line)? {
                Frame::Blank => {}
                Frame::Notification { method } => {
                    debug!(method = %method, "Ignoring connector notification");
                }
                Frame::Request { id: peer_id, method } => {
                    debug!(method = %method, "Answering connector request");
                    let reply = protocol::reply_to_peer_request(peer_id, &method)?;
                    self.send(&reply, deadline).await?;
                }
                Frame::Response(response) => match response.id {
                    Some(rid) if rid == id => return Ok(response),
                    Some(rid) if rid < id => {
                        debug!(id = rid, "Discarding late response to abandoned request");
                    }
                    Some(rid) => {
                        warn!(id = rid, expected = id, "Ignoring response with unknown id");
                    }
                    // An id-less error is the peer failing to parse our frame.
                    None => match response.error {
                        Some(error) => {
                            return Err(BridgeError::Communication(format!(
                                "connector rejected a request: {} (code {})",
                                error.message, error.code
                            )))
                        }
                        None => warn!(expected = id, "Ignoring response without id"),
                    },
                },
            }
        }
    }

    async fn call_inner(
        &mut self,
        tool_name: &str,
        arguments: &Arguments,
        timeout: Duration,
    ) -> BridgeResult<Value> {
        let deadline = Instant::now() + timeout;
        self.ensure_ready(deadline).await?;

        let id = self.allocate_id();
        let request = protocol::tool_call_request(id, tool_name, arguments)?;
        self.send(&request, deadline).await?;
        let response = self.await_response(id, deadline).await?;
        protocol::into_tool_result(response)
    }
}

#[async_trait]
impl<T: FrameTransport> ToolCaller for Correlator<T> {
    async fn call(
        &mut self,
        tool_name: &str,
        arguments: &Arguments,
        timeout: Duration,
    ) -> BridgeResult<Value> {
        let result = self.call_inner(tool_name, arguments, timeout).await;
        if let Err(BridgeError::Communication(reason)) = &result {
            if self.ready {
                self.ready = false;
                self.transport.mark_failed(reason);
            }
        }
        result
    }

    fn is_alive(&mut self) -> bool {
        self.transport.is_alive()
    }

    async fn shutdown(&mut self) {
        self.ready = false;
        self.transport.shutdown().await;
    }
}
