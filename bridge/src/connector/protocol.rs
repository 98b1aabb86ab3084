//! JSON-RPC 2.0 framing for MCP over stdio.
//!
//! One JSON message per line. Requests carry a numeric id assigned by the
//! correlator; responses echo it back.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::{
    error::{BridgeError, BridgeResult},
    job::Arguments,
};

pub const JSONRPC_VERSION: &str = "2.0";
pub const PROTOCOL_VERSION: &str = "2024-11-05";

const METHOD_NOT_FOUND: i64 = -32601;
const MAX_FRAME_PREVIEW: usize = 120;

/// Strips a `server:` qualifier from a tool name.
pub fn bare_tool_name(name: &str) -> &str {
    name.split_once(':').map(|(_, tool)| tool).unwrap_or(name)
}

#[derive(Debug, Serialize)]
struct OutgoingMessage<'a> {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    method: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<Value>,
}

impl<'a> OutgoingMessage<'a> {
    fn request(id: u64, method: &'a str, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id: Some(Value::from(id)),
            method: Some(method),
            params: Some(params),
            result: None,
            error: None,
        }
    }

    fn notification(method: &'a str) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id: None,
            method: Some(method),
            params: None,
            result: None,
            error: None,
        }
    }

    fn response(id: Value, result: Result<Value, Value>) -> Self {
        let (result, error) = match result {
            Ok(result) => (Some(result), None),
            Err(error) => (None, Some(error)),
        };
        Self {
            jsonrpc: JSONRPC_VERSION,
            id: Some(id),
            method: None,
            params: None,
            result,
            error,
        }
    }

    fn encode(&self) -> BridgeResult<Vec<u8>> {
        let mut frame = serde_json::to_vec(self)
            .map_err(|e| BridgeError::Internal(format!("failed to encode frame: {}", e)))?;
        frame.push(b'\n');
        Ok(frame)
    }
}

pub fn initialize_request(id: u64, client_name: &str) -> BridgeResult<Vec<u8>> {
    OutgoingMessage::request(
        id,
        "initialize",
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": client_name,
                "version": env!("CARGO_PKG_VERSION"),
            },
        }),
    )
    .encode()
}

pub fn initialized_notification() -> BridgeResult<Vec<u8>> {
    OutgoingMessage::notification("notifications/initialized").encode()
}

pub fn tool_call_request(id: u64, tool_name: &str, arguments: &Arguments) -> BridgeResult<Vec<u8>> {
    OutgoingMessage::request(
        id,
        "tools/call",
        json!({
            "name": bare_tool_name(tool_name),
            "arguments": arguments,
        }),
    )
    .encode()
}

/// Reply to a request initiated by the connector. Only `ping` is supported.
pub fn reply_to_peer_request(id: Value, method: &str) -> BridgeResult<Vec<u8>> {
    let result = if method == "ping" {
        Ok(json!({}))
    } else {
        Err(json!({
            "code": METHOD_NOT_FOUND,
            "message": format!("method not supported by client: {}", method),
        }))
    };
    OutgoingMessage::response(id, result).encode()
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct IncomingMessage {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

/// Response to one of our requests.
#[derive(Debug)]
pub struct RpcResponse {
    /// `None` when the peer could not attribute the response to a request.
    pub id: Option<u64>,
    pub result: Option<Value>,
    pub error: Option<RpcError>,
}

/// One decoded line from the connector.
#[derive(Debug)]
pub enum Frame {
    Blank,
    Notification { method: String },
    Request { id: Value, method: String },
    Response(RpcResponse),
}

fn preview(line: &str) -> String {
    let mut preview: String = line.chars().take(MAX_FRAME_PREVIEW).collect();
    if preview.len() < line.len() {
        preview.push_str("...");
    }
    preview
}

fn parse_id(id: &Value) -> Option<u64> {
    match id {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Decodes one line. Anything that is not a JSON-RPC object is a
/// communication error.
pub fn decode_frame(line: &str) -> BridgeResult<Frame> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Frame::Blank);
    }
    let message: IncomingMessage = serde_json::from_str(line).map_err(|e| {
        BridgeError::Communication(format!("malformed frame ({}): {}", e, preview(line)))
    })?;
    let frame = match (message.id, message.method) {
        (Some(id), Some(method)) => Frame::Request { id, method },
        (None, Some(method)) => Frame::Notification { method },
        (id, None) => Frame::Response(RpcResponse {
            id: id.as_ref().and_then(parse_id),
            result: message.result,
            error: message.error,
        }),
    };
    Ok(frame)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolCallResult {
    #[serde(default)]
    content: Vec<Value>,
    #[serde(default)]
    is_error: Option<bool>,
    #[serde(default)]
    structured_content: Option<Value>,
}

/// Turns a `tools/call` response into the caller-visible value.
///
/// Text blocks are joined with newlines. Text that parses as JSON is returned
/// as JSON, other text as `{"text": ...}`. With no text, `structuredContent`
/// is returned if present, else `{}`.
pub fn into_tool_result(response: RpcResponse) -> BridgeResult<Value> {
    if let Some(error) = response.error {
        return Err(BridgeError::Downstream(format!(
            "{} (code {})",
            error.message, error.code
        )));
    }
    let parsed: ToolCallResult = match response.result {
        None | Some(Value::Null) => ToolCallResult::default(),
        Some(result) => serde_json::from_value(result).map_err(|e| {
            BridgeError::Communication(format!("unexpected tools/call result shape: {}", e))
        })?,
    };

    let text = parsed
        .content
        .iter()
        .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|block| block.get("text").and_then(Value::as_str))
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    let text = text.trim();

    if parsed.is_error.unwrap_or(false) {
        let message = if text.is_empty() { "isError=true" } else { text };
        return Err(BridgeError::Downstream(message.to_string()));
    }
    if text.is_empty() {
        return Ok(parsed
            .structured_content
            .unwrap_or_else(|| Value::Object(Map::new())));
    }
    Ok(serde_json::from_str(text).unwrap_or_else(|_| json!({ "text": text })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_json(frame: &[u8]) -> Value {
        assert_eq!(frame.last(), Some(&b'\n'));
        serde_json::from_slice(&frame[..frame.len() - 1]).unwrap()
    }

    fn response(result: Value) -> RpcResponse {
        RpcResponse {
            id: Some(1),
            result: Some(result),
            error: None,
        }
    }

    #[test]
    fn test_bare_tool_name() {
        assert_eq!(bare_tool_name("anylog-proveit:listTables"), "listTables");
        assert_eq!(bare_tool_name("listTables"), "listTables");
    }

    #[test]
    fn test_tool_call_request_shape() {
        let mut arguments = Arguments::new();
        arguments.insert("dbms".to_string(), json!("x"));
        let frame = tool_call_request(7, "anylog:listTables", &arguments).unwrap();

        let value = decode_json(&frame);
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["id"], 7);
        assert_eq!(value["method"], "tools/call");
        assert_eq!(value["params"]["name"], "listTables");
        assert_eq!(value["params"]["arguments"]["dbms"], "x");
    }

    #[test]
    fn test_handshake_frames() {
        let init = decode_json(&initialize_request(1, "bridge").unwrap());
        assert_eq!(init["method"], "initialize");
        assert_eq!(init["params"]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(init["params"]["clientInfo"]["name"], "bridge");

        let notification = decode_json(&initialized_notification().unwrap());
        assert_eq!(notification["method"], "notifications/initialized");
        assert!(notification.get("id").is_none());
    }

    #[test]
    fn test_decode_frame_variants() {
        assert!(matches!(decode_frame("   ").unwrap(), Frame::Blank));
        assert!(matches!(
            decode_frame(r#"{"jsonrpc":"2.0","method":"notifications/progress"}"#).unwrap(),
            Frame::Notification { .. }
        ));
        assert!(matches!(
            decode_frame(r#"{"jsonrpc":"2.0","id":"abc","method":"ping"}"#).unwrap(),
            Frame::Request { .. }
        ));
        match decode_frame(r#"{"jsonrpc":"2.0","id":"12","result":{}}"#).unwrap() {
            Frame::Response(response) => assert_eq!(response.id, Some(12)),
            other => panic!("expected response, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_frame_rejects_garbage() {
        let err = decode_frame("Traceback (most recent call last):").unwrap_err();
        assert!(err.is_communication());
        assert!(decode_frame("[1, 2, 3]").unwrap_err().is_communication());
    }

    #[test]
    fn test_reply_to_peer_request() {
        let pong = decode_json(&reply_to_peer_request(json!("p1"), "ping").unwrap());
        assert_eq!(pong["id"], "p1");
        assert_eq!(pong["result"], json!({}));

        let refused = decode_json(&reply_to_peer_request(json!(3), "sampling/createMessage").unwrap());
        assert_eq!(refused["error"]["code"], METHOD_NOT_FOUND);
    }

    #[test]
    fn test_tool_result_json_text() {
        let value = into_tool_result(response(json!({
            "content": [{"type": "text", "text": "[{\"name\": \"t1\"}]"}]
        })))
        .unwrap();
        assert_eq!(value, json!([{"name": "t1"}]));
    }

    #[test]
    fn test_tool_result_plain_text_and_joining() {
        let value = into_tool_result(response(json!({
            "content": [
                {"type": "text", "text": "line one"},
                {"type": "image", "data": "..."},
                {"type": "text", "text": "line two"}
            ]
        })))
        .unwrap();
        assert_eq!(value, json!({"text": "line one\nline two"}));
    }

    #[test]
    fn test_tool_result_empty() {
        assert_eq!(into_tool_result(response(json!({"content": []}))).unwrap(), json!({}));
        assert_eq!(
            into_tool_result(response(json!({"content": [], "structuredContent": {"n": 1}})))
                .unwrap(),
            json!({"n": 1})
        );
    }

    #[test]
    fn test_tool_result_is_error() {
        let err = into_tool_result(response(json!({
            "isError": true,
            "content": [{"type": "text", "text": "table not found"}]
        })))
        .unwrap_err();
        assert_eq!(err, BridgeError::Downstream("table not found".into()));

        let err = into_tool_result(response(json!({"isError": true, "content": []}))).unwrap_err();
        assert_eq!(err, BridgeError::Downstream("isError=true".into()));
    }

    #[test]
    fn test_rpc_error_is_downstream() {
        let err = into_tool_result(RpcResponse {
            id: Some(1),
            result: None,
            error: Some(RpcError {
                code: -32602,
                message: "Unknown tool".into(),
                data: None,
            }),
        })
        .unwrap_err();
        assert_eq!(err, BridgeError::Downstream("Unknown tool (code -32602)".into()));
    }
}
