//! Minimal stdio MCP server used by the integration tests.
//!
//! Tools:
//! - `echo`: returns its arguments
//! - `listTables`: `[{"table": "t1"}, {"table": "t2"}]`
//! - `executeQuery`: `{"rows": [...], "sql": <sql>}`
//! - `pid`: the process id
//! - `slow`: sleeps `ms` milliseconds, then returns `{"slept": ms}`
//! - `fail`: `isError` result with the text in `message`
//! - `rpcError`: JSON-RPC error object
//! - `malformed`: writes a non-JSON line instead of a response
//! - `exit`: answers, then exits
//! - `text`: plain, non-JSON text content
//!
//! When `MOCK_CONNECTOR_LOG` is set, every `tools/call` is appended to that
//! file as `<pid> <tool>`.

use std::{
    fs::OpenOptions,
    io::{self, BufRead, Write},
    thread,
    time::Duration,
};

use serde_json::{json, Value};

fn text_result(text: String) -> Value {
    json!({"content": [{"type": "text", "text": text}]})
}

fn log_call(tool: &str) {
    let Ok(path) = std::env::var("MOCK_CONNECTOR_LOG") else {
        return;
    };
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
        let _ = writeln!(file, "{} {}", std::process::id(), tool);
    }
}

enum Reply {
    Result(Value),
    Error(i64, String),
    Raw(String),
    ResultThenExit(Value),
}

fn call_tool(name: &str, arguments: &Value) -> Reply {
    match name {
        "echo" => Reply::Result(text_result(arguments.to_string())),
        "listTables" => Reply::Result(text_result(
            json!([{"table": "t1"}, {"table": "t2"}]).to_string(),
        )),
        "executeQuery" => Reply::Result(text_result(
            json!({"rows": [{"value": 42}], "sql": arguments["sql"]}).to_string(),
        )),
        "pid" => Reply::Result(text_result(std::process::id().to_string())),
        "slow" => {
            let ms = arguments["ms"].as_u64().unwrap_or(1000);
            thread::sleep(Duration::from_millis(ms));
            Reply::Result(text_result(json!({"slept": ms}).to_string()))
        }
        "fail" => {
            let message = arguments["message"].as_str().unwrap_or("tool failed");
            Reply::Result(json!({
                "isError": true,
                "content": [{"type": "text", "text": message}]
            }))
        }
        "rpcError" => Reply::Error(-32000, "backend unavailable".to_string()),
        "malformed" => Reply::Raw("<<not json>>".to_string()),
        "exit" => Reply::ResultThenExit(text_result("\"bye\"".to_string())),
        "text" => Reply::Result(text_result("plain words".to_string())),
        other => Reply::Error(-32602, format!("Unknown tool: {}", other)),
    }
}

fn write_line(out: &mut impl Write, line: &str) -> io::Result<()> {
    out.write_all(line.as_bytes())?;
    out.write_all(b"\n")?;
    out.flush()
}

fn main() -> io::Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let Ok(message) = serde_json::from_str::<Value>(&line) else {
            continue;
        };
        let id = message.get("id").cloned();
        let method = message["method"].as_str().unwrap_or_default();

        let Some(id) = id else {
            // Notifications need no answer.
            continue;
        };

        let reply = match method {
            "initialize" => Reply::Result(json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {"tools": {}},
                "serverInfo": {"name": "mock-connector", "version": "0.1.0"}
            })),
            "ping" => Reply::Result(json!({})),
            "tools/call" => {
                let name = message["params"]["name"].as_str().unwrap_or_default();
                log_call(name);
                call_tool(name, &message["params"]["arguments"])
            }
            other => Reply::Error(-32601, format!("Method not found: {}", other)),
        };

        match reply {
            Reply::Result(result) => {
                let frame = json!({"jsonrpc": "2.0", "id": id, "result": result});
                write_line(&mut stdout, &frame.to_string())?;
            }
            Reply::Error(code, message) => {
                let frame = json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": {"code": code, "message": message}
                });
                write_line(&mut stdout, &frame.to_string())?;
            }
            Reply::Raw(raw) => write_line(&mut stdout, &raw)?,
            Reply::ResultThenExit(result) => {
                let frame = json!({"jsonrpc": "2.0", "id": id, "result": result});
                write_line(&mut stdout, &frame.to_string())?;
                std::process::exit(0);
            }
        }
    }
    Ok(())
}
