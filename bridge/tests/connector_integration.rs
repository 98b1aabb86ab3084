//! End-to-end tests against the `mock-connector` binary.

use std::{path::Path, sync::Arc, time::Duration};

use mcp_bridge::{
    Arguments, Bridge, BridgeConfig, BridgeError, CacheConfig, ConnectorConfig, InvokeOptions,
};
use serde_json::{json, Value};

fn connector_config() -> ConnectorConfig {
    ConnectorConfig {
        path: env!("CARGO_BIN_EXE_mock-connector").to_string(),
        handshake_timeout_secs: 5.0,
        ..Default::default()
    }
}

fn bridge_config(connector: ConnectorConfig) -> BridgeConfig {
    BridgeConfig {
        connector,
        call_delay_secs: 0.05,
        job_timeout_secs: 5.0,
        wait_timeout_secs: 15.0,
        cache: CacheConfig::default(),
    }
}

fn start() -> Bridge {
    Bridge::start(bridge_config(connector_config())).expect("valid config")
}

fn start_with_log(log: &Path) -> Bridge {
    let mut connector = connector_config();
    connector.envs.insert(
        "MOCK_CONNECTOR_LOG".to_string(),
        log.to_string_lossy().into_owned(),
    );
    Bridge::start(bridge_config(connector)).expect("valid config")
}

fn args(value: Value) -> Arguments {
    match value {
        Value::Object(map) => map,
        _ => panic!("arguments must be an object"),
    }
}

fn logged_tools(log: &Path) -> Vec<String> {
    std::fs::read_to_string(log)
        .unwrap_or_default()
        .lines()
        .filter_map(|line| line.split_once(' ').map(|(_, tool)| tool.to_string()))
        .collect()
}

const REFRESH: InvokeOptions = InvokeOptions {
    refresh: true,
    wait_timeout: None,
};

#[tokio::test]
async fn test_results_are_decoded() {
    let bridge = start();

    let tables = bridge.invoke("listTables", args(json!({"dbms": "x"}))).await;
    assert_eq!(tables, Ok(json!([{"table": "t1"}, {"table": "t2"}])));

    let rows = bridge
        .invoke("anylog:executeQuery", args(json!({"sql": "select 1"})))
        .await
        .unwrap();
    assert_eq!(rows["sql"], "select 1");
    assert_eq!(rows["rows"][0]["value"], 42);

    let text = bridge.invoke("text", Arguments::new()).await;
    assert_eq!(text, Ok(json!({"text": "plain words"})));

    let status = bridge.inspect();
    assert!(status.connector_alive);
    assert_eq!(status.metrics.respawns, 0);
    bridge.shutdown().await;
}

#[tokio::test]
async fn test_connector_exit_between_calls_respawns_once() {
    let bridge = start();

    let first_pid = bridge.invoke("pid", Arguments::new()).await.unwrap();
    assert_eq!(bridge.invoke("exit", Arguments::new()).await, Ok(json!("bye")));
    tokio::time::sleep(Duration::from_millis(300)).await;

    let second_pid = bridge
        .invoke_with("pid", Arguments::new(), REFRESH)
        .await
        .unwrap();
    assert_ne!(first_pid, second_pid);
    assert_eq!(bridge.inspect().metrics.respawns, 1);
    bridge.shutdown().await;
}

#[cfg(unix)]
#[tokio::test]
async fn test_killed_connector_respawns_once() {
    let bridge = start();

    let first_pid = bridge.invoke("pid", Arguments::new()).await.unwrap();
    let pid = first_pid.as_u64().expect("pid is a number").to_string();
    let killed = std::process::Command::new("kill")
        .args(["-9", &pid])
        .status()
        .expect("kill runs");
    assert!(killed.success());
    tokio::time::sleep(Duration::from_millis(300)).await;

    let second_pid = bridge
        .invoke_with("pid", Arguments::new(), REFRESH)
        .await
        .unwrap();
    assert_ne!(first_pid, second_pid);
    let metrics = bridge.inspect().metrics;
    assert_eq!(metrics.respawns, 1);
    assert_eq!(metrics.communication_errors, 0);
    bridge.shutdown().await;
}

#[tokio::test]
async fn test_malformed_frame_then_recovery() {
    let bridge = start();

    let err = bridge.invoke("malformed", Arguments::new()).await.unwrap_err();
    assert!(err.is_communication(), "unexpected error: {}", err);

    let tables = bridge.invoke("listTables", Arguments::new()).await;
    assert!(tables.is_ok());
    let metrics = bridge.inspect().metrics;
    assert_eq!(metrics.respawns, 1);
    assert_eq!(metrics.communication_errors, 1);
    bridge.shutdown().await;
}

#[tokio::test]
async fn test_downstream_errors_keep_connector() {
    let bridge = start();

    let err = bridge
        .invoke("fail", args(json!({"message": "no such table"})))
        .await
        .unwrap_err();
    assert_eq!(err, BridgeError::Downstream("no such table".into()));

    let err = bridge.invoke("rpcError", Arguments::new()).await.unwrap_err();
    assert_eq!(
        err,
        BridgeError::Downstream("backend unavailable (code -32000)".into())
    );

    assert!(bridge.invoke("listTables", Arguments::new()).await.is_ok());
    let status = bridge.inspect();
    assert_eq!(status.metrics.respawns, 0);
    assert_eq!(status.cached_entries, 1);
    bridge.shutdown().await;
}

#[tokio::test]
async fn test_timeout_then_next_call_gets_own_result() {
    let mut config = bridge_config(connector_config());
    config.job_timeout_secs = 1.0;
    let bridge = Bridge::start(config).unwrap();

    let err = bridge
        .invoke("slow", args(json!({"ms": 1500})))
        .await
        .unwrap_err();
    assert!(err.is_timeout());

    let echoed = bridge.invoke("echo", args(json!({"n": 1}))).await;
    assert_eq!(echoed, Ok(json!({"n": 1})));
    assert_eq!(bridge.inspect().metrics.respawns, 0);
    bridge.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_identical_invokes_reach_connector_once() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("calls.log");
    let bridge = Arc::new(start_with_log(&log));

    let mut tasks = Vec::new();
    for _ in 0..5 {
        let bridge = Arc::clone(&bridge);
        tasks.push(tokio::spawn(async move {
            bridge
                .invoke("slow", args(json!({"ms": 300})))
                .await
        }));
    }
    let mut results = Vec::new();
    for task in tasks {
        results.push(task.await.unwrap());
    }

    assert!(results.iter().all(|r| r == &Ok(json!({"slept": 300}))));
    assert_eq!(logged_tools(&log), vec!["slow".to_string()]);
    assert_eq!(bridge.inspect().cached_entries, 1);
    bridge.shutdown().await;
}

#[tokio::test]
async fn test_submission_order_is_preserved() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("calls.log");
    let bridge = start_with_log(&log);

    let (a, b, c) = tokio::join!(
        bridge.invoke("slow", args(json!({"ms": 100}))),
        bridge.invoke("echo", args(json!({"step": "b"}))),
        bridge.invoke("listTables", Arguments::new()),
    );
    assert!(a.is_ok() && b.is_ok() && c.is_ok());
    assert_eq!(
        logged_tools(&log),
        vec!["slow".to_string(), "echo".to_string(), "listTables".to_string()]
    );
    bridge.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_terminates_connector() {
    let bridge = start();
    assert!(bridge.invoke("pid", Arguments::new()).await.is_ok());

    bridge.shutdown().await;
    let status = bridge.inspect();
    assert!(!status.worker_alive);
    assert!(!status.connector_alive);
}
