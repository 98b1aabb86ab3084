use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use mcp_bridge::Bridge;
use tracing::info;
use web_bridge::{config::ServerArgs, logging::init_logging, server};

#[tokio::main]
async fn main() -> Result<()> {
    let args = ServerArgs::parse();
    init_logging(&args.log_level, args.log_json)?;

    let config = args
        .load_bridge_config()
        .await
        .context("failed to load bridge configuration")?;
    info!(?config, "Starting MCP web bridge");

    let bridge = Arc::new(Bridge::start(config)?);
    let result = server::serve(&args.bind_address(), Arc::clone(&bridge)).await;

    bridge.shutdown().await;
    info!("MCP web bridge stopped");
    result
}
