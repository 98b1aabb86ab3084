//! Command-line arguments for the HTTP driver.
//!
//! Values given on the command line (or through their environment variables)
//! override the YAML configuration file.

use clap::Parser;
use mcp_bridge::{BridgeConfig, ConfigError};

#[derive(Parser, Debug, Clone)]
#[command(name = "mcp-web-bridge", author, version, about, long_about = None)]
pub struct ServerArgs {
    /// Path to the bridge configuration file (YAML)
    #[arg(short, long, env = "BRIDGE_CONFIG")]
    pub config: Option<String>,

    /// Connector executable (overrides connector.path)
    #[arg(long, env = "BRIDGE_CONNECTOR_PATH")]
    pub connector_path: Option<String>,

    /// Remote endpoint passed to the connector (overrides connector.endpoint)
    #[arg(long, env = "BRIDGE_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Seconds between consecutive remote calls
    #[arg(long)]
    pub call_delay: Option<f64>,

    /// Seconds allowed for a single remote call
    #[arg(long)]
    pub job_timeout: Option<f64>,

    /// Seconds a caller waits for its result
    #[arg(long)]
    pub wait_timeout: Option<f64>,

    /// HTTP listen host
    #[arg(long, env = "BRIDGE_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// HTTP listen port
    #[arg(long, env = "BRIDGE_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, env = "BRIDGE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    pub log_json: bool,
}

impl ServerArgs {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Loads the configuration file (or defaults), applies CLI overrides and
    /// validates the result.
    pub async fn load_bridge_config(&self) -> Result<BridgeConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => BridgeConfig::from_file(path).await?,
            None => BridgeConfig::default(),
        };
        self.apply_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides(&self, config: &mut BridgeConfig) {
        if let Some(path) = &self.connector_path {
            config.connector.path = path.clone();
        }
        if let Some(endpoint) = &self.endpoint {
            config.connector.endpoint = Some(endpoint.clone());
        }
        if let Some(delay) = self.call_delay {
            config.call_delay_secs = delay;
        }
        if let Some(timeout) = self.job_timeout {
            config.job_timeout_secs = timeout;
        }
        if let Some(timeout) = self.wait_timeout {
            config.wait_timeout_secs = timeout;
        }
    }
}
