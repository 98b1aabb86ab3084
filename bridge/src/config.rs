//! Bridge configuration types and utilities.
//!
//! Every field has a default, so an empty YAML document is a valid
//! configuration that spawns `mcp-proxy` with no endpoint argument.

use std::{collections::HashMap, fmt, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    cache::{CacheClass, CacheTtls},
    connector::protocol::bare_tool_name,
    error::{ConfigError, ConfigValidationError},
};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BridgeConfig {
    /// Downstream connector process
    #[serde(default)]
    pub connector: ConnectorConfig,

    /// Pause between consecutive remote calls (seconds)
    #[serde(default = "default_call_delay")]
    pub call_delay_secs: f64,

    /// Budget for a single remote call (seconds)
    #[serde(default = "default_job_timeout")]
    pub job_timeout_secs: f64,

    /// How long a caller waits for its job before giving up (seconds)
    #[serde(default = "default_wait_timeout")]
    pub wait_timeout_secs: f64,

    /// Result cache settings
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Clone, Deserialize, Serialize)]
pub struct ConnectorConfig {
    /// Executable implementing the downstream protocol translation
    #[serde(default = "default_connector_path")]
    pub path: String,

    /// Remote service endpoint, passed as the last command-line argument
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Extra arguments placed before the endpoint
    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment variables for the process
    #[serde(default)]
    pub envs: HashMap<String, String>,

    /// Budget for the initialize handshake after each spawn (seconds)
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: f64,

    /// Client name announced during the handshake
    #[serde(default = "default_client_name")]
    pub client_name: String,
}

impl fmt::Debug for ConnectorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Environment values frequently carry credentials.
        f.debug_struct("ConnectorConfig")
            .field("path", &self.path)
            .field("endpoint", &self.endpoint)
            .field("args", &self.args)
            .field("envs", &format!("{} vars", self.envs.len()))
            .field("handshake_timeout_secs", &self.handshake_timeout_secs)
            .field("client_name", &self.client_name)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// TTL for metadata results (tables, columns, status)
    #[serde(default = "default_metadata_ttl")]
    pub metadata_ttl_secs: u64,

    /// TTL for query results
    #[serde(default = "default_query_ttl")]
    pub query_ttl_secs: u64,

    /// Tools whose results use the query TTL; everything else is metadata.
    /// Matched against the bare tool name (without a `server:` prefix).
    #[serde(default = "default_query_tools")]
    pub query_tools: Vec<String>,

    /// Optional LRU bound on the number of cached results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_entries: Option<usize>,
}

/// Upper bound for delays and timeouts (one day).
pub const MAX_DURATION_SECS: f64 = 86_400.0;

/// Upper bound for cache TTLs (one year).
pub const MAX_TTL_SECS: u64 = 365 * 24 * 3600;

// Default value functions
fn default_call_delay() -> f64 {
    1.5
}

fn default_job_timeout() -> f64 {
    30.0
}

fn default_wait_timeout() -> f64 {
    60.0
}

fn default_connector_path() -> String {
    "mcp-proxy".to_string()
}

fn default_handshake_timeout() -> f64 {
    20.0
}

fn default_client_name() -> String {
    "mcp-web-bridge".to_string()
}

fn default_metadata_ttl() -> u64 {
    300 // 5 minutes
}

fn default_query_ttl() -> u64 {
    30
}

fn default_query_tools() -> Vec<String> {
    vec!["executeQuery".to_string()]
}

// Default implementations
impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            connector: ConnectorConfig::default(),
            call_delay_secs: default_call_delay(),
            job_timeout_secs: default_job_timeout(),
            wait_timeout_secs: default_wait_timeout(),
            cache: CacheConfig::default(),
        }
    }
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            path: default_connector_path(),
            endpoint: None,
            args: Vec::new(),
            envs: HashMap::new(),
            handshake_timeout_secs: default_handshake_timeout(),
            client_name: default_client_name(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            metadata_ttl_secs: default_metadata_ttl(),
            query_ttl_secs: default_query_ttl(),
            query_tools: default_query_tools(),
            max_entries: None,
        }
    }
}

impl ConnectorConfig {
    /// Full argument vector: configured args followed by the endpoint.
    pub fn command_args(&self) -> Vec<String> {
        let mut args = self.args.clone();
        if let Some(endpoint) = &self.endpoint {
            args.push(endpoint.clone());
        }
        args
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.handshake_timeout_secs)
    }
}

impl CacheConfig {
    pub fn ttls(&self) -> CacheTtls {
        CacheTtls {
            metadata: Duration::from_secs(self.metadata_ttl_secs),
            query: Duration::from_secs(self.query_ttl_secs),
        }
    }

    /// Cache class for a tool; fixed per tool name.
    pub fn classify(&self, tool_name: &str) -> CacheClass {
        let bare = bare_tool_name(tool_name);
        if self.query_tools.iter().any(|t| bare_tool_name(t) == bare) {
            CacheClass::Query
        } else {
            CacheClass::Metadata
        }
    }
}

impl BridgeConfig {
    /// Load configuration from a YAML file and validate it.
    pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_string(),
                source,
            })?;
        let config: Self = serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.connector.path.trim().is_empty() {
            return Err(ConfigValidationError::EmptyConnectorPath);
        }
        if !self.call_delay_secs.is_finite() || self.call_delay_secs < 0.0 {
            return Err(ConfigValidationError::InvalidDelay {
                field: "call_delay_secs",
                value: self.call_delay_secs,
            });
        }
        let timeouts = [
            ("job_timeout_secs", self.job_timeout_secs),
            ("wait_timeout_secs", self.wait_timeout_secs),
            (
                "connector.handshake_timeout_secs",
                self.connector.handshake_timeout_secs,
            ),
        ];
        for (field, value) in timeouts {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigValidationError::InvalidTimeout { field, value });
            }
        }
        for (field, value) in [("call_delay_secs", self.call_delay_secs)]
            .into_iter()
            .chain(timeouts)
        {
            if value > MAX_DURATION_SECS {
                return Err(ConfigValidationError::TooLarge {
                    field,
                    value,
                    max: MAX_DURATION_SECS,
                });
            }
        }
        for (field, ttl) in [
            ("cache.metadata_ttl_secs", self.cache.metadata_ttl_secs),
            ("cache.query_ttl_secs", self.cache.query_ttl_secs),
        ] {
            if ttl == 0 {
                return Err(ConfigValidationError::ZeroTtl { field });
            }
            if ttl > MAX_TTL_SECS {
                return Err(ConfigValidationError::TooLarge {
                    field,
                    value: ttl as f64,
                    max: MAX_TTL_SECS as f64,
                });
            }
        }
        if self.cache.max_entries == Some(0) {
            return Err(ConfigValidationError::ZeroCacheBound);
        }
        Ok(())
    }

    pub fn call_delay(&self) -> Duration {
        Duration::from_secs_f64(self.call_delay_secs)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.job_timeout_secs)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.wait_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.connector.path, "mcp-proxy");
        assert!(config.connector.endpoint.is_none());
        assert_eq!(config.call_delay(), Duration::from_millis(1500));
        assert_eq!(config.job_timeout(), Duration::from_secs(30));
        assert_eq!(config.wait_timeout(), Duration::from_secs(60));
        assert_eq!(config.cache.ttls().metadata, Duration::from_secs(300));
        assert_eq!(config.cache.ttls().query, Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_minimal_config() {
        let config: BridgeConfig = serde_yaml::from_str("{}").expect("Failed to parse YAML");
        assert_eq!(config.connector.path, "mcp-proxy");
        assert_eq!(config.call_delay_secs, 1.5);
        assert_eq!(config.cache.query_tools, vec!["executeQuery".to_string()]);
    }

    #[test]
    fn test_yaml_full_config() {
        let yaml = r#"
connector:
  path: "/opt/proxy/bin/mcp-proxy"
  endpoint: "http://10.0.0.5:32049/mcp/sse"
  args: ["--debug"]
  envs:
    PROXY_TOKEN: "secret"
  handshake_timeout_secs: 5
call_delay_secs: 0.25
job_timeout_secs: 10
wait_timeout_secs: 45
cache:
  metadata_ttl_secs: 600
  query_ttl_secs: 15
  query_tools: ["executeQuery", "getData"]
  max_entries: 1000
"#;

        let config: BridgeConfig = serde_yaml::from_str(yaml).expect("Failed to parse YAML");
        assert_eq!(config.connector.path, "/opt/proxy/bin/mcp-proxy");
        assert_eq!(
            config.connector.command_args(),
            vec![
                "--debug".to_string(),
                "http://10.0.0.5:32049/mcp/sse".to_string()
            ]
        );
        assert_eq!(config.connector.handshake_timeout(), Duration::from_secs(5));
        assert_eq!(config.call_delay(), Duration::from_millis(250));
        assert_eq!(config.wait_timeout(), Duration::from_secs(45));
        assert_eq!(config.cache.max_entries, Some(1000));
        assert_eq!(config.cache.classify("getData"), CacheClass::Query);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_classify_strips_server_prefix() {
        let cache = CacheConfig::default();
        assert_eq!(cache.classify("executeQuery"), CacheClass::Query);
        assert_eq!(cache.classify("anylog:executeQuery"), CacheClass::Query);
        assert_eq!(cache.classify("listTables"), CacheClass::Metadata);
        assert_eq!(cache.classify("anylog:checkStatus"), CacheClass::Metadata);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = BridgeConfig::default();
        config.call_delay_secs = -1.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::InvalidDelay { .. })
        ));

        let mut config = BridgeConfig::default();
        config.job_timeout_secs = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::InvalidTimeout {
                field: "job_timeout_secs",
                ..
            })
        ));

        let mut config = BridgeConfig::default();
        config.connector.path = "  ".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigValidationError::EmptyConnectorPath)
        );

        let mut config = BridgeConfig::default();
        config.cache.query_ttl_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::ZeroTtl { .. })
        ));

        let mut config = BridgeConfig::default();
        config.cache.max_entries = Some(0);
        assert_eq!(config.validate(), Err(ConfigValidationError::ZeroCacheBound));
    }

    #[test]
    fn test_validate_rejects_huge_values() {
        let mut config = BridgeConfig::default();
        config.cache.metadata_ttl_secs = u64::MAX;
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::TooLarge {
                field: "cache.metadata_ttl_secs",
                ..
            })
        ));

        let mut config = BridgeConfig::default();
        config.call_delay_secs = 1e20;
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::TooLarge {
                field: "call_delay_secs",
                ..
            })
        ));

        let mut config = BridgeConfig::default();
        config.wait_timeout_secs = MAX_DURATION_SECS + 1.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::TooLarge {
                field: "wait_timeout_secs",
                ..
            })
        ));

        let mut config = BridgeConfig::default();
        config.cache.query_ttl_secs = MAX_TTL_SECS;
        config.job_timeout_secs = MAX_DURATION_SECS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_debug_redacts_envs() {
        let mut connector = ConnectorConfig::default();
        connector
            .envs
            .insert("TOKEN".to_string(), "hunter2".to_string());
        let rendered = format!("{:?}", connector);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("1 vars"));
    }

    #[tokio::test]
    async fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "call_delay_secs: 0.5\nconnector:\n  path: ./proxy").unwrap();

        let config = BridgeConfig::from_file(file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(config.connector.path, "./proxy");
        assert_eq!(config.call_delay(), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_from_file_rejects_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "wait_timeout_secs: -3").unwrap();

        let err = BridgeConfig::from_file(file.path().to_str().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_from_file_missing() {
        let err = BridgeConfig::from_file("/nonexistent/bridge.yaml")
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
