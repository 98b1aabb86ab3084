//! Request-serializing bridge between many concurrent callers and one
//! stateful stdio MCP connector.
//!
//! Callers go through [`Bridge`]: results are served from a TTL cache when
//! possible, identical in-flight requests are coalesced into a single job, and
//! a single worker task executes jobs one at a time against the connector
//! process, respawning it when it dies or misbehaves.
//!
//! ```ignore
//! let bridge = Bridge::start(BridgeConfig::from_file("bridge.yaml").await?)?;
//! let tables = bridge.invoke("listTables", arguments).await?;
//! ```

pub mod bridge;
pub mod cache;
pub mod config;
pub mod connector;
pub mod error;
pub mod job;
pub mod metrics;
pub mod queue;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_util;

pub use bridge::{Bridge, BridgeStatus, InvokeOptions};
pub use cache::{CacheClass, CacheTtls, CachedKey, ResultCache};
pub use config::{BridgeConfig, CacheConfig, ConnectorConfig};
pub use connector::{Correlator, FrameTransport, ProcessSupervisor, RespawnBackoff, ToolCaller};
pub use error::{BridgeError, BridgeResult, ConfigError, ConfigValidationError, ErrorKind};
pub use job::{Arguments, JobKey, JobState};
pub use metrics::{BridgeMetrics, MetricsSnapshot};
