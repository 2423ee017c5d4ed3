//! # Pool Configuration
//!
//! Purpose: Describe where the server lives and how the pool sizes, probes
//! and times out its connections.
//!
//! Configuration can be built in code (`PoolConfig::default()` plus field
//! updates) or loaded from JSON, where every field is optional and durations
//! are given in milliseconds:
//!
//! ```text
//! { "host": "10.0.0.7", "port": 8888, "max_conn_count": 32,
//!   "read_timeout_ms": 5000, "health_check_interval_ms": 60000 }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::connection::ConnectOptions;
use crate::error::{ClientError, ClientResult};

/// Key written by the liveness probe.
pub const DEFAULT_PROBE_KEY: &str = "6ba7b814-9dad-11d1-80b4-00c04fd430c8";
/// Default time between two background sweep steps.
pub const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(5 * 60);
/// Default number of connections dialed when the pool grows.
pub const DEFAULT_GROW_STEP: usize = 4;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(180);

/// Pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Server host name or IP address.
    pub host: String,
    /// Server TCP port.
    pub port: u16,
    /// Connections dialed when the pool is created.
    pub initial_conn_count: usize,
    /// Maximum number of idle connections kept for reuse.
    pub max_idle_count: usize,
    /// Maximum total connections (idle + in-use).
    pub max_conn_count: usize,
    /// Probe every connection before handing it out.
    pub check_on_get: bool,
    /// Interval at which the sweeper probes the oldest idle connection.
    #[serde(rename = "health_check_interval_ms", with = "millis")]
    pub health_check_interval: Duration,
    /// Upper bound on connections dialed by one growth step.
    pub grow_step: usize,
    /// TCP connect timeout.
    #[serde(rename = "connect_timeout_ms", with = "millis")]
    pub connect_timeout: Duration,
    /// Optional TCP read timeout.
    #[serde(rename = "read_timeout_ms", with = "opt_millis")]
    pub read_timeout: Option<Duration>,
    /// Optional TCP write timeout.
    #[serde(rename = "write_timeout_ms", with = "opt_millis")]
    pub write_timeout: Option<Duration>,
    /// Key the liveness probe writes.
    pub probe_key: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            host: "127.0.0.1".to_string(),
            port: 8888,
            initial_conn_count: 1,
            max_idle_count: 8,
            max_conn_count: 16,
            check_on_get: true,
            health_check_interval: DEFAULT_HEALTH_CHECK_INTERVAL,
            grow_step: DEFAULT_GROW_STEP,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: Some(DEFAULT_READ_TIMEOUT),
            write_timeout: None,
            probe_key: DEFAULT_PROBE_KEY.to_string(),
        }
    }
}

impl PoolConfig {
    /// Default configuration pointed at `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        PoolConfig {
            host: host.into(),
            port,
            ..PoolConfig::default()
        }
    }

    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json_str(raw: &str) -> ClientResult<Self> {
        let config: PoolConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> ClientResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Checks the sizing invariants.
    pub fn validate(&self) -> ClientResult<()> {
        if self.host.is_empty() {
            return Err(ClientError::InvalidConfig("host must not be empty".to_string()));
        }
        if self.max_conn_count == 0 {
            return Err(ClientError::InvalidConfig(
                "max_conn_count must be at least 1".to_string(),
            ));
        }
        if self.initial_conn_count > self.max_conn_count {
            return Err(ClientError::InvalidConfig(format!(
                "initial_conn_count ({}) exceeds max_conn_count ({})",
                self.initial_conn_count, self.max_conn_count
            )));
        }
        if self.grow_step == 0 {
            return Err(ClientError::InvalidConfig("grow_step must be at least 1".to_string()));
        }
        if self.health_check_interval.is_zero() {
            return Err(ClientError::InvalidConfig(
                "health_check_interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// `host:port` as dialed by the pool.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub(crate) fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            connect_timeout: Some(self.connect_timeout),
            read_timeout: self.read_timeout,
            write_timeout: self.write_timeout,
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod opt_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
    }
}
