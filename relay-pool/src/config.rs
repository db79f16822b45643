//! Pool configuration.

use relay_transport::Origin;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::{PoolError, Result};

/// Connection pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Host every pooled connection is made to.
    pub host: String,
    /// Port every pooled connection is made to.
    pub port: u16,
    /// Expected number of concurrently outstanding connections.
    ///
    /// Advisory: `get()` still connects past this, with a warning.
    pub max_size: usize,
    /// Upper bound on establishing a new connection. `None` waits forever.
    #[serde(with = "duration_ms::option", default = "default_connect_timeout")]
    pub connect_timeout: Option<Duration>,
    /// Per-operation read/write timeout for `PooledConnection::timed()`.
    /// Zero disables it.
    #[serde(with = "duration_ms", default)]
    pub io_timeout: Duration,
}

fn default_connect_timeout() -> Option<Duration> {
    Some(Duration::from_secs(10))
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 80,
            max_size: 10,
            connect_timeout: default_connect_timeout(),
            io_timeout: Duration::ZERO,
        }
    }
}

impl PoolConfig {
    /// Create a configuration for `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Create a configuration for the origin of `url`.
    pub fn from_url(url: &Url) -> Result<Self> {
        let origin = Origin::from_url(url)?;
        Ok(Self::new(origin.host, origin.port))
    }

    /// Create a builder.
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::new()
    }

    /// Load configuration from environment variables.
    ///
    /// `RELAY_URL` sets host and port together; `RELAY_HOST` and `RELAY_PORT`
    /// override them individually.
    pub fn from_env() -> Result<PoolConfigBuilder> {
        let mut builder = PoolConfigBuilder::new();

        if let Ok(url) = std::env::var("RELAY_URL") {
            let url = Url::parse(&url)
                .map_err(|e| PoolError::Config(format!("Invalid RELAY_URL: {}", e)))?;
            builder = builder.origin(&Origin::from_url(&url)?);
        }

        if let Ok(host) = std::env::var("RELAY_HOST") {
            builder = builder.host(host);
        }

        if let Ok(port) = std::env::var("RELAY_PORT") {
            let port = port
                .parse()
                .map_err(|_| PoolError::Config(format!("Invalid RELAY_PORT: {}", port)))?;
            builder = builder.port(port);
        }

        if let Ok(size) = std::env::var("RELAY_POOL_SIZE")
            && let Ok(size) = size.parse() {
                builder = builder.max_size(size);
            }

        if let Ok(ms) = std::env::var("RELAY_CONNECT_TIMEOUT_MS")
            && let Ok(ms) = ms.parse::<u64>() {
                builder = if ms == 0 {
                    builder.no_connect_timeout()
                } else {
                    builder.connect_timeout(Duration::from_millis(ms))
                };
            }

        if let Ok(ms) = std::env::var("RELAY_IO_TIMEOUT_MS")
            && let Ok(ms) = ms.parse() {
                builder = builder.io_timeout(Duration::from_millis(ms));
            }

        Ok(builder)
    }

    /// The `host:port` this pool connects to, for logging.
    pub fn target(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Builder for pool configuration.
#[derive(Default)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl PoolConfigBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set host and port from an origin.
    pub fn origin(mut self, origin: &Origin) -> Self {
        self.config.host = origin.host.clone();
        self.config.port = origin.port;
        self
    }

    /// Set the advisory pool size.
    pub fn max_size(mut self, size: usize) -> Self {
        self.config.max_size = size;
        self
    }

    /// Set the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = Some(timeout);
        self
    }

    /// Wait indefinitely for new connections.
    pub fn no_connect_timeout(mut self) -> Self {
        self.config.connect_timeout = None;
        self
    }

    /// Set the per-operation I/O timeout.
    pub fn io_timeout(mut self, timeout: Duration) -> Self {
        self.config.io_timeout = timeout;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> PoolConfig {
        self.config
    }
}

/// Durations as integer milliseconds.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }

    pub mod option {
        use super::*;

        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            duration.map(|d| d.as_millis() as u64).serialize(serializer)
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let ms = Option::<u64>::deserialize(deserializer)?;
            Ok(ms.map(Duration::from_millis))
        }
    }
}
