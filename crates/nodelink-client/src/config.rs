//! Connector configuration and its fluent builder.
//!
//! # Example
//!
//! ```no_run
//! use nodelink_client::ConnectorBuilder;
//! use std::time::Duration;
//!
//! # async fn example() -> nodelink_core::Result<()> {
//! let connector = ConnectorBuilder::new()
//!     .host("192.168.1.50")
//!     .credentials("admin", "llcgi")
//!     .max_backoff(Duration::from_secs(30))
//!     .start()?;
//! # connector.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use nodelink_core::error::{Error, Result};

use crate::connector::Connector;

/// Default management interface port.
pub const DEFAULT_PORT: u16 = 5038;

/// Default first reconnect delay.
pub const DEFAULT_MIN_BACKOFF: Duration = Duration::from_secs(1);

/// Default reconnect delay ceiling.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Default TCP connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default time allowed for banner plus login response.
pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Default time a caller waits for a correlated response.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Default interval between keepalive pings.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Default capacity of the message feed.
pub const DEFAULT_FEED_CAPACITY: usize = 256;

/// Default prefix for generated action ids.
pub const DEFAULT_ACTION_ID_PREFIX: &str = "nodelink";

/// Everything the connector needs to reach and stay logged into a
/// controller.
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// Controller host name or address.
    pub host: String,
    /// Management interface port.
    pub port: u16,
    /// Login user name.
    pub username: String,
    /// Login secret.
    pub secret: String,
    /// First reconnect delay; also the delay after a session that reached Ready.
    pub min_backoff: Duration,
    /// Reconnect delay ceiling.
    pub max_backoff: Duration,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Time allowed for the banner and the login response.
    pub login_timeout: Duration,
    /// Time a caller waits for a correlated response.
    pub request_timeout: Duration,
    /// Keepalive ping interval; `None` disables keepalive.
    pub keepalive_interval: Option<Duration>,
    /// Capacity of the bounded message feed.
    pub feed_capacity: usize,
    /// Prefix of generated action ids (`<prefix>-<n>`).
    pub action_id_prefix: String,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            username: String::new(),
            secret: String::new(),
            min_backoff: DEFAULT_MIN_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            login_timeout: DEFAULT_LOGIN_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            keepalive_interval: Some(DEFAULT_KEEPALIVE_INTERVAL),
            feed_capacity: DEFAULT_FEED_CAPACITY,
            action_id_prefix: DEFAULT_ACTION_ID_PREFIX.to_string(),
        }
    }
}

impl ConnectorConfig {
    /// `host:port` for dialing and logging.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check the configuration for values the connector cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::InvalidParameter("host must not be empty".into()));
        }
        if self.min_backoff.is_zero() {
            return Err(Error::InvalidParameter(
                "min_backoff must be greater than zero".into(),
            ));
        }
        if self.min_backoff > self.max_backoff {
            return Err(Error::InvalidParameter(format!(
                "min_backoff ({:?}) exceeds max_backoff ({:?})",
                self.min_backoff, self.max_backoff
            )));
        }
        if self.feed_capacity == 0 {
            return Err(Error::InvalidParameter(
                "feed_capacity must be greater than zero".into(),
            ));
        }
        if self.keepalive_interval.is_some_and(|i| i.is_zero()) {
            return Err(Error::InvalidParameter(
                "keepalive_interval must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Fluent builder for [`Connector`].
///
/// All settings have defaults; only the host and credentials normally
/// need to be set.
#[derive(Debug, Clone, Default)]
pub struct ConnectorBuilder {
    config: ConnectorConfig,
}

impl ConnectorBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration.
    pub fn from_config(config: ConnectorConfig) -> Self {
        Self { config }
    }

    /// Set the controller host name or address.
    pub fn host(mut self, host: &str) -> Self {
        self.config.host = host.to_string();
        self
    }

    /// Set the management interface port (default: 5038).
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the login user name and secret.
    pub fn credentials(mut self, username: &str, secret: &str) -> Self {
        self.config.username = username.to_string();
        self.config.secret = secret.to_string();
        self
    }

    /// Set the first reconnect delay (default: 1 s).
    pub fn min_backoff(mut self, delay: Duration) -> Self {
        self.config.min_backoff = delay;
        self
    }

    /// Set the reconnect delay ceiling (default: 60 s).
    pub fn max_backoff(mut self, delay: Duration) -> Self {
        self.config.max_backoff = delay;
        self
    }

    /// Set the TCP connect timeout (default: 5 s).
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the banner and login timeout (default: 5 s).
    pub fn login_timeout(mut self, timeout: Duration) -> Self {
        self.config.login_timeout = timeout;
        self
    }

    /// Set the per-request response timeout (default: 5 s).
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set the keepalive interval; `None` disables keepalive (default: 30 s).
    pub fn keepalive_interval(mut self, interval: Option<Duration>) -> Self {
        self.config.keepalive_interval = interval;
        self
    }

    /// Set the message feed capacity (default: 256).
    pub fn feed_capacity(mut self, capacity: usize) -> Self {
        self.config.feed_capacity = capacity;
        self
    }

    /// Set the prefix of generated action ids (default: `nodelink`).
    pub fn action_id_prefix(mut self, prefix: &str) -> Self {
        self.config.action_id_prefix = prefix.to_string();
        self
    }

    /// Validate and return the configuration.
    pub fn build(self) -> Result<ConnectorConfig> {
        self.config.validate()?;
        Ok(self.config)
    }

    /// Validate the configuration and start a connector.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self) -> Result<Connector> {
        Connector::start(self.build()?)
    }
}
