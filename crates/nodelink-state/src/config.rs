//! State manager configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use nodelink_core::error::{Error, Result};

/// Default interval between polled snapshots.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default width of the transmit edge batch window.
pub const DEFAULT_BATCH_WINDOW: Duration = Duration::from_millis(100);

/// Default bound on a single notifier or persister call.
pub const DEFAULT_COLLABORATOR_TIMEOUT: Duration = Duration::from_millis(250);

/// Default interval between retries of failed persistence records.
pub const DEFAULT_PERSIST_RETRY_INTERVAL: Duration = Duration::from_secs(30);

/// Default capacity of the state manager's input channel.
pub const DEFAULT_INPUT_CAPACITY: usize = 256;

/// Which producers feed the state manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UpdateMode {
    /// Only live `VarSet` events from the connector's feed.
    EventsOnly,
    /// Only periodic XStat/SawStat snapshots.
    PollOnly,
    /// Both producers at once.
    #[default]
    Hybrid,
}

impl UpdateMode {
    /// Whether live events are consumed.
    pub fn uses_events(self) -> bool {
        matches!(self, UpdateMode::EventsOnly | UpdateMode::Hybrid)
    }

    /// Whether the snapshot poller runs.
    pub fn uses_polling(self) -> bool {
        matches!(self, UpdateMode::PollOnly | UpdateMode::Hybrid)
    }
}

impl fmt::Display for UpdateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateMode::EventsOnly => write!(f, "events"),
            UpdateMode::PollOnly => write!(f, "poll"),
            UpdateMode::Hybrid => write!(f, "hybrid"),
        }
    }
}

impl FromStr for UpdateMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "events" | "events-only" => Ok(UpdateMode::EventsOnly),
            "poll" | "poll-only" => Ok(UpdateMode::PollOnly),
            "hybrid" => Ok(UpdateMode::Hybrid),
            _ => Err(Error::InvalidParameter(format!("unknown update mode: {s}"))),
        }
    }
}

/// Settings for a [`StateManager`](crate::StateManager).
#[derive(Debug, Clone)]
pub struct StateConfig {
    /// The local node whose links are tracked.
    pub local_node: u32,
    /// Which producers run.
    pub update_mode: UpdateMode,
    /// Interval between polled snapshots.
    pub poll_interval: Duration,
    /// Width of the transmit edge batch window.
    pub batch_window: Duration,
    /// Bound on each notifier and persister call.
    pub collaborator_timeout: Duration,
    /// Interval between retries of failed persistence records.
    pub persist_retry_interval: Duration,
    /// Capacity of the input channel shared by all producers.
    pub input_capacity: usize,
}

impl StateConfig {
    /// Defaults for `local_node`.
    pub fn new(local_node: u32) -> Self {
        Self {
            local_node,
            update_mode: UpdateMode::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            batch_window: DEFAULT_BATCH_WINDOW,
            collaborator_timeout: DEFAULT_COLLABORATOR_TIMEOUT,
            persist_retry_interval: DEFAULT_PERSIST_RETRY_INTERVAL,
            input_capacity: DEFAULT_INPUT_CAPACITY,
        }
    }

    /// Set the update mode.
    pub fn update_mode(mut self, mode: UpdateMode) -> Self {
        self.update_mode = mode;
        self
    }

    /// Set the poll interval.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the batch window.
    pub fn batch_window(mut self, window: Duration) -> Self {
        self.batch_window = window;
        self
    }

    /// Set the per-call collaborator timeout.
    pub fn collaborator_timeout(mut self, timeout: Duration) -> Self {
        self.collaborator_timeout = timeout;
        self
    }

    /// Set the persistence retry interval.
    pub fn persist_retry_interval(mut self, interval: Duration) -> Self {
        self.persist_retry_interval = interval;
        self
    }

    /// Set the input channel capacity.
    pub fn input_capacity(mut self, capacity: usize) -> Self {
        self.input_capacity = capacity;
        self
    }

    /// Check for values the state manager cannot run with.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("poll_interval", self.poll_interval),
            ("batch_window", self.batch_window),
            ("collaborator_timeout", self.collaborator_timeout),
            ("persist_retry_interval", self.persist_retry_interval),
        ];
        for (name, value) in positive {
            if value.is_zero() {
                return Err(Error::InvalidParameter(format!(
                    "{name} must be greater than zero"
                )));
            }
        }
        if self.input_capacity == 0 {
            return Err(Error::InvalidParameter(
                "input_capacity must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = StateConfig::new(1999);
        assert_eq!(config.local_node, 1999);
        assert_eq!(config.update_mode, UpdateMode::Hybrid);
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.batch_window, Duration::from_millis(100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn update_mode_producers() {
        assert!(UpdateMode::EventsOnly.uses_events());
        assert!(!UpdateMode::EventsOnly.uses_polling());
        assert!(!UpdateMode::PollOnly.uses_events());
        assert!(UpdateMode::Hybrid.uses_events() && UpdateMode::Hybrid.uses_polling());
    }

    #[test]
    fn update_mode_parse() {
        assert_eq!("poll".parse::<UpdateMode>().unwrap(), UpdateMode::PollOnly);
        assert_eq!("Events".parse::<UpdateMode>().unwrap(), UpdateMode::EventsOnly);
        assert_eq!(UpdateMode::Hybrid.to_string(), "hybrid");
        assert!("sometimes".parse::<UpdateMode>().is_err());
    }

    #[test]
    fn rejects_zero_window() {
        let err = StateConfig::new(1999)
            .batch_window(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));
        assert!(StateConfig::new(1999).input_capacity(0).validate().is_err());
    }
}
