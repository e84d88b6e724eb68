//! Receiver configuration.
//!
//! [`ReceiverConfig`] is assembled once at startup (normally from the command
//! line) and is immutable afterwards. [`ReceiverConfig::validate`] rejects
//! settings the receiver cannot run with before any connection is attempted.

use std::time::Duration;

use thiserror::Error;

/// Port used when the address omits one.
pub const DEFAULT_PORT: u16 = 5672;

/// Errors produced by [`ReceiverConfig::validate`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The credit window must allow at least one outstanding delivery.
    #[error("credit window must be at least 1")]
    ZeroCreditWindow,
    /// The source node address is empty.
    #[error("source address must not be empty")]
    EmptySource,
    /// The container identity is empty.
    #[error("container id must not be empty")]
    EmptyContainerId,
    /// The per-delivery read buffer has no capacity.
    #[error("max read bytes must be at least 1")]
    ZeroReadBuffer,
    /// The idle timeout is zero.
    #[error("idle timeout must be non-zero")]
    ZeroIdleTimeout,
    /// The host address cannot be parsed.
    #[error("invalid address {address:?}: {reason}")]
    InvalidAddress {
        /// Address as supplied.
        address: String,
        /// What is wrong with it.
        reason: &'static str,
    },
}

/// Number of deliveries still to receive before the receiver shuts down.
///
/// # Examples
///
/// ```
/// use amqp_receiver::config::RemainingCount;
///
/// let mut remaining = RemainingCount::from_target(2);
/// remaining.record_delivery();
/// assert!(!remaining.is_exhausted());
/// remaining.record_delivery();
/// assert!(remaining.is_exhausted());
///
/// assert_eq!(RemainingCount::from_target(0), RemainingCount::Unbounded);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemainingCount {
    /// Stop after this many more deliveries.
    Bounded(u64),
    /// Receive until cancelled.
    Unbounded,
}

impl RemainingCount {
    /// Convert a target count where zero means unbounded.
    #[must_use]
    pub fn from_target(count: u64) -> Self {
        if count == 0 {
            Self::Unbounded
        } else {
            Self::Bounded(count)
        }
    }

    /// Account for one fully processed delivery.
    pub fn record_delivery(&mut self) {
        if let Self::Bounded(remaining) = self {
            *remaining = remaining.saturating_sub(1);
        }
    }

    /// Returns `true` once a bounded count has reached zero.
    #[must_use]
    pub fn is_exhausted(self) -> bool { matches!(self, Self::Bounded(0)) }
}

/// Immutable settings for a receiver run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceiverConfig {
    address: String,
    count: u64,
    source: String,
    container_id: String,
    link_name: String,
    credit_window: u32,
    quiet: bool,
    idle_timeout: Duration,
    connect_timeout: Duration,
    max_read_bytes: usize,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            address: "localhost".to_owned(),
            count: 1,
            source: "examples".to_owned(),
            container_id: "ReceiveExample".to_owned(),
            link_name: "MyReceiver".to_owned(),
            credit_window: 100,
            quiet: false,
            idle_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            max_read_bytes: 512,
        }
    }
}

impl ReceiverConfig {
    /// Set the `host[:port]` address to connect to.
    #[must_use]
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// Set the number of messages to receive; zero receives forever.
    #[must_use]
    pub fn with_count(mut self, count: u64) -> Self {
        self.count = count;
        self
    }

    /// Set the source node address the link attaches to.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Set the container identity announced in `open`.
    #[must_use]
    pub fn with_container_id(mut self, container_id: impl Into<String>) -> Self {
        self.container_id = container_id.into();
        self
    }

    /// Set the receiving link name.
    #[must_use]
    pub fn with_link_name(mut self, link_name: impl Into<String>) -> Self {
        self.link_name = link_name.into();
        self
    }

    /// Set the maximum outstanding credit.
    #[must_use]
    pub fn with_credit_window(mut self, credit_window: u32) -> Self {
        self.credit_window = credit_window;
        self
    }

    /// Suppress per-message output and skip payload decoding.
    #[must_use]
    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Set how long the event loop waits for activity between liveness ticks.
    #[must_use]
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Set the TCP connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Set the number of payload bytes read per delivery for decoding.
    #[must_use]
    pub fn with_max_read_bytes(mut self, max_read_bytes: usize) -> Self {
        self.max_read_bytes = max_read_bytes;
        self
    }

    /// Address as configured.
    #[must_use]
    pub fn address(&self) -> &str { &self.address }

    /// Target message count (zero means unbounded).
    #[must_use]
    pub fn count(&self) -> u64 { self.count }

    /// Source node address.
    #[must_use]
    pub fn source(&self) -> &str { &self.source }

    /// Container identity.
    #[must_use]
    pub fn container_id(&self) -> &str { &self.container_id }

    /// Receiving link name.
    #[must_use]
    pub fn link_name(&self) -> &str { &self.link_name }

    /// Maximum outstanding credit.
    #[must_use]
    pub fn credit_window(&self) -> u32 { self.credit_window }

    /// Whether per-message output is suppressed.
    #[must_use]
    pub fn quiet(&self) -> bool { self.quiet }

    /// Event loop idle interval.
    #[must_use]
    pub fn idle_timeout(&self) -> Duration { self.idle_timeout }

    /// TCP connect timeout.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration { self.connect_timeout }

    /// Payload bytes read per delivery.
    #[must_use]
    pub fn max_read_bytes(&self) -> usize { self.max_read_bytes }

    /// Remaining-count tracker derived from [`count`](Self::count).
    #[must_use]
    pub fn remaining(&self) -> RemainingCount { RemainingCount::from_target(self.count) }

    /// Check every setting, including that the address parses.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.credit_window == 0 {
            return Err(ConfigError::ZeroCreditWindow);
        }
        if self.source.is_empty() {
            return Err(ConfigError::EmptySource);
        }
        if self.container_id.is_empty() {
            return Err(ConfigError::EmptyContainerId);
        }
        if self.max_read_bytes == 0 {
            return Err(ConfigError::ZeroReadBuffer);
        }
        if self.idle_timeout.is_zero() {
            return Err(ConfigError::ZeroIdleTimeout);
        }
        self.host_port().map(|_| ())
    }

    /// Split the address into host and port, defaulting to [`DEFAULT_PORT`].
    ///
    /// Bracketed IPv6 literals (`[::1]:5672`) and bare IPv6 literals are
    /// accepted.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddress`] for an empty host or a port
    /// that is not a number.
    ///
    /// # Examples
    ///
    /// ```
    /// use amqp_receiver::config::ReceiverConfig;
    ///
    /// let config = ReceiverConfig::default().with_address("broker:5673");
    /// assert_eq!(config.host_port().expect("valid"), ("broker".to_owned(), 5673));
    /// ```
    pub fn host_port(&self) -> Result<(String, u16), ConfigError> {
        let address = self.address.trim();
        let invalid = |reason| ConfigError::InvalidAddress {
            address: self.address.clone(),
            reason,
        };
        if address.is_empty() {
            return Err(invalid("empty address"));
        }
        if let Some(rest) = address.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or_else(|| invalid("unclosed bracket"))?;
            let port = match tail {
                "" => DEFAULT_PORT,
                tail => tail
                    .strip_prefix(':')
                    .and_then(|port| port.parse().ok())
                    .ok_or_else(|| invalid("invalid port"))?,
            };
            return Ok((host.to_owned(), port));
        }
        match address.rsplit_once(':') {
            Some((host, _)) if host.contains(':') => Ok((address.to_owned(), DEFAULT_PORT)),
            Some(("", _)) => Err(invalid("empty host")),
            Some((host, port)) => {
                let port = port.parse().map_err(|_| invalid("invalid port"))?;
                Ok((host.to_owned(), port))
            }
            None => Ok((address.to_owned(), DEFAULT_PORT)),
        }
    }
}
