//! Session configuration: who we are and where we connect.

use std::fmt;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Server host used when none is given.
pub const DEFAULT_HOST: &str = "192.168.0.4";

/// Server port used when none is given.
pub const DEFAULT_PORT: u16 = 5999;

/// Upper bound on how long the initial TCP connect may take.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Endpoint
// ---------------------------------------------------------------------------

/// Remote address of the chat server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// ---------------------------------------------------------------------------
// Connection options
// ---------------------------------------------------------------------------

/// Timeouts applied by [`Connection`](crate::connection::Connection).
///
/// `None` disables the corresponding timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectOptions {
    pub connect_timeout: Option<Duration>,
    /// Maximum silence tolerated between two inbound frames.
    pub read_timeout: Option<Duration>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            read_timeout: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Session configuration
// ---------------------------------------------------------------------------

/// Everything a session needs up front. Passed at construction time; the
/// controller never looks any of it up from ambient state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub nickname: String,
    pub endpoint: Endpoint,
    pub options: ConnectOptions,
}

impl SessionConfig {
    /// Config for `nickname` against the default endpoint.
    pub fn new(nickname: impl Into<String>) -> Self {
        Self {
            nickname: nickname.into(),
            endpoint: Endpoint::default(),
            options: ConnectOptions::default(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn with_options(mut self, options: ConnectOptions) -> Self {
        self.options = options;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_reference_deployment() {
        let config = SessionConfig::new("alice");
        assert_eq!(config.endpoint.to_string(), "192.168.0.4:5999");
        assert_eq!(config.options.connect_timeout, Some(Duration::from_secs(10)));
        assert_eq!(config.options.read_timeout, None);
    }

    #[test]
    fn builder_overrides_endpoint() {
        let config = SessionConfig::new("bob").with_endpoint(Endpoint::new("127.0.0.1", 4000));
        assert_eq!(config.nickname, "bob");
        assert_eq!(config.endpoint, Endpoint::new("127.0.0.1", 4000));
    }
}
