//! Server configuration shared by both connection engines.

use crate::storage::DEFAULT_CRON_INTERVAL;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Bytes read from a connection in one go. A command must fit in one read.
pub const READ_BUFFER_SIZE: usize = 512;

/// Ceiling on connections tracked at once.
pub const MAX_CONNECTIONS: usize = 20_000;

/// Which connection engine serves clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// One task per connection over a shared, locked store
    #[default]
    Threaded,
    /// A single task multiplexing every connection by readiness
    Reactor,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Threaded => write!(f, "threaded"),
            Mode::Reactor => write!(f, "reactor"),
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "threaded" | "sync" => Ok(Mode::Threaded),
            "reactor" | "async" => Ok(Mode::Reactor),
            _ => Err(format!("invalid mode '{s}', expected 'threaded' or 'reactor'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    pub mode: Mode,
    /// Time between active expiry cycles
    pub cron_interval: Duration,
    pub max_connections: usize,
    /// Size of the single read a command must fit in
    pub read_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: crate::DEFAULT_HOST.to_string(),
            port: crate::DEFAULT_PORT,
            mode: Mode::default(),
            cron_interval: DEFAULT_CRON_INTERVAL,
            max_connections: MAX_CONNECTIONS,
            read_buffer_size: READ_BUFFER_SIZE,
        }
    }
}

impl ServerConfig {
    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_address(), "0.0.0.0:7379");
        assert_eq!(config.mode, Mode::Threaded);
        assert_eq!(config.cron_interval, Duration::from_secs(1));
        assert_eq!(config.read_buffer_size, 512);
        assert_eq!(config.max_connections, 20_000);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("Reactor".parse::<Mode>(), Ok(Mode::Reactor));
        assert_eq!("sync".parse::<Mode>(), Ok(Mode::Threaded));
        assert!("epoll".parse::<Mode>().is_err());
        assert_eq!(Mode::Reactor.to_string(), "reactor");
    }
}
