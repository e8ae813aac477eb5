//! Configuration for voyager-link
//!
//! CLI arguments and environment variable handling using clap. All values are
//! folded into an immutable `SessionConfig` at startup.

use clap::Parser;
use std::time::Duration;

use crate::error::LinkError;
use crate::session::SessionConfig;

/// Persistent client for the Voyager Application Server
#[derive(Parser, Debug, Clone)]
#[command(name = "voyager-link")]
#[command(about = "Persistent, self-healing client for the Voyager Application Server")]
pub struct Args {
    /// Application Server WebSocket URI
    #[arg(long, env = "VOYAGER_URI", default_value = "ws://localhost:5950")]
    pub uri: String,

    /// Maximum reconnect retries before giving up
    #[arg(long, env = "VOYAGER_MAX_RECONNECT", default_value = "5")]
    pub max_reconnect_attempts: u32,

    /// Reconnect automatically after a failure; when disabled the first
    /// failure ends the session
    #[arg(long, env = "VOYAGER_AUTO_RECONNECT", default_value = "true")]
    pub auto_reconnect: bool,

    /// Liveness probe period in seconds
    #[arg(long, env = "VOYAGER_HEARTBEAT_SECS", default_value = "10")]
    pub heartbeat_secs: u64,

    /// Status publish period in seconds
    #[arg(long, env = "VOYAGER_PUBLISH_SECS", default_value = "5")]
    pub publish_secs: u64,

    /// Backoff exponent base in seconds
    #[arg(long, env = "VOYAGER_BACKOFF_BASE_SECS", default_value = "2")]
    pub backoff_base_secs: u64,

    /// Backoff ceiling in seconds
    #[arg(long, env = "VOYAGER_BACKOFF_CAP_SECS", default_value = "30")]
    pub backoff_cap_secs: u64,

    /// Host identifier carried in status messages
    #[arg(long, env = "VOYAGER_HOST", default_value = "Pier1")]
    pub host: String,

    /// Instance number carried in status messages
    #[arg(long, env = "VOYAGER_INSTANCE", default_value = "1")]
    pub instance: u32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Validate configuration before starting the session.
    pub fn validate(&self) -> Result<(), LinkError> {
        if !self.uri.starts_with("ws://") && !self.uri.starts_with("wss://") {
            return Err(LinkError::Config(format!(
                "uri must use a ws:// or wss:// scheme, got '{}'",
                self.uri
            )));
        }
        if self.heartbeat_secs == 0 || self.publish_secs == 0 {
            return Err(LinkError::Config(
                "heartbeat and publish periods must be non-zero".to_string(),
            ));
        }
        if self.backoff_cap_secs == 0 {
            return Err(LinkError::Config(
                "backoff cap must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Fold arguments into the immutable session configuration.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            uri: self.uri.clone(),
            max_reconnect_attempts: self.max_reconnect_attempts,
            auto_reconnect: self.auto_reconnect,
            heartbeat_period: Duration::from_secs(self.heartbeat_secs),
            publish_period: Duration::from_secs(self.publish_secs),
            backoff_base_secs: self.backoff_base_secs,
            backoff_cap_secs: self.backoff_cap_secs,
            host: self.host.clone(),
            instance: self.instance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("voyager-link").chain(argv.iter().copied()))
            .expect("args parse")
    }

    #[test]
    fn defaults_match_server_expectations() {
        let args = parse(&[]);
        assert_eq!(args.uri, "ws://localhost:5950");
        assert_eq!(args.max_reconnect_attempts, 5);
        assert!(args.auto_reconnect);
        assert_eq!(args.heartbeat_secs, 10);
        assert_eq!(args.publish_secs, 5);
        assert_eq!(args.backoff_base_secs, 2);
        assert_eq!(args.backoff_cap_secs, 30);
        assert_eq!(args.host, "Pier1");
        assert_eq!(args.instance, 1);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn rejects_non_websocket_uri() {
        let args = parse(&["--uri", "http://localhost:5950"]);
        assert!(matches!(args.validate(), Err(LinkError::Config(_))));
    }

    #[test]
    fn rejects_zero_periods() {
        let args = parse(&["--publish-secs", "0"]);
        assert!(args.validate().is_err());

        let args = parse(&["--heartbeat-secs", "0"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn session_config_converts_periods() {
        let args = parse(&["--heartbeat-secs", "3", "--publish-secs", "7"]);
        let config = args.session_config();
        assert_eq!(config.heartbeat_period, Duration::from_secs(3));
        assert_eq!(config.publish_period, Duration::from_secs(7));
    }
}
