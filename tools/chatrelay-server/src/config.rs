//! Server settings
//!
//! Resolved in three layers: built-in defaults, then an optional TOML file,
//! then command-line flags.
//!
//! ```toml
//! listen = "0.0.0.0:8080"
//! queue_capacity = 100
//! event_capacity = 100
//! max_payload_size = 65536
//! ```

use anyhow::{Context, Result};
use chatrelay_core::{
    DEFAULT_EVENT_CAPACITY, DEFAULT_LISTEN_ADDR, DEFAULT_QUEUE_CAPACITY, MAX_PAYLOAD_SIZE,
};
use chatrelay_router::RouterConfig;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub listen: String,
    pub queue_capacity: usize,
    pub event_capacity: usize,
    pub max_payload_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN_ADDR.to_string(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            max_payload_size: MAX_PAYLOAD_SIZE,
        }
    }
}

impl Settings {
    /// Load settings from a TOML file; keys left out keep their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Flags given on the command line win over the file
    pub fn with_listen(mut self, listen: Option<String>) -> Self {
        if let Some(listen) = listen {
            self.listen = listen;
        }
        self
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen
            .parse()
            .with_context(|| format!("invalid listen address {:?}", self.listen))
    }

    pub fn router_config(&self) -> Result<RouterConfig> {
        let config = RouterConfig {
            queue_capacity: self.queue_capacity,
            event_capacity: self.event_capacity,
            max_payload_size: self.max_payload_size,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.listen_addr().unwrap().port(), 8080);

        let config = settings.router_config().unwrap();
        assert_eq!(config.queue_capacity, 100);
        assert_eq!(config.max_payload_size, 65536);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let settings = Settings::from_toml("queue_capacity = 8\n").unwrap();
        assert_eq!(settings.queue_capacity, 8);
        assert_eq!(settings.event_capacity, DEFAULT_EVENT_CAPACITY);
        assert_eq!(settings.listen, DEFAULT_LISTEN_ADDR);
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(Settings::from_toml("queue_size = 8\n").is_err());
    }

    #[test]
    fn test_cli_listen_overrides_file() {
        let settings = Settings::from_toml("listen = \"127.0.0.1:9000\"\n")
            .unwrap()
            .with_listen(Some("127.0.0.1:9100".into()));
        assert_eq!(settings.listen_addr().unwrap().port(), 9100);

        let settings = Settings::from_toml("listen = \"127.0.0.1:9000\"\n")
            .unwrap()
            .with_listen(None);
        assert_eq!(settings.listen_addr().unwrap().port(), 9000);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(Settings::from_toml("max_payload_size = 70000\n")
            .unwrap()
            .router_config()
            .is_err());
        assert!(Settings::from_toml("queue_capacity = 0\n")
            .unwrap()
            .router_config()
            .is_err());
        assert!(Settings::from_toml("listen = \"not an address\"\n")
            .unwrap()
            .listen_addr()
            .is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chatrelay.toml");
        std::fs::write(&path, "event_capacity = 16\n").unwrap();

        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.event_capacity, 16);

        assert!(Settings::from_file(&dir.path().join("missing.toml")).is_err());
    }
}
