use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_PING_COUNT: u16 = 3;
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_PORT_TIMEOUT: Duration = Duration::from_secs(3);

/// Per-probe settings. An empty `proxy_address` means no proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOptions {
    pub ping_count: u16,
    pub ping_timeout: Duration,
    pub port_timeout: Duration,
    pub proxy_address: String,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            ping_count: DEFAULT_PING_COUNT,
            ping_timeout: DEFAULT_PING_TIMEOUT,
            port_timeout: DEFAULT_PORT_TIMEOUT,
            proxy_address: String::new(),
        }
    }
}

impl CheckOptions {
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy_address = proxy.into();
        self
    }

    pub fn uses_proxy(&self) -> bool {
        !self.proxy_address.trim().is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub listen_host: Option<String>,
    pub listen_port: Option<u16>,
    pub log_level: Option<String>,
    pub ping_count: Option<u16>,
    /// Seconds.
    pub ping_timeout: Option<u64>,
    /// Seconds.
    pub port_timeout: Option<u64>,
    pub default_proxy: Option<String>,
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn listen_addr(&self) -> String {
        format!(
            "{}:{}",
            self.listen_host.as_deref().unwrap_or("127.0.0.1"),
            self.listen_port.unwrap_or(8080)
        )
    }

    pub fn log_filter(&self) -> log::LevelFilter {
        match self.log_level.as_deref().unwrap_or("INFO").to_ascii_uppercase().as_str() {
            "DEBUG" => log::LevelFilter::Debug,
            "INFO" => log::LevelFilter::Info,
            "WARN" => log::LevelFilter::Warn,
            "ERROR" => log::LevelFilter::Error,
            _ => log::LevelFilter::Info,
        }
    }

    /// Base options for every request; the proxy is chosen per request.
    pub fn check_options(&self) -> CheckOptions {
        CheckOptions {
            ping_count: self.ping_count.unwrap_or(DEFAULT_PING_COUNT),
            ping_timeout: self.ping_timeout.map(Duration::from_secs).unwrap_or(DEFAULT_PING_TIMEOUT),
            port_timeout: self.port_timeout.map(Duration::from_secs).unwrap_or(DEFAULT_PORT_TIMEOUT),
            proxy_address: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let opts = CheckOptions::default();
        assert_eq!(opts.ping_count, 3);
        assert_eq!(opts.ping_timeout, Duration::from_secs(3));
        assert_eq!(opts.port_timeout, Duration::from_secs(3));
        assert!(!opts.uses_proxy());
        assert_eq!(Config::default().check_options(), opts);
        assert_eq!(Config::default().listen_addr(), "127.0.0.1:8080");
    }

    #[test]
    fn loads_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"listen_port": 9000, "port_timeout": 5, "log_level": "debug"}}"#).unwrap();

        let config = Config::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.listen_addr(), "127.0.0.1:9000");
        assert_eq!(config.log_filter(), log::LevelFilter::Debug);

        let opts = config.check_options();
        assert_eq!(opts.port_timeout, Duration::from_secs(5));
        assert_eq!(opts.ping_count, DEFAULT_PING_COUNT);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(Config::load("/nonexistent/netcheck.json").is_err());
    }
}
