//! Client configuration.
//!
//! Resolution order, later sources winning:
//!
//! 1. Built-in defaults (`localhost:9000`, 100ms retry interval, unbounded retries)
//! 2. `$PEACEFUL_PIE_CONFIG`, or `<config dir>/peaceful-pie/config.json`
//! 3. `PEACEFUL_PIE_HOST`, `PEACEFUL_PIE_PORT`, `PEACEFUL_PIE_SERVER`,
//!    `PEACEFUL_PIE_LOG_FILE` environment variables
//! 4. Explicit overrides by the caller (CLI flags)

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const APP_NAME: &str = "peaceful-pie";

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 9000;
pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 100;

/// Connection and retry settings for an [`RpcClient`](crate::rpc::RpcClient).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    /// Simulation executable to launch with `--port {port}`. Requires a loopback host.
    pub server_executable: Option<PathBuf>,
    /// Diagnostic log for unexpected failures.
    pub log_file: Option<PathBuf>,
    /// Fixed sleep between retries after connection failures and unexpected errors.
    pub retry_interval_ms: u64,
    /// Retry budget per call. `None` retries forever.
    pub max_retries: Option<u32>,
    /// Per-exchange timeout. `None` waits forever.
    pub request_timeout_secs: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            server_executable: None,
            log_file: None,
            retry_interval_ms: DEFAULT_RETRY_INTERVAL_MS,
            max_retries: None,
            request_timeout_secs: None,
        }
    }
}

impl ClientConfig {
    /// Config for `localhost:{port}` with everything else defaulted.
    pub fn local(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_server_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.server_executable = Some(path.into());
        self
    }

    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// Load from the config file (if any) and apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be read or parsed,
    /// or an environment override is malformed.
    pub fn load() -> Result<Self> {
        let mut config = match config_file() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Parse a JSON config file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Apply `PEACEFUL_PIE_*` environment overrides.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(host) = lookup("PEACEFUL_PIE_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("PEACEFUL_PIE_PORT") {
            self.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid PEACEFUL_PIE_PORT value: {}", port))?;
        }
        if let Some(server) = lookup("PEACEFUL_PIE_SERVER") {
            self.server_executable = Some(PathBuf::from(server));
        }
        if let Some(log_file) = lookup("PEACEFUL_PIE_LOG_FILE") {
            self.log_file = Some(PathBuf::from(log_file));
        }
        Ok(())
    }
}

/// Config file location: `$PEACEFUL_PIE_CONFIG`, else the platform config dir.
pub fn config_file() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("PEACEFUL_PIE_CONFIG") {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|dir| dir.join(APP_NAME).join("config.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 9000);
        assert_eq!(config.retry_interval(), Duration::from_millis(100));
        assert_eq!(config.max_retries, None);
        assert_eq!(config.request_timeout(), None);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"port": 9101, "log_file": "/tmp/rl.log", "max_retries": 5}"#).unwrap();
        assert_eq!(
            config,
            ClientConfig {
                port: 9101,
                log_file: Some(PathBuf::from("/tmp/rl.log")),
                max_retries: Some(5),
                ..ClientConfig::default()
            }
        );
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("PEACEFUL_PIE_HOST", "127.0.0.1"),
            ("PEACEFUL_PIE_PORT", " 9200 "),
            ("PEACEFUL_PIE_SERVER", "/opt/sim/sim.x86_64"),
        ]
        .into_iter()
        .collect();

        let mut config = ClientConfig::default();
        config
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9200);
        assert_eq!(
            config.server_executable,
            Some(PathBuf::from("/opt/sim/sim.x86_64"))
        );
        assert_eq!(config.log_file, None);
    }

    #[test]
    fn test_retry_interval_saturates() {
        let config = ClientConfig::default().with_retry_interval(Duration::from_millis(250));
        assert_eq!(config.retry_interval_ms, 250);

        let config = ClientConfig::default().with_retry_interval(Duration::MAX);
        assert_eq!(config.retry_interval_ms, u64::MAX);
    }

    #[test]
    fn test_bad_port_override() {
        let mut config = ClientConfig::default();
        let err = config
            .apply_overrides(|k| (k == "PEACEFUL_PIE_PORT").then(|| "ninety".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("PEACEFUL_PIE_PORT"));
    }

    #[test]
    fn test_from_file_reports_path() {
        let path = std::env::temp_dir().join(format!("peaceful-pie-bad-config-{}.json", std::process::id()));
        std::fs::write(&path, "{ not json").unwrap();
        let err = ClientConfig::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
        let _ = std::fs::remove_file(&path);
    }
}
