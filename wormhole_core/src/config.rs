use crate::transfer::constants::{CLEANUP_INTERVAL, SHUTDOWN_TIMEOUT, TRANSFER_TTL};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

const APP_QUALIFIER: &str = "com";
const APP_ORGANIZATION: &str = "wormhole";
const APP_NAME: &str = "wormhole_web";
const CONFIG_FILE: &str = "config.json";

/// Overrides the config directory (used by tests and containers)
pub const CONFIG_DIR_ENV: &str = "WORMHOLE_WEB_CONFIG_DIR";

/// Default HTTP port for the web interface
pub const HTTP_PORT: u16 = 8080;

/// Maximum accepted multipart body (500MB)
pub const MAX_UPLOAD_BYTES: u64 = 500 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// Root for per-transfer directories; removed entirely on shutdown
    pub storage_dir: PathBuf,
    /// Directory with the web client, served for unmatched routes
    pub static_dir: Option<PathBuf>,
    pub transfer_ttl_secs: u64,
    pub cleanup_interval_secs: u64,
    pub shutdown_timeout_secs: u64,
    pub max_upload_bytes: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: HTTP_PORT,
            storage_dir: std::env::temp_dir().join("wormhole-web"),
            static_dir: None,
            transfer_ttl_secs: TRANSFER_TTL.as_secs(),
            cleanup_interval_secs: CLEANUP_INTERVAL.as_secs(),
            shutdown_timeout_secs: SHUTDOWN_TIMEOUT.as_secs(),
            max_upload_bytes: MAX_UPLOAD_BYTES,
        }
    }
}

impl ServerConfig {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
            return Some(PathBuf::from(dir).join(CONFIG_FILE));
        }

        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    /// Load config from disk or return default
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring invalid config {}: {}", path.display(), e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save config to disk, returning where it was written
    pub fn save(&self) -> io::Result<PathBuf> {
        let path = Self::config_path()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no config directory"))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json)?;
        Ok(path)
    }

    pub fn transfer_ttl(&self) -> Duration {
        Duration::from_secs(self.transfer_ttl_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, HTTP_PORT);
        assert_eq!(HTTP_PORT, 8080);
        assert_eq!(config.transfer_ttl(), Duration::from_secs(3600));
        assert_eq!(config.cleanup_interval(), Duration::from_secs(300));
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(30));
        assert_eq!(config.max_upload_bytes, MAX_UPLOAD_BYTES);
        assert_eq!(MAX_UPLOAD_BYTES, 500 * 1024 * 1024);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: ServerConfig = serde_json::from_str(r#"{"port": 9000}"#).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.bind_address, "0.0.0.0");
        assert_eq!(config.transfer_ttl_secs, 3600);
    }

    #[test]
    fn test_zero_cleanup_interval_is_clamped() {
        let config = ServerConfig {
            cleanup_interval_secs: 0,
            ..ServerConfig::default()
        };
        assert_eq!(config.cleanup_interval(), Duration::from_secs(1));
    }
}
