use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Context, Result};

use crate::protocol::DEFAULT_MAX_BLOB;

pub const DEFAULT_PORT: u16 = 23456;
pub const DEFAULT_CONFIG_FILE: &str = "filestored.toml";

/// When the identifier map is written to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PersistPolicy {
    /// Once per connection, when it closes. Changes since the last close
    /// are lost if the process dies.
    #[default]
    OnClose,
    /// After every PUT or DELETE that changed the map, plus on close.
    WriteThrough,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_address: String,
    pub data_directory: PathBuf,
    pub id_map_path: PathBuf,
    pub auto_create_directories: bool,
    pub max_file_size: usize,
    /// Seconds to wait for the next request line before dropping the peer.
    pub idle_timeout_secs: Option<u64>,
    pub persist_policy: PersistPolicy,
    /// Shut the whole server down on `exit` instead of only closing the connection.
    pub stop_on_exit: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: format!("127.0.0.1:{}", DEFAULT_PORT),
            data_directory: PathBuf::from("./server/data"),
            id_map_path: PathBuf::from("./server/config/map.bin"),
            auto_create_directories: true,
            max_file_size: DEFAULT_MAX_BLOB,
            idle_timeout_secs: None,
            persist_policy: PersistPolicy::OnClose,
            stop_on_exit: false,
        }
    }
}

impl ServerConfig {
    pub fn load_or_create(config_path: Option<&str>) -> Result<Self> {
        let config_file = config_path.unwrap_or(DEFAULT_CONFIG_FILE);

        if Path::new(config_file).exists() {
            let content = std::fs::read_to_string(config_file)
                .with_context(|| format!("reading config {}", config_file))?;
            let config: ServerConfig = toml::from_str(&content)
                .with_context(|| format!("parsing config {}", config_file))?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save(config_file)?;
            tracing::info!("Wrote default config to {}", config_file);
            Ok(config)
        }
    }

    pub fn save(&self, config_path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)
            .with_context(|| format!("writing config {}", config_path))?;
        Ok(())
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(Duration::from_secs)
    }

    pub fn ensure_directories(&self) -> Result<()> {
        if !self.auto_create_directories {
            return Ok(());
        }

        if !self.data_directory.exists() {
            std::fs::create_dir_all(&self.data_directory)?;
            tracing::info!("Created data directory: {:?}", self.data_directory);
        }

        if let Some(parent) = self.id_map_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
                tracing::info!("Created config directory: {:?}", parent);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_use_server_directory_layout() {
        let config = ServerConfig::default();
        assert_eq!(config.listen_address, "127.0.0.1:23456");
        assert_eq!(config.persist_policy, PersistPolicy::OnClose);
        assert!(!config.stop_on_exit);
        assert!(config.idle_timeout().is_none());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: ServerConfig = toml::from_str(
            r#"
            listen_address = "0.0.0.0:9000"
            persist_policy = "write_through"
            idle_timeout_secs = 30
            "#,
        )
        .unwrap();
        assert_eq!(config.listen_address, "0.0.0.0:9000");
        assert_eq!(config.persist_policy, PersistPolicy::WriteThrough);
        assert_eq!(config.idle_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.data_directory, PathBuf::from("./server/data"));
    }

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("filestored.toml");
        let path_str = path.to_str().unwrap();

        let config = ServerConfig::load_or_create(Some(path_str)).unwrap();
        assert!(path.exists());
        assert_eq!(config.max_file_size, DEFAULT_MAX_BLOB);

        let reloaded = ServerConfig::load_or_create(Some(path_str)).unwrap();
        assert_eq!(reloaded.listen_address, config.listen_address);
    }

    #[test]
    fn ensure_directories_creates_data_and_map_parent() {
        let dir = TempDir::new().unwrap();
        let config = ServerConfig {
            data_directory: dir.path().join("server/data"),
            id_map_path: dir.path().join("server/config/map.bin"),
            ..ServerConfig::default()
        };
        config.ensure_directories().unwrap();
        assert!(dir.path().join("server/data").is_dir());
        assert!(dir.path().join("server/config").is_dir());
    }
}
