//! Terminal configuration.
//!
//! Stored as JSON at `<config dir>/blueserial/config.json`. Missing fields
//! take their defaults; a file that does not parse is ignored with a
//! warning.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use blueserial_tcp::{BridgePeer, DEFAULT_CONNECT_TIMEOUT};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TermConfig {
    /// Local name shown on echoed writes.
    pub name: String,

    /// Bridges the terminal can connect to.
    pub peers: Vec<BridgePeer>,

    /// Peer id to connect to when `--peer` is not given.
    pub default_peer: Option<String>,

    pub auto_reconnect: bool,

    /// Bytes per blocking read.
    pub read_buffer_size: usize,

    pub connect_timeout_secs: u64,
}

fn default_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "blueserial".into())
}

impl Default for TermConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            peers: Vec::new(),
            default_peer: None,
            auto_reconnect: false,
            read_buffer_size: 1024,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT.as_secs(),
        }
    }
}

impl TermConfig {
    /// Loads the config at `path`, falling back to defaults.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let Ok(mut config) = serde_json::from_str::<TermConfig>(&content) else {
            tracing::warn!(
                path = %path.display(),
                "failed to parse config, using defaults"
            );
            return Ok(Self::default());
        };

        config.peers.retain(|peer| match peer.validate() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(peer = %peer.id, error = %e, "skipping peer");
                false
            }
        });
        if config.read_buffer_size == 0 {
            config.read_buffer_size = Self::default().read_buffer_size;
        }
        Ok(config)
    }

    /// Writes the config as pretty JSON, readable only by the owner.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        set_permissions_0600(path);

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }
}

fn set_permissions_0600(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
}

/// Default config location.
pub fn default_path() -> anyhow::Result<PathBuf> {
    Ok(config_base_dir()?.join("blueserial").join("config.json"))
}

fn config_base_dir() -> anyhow::Result<PathBuf> {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME")
        && !xdg.is_empty()
    {
        return Ok(PathBuf::from(xdg));
    }

    #[cfg(target_os = "windows")]
    {
        let appdata = std::env::var("APPDATA")?;
        Ok(PathBuf::from(appdata))
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home).join(".config"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = TermConfig::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, TermConfig::default());
        assert_eq!(config.read_buffer_size, 1024);
        assert!(!config.name.is_empty());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = TermConfig {
            name: "desk".into(),
            peers: vec![BridgePeer::new("AA:BB:CC:DD:EE:FF", "RobotX", "127.0.0.1:7000")],
            default_peer: Some("AA:BB:CC:DD:EE:FF".into()),
            auto_reconnect: true,
            read_buffer_size: 512,
            connect_timeout_secs: 3,
        };
        config.save_to(&path).unwrap();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        assert_eq!(TermConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"name":"bench","peers":[
                {"id":"AA","name":"Good","addr":"127.0.0.1:7000"},
                {"id":"BB","name":"Bad","addr":"no port"}
            ],"read_buffer_size":0}"#,
        )
        .unwrap();

        let config = TermConfig::load_from(&path).unwrap();
        assert_eq!(config.name, "bench");
        assert_eq!(config.peers.len(), 1);
        assert_eq!(config.peers[0].id, "AA");
        assert_eq!(config.read_buffer_size, 1024);
        assert!(!config.auto_reconnect);
        assert_eq!(config.connect_timeout_secs, 10);
    }

    #[test]
    fn corrupt_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(TermConfig::load_from(&path).unwrap(), TermConfig::default());
    }
}
