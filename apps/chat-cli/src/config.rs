//! CLI configuration.
//!
//! Read from `~/.config/parley/config.json`; command-line flags override
//! individual fields.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use parley_chat_client::ClientConfig;
use parley_protocol::ChatEndpoint;

/// Which client preset to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Operator console: long idle timeout, receives server notifications.
    #[default]
    Console,
    /// Visitor widget: short idle timeout.
    Widget,
}

/// On-disk layout of `config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    server_url: String,
    #[serde(default)]
    site_key: String,
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    room_key: String,
    #[serde(default)]
    profile: Profile,
    #[serde(default)]
    idle_timeout_secs: Option<u64>,
}

/// Effective CLI configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct CliConfig {
    pub server_url: String,
    pub site_key: String,
    pub access_token: Option<String>,
    pub room_key: Option<String>,
    pub profile: Profile,
    pub idle_timeout: Option<Duration>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8080".into(),
            site_key: String::new(),
            access_token: None,
            room_key: None,
            profile: Profile::Console,
            idle_timeout: None,
        }
    }
}

impl CliConfig {
    /// Loads the default config file, if present.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path()?)
    }

    /// Loads `path`. A missing file yields defaults; an unparsable one is
    /// reported and ignored.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let mut config = CliConfig::default();
        if !path.exists() {
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        if let Ok(file) = serde_json::from_str::<ConfigFile>(&content) {
            if !file.server_url.is_empty() {
                config.server_url = file.server_url;
            }
            config.site_key = file.site_key;
            config.access_token = non_empty(file.access_token);
            config.room_key = non_empty(file.room_key);
            config.profile = file.profile;
            config.idle_timeout = file.idle_timeout_secs.map(Duration::from_secs);
        } else {
            tracing::warn!(
                path = %path.display(),
                "failed to parse chat config, using defaults"
            );
        }
        Ok(config)
    }

    /// Client settings for this configuration.
    pub fn client_config(&self) -> ClientConfig {
        let mut endpoint = ChatEndpoint::new(self.server_url.clone(), self.site_key.clone());
        if let Some(room_key) = &self.room_key {
            endpoint = endpoint.with_room_key(room_key.clone());
        }
        let mut client = match self.profile {
            Profile::Console => ClientConfig::console(endpoint),
            Profile::Widget => ClientConfig::widget(endpoint),
        };
        if let Some(idle) = self.idle_timeout {
            client.idle_timeout = idle;
        }
        client
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

fn config_path() -> anyhow::Result<PathBuf> {
    Ok(config_base_dir()?.join("parley").join("config.json"))
}

fn config_base_dir() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
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

    fn write(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("config.json");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = CliConfig::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, CliConfig::default());
    }

    #[test]
    fn reads_all_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            r#"{
                "server_url": "https://chat.example.com",
                "site_key": "site-9",
                "access_token": "secret",
                "room_key": "rk",
                "profile": "widget",
                "idle_timeout_secs": 90
            }"#,
        );

        let config = CliConfig::load_from(&path).unwrap();
        assert_eq!(config.server_url, "https://chat.example.com");
        assert_eq!(config.site_key, "site-9");
        assert_eq!(config.access_token.as_deref(), Some("secret"));
        assert_eq!(config.room_key.as_deref(), Some("rk"));
        assert_eq!(config.profile, Profile::Widget);
        assert_eq!(config.idle_timeout, Some(Duration::from_secs(90)));
    }

    #[test]
    fn empty_strings_are_unset() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, r#"{"server_url": "", "access_token": ""}"#);

        let config = CliConfig::load_from(&path).unwrap();
        assert_eq!(config.server_url, "http://localhost:8080");
        assert_eq!(config.access_token, None);
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "{ not json");

        let config = CliConfig::load_from(&path).unwrap();
        assert_eq!(config, CliConfig::default());
    }

    #[test]
    fn huge_idle_timeout_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, r#"{"idle_timeout_secs": 18446744073709551615}"#);

        let config = CliConfig::load_from(&path).unwrap();
        let client = config.client_config();
        assert_eq!(client.idle_timeout, Duration::from_secs(u64::MAX));
    }

    #[test]
    fn client_config_applies_profile_and_overrides() {
        let config = CliConfig {
            profile: Profile::Widget,
            room_key: Some("rk".into()),
            ..CliConfig::default()
        };
        let client = config.client_config();
        assert_eq!(client.idle_timeout, Duration::from_secs(180));
        assert_eq!(client.endpoint.room_key.as_deref(), Some("rk"));

        let config = CliConfig {
            idle_timeout: Some(Duration::from_secs(5)),
            ..CliConfig::default()
        };
        assert_eq!(config.client_config().idle_timeout, Duration::from_secs(5));
    }
}
