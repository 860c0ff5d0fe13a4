use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BotError, Result};
use crate::types::Credentials;

/// Top-level bot configuration, usually read from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default = "default_bot_name")]
    pub name: String,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub platforms: Vec<PlatformConfig>,
}

fn default_bot_name() -> String {
    "botkit".to_string()
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: default_bot_name(),
            logging: LoggingConfig::default(),
            platforms: Vec::new(),
        }
    }
}

impl BotConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            BotError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: BotConfig =
            toml::from_str(raw).map_err(|e| BotError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for platform in &self.platforms {
            if platform.id.trim().is_empty() {
                return Err(BotError::Config("platform id must not be empty".to_string()));
            }
            if !seen.insert(platform.id.as_str()) {
                return Err(BotError::Config(format!(
                    "platform '{}' is configured more than once",
                    platform.id
                )));
            }
            if platform.username.trim().is_empty() {
                return Err(BotError::Config(format!(
                    "platform '{}' has an empty username",
                    platform.id
                )));
            }
            if platform.channels.iter().any(|c| c.name.trim().is_empty()) {
                return Err(BotError::Config(format!(
                    "platform '{}' lists a channel without a name",
                    platform.id
                )));
            }
        }
        Ok(())
    }

    pub fn platform(&self, id: &str) -> Option<&PlatformConfig> {
        self.platforms.iter().find(|p| p.id == id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    /// JSON-lines file for command interactions.
    #[serde(default)]
    pub interaction_log: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            interaction_log: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
    Compact,
}

/// Connection settings for one registered platform client factory.
#[derive(Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Factory id this configuration applies to.
    pub id: String,
    /// Plugin kind the host registers for this entry.
    #[serde(default = "default_kind")]
    pub kind: String,
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    /// Environment variable holding the password. Wins over `password`.
    #[serde(default)]
    pub password_env: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    /// Booted by `Bot::boot`.
    #[serde(default)]
    pub autoboot: bool,
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

fn default_kind() -> String {
    "loopback".to_string()
}

impl PlatformConfig {
    pub fn new(
        id: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: default_kind(),
            username: username.into(),
            password: Some(password.into()),
            password_env: None,
            host: None,
            port: None,
            autoboot: false,
            channels: Vec::new(),
        }
    }

    pub fn with_channel(mut self, channel: ChannelConfig) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn with_autoboot(mut self, autoboot: bool) -> Self {
        self.autoboot = autoboot;
        self
    }

    /// Resolve the credentials `connect` is called with.
    pub fn credentials(&self) -> Result<Credentials> {
        let password = match &self.password_env {
            Some(var) => std::env::var(var).ok(),
            None => None,
        }
        .or_else(|| self.password.clone())
        .ok_or_else(|| BotError::MissingCredentials(self.id.clone()))?;

        let mut credentials = Credentials::new(self.username.clone(), password);
        credentials.host = self.host.clone();
        credentials.port = self.port;
        Ok(credentials)
    }
}

impl std::fmt::Debug for PlatformConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformConfig")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("password_env", &self.password_env)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("autoboot", &self.autoboot)
            .field("channels", &self.channels)
            .finish()
    }
}

/// A channel to join after connecting, with the commands to install on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
    #[serde(default)]
    pub commands: Vec<String>,
}

impl ChannelConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            commands: Vec::new(),
        }
    }

    pub fn with_commands<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.commands.extend(commands.into_iter().map(Into::into));
        self
    }
}
