use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::client::PlatformClient;
use crate::command::Command;
use crate::error::BotError;

/// Stable identifier a factory is registered under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactoryId(String);

impl FactoryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FactoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FactoryId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for FactoryId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for FactoryId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

type Constructor<T> = Arc<dyn Fn() -> Arc<T> + Send + Sync>;

/// Registration token for a platform client implementation.
///
/// The constructor takes no arguments; dependencies are fetched in `boot()`.
#[derive(Clone)]
pub struct ClientFactory {
    id: FactoryId,
    construct: Constructor<dyn PlatformClient>,
}

impl ClientFactory {
    pub fn new<C, F>(id: impl Into<FactoryId>, constructor: F) -> Self
    where
        C: PlatformClient + 'static,
        F: Fn() -> Arc<C> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            construct: Arc::new(move || -> Arc<dyn PlatformClient> { constructor() }),
        }
    }

    pub fn id(&self) -> &FactoryId {
        &self.id
    }

    pub fn create(&self) -> Arc<dyn PlatformClient> {
        (self.construct)()
    }
}

impl std::fmt::Debug for ClientFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientFactory").field("id", &self.id).finish()
    }
}

/// Registration token for a command implementation.
#[derive(Clone)]
pub struct CommandFactory {
    id: FactoryId,
    construct: Constructor<dyn Command>,
}

impl CommandFactory {
    pub fn new<C, F>(id: impl Into<FactoryId>, constructor: F) -> Self
    where
        C: Command + 'static,
        F: Fn() -> Arc<C> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            construct: Arc::new(move || -> Arc<dyn Command> { constructor() }),
        }
    }

    pub fn id(&self) -> &FactoryId {
        &self.id
    }

    pub fn create(&self) -> Arc<dyn Command> {
        (self.construct)()
    }
}

impl std::fmt::Debug for CommandFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandFactory").field("id", &self.id).finish()
    }
}

/// Login data handed to `PlatformClient::connect`.
///
/// `host` and `port` are optional; platforms fall back to their own defaults.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            host: None,
            port: None,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Host and port to dial, filling gaps from the platform defaults.
    pub fn endpoint(&self, default_host: &str, default_port: u16) -> (String, u16) {
        (
            self.host.clone().unwrap_or_else(|| default_host.to_string()),
            self.port.unwrap_or(default_port),
        )
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

/// Result of a successful `connect`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub platform: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub connected_at: DateTime<Utc>,
}

/// What the dispatch layer did with one inbound message.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// The content does not start with the platform trigger.
    NotACommand,
    /// Trigger present but no installed command has that name.
    Unknown { name: String },
    Processed { command: String },
    /// The command failed; routing for other commands is unaffected.
    Failed { command: String, error: BotError },
}

impl DispatchOutcome {
    pub fn command(&self) -> Option<&str> {
        match self {
            DispatchOutcome::Processed { command } | DispatchOutcome::Failed { command, .. } => {
                Some(command.as_str())
            }
            _ => None,
        }
    }
}

/// Result of `Channel::remove_command`.
///
/// The command is removed whether or not its teardown succeeded; a teardown
/// error is handed back as a warning.
#[derive(Debug)]
pub enum CommandRemoval {
    NotFound,
    Removed,
    RemovedWithWarning(BotError),
}

impl CommandRemoval {
    pub fn was_removed(&self) -> bool {
        !matches!(self, CommandRemoval::NotFound)
    }
}

/// A structured interaction log entry for one trigger-prefixed message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionLog {
    pub ts: DateTime<Utc>,
    pub platform: String,
    pub channel: String,
    pub sender: String,
    pub command: String,
    pub action: InteractionAction,
    pub success: bool,
    pub duration_ms: Option<u64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionAction {
    Invoke,
    Unknown,
}
