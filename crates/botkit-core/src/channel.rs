//! A joinable conversation context inside one platform client.
//!
//! Channels are created lazily by `ClientCore::channel` and hold only a weak
//! back-reference to their client. Wire-level join/leave/send is delegated to
//! the client; the channel keeps membership state and its installed commands.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::Mutex;

use crate::client::PlatformClient;
use crate::command::Command;
use crate::error::{BotError, Result};
use crate::logging::InteractionLogger;
use crate::message::Message;
use crate::types::{CommandFactory, CommandRemoval, DispatchOutcome, FactoryId, InteractionAction};

struct InstalledCommand {
    factory: FactoryId,
    command: Arc<dyn Command>,
}

pub struct Channel {
    name: String,
    platform: Weak<dyn PlatformClient>,
    joined: AtomicBool,
    membership: Mutex<()>,
    commands: RwLock<Vec<InstalledCommand>>,
}

impl Channel {
    pub fn new(name: impl Into<String>, platform: Weak<dyn PlatformClient>) -> Self {
        Self {
            name: name.into(),
            platform,
            joined: AtomicBool::new(false),
            membership: Mutex::new(()),
            commands: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The owning client, if it is still alive.
    pub fn platform(&self) -> Option<Arc<dyn PlatformClient>> {
        self.platform.upgrade()
    }

    pub fn is_joined(&self) -> bool {
        self.joined.load(Ordering::SeqCst)
    }

    /// Join the channel. Joining an already joined channel succeeds without
    /// touching the transport.
    pub async fn join(&self) -> Result<()> {
        let _membership = self.membership.lock().await;
        if self.is_joined() {
            return Ok(());
        }
        let platform = self.require_platform()?;
        platform.join_channel(&self.name).await?;
        self.joined.store(true, Ordering::SeqCst);
        tracing::info!(
            platform = %platform.platform_name(),
            channel = %self.name,
            "Joined channel"
        );
        Ok(())
    }

    /// Leave the channel. Leaving a channel that is not joined is a no-op.
    pub async fn leave(&self) -> Result<()> {
        let _membership = self.membership.lock().await;
        if !self.is_joined() {
            return Ok(());
        }
        let platform = self.require_platform()?;
        platform.leave_channel(&self.name).await?;
        self.joined.store(false, Ordering::SeqCst);
        tracing::info!(
            platform = %platform.platform_name(),
            channel = %self.name,
            "Left channel"
        );
        Ok(())
    }

    pub async fn send_message(&self, text: &str) -> Result<()> {
        if !self.is_joined() {
            return Err(BotError::NotJoined(self.name.clone()));
        }
        let platform = self.require_platform()?;
        platform.send_to_channel(&self.name, text).await
    }

    /// Create, boot and install a command. A boot failure propagates and the
    /// command is not installed. Adding a factory that is already installed
    /// is a no-op.
    pub async fn add_command(&self, factory: &CommandFactory) -> Result<()> {
        if self.has_command(factory.id()) {
            tracing::debug!(channel = %self.name, command = %factory.id(), "Command already installed");
            return Ok(());
        }

        let command = factory.create();
        command.boot().await?;

        let raced = {
            let mut commands = self.commands.write();
            if commands.iter().any(|c| &c.factory == factory.id()) {
                true
            } else {
                commands.push(InstalledCommand {
                    factory: factory.id().clone(),
                    command: command.clone(),
                });
                false
            }
        };

        if raced {
            if let Err(e) = command.teardown().await {
                tracing::warn!(channel = %self.name, command = %factory.id(), error = %e, "Discarded duplicate command failed to tear down");
            }
        } else {
            tracing::info!(
                channel = %self.name,
                command = %command.name(),
                vendor = %command.vendor(),
                "Command installed"
            );
        }
        Ok(())
    }

    /// Remove the command installed from `factory` and tear it down.
    ///
    /// Removal happens regardless of the teardown outcome; a failed teardown
    /// comes back as [`CommandRemoval::RemovedWithWarning`].
    pub async fn remove_command(&self, factory: &str) -> CommandRemoval {
        let removed = {
            let mut commands = self.commands.write();
            commands
                .iter()
                .position(|c| c.factory.as_str() == factory)
                .map(|idx| commands.remove(idx))
        };
        let Some(entry) = removed else {
            return CommandRemoval::NotFound;
        };

        match entry.command.teardown().await {
            Ok(()) => {
                tracing::info!(channel = %self.name, command = %entry.command.name(), "Command removed");
                CommandRemoval::Removed
            }
            Err(e) => {
                tracing::warn!(
                    channel = %self.name,
                    command = %entry.command.name(),
                    error = %e,
                    "Command removed but teardown failed"
                );
                CommandRemoval::RemovedWithWarning(e)
            }
        }
    }

    /// Remove and tear down every installed command. Returns the teardown
    /// failures, keyed by command name.
    pub async fn clear_commands(&self) -> Vec<(String, BotError)> {
        let drained: Vec<InstalledCommand> = std::mem::take(&mut *self.commands.write());
        let mut failures = Vec::new();
        for entry in drained {
            if let Err(e) = entry.command.teardown().await {
                failures.push((entry.command.name().to_string(), e));
            }
        }
        failures
    }

    pub fn has_command(&self, factory: &FactoryId) -> bool {
        self.commands.read().iter().any(|c| &c.factory == factory)
    }

    pub fn commands(&self) -> Vec<Arc<dyn Command>> {
        self.commands
            .read()
            .iter()
            .map(|c| c.command.clone())
            .collect()
    }

    pub fn command_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .commands
            .read()
            .iter()
            .map(|c| c.command.name().to_string())
            .collect();
        names.sort();
        names
    }

    /// Route a message addressed to this channel.
    ///
    /// Content starting with the platform trigger is stripped of it and
    /// handed to the command named by the first token. Command failures are
    /// logged and returned, never propagated.
    pub async fn dispatch(&self, message: &Message) -> DispatchOutcome {
        let Some(platform) = self.platform() else {
            return DispatchOutcome::NotACommand;
        };
        let trigger = platform.command_trigger();
        if trigger.is_empty() {
            return DispatchOutcome::NotACommand;
        }
        let Some(stripped) = message.content().strip_prefix(trigger) else {
            return DispatchOutcome::NotACommand;
        };
        let stripped = stripped.trim_start();
        let name = stripped.split_whitespace().next().unwrap_or_default();
        let logger = platform.core().interaction_logger();

        let command = self
            .commands
            .read()
            .iter()
            .find(|c| c.command.name() == name)
            .map(|c| c.command.clone());

        let Some(command) = command else {
            tracing::debug!(channel = %self.name, command = %name, "Ignoring unknown command");
            if let Some(logger) = logger {
                let entry = InteractionLogger::command_entry(
                    platform.platform_name(),
                    &self.name,
                    message.sender_name(),
                    name,
                    InteractionAction::Unknown,
                    false,
                    None,
                    None,
                );
                logger.log(&entry).await;
            }
            return DispatchOutcome::Unknown {
                name: name.to_string(),
            };
        };

        let invocation = message.with_content(stripped);
        let start = Instant::now();
        let result = command.process(&invocation).await;
        let duration_ms = millis(start.elapsed());

        if let Some(logger) = logger {
            let entry = InteractionLogger::command_entry(
                platform.platform_name(),
                &self.name,
                message.sender_name(),
                command.name(),
                InteractionAction::Invoke,
                result.is_ok(),
                Some(duration_ms),
                result.as_ref().err().map(|e| e.to_string()),
            );
            logger.log(&entry).await;
        }

        match result {
            Ok(()) => DispatchOutcome::Processed {
                command: command.name().to_string(),
            },
            Err(error) => {
                tracing::error!(
                    channel = %self.name,
                    command = %command.name(),
                    error = %error,
                    "Command failed"
                );
                DispatchOutcome::Failed {
                    command: command.name().to_string(),
                    error,
                }
            }
        }
    }

    /// Forget membership without touching the transport, used once the
    /// connection is already gone.
    pub(crate) fn reset_membership(&self) {
        self.joined.store(false, Ordering::SeqCst);
    }

    fn require_platform(&self) -> Result<Arc<dyn PlatformClient>> {
        self.platform()
            .ok_or_else(|| BotError::PlatformGone(self.name.clone()))
    }
}

/// Whole milliseconds, saturating at `u64::MAX`.
fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("joined", &self.is_joined())
            .field("commands", &self.command_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_saturates() {
        assert_eq!(millis(Duration::from_micros(2_500)), 2);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }
}
