//! Command contract and the built-in commands.

use std::sync::Arc;

use async_trait::async_trait;

use crate::bootable::{Bootable, BootableState, Lifecycle};
use crate::error::Result;
use crate::message::Message;
use crate::types::CommandFactory;

/// A handler invoked for trigger-prefixed messages naming it.
///
/// `process` may run concurrently for the same instance; implementations
/// needing exclusivity synchronize themselves. `name` and `vendor` must not
/// change over the instance's lifetime.
#[async_trait]
pub trait Command: Bootable {
    fn name(&self) -> &str;

    fn vendor(&self) -> &str;

    /// Handle one invocation. The message content has the trigger removed,
    /// so it starts with the command name.
    async fn process(&self, message: &Message) -> Result<()>;
}

const BUILTIN_VENDOR: &str = "botkit";

/// Factories for `ping`, `echo` and `help`.
pub fn builtin_commands() -> Vec<CommandFactory> {
    vec![
        CommandFactory::new("ping", PingCommand::new),
        CommandFactory::new("echo", EchoCommand::new),
        CommandFactory::new("help", HelpCommand::new),
    ]
}

/// Replies `pong`.
pub struct PingCommand {
    lifecycle: Lifecycle,
}

impl PingCommand {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            lifecycle: Lifecycle::new("command 'ping'"),
        })
    }
}

#[async_trait]
impl Bootable for PingCommand {
    async fn boot(&self) -> Result<()> {
        self.lifecycle.boot(async { Ok(()) }).await
    }

    fn state(&self) -> BootableState {
        self.lifecycle.state()
    }

    async fn teardown(&self) -> Result<()> {
        self.lifecycle.teardown(async { Ok(()) }).await
    }
}

#[async_trait]
impl Command for PingCommand {
    fn name(&self) -> &str {
        "ping"
    }

    fn vendor(&self) -> &str {
        BUILTIN_VENDOR
    }

    async fn process(&self, message: &Message) -> Result<()> {
        message.channel().send_message("pong").await
    }
}

/// Replies with whatever follows the command name.
pub struct EchoCommand {
    lifecycle: Lifecycle,
}

impl EchoCommand {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            lifecycle: Lifecycle::new("command 'echo'"),
        })
    }
}

#[async_trait]
impl Bootable for EchoCommand {
    async fn boot(&self) -> Result<()> {
        self.lifecycle.boot(async { Ok(()) }).await
    }

    fn state(&self) -> BootableState {
        self.lifecycle.state()
    }

    async fn teardown(&self) -> Result<()> {
        self.lifecycle.teardown(async { Ok(()) }).await
    }
}

#[async_trait]
impl Command for EchoCommand {
    fn name(&self) -> &str {
        "echo"
    }

    fn vendor(&self) -> &str {
        BUILTIN_VENDOR
    }

    async fn process(&self, message: &Message) -> Result<()> {
        let text = message.arguments();
        if text.is_empty() {
            return Ok(());
        }
        message.channel().send_message(text).await
    }
}

/// Lists the commands installed on the channel.
pub struct HelpCommand {
    lifecycle: Lifecycle,
}

impl HelpCommand {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            lifecycle: Lifecycle::new("command 'help'"),
        })
    }
}

#[async_trait]
impl Bootable for HelpCommand {
    async fn boot(&self) -> Result<()> {
        self.lifecycle.boot(async { Ok(()) }).await
    }

    fn state(&self) -> BootableState {
        self.lifecycle.state()
    }

    async fn teardown(&self) -> Result<()> {
        self.lifecycle.teardown(async { Ok(()) }).await
    }
}

#[async_trait]
impl Command for HelpCommand {
    fn name(&self) -> &str {
        "help"
    }

    fn vendor(&self) -> &str {
        BUILTIN_VENDOR
    }

    async fn process(&self, message: &Message) -> Result<()> {
        let channel = message.channel();
        let reply = format!("available commands: {}", channel.command_names().join(", "));
        channel.send_message(&reply).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builtins_boot_and_tear_down() {
        for factory in builtin_commands() {
            let command = factory.create();
            assert_eq!(command.name(), factory.id().as_str());
            assert_eq!(command.vendor(), "botkit");
            assert_eq!(command.state(), BootableState::Uninitialized);
            command.boot().await.unwrap();
            assert_eq!(command.state(), BootableState::Initialized);
            command.teardown().await.unwrap();
            assert_eq!(command.state(), BootableState::Destructed);
        }
    }
}
