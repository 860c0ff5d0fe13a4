//! Platform client contract and the shared state implementations embed.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::bootable::{Bootable, Lifecycle};
use crate::channel::Channel;
use crate::error::{BotError, Result};
use crate::events::{ClientEvent, EventHandler, ListenerId, ListenerRegistry};
use crate::logging::InteractionLogger;
use crate::message::Message;
use crate::types::{ConnectionInfo, Credentials, DispatchOutcome};

/// Appended by [`PlatformClient::write_line`].
pub const LINE_TERMINATOR: &str = "\r\n";

/// One connection to one messaging backend.
///
/// Implementations must be constructible without arguments and fetch their
/// dependencies in `boot()`. They embed a [`ClientCore`], which provides the
/// channel register, listeners and connection bookkeeping shared by every
/// platform. `teardown()` is expected to call [`ClientCore::release`] before
/// closing the transport, so channels can still be left cleanly.
#[async_trait]
pub trait PlatformClient: Bootable {
    fn platform_name(&self) -> &str;

    fn vendor_name(&self) -> &str;

    /// Prefix marking a message as a command invocation.
    fn command_trigger(&self) -> &str;

    fn core(&self) -> &ClientCore;

    /// Authenticate and open the transport. Missing host or port fall back to
    /// platform defaults.
    async fn connect(&self, credentials: Credentials) -> Result<ConnectionInfo>;

    /// Close the transport. A no-op when not connected.
    async fn disconnect(&self) -> Result<()>;

    /// Send raw data. Fails with [`BotError::NotConnected`] before `connect`.
    async fn write(&self, data: &str) -> Result<()>;

    async fn write_line(&self, data: &str) -> Result<()> {
        self.write(&format!("{}{}", data, LINE_TERMINATOR)).await
    }

    /// Wire-level join, called by [`Channel::join`].
    async fn join_channel(&self, channel: &str) -> Result<()>;

    /// Wire-level leave, called by [`Channel::leave`].
    async fn leave_channel(&self, channel: &str) -> Result<()>;

    /// Wire-level send, called by [`Channel::send_message`].
    async fn send_to_channel(&self, channel: &str, text: &str) -> Result<()>;

    /// The channel named `name`, created and registered on first use.
    fn channel(&self, name: &str) -> Arc<Channel> {
        self.core().channel(name)
    }

    fn channel_register(&self) -> Vec<Arc<Channel>> {
        self.core().channel_register()
    }

    fn joined_channels(&self) -> Vec<Arc<Channel>> {
        self.core().joined_channels()
    }

    fn is_connected(&self) -> bool {
        self.core().is_connected()
    }

    fn on(&self, event: &str, handler: EventHandler) -> Result<ListenerId> {
        self.core().listeners().subscribe(event, handler)
    }

    fn remove_listener(&self, event: &str, listener: ListenerId) -> Result<bool> {
        self.core().listeners().unsubscribe(event, listener)
    }
}

/// State every platform client carries.
pub struct ClientCore {
    lifecycle: Lifecycle,
    this: Weak<dyn PlatformClient>,
    channels: RwLock<BTreeMap<String, Arc<Channel>>>,
    listeners: ListenerRegistry,
    connection: RwLock<Option<ConnectionInfo>>,
    logger: RwLock<Option<Arc<InteractionLogger>>>,
}

impl ClientCore {
    /// `this` is the owning client, typically obtained through
    /// `Arc::new_cyclic`.
    pub fn new(entity: impl Into<String>, this: Weak<dyn PlatformClient>) -> Self {
        Self {
            lifecycle: Lifecycle::new(entity),
            this,
            channels: RwLock::new(BTreeMap::new()),
            listeners: ListenerRegistry::new(),
            connection: RwLock::new(None),
            logger: RwLock::new(None),
        }
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    pub fn channel(&self, name: &str) -> Arc<Channel> {
        if let Some(channel) = self.channels.read().get(name) {
            return channel.clone();
        }
        self.channels
            .write()
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!(channel = %name, "Registering channel");
                Arc::new(Channel::new(name, self.this.clone()))
            })
            .clone()
    }

    pub fn channel_register(&self) -> Vec<Arc<Channel>> {
        self.channels.read().values().cloned().collect()
    }

    pub fn joined_channels(&self) -> Vec<Arc<Channel>> {
        self.channels
            .read()
            .values()
            .filter(|c| c.is_joined())
            .cloned()
            .collect()
    }

    pub fn connection(&self) -> Option<ConnectionInfo> {
        self.connection.read().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.read().is_some()
    }

    pub fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(BotError::NotConnected)
        }
    }

    pub fn mark_connected(&self, info: ConnectionInfo) {
        *self.connection.write() = Some(info);
    }

    /// Clear the connection, returning what it was.
    pub fn mark_disconnected(&self) -> Option<ConnectionInfo> {
        let previous = self.connection.write().take();
        if previous.is_some() {
            for channel in self.channels.read().values() {
                channel.reset_membership();
            }
        }
        previous
    }

    pub fn attach_interaction_logger(&self, logger: Arc<InteractionLogger>) {
        *self.logger.write() = Some(logger);
    }

    pub fn interaction_logger(&self) -> Option<Arc<InteractionLogger>> {
        self.logger.read().clone()
    }

    /// Emit a raw transport line to `line` listeners.
    pub async fn receive_line(&self, line: &str) {
        self.listeners.emit_line(line).await;
    }

    /// Emit `message` to listeners, then route it to its channel.
    pub async fn deliver(&self, message: Message) -> DispatchOutcome {
        self.listeners.emit_message(&message).await;
        let channel = message.channel().clone();
        channel.dispatch(&message).await
    }

    /// Release everything the client owns, top-down: joined channels are left
    /// while the transport is still up, every channel's commands are torn
    /// down, the register is emptied and listeners are dropped. Failures are
    /// logged and do not stop the release.
    pub async fn release(&self) {
        let channels: Vec<Arc<Channel>> = std::mem::take(&mut *self.channels.write())
            .into_values()
            .collect();
        let connected = self.is_connected();

        for channel in channels {
            if connected && channel.is_joined() {
                if let Err(e) = channel.leave().await {
                    tracing::warn!(
                        entity = %self.lifecycle.entity(),
                        channel = %channel.name(),
                        error = %e,
                        "Failed to leave channel during teardown"
                    );
                }
            }
            channel.reset_membership();
            for (command, e) in channel.clear_commands().await {
                tracing::warn!(
                    entity = %self.lifecycle.entity(),
                    channel = %channel.name(),
                    command = %command,
                    error = %e,
                    "Command teardown failed"
                );
            }
        }

        let listeners = self.listeners.listener_count(ClientEvent::Line)
            + self.listeners.listener_count(ClientEvent::Message);
        self.listeners.clear();
        tracing::debug!(entity = %self.lifecycle.entity(), listeners, "Client state released");
    }
}
