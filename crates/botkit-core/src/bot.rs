//! Bot orchestrator.
//!
//! Keeps a registry of platform client factories, creates/boots/connects
//! instances on request and tears them down again. Every operation touching
//! one factory's instance runs under that factory's async guard, so a boot
//! cannot race another boot, a teardown or an unregistration of the same key.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use crate::bootable::{Bootable, BootableState, Lifecycle};
use crate::client::PlatformClient;
use crate::config::{BotConfig, PlatformConfig};
use crate::error::{BotError, Result};
use crate::logging::InteractionLogger;
use crate::types::{ClientFactory, CommandFactory, ConnectionInfo, FactoryId};

pub struct Bot {
    name: String,
    lifecycle: Lifecycle,
    factories: RwLock<Vec<ClientFactory>>,
    commands: RwLock<Vec<CommandFactory>>,
    platforms: RwLock<HashMap<FactoryId, PlatformConfig>>,
    booted: RwLock<Vec<(FactoryId, Arc<dyn PlatformClient>)>>,
    guards: Mutex<HashMap<FactoryId, Arc<tokio::sync::Mutex<()>>>>,
    logger: Arc<InteractionLogger>,
}

impl Bot {
    pub fn new(config: BotConfig) -> Self {
        let logger = Arc::new(InteractionLogger::new(
            config.logging.interaction_log.clone(),
        ));
        Self::with_logger(config, logger)
    }

    pub fn with_logger(config: BotConfig, logger: Arc<InteractionLogger>) -> Self {
        let platforms = config
            .platforms
            .into_iter()
            .map(|p| (FactoryId::new(p.id.clone()), p))
            .collect();
        Self {
            lifecycle: Lifecycle::new(format!("bot '{}'", config.name)),
            name: config.name,
            factories: RwLock::new(Vec::new()),
            commands: RwLock::new(Vec::new()),
            platforms: RwLock::new(platforms),
            booted: RwLock::new(Vec::new()),
            guards: Mutex::new(HashMap::new()),
            logger,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn logger(&self) -> &Arc<InteractionLogger> {
        &self.logger
    }

    /// Register a client factory. Registering an id twice keeps the first.
    pub fn register_platform_client(&self, factory: ClientFactory) -> &Self {
        let mut factories = self.factories.write();
        if factories.iter().any(|f| f.id() == factory.id()) {
            tracing::debug!(platform = %factory.id(), "Platform client already registered");
        } else {
            tracing::info!(platform = %factory.id(), "Platform client registered");
            factories.push(factory);
        }
        self
    }

    /// Unregister a client factory, tearing down its booted instance first.
    ///
    /// The factory is removed even when that teardown fails; the failure is
    /// returned.
    pub async fn unregister_platform_client(&self, id: &str) -> Result<()> {
        let Some(guard) = self.guard(id) else {
            tracing::debug!(platform = %id, "Platform client not registered");
            return Ok(());
        };
        let _held = guard.lock().await;

        let removed = {
            let mut factories = self.factories.write();
            let before = factories.len();
            factories.retain(|f| f.id().as_str() != id);
            before != factories.len()
        };
        if removed {
            tracing::info!(platform = %id, "Platform client unregistered");
        }

        let result = match self.take_booted(id) {
            Some(client) => self.shut_down(id, client).await,
            None => Ok(()),
        };
        self.guards.lock().remove(&FactoryId::from(id));
        result
    }

    /// Supply the configuration `boot_platform_client` connects with.
    pub fn configure_platform(&self, config: PlatformConfig) -> &Self {
        self.platforms
            .write()
            .insert(FactoryId::new(config.id.clone()), config);
        self
    }

    pub fn platform_config(&self, id: &str) -> Option<PlatformConfig> {
        self.platforms.read().get(&FactoryId::from(id)).cloned()
    }

    /// Add a command factory to the catalog configured channels draw from.
    /// Registering an id twice keeps the first.
    pub fn register_command(&self, factory: CommandFactory) -> &Self {
        let mut commands = self.commands.write();
        if !commands.iter().any(|c| c.id() == factory.id()) {
            tracing::debug!(command = %factory.id(), "Command registered");
            commands.push(factory);
        }
        self
    }

    pub fn registered_commands(&self) -> Vec<CommandFactory> {
        self.commands.read().clone()
    }

    /// Create, boot and connect an instance of a registered factory.
    ///
    /// Fails with [`BotError::UnregisteredClient`] for unknown ids. After
    /// connecting, the channels listed in the platform's configuration are
    /// joined and their commands installed; failures there are logged only.
    /// Resolves with the connect result.
    pub async fn boot_platform_client(&self, id: &str) -> Result<ConnectionInfo> {
        let guard = self
            .guard(id)
            .ok_or_else(|| BotError::UnregisteredClient(id.to_string()))?;
        let _held = guard.lock().await;

        let factory = self
            .factories
            .read()
            .iter()
            .find(|f| f.id().as_str() == id)
            .cloned()
            .ok_or_else(|| BotError::UnregisteredClient(id.to_string()))?;

        let existing = self
            .booted
            .read()
            .iter()
            .find(|(key, _)| key.as_str() == id)
            .map(|(_, client)| client.state());
        match existing {
            Some(BootableState::Initialized) => {
                return Err(BotError::AlreadyBooted(id.to_string()));
            }
            Some(state) => {
                // Torn down behind the bot's back; drop the stale entry.
                tracing::warn!(platform = %id, state = %state, "Dropping stale booted instance");
                self.take_booted(id);
            }
            None => {}
        }

        let platform = self
            .platform_config(id)
            .ok_or_else(|| BotError::MissingCredentials(id.to_string()))?;
        let credentials = platform.credentials()?;

        let client = factory.create();
        client
            .core()
            .attach_interaction_logger(self.logger.clone());
        client.boot().await?;

        let info = match client.connect(credentials).await {
            Ok(info) => info,
            Err(e) => {
                tracing::error!(platform = %id, error = %e, "Connect failed");
                if let Err(te) = client.teardown().await {
                    tracing::warn!(platform = %id, error = %te, "Teardown after failed connect also failed");
                }
                return Err(e);
            }
        };

        self.booted
            .write()
            .push((factory.id().clone(), client.clone()));
        tracing::info!(
            platform = %id,
            host = %info.host,
            port = info.port,
            user = %info.username,
            "Platform client booted and connected"
        );

        self.join_configured_channels(client.as_ref(), &platform)
            .await;
        Ok(info)
    }

    /// Tear down the booted instance of `id`. A no-op when none is booted.
    pub async fn teardown_platform_client(&self, id: &str) -> Result<()> {
        let Some(guard) = self.guard(id) else {
            tracing::debug!(platform = %id, "No booted instance to tear down");
            return Ok(());
        };
        let _held = guard.lock().await;

        match self.take_booted(id) {
            Some(client) => self.shut_down(id, client).await,
            None => {
                tracing::debug!(platform = %id, "No booted instance to tear down");
                Ok(())
            }
        }
    }

    /// Instances currently booted, in boot order.
    pub fn booted_platform_clients(&self) -> Vec<Arc<dyn PlatformClient>> {
        self.booted
            .read()
            .iter()
            .filter(|(_, client)| client.state() == BootableState::Initialized)
            .map(|(_, client)| client.clone())
            .collect()
    }

    pub fn booted_platform_client(&self, id: &str) -> Option<Arc<dyn PlatformClient>> {
        self.booted
            .read()
            .iter()
            .find(|(key, client)| {
                key.as_str() == id && client.state() == BootableState::Initialized
            })
            .map(|(_, client)| client.clone())
    }

    /// Registered factories, in registration order.
    pub fn registered_platform_clients(&self) -> Vec<ClientFactory> {
        self.factories.read().clone()
    }

    /// The serialization guard for `id`. Only registered ids get a new one;
    /// an unregistered id yields the guard still held by an in-flight
    /// unregistration, if any.
    fn guard(&self, id: &str) -> Option<Arc<tokio::sync::Mutex<()>>> {
        let key = FactoryId::from(id);
        let factories = self.factories.read();
        let mut guards = self.guards.lock();
        if factories.iter().any(|f| f.id() == &key) {
            Some(guards.entry(key).or_default().clone())
        } else {
            guards.get(&key).cloned()
        }
    }

    fn take_booted(&self, id: &str) -> Option<Arc<dyn PlatformClient>> {
        let mut booted = self.booted.write();
        let idx = booted.iter().position(|(key, _)| key.as_str() == id)?;
        Some(booted.remove(idx).1)
    }

    async fn shut_down(&self, id: &str, client: Arc<dyn PlatformClient>) -> Result<()> {
        let state = client.state();
        if state != BootableState::Initialized {
            tracing::warn!(platform = %id, state = %state, "Dropping stale booted instance");
            return Ok(());
        }
        let result = client.teardown().await;
        match &result {
            Ok(()) => tracing::info!(platform = %id, "Platform client torn down"),
            Err(e) => tracing::error!(platform = %id, error = %e, "Platform client teardown failed"),
        }
        result
    }

    async fn join_configured_channels(&self, client: &dyn PlatformClient, platform: &PlatformConfig) {
        for channel_config in &platform.channels {
            let channel = client.channel(&channel_config.name);
            if let Err(e) = channel.join().await {
                tracing::warn!(
                    platform = %platform.id,
                    channel = %channel_config.name,
                    error = %e,
                    "Failed to join configured channel"
                );
                continue;
            }

            for command in &channel_config.commands {
                let factory = self
                    .commands
                    .read()
                    .iter()
                    .find(|c| c.id().as_str() == command)
                    .cloned();
                let Some(factory) = factory else {
                    tracing::warn!(
                        platform = %platform.id,
                        channel = %channel_config.name,
                        command = %command,
                        "Configured command is not registered"
                    );
                    continue;
                };
                if let Err(e) = channel.add_command(&factory).await {
                    tracing::warn!(
                        platform = %platform.id,
                        channel = %channel_config.name,
                        command = %command,
                        error = %e,
                        "Failed to install command"
                    );
                }
            }
        }
    }
}

#[async_trait]
impl Bootable for Bot {
    /// Boots every registered factory configured with `autoboot`. Individual
    /// failures are logged and do not fail the bot.
    async fn boot(&self) -> Result<()> {
        self.lifecycle
            .boot(async {
                let autoboot: Vec<FactoryId> = self
                    .factories
                    .read()
                    .iter()
                    .map(|f| f.id().clone())
                    .filter(|id| {
                        self.platforms
                            .read()
                            .get(id)
                            .map_or(false, |p| p.autoboot)
                    })
                    .collect();

                for id in autoboot {
                    if let Err(e) = self.boot_platform_client(id.as_str()).await {
                        tracing::error!(platform = %id, error = %e, "Autoboot failed");
                    }
                }
                Ok(())
            })
            .await
    }

    fn state(&self) -> BootableState {
        self.lifecycle.state()
    }

    /// Tears down every booted client, attempting all of them. Fails if any
    /// teardown failed.
    async fn teardown(&self) -> Result<()> {
        self.lifecycle
            .teardown(async {
                let ids: Vec<FactoryId> = self
                    .booted
                    .read()
                    .iter()
                    .map(|(id, _)| id.clone())
                    .collect();

                let mut first_error = None;
                for id in ids {
                    if let Err(e) = self.teardown_platform_client(id.as_str()).await {
                        first_error.get_or_insert(e);
                    }
                }
                match first_error {
                    Some(e) => Err(e),
                    None => Ok(()),
                }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::loopback::{LoopbackClient, LoopbackNetwork};

    fn loopback_bot() -> Bot {
        let bot = Bot::new(BotConfig {
            platforms: vec![PlatformConfig::new("loopback", "alice", "pw")],
            ..BotConfig::default()
        });
        bot.register_platform_client(LoopbackClient::factory("loopback", LoopbackNetwork::new()));
        bot
    }

    #[tokio::test]
    async fn unknown_ids_get_no_guard() {
        let bot = loopback_bot();
        for id in ["ghost", "phantom"] {
            assert!(bot.boot_platform_client(id).await.is_err());
            bot.teardown_platform_client(id).await.unwrap();
            bot.unregister_platform_client(id).await.unwrap();
        }
        assert!(bot.guards.lock().is_empty());
    }

    #[tokio::test]
    async fn unregister_drops_the_guard() {
        let bot = loopback_bot();
        bot.boot_platform_client("loopback").await.unwrap();
        assert_eq!(bot.guards.lock().len(), 1);

        bot.unregister_platform_client("loopback").await.unwrap();
        assert!(bot.guards.lock().is_empty());
    }
}
