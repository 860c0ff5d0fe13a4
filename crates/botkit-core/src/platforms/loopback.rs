//! In-memory platform client.
//!
//! A [`LoopbackNetwork`] plays the server: clients attach to it on connect,
//! everything they write is appended to a transcript and broadcast, and
//! [`LoopbackNetwork::inject`] feeds raw inbound lines of the form
//! `<sender>@<channel>: <content>` to every connected client.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::bootable::{Bootable, BootableState};
use crate::client::{ClientCore, PlatformClient};
use crate::error::{BotError, Result};
use crate::message::Message;
use crate::types::{ClientFactory, ConnectionInfo, Credentials, DispatchOutcome, FactoryId};

pub const PLATFORM_NAME: &str = "loopback";
pub const VENDOR_NAME: &str = "botkit";
pub const DEFAULT_HOST: &str = "loopback.local";
pub const DEFAULT_PORT: u16 = 6667;
pub const DEFAULT_TRIGGER: &str = "!";

const OUTBOUND_CAPACITY: usize = 256;

pub struct LoopbackNetwork {
    sessions: RwLock<Vec<Weak<LoopbackClient>>>,
    transcript: RwLock<Vec<String>>,
    outbound: broadcast::Sender<String>,
}

impl LoopbackNetwork {
    pub fn new() -> Arc<Self> {
        let (outbound, _) = broadcast::channel(OUTBOUND_CAPACITY);
        Arc::new(Self {
            sessions: RwLock::new(Vec::new()),
            transcript: RwLock::new(Vec::new()),
            outbound,
        })
    }

    /// Receive every line clients write from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.outbound.subscribe()
    }

    /// Every line written so far, terminators stripped.
    pub fn transcript(&self) -> Vec<String> {
        self.transcript.read().clone()
    }

    pub fn connected_clients(&self) -> usize {
        self.sessions
            .read()
            .iter()
            .filter(|c| c.strong_count() > 0)
            .count()
    }

    /// Hand a raw inbound line to every connected client. Returns the
    /// dispatch outcomes of the clients that routed it to a joined channel.
    pub async fn inject(&self, raw: &str) -> Vec<DispatchOutcome> {
        let clients: Vec<Arc<LoopbackClient>> = self
            .sessions
            .read()
            .iter()
            .filter_map(Weak::upgrade)
            .collect();

        let mut outcomes = Vec::new();
        for client in clients {
            if let Some(outcome) = client.receive(raw).await {
                outcomes.push(outcome);
            }
        }
        outcomes
    }

    fn attach(&self, client: Weak<LoopbackClient>) {
        let mut sessions = self.sessions.write();
        sessions.retain(|c| c.strong_count() > 0 && !c.ptr_eq(&client));
        sessions.push(client);
    }

    fn detach(&self, client: &Weak<LoopbackClient>) {
        self.sessions
            .write()
            .retain(|c| c.strong_count() > 0 && !c.ptr_eq(client));
    }

    fn record(&self, data: &str) {
        let line = data.trim_end_matches(|c: char| c == '\r' || c == '\n').to_string();
        self.transcript.write().push(line.clone());
        // No subscribers is fine.
        let _ = self.outbound.send(line);
    }
}

pub struct LoopbackClient {
    me: Weak<LoopbackClient>,
    core: ClientCore,
    network: Arc<LoopbackNetwork>,
    trigger: String,
}

impl LoopbackClient {
    pub fn new(network: Arc<LoopbackNetwork>) -> Arc<Self> {
        Self::with_trigger(network, DEFAULT_TRIGGER)
    }

    pub fn with_trigger(network: Arc<LoopbackNetwork>, trigger: impl Into<String>) -> Arc<Self> {
        let trigger = trigger.into();
        Arc::new_cyclic(|me: &Weak<Self>| {
            let this: Weak<dyn PlatformClient> = me.clone();
            Self {
                me: me.clone(),
                core: ClientCore::new("loopback client", this),
                network,
                trigger,
            }
        })
    }

    /// Factory creating clients attached to `network`.
    pub fn factory(id: impl Into<FactoryId>, network: Arc<LoopbackNetwork>) -> ClientFactory {
        ClientFactory::new(id, move || LoopbackClient::new(network.clone()))
    }

    /// Process one raw inbound line: emit `line`, then deliver it as a
    /// message if it parses and targets a joined channel.
    pub async fn receive(&self, raw: &str) -> Option<DispatchOutcome> {
        self.core.receive_line(raw).await;

        let (sender, channel, content) = parse_inbound(raw)?;
        let channel = self
            .core
            .joined_channels()
            .into_iter()
            .find(|c| c.name() == channel)?;
        let message = Message::new(channel, sender, content);
        Some(self.core.deliver(message).await)
    }
}

/// Split `<sender>@<channel>: <content>` into its parts.
pub fn parse_inbound(raw: &str) -> Option<(&str, &str, &str)> {
    let line = raw.trim_end_matches(|c: char| c == '\r' || c == '\n');
    let (head, content) = line.split_once(": ")?;
    let (sender, channel) = head.split_once('@')?;
    let valid = |part: &str| !part.is_empty() && !part.contains(char::is_whitespace);
    if !valid(sender) || !valid(channel) {
        return None;
    }
    Some((sender, channel, content))
}

#[async_trait]
impl Bootable for LoopbackClient {
    async fn boot(&self) -> Result<()> {
        self.core
            .lifecycle()
            .boot(async {
                tracing::debug!(trigger = %self.trigger, "Loopback client ready");
                Ok(())
            })
            .await
    }

    fn state(&self) -> BootableState {
        self.core.lifecycle().state()
    }

    async fn teardown(&self) -> Result<()> {
        self.core
            .lifecycle()
            .teardown(async {
                self.core.release().await;
                self.disconnect().await
            })
            .await
    }
}

#[async_trait]
impl PlatformClient for LoopbackClient {
    fn platform_name(&self) -> &str {
        PLATFORM_NAME
    }

    fn vendor_name(&self) -> &str {
        VENDOR_NAME
    }

    fn command_trigger(&self) -> &str {
        &self.trigger
    }

    fn core(&self) -> &ClientCore {
        &self.core
    }

    async fn connect(&self, credentials: Credentials) -> Result<ConnectionInfo> {
        if self.state() != BootableState::Initialized {
            return Err(BotError::Connection(format!(
                "client must be booted before connecting (state '{}')",
                self.state()
            )));
        }
        if credentials.username.is_empty() || credentials.password.is_empty() {
            return Err(BotError::Auth(
                "username and password are required".to_string(),
            ));
        }
        if let Some(info) = self.core.connection() {
            return Ok(info);
        }

        let (host, port) = credentials.endpoint(DEFAULT_HOST, DEFAULT_PORT);
        let info = ConnectionInfo {
            platform: PLATFORM_NAME.to_string(),
            host,
            port,
            username: credentials.username.clone(),
            connected_at: Utc::now(),
        };
        self.core.mark_connected(info.clone());
        self.network.attach(self.me.clone());
        self.write_line(&format!("USER {}", credentials.username))
            .await?;
        Ok(info)
    }

    async fn disconnect(&self) -> Result<()> {
        if !self.core.is_connected() {
            return Ok(());
        }
        self.write_line("QUIT").await?;
        self.core.mark_disconnected();
        self.network.detach(&self.me);
        Ok(())
    }

    async fn write(&self, data: &str) -> Result<()> {
        self.core.ensure_connected()?;
        self.network.record(data);
        Ok(())
    }

    async fn join_channel(&self, channel: &str) -> Result<()> {
        self.write_line(&format!("JOIN {}", channel)).await
    }

    async fn leave_channel(&self, channel: &str) -> Result<()> {
        self.write_line(&format!("PART {}", channel)).await
    }

    async fn send_to_channel(&self, channel: &str, text: &str) -> Result<()> {
        self.write_line(&format!("MSG {} :{}", channel, text)).await
    }
}
