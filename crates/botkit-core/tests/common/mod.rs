//! Mock platform clients and commands shared by the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use botkit_core::{
    Bootable, BootableState, BotError, ClientCore, ClientFactory, Command, CommandFactory,
    ConnectionInfo, Credentials, Lifecycle, Message, PlatformClient, Result,
};

pub const MOCK_HOST: &str = "mock.local";
pub const MOCK_PORT: u16 = 4000;

/// Counters shared by every instance a mock factory creates.
#[derive(Default)]
pub struct ClientStats {
    pub boots: AtomicUsize,
    pub connects: AtomicUsize,
    pub teardowns: AtomicUsize,
    pub written: Mutex<Vec<String>>,
}

impl ClientStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn boots(&self) -> usize {
        self.boots.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn teardowns(&self) -> usize {
        self.teardowns.load(Ordering::SeqCst)
    }

    pub fn written(&self) -> Vec<String> {
        self.written.lock().clone()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ClientBehavior {
    pub fail_boot: bool,
    pub fail_connect: bool,
    pub fail_teardown: bool,
}

pub struct MockClient {
    core: ClientCore,
    stats: Arc<ClientStats>,
    behavior: ClientBehavior,
}

impl MockClient {
    pub fn new(stats: Arc<ClientStats>, behavior: ClientBehavior) -> Arc<Self> {
        Arc::new_cyclic(|me: &Weak<Self>| {
            let this: Weak<dyn PlatformClient> = me.clone();
            Self {
                core: ClientCore::new("mock client", this),
                stats,
                behavior,
            }
        })
    }
}

pub fn mock_factory(id: &str, stats: Arc<ClientStats>, behavior: ClientBehavior) -> ClientFactory {
    ClientFactory::new(id, move || MockClient::new(stats.clone(), behavior))
}

#[async_trait]
impl Bootable for MockClient {
    async fn boot(&self) -> Result<()> {
        self.core
            .lifecycle()
            .boot(async {
                self.stats.boots.fetch_add(1, Ordering::SeqCst);
                if self.behavior.fail_boot {
                    return Err(BotError::Internal("boot refused".to_string()));
                }
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
                self.stats.teardowns.fetch_add(1, Ordering::SeqCst);
                self.core.release().await;
                self.disconnect().await?;
                if self.behavior.fail_teardown {
                    return Err(BotError::Internal("teardown refused".to_string()));
                }
                Ok(())
            })
            .await
    }
}

#[async_trait]
impl PlatformClient for MockClient {
    fn platform_name(&self) -> &str {
        "mock"
    }

    fn vendor_name(&self) -> &str {
        "tests"
    }

    fn command_trigger(&self) -> &str {
        "!"
    }

    fn core(&self) -> &ClientCore {
        &self.core
    }

    async fn connect(&self, credentials: Credentials) -> Result<ConnectionInfo> {
        self.stats.connects.fetch_add(1, Ordering::SeqCst);
        if self.behavior.fail_connect {
            return Err(BotError::Connection("connection refused".to_string()));
        }
        let (host, port) = credentials.endpoint(MOCK_HOST, MOCK_PORT);
        let info = ConnectionInfo {
            platform: "mock".to_string(),
            host,
            port,
            username: credentials.username,
            connected_at: Utc::now(),
        };
        self.core.mark_connected(info.clone());
        Ok(info)
    }

    async fn disconnect(&self) -> Result<()> {
        self.core.mark_disconnected();
        Ok(())
    }

    async fn write(&self, data: &str) -> Result<()> {
        self.core.ensure_connected()?;
        self.stats.written.lock().push(data.trim_end().to_string());
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

/// What a recording command saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub sender: String,
    pub content: String,
    pub mentions: Vec<String>,
}

#[derive(Default)]
pub struct CommandStats {
    pub boots: AtomicUsize,
    pub teardowns: AtomicUsize,
    pub invocations: Mutex<Vec<Invocation>>,
}

impl CommandStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn boots(&self) -> usize {
        self.boots.load(Ordering::SeqCst)
    }

    pub fn teardowns(&self) -> usize {
        self.teardowns.load(Ordering::SeqCst)
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().clone()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CommandBehavior {
    pub fail_boot: bool,
    pub fail_process: bool,
    pub fail_teardown: bool,
}

pub struct RecordingCommand {
    name: &'static str,
    lifecycle: Lifecycle,
    stats: Arc<CommandStats>,
    behavior: CommandBehavior,
}

impl RecordingCommand {
    pub fn new(name: &'static str, stats: Arc<CommandStats>, behavior: CommandBehavior) -> Arc<Self> {
        Arc::new(Self {
            name,
            lifecycle: Lifecycle::new(format!("command '{}'", name)),
            stats,
            behavior,
        })
    }
}

pub fn command_factory(
    name: &'static str,
    stats: Arc<CommandStats>,
    behavior: CommandBehavior,
) -> CommandFactory {
    CommandFactory::new(name, move || {
        RecordingCommand::new(name, stats.clone(), behavior)
    })
}

#[async_trait]
impl Bootable for RecordingCommand {
    async fn boot(&self) -> Result<()> {
        self.lifecycle
            .boot(async {
                self.stats.boots.fetch_add(1, Ordering::SeqCst);
                if self.behavior.fail_boot {
                    return Err(BotError::Internal("command boot refused".to_string()));
                }
                Ok(())
            })
            .await
    }

    fn state(&self) -> BootableState {
        self.lifecycle.state()
    }

    async fn teardown(&self) -> Result<()> {
        self.lifecycle
            .teardown(async {
                self.stats.teardowns.fetch_add(1, Ordering::SeqCst);
                if self.behavior.fail_teardown {
                    return Err(BotError::Internal("command teardown refused".to_string()));
                }
                Ok(())
            })
            .await
    }
}

#[async_trait]
impl Command for RecordingCommand {
    fn name(&self) -> &str {
        self.name
    }

    fn vendor(&self) -> &str {
        "tests"
    }

    async fn process(&self, message: &Message) -> Result<()> {
        self.stats.invocations.lock().push(Invocation {
            sender: message.sender_name().to_string(),
            content: message.content().to_string(),
            mentions: message.mentioned_users().to_vec(),
        });
        if self.behavior.fail_process {
            return Err(BotError::CommandFailed {
                command: self.name.to_string(),
                reason: "process refused".to_string(),
            });
        }
        Ok(())
    }
}

/// A booted, connected mock client.
pub async fn connected_client(stats: Arc<ClientStats>) -> Arc<MockClient> {
    let client = MockClient::new(stats, ClientBehavior::default());
    client.boot().await.unwrap();
    client
        .connect(Credentials::new("alice", "pw"))
        .await
        .unwrap();
    client
}
