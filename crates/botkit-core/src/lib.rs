//! Chat bot core for botkit.
//!
//! A [`Bot`] registers platform client factories, boots and connects their
//! instances, and tears them down again. Each [`PlatformClient`] keeps a
//! register of [`Channel`]s; channels carry installed [`Command`]s and route
//! trigger-prefixed messages to them.
//!
//! Everything with a lifecycle implements [`Bootable`]:
//! `uninitialized -> boot -> initialized -> teardown -> destructed`, with a
//! terminal `error` state when a boot or teardown step fails.
//!
//! # Platforms
//! - `loopback`: in-memory network used by the CLI and the tests

pub mod bootable;
pub mod bot;
pub mod channel;
pub mod client;
pub mod command;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod message;
pub mod platforms;
pub mod types;

// Re-export core types
pub use bootable::{Bootable, BootableState, Lifecycle};
pub use bot::Bot;
pub use channel::Channel;
pub use client::{ClientCore, PlatformClient, LINE_TERMINATOR};
pub use command::{builtin_commands, Command};
pub use config::{BotConfig, ChannelConfig, LogFormat, LoggingConfig, PlatformConfig};
pub use error::{BotError, Result};
pub use events::{ClientEvent, EventHandler, ListenerId, ListenerRegistry};
pub use logging::InteractionLogger;
pub use message::Message;
pub use platforms::loopback::{LoopbackClient, LoopbackNetwork};
pub use types::{
    ClientFactory, CommandFactory, CommandRemoval, ConnectionInfo, Credentials, DispatchOutcome,
    FactoryId, InteractionAction, InteractionLog,
};
