//! Per-client publish/subscribe registry for `line` and `message` events.
//!
//! Handlers for one event are invoked in subscription order. Their futures
//! are then driven together, so completions of slow asynchronous handlers may
//! interleave.

use std::collections::HashMap;
use std::future::Future;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{join_all, BoxFuture};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{BotError, Result};
use crate::message::Message;

/// Events a platform client emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientEvent {
    /// A raw transport line.
    Line,
    /// A parsed [`Message`].
    Message,
}

impl ClientEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            ClientEvent::Line => "line",
            ClientEvent::Message => "message",
        }
    }
}

impl std::fmt::Display for ClientEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClientEvent {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "line" => Ok(ClientEvent::Line),
            "message" => Ok(ClientEvent::Message),
            other => Err(BotError::UnknownEvent(other.to_string())),
        }
    }
}

pub type LineHandler = Arc<dyn Fn(String) -> BoxFuture<'static, ()> + Send + Sync>;
pub type MessageHandler = Arc<dyn Fn(Message) -> BoxFuture<'static, ()> + Send + Sync>;

/// A subscribed callback. Plain closures can be wrapped with
/// [`EventHandler::line`] and [`EventHandler::message`].
#[derive(Clone)]
pub enum EventHandler {
    Line(LineHandler),
    Message(MessageHandler),
}

impl EventHandler {
    pub fn line<F, Fut>(handler: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        EventHandler::Line(Arc::new(move |line| -> BoxFuture<'static, ()> {
            Box::pin(handler(line))
        }))
    }

    pub fn message<F, Fut>(handler: F) -> Self
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        EventHandler::Message(Arc::new(move |message| -> BoxFuture<'static, ()> {
            Box::pin(handler(message))
        }))
    }

    pub fn event(&self) -> ClientEvent {
        match self {
            EventHandler::Line(_) => ClientEvent::Line,
            EventHandler::Message(_) => ClientEvent::Message,
        }
    }
}

impl std::fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EventHandler({})", self.event())
    }
}

/// Token returned by `subscribe`, used to remove the listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: RwLock<HashMap<ClientEvent, Vec<(ListenerId, EventHandler)>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `handler` to the event named `event`.
    ///
    /// Fails with [`BotError::UnknownEvent`] for names other than `line` and
    /// `message`, and with [`BotError::ListenerMismatch`] when the handler
    /// kind does not fit the event.
    pub fn subscribe(&self, event: &str, handler: EventHandler) -> Result<ListenerId> {
        let event: ClientEvent = event.parse()?;
        if handler.event() != event {
            return Err(BotError::ListenerMismatch {
                event: event.to_string(),
                expected: handler.event().to_string(),
            });
        }

        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .entry(event)
            .or_default()
            .push((id, handler));
        tracing::trace!(event = %event, listener = id.0, "Listener subscribed");
        Ok(id)
    }

    /// Remove a listener. Returns whether it was subscribed.
    pub fn unsubscribe(&self, event: &str, id: ListenerId) -> Result<bool> {
        let event: ClientEvent = event.parse()?;
        let mut listeners = self.listeners.write();
        let Some(list) = listeners.get_mut(&event) else {
            return Ok(false);
        };
        let before = list.len();
        list.retain(|(listener, _)| *listener != id);
        Ok(list.len() != before)
    }

    pub fn listener_count(&self, event: ClientEvent) -> usize {
        self.listeners.read().get(&event).map_or(0, Vec::len)
    }

    pub fn clear(&self) {
        self.listeners.write().clear();
    }

    pub async fn emit_line(&self, line: &str) {
        let handlers: Vec<LineHandler> = self
            .snapshot(ClientEvent::Line)
            .into_iter()
            .filter_map(|handler| match handler {
                EventHandler::Line(h) => Some(h),
                EventHandler::Message(_) => None,
            })
            .collect();
        let pending: Vec<_> = handlers.iter().map(|h| h(line.to_string())).collect();
        join_all(pending).await;
    }

    pub async fn emit_message(&self, message: &Message) {
        let handlers: Vec<MessageHandler> = self
            .snapshot(ClientEvent::Message)
            .into_iter()
            .filter_map(|handler| match handler {
                EventHandler::Message(h) => Some(h),
                EventHandler::Line(_) => None,
            })
            .collect();
        let pending: Vec<_> = handlers.iter().map(|h| h(message.clone())).collect();
        join_all(pending).await;
    }

    fn snapshot(&self, event: ClientEvent) -> Vec<EventHandler> {
        self.listeners
            .read()
            .get(&event)
            .map(|list| list.iter().map(|(_, handler)| handler.clone()).collect())
            .unwrap_or_default()
    }
}
