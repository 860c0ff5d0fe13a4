use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::channel::Channel;

/// An inbound message, immutable once received.
#[derive(Clone)]
pub struct Message {
    id: Uuid,
    content: String,
    sender_name: String,
    mentioned_users: Vec<String>,
    channel: Arc<Channel>,
    received_at: DateTime<Utc>,
}

impl Message {
    /// Build a message, extracting `@user` mentions from the content.
    pub fn new(
        channel: Arc<Channel>,
        sender_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let content = content.into();
        let mentioned_users = extract_mentions(&content);
        Self::with_mentions(channel, sender_name, content, mentioned_users)
    }

    /// Build a message whose mentions were resolved by the platform.
    pub fn with_mentions(
        channel: Arc<Channel>,
        sender_name: impl Into<String>,
        content: impl Into<String>,
        mentioned_users: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            sender_name: sender_name.into(),
            mentioned_users,
            channel,
            received_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn sender_name(&self) -> &str {
        &self.sender_name
    }

    /// Mentioned users in order of appearance. Not deduplicated.
    pub fn mentioned_users(&self) -> &[String] {
        &self.mentioned_users
    }

    pub fn channel(&self) -> &Arc<Channel> {
        &self.channel
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Everything after the first whitespace-separated token, trimmed.
    pub fn arguments(&self) -> &str {
        let trimmed = self.content.trim_start();
        match trimmed.find(char::is_whitespace) {
            Some(idx) => trimmed[idx..].trim(),
            None => "",
        }
    }

    /// Copy of this message with different content; identity, sender,
    /// mentions and channel are kept.
    pub(crate) fn with_content(&self, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..self.clone()
        }
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Message")
            .field("id", &self.id)
            .field("channel", &self.channel.name())
            .field("sender_name", &self.sender_name)
            .field("content", &self.content)
            .field("mentioned_users", &self.mentioned_users)
            .finish()
    }
}

/// `@name` tokens in order of appearance, trailing punctuation stripped.
pub fn extract_mentions(content: &str) -> Vec<String> {
    content
        .split_whitespace()
        .filter_map(|token| token.strip_prefix('@'))
        .map(|name| name.trim_end_matches(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-')))
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mentions_in_order() {
        assert_eq!(extract_mentions("!help @bob"), vec!["bob"]);
        assert_eq!(
            extract_mentions("@carol, ping @dave-ops and @carol!"),
            vec!["carol", "dave-ops", "carol"]
        );
    }

    #[test]
    fn lone_at_sign_is_not_a_mention() {
        assert!(extract_mentions("meet @ noon").is_empty());
        assert!(extract_mentions("mail me at bob@example.com").is_empty());
    }
}
