use thiserror::Error;

use crate::bootable::BootableState;

/// Crate-wide result type.
pub type Result<T, E = BotError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum BotError {
    #[error("cannot {action} {entity} while it is in state '{from}'")]
    InvalidTransition {
        entity: String,
        action: &'static str,
        from: BootableState,
    },

    #[error("{entity} failed to boot: {source}")]
    BootFailed {
        entity: String,
        #[source]
        source: Box<BotError>,
    },

    #[error("{entity} failed to tear down: {source}")]
    TeardownFailed {
        entity: String,
        #[source]
        source: Box<BotError>,
    },

    #[error("unknown event '{0}' (expected 'line' or 'message')")]
    UnknownEvent(String),

    #[error("a '{expected}' listener cannot be attached to the '{event}' event")]
    ListenerMismatch { event: String, expected: String },

    #[error("platform client '{0}' is not registered")]
    UnregisteredClient(String),

    #[error("platform client '{0}' is already booted")]
    AlreadyBooted(String),

    #[error("no credentials configured for platform client '{0}'")]
    MissingCredentials(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("not connected")]
    NotConnected,

    #[error("channel '{0}' is not joined")]
    NotJoined(String),

    #[error("channel '{0}' has outlived its platform client")]
    PlatformGone(String),

    #[error("command '{command}' failed: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl BotError {
    /// True for the lifecycle failures that leave an instance in `error`.
    pub fn is_lifecycle_failure(&self) -> bool {
        matches!(
            self,
            BotError::BootFailed { .. } | BotError::TeardownFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_transition_message_names_state() {
        let err = BotError::InvalidTransition {
            entity: "command 'ping'".to_string(),
            action: "boot",
            from: BootableState::Initialized,
        };
        assert_eq!(
            err.to_string(),
            "cannot boot command 'ping' while it is in state 'initialized'"
        );
        assert!(!err.is_lifecycle_failure());
    }

    #[test]
    fn boot_failure_keeps_source() {
        let err = BotError::BootFailed {
            entity: "loopback client".to_string(),
            source: Box::new(BotError::Connection("refused".to_string())),
        };
        assert!(err.is_lifecycle_failure());
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("connection error: refused"));
    }
}
