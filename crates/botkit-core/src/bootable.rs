//! Two-phase lifecycle shared by bots, platform clients and commands.
//!
//! Construction is cheap and synchronous. `boot()` fetches whatever the
//! entity needs, `teardown()` releases it. [`Lifecycle`] holds the observable
//! state and enforces the transition table, so implementations only supply
//! the work done inside each phase.

use std::future::Future;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{BotError, Result};

/// Observable lifecycle state of a [`Bootable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootableState {
    Uninitialized,
    Boot,
    Initialized,
    Teardown,
    Destructed,
    Error,
}

impl BootableState {
    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: BootableState) -> bool {
        use BootableState::*;
        matches!(
            (self, next),
            (Uninitialized, Boot)
                | (Boot, Initialized)
                | (Boot, Error)
                | (Initialized, Teardown)
                | (Teardown, Destructed)
                | (Teardown, Error)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BootableState::Destructed | BootableState::Error)
    }

    /// `boot` and `teardown` are the in-flight states.
    pub fn is_transitioning(self) -> bool {
        matches!(self, BootableState::Boot | BootableState::Teardown)
    }
}

impl std::fmt::Display for BootableState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BootableState::Uninitialized => "uninitialized",
            BootableState::Boot => "boot",
            BootableState::Initialized => "initialized",
            BootableState::Teardown => "teardown",
            BootableState::Destructed => "destructed",
            BootableState::Error => "error",
        };
        f.write_str(name)
    }
}

/// An entity with an asynchronous boot/teardown lifecycle.
///
/// `boot()` is only valid from `uninitialized`, `teardown()` only from
/// `initialized` (or `error`, where it is accepted and does nothing). Any
/// other call fails with [`BotError::InvalidTransition`] and leaves the state
/// untouched.
#[async_trait]
pub trait Bootable: Send + Sync {
    async fn boot(&self) -> Result<()>;

    fn state(&self) -> BootableState;

    async fn teardown(&self) -> Result<()>;
}

/// Per-instance lifecycle state holder.
///
/// The check-and-set on entry into `boot`/`teardown` happens under one lock,
/// so at most one boot and one teardown can ever be in flight.
pub struct Lifecycle {
    entity: String,
    state: Mutex<BootableState>,
}

impl Lifecycle {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            state: Mutex::new(BootableState::Uninitialized),
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn state(&self) -> BootableState {
        *self.state.lock()
    }

    /// Run `work` as the boot phase.
    pub async fn boot<F>(&self, work: F) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        self.enter("boot", BootableState::Boot)?;
        let in_flight = InFlight::arm(self, "boot");
        tracing::debug!(entity = %self.entity, "Booting");

        let outcome = work.await;
        in_flight.disarm();
        match outcome {
            Ok(()) => {
                self.finish(BootableState::Initialized);
                tracing::info!(entity = %self.entity, "Booted");
                Ok(())
            }
            Err(e) => {
                self.finish(BootableState::Error);
                tracing::error!(entity = %self.entity, error = %e, "Boot failed");
                Err(BotError::BootFailed {
                    entity: self.entity.clone(),
                    source: Box::new(e),
                })
            }
        }
    }

    /// Run `work` as the teardown phase.
    ///
    /// From `error` this is a successful no-op: the instance is already
    /// terminal and the caller is discarding it.
    pub async fn teardown<F>(&self, work: F) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        {
            let state = self.state.lock();
            if *state == BootableState::Error {
                tracing::debug!(entity = %self.entity, "Teardown of failed instance skipped");
                return Ok(());
            }
        }
        self.enter("teardown", BootableState::Teardown)?;
        let in_flight = InFlight::arm(self, "teardown");
        tracing::debug!(entity = %self.entity, "Tearing down");

        let outcome = work.await;
        in_flight.disarm();
        match outcome {
            Ok(()) => {
                self.finish(BootableState::Destructed);
                tracing::info!(entity = %self.entity, "Torn down");
                Ok(())
            }
            Err(e) => {
                self.finish(BootableState::Error);
                tracing::error!(entity = %self.entity, error = %e, "Teardown failed");
                Err(BotError::TeardownFailed {
                    entity: self.entity.clone(),
                    source: Box::new(e),
                })
            }
        }
    }

    fn enter(&self, action: &'static str, next: BootableState) -> Result<()> {
        let mut state = self.state.lock();
        let from = *state;
        if !from.can_transition_to(next) {
            tracing::warn!(
                entity = %self.entity,
                from = %from,
                action,
                "Rejected lifecycle transition"
            );
            return Err(BotError::InvalidTransition {
                entity: self.entity.clone(),
                action,
                from,
            });
        }
        *state = next;
        Ok(())
    }

    fn finish(&self, next: BootableState) {
        let mut state = self.state.lock();
        debug_assert!(state.can_transition_to(next));
        *state = next;
    }
}

/// Moves the lifecycle to `error` if a boot or teardown future is dropped
/// before its work completes.
struct InFlight<'a> {
    lifecycle: &'a Lifecycle,
    action: &'static str,
    armed: bool,
}

impl<'a> InFlight<'a> {
    fn arm(lifecycle: &'a Lifecycle, action: &'static str) -> Self {
        Self {
            lifecycle,
            action,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        *self.lifecycle.state.lock() = BootableState::Error;
        tracing::warn!(
            entity = %self.lifecycle.entity,
            action = self.action,
            "Lifecycle call abandoned before completion"
        );
    }
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("entity", &self.entity)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Notify;

    #[test]
    fn transition_table() {
        use BootableState::*;
        assert!(Uninitialized.can_transition_to(Boot));
        assert!(Boot.can_transition_to(Initialized));
        assert!(Boot.can_transition_to(Error));
        assert!(Initialized.can_transition_to(Teardown));
        assert!(Teardown.can_transition_to(Destructed));

        assert!(!Uninitialized.can_transition_to(Teardown));
        assert!(!Initialized.can_transition_to(Boot));
        assert!(!Destructed.can_transition_to(Boot));
        for next in [Uninitialized, Boot, Initialized, Teardown, Destructed, Error] {
            assert!(!Error.can_transition_to(next));
        }
    }

    #[test]
    fn state_display_and_serde() {
        assert_eq!(BootableState::Uninitialized.to_string(), "uninitialized");
        let json = serde_json::to_string(&BootableState::Destructed).unwrap();
        assert_eq!(json, "\"destructed\"");
    }

    #[tokio::test]
    async fn full_lifecycle() {
        let lifecycle = Lifecycle::new("test");
        assert_eq!(lifecycle.state(), BootableState::Uninitialized);

        lifecycle.boot(async { Ok(()) }).await.unwrap();
        assert_eq!(lifecycle.state(), BootableState::Initialized);

        lifecycle.teardown(async { Ok(()) }).await.unwrap();
        assert_eq!(lifecycle.state(), BootableState::Destructed);
    }

    #[tokio::test]
    async fn failed_boot_is_terminal() {
        let lifecycle = Lifecycle::new("test");
        let err = lifecycle
            .boot(async { Err(BotError::Internal("no deps".to_string())) })
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::BootFailed { .. }));
        assert_eq!(lifecycle.state(), BootableState::Error);

        let err = lifecycle.boot(async { Ok(()) }).await.unwrap_err();
        assert!(matches!(
            err,
            BotError::InvalidTransition {
                from: BootableState::Error,
                ..
            }
        ));

        // Accepted, but the state stays terminal.
        lifecycle.teardown(async { Ok(()) }).await.unwrap();
        assert_eq!(lifecycle.state(), BootableState::Error);
    }

    #[tokio::test]
    async fn failed_teardown_lands_in_error() {
        let lifecycle = Lifecycle::new("test");
        lifecycle.boot(async { Ok(()) }).await.unwrap();
        let err = lifecycle
            .teardown(async { Err(BotError::Connection("reset".to_string())) })
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::TeardownFailed { .. }));
        assert_eq!(lifecycle.state(), BootableState::Error);
    }

    #[tokio::test]
    async fn invalid_calls_leave_state_unchanged() {
        let lifecycle = Lifecycle::new("test");
        assert!(lifecycle.teardown(async { Ok(()) }).await.is_err());
        assert_eq!(lifecycle.state(), BootableState::Uninitialized);

        lifecycle.boot(async { Ok(()) }).await.unwrap();
        assert!(lifecycle.boot(async { Ok(()) }).await.is_err());
        assert_eq!(lifecycle.state(), BootableState::Initialized);

        lifecycle.teardown(async { Ok(()) }).await.unwrap();
        assert!(lifecycle.teardown(async { Ok(()) }).await.is_err());
        assert!(lifecycle.boot(async { Ok(()) }).await.is_err());
        assert_eq!(lifecycle.state(), BootableState::Destructed);
    }

    #[tokio::test]
    async fn abandoned_boot_lands_in_error() {
        let lifecycle = Lifecycle::new("test");
        let pending = lifecycle.boot(async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        });
        let timed_out = tokio::time::timeout(Duration::from_millis(10), pending).await;
        assert!(timed_out.is_err());
        assert_eq!(lifecycle.state(), BootableState::Error);

        // Terminal, but still discardable through teardown.
        assert!(lifecycle.boot(async { Ok(()) }).await.is_err());
        lifecycle.teardown(async { Ok(()) }).await.unwrap();
        assert_eq!(lifecycle.state(), BootableState::Error);
    }

    #[tokio::test]
    async fn abandoned_teardown_lands_in_error() {
        let lifecycle = Lifecycle::new("test");
        lifecycle.boot(async { Ok(()) }).await.unwrap();
        let pending = lifecycle.teardown(std::future::pending::<Result<()>>());
        let timed_out = tokio::time::timeout(Duration::from_millis(10), pending).await;
        assert!(timed_out.is_err());
        assert_eq!(lifecycle.state(), BootableState::Error);
    }

    #[tokio::test]
    async fn concurrent_boot_runs_work_once() {
        let lifecycle = Arc::new(Lifecycle::new("test"));
        let runs = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(Notify::new());

        let first = {
            let lifecycle = lifecycle.clone();
            let runs = runs.clone();
            let release = release.clone();
            tokio::spawn(async move {
                lifecycle
                    .boot(async {
                        runs.fetch_add(1, Ordering::SeqCst);
                        release.notified().await;
                        Ok(())
                    })
                    .await
            })
        };

        while lifecycle.state() != BootableState::Boot {
            tokio::task::yield_now().await;
        }

        let second = lifecycle
            .boot(async {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert!(matches!(
            second,
            Err(BotError::InvalidTransition {
                from: BootableState::Boot,
                ..
            })
        ));

        release.notify_one();
        first.await.unwrap().unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(lifecycle.state(), BootableState::Initialized);
    }
}
