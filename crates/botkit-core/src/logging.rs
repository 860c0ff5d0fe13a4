//! Interaction logger for command dispatch.
//!
//! Every trigger-prefixed message the dispatch layer sees becomes one JSON
//! record, emitted under the `bot_interaction` tracing target and, when a
//! path is configured, appended to a JSON-lines file.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::types::{InteractionAction, InteractionLog};

pub const INTERACTION_TARGET: &str = "bot_interaction";

pub struct InteractionLogger {
    log_path: Option<PathBuf>,
    // Opened on first write; the lock keeps concurrent records whole.
    sink: Mutex<Option<File>>,
    recorded: AtomicU64,
}

impl InteractionLogger {
    /// `None` keeps records in tracing output only.
    pub fn new(log_path: Option<PathBuf>) -> Self {
        Self {
            log_path,
            sink: Mutex::new(None),
            recorded: AtomicU64::new(0),
        }
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    pub async fn log(&self, entry: &InteractionLog) {
        let record = match serde_json::to_string(entry) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(command = %entry.command, error = %e, "Interaction record not serializable");
                return;
            }
        };
        tracing::info!(target: INTERACTION_TARGET, "{}", record);
        self.recorded.fetch_add(1, Ordering::Relaxed);

        let Some(path) = self.log_path.as_deref() else {
            return;
        };
        if let Err(e) = self.append(path, &record).await {
            tracing::warn!(path = %path.display(), error = %e, "Failed to append interaction record");
        }
    }

    /// Build a record for one dispatch decision.
    #[allow(clippy::too_many_arguments)]
    pub fn command_entry(
        platform: &str,
        channel: &str,
        sender: &str,
        command: &str,
        action: InteractionAction,
        success: bool,
        duration_ms: Option<u64>,
        error: Option<String>,
    ) -> InteractionLog {
        InteractionLog {
            ts: Utc::now(),
            platform: platform.into(),
            channel: channel.into(),
            sender: sender.into(),
            command: command.into(),
            action,
            success,
            duration_ms,
            error,
        }
    }

    /// Records logged so far, whether or not the file append succeeded.
    pub fn interaction_count(&self) -> u64 {
        self.recorded.load(Ordering::Relaxed)
    }

    async fn append(&self, path: &Path, record: &str) -> std::io::Result<()> {
        let mut sink = self.sink.lock().await;
        if sink.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await?;
            *sink = Some(file);
        }
        let Some(file) = sink.as_mut() else {
            return Ok(());
        };

        let mut line = String::with_capacity(record.len() + 1);
        line.push_str(record);
        line.push('\n');
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}

impl Default for InteractionLogger {
    fn default() -> Self {
        Self::new(None)
    }
}
