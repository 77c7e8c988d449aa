//! Outward interface of the pipeline.
//!
//! A UI layer (or the CLI) implements [`UploadObserver`] to render notices,
//! per-file progress and the aggregate batch outcome. Every method has a
//! no-op default so implementors only pick what they draw.

use crate::models::{batch::BatchSummary, task::UploadTask};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// Severity of a user-facing notice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A short message for the notification area.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Info, message: message.into() }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Success, message: message.into() }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Warning, message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Error, message: message.into() }
    }
}

/// Callbacks fired by the orchestrator. Called from tokio worker threads,
/// never while pipeline locks are held.
pub trait UploadObserver: Send + Sync {
    fn on_notice(&self, _notice: &Notice) {}

    /// Percent changed for the task at `index`.
    fn on_progress(&self, _index: usize, _percent: u8) {}

    /// The task reached `completed` or `failed`.
    fn on_task_settled(&self, _task: &UploadTask) {}

    /// Every task of the batch is terminal.
    fn on_batch_settled(&self, _summary: &BatchSummary) {}

    /// Selection and form were cleared after a fully successful batch.
    fn on_reset(&self) {}
}

/// Observer that ignores everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl UploadObserver for NoopObserver {}

/// Routes pipeline events to `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl UploadObserver for TracingObserver {
    fn on_notice(&self, notice: &Notice) {
        match notice.level {
            NoticeLevel::Info | NoticeLevel::Success => info!("{}", notice.message),
            NoticeLevel::Warning => warn!("{}", notice.message),
            NoticeLevel::Error => error!("{}", notice.message),
        }
    }

    fn on_progress(&self, index: usize, percent: u8) {
        debug!(index, percent, "upload progress");
    }

    fn on_batch_settled(&self, summary: &BatchSummary) {
        info!(
            batch_id = %summary.batch_id,
            uploaded = summary.uploaded.len(),
            failed = summary.failed.len(),
            "batch settled"
        );
    }

    fn on_reset(&self) {
        debug!("upload form reset");
    }
}
