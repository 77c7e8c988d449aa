//! Per-batch task table and progress accounting.
//!
//! Every upload of a batch writes into the same [`TaskBoard`], keyed by the
//! task index. The lock is only held to mutate one row; observer callbacks
//! run after it is released.

use crate::{
    errors::TaskError,
    models::{
        file::SelectedFile,
        task::{TaskStatus, UploadTask},
    },
    services::{observer::UploadObserver, transport::AcceptedUpload},
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

/// Rounded percentage of `sent` over `total`; `None` when the total is
/// unknown (zero).
pub fn percent_of(sent: u64, total: u64) -> Option<u8> {
    if total == 0 {
        return None;
    }
    let percent = (sent as f64 / total as f64 * 100.0).round();
    Some(percent.clamp(0.0, 100.0) as u8)
}

pub struct TaskBoard {
    tasks: Mutex<Vec<UploadTask>>,
    observer: Arc<dyn UploadObserver>,
}

impl TaskBoard {
    /// One pending task per file, indexed by position.
    pub fn new(files: &[SelectedFile], observer: Arc<dyn UploadObserver>) -> Arc<Self> {
        let tasks = files
            .iter()
            .enumerate()
            .map(|(index, file)| UploadTask::pending(index, file))
            .collect();
        Arc::new(Self {
            tasks: Mutex::new(tasks),
            observer,
        })
    }

    pub fn reporter(self: &Arc<Self>, index: usize) -> ProgressReporter {
        ProgressReporter {
            index,
            board: Arc::clone(self),
        }
    }

    /// Record bytes sent for one task. Ignored once the task is terminal.
    pub fn record_progress(&self, index: usize, sent: u64, total: u64) {
        let Some(percent) = percent_of(sent, total) else {
            return;
        };
        let changed = self
            .lock()
            .get_mut(index)
            .and_then(|task| task.record_progress(percent));
        if let Some(percent) = changed {
            self.observer.on_progress(index, percent);
        }
    }

    /// Move a task to its terminal state. Returns the settled task, or `None`
    /// if it had already settled.
    pub fn settle(
        &self,
        index: usize,
        outcome: Result<AcceptedUpload, TaskError>,
    ) -> Option<UploadTask> {
        let settled = {
            let mut tasks = self.lock();
            let task = tasks.get_mut(index)?;
            let changed = match &outcome {
                Ok(accepted) => {
                    task.complete(accepted.study_id.clone(), accepted.info.clone())
                }
                Err(err) => task.fail(err.to_string()),
            };
            changed.then(|| task.clone())
        }?;

        match (&settled.status, &outcome) {
            (TaskStatus::Completed, _) => info!(
                index,
                file = %settled.filename,
                study_id = settled.study_id.as_deref().unwrap_or_default(),
                "upload completed"
            ),
            (_, Err(TaskError::Network { detail })) => warn!(
                index,
                file = %settled.filename,
                detail = %detail,
                "upload failed: network error"
            ),
            _ => warn!(
                index,
                file = %settled.filename,
                reason = settled.error.as_deref().unwrap_or_default(),
                "upload failed"
            ),
        }

        self.observer.on_task_settled(&settled);
        Some(settled)
    }

    pub fn snapshot(&self) -> Vec<UploadTask> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<UploadTask>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handed to the transport for one task; converts byte counts into percent
/// updates on the board.
#[derive(Clone)]
pub struct ProgressReporter {
    index: usize,
    board: Arc<TaskBoard>,
}

impl ProgressReporter {
    pub fn report(&self, sent: u64, total: u64) {
        self.board.record_progress(self.index, sent, total);
    }
}
