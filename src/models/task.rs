//! Represents one file's upload attempt within a batch.

use crate::models::{file::SelectedFile, response::FileInfo};
use serde::Serialize;

/// Lifecycle of an [`UploadTask`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Uploading,
    Completed,
    Failed,
}

impl TaskStatus {
    /// `Completed` and `Failed` accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// Tracked state of one upload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UploadTask {
    /// Position in the batch; the only stable correlator for UI updates.
    pub index: usize,

    /// Originating file name.
    pub filename: String,

    /// Size in bytes of the originating file.
    pub size: u64,

    pub status: TaskStatus,

    /// 0–100.
    pub percent: u8,

    /// Failure reason, set only when `status` is `Failed`.
    pub error: Option<String>,

    /// Server-assigned study identifier, set only when `status` is `Completed`.
    pub study_id: Option<String>,

    /// File name the server stored the upload under, when it echoes one.
    pub stored_as: Option<String>,

    /// Modality and format detected by the server.
    pub modality: Option<String>,
    pub format: Option<String>,
}

impl UploadTask {
    pub fn pending(index: usize, file: &SelectedFile) -> Self {
        Self {
            index,
            filename: file.name.clone(),
            size: file.size,
            status: TaskStatus::Pending,
            percent: 0,
            error: None,
            study_id: None,
            stored_as: None,
            modality: None,
            format: None,
        }
    }

    /// Apply a progress sample. Returns the new percent when the visible state
    /// changed; terminal tasks and regressions are ignored.
    pub fn record_progress(&mut self, percent: u8) -> Option<u8> {
        if self.status.is_terminal() {
            return None;
        }
        let percent = percent.min(100);
        let started = self.status == TaskStatus::Pending;
        self.status = TaskStatus::Uploading;
        if percent > self.percent {
            self.percent = percent;
            Some(percent)
        } else if started {
            Some(self.percent)
        } else {
            None
        }
    }

    /// Returns `false` if the task had already settled.
    pub fn complete(&mut self, study_id: String, info: FileInfo) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = TaskStatus::Completed;
        self.percent = 100;
        self.study_id = Some(study_id);
        self.stored_as = info.filename;
        self.modality = info.modality;
        self.format = info.format;
        true
    }

    /// Returns `false` if the task had already settled.
    pub fn fail(&mut self, reason: String) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = TaskStatus::Failed;
        self.percent = 0;
        self.error = Some(reason);
        true
    }
}
