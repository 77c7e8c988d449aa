//! Batch-level metadata and outcome.

use crate::{errors::PatientIdError, services::validator::validate_patient_id};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Form fields as typed by the user, before validation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchForm {
    pub patient_id: String,
    pub study_id: String,
    pub description: String,
}

impl BatchForm {
    pub fn new(patient_id: impl Into<String>) -> Self {
        Self {
            patient_id: patient_id.into(),
            ..Self::default()
        }
    }

    pub fn with_study_id(mut self, study_id: impl Into<String>) -> Self {
        self.study_id = study_id.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Validate the patient id and trim every field.
    pub fn validate(&self) -> Result<BatchMetadata, PatientIdError> {
        Ok(BatchMetadata {
            patient_id: validate_patient_id(&self.patient_id)?,
            study_id: self.study_id.trim().to_string(),
            description: self.description.trim().to_string(),
        })
    }
}

/// Validated metadata sent identically with every file of a batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BatchMetadata {
    pub patient_id: String,
    pub study_id: String,
    pub description: String,
}

/// A successfully stored file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UploadedStudy {
    pub index: usize,
    /// Originating file name.
    pub filename: String,
    /// Name the server stored it under, if echoed back.
    pub stored_as: Option<String>,
    pub study_id: String,
    pub modality: Option<String>,
    pub format: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FailedUpload {
    pub index: usize,
    pub filename: String,
    pub reason: String,
}

/// Aggregate outcome of a settled batch. Rows are in submission order.
#[derive(Clone, Debug, Serialize)]
pub struct BatchSummary {
    pub batch_id: Uuid,
    pub total: usize,
    pub uploaded: Vec<UploadedStudy>,
    pub failed: Vec<FailedUpload>,
    /// Whether the selection and form will be cleared after the reset delay.
    pub auto_reset: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchSummary {
    pub fn all_succeeded(&self) -> bool {
        self.uploaded.len() == self.total
    }
}
