//! File and patient-id validation.
//!
//! Both checks are pure: they look only at file metadata, the input string and
//! the configured limits.

use crate::{
    config::UploadConfig,
    errors::{PatientIdError, ValidationError},
    models::file::SelectedFile,
};

const PATIENT_ID_MAX_LEN: usize = 64;
const PATIENT_ID_FORBIDDEN: [char; 8] = ['<', '>', '"', '\'', '&', '\n', '\r', '\t'];
const SIZE_UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

/// Decides whether a candidate file may enter the selection.
#[derive(Clone, Debug)]
pub struct FileValidator {
    max_file_size: u64,
    allowed_extensions: Vec<String>,
}

impl FileValidator {
    pub fn new(max_file_size: u64, allowed_extensions: Vec<String>) -> Self {
        Self {
            max_file_size,
            allowed_extensions: allowed_extensions
                .into_iter()
                .map(|ext| ext.to_lowercase())
                .collect(),
        }
    }

    pub fn from_config(cfg: &UploadConfig) -> Self {
        Self::new(cfg.max_file_size, cfg.allowed_extensions.clone())
    }

    /// Size limit first, then extension, then emptiness.
    pub fn validate(&self, file: &SelectedFile) -> Result<(), ValidationError> {
        if file.size > self.max_file_size {
            return Err(ValidationError::TooLarge {
                size: file.size,
                max: self.max_file_size,
            });
        }

        if !self.has_allowed_extension(&file.name) {
            return Err(ValidationError::InvalidType {
                allowed: self.allowed_extensions.clone(),
            });
        }

        if file.size == 0 {
            return Err(ValidationError::Empty);
        }

        Ok(())
    }

    /// Case-insensitive suffix match; `.nii.gz` only matches as a whole.
    fn has_allowed_extension(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        self.allowed_extensions
            .iter()
            .any(|ext| lower.ends_with(ext.as_str()))
    }
}

impl Default for FileValidator {
    fn default() -> Self {
        Self::from_config(&UploadConfig::default())
    }
}

/// Human-readable base-1024 size, two decimals at most, capped at GB.
///
/// `0` → `"0 B"`, `1536` → `"1.5 KB"`, `524288000` → `"500 MB"`.
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".into();
    }

    let mut unit = 0;
    while unit + 1 < SIZE_UNITS.len() && bytes >= 1024u64.pow(unit as u32 + 1) {
        unit += 1;
    }

    // Ties round away from zero (1152 B is "1.13 KB").
    let value = bytes as f64 / 1024u64.pow(unit as u32) as f64;
    let rounded = format!("{:.2}", (value * 100.0).round() / 100.0);
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, SIZE_UNITS[unit])
}

/// Validate a patient identifier and return it trimmed.
pub fn validate_patient_id(raw: &str) -> Result<String, PatientIdError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(PatientIdError::Empty);
    }

    let len = trimmed.chars().count();
    if len > PATIENT_ID_MAX_LEN {
        return Err(PatientIdError::TooLong {
            len,
            max: PATIENT_ID_MAX_LEN,
        });
    }

    if let Some(c) = trimmed.chars().find(|c| PATIENT_ID_FORBIDDEN.contains(c)) {
        return Err(PatientIdError::ForbiddenCharacter(c));
    }

    Ok(trimmed.to_string())
}

pub fn is_valid_patient_id(raw: &str) -> bool {
    validate_patient_id(raw).is_ok()
}
