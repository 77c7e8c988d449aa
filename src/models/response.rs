//! JSON body returned by `POST /api/upload`.

use serde::Deserialize;
use std::fmt;

/// Upload endpoint payload. Every field is optional on the wire; a missing
/// `success` counts as failure.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub success: bool,

    #[serde(default)]
    pub study_id: Option<StudyId>,

    #[serde(default)]
    pub error: Option<String>,

    #[serde(default)]
    pub file_info: Option<FileInfo>,
}

/// Servers hand out either numeric database ids or opaque strings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum StudyId {
    Number(i64),
    Text(String),
}

impl fmt::Display for StudyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StudyId::Number(n) => write!(f, "{}", n),
            StudyId::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Echo of what the server stored.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct FileInfo {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub modality: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_payload() {
        let json = r#"{
            "success": true,
            "study_id": 42,
            "message": "File uploaded successfully",
            "file_info": {
                "filename": "brain.nii.gz",
                "size": 2097152,
                "modality": "MRI",
                "format": "NIFTI"
            }
        }"#;
        let resp: UploadResponse = serde_json::from_str(json).unwrap();
        assert!(resp.success);
        assert_eq!(resp.study_id.unwrap().to_string(), "42");
        let info = resp.file_info.unwrap();
        assert_eq!(info.filename.as_deref(), Some("brain.nii.gz"));
        assert_eq!(info.modality.as_deref(), Some("MRI"));
        assert_eq!(info.format.as_deref(), Some("NIFTI"));
    }

    #[test]
    fn test_error_payload_defaults_to_failure() {
        let resp: UploadResponse =
            serde_json::from_str(r#"{"error": "No file provided"}"#).unwrap();
        assert!(!resp.success);
        assert_eq!(resp.error.as_deref(), Some("No file provided"));
        assert!(resp.study_id.is_none());
    }

    #[test]
    fn test_string_study_id() {
        let resp: UploadResponse =
            serde_json::from_str(r#"{"success": true, "study_id": "ST-20240101"}"#).unwrap();
        assert_eq!(resp.study_id, Some(StudyId::Text("ST-20240101".into())));
    }
}
