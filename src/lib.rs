//! Client-side pipeline for uploading medical image files (DICOM, NIfTI) to
//! a viewer's `/api/upload` endpoint.
//!
//! Files are validated as they enter a selection, then submitted as one batch
//! sharing a patient id, study id and description. Each file is uploaded by
//! its own task; progress and outcomes are reported through an
//! [`UploadObserver`](services::observer::UploadObserver).

pub mod config;
pub mod errors;
pub mod models;
pub mod services;

pub use config::UploadConfig;
pub use models::{
    batch::{BatchForm, BatchSummary},
    file::SelectedFile,
};
pub use services::{
    orchestrator::UploadOrchestrator,
    transport::{HttpTransport, UploadTransport},
};
