//! Core data models of the upload pipeline.
//!
//! Files picked by the user, the per-file upload tasks created from them, the
//! batch they are submitted in, and the JSON payload returned by the upload
//! endpoint.

pub mod batch;
pub mod file;
pub mod response;
pub mod task;
