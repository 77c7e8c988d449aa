//! Transport seam between the orchestrator and the upload endpoint.
//!
//! [`HttpTransport`] streams each file as the `file` part of a
//! `multipart/form-data` POST, reporting progress as chunks are handed to the
//! HTTP client. [`interpret_response`] turns the raw status and body into a
//! task outcome and is shared by every transport.

use crate::{
    config::UploadConfig,
    errors::TaskError,
    models::{
        batch::BatchMetadata,
        file::{FileSource, SelectedFile},
        response::{FileInfo, UploadResponse},
    },
    services::progress::ProgressReporter,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{
    Stream, StreamExt,
    stream::{self, BoxStream},
};
use reqwest::{
    Body, Client, StatusCode,
    multipart::{Form, Part},
};
use std::{
    io,
    sync::{Arc, Mutex, PoisonError},
};
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::debug;

/// Chunk size used when streaming in-memory content.
const MEMORY_CHUNK_SIZE: usize = 64 * 1024;

/// One file of a batch, ready to send.
#[derive(Clone, Debug)]
pub struct UploadRequest {
    pub index: usize,
    pub file: SelectedFile,
    pub metadata: Arc<BatchMetadata>,
}

/// Raw HTTP answer, before interpretation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// What a successful upload yields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AcceptedUpload {
    pub study_id: String,
    /// Stored name, modality and format as echoed by the server.
    pub info: FileInfo,
}

/// Sends one file to the upload endpoint.
///
/// Implementations return `Err` only when no HTTP response was obtained;
/// status codes and bodies are judged by [`interpret_response`].
#[async_trait]
pub trait UploadTransport: Send + Sync {
    async fn send(
        &self,
        request: UploadRequest,
        progress: ProgressReporter,
    ) -> Result<TransportResponse, TaskError>;
}

/// Map a raw response onto a task outcome.
///
/// - 200 with `success: true` and a study id → accepted
/// - 200 with `success` false or missing → rejected with the payload's error
/// - 200 with an unparseable body, or a success without study id → invalid
/// - any other status → `HTTP <status>`
pub fn interpret_response(status: u16, body: &str) -> Result<AcceptedUpload, TaskError> {
    if status != StatusCode::OK.as_u16() {
        return Err(TaskError::Http(status));
    }

    let payload: UploadResponse =
        serde_json::from_str(body).map_err(|_| TaskError::InvalidResponse)?;

    if !payload.success {
        return Err(TaskError::Rejected(
            payload.error.unwrap_or_else(|| "Unknown error".into()),
        ));
    }

    let study_id = payload.study_id.ok_or(TaskError::InvalidResponse)?;
    Ok(AcceptedUpload {
        study_id: study_id.to_string(),
        info: payload.file_info.unwrap_or_default(),
    })
}

/// reqwest-backed transport posting to `{server_url}/api/upload`.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
    url: String,
}

impl HttpTransport {
    pub fn new(cfg: &UploadConfig) -> reqwest::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("scan-upload/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(client, cfg.upload_url()))
    }

    pub fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Open the content of `file`. A disk file whose size no longer matches
    /// the selected size is refused, as the declared part length would lie.
    async fn open(file: &SelectedFile) -> Result<BoxStream<'static, io::Result<Bytes>>, TaskError> {
        match &file.source {
            FileSource::Disk(path) => {
                let handle = File::open(path).await.map_err(unreadable)?;
                let len = handle.metadata().await.map_err(unreadable)?.len();
                if len != file.size {
                    return Err(TaskError::Unreadable(format!(
                        "size changed since selection (expected {} bytes, found {})",
                        file.size, len
                    )));
                }
                Ok(ReaderStream::new(handle).boxed())
            }
            FileSource::Memory(content) => Ok(memory_chunks(content.clone()).boxed()),
        }
    }
}

#[async_trait]
impl UploadTransport for HttpTransport {
    async fn send(
        &self,
        request: UploadRequest,
        progress: ProgressReporter,
    ) -> Result<TransportResponse, TaskError> {
        let UploadRequest {
            index,
            file,
            metadata,
        } = request;

        let total = file.size;
        let fault = BodyFault::default();
        let content = track_progress(Self::open(&file).await?, progress, total, fault.clone());
        let part = Part::stream_with_length(Body::wrap_stream(content), total)
            .file_name(file.name.clone());
        let form = Form::new()
            .part("file", part)
            .text("patient_id", metadata.patient_id.clone())
            .text("study_id", metadata.study_id.clone())
            .text("description", metadata.description.clone());

        debug!(index, file = %file.name, url = %self.url, "sending upload");
        let response = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .map_err(|err| match fault.take() {
                Some(reason) => TaskError::Unreadable(reason),
                None => network_error(err),
            })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(network_error)?;
        Ok(TransportResponse { status, body })
    }
}

fn network_error(err: reqwest::Error) -> TaskError {
    TaskError::Network {
        detail: err.to_string(),
    }
}

fn unreadable(err: io::Error) -> TaskError {
    TaskError::Unreadable(err.to_string())
}

/// First failure raised by a request body stream, so a send error caused by
/// the source is not mistaken for a network error.
#[derive(Clone, Debug, Default)]
struct BodyFault(Arc<Mutex<Option<String>>>);

impl BodyFault {
    fn record(&self, reason: String) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_insert(reason);
    }

    fn take(&self) -> Option<String> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

/// Report cumulative bytes as each chunk passes through. Read errors and
/// content beyond `total` end the body and are recorded in `fault`.
fn track_progress<S>(
    content: S,
    progress: ProgressReporter,
    total: u64,
    fault: BodyFault,
) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static
where
    S: Stream<Item = io::Result<Bytes>> + Send + 'static,
{
    let mut sent = 0u64;
    content.map(move |chunk| {
        let chunk = chunk.inspect_err(|err| fault.record(err.to_string()))?;
        sent += chunk.len() as u64;
        if sent > total {
            let err = io::Error::new(
                io::ErrorKind::InvalidData,
                format!("file grew beyond the {} bytes selected", total),
            );
            fault.record(err.to_string());
            return Err(err);
        }
        progress.report(sent, total);
        Ok(chunk)
    })
}

fn memory_chunks(content: Bytes) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
    let len = content.len();
    let chunks: Vec<io::Result<Bytes>> = (0..len)
        .step_by(MEMORY_CHUNK_SIZE)
        .map(|start| Ok(content.slice(start..(start + MEMORY_CHUNK_SIZE).min(len))))
        .collect();
    stream::iter(chunks)
}
