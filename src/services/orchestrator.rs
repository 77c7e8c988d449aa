//! Upload orchestrator: owns the upload session and runs batches.
//!
//! A batch is the selection snapshot at `start` time plus one validated set
//! of metadata. Every file becomes its own tokio task; the batch settles only
//! when all of them are terminal, whatever their individual outcome. At most
//! one batch is in flight per orchestrator, and the selection cannot be
//! edited while it is.
//!
//! The batch itself runs in a driver task that owns the join over its
//! uploads. Dropping the `start` future detaches the caller only; the
//! in-flight flag stays claimed until every upload has settled.

use crate::{
    config::UploadConfig,
    errors::{SelectionError, SelectionResult, StartError, StartResult, TaskError},
    models::{
        batch::{BatchForm, BatchMetadata, BatchSummary, FailedUpload, UploadedStudy},
        file::SelectedFile,
        task::{TaskStatus, UploadTask},
    },
    services::{
        observer::{Notice, UploadObserver},
        progress::TaskBoard,
        selection::{AddReport, SelectionManager},
        transport::{UploadRequest, UploadTransport, interpret_response},
        validator::FileValidator,
    },
};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::{
    panic,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio::{sync::Semaphore, task::JoinHandle, time};
use tracing::{Instrument, Span, debug, info, info_span, warn};
use uuid::Uuid;

/// Mutable state edited by the user between batches.
#[derive(Debug, Default)]
struct Session {
    selection: SelectionManager,
    form: BatchForm,
    /// Bumped by every edit and every batch start. A scheduled reset only
    /// applies to the generation it was scheduled for.
    generation: u64,
}

impl Session {
    fn touch(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    /// Clear selection and form unless the session moved on since
    /// `generation`.
    fn reset_if_unchanged(&mut self, generation: u64) -> bool {
        if self.generation != generation {
            return false;
        }
        self.selection.clear();
        self.form = BatchForm::default();
        self.touch();
        true
    }
}

/// Holds the in-flight flag for one batch; clears it on drop.
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A claimed batch, ready to run.
struct Claim {
    files: Vec<SelectedFile>,
    metadata: BatchMetadata,
    generation: u64,
    guard: InFlightGuard,
}

/// Cheap to clone; clones share the same session and in-flight flag.
#[derive(Clone)]
pub struct UploadOrchestrator {
    config: Arc<UploadConfig>,
    transport: Arc<dyn UploadTransport>,
    observer: Arc<dyn UploadObserver>,
    session: Arc<Mutex<Session>>,
    in_flight: Arc<AtomicBool>,
}

impl UploadOrchestrator {
    pub fn new(
        config: UploadConfig,
        transport: Arc<dyn UploadTransport>,
        observer: Arc<dyn UploadObserver>,
    ) -> Self {
        let session = Session {
            selection: SelectionManager::new(FileValidator::from_config(&config)),
            ..Session::default()
        };
        Self {
            config: Arc::new(config),
            transport,
            observer,
            session: Arc::new(Mutex::new(session)),
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a batch is currently in flight.
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Validate and add files to the selection. Each rejected file produces
    /// one error notice; duplicates are dropped silently.
    pub fn add_files(
        &self,
        files: impl IntoIterator<Item = SelectedFile>,
    ) -> SelectionResult<AddReport> {
        let report = self.edit_session()?.selection.add(files);
        for message in report.messages() {
            self.observer.on_notice(&Notice::error(message));
        }
        debug!(
            added = report.added,
            duplicates = report.duplicates,
            rejected = report.rejected.len(),
            "selection updated"
        );
        Ok(report)
    }

    /// Remove the file at `index`. Indices of later files shift down.
    pub fn remove_file(&self, index: usize) -> SelectionResult<SelectedFile> {
        self.edit_session()?.selection.remove(index)
    }

    pub fn clear_files(&self) -> SelectionResult<()> {
        self.edit_session()?.selection.clear();
        self.observer.on_notice(&Notice::info("All files cleared"));
        Ok(())
    }

    pub fn selected_files(&self) -> Vec<SelectedFile> {
        self.lock_session().selection.snapshot()
    }

    pub fn selected_count(&self) -> usize {
        self.lock_session().selection.len()
    }

    pub fn has_selection(&self) -> bool {
        !self.lock_session().selection.is_empty()
    }

    pub fn set_form(&self, form: BatchForm) {
        let mut session = self.lock_session();
        session.touch();
        session.form = form;
    }

    pub fn form(&self) -> BatchForm {
        self.lock_session().form.clone()
    }

    /// Upload every selected file and wait until all of them settle.
    ///
    /// Precondition failures are reported once through the observer and
    /// returned without creating any task.
    pub async fn start(&self) -> StartResult<BatchSummary> {
        let claim = match self.claim_batch() {
            Ok(claim) => claim,
            Err(err) => {
                let notice = match err {
                    StartError::EmptySelection | StartError::Busy => {
                        Notice::warning(err.to_string())
                    }
                    StartError::InvalidPatientId(_) | StartError::Interrupted(_) => {
                        Notice::error(err.to_string())
                    }
                };
                self.observer.on_notice(&notice);
                return Err(err);
            }
        };

        let batch_id = Uuid::new_v4();
        info!(
            %batch_id,
            files = claim.files.len(),
            patient_id = %claim.metadata.patient_id,
            "starting upload batch"
        );

        let driver = tokio::spawn(
            self.clone()
                .drive(batch_id, claim)
                .instrument(info_span!("batch", %batch_id)),
        );
        match driver.await {
            Ok(summary) => Ok(summary),
            Err(err) if err.is_panic() => panic::resume_unwind(err.into_panic()),
            Err(err) => Err(StartError::Interrupted(err.to_string())),
        }
    }

    /// Check preconditions, then snapshot the selection and claim the
    /// in-flight flag under one session lock.
    fn claim_batch(&self) -> StartResult<Claim> {
        let mut session = self.lock_session();
        if session.selection.is_empty() {
            return Err(StartError::EmptySelection);
        }
        let metadata = session
            .form
            .validate()
            .map_err(StartError::InvalidPatientId)?;
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(StartError::Busy);
        }
        session.touch();
        Ok(Claim {
            files: session.selection.snapshot(),
            metadata,
            generation: session.generation,
            guard: InFlightGuard(self.in_flight.clone()),
        })
    }

    /// Run a claimed batch to settlement, then report it.
    async fn drive(self, batch_id: Uuid, claim: Claim) -> BatchSummary {
        let Claim {
            files,
            metadata,
            generation,
            guard,
        } = claim;
        let started_at = Utc::now();

        let tasks = self.run_batch(files, Arc::new(metadata)).await;
        drop(guard);

        let summary = summarize(batch_id, started_at, tasks);
        info!(
            uploaded = summary.uploaded.len(),
            failed = summary.failed.len(),
            "upload batch settled"
        );

        if !summary.uploaded.is_empty() {
            self.observer.on_notice(&Notice::success(format!(
                "{} files uploaded successfully",
                summary.uploaded.len()
            )));
        }
        if !summary.failed.is_empty() {
            self.observer.on_notice(&Notice::error(format!(
                "{} files failed to upload",
                summary.failed.len()
            )));
        }
        self.observer.on_batch_settled(&summary);

        if summary.auto_reset {
            self.schedule_reset(generation);
        }

        summary
    }

    async fn run_batch(
        &self,
        files: Vec<SelectedFile>,
        metadata: Arc<BatchMetadata>,
    ) -> Vec<UploadTask> {
        let board = TaskBoard::new(&files, self.observer.clone());
        let limiter = self
            .config
            .max_concurrent_uploads
            .map(|limit| Arc::new(Semaphore::new(limit.max(1))));

        let span = Span::current();
        let handles: Vec<JoinHandle<()>> = files
            .into_iter()
            .enumerate()
            .map(|(index, file)| {
                let transport = self.transport.clone();
                let board = board.clone();
                let limiter = limiter.clone();
                let timeout = self.config.task_timeout;
                let request = UploadRequest {
                    index,
                    file,
                    metadata: metadata.clone(),
                };

                tokio::spawn(
                    async move {
                        let _permit = match limiter {
                            Some(limiter) => limiter.acquire_owned().await.ok(),
                            None => None,
                        };
                        let exchange = transport.send(request, board.reporter(index));
                        let response = match timeout {
                            Some(limit) => time::timeout(limit, exchange)
                                .await
                                .unwrap_or(Err(TaskError::Timeout(limit))),
                            None => exchange.await,
                        };
                        let outcome = response
                            .and_then(|resp| interpret_response(resp.status, &resp.body));
                        board.settle(index, outcome);
                    }
                    .instrument(span.clone()),
                )
            })
            .collect();

        for (index, joined) in join_all(handles).await.into_iter().enumerate() {
            if let Err(err) = joined {
                warn!(index, "upload task aborted: {}", err);
                board.settle(index, Err(TaskError::Aborted(err.to_string())));
            }
        }

        board.snapshot()
    }

    /// Clear selection and form once the reset delay has elapsed, unless the
    /// session was edited or another batch started in the meantime.
    fn schedule_reset(&self, generation: u64) {
        let session = self.session.clone();
        let observer = self.observer.clone();
        let delay = self.config.reset_delay;
        tokio::spawn(async move {
            time::sleep(delay).await;
            let cleared = session
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .reset_if_unchanged(generation);
            if cleared {
                observer.on_reset();
            } else {
                debug!("session changed since the batch settled, skipping reset");
            }
        });
    }

    /// Lock the session for a user edit. Refused while a batch is in flight.
    fn edit_session(&self) -> SelectionResult<MutexGuard<'_, Session>> {
        let mut session = self.lock_session();
        if self.is_busy() {
            return Err(SelectionError::Busy);
        }
        session.touch();
        Ok(session)
    }

    fn lock_session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Partition settled tasks into the success list and the failure list.
fn summarize(batch_id: Uuid, started_at: DateTime<Utc>, tasks: Vec<UploadTask>) -> BatchSummary {
    let total = tasks.len();
    let mut uploaded = Vec::new();
    let mut failed = Vec::new();

    for task in tasks {
        match (task.status, task.study_id) {
            (TaskStatus::Completed, Some(study_id)) => uploaded.push(UploadedStudy {
                index: task.index,
                filename: task.filename,
                stored_as: task.stored_as,
                study_id,
                modality: task.modality,
                format: task.format,
            }),
            _ => failed.push(FailedUpload {
                index: task.index,
                filename: task.filename,
                reason: task.error.unwrap_or_else(|| "Unknown error".into()),
            }),
        }
    }

    let auto_reset = total > 0 && uploaded.len() == total;
    BatchSummary {
        batch_id,
        total,
        uploaded,
        failed,
        auto_reset,
        started_at,
        finished_at: Utc::now(),
    }
}
