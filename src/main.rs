use anyhow::{Context, Result};
use scan_upload::{
    HttpTransport, SelectedFile, UploadConfig, UploadOrchestrator,
    services::{
        events::JsonLinesObserver,
        observer::{TracingObserver, UploadObserver},
    },
};
use std::{process::ExitCode, sync::Arc};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // --- Logging setup ---
    // stdout is reserved for `--json` events.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // --- Parse config + invocation ---
    let (cfg, invocation) = UploadConfig::from_env_and_args()?;
    tracing::debug!("Starting scan-upload with config: {:?}", cfg);

    let transport = HttpTransport::new(&cfg).context("building HTTP client")?;
    tracing::info!("Uploading to {}", transport.url());

    let observer: Arc<dyn UploadObserver> = if invocation.json {
        Arc::new(JsonLinesObserver)
    } else {
        Arc::new(TracingObserver)
    };
    let orchestrator = UploadOrchestrator::new(cfg, Arc::new(transport), observer);

    // --- Build the selection ---
    let mut candidates = Vec::with_capacity(invocation.files.len());
    for path in &invocation.files {
        match SelectedFile::from_path(path).await {
            Ok(file) => {
                tracing::debug!(
                    "Selected {} ({}, {} bytes)",
                    file.name,
                    file.kind().label(),
                    file.size
                );
                candidates.push(file);
            }
            Err(err) => tracing::warn!("Skipping {}: {}", path.display(), err),
        }
    }
    orchestrator.add_files(candidates)?;
    orchestrator.set_form(invocation.form);

    // --- Run the batch ---
    let summary = orchestrator.start().await.context("upload did not start")?;

    if !invocation.json {
        for study in &summary.uploaded {
            let detected: Vec<&str> = [study.modality.as_deref(), study.format.as_deref()]
                .into_iter()
                .flatten()
                .collect();
            if detected.is_empty() {
                println!("OK    {}  study {}", study.filename, study.study_id);
            } else {
                println!(
                    "OK    {}  study {}  ({})",
                    study.filename,
                    study.study_id,
                    detected.join(", ")
                );
            }
        }
        for failure in &summary.failed {
            println!("FAIL  {}  {}", failure.filename, failure.reason);
        }
    }

    Ok(if summary.all_succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
