//! End-to-end uploads against an in-process mock of `/api/upload`.

use axum::{
    Json, Router,
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use scan_upload::{
    BatchForm, HttpTransport, SelectedFile, UploadConfig, UploadOrchestrator,
    models::task::TaskStatus,
    services::{
        events::{EventBroadcaster, UploadEvent},
        observer::{NoopObserver, UploadObserver},
    },
};
use serde_json::json;
use std::{
    io::Write,
    sync::{Arc, Mutex},
};
use tokio::net::TcpListener;

#[derive(Clone, Debug, Default)]
struct Received {
    filename: String,
    bytes: usize,
    patient_id: String,
    study_id: String,
    description: String,
}

type Log = Arc<Mutex<Vec<Received>>>;

async fn upload(State(log): State<Log>, mut multipart: Multipart) -> Response {
    let mut received = Received::default();
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                received.filename = field.file_name().unwrap_or_default().to_string();
                received.bytes = field.bytes().await.map(|b| b.len()).unwrap_or(0);
            }
            "patient_id" => received.patient_id = field.text().await.unwrap_or_default(),
            "study_id" => received.study_id = field.text().await.unwrap_or_default(),
            "description" => received.description = field.text().await.unwrap_or_default(),
            _ => {}
        }
    }

    let filename = received.filename.clone();
    let position = {
        let mut log = log.lock().unwrap();
        log.push(received);
        log.len()
    };

    if filename.starts_with("fail") {
        (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response()
    } else if filename.starts_with("reject") {
        Json(json!({"success": false, "error": "Invalid medical image file"})).into_response()
    } else if filename.starts_with("garbage") {
        (StatusCode::OK, "<html>not json</html>").into_response()
    } else {
        Json(json!({
            "success": true,
            "message": "File uploaded successfully",
            "study_id": position,
            "file_info": {
                "filename": format!("stored_{}", filename),
                "size": 0,
                "modality": "MR",
                "format": "nifti"
            }
        }))
        .into_response()
    }
}

async fn spawn_server() -> (String, Log) {
    let log = Log::default();
    let app = Router::new()
        .route("/api/upload", post(upload))
        .with_state(log.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), log)
}

fn orchestrator(server_url: String, observer: Arc<dyn UploadObserver>) -> UploadOrchestrator {
    let cfg = UploadConfig {
        server_url,
        ..UploadConfig::default()
    };
    let transport = HttpTransport::new(&cfg).unwrap();
    UploadOrchestrator::new(cfg, Arc::new(transport), observer)
}

#[tokio::test]
async fn test_uploads_disk_and_memory_files() {
    let (url, log) = spawn_server().await;
    let events = Arc::new(EventBroadcaster::default());
    let mut rx = events.subscribe();
    let orch = orchestrator(url, events.clone());

    let mut on_disk = tempfile::Builder::new().suffix(".dcm").tempfile().unwrap();
    on_disk.write_all(&vec![7u8; 150 * 1024]).unwrap();
    on_disk.flush().unwrap();
    let disk_file = SelectedFile::from_path(on_disk.path()).await.unwrap();
    let disk_name = disk_file.name.clone();

    let report = orch
        .add_files(vec![
            disk_file,
            SelectedFile::from_bytes("brain.nii.gz", vec![1u8; 2048]),
        ])
        .unwrap();
    assert_eq!(report.added, 2);
    orch.set_form(
        BatchForm::new("  P-042 ")
            .with_study_id("ST-7")
            .with_description(" follow-up "),
    );

    let summary = orch.start().await.unwrap();
    assert!(summary.all_succeeded());
    assert!(summary.auto_reset);
    assert_eq!(summary.uploaded[0].filename, disk_name);
    assert_eq!(summary.uploaded[1].filename, "brain.nii.gz");
    assert_eq!(
        summary.uploaded[1].stored_as.as_deref(),
        Some("stored_brain.nii.gz")
    );
    assert_eq!(summary.uploaded[1].modality.as_deref(), Some("MR"));
    assert_eq!(summary.uploaded[1].format.as_deref(), Some("nifti"));

    let received = log.lock().unwrap().clone();
    assert_eq!(received.len(), 2);
    for r in &received {
        assert_eq!(r.patient_id, "P-042");
        assert_eq!(r.study_id, "ST-7");
        assert_eq!(r.description, "follow-up");
    }
    let disk = received.iter().find(|r| r.filename == disk_name).unwrap();
    assert_eq!(disk.bytes, 150 * 1024);
    let memory = received.iter().find(|r| r.filename == "brain.nii.gz").unwrap();
    assert_eq!(memory.bytes, 2048);

    let mut last_percent = [0u8; 2];
    let mut settled = 0;
    while let Ok(event) = rx.try_recv() {
        match event {
            UploadEvent::Progress { index, percent } => {
                assert!(percent >= last_percent[index]);
                last_percent[index] = percent;
            }
            UploadEvent::TaskSettled { task } => {
                assert_eq!(task.status, TaskStatus::Completed);
                assert_eq!(task.percent, 100);
                settled += 1;
            }
            _ => {}
        }
    }
    assert_eq!(settled, 2);
    assert_eq!(last_percent, [100, 100]);
}

#[tokio::test]
async fn test_server_failures_are_per_file() {
    let (url, log) = spawn_server().await;
    let orch = orchestrator(url, Arc::new(EventBroadcaster::default()));

    orch.add_files(vec![
        SelectedFile::from_bytes("ok.dcm", vec![1u8; 10]),
        SelectedFile::from_bytes("fail.dcm", vec![1u8; 10]),
        SelectedFile::from_bytes("reject.nii", vec![1u8; 10]),
        SelectedFile::from_bytes("garbage.nii", vec![1u8; 10]),
    ])
    .unwrap();
    orch.set_form(BatchForm::new("P-1"));

    let summary = orch.start().await.unwrap();
    assert_eq!(log.lock().unwrap().len(), 4);
    assert_eq!(summary.uploaded.len(), 1);
    assert_eq!(summary.uploaded[0].filename, "ok.dcm");
    assert!(!summary.auto_reset);

    let reasons: Vec<_> = summary
        .failed
        .iter()
        .map(|f| (f.filename.as_str(), f.reason.as_str()))
        .collect();
    assert_eq!(
        reasons,
        vec![
            ("fail.dcm", "HTTP 500"),
            ("reject.nii", "Invalid medical image file"),
            ("garbage.nii", "Invalid response"),
        ]
    );
    assert_eq!(orch.selected_count(), 4);
}

#[tokio::test]
async fn test_unreachable_server_is_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let orch = orchestrator(format!("http://{}", addr), Arc::new(NoopObserver));
    orch.add_files(vec![SelectedFile::from_bytes("scan1.dcm", vec![1u8; 10])])
        .unwrap();
    orch.set_form(BatchForm::new("P-1"));

    let summary = orch.start().await.unwrap();
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].reason, "Network error");
    assert!(!orch.is_busy());
}
