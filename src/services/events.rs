//! Serialisable pipeline events.
//!
//! [`EventBroadcaster`] fans events out to any number of subscribers over a
//! tokio broadcast channel, which is how a UI layer listens without sharing
//! state with the orchestrator. [`JsonLinesObserver`] writes the same events
//! to stdout for scripted use of the CLI.

use crate::{
    models::{batch::BatchSummary, task::UploadTask},
    services::observer::{Notice, UploadObserver},
};
use serde::Serialize;
use std::io::{self, Write};
use tokio::sync::broadcast;

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum UploadEvent {
    Notice { notice: Notice },
    Progress { index: usize, percent: u8 },
    TaskSettled { task: UploadTask },
    BatchSettled { summary: BatchSummary },
    Reset,
}

/// Broadcasts pipeline events to every subscriber.
pub struct EventBroadcaster {
    sender: broadcast::Sender<UploadEvent>,
}

impl EventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UploadEvent> {
        self.sender.subscribe()
    }

    fn publish(&self, event: UploadEvent) {
        // No subscribers is fine.
        let _ = self.sender.send(event);
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

impl UploadObserver for EventBroadcaster {
    fn on_notice(&self, notice: &Notice) {
        self.publish(UploadEvent::Notice {
            notice: notice.clone(),
        });
    }

    fn on_progress(&self, index: usize, percent: u8) {
        self.publish(UploadEvent::Progress { index, percent });
    }

    fn on_task_settled(&self, task: &UploadTask) {
        self.publish(UploadEvent::TaskSettled { task: task.clone() });
    }

    fn on_batch_settled(&self, summary: &BatchSummary) {
        self.publish(UploadEvent::BatchSettled {
            summary: summary.clone(),
        });
    }

    fn on_reset(&self) {
        self.publish(UploadEvent::Reset);
    }
}

/// Prints one JSON object per event on stdout.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonLinesObserver;

impl JsonLinesObserver {
    fn emit(&self, event: UploadEvent) {
        match serde_json::to_string(&event) {
            Ok(line) => {
                let mut out = io::stdout().lock();
                if let Err(err) = writeln!(out, "{}", line) {
                    tracing::debug!("failed to write event: {}", err);
                }
            }
            Err(err) => tracing::warn!("failed to serialise event: {}", err),
        }
    }
}

impl UploadObserver for JsonLinesObserver {
    fn on_notice(&self, notice: &Notice) {
        self.emit(UploadEvent::Notice {
            notice: notice.clone(),
        });
    }

    fn on_progress(&self, index: usize, percent: u8) {
        self.emit(UploadEvent::Progress { index, percent });
    }

    fn on_task_settled(&self, task: &UploadTask) {
        self.emit(UploadEvent::TaskSettled { task: task.clone() });
    }

    fn on_batch_settled(&self, summary: &BatchSummary) {
        self.emit(UploadEvent::BatchSettled {
            summary: summary.clone(),
        });
    }

    fn on_reset(&self) {
        self.emit(UploadEvent::Reset);
    }
}
