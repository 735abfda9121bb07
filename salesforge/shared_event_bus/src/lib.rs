#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Event publishing used by the reporting collaborators.
//!
//! Pipeline components never render or persist reports themselves; they emit
//! [`EventRecord`]s and whatever sits behind an [`EventPublisher`] decides
//! what to do with them.

use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::{fs::OpenOptions, io::AsyncWriteExt, sync::broadcast};
use uuid::Uuid;

/// A published event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventRecord {
    /// `evt-<uuid>` identifier.
    pub id: String,
    /// Component that produced the event.
    pub source: String,
    /// Dotted event type, e.g. `report.dataset`.
    pub event_type: String,
    /// RFC3339 timestamp.
    pub timestamp: String,
    /// Event body.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl EventRecord {
    /// Builds an event with a fresh id and the current timestamp.
    #[must_use]
    pub fn new(
        source: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: format!("evt-{}", Uuid::new_v4()),
            source: source.into(),
            event_type: event_type.into(),
            timestamp: Utc::now().to_rfc3339(),
            payload,
        }
    }
}

/// Destination for events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes one event.
    async fn publish(&self, event: EventRecord) -> Result<()>;
}

/// Source of live events.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// Returns a receiver that observes events published after the call.
    async fn subscribe(&self) -> Result<broadcast::Receiver<EventRecord>>;
}

/// In-process bus keeping the most recent events in a bounded backlog.
#[derive(Debug, Clone)]
pub struct MemoryEventBus {
    sender: broadcast::Sender<EventRecord>,
    backlog: Arc<Mutex<VecDeque<EventRecord>>>,
    capacity: usize,
}

impl MemoryEventBus {
    /// Creates a bus retaining at most `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            backlog: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Copy of the retained events, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<EventRecord> {
        self.backlog.lock().iter().cloned().collect()
    }

    /// Retained events of one type, oldest first.
    #[must_use]
    pub fn of_type(&self, event_type: &str) -> Vec<EventRecord> {
        self.backlog
            .lock()
            .iter()
            .filter(|event| event.event_type == event_type)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventPublisher for MemoryEventBus {
    async fn publish(&self, event: EventRecord) -> Result<()> {
        {
            let mut backlog = self.backlog.lock();
            if backlog.len() == self.capacity {
                backlog.pop_front();
            }
            backlog.push_back(event.clone());
        }
        // No live subscribers is not an error.
        let _ = self.sender.send(event);
        Ok(())
    }
}

#[async_trait]
impl EventSubscriber for MemoryEventBus {
    async fn subscribe(&self) -> Result<broadcast::Receiver<EventRecord>> {
        Ok(self.sender.subscribe())
    }
}

/// Appends events as JSON lines to a file.
#[derive(Debug, Clone)]
pub struct FileEventPublisher {
    path: PathBuf,
}

impl FileEventPublisher {
    /// Creates the publisher, creating parent directories up front.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }

    /// Target file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl EventPublisher for FileEventPublisher {
    async fn publish(&self, event: EventRecord) -> Result<()> {
        let mut data = serde_json::to_vec(&event)?;
        data.push(b'\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&data).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::runtime::Runtime;

    fn report_event(kind: &str) -> EventRecord {
        EventRecord::new("reporting", kind, serde_json::json!({ "rows": 10 }))
    }

    #[test]
    fn subscribers_receive_published_events() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let bus = MemoryEventBus::new(4);
            let mut rx = bus.subscribe().await.unwrap();
            bus.publish(report_event("report.dataset")).await.unwrap();
            let event = rx.recv().await.unwrap();
            assert_eq!(event.event_type, "report.dataset");
            assert!(event.id.starts_with("evt-"));
        });
    }

    #[test]
    fn backlog_is_bounded() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let bus = MemoryEventBus::new(2);
            for kind in ["a", "b", "c"] {
                bus.publish(report_event(kind)).await.unwrap();
            }
            let kinds: Vec<_> = bus.snapshot().into_iter().map(|e| e.event_type).collect();
            assert_eq!(kinds, vec!["b", "c"]);
            assert_eq!(bus.of_type("c").len(), 1);
        });
    }

    #[test]
    fn file_publisher_appends_lines() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let dir = tempdir().unwrap();
            let publisher = FileEventPublisher::new(dir.path().join("events/run.jsonl")).unwrap();
            publisher.publish(report_event("report.dataset")).await.unwrap();
            publisher.publish(report_event("report.selection")).await.unwrap();
            let content = std::fs::read_to_string(publisher.path()).unwrap();
            assert_eq!(content.lines().count(), 2);
            assert!(content.contains("report.selection"));
        });
    }
}
