//! Destination queue for accepted records.
//!
//! Records are sent one by one in their wire format (see
//! [`Record::serialize_event`](crate::models::Record::serialize_event)).
//! Which destination is used comes from the configuration:
//!
//! - `memory` - kept in process, for previews and tests
//! - `file` - appended as JSON lines to a spool file
//! - `http` - POSTed to a collector endpoint
//!
//! A failing destination aborts the batch.

use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::{QueueError, QueueResult};

/// Where accepted records go.
pub trait Destination {
    /// Send one serialized record.
    fn send(&mut self, message: &str) -> QueueResult<()>;

    /// Flush buffered output at the end of a batch.
    fn flush(&mut self) -> QueueResult<()> {
        Ok(())
    }
}

/// Destination configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DestinationConfig {
    #[default]
    Memory,
    File {
        path: PathBuf,
    },
    Http {
        url: String,
        #[serde(default)]
        token: Option<String>,
    },
}

impl DestinationConfig {
    /// Whether sent records outlive the batch. The memory queue is dropped
    /// with the batch, so submissions to it are lost.
    pub fn is_persistent(&self) -> bool {
        !matches!(self, DestinationConfig::Memory)
    }
}

/// Open the configured destination for one batch.
pub fn connect(config: &DestinationConfig) -> QueueResult<Box<dyn Destination>> {
    Ok(match config {
        DestinationConfig::Memory => Box::new(MemoryQueue::new()),
        DestinationConfig::File { path } => Box::new(FileQueue::open(path)?),
        DestinationConfig::Http { url, token } => Box::new(HttpQueue::new(url, token.clone())),
    })
}

// =============================================================================
// Memory
// =============================================================================

/// In-process queue. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryQueue {
    messages: Arc<Mutex<Vec<String>>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages sent so far.
    pub fn messages(&self) -> Vec<String> {
        match self.messages.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.messages().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Destination for MemoryQueue {
    fn send(&mut self, message: &str) -> QueueResult<()> {
        match self.messages.lock() {
            Ok(mut guard) => guard.push(message.to_string()),
            Err(poisoned) => poisoned.into_inner().push(message.to_string()),
        }
        Ok(())
    }
}

// =============================================================================
// File
// =============================================================================

/// JSON-lines spool file.
pub struct FileQueue {
    file: File,
}

impl FileQueue {
    pub fn open(path: &Path) -> QueueResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file })
    }
}

impl Destination for FileQueue {
    fn send(&mut self, message: &str) -> QueueResult<()> {
        writeln!(self.file, "{}", message)?;
        Ok(())
    }

    fn flush(&mut self) -> QueueResult<()> {
        self.file.flush()?;
        Ok(())
    }
}

// =============================================================================
// HTTP
// =============================================================================

/// POSTs each record to a collector.
pub struct HttpQueue {
    client: reqwest::blocking::Client,
    url: String,
    token: Option<String>,
}

impl HttpQueue {
    pub fn new(url: &str, token: Option<String>) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            url: url.to_string(),
            token,
        }
    }
}

impl Destination for HttpQueue {
    fn send(&mut self, message: &str) -> QueueResult<()> {
        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .body(message.to_string());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(QueueError::Rejected {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_memory_destination_is_transient() {
        assert!(!DestinationConfig::Memory.is_persistent());
        assert!(DestinationConfig::File { path: "events.jsonl".into() }.is_persistent());
        assert!(DestinationConfig::Http {
            url: "http://localhost:8080/events".into(),
            token: None,
        }
        .is_persistent());
    }

    #[test]
    fn test_memory_queue_clones_share_buffer() {
        let queue = MemoryQueue::new();
        let mut sender = queue.clone();
        sender.send(r#"{"__type":"Event"}"#).unwrap();

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.messages()[0], r#"{"__type":"Event"}"#);
    }

    #[test]
    fn test_file_queue_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spool").join("events.jsonl");

        let mut queue = FileQueue::open(&path).unwrap();
        queue.send("{\"a\":1}").unwrap();
        queue.send("{\"a\":2}").unwrap();
        queue.flush().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().collect::<Vec<_>>(), vec!["{\"a\":1}", "{\"a\":2}"]);
    }

    #[test]
    fn test_destination_config_parsing() {
        let config: DestinationConfig =
            serde_json::from_str(r#"{"type": "http", "url": "http://collector/events"}"#).unwrap();
        assert_eq!(
            config,
            DestinationConfig::Http {
                url: "http://collector/events".into(),
                token: None
            }
        );
        assert_eq!(DestinationConfig::default(), DestinationConfig::Memory);
    }
}
