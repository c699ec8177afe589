//! Append-only audit log of transport traffic

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Incoming,
    Outgoing,
    /// Receiver had no directory entry.
    Unresolved,
    /// Endpoint was known but could not be reached.
    Failed,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Incoming => "INCOMING",
            Self::Outgoing => "OUTGOING",
            Self::Unresolved => "UNRESOLVED",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    pub endpoint: String,
    pub payload: String,
}

/// Ordered transport log. Entries are never removed during a run.
#[derive(Debug, Default)]
pub struct TransportLog {
    entries: Mutex<Vec<LogEntry>>,
}

impl TransportLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn append(&self, direction: Direction, endpoint: impl Into<String>, payload: &[u8]) {
        let entry = LogEntry {
            timestamp: Utc::now(),
            direction,
            endpoint: endpoint.into(),
            payload: String::from_utf8_lossy(payload).into_owned(),
        };
        self.entries.lock().await.push(entry);
    }

    pub async fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().await.clone()
    }

    /// The last `n` entries, oldest first
    pub async fn tail(&self, n: usize) -> Vec<LogEntry> {
        let entries = self.entries.lock().await;
        let start = entries.len().saturating_sub(n);
        entries[start..].to_vec()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    pub async fn count(&self, direction: Direction) -> usize {
        self.entries
            .lock()
            .await
            .iter()
            .filter(|e| e.direction == direction)
            .count()
    }
}
