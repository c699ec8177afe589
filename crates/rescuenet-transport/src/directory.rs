//! Agent name to network address bindings

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentAddress {
    pub host: String,
    pub port: u16,
}

impl AgentAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl std::fmt::Display for AgentAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// In-memory directory. Changes only through explicit registration.
#[derive(Debug, Default)]
pub struct Directory {
    entries: RwLock<HashMap<String, AgentAddress>>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert a binding; the last registration for a name wins.
    /// Returns the address it replaced, if any.
    pub async fn register(&self, name: &str, address: AgentAddress) -> Option<AgentAddress> {
        info!("Agent '{}' registered at {}", name, address);
        self.entries
            .write()
            .await
            .insert(name.to_string(), address)
    }

    pub async fn unregister(&self, name: &str) -> Option<AgentAddress> {
        self.entries.write().await.remove(name)
    }

    pub async fn resolve(&self, name: &str) -> Option<AgentAddress> {
        self.entries.read().await.get(name).cloned()
    }

    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
