//! In-process binding: addresses map onto agent mailboxes

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU16, Ordering};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{RwLock, mpsc};

use rescuenet_core::AclMessage;

use crate::directory::AgentAddress;
use crate::router::Connector;

pub const LOCAL_HOST: &str = "local";

/// Hands frames straight to mailboxes. Every delivery decodes the frame
/// again, so receivers never share a message value. A full mailbox fails
/// the delivery instead of stalling the sender.
pub struct LocalConnector {
    mailboxes: RwLock<HashMap<AgentAddress, mpsc::Sender<AclMessage>>>,
    next_port: AtomicU16,
}

impl Default for LocalConnector {
    fn default() -> Self {
        Self::new(1)
    }
}

impl LocalConnector {
    pub fn new(first_port: u16) -> Self {
        Self {
            mailboxes: RwLock::new(HashMap::new()),
            next_port: AtomicU16::new(first_port),
        }
    }

    /// Bind a mailbox to a fresh synthetic address
    pub async fn attach(&self, inbox: mpsc::Sender<AclMessage>) -> AgentAddress {
        let port = self.next_port.fetch_add(1, Ordering::Relaxed);
        let address = AgentAddress::new(LOCAL_HOST, port);
        self.mailboxes.write().await.insert(address.clone(), inbox);
        address
    }

    pub async fn detach(&self, address: &AgentAddress) -> bool {
        self.mailboxes.write().await.remove(address).is_some()
    }
}

#[async_trait]
impl Connector for LocalConnector {
    async fn deliver(&self, address: &AgentAddress, payload: &[u8]) -> Result<()> {
        let inbox = self
            .mailboxes
            .read()
            .await
            .get(address)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Nothing attached at {}", address))?;

        let message = AclMessage::from_wire(payload)?;
        inbox.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => anyhow::anyhow!("Mailbox at {} is full", address),
            TrySendError::Closed(_) => anyhow::anyhow!("Mailbox at {} is closed", address),
        })
    }
}
