//! Fan-out of addressed messages through the directory

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use rescuenet_core::{AclMessage, MessageTransport};

use crate::directory::{AgentAddress, Directory};
use crate::log::{Direction, TransportLog};

/// Moves one encoded payload to one endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn deliver(&self, address: &AgentAddress, payload: &[u8]) -> Result<()>;
}

/// Per-receiver outcome of one routed message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteReport {
    pub delivered: Vec<String>,
    pub unresolved: Vec<String>,
    pub failed: Vec<String>,
}

impl RouteReport {
    pub fn all_delivered(&self) -> bool {
        self.unresolved.is_empty() && self.failed.is_empty()
    }
}

pub struct TransportRouter {
    directory: Arc<Directory>,
    log: Arc<TransportLog>,
    connector: Arc<dyn Connector>,
}

impl TransportRouter {
    pub fn new(
        directory: Arc<Directory>,
        log: Arc<TransportLog>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            directory,
            log,
            connector,
        }
    }

    pub fn directory(&self) -> &Arc<Directory> {
        &self.directory
    }

    pub fn log(&self) -> &Arc<TransportLog> {
        &self.log
    }

    pub async fn register(&self, name: &str, address: AgentAddress) {
        self.directory.register(name, address).await;
    }

    /// Deliver `message` to every receiver it names.
    ///
    /// Receivers are handled one by one and never block each other: an
    /// unknown name or an unreachable endpoint is logged and skipped. There
    /// are no retries.
    pub async fn route(&self, message: &AclMessage) -> Result<RouteReport> {
        let payload = message.to_wire()?;
        self.log
            .append(Direction::Incoming, message.sender.as_str(), &payload)
            .await;
        Ok(self.fan_out(message, &payload).await)
    }

    /// Route a raw frame received from `peer`. Frames that do not decode as
    /// a message are logged and dropped.
    pub async fn route_bytes(&self, peer: &str, payload: &[u8]) -> RouteReport {
        self.log.append(Direction::Incoming, peer, payload).await;
        match AclMessage::from_wire(payload) {
            Ok(message) => self.fan_out(&message, payload).await,
            Err(e) => {
                warn!("Dropping malformed frame from {}: {}", peer, e);
                RouteReport::default()
            }
        }
    }

    async fn fan_out(&self, message: &AclMessage, payload: &[u8]) -> RouteReport {
        let mut report = RouteReport::default();
        for receiver in &message.receivers {
            let Some(address) = self.directory.resolve(receiver).await else {
                warn!("No directory entry for receiver '{}', dropping", receiver);
                self.log
                    .append(Direction::Unresolved, receiver.as_str(), payload)
                    .await;
                report.unresolved.push(receiver.clone());
                continue;
            };

            match self.connector.deliver(&address, payload).await {
                Ok(()) => {
                    debug!(
                        "{} {} -> {} ({})",
                        message.performative, message.sender, receiver, address
                    );
                    self.log
                        .append(Direction::Outgoing, address.to_string(), payload)
                        .await;
                    report.delivered.push(receiver.clone());
                }
                Err(e) => {
                    warn!("Delivery to '{}' at {} failed: {:#}", receiver, address, e);
                    self.log
                        .append(Direction::Failed, address.to_string(), payload)
                        .await;
                    report.failed.push(receiver.clone());
                }
            }
        }
        report
    }
}

#[async_trait]
impl MessageTransport for TransportRouter {
    async fn send(&self, message: AclMessage) -> Result<()> {
        self.route(&message).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rescuenet_core::{Performative, into_content};
    use serde_json::json;
    use std::sync::Mutex;

    /// Records deliveries and refuses one port
    #[derive(Default)]
    struct RecordingConnector {
        delivered: Mutex<Vec<(AgentAddress, Vec<u8>)>>,
        dead_port: Option<u16>,
    }

    #[async_trait]
    impl Connector for RecordingConnector {
        async fn deliver(&self, address: &AgentAddress, payload: &[u8]) -> Result<()> {
            if self.dead_port == Some(address.port) {
                anyhow::bail!("connection refused");
            }
            self.delivered
                .lock()
                .unwrap()
                .push((address.clone(), payload.to_vec()));
            Ok(())
        }
    }

    async fn router_with(connector: Arc<RecordingConnector>) -> TransportRouter {
        let directory = Arc::new(Directory::new());
        let router = TransportRouter::new(directory, Arc::new(TransportLog::new()), connector);
        let medic = AgentAddress::new("127.0.0.1", 6001);
        let searcher = AgentAddress::new("127.0.0.1", 6002);
        router.register("medic_agent", medic).await;
        router.register("searcher_agent", searcher).await;
        router
    }

    fn broadcast(receivers: &[&str]) -> AclMessage {
        AclMessage::new(
            Performative::Inform,
            receivers.iter().map(|r| r.to_string()).collect(),
            into_content(json!({"type": "victim_found"})),
        )
        .stamped("coordinator_agent")
    }

    #[tokio::test]
    async fn test_route_to_every_receiver() {
        let connector = Arc::new(RecordingConnector::default());
        let router = router_with(connector.clone()).await;

        let message = broadcast(&["medic_agent", "searcher_agent"]);
        let report = router.route(&message).await.unwrap();
        assert_eq!(report.delivered, vec!["medic_agent", "searcher_agent"]);
        assert!(report.all_delivered());

        let delivered = connector.delivered.lock().unwrap();
        assert_eq!(delivered.len(), 2);
        let decoded = AclMessage::from_wire(&delivered[0].1).unwrap();
        assert_eq!(decoded.sender, "coordinator_agent");
    }

    #[tokio::test]
    async fn test_unresolved_receiver_does_not_block_others() {
        let connector = Arc::new(RecordingConnector::default());
        let router = router_with(connector.clone()).await;

        let report = router
            .route(&broadcast(&["ghost_agent", "medic_agent"]))
            .await
            .unwrap();
        assert_eq!(report.unresolved, vec!["ghost_agent"]);
        assert_eq!(report.delivered, vec!["medic_agent"]);
        assert_eq!(router.log().count(Direction::Unresolved).await, 1);
    }

    #[tokio::test]
    async fn test_failed_endpoint_does_not_block_others() {
        let connector = Arc::new(RecordingConnector {
            dead_port: Some(6001),
            ..Default::default()
        });
        let router = router_with(connector.clone()).await;

        let report = router
            .route(&broadcast(&["medic_agent", "searcher_agent"]))
            .await
            .unwrap();
        assert_eq!(report.failed, vec!["medic_agent"]);
        assert_eq!(report.delivered, vec!["searcher_agent"]);

        let entries = router.log().entries().await;
        let directions: Vec<Direction> = entries.iter().map(|e| e.direction).collect();
        assert_eq!(
            directions,
            vec![Direction::Incoming, Direction::Failed, Direction::Outgoing]
        );
        assert_eq!(entries[2].endpoint, "127.0.0.1:6002");
    }

    #[tokio::test]
    async fn test_malformed_frame_is_logged_and_dropped() {
        let connector = Arc::new(RecordingConnector::default());
        let router = router_with(connector.clone()).await;

        let frame = br#"{"performative":"shout","sender":"x","receivers":["medic_agent"]}"#;
        let report = router.route_bytes("127.0.0.1:40000", frame).await;
        assert_eq!(report, RouteReport::default());
        assert!(connector.delivered.lock().unwrap().is_empty());
        assert_eq!(router.log().len().await, 1);
        assert_eq!(router.log().entries().await[0].endpoint, "127.0.0.1:40000");
    }

    #[tokio::test]
    async fn test_registration_is_last_write_wins() {
        let connector = Arc::new(RecordingConnector::default());
        let router = router_with(connector.clone()).await;
        let moved = AgentAddress::new("127.0.0.1", 7001);
        router.register("medic_agent", moved).await;

        router.route(&broadcast(&["medic_agent"])).await.unwrap();
        assert_eq!(connector.delivered.lock().unwrap()[0].0.port, 7001);
    }
}
