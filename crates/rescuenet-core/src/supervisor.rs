//! Lifecycle of running agent loops

use anyhow::Result;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::{AgentReport, AgentRuntime, MessageStats};
use crate::roles::Role;

struct RunningAgent {
    role: Role,
    token: CancellationToken,
    handle: JoinHandle<AgentReport>,
}

/// Spawns each agent runtime as its own task and tears them down.
///
/// Every agent gets a child of the supervisor's shutdown token, so one agent
/// can be stopped alone or all at once.
pub struct AgentSupervisor {
    agents: RwLock<HashMap<String, RunningAgent>>,
    shutdown_token: CancellationToken,
}

impl Default for AgentSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentSupervisor {
    pub fn new() -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            shutdown_token: CancellationToken::new(),
        }
    }

    pub async fn spawn(&self, runtime: AgentRuntime) -> Result<()> {
        let name = runtime.name().to_string();
        let role = runtime.role();
        let mut agents = self.agents.write().await;
        if agents.contains_key(&name) {
            anyhow::bail!("Agent {} is already running", name);
        }

        let token = self.shutdown_token.child_token();
        let handle = tokio::spawn(runtime.run(token.clone()));
        info!("Spawned agent {} ({})", name, role);
        agents.insert(
            name,
            RunningAgent {
                role,
                token,
                handle,
            },
        );
        Ok(())
    }

    /// Stop one agent and wait for its loop to finish
    pub async fn stop(&self, name: &str, deadline: Duration) -> Option<AgentReport> {
        let agent = self.agents.write().await.remove(name);
        let Some(agent) = agent else {
            warn!("Attempted to stop unknown agent: {}", name);
            return None;
        };
        agent.token.cancel();
        Some(collect(name.to_string(), agent, deadline).await)
    }

    /// Stop every agent. Loops still busy when `deadline` passes are aborted.
    pub async fn shutdown(&self, deadline: Duration) -> Vec<AgentReport> {
        info!("Stopping all agents");
        self.shutdown_token.cancel();

        let agents: Vec<(String, RunningAgent)> = self.agents.write().await.drain().collect();
        let started = tokio::time::Instant::now();
        let mut reports = Vec::with_capacity(agents.len());
        for (name, agent) in agents {
            let remaining = deadline.saturating_sub(started.elapsed());
            reports.push(collect(name, agent, remaining).await);
        }
        reports.sort_by(|a, b| a.name.cmp(&b.name));
        info!("All agents stopped");
        reports
    }

    pub async fn running(&self) -> Vec<String> {
        let mut names: Vec<String> = self.agents.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn is_running(&self, name: &str) -> bool {
        self.agents.read().await.contains_key(name)
    }
}

async fn collect(name: String, mut agent: RunningAgent, deadline: Duration) -> AgentReport {
    match tokio::time::timeout(deadline, &mut agent.handle).await {
        Ok(Ok(report)) => {
            debug!("Agent {} finished", name);
            report
        }
        Ok(Err(e)) => {
            warn!("Agent {} task failed: {}", name, e);
            lost_report(name, agent.role, "crashed")
        }
        Err(_) => {
            warn!("Agent {} missed the shutdown deadline, aborting", name);
            agent.handle.abort();
            lost_report(name, agent.role, "aborted")
        }
    }
}

fn lost_report(name: String, role: Role, status: &str) -> AgentReport {
    AgentReport {
        name,
        role,
        status: status.to_string(),
        stats: MessageStats::default(),
        conversations: 0,
        open_conversations: 0,
        knowledge_entries: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentContext, RuntimeConfig, mailbox};
    use crate::roles::{ActionOutcome, FieldRole, RoleBehaviour};
    use crate::transport::MessageTransport;
    use crate::types::{AclMessage, Content, Performative, into_content};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct Sink(Mutex<Vec<AclMessage>>);

    #[async_trait]
    impl MessageTransport for Sink {
        async fn send(&self, message: AclMessage) -> Result<()> {
            self.0.lock().unwrap().push(message);
            Ok(())
        }
    }

    /// Ignores its deadline-free action for a long time
    struct Stuck;

    #[async_trait]
    impl RoleBehaviour for Stuck {
        fn role(&self) -> Role {
            Role::Transporter
        }

        async fn perform(
            &mut self,
            _ctx: &mut AgentContext,
            _request: &AclMessage,
        ) -> Result<ActionOutcome> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(ActionOutcome::new(Content::new()))
        }
    }

    fn fast_config() -> RuntimeConfig {
        RuntimeConfig {
            poll_timeout: Duration::from_millis(20),
            action_deadline: Duration::from_secs(120),
            time_scale: 0.0,
        }
    }

    fn field_agent(
        name: &str,
        role: Role,
        sink: &Arc<Sink>,
        inbox: mpsc::Receiver<AclMessage>,
    ) -> AgentRuntime {
        let behaviour = Box::new(FieldRole::new(role));
        AgentRuntime::new(name, behaviour, sink.clone(), inbox, fast_config())
    }

    #[tokio::test]
    async fn test_spawn_stop_and_shutdown() {
        let sink = Arc::new(Sink::default());
        let supervisor = AgentSupervisor::new();
        let mut senders = Vec::new();
        for (name, role) in [
            ("medic_agent", Role::Medic),
            ("searcher_agent", Role::Searcher),
        ] {
            let (tx, rx) = mailbox(4);
            senders.push(tx);
            let runtime = field_agent(name, role, &sink, rx);
            supervisor.spawn(runtime).await.unwrap();
        }
        let running = supervisor.running().await;
        assert_eq!(running, vec!["medic_agent", "searcher_agent"]);

        let report = supervisor.stop("medic_agent", Duration::from_secs(1)).await.unwrap();
        assert_eq!(report.name, "medic_agent");
        assert_eq!(report.status, "idle");
        assert!(!supervisor.is_running("medic_agent").await);
        assert!(supervisor.stop("medic_agent", Duration::from_secs(1)).await.is_none());

        let reports = supervisor.shutdown(Duration::from_secs(1)).await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].name, "searcher_agent");
        assert!(supervisor.running().await.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_spawn_is_rejected() {
        let sink = Arc::new(Sink::default());
        let supervisor = AgentSupervisor::new();
        let (_tx1, rx1) = mailbox(1);
        let (_tx2, rx2) = mailbox(1);
        let a = field_agent("medic_agent", Role::Medic, &sink, rx1);
        let b = field_agent("medic_agent", Role::Medic, &sink, rx2);
        supervisor.spawn(a).await.unwrap();
        assert!(supervisor.spawn(b).await.is_err());
        supervisor.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_in_flight_request_finishes_before_stop() {
        let sink = Arc::new(Sink::default());
        let supervisor = AgentSupervisor::new();
        let (tx, rx) = mailbox(4);
        let role = FieldRole::new(Role::Searcher).with_pause(0.2);
        let config = RuntimeConfig {
            time_scale: 1.0,
            ..fast_config()
        };
        supervisor
            .spawn(AgentRuntime::new("searcher_agent", Box::new(role), sink.clone(), rx, config))
            .await
            .unwrap();

        let request = AclMessage::new(
            Performative::Request,
            vec!["searcher_agent".into()],
            into_content(json!({"action": "search_area"})),
        )
        .stamped("coordinator_agent");
        tx.send(request).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let reports = supervisor.shutdown(Duration::from_secs(2)).await;
        assert_eq!(reports[0].stats.sent_of(Performative::Inform), 1);
        let sent = sink.0.lock().unwrap().clone();
        assert_eq!(sent.last().unwrap().performative, Performative::Inform);
    }

    #[tokio::test]
    async fn test_shutdown_deadline_aborts_stuck_agent() {
        let sink = Arc::new(Sink::default());
        let supervisor = AgentSupervisor::new();
        let (tx, rx) = mailbox(4);
        let config = fast_config();
        let stuck = AgentRuntime::new("transporter_agent", Box::new(Stuck), sink, rx, config);
        supervisor.spawn(stuck).await.unwrap();
        let request = AclMessage::new(
            Performative::Request,
            vec!["transporter_agent".into()],
            into_content(json!({"action": "evacuate_victim"})),
        )
        .stamped("coordinator_agent");
        tx.send(request).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let reports = supervisor.shutdown(Duration::from_millis(100)).await;
        assert_eq!(reports[0].status, "aborted");
    }
}
