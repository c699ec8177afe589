//! Agent runtime - one message loop per agent
//!
//! Receives one message at a time from its mailbox, dispatches on the
//! performative and runs the request protocol around the role's action.
//! The loop is the only writer of the agent's state.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::roles::{ActionOutcome, Role, RoleBehaviour};
use crate::transport::MessageTransport;
use crate::types::{AclMessage, Content, Performative, into_content};

/// Configuration for an agent's message loop
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// How long one receive attempt waits before the loop re-checks for a
    /// stop signal.
    pub poll_timeout: Duration,
    /// Hard limit on a single accepted action.
    pub action_deadline: Duration,
    /// Multiplier applied to every simulated work pause.
    pub time_scale: f64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_secs(1),
            action_deadline: Duration::from_secs(30),
            time_scale: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Requested,
    Agreed,
    Refused,
    Informed,
    Completed,
    Failed,
}

impl ConversationStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Requested | Self::Agreed)
    }

    fn from_message(msg: &AclMessage) -> Self {
        match msg.performative {
            Performative::Request => Self::Requested,
            Performative::Agree => Self::Agreed,
            Performative::Refuse => Self::Refused,
            Performative::Failure => Self::Failed,
            Performative::Inform if msg.in_reply_to.is_some() => Self::Completed,
            Performative::Inform => Self::Informed,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub peer: String,
    pub status: ConversationStatus,
    pub messages: u32,
    pub updated_at: DateTime<Utc>,
}

/// Sent and received message counts per performative
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct MessageStats {
    pub sent: BTreeMap<Performative, u64>,
    pub received: BTreeMap<Performative, u64>,
}

impl MessageStats {
    pub fn total_sent(&self) -> u64 {
        self.sent.values().sum()
    }

    pub fn total_received(&self) -> u64 {
        self.received.values().sum()
    }

    pub fn sent_of(&self, performative: Performative) -> u64 {
        self.sent.get(&performative).copied().unwrap_or(0)
    }

    pub fn received_of(&self, performative: Performative) -> u64 {
        self.received.get(&performative).copied().unwrap_or(0)
    }

    pub fn merge(&mut self, other: &MessageStats) {
        for (p, n) in &other.sent {
            *self.sent.entry(*p).or_default() += n;
        }
        for (p, n) in &other.received {
            *self.received.entry(*p).or_default() += n;
        }
    }
}

/// Mutable per-agent state, owned by the message loop
#[derive(Debug, Clone, Serialize)]
pub struct AgentState {
    pub status: String,
    /// Latest inform content per sender
    pub knowledge_base: HashMap<String, Content>,
    pub conversations: HashMap<String, Conversation>,
    pub stats: MessageStats,
}

impl Default for AgentState {
    fn default() -> Self {
        Self {
            status: "idle".to_string(),
            knowledge_base: HashMap::new(),
            conversations: HashMap::new(),
            stats: MessageStats::default(),
        }
    }
}

impl AgentState {
    fn track(&mut self, msg: &AclMessage, peer: &str) {
        let status = ConversationStatus::from_message(msg);
        let entry = self
            .conversations
            .entry(msg.conversation_id.clone())
            .or_insert_with(|| Conversation {
                peer: peer.to_string(),
                status,
                messages: 0,
                updated_at: Utc::now(),
            });
        entry.status = status;
        entry.messages += 1;
        entry.updated_at = Utc::now();
    }

    pub fn open_conversations(&self) -> usize {
        self.conversations
            .values()
            .filter(|c| c.status.is_open())
            .count()
    }
}

/// Final summary of an agent, produced when its loop exits
#[derive(Debug, Clone, Serialize)]
pub struct AgentReport {
    pub name: String,
    pub role: Role,
    pub status: String,
    pub stats: MessageStats,
    pub conversations: usize,
    pub open_conversations: usize,
    pub knowledge_entries: usize,
}

impl std::fmt::Display for AgentReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] sent:{} received:{} conversations:{} (open {}) knowledge:{}",
            self.name,
            self.role,
            self.stats.total_sent(),
            self.stats.total_received(),
            self.conversations,
            self.open_conversations,
            self.knowledge_entries,
        )
    }
}

/// Handle given to role behaviours: identity, outbound messaging and the
/// agent's state.
pub struct AgentContext {
    name: String,
    role: Role,
    transport: Arc<dyn MessageTransport>,
    time_scale: f64,
    pub state: AgentState,
}

impl AgentContext {
    pub fn new(
        name: impl Into<String>,
        role: Role,
        transport: Arc<dyn MessageTransport>,
        time_scale: f64,
    ) -> Self {
        Self {
            name: name.into(),
            role,
            transport,
            time_scale,
            state: AgentState::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.state.status = status.into();
    }

    /// Stamp this agent as sender and hand the message to the transport
    pub async fn send(&mut self, message: AclMessage) -> Result<()> {
        let message = message.stamped(&self.name);
        *self.state.stats.sent.entry(message.performative).or_default() += 1;
        let peer = message.receivers.first().cloned().unwrap_or_default();
        self.state.track(&message, &peer);
        debug!(
            "[{}] Sent {} to {:?} ({})",
            self.name, message.performative, message.receivers, message.ontology
        );
        self.transport.send(message).await
    }

    /// Pause standing in for real work, scaled by the runtime's time scale
    pub async fn simulate(&self, seconds: f64) {
        let scaled = (seconds * self.time_scale).max(0.0);
        if scaled > 0.0 {
            tokio::time::sleep(Duration::from_secs_f64(scaled)).await;
        }
    }

    fn report(&self) -> AgentReport {
        AgentReport {
            name: self.name.clone(),
            role: self.role,
            status: self.state.status.clone(),
            stats: self.state.stats.clone(),
            conversations: self.state.conversations.len(),
            open_conversations: self.state.open_conversations(),
            knowledge_entries: self.state.knowledge_base.len(),
        }
    }
}

pub fn mailbox(capacity: usize) -> (mpsc::Sender<AclMessage>, mpsc::Receiver<AclMessage>) {
    mpsc::channel(capacity.max(1))
}

pub struct AgentRuntime {
    ctx: AgentContext,
    role: Box<dyn RoleBehaviour>,
    inbox: mpsc::Receiver<AclMessage>,
    config: RuntimeConfig,
}

impl AgentRuntime {
    pub fn new(
        name: impl Into<String>,
        role: Box<dyn RoleBehaviour>,
        transport: Arc<dyn MessageTransport>,
        inbox: mpsc::Receiver<AclMessage>,
        config: RuntimeConfig,
    ) -> Self {
        let ctx = AgentContext::new(name, role.role(), transport, config.time_scale);
        Self {
            ctx,
            role,
            inbox,
            config,
        }
    }

    pub fn name(&self) -> &str {
        self.ctx.name()
    }

    pub fn role(&self) -> Role {
        self.ctx.role()
    }

    pub fn state(&self) -> &AgentState {
        &self.ctx.state
    }

    /// Run until cancelled or until the mailbox closes.
    ///
    /// A stop signal is noticed within one poll timeout. A message already
    /// being handled finishes first, so an accepted request always gets its
    /// terminal reply.
    pub async fn run(mut self, cancel: CancellationToken) -> AgentReport {
        let tag = self.tag();
        info!("{} Agent started", tag);

        let tick_every = self.role.tick_interval().filter(|d| !d.is_zero());
        let mut ticker = tokio::time::interval(tick_every.unwrap_or(Duration::from_secs(3600)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("{} Stop signal received", tag);
                    break;
                }
                _ = ticker.tick(), if tick_every.is_some() => {
                    if let Err(e) = self.role.on_tick(&mut self.ctx).await {
                        warn!("{} Periodic work failed: {}", tag, e);
                    }
                }
                received = tokio::time::timeout(self.config.poll_timeout, self.inbox.recv()) => {
                    match received {
                        Ok(Some(msg)) => self.dispatch(msg).await,
                        Ok(None) => {
                            debug!("{} Mailbox closed", tag);
                            break;
                        }
                        Err(_) => continue,
                    }
                }
            }
        }

        info!("{} Agent stopped", tag);
        self.ctx.report()
    }

    fn tag(&self) -> String {
        let role = self.ctx.role.as_str().to_uppercase();
        format!("[{}] [{}]", self.ctx.name, role)
    }

    /// Handle one inbound message
    pub async fn dispatch(&mut self, msg: AclMessage) {
        *self.ctx.state.stats.received.entry(msg.performative).or_default() += 1;
        self.ctx.state.track(&msg, &msg.sender);
        debug!(
            "{} Received {} from {} ({})",
            self.tag(),
            msg.performative,
            msg.sender,
            msg.ontology
        );

        let result = match msg.performative {
            Performative::Request => {
                self.handle_request(&msg).await;
                Ok(())
            }
            Performative::Inform => self.handle_inform(&msg).await,
            Performative::Agree => self.role.on_agree(&mut self.ctx, &msg).await,
            Performative::Refuse => {
                info!(
                    "{} Request refused by {}: {:?}",
                    self.tag(),
                    msg.sender,
                    msg.content.get("reason")
                );
                self.role.on_refuse(&mut self.ctx, &msg).await
            }
            Performative::Failure => {
                warn!(
                    "{} Failure from {}: {:?}",
                    self.tag(),
                    msg.sender,
                    msg.content.get("error")
                );
                self.role.on_failure(&mut self.ctx, &msg).await
            }
        };

        if let Err(e) = result {
            warn!(
                "{} Dropped {} from {}: {}",
                self.tag(),
                msg.performative,
                msg.sender,
                e
            );
        }
    }

    async fn handle_inform(&mut self, msg: &AclMessage) -> Result<()> {
        self.ctx
            .state
            .knowledge_base
            .insert(msg.sender.clone(), msg.content.clone());
        self.role.on_inform(&mut self.ctx, msg).await
    }

    async fn handle_request(&mut self, msg: &AclMessage) {
        let action = msg.action().to_string();
        let original = Value::Object(msg.content.clone());

        if !self.role.can_perform(&action) {
            info!("{} Refusing '{}' from {}", self.tag(), action, msg.sender);
            let refuse = msg.reply(
                Performative::Refuse,
                into_content(json!({
                    "status": "refused",
                    "reason": "cannot_perform",
                    "action": action,
                    "request": original,
                })),
            );
            self.reply(refuse).await;
            return;
        }

        let agree = msg.reply(
            Performative::Agree,
            into_content(json!({"status": "accepted", "request": original.clone()})),
        );
        self.reply(agree).await;

        let deadline = self.config.action_deadline;
        let outcome = tokio::time::timeout(deadline, self.role.perform(&mut self.ctx, msg)).await;
        let terminal = match outcome {
            Ok(Ok(ActionOutcome { ontology, mut content })) => {
                content.entry("request").or_insert(original);
                let inform = msg.reply(Performative::Inform, content);
                match ontology {
                    Some(ontology) => inform.with_ontology(ontology),
                    None => inform,
                }
            }
            Ok(Err(e)) => {
                warn!("{} Action '{}' failed: {}", self.tag(), action, e);
                failure(msg, e.to_string(), original)
            }
            Err(_) => {
                warn!("{} Action '{}' exceeded {:?}", self.tag(), action, deadline);
                let error = format!("action '{}' exceeded deadline of {:?}", action, deadline);
                failure(msg, error, original)
            }
        };
        self.ctx.set_status("idle");
        self.reply(terminal).await;
    }

    async fn reply(&mut self, msg: AclMessage) {
        let performative = msg.performative;
        if let Err(e) = self.ctx.send(msg).await {
            warn!("{} Failed to send {}: {}", self.tag(), performative, e);
        }
    }
}

fn failure(request: &AclMessage, error: String, original: Value) -> AclMessage {
    request.reply(
        Performative::Failure,
        into_content(json!({
            "status": "failed",
            "error": error,
            "request": original,
        })),
    )
}
