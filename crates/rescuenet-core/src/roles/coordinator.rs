//! Coordinator: assessment, assignment and completion through the engine
//!
//! The engine sits behind an async mutex. Every engine call happens inside
//! one short lock scope and messages are sent only after the lock is
//! released.

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{ActionOutcome, Role, RoleBehaviour};
use crate::agent::AgentContext;
use crate::engine::{Assessment, Assignment, Completion, CoordinationEngine};
use crate::task::TaskType;
use crate::types::{AclMessage, Performative, into_content, ontology};

/// Timing knobs for the coordinator's periodic work
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    /// Peer that receives `treat_victim` requests for reported victims.
    pub medic: String,
    pub assign_interval: Duration,
    pub status_interval: Duration,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            medic: "medic_agent".to_string(),
            assign_interval: Duration::from_secs(1),
            status_interval: Duration::from_secs(20),
        }
    }
}

pub struct CoordinatorRole {
    engine: Arc<Mutex<CoordinationEngine>>,
    settings: CoordinatorSettings,
    last_status: Option<Instant>,
}

impl CoordinatorRole {
    pub fn new(engine: Arc<Mutex<CoordinationEngine>>, settings: CoordinatorSettings) -> Self {
        Self {
            engine,
            settings,
            last_status: None,
        }
    }

    pub fn engine(&self) -> Arc<Mutex<CoordinationEngine>> {
        self.engine.clone()
    }

    /// Run the matcher and send one request per new assignment
    async fn dispatch_assignments(&self, ctx: &mut AgentContext) -> usize {
        let assignments: Vec<Assignment> = {
            let mut engine = self.engine.lock().await;
            engine.expire_stale(Instant::now());
            engine.assign_all()
        };
        let count = assignments.len();
        for assignment in assignments {
            if let Err(e) = ctx.send(assignment.request).await {
                warn!(
                    "[{}] [COORDINATOR] Could not deliver {} to {}: {}",
                    ctx.name(),
                    assignment.task_id,
                    assignment.agent,
                    e
                );
            }
        }
        count
    }

    async fn coordinate_rescue(
        &self,
        ctx: &mut AgentContext,
        victim: &serde_json::Map<String, Value>,
    ) -> Result<()> {
        let location = victim.get("location").cloned().unwrap_or(Value::Null);
        info!(
            "[{}] [COORDINATOR] Coordinating rescue for victim at {}",
            ctx.name(),
            location
        );
        let request = AclMessage::new(
            Performative::Request,
            vec![self.settings.medic.clone()],
            into_content(json!({
                "action": "treat_victim",
                "location": location,
                "victim_id": victim.get("victim_id").cloned().unwrap_or(Value::Null),
                "priority": victim.get("priority").cloned().unwrap_or(json!("normal")),
            })),
        );
        ctx.send(request).await
    }

    async fn release_assignment(&self, ctx: &AgentContext, msg: &AclMessage, release_agent: bool) {
        if msg.ontology != ontology::RESCUE_ASSIGNMENT
            && msg.ontology != ontology::SUPPLY_ASSIGNMENT
        {
            return;
        }
        let abandoned = self
            .engine
            .lock()
            .await
            .abandon_held_by(&msg.sender, release_agent);
        if let Some(task_id) = abandoned {
            warn!(
                "[{}] [COORDINATOR] {} answered {} with {}",
                ctx.name(),
                msg.sender,
                task_id,
                msg.performative
            );
        }
    }
}

#[async_trait]
impl RoleBehaviour for CoordinatorRole {
    fn role(&self) -> Role {
        Role::Coordinator
    }

    async fn perform(
        &mut self,
        ctx: &mut AgentContext,
        request: &AclMessage,
    ) -> Result<ActionOutcome> {
        let details = Value::Object(request.content.clone());
        let content = match request.action() {
            "request_status" => {
                let engine = self.engine.lock().await;
                json!({
                    "result": "action_completed",
                    "status": engine.status(),
                    "ranked_disasters": engine.ranked_disasters(),
                })
            }
            "deploy_team" => {
                ctx.set_status("deploying");
                let agent = request.content_str("agent").unwrap_or(&request.sender).to_string();
                let task_type: TaskType = match request.content.get("task_type") {
                    Some(value) => serde_json::from_value(value.clone())?,
                    None => bail!("deploy_team needs a task_type"),
                };
                let registered = self.engine.lock().await.register_agent(&agent, task_type);
                json!({"result": "action_completed", "agent": agent, "registered": registered})
            }
            "assign_task" => {
                ctx.set_status("assigning");
                let assigned = self.dispatch_assignments(ctx).await;
                json!({"result": "action_completed", "assigned": assigned, "details": details})
            }
            "coordinate_rescue" => {
                ctx.set_status("coordinating");
                self.coordinate_rescue(ctx, &request.content).await?;
                json!({"result": "action_completed", "details": details})
            }
            other => bail!("no procedure for action '{}'", other),
        };
        Ok(ActionOutcome::new(into_content(content)))
    }

    async fn on_inform(&mut self, ctx: &mut AgentContext, msg: &AclMessage) -> Result<()> {
        if msg.content_str("type") == Some("victim_found") {
            let location = msg.content.get("location").unwrap_or(&Value::Null);
            info!(
                "[{}] [COORDINATOR] VICTIM REPORTED by {} at {}",
                ctx.name(),
                msg.sender,
                location
            );
            return self.coordinate_rescue(ctx, &msg.content).await;
        }

        match msg.ontology.as_str() {
            ontology::DISASTER_DETECTION => {
                let assessment = self.engine.lock().await.assess_content(&msg.content)?;
                if let Assessment::Accepted { task_ids, .. } = assessment {
                    info!(
                        "[{}] [COORDINATOR] ASSESSMENT COMPLETE | Tasks created: {}",
                        ctx.name(),
                        task_ids.len()
                    );
                    self.dispatch_assignments(ctx).await;
                }
            }
            ontology::TASK_COMPLETE => {
                let completion = self
                    .engine
                    .lock()
                    .await
                    .complete_content(&msg.sender, &msg.content)?;
                if let Completion::Completed { .. } = completion {
                    self.dispatch_assignments(ctx).await;
                }
            }
            ontology::AGENT_STATUS => {
                debug!(
                    "[{}] [COORDINATOR] Status from {}: {:?}",
                    ctx.name(),
                    msg.sender,
                    msg.content.get("status")
                );
            }
            other => debug!(
                "[{}] [COORDINATOR] Inform with ontology {} noted",
                ctx.name(),
                other
            ),
        }
        Ok(())
    }

    async fn on_refuse(&mut self, ctx: &mut AgentContext, msg: &AclMessage) -> Result<()> {
        self.release_assignment(ctx, msg, false).await;
        Ok(())
    }

    async fn on_failure(&mut self, ctx: &mut AgentContext, msg: &AclMessage) -> Result<()> {
        self.release_assignment(ctx, msg, true).await;
        Ok(())
    }

    fn tick_interval(&self) -> Option<Duration> {
        Some(self.settings.assign_interval)
    }

    async fn on_tick(&mut self, ctx: &mut AgentContext) -> Result<()> {
        self.dispatch_assignments(ctx).await;

        let due = self
            .last_status
            .is_none_or(|at| at.elapsed() >= self.settings.status_interval);
        if due {
            self.last_status = Some(Instant::now());
            let status = self.engine.lock().await.status();
            info!("[{}] [COORDINATOR] STATUS: {}", ctx.name(), status);
        }
        Ok(())
    }
}
