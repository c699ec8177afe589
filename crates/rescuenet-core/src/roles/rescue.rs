//! Rescue units executing rescue assignments

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::info;

use super::{ActionOutcome, Role, RoleBehaviour};
use crate::agent::AgentContext;
use crate::task::{RescueAssignment, TaskType};
use crate::types::{AclMessage, Performative, into_content, ontology};

const MAX_OPERATION_SECS: f64 = 5.0;

pub struct RescueRole {
    coordinator: String,
    status_interval: Option<Duration>,
    people_rescued: u64,
    missions_completed: u32,
}

impl RescueRole {
    pub fn new(coordinator: impl Into<String>) -> Self {
        Self {
            coordinator: coordinator.into(),
            status_interval: None,
            people_rescued: 0,
            missions_completed: 0,
        }
    }

    /// Send an `agent_status` inform to the coordinator on this period
    pub fn with_status_interval(mut self, interval: Duration) -> Self {
        self.status_interval = Some(interval);
        self
    }

    pub fn people_rescued(&self) -> u64 {
        self.people_rescued
    }
}

/// Simulated operation length in seconds before time scaling
pub fn operation_secs(assignment: &RescueAssignment) -> f64 {
    let severity = f64::from(assignment.severity.level());
    let people = f64::from(assignment.people_to_rescue);
    (2.0 + 0.5 * severity + people / 50.0).min(MAX_OPERATION_SECS)
}

/// People brought out; harder disasters have a lower success rate
pub fn people_saved(assignment: &RescueAssignment) -> u32 {
    let rate_pct = 85u64.saturating_sub(10 * u64::from(assignment.severity.level()));
    (u64::from(assignment.people_to_rescue) * rate_pct / 100) as u32
}

#[async_trait]
impl RoleBehaviour for RescueRole {
    fn role(&self) -> Role {
        Role::Rescue
    }

    async fn perform(
        &mut self,
        ctx: &mut AgentContext,
        request: &AclMessage,
    ) -> Result<ActionOutcome> {
        let assignment = RescueAssignment::from_content(&request.content)?;
        ctx.set_status("deployed");
        info!(
            "[{}] [RESCUE] DEPLOYED to {} | Location: {:?} | People to rescue: {}",
            ctx.name(),
            assignment.disaster_id,
            assignment.location,
            assignment.people_to_rescue
        );

        ctx.simulate(operation_secs(&assignment)).await;

        let rescued = people_saved(&assignment);
        self.people_rescued += u64::from(rescued);
        self.missions_completed += 1;
        info!(
            "[{}] [RESCUE] MISSION COMPLETE | Rescued: {} | Total: {} | Missions: {}",
            ctx.name(),
            rescued,
            self.people_rescued,
            self.missions_completed
        );

        let content = into_content(json!({
            "task_id": assignment.task_id,
            "disaster_id": assignment.disaster_id,
            "task_type": TaskType::Rescue,
            "agent_id": ctx.name(),
            "people_rescued": rescued,
            "total_rescued": self.people_rescued,
        }));
        Ok(ActionOutcome::new(content).with_ontology(ontology::TASK_COMPLETE))
    }

    fn tick_interval(&self) -> Option<Duration> {
        self.status_interval
    }

    async fn on_tick(&mut self, ctx: &mut AgentContext) -> Result<()> {
        let status = AclMessage::new(
            Performative::Inform,
            vec![self.coordinator.clone()],
            into_content(json!({
                "agent_type": Role::Rescue,
                "agent_id": ctx.name(),
                "status": ctx.state.status,
                "people_rescued": self.people_rescued,
                "missions_completed": self.missions_completed,
            })),
        )
        .with_ontology(ontology::AGENT_STATUS);
        ctx.send(status).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disaster::Severity;
    use crate::transport::MessageTransport;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Sink(Mutex<Vec<AclMessage>>);

    #[async_trait]
    impl MessageTransport for Sink {
        async fn send(&self, message: AclMessage) -> Result<()> {
            self.0.lock().unwrap().push(message);
            Ok(())
        }
    }

    fn assignment(people: u32, severity: Severity) -> RescueAssignment {
        RescueAssignment {
            task_id: "RT-000001".into(),
            disaster_id: "D1".into(),
            location: (0.0, 0.0),
            people_to_rescue: people,
            severity,
        }
    }

    #[test]
    fn test_operation_time_is_capped() {
        assert_eq!(operation_secs(&assignment(0, Severity::Low)), 2.5);
        assert_eq!(operation_secs(&assignment(50, Severity::Medium)), 4.0);
        assert_eq!(operation_secs(&assignment(10_000, Severity::Critical)), 5.0);
    }

    #[test]
    fn test_success_rate_drops_with_severity() {
        assert_eq!(people_saved(&assignment(100, Severity::Low)), 75);
        assert_eq!(people_saved(&assignment(100, Severity::Critical)), 45);
        assert_eq!(people_saved(&assignment(0, Severity::High)), 0);
    }

    #[tokio::test]
    async fn test_assignment_reports_task_complete() {
        let sink = Arc::new(Sink::default());
        let mut ctx = AgentContext::new("rescue_1", Role::Rescue, sink.clone(), 0.0);
        let mut role = RescueRole::new("coordinator_agent");
        let task = crate::task::Task::rescue(
            &crate::disaster::DisasterEvent::new(
                crate::disaster::DisasterType::Earthquake,
                Severity::High,
                (1.0, 1.0),
                100,
                20,
                0,
            )
            .with_id("D1"),
        );
        let content = task.assignment_content();
        let request = AclMessage::new(Performative::Request, vec!["rescue_1".into()], content)
            .with_ontology(ontology::RESCUE_ASSIGNMENT);

        let outcome = role.perform(&mut ctx, &request).await.unwrap();
        assert_eq!(outcome.ontology.as_deref(), Some(ontology::TASK_COMPLETE));
        assert_eq!(outcome.content["task_type"], json!("rescue"));
        assert_eq!(outcome.content["task_id"], json!(task.id));
        // 30 people at severity 3
        assert_eq!(outcome.content["people_rescued"], json!(16));
        assert_eq!(role.people_rescued(), 16);
    }

    #[tokio::test]
    async fn test_malformed_assignment_is_an_error() {
        let sink = Arc::new(Sink::default());
        let mut ctx = AgentContext::new("rescue_1", Role::Rescue, sink, 0.0);
        let mut role = RescueRole::new("coordinator_agent");
        let content = into_content(json!({"task_id": "RT-1"}));
        let request = AclMessage::new(Performative::Request, vec![], content)
            .with_ontology(ontology::RESCUE_ASSIGNMENT);
        assert!(role.perform(&mut ctx, &request).await.is_err());
        assert_eq!(role.people_rescued(), 0);
    }

    #[tokio::test]
    async fn test_status_tick_goes_to_coordinator() {
        let sink = Arc::new(Sink::default());
        let mut ctx = AgentContext::new("rescue_1", Role::Rescue, sink.clone(), 0.0);
        let mut role =
            RescueRole::new("coordinator_agent").with_status_interval(Duration::from_secs(10));
        assert_eq!(role.tick_interval(), Some(Duration::from_secs(10)));
        role.on_tick(&mut ctx).await.unwrap();

        let sent = sink.0.lock().unwrap().clone();
        assert_eq!(sent[0].ontology, ontology::AGENT_STATUS);
        assert_eq!(sent[0].sender, "rescue_1");
        assert_eq!(sent[0].content["agent_type"], json!("rescue"));
    }
}
