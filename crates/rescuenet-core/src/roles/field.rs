//! Searcher, medic and transporter teams

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;

use super::{ActionOutcome, Role, RoleBehaviour};
use crate::agent::AgentContext;
use crate::types::{AclMessage, Performative, into_content};

const DEFAULT_PAUSE_SECS: f64 = 2.0;

/// A field team acting on direct requests.
///
/// A searcher with a coordinator configured reports any victim named in a
/// `search_area` request back to that coordinator as a `victim_found` inform.
pub struct FieldRole {
    role: Role,
    pause_secs: f64,
    coordinator: Option<String>,
}

impl FieldRole {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            pause_secs: DEFAULT_PAUSE_SECS,
            coordinator: None,
        }
    }

    pub fn with_pause(mut self, seconds: f64) -> Self {
        self.pause_secs = seconds;
        self
    }

    pub fn reporting_to(mut self, coordinator: impl Into<String>) -> Self {
        self.coordinator = Some(coordinator.into());
        self
    }

    async fn report_victim(&self, ctx: &mut AgentContext, request: &AclMessage) -> Result<()> {
        let Some(coordinator) = &self.coordinator else {
            return Ok(());
        };
        let Some(victim) = request.content.get("victim").and_then(Value::as_object) else {
            return Ok(());
        };
        let location = victim
            .get("location")
            .or_else(|| request.content.get("area"))
            .cloned()
            .unwrap_or(Value::Null);
        let finding = AclMessage::new(
            Performative::Inform,
            vec![coordinator.clone()],
            into_content(json!({
                "type": "victim_found",
                "location": location,
                "victim_id": victim.get("victim_id").cloned().unwrap_or(Value::Null),
                "priority": victim.get("priority").cloned().unwrap_or(json!("normal")),
            })),
        );
        info!(
            "[{}] Victim found, reporting to {}",
            ctx.name(),
            coordinator
        );
        ctx.send(finding).await
    }
}

fn status_word(action: &str) -> Option<&'static str> {
    Some(match action {
        "search_area" => "searching",
        "report_finding" => "reporting",
        "scan_environment" => "scanning",
        "treat_victim" => "treating",
        "assess_condition" => "assessing",
        "request_evacuation" => "requesting_evacuation",
        "evacuate_victim" => "evacuating",
        "move_to_location" => "moving",
        "return_to_base" => "returning",
        _ => return None,
    })
}

#[async_trait]
impl RoleBehaviour for FieldRole {
    fn role(&self) -> Role {
        self.role
    }

    async fn perform(
        &mut self,
        ctx: &mut AgentContext,
        request: &AclMessage,
    ) -> Result<ActionOutcome> {
        let action = request.action().to_string();
        let Some(status) = status_word(&action) else {
            bail!("no procedure for action '{}'", action);
        };

        ctx.set_status(status);
        let content = &request.content;
        let place = content.get("location").or_else(|| content.get("area"));
        info!(
            "[{}] [{}] {} {:?}",
            ctx.name(),
            self.role.as_str().to_uppercase(),
            status,
            place
        );
        ctx.simulate(self.pause_secs).await;

        if action == "search_area" {
            self.report_victim(ctx, request).await?;
        }

        Ok(ActionOutcome::new(into_content(json!({
            "result": "action_completed",
            "details": Value::Object(request.content.clone()),
        }))))
    }
}
