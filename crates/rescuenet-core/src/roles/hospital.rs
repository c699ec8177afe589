//! Hospital admitting patients up to its bed capacity

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::info;

use super::{ActionOutcome, Role, RoleBehaviour};
use crate::agent::AgentContext;
use crate::types::{AclMessage, into_content};

pub struct HospitalRole {
    capacity: u32,
    admitted: u32,
    status_interval: Option<Duration>,
}

impl HospitalRole {
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            admitted: 0,
            status_interval: None,
        }
    }

    pub fn with_status_interval(mut self, interval: Duration) -> Self {
        self.status_interval = Some(interval);
        self
    }

    pub fn available_beds(&self) -> u32 {
        self.capacity.saturating_sub(self.admitted)
    }

    /// Admit as many patients as free beds allow; returns (admitted, turned away)
    pub fn admit(&mut self, patients: u32) -> (u32, u32) {
        let admitted = patients.min(self.available_beds());
        self.admitted += admitted;
        (admitted, patients - admitted)
    }
}

#[async_trait]
impl RoleBehaviour for HospitalRole {
    fn role(&self) -> Role {
        Role::Hospital
    }

    async fn perform(
        &mut self,
        ctx: &mut AgentContext,
        request: &AclMessage,
    ) -> Result<ActionOutcome> {
        let patients = request
            .content
            .get("patients")
            .and_then(Value::as_u64)
            .ok_or_else(|| anyhow!("admit_patients needs a non-negative 'patients' count"))?;
        let patients = u32::try_from(patients).unwrap_or(u32::MAX);

        ctx.set_status("admitting");
        let (admitted, turned_away) = self.admit(patients);
        info!(
            "[{}] [HOSPITAL] Admitted {} | Turned away {} | Beds available {}",
            ctx.name(),
            admitted,
            turned_away,
            self.available_beds()
        );

        Ok(ActionOutcome::new(into_content(json!({
            "result": "action_completed",
            "admitted": admitted,
            "turned_away": turned_away,
            "available_beds": self.available_beds(),
        }))))
    }

    fn tick_interval(&self) -> Option<Duration> {
        self.status_interval
    }

    async fn on_tick(&mut self, ctx: &mut AgentContext) -> Result<()> {
        info!(
            "[{}] [HOSPITAL] STATUS | Patients: {} | Beds available: {}/{}",
            ctx.name(),
            self.admitted,
            self.available_beds(),
            self.capacity
        );
        Ok(())
    }
}
