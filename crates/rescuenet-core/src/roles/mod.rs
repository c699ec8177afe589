//! Role behaviours plugged into the agent runtime
//!
//! The runtime owns the protocol (agree/refuse, terminal replies,
//! conversation bookkeeping). A role only decides what it can do, does it,
//! and reacts to informs and replies addressed to it.

pub mod coordinator;
pub mod field;
pub mod hospital;
pub mod logistics;
pub mod rescue;
pub mod sensor;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::agent::AgentContext;
use crate::types::{AclMessage, Content};

pub use coordinator::CoordinatorRole;
pub use field::FieldRole;
pub use hospital::HospitalRole;
pub use logistics::LogisticsRole;
pub use rescue::RescueRole;
pub use sensor::{DisasterSource, ScriptedSource, SensorRole};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Coordinator,
    Searcher,
    Medic,
    Transporter,
    Rescue,
    Logistics,
    Hospital,
    Sensor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Coordinator => "coordinator",
            Self::Searcher => "searcher",
            Self::Medic => "medic",
            Self::Transporter => "transporter",
            Self::Rescue => "rescue",
            Self::Logistics => "logistics",
            Self::Hospital => "hospital",
            Self::Sensor => "sensor",
        }
    }

    /// Actions an agent of this role accepts in a `request`
    pub fn capabilities(&self) -> &'static [&'static str] {
        match self {
            Self::Coordinator => &[
                "assign_task",
                "request_status",
                "deploy_team",
                "coordinate_rescue",
            ],
            Self::Searcher => &["search_area", "report_finding", "scan_environment"],
            Self::Medic => &["treat_victim", "assess_condition", "request_evacuation"],
            Self::Transporter => &["evacuate_victim", "move_to_location", "return_to_base"],
            Self::Rescue => &["rescue_assignment"],
            Self::Logistics => &["supply_assignment"],
            Self::Hospital => &["admit_patients"],
            Self::Sensor => &[],
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| anyhow::anyhow!("Unknown role: {}", s))
    }
}

/// What an accepted action produced
#[derive(Debug, Clone, Default)]
pub struct ActionOutcome {
    /// Ontology for the terminal inform. `None` keeps the request's.
    pub ontology: Option<String>,
    pub content: Content,
}

impl ActionOutcome {
    pub fn new(content: Content) -> Self {
        Self {
            ontology: None,
            content,
        }
    }

    pub fn with_ontology(mut self, ontology: impl Into<String>) -> Self {
        self.ontology = Some(ontology.into());
        self
    }
}

/// Per-role behaviour. Only `role` and `perform` are required.
#[async_trait]
pub trait RoleBehaviour: Send {
    fn role(&self) -> Role;

    fn can_perform(&self, action: &str) -> bool {
        self.role().capabilities().contains(&action)
    }

    /// Execute an accepted request. An error becomes the terminal `failure`.
    async fn perform(
        &mut self,
        ctx: &mut AgentContext,
        request: &AclMessage,
    ) -> Result<ActionOutcome>;

    async fn on_inform(&mut self, _ctx: &mut AgentContext, _msg: &AclMessage) -> Result<()> {
        Ok(())
    }

    async fn on_agree(&mut self, _ctx: &mut AgentContext, _msg: &AclMessage) -> Result<()> {
        Ok(())
    }

    async fn on_refuse(&mut self, _ctx: &mut AgentContext, _msg: &AclMessage) -> Result<()> {
        Ok(())
    }

    async fn on_failure(&mut self, _ctx: &mut AgentContext, _msg: &AclMessage) -> Result<()> {
        Ok(())
    }

    /// Period of `on_tick`. `None` disables ticking.
    fn tick_interval(&self) -> Option<Duration> {
        None
    }

    async fn on_tick(&mut self, _ctx: &mut AgentContext) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_table() {
        assert!(Role::Medic.capabilities().contains(&"treat_victim"));
        assert!(!Role::Searcher.capabilities().contains(&"treat_victim"));
        assert_eq!(Role::Rescue.capabilities(), &["rescue_assignment"]);
        assert!(Role::Sensor.capabilities().is_empty());
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("transporter".parse::<Role>().unwrap(), Role::Transporter);
        assert_eq!(Role::Logistics.to_string(), "logistics");
        assert!("pilot".parse::<Role>().is_err());
    }
}
