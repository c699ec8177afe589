//! Sensors feeding disaster reports to the coordinator

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use super::{ActionOutcome, Role, RoleBehaviour};
use crate::agent::AgentContext;
use crate::disaster::{DisasterEvent, DisasterType, Severity};
use crate::types::{AclMessage, Performative, ontology};

/// Upstream producer of disaster events
#[async_trait]
pub trait DisasterSource: Send {
    /// Next detected event, or `None` once the source is exhausted.
    async fn next_event(&mut self) -> Result<Option<DisasterEvent>>;
}

/// One scenario line. Requirement flags are derived, never given.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub category: DisasterType,
    pub severity: Severity,
    pub location: (f64, f64),
    pub affected_population: u32,
    #[serde(default)]
    pub casualties: u32,
    #[serde(default)]
    pub damaged_buildings: u32,
}

impl ScenarioEntry {
    pub fn into_event(self) -> DisasterEvent {
        let event = DisasterEvent::new(
            self.category,
            self.severity,
            self.location,
            self.affected_population,
            self.casualties,
            self.damaged_buildings,
        );
        match self.id {
            Some(id) => event.with_id(id),
            None => event,
        }
    }
}

/// Replays a fixed list of events in order
#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    events: VecDeque<DisasterEvent>,
}

impl ScriptedSource {
    pub fn new(events: impl IntoIterator<Item = DisasterEvent>) -> Self {
        Self {
            events: events.into_iter().collect(),
        }
    }

    /// Parse a JSON array of scenario entries
    pub fn from_json(json: &str) -> Result<Self> {
        let entries: Vec<ScenarioEntry> =
            serde_json::from_str(json).context("Failed to parse scenario")?;
        Ok(Self::new(entries.into_iter().map(ScenarioEntry::into_event)))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        Self::from_json(&json)
    }

    pub fn remaining(&self) -> usize {
        self.events.len()
    }
}

#[async_trait]
impl DisasterSource for ScriptedSource {
    async fn next_event(&mut self) -> Result<Option<DisasterEvent>> {
        Ok(self.events.pop_front())
    }
}

pub struct SensorRole {
    coordinator: String,
    source: Box<dyn DisasterSource>,
    interval: Duration,
    detected: u32,
    exhausted: bool,
}

impl SensorRole {
    pub fn new(
        coordinator: impl Into<String>,
        source: Box<dyn DisasterSource>,
        interval: Duration,
    ) -> Self {
        Self {
            coordinator: coordinator.into(),
            source,
            interval,
            detected: 0,
            exhausted: false,
        }
    }

    pub fn detected(&self) -> u32 {
        self.detected
    }
}

#[async_trait]
impl RoleBehaviour for SensorRole {
    fn role(&self) -> Role {
        Role::Sensor
    }

    async fn perform(
        &mut self,
        _ctx: &mut AgentContext,
        request: &AclMessage,
    ) -> Result<ActionOutcome> {
        bail!("sensors accept no requests (got '{}')", request.action())
    }

    fn tick_interval(&self) -> Option<Duration> {
        Some(self.interval)
    }

    async fn on_tick(&mut self, ctx: &mut AgentContext) -> Result<()> {
        if self.exhausted {
            return Ok(());
        }
        let Some(event) = self.source.next_event().await? else {
            self.exhausted = true;
            debug!(
                "[{}] [SENSOR] Source exhausted after {} events",
                ctx.name(),
                self.detected
            );
            return Ok(());
        };

        self.detected += 1;
        info!(
            "[{}] [SENSOR] DETECTED: {} | Sev:{} | Pop:{} | Casualties:{}",
            ctx.name(),
            event.category.as_str().to_uppercase(),
            event.severity,
            event.affected_population,
            event.casualties
        );
        let report = AclMessage::new(
            Performative::Inform,
            vec![self.coordinator.clone()],
            event.to_content(),
        )
        .with_ontology(ontology::DISASTER_DETECTION);
        ctx.send(report).await
    }
}
