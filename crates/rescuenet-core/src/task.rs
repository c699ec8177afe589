//! Rescue and supply tasks plus the payloads that travel with them

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;

use crate::disaster::{DisasterEvent, ResourceType, Severity};
use crate::error::{ParseError, ParseResult};
use crate::types::{Content, into_content, ontology};

/// Quantity per person for the top three ranked supply needs
const SUPPLY_RATIOS: [f64; 3] = [1.5, 1.0, 0.5];

/// Share of the affected population added to casualties for rescue
const RESCUE_POPULATION_SHARE: f64 = 0.1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Active,
    Completed,
    Abandoned,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Active => "ACTIVE",
            Self::Completed => "COMPLETED",
            Self::Abandoned => "ABANDONED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Rescue,
    Supply,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rescue => "rescue",
            Self::Supply => "supply",
        }
    }

    /// Ontology tag of the assignment request for this task type
    pub fn assignment_ontology(&self) -> &'static str {
        match self {
            Self::Rescue => ontology::RESCUE_ASSIGNMENT,
            Self::Supply => ontology::SUPPLY_ASSIGNMENT,
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "task_type", rename_all = "snake_case")]
pub enum TaskKind {
    Rescue {
        people_to_rescue: u32,
        severity: Severity,
    },
    Supply {
        required_supplies: BTreeMap<ResourceType, u32>,
    },
}

/// A unit of work created by the coordinator for one disaster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub disaster_id: String,
    pub location: (f64, f64),
    pub status: TaskStatus,
    pub assigned_to: Option<String>,
    #[serde(flatten)]
    pub kind: TaskKind,
}

impl Task {
    pub fn rescue(disaster: &DisasterEvent) -> Self {
        let share = f64::from(disaster.affected_population) * RESCUE_POPULATION_SHARE;
        let extra = share.floor() as u32;
        Self {
            id: task_id("RT"),
            disaster_id: disaster.id.clone(),
            location: disaster.location,
            status: TaskStatus::Pending,
            assigned_to: None,
            kind: TaskKind::Rescue {
                people_to_rescue: disaster.casualties.saturating_add(extra),
                severity: disaster.severity,
            },
        }
    }

    pub fn supply(disaster: &DisasterEvent) -> Self {
        let population = f64::from(disaster.affected_population);
        let required_supplies = disaster
            .supply_priority
            .iter()
            .zip(SUPPLY_RATIOS)
            .map(|(resource, ratio)| (*resource, (population * ratio).ceil() as u32))
            .collect();
        Self {
            id: task_id("ST"),
            disaster_id: disaster.id.clone(),
            location: disaster.location,
            status: TaskStatus::Pending,
            assigned_to: None,
            kind: TaskKind::Supply { required_supplies },
        }
    }

    pub fn task_type(&self) -> TaskType {
        match self.kind {
            TaskKind::Rescue { .. } => TaskType::Rescue,
            TaskKind::Supply { .. } => TaskType::Supply,
        }
    }

    /// Payload of the assignment `request` sent to the chosen agent
    pub fn assignment_content(&self) -> Content {
        let mut content = into_content(json!({
            "task_id": self.id,
            "disaster_id": self.disaster_id,
            "location": [self.location.0, self.location.1],
        }));
        match &self.kind {
            TaskKind::Rescue {
                people_to_rescue,
                severity,
            } => {
                content.insert("people_to_rescue".into(), json!(people_to_rescue));
                content.insert("severity".into(), json!(severity.level()));
            }
            TaskKind::Supply { required_supplies } => {
                content.insert("required_supplies".into(), json!(required_supplies));
            }
        }
        content
    }
}

fn task_id(prefix: &str) -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, &hex[..6])
}

/// A rescue assignment as seen by the receiving unit
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RescueAssignment {
    pub task_id: String,
    pub disaster_id: String,
    pub location: (f64, f64),
    pub people_to_rescue: u32,
    pub severity: Severity,
}

/// A supply assignment as seen by the receiving unit
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SupplyAssignment {
    pub task_id: String,
    pub disaster_id: String,
    pub location: (f64, f64),
    pub required_supplies: BTreeMap<ResourceType, u32>,
}

impl RescueAssignment {
    pub fn from_content(content: &Content) -> ParseResult<Self> {
        Ok(serde_json::from_value(Value::Object(content.clone()))?)
    }
}

impl SupplyAssignment {
    pub fn from_content(content: &Content) -> ParseResult<Self> {
        Ok(serde_json::from_value(Value::Object(content.clone()))?)
    }
}

/// A `task_complete` report received by the coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionReport {
    pub task_id: String,
    pub task_type: TaskType,
    #[serde(default)]
    pub disaster_id: Option<String>,
    #[serde(default)]
    pub people_rescued: u32,
    #[serde(default)]
    pub supplies_delivered: BTreeMap<ResourceType, u32>,
}

impl CompletionReport {
    pub fn from_content(content: &Content) -> ParseResult<Self> {
        if !content.contains_key("task_id") {
            return Err(ParseError::MissingField("task_id"));
        }
        if !content.contains_key("task_type") {
            return Err(ParseError::MissingField("task_type"));
        }
        Ok(serde_json::from_value(Value::Object(content.clone()))?)
    }

    pub fn to_content(&self) -> Content {
        match serde_json::to_value(self) {
            Ok(value) => into_content(value),
            Err(_) => Content::new(),
        }
    }

    pub fn total_supplies(&self) -> u64 {
        self.supplies_delivered.values().map(|q| u64::from(*q)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disaster::DisasterType;

    fn quake() -> DisasterEvent {
        DisasterEvent::new(
            DisasterType::Earthquake,
            Severity::High,
            (10.0, 20.0),
            1000,
            120,
            300,
        )
        .with_id("D20250101000000123")
    }

    #[test]
    fn test_rescue_task_from_disaster() {
        let task = Task::rescue(&quake());
        assert!(task.id.starts_with("RT-"));
        assert_eq!(task.id.len(), 9);
        assert_eq!(task.disaster_id, "D20250101000000123");
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.task_type(), TaskType::Rescue);
        assert_eq!(
            task.kind,
            TaskKind::Rescue {
                people_to_rescue: 220,
                severity: Severity::High
            }
        );
    }

    #[test]
    fn test_supply_task_takes_top_three_needs() {
        let task = Task::supply(&quake());
        assert!(task.id.starts_with("ST-"));
        let TaskKind::Supply { required_supplies } = &task.kind else {
            panic!("expected supply task");
        };
        assert_eq!(required_supplies.len(), 3);
        assert_eq!(required_supplies[&ResourceType::Water], 1500);
        assert_eq!(required_supplies[&ResourceType::Food], 1000);
        assert_eq!(required_supplies[&ResourceType::MedicalSupplies], 500);
        assert!(!required_supplies.contains_key(&ResourceType::Blankets));
    }

    #[test]
    fn test_task_serde_round_trip() {
        for task in [Task::rescue(&quake()), Task::supply(&quake())] {
            let json = serde_json::to_string(&task).unwrap();
            let parsed: Task = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, task);
        }
    }

    #[test]
    fn test_assignment_content_parses_on_receiver() {
        let rescue = Task::rescue(&quake());
        let parsed = RescueAssignment::from_content(&rescue.assignment_content()).unwrap();
        assert_eq!(parsed.task_id, rescue.id);
        assert_eq!(parsed.people_to_rescue, 220);
        assert_eq!(parsed.location, (10.0, 20.0));

        let supply = Task::supply(&quake());
        let parsed = SupplyAssignment::from_content(&supply.assignment_content()).unwrap();
        assert_eq!(parsed.required_supplies[&ResourceType::Water], 1500);
    }

    #[test]
    fn test_completion_report_parse() {
        let report = CompletionReport {
            task_id: "RT-abc123".into(),
            task_type: TaskType::Rescue,
            disaster_id: Some("D1".into()),
            people_rescued: 42,
            supplies_delivered: BTreeMap::new(),
        };
        let parsed = CompletionReport::from_content(&report.to_content()).unwrap();
        assert_eq!(parsed, report);
    }

    #[test]
    fn test_completion_report_missing_fields() {
        let content = into_content(json!({"task_type": "rescue"}));
        assert!(matches!(
            CompletionReport::from_content(&content),
            Err(ParseError::MissingField("task_id"))
        ));
        let content = into_content(json!({"task_id": "RT-1", "task_type": "airlift"}));
        let parsed = CompletionReport::from_content(&content);
        assert!(matches!(parsed, Err(ParseError::Json(_))));
    }
}
