//! Disaster reports produced upstream and consumed by the coordinator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ParseError, ParseResult};
use crate::types::Content;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DisasterType {
    Earthquake,
    Fire,
    Flood,
    ChemicalSpill,
    BuildingCollapse,
}

impl DisasterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Earthquake => "earthquake",
            Self::Fire => "fire",
            Self::Flood => "flood",
            Self::ChemicalSpill => "chemical_spill",
            Self::BuildingCollapse => "building_collapse",
        }
    }

    /// Ranked resource needs used when a report carries none
    pub fn default_supply_priority(&self) -> Vec<ResourceType> {
        use ResourceType::*;
        match self {
            Self::Earthquake | Self::BuildingCollapse => {
                vec![Water, Food, MedicalSupplies, Blankets]
            }
            Self::Flood => vec![Water, Food, Blankets, TemporaryShelter],
            Self::Fire => vec![Water, MedicalSupplies, Blankets, Fuel],
            Self::ChemicalSpill => vec![MedicalSupplies, Water, Food, Blankets],
        }
    }
}

impl std::fmt::Display for DisasterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered severity level, carried on the wire as its integer value (1..=4)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "u8", into = "u8")]
pub enum Severity {
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl Severity {
    pub fn level(&self) -> u8 {
        *self as u8
    }
}

impl From<Severity> for u8 {
    fn from(severity: Severity) -> u8 {
        severity.level()
    }
}

impl TryFrom<u8> for Severity {
    type Error = ParseError;

    fn try_from(value: u8) -> ParseResult<Self> {
        match value {
            1 => Ok(Self::Low),
            2 => Ok(Self::Medium),
            3 => Ok(Self::High),
            4 => Ok(Self::Critical),
            other => Err(ParseError::invalid(
                "severity",
                format!("expected 1..=4, got {}", other),
            )),
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Food,
    Water,
    MedicalSupplies,
    Blankets,
    TemporaryShelter,
    Fuel,
}

impl ResourceType {
    pub const ALL: [ResourceType; 6] = [
        Self::Food,
        Self::Water,
        Self::MedicalSupplies,
        Self::Blankets,
        Self::TemporaryShelter,
        Self::Fuel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Food => "food",
            Self::Water => "water",
            Self::MedicalSupplies => "medical_supplies",
            Self::Blankets => "blankets",
            Self::TemporaryShelter => "temporary_shelter",
            Self::Fuel => "fuel",
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detected disaster.
///
/// Requirement flags are derived once by [`DisasterEvent::new`] and carried
/// verbatim afterwards; nothing downstream recomputes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisasterEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub category: DisasterType,
    pub severity: Severity,
    pub location: (f64, f64),
    pub timestamp: DateTime<Utc>,
    pub affected_population: u32,
    pub casualties: u32,
    pub damaged_buildings: u32,
    pub requires_evacuation: bool,
    pub requires_medical: bool,
    pub requires_firefighting: bool,
    #[serde(default)]
    pub requires_rescue: bool,
    #[serde(default)]
    pub requires_supplies: bool,
    #[serde(default)]
    pub supply_priority: Vec<ResourceType>,
}

impl DisasterEvent {
    pub fn new(
        category: DisasterType,
        severity: Severity,
        location: (f64, f64),
        affected_population: u32,
        casualties: u32,
        damaged_buildings: u32,
    ) -> Self {
        Self {
            id: generate_id(Utc::now()),
            category,
            severity,
            location,
            timestamp: Utc::now(),
            affected_population,
            casualties,
            damaged_buildings,
            requires_evacuation: severity >= Severity::High,
            requires_medical: casualties > 0,
            requires_firefighting: category == DisasterType::Fire,
            requires_rescue: severity >= Severity::Medium || casualties > 50,
            requires_supplies: true,
            supply_priority: category.default_supply_priority(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Parse a `disaster_detection` payload. An empty supply priority is
    /// filled from the category default.
    pub fn from_content(content: &Content) -> ParseResult<Self> {
        let mut event: DisasterEvent = serde_json::from_value(Value::Object(content.clone()))?;
        if event.id.trim().is_empty() {
            return Err(ParseError::invalid("id", "empty disaster id"));
        }
        if event.supply_priority.is_empty() {
            event.supply_priority = event.category.default_supply_priority();
        }
        Ok(event)
    }

    pub fn to_content(&self) -> Content {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Content::new(),
        }
    }

    /// Number of task types this disaster needs before it can close
    pub fn expected_task_count(&self) -> usize {
        usize::from(self.requires_rescue) + usize::from(self.requires_supplies)
    }
}

/// `D` + `YYYYmmddHHMMSS` + three random digits
pub fn generate_id(now: DateTime<Utc>) -> String {
    let suffix = 100 + (uuid::Uuid::new_v4().as_u128() % 900);
    format!("D{}{}", now.format("%Y%m%d%H%M%S"), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(
        kind: DisasterType,
        severity: Severity,
        population: u32,
        casualties: u32,
        damage: u32,
    ) -> DisasterEvent {
        DisasterEvent::new(kind, severity, (0.0, 0.0), population, casualties, damage)
    }

    #[test]
    fn test_severity_serde_as_integer() {
        assert_eq!(serde_json::to_string(&Severity::High).unwrap(), "3");
        let s: Severity = serde_json::from_str("4").unwrap();
        assert_eq!(s, Severity::Critical);
        assert!(serde_json::from_str::<Severity>("7").is_err());
        assert!(Severity::Critical > Severity::Low);
    }

    #[test]
    fn test_new_derives_flags() {
        let quake = event(DisasterType::Earthquake, Severity::Low, 500, 10, 20);
        assert!(!quake.requires_rescue);
        assert!(quake.requires_supplies);
        assert!(quake.requires_medical);
        assert!(!quake.requires_evacuation);
        assert!(!quake.requires_firefighting);
        assert_eq!(quake.expected_task_count(), 1);

        let fire = event(DisasterType::Fire, Severity::High, 100, 0, 5);
        assert!(fire.requires_rescue);
        assert!(fire.requires_evacuation);
        assert!(fire.requires_firefighting);
        assert!(!fire.requires_medical);
        assert_eq!(fire.expected_task_count(), 2);

        let crowded = event(DisasterType::Flood, Severity::Low, 1000, 51, 0);
        assert!(crowded.requires_rescue);
    }

    #[test]
    fn test_generate_id_shape() {
        let id = generate_id(Utc::now());
        assert!(id.starts_with('D'));
        assert_eq!(id.len(), 1 + 14 + 3);
        assert!(id[1..].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_content_round_trip() {
        let spill = DisasterEvent::new(
            DisasterType::ChemicalSpill,
            Severity::Medium,
            (45.5, -122.25),
            800,
            40,
            90,
        );
        let content = spill.to_content();
        assert_eq!(content["type"], json!("chemical_spill"));
        assert_eq!(content["severity"], json!(2));
        let parsed = DisasterEvent::from_content(&content).unwrap();
        assert_eq!(parsed, spill);
    }

    #[test]
    fn test_from_content_fills_default_priority() {
        let mut content = event(DisasterType::Flood, Severity::High, 10, 1, 1).to_content();
        content.insert("supply_priority".to_string(), json!([]));
        content.remove("requires_rescue");
        let parsed = DisasterEvent::from_content(&content).unwrap();
        let defaults = DisasterType::Flood.default_supply_priority();
        assert_eq!(parsed.supply_priority, defaults);
        assert!(!parsed.requires_rescue);
    }

    #[test]
    fn test_from_content_rejects_malformed() {
        let mut content = event(DisasterType::Fire, Severity::Low, 10, 0, 0).to_content();
        content.remove("casualties");
        let parsed = DisasterEvent::from_content(&content);
        assert!(matches!(parsed, Err(ParseError::Json(_))));

        let mut content = event(DisasterType::Fire, Severity::Low, 10, 0, 0).to_content();
        content.insert("type".to_string(), json!("meteor"));
        assert!(DisasterEvent::from_content(&content).is_err());
    }
}
