//! Disaster urgency scoring

use serde::{Deserialize, Serialize};

use crate::disaster::DisasterEvent;

/// Weights and caps for the priority score.
///
/// Every term is a non-negative weight times its input, optionally capped,
/// so the score never decreases when one input grows and the rest hold.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PriorityPolicy {
    pub severity_weight: f64,
    pub population_weight: f64,
    pub population_cap: f64,
    pub casualty_weight: f64,
    pub casualty_cap: f64,
    pub damage_weight: f64,
    pub damage_cap: f64,
}

impl Default for PriorityPolicy {
    fn default() -> Self {
        Self {
            severity_weight: 25.0,
            population_weight: 0.01,
            population_cap: 50.0,
            casualty_weight: 0.5,
            casualty_cap: 100.0,
            damage_weight: 0.1,
            damage_cap: 50.0,
        }
    }
}

impl PriorityPolicy {
    pub fn score(&self, disaster: &DisasterEvent) -> f64 {
        self.score_parts(
            disaster.severity.level(),
            disaster.affected_population,
            disaster.casualties,
            disaster.damaged_buildings,
        )
    }

    pub fn score_parts(&self, severity: u8, population: u32, casualties: u32, damaged: u32) -> f64 {
        let severity = self.severity_weight.max(0.0) * f64::from(severity);
        let population = capped(self.population_weight, population, self.population_cap);
        let casualties = capped(self.casualty_weight, casualties, self.casualty_cap);
        let damage = capped(self.damage_weight, damaged, self.damage_cap);
        severity + population + casualties + damage
    }
}

// A non-positive cap disables capping for that term.
fn capped(weight: f64, value: u32, cap: f64) -> f64 {
    let term = weight.max(0.0) * f64::from(value);
    if cap > 0.0 { term.min(cap) } else { term }
}
