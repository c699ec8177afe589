//! Logistics units delivering relief supplies from a local inventory

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::info;

use super::{ActionOutcome, Role, RoleBehaviour};
use crate::agent::AgentContext;
use crate::disaster::ResourceType;
use crate::task::{SupplyAssignment, TaskType};
use crate::types::{AclMessage, into_content, ontology};

pub type Inventory = BTreeMap<ResourceType, u32>;

/// Replenishment policy for a logistics unit
#[derive(Debug, Clone)]
pub struct Restock {
    /// Stock below this level is topped up on every restock pass.
    pub floor: u32,
    pub amount: u32,
    pub interval: Duration,
}

pub struct LogisticsRole {
    inventory: Inventory,
    restock: Option<Restock>,
    supplies_delivered: u64,
    missions_completed: u32,
}

impl LogisticsRole {
    pub fn new(inventory: Inventory) -> Self {
        Self {
            inventory,
            restock: None,
            supplies_delivered: 0,
            missions_completed: 0,
        }
    }

    pub fn with_restock(mut self, restock: Restock) -> Self {
        self.restock = Some(restock);
        self
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    /// Take `min(requested, on_hand)` of every requested type out of stock.
    /// Types this unit does not carry are delivered as zero.
    pub fn deliver(
        &mut self,
        required: &BTreeMap<ResourceType, u32>,
    ) -> BTreeMap<ResourceType, u32> {
        required
            .iter()
            .map(|(resource, requested)| {
                let delivered = match self.inventory.get_mut(resource) {
                    Some(on_hand) => {
                        let qty = (*requested).min(*on_hand);
                        *on_hand -= qty;
                        qty
                    }
                    None => 0,
                };
                (*resource, delivered)
            })
            .collect()
    }

    /// Raise every carried stock below the floor by the restock amount
    pub fn replenish(&mut self) -> Vec<(ResourceType, u32)> {
        let Some(restock) = &self.restock else {
            return Vec::new();
        };
        let mut topped_up = Vec::new();
        for (resource, on_hand) in self.inventory.iter_mut() {
            if *on_hand < restock.floor {
                *on_hand = on_hand.saturating_add(restock.amount);
                topped_up.push((*resource, *on_hand));
            }
        }
        topped_up
    }
}

#[async_trait]
impl RoleBehaviour for LogisticsRole {
    fn role(&self) -> Role {
        Role::Logistics
    }

    async fn perform(
        &mut self,
        ctx: &mut AgentContext,
        request: &AclMessage,
    ) -> Result<ActionOutcome> {
        let assignment = SupplyAssignment::from_content(&request.content)?;
        ctx.set_status("deployed");
        info!(
            "[{}] [LOGISTICS] DEPLOYED to {} | Supplies: {:?}",
            ctx.name(),
            assignment.disaster_id,
            assignment.required_supplies
        );

        let delivered = self.deliver(&assignment.required_supplies);
        ctx.simulate(2.0 + 0.5 * assignment.required_supplies.len() as f64)
            .await;

        let total: u64 = delivered.values().map(|q| u64::from(*q)).sum();
        self.supplies_delivered += total;
        self.missions_completed += 1;
        info!(
            "[{}] [LOGISTICS] DELIVERY COMPLETE | Delivered: {:?} | Inventory: {:?}",
            ctx.name(),
            delivered,
            self.inventory
        );

        let content = into_content(json!({
            "task_id": assignment.task_id,
            "disaster_id": assignment.disaster_id,
            "task_type": TaskType::Supply,
            "agent_id": ctx.name(),
            "supplies_delivered": delivered,
            "inventory_remaining": self.inventory,
        }));
        Ok(ActionOutcome::new(content).with_ontology(ontology::TASK_COMPLETE))
    }

    fn tick_interval(&self) -> Option<Duration> {
        self.restock.as_ref().map(|r| r.interval)
    }

    async fn on_tick(&mut self, ctx: &mut AgentContext) -> Result<()> {
        for (resource, stock) in self.replenish() {
            info!(
                "[{}] [LOGISTICS] INVENTORY REPLENISHED: {} | New stock: {}",
                ctx.name(),
                resource,
                stock
            );
        }
        Ok(())
    }
}
