use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use rescuenet_core::{PriorityPolicy, ResourceType, RuntimeConfig};

pub const DEFAULT_CONFIG: &str = include_str!("../../../config/default.toml");

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RescueNetConfig {
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub runtime: RuntimeSection,
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub priority: PriorityPolicy,
    #[serde(default)]
    pub units: UnitsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_router_port")]
    pub router_port: u16,
    /// Agents listen on consecutive ports starting here
    #[serde(default = "default_first_agent_port")]
    pub first_agent_port: u16,
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
    #[serde(default = "default_mailbox_size")]
    pub mailbox_size: usize,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_router_port() -> u16 {
    5000
}

fn default_first_agent_port() -> u16 {
    5001
}

fn default_max_payload_bytes() -> usize {
    1_048_576
}

fn default_mailbox_size() -> usize {
    64
}

fn default_connect_timeout_ms() -> u64 {
    2000
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            router_port: default_router_port(),
            first_agent_port: default_first_agent_port(),
            max_payload_bytes: default_max_payload_bytes(),
            mailbox_size: default_mailbox_size(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeSection {
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
    #[serde(default = "default_action_deadline_secs")]
    pub action_deadline_secs: u64,
    #[serde(default = "default_shutdown_deadline_secs")]
    pub shutdown_deadline_secs: u64,
    /// Multiplier on simulated work pauses; 0 makes every action instant
    #[serde(default = "default_time_scale")]
    pub time_scale: f64,
}

fn default_poll_timeout_ms() -> u64 {
    1000
}

fn default_action_deadline_secs() -> u64 {
    30
}

fn default_shutdown_deadline_secs() -> u64 {
    10
}

fn default_time_scale() -> f64 {
    1.0
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            poll_timeout_ms: default_poll_timeout_ms(),
            action_deadline_secs: default_action_deadline_secs(),
            shutdown_deadline_secs: default_shutdown_deadline_secs(),
            time_scale: default_time_scale(),
        }
    }
}

impl RuntimeSection {
    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            poll_timeout: Duration::from_millis(self.poll_timeout_ms.max(1)),
            action_deadline: Duration::from_secs(self.action_deadline_secs.max(1)),
            time_scale: self.time_scale.max(0.0),
        }
    }

    pub fn shutdown_deadline(&self) -> Duration {
        Duration::from_secs(self.shutdown_deadline_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    #[serde(default = "default_coordinator_name")]
    pub name: String,
    /// Peer that receives treat_victim requests
    #[serde(default = "default_medic")]
    pub medic: String,
    #[serde(default = "default_assign_interval_ms")]
    pub assign_interval_ms: u64,
    #[serde(default = "default_status_interval_secs")]
    pub status_interval_secs: u64,
    /// 0 disables the active task watchdog
    #[serde(default)]
    pub active_task_timeout_secs: u64,
}

fn default_coordinator_name() -> String {
    "coordinator_agent".to_string()
}

fn default_medic() -> String {
    "medic_agent".to_string()
}

fn default_assign_interval_ms() -> u64 {
    1000
}

fn default_status_interval_secs() -> u64 {
    20
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            name: default_coordinator_name(),
            medic: default_medic(),
            assign_interval_ms: default_assign_interval_ms(),
            status_interval_secs: default_status_interval_secs(),
            active_task_timeout_secs: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitsConfig {
    #[serde(default = "default_rescue_units")]
    pub rescue_units: u32,
    #[serde(default = "default_logistics_units")]
    pub logistics_units: u32,
    /// Teams per field role (searcher, medic, transporter)
    #[serde(default = "default_field_units")]
    pub field_units: u32,
    #[serde(default = "default_hospital_capacity")]
    pub hospital_capacity: u32,
    #[serde(default = "default_sensor_interval_secs")]
    pub sensor_interval_secs: u64,
    #[serde(default = "default_unit_status_interval_secs")]
    pub status_interval_secs: u64,
    #[serde(default = "default_inventory_floor")]
    pub inventory_floor: u32,
    #[serde(default = "default_replenish_amount")]
    pub replenish_amount: u32,
    /// 0 disables replenishment
    #[serde(default = "default_replenish_interval_secs")]
    pub replenish_interval_secs: u64,
    #[serde(default = "default_initial_stock")]
    pub initial_stock: BTreeMap<ResourceType, u32>,
}

fn default_rescue_units() -> u32 {
    2
}

fn default_logistics_units() -> u32 {
    1
}

fn default_field_units() -> u32 {
    1
}

fn default_hospital_capacity() -> u32 {
    100
}

fn default_sensor_interval_secs() -> u64 {
    5
}

fn default_unit_status_interval_secs() -> u64 {
    10
}

fn default_inventory_floor() -> u32 {
    100
}

fn default_replenish_amount() -> u32 {
    200
}

fn default_replenish_interval_secs() -> u64 {
    30
}

fn default_initial_stock() -> BTreeMap<ResourceType, u32> {
    ResourceType::ALL.iter().map(|r| (*r, 1000)).collect()
}

impl Default for UnitsConfig {
    fn default() -> Self {
        Self {
            rescue_units: default_rescue_units(),
            logistics_units: default_logistics_units(),
            field_units: default_field_units(),
            hospital_capacity: default_hospital_capacity(),
            sensor_interval_secs: default_sensor_interval_secs(),
            status_interval_secs: default_unit_status_interval_secs(),
            inventory_floor: default_inventory_floor(),
            replenish_amount: default_replenish_amount(),
            replenish_interval_secs: default_replenish_interval_secs(),
            initial_stock: default_initial_stock(),
        }
    }
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".rescuenet")
}

impl RescueNetConfig {
    /// Load from `custom_path`, or from `~/.rescuenet/config.toml`.
    /// A missing file at the default location falls back to built-in
    /// defaults; a missing explicit path is an error.
    pub fn load(custom_path: &Option<PathBuf>) -> Result<Self> {
        let path = match custom_path {
            Some(path) => path.clone(),
            None => {
                let path = config_dir().join("config.toml");
                if !path.exists() {
                    info!("No config at {}, using built-in defaults", path.display());
                    return Self::parse(DEFAULT_CONFIG).context("Built-in config is invalid");
                }
                path
            }
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config at {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);
        let config: Self = toml::from_str(&expanded)?;
        config.validate();
        Ok(config)
    }

    fn validate(&self) {
        if self.units.rescue_units == 0 {
            warn!("No rescue units configured; rescue tasks will stay pending");
        }
        if self.units.logistics_units == 0 {
            warn!("No logistics units configured; supply tasks will stay pending");
        }
        if self.runtime.time_scale < 0.0 {
            warn!(
                "Negative time_scale {} treated as 0",
                self.runtime.time_scale
            );
        }
    }
}

/// Environment variables that may be expanded in config files.
const ALLOWED_ENV_VARS: &[&str] = &[
    "RESCUENET_HOST",
    "RESCUENET_ROUTER_PORT",
    "RESCUENET_TIME_SCALE",
    "HOME",
    "USER",
];

fn expand_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    let mut pos = 0;
    while let Some(start) = result[pos..].find("${") {
        let abs_start = pos + start;
        let Some(end) = result[abs_start..].find('}') else {
            break;
        };
        let var_name = result[abs_start + 2..abs_start + end].to_string();

        if !ALLOWED_ENV_VARS.contains(&var_name.as_str()) {
            warn!(
                "Skipping expansion of unrecognized env var '{}' in config (not in allowlist)",
                var_name
            );
            pos = abs_start + end + 1;
            continue;
        }

        let value = std::env::var(&var_name).unwrap_or_default();
        let tail = &result[abs_start + end + 1..];
        result = format!("{}{}{}", &result[..abs_start], value, tail);
        pos = abs_start + value.len();
    }
    result
}
