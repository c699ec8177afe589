//! Wiring of the agent population onto a transport binding

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::info;

use rescuenet_core::roles::coordinator::CoordinatorSettings;
use rescuenet_core::roles::logistics::Restock;
use rescuenet_core::roles::{
    CoordinatorRole, DisasterSource, FieldRole, HospitalRole, LogisticsRole, RescueRole, SensorRole,
};
use rescuenet_core::{
    AclMessage, AgentReport, AgentRuntime, AgentSupervisor, CoordinationEngine, EngineConfig,
    EngineStatus, MessageStats, MessageTransport, Performative, Role, RoleBehaviour, RuntimeConfig,
    TaskType, mailbox,
};
use rescuenet_transport::{
    AgentAddress, Directory, LocalConnector, LogEntry, TcpConnector, TcpTransport, TransportLog,
    TransportRouter, serve_agent, serve_router,
};

use crate::config::RescueNetConfig;

pub struct AgentSpec {
    pub name: String,
    pub behaviour: Box<dyn RoleBehaviour>,
}

/// Build the configured agent population. Rescue and logistics units are
/// registered in the engine's pools as they are created.
pub fn roster(
    cfg: &RescueNetConfig,
    engine: &mut CoordinationEngine,
    engine_handle: Arc<Mutex<CoordinationEngine>>,
    source: Box<dyn DisasterSource>,
) -> Vec<AgentSpec> {
    let coordinator = cfg.coordinator.name.clone();
    let status_every = Duration::from_secs(cfg.units.status_interval_secs);
    let mut agents = Vec::new();

    let settings = CoordinatorSettings {
        medic: cfg.coordinator.medic.clone(),
        assign_interval: Duration::from_millis(cfg.coordinator.assign_interval_ms.max(1)),
        status_interval: Duration::from_secs(cfg.coordinator.status_interval_secs),
    };
    agents.push(AgentSpec {
        name: coordinator.clone(),
        behaviour: Box::new(CoordinatorRole::new(engine_handle, settings)),
    });

    for i in 1..=cfg.units.rescue_units {
        let name = format!("rescue_{}", i);
        engine.register_agent(&name, TaskType::Rescue);
        let mut role = RescueRole::new(&coordinator);
        if !status_every.is_zero() {
            role = role.with_status_interval(status_every);
        }
        agents.push(AgentSpec {
            name,
            behaviour: Box::new(role),
        });
    }

    for i in 1..=cfg.units.logistics_units {
        let name = format!("logistics_{}", i);
        engine.register_agent(&name, TaskType::Supply);
        let mut role = LogisticsRole::new(cfg.units.initial_stock.clone());
        if cfg.units.replenish_interval_secs > 0 {
            role = role.with_restock(Restock {
                floor: cfg.units.inventory_floor,
                amount: cfg.units.replenish_amount,
                interval: Duration::from_secs(cfg.units.replenish_interval_secs),
            });
        }
        agents.push(AgentSpec {
            name,
            behaviour: Box::new(role),
        });
    }

    for role in [Role::Searcher, Role::Medic, Role::Transporter] {
        for i in 1..=cfg.units.field_units {
            let name = if i == 1 {
                format!("{}_agent", role)
            } else {
                format!("{}_agent_{}", role, i)
            };
            let mut team = FieldRole::new(role);
            if role == Role::Searcher {
                team = team.reporting_to(&coordinator);
            }
            agents.push(AgentSpec {
                name,
                behaviour: Box::new(team),
            });
        }
    }

    if cfg.units.hospital_capacity > 0 {
        let mut hospital = HospitalRole::new(cfg.units.hospital_capacity);
        if !status_every.is_zero() {
            hospital = hospital.with_status_interval(status_every);
        }
        agents.push(AgentSpec {
            name: "hospital_agent".to_string(),
            behaviour: Box::new(hospital),
        });
    }

    agents.push(AgentSpec {
        name: "sensor_agent".to_string(),
        behaviour: Box::new(SensorRole::new(
            &coordinator,
            source,
            Duration::from_secs(cfg.units.sensor_interval_secs.max(1)),
        )),
    });

    agents
}

fn engine_config(cfg: &RescueNetConfig) -> EngineConfig {
    EngineConfig {
        policy: cfg.priority.clone(),
        ..EngineConfig::default()
    }
    .with_timeout_secs(cfg.coordinator.active_task_timeout_secs)
}

/// A running agent population plus the shared pieces the CLI reports on
pub struct Platform {
    pub supervisor: AgentSupervisor,
    pub engine: Arc<Mutex<CoordinationEngine>>,
    pub router: Arc<TransportRouter>,
    pub log: Arc<TransportLog>,
    local: Option<Arc<LocalConnector>>,
    cancel: CancellationToken,
    runtime: RuntimeConfig,
    mailbox_size: usize,
}

impl Platform {
    fn assemble(cfg: &RescueNetConfig, connector: Arc<dyn rescuenet_transport::Connector>) -> Self {
        let log = Arc::new(TransportLog::new());
        let directory = Arc::new(Directory::new());
        let router = Arc::new(TransportRouter::new(directory, log.clone(), connector));
        Self {
            supervisor: AgentSupervisor::new(),
            engine: Arc::new(Mutex::new(CoordinationEngine::new(engine_config(cfg)))),
            router,
            log,
            local: None,
            cancel: CancellationToken::new(),
            runtime: cfg.runtime.runtime_config(),
            mailbox_size: cfg.transport.mailbox_size,
        }
    }

    /// Every agent on an in-process mailbox behind the router
    pub async fn in_process(
        cfg: &RescueNetConfig,
        source: Box<dyn DisasterSource>,
    ) -> Result<Self> {
        let connector = Arc::new(LocalConnector::default());
        let mut platform = Self::assemble(cfg, connector.clone());
        platform.local = Some(connector);

        for spec in platform.roster(cfg, source).await {
            platform.spawn_local(spec.name, spec.behaviour).await?;
        }
        info!("In-process platform started");
        Ok(platform)
    }

    /// The router and every agent on their own TCP listener
    pub async fn tcp(cfg: &RescueNetConfig, source: Box<dyn DisasterSource>) -> Result<Self> {
        let connect_timeout = Duration::from_millis(cfg.transport.connect_timeout_ms);
        let connector = Arc::new(TcpConnector::new(connect_timeout));
        let platform = Self::assemble(cfg, connector);
        let host = cfg.transport.host.clone();
        let router_port = cfg.transport.router_port;
        let max_payload = cfg.transport.max_payload_bytes;

        let listener = TcpListener::bind((host.as_str(), router_port))
            .await
            .with_context(|| format!("Failed to bind router on {}:{}", host, router_port))?;
        tokio::spawn(serve_router(
            listener,
            platform.router.clone(),
            max_payload,
            platform.cancel.child_token(),
        ));

        let router_address = AgentAddress::new(host.clone(), router_port);
        let transport: Arc<dyn MessageTransport> = Arc::new(TcpTransport::new(router_address));

        let mut port = cfg.transport.first_agent_port;
        for spec in platform.roster(cfg, source).await {
            let listener = TcpListener::bind((host.as_str(), port))
                .await
                .with_context(|| format!("Failed to bind {} on {}:{}", spec.name, host, port))?;
            let (tx, rx) = mailbox(platform.mailbox_size);
            tokio::spawn(serve_agent(
                listener,
                spec.name.clone(),
                tx,
                max_payload,
                platform.cancel.child_token(),
            ));
            platform
                .router
                .register(&spec.name, AgentAddress::new(host.clone(), port))
                .await;
            platform
                .supervisor
                .spawn(AgentRuntime::new(
                    spec.name,
                    spec.behaviour,
                    transport.clone(),
                    rx,
                    platform.runtime.clone(),
                ))
                .await?;
            port = port
                .checked_add(1)
                .context("Ran out of ports for agent listeners")?;
        }
        info!("TCP platform started, router on {}:{}", host, router_port);
        Ok(platform)
    }

    async fn roster(
        &self,
        cfg: &RescueNetConfig,
        source: Box<dyn DisasterSource>,
    ) -> Vec<AgentSpec> {
        let mut engine = self.engine.lock().await;
        roster(cfg, &mut engine, self.engine.clone(), source)
    }

    async fn spawn_local(&self, name: String, behaviour: Box<dyn RoleBehaviour>) -> Result<()> {
        let (tx, rx) = mailbox(self.mailbox_size);
        self.attach_local(&name, tx).await?;
        let runtime = AgentRuntime::new(
            name,
            behaviour,
            self.router.clone(),
            rx,
            self.runtime.clone(),
        );
        self.supervisor.spawn(runtime).await
    }

    async fn attach_local(&self, name: &str, tx: mpsc::Sender<AclMessage>) -> Result<()> {
        let connector = self
            .local
            .as_ref()
            .context("Platform is not using the in-process transport")?;
        let address = connector.attach(tx).await;
        self.router.register(name, address).await;
        Ok(())
    }

    /// Register a bare mailbox under `name` (in-process platforms only)
    pub async fn observer(&self, name: &str) -> Result<mpsc::Receiver<AclMessage>> {
        let (tx, rx) = mailbox(self.mailbox_size);
        self.attach_local(name, tx).await?;
        Ok(rx)
    }

    pub async fn status(&self) -> EngineStatus {
        self.engine.lock().await.status()
    }

    /// Stop every agent, then the listeners
    pub async fn shutdown(self, deadline: Duration) -> Summary {
        let reports = self.supervisor.shutdown(deadline).await;
        self.cancel.cancel();
        let status = self.engine.lock().await.status();
        Summary {
            reports,
            status,
            log_len: self.log.len().await,
            log_tail: self.log.tail(10).await,
        }
    }
}

pub struct Summary {
    pub reports: Vec<AgentReport>,
    pub status: EngineStatus,
    pub log_len: usize,
    pub log_tail: Vec<LogEntry>,
}

impl Summary {
    /// Messages sent across all agents, one row per performative
    pub fn sent_by_performative(&self) -> Vec<(Performative, u64)> {
        let mut totals = MessageStats::default();
        for report in &self.reports {
            totals.merge(&report.stats);
        }
        Performative::ALL
            .iter()
            .map(|performative| (*performative, totals.sent_of(*performative)))
            .collect()
    }

    pub fn print(&self) {
        println!("\n=== Agents ===");
        for report in &self.reports {
            println!("  {}", report);
        }

        println!("\n=== Messages sent by performative ===");
        let distribution = self.sent_by_performative();
        for (performative, count) in &distribution {
            println!("  {:<8} {}", performative, count);
        }
        let total: u64 = distribution.iter().map(|(_, count)| count).sum();
        println!("  total    {}", total);

        println!("\n=== Coordination ===");
        println!("  {}", self.status);

        println!(
            "\n=== Transport log (last {} of {}) ===",
            self.log_tail.len(),
            self.log_len
        );
        for entry in &self.log_tail {
            let payload: String = entry.payload.chars().take(120).collect();
            println!(
                "  {} {:<10} {:<22} {}",
                entry.timestamp.format("%H:%M:%S%.3f"),
                entry.direction,
                entry.endpoint,
                payload
            );
        }
    }
}
