use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use rescuenet_core::roles::coordinator::CoordinatorSettings;
use rescuenet_core::roles::{
    CoordinatorRole, FieldRole, LogisticsRole, RescueRole, ScriptedSource, SensorRole,
};
use rescuenet_core::{
    AclMessage, AgentRuntime, AgentSupervisor, CoordinationEngine, DisasterEvent, DisasterType,
    EngineConfig, Performative, ResourceType, Role, RoleBehaviour, RuntimeConfig, Severity,
    TaskType, into_content, mailbox,
};
use rescuenet_transport::{Direction, Directory, LocalConnector, TransportLog, TransportRouter};
use serde_json::json;
use tokio::sync::{Mutex, mpsc};

const COORDINATOR: &str = "coordinator_agent";

struct Platform {
    router: Arc<TransportRouter>,
    connector: Arc<LocalConnector>,
    supervisor: AgentSupervisor,
    engine: Arc<Mutex<CoordinationEngine>>,
}

impl Platform {
    async fn new() -> Self {
        let connector = Arc::new(LocalConnector::default());
        let router = Arc::new(TransportRouter::new(
            Arc::new(Directory::new()),
            Arc::new(TransportLog::new()),
            connector.clone(),
        ));
        let platform = Self {
            router,
            connector,
            supervisor: AgentSupervisor::new(),
            engine: Arc::new(Mutex::new(CoordinationEngine::new(EngineConfig::default()))),
        };

        let settings = CoordinatorSettings {
            assign_interval: Duration::from_millis(50),
            ..Default::default()
        };
        let coordinator = CoordinatorRole::new(platform.engine.clone(), settings);
        platform.spawn(COORDINATOR, Box::new(coordinator)).await;
        platform
    }

    async fn spawn(&self, name: &str, role: Box<dyn RoleBehaviour>) {
        let (tx, rx) = mailbox(32);
        let address = self.connector.attach(tx).await;
        self.router.register(name, address).await;
        let config = RuntimeConfig {
            poll_timeout: Duration::from_millis(20),
            action_deadline: Duration::from_secs(5),
            time_scale: 0.0,
        };
        let runtime = AgentRuntime::new(name, role, self.router.clone(), rx, config);
        self.supervisor.spawn(runtime).await.unwrap();
    }

    /// A bare mailbox on the router, for the test to talk through
    async fn observer(&self, name: &str) -> mpsc::Receiver<AclMessage> {
        let (tx, rx) = mailbox(32);
        let address = self.connector.attach(tx).await;
        self.router.register(name, address).await;
        rx
    }
}

async fn next(rx: &mut mpsc::Receiver<AclMessage>) -> AclMessage {
    tokio::time::timeout(Duration::from_secs(3), rx.recv())
        .await
        .expect("no message within 3s")
        .unwrap()
}

#[tokio::test]
async fn test_detection_to_closure() {
    let platform = Platform::new().await;
    {
        let mut engine = platform.engine.lock().await;
        engine.register_agent("rescue_1", TaskType::Rescue);
        engine.register_agent("logistics_1", TaskType::Supply);
    }
    platform
        .spawn("rescue_1", Box::new(RescueRole::new(COORDINATOR)))
        .await;
    let inventory = BTreeMap::from([
        (ResourceType::Water, 5000),
        (ResourceType::Food, 5000),
        (ResourceType::MedicalSupplies, 5000),
    ]);
    platform
        .spawn("logistics_1", Box::new(LogisticsRole::new(inventory)))
        .await;

    let event = DisasterEvent::new(
        DisasterType::Earthquake,
        Severity::High,
        (10.0, 20.0),
        1000,
        20,
        30,
    )
    .with_id("D-QUAKE");
    assert!(event.requires_rescue && event.requires_supplies);
    let source = ScriptedSource::new([event]);
    platform
        .spawn(
            "sensor_agent",
            Box::new(SensorRole::new(COORDINATOR, Box::new(source), Duration::from_millis(30))),
        )
        .await;

    let mut closed = false;
    for _ in 0..150 {
        if platform.engine.lock().await.status().closed_disasters == 1 {
            closed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(closed, "disaster was never closed");

    let status = platform.engine.lock().await.status();
    assert_eq!(status.completed_tasks, 2);
    assert_eq!(status.active_disasters, 0);
    // 20 casualties + 10% of 1000, at 55% for HIGH
    assert_eq!(status.people_rescued, 66);
    assert_eq!(status.available_rescue, 1);
    assert_eq!(status.available_logistics, 1);
    assert!(status.supplies_delivered > 0);

    let reports = platform.supervisor.shutdown(Duration::from_secs(2)).await;
    let coordinator = reports.iter().find(|r| r.name == COORDINATOR).unwrap();
    assert_eq!(coordinator.stats.sent_of(Performative::Request), 2);
    // one detection and two completions
    assert!(coordinator.stats.received_of(Performative::Inform) >= 3);
    assert_eq!(coordinator.stats.received_of(Performative::Agree), 2);

    let log = platform.router.log();
    assert_eq!(log.count(Direction::Unresolved).await, 0);
    assert_eq!(log.count(Direction::Failed).await, 0);
}

#[tokio::test]
async fn test_request_refuse_and_inform() {
    let platform = Platform::new().await;
    platform
        .spawn("medic_agent", Box::new(FieldRole::new(Role::Medic)))
        .await;
    let mut lab = platform.observer("lab_agent").await;

    let refused = AclMessage::new(
        Performative::Request,
        vec!["medic_agent".into()],
        into_content(json!({"action": "evacuate_victim"})),
    )
    .stamped("lab_agent");
    platform.router.route(&refused).await.unwrap();

    let refuse = next(&mut lab).await;
    assert_eq!(refuse.performative, Performative::Refuse);
    assert_eq!(refuse.sender, "medic_agent");
    assert_eq!(refuse.conversation_id, refused.conversation_id);
    let in_reply_to = refuse.in_reply_to.as_deref();
    assert_eq!(in_reply_to, Some(refused.reply_with.as_str()));
    assert_eq!(refuse.content_str("reason"), Some("cannot_perform"));

    let accepted = AclMessage::new(
        Performative::Request,
        vec!["medic_agent".into()],
        into_content(json!({"action": "treat_victim", "victim_id": "V-7"})),
    )
    .stamped("lab_agent");
    platform.router.route(&accepted).await.unwrap();

    let agree = next(&mut lab).await;
    assert_eq!(agree.performative, Performative::Agree);
    let inform = next(&mut lab).await;
    assert_eq!(inform.performative, Performative::Inform);
    assert_eq!(inform.conversation_id, accepted.conversation_id);
    assert_eq!(inform.content_str("result"), Some("action_completed"));
    assert_eq!(inform.content["request"]["victim_id"], "V-7");

    let reports = platform.supervisor.shutdown(Duration::from_secs(2)).await;
    let medic = reports.iter().find(|r| r.name == "medic_agent").unwrap();
    assert_eq!(medic.stats.received_of(Performative::Request), 2);
    assert_eq!(medic.stats.sent_of(Performative::Refuse), 1);
    assert_eq!(medic.open_conversations, 0);
}

#[tokio::test]
async fn test_victim_report_reaches_medic() {
    let platform = Platform::new().await;
    platform
        .spawn(
            "searcher_agent",
            Box::new(FieldRole::new(Role::Searcher).reporting_to(COORDINATOR)),
        )
        .await;
    let mut medic = platform.observer("medic_agent").await;

    let search = AclMessage::new(
        Performative::Request,
        vec!["searcher_agent".into()],
        into_content(json!({
            "action": "search_area",
            "area": [3.0, 4.0],
            "victim": {"victim_id": "V-42", "priority": "high"},
        })),
    )
    .stamped("lab_agent");
    platform.router.route(&search).await.unwrap();

    let request = next(&mut medic).await;
    assert_eq!(request.performative, Performative::Request);
    assert_eq!(request.sender, COORDINATOR);
    assert_eq!(request.action(), "treat_victim");
    assert_eq!(request.content["victim_id"], "V-42");
    assert_eq!(request.content["priority"], "high");
    assert_eq!(request.content["location"], json!([3.0, 4.0]));

    platform.supervisor.shutdown(Duration::from_secs(2)).await;
}
