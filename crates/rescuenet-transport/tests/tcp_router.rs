use std::sync::Arc;
use std::time::Duration;

use rescuenet_core::{AclMessage, MessageTransport, Performative, into_content, mailbox};
use rescuenet_transport::{
    AgentAddress, Connector, DEFAULT_MAX_PAYLOAD, Direction, Directory, TcpConnector, TcpTransport,
    TransportLog, TransportRouter, serve_agent, serve_router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_log(log: &TransportLog, entries: usize) {
    for _ in 0..100 {
        if log.len().await >= entries {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("transport log never reached {} entries", entries);
}

#[tokio::test]
async fn test_router_fans_out_over_loopback() {
    let cancel = CancellationToken::new();
    let directory = Arc::new(Directory::new());
    let log = Arc::new(TransportLog::new());
    let router = Arc::new(TransportRouter::new(
        directory.clone(),
        log.clone(),
        Arc::new(TcpConnector::new(Duration::from_millis(500))),
    ));

    let router_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let router_port = router_listener.local_addr().unwrap().port();
    tokio::spawn(serve_router(
        router_listener,
        router.clone(),
        DEFAULT_MAX_PAYLOAD,
        cancel.clone(),
    ));

    let mut inboxes = Vec::new();
    for name in ["medic_agent", "transporter_agent"] {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = mailbox(8);
        tokio::spawn(serve_agent(
            listener,
            name.to_string(),
            tx,
            DEFAULT_MAX_PAYLOAD,
            cancel.clone(),
        ));
        directory.register(name, AgentAddress::new("127.0.0.1", port)).await;
        inboxes.push(rx);
    }
    // registered but nobody listening
    let dead_port = free_port().await;
    directory
        .register("searcher_agent", AgentAddress::new("127.0.0.1", dead_port))
        .await;

    let message = AclMessage::new(
        Performative::Request,
        vec![
            "searcher_agent".into(),
            "medic_agent".into(),
            "ghost_agent".into(),
            "transporter_agent".into(),
        ],
        into_content(json!({"action": "treat_victim", "victim_id": "V-1"})),
    )
    .stamped("coordinator_agent");

    let transport = TcpTransport::new(AgentAddress::new("127.0.0.1", router_port));
    transport.send(message.clone()).await.unwrap();

    for inbox in inboxes.iter_mut() {
        let received = tokio::time::timeout(Duration::from_secs(3), inbox.recv())
            .await
            .expect("delivery timed out")
            .unwrap();
        assert_eq!(received.conversation_id, message.conversation_id);
        assert_eq!(received.content_str("victim_id"), Some("V-1"));
    }

    // incoming + failed + outgoing + unresolved + outgoing
    wait_for_log(&log, 5).await;
    assert_eq!(log.count(Direction::Incoming).await, 1);
    assert_eq!(log.count(Direction::Outgoing).await, 2);
    assert_eq!(log.count(Direction::Failed).await, 1);
    assert_eq!(log.count(Direction::Unresolved).await, 1);

    cancel.cancel();
}

#[tokio::test]
async fn test_router_drops_garbage_frames() {
    let cancel = CancellationToken::new();
    let log = Arc::new(TransportLog::new());
    let router = Arc::new(TransportRouter::new(
        Arc::new(Directory::new()),
        log.clone(),
        Arc::new(TcpConnector::default()),
    ));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = AgentAddress::new("127.0.0.1", listener.local_addr().unwrap().port());
    tokio::spawn(serve_router(listener, router, DEFAULT_MAX_PAYLOAD, cancel.clone()));

    TcpConnector::default()
        .deliver(&address, br#"{"performative":"yell"}"#)
        .await
        .unwrap();

    wait_for_log(&log, 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let entries = log.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].direction, Direction::Incoming);
    assert!(entries[0].payload.contains("yell"));

    cancel.cancel();
}
