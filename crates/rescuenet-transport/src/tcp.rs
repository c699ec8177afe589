//! TCP binding: one framed payload per connection (connect, write, close)

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use rescuenet_core::{AclMessage, MessageTransport};

use crate::directory::AgentAddress;
use crate::router::{Connector, TransportRouter};

/// Maximum frame size (1MB) accepted from a peer
pub const DEFAULT_MAX_PAYLOAD: usize = 1_048_576;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a peer may keep a connection open before its frame is complete
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Read one whole frame: everything the peer writes before closing.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: R, max_payload: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader
        .take(max_payload as u64 + 1)
        .read_to_end(&mut buf)
        .await
        .context("Failed to read frame")?;
    if buf.len() > max_payload {
        anyhow::bail!("Frame exceeds {} bytes", max_payload);
    }
    Ok(buf)
}

/// `read_frame` bounded in time. A peer that never closes its side is cut off.
pub async fn read_frame_within<R: AsyncRead + Unpin>(
    reader: R,
    max_payload: usize,
    read_timeout: Duration,
) -> Result<Vec<u8>> {
    tokio::time::timeout(read_timeout, read_frame(reader, max_payload))
        .await
        .with_context(|| format!("Timed out after {:?} reading frame", read_timeout))?
}

#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl TcpConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn deliver(&self, address: &AgentAddress, payload: &[u8]) -> Result<()> {
        let mut stream = tokio::time::timeout(
            self.connect_timeout,
            TcpStream::connect((address.host.as_str(), address.port)),
        )
        .await
        .with_context(|| format!("Timed out connecting to {}", address))?
        .with_context(|| format!("Failed to connect to {}", address))?;

        stream.write_all(payload).await?;
        stream.shutdown().await?;
        Ok(())
    }
}

/// Accept frames for the router until `cancel` fires. Each connection is
/// read on its own task.
pub async fn serve_router(
    listener: TcpListener,
    router: Arc<TransportRouter>,
    max_payload: usize,
    cancel: CancellationToken,
) -> Result<()> {
    info!("Transport router listening on {}", listener.local_addr()?);
    loop {
        let (stream, peer) = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("Router accept failed: {}", e);
                    continue;
                }
            },
        };

        let router = router.clone();
        tokio::spawn(async move {
            match read_frame_within(stream, max_payload, DEFAULT_READ_TIMEOUT).await {
                Ok(frame) => {
                    router.route_bytes(&peer.to_string(), &frame).await;
                }
                Err(e) => warn!("Dropping frame from {}: {:#}", peer, e),
            }
        });
    }
    info!("Transport router stopped");
    Ok(())
}

/// Accept frames addressed to one agent and push them into its mailbox.
pub async fn serve_agent(
    listener: TcpListener,
    name: String,
    inbox: mpsc::Sender<AclMessage>,
    max_payload: usize,
    cancel: CancellationToken,
) -> Result<()> {
    debug!("[{}] listening on {}", name, listener.local_addr()?);
    loop {
        let (stream, peer) = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("[{}] accept failed: {}", name, e);
                    continue;
                }
            },
        };

        let inbox = inbox.clone();
        let name = name.clone();
        tokio::spawn(async move {
            let frame = match read_frame_within(stream, max_payload, DEFAULT_READ_TIMEOUT).await {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("[{}] dropping frame from {}: {:#}", name, peer, e);
                    return;
                }
            };
            match AclMessage::from_wire(&frame) {
                Ok(message) => {
                    if inbox.send(message).await.is_err() {
                        debug!("[{}] mailbox closed, frame dropped", name);
                    }
                }
                Err(e) => warn!("[{}] protocol violation from {}: {}", name, peer, e),
            }
        });
    }
    Ok(())
}

/// Agent side of the TCP binding: every message goes to the router, which
/// fans it out.
pub struct TcpTransport {
    router: AgentAddress,
    connector: TcpConnector,
}

impl TcpTransport {
    pub fn new(router: AgentAddress) -> Self {
        Self {
            router,
            connector: TcpConnector::default(),
        }
    }
}

#[async_trait]
impl MessageTransport for TcpTransport {
    async fn send(&self, message: AclMessage) -> Result<()> {
        let payload = message.to_wire()?;
        self.connector.deliver(&self.router, &payload).await
    }
}
