//! Outbound message seam between agents and whatever carries their traffic

use anyhow::Result;
use async_trait::async_trait;

use crate::types::AclMessage;

/// Hands a stamped message to the delivery layer.
///
/// Implementations live outside this crate (TCP, in-process). A returned
/// error means the transport could not accept the message at all; per
/// receiver delivery failures are the transport's own business.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn send(&self, message: AclMessage) -> Result<()>;
}
