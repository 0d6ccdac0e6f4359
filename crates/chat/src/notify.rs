use std::sync::Arc;

use async_trait::async_trait;

use crate::events::OutboundMessage;
use crate::transport::{ChatTransport, TransportError};

/// One-way delivery of plain notifications, used by the reconciliation loop
/// and for admin notices.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, identity: &str, text: &str) -> Result<(), TransportError>;
}

pub struct TransportSink<T> {
    transport: Arc<T>,
}

impl<T: ChatTransport> TransportSink<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl<T: ChatTransport> NotificationSink for TransportSink<T> {
    async fn notify(&self, identity: &str, text: &str) -> Result<(), TransportError> {
        self.transport.send(identity, OutboundMessage::plain(text)).await
    }
}
