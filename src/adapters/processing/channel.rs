//! Channel processor: forwards owned chunks to a downstream consumer.
//!
//! Lets a protocol layer run as its own task instead of inside the
//! drain workers. The channel is bounded, so a slow consumer slows the
//! workers down rather than growing memory.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::{ClientId, ClientRole};
use crate::ports::{InboundChunk, MessageProcessor};

/// Owned copy of an inbound chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub client_id: ClientId,
    pub role: ClientRole,
    pub payload: Vec<u8>,
}

/// Processor that sends every chunk into an `mpsc` channel.
#[derive(Debug, Clone)]
pub struct ChannelProcessor {
    tx: mpsc::Sender<InboundMessage>,
}

impl ChannelProcessor {
    /// Create a processor and the receiving end of its channel.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<InboundMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl MessageProcessor for ChannelProcessor {
    async fn process(&self, chunk: InboundChunk<'_>) -> anyhow::Result<()> {
        let message = InboundMessage {
            client_id: chunk.client_id.clone(),
            role: chunk.role,
            payload: chunk.payload.to_vec(),
        };
        self.tx
            .send(message)
            .await
            .map_err(|_| anyhow::anyhow!("inbound message consumer dropped"))
    }
}
