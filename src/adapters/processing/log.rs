//! Logging processor: decodes each chunk as text and logs it.

use async_trait::async_trait;
use tracing::info;

use crate::ports::{InboundChunk, MessageProcessor};

/// Default processor used until a protocol decoder is plugged in.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProcessor;

#[async_trait]
impl MessageProcessor for LogProcessor {
    async fn process(&self, chunk: InboundChunk<'_>) -> anyhow::Result<()> {
        let text = String::from_utf8_lossy(chunk.payload);
        info!(
            client_id = %chunk.client_id,
            role = chunk.role.label(),
            bytes = chunk.payload.len(),
            text = %text.trim(),
            "Received message"
        );
        Ok(())
    }
}
