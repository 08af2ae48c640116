//! Message Processor Port - Protocol Collaborator Interface
//!
//! Drain workers hand every chunk read from a client to a processor.
//! The core makes no framing assumption: a chunk is whatever a single
//! bounded read returned, so a protocol decoder must buffer partial
//! messages itself.

use async_trait::async_trait;

use crate::domain::{ClientId, ClientRole};

/// One chunk read from a routed client.
#[derive(Debug, Clone, Copy)]
pub struct InboundChunk<'a> {
  /// Routing identifier of the sender.
  pub client_id: &'a ClientId,
  /// Role of the sender.
  pub role: ClientRole,
  /// Raw bytes, at most one drain buffer long.
  pub payload: &'a [u8],
}

/// Consumer of raw inbound bytes.
#[async_trait]
pub trait MessageProcessor: Send + Sync + 'static {
  /// Process one chunk.
  ///
  /// Returning an error tears the sending connection down, exactly as
  /// if the peer had closed it.
  async fn process(&self, chunk: InboundChunk<'_>) -> anyhow::Result<()>;
}
