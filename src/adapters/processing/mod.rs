//! Message Processor Adapters
//!
//! - `LogProcessor`: logs each chunk as text
//! - `ChannelProcessor`: forwards chunks to a consumer task

pub mod channel;
pub mod log;

pub use channel::{ChannelProcessor, InboundMessage};
pub use self::log::LogProcessor;
