// ============================================================================
// Messaging - broker connection supervision and per-tenant queues
// ============================================================================

mod connection;
mod errors;
mod kafka;
mod queue;

#[cfg(test)]
pub mod recording;

pub use connection::{BrokerConnection, ConnectionManager, LinkState, ReconnectPolicy};
pub use errors::BrokerError;
pub use kafka::{KafkaDialer, KafkaQueueClient};
pub use queue::{MessageHandler, QueueClient};
