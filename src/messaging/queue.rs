use async_trait::async_trait;
use std::sync::Arc;

use super::errors::BrokerError;

/// Callback invoked with the raw body of every delivered message.
///
/// Delivery is acknowledged before the handler runs, so any error handling
/// has to happen inside the handler.
pub type MessageHandler = Arc<dyn Fn(String) + Send + Sync>;

/// Queue operations the tenant lifecycle needs from the broker.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Declare a durable queue. Declaring an existing queue succeeds.
    async fn create_queue(&self, queue: &str) -> Result<(), BrokerError>;

    /// Delete a queue unconditionally. A missing queue is an error.
    async fn delete_queue(&self, queue: &str) -> Result<(), BrokerError>;

    /// Encode `message` as JSON and publish it without waiting for delivery
    /// confirmation. The queue is declared first if absent.
    async fn publish(&self, queue: &str, message: &serde_json::Value) -> Result<(), BrokerError>;

    /// Register a background subscriber that runs until its queue is deleted
    /// or its connection closes.
    async fn consume(&self, queue: &str, handler: MessageHandler) -> Result<(), BrokerError>;

    /// Declare the queue, then attach a consumer.
    ///
    /// A consumer failure leaves the declared queue behind; cleanup is up to
    /// the caller.
    async fn start_queue(&self, queue: &str, handler: MessageHandler) -> Result<(), BrokerError> {
        self.create_queue(queue).await?;
        self.consume(queue, handler).await
    }
}
