use std::time::Duration;

// ============================================================================
// Broker Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("failed to connect to broker at {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("broker unavailable: {0}")]
    Unavailable(String),

    #[error("failed to declare queue '{queue}': {reason}")]
    Declare { queue: String, reason: String },

    #[error("failed to delete queue '{queue}': {reason}")]
    Delete { queue: String, reason: String },

    #[error("failed to publish message to queue '{queue}': {reason}")]
    Publish { queue: String, reason: String },

    #[error("failed to register consumer for queue '{queue}': {reason}")]
    Consume { queue: String, reason: String },

    #[error("{operation} on queue '{queue}' timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        queue: String,
        timeout: Duration,
    },

    #[error("failed to flush pending messages: {0}")]
    Flush(String),

    #[error("failed to marshal message for queue '{queue}': {source}")]
    Encode {
        queue: String,
        #[source]
        source: serde_json::Error,
    },
}

impl BrokerError {
    /// Connection-level failure (as opposed to a failed queue operation)
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            BrokerError::Connect { .. } | BrokerError::Unavailable(_) | BrokerError::Timeout { .. }
        )
    }
}
