use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::errors::BrokerError;
use super::queue::{MessageHandler, QueueClient};

#[derive(Debug, Clone, PartialEq)]
pub enum QueueCall {
    Create(String),
    Delete(String),
    Publish(String, serde_json::Value),
    Consume(String),
}

/// Queue client that records every call and fails on demand.
#[derive(Default)]
pub struct RecordingQueueClient {
    calls: Mutex<Vec<QueueCall>>,
    queues: Mutex<HashSet<String>>,
    handlers: Mutex<Vec<(String, MessageHandler)>>,
    pub fail_create: AtomicBool,
    pub fail_delete: AtomicBool,
    pub fail_publish: AtomicBool,
    pub fail_consume: AtomicBool,
}

impl RecordingQueueClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(flag: &AtomicBool) {
        flag.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<QueueCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn has_queue(&self, queue: &str) -> bool {
        self.queues.lock().unwrap().contains(queue)
    }

    /// Hand `body` to every consumer registered on `queue`.
    pub fn deliver(&self, queue: &str, body: &str) -> usize {
        let handlers: Vec<MessageHandler> = self
            .handlers
            .lock()
            .unwrap()
            .iter()
            .filter(|(q, _)| q == queue)
            .map(|(_, h)| h.clone())
            .collect();
        for handler in &handlers {
            handler(body.to_string());
        }
        handlers.len()
    }

    fn record(&self, call: QueueCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl QueueClient for RecordingQueueClient {
    async fn create_queue(&self, queue: &str) -> Result<(), BrokerError> {
        self.record(QueueCall::Create(queue.to_string()));
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(BrokerError::Declare {
                queue: queue.to_string(),
                reason: "access refused".to_string(),
            });
        }
        self.queues.lock().unwrap().insert(queue.to_string());
        Ok(())
    }

    async fn delete_queue(&self, queue: &str) -> Result<(), BrokerError> {
        self.record(QueueCall::Delete(queue.to_string()));
        if self.fail_delete.load(Ordering::SeqCst) || !self.queues.lock().unwrap().remove(queue) {
            return Err(BrokerError::Delete {
                queue: queue.to_string(),
                reason: "unknown queue".to_string(),
            });
        }
        Ok(())
    }

    async fn publish(&self, queue: &str, message: &serde_json::Value) -> Result<(), BrokerError> {
        self.record(QueueCall::Publish(queue.to_string(), message.clone()));
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(BrokerError::Publish {
                queue: queue.to_string(),
                reason: "channel closed".to_string(),
            });
        }
        self.queues.lock().unwrap().insert(queue.to_string());
        Ok(())
    }

    async fn consume(&self, queue: &str, handler: MessageHandler) -> Result<(), BrokerError> {
        self.record(QueueCall::Consume(queue.to_string()));
        if self.fail_consume.load(Ordering::SeqCst) {
            return Err(BrokerError::Consume {
                queue: queue.to_string(),
                reason: "channel closed".to_string(),
            });
        }
        self.handlers
            .lock()
            .unwrap()
            .push((queue.to_string(), handler));
        Ok(())
    }
}
