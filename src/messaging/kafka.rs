use async_trait::async_trait;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication, TopicResult};
use rdkafka::client::ClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, ConsumerContext, StreamConsumer};
use rdkafka::error::{KafkaError, KafkaResult, RDKafkaErrorCode};
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::Message;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::AbortHandle;

use crate::metrics::Metrics;

use super::connection::{BrokerConnection, ConnectionManager, Dialer};
use super::errors::BrokerError;
use super::queue::{MessageHandler, QueueClient};

// ============================================================================
// Kafka-protocol broker (Redpanda / Kafka) via rdkafka
// ============================================================================
//
// Queue primitives map onto topics:
// - declare  -> admin create_topics (existing topic counts as declared)
// - delete   -> admin delete_topics, then stop the queue's consumer
// - publish  -> producer enqueue, delivery report not awaited
// - consume  -> consumer group named after the queue, offsets auto-committed
//
// ============================================================================

const CONTENT_TYPE: &str = "text/plain";

/// Client context shared by every rdkafka client of one connection.
///
/// librdkafka reports `AllBrokersDown` through the error callback; that is
/// treated as the connection being closed.
#[derive(Clone)]
pub struct LinkContext {
    closed: Arc<watch::Sender<bool>>,
}

impl LinkContext {
    fn new() -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            closed: Arc::new(closed),
        }
    }
}

impl ClientContext for LinkContext {
    fn error(&self, error: KafkaError, reason: &str) {
        if error.rdkafka_error_code() == Some(RDKafkaErrorCode::AllBrokersDown) {
            tracing::warn!(reason = reason, "All brokers down, marking connection closed");
            self.closed.send_replace(true);
        } else {
            tracing::error!(error = %error, reason = reason, "Broker client error");
        }
    }
}

impl ConsumerContext for LinkContext {}

/// Topic-level primitives of one broker connection.
#[async_trait]
pub trait TopicLink: BrokerConnection {
    async fn create_topic(&self, topic: &str, timeout: Duration) -> KafkaResult<Vec<TopicResult>>;

    async fn delete_topic(&self, topic: &str, timeout: Duration) -> KafkaResult<Vec<TopicResult>>;

    /// Enqueue `body` on the producer without waiting for the delivery report.
    fn send(&self, topic: &str, body: &[u8]) -> KafkaResult<()>;

    /// Auto-committing consumer in the group named after `topic`.
    fn consumer(&self, topic: &str) -> KafkaResult<StreamConsumer<LinkContext>>;

    /// Block until queued messages are delivered or `timeout` passes.
    fn flush(&self, timeout: Duration) -> KafkaResult<()>;
}

pub struct KafkaConnection {
    bootstrap_servers: String,
    context: LinkContext,
    producer: FutureProducer<LinkContext>,
    admin: AdminClient<LinkContext>,
}

#[async_trait]
impl BrokerConnection for KafkaConnection {
    async fn closed(&self) {
        let mut rx = self.context.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

#[async_trait]
impl TopicLink for KafkaConnection {
    async fn create_topic(&self, topic: &str, timeout: Duration) -> KafkaResult<Vec<TopicResult>> {
        let new_topic = NewTopic::new(topic, 1, TopicReplication::Fixed(1));
        let opts = AdminOptions::new().operation_timeout(Some(timeout));
        self.admin.create_topics(&[new_topic], &opts).await
    }

    async fn delete_topic(&self, topic: &str, timeout: Duration) -> KafkaResult<Vec<TopicResult>> {
        let opts = AdminOptions::new().operation_timeout(Some(timeout));
        self.admin.delete_topics(&[topic], &opts).await
    }

    fn send(&self, topic: &str, body: &[u8]) -> KafkaResult<()> {
        let record = FutureRecord::<(), [u8]>::to(topic)
            .payload(body)
            .headers(OwnedHeaders::new().insert(Header {
                key: "content-type",
                value: Some(CONTENT_TYPE),
            }));

        // The delivery future is dropped; librdkafka still delivers the message
        self.producer.send_result(record).map(|_delivery| ()).map_err(|(e, _)| e)
    }

    fn consumer(&self, topic: &str) -> KafkaResult<StreamConsumer<LinkContext>> {
        ClientConfig::new()
            .set("bootstrap.servers", &self.bootstrap_servers)
            .set("group.id", topic)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "earliest")
            .create_with_context(self.context.clone())
    }

    fn flush(&self, timeout: Duration) -> KafkaResult<()> {
        self.producer.flush(timeout)
    }
}

pub struct KafkaDialer {
    /// Bounds the metadata probe of a fresh connection and message delivery.
    pub operation_timeout: Duration,
}

impl KafkaDialer {
    /// Undelivered messages expire after the operation timeout.
    fn producer_config(&self, url: &str) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", url)
            .set("message.timeout.ms", self.operation_timeout.as_millis().to_string());
        config
    }
}

#[async_trait]
impl Dialer for KafkaDialer {
    type Connection = KafkaConnection;

    async fn dial(&self, url: &str) -> Result<Arc<KafkaConnection>, BrokerError> {
        let connect_err = |e: KafkaError| BrokerError::Connect {
            url: url.to_string(),
            reason: e.to_string(),
        };

        let context = LinkContext::new();

        let producer: FutureProducer<LinkContext> = self
            .producer_config(url)
            .create_with_context(context.clone())
            .map_err(connect_err)?;
        let admin: AdminClient<LinkContext> = ClientConfig::new()
            .set("bootstrap.servers", url)
            .create_with_context(context.clone())
            .map_err(connect_err)?;

        // Client creation is lazy; fetching metadata proves a broker answers
        let probe = producer.clone();
        let timeout = self.operation_timeout;
        tokio::task::spawn_blocking(move || probe.client().fetch_metadata(None, timeout).map(|_| ()))
            .await
            .map_err(|e| BrokerError::Connect {
                url: url.to_string(),
                reason: e.to_string(),
            })?
            .map_err(connect_err)?;

        Ok(Arc::new(KafkaConnection {
            bootstrap_servers: url.to_string(),
            context,
            producer,
            admin,
        }))
    }
}

/// Running consumer tasks keyed by queue name.
#[derive(Default)]
struct ConsumerRegistry {
    tasks: Mutex<HashMap<String, AbortHandle>>,
}

impl ConsumerRegistry {
    /// Track the consumer of `queue`, replacing (and stopping) any previous one.
    async fn register(&self, queue: &str, task: AbortHandle) {
        if let Some(previous) = self.tasks.lock().await.insert(queue.to_string(), task) {
            previous.abort();
        }
    }

    /// Stop the consumer of `queue`. Returns whether one was registered.
    async fn stop(&self, queue: &str) -> bool {
        match self.tasks.lock().await.remove(queue) {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }
}

pub struct KafkaQueueClient<C = KafkaConnection> {
    connections: Arc<ConnectionManager<C>>,
    operation_timeout: Duration,
    consumers: ConsumerRegistry,
    metrics: Arc<Metrics>,
}

impl<C: TopicLink> KafkaQueueClient<C> {
    pub fn new(connections: Arc<ConnectionManager<C>>, operation_timeout: Duration, metrics: Arc<Metrics>) -> Self {
        Self {
            connections,
            operation_timeout,
            consumers: ConsumerRegistry::default(),
            metrics,
        }
    }

    /// Wait for every enqueued message to be delivered.
    ///
    /// Publishing never waits on its own, so short-lived processes call this
    /// before exiting.
    pub async fn flush(&self) -> Result<(), BrokerError> {
        let conn = self.connections.current().await?;
        let timeout = self.operation_timeout;

        tokio::task::spawn_blocking(move || conn.flush(timeout))
            .await
            .map_err(|e| BrokerError::Flush(e.to_string()))?
            .map_err(|e| BrokerError::Flush(e.to_string()))
    }

    async fn bounded<F: Future>(
        &self,
        operation: &'static str,
        queue: &str,
        fut: F,
    ) -> Result<F::Output, BrokerError> {
        tokio::time::timeout(self.operation_timeout, fut)
            .await
            .map_err(|_| BrokerError::Timeout {
                operation,
                queue: queue.to_string(),
                timeout: self.operation_timeout,
            })
    }
}

/// Per-topic results of a declare; an existing topic counts as declared.
fn declare_outcome(queue: &str, results: Vec<TopicResult>) -> Result<(), BrokerError> {
    for result in results {
        match result {
            Ok(_) => tracing::debug!(queue = %queue, "Queue declared"),
            Err((_, RDKafkaErrorCode::TopicAlreadyExists)) => {
                tracing::debug!(queue = %queue, "Queue already declared")
            }
            Err((_, code)) => {
                return Err(BrokerError::Declare {
                    queue: queue.to_string(),
                    reason: code.to_string(),
                })
            }
        }
    }
    Ok(())
}

/// Per-topic results of a delete; an unknown topic is an error.
fn delete_outcome(queue: &str, results: Vec<TopicResult>) -> Result<(), BrokerError> {
    match results.into_iter().find_map(Result::err) {
        Some((_, code)) => Err(BrokerError::Delete {
            queue: queue.to_string(),
            reason: code.to_string(),
        }),
        None => Ok(()),
    }
}

#[async_trait]
impl<C: TopicLink> QueueClient for KafkaQueueClient<C> {
    async fn create_queue(&self, queue: &str) -> Result<(), BrokerError> {
        let conn = self.connections.current().await?;

        let results = self
            .bounded("declare", queue, conn.create_topic(queue, self.operation_timeout))
            .await?
            .map_err(|e| BrokerError::Declare {
                queue: queue.to_string(),
                reason: e.to_string(),
            })?;

        declare_outcome(queue, results)
    }

    async fn delete_queue(&self, queue: &str) -> Result<(), BrokerError> {
        let conn = self.connections.current().await?;

        let deleted = match self
            .bounded("delete", queue, conn.delete_topic(queue, self.operation_timeout))
            .await
        {
            Ok(Ok(results)) => delete_outcome(queue, results),
            Ok(Err(e)) => Err(BrokerError::Delete {
                queue: queue.to_string(),
                reason: e.to_string(),
            }),
            Err(timeout) => Err(timeout),
        };

        // The tenant is going away either way; its consumer must not outlive it
        if self.consumers.stop(queue).await {
            tracing::info!(queue = %queue, "Consumer stopped");
        }

        deleted?;
        tracing::debug!(queue = %queue, "Queue deleted");
        Ok(())
    }

    async fn publish(&self, queue: &str, message: &serde_json::Value) -> Result<(), BrokerError> {
        self.create_queue(queue).await.map_err(|e| match e {
            BrokerError::Declare { queue, reason } => BrokerError::Publish {
                queue,
                reason: format!("failed to declare queue: {}", reason),
            },
            other => other,
        })?;

        let body = serde_json::to_vec(message).map_err(|source| BrokerError::Encode {
            queue: queue.to_string(),
            source,
        })?;

        let conn = self.connections.current().await?;
        conn.send(queue, &body).map_err(|e| BrokerError::Publish {
            queue: queue.to_string(),
            reason: e.to_string(),
        })?;

        tracing::debug!(queue = %queue, bytes = body.len(), "Message enqueued");
        Ok(())
    }

    async fn consume(&self, queue: &str, handler: MessageHandler) -> Result<(), BrokerError> {
        let consume_err = |e: KafkaError| BrokerError::Consume {
            queue: queue.to_string(),
            reason: e.to_string(),
        };

        let conn = self.connections.current().await?;
        let consumer = conn.consumer(queue).map_err(consume_err)?;
        consumer.subscribe(&[queue]).map_err(consume_err)?;

        let task = tokio::spawn(run_consumer(
            conn,
            consumer,
            queue.to_string(),
            handler,
            self.metrics.clone(),
        ));
        self.consumers.register(queue, task.abort_handle()).await;

        Ok(())
    }
}

/// Deliver messages to `handler` until the topic disappears or the owning
/// connection closes.
async fn run_consumer<C: BrokerConnection>(
    conn: Arc<C>,
    consumer: StreamConsumer<LinkContext>,
    queue: String,
    handler: MessageHandler,
    metrics: Arc<Metrics>,
) {
    tracing::info!(queue = %queue, "Consumer started");

    loop {
        tokio::select! {
            _ = conn.closed() => {
                tracing::warn!(queue = %queue, "Broker connection closed, consumer stopped");
                return;
            }
            received = consumer.recv() => match received {
                Ok(message) => {
                    let body = message
                        .payload()
                        .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                        .unwrap_or_default();
                    metrics.messages_consumed.inc();
                    handler(body);
                }
                Err(e) if e.rdkafka_error_code() == Some(RDKafkaErrorCode::UnknownTopicOrPartition) => {
                    tracing::info!(queue = %queue, "Queue no longer exists, consumer stopped");
                    return;
                }
                Err(e) => {
                    tracing::warn!(queue = %queue, error = %e, "Failed to receive message");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::connection::tests::policy;
    use crate::messaging::{LinkState, ReconnectPolicy};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    /// Connection whose admin results are set by the test and whose producer
    /// records what it was given.
    struct ScriptedLink {
        closed: watch::Sender<bool>,
        create_error: std::sync::Mutex<Option<RDKafkaErrorCode>>,
        sent: std::sync::Mutex<Vec<(String, Vec<u8>)>>,
        flushes: AtomicU32,
    }

    impl ScriptedLink {
        fn new() -> Self {
            let (closed, _) = watch::channel(false);
            Self {
                closed,
                create_error: std::sync::Mutex::new(None),
                sent: std::sync::Mutex::new(Vec::new()),
                flushes: AtomicU32::new(0),
            }
        }

        fn fail_create(&self, code: RDKafkaErrorCode) {
            *self.create_error.lock().unwrap() = Some(code);
        }

        fn sent(&self) -> Vec<(String, Vec<u8>)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BrokerConnection for ScriptedLink {
        async fn closed(&self) {
            let mut rx = self.closed.subscribe();
            let _ = rx.wait_for(|closed| *closed).await;
        }
    }

    #[async_trait]
    impl TopicLink for ScriptedLink {
        async fn create_topic(&self, topic: &str, _timeout: Duration) -> KafkaResult<Vec<TopicResult>> {
            let result = match self.create_error.lock().unwrap().clone() {
                Some(code) => Err((topic.to_string(), code)),
                None => Ok(topic.to_string()),
            };
            Ok(vec![result])
        }

        async fn delete_topic(&self, topic: &str, _timeout: Duration) -> KafkaResult<Vec<TopicResult>> {
            Ok(vec![Ok(topic.to_string())])
        }

        fn send(&self, topic: &str, body: &[u8]) -> KafkaResult<()> {
            self.sent.lock().unwrap().push((topic.to_string(), body.to_vec()));
            Ok(())
        }

        fn consumer(&self, _topic: &str) -> KafkaResult<StreamConsumer<LinkContext>> {
            Err(KafkaError::ClientCreation("no consumers in tests".to_string()))
        }

        fn flush(&self, _timeout: Duration) -> KafkaResult<()> {
            self.flushes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Hands out the same link once; every redial fails.
    struct ScriptedDialer {
        link: Arc<ScriptedLink>,
        dials: AtomicU32,
    }

    #[async_trait]
    impl Dialer for ScriptedDialer {
        type Connection = ScriptedLink;

        async fn dial(&self, url: &str) -> Result<Arc<ScriptedLink>, BrokerError> {
            if self.dials.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(self.link.clone())
            } else {
                Err(BrokerError::Connect {
                    url: url.to_string(),
                    reason: "connection refused".to_string(),
                })
            }
        }
    }

    type Fixture = (
        KafkaQueueClient<ScriptedLink>,
        Arc<ScriptedLink>,
        Arc<ConnectionManager<ScriptedLink>>,
    );

    async fn client_with(reconnect: ReconnectPolicy) -> Fixture {
        let link = Arc::new(ScriptedLink::new());
        let dialer = ScriptedDialer {
            link: link.clone(),
            dials: AtomicU32::new(0),
        };
        let metrics = Arc::new(Metrics::new().unwrap());
        let manager = Arc::new(
            ConnectionManager::connect(dialer, "broker:9092", reconnect, metrics.clone())
                .await
                .unwrap(),
        );
        let client = KafkaQueueClient::new(manager.clone(), Duration::from_secs(1), metrics);
        (client, link, manager)
    }

    async fn wait_for_lost(manager: &ConnectionManager<ScriptedLink>) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !matches!(manager.state(), LinkState::Lost) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("link never reported lost");
    }

    #[test]
    fn test_declare_existing_topic_succeeds() {
        let results = vec![Err(("t.process".to_string(), RDKafkaErrorCode::TopicAlreadyExists))];
        assert!(declare_outcome("t.process", results).is_ok());
        assert!(declare_outcome("t.process", vec![Ok("t.process".to_string())]).is_ok());
    }

    #[test]
    fn test_declare_failure_is_declare_error() {
        let results = vec![Err(("t.process".to_string(), RDKafkaErrorCode::TopicAuthorizationFailed))];
        let err = declare_outcome("t.process", results).unwrap_err();
        assert!(matches!(err, BrokerError::Declare { ref queue, .. } if queue == "t.process"));
    }

    #[test]
    fn test_delete_unknown_topic_is_delete_error() {
        let results = vec![Err(("t.process".to_string(), RDKafkaErrorCode::UnknownTopicOrPartition))];
        let err = delete_outcome("t.process", results).unwrap_err();
        assert!(matches!(err, BrokerError::Delete { ref queue, .. } if queue == "t.process"));
        assert!(delete_outcome("t.process", vec![Ok("t.process".to_string())]).is_ok());
    }

    #[test]
    fn test_producer_message_timeout_follows_operation_timeout() {
        let dialer = KafkaDialer {
            operation_timeout: Duration::from_millis(750),
        };
        let config = dialer.producer_config("broker:9092");

        assert_eq!(config.get("message.timeout.ms"), Some("750"));
        assert_eq!(config.get("bootstrap.servers"), Some("broker:9092"));
    }

    #[tokio::test]
    async fn test_publish_declares_and_enqueues_json() {
        let (client, link, _manager) = client_with(policy(3, 10)).await;

        client.publish("t.process", &json!({"a": 1})).await.unwrap();

        let sent = link.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "t.process");
        assert_eq!(serde_json::from_slice::<serde_json::Value>(&sent[0].1).unwrap(), json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_publish_declare_failure_is_publish_error() {
        let (client, link, _manager) = client_with(policy(3, 10)).await;
        link.fail_create(RDKafkaErrorCode::TopicAuthorizationFailed);

        let err = client.publish("t.process", &json!("x")).await.unwrap_err();

        assert!(matches!(err, BrokerError::Publish { ref queue, .. } if queue == "t.process"));
        assert!(link.sent().is_empty());
    }

    #[tokio::test]
    async fn test_consumer_creation_failure_is_consume_error() {
        let (client, _link, _manager) = client_with(policy(3, 10)).await;

        let handler: MessageHandler = Arc::new(|_| {});
        let err = client.consume("t.process", handler).await.unwrap_err();

        assert!(matches!(err, BrokerError::Consume { .. }));
    }

    #[tokio::test]
    async fn test_operations_fail_unavailable_once_link_is_lost() {
        let mut disabled = policy(3, 10);
        disabled.enabled = false;
        let (client, link, manager) = client_with(disabled).await;

        link.closed.send_replace(true);
        wait_for_lost(&manager).await;

        let err = client.create_queue("t.process").await.unwrap_err();
        assert!(matches!(err, BrokerError::Unavailable(_)));

        let err = client.publish("t.process", &json!({"a": 1})).await.unwrap_err();
        assert!(matches!(err, BrokerError::Unavailable(_)));

        let handler: MessageHandler = Arc::new(|_| {});
        let err = client.consume("t.process", handler).await.unwrap_err();
        assert!(matches!(err, BrokerError::Unavailable(_)));
        assert!(link.sent().is_empty());
    }

    #[tokio::test]
    async fn test_publish_during_outage_fails_within_acquire_timeout() {
        let mut slow = policy(5, 200);
        slow.acquire_timeout = Duration::from_millis(50);
        let (client, link, _manager) = client_with(slow).await;

        link.closed.send_replace(true);
        tokio::time::sleep(Duration::from_millis(20)).await;

        let started = Instant::now();
        let err = client.publish("t.process", &json!({"a": 1})).await.unwrap_err();

        assert!(matches!(err, BrokerError::Unavailable(_)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_flush_drains_the_current_connection() {
        let (client, link, _manager) = client_with(policy(3, 10)).await;

        client.publish("t.process", &json!({"a": 1})).await.unwrap();
        client.flush().await.unwrap();

        assert_eq!(link.flushes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_flush_fails_unavailable_once_link_is_lost() {
        let mut disabled = policy(3, 10);
        disabled.enabled = false;
        let (client, link, manager) = client_with(disabled).await;

        link.closed.send_replace(true);
        wait_for_lost(&manager).await;

        let err = client.flush().await.unwrap_err();
        assert!(matches!(err, BrokerError::Unavailable(_)));
        assert_eq!(link.flushes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stopping_a_queue_aborts_its_consumer() {
        let registry = ConsumerRegistry::default();
        let task = tokio::spawn(std::future::pending::<()>());
        registry.register("t.process", task.abort_handle()).await;

        assert!(registry.stop("t.process").await);
        assert!(task.await.unwrap_err().is_cancelled());
        assert!(!registry.stop("t.process").await);
    }

    #[tokio::test]
    async fn test_reregistering_a_queue_replaces_its_consumer() {
        let registry = ConsumerRegistry::default();
        let first = tokio::spawn(std::future::pending::<()>());
        let second = tokio::spawn(std::future::pending::<()>());

        registry.register("t.process", first.abort_handle()).await;
        registry.register("t.process", second.abort_handle()).await;

        assert!(first.await.unwrap_err().is_cancelled());
        assert!(registry.stop("t.process").await);
        assert!(second.await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_delete_queue_stops_registered_consumer() {
        let (client, _link, _manager) = client_with(policy(3, 10)).await;
        let task = tokio::spawn(std::future::pending::<()>());
        client.consumers.register("t.process", task.abort_handle()).await;

        client.delete_queue("t.process").await.unwrap();

        assert!(task.await.unwrap_err().is_cancelled());
        assert!(!client.consumers.stop("t.process").await);
    }
}
