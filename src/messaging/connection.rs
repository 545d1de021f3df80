use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::metrics::Metrics;
use crate::utils::{retry_with_backoff, RetryConfig, RetryResult};

use super::errors::BrokerError;

// ============================================================================
// Broker Connection Manager
// ============================================================================
//
// Owns the single process-wide broker connection. A supervising task waits
// for the broker to report the connection closed, then redials with a fixed
// delay between attempts and publishes the replacement. The link state lives
// in a watch channel so every reader sees the latest connection at call time
// and nobody keeps using a handle that was already replaced.
//
// ============================================================================

/// A live connection to the broker.
#[async_trait]
pub trait BrokerConnection: Send + Sync + 'static {
    /// Resolves once the broker reports this connection as closed.
    async fn closed(&self);
}

/// Opens broker connections.
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    type Connection: BrokerConnection;

    async fn dial(&self, url: &str) -> Result<Arc<Self::Connection>, BrokerError>;
}

/// Current state of the broker link as seen by readers.
pub enum LinkState<C> {
    Connected(Arc<C>),
    Reconnecting,
    /// Reconnection gave up; stays here until the process restarts.
    Lost,
}

impl<C> LinkState<C> {
    fn gauge_value(&self) -> i64 {
        match self {
            LinkState::Lost => 0,
            LinkState::Reconnecting => 1,
            LinkState::Connected(_) => 2,
        }
    }
}

impl<C> Clone for LinkState<C> {
    fn clone(&self) -> Self {
        match self {
            LinkState::Connected(conn) => LinkState::Connected(conn.clone()),
            LinkState::Reconnecting => LinkState::Reconnecting,
            LinkState::Lost => LinkState::Lost,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    pub max_reconnects: u32,
    pub reconnect_delay: Duration,
    /// How long a caller waits for an in-progress reconnection.
    pub acquire_timeout: Duration,
}

pub struct ConnectionManager<C> {
    state: watch::Receiver<LinkState<C>>,
    acquire_timeout: Duration,
}

impl<C: BrokerConnection> ConnectionManager<C> {
    /// Dial the broker and start the supervising task.
    ///
    /// The initial dial is not retried: failing here is fatal at startup.
    pub async fn connect<D>(
        dialer: D,
        url: &str,
        policy: ReconnectPolicy,
        metrics: Arc<Metrics>,
    ) -> Result<Self, BrokerError>
    where
        D: Dialer<Connection = C>,
    {
        let conn = dialer.dial(url).await?;
        tracing::info!(url = %url, "Connected to broker");

        let (tx, rx) = watch::channel(LinkState::Connected(conn.clone()));
        metrics.broker_connection_state.set(2);

        tokio::spawn(supervise(dialer, url.to_string(), policy.clone(), tx, conn, metrics));

        Ok(Self {
            state: rx,
            acquire_timeout: policy.acquire_timeout,
        })
    }

    /// The current connection.
    ///
    /// Waits up to the acquire timeout while a reconnection is in progress
    /// and fails `Unavailable` once the supervisor has given up.
    pub async fn current(&self) -> Result<Arc<C>, BrokerError> {
        let mut rx = self.state.clone();
        let wait = rx.wait_for(|state| !matches!(state, LinkState::Reconnecting));

        let result = match tokio::time::timeout(self.acquire_timeout, wait).await {
            Ok(Ok(state)) => match &*state {
                LinkState::Connected(conn) => Ok(conn.clone()),
                _ => Err(BrokerError::Unavailable(
                    "connection lost and reconnect attempts exhausted".to_string(),
                )),
            },
            Ok(Err(_)) => Err(BrokerError::Unavailable(
                "connection supervisor stopped".to_string(),
            )),
            Err(_) => Err(BrokerError::Unavailable(format!(
                "still reconnecting after {:?}",
                self.acquire_timeout
            ))),
        };
        result
    }

    pub fn state(&self) -> LinkState<C> {
        self.state.borrow().clone()
    }
}

/// Process-lifetime supervision loop.
///
/// Closure notification is re-armed on each replacement connection, so every
/// observed disconnect gets its own pass of `max_reconnects` attempts.
async fn supervise<D: Dialer>(
    dialer: D,
    url: String,
    policy: ReconnectPolicy,
    tx: watch::Sender<LinkState<D::Connection>>,
    mut conn: Arc<D::Connection>,
    metrics: Arc<Metrics>,
) {
    loop {
        conn.closed().await;
        tracing::warn!(url = %url, "Broker connection lost, attempting to reconnect");

        let max_attempts = if policy.enabled { policy.max_reconnects } else { 0 };
        publish_state(&tx, &metrics, LinkState::Reconnecting);

        let retry = RetryConfig::fixed(max_attempts, policy.reconnect_delay);
        let result = retry_with_backoff("broker_reconnect", retry, |_attempt| {
            metrics.broker_reconnect_attempts.inc();
            dialer.dial(&url)
        })
        .await;

        match result {
            RetryResult::Success(new_conn) => {
                tracing::info!(url = %url, "Reconnected to broker");
                conn = new_conn;
                publish_state(&tx, &metrics, LinkState::Connected(conn.clone()));
            }
            RetryResult::Failed(_) | RetryResult::Skipped => {
                tracing::error!(
                    url = %url,
                    max_reconnects = max_attempts,
                    "Giving up on broker reconnection"
                );
                publish_state(&tx, &metrics, LinkState::Lost);
                return;
            }
        }
    }
}

fn publish_state<C>(tx: &watch::Sender<LinkState<C>>, metrics: &Metrics, state: LinkState<C>) {
    metrics.broker_connection_state.set(state.gauge_value());
    tx.send_replace(state);
}
