use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::messaging::{BrokerConnection, ConnectionManager, LinkState};

// ============================================================================
// Health Check Abstractions
// ============================================================================

/// Health status of a component
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, HealthStatus::Unhealthy(_))
    }
}

/// Health information for a component
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    #[serde(flatten)]
    pub status: HealthStatus,
    pub last_check: DateTime<Utc>,
}

impl ComponentHealth {
    pub fn new(name: impl Into<String>, status: HealthStatus) -> Self {
        Self {
            name: name.into(),
            status,
            last_check: Utc::now(),
        }
    }
}

/// Components that can report their health synchronously
pub trait HealthCheckable {
    fn check_health(&self) -> ComponentHealth;
}

impl<C: BrokerConnection> HealthCheckable for ConnectionManager<C> {
    fn check_health(&self) -> ComponentHealth {
        let status = match self.state() {
            LinkState::Connected(_) => HealthStatus::Healthy,
            LinkState::Reconnecting => HealthStatus::Degraded("reconnecting".to_string()),
            LinkState::Lost => HealthStatus::Unhealthy("reconnect attempts exhausted".to_string()),
        };
        ComponentHealth::new("broker", status)
    }
}

/// Aggregate view returned by the health endpoint
#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    pub healthy: bool,
    pub components: Vec<ComponentHealth>,
}

impl SystemHealth {
    /// Healthy only when no component is unhealthy; degraded still serves.
    pub fn from_components(components: Vec<ComponentHealth>) -> Self {
        let healthy = components.iter().all(|c| !c.status.is_unhealthy());
        Self { healthy, components }
    }
}
