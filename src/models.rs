use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Domain Models
// ============================================================================

/// Suffix appended to a client id to name its processing queue.
pub const QUEUE_SUFFIX: &str = ".process";

/// An onboarded client.
///
/// `client_id` is generated once at creation and never changes; it keys both
/// the repository row and the tenant's queue. A non-null `deleted_at` marks
/// the tenant as soft-deleted, and such rows are never returned by lookups.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Tenant {
    pub id: i64,
    pub client_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A tenant before the repository has assigned its numeric id and timestamps.
#[derive(Clone, Debug, PartialEq)]
pub struct NewTenant {
    pub client_id: String,
    pub name: String,
}

impl NewTenant {
    /// Prepare a tenant with a freshly generated, time-ordered client id.
    pub fn generate(name: impl Into<String>) -> Self {
        Self {
            client_id: Uuid::now_v7().to_string(),
            name: name.into(),
        }
    }
}

/// Name of the queue dedicated to `client_id`.
pub fn queue_name(client_id: &str) -> String {
    format!("{}{}", client_id, QUEUE_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_queue_name_format() {
        assert_eq!(queue_name("abc123"), "abc123.process");
    }

    #[test]
    fn test_generated_client_ids_are_unique_and_ordered() {
        let ids: Vec<String> = (0..1000)
            .map(|_| NewTenant::generate("Acme").client_id)
            .collect();

        let unique: HashSet<&String> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
        assert!(ids.iter().all(|id| !id.is_empty()));

        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(sorted, ids);
    }
}
