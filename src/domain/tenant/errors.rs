use crate::db::RepositoryError;
use crate::messaging::BrokerError;

// ============================================================================
// Tenant Lifecycle Errors
// ============================================================================

/// Coarse classification used by callers to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    Unavailable,
    Declare,
    Delete,
    Publish,
    Consume,
    Unknown,
}

#[derive(Debug, thiserror::Error)]
pub enum TenantError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{context}: tenant {client_id} not found")]
    NotFound { context: String, client_id: String },

    #[error("{context}: {source}")]
    Repository {
        context: String,
        #[source]
        source: RepositoryError,
    },

    #[error("{context}: {source}")]
    Broker {
        context: String,
        #[source]
        source: BrokerError,
    },

    #[error("{context}: failed to publish payload to queue {queue} for tenant {tenant}: {source}")]
    Publish {
        context: String,
        queue: String,
        tenant: String,
        #[source]
        source: BrokerError,
    },
}

impl TenantError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TenantError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            TenantError::NotFound { .. } => ErrorKind::NotFound,
            TenantError::Repository { source: RepositoryError::NotFound, .. } => ErrorKind::NotFound,
            TenantError::Repository { .. } => ErrorKind::Unknown,
            TenantError::Broker { source, .. } | TenantError::Publish { source, .. } => broker_kind(source),
        }
    }

    /// Wrap a repository failure; a missing row becomes `NotFound`.
    pub(crate) fn repository(context: &str, client_id: &str, err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => TenantError::NotFound {
                context: context.to_string(),
                client_id: client_id.to_string(),
            },
            source => TenantError::Repository {
                context: context.to_string(),
                source,
            },
        }
    }

    pub(crate) fn broker(context: &str, source: BrokerError) -> Self {
        TenantError::Broker {
            context: context.to_string(),
            source,
        }
    }
}

fn broker_kind(err: &BrokerError) -> ErrorKind {
    match err {
        e if e.is_unavailable() => ErrorKind::Unavailable,
        BrokerError::Declare { .. } => ErrorKind::Declare,
        BrokerError::Delete { .. } => ErrorKind::Delete,
        BrokerError::Publish { .. } | BrokerError::Encode { .. } | BrokerError::Flush(_) => ErrorKind::Publish,
        BrokerError::Consume { .. } => ErrorKind::Consume,
        _ => ErrorKind::Unknown,
    }
}
