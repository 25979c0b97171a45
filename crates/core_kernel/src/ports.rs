//! Storage seams shared by every domain crate
//!
//! Trackers talk to repositories through traits; the in-memory adapters live
//! next to the traits and the PostgreSQL ones live in `infra_db`.
//!
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Trackers / TransactionPoster               │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Port Traits                             │
//! │  (InvoiceRepository, PurchaseRepository, LedgerPort, ...)    │
//! │   Defined in each domain, depend only on core_kernel         │
//! └─────────────────────────────────────────────────────────────┘
//!                    ▲                         ▲
//!                    │                         │
//!         ┌─────────┴─────────┐     ┌────────┴────────┐
//!         │  In-memory adapter│     │ PostgreSQL       │
//!         │  (domain crates)  │     │ adapter (infra_db)│
//!         └───────────────────┘     └──────────────────┘
//! ```
//!
//! Every aggregate write goes through a port that compares the caller's
//! [`Version`](crate::Version) with the stored one. A mismatch is reported as
//! [`PortError::Conflict`], which the trackers treat as "reload and validate
//! again".

use std::fmt;
use thiserror::Error;
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::lifecycle::Version;

/// Failure reported by a repository or ledger adapter
#[derive(Debug, Error)]
pub enum PortError {
    /// No row or map entry for the id
    #[error("Not found: {entity_type} with id {id}")]
    NotFound {
        entity_type: String,
        id: String,
    },

    /// The adapter refused the value
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// The stored version differs from the one the caller read
    #[error("Version conflict on {entity_type} {id}: expected {expected}, found {actual}")]
    Conflict {
        entity_type: String,
        id: String,
        expected: Version,
        actual: Version,
    },

    /// Unique key (id, reference, idempotency key) already taken
    #[error("Duplicate: {entity_type} {id}")]
    Duplicate {
        entity_type: String,
        id: String,
    },

    /// Could not reach the store
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Timeout after {duration_ms}ms: {operation}")]
    Timeout {
        operation: String,
        duration_ms: u64,
    },

    /// Pool exhausted or store shutting down
    #[error("Service unavailable: {service}")]
    ServiceUnavailable {
        service: String,
    },

    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl PortError {
    pub fn not_found(entity_type: impl Into<String>, id: impl fmt::Display) -> Self {
        PortError::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        PortError::Validation {
            message: message.into(),
            field: None,
        }
    }

    pub fn conflict(
        entity_type: impl Into<String>,
        id: impl fmt::Display,
        expected: Version,
        actual: Version,
    ) -> Self {
        PortError::Conflict {
            entity_type: entity_type.into(),
            id: id.to_string(),
            expected,
            actual,
        }
    }

    pub fn duplicate(entity_type: impl Into<String>, id: impl fmt::Display) -> Self {
        PortError::Duplicate {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        PortError::Connection {
            message: message.into(),
            source: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        PortError::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Failures worth parking in the pending-posting queue
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PortError::Connection { .. }
                | PortError::Timeout { .. }
                | PortError::ServiceUnavailable { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, PortError::NotFound { .. })
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PortError::NotFound { .. } => ErrorKind::NotFound,
            PortError::Validation { .. } | PortError::Duplicate { .. } => ErrorKind::Validation,
            PortError::Conflict { .. } => ErrorKind::Conflict,
            PortError::Connection { .. }
            | PortError::Timeout { .. }
            | PortError::ServiceUnavailable { .. } => ErrorKind::Unavailable,
            PortError::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Another writer bumped the version first
    pub fn is_conflict(&self) -> bool {
        matches!(self, PortError::Conflict { .. })
    }
}

/// Supertrait for repository traits so adapters can sit behind `Arc<dyn _>`
pub trait DomainPort: Send + Sync + 'static {}

/// Readiness of a storage adapter, reported by `/health/ready`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterHealth {
    Healthy,
    /// Reachable but slow
    Degraded,
    Unhealthy,
}

/// One probe of an adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub adapter_id: String,
    pub status: AdapterHealth,
    pub latency_ms: u64,
    /// Error text when the probe failed
    pub message: Option<String>,
    pub checked_at: chrono::DateTime<chrono::Utc>,
}

impl HealthCheckResult {
    /// Builds a healthy result for adapters without external dependencies
    pub fn healthy(adapter_id: impl Into<String>) -> Self {
        Self {
            adapter_id: adapter_id.into(),
            status: AdapterHealth::Healthy,
            latency_ms: 0,
            message: None,
            checked_at: chrono::Utc::now(),
        }
    }
}

/// Adapters that can be probed for readiness
#[async_trait::async_trait]
pub trait HealthCheckable: Send + Sync {
    async fn health_check(&self) -> HealthCheckResult;
}
