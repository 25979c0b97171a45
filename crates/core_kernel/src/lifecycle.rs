//! Entity lifecycle and optimistic-concurrency tokens
//!
//! Every document (invoice, purchase order, GRN, transaction, account) carries
//! a [`Lifecycle`] tag instead of a nullable "is deleted" flag, and a
//! [`Version`] that is bumped on every successful write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// Soft-delete lifecycle of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Lifecycle {
    /// Visible to every read path
    Active,
    /// Soft deleted; kept for audit, rejected by every operation
    Deleted {
        /// When the record was deleted
        deleted_at: DateTime<Utc>,
    },
}

impl Lifecycle {
    /// Returns true if the record is active
    pub fn is_active(&self) -> bool {
        matches!(self, Lifecycle::Active)
    }

    /// Returns true if the record was soft deleted
    pub fn is_deleted(&self) -> bool {
        matches!(self, Lifecycle::Deleted { .. })
    }

    /// Transitions to Deleted
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` if already deleted
    pub fn delete(&mut self, at: DateTime<Utc>) -> Result<(), CoreError> {
        match self {
            Lifecycle::Active => {
                *self = Lifecycle::Deleted { deleted_at: at };
                Ok(())
            }
            Lifecycle::Deleted { .. } => Err(CoreError::invalid_state("record is already deleted")),
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Lifecycle::Active
    }
}

/// Monotonic row version used for compare-and-swap writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    /// Version of a freshly created aggregate
    pub fn initial() -> Self {
        Version(1)
    }

    /// Builds a version from a stored value
    pub fn from_u64(value: u64) -> Self {
        Version(value)
    }

    /// The version written by the next successful update
    pub fn next(self) -> Self {
        Version(self.0 + 1)
    }

    /// Raw value
    pub fn value(self) -> u64 {
        self.0
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::initial()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
