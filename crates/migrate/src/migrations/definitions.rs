//! Migration Definitions - Core types for the migration history ledger
//!
//! Defines the ledger row ([`MigrationRecord`]), the logical state derived
//! from it, and the request/outcome types of a resolution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::MigrateError;

/// One row of the migration history ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct MigrationRecord {
    /// Migration directory name, unique across the ledger
    #[sqlx(rename = "migration_name")]
    pub name: String,
    /// Content hash of the migration at the time it was recorded
    pub checksum: String,
    /// When application began
    pub started_at: DateTime<Utc>,
    /// Set iff the migration completed successfully
    pub finished_at: Option<DateTime<Utc>>,
    /// Set iff the migration was explicitly marked rolled back
    pub rolled_back_at: Option<DateTime<Utc>>,
    /// Number of steps that executed successfully
    pub applied_steps_count: i32,
    /// Free-form execution output
    pub logs: Option<String>,
}

impl MigrationRecord {
    /// A record for a migration that has started but not finished
    pub fn started(
        name: impl Into<String>,
        checksum: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            checksum: checksum.into(),
            started_at,
            finished_at: None,
            rolled_back_at: None,
            applied_steps_count: 0,
            logs: None,
        }
    }

    pub fn with_finished_at(mut self, finished_at: DateTime<Utc>) -> Self {
        self.finished_at = Some(finished_at);
        self
    }

    pub fn with_rolled_back_at(mut self, rolled_back_at: DateTime<Utc>) -> Self {
        self.rolled_back_at = Some(rolled_back_at);
        self
    }

    pub fn with_applied_steps_count(mut self, count: i32) -> Self {
        self.applied_steps_count = count;
        self
    }

    pub fn with_logs(mut self, logs: impl Into<String>) -> Self {
        self.logs = Some(logs.into());
        self
    }

    pub fn state(&self) -> MigrationState {
        if self.finished_at.is_some() {
            MigrationState::Applied
        } else if self.rolled_back_at.is_some() {
            MigrationState::RolledBack
        } else {
            MigrationState::Failed
        }
    }
}

/// Logical state of a migration, derived from its ledger row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationState {
    /// No row exists for the name
    Untracked,
    /// Row exists with neither `finished_at` nor `rolled_back_at`
    Failed,
    /// `finished_at` is set
    Applied,
    /// `rolled_back_at` is set and `finished_at` is not
    RolledBack,
}

impl MigrationState {
    pub fn of(record: Option<&MigrationRecord>) -> Self {
        record.map_or(MigrationState::Untracked, MigrationRecord::state)
    }
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            MigrationState::Untracked => "untracked",
            MigrationState::Failed => "failed",
            MigrationState::Applied => "applied",
            MigrationState::RolledBack => "rolled back",
        };
        f.write_str(state)
    }
}

/// Requested resolution of a failed migration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolveDirection {
    /// Record the migration as successfully applied
    Applied,
    /// Record the migration as rolled back
    RolledBack,
}

impl fmt::Display for ResolveDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveDirection::Applied => f.write_str("applied"),
            ResolveDirection::RolledBack => f.write_str("rolled back"),
        }
    }
}

impl FromStr for ResolveDirection {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "applied" => Ok(ResolveDirection::Applied),
            "rolled-back" | "rolled_back" | "rolledback" => Ok(ResolveDirection::RolledBack),
            _ => Err(MigrateError::configuration(format!(
                "Unknown resolve direction '{}', expected applied or rolled-back",
                s
            ))),
        }
    }
}

/// A single resolution request: one direction, one migration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveRequest {
    pub direction: ResolveDirection,
    pub migration_name: String,
}

impl ResolveRequest {
    pub fn applied(migration_name: impl Into<String>) -> Self {
        Self {
            direction: ResolveDirection::Applied,
            migration_name: migration_name.into(),
        }
    }

    pub fn rolled_back(migration_name: impl Into<String>) -> Self {
        Self {
            direction: ResolveDirection::RolledBack,
            migration_name: migration_name.into(),
        }
    }
}

/// Successful result of a resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ResolveOutcome {
    /// A failed migration was marked as applied
    MarkedApplied {
        migration_name: String,
        finished_at: DateTime<Utc>,
    },
    /// A failed migration was marked as rolled back
    MarkedRolledBack {
        migration_name: String,
        rolled_back_at: DateTime<Utc>,
    },
    /// The migration was already rolled back; nothing was written
    AlreadyRolledBack { migration_name: String },
}

impl ResolveOutcome {
    pub fn migration_name(&self) -> &str {
        match self {
            ResolveOutcome::MarkedApplied { migration_name, .. }
            | ResolveOutcome::MarkedRolledBack { migration_name, .. }
            | ResolveOutcome::AlreadyRolledBack { migration_name } => migration_name,
        }
    }

    pub fn direction(&self) -> ResolveDirection {
        match self {
            ResolveOutcome::MarkedApplied { .. } => ResolveDirection::Applied,
            ResolveOutcome::MarkedRolledBack { .. } | ResolveOutcome::AlreadyRolledBack { .. } => {
                ResolveDirection::RolledBack
            }
        }
    }

    /// Whether the ledger was mutated
    pub fn performed_write(&self) -> bool {
        !matches!(self, ResolveOutcome::AlreadyRolledBack { .. })
    }
}
