//! Migration Resolver - Marks failed migrations as applied or rolled back
//!
//! Classifies the current state of a migration from its ledger row, checks
//! the requested transition and issues the conditional write. Each call is
//! single-shot: conflicts and connectivity failures are returned, never
//! retried.

use chrono::{DateTime, Utc};

use super::definitions::{
    MigrationRecord, MigrationState, ResolveDirection, ResolveOutcome, ResolveRequest,
};
use super::directory::MigrationDirectory;
use crate::backends::{self, ConnectionInfo, MigrationHistoryBackend};
use crate::config::MigrateConfig;
use crate::error::{MigrateError, MigrateResult};

/// Ledger action chosen for a `(state, direction)` pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Write `finished_at`
    MarkApplied,
    /// Write `rolled_back_at`
    MarkRolledBack,
    /// Already in the requested state; no write
    AlreadyRolledBack,
}

/// The legal transition table
///
/// | state        | applied          | rolled back         |
/// |--------------|------------------|---------------------|
/// | `Untracked`  | P3017            | P3011               |
/// | `Failed`     | mark applied     | mark rolled back    |
/// | `Applied`    | P3008            | P3012               |
/// | `RolledBack` | P3012            | no-op success       |
pub fn plan_transition(
    state: MigrationState,
    direction: ResolveDirection,
    migration_name: &str,
) -> MigrateResult<Transition> {
    let migration_name = migration_name.to_string();
    match (state, direction) {
        (MigrationState::Failed, ResolveDirection::Applied) => Ok(Transition::MarkApplied),
        (MigrationState::Failed, ResolveDirection::RolledBack) => Ok(Transition::MarkRolledBack),
        (MigrationState::Applied, ResolveDirection::Applied) => {
            Err(MigrateError::AlreadyApplied { migration_name })
        }
        (MigrationState::Applied, ResolveDirection::RolledBack)
        | (MigrationState::RolledBack, ResolveDirection::Applied) => {
            Err(MigrateError::NotInFailedState { migration_name })
        }
        (MigrationState::RolledBack, ResolveDirection::RolledBack) => {
            Ok(Transition::AlreadyRolledBack)
        }
        (MigrationState::Untracked, direction) => Err(untracked(direction, &migration_name)),
    }
}

/// Resolves failed migrations against one history backend
pub struct MigrationResolver {
    directory: MigrationDirectory,
    backend: Box<dyn MigrationHistoryBackend>,
}

impl MigrationResolver {
    pub fn new(directory: MigrationDirectory, backend: Box<dyn MigrationHistoryBackend>) -> Self {
        Self { directory, backend }
    }

    pub fn directory(&self) -> &MigrationDirectory {
        &self.directory
    }

    /// Mark a failed migration as applied
    pub async fn mark_applied(&mut self, migration_name: &str) -> MigrateResult<ResolveOutcome> {
        self.resolve(&ResolveRequest::applied(migration_name)).await
    }

    /// Mark a failed migration as rolled back
    pub async fn mark_rolled_back(
        &mut self,
        migration_name: &str,
    ) -> MigrateResult<ResolveOutcome> {
        self.resolve(&ResolveRequest::rolled_back(migration_name)).await
    }

    /// Resolve one migration in the requested direction
    pub async fn resolve(&mut self, request: &ResolveRequest) -> MigrateResult<ResolveOutcome> {
        let name = request.migration_name.as_str();

        // Names unknown on disk are rejected before the ledger is touched
        if !self.directory.contains(name) {
            tracing::debug!(migration = name, "migration not found in migrations directory");
            return Err(untracked(request.direction, name));
        }

        self.backend.ensure_ledger().await?;
        let record = self.backend.find_by_name(name).await?;
        let state = MigrationState::of(record.as_ref());
        tracing::debug!(migration = name, state = %state, direction = %request.direction, "classified migration");

        let transition = plan_transition(state, request.direction, name)?;
        match (transition, record) {
            (Transition::MarkApplied, Some(record)) => {
                let finished_at = completion_time(&record);
                self.backend
                    .mark_applied(name, finished_at)
                    .await
                    .map_err(|e| log_conflict(e, name))?;
                tracing::info!(migration = name, "migration marked as applied");
                Ok(ResolveOutcome::MarkedApplied {
                    migration_name: name.to_string(),
                    finished_at,
                })
            }
            (Transition::MarkRolledBack, Some(record)) => {
                let rolled_back_at = completion_time(&record);
                self.backend
                    .mark_rolled_back(name, rolled_back_at)
                    .await
                    .map_err(|e| log_conflict(e, name))?;
                tracing::info!(migration = name, "migration marked as rolled back");
                Ok(ResolveOutcome::MarkedRolledBack {
                    migration_name: name.to_string(),
                    rolled_back_at,
                })
            }
            (Transition::AlreadyRolledBack, _) => {
                tracing::info!(migration = name, "migration already rolled back, nothing to write");
                Ok(ResolveOutcome::AlreadyRolledBack {
                    migration_name: name.to_string(),
                })
            }
            // Mutating transitions are only planned for rows in the failed state
            (_, None) => Err(MigrateError::ConcurrentModification {
                migration_name: name.to_string(),
            }),
        }
    }

    /// Close the backend connection
    pub async fn close(self) -> MigrateResult<()> {
        self.backend.close().await
    }
}

fn untracked(direction: ResolveDirection, migration_name: &str) -> MigrateError {
    let migration_name = migration_name.to_string();
    match direction {
        ResolveDirection::Applied => MigrateError::MigrationNotFound { migration_name },
        ResolveDirection::RolledBack => MigrateError::RollbackOfUnknownMigration { migration_name },
    }
}

/// Connect, load the migrations directory and resolve one migration
///
/// Connectivity is checked first, so an unreachable or missing database is
/// reported whatever the direction or migration name.
pub async fn resolve_migration(
    config: &MigrateConfig,
    request: ResolveRequest,
) -> MigrateResult<ResolveOutcome> {
    config.validate()?;
    let info = ConnectionInfo::parse(config.database_url()?)?;
    let backend = backends::connect(&info, config).await?;
    let directory = MigrationDirectory::load(&config.migrations_dir)?;
    tracing::debug!(
        dir = %config.migrations_dir.display(),
        migrations = directory.len(),
        "loaded migrations directory"
    );

    let mut resolver = MigrationResolver::new(directory, backend);
    let outcome = resolver.resolve(&request).await;

    if let Err(e) = resolver.close().await {
        tracing::warn!(error = %e, "failed to close database connection");
    }
    outcome
}

/// Completion timestamp that never precedes `started_at`
fn completion_time(record: &MigrationRecord) -> DateTime<Utc> {
    Utc::now().max(record.started_at)
}

fn log_conflict(err: MigrateError, name: &str) -> MigrateError {
    if let MigrateError::ConcurrentModification { .. } = err {
        tracing::warn!(migration = name, "migration changed concurrently, nothing was written");
    }
    err
}
