//! Migration History Backends
//!
//! One [`MigrationHistoryBackend`] implementation per database family,
//! selected from the database URL when the run is configured.

pub mod connection;
pub mod core;
pub mod memory;
pub mod mysql;
pub mod postgres;
pub mod sqlite;

pub use self::core::*;
pub use connection::ConnectionInfo;
pub use memory::InMemoryHistory;
pub use mysql::MySqlHistory;
pub use postgres::PostgresHistory;
pub use sqlite::SqliteHistory;

use crate::config::MigrateConfig;
use crate::error::{MigrateError, MigrateResult};

/// Database backend type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseBackendType {
    PostgreSQL,
    CockroachDB,
    MySQL,
    SQLite,
}

impl DatabaseBackendType {
    /// Detect database backend type from URL
    pub fn from_url(url: &str) -> MigrateResult<Self> {
        if url.starts_with("postgresql://") || url.starts_with("postgres://") {
            Ok(DatabaseBackendType::PostgreSQL)
        } else if url.starts_with("cockroachdb://") {
            Ok(DatabaseBackendType::CockroachDB)
        } else if url.starts_with("mysql://") {
            Ok(DatabaseBackendType::MySQL)
        } else if url.starts_with("sqlite:") || url.starts_with("file:") {
            Ok(DatabaseBackendType::SQLite)
        } else {
            // Only the scheme is reported; the rest may carry credentials
            let scheme = url.split_once(':').map_or("", |(scheme, _)| scheme);
            Err(MigrateError::configuration(format!(
                "Unable to detect database backend from URL scheme `{}`",
                scheme
            )))
        }
    }

    pub fn dialect(&self) -> SqlDialect {
        match self {
            DatabaseBackendType::PostgreSQL | DatabaseBackendType::CockroachDB => {
                SqlDialect::PostgreSQL
            }
            DatabaseBackendType::MySQL => SqlDialect::MySQL,
            DatabaseBackendType::SQLite => SqlDialect::SQLite,
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            DatabaseBackendType::PostgreSQL => 5432,
            DatabaseBackendType::CockroachDB => 26257,
            DatabaseBackendType::MySQL => 3306,
            DatabaseBackendType::SQLite => 0,
        }
    }

    pub fn is_postgres_family(&self) -> bool {
        matches!(
            self,
            DatabaseBackendType::PostgreSQL | DatabaseBackendType::CockroachDB
        )
    }

    /// Human readable product name
    pub fn display_name(&self) -> &'static str {
        match self {
            DatabaseBackendType::PostgreSQL => "PostgreSQL",
            DatabaseBackendType::CockroachDB => "CockroachDB",
            DatabaseBackendType::MySQL => "MySQL",
            DatabaseBackendType::SQLite => "SQLite",
        }
    }
}

impl std::fmt::Display for DatabaseBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseBackendType::PostgreSQL => write!(f, "postgresql"),
            DatabaseBackendType::CockroachDB => write!(f, "cockroachdb"),
            DatabaseBackendType::MySQL => write!(f, "mysql"),
            DatabaseBackendType::SQLite => write!(f, "sqlite"),
        }
    }
}

impl std::str::FromStr for DatabaseBackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgresql" | "postgres" => Ok(DatabaseBackendType::PostgreSQL),
            "cockroachdb" | "cockroach" => Ok(DatabaseBackendType::CockroachDB),
            "mysql" => Ok(DatabaseBackendType::MySQL),
            "sqlite" => Ok(DatabaseBackendType::SQLite),
            _ => Err(format!("Unsupported database backend: {}", s)),
        }
    }
}

/// Open a history backend for the database described by `info`
///
/// Connectivity failures come back already classified (P1000/P1001/P1003).
pub async fn connect(
    info: &ConnectionInfo,
    config: &MigrateConfig,
) -> MigrateResult<Box<dyn MigrationHistoryBackend>> {
    tracing::debug!(backend = %info.backend_type, "connecting to migration history");

    let backend: Box<dyn MigrationHistoryBackend> = match info.backend_type {
        DatabaseBackendType::PostgreSQL | DatabaseBackendType::CockroachDB => {
            Box::new(PostgresHistory::connect(info, config).await?)
        }
        DatabaseBackendType::MySQL => Box::new(MySqlHistory::connect(info, config).await?),
        DatabaseBackendType::SQLite => Box::new(SqliteHistory::connect(info, config).await?),
    };

    Ok(backend)
}
