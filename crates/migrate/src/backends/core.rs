//! Core History Backend Traits
//!
//! This module defines the contract every migration history backend fulfils
//! and the dialect-aware SQL used by the `sqlx` implementations. The resolver
//! is written once against [`MigrationHistoryBackend`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::backends::DatabaseBackendType;
use crate::error::MigrateResult;
use crate::migrations::definitions::MigrationRecord;

/// Durable access to the migration history ledger
///
/// Writes are conditional on the migration still being in the failed state.
/// A write whose condition no longer holds returns
/// [`MigrateError::ConcurrentModification`](crate::MigrateError::ConcurrentModification)
/// and changes nothing.
#[async_trait]
pub trait MigrationHistoryBackend: Send {
    /// Database family this backend talks to
    fn backend_type(&self) -> DatabaseBackendType;

    /// Create the ledger table if it does not exist yet
    async fn ensure_ledger(&mut self) -> MigrateResult<()>;

    /// Exact-match lookup of a ledger row
    async fn find_by_name(&mut self, name: &str) -> MigrateResult<Option<MigrationRecord>>;

    /// Set `finished_at` on a row that is still failed
    async fn mark_applied(&mut self, name: &str, finished_at: DateTime<Utc>) -> MigrateResult<()>;

    /// Set `rolled_back_at` on a row that is still failed
    async fn mark_rolled_back(
        &mut self,
        name: &str,
        rolled_back_at: DateTime<Utc>,
    ) -> MigrateResult<()>;

    /// Close the underlying connection
    async fn close(self: Box<Self>) -> MigrateResult<()>;
}

/// SQL dialect enumeration for generating database-specific SQL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    PostgreSQL,
    MySQL,
    SQLite,
}

impl SqlDialect {
    /// Get the parameter placeholder style for this dialect
    pub fn parameter_placeholder(&self, index: usize) -> String {
        match self {
            SqlDialect::PostgreSQL => format!("${}", index + 1),
            SqlDialect::MySQL | SqlDialect::SQLite => "?".to_string(),
        }
    }

    /// Get the quote character for identifiers in this dialect
    pub fn identifier_quote(&self) -> char {
        match self {
            SqlDialect::PostgreSQL | SqlDialect::SQLite => '"',
            SqlDialect::MySQL => '`',
        }
    }

    /// Quote an identifier, doubling any embedded quote character
    pub fn quote_identifier(&self, identifier: &str) -> String {
        let quote = self.identifier_quote();
        let escaped = identifier.replace(quote, &format!("{}{}", quote, quote));
        format!("{}{}{}", quote, escaped, quote)
    }

    /// Column type for ledger timestamps
    pub fn timestamp_type(&self) -> &'static str {
        match self {
            SqlDialect::PostgreSQL => "TIMESTAMPTZ",
            SqlDialect::MySQL => "DATETIME(3)",
            SqlDialect::SQLite => "DATETIME",
        }
    }

    /// Get the current timestamp expression for this dialect
    pub fn current_timestamp(&self) -> &'static str {
        match self {
            SqlDialect::PostgreSQL => "now()",
            SqlDialect::MySQL => "CURRENT_TIMESTAMP(3)",
            SqlDialect::SQLite => "current_timestamp",
        }
    }
}

/// Ledger SQL for one dialect, table and optional schema
#[derive(Debug, Clone)]
pub struct LedgerSql {
    dialect: SqlDialect,
    schema: Option<String>,
    table: String,
}

impl LedgerSql {
    pub fn new(dialect: SqlDialect, table: impl Into<String>, schema: Option<&str>) -> Self {
        Self {
            dialect,
            schema: schema.map(str::to_string),
            table: table.into(),
        }
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    /// Quoted, schema-qualified ledger table name
    pub fn qualified_table(&self) -> String {
        match &self.schema {
            Some(schema) => format!(
                "{}.{}",
                self.dialect.quote_identifier(schema),
                self.dialect.quote_identifier(&self.table)
            ),
            None => self.dialect.quote_identifier(&self.table),
        }
    }

    /// Schema holding the ledger, if one is configured
    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// SQL probing whether the ledger schema exists (PostgreSQL only)
    pub fn schema_exists_sql(&self) -> String {
        format!(
            "SELECT EXISTS (SELECT 1 FROM pg_namespace WHERE nspname = {})",
            self.dialect.parameter_placeholder(0)
        )
    }

    /// SQL to create the ledger schema, when one is configured
    pub fn create_schema_sql(&self) -> Option<String> {
        self.schema.as_ref().map(|schema| {
            format!(
                "CREATE SCHEMA IF NOT EXISTS {}",
                self.dialect.quote_identifier(schema)
            )
        })
    }

    /// SQL to create the ledger table
    pub fn create_table_sql(&self) -> String {
        let q = |column: &str| self.dialect.quote_identifier(column);
        let timestamp = self.dialect.timestamp_type();
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    \
                {} VARCHAR(255) NOT NULL PRIMARY KEY,\n    \
                {} VARCHAR(64) NOT NULL,\n    \
                {} {} NOT NULL DEFAULT {},\n    \
                {} {},\n    \
                {} {},\n    \
                {} INTEGER NOT NULL DEFAULT 0,\n    \
                {} TEXT\n\
            )",
            self.qualified_table(),
            q("migration_name"),
            q("checksum"),
            q("started_at"),
            timestamp,
            self.dialect.current_timestamp(),
            q("finished_at"),
            timestamp,
            q("rolled_back_at"),
            timestamp,
            q("applied_steps_count"),
            q("logs"),
        )
    }

    /// SQL to load one ledger row by name
    pub fn find_by_name_sql(&self) -> String {
        format!(
            "SELECT migration_name, checksum, started_at, finished_at, rolled_back_at, \
             applied_steps_count, logs FROM {} WHERE migration_name = {}",
            self.qualified_table(),
            self.dialect.parameter_placeholder(0)
        )
    }

    /// SQL to set `finished_at`, guarded on the row still being failed
    pub fn mark_applied_sql(&self) -> String {
        self.guarded_update_sql("finished_at")
    }

    /// SQL to set `rolled_back_at`, guarded on the row still being failed
    pub fn mark_rolled_back_sql(&self) -> String {
        self.guarded_update_sql("rolled_back_at")
    }

    fn guarded_update_sql(&self, column: &str) -> String {
        format!(
            "UPDATE {} SET {} = {} WHERE migration_name = {} \
             AND finished_at IS NULL AND rolled_back_at IS NULL",
            self.qualified_table(),
            column,
            self.dialect.parameter_placeholder(0),
            self.dialect.parameter_placeholder(1)
        )
    }
}

/// Implements [`MigrationHistoryBackend`] for a `sqlx` backed history
///
/// The type needs `conn`, `info: ConnectionInfo` and `sql: LedgerSql`
/// fields. With `prepare = method`, `method` runs before the ledger table is
/// created.
macro_rules! sqlx_history_backend {
    ($history:ident $(, prepare = $prepare:ident)?) => {
        impl $history {
            async fn guarded_update(
                &mut self,
                sql: String,
                name: &str,
                at: ::chrono::DateTime<::chrono::Utc>,
            ) -> $crate::error::MigrateResult<()> {
                ::tracing::debug!(sql = %sql, migration = name, "conditional ledger update");

                let result = ::sqlx::query(&sql)
                    .bind(at)
                    .bind(name)
                    .execute(&mut self.conn)
                    .await
                    .map_err(|e| $crate::backends::connection::classify_query_error(e, &self.info))?;

                // The guard rules out matched-but-unchanged rows, so 0 means it failed
                if result.rows_affected() == 0 {
                    return Err($crate::error::MigrateError::ConcurrentModification {
                        migration_name: name.to_string(),
                    });
                }
                Ok(())
            }
        }

        #[::async_trait::async_trait]
        impl $crate::backends::core::MigrationHistoryBackend for $history {
            fn backend_type(&self) -> $crate::backends::DatabaseBackendType {
                self.info.backend_type
            }

            async fn ensure_ledger(&mut self) -> $crate::error::MigrateResult<()> {
                $( self.$prepare().await?; )?
                ::sqlx::query(&self.sql.create_table_sql())
                    .execute(&mut self.conn)
                    .await
                    .map_err(|e| $crate::backends::connection::classify_query_error(e, &self.info))?;
                Ok(())
            }

            async fn find_by_name(
                &mut self,
                name: &str,
            ) -> $crate::error::MigrateResult<Option<$crate::migrations::definitions::MigrationRecord>> {
                ::sqlx::query_as::<_, $crate::migrations::definitions::MigrationRecord>(
                    &self.sql.find_by_name_sql(),
                )
                .bind(name)
                .fetch_optional(&mut self.conn)
                .await
                .map_err(|e| $crate::backends::connection::classify_query_error(e, &self.info))
            }

            async fn mark_applied(
                &mut self,
                name: &str,
                finished_at: ::chrono::DateTime<::chrono::Utc>,
            ) -> $crate::error::MigrateResult<()> {
                let sql = self.sql.mark_applied_sql();
                self.guarded_update(sql, name, finished_at).await
            }

            async fn mark_rolled_back(
                &mut self,
                name: &str,
                rolled_back_at: ::chrono::DateTime<::chrono::Utc>,
            ) -> $crate::error::MigrateResult<()> {
                let sql = self.sql.mark_rolled_back_sql();
                self.guarded_update(sql, name, rolled_back_at).await
            }

            async fn close(self: Box<Self>) -> $crate::error::MigrateResult<()> {
                let $history { conn, info, .. } = *self;
                ::sqlx::Connection::close(conn)
                    .await
                    .map_err(|e| $crate::backends::connection::classify_query_error(e, &info))
            }
        }
    };
}

pub(crate) use sqlx_history_backend;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_placeholders() {
        assert_eq!(SqlDialect::PostgreSQL.parameter_placeholder(0), "$1");
        assert_eq!(SqlDialect::PostgreSQL.parameter_placeholder(1), "$2");
        assert_eq!(SqlDialect::MySQL.parameter_placeholder(1), "?");
        assert_eq!(SqlDialect::SQLite.parameter_placeholder(0), "?");
    }

    #[test]
    fn test_identifier_quoting() {
        assert_eq!(SqlDialect::PostgreSQL.quote_identifier("_elif_migrations"), "\"_elif_migrations\"");
        assert_eq!(SqlDialect::MySQL.quote_identifier("_elif_migrations"), "`_elif_migrations`");
        assert_eq!(SqlDialect::SQLite.quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_postgres_ledger_sql() {
        let sql = LedgerSql::new(SqlDialect::PostgreSQL, "_elif_migrations", Some("public"));

        assert_eq!(sql.qualified_table(), "\"public\".\"_elif_migrations\"");
        assert_eq!(
            sql.create_schema_sql().unwrap(),
            "CREATE SCHEMA IF NOT EXISTS \"public\""
        );

        let create = sql.create_table_sql();
        assert!(create.contains("CREATE TABLE IF NOT EXISTS \"public\".\"_elif_migrations\""));
        assert!(create.contains("\"migration_name\" VARCHAR(255) NOT NULL PRIMARY KEY"));
        assert!(create.contains("\"started_at\" TIMESTAMPTZ NOT NULL DEFAULT now()"));
        assert!(create.contains("\"rolled_back_at\" TIMESTAMPTZ"));

        assert_eq!(sql.schema(), Some("public"));
        assert!(sql.schema_exists_sql().ends_with("WHERE nspname = $1)"));
        assert!(sql.find_by_name_sql().ends_with("WHERE migration_name = $1"));
        assert_eq!(
            sql.mark_applied_sql(),
            "UPDATE \"public\".\"_elif_migrations\" SET finished_at = $1 WHERE migration_name = $2 \
             AND finished_at IS NULL AND rolled_back_at IS NULL"
        );
    }

    #[test]
    fn test_mysql_and_sqlite_ledger_sql() {
        let mysql = LedgerSql::new(SqlDialect::MySQL, "_elif_migrations", None);
        assert!(mysql.create_schema_sql().is_none());
        assert!(mysql.create_table_sql().contains("`finished_at` DATETIME(3)"));
        assert!(mysql
            .mark_rolled_back_sql()
            .starts_with("UPDATE `_elif_migrations` SET rolled_back_at = ? WHERE migration_name = ?"));

        let sqlite = LedgerSql::new(SqlDialect::SQLite, "_elif_migrations", None);
        assert!(sqlite
            .create_table_sql()
            .contains("\"started_at\" DATETIME NOT NULL DEFAULT current_timestamp"));
        assert!(sqlite.find_by_name_sql().ends_with("WHERE migration_name = ?"));
    }
}
