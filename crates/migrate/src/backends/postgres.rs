//! PostgreSQL History Backend
//!
//! Ledger access for PostgreSQL and CockroachDB over a single `sqlx`
//! connection.

use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::ConnectOptions;
use std::str::FromStr;

use super::connection::{classify_connect_error, classify_query_error, ConnectionInfo};
use super::core::{sqlx_history_backend, LedgerSql};
use crate::config::MigrateConfig;
use crate::error::{MigrateError, MigrateResult};

/// Migration history stored in a PostgreSQL-compatible database
pub struct PostgresHistory {
    conn: PgConnection,
    info: ConnectionInfo,
    sql: LedgerSql,
}

impl PostgresHistory {
    /// Open a connection, classifying connectivity failures
    pub async fn connect(info: &ConnectionInfo, config: &MigrateConfig) -> MigrateResult<Self> {
        let options = PgConnectOptions::from_str(&info.connect_url)
            .map_err(|e| MigrateError::configuration(format!("Invalid PostgreSQL URL: {}", e)))?
            .disable_statement_logging();

        let conn = tokio::time::timeout(config.connect_timeout, options.connect())
            .await
            .map_err(|_| info.unreachable())?
            .map_err(|e| classify_connect_error(e, info))?;

        let sql = LedgerSql::new(
            info.backend_type.dialect(),
            config.migrations_table.clone(),
            info.schema.as_deref(),
        );

        Ok(Self {
            conn,
            info: info.clone(),
            sql,
        })
    }

    /// Create the ledger schema unless it already exists
    ///
    /// `CREATE SCHEMA IF NOT EXISTS` still requires the CREATE privilege on
    /// the database, so an existing schema is never re-created.
    async fn ensure_schema(&mut self) -> MigrateResult<()> {
        let (Some(schema), Some(create_schema)) = (self.sql.schema(), self.sql.create_schema_sql())
        else {
            return Ok(());
        };

        let exists: bool = sqlx::query_scalar(&self.sql.schema_exists_sql())
            .bind(schema)
            .fetch_one(&mut self.conn)
            .await
            .map_err(|e| classify_query_error(e, &self.info))?;
        if exists {
            return Ok(());
        }

        tracing::debug!(schema, "creating ledger schema");
        sqlx::query(&create_schema)
            .execute(&mut self.conn)
            .await
            .map_err(|e| classify_query_error(e, &self.info))?;
        Ok(())
    }
}

sqlx_history_backend!(PostgresHistory, prepare = ensure_schema);
