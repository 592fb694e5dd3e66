//! MySQL History Backend

use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::ConnectOptions;
use std::str::FromStr;

use super::connection::{classify_connect_error, ConnectionInfo};
use super::core::{sqlx_history_backend, LedgerSql};
use crate::config::MigrateConfig;
use crate::error::{MigrateError, MigrateResult};

/// Migration history stored in a MySQL database
///
/// MySQL commits DDL implicitly, so `ensure_ledger` runs outside of any
/// transaction; every write is a single guarded `UPDATE`.
pub struct MySqlHistory {
    conn: MySqlConnection,
    info: ConnectionInfo,
    sql: LedgerSql,
}

impl MySqlHistory {
    pub async fn connect(info: &ConnectionInfo, config: &MigrateConfig) -> MigrateResult<Self> {
        let options = MySqlConnectOptions::from_str(&info.connect_url)
            .map_err(|e| MigrateError::configuration(format!("Invalid MySQL URL: {}", e)))?
            .disable_statement_logging();

        let conn = tokio::time::timeout(config.connect_timeout, options.connect())
            .await
            .map_err(|_| info.unreachable())?
            .map_err(|e| classify_connect_error(e, info))?;

        Ok(Self {
            conn,
            info: info.clone(),
            sql: LedgerSql::new(info.backend_type.dialect(), config.migrations_table.clone(), None),
        })
    }
}

sqlx_history_backend!(MySqlHistory);
