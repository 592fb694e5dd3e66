//! SQLite History Backend

use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::ConnectOptions;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use super::connection::{classify_connect_error, ConnectionInfo};
use super::core::{sqlx_history_backend, LedgerSql};
use crate::config::MigrateConfig;
use crate::error::{MigrateError, MigrateResult};

const IN_MEMORY: &str = ":memory:";

/// Migration history stored in a SQLite database file
///
/// The database file is never created here: a missing file is reported as
/// a missing database.
pub struct SqliteHistory {
    conn: SqliteConnection,
    info: ConnectionInfo,
    sql: LedgerSql,
}

impl SqliteHistory {
    pub async fn connect(info: &ConnectionInfo, config: &MigrateConfig) -> MigrateResult<Self> {
        let path = info
            .sqlite_path()
            .ok_or_else(|| MigrateError::configuration("Not a SQLite database URL"))?;

        let options = if path == IN_MEMORY {
            SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
                MigrateError::configuration(format!("Invalid SQLite URL: {}", e))
            })?
        } else {
            if !Path::new(path).is_file() {
                return Err(info.missing_database());
            }
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(false)
        }
        .disable_statement_logging();

        // The file exists, so a timeout means it is locked or unresponsive
        let conn = tokio::time::timeout(config.connect_timeout, options.connect())
            .await
            .map_err(|_| open_timed_out(info, config.connect_timeout))?
            .map_err(|e| classify_connect_error(e, info))?;

        Ok(Self {
            conn,
            info: info.clone(),
            sql: LedgerSql::new(info.backend_type.dialect(), config.migrations_table.clone(), None),
        })
    }
}

sqlx_history_backend!(SqliteHistory);

fn open_timed_out(info: &ConnectionInfo, timeout: Duration) -> MigrateError {
    MigrateError::database(format!(
        "Timed out opening SQLite database `{}` after {}s, it may be locked by another process",
        info.database,
        timeout.as_secs_f64()
    ))
}
