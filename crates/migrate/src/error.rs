//! Error types for migration history resolution
//!
//! Every failure surfaced by this crate is a [`MigrateError`]. Failures that
//! callers script against carry a stable [`ErrorCode`]; the rest are grouped
//! by [`ErrorKind`] only.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Result type alias for migration history operations
pub type MigrateResult<T> = Result<T, MigrateError>;

/// Stable error identifiers surfaced to callers and automation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorCode {
    /// Authentication failed against the database server
    P1000,
    /// Database server cannot be reached
    P1001,
    /// Target database does not exist
    P1003,
    /// Migration is already recorded as applied
    P3008,
    /// Migration cannot be rolled back because it was never applied
    P3011,
    /// Migration is not in a failed state
    P3012,
    /// Migration could not be found
    P3017,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::P1000 => "P1000",
            ErrorCode::P1001 => "P1001",
            ErrorCode::P1003 => "P1003",
            ErrorCode::P3008 => "P3008",
            ErrorCode::P3011 => "P3011",
            ErrorCode::P3012 => "P3012",
            ErrorCode::P3017 => "P3017",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Broad failure classes, used by callers to decide what to do next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Server unreachable, database missing, authentication failure
    Connectivity,
    /// Unknown migration name or illegal state transition
    Validation,
    /// The ledger row changed between read and conditional write
    Conflict,
    /// Driver, configuration or filesystem failures outside the coded set
    Internal,
}

/// Migration history error
#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("Authentication failed against database server at `{host}`, the provided database credentials for `{user}` are not valid.\n\nPlease make sure to provide valid database credentials for the database server at `{host}`.")]
    AuthenticationFailed { host: String, user: String },

    #[error("Can't reach database server at `{host}:{port}`\n\nPlease make sure your database server is running at `{host}:{port}`.")]
    DatabaseUnreachable { host: String, port: u16 },

    #[error("Database `{database}` does not exist{}", on_server(.server))]
    DatabaseDoesNotExist {
        database: String,
        /// `host:port` for network databases, `None` for file databases
        server: Option<String>,
    },

    #[error("The migration `{migration_name}` is already recorded as applied in the database.")]
    AlreadyApplied { migration_name: String },

    #[error("Migration `{migration_name}` cannot be rolled back because it was never applied to the database. Hint: did you pass in the whole migration name? (example: \"20201231000000_initial_migration\")")]
    RollbackOfUnknownMigration { migration_name: String },

    #[error("Migration `{migration_name}` cannot be rolled back because it is not in a failed state.")]
    NotInFailedState { migration_name: String },

    #[error("The migration {migration_name} could not be found. Please make sure that the migration exists, and that you included the whole name of the directory. (example: \"20201231000000_initial_migration\")")]
    MigrationNotFound { migration_name: String },

    #[error("The migration `{migration_name}` was modified by another process while it was being resolved. Re-run the command against the current state of the migration history.")]
    ConcurrentModification { migration_name: String },

    #[error("Database error: {message}")]
    Database { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Migration directory error: {message}")]
    Directory { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn on_server(server: &Option<String>) -> String {
    match server {
        Some(server) => format!(" on the database server at `{}`.", server),
        None => String::new(),
    }
}

impl MigrateError {
    /// Create a new database error
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a new migration directory error
    pub fn directory(message: impl Into<String>) -> Self {
        Self::Directory {
            message: message.into(),
        }
    }

    /// Stable code for this failure, if it belongs to the coded set
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            MigrateError::AuthenticationFailed { .. } => Some(ErrorCode::P1000),
            MigrateError::DatabaseUnreachable { .. } => Some(ErrorCode::P1001),
            MigrateError::DatabaseDoesNotExist { .. } => Some(ErrorCode::P1003),
            MigrateError::AlreadyApplied { .. } => Some(ErrorCode::P3008),
            MigrateError::RollbackOfUnknownMigration { .. } => Some(ErrorCode::P3011),
            MigrateError::NotInFailedState { .. } => Some(ErrorCode::P3012),
            MigrateError::MigrationNotFound { .. } => Some(ErrorCode::P3017),
            _ => None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            MigrateError::AuthenticationFailed { .. }
            | MigrateError::DatabaseUnreachable { .. }
            | MigrateError::DatabaseDoesNotExist { .. } => ErrorKind::Connectivity,
            MigrateError::AlreadyApplied { .. }
            | MigrateError::RollbackOfUnknownMigration { .. }
            | MigrateError::NotInFailedState { .. }
            | MigrateError::MigrationNotFound { .. } => ErrorKind::Validation,
            MigrateError::ConcurrentModification { .. } => ErrorKind::Conflict,
            MigrateError::Database { .. }
            | MigrateError::Configuration { .. }
            | MigrateError::Directory { .. }
            | MigrateError::Io(_) => ErrorKind::Internal,
        }
    }

    /// Whether re-invoking the whole operation may succeed
    ///
    /// Nothing in this crate retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Conflict | ErrorKind::Connectivity)
    }

    /// Canonical coded rendering of this error
    pub fn render(&self) -> String {
        match (self.code(), self.kind()) {
            (Some(code), ErrorKind::Connectivity) => format!("{}: {}", code, self),
            (Some(code), _) => format!("{}\n\n{}\n", code, self),
            (None, _) => self.to_string(),
        }
    }

    pub fn to_user_facing(&self) -> UserFacingError {
        UserFacingError {
            code: self.code(),
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

/// Serializable view of a [`MigrateError`] for machine-readable output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserFacingError {
    pub code: Option<ErrorCode>,
    pub kind: ErrorKind,
    pub message: String,
}

// Raw driver failures that were not classified at a connectivity boundary
impl From<sqlx::Error> for MigrateError {
    fn from(err: sqlx::Error) -> Self {
        MigrateError::Database {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_for_validation_errors() {
        let name = "20201014154943_init".to_string();
        assert_eq!(
            MigrateError::AlreadyApplied { migration_name: name.clone() }.code(),
            Some(ErrorCode::P3008)
        );
        assert_eq!(
            MigrateError::RollbackOfUnknownMigration { migration_name: name.clone() }.code(),
            Some(ErrorCode::P3011)
        );
        assert_eq!(
            MigrateError::NotInFailedState { migration_name: name.clone() }.code(),
            Some(ErrorCode::P3012)
        );
        assert_eq!(
            MigrateError::MigrationNotFound { migration_name: name }.code(),
            Some(ErrorCode::P3017)
        );
    }

    #[test]
    fn test_render_unreachable() {
        let err = MigrateError::DatabaseUnreachable {
            host: "doesnotexist".to_string(),
            port: 5432,
        };
        assert_eq!(
            err.render(),
            "P1001: Can't reach database server at `doesnotexist:5432`\n\nPlease make sure your database server is running at `doesnotexist:5432`."
        );
        assert_eq!(err.kind(), ErrorKind::Connectivity);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_render_authentication_failed() {
        let err = MigrateError::AuthenticationFailed {
            host: "localhost".to_string(),
            user: "elif".to_string(),
        };
        assert_eq!(err.code(), Some(ErrorCode::P1000));
        assert_eq!(
            err.render(),
            "P1000: Authentication failed against database server at `localhost`, the provided database credentials for `elif` are not valid.\n\nPlease make sure to provide valid database credentials for the database server at `localhost`."
        );
        assert_eq!(err.kind(), ErrorKind::Connectivity);
    }

    #[test]
    fn test_render_missing_database() {
        let sqlite = MigrateError::DatabaseDoesNotExist {
            database: "dev.db".to_string(),
            server: None,
        };
        assert_eq!(sqlite.render(), "P1003: Database `dev.db` does not exist");

        let postgres = MigrateError::DatabaseDoesNotExist {
            database: "mydb".to_string(),
            server: Some("localhost:5432".to_string()),
        };
        assert_eq!(
            postgres.to_string(),
            "Database `mydb` does not exist on the database server at `localhost:5432`."
        );
    }

    #[test]
    fn test_render_validation_errors() {
        let err = MigrateError::MigrationNotFound {
            migration_name: "does_not_exist".to_string(),
        };
        assert_eq!(
            err.render(),
            "P3017\n\nThe migration does_not_exist could not be found. Please make sure that the migration exists, and that you included the whole name of the directory. (example: \"20201231000000_initial_migration\")\n"
        );

        let err = MigrateError::RollbackOfUnknownMigration {
            migration_name: "does_not_exist".to_string(),
        };
        assert!(err.render().starts_with("P3011\n\nMigration `does_not_exist` cannot be rolled back"));
        assert!(err.render().contains("did you pass in the whole migration name?"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_conflict_is_uncoded_but_retryable() {
        let err = MigrateError::ConcurrentModification {
            migration_name: "20201106130852_failed".to_string(),
        };
        assert_eq!(err.code(), None);
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.is_retryable());
        assert_eq!(err.render(), err.to_string());
    }

    #[test]
    fn test_user_facing_serialization() {
        let err = MigrateError::AlreadyApplied {
            migration_name: "20201014154943_init".to_string(),
        };
        let json = serde_json::to_value(err.to_user_facing()).unwrap();
        assert_eq!(json["code"], "P3008");
        assert_eq!(json["kind"], "validation");
        assert_eq!(
            json["message"],
            "The migration `20201014154943_init` is already recorded as applied in the database."
        );
    }
}
