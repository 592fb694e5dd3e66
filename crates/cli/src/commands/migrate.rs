use elif_migrate::{
    resolve_migration, ConnectionInfo, MigrateConfig, MigrateError, ResolveDirection,
    ResolveOutcome, ResolveRequest,
};
use serde_json::json;
use std::path::PathBuf;
use thiserror::Error;

const USAGE_MISSING_DIRECTIVE: &str = "--applied or --rolled-back must be part of the command like:
elifrs migrate resolve --applied 20201231000000_example
elifrs migrate resolve --rolled-back 20201231000000_example";

const USAGE_BOTH_DIRECTIVES: &str = "Pass either --applied or --rolled-back, not both.";

/// Flags of `elifrs migrate resolve`
#[derive(Debug, Clone, Default)]
pub struct ResolveArgs {
    pub applied: Option<String>,
    pub rolled_back: Option<String>,
    pub database_url: Option<String>,
    pub migrations_dir: Option<PathBuf>,
    pub json: bool,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    /// Invalid combination of flags, reported before any database work
    #[error("{0}")]
    Usage(&'static str),

    #[error(transparent)]
    Migrate(#[from] MigrateError),
}

impl ResolveError {
    fn render(&self) -> String {
        match self {
            ResolveError::Usage(message) => message.to_string(),
            ResolveError::Migrate(err) => err.render(),
        }
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            ResolveError::Usage(message) => json!({
                "error": { "code": null, "kind": "usage", "message": message }
            }),
            ResolveError::Migrate(err) => json!({ "error": err.to_user_facing() }),
        }
    }
}

/// Exactly one of `--applied` / `--rolled-back` must be given
pub fn request_from_args(args: &ResolveArgs) -> Result<ResolveRequest, ResolveError> {
    match (&args.applied, &args.rolled_back) {
        (Some(name), None) => Ok(ResolveRequest::applied(name.as_str())),
        (None, Some(name)) => Ok(ResolveRequest::rolled_back(name.as_str())),
        (None, None) => Err(ResolveError::Usage(USAGE_MISSING_DIRECTIVE)),
        (Some(_), Some(_)) => Err(ResolveError::Usage(USAGE_BOTH_DIRECTIVES)),
    }
}

/// Build the configuration from the environment, then apply flags
pub fn config_from_args(args: &ResolveArgs) -> Result<MigrateConfig, MigrateError> {
    let mut config = MigrateConfig::from_env()?;
    if let Some(url) = &args.database_url {
        config = config.with_database_url(url.as_str());
    }
    if let Some(dir) = &args.migrations_dir {
        config = config.with_migrations_dir(dir.clone());
    }
    config.validate()?;
    Ok(config)
}

/// Progress line printed after a successful resolution
pub fn outcome_message(outcome: &ResolveOutcome) -> String {
    match outcome.direction() {
        ResolveDirection::Applied => {
            format!("Migration {} marked as applied.", outcome.migration_name())
        }
        ResolveDirection::RolledBack => {
            format!("Migration {} marked as rolled back.", outcome.migration_name())
        }
    }
}

/// Run `elifrs migrate resolve`, reporting the result on stdout or stderr
pub async fn resolve(args: &ResolveArgs) -> Result<(), ResolveError> {
    match run(args).await {
        Ok(outcome) => {
            if args.json {
                println!("{}", json!({ "result": outcome }));
            } else {
                println!();
                println!("{}", outcome_message(&outcome));
            }
            Ok(())
        }
        Err(err) => {
            tracing::debug!(error = ?err, "migrate resolve failed");
            if args.json {
                println!("{}", err.to_json());
            } else {
                eprintln!("{}", err.render());
            }
            Err(err)
        }
    }
}

async fn run(args: &ResolveArgs) -> Result<ResolveOutcome, ResolveError> {
    let request = request_from_args(args)?;
    let config = config_from_args(args)?;
    let info = ConnectionInfo::parse(config.database_url().map_err(MigrateError::from)?)?;

    if !args.json {
        println!("Migrations loaded from {}", config.migrations_dir.display());
        println!("Datasource \"db\": {}", info.describe());
    }

    Ok(resolve_migration(&config, request).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serial_test::serial;
    use std::env;

    fn args(applied: Option<&str>, rolled_back: Option<&str>) -> ResolveArgs {
        ResolveArgs {
            applied: applied.map(str::to_string),
            rolled_back: rolled_back.map(str::to_string),
            ..ResolveArgs::default()
        }
    }

    #[test]
    fn test_requires_a_directive() {
        let err = request_from_args(&args(None, None)).unwrap_err();
        assert_eq!(
            err.render(),
            "--applied or --rolled-back must be part of the command like:\n\
             elifrs migrate resolve --applied 20201231000000_example\n\
             elifrs migrate resolve --rolled-back 20201231000000_example"
        );
    }

    #[test]
    fn test_rejects_both_directives() {
        let err = request_from_args(&args(Some("a"), Some("b"))).unwrap_err();
        assert_eq!(err.render(), "Pass either --applied or --rolled-back, not both.");
        assert_eq!(err.to_json()["error"]["kind"], "usage");
    }

    #[test]
    fn test_single_directive() {
        let request = request_from_args(&args(None, Some("20201106130852_failed"))).unwrap();
        assert_eq!(request, ResolveRequest::rolled_back("20201106130852_failed"));

        let request = request_from_args(&args(Some("20201014154943_init"), None)).unwrap();
        assert_eq!(request.direction, ResolveDirection::Applied);
    }

    #[test]
    #[serial]
    fn test_flags_override_environment() {
        env::set_var("DATABASE_URL", "postgres://localhost/from_env");
        env::set_var("MIGRATIONS_DIR", "env/migrations");

        let mut resolve_args = args(Some("20201014154943_init"), None);
        resolve_args.database_url = Some("file:./dev.db".to_string());
        let config = config_from_args(&resolve_args).unwrap();

        assert_eq!(config.database_url().unwrap(), "file:./dev.db");
        assert_eq!(config.migrations_dir, PathBuf::from("env/migrations"));

        env::remove_var("DATABASE_URL");
        env::remove_var("MIGRATIONS_DIR");
    }

    #[test]
    fn test_outcome_messages() {
        let applied = ResolveOutcome::MarkedApplied {
            migration_name: "20201106130852_failed".to_string(),
            finished_at: Utc::now(),
        };
        assert_eq!(
            outcome_message(&applied),
            "Migration 20201106130852_failed marked as applied."
        );

        let noop = ResolveOutcome::AlreadyRolledBack {
            migration_name: "20201106130852_failed".to_string(),
        };
        assert_eq!(
            outcome_message(&noop),
            "Migration 20201106130852_failed marked as rolled back."
        );
    }

    #[test]
    fn test_coded_error_json() {
        let err = ResolveError::from(MigrateError::AlreadyApplied {
            migration_name: "20201014154943_init".to_string(),
        });
        let value = err.to_json();
        assert_eq!(value["error"]["code"], "P3008");
        assert_eq!(value["error"]["kind"], "validation");
    }
}
