mod commands;
mod logging;

use clap::{Parser, Subcommand};
use commands::migrate::{self, ResolveArgs};
use logging::{LogFormat, LoggingConfig};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "elifrs")]
#[command(about = "elif.rs CLI - database migration tooling")]
#[command(version)]
struct Cli {
    /// Log level for diagnostics written to stderr (e.g. "debug", "info")
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Format of diagnostic logs
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database migration management
    Migrate {
        #[command(subcommand)]
        migrate_command: MigrateCommands,
    },
}

#[derive(Subcommand)]
enum MigrateCommands {
    /// Resolve a failed migration by marking it as applied or rolled back
    Resolve {
        /// Mark the named migration as applied
        #[arg(long, value_name = "MIGRATION")]
        applied: Option<String>,

        /// Mark the named migration as rolled back
        #[arg(long, value_name = "MIGRATION")]
        rolled_back: Option<String>,

        /// Database URL (defaults to $DATABASE_URL)
        #[arg(long)]
        database_url: Option<String>,

        /// Migrations directory (defaults to $MIGRATIONS_DIR or ./migrations)
        #[arg(long)]
        migrations_dir: Option<PathBuf>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let logging = match cli.log_level {
        Some(level) => LoggingConfig::default().with_level(&level),
        None => LoggingConfig::default(),
    }
    .with_format(cli.log_format);
    if let Err(e) = logging::init_logging(logging) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Commands::Migrate { migrate_command } => match migrate_command {
            MigrateCommands::Resolve {
                applied,
                rolled_back,
                database_url,
                migrations_dir,
                json,
            } => {
                let args = ResolveArgs {
                    applied,
                    rolled_back,
                    database_url,
                    migrations_dir,
                    json,
                };
                migrate::resolve(&args).await
            }
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}
