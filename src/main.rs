//! triage - Maintenance CLI for the triage store

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use triage::config::Settings;
use triage::domain::UserId;
use triage::services::{OnboardingService, StatsScope, StatsService};
use triage::storage::Database;

/// Inspect and maintain the local triage database
#[derive(Parser)]
#[command(name = "triage", version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Settings file. Defaults to the platform config directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database file. Overrides the settings file and TRIAGE_DATABASE.
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database or bring its schema up to date
    Migrate,

    /// Print record counts and message statistics
    Stats {
        /// Restrict the report to one user
        #[arg(long)]
        user: Option<String>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete expired sessions and verification tokens
    Prune,

    /// Print the effective settings
    Config {
        /// Write the effective settings back to the settings file
        #[arg(long)]
        write: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("{:#}", e);
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings_path = match cli.config {
        Some(path) => path,
        None => Settings::default_path()?,
    };
    let stored = Settings::read(&settings_path)
        .with_context(|| format!("loading settings from {}", settings_path.display()))?;
    let from_file = stored.is_some();
    let mut settings = stored.unwrap_or_default();
    settings.apply_env_overrides();
    if let Some(database) = cli.database {
        settings.database.path = Some(database);
    }

    // Settings pick the log filter, so nothing above can log.
    init_tracing(&settings.logging.filter);
    if from_file {
        tracing::debug!(path = %settings_path.display(), "settings loaded");
    } else {
        tracing::debug!(path = %settings_path.display(), "no settings file, using defaults");
    }

    if let Commands::Config { write } = cli.command {
        println!("{}", serde_json::to_string_pretty(&settings)?);
        if write {
            settings.save(&settings_path)?;
            eprintln!("wrote {}", settings_path.display());
        }
        return Ok(());
    }

    let db_path = settings.database_path()?;
    let db = Database::open_with(&db_path, &settings.database)
        .await
        .with_context(|| format!("opening database {}", db_path.display()))?;

    match cli.command {
        Commands::Migrate => {
            let version = db.schema_version().await?;
            println!("{}: schema version {}", db_path.display(), version);
        }
        Commands::Stats { user, json } => {
            let scope = match user {
                Some(id) => StatsScope::user(UserId::from(id)),
                None => StatsScope::all(),
            };
            let report = StatsService::new(db).report(scope).await?;

            if json {
                println!("{}", report.to_json()?);
            } else {
                println!("users:          {}", report.users);
                println!("gmail accounts: {}", report.gmail_accounts);
                println!("categories:     {}", report.categories);
                println!(
                    "messages:       {} ({} summarized, {} with unsubscribe)",
                    report.messages.count, report.messages.summarized, report.messages.with_unsubscribe
                );
                for (status, count) in &report.messages_by_status {
                    println!("  {:<12} {}", status, count);
                }
                for entry in &report.messages_by_category {
                    println!("  {:<12} {}", entry.name, entry.count);
                }
                println!("actions:");
                for (status, count) in &report.actions_by_status {
                    println!("  {:<12} {}", status, count);
                }
            }
        }
        Commands::Prune => {
            let report = OnboardingService::new(db, settings.triage).prune_expired().await?;
            println!(
                "removed {} sessions and {} verification tokens",
                report.sessions, report.verification_tokens
            );
        }
        Commands::Config { .. } => {}
    }

    Ok(())
}

/// `RUST_LOG` wins over the configured filter.
fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
