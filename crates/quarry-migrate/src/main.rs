//! quarry CLI
//!
//! Command-line tool for managing database migrations.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use quarry_core::Driver;
use quarry_migrate::prelude::*;

/// Batch-tracked schema migrations.
#[derive(Parser)]
#[command(name = "quarry")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file.
    #[arg(short, long, env = "QUARRY_CONFIG", default_value = "quarry.toml")]
    config: PathBuf,

    /// SQLite database URL, used when the configuration file does not exist.
    #[arg(short, long, env = "DATABASE_URL", default_value = "sqlite:quarry.sqlite3")]
    database_url: String,

    /// Migrations directory, used when the configuration file does not exist.
    #[arg(short, long, default_value = "migrations")]
    migrations_dir: PathBuf,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending migrations.
    #[command(name = "migrate")]
    Migrate {
        /// Show SQL without executing.
        #[arg(long)]
        pretend: bool,
    },

    /// Revert the last batch.
    #[command(name = "migrate:rollback")]
    Rollback {
        /// Revert this many migrations instead of one batch.
        #[arg(long)]
        step: Option<u64>,

        /// Show SQL without executing.
        #[arg(long)]
        pretend: bool,
    },

    /// Revert every migration.
    #[command(name = "migrate:reset")]
    Reset {
        /// Show SQL without executing.
        #[arg(long)]
        pretend: bool,
    },

    /// Revert every migration, then migrate.
    #[command(name = "migrate:refresh")]
    Refresh,

    /// Drop every table, then migrate.
    #[command(name = "migrate:fresh")]
    Fresh,

    /// Show which migrations have run.
    #[command(name = "migrate:status")]
    Status {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Create a new migration file.
    #[command(name = "make:migration")]
    MakeMigration {
        /// Migration name, e.g. `create_flights_table`.
        name: String,

        /// Connection the migration runs on.
        #[arg(short, long)]
        connection: Option<String>,
    },
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    if cli.config.exists() {
        return Config::load(&cli.config)
            .with_context(|| format!("loading {}", cli.config.display()));
    }
    let mut config = Config::single(ConnectionConfig::from_url(
        Driver::Sqlite,
        cli.database_url.clone(),
    ));
    config.migrations.root.clone_from(&cli.migrations_dir);
    Ok(config)
}

fn print_report(report: &MigrationReport) {
    for unit in &report.pretended {
        println!("-- {} ({})", unit.id, unit.connection);
        for sql in &unit.statements {
            println!("{sql};");
        }
    }
    for table in &report.dropped {
        info!(table = %table, "Dropped");
    }
    for id in &report.rolled_back {
        info!(id = %id, "Rolled back");
    }
    for id in &report.migrated {
        info!(id = %id, "Migrated");
    }
}

fn print_status(entries: &[StatusEntry]) {
    if entries.is_empty() {
        info!("No migrations found.");
        return;
    }
    println!("\n{:<8} {:<6} {:<12} Migration", "Ran?", "Batch", "Connection");
    println!("{:-<72}", "");
    for entry in entries {
        let ran = match (entry.applied, entry.missing) {
            (_, true) => "Missing",
            (true, false) => "Yes",
            (false, false) => "Pending",
        };
        let batch = entry.batch.map(|b| b.to_string()).unwrap_or_default();
        println!("{ran:<8} {batch:<6} {:<12} {}", entry.connection, entry.id);
    }
    println!();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Migrate { pretend } => {
            if pretend {
                info!("Pretend mode - SQL will be printed but not executed.");
            }
            let report = Migrator::new(config).pretend(pretend).migrate().await?;
            print_report(&report);
        }

        Commands::Rollback { step, pretend } => {
            let report = Migrator::new(config)
                .pretend(pretend)
                .rollback(step)
                .await?;
            print_report(&report);
        }

        Commands::Reset { pretend } => {
            let report = Migrator::new(config).pretend(pretend).reset().await?;
            print_report(&report);
        }

        Commands::Refresh => {
            let report = Migrator::new(config).refresh().await?;
            print_report(&report);
        }

        Commands::Fresh => {
            let report = Migrator::new(config).fresh().await?;
            print_report(&report);
        }

        Commands::Status { json } => {
            let entries = Migrator::new(config).status().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                print_status(&entries);
            }
        }

        Commands::MakeMigration { name, connection } => {
            let now = chrono::Local::now().naive_local();
            let path = make_migration(&config, &name, connection.as_deref(), now)?;
            println!("Created migration: {}", path.display());
        }
    }

    Ok(())
}
