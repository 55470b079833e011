//! Batch-tracked schema migrations for quarry.
//!
//! `quarry-migrate` runs what `quarry-core` compiles:
//! - **Connections** - an async [`connection::Connection`] capability with a
//!   SQLite adapter over `sqlx`
//! - **Runner** - executes query builders and shapes rows and pages
//! - **Schema** - compiles blueprints for a connection and runs them
//! - **Ledger** - the per-connection table of applied units and batches
//! - **Migrator** - discovers units and applies or reverts them by batch
//! - **Writer** - scaffolds new migration files
//!
//! # Example
//!
//! ```rust,no_run
//! use quarry_migrate::prelude::*;
//!
//! struct CreateFlights;
//!
//! #[async_trait::async_trait]
//! impl Migration for CreateFlights {
//!     fn id(&self) -> &str {
//!         "2024_01_01_000000_create_flights"
//!     }
//!
//!     async fn up(&self, schema: &Schema<'_>) -> Result<()> {
//!         schema
//!             .create("flights", |table| {
//!                 table.id();
//!                 table.string("name", 120);
//!                 table.timestamps();
//!             })
//!             .await
//!     }
//!
//!     async fn down(&self, schema: &Schema<'_>) -> Result<()> {
//!         schema.drop_if_exists("flights").await
//!     }
//! }
//!
//! # async fn run() -> Result<()> {
//! let config = Config::load("quarry.toml".as_ref())?;
//! let report = Migrator::new(config).register(CreateFlights).migrate().await?;
//! # let _ = report;
//! # Ok(())
//! # }
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! quarry migrate
//! quarry migrate:rollback --step 2
//! quarry migrate:status --json
//! quarry make:migration create_flights --connection audit
//! ```

pub mod config;
pub mod connection;
pub mod discovery;
pub mod error;
pub mod ledger;
pub mod migrator;
pub mod runner;
pub mod schema;
pub mod sqlite;
pub mod writer;

pub use error::{MigrateError, Result};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::{Config, ConnectionConfig, MigrationsConfig};
    pub use crate::connection::{
        transaction, Connection, Connections, Executor, PretendExecutor, Transaction,
    };
    pub use crate::discovery::{Migration, MigrationUnit, SqlMigration};
    pub use crate::error::{MigrateError, Result};
    pub use crate::ledger::{AppliedMigration, Ledger};
    pub use crate::migrator::{MigrationReport, Migrator, StatusEntry};
    pub use crate::runner::QueryRunner;
    pub use crate::schema::Schema;
    pub use crate::sqlite::SqliteConnection;
    pub use crate::writer::make_migration;
}
