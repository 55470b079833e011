//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use quarry_core::Driver;
use quarry_migrate::prelude::*;

/// Configuration with one in-memory SQLite connection named `default`.
pub fn memory_config(root: &Path) -> Config {
    let mut config = Config::single(ConnectionConfig::from_url(Driver::Sqlite, "sqlite::memory:"));
    config.migrations.root = root.to_path_buf();
    config
}

/// Records `up:<id>` / `down:<id>` in call order.
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn calls(log: &CallLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Creates one table with an id and a name column.
pub struct CreateTable {
    pub id: &'static str,
    pub table: &'static str,
    pub log: CallLog,
    pub transactional: bool,
}

impl CreateTable {
    pub fn new(id: &'static str, table: &'static str, log: &CallLog) -> Self {
        Self {
            id,
            table,
            log: Arc::clone(log),
            transactional: false,
        }
    }
}

#[async_trait]
impl Migration for CreateTable {
    fn id(&self) -> &str {
        self.id
    }

    fn within_transaction(&self) -> bool {
        self.transactional
    }

    async fn up(&self, schema: &Schema<'_>) -> Result<()> {
        self.log.lock().unwrap().push(format!("up:{}", self.id));
        schema
            .create(self.table, |t| {
                t.id();
                t.string("name", 100);
            })
            .await
    }

    async fn down(&self, schema: &Schema<'_>) -> Result<()> {
        self.log.lock().unwrap().push(format!("down:{}", self.id));
        schema.drop_if_exists(self.table).await
    }
}

/// Creates a table, then runs a statement that fails.
pub struct HalfDone {
    pub id: &'static str,
    pub table: &'static str,
    pub transactional: bool,
}

#[async_trait]
impl Migration for HalfDone {
    fn id(&self) -> &str {
        self.id
    }

    fn within_transaction(&self) -> bool {
        self.transactional
    }

    async fn up(&self, schema: &Schema<'_>) -> Result<()> {
        schema
            .create(self.table, |t| {
                t.id();
            })
            .await?;
        schema.statement("INSERT INTO no_such_table VALUES (1)").await?;
        Ok(())
    }

    async fn down(&self, schema: &Schema<'_>) -> Result<()> {
        schema.drop_if_exists(self.table).await
    }
}
