//! Typed configuration.
//!
//! Connections are looked up by name; per-connection settings fall back to
//! the global ones.
//!
//! ```toml
//! default = "main"
//! normalize_numeric = true
//!
//! [connections.main]
//! driver = "sqlite"
//! database = "app.sqlite3"
//!
//! [connections.audit]
//! driver = "sqlite"
//! url = "sqlite:audit.sqlite3"
//! ledger_table = "audit_migrations"
//! prefix = "audit_"
//! timezone = "+02:00"
//!
//! [migrations]
//! root = "migrations"
//! recursive = false
//!
//! [migrations.directories]
//! audit = "audit"
//! ```

use std::path::{Path, PathBuf};

use chrono::{FixedOffset, Offset, Utc};
use indexmap::IndexMap;
use quarry_core::Driver;
use serde::Deserialize;

use crate::error::{MigrateError, Result};

const DEFAULT_LEDGER_TABLE: &str = "migrations";

fn default_connection_name() -> String {
    "default".to_string()
}

const fn default_pool_size() -> u32 {
    5
}

fn default_root() -> PathBuf {
    PathBuf::from("migrations")
}

fn default_ledger_table() -> String {
    DEFAULT_LEDGER_TABLE.to_string()
}

/// Settings for one named connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    /// Dialect of the database.
    pub driver: Driver,
    /// Full connection URL. Takes precedence over the discrete fields.
    #[serde(default)]
    pub url: Option<String>,
    /// Host name.
    #[serde(default)]
    pub host: Option<String>,
    /// Port.
    #[serde(default)]
    pub port: Option<u16>,
    /// Database name (file path for SQLite).
    #[serde(default)]
    pub database: Option<String>,
    /// User name.
    #[serde(default)]
    pub username: Option<String>,
    /// Password.
    #[serde(default)]
    pub password: Option<String>,
    /// Maximum pool size.
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    /// Ledger table for this connection.
    #[serde(default)]
    pub ledger_table: Option<String>,
    /// Prefix applied to every table name compiled for this connection.
    #[serde(default)]
    pub prefix: Option<String>,
    /// UTC offset used for ledger timestamps, e.g. `+02:00` or `UTC`.
    #[serde(default)]
    pub timezone: Option<String>,
}

impl ConnectionConfig {
    /// Connection settings with only a driver and URL.
    #[must_use]
    pub fn from_url(driver: Driver, url: impl Into<String>) -> Self {
        Self {
            driver,
            url: Some(url.into()),
            host: None,
            port: None,
            database: None,
            username: None,
            password: None,
            pool_size: default_pool_size(),
            ledger_table: None,
            prefix: None,
            timezone: None,
        }
    }

    /// Connection URL, assembled from the discrete fields when `url` is unset.
    pub fn connection_url(&self) -> Result<String> {
        if let Some(url) = &self.url {
            return Ok(url.clone());
        }
        let database = self.database.as_deref().ok_or_else(|| {
            MigrateError::Configuration(format!(
                "{} connection needs either `url` or `database`",
                self.driver
            ))
        })?;
        if self.driver == Driver::Sqlite {
            return Ok(format!("sqlite:{database}"));
        }

        let scheme = match self.driver {
            Driver::Postgres => "postgres",
            Driver::MySql => "mysql",
            Driver::SqlServer => "mssql",
            Driver::Sqlite => "sqlite",
        };
        let credentials = match (&self.username, &self.password) {
            (Some(user), Some(password)) => format!("{user}:{password}@"),
            (Some(user), None) => format!("{user}@"),
            _ => String::new(),
        };
        let host = self.host.as_deref().unwrap_or("localhost");
        let port = self.port.map(|p| format!(":{p}")).unwrap_or_default();
        Ok(format!("{scheme}://{credentials}{host}{port}/{database}"))
    }
}

/// Where migrations live.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MigrationsConfig {
    /// Root directory of migration files.
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Descend into subdirectories of the root.
    #[serde(default)]
    pub recursive: bool,
    /// Default ledger table.
    #[serde(default = "default_ledger_table")]
    pub ledger_table: String,
    /// Connection name to subdirectory (relative to the root) whose
    /// migrations run on that connection.
    #[serde(default)]
    pub directories: IndexMap<String, PathBuf>,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            recursive: false,
            ledger_table: default_ledger_table(),
            directories: IndexMap::new(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Name of the default connection.
    #[serde(default = "default_connection_name")]
    pub default: String,
    /// Named connections.
    #[serde(default)]
    pub connections: IndexMap<String, ConnectionConfig>,
    /// Migration discovery settings.
    #[serde(default)]
    pub migrations: MigrationsConfig,
    /// Turn numeric-looking text in result rows into numbers.
    #[serde(default)]
    pub normalize_numeric: bool,
}

impl Config {
    /// Configuration with a single default connection.
    #[must_use]
    pub fn single(connection: ConnectionConfig) -> Self {
        let mut connections = IndexMap::new();
        connections.insert(default_connection_name(), connection);
        Self {
            default: default_connection_name(),
            connections,
            migrations: MigrationsConfig::default(),
            normalize_numeric: false,
        }
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Checks cross-references between sections.
    pub fn validate(&self) -> Result<()> {
        if !self.connections.contains_key(&self.default) {
            return Err(MigrateError::Configuration(format!(
                "default connection '{}' is not defined",
                self.default
            )));
        }
        for name in self.migrations.directories.keys() {
            if !self.connections.contains_key(name) {
                return Err(MigrateError::Configuration(format!(
                    "migration directory mapped to undefined connection '{name}'"
                )));
            }
        }
        for (name, connection) in &self.connections {
            if connection.pool_size == 0 {
                return Err(MigrateError::Configuration(format!(
                    "connection '{name}' has a pool size of 0"
                )));
            }
            if let Some(tz) = &connection.timezone {
                parse_offset(tz).ok_or_else(|| {
                    MigrateError::Configuration(format!(
                        "connection '{name}' has an invalid timezone '{tz}'"
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Resolves `name` (or the default when `None`) to its settings.
    pub fn connection(&self, name: Option<&str>) -> Result<(&str, &ConnectionConfig)> {
        let name = name.unwrap_or(&self.default);
        self.connections
            .get_key_value(name)
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| MigrateError::Configuration(format!("unknown connection '{name}'")))
    }

    /// Ledger table for a connection.
    #[must_use]
    pub fn ledger_table_for(&self, name: &str) -> &str {
        self.connections
            .get(name)
            .and_then(|c| c.ledger_table.as_deref())
            .unwrap_or(&self.migrations.ledger_table)
    }

    /// Table prefix for a connection.
    #[must_use]
    pub fn prefix_for(&self, name: &str) -> &str {
        self.connections
            .get(name)
            .and_then(|c| c.prefix.as_deref())
            .unwrap_or("")
    }

    /// UTC offset for a connection's timestamps.
    #[must_use]
    pub fn timezone_for(&self, name: &str) -> FixedOffset {
        self.connections
            .get(name)
            .and_then(|c| c.timezone.as_deref())
            .and_then(parse_offset)
            .unwrap_or_else(utc)
    }

    /// Directory holding the migrations of `connection`, if one is mapped.
    #[must_use]
    pub fn directory_for(&self, connection: &str) -> Option<PathBuf> {
        self.migrations
            .directories
            .get(connection)
            .map(|dir| self.migrations.root.join(dir))
    }
}

fn utc() -> FixedOffset {
    Utc.fix()
}

/// Parses `UTC`, `Z` or `±HH:MM`.
fn parse_offset(value: &str) -> Option<FixedOffset> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("utc") || value == "Z" {
        return Some(utc());
    }
    let (sign, rest) = match value.as_bytes().first()? {
        b'+' => (1, &value[1..]),
        b'-' => (-1, &value[1..]),
        _ => return None,
    };
    let (hours, minutes) = rest.split_once(':')?;
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
