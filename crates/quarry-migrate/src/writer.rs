//! Migration file scaffolding for `make:migration`.

use std::path::PathBuf;

use chrono::NaiveDateTime;
use tracing::info;

use crate::config::Config;
use crate::error::{MigrateError, Result};

/// Converts a free-form name to `snake_case`.
///
/// Runs of anything other than ASCII letters and digits collapse to one
/// underscore; camel-case boundaries become underscores.
#[must_use]
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut previous_lower = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if c.is_ascii_uppercase() && previous_lower && !out.ends_with('_') {
                out.push('_');
            }
            previous_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
            out.push(c.to_ascii_lowercase());
        } else {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            previous_lower = false;
        }
    }
    out.trim_end_matches('_').to_string()
}

fn skeleton(connection: Option<&str>) -> String {
    let mut body = String::new();
    if let Some(connection) = connection {
        body.push_str(&format!("-- migrate:connection {connection}\n"));
    }
    body.push_str("-- migrate:up\n\n\n-- migrate:down\n\n");
    body
}

/// Writes `<YYYY_MM_DD_HHMMSS>_<snake_name>.sql` and returns its path.
///
/// The file goes into the connection's mapped directory when it has one,
/// otherwise into the root with a `-- migrate:connection` header. A file
/// with the same name suffix already in the directory is never overwritten.
pub fn make_migration(
    config: &Config,
    name: &str,
    connection: Option<&str>,
    now: NaiveDateTime,
) -> Result<PathBuf> {
    let snake = snake_case(name);
    if snake.is_empty() {
        return Err(MigrateError::Configuration(format!(
            "migration name '{name}' has no usable characters"
        )));
    }
    if let Some(connection) = connection {
        config.connection(Some(connection))?;
    }

    let mapped = connection.and_then(|c| config.directory_for(c));
    let header = if mapped.is_some() { None } else { connection };
    let dir = mapped.unwrap_or_else(|| config.migrations.root.clone());
    std::fs::create_dir_all(&dir)?;

    let suffix = format!("_{snake}.sql");
    for entry in std::fs::read_dir(&dir)? {
        let path = entry?.path();
        let clash = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(&suffix));
        if clash {
            return Err(MigrateError::MigrationExists(path));
        }
    }

    let path = dir.join(format!("{}{suffix}", now.format("%Y_%m_%d_%H%M%S")));
    std::fs::write(&path, skeleton(header))?;
    info!(path = %path.display(), "Created migration");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectionConfig, MigrationsConfig};
    use crate::discovery::SqlMigration;
    use chrono::NaiveDate;
    use quarry_core::Driver;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(14, 5, 7)
            .unwrap()
    }

    fn config(root: &std::path::Path) -> Config {
        let mut config = Config::single(ConnectionConfig::from_url(Driver::Sqlite, "sqlite::memory:"));
        for name in ["audit", "reports"] {
            config
                .connections
                .insert(name.into(), ConnectionConfig::from_url(Driver::Sqlite, "sqlite::memory:"));
        }
        config.migrations = MigrationsConfig {
            root: root.to_path_buf(),
            ..MigrationsConfig::default()
        };
        config.migrations.directories.insert("audit".into(), "audit".into());
        config
    }

    #[test]
    fn test_snake_case() {
        assert_eq!(snake_case("CreateUsersTable"), "create_users_table");
        assert_eq!(snake_case("add votes to users"), "add_votes_to_users");
        assert_eq!(snake_case("  drop--legacy  "), "drop_legacy");
        assert_eq!(snake_case("!!!"), "");
    }

    #[test]
    fn test_writes_parseable_skeleton() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());

        let path = make_migration(&config, "CreateFlights", None, at()).unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "2024_03_09_140507_create_flights.sql"
        );
        let parsed = SqlMigration::load(&path).unwrap();
        assert!(parsed.up_statements().is_empty());
    }

    #[test]
    fn test_connection_routing() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());

        let mapped = make_migration(&config, "audit log", Some("audit"), at()).unwrap();
        assert_eq!(mapped.parent().unwrap(), dir.path().join("audit"));
        let body = std::fs::read_to_string(&mapped).unwrap();
        assert!(!body.contains("migrate:connection"));

        let unmapped = make_migration(&config, "daily totals", Some("reports"), at()).unwrap();
        assert_eq!(unmapped.parent().unwrap(), dir.path());
        let body = std::fs::read_to_string(&unmapped).unwrap();
        assert!(body.starts_with("-- migrate:connection reports\n"));

        assert!(make_migration(&config, "x", Some("nope"), at()).is_err());
    }

    #[test]
    fn test_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        make_migration(&config, "create_posts", None, at()).unwrap();
        let later = at() + chrono::Duration::hours(1);
        assert!(matches!(
            make_migration(&config, "CreatePosts", None, later),
            Err(MigrateError::MigrationExists(_))
        ));
    }
}
