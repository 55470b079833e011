//! Integration tests for blueprint compilation across dialects.

mod common;

use common::ALL_DRIVERS;
use quarry_core::dialect::Driver;
use quarry_core::schema::{
    Blueprint, ForeignKeyAction, SchemaCompiler, SchemaPlan, TableSnapshot,
};
use quarry_core::CompileError;

fn compile(driver: Driver, blueprint: &Blueprint) -> Result<Vec<String>, CompileError> {
    SchemaCompiler::new(driver.dialect()).compile(blueprint)
}

fn posts_table() -> Blueprint {
    let mut table = Blueprint::create("posts");
    table.id();
    table.foreign_id("user_id");
    table.string("title", 200);
    table.text("body").nullable();
    table.boolean("published").default(false);
    table.decimal("rating", 3, 1).nullable();
    table.enumeration("status", &["draft", "live"]).default("draft");
    table.timestamps();
    table
        .foreign(&["user_id"])
        .references(&["id"])
        .on("users")
        .on_delete(ForeignKeyAction::Cascade);
    table.index(&["user_id", "published"]);
    table
}

#[test]
fn typical_table_compiles_for_every_dialect() {
    for driver in ALL_DRIVERS {
        let sql = compile(driver, &posts_table()).unwrap();
        assert_eq!(sql.len(), 2, "{driver}: {sql:?}");
        assert!(sql[0].starts_with("CREATE TABLE "), "{driver}");
        assert!(sql[0].contains("FOREIGN KEY"), "{driver}");
        assert!(sql[1].contains("posts_user_id_published_index"), "{driver}");
    }
}

#[test]
fn type_names_follow_dialect() {
    let sqlite = compile(Driver::Sqlite, &posts_table()).unwrap();
    assert!(sqlite[0].contains("\"title\" TEXT NOT NULL"));
    assert!(sqlite[0].contains("\"published\" INTEGER NOT NULL DEFAULT 0"));
    assert!(sqlite[0].contains("CHECK (\"status\" IN ('draft', 'live'))"));

    let pg = compile(Driver::Postgres, &posts_table()).unwrap();
    assert!(pg[0].contains("\"id\" BIGSERIAL NOT NULL PRIMARY KEY"));
    assert!(pg[0].contains("\"title\" VARCHAR(200) NOT NULL"));
    assert!(pg[0].contains("\"published\" BOOLEAN NOT NULL DEFAULT FALSE"));
    assert!(pg[0].contains("\"rating\" DECIMAL(3, 1) NULL"));

    let mysql = compile(Driver::MySql, &posts_table()).unwrap();
    assert!(mysql[0].contains("`id` BIGINT UNSIGNED NOT NULL AUTO_INCREMENT PRIMARY KEY"));
    assert!(mysql[0].contains("`status` ENUM('draft', 'live') NOT NULL DEFAULT 'draft'"));

    let sqlsrv = compile(Driver::SqlServer, &posts_table()).unwrap();
    assert!(sqlsrv[0].contains("[title] NVARCHAR(200) NOT NULL"));
    assert!(sqlsrv[0].contains("[published] BIT NOT NULL DEFAULT 0"));
}

#[test]
fn unsupported_features_are_errors_not_downgrades() {
    let mut table = Blueprint::create("docs");
    table.id();
    table.jsonb("meta");
    for driver in [Driver::Sqlite, Driver::MySql, Driver::SqlServer] {
        assert!(matches!(
            compile(driver, &table),
            Err(CompileError::Unsupported { .. })
        ));
    }
    assert!(compile(Driver::Postgres, &table).is_ok());

    let mut table = Blueprint::create("docs");
    table.id();
    table.text("body");
    table.fulltext(&["body"]);
    assert!(compile(Driver::Sqlite, &table).is_err());
    assert!(compile(Driver::SqlServer, &table).is_err());
    assert!(compile(Driver::MySql, &table).is_ok());
    assert!(compile(Driver::Postgres, &table).is_ok());

    let mut alter = Blueprint::alter("posts");
    alter.drop_foreign_on(&["user_id"]);
    assert!(compile(Driver::Sqlite, &alter).is_err());
    assert_eq!(
        compile(Driver::MySql, &alter).unwrap(),
        vec!["ALTER TABLE `posts` DROP FOREIGN KEY `posts_user_id_foreign`".to_string()]
    );
}

fn users_snapshot() -> TableSnapshot {
    TableSnapshot::parse(
        "users",
        "CREATE TABLE \"users\" (\"id\" INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT, \
         \"email\" TEXT NOT NULL, \"age\" INTEGER NOT NULL)",
        vec!["CREATE UNIQUE INDEX \"users_email_unique\" ON \"users\" (\"email\")".to_string()],
    )
    .unwrap()
}

#[test]
fn sqlite_change_rebuilds_the_table_once() {
    let snapshot = users_snapshot();
    let mut alter = Blueprint::alter("users");
    alter.string("age", 10).nullable().change();
    alter.string("email", 320).change();
    alter.string("nick", 20).nullable();

    let sql = SchemaCompiler::new(Driver::Sqlite.dialect())
        .with_snapshot(Some(&snapshot))
        .compile(&alter)
        .unwrap();
    assert_eq!(sql.iter().filter(|s| s.starts_with("SAVEPOINT")).count(), 1);
    assert!(sql.contains(
        &"CREATE TABLE \"__quarry_tmp_users\" (\"id\" INTEGER NOT NULL PRIMARY KEY \
          AUTOINCREMENT, \"email\" TEXT NOT NULL, \"age\" TEXT NULL)"
            .to_string()
    ));
    assert!(sql.contains(
        &"INSERT INTO \"__quarry_tmp_users\" (\"id\", \"email\", \"age\") SELECT \"id\", \
          CAST(\"email\" AS TEXT), CAST(\"age\" AS TEXT) FROM \"users\""
            .to_string()
    ));
    let release = sql.iter().position(|s| s == "RELEASE quarry_rebuild").unwrap();
    let index = sql
        .iter()
        .position(|s| s.starts_with("CREATE UNIQUE INDEX \"users_email_unique\""))
        .unwrap();
    assert!(index < release);
    assert_eq!(
        sql.last().map(String::as_str),
        Some("ALTER TABLE \"users\" ADD COLUMN \"nick\" TEXT NULL")
    );
}

#[test]
fn sqlite_change_needs_snapshot_and_leading_position() {
    let mut alter = Blueprint::alter("users");
    alter.string("age", 10).change();
    assert!(matches!(
        compile(Driver::Sqlite, &alter),
        Err(CompileError::InvalidBlueprint { .. })
    ));

    let snapshot = users_snapshot();
    let mut late = Blueprint::alter("users");
    late.drop_column("nick");
    late.string("age", 10).change();
    let err = SchemaCompiler::new(Driver::Sqlite.dialect())
        .with_snapshot(Some(&snapshot))
        .compile(&late)
        .unwrap_err();
    assert!(err.to_string().contains("must come before other commands"));
}

#[test]
fn change_replaces_emulated_checks_instead_of_stacking_them() {
    let mut alter = Blueprint::alter("stock");
    alter.integer("qty").unsigned().change();

    let pg = compile(Driver::Postgres, &alter).unwrap();
    assert_eq!(
        pg[0],
        "ALTER TABLE \"stock\" DROP CONSTRAINT IF EXISTS \"stock_qty_check\""
    );
    assert_eq!(
        pg.iter().filter(|s| s.contains("ADD CONSTRAINT \"stock_qty_check\"")).count(),
        1
    );

    let mssql = compile(Driver::SqlServer, &alter).unwrap();
    assert!(mssql[0].contains("sys.check_constraints"));
    assert!(mssql[0].contains("sys.default_constraints"));
    assert_eq!(
        mssql.last().map(String::as_str),
        Some("ALTER TABLE [stock] ADD CONSTRAINT [stock_qty_check] CHECK ([qty] >= 0)")
    );
}

#[test]
fn plan_compiles_operations_in_order() {
    let mut plan = SchemaPlan::new();
    plan.create("tags", |t| {
        t.increments("id");
        t.string("name", 50).unique();
    })
    .rename("labels", "old_labels")
    .drop_if_exists("old_labels");

    let sql = SchemaCompiler::new(Driver::Postgres.dialect())
        .compile_plan(&plan)
        .unwrap();
    assert_eq!(
        sql,
        vec![
            "CREATE TABLE \"tags\" (\"id\" SERIAL NOT NULL PRIMARY KEY CHECK (\"id\" >= 0), \
             \"name\" VARCHAR(50) NOT NULL)"
                .to_string(),
            "CREATE UNIQUE INDEX \"tags_name_unique\" ON \"tags\" (\"name\")".to_string(),
            "ALTER TABLE \"labels\" RENAME TO \"old_labels\"".to_string(),
            "DROP TABLE IF EXISTS \"old_labels\"".to_string(),
        ]
    );
}
