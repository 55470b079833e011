//! Integration tests for query compilation across dialects.
//!
//! The central property: for every dialect the number of placeholders in
//! the SQL equals the number of bindings, and numbered placeholders run
//! 1..=n in emission order.

mod common;

use common::{count_placeholders, numbered_placeholders, ALL_DRIVERS};
use quarry_core::dialect::Driver;
use quarry_core::query::{Direction, JoinKind, QueryBuilder};
use quarry_core::value::{row, SqlValue};
use quarry_core::QueryError;

fn busy_query() -> QueryBuilder {
    QueryBuilder::table("orders as o")
        .select(&["o.id", "c.name"])
        .select_raw("o.total * ? AS gross", vec![SqlValue::Float(1.2)])
        .join_with(JoinKind::Left, "customers as c", |j| {
            j.on("c.id", "=", "o.customer_id")
                .where_("c.active", true)
        })
        .where_("o.status", vec!["paid", "shipped"])
        .where_group(|g| {
            g.where_op("o.total", ">", 100)
                .or_where_raw("o.note LIKE '%?%' AND o.priority = ?", vec![SqlValue::Int(1)])
        })
        .where_not_null("o.shipped_at")
        .where_between("o.created_at", "2024-01-01", "2024-12-31")
        .group_by(&["o.id", "c.name"])
        .having("gross", ">=", 50)
        .order_by_desc("o.id")
        .order_by_raw("CASE WHEN o.status = ? THEN 0 ELSE 1 END", vec![SqlValue::Text("paid".into())])
        .limit(20)
        .offset(40)
}

#[test]
fn placeholder_and_binding_counts_match_for_every_dialect() {
    for driver in ALL_DRIVERS {
        let (sql, params) = busy_query().to_sql(driver.dialect()).unwrap();
        assert_eq!(
            count_placeholders(&sql, driver),
            params.len(),
            "{driver}: {sql}"
        );
    }
}

#[test]
fn numbered_placeholders_run_in_order() {
    let (sql, params) = busy_query().to_sql(Driver::Postgres.dialect()).unwrap();
    let expected: Vec<usize> = (1..=params.len()).collect();
    assert_eq!(numbered_placeholders(&sql, "$"), expected);

    let (sql, params) = busy_query().to_sql(Driver::SqlServer.dialect()).unwrap();
    let expected: Vec<usize> = (1..=params.len()).collect();
    assert_eq!(numbered_placeholders(&sql, "@p"), expected);
}

#[test]
fn bindings_follow_clause_order() {
    let (_, params) = busy_query().to_sql(Driver::Sqlite.dialect()).unwrap();
    assert_eq!(
        params,
        vec![
            SqlValue::Float(1.2),
            SqlValue::Bool(true),
            SqlValue::Text("paid".into()),
            SqlValue::Text("shipped".into()),
            SqlValue::Int(100),
            SqlValue::Int(1),
            SqlValue::Text("2024-01-01".into()),
            SqlValue::Text("2024-12-31".into()),
            SqlValue::Int(50),
            SqlValue::Text("paid".into()),
        ]
    );
}

#[test]
fn limit_offset_syntax_per_dialect() {
    let query = QueryBuilder::table("t").order_by("id").limit(5).offset(10);
    let tails: Vec<String> = [Driver::Sqlite, Driver::MySql, Driver::SqlServer]
        .iter()
        .map(|d| query.to_sql(d.dialect()).unwrap().0)
        .collect();
    assert!(tails[0].ends_with("LIMIT 5 OFFSET 10"));
    assert!(tails[1].ends_with("LIMIT 5 OFFSET 10"));
    assert!(tails[2].ends_with("OFFSET 10 ROWS FETCH NEXT 5 ROWS ONLY"));

    let offset_only = QueryBuilder::table("t").offset(3);
    assert!(offset_only
        .to_sql(Driver::Sqlite.dialect())
        .unwrap()
        .0
        .ends_with("LIMIT -1 OFFSET 3"));
    assert!(offset_only
        .to_sql(Driver::Postgres.dialect())
        .unwrap()
        .0
        .ends_with(" OFFSET 3"));
}

#[test]
fn quoting_per_dialect() {
    let query = QueryBuilder::table("users").select(&["users.id", "name as n"]);
    let expected = [
        (Driver::Sqlite, "SELECT \"users\".\"id\", \"name\" AS \"n\" FROM \"users\""),
        (Driver::Postgres, "SELECT \"users\".\"id\", \"name\" AS \"n\" FROM \"users\""),
        (Driver::MySql, "SELECT `users`.`id`, `name` AS `n` FROM `users`"),
        (Driver::SqlServer, "SELECT [users].[id], [name] AS [n] FROM [users]"),
    ];
    for (driver, sql) in expected {
        assert_eq!(query.to_sql(driver.dialect()).unwrap().0, sql);
    }
}

#[test]
fn malformed_input_rejected_before_compilation() {
    let cases = [
        QueryBuilder::table("t").where_op("a", "<=>", 1),
        QueryBuilder::table("t").where_("a b", 1),
        QueryBuilder::table("t").where_raw("a = ? AND b = ?", vec![SqlValue::Int(1)]),
        QueryBuilder::table("t").where_op("a", ">", SqlValue::Null),
        QueryBuilder::table("t").where_op("a", "between", vec![1, 2, 3]),
        QueryBuilder::table("t").order_by(""),
    ];
    for query in cases {
        assert!(query.error().is_some());
        for driver in ALL_DRIVERS {
            assert!(query.to_sql(driver.dialect()).is_err());
        }
    }
}

#[test]
fn first_error_wins() {
    let query = QueryBuilder::table("t")
        .where_op("a", "~~", 1)
        .where_("b c", 2);
    assert!(matches!(
        query.to_sql(Driver::Sqlite.dialect()),
        Err(QueryError::UnknownOperator { .. })
    ));
}

#[test]
fn cursor_constraint_composes_with_filters() {
    let (sql, params) = QueryBuilder::table("events")
        .where_("kind", "click")
        .or_where("kind", "view")
        .cursor("id", Direction::Asc, Some(SqlValue::Int(100)))
        .limit(51)
        .to_sql(Driver::MySql.dialect())
        .unwrap();
    assert_eq!(
        sql,
        "SELECT * FROM `events` WHERE (`kind` = ? OR `kind` = ?) AND `id` > ? \
         ORDER BY `id` ASC LIMIT 51"
    );
    assert_eq!(params.len(), 3);
}

#[test]
fn write_statements_bind_every_value() {
    let rows = vec![
        row([("email", SqlValue::Text("a@x".into())), ("age", SqlValue::Int(30))]),
        row([("email", SqlValue::Text("b@x".into())), ("age", SqlValue::Null)]),
    ];
    for driver in ALL_DRIVERS {
        let (sql, params) = QueryBuilder::table("users")
            .compile_insert(driver.dialect(), &rows)
            .unwrap();
        assert_eq!(count_placeholders(&sql, driver), params.len());
        assert_eq!(params.len(), 4);

        let (sql, params) = QueryBuilder::table("users")
            .where_("id", 1)
            .compile_update(driver.dialect(), &row([("age", 31)]))
            .unwrap();
        assert_eq!(count_placeholders(&sql, driver), params.len());

        let (sql, params) = QueryBuilder::table("users")
            .where_in("id", [1, 2, 3])
            .compile_delete(driver.dialect())
            .unwrap();
        assert_eq!(count_placeholders(&sql, driver), params.len());
    }
}
