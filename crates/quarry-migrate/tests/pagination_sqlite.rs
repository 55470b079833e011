//! Offset and cursor pagination over a live in-memory SQLite table.

use std::collections::HashSet;

use quarry_core::{row, CursorPaginator, Direction, OffsetPaginator, PaginationError, QueryBuilder, SqlValue};
use quarry_migrate::prelude::*;

async fn seeded(count: i64) -> SqliteConnection {
    let conn = SqliteConnection::connect("default", "sqlite::memory:", 1)
        .await
        .unwrap();
    let schema = Schema::new(&conn);
    schema
        .create("events", |t| {
            t.id();
            t.string("label", 40);
        })
        .await
        .unwrap();
    let rows: Vec<_> = (1..=count)
        .map(|n| row([("label", format!("event {n}"))]))
        .collect();
    schema
        .query()
        .insert(&QueryBuilder::table("events"), &rows)
        .await
        .unwrap();
    conn
}

fn ids(rows: &[quarry_core::Row]) -> Vec<i64> {
    rows.iter().filter_map(|r| r["id"].as_i64()).collect()
}

#[tokio::test]
async fn offset_pages_report_totals() {
    let conn = seeded(25).await;
    let runner = QueryRunner::new(&conn);
    let events = QueryBuilder::table("events").order_by("id");

    let page = runner
        .paginate(&events, &OffsetPaginator::new(3, 10).unwrap())
        .await
        .unwrap();
    assert_eq!(page.total, 25);
    assert_eq!(page.last_page, 3);
    assert!(!page.has_more);
    assert_eq!(ids(&page.items), (21..=25).collect::<Vec<_>>());

    let filtered = events.clone().where_in("id", vec![1, 2, 3]);
    let page = runner
        .paginate(&filtered, &OffsetPaginator::new(1, 2).unwrap())
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    assert!(page.has_more);
}

#[tokio::test]
async fn cursor_pages_are_disjoint_and_complete() {
    let conn = seeded(25).await;
    let runner = QueryRunner::new(&conn);
    let events = QueryBuilder::table("events");
    let pager = CursorPaginator::new(10).unwrap().secret("s3cret");

    let mut seen = Vec::new();
    let mut token: Option<String> = None;
    let mut pages = 0;
    loop {
        let page = runner
            .cursor_paginate(&events, &pager, token.as_deref())
            .await
            .unwrap();
        pages += 1;
        seen.extend(ids(&page.items));
        match page.next_cursor {
            Some(next) => token = Some(next),
            None => break,
        }
    }

    assert_eq!(pages, 3);
    assert_eq!(seen, (1..=25).collect::<Vec<_>>());
    assert_eq!(seen.iter().collect::<HashSet<_>>().len(), 25);
}

#[tokio::test]
async fn descending_cursor_walks_backwards() {
    let conn = seeded(5).await;
    let runner = QueryRunner::new(&conn);
    let pager = CursorPaginator::new(2).unwrap().direction(Direction::Desc);

    let first = runner
        .cursor_paginate(&QueryBuilder::table("events"), &pager, None)
        .await
        .unwrap();
    assert_eq!(ids(&first.items), [5, 4]);
    let second = runner
        .cursor_paginate(
            &QueryBuilder::table("events"),
            &pager,
            first.next_cursor.as_deref(),
        )
        .await
        .unwrap();
    assert_eq!(ids(&second.items), [3, 2]);
}

#[tokio::test]
async fn tampered_cursor_is_rejected() {
    let conn = seeded(15).await;
    let runner = QueryRunner::new(&conn);
    let events = QueryBuilder::table("events");
    let pager = CursorPaginator::new(10).unwrap().secret("s3cret");

    let page = runner.cursor_paginate(&events, &pager, None).await.unwrap();
    let original = page.next_cursor.clone().unwrap();
    let (payload, digest) = original.split_once('.').unwrap();
    let token = format!("{}.{digest}", payload.replacen('e', "f", 1));
    assert_ne!(token, original);

    let err = runner
        .cursor_paginate(&events, &pager, Some(&token))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MigrateError::Pagination(PaginationError::InvalidCursor(_))
    ));

    let other_key = CursorPaginator::new(10).unwrap().secret("different");
    assert!(runner
        .cursor_paginate(&events, &other_key, Some(&original))
        .await
        .is_err());
}

#[tokio::test]
async fn numeric_normalization_is_opt_in() {
    let conn = SqliteConnection::connect("default", "sqlite::memory:", 1)
        .await
        .unwrap();
    let schema = Schema::new(&conn);
    schema
        .create("prices", |t| {
            t.string("code", 10);
            t.string("amount", 10);
        })
        .await
        .unwrap();
    let prices = QueryBuilder::table("prices");
    schema
        .query()
        .insert(&prices, &[row([("code", "0007"), ("amount", "1.50")])])
        .await
        .unwrap();

    let raw = schema.query().first(&prices).await.unwrap().unwrap();
    assert_eq!(raw["amount"], SqlValue::Text("1.50".into()));

    let normalized = schema
        .normalize_numeric(true)
        .query()
        .first(&prices)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(normalized["amount"], SqlValue::Float(1.5));
    assert_eq!(normalized["code"], SqlValue::Text("0007".into()));
}
