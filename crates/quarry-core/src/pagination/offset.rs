//! Page-number pagination.

use crate::dialect::Dialect;
use crate::error::{PaginationError, QueryError};
use crate::query::QueryBuilder;
use crate::value::{Row, SqlValue};

/// Requests page `page` (1-based) of `per_page` rows.
///
/// Totals come from a separate count query; rows inserted or deleted
/// between the two queries can shift items across pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetPaginator {
    page: u64,
    per_page: u64,
}

impl OffsetPaginator {
    /// Both `page` and `per_page` must be at least 1.
    pub fn new(page: u64, per_page: u64) -> Result<Self, PaginationError> {
        if page == 0 {
            return Err(PaginationError::InvalidPage(
                "page numbers start at 1".to_string(),
            ));
        }
        if per_page == 0 {
            return Err(PaginationError::InvalidPage(
                "per_page must be at least 1".to_string(),
            ));
        }
        Ok(Self { page, per_page })
    }

    /// Requested page.
    #[must_use]
    pub const fn page(&self) -> u64 {
        self.page
    }

    /// Page size.
    #[must_use]
    pub const fn per_page(&self) -> u64 {
        self.per_page
    }

    /// Rows skipped before this page.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        (self.page - 1).saturating_mul(self.per_page)
    }

    /// Restricts `builder` to this page.
    #[must_use]
    pub fn apply(&self, builder: QueryBuilder) -> QueryBuilder {
        builder.limit(self.per_page).offset(self.offset())
    }

    /// Compiles the total-count query for `builder`.
    ///
    /// See [`QueryBuilder::to_count_sql`].
    pub fn count_sql(
        &self,
        builder: &QueryBuilder,
        dialect: &dyn Dialect,
    ) -> Result<(String, Vec<SqlValue>), QueryError> {
        builder.to_count_sql(dialect)
    }

    /// Assembles the page from its rows and the total count.
    #[must_use]
    pub fn page_of(&self, items: Vec<Row>, total: u64) -> OffsetPage {
        let last_page = total.div_ceil(self.per_page).max(1);
        OffsetPage {
            items,
            per_page: self.per_page,
            current_page: self.page,
            total,
            last_page,
            has_more: self.page < last_page,
        }
    }
}

/// One page of an offset-paginated query.
#[derive(Debug, Clone, PartialEq)]
pub struct OffsetPage {
    /// Rows on this page.
    pub items: Vec<Row>,
    /// Page size.
    pub per_page: u64,
    /// This page's number (1-based).
    pub current_page: u64,
    /// Rows matching the query across all pages.
    pub total: u64,
    /// Number of the last page; 1 for an empty result.
    pub last_page: u64,
    /// Whether a later page exists.
    pub has_more: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Driver;

    #[test]
    fn test_zero_page_or_size_rejected() {
        assert!(OffsetPaginator::new(0, 10).is_err());
        assert!(OffsetPaginator::new(1, 0).is_err());
    }

    #[test]
    fn test_apply_sets_limit_and_offset() {
        let pager = OffsetPaginator::new(3, 25).unwrap();
        let (sql, _) = pager
            .apply(QueryBuilder::table("posts").order_by("id"))
            .to_sql(Driver::Postgres.dialect())
            .unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM \"posts\" ORDER BY \"id\" ASC LIMIT 25 OFFSET 50"
        );
    }

    #[test]
    fn test_count_sql_drops_order_and_limits() {
        let pager = OffsetPaginator::new(2, 10).unwrap();
        let query = QueryBuilder::table("posts")
            .where_("published", true)
            .order_by("id")
            .limit(10);
        let (sql, params) = pager.count_sql(&query, Driver::Sqlite.dialect()).unwrap();
        assert_eq!(
            sql,
            "SELECT COUNT(*) AS \"aggregate\" FROM \"posts\" WHERE \"published\" = ?"
        );
        assert_eq!(params, vec![SqlValue::Bool(true)]);
    }

    #[test]
    fn test_count_sql_wraps_grouped_queries() {
        let pager = OffsetPaginator::new(1, 10).unwrap();
        let query = QueryBuilder::table("posts")
            .select(&["author_id"])
            .group_by(&["author_id"]);
        let (sql, _) = pager.count_sql(&query, Driver::MySql.dialect()).unwrap();
        assert_eq!(
            sql,
            "SELECT COUNT(*) AS `aggregate` FROM (SELECT `author_id` FROM `posts` \
             GROUP BY `author_id`) AS `aggregate_table`"
        );
    }

    #[test]
    fn test_page_metadata() {
        let pager = OffsetPaginator::new(2, 10).unwrap();
        let page = pager.page_of(Vec::new(), 25);
        assert_eq!(page.last_page, 3);
        assert!(page.has_more);

        let page = OffsetPaginator::new(1, 10).unwrap().page_of(Vec::new(), 0);
        assert_eq!(page.last_page, 1);
        assert!(!page.has_more);
    }
}
