//! Keyset (cursor) pagination.

use super::token::CursorCodec;
use crate::error::PaginationError;
use crate::ident;
use crate::query::{Direction, QueryBuilder};
use crate::value::Row;

/// Pages through a query ordered by one monotonic column.
///
/// Each page fetches `per_page + 1` rows; the extra row only signals that
/// another page exists and is dropped before the page is returned.
#[derive(Debug, Clone)]
pub struct CursorPaginator {
    column: String,
    direction: Direction,
    per_page: u64,
    codec: CursorCodec,
}

impl CursorPaginator {
    /// Paginator over `id` ascending with an unkeyed token digest.
    pub fn new(per_page: u64) -> Result<Self, PaginationError> {
        if per_page == 0 {
            return Err(PaginationError::InvalidPage(
                "per_page must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            column: "id".to_string(),
            direction: Direction::Asc,
            per_page,
            codec: CursorCodec::unkeyed(),
        })
    }

    /// Sort column. Must be unique and monotonic for pages to stay disjoint.
    #[must_use]
    pub fn column(mut self, column: &str) -> Self {
        self.column = column.to_string();
        self
    }

    /// Sort direction.
    #[must_use]
    pub const fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Keys token digests with `secret`.
    #[must_use]
    pub fn secret(mut self, secret: impl AsRef<[u8]>) -> Self {
        self.codec = CursorCodec::new(secret);
        self
    }

    /// Page size.
    #[must_use]
    pub const fn per_page(&self) -> u64 {
        self.per_page
    }

    /// Restricts `builder` to the page after `token` (the first page when
    /// `None`).
    pub fn apply(
        &self,
        builder: QueryBuilder,
        token: Option<&str>,
    ) -> Result<QueryBuilder, PaginationError> {
        let after = token
            .map(|t| self.codec.decode(t, &self.column, self.direction))
            .transpose()?;
        let query = builder
            .cursor(&self.column, self.direction, after)
            .limit(self.per_page.saturating_add(1));
        if let Some(error) = query.error() {
            return Err(error.clone().into());
        }
        Ok(query)
    }

    /// Shapes the rows fetched with [`CursorPaginator::apply`] into a page.
    pub fn page_of(&self, mut rows: Vec<Row>) -> Result<CursorPage, PaginationError> {
        let per_page = usize::try_from(self.per_page).unwrap_or(usize::MAX);
        let has_more = rows.len() > per_page;
        rows.truncate(per_page);

        let next_cursor = match rows.last() {
            Some(last) if has_more => {
                let value = last
                    .get(&self.column)
                    .or_else(|| last.get(ident::unqualified(&self.column)))
                    .ok_or_else(|| PaginationError::MissingCursorColumn(self.column.clone()))?;
                Some(self.codec.encode(&self.column, self.direction, value)?)
            }
            _ => None,
        };

        Ok(CursorPage {
            items: rows,
            per_page: self.per_page,
            has_more,
            next_cursor,
        })
    }
}

/// One page of a cursor-paginated query.
#[derive(Debug, Clone, PartialEq)]
pub struct CursorPage {
    /// Rows on this page.
    pub items: Vec<Row>,
    /// Page size.
    pub per_page: u64,
    /// Whether another page follows.
    pub has_more: bool,
    /// Token for the next page, present when `has_more`.
    pub next_cursor: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Driver;
    use crate::value::{row, SqlValue};

    fn rows(ids: &[i64]) -> Vec<Row> {
        ids.iter().map(|id| row([("id", *id)])).collect()
    }

    #[test]
    fn test_first_page_fetches_one_extra() {
        let pager = CursorPaginator::new(2).unwrap();
        let (sql, params) = pager
            .apply(QueryBuilder::table("posts"), None)
            .unwrap()
            .to_sql(Driver::Sqlite.dialect())
            .unwrap();
        assert_eq!(sql, "SELECT * FROM \"posts\" ORDER BY \"id\" ASC LIMIT 3");
        assert!(params.is_empty());
    }

    #[test]
    fn test_next_page_continues_after_token() {
        let pager = CursorPaginator::new(2)
            .unwrap()
            .direction(Direction::Desc)
            .secret("k");
        let page = pager.page_of(rows(&[9, 8, 7])).unwrap();
        assert_eq!(page.items.len(), 2);
        assert!(page.has_more);

        let token = page.next_cursor.unwrap();
        let (sql, params) = pager
            .apply(QueryBuilder::table("posts").where_("draft", false), Some(&token))
            .unwrap()
            .to_sql(Driver::Postgres.dialect())
            .unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM \"posts\" WHERE (\"draft\" = $1) AND \"id\" < $2 \
             ORDER BY \"id\" DESC LIMIT 3"
        );
        assert_eq!(params[1], SqlValue::Int(8));
    }

    #[test]
    fn test_last_page_has_no_cursor() {
        let pager = CursorPaginator::new(5).unwrap();
        let page = pager.page_of(rows(&[1, 2])).unwrap();
        assert!(!page.has_more);
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn test_missing_sort_column() {
        let pager = CursorPaginator::new(1).unwrap().column("created_at");
        assert!(matches!(
            pager.page_of(rows(&[1, 2])),
            Err(PaginationError::MissingCursorColumn(_))
        ));
    }

    #[test]
    fn test_tampered_token_rejected() {
        let pager = CursorPaginator::new(1).unwrap().secret("k");
        assert!(matches!(
            pager.apply(QueryBuilder::table("posts"), Some("eyJjIjoiaWQifQ.AAAA")),
            Err(PaginationError::InvalidCursor(_))
        ));
    }
}
