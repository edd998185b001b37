//! # Admin CRUD Surface
//!
//! Uniform list/get/create/update/delete over every entity, for back-office
//! screens.
//!
//! ## Listing
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ListParams { search: "tee", status: "active", limit: 20, offset: 40 }  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SELECT <columns> FROM products                                         │
//! │  WHERE 1 = 1                                                            │
//! │    AND (name LIKE '%tee%' OR slug LIKE '%tee%')    ← search             │
//! │    AND status = 'active'                           ← status             │
//! │  ORDER BY name LIMIT 20 OFFSET 40                                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Page { items, total: COUNT(*) with same WHERE, limit, offset }         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

use shopkit_core::validation::validate_search_query;
use shopkit_core::ValidationError;

use crate::error::DbResult;

/// Default page size.
pub const DEFAULT_PAGE_SIZE: i64 = 50;

/// Largest page a caller may request.
pub const MAX_PAGE_SIZE: i64 = 500;

// =============================================================================
// AdminResource
// =============================================================================

/// CRUD over one entity type.
///
/// Implemented by every repository. `get` returns `None` for unknown ids;
/// `update` and `delete` fail with `NotFound`.
///
/// ```rust,ignore
/// use shopkit_db::admin::{AdminResource, ListParams};
///
/// let page = db.products().list(&ListParams::new().search("tee")).await?;
/// for product in page.items { println!("{}", product.name); }
/// ```
#[allow(async_fn_in_trait)]
pub trait AdminResource {
    type Record;

    /// Entity name used in errors and logs.
    const ENTITY: &'static str;

    async fn list(&self, params: &ListParams) -> DbResult<Page<Self::Record>>;

    async fn get(&self, id: &str) -> DbResult<Option<Self::Record>>;

    /// Validates and inserts `record`, returning it as stored.
    async fn create(&self, record: &Self::Record) -> DbResult<Self::Record>;

    /// Validates and overwrites the stored record with the same id.
    async fn update(&self, record: &Self::Record) -> DbResult<Self::Record>;

    async fn delete(&self, id: &str) -> DbResult<()>;
}

// =============================================================================
// List Parameters
// =============================================================================

/// Search, filters and paging for [`AdminResource::list`].
///
/// Filters an entity doesn't have are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListParams {
    /// Substring matched against names, SKUs and codes.
    pub search: Option<String>,
    /// Stored status value, e.g. `active` or `pending`.
    pub status: Option<String>,
    pub sku: Option<String>,
    pub category_id: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for ListParams {
    fn default() -> Self {
        ListParams {
            search: None,
            status: None,
            sku: None,
            category_id: None,
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

impl ListParams {
    pub fn new() -> Self {
        ListParams::default()
    }

    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn status(mut self, status: impl ToString) -> Self {
        self.status = Some(status.to_string());
        self
    }

    pub fn sku(mut self, sku: impl Into<String>) -> Self {
        self.sku = Some(sku.into());
        self
    }

    pub fn category_id(mut self, category_id: impl Into<String>) -> Self {
        self.category_id = Some(category_id.into());
        self
    }

    pub fn page(mut self, limit: i64, offset: i64) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(search) = &self.search {
            validate_search_query(search)?;
        }
        if !(1..=MAX_PAGE_SIZE).contains(&self.limit) {
            return Err(ValidationError::OutOfRange {
                field: "limit".to_string(),
                min: 1,
                max: MAX_PAGE_SIZE,
            });
        }
        if self.offset < 0 {
            return Err(ValidationError::OutOfRange {
                field: "offset".to_string(),
                min: 0,
                max: i64::MAX,
            });
        }
        Ok(())
    }

    fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Matching rows across all pages.
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

impl<T> Page<T> {
    pub fn has_more(&self) -> bool {
        self.offset + (self.items.len() as i64) < self.total
    }

    /// Converts every item, keeping the paging info.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            limit: self.limit,
            offset: self.offset,
        }
    }

    /// Fallible [`map`](Self::map).
    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<Page<U>, E> {
        Ok(Page {
            items: self.items.into_iter().map(f).collect::<Result<_, _>>()?,
            total: self.total,
            limit: self.limit,
            offset: self.offset,
        })
    }
}

// =============================================================================
// Query Building
// =============================================================================

/// A filter condition: `open` + bound value + `close`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Clause {
    pub open: &'static str,
    pub close: &'static str,
}

impl Clause {
    /// `<column> = ?`
    pub const fn eq(open: &'static str) -> Self {
        Clause { open, close: "" }
    }
}

/// How one table is listed.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ListSpec {
    pub table: &'static str,
    pub columns: &'static str,
    /// Columns matched by `LIKE` for `search`.
    pub search: &'static [&'static str],
    pub status: Option<Clause>,
    pub sku: Option<Clause>,
    pub category: Option<Clause>,
    pub order_by: &'static str,
}

/// Escapes `LIKE` wildcards so user input matches literally.
pub(crate) fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, spec: &ListSpec, params: &ListParams) {
    qb.push(" WHERE 1 = 1");

    if let Some(term) = params.search_term() {
        if !spec.search.is_empty() {
            let pattern = like_pattern(term);
            qb.push(" AND (");
            for (i, column) in spec.search.iter().enumerate() {
                if i > 0 {
                    qb.push(" OR ");
                }
                qb.push(*column)
                    .push(" LIKE ")
                    .push_bind(pattern.clone())
                    .push(" ESCAPE '\\'");
            }
            qb.push(")");
        }
    }

    let filters = [
        (spec.status, &params.status),
        (spec.sku, &params.sku),
        (spec.category, &params.category_id),
    ];
    for (clause, value) in filters {
        if let (Some(clause), Some(value)) = (clause, value) {
            qb.push(" AND ")
                .push(clause.open)
                .push_bind(value.clone())
                .push(clause.close);
        }
    }
}

/// Runs the count and page queries for `spec`.
pub(crate) async fn fetch_page<T>(
    pool: &SqlitePool,
    spec: &ListSpec,
    params: &ListParams,
) -> DbResult<Page<T>>
where
    T: for<'r> sqlx::FromRow<'r, SqliteRow> + Send + Unpin,
{
    params.validate()?;

    debug!(table = spec.table, search = ?params.search, limit = params.limit, offset = params.offset, "Listing records");

    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM ");
    count.push(spec.table);
    push_filters(&mut count, spec, params);
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    let mut select = QueryBuilder::<Sqlite>::new("SELECT ");
    select.push(spec.columns).push(" FROM ").push(spec.table);
    push_filters(&mut select, spec, params);
    select
        .push(" ORDER BY ")
        .push(spec.order_by)
        .push(" LIMIT ")
        .push_bind(params.limit)
        .push(" OFFSET ")
        .push_bind(params.offset);
    let items: Vec<T> = select.build_query_as().fetch_all(pool).await?;

    Ok(Page {
        items,
        total,
        limit: params.limit,
        offset: params.offset,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
