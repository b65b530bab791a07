//! Per-model query façade: `storage.objects::<Content>().search("moon", None).published()`.

use std::marker::PhantomData;

use anyhow::{Context, Result};
use rusqlite::Connection;
use rusqlite::types::Value;
use rusqlite::params_from_iter;

use super::index::{Indexable, filter_clause};
use super::query::{ParsedQuery, QueryError, page_bounds};
use crate::model::types::{Book, BookSection, Content, ContentStatus, Document, Viewer};

/// Lazy, chainable query over one owner table.
///
/// Builders only accumulate SQL; `count`, `fetch` and friends run it, and can
/// be called any number of times.
pub struct QuerySet<'a, M: Indexable> {
    conn: &'a Connection,
    clauses: Vec<String>,
    params: Vec<Value>,
    random: bool,
    limit: Option<usize>,
    offset: usize,
    _model: PhantomData<M>,
}

impl<M: Indexable> Clone for QuerySet<'_, M> {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn,
            clauses: self.clauses.clone(),
            params: self.params.clone(),
            random: self.random,
            limit: self.limit,
            offset: self.offset,
            _model: PhantomData,
        }
    }
}

impl<'a, M: Indexable> QuerySet<'a, M> {
    pub fn new(conn: &'a Connection) -> Self {
        Self {
            conn,
            clauses: Vec::new(),
            params: Vec::new(),
            random: false,
            limit: None,
            offset: 0,
            _model: PhantomData,
        }
    }

    /// Restricts to owners of this type whose index row matches `text`
    /// (and `public`, when given). Blank text keeps every indexed owner.
    pub fn search(self, text: &str, public: Option<bool>) -> Self {
        let query = ParsedQuery::parse(text);
        let owner_type = M::OWNER_TYPE;
        tracing::debug!(
            owner_type = %owner_type,
            public = ?public,
            terms = query.terms.len(),
            "queryset_search"
        );
        let (clause, params) = filter_clause(Some(owner_type), public, &query);
        self.filter(
            &format!("o.id IN (SELECT si.owner_id FROM search_index si WHERE {clause})"),
            params,
        )
    }

    /// Live visibility predicate, independent of the cached index flag.
    pub fn published(self) -> Self {
        self.filter(&format!("({})", M::PUBLISHED), Vec::new())
    }

    pub fn visible_to(self, viewer: Viewer) -> Self {
        if viewer.is_staff() {
            self
        } else {
            self.published()
        }
    }

    pub fn tagged(self, slug: &str) -> Self {
        self.filter(
            "o.id IN (SELECT ti.owner_id FROM tagged_items ti JOIN tags t ON t.id = ti.tag_id \
             WHERE ti.owner_type = ? AND t.slug = ?)",
            vec![
                Value::Text(M::OWNER_TYPE.as_str().into()),
                Value::Text(slug.into()),
            ],
        )
    }

    /// Adds a raw predicate over the owner table (alias `o`).
    pub fn filter(mut self, clause: &str, mut params: Vec<Value>) -> Self {
        self.clauses.push(clause.to_string());
        self.params.append(&mut params);
        self
    }

    pub fn order_by_random(mut self) -> Self {
        self.random = true;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// One 1-based page of `page_size` rows.
    pub fn page(self, page: usize, page_size: usize) -> Result<Self, QueryError> {
        let (limit, offset) = page_bounds(page, page_size)?;
        Ok(self.limit(limit).offset(offset))
    }

    fn select_sql(&self, columns: &str) -> String {
        let clause = if self.clauses.is_empty() {
            "1".to_string()
        } else {
            self.clauses.join(" AND ")
        };
        let order = if self.random {
            "RANDOM()"
        } else {
            M::DEFAULT_ORDER
        };
        let limit = self.limit.map(|l| l as i64).unwrap_or(-1);
        format!(
            "SELECT {columns} FROM {} o WHERE {clause} ORDER BY {order} LIMIT {limit} OFFSET {}",
            M::TABLE,
            self.offset
        )
    }

    pub fn count(&self) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM ({})", self.select_sql("o.id"));
        let n: i64 = self
            .conn
            .query_row(&sql, params_from_iter(self.params.iter()), |row| row.get(0))
            .with_context(|| format!("counting {}", M::TABLE))?;
        Ok(n as usize)
    }

    pub fn fetch(&self) -> Result<Vec<M>> {
        let sql = self.select_sql(M::COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(self.params.iter()), M::from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.with_context(|| format!("reading {} row", M::TABLE))?);
        }
        Ok(out)
    }

    pub fn first(&self) -> Result<Option<M>> {
        Ok(self.clone().limit(1).fetch()?.into_iter().next())
    }

    pub fn ids(&self) -> Result<Vec<i64>> {
        let sql = self.select_sql("o.id");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(self.params.iter()), |row| row.get(0))?;
        let mut out = Vec::new();
        for id in rows {
            out.push(id?);
        }
        Ok(out)
    }

    pub fn exists(&self) -> Result<bool> {
        Ok(self.clone().limit(1).count()? > 0)
    }

    /// Membership test by primary key; unsaved owners are never members.
    pub fn contains(&self, owner: &M) -> Result<bool> {
        match owner.id() {
            Some(id) => Ok(self.ids()?.contains(&id)),
            None => Ok(false),
        }
    }
}

impl QuerySet<'_, Content> {
    pub fn with_status(self, status: ContentStatus) -> Self {
        self.filter(
            "o.status = ?",
            vec![Value::Text(status.as_str().into())],
        )
    }
}

impl QuerySet<'_, Book> {
    /// Books with at least one specimen on the shelves.
    pub fn available(self) -> Self {
        self.published()
    }

    pub fn in_section(self, section: BookSection) -> Self {
        self.filter("o.section = ?", vec![Value::Integer(section.code())])
    }
}

impl QuerySet<'_, Document> {
    pub fn with_kind(self, kind: &str) -> Self {
        self.filter("o.kind = ?", vec![Value::Text(kind.into())])
    }
}
