//! The shared search index: one `search_index` row per indexable owner.
//!
//! Rows are a derived projection of their owner. Storage calls [`sync_owner`]
//! after every owner write and [`remove_owner`] after every hard delete, inside
//! the same transaction, so a failed sync rolls the owner change back too.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use serde::{Deserialize, Serialize};

use super::canonicalize::index_text;
use super::query::ParsedQuery;

/// Type discriminator of an indexed owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerType {
    Content,
    Book,
    Document,
}

impl OwnerType {
    pub const ALL: [OwnerType; 3] = [Self::Content, Self::Book, Self::Document];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Book => "book",
            Self::Document => "document",
        }
    }
}

impl fmt::Display for OwnerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OwnerType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "content" => Ok(Self::Content),
            "book" => Ok(Self::Book),
            "document" => Ok(Self::Document),
            other => Err(anyhow!("unknown owner type {other}")),
        }
    }
}

/// Polymorphic reference to exactly one owner row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnerRef {
    #[serde(rename = "type")]
    pub owner_type: OwnerType,
    pub id: i64,
}

impl OwnerRef {
    pub fn new(owner_type: OwnerType, id: i64) -> Self {
        Self { owner_type, id }
    }
}

impl fmt::Display for OwnerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.owner_type, self.id)
    }
}

/// A stored index row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedText {
    pub id: i64,
    pub owner: OwnerRef,
    pub text: String,
    pub public: bool,
}

/// Row counts of the index, for the `stats` command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub total: usize,
    pub public: usize,
    pub by_type: BTreeMap<OwnerType, usize>,
}

/// Contract every owner model implements to take part in search.
///
/// SQL fragments refer to the owner table through the alias `o`.
pub trait Indexable: Sized {
    const OWNER_TYPE: OwnerType;
    const TABLE: &'static str;
    /// Select list read back by [`Indexable::from_row`].
    const COLUMNS: &'static str;
    /// Live visibility predicate. The `public` flag stored at sync time is
    /// this predicate evaluated against the freshly written row.
    const PUBLISHED: &'static str;
    const DEFAULT_ORDER: &'static str;

    fn id(&self) -> Option<i64>;

    /// Ordered, nullable text fields concatenated into the index.
    fn index_strings(&self) -> Vec<Option<&str>>;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;

    fn owner_ref(&self) -> Option<OwnerRef> {
        self.id().map(|id| OwnerRef::new(Self::OWNER_TYPE, id))
    }

    /// Evaluates [`Indexable::PUBLISHED`] for the stored row with this id.
    fn is_public(conn: &Connection, id: i64) -> Result<bool> {
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} o WHERE o.id = ? AND ({}))",
            Self::TABLE,
            Self::PUBLISHED
        );
        conn.query_row(&sql, params![id], |row| row.get(0))
            .with_context(|| format!("evaluating visibility of {}:{id}", Self::OWNER_TYPE))
    }
}

/// Recomputes and upserts the index row of a saved owner.
///
/// Runs unconditionally on every save, even when no indexed field changed.
pub fn sync_owner<M: Indexable>(conn: &Connection, owner: &M) -> Result<IndexedText> {
    let owner_ref = owner
        .owner_ref()
        .ok_or_else(|| anyhow!("cannot index an unsaved {}", M::OWNER_TYPE))?;
    let text = index_text(owner.index_strings());
    let public = M::is_public(conn, owner_ref.id)?;

    conn.execute(
        "INSERT INTO search_index(owner_type, owner_id, text, public) VALUES(?,?,?,?)
         ON CONFLICT(owner_type, owner_id) DO UPDATE SET text=excluded.text, public=excluded.public",
        params![owner_ref.owner_type.as_str(), owner_ref.id, &text, public],
    )
    .with_context(|| format!("upserting index row for {owner_ref}"))?;

    let id = conn.query_row(
        "SELECT id FROM search_index WHERE owner_type = ? AND owner_id = ?",
        params![owner_ref.owner_type.as_str(), owner_ref.id],
        |row| row.get(0),
    )?;

    tracing::debug!(owner = %owner_ref, public, chars = text.len(), "index_sync");
    Ok(IndexedText {
        id,
        owner: owner_ref,
        text,
        public,
    })
}

/// Removes the index row of a hard-deleted owner. A missing row is not an error.
pub fn remove_owner(conn: &Connection, owner: OwnerRef) -> Result<bool> {
    let removed = conn
        .execute(
            "DELETE FROM search_index WHERE owner_type = ? AND owner_id = ?",
            params![owner.owner_type.as_str(), owner.id],
        )
        .with_context(|| format!("removing index row for {owner}"))?;
    tracing::debug!(owner = %owner, removed, "index_remove");
    Ok(removed > 0)
}

/// WHERE clause over `search_index` aliased `si`, shared by [`SearchResults`]
/// and the per-model query sets.
pub(crate) fn filter_clause(
    owner_type: Option<OwnerType>,
    public: Option<bool>,
    query: &ParsedQuery,
) -> (String, Vec<Value>) {
    let mut clauses = vec!["1".to_string()];
    let mut params = Vec::new();
    if let Some(t) = owner_type {
        clauses.push("si.owner_type = ?".into());
        params.push(Value::Text(t.as_str().into()));
    }
    if let Some(p) = public {
        clauses.push("si.public = ?".into());
        params.push(Value::Integer(p as i64));
    }
    if let Some((sql, mut term_params)) = query.to_sql("si.text") {
        clauses.push(sql);
        params.append(&mut term_params);
    }
    (clauses.join(" AND "), params)
}

/// Entry point over the whole index, across owner types.
///
/// Unscoped queries see drafts and soft-deleted owners; callers acting for
/// anonymous users pass `public = Some(true)`.
pub struct Search<'a> {
    conn: &'a Connection,
}

impl<'a> Search<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Total number of index rows.
    pub fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM search_index", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    pub fn stats(&self) -> Result<IndexStats> {
        let mut stats = IndexStats::default();
        let mut stmt = self.conn.prepare(
            "SELECT owner_type, COUNT(*), SUM(public) FROM search_index GROUP BY owner_type",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, Option<i64>>(2)?,
            ))
        })?;
        for row in rows {
            let (owner_type, total, public) = row?;
            let owner_type: OwnerType = owner_type.parse()?;
            stats.total += total as usize;
            stats.public += public.unwrap_or(0) as usize;
            stats.by_type.insert(owner_type, total as usize);
        }
        Ok(stats)
    }

    pub fn get(&self, owner: OwnerRef) -> Result<Option<IndexedText>> {
        self.conn
            .query_row(
                "SELECT id, owner_type, owner_id, text, public FROM search_index
                 WHERE owner_type = ? AND owner_id = ?",
                params![owner.owner_type.as_str(), owner.id],
                read_row,
            )
            .optional()
            .with_context(|| format!("loading index row for {owner}"))?
            .transpose()
    }

    /// Lazy result set. Nothing runs until a terminal method is called.
    pub fn search(&self, public: Option<bool>, text: Option<&str>) -> SearchResults<'a> {
        SearchResults {
            conn: self.conn,
            owner_type: None,
            public,
            query: text.map(ParsedQuery::parse).unwrap_or_default(),
            limit: None,
            offset: 0,
        }
    }
}

/// Restartable view over matching index rows: every terminal call re-queries.
#[derive(Clone)]
pub struct SearchResults<'a> {
    conn: &'a Connection,
    owner_type: Option<OwnerType>,
    public: Option<bool>,
    query: ParsedQuery,
    limit: Option<usize>,
    offset: usize,
}

impl<'a> SearchResults<'a> {
    pub fn owner_type(mut self, owner_type: OwnerType) -> Self {
        self.owner_type = Some(owner_type);
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

    fn select_sql(&self, columns: &str, clause: &str) -> String {
        let limit = self.limit.map(|l| l as i64).unwrap_or(-1);
        format!(
            "SELECT {columns} FROM search_index si WHERE {clause}
             ORDER BY si.owner_type, si.owner_id LIMIT {limit} OFFSET {}",
            self.offset
        )
    }

    /// Rows `fetch` would return, honoring `limit` and `offset`.
    pub fn count(&self) -> Result<usize> {
        let (clause, params) = filter_clause(self.owner_type, self.public, &self.query);
        let sql = format!("SELECT COUNT(*) FROM ({})", self.select_sql("si.id", &clause));
        let n: i64 = self
            .conn
            .query_row(&sql, params_from_iter(params), |row| row.get(0))?;
        Ok(n as usize)
    }

    pub fn fetch(&self) -> Result<Vec<IndexedText>> {
        tracing::info!(
            public = ?self.public,
            owner_type = ?self.owner_type,
            terms = self.query.terms.len(),
            "search_start"
        );
        let (clause, params) = filter_clause(self.owner_type, self.public, &self.query);
        let sql = self.select_sql(
            "si.id, si.owner_type, si.owner_id, si.text, si.public",
            &clause,
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params), read_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row??);
        }
        tracing::debug!(hits = out.len(), "search_done");
        Ok(out)
    }
}

impl<'a> IntoIterator for &SearchResults<'a> {
    type Item = Result<IndexedText>;
    type IntoIter = std::vec::IntoIter<Result<IndexedText>>;

    /// Runs the query; a failure surfaces as the single item.
    fn into_iter(self) -> Self::IntoIter {
        match self.fetch() {
            Ok(rows) => rows.into_iter().map(Ok).collect::<Vec<_>>().into_iter(),
            Err(err) => vec![Err(err)].into_iter(),
        }
    }
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<Result<IndexedText>> {
    let owner_type: String = row.get(1)?;
    let id: i64 = row.get(0)?;
    let owner_id: i64 = row.get(2)?;
    let text: String = row.get(3)?;
    let public: bool = row.get(4)?;
    Ok(owner_type.parse::<OwnerType>().map(|t| IndexedText {
        id,
        owner: OwnerRef::new(t, owner_id),
        text,
        public,
    }))
}
