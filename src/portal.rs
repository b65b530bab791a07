//! Reading side shared by the kiosk pages: owner resolution, the home digest
//! and tag listings.

use anyhow::Result;
use rusqlite::params;
use serde::Serialize;

use crate::model::types::{Book, Content, Document};
use crate::search::index::{IndexedText, OwnerRef, OwnerType};
use crate::storage::sqlite::SqliteStorage;

/// A resolved owner of any indexable type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Owner {
    Content(Content),
    Book(Book),
    Document(Document),
}

impl Owner {
    pub fn title(&self) -> &str {
        match self {
            Self::Content(c) => &c.title,
            Self::Book(b) => &b.title,
            Self::Document(d) => &d.title,
        }
    }

    pub fn summary(&self) -> Option<&str> {
        match self {
            Self::Content(c) => c.summary.as_deref(),
            Self::Book(b) => b.summary.as_deref(),
            Self::Document(d) => d.summary.as_deref(),
        }
    }

    pub fn owner_type(&self) -> OwnerType {
        match self {
            Self::Content(_) => OwnerType::Content,
            Self::Book(_) => OwnerType::Book,
            Self::Document(_) => OwnerType::Document,
        }
    }
}

impl SqliteStorage {
    /// Loads the owner an index row points at. `None` if it no longer exists.
    pub fn resolve(&self, owner: OwnerRef) -> Result<Option<Owner>> {
        Ok(match owner.owner_type {
            OwnerType::Content => self.get::<Content>(owner.id)?.map(Owner::Content),
            OwnerType::Book => self.get::<Book>(owner.id)?.map(Owner::Book),
            OwnerType::Document => self.get::<Document>(owner.id)?.map(Owner::Document),
        })
    }
}

/// One renderable search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub owner: OwnerRef,
    pub title: String,
    pub summary: Option<String>,
    pub public: bool,
}

/// Resolves index rows to hits, skipping rows whose owner vanished.
pub fn resolve_hits(storage: &SqliteStorage, rows: &[IndexedText]) -> Result<Vec<SearchHit>> {
    let mut hits = Vec::with_capacity(rows.len());
    for row in rows {
        match storage.resolve(row.owner)? {
            Some(owner) => hits.push(SearchHit {
                owner: row.owner,
                title: owner.title().to_string(),
                summary: owner.summary().map(str::to_owned),
                public: row.public,
            }),
            None => tracing::warn!(owner = %row.owner, "index row without owner"),
        }
    }
    Ok(hits)
}

/// What the kiosk home page shows.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HomeDigest {
    pub latest_contents: Vec<Content>,
    pub random_book: Option<Book>,
    pub random_document: Option<Document>,
}

pub const HOME_CONTENT_COUNT: usize = 3;

pub fn home_digest(storage: &SqliteStorage) -> Result<HomeDigest> {
    Ok(HomeDigest {
        latest_contents: storage
            .objects::<Content>()
            .published()
            .limit(HOME_CONTENT_COUNT)
            .fetch()?,
        random_book: storage
            .objects::<Book>()
            .available()
            .order_by_random()
            .first()?,
        random_document: storage.objects::<Document>().order_by_random().first()?,
    })
}

/// Every owner carrying the tag, across types.
pub fn by_tag(storage: &SqliteStorage, slug: &str) -> Result<Vec<OwnerRef>> {
    let mut stmt = storage.raw().prepare(
        "SELECT ti.owner_type, ti.owner_id FROM tagged_items ti JOIN tags t ON t.id = ti.tag_id
         WHERE t.slug = ? ORDER BY ti.owner_type, ti.owner_id",
    )?;
    let rows = stmt.query_map(params![slug], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (owner_type, id) = row?;
        out.push(OwnerRef::new(owner_type.parse()?, id));
    }
    Ok(out)
}
