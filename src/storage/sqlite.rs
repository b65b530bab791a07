//! SQLite backend: schema, pragmas, migrations, and owner writes.
//!
//! Every save and hard delete runs in one transaction together with the
//! search index update it implies.

use crate::model::types::{Book, BookSpecimen, Content, ContentStatus, Document};
use crate::search::canonicalize::slugify;
use crate::search::index::{
    IndexedText, Indexable, OwnerRef, OwnerType, Search, remove_owner, sync_owner,
};
use crate::search::queryset::QuerySet;
use anyhow::{Context, Result, anyhow};
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

const SCHEMA_VERSION: i64 = 1;

const MIGRATION_V1: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS contents (
    id INTEGER PRIMARY KEY,
    title TEXT NOT NULL,
    author TEXT,
    summary TEXT,
    text TEXT,
    status TEXT NOT NULL DEFAULT 'draft',
    published_at INTEGER,
    created_at INTEGER NOT NULL,
    modified_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS books (
    id INTEGER PRIMARY KEY,
    isbn TEXT UNIQUE,
    authors TEXT,
    serie TEXT,
    title TEXT NOT NULL,
    subtitle TEXT,
    summary TEXT,
    publisher TEXT,
    section INTEGER NOT NULL,
    location TEXT,
    lang TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    modified_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS book_specimens (
    id INTEGER PRIMARY KEY,
    book_id INTEGER NOT NULL REFERENCES books(id) ON DELETE CASCADE,
    serial TEXT NOT NULL UNIQUE,
    remarks TEXT,
    created_at INTEGER NOT NULL,
    modified_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY,
    title TEXT NOT NULL,
    summary TEXT,
    lang TEXT NOT NULL,
    kind TEXT,
    credits TEXT,
    original TEXT,
    created_at INTEGER NOT NULL,
    modified_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    slug TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS tagged_items (
    tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
    owner_type TEXT NOT NULL,
    owner_id INTEGER NOT NULL,
    PRIMARY KEY (tag_id, owner_type, owner_id)
);

CREATE TABLE IF NOT EXISTS search_index (
    id INTEGER PRIMARY KEY,
    owner_type TEXT NOT NULL,
    owner_id INTEGER NOT NULL,
    text TEXT NOT NULL,
    public INTEGER NOT NULL,
    UNIQUE(owner_type, owner_id)
);

CREATE INDEX IF NOT EXISTS idx_contents_status_published
    ON contents(status, published_at DESC);

CREATE INDEX IF NOT EXISTS idx_specimens_book
    ON book_specimens(book_id);

CREATE INDEX IF NOT EXISTS idx_tagged_items_owner
    ON tagged_items(owner_type, owner_id);

CREATE INDEX IF NOT EXISTS idx_search_index_public
    ON search_index(public, owner_type);
"#;

/// Rows rebuilt and dropped by [`SqliteStorage::reindex_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReindexReport {
    pub contents: usize,
    pub books: usize,
    pub documents: usize,
    pub orphans_removed: usize,
}

pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating db directory {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("opening sqlite db at {}", path.display()))?;
        Self::init(conn, true)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("opening in-memory sqlite db")?;
        Self::init(conn, false)
    }

    fn init(mut conn: Connection, on_disk: bool) -> Result<Self> {
        apply_pragmas(&mut conn, on_disk)?;
        init_meta(&mut conn)?;
        migrate(&mut conn)?;
        Ok(Self { conn })
    }

    pub fn raw(&self) -> &Connection {
        &self.conn
    }

    /// Cross-type index queries.
    pub fn search(&self) -> Search<'_> {
        Search::new(&self.conn)
    }

    pub fn objects<M: Indexable>(&self) -> QuerySet<'_, M> {
        QuerySet::new(&self.conn)
    }

    pub fn get<M: Indexable>(&self, id: i64) -> Result<Option<M>> {
        load::<M>(&self.conn, id)
    }

    pub fn save_content(&mut self, content: &mut Content) -> Result<IndexedText> {
        let now = now_millis();
        let mut saved = content.clone();
        if saved.status == ContentStatus::Published && saved.published_at.is_none() {
            saved.published_at = Some(now);
        }

        let tx = self.conn.transaction()?;
        let id = write_content(&tx, &saved, now)?;
        saved.id = Some(id);
        stamp(&tx, Content::TABLE, id, &mut saved.created_at, &mut saved.modified_at)?;
        replace_tags(&tx, OwnerRef::new(OwnerType::Content, id), &saved.tags)?;
        let row = sync_owner(&tx, &saved)?;
        tx.commit()?;

        *content = saved;
        Ok(row)
    }

    pub fn save_book(&mut self, book: &mut Book) -> Result<IndexedText> {
        let now = now_millis();
        let mut saved = book.clone();
        saved.isbn = saved.isbn.filter(|isbn| !isbn.trim().is_empty());

        let tx = self.conn.transaction()?;
        let id = write_book(&tx, &saved, now)?;
        saved.id = Some(id);
        stamp(&tx, Book::TABLE, id, &mut saved.created_at, &mut saved.modified_at)?;
        let row = sync_owner(&tx, &saved)?;
        tx.commit()?;

        *book = saved;
        Ok(row)
    }

    /// Adding a copy can make its book available, so the book is resynced too.
    pub fn save_specimen(&mut self, specimen: &mut BookSpecimen) -> Result<IndexedText> {
        let now = now_millis();
        let mut saved = specimen.clone();

        let tx = self.conn.transaction()?;
        let previous_book = specimen_book(&tx, saved.id)?;
        let id = write_specimen(&tx, &saved, now)?;
        saved.id = Some(id);
        stamp(
            &tx,
            "book_specimens",
            id,
            &mut saved.created_at,
            &mut saved.modified_at,
        )?;
        // A specimen moved to another book leaves the old one possibly unavailable.
        if let Some(old) = previous_book.filter(|old| *old != saved.book_id) {
            resync::<Book>(&tx, old)?;
        }
        let row = resync::<Book>(&tx, saved.book_id)?
            .ok_or_else(|| anyhow!("specimen {} points to missing book {}", id, saved.book_id))?;
        tx.commit()?;

        *specimen = saved;
        Ok(row)
    }

    pub fn save_document(&mut self, document: &mut Document) -> Result<IndexedText> {
        let now = now_millis();
        let mut saved = document.clone();

        let tx = self.conn.transaction()?;
        let id = write_document(&tx, &saved, now)?;
        saved.id = Some(id);
        stamp(&tx, Document::TABLE, id, &mut saved.created_at, &mut saved.modified_at)?;
        replace_tags(&tx, OwnerRef::new(OwnerType::Document, id), &saved.tags)?;
        let row = sync_owner(&tx, &saved)?;
        tx.commit()?;

        *document = saved;
        Ok(row)
    }

    pub fn delete_content(&mut self, id: i64) -> Result<bool> {
        self.delete_owner::<Content>(id)
    }

    /// Specimens go with their book.
    pub fn delete_book(&mut self, id: i64) -> Result<bool> {
        self.delete_owner::<Book>(id)
    }

    pub fn delete_document(&mut self, id: i64) -> Result<bool> {
        self.delete_owner::<Document>(id)
    }

    pub fn delete_specimen(&mut self, id: i64) -> Result<bool> {
        let tx = self.conn.transaction()?;
        let Some(book_id) = specimen_book(&tx, Some(id))? else {
            return Ok(false);
        };
        tx.execute("DELETE FROM book_specimens WHERE id = ?", params![id])?;
        resync::<Book>(&tx, book_id)?;
        tx.commit()?;
        Ok(true)
    }

    /// Hard delete. Returns whether the owner existed; the index row is
    /// removed either way.
    fn delete_owner<M: Indexable>(&mut self, id: i64) -> Result<bool> {
        let owner = OwnerRef::new(M::OWNER_TYPE, id);
        let tx = self.conn.transaction()?;
        let deleted = tx
            .execute(&format!("DELETE FROM {} WHERE id = ?", M::TABLE), params![id])
            .with_context(|| format!("deleting {owner}"))?;
        tx.execute(
            "DELETE FROM tagged_items WHERE owner_type = ? AND owner_id = ?",
            params![owner.owner_type.as_str(), id],
        )?;
        remove_owner(&tx, owner)?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    pub fn specimens(&self, book_id: i64) -> Result<Vec<BookSpecimen>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, book_id, serial, remarks, created_at, modified_at
             FROM book_specimens WHERE book_id = ? ORDER BY serial",
        )?;
        let rows = stmt.query_map(params![book_id], |row| {
            Ok(BookSpecimen {
                id: row.get(0)?,
                book_id: row.get(1)?,
                serial: row.get(2)?,
                remarks: row.get(3)?,
                created_at: row.get(4)?,
                modified_at: row.get(5)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Recomputes every index row and drops rows whose owner is gone.
    pub fn reindex_all(&mut self) -> Result<ReindexReport> {
        let tx = self.conn.transaction()?;
        let mut report = ReindexReport::default();
        for owner_type in OwnerType::ALL {
            let table = match owner_type {
                OwnerType::Content => Content::TABLE,
                OwnerType::Book => Book::TABLE,
                OwnerType::Document => Document::TABLE,
            };
            report.orphans_removed += tx.execute(
                &format!(
                    "DELETE FROM search_index WHERE owner_type = ?
                     AND owner_id NOT IN (SELECT id FROM {table})"
                ),
                params![owner_type.as_str()],
            )?;
        }
        report.contents = reindex_type::<Content>(&tx)?;
        report.books = reindex_type::<Book>(&tx)?;
        report.documents = reindex_type::<Document>(&tx)?;
        tx.commit()?;

        tracing::info!(
            contents = report.contents,
            books = report.books,
            documents = report.documents,
            orphans = report.orphans_removed,
            "reindex_all"
        );
        Ok(report)
    }
}

fn apply_pragmas(conn: &mut Connection, on_disk: bool) -> Result<()> {
    if on_disk {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            "#,
        )?;
    }
    conn.execute_batch(
        r#"
        PRAGMA temp_store = MEMORY;
        PRAGMA foreign_keys = ON;
        "#,
    )?;
    Ok(())
}

fn init_meta(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS meta (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
        [],
    )?;
    Ok(())
}

fn migrate(conn: &mut Connection) -> Result<()> {
    let stored: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    let current: i64 = match stored {
        Some(raw) => raw
            .parse()
            .map_err(|_| anyhow!("unsupported schema version {raw}"))?,
        None => 0,
    };

    match current {
        0 => {
            conn.execute_batch(MIGRATION_V1)?;
            conn.execute(
                "INSERT INTO meta(key, value) VALUES('schema_version', ?)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![SCHEMA_VERSION.to_string()],
            )?;
        }
        v if v == SCHEMA_VERSION => {}
        v => return Err(anyhow!("unsupported schema version {}", v)),
    }

    Ok(())
}

fn load<M: Indexable>(conn: &Connection, id: i64) -> Result<Option<M>> {
    let sql = format!("SELECT {} FROM {} o WHERE o.id = ?", M::COLUMNS, M::TABLE);
    conn.query_row(&sql, params![id], M::from_row)
        .optional()
        .with_context(|| format!("loading {}", OwnerRef::new(M::OWNER_TYPE, id)))
}

/// Re-runs the index sync for a stored owner, if it still exists.
fn resync<M: Indexable>(conn: &Connection, id: i64) -> Result<Option<IndexedText>> {
    match load::<M>(conn, id)? {
        Some(owner) => sync_owner(conn, &owner).map(Some),
        None => Ok(None),
    }
}

fn reindex_type<M: Indexable>(conn: &Connection) -> Result<usize> {
    let owners = QuerySet::<M>::new(conn).fetch()?;
    for owner in &owners {
        sync_owner(conn, owner)?;
    }
    Ok(owners.len())
}

fn write_content(tx: &Transaction<'_>, c: &Content, now: i64) -> Result<i64> {
    tx.execute(
        "INSERT INTO contents(id, title, author, summary, text, status, published_at, created_at, modified_at)
         VALUES(?,?,?,?,?,?,?,?,?)
         ON CONFLICT(id) DO UPDATE SET title=excluded.title, author=excluded.author,
            summary=excluded.summary, text=excluded.text, status=excluded.status,
            published_at=excluded.published_at, modified_at=excluded.modified_at",
        params![
            c.id,
            c.title,
            c.author,
            c.summary,
            c.text,
            c.status.as_str(),
            c.published_at,
            now,
            now
        ],
    )
    .context("writing content")?;
    Ok(c.id.unwrap_or_else(|| tx.last_insert_rowid()))
}

fn write_book(tx: &Transaction<'_>, b: &Book, now: i64) -> Result<i64> {
    tx.execute(
        "INSERT INTO books(id, isbn, authors, serie, title, subtitle, summary, publisher, section,
            location, lang, created_at, modified_at)
         VALUES(?,?,?,?,?,?,?,?,?,?,?,?,?)
         ON CONFLICT(id) DO UPDATE SET isbn=excluded.isbn, authors=excluded.authors,
            serie=excluded.serie, title=excluded.title, subtitle=excluded.subtitle,
            summary=excluded.summary, publisher=excluded.publisher, section=excluded.section,
            location=excluded.location, lang=excluded.lang, modified_at=excluded.modified_at",
        params![
            b.id,
            b.isbn,
            b.authors,
            b.serie,
            b.title,
            b.subtitle,
            b.summary,
            b.publisher,
            b.section.code(),
            b.location,
            b.lang,
            now,
            now
        ],
    )
    .with_context(|| format!("writing book {:?}", b.title))?;
    Ok(b.id.unwrap_or_else(|| tx.last_insert_rowid()))
}

fn write_specimen(tx: &Transaction<'_>, s: &BookSpecimen, now: i64) -> Result<i64> {
    tx.execute(
        "INSERT INTO book_specimens(id, book_id, serial, remarks, created_at, modified_at)
         VALUES(?,?,?,?,?,?)
         ON CONFLICT(id) DO UPDATE SET book_id=excluded.book_id, serial=excluded.serial,
            remarks=excluded.remarks, modified_at=excluded.modified_at",
        params![s.id, s.book_id, s.serial, s.remarks, now, now],
    )
    .with_context(|| format!("writing specimen {}", s.serial))?;
    Ok(s.id.unwrap_or_else(|| tx.last_insert_rowid()))
}

fn write_document(tx: &Transaction<'_>, d: &Document, now: i64) -> Result<i64> {
    tx.execute(
        "INSERT INTO documents(id, title, summary, lang, kind, credits, original, created_at, modified_at)
         VALUES(?,?,?,?,?,?,?,?,?)
         ON CONFLICT(id) DO UPDATE SET title=excluded.title, summary=excluded.summary,
            lang=excluded.lang, kind=excluded.kind, credits=excluded.credits,
            original=excluded.original, modified_at=excluded.modified_at",
        params![
            d.id,
            d.title,
            d.summary,
            d.lang,
            d.kind,
            d.credits,
            d.original,
            now,
            now
        ],
    )
    .with_context(|| format!("writing document {:?}", d.title))?;
    Ok(d.id.unwrap_or_else(|| tx.last_insert_rowid()))
}

fn stamp(
    tx: &Transaction<'_>,
    table: &str,
    id: i64,
    created_at: &mut Option<i64>,
    modified_at: &mut Option<i64>,
) -> Result<()> {
    let (created, modified): (i64, i64) = tx.query_row(
        &format!("SELECT created_at, modified_at FROM {table} WHERE id = ?"),
        params![id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    *created_at = Some(created);
    *modified_at = Some(modified);
    Ok(())
}

fn specimen_book(tx: &Transaction<'_>, specimen_id: Option<i64>) -> Result<Option<i64>> {
    let Some(id) = specimen_id else {
        return Ok(None);
    };
    Ok(tx
        .query_row(
            "SELECT book_id FROM book_specimens WHERE id = ?",
            params![id],
            |row| row.get(0),
        )
        .optional()?)
}

fn replace_tags(tx: &Transaction<'_>, owner: OwnerRef, tags: &[String]) -> Result<()> {
    tx.execute(
        "DELETE FROM tagged_items WHERE owner_type = ? AND owner_id = ?",
        params![owner.owner_type.as_str(), owner.id],
    )?;
    for name in tags {
        let slug = slugify(name);
        if slug.is_empty() {
            continue;
        }
        tx.execute(
            "INSERT INTO tags(name, slug) VALUES(?,?) ON CONFLICT(slug) DO NOTHING",
            params![name.trim(), &slug],
        )?;
        let tag_id: i64 = tx.query_row(
            "SELECT id FROM tags WHERE slug = ?",
            params![&slug],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT OR IGNORE INTO tagged_items(tag_id, owner_type, owner_id) VALUES(?,?,?)",
            params![tag_id, owner.owner_type.as_str(), owner.id],
        )?;
    }
    Ok(())
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
