//! How each owner model plugs into the search index.

use rusqlite::Row;
use rusqlite::types::Type;

use super::types::{Book, BookSection, Content, ContentStatus, Document};
use crate::search::index::{Indexable, OwnerType};

/// Separator used by `group_concat` when tags are read back with their owner.
pub(crate) const TAG_SEPARATOR: char = '\u{1f}';

fn split_tags(raw: Option<String>) -> Vec<String> {
    let mut tags: Vec<String> = raw
        .unwrap_or_default()
        .split(TAG_SEPARATOR)
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
        .collect();
    tags.sort();
    tags
}

impl Indexable for Content {
    const OWNER_TYPE: OwnerType = OwnerType::Content;
    const TABLE: &'static str = "contents";
    const COLUMNS: &'static str = "o.id, o.title, o.author, o.summary, o.text, o.status, \
        o.published_at, o.created_at, o.modified_at, \
        (SELECT group_concat(t.name, char(31)) FROM tagged_items ti JOIN tags t ON t.id = ti.tag_id \
         WHERE ti.owner_type = 'content' AND ti.owner_id = o.id)";
    const PUBLISHED: &'static str = "o.status = 'published'";
    const DEFAULT_ORDER: &'static str = "o.published_at IS NULL, o.published_at DESC, o.id DESC";

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn index_strings(&self) -> Vec<Option<&str>> {
        vec![
            Some(self.title.as_str()),
            self.author.as_deref(),
            self.summary.as_deref(),
            self.text.as_deref(),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let status: String = row.get(5)?;
        let status = status
            .parse::<ContentStatus>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, e.into()))?;
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            author: row.get(2)?,
            summary: row.get(3)?,
            text: row.get(4)?,
            status,
            published_at: row.get(6)?,
            created_at: row.get(7)?,
            modified_at: row.get(8)?,
            tags: split_tags(row.get(9)?),
        })
    }
}

impl Indexable for Book {
    const OWNER_TYPE: OwnerType = OwnerType::Book;
    const TABLE: &'static str = "books";
    const COLUMNS: &'static str = "o.id, o.isbn, o.authors, o.serie, o.title, o.subtitle, \
        o.summary, o.publisher, o.section, o.location, o.lang, o.created_at, o.modified_at";
    const PUBLISHED: &'static str =
        "EXISTS (SELECT 1 FROM book_specimens s WHERE s.book_id = o.id)";
    const DEFAULT_ORDER: &'static str = "o.title COLLATE NOCASE, o.id";

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn index_strings(&self) -> Vec<Option<&str>> {
        vec![
            Some(self.title.as_str()),
            self.isbn.as_deref(),
            self.authors.as_deref(),
            self.subtitle.as_deref(),
            self.summary.as_deref(),
            self.serie.as_deref(),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            isbn: row.get(1)?,
            authors: row.get(2)?,
            serie: row.get(3)?,
            title: row.get(4)?,
            subtitle: row.get(5)?,
            summary: row.get(6)?,
            publisher: row.get(7)?,
            section: BookSection::from_code(row.get(8)?),
            location: row.get(9)?,
            lang: row.get(10)?,
            created_at: row.get(11)?,
            modified_at: row.get(12)?,
        })
    }
}

impl Indexable for Document {
    const OWNER_TYPE: OwnerType = OwnerType::Document;
    const TABLE: &'static str = "documents";
    const COLUMNS: &'static str = "o.id, o.title, o.summary, o.lang, o.kind, o.credits, \
        o.original, o.created_at, o.modified_at, \
        (SELECT group_concat(t.name, char(31)) FROM tagged_items ti JOIN tags t ON t.id = ti.tag_id \
         WHERE ti.owner_type = 'document' AND ti.owner_id = o.id)";
    const PUBLISHED: &'static str = "1";
    const DEFAULT_ORDER: &'static str = "o.title COLLATE NOCASE, o.id";

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn index_strings(&self) -> Vec<Option<&str>> {
        vec![
            Some(self.title.as_str()),
            self.summary.as_deref(),
            self.credits.as_deref(),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            summary: row.get(2)?,
            lang: row.get(3)?,
            kind: row.get(4)?,
            credits: row.get(5)?,
            original: row.get(6)?,
            created_at: row.get(7)?,
            modified_at: row.get(8)?,
            tags: split_tags(row.get(9)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn book_index_strings_follow_catalog_order() {
        let book = Book {
            isbn: Some("978-2".into()),
            authors: Some("Someone".into()),
            serie: Some("Serie".into()),
            ..Book::new("Title", "fr")
        };
        assert_eq!(
            book.index_strings(),
            vec![
                Some("Title"),
                Some("978-2"),
                Some("Someone"),
                None,
                None,
                Some("Serie")
            ]
        );
    }

    #[test]
    fn tags_are_split_and_sorted() {
        let raw = format!("zebra{TAG_SEPARATOR}apple");
        assert_eq!(split_tags(Some(raw)), vec!["apple", "zebra"]);
        assert!(split_tags(None).is_empty());
    }

    #[test]
    fn unsaved_owner_has_no_ref() {
        assert!(Content::draft("x").owner_ref().is_none());
    }
}
