//! Owner entities: blog content, library books and their specimens, media center documents.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Publication state of a blog [`Content`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentStatus {
    #[default]
    Draft,
    Published,
    /// Soft delete: the row and its index entry stay, but it is never public.
    Deleted,
}

impl ContentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "published" => Ok(Self::Published),
            "deleted" => Ok(Self::Deleted),
            other => Err(format!("unknown content status: {other}")),
        }
    }
}

/// Blog entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub id: Option<i64>,
    pub title: String,
    pub author: Option<String>,
    pub summary: Option<String>,
    pub text: Option<String>,
    pub status: ContentStatus,
    pub published_at: Option<i64>,
    pub tags: Vec<String>,
    pub created_at: Option<i64>,
    pub modified_at: Option<i64>,
}

impl Content {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn draft(title: impl Into<String>) -> Self {
        Self::new(title)
    }

    pub fn published(title: impl Into<String>) -> Self {
        Self {
            status: ContentStatus::Published,
            ..Self::new(title)
        }
    }
}

/// Library shelving section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookSection {
    Digital,
    ChildrenCartoons,
    ChildrenNovels,
    ChildrenDocumentary,
    ChildrenComics,
    AdultsNovels,
    AdultsDocumentary,
    AdultsComics,
    Game,
    #[default]
    Other,
}

impl BookSection {
    pub const OTHER_CODE: i64 = 99;

    pub fn code(self) -> i64 {
        match self {
            Self::Digital => 1,
            Self::ChildrenCartoons => 2,
            Self::ChildrenNovels => 3,
            Self::ChildrenDocumentary => 4,
            Self::ChildrenComics => 5,
            Self::AdultsNovels => 6,
            Self::AdultsDocumentary => 7,
            Self::AdultsComics => 8,
            Self::Game => 9,
            Self::Other => Self::OTHER_CODE,
        }
    }

    /// Unknown codes fall back to [`BookSection::Other`].
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Self::Digital,
            2 => Self::ChildrenCartoons,
            3 => Self::ChildrenNovels,
            4 => Self::ChildrenDocumentary,
            5 => Self::ChildrenComics,
            6 => Self::AdultsNovels,
            7 => Self::AdultsDocumentary,
            8 => Self::AdultsComics,
            9 => Self::Game,
            _ => Self::Other,
        }
    }
}

/// Library catalog entry. Physical copies live in [`BookSpecimen`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: Option<i64>,
    /// Optional, but unique when set.
    pub isbn: Option<String>,
    pub authors: Option<String>,
    pub serie: Option<String>,
    pub title: String,
    pub subtitle: Option<String>,
    pub summary: Option<String>,
    pub publisher: Option<String>,
    pub section: BookSection,
    pub location: Option<String>,
    pub lang: String,
    pub created_at: Option<i64>,
    pub modified_at: Option<i64>,
}

impl Book {
    pub fn new(title: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            lang: lang.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookSpecimen {
    pub id: Option<i64>,
    pub book_id: i64,
    pub serial: String,
    pub remarks: Option<String>,
    pub created_at: Option<i64>,
    pub modified_at: Option<i64>,
}

impl BookSpecimen {
    pub fn new(book_id: i64, serial: impl Into<String>) -> Self {
        Self {
            book_id,
            serial: serial.into(),
            ..Default::default()
        }
    }
}

/// Media center document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: Option<i64>,
    pub title: String,
    pub summary: Option<String>,
    pub lang: String,
    pub kind: Option<String>,
    pub credits: Option<String>,
    /// Stored file location, relative to the media root.
    pub original: Option<String>,
    pub tags: Vec<String>,
    pub created_at: Option<i64>,
    pub modified_at: Option<i64>,
}

impl Document {
    pub fn new(title: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            lang: lang.into(),
            ..Default::default()
        }
    }
}

/// Who is asking. Staff sees drafts and soft-deleted rows, everybody else only public ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Viewer {
    #[default]
    Anonymous,
    User,
    Staff,
}

impl Viewer {
    pub fn is_staff(self) -> bool {
        matches!(self, Self::Staff)
    }

    /// Value for the `public` filter of an index search made on behalf of this viewer.
    pub fn search_scope(self) -> Option<bool> {
        if self.is_staff() { None } else { Some(true) }
    }
}
