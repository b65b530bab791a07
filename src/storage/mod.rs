pub mod sqlite;

pub use sqlite::{ReindexReport, SqliteStorage};
