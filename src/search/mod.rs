//! Search layer facade.
//!
//! - **[`canonicalize`]**: normalization shared by indexing and querying.
//! - **[`query`]**: query parsing (plain and `prefix*` terms) into SQL.
//! - **[`index`]**: the `search_index` projection, its sync hooks and the cross-type [`index::Search`].
//! - **[`queryset`]**: per-model [`queryset::QuerySet`] with `search` and `published`.

pub mod canonicalize;
pub mod index;
pub mod query;
pub mod queryset;

pub use index::{IndexStats, IndexedText, Indexable, OwnerRef, OwnerType, Search, SearchResults};
pub use queryset::QuerySet;
