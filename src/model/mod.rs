pub mod indexable;
pub mod types;
