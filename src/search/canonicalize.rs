//! Text canonicalization shared by the indexer and the query parser.
//!
//! Both sides of a match go through [`normalize`], so comparisons in SQL can
//! be plain byte `LIKE`s: case, diacritics and punctuation are already gone.

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::{decompose_compatible, is_combining_mark};

/// Joins index strings before normalization.
pub const INDEX_SEPARATOR: &str = "\n";

/// Lowercase, strip diacritics, turn punctuation into spaces, collapse whitespace.
///
/// Each composed character is compatibility-decomposed before lowercasing, so
/// `ℌ` folds like `H`. Only marks split off a precomposed letter are dropped
/// (`é`, `أ`); marks that stand alone, such as Devanagari vowel signs, are
/// letters of their word and stay. Final sigma folds to `σ`.
pub fn normalize(text: &str) -> String {
    let mut folded = String::with_capacity(text.len());
    let mut parts = Vec::with_capacity(4);
    for composed in text.nfc() {
        parts.clear();
        decompose_compatible(composed, |c| parts.push(c));
        let split = parts.len() > 1;
        for &c in &parts {
            if split && is_combining_mark(c) {
                continue;
            }
            for lower in c.to_lowercase() {
                folded.push(match lower {
                    'ς' => 'σ',
                    l if l.is_alphanumeric() || is_combining_mark(l) => l,
                    _ => ' ',
                });
            }
        }
    }

    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Builds the stored index text from an owner's ordered index strings.
///
/// Missing and blank entries are skipped; the result may be empty.
pub fn index_text<'a, I>(strings: I) -> String
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let joined = strings
        .into_iter()
        .flatten()
        .filter(|s| !s.trim().is_empty())
        .collect::<Vec<_>>()
        .join(INDEX_SEPARATOR);
    normalize(&joined)
}

/// Tag slug: normalized words joined with dashes.
pub fn slugify(name: &str) -> String {
    normalize(name).replace(' ', "-")
}
