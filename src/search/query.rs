//! Query parsing and the SQL match clause built from it.

use rusqlite::types::Value;
use thiserror::Error;

use super::canonicalize::normalize;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum QueryError {
    #[error("page size must be positive")]
    ZeroPageSize,
}

/// One whitespace-separated token of a search query, already normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    /// Matches anywhere in the indexed text.
    Contains(String),
    /// `prefix*`: matches an indexed word starting with the prefix.
    Prefix(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedQuery {
    pub terms: Vec<Term>,
}

impl ParsedQuery {
    /// Parses raw user input. Terms are AND-ed together.
    ///
    /// Tokens that normalize to nothing (punctuation, a lone `*`) are dropped,
    /// so an empty result matches everything.
    pub fn parse(input: &str) -> Self {
        let mut terms = Vec::new();
        for raw in input.split_whitespace() {
            let (body, prefix) = match raw.strip_suffix('*') {
                Some(body) => (body.trim_end_matches('*'), true),
                None => (raw, false),
            };
            // Normalization may split a token ("e-mail" -> "e mail"); keep the
            // pieces together so they still match the normalized index text.
            let norm = normalize(body);
            if norm.is_empty() {
                continue;
            }
            terms.push(if prefix {
                Term::Prefix(norm)
            } else {
                Term::Contains(norm)
            });
        }
        Self { terms }
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// SQL predicate over `column`, with its positional parameters.
    ///
    /// Returns `None` when there is nothing to match.
    pub fn to_sql(&self, column: &str) -> Option<(String, Vec<Value>)> {
        if self.terms.is_empty() {
            return None;
        }
        let mut clauses = Vec::with_capacity(self.terms.len());
        let mut params = Vec::with_capacity(self.terms.len());
        for term in &self.terms {
            match term {
                Term::Contains(t) => {
                    clauses.push(format!("{column} LIKE ? ESCAPE '\\'"));
                    params.push(Value::Text(format!("%{}%", escape_like(t))));
                }
                Term::Prefix(t) => {
                    clauses.push(format!("(' ' || {column}) LIKE ? ESCAPE '\\'"));
                    params.push(Value::Text(format!("% {}%", escape_like(t))));
                }
            }
        }
        Some((clauses.join(" AND "), params))
    }
}

fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// LIMIT/OFFSET pair for one page of results, 1-based.
pub fn page_bounds(page: usize, page_size: usize) -> Result<(usize, usize), QueryError> {
    if page_size == 0 {
        return Err(QueryError::ZeroPageSize);
    }
    Ok((page_size, page.saturating_sub(1) * page_size))
}
