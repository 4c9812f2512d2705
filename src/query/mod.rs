//! Query parsing and term management.
//!
//! A query is parsed into an [`Expr`] over term bits. Terms live in a
//! [`TermTable`] shared by every query run against the same document, so a
//! term that appears in consecutive queries keeps its bit and its results.
//!
//! ## Syntax
//!
//! - `aap noot` - lines containing `aap` or `noot` (case-insensitive)
//! - `aap AND noot`, `aap OR noot`, `aap NOT noot`, `NOT aap`
//! - `cs:Aap` - case-sensitive substring
//! - `r:^a.p$`, `rcs:^A` - regex, case-insensitive or case-sensitive
//! - `"a (b) AND c"` - quoted value; `\"` escapes a quote
//!
//! Values containing parentheses or spaces must be quoted.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod table;
pub mod term;

pub use ast::Expr;
pub use parser::{parse_query, Query};
pub use table::{TermTable, TERM_CAPACITY};
pub use term::{MatchKind, Matcher, SearchTerm, TermKey};

/// Rejected query text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("empty query")]
    Empty,

    #[error("unbalanced parenthesis at position {pos}")]
    UnbalancedParen { pos: usize },

    #[error("operator without operand at position {pos}")]
    Dangling { pos: usize },

    #[error("unterminated quote at position {pos}")]
    UnterminatedQuote { pos: usize },

    #[error("missing value after prefix at position {pos}")]
    EmptyValue { pos: usize },

    #[error("query uses more than {max} distinct terms")]
    TooManyTerms { max: usize },

    #[error("invalid regex '{pattern}': {message}")]
    InvalidRegex { pattern: String, message: String },
}
