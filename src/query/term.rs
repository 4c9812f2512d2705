//! Search terms and their matchers.

use crate::query::QueryError;
use memchr::memmem;
use regex::{Regex, RegexBuilder};
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

/// How a term value is compared against line text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchKind {
    /// Case-insensitive substring (no prefix)
    Substring,
    /// Case-sensitive substring (`cs:`)
    SubstringCase,
    /// Case-insensitive regex (`r:`)
    Regex,
    /// Case-sensitive regex (`rcs:`)
    RegexCase,
}

impl MatchKind {
    /// Kind selected by a field prefix; `None` for unknown prefixes
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "cs" => Some(MatchKind::SubstringCase),
            "r" => Some(MatchKind::Regex),
            "rcs" => Some(MatchKind::RegexCase),
            _ => None,
        }
    }

    pub fn is_regex(self) -> bool {
        matches!(self, MatchKind::Regex | MatchKind::RegexCase)
    }

    pub fn is_case_sensitive(self) -> bool {
        matches!(self, MatchKind::SubstringCase | MatchKind::RegexCase)
    }
}

/// Identity of a term: two terms with the same key share a result bit
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TermKey {
    pub kind: MatchKind,
    pub value: String,
}

impl TermKey {
    pub fn new(kind: MatchKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

impl fmt::Display for TermKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.kind {
            MatchKind::Substring => "",
            MatchKind::SubstringCase => "cs:",
            MatchKind::Regex => "r:",
            MatchKind::RegexCase => "rcs:",
        };
        write!(f, "{}{:?}", prefix, self.value)
    }
}

/// Compiled matcher for one term
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Exact byte substring
    Bytes(memmem::Finder<'static>),
    /// Regex, also used for case-insensitive substrings
    Pattern(Regex),
}

impl Matcher {
    pub fn compile(key: &TermKey) -> Result<Self, QueryError> {
        let pattern = match key.kind {
            MatchKind::SubstringCase => {
                return Ok(Matcher::Bytes(memmem::Finder::new(key.value.as_bytes()).into_owned()));
            }
            MatchKind::Substring => regex::escape(&key.value),
            MatchKind::Regex | MatchKind::RegexCase => key.value.clone(),
        };

        RegexBuilder::new(&pattern)
            .case_insensitive(!key.kind.is_case_sensitive())
            .build()
            .map(Matcher::Pattern)
            .map_err(|e| QueryError::InvalidRegex {
                pattern: key.value.clone(),
                message: e.to_string(),
            })
    }

    pub fn is_match(&self, text: &str) -> bool {
        match self {
            Matcher::Bytes(finder) => finder.find(text.as_bytes()).is_some(),
            Matcher::Pattern(regex) => regex.is_match(text),
        }
    }

    /// Byte ranges of every non-overlapping match in `text`
    pub fn find_spans(&self, text: &str, out: &mut Vec<Range<usize>>) {
        match self {
            Matcher::Bytes(finder) => {
                let len = finder.needle().len();
                if len == 0 {
                    return;
                }
                out.extend(finder.find_iter(text.as_bytes()).map(|start| start..start + len));
            }
            Matcher::Pattern(regex) => {
                out.extend(regex.find_iter(text).filter(|m| !m.is_empty()).map(|m| m.range()));
            }
        }
    }
}

/// A live term in the term table
#[derive(Debug, Clone)]
pub struct SearchTerm {
    pub key: TermKey,
    /// Prefix as written in the query, if any
    pub field: Option<String>,
    pub bit: u8,
    /// The term bit holds valid results for the whole index
    pub computed: bool,
    pub matcher: Arc<Matcher>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(kind: MatchKind, value: &str) -> Matcher {
        Matcher::compile(&TermKey::new(kind, value)).unwrap()
    }

    #[test]
    fn test_substring_case() {
        assert!(matcher(MatchKind::Substring, "NoOt").is_match("aap noot mies"));
        assert!(!matcher(MatchKind::SubstringCase, "NoOt").is_match("aap noot mies"));
        assert!(matcher(MatchKind::SubstringCase, "noot").is_match("aap noot mies"));
    }

    #[test]
    fn test_find_spans() {
        let mut spans = Vec::new();
        matcher(MatchKind::Substring, "NOOT").find_spans("noot aap Noot", &mut spans);
        assert_eq!(spans, vec![0..4, 9..13]);

        spans.clear();
        matcher(MatchKind::SubstringCase, "aa").find_spans("aaaa", &mut spans);
        assert_eq!(spans, vec![0..2, 2..4]);

        spans.clear();
        matcher(MatchKind::Regex, "x*").find_spans("abc", &mut spans);
        assert!(spans.is_empty());
    }

    #[test]
    fn test_substring_is_literal() {
        let m = matcher(MatchKind::Substring, "a.c(");
        assert!(m.is_match("xa.c(y"));
        assert!(!m.is_match("abc("));
    }

    #[test]
    fn test_regex_case() {
        assert!(matcher(MatchKind::Regex, "^AAP\\b").is_match("aap noot"));
        assert!(!matcher(MatchKind::RegexCase, "^AAP\\b").is_match("aap noot"));
    }

    #[test]
    fn test_invalid_regex() {
        let err = Matcher::compile(&TermKey::new(MatchKind::Regex, "(unclosed")).unwrap_err();
        assert!(matches!(err, QueryError::InvalidRegex { .. }));
    }

    #[test]
    fn test_prefixes() {
        assert_eq!(MatchKind::from_prefix("cs"), Some(MatchKind::SubstringCase));
        assert_eq!(MatchKind::from_prefix("rcs"), Some(MatchKind::RegexCase));
        assert_eq!(MatchKind::from_prefix("http"), None);
    }
}
