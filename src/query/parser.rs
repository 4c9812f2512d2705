//! Recursive-descent query parser.
//!
//! ```text
//! expr   := term (OR term | term)*
//! term   := factor ((AND | NOT) factor)*
//! factor := value | field ':' value | NOT factor | '(' expr ')'
//! ```
//!
//! Juxtaposed terms are OR-ed. Parsing happens in two phases: the text is
//! turned into an expression over the query's own distinct terms, then those
//! terms are resolved to bits in the [`TermTable`]. Every error is raised in
//! the first phase, so a rejected query leaves the table untouched.

use crate::index::TermMask;
use crate::query::ast::Expr;
use crate::query::lexer::{tokenize, Token, TokenKind};
use crate::query::table::{TermTable, TERM_CAPACITY};
use crate::query::term::{MatchKind, Matcher, TermKey};
use crate::query::QueryError;
use std::sync::Arc;

/// A parsed query bound to term bits
#[derive(Debug, Clone)]
pub struct Query {
    pub text: String,
    pub expr: Expr,
}

impl Query {
    /// Bits of every term the query references
    pub fn terms(&self) -> TermMask {
        self.expr.terms()
    }

    pub fn matches(&self, bits: TermMask) -> bool {
        self.expr.eval(bits)
    }
}

/// Parse query text, registering its terms in `table`
pub fn parse_query(input: &str, table: &mut TermTable) -> Result<Query, QueryError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(QueryError::Empty);
    }

    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        terms: Vec::new(),
        end: input.len(),
    };
    let expr = parser.parse_expr()?;
    if let Some(token) = parser.peek() {
        return Err(QueryError::UnbalancedParen { pos: token.pos });
    }

    let bits: Vec<u8> = parser
        .terms
        .into_iter()
        .map(|term| table.acquire(term.key, term.field, term.matcher))
        .collect();

    Ok(Query {
        text: input.to_string(),
        expr: expr.remap(&bits),
    })
}

struct PendingTerm {
    key: TermKey,
    field: Option<String>,
    matcher: Arc<Matcher>,
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    /// Distinct terms in order of first appearance; leaves index into this
    terms: Vec<PendingTerm>,
    end: usize,
}

impl<'a> Parser<'a> {
    fn parse_expr(&mut self) -> Result<Expr, QueryError> {
        let mut left = self.parse_term()?;
        loop {
            match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Or) => {
                    self.pos += 1;
                    let right = self.parse_term()?;
                    left = Expr::or(left, right);
                }
                Some(TokenKind::Value { .. } | TokenKind::Open) => {
                    let right = self.parse_term()?;
                    left = Expr::or(left, right);
                }
                _ => return Ok(left),
            }
        }
    }

    fn parse_term(&mut self) -> Result<Expr, QueryError> {
        let mut left = self.parse_factor()?;
        loop {
            match self.peek().map(|t| &t.kind) {
                Some(TokenKind::And) => {
                    self.pos += 1;
                    let right = self.parse_factor()?;
                    left = Expr::and(left, right);
                }
                Some(TokenKind::Not) => {
                    self.pos += 1;
                    let right = self.parse_factor()?;
                    left = Expr::and_not(left, right);
                }
                _ => return Ok(left),
            }
        }
    }

    fn parse_factor(&mut self) -> Result<Expr, QueryError> {
        let Some(token) = self.next() else {
            return Err(QueryError::Dangling { pos: self.end });
        };

        match &token.kind {
            TokenKind::Value { field, value } => self.leaf(field.clone(), value.clone()),
            TokenKind::Not => Ok(Expr::not(self.parse_factor()?)),
            TokenKind::Open => {
                let open = token.pos;
                let inner = self.parse_expr()?;
                match self.next() {
                    Some(Token {
                        kind: TokenKind::Close,
                        ..
                    }) => Ok(inner),
                    _ => Err(QueryError::UnbalancedParen { pos: open }),
                }
            }
            TokenKind::Close => Err(QueryError::UnbalancedParen { pos: token.pos }),
            TokenKind::And | TokenKind::Or => Err(QueryError::Dangling { pos: token.pos }),
        }
    }

    fn leaf(&mut self, field: Option<String>, value: String) -> Result<Expr, QueryError> {
        let kind = field
            .as_deref()
            .and_then(MatchKind::from_prefix)
            .unwrap_or(MatchKind::Substring);
        let key = TermKey::new(kind, value);

        if let Some(i) = self.terms.iter().position(|t| t.key == key) {
            return Ok(Expr::Value(i as u8));
        }
        if self.terms.len() == TERM_CAPACITY {
            return Err(QueryError::TooManyTerms {
                max: TERM_CAPACITY,
            });
        }

        let matcher = Arc::new(Matcher::compile(&key)?);
        self.terms.push(PendingTerm {
            key,
            field,
            matcher,
        });
        Ok(Expr::Value((self.terms.len() - 1) as u8))
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Result<Query, QueryError> {
        parse_query(input, &mut TermTable::new())
    }

    fn v(bit: u8) -> Expr {
        Expr::Value(bit)
    }

    #[test]
    fn test_single_value() {
        assert_eq!(parse("aap").unwrap().expr, v(0));
    }

    #[test]
    fn test_juxtaposition_is_or() {
        assert_eq!(parse("aap noot").unwrap().expr, Expr::or(v(0), v(1)));
        assert_eq!(parse("aap OR noot").unwrap().expr, Expr::or(v(0), v(1)));
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        assert_eq!(
            parse("a AND b OR c").unwrap().expr,
            Expr::or(Expr::and(v(0), v(1)), v(2))
        );
        assert_eq!(
            parse("a OR b AND c").unwrap().expr,
            Expr::or(v(0), Expr::and(v(1), v(2)))
        );
    }

    #[test]
    fn test_not_folding() {
        let expected = Expr::AndNot(Box::new(v(0)), Box::new(v(1)));
        assert_eq!(parse("a AND NOT b").unwrap().expr, expected);
        assert_eq!(parse("a NOT b").unwrap().expr, expected);
        assert_eq!(
            parse("NOT a AND b").unwrap().expr,
            Expr::AndNot(Box::new(v(1)), Box::new(v(0)))
        );
        assert_eq!(parse("NOT NOT a").unwrap().expr, v(0));
        assert_eq!(parse("NOT a").unwrap().expr, Expr::Not(Box::new(v(0))));
    }

    #[test]
    fn test_parentheses() {
        assert_eq!(
            parse("(a OR b) AND c").unwrap().expr,
            Expr::and(Expr::or(v(0), v(1)), v(2))
        );
    }

    #[test]
    fn test_repeated_term_shares_bit() {
        let q = parse("a AND (a OR cs:a)").unwrap();
        assert_eq!(q.expr, Expr::and(v(0), Expr::or(v(0), v(1))));
    }

    #[test]
    fn test_errors() {
        assert_eq!(parse("").unwrap_err(), QueryError::Empty);
        assert_eq!(parse("   ").unwrap_err(), QueryError::Empty);
        assert_eq!(parse("(a OR b").unwrap_err(), QueryError::UnbalancedParen { pos: 0 });
        assert_eq!(parse("a)").unwrap_err(), QueryError::UnbalancedParen { pos: 1 });
        assert_eq!(parse("a AND ").unwrap_err(), QueryError::Dangling { pos: 6 });
        assert_eq!(parse("OR a").unwrap_err(), QueryError::Dangling { pos: 0 });
        assert!(matches!(parse(r#"r:"(x""#).unwrap_err(), QueryError::InvalidRegex { .. }));
    }

    #[test]
    fn test_too_many_terms_leaves_table_untouched() {
        let mut table = TermTable::new();
        parse_query("keep", &mut table).unwrap();

        let input: Vec<String> = (0..=TERM_CAPACITY).map(|i| format!("t{}", i)).collect();
        let err = parse_query(&input.join(" "), &mut table).unwrap_err();
        assert_eq!(err, QueryError::TooManyTerms { max: TERM_CAPACITY });
        assert_eq!(table.len(), 1);

        // Exactly the capacity is fine
        let input: Vec<String> = (0..TERM_CAPACITY).map(|i| format!("t{}", i)).collect();
        assert!(parse_query(&input.join(" "), &mut table).is_ok());
    }

    #[test]
    fn test_bits_follow_table() {
        let mut table = TermTable::new();
        let first = parse_query("noot", &mut table).unwrap();
        let second = parse_query("aap AND noot", &mut table).unwrap();
        assert_eq!(first.terms(), TermMask::single(0));
        assert_eq!(second.expr, Expr::and(v(1), v(0)));
    }
}
