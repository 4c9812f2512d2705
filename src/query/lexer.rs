//! Query tokenizer.

use crate::query::QueryError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Open,
    Close,
    And,
    Or,
    Not,
    /// A search value with its optional field prefix
    Value { field: Option<String>, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte position in the query text
    pub pos: usize,
}

/// Split query text into tokens.
///
/// `AND`, `OR` and `NOT` are operators only in upper case and only when
/// followed by whitespace or `(`; otherwise they are plain values.
pub fn tokenize(input: &str) -> Result<Vec<Token>, QueryError> {
    let mut lexer = Lexer { input, pos: 0 };
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next_token()? {
        tokens.push(token);
    }
    Ok(tokens)
}

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl Lexer<'_> {
    fn next_token(&mut self) -> Result<Option<Token>, QueryError> {
        self.skip_whitespace();
        let pos = self.pos;
        let Some(ch) = self.peek_char() else {
            return Ok(None);
        };

        let kind = match ch {
            '(' => {
                self.advance();
                TokenKind::Open
            }
            ')' => {
                self.advance();
                TokenKind::Close
            }
            _ => match self.keyword() {
                Some(kind) => kind,
                None => self.value()?,
            },
        };

        Ok(Some(Token { kind, pos }))
    }

    fn keyword(&mut self) -> Option<TokenKind> {
        for (word, kind) in [("AND", TokenKind::And), ("OR", TokenKind::Or), ("NOT", TokenKind::Not)] {
            let Some(rest) = self.remaining().strip_prefix(word) else {
                continue;
            };
            if rest.starts_with(|c: char| c.is_whitespace() || c == '(') {
                self.pos += word.len();
                return Some(kind);
            }
        }
        None
    }

    fn value(&mut self) -> Result<TokenKind, QueryError> {
        let start = self.pos;

        if self.peek_char() == Some('"') {
            let value = self.quoted()?;
            return Ok(TokenKind::Value { field: None, value });
        }

        // Field prefix: a known word followed by ':'
        let word_end = self.remaining()
            .find(|c: char| !c.is_ascii_alphabetic())
            .map(|i| start + i)
            .unwrap_or(self.input.len());
        if self.input[word_end..].starts_with(':') {
            let field = &self.input[start..word_end];
            if super::term::MatchKind::from_prefix(field).is_some() {
                self.pos = word_end + 1;
                let value = if self.peek_char() == Some('"') {
                    self.quoted()?
                } else {
                    self.bare()
                };
                if value.is_empty() {
                    return Err(QueryError::EmptyValue { pos: start });
                }
                return Ok(TokenKind::Value {
                    field: Some(field.to_string()),
                    value,
                });
            }
        }

        Ok(TokenKind::Value {
            field: None,
            value: self.bare(),
        })
    }

    /// Unquoted value up to whitespace or a parenthesis
    fn bare(&mut self) -> String {
        let start = self.pos;
        while let Some(ch) = self.peek_char() {
            if ch.is_whitespace() || ch == '(' || ch == ')' {
                break;
            }
            self.advance();
        }
        self.input[start..self.pos].to_string()
    }

    /// Double-quoted value; `\"` and `\\` are escapes
    fn quoted(&mut self) -> Result<String, QueryError> {
        let open = self.pos;
        self.advance();
        let mut value = String::new();
        loop {
            match self.peek_char() {
                None => return Err(QueryError::UnterminatedQuote { pos: open }),
                Some('"') => {
                    self.advance();
                    return Ok(value);
                }
                Some('\\') => {
                    self.advance();
                    match self.peek_char() {
                        Some(c @ ('"' | '\\')) => {
                            value.push(c);
                            self.advance();
                        }
                        _ => value.push('\\'),
                    }
                }
                Some(c) => {
                    value.push(c);
                    self.advance();
                }
            }
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek_char().is_some_and(char::is_whitespace) {
            self.advance();
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.peek_char() {
            self.pos += ch.len_utf8();
        }
    }

    fn remaining(&self) -> &str {
        &self.input[self.pos..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input).unwrap().into_iter().map(|t| t.kind).collect()
    }

    fn value(v: &str) -> TokenKind {
        TokenKind::Value {
            field: None,
            value: v.to_string(),
        }
    }

    #[test]
    fn test_keywords_need_separator() {
        assert_eq!(kinds("a AND b"), vec![value("a"), TokenKind::And, value("b")]);
        assert_eq!(kinds("NOT(a)"), vec![TokenKind::Not, TokenKind::Open, value("a"), TokenKind::Close]);
        assert_eq!(kinds("ANDROID"), vec![value("ANDROID")]);
        assert_eq!(kinds("a and b"), vec![value("a"), value("and"), value("b")]);
        assert_eq!(kinds("a OR"), vec![value("a"), value("OR")]);
    }

    #[test]
    fn test_field_prefixes() {
        assert_eq!(
            kinds("cs:Foo r:^a+$"),
            vec![
                TokenKind::Value {
                    field: Some("cs".to_string()),
                    value: "Foo".to_string()
                },
                TokenKind::Value {
                    field: Some("r".to_string()),
                    value: "^a+$".to_string()
                },
            ]
        );
        // Unknown prefixes stay in the value
        assert_eq!(kinds("http://example"), vec![value("http://example")]);
    }

    #[test]
    fn test_quoted_values() {
        assert_eq!(kinds(r#""a (b) AND c""#), vec![value("a (b) AND c")]);
        assert_eq!(kinds(r#""say \"hi\"""#), vec![value("say \"hi\"")]);
        assert_eq!(
            kinds(r#"rcs:"x y""#),
            vec![TokenKind::Value {
                field: Some("rcs".to_string()),
                value: "x y".to_string()
            }]
        );
    }

    #[test]
    fn test_lexer_errors() {
        assert_eq!(tokenize("\"open"), Err(QueryError::UnterminatedQuote { pos: 0 }));
        assert_eq!(tokenize("a cs: b"), Err(QueryError::EmptyValue { pos: 2 }));
    }

    #[test]
    fn test_parentheses_split_values() {
        assert_eq!(
            kinds("(aap)noot"),
            vec![TokenKind::Open, value("aap"), TokenKind::Close, value("noot")]
        );
    }
}
