// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Tokenizer for binding expressions
//!
//! Produces a flat stream of [`Spanned`] tokens. Identifiers borrow from the
//! input; string literals are unescaped eagerly because templates rarely
//! contain long literals.

use super::error::{ParseError, ParseResult};
use super::lexer::{is_identifier_continue, is_identifier_start};
use super::span::Spanned;
use std::fmt;

/// Token of the expression language
#[derive(Debug, Clone, PartialEq)]
pub enum Token<'input> {
    /// Numeric literal
    Number(f64),
    /// String literal with escapes resolved
    String(String),
    /// Identifier, possibly `$`-prefixed
    Identifier(&'input str),
    /// `true`
    True,
    /// `false`
    False,
    /// `null` or `undefined`
    Null,

    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `%`
    Percent,
    /// `!`
    Bang,
    /// `=`
    Assign,
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `===`
    StrictEqual,
    /// `!==`
    StrictNotEqual,
    /// `<`
    LessThan,
    /// `<=`
    LessThanOrEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanOrEqual,
    /// `&&`
    AndAnd,
    /// `||`
    OrOr,
    /// `?`
    Question,
    /// `:`
    Colon,
    /// `.`
    Dot,
    /// `,`
    Comma,
    /// `(`
    LeftParen,
    /// `)`
    RightParen,
    /// `[`
    LeftBracket,
    /// `]`
    RightBracket,
    /// `{`
    LeftBrace,
    /// `}`
    RightBrace,
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{n}"),
            Token::String(s) => write!(f, "'{s}'"),
            Token::Identifier(name) => f.write_str(name),
            Token::True => f.write_str("true"),
            Token::False => f.write_str("false"),
            Token::Null => f.write_str("null"),
            Token::Plus => f.write_str("+"),
            Token::Minus => f.write_str("-"),
            Token::Star => f.write_str("*"),
            Token::Slash => f.write_str("/"),
            Token::Percent => f.write_str("%"),
            Token::Bang => f.write_str("!"),
            Token::Assign => f.write_str("="),
            Token::Equal => f.write_str("=="),
            Token::NotEqual => f.write_str("!="),
            Token::StrictEqual => f.write_str("==="),
            Token::StrictNotEqual => f.write_str("!=="),
            Token::LessThan => f.write_str("<"),
            Token::LessThanOrEqual => f.write_str("<="),
            Token::GreaterThan => f.write_str(">"),
            Token::GreaterThanOrEqual => f.write_str(">="),
            Token::AndAnd => f.write_str("&&"),
            Token::OrOr => f.write_str("||"),
            Token::Question => f.write_str("?"),
            Token::Colon => f.write_str(":"),
            Token::Dot => f.write_str("."),
            Token::Comma => f.write_str(","),
            Token::LeftParen => f.write_str("("),
            Token::RightParen => f.write_str(")"),
            Token::LeftBracket => f.write_str("["),
            Token::RightBracket => f.write_str("]"),
            Token::LeftBrace => f.write_str("{"),
            Token::RightBrace => f.write_str("}"),
        }
    }
}

/// Single-character operators that never start a longer token
#[inline]
fn lookup_single_char_operator(byte: u8) -> Option<Token<'static>> {
    match byte {
        b'+' => Some(Token::Plus),
        b'-' => Some(Token::Minus),
        b'*' => Some(Token::Star),
        b'/' => Some(Token::Slash),
        b'%' => Some(Token::Percent),
        b'?' => Some(Token::Question),
        b':' => Some(Token::Colon),
        b',' => Some(Token::Comma),
        b'(' => Some(Token::LeftParen),
        b')' => Some(Token::RightParen),
        b'[' => Some(Token::LeftBracket),
        b']' => Some(Token::RightBracket),
        b'{' => Some(Token::LeftBrace),
        b'}' => Some(Token::RightBrace),
        _ => None,
    }
}

/// Tokenizer over a single expression source
pub struct Tokenizer<'input> {
    input: &'input str,
    bytes: &'input [u8],
    pos: usize,
}

impl<'input> Tokenizer<'input> {
    /// Create a tokenizer for the given source
    pub fn new(input: &'input str) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            pos: 0,
        }
    }

    /// Current byte offset into the input
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Tokenize the whole input
    pub fn tokenize_all(mut self) -> ParseResult<Vec<Spanned<Token<'input>>>> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek_byte(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    /// Produce the next token, or `None` at end of input
    pub fn next_token(&mut self) -> ParseResult<Option<Spanned<Token<'input>>>> {
        self.skip_whitespace();

        let start = self.pos;
        let Some(byte) = self.peek_byte(0) else {
            return Ok(None);
        };

        if let Some(token) = lookup_single_char_operator(byte) {
            self.pos += 1;
            return Ok(Some(Spanned::new(token, start, self.pos)));
        }

        let token = match byte {
            b'=' => match (self.peek_byte(1), self.peek_byte(2)) {
                (Some(b'='), Some(b'=')) => self.take(3, Token::StrictEqual),
                (Some(b'='), _) => self.take(2, Token::Equal),
                _ => self.take(1, Token::Assign),
            },
            b'!' => match (self.peek_byte(1), self.peek_byte(2)) {
                (Some(b'='), Some(b'=')) => self.take(3, Token::StrictNotEqual),
                (Some(b'='), _) => self.take(2, Token::NotEqual),
                _ => self.take(1, Token::Bang),
            },
            b'<' => match self.peek_byte(1) {
                Some(b'=') => self.take(2, Token::LessThanOrEqual),
                _ => self.take(1, Token::LessThan),
            },
            b'>' => match self.peek_byte(1) {
                Some(b'=') => self.take(2, Token::GreaterThanOrEqual),
                _ => self.take(1, Token::GreaterThan),
            },
            b'&' => match self.peek_byte(1) {
                Some(b'&') => self.take(2, Token::AndAnd),
                _ => {
                    return Err(ParseError::UnexpectedToken {
                        token: "&".to_string(),
                        position: start,
                    });
                }
            },
            b'|' => match self.peek_byte(1) {
                Some(b'|') => self.take(2, Token::OrOr),
                _ => {
                    return Err(ParseError::UnexpectedToken {
                        token: "|".to_string(),
                        position: start,
                    });
                }
            },
            b'.' => match self.peek_byte(1) {
                Some(d) if d.is_ascii_digit() => self.parse_number()?,
                _ => self.take(1, Token::Dot),
            },
            b'\'' | b'"' => self.parse_string(byte)?,
            b'0'..=b'9' => self.parse_number()?,
            _ => self.parse_identifier()?,
        };

        Ok(Some(Spanned::new(token, start, self.pos)))
    }

    #[inline]
    fn take(&mut self, len: usize, token: Token<'input>) -> Token<'input> {
        self.pos += len;
        token
    }

    fn parse_number(&mut self) -> ParseResult<Token<'input>> {
        let start = self.pos;
        while matches!(self.peek_byte(0), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        if self.peek_byte(0) == Some(b'.') && matches!(self.peek_byte(1), Some(b'0'..=b'9')) {
            self.pos += 1;
            while matches!(self.peek_byte(0), Some(b'0'..=b'9')) {
                self.pos += 1;
            }
        }
        if matches!(self.peek_byte(0), Some(b'e' | b'E')) {
            let mut lookahead = 1;
            if matches!(self.peek_byte(1), Some(b'+' | b'-')) {
                lookahead = 2;
            }
            if matches!(self.peek_byte(lookahead), Some(b'0'..=b'9')) {
                self.pos += lookahead;
                while matches!(self.peek_byte(0), Some(b'0'..=b'9')) {
                    self.pos += 1;
                }
            }
        }

        let text = &self.input[start..self.pos];
        text.parse::<f64>()
            .map(Token::Number)
            .map_err(|_| ParseError::InvalidLiteral {
                literal_type: "number".to_string(),
                value: text.to_string(),
                position: start,
            })
    }

    fn parse_string(&mut self, quote: u8) -> ParseResult<Token<'input>> {
        let start = self.pos;
        self.pos += 1;
        let mut value = String::new();

        loop {
            let rest = &self.input[self.pos..];
            let Some(c) = rest.chars().next() else {
                return Err(ParseError::UnclosedString { position: start });
            };
            let escape_pos = self.pos;
            self.pos += c.len_utf8();

            if c as u32 == quote as u32 {
                return Ok(Token::String(value));
            }
            if c != '\\' {
                value.push(c);
                continue;
            }

            let Some(escaped) = self.input[self.pos..].chars().next() else {
                return Err(ParseError::UnclosedString { position: start });
            };
            self.pos += escaped.len_utf8();
            match escaped {
                'n' => value.push('\n'),
                't' => value.push('\t'),
                'r' => value.push('\r'),
                '0' => value.push('\0'),
                '\\' | '\'' | '"' | '/' => value.push(escaped),
                'u' => {
                    let hex = self.input.get(self.pos..self.pos + 4).unwrap_or_default();
                    let decoded = u32::from_str_radix(hex, 16)
                        .ok()
                        .filter(|_| hex.len() == 4)
                        .and_then(char::from_u32);
                    match decoded {
                        Some(ch) => {
                            value.push(ch);
                            self.pos += 4;
                        }
                        None => {
                            return Err(ParseError::InvalidEscape {
                                sequence: format!("\\u{hex}"),
                                position: escape_pos,
                            });
                        }
                    }
                }
                other => {
                    return Err(ParseError::InvalidEscape {
                        sequence: format!("\\{other}"),
                        position: escape_pos,
                    });
                }
            }
        }
    }

    fn parse_identifier(&mut self) -> ParseResult<Token<'input>> {
        let start = self.pos;
        let mut chars = self.input[start..].char_indices();

        match chars.next() {
            Some((_, c)) if is_identifier_start(c) => {}
            Some((_, c)) => {
                return Err(ParseError::UnexpectedToken {
                    token: c.to_string(),
                    position: start,
                });
            }
            None => return Err(ParseError::UnexpectedEndOfInput { position: start }),
        }

        let mut end = self.input.len();
        for (offset, c) in chars {
            if !is_identifier_continue(c) {
                end = start + offset;
                break;
            }
        }
        self.pos = end;

        let text = &self.input[start..end];
        Ok(match text {
            "true" => Token::True,
            "false" => Token::False,
            "null" | "undefined" => Token::Null,
            _ => Token::Identifier(text),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token<'_>> {
        Tokenizer::new(input)
            .tokenize_all()
            .unwrap()
            .into_iter()
            .map(|t| t.value)
            .collect()
    }

    #[test]
    fn test_member_access() {
        assert_eq!(
            tokens("$this.name"),
            vec![Token::Identifier("$this"), Token::Dot, Token::Identifier("name")]
        );
    }

    #[test]
    fn test_equality_operators() {
        assert_eq!(
            tokens("a == b === c != d !== e = f"),
            vec![
                Token::Identifier("a"),
                Token::Equal,
                Token::Identifier("b"),
                Token::StrictEqual,
                Token::Identifier("c"),
                Token::NotEqual,
                Token::Identifier("d"),
                Token::StrictNotEqual,
                Token::Identifier("e"),
                Token::Assign,
                Token::Identifier("f"),
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            tokens(r#"'it\'s' "a\nb" 'A'"#),
            vec![
                Token::String("it's".to_string()),
                Token::String("a\nb".to_string()),
                Token::String("A".to_string()),
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            tokens("1 2.5 .5 1e3"),
            vec![
                Token::Number(1.0),
                Token::Number(2.5),
                Token::Number(0.5),
                Token::Number(1000.0),
            ]
        );
    }

    #[test]
    fn test_keywords() {
        assert_eq!(
            tokens("true false null undefined"),
            vec![Token::True, Token::False, Token::Null, Token::Null]
        );
    }

    #[test]
    fn test_unclosed_string() {
        let err = Tokenizer::new("'abc").tokenize_all().unwrap_err();
        assert_eq!(err, ParseError::UnclosedString { position: 0 });
    }

    #[test]
    fn test_single_pipe_is_rejected() {
        let err = Tokenizer::new("a | b").tokenize_all().unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedToken { position: 2, .. }));
    }

    #[test]
    fn test_spans() {
        let spanned = Tokenizer::new("ab  + 1").tokenize_all().unwrap();
        assert_eq!((spanned[0].start, spanned[0].end), (0, 2));
        assert_eq!((spanned[1].start, spanned[1].end), (4, 5));
        assert_eq!((spanned[2].start, spanned[2].end), (6, 7));
    }
}
