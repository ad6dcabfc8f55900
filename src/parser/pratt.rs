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

//! Pratt parser for binding expressions
//!
//! Operator precedence is data-driven: [`get_precedence`] is the single table
//! the binary-operator loop consults, so adding an operator only requires a
//! token, a table entry and a mapping in [`token_to_binary_op`].

use super::error::{ParseError, ParseResult};
use super::span::Spanned;
use super::tokenizer::{Token, Tokenizer};
use crate::ast::{BinaryOperator, ExpressionNode, LiteralValue, UnaryOperator};
use smallvec::SmallVec;

/// Operator precedence levels (higher = tighter binding)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    /// Lowest precedence - assignment (right associative)
    Assignment = 1,
    /// Ternary conditional (right associative)
    Conditional = 2,
    /// Logical OR
    Or = 3,
    /// Logical AND
    And = 4,
    /// Equality operators (==, !=, ===, !==)
    Equality = 5,
    /// Relational operators (<, >, <=, >=)
    Relational = 6,
    /// Additive operators (+, -)
    Additive = 7,
    /// Multiplicative operators (*, /, %)
    Multiplicative = 8,
    /// Prefix operators (!, -, +)
    Unary = 9,
    /// Member access, indexing and calls
    Postfix = 10,
}

impl Precedence {
    /// Get the next higher precedence level for left-associative operators
    #[inline]
    pub const fn next_level(self) -> Self {
        match self {
            Precedence::Assignment => Precedence::Conditional,
            Precedence::Conditional => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Equality,
            Precedence::Equality => Precedence::Relational,
            Precedence::Relational => Precedence::Additive,
            Precedence::Additive => Precedence::Multiplicative,
            Precedence::Multiplicative => Precedence::Unary,
            Precedence::Unary => Precedence::Postfix,
            Precedence::Postfix => Precedence::Postfix,
        }
    }
}

/// Precedence of a binary operator token
#[inline]
fn get_precedence(token: &Token<'_>) -> Option<Precedence> {
    match token {
        Token::Equal | Token::NotEqual | Token::StrictEqual | Token::StrictNotEqual => {
            Some(Precedence::Equality)
        }
        Token::Plus | Token::Minus => Some(Precedence::Additive),
        Token::AndAnd => Some(Precedence::And),
        Token::OrOr => Some(Precedence::Or),
        Token::Star | Token::Slash | Token::Percent => Some(Precedence::Multiplicative),
        Token::LessThan
        | Token::LessThanOrEqual
        | Token::GreaterThan
        | Token::GreaterThanOrEqual => Some(Precedence::Relational),
        _ => None,
    }
}

/// Convert token to binary operator
#[inline]
fn token_to_binary_op(token: &Token<'_>) -> Option<BinaryOperator> {
    match token {
        Token::Equal => Some(BinaryOperator::Equal),
        Token::NotEqual => Some(BinaryOperator::NotEqual),
        Token::StrictEqual => Some(BinaryOperator::StrictEqual),
        Token::StrictNotEqual => Some(BinaryOperator::StrictNotEqual),
        Token::Plus => Some(BinaryOperator::Add),
        Token::Minus => Some(BinaryOperator::Subtract),
        Token::AndAnd => Some(BinaryOperator::And),
        Token::OrOr => Some(BinaryOperator::Or),
        Token::Star => Some(BinaryOperator::Multiply),
        Token::Slash => Some(BinaryOperator::Divide),
        Token::Percent => Some(BinaryOperator::Modulo),
        Token::LessThan => Some(BinaryOperator::LessThan),
        Token::LessThanOrEqual => Some(BinaryOperator::LessThanOrEqual),
        Token::GreaterThan => Some(BinaryOperator::GreaterThan),
        Token::GreaterThanOrEqual => Some(BinaryOperator::GreaterThanOrEqual),
        _ => None,
    }
}

/// What the Pratt loop does with the token after a complete operand
enum Step {
    Assign,
    Conditional,
    Binary(Precedence, BinaryOperator),
    Stop,
}

/// Deepest expression nesting the parser accepts
pub const MAX_NESTING_DEPTH: usize = 256;

/// Pratt parser over a pre-tokenized expression
pub struct PrattParser<'input> {
    tokens: Vec<Spanned<Token<'input>>>,
    cursor: usize,
    input_len: usize,
    depth: usize,
}

impl<'input> PrattParser<'input> {
    /// Tokenize the input and create a parser over it
    pub fn new(input: &'input str) -> ParseResult<Self> {
        Ok(Self {
            tokens: Tokenizer::new(input).tokenize_all()?,
            cursor: 0,
            input_len: input.len(),
            depth: 0,
        })
    }

    /// Account for one more level of nesting in the tree being built
    fn descend(&mut self) -> ParseResult<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(ParseError::NestingTooDeep {
                limit: MAX_NESTING_DEPTH,
                position: self.position(),
            });
        }
        Ok(())
    }

    #[inline]
    fn current(&self) -> Option<&Token<'input>> {
        self.tokens.get(self.cursor).map(|t| &t.value)
    }

    #[inline]
    fn position(&self) -> usize {
        self.tokens
            .get(self.cursor)
            .map_or(self.input_len, |t| t.start)
    }

    #[inline]
    fn advance(&mut self) -> Option<Token<'input>> {
        let token = self.tokens.get(self.cursor).map(|t| t.value.clone());
        if token.is_some() {
            self.cursor += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token<'static>) -> ParseResult<()> {
        match self.current() {
            Some(token) if *token == expected => {
                self.cursor += 1;
                Ok(())
            }
            Some(_) => Err(ParseError::ExpectedToken {
                expected: format!("'{expected}'"),
                position: self.position(),
            }),
            None => Err(ParseError::UnexpectedEndOfInput {
                position: self.input_len,
            }),
        }
    }

    fn unexpected(&self) -> ParseError {
        match self.tokens.get(self.cursor) {
            Some(token) => ParseError::UnexpectedToken {
                token: token.value.to_string(),
                position: token.start,
            },
            None => ParseError::UnexpectedEndOfInput {
                position: self.input_len,
            },
        }
    }

    /// Parse a complete expression, requiring all input to be consumed
    pub fn parse(mut self) -> ParseResult<ExpressionNode> {
        if self.tokens.is_empty() {
            return Err(ParseError::EmptyExpression);
        }
        let expr = self.parse_expression(Precedence::Assignment)?;
        if self.cursor < self.tokens.len() {
            return Err(self.unexpected());
        }
        Ok(expr)
    }

    fn parse_expression(&mut self, min_precedence: Precedence) -> ParseResult<ExpressionNode> {
        self.descend()?;
        let expr = self.parse_infix(min_precedence)?;
        self.depth -= 1;
        Ok(expr)
    }

    /// Core Pratt loop
    ///
    /// Every fold wraps `left` once more, so folds count toward the depth.
    fn parse_infix(&mut self, min_precedence: Precedence) -> ParseResult<ExpressionNode> {
        let mut left = self.parse_unary()?;
        let mut folds = 0;

        loop {
            let step = match self.current() {
                Some(Token::Assign) if min_precedence <= Precedence::Assignment => Step::Assign,
                Some(Token::Question) if min_precedence <= Precedence::Conditional => {
                    Step::Conditional
                }
                Some(token) => match (get_precedence(token), token_to_binary_op(token)) {
                    (Some(precedence), Some(op)) if precedence >= min_precedence => {
                        Step::Binary(precedence, op)
                    }
                    _ => Step::Stop,
                },
                None => Step::Stop,
            };

            if !matches!(step, Step::Stop) {
                self.descend()?;
                folds += 1;
            }
            match step {
                Step::Assign => {
                    let position = self.position();
                    let ExpressionNode::Identifier(name) = left else {
                        return Err(ParseError::InvalidAssignment { position });
                    };
                    self.cursor += 1;
                    let value = self.parse_expression(Precedence::Assignment)?;
                    left = ExpressionNode::assign(name, value);
                }
                Step::Conditional => {
                    self.cursor += 1;
                    let then_expr = self.parse_expression(Precedence::Assignment)?;
                    self.expect(Token::Colon)?;
                    let else_expr = self.parse_expression(Precedence::Conditional)?;
                    left = ExpressionNode::conditional(left, then_expr, else_expr);
                }
                Step::Binary(precedence, op) => {
                    self.cursor += 1;
                    let right = self.parse_expression(precedence.next_level())?;
                    left = ExpressionNode::binary_op(op, left, right);
                }
                Step::Stop => {
                    self.depth -= folds;
                    return Ok(left);
                }
            }
        }
    }

    fn parse_unary(&mut self) -> ParseResult<ExpressionNode> {
        let op = match self.current() {
            Some(Token::Bang) => UnaryOperator::Not,
            Some(Token::Minus) => UnaryOperator::Negate,
            Some(Token::Plus) => UnaryOperator::Plus,
            _ => {
                let primary = self.parse_primary()?;
                return self.parse_postfix(primary);
            }
        };
        self.cursor += 1;
        self.descend()?;
        let operand = self.parse_unary()?;
        self.depth -= 1;
        Ok(ExpressionNode::unary_op(op, operand))
    }

    fn parse_postfix(&mut self, mut expr: ExpressionNode) -> ParseResult<ExpressionNode> {
        let mut folds = 0;
        loop {
            if matches!(
                self.current(),
                Some(Token::Dot | Token::LeftBracket | Token::LeftParen)
            ) {
                self.descend()?;
                folds += 1;
            }
            match self.current() {
                Some(Token::Dot) => {
                    self.cursor += 1;
                    let name = match self.advance() {
                        Some(Token::Identifier(name)) => name.to_string(),
                        // Keywords are valid property names after a dot
                        Some(Token::True) => "true".to_string(),
                        Some(Token::False) => "false".to_string(),
                        Some(Token::Null) => "null".to_string(),
                        Some(_) => {
                            self.cursor -= 1;
                            return Err(ParseError::ExpectedToken {
                                expected: "property name".to_string(),
                                position: self.position(),
                            });
                        }
                        None => {
                            return Err(ParseError::UnexpectedEndOfInput {
                                position: self.input_len,
                            });
                        }
                    };
                    if self.current() == Some(&Token::LeftParen) {
                        let args = self.parse_arguments()?;
                        expr = ExpressionNode::method_call(expr, name, args);
                    } else {
                        expr = ExpressionNode::member(expr, name);
                    }
                }
                Some(Token::LeftBracket) => {
                    self.cursor += 1;
                    let index = self.parse_expression(Precedence::Assignment)?;
                    self.expect(Token::RightBracket)?;
                    expr = ExpressionNode::index(expr, index);
                }
                Some(Token::LeftParen) => {
                    let position = self.position();
                    let ExpressionNode::Identifier(name) = expr else {
                        return Err(ParseError::UnexpectedToken {
                            token: "(".to_string(),
                            position,
                        });
                    };
                    let args = self.parse_arguments()?;
                    expr = ExpressionNode::function_call(name, args);
                }
                _ => {
                    self.depth -= folds;
                    return Ok(expr);
                }
            }
        }
    }

    fn parse_arguments(&mut self) -> ParseResult<SmallVec<[ExpressionNode; 4]>> {
        self.expect(Token::LeftParen)?;
        let mut args = SmallVec::new();
        if self.current() == Some(&Token::RightParen) {
            self.cursor += 1;
            return Ok(args);
        }
        loop {
            args.push(self.parse_expression(Precedence::Assignment)?);
            match self.current() {
                Some(Token::Comma) => self.cursor += 1,
                Some(Token::RightParen) => {
                    self.cursor += 1;
                    return Ok(args);
                }
                _ => return Err(self.unexpected()),
            }
        }
    }

    fn parse_primary(&mut self) -> ParseResult<ExpressionNode> {
        let position = self.position();
        let Some(token) = self.advance() else {
            return Err(ParseError::UnexpectedEndOfInput {
                position: self.input_len,
            });
        };

        match token {
            Token::Number(n) => Ok(ExpressionNode::literal(LiteralValue::number(n))),
            Token::String(s) => Ok(ExpressionNode::literal(LiteralValue::String(s))),
            Token::True => Ok(ExpressionNode::literal(LiteralValue::Boolean(true))),
            Token::False => Ok(ExpressionNode::literal(LiteralValue::Boolean(false))),
            Token::Null => Ok(ExpressionNode::literal(LiteralValue::Null)),
            Token::Identifier(name) => Ok(ExpressionNode::identifier(name)),
            Token::LeftParen => {
                let inner = self.parse_expression(Precedence::Assignment)?;
                self.expect(Token::RightParen)?;
                Ok(inner)
            }
            Token::LeftBracket => self.parse_array(),
            Token::LeftBrace => self.parse_object(),
            other => Err(ParseError::UnexpectedToken {
                token: other.to_string(),
                position,
            }),
        }
    }

    fn parse_array(&mut self) -> ParseResult<ExpressionNode> {
        let mut items = Vec::new();
        loop {
            if self.current() == Some(&Token::RightBracket) {
                self.cursor += 1;
                return Ok(ExpressionNode::Array(items));
            }
            items.push(self.parse_expression(Precedence::Assignment)?);
            match self.current() {
                Some(Token::Comma) => self.cursor += 1,
                Some(Token::RightBracket) => {}
                _ => return Err(self.unexpected()),
            }
        }
    }

    fn parse_object(&mut self) -> ParseResult<ExpressionNode> {
        let mut entries = Vec::new();
        loop {
            let key = match self.advance() {
                Some(Token::RightBrace) => return Ok(ExpressionNode::Object(entries)),
                Some(Token::Identifier(name)) => name.to_string(),
                Some(Token::String(s)) => s,
                Some(Token::Number(n)) => n.to_string(),
                Some(_) => {
                    self.cursor -= 1;
                    return Err(ParseError::ExpectedToken {
                        expected: "object key".to_string(),
                        position: self.position(),
                    });
                }
                None => {
                    return Err(ParseError::UnexpectedEndOfInput {
                        position: self.input_len,
                    });
                }
            };
            self.expect(Token::Colon)?;
            let value = self.parse_expression(Precedence::Assignment)?;
            entries.push((key, value));
            match self.current() {
                Some(Token::Comma) => self.cursor += 1,
                Some(Token::RightBrace) => {}
                _ => return Err(self.unexpected()),
            }
        }
    }
}

/// Parse an expression string into an AST
pub fn parse_expression_pratt(input: &str) -> ParseResult<ExpressionNode> {
    PrattParser::new(input)?.parse()
}
