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

//! Errors raised while parsing binding expressions
//!
//! Positions are byte offsets into the attribute value holding the expression.

use thiserror::Error;

/// Result of parsing an expression
pub type ParseResult<T> = Result<T, ParseError>;

/// Reason an expression source failed to parse
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// A token that cannot appear here
    #[error("Unexpected token '{token}' at position {position}")]
    UnexpectedToken {
        /// Offending token as written
        token: String,
        /// Byte offset of the token
        position: usize,
    },

    /// A required token is missing
    #[error("Expected {expected} at position {position}")]
    ExpectedToken {
        /// What the parser was looking for
        expected: String,
        /// Byte offset where it was expected
        position: usize,
    },

    /// Source ended mid-expression
    #[error("Unexpected end of input at position {position}")]
    UnexpectedEndOfInput {
        /// Length of the source
        position: usize,
    },

    /// Malformed number literal
    #[error("Invalid {literal_type} literal at position {position}: {value}")]
    InvalidLiteral {
        /// Literal kind
        literal_type: String,
        /// Literal text
        value: String,
        /// Byte offset of the literal
        position: usize,
    },

    /// Unknown `\` escape in a string literal
    #[error("Invalid escape sequence at position {position}: {sequence}")]
    InvalidEscape {
        /// Escape as written
        sequence: String,
        /// Byte offset of the backslash
        position: usize,
    },

    /// String literal without its closing quote
    #[error("Unclosed string literal starting at position {position}")]
    UnclosedString {
        /// Byte offset of the opening quote
        position: usize,
    },

    /// Assignment to something that is not a variable
    #[error("Invalid assignment target at position {position}")]
    InvalidAssignment {
        /// Position of the `=` token
        position: usize,
    },

    /// Nesting beyond what the parser accepts
    #[error("Expression nesting exceeds {limit} levels at position {position}")]
    NestingTooDeep {
        /// Maximum accepted depth
        limit: usize,
        /// Byte offset where the limit was hit
        position: usize,
    },

    /// Empty expression source
    #[error("Empty expression")]
    EmptyExpression,
}

impl ParseError {
    /// Position in the source the error refers to, when known
    pub fn position(&self) -> Option<usize> {
        match self {
            Self::UnexpectedToken { position, .. }
            | Self::ExpectedToken { position, .. }
            | Self::UnexpectedEndOfInput { position }
            | Self::InvalidLiteral { position, .. }
            | Self::InvalidEscape { position, .. }
            | Self::UnclosedString { position }
            | Self::InvalidAssignment { position }
            | Self::NestingTooDeep { position, .. } => Some(*position),
            Self::EmptyExpression => None,
        }
    }
}
