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

//! Error types for template rendering
//!
//! Per-binding failures (parse and evaluation errors) are contained at the
//! binding boundary and never abort a render. The only error that reaches the
//! caller of a render is a template lookup that was asserted to succeed.

use thiserror::Error;

use crate::evaluator::EvaluationError;
use crate::parser::ParseError;

/// Result type alias for template operations
pub type TemplateResult<T> = std::result::Result<T, TemplateError>;

/// Top-level error type of the engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TemplateError {
    /// Malformed expression source
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Runtime failure while executing a compiled expression
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    /// A template that the caller asserted must exist was not found
    #[error("Template '{reference}' not found")]
    TemplateNotFound {
        /// The identity that was looked up
        reference: String,
    },

    /// Markup handed to the tree could not be parsed
    #[error("Invalid markup at offset {offset}: {message}")]
    Markup {
        /// Byte offset into the markup text
        offset: usize,
        /// Human-readable error message
        message: String,
    },

    /// A per-node callback reported a failure
    #[error("Callback error: {message}")]
    Callback {
        /// Human-readable error message
        message: String,
    },
}

impl TemplateError {
    /// Create a callback error from any displayable message
    pub fn callback(message: impl Into<String>) -> Self {
        Self::Callback {
            message: message.into(),
        }
    }

    /// Create a template-not-found error
    pub fn template_not_found(reference: impl Into<String>) -> Self {
        Self::TemplateNotFound {
            reference: reference.into(),
        }
    }
}
