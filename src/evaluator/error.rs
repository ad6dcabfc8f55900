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

//! Expression evaluation errors

use crate::registry::FunctionError;
use thiserror::Error;

/// Result type for expression evaluation
pub type EvaluationResult<T> = Result<T, EvaluationError>;

/// Errors raised while executing a compiled expression
///
/// None of these abort a render: the failing binding degrades to the
/// `$default` value.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvaluationError {
    /// Identifier is neither a variable nor a property of the current data
    #[error("{name} is not defined")]
    UnresolvedReference {
        /// Identifier name
        name: String,
    },

    /// Operation applied to a value of the wrong type
    #[error("Type error: {message}")]
    TypeError {
        /// Error message
        message: String,
    },

    /// Call to a function the registry does not know
    #[error("Unknown function: {name}")]
    UnknownFunction {
        /// Function name
        name: String,
    },

    /// Function call error
    #[error(transparent)]
    Function(#[from] FunctionError),

    /// Expression source that failed to compile
    #[error("Expression '{expression}' failed to compile")]
    CompileFailed {
        /// Source text
        expression: String,
    },

    /// Invalid operation
    #[error("Invalid operation: {message}")]
    InvalidOperation {
        /// Error message
        message: String,
    },
}

impl EvaluationError {
    /// Whether this is the missing-name flavour, which logs quietly
    pub fn is_unresolved_reference(&self) -> bool {
        matches!(self, EvaluationError::UnresolvedReference { .. })
    }

    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        EvaluationError::TypeError {
            message: message.into(),
        }
    }
}
