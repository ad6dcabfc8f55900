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

//! Function registration and dispatch

use rustc_hash::FxHashMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Result type for function calls
pub type FunctionResult<T> = Result<T, FunctionError>;

/// Function call errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FunctionError {
    /// Invalid number of arguments
    #[error("Function '{name}' expects {min}-{} arguments, got {actual}", max.map_or("∞".to_string(), |n| n.to_string()))]
    InvalidArity {
        /// Function name
        name: String,
        /// Minimum arguments
        min: usize,
        /// Maximum arguments (None for unlimited)
        max: Option<usize>,
        /// Actual arguments provided
        actual: usize,
    },

    /// Invalid argument type
    #[error("Function '{name}' argument {index} expects {expected}, got {actual}")]
    InvalidArgumentType {
        /// Function name
        name: String,
        /// Argument index
        index: usize,
        /// Expected type
        expected: String,
        /// Actual type
        actual: String,
    },

    /// Runtime evaluation error
    #[error("Function '{name}' evaluation error: {message}")]
    EvaluationError {
        /// Function name
        name: String,
        /// Error message
        message: String,
    },
}

/// Host function implementation
pub type FunctionImpl = Arc<dyn Fn(&[Value]) -> FunctionResult<Value> + Send + Sync>;

#[derive(Clone)]
struct RegisteredFunction {
    min_arity: usize,
    max_arity: Option<usize>,
    implementation: FunctionImpl,
}

/// Registry of callable functions, keyed by name
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: FxHashMap<String, RegisteredFunction>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("FunctionRegistry")
            .field("functions", &names)
            .finish()
    }
}

impl FunctionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function accepting `min..=max` arguments (`None` = unbounded)
    ///
    /// Registering an existing name replaces the previous implementation.
    pub fn register<F>(&mut self, name: impl Into<String>, min: usize, max: Option<usize>, f: F)
    where
        F: Fn(&[Value]) -> FunctionResult<Value> + Send + Sync + 'static,
    {
        self.functions.insert(
            name.into(),
            RegisteredFunction {
                min_arity: min,
                max_arity: max,
                implementation: Arc::new(f),
            },
        );
    }

    /// Check if a function is registered
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Number of registered functions
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Whether no function is registered
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Call a function by name; `None` when the name is unknown
    pub fn call(&self, name: &str, args: &[Value]) -> Option<FunctionResult<Value>> {
        let entry = self.functions.get(name)?;
        let actual = args.len();
        if actual < entry.min_arity || entry.max_arity.is_some_and(|max| actual > max) {
            return Some(Err(FunctionError::InvalidArity {
                name: name.to_string(),
                min: entry.min_arity,
                max: entry.max_arity,
                actual,
            }));
        }
        Some((entry.implementation)(args))
    }
}
