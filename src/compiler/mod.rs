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

//! Expression compilation and caching
//!
//! Every distinct source text is parsed once per compiler. Binding attributes
//! come in three shapes: a single expression, a `label=expr | ...` list and an
//! `expr; expr` sequence.

mod lists;

pub use lists::{split_list, split_sequence};

use crate::ast::ExpressionNode;
use crate::parser;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A parsed expression together with its source text
#[derive(Debug, PartialEq)]
pub struct CompiledExpression {
    /// Source text the expression was parsed from
    pub source: String,
    /// Parsed expression tree
    pub ast: ExpressionNode,
}

/// Callable form of an expression
///
/// Cloning is cheap: both variants are reference counted.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluator {
    /// Successfully parsed expression
    Compiled(Arc<CompiledExpression>),
    /// Source that failed to parse; always evaluates to `$default`
    Invalid(Arc<str>),
}

impl Evaluator {
    /// Wrap a parsed expression
    pub fn compiled(source: &str, ast: ExpressionNode) -> Self {
        Evaluator::Compiled(Arc::new(CompiledExpression {
            source: source.to_string(),
            ast,
        }))
    }

    /// Source text of the expression
    pub fn source(&self) -> &str {
        match self {
            Evaluator::Compiled(compiled) => &compiled.source,
            Evaluator::Invalid(source) => source,
        }
    }

    /// Whether the source parsed
    pub fn is_valid(&self) -> bool {
        matches!(self, Evaluator::Compiled(_))
    }

    /// Whether two evaluators share the same allocation
    pub fn ptr_eq(&self, other: &Evaluator) -> bool {
        match (self, other) {
            (Evaluator::Compiled(a), Evaluator::Compiled(b)) => Arc::ptr_eq(a, b),
            (Evaluator::Invalid(a), Evaluator::Invalid(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// What to do with source text that fails to parse
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompileFailurePolicy {
    /// Re-attempt compilation every time the source is requested
    Retry,
    /// Remember the failure and skip the source from then on
    #[default]
    CacheFailure,
}

/// Hit/miss statistics for a cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses
    pub misses: u64,
    /// Number of entries currently cached
    pub entries: usize,
}

impl CacheStats {
    /// Calculate cache hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            (self.hits as f64) / ((self.hits + self.misses) as f64) * 100.0
        }
    }
}

/// Compiler with a cache keyed by exact source text
#[derive(Debug, Default)]
pub struct ExpressionCompiler {
    cache: FxHashMap<String, Evaluator>,
    policy: CompileFailurePolicy,
    hits: u64,
    misses: u64,
}

impl ExpressionCompiler {
    /// Create a compiler with the default failure policy
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a compiler with an explicit failure policy
    pub fn with_policy(policy: CompileFailurePolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Compile a single expression
    pub fn compile(&mut self, source: &str) -> Evaluator {
        if let Some(evaluator) = self.cache.get(source) {
            self.hits += 1;
            return evaluator.clone();
        }
        self.misses += 1;

        let evaluator = match parser::parse(source) {
            Ok(ast) => Evaluator::compiled(source, ast),
            Err(err) => {
                log::warn!("Failed to compile expression '{source}': {err}");
                Evaluator::Invalid(Arc::from(source))
            }
        };
        if evaluator.is_valid() || self.policy == CompileFailurePolicy::CacheFailure {
            self.cache.insert(source.to_string(), evaluator.clone());
        }
        evaluator
    }

    /// Compile a `label=expr | label=expr` list
    ///
    /// Tokens without `=` are skipped. Labels are trimmed.
    pub fn compile_list(&mut self, source: &str) -> Vec<(String, Evaluator)> {
        split_list(source)
            .into_iter()
            .filter_map(|token| {
                let (label, expr) = token.split_once('=')?;
                Some((label.trim().to_string(), self.compile(expr)))
            })
            .collect()
    }

    /// Compile an `expr; expr` sequence, skipping empty statements
    pub fn compile_sequence(&mut self, source: &str) -> Vec<Evaluator> {
        split_sequence(source)
            .into_iter()
            .map(|statement| self.compile(statement))
            .collect()
    }

    /// Cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.cache.len(),
        }
    }

    /// Clear all cached entries and reset statistics
    pub fn clear(&mut self) {
        self.cache.clear();
        self.hits = 0;
        self.misses = 0;
    }
}
