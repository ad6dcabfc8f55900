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

//! Scoped evaluation context
//!
//! A context holds the current data value and a flat variable table. A child
//! context starts with a copy of its parent's table; a root context starts
//! with a copy of the engine globals. Table entries are reference-counted, so
//! the copy shares every inherited value, `$top` included, and costs one
//! pointer per variable. Variables always take precedence over properties of
//! the data when resolving identifiers.

use super::error::{EvaluationError, EvaluationResult};
use super::interpreter::Interpreter;
use crate::compiler::Evaluator;
use crate::parser;
use crate::registry::FunctionRegistry;
use rustc_hash::FxHashMap;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Variable holding the current data value
pub const VAR_THIS: &str = "$this";
/// Variable holding the root data value
pub const VAR_TOP: &str = "$top";
/// Variable holding the position of a list item
pub const VAR_INDEX: &str = "$index";
/// Variable holding the length of the list being iterated
pub const VAR_LENGTH: &str = "$length";
/// Name resolving to a snapshot of the active context
pub const VAR_CONTEXT: &str = "$context";
/// Global substituted for any failed evaluation
pub const VAR_DEFAULT: &str = "$default";

/// Global variable table type
pub type VarMap = FxHashMap<String, Value>;

type Scope = FxHashMap<Arc<str>, Arc<Value>>;

/// Evaluation context for one node visit or list item
#[derive(Clone)]
pub struct EvalContext {
    vars: Scope,
    data: Arc<Value>,
    functions: Arc<FunctionRegistry>,
}

impl std::fmt::Debug for EvalContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvalContext")
            .field("vars", &self.vars)
            .field("data", &self.data)
            .finish()
    }
}

impl EvalContext {
    /// Create a root context over `data`, seeded with `globals`
    ///
    /// Sets `$this` and `$top` to `data`.
    pub fn root(data: Value, globals: &VarMap, functions: Arc<FunctionRegistry>) -> Self {
        let mut context = Self::empty(functions);
        context.reset_root(data, globals);
        context
    }

    /// Create a child of `parent` over `data`
    ///
    /// The child copies the parent's variables (including `$top`) and rebinds
    /// `$this`.
    pub fn child(data: Value, parent: &EvalContext) -> Self {
        let mut context = Self::empty(Arc::clone(&parent.functions));
        context.reset_child(data, parent);
        context
    }

    /// Create a list-item child carrying `$index` and `$length`
    pub fn clone_item(&self, item: Value, index: usize, count: usize) -> Self {
        let mut context = Self::child(item, self);
        context.set_position(index, count);
        context
    }

    pub(crate) fn empty(functions: Arc<FunctionRegistry>) -> Self {
        Self {
            vars: Scope::default(),
            data: Arc::new(Value::String(String::new())),
            functions,
        }
    }

    pub(crate) fn reset_root(&mut self, data: Value, globals: &VarMap) {
        self.vars.clear();
        self.vars.extend(
            globals
                .iter()
                .map(|(k, v)| (Arc::from(k.as_str()), Arc::new(v.clone()))),
        );
        let data = Arc::new(data);
        self.vars.insert(Arc::from(VAR_TOP), Arc::clone(&data));
        self.bind_data(data);
    }

    pub(crate) fn reset_child(&mut self, data: Value, parent: &EvalContext) {
        self.vars.clone_from(&parent.vars);
        self.functions = Arc::clone(&parent.functions);
        self.bind_data(Arc::new(data));
    }

    pub(crate) fn set_position(&mut self, index: usize, count: usize) {
        self.set_variable(VAR_INDEX, Value::from(index));
        self.set_variable(VAR_LENGTH, Value::from(count));
    }

    /// Drop all variables and detach the data
    pub(crate) fn clear(&mut self) {
        self.vars.clear();
        self.data = Arc::new(Value::Null);
    }

    fn bind_data(&mut self, data: Arc<Value>) {
        self.vars.insert(Arc::from(VAR_THIS), Arc::clone(&data));
        self.data = if data.is_null() {
            Arc::new(Value::String(String::new()))
        } else {
            data
        };
    }

    /// Current data value (`""` when rendered with `null`)
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Look up a variable
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.vars.get(name).map(|value| &**value)
    }

    /// Bind a variable in this context
    pub fn set_variable(&mut self, name: impl Into<Arc<str>>, value: Value) {
        self.vars.insert(name.into(), Arc::new(value));
    }

    /// Names and values of every variable visible in this context
    pub fn variables(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.vars.iter().map(|(name, value)| (&**name, &**value))
    }

    /// Functions callable from expressions
    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    /// The `$default` value substituted on evaluation failure
    pub fn default_value(&self) -> Value {
        self.variable(VAR_DEFAULT).cloned().unwrap_or(Value::Null)
    }

    /// JSON snapshot of the context: every variable plus `data`
    pub fn snapshot(&self) -> Value {
        let mut entries: Vec<(&str, &Value)> = self.variables().collect();
        entries.sort_unstable_by_key(|(name, _)| *name);
        let mut map = Map::new();
        for (name, value) in entries {
            map.insert(name.to_string(), value.clone());
        }
        map.insert("data".to_string(), Value::clone(&self.data));
        Value::Object(map)
    }

    /// Run an evaluator, propagating any error
    pub fn try_execute(&mut self, evaluator: &Evaluator) -> EvaluationResult<Value> {
        match evaluator {
            Evaluator::Compiled(compiled) => Interpreter::new(self).evaluate(&compiled.ast),
            Evaluator::Invalid(source) => Err(EvaluationError::CompileFailed {
                expression: source.to_string(),
            }),
        }
    }

    /// Run an evaluator, substituting `$default` for any error
    pub fn execute(&mut self, evaluator: &Evaluator) -> Value {
        match self.try_execute(evaluator) {
            Ok(value) => value,
            Err(err) => {
                if err.is_unresolved_reference() || matches!(err, EvaluationError::CompileFailed { .. }) {
                    log::debug!("Expression '{}' degraded to default: {err}", evaluator.source());
                } else {
                    log::warn!("Expression '{}' failed: {err}", evaluator.source());
                }
                self.default_value()
            }
        }
    }

    /// Parse and execute `source` in this context
    ///
    /// Bypasses the compiled-expression cache; intended for callbacks and
    /// host code.
    pub fn evaluate_expression(&mut self, source: &str) -> Value {
        let evaluator = match parser::parse(source) {
            Ok(ast) => Evaluator::compiled(source, ast),
            Err(err) => {
                log::warn!("Failed to compile expression '{source}': {err}");
                Evaluator::Invalid(Arc::from(source))
            }
        };
        self.execute(&evaluator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::create_standard_registry;
    use serde_json::json;

    fn globals() -> VarMap {
        let mut globals = VarMap::default();
        globals.insert(VAR_DEFAULT.to_string(), json!("n/a"));
        globals
    }

    fn root(data: Value) -> EvalContext {
        EvalContext::root(data, &globals(), Arc::new(create_standard_registry()))
    }

    #[test]
    fn test_root_sets_this_and_top() {
        let ctx = root(json!({"a": 1}));
        assert_eq!(ctx.variable(VAR_THIS), Some(&json!({"a": 1})));
        assert_eq!(ctx.variable(VAR_TOP), Some(&json!({"a": 1})));
        assert_eq!(ctx.variable(VAR_DEFAULT), Some(&json!("n/a")));
    }

    #[test]
    fn test_null_data_becomes_empty_string() {
        let ctx = root(Value::Null);
        assert_eq!(ctx.data(), &json!(""));
        assert_eq!(ctx.variable(VAR_THIS), Some(&Value::Null));
    }

    #[test]
    fn test_child_inherits_variables_and_top() {
        let mut parent = root(json!({"a": 1}));
        parent.set_variable("x", json!(5));
        let child = parent.clone_item(json!("item"), 2, 3);

        assert_eq!(child.variable("x"), Some(&json!(5)));
        assert_eq!(child.variable(VAR_TOP), Some(&json!({"a": 1})));
        assert_eq!(child.variable(VAR_THIS), Some(&json!("item")));
        assert_eq!(child.variable(VAR_INDEX), Some(&json!(2)));
        assert_eq!(child.variable(VAR_LENGTH), Some(&json!(3)));
        assert_eq!(parent.variable(VAR_INDEX), None);
    }

    #[test]
    fn test_child_variables_do_not_leak_to_parent() {
        let parent = root(json!({}));
        let mut child = EvalContext::child(json!({}), &parent);
        child.set_variable("local", json!(true));
        assert_eq!(parent.variable("local"), None);
    }

    #[test]
    fn test_children_share_inherited_values() {
        let items: Vec<Value> = (0..10_000).map(|i| json!({"n": i})).collect();
        let parent = root(json!({"items": items}));
        let children: Vec<EvalContext> = (0..10_000)
            .map(|i| parent.clone_item(json!(i), i, 10_000))
            .collect();

        let top = &parent.vars[VAR_TOP];
        for child in &children {
            assert!(Arc::ptr_eq(top, &child.vars[VAR_TOP]));
        }
        assert_eq!(children[42].variable(VAR_THIS), Some(&json!(42)));
    }

    #[test]
    fn test_execute_substitutes_default() {
        let mut ctx = root(json!({"a": 1}));
        assert_eq!(ctx.evaluate_expression("a + 1"), json!(2));
        assert_eq!(ctx.evaluate_expression("missing"), json!("n/a"));
        assert_eq!(ctx.evaluate_expression("a.b.c"), json!("n/a"));
        assert_eq!(ctx.evaluate_expression("a +"), json!("n/a"));
    }

    #[test]
    fn test_snapshot_contains_data_and_variables() {
        let ctx = root(json!({"a": 1}));
        let snapshot = ctx.snapshot();
        assert_eq!(snapshot["data"], json!({"a": 1}));
        assert_eq!(snapshot[VAR_THIS], json!({"a": 1}));
    }
}
