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

//! Application of `values`, `data` and `content` results to a node

use crate::annotation::LabeledEvaluators;
use crate::evaluator::EvalContext;
use crate::model::ValueExt;
use crate::tree::Tree;
use serde_json::{Map, Value};

/// Label prefix binding a context variable
pub const VARIABLE_MARKER: char = '$';
/// Label prefix assigning a node property path
pub const PROPERTY_MARKER: char = '.';
/// Separator of property path segments
pub const PATH_SEPARATOR: char = '.';

/// Evaluate a `values` list and apply each result
pub fn apply_values<T: Tree>(
    tree: &mut T,
    node: &T::Node,
    context: &mut EvalContext,
    values: &LabeledEvaluators,
) {
    for (label, evaluator) in values {
        let value = context.execute(evaluator);
        if label.starts_with(VARIABLE_MARKER) {
            context.set_variable(label.clone(), value);
        } else if let Some(path) = label.strip_prefix(PROPERTY_MARKER) {
            assign_path(tree.properties_mut(node), path, value);
        } else if !label.is_empty() {
            set_attribute_value(tree, node, label, &value);
        }
    }
}

/// Evaluate a `vars` list into context variables
pub fn apply_vars(context: &mut EvalContext, vars: &LabeledEvaluators) {
    for (label, evaluator) in vars {
        let value = context.execute(evaluator);
        context.set_variable(label.clone(), value);
    }
}

/// Evaluate a `data` list into the node's auxiliary store
pub fn apply_data<T: Tree>(
    tree: &mut T,
    node: &T::Node,
    context: &mut EvalContext,
    data: &LabeledEvaluators,
) {
    for (label, evaluator) in data {
        let value = context.execute(evaluator);
        tree.data_mut(node).insert(label.clone(), value);
    }
}

/// Set an attribute following the HTML boolean-attribute convention
pub fn set_attribute_value<T: Tree>(tree: &mut T, node: &T::Node, name: &str, value: &Value) {
    match value {
        Value::Bool(true) => tree.set_attribute(node, name, name),
        Value::Bool(false) => tree.remove_attribute(node, name),
        other => tree.set_attribute(node, name, &other.to_display_string()),
    }
}

/// Assign `value` at a dotted `path`, creating intermediate objects
///
/// Intermediate entries that are missing, falsy or not objects are replaced
/// with empty objects.
pub fn assign_path(target: &mut Map<String, Value>, path: &str, value: Value) {
    let mut segments = path.split(PATH_SEPARATOR).peekable();
    let mut current = target;
    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            current.insert(segment.to_string(), value);
            return;
        }
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(next) = entry else {
            return;
        };
        current = next;
    }
}

/// Write evaluated content into `node`
///
/// Nothing happens when the serialized content already equals the new text.
/// With `clear` unset the existing content is kept. Strings starting with `<`
/// are inserted as markup, everything else as text.
pub fn apply_content<T: Tree>(tree: &mut T, node: &T::Node, value: &Value, clear: bool) {
    let text = value.to_display_string();
    if tree.inner_markup(node) == text {
        return;
    }
    if !clear {
        return;
    }
    tree.clear_children(node);
    if text.is_empty() {
        return;
    }
    if value.is_string() && text.trim_start().starts_with('<') {
        match tree.append_markup(node, &text) {
            Ok(()) => return,
            Err(err) => log::debug!("Content is not markup, inserting as text: {err}"),
        }
    }
    tree.append_text(node, &text);
}
