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

//! Built-in functions

use super::function::{FunctionError, FunctionRegistry, FunctionResult};
use crate::model::ValueExt;
use serde_json::Value;

/// Register the built-in function set
pub fn register_builtin_functions(registry: &mut FunctionRegistry) {
    registry.register("len", 1, Some(1), len);
    registry.register("join", 1, Some(2), join);
    registry.register("upper", 1, Some(1), |args| {
        Ok(Value::String(args[0].to_display_string().to_uppercase()))
    });
    registry.register("lower", 1, Some(1), |args| {
        Ok(Value::String(args[0].to_display_string().to_lowercase()))
    });
    registry.register("trim", 1, Some(1), |args| {
        Ok(Value::String(args[0].to_display_string().trim().to_string()))
    });
    registry.register("str", 1, Some(1), |args| {
        Ok(Value::String(args[0].to_display_string()))
    });
    registry.register("json", 1, Some(1), |args| Ok(Value::String(args[0].to_string())));
    registry.register("keys", 1, Some(1), keys);
}

fn len(args: &[Value]) -> FunctionResult<Value> {
    match &args[0] {
        Value::Object(map) => Ok(Value::from(map.len())),
        Value::Null => Ok(Value::from(0)),
        other => other
            .js_length()
            .map(Value::from)
            .ok_or_else(|| type_mismatch("len", 0, "string, array or object", other)),
    }
}

fn join(args: &[Value]) -> FunctionResult<Value> {
    let separator = args
        .get(1)
        .map_or_else(|| ",".to_string(), ValueExt::to_display_string);
    match &args[0] {
        Value::Array(items) => Ok(Value::String(
            items
                .iter()
                .map(ValueExt::to_display_string)
                .collect::<Vec<_>>()
                .join(&separator),
        )),
        other => Err(type_mismatch("join", 0, "array", other)),
    }
}

fn keys(args: &[Value]) -> FunctionResult<Value> {
    match &args[0] {
        Value::Object(map) => Ok(Value::Array(
            map.keys().map(|k| Value::String(k.clone())).collect(),
        )),
        Value::Array(items) => Ok(Value::Array((0..items.len()).map(Value::from).collect())),
        other => Err(type_mismatch("keys", 0, "object or array", other)),
    }
}

fn type_mismatch(name: &str, index: usize, expected: &str, actual: &Value) -> FunctionError {
    FunctionError::InvalidArgumentType {
        name: name.to_string(),
        index,
        expected: expected.to_string(),
        actual: actual.type_name().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use crate::registry::create_standard_registry;
    use rstest::rstest;
    use serde_json::{Value, json};

    #[rstest]
    #[case("len", vec![json!("abc")], json!(3))]
    #[case("len", vec![json!([1, 2])], json!(2))]
    #[case("len", vec![json!({"a": 1})], json!(1))]
    #[case("join", vec![json!(["a", "b"])], json!("a,b"))]
    #[case("join", vec![json!([1, 2]), json!(" - ")], json!("1 - 2"))]
    #[case("upper", vec![json!("red")], json!("RED"))]
    #[case("lower", vec![json!("RED")], json!("red"))]
    #[case("trim", vec![json!("  x ")], json!("x"))]
    #[case("str", vec![json!(4)], json!("4"))]
    #[case("str", vec![Value::Null], json!(""))]
    #[case("json", vec![json!({"a": [1]})], json!(r#"{"a":[1]}"#))]
    #[case("keys", vec![json!({"b": 1, "a": 2})], json!(["b", "a"]))]
    fn test_builtins(#[case] name: &str, #[case] args: Vec<Value>, #[case] expected: Value) {
        let registry = create_standard_registry();
        assert_eq!(registry.call(name, &args), Some(Ok(expected)));
    }

    #[test]
    fn test_join_rejects_non_array() {
        let registry = create_standard_registry();
        assert!(matches!(registry.call("join", &[json!(1)]), Some(Err(_))));
    }
}
