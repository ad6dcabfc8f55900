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

//! Extension methods on template data values

use serde_json::{Number, Value};

/// Build a JSON number from a float, keeping integral values integral
///
/// `NaN` and infinities have no JSON representation and become `null`.
pub fn number_value(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
        Value::Number(Number::from(value as i64))
    } else {
        Number::from_f64(value).map_or(Value::Null, Value::Number)
    }
}

/// JavaScript-flavoured queries on [`Value`]
pub trait ValueExt {
    /// Truthiness: `null`, `false`, `0`, `NaN` and `""` are falsy
    fn is_truthy(&self) -> bool;

    /// Whether the value is list-like and should multiply a node
    fn is_list_like(&self) -> bool;

    /// Type name used in error messages
    fn type_name(&self) -> &'static str;

    /// Textual rendering used for content and attribute values
    fn to_display_string(&self) -> String;

    /// Length of a string (in chars) or array
    fn js_length(&self) -> Option<usize>;
}

impl ValueExt for Value {
    fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) => true,
        }
    }

    fn is_list_like(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    fn to_display_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(n),
            Value::String(s) => s.clone(),
            Value::Array(items) => items
                .iter()
                .map(|item| item.to_display_string())
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(_) => self.to_string(),
        }
    }

    fn js_length(&self) -> Option<usize> {
        match self {
            Value::String(s) => Some(s.chars().count()),
            Value::Array(items) => Some(items.len()),
            _ => None,
        }
    }
}

fn format_number(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < 1e21 => format!("{f:.0}"),
        Some(f) => f.to_string(),
        None => n.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!json!(false).is_truthy());
        assert!(!json!(0).is_truthy());
        assert!(!json!(0.0).is_truthy());
        assert!(!json!("").is_truthy());
        assert!(json!("0").is_truthy());
        assert!(json!([]).is_truthy());
        assert!(json!({}).is_truthy());
        assert!(json!(-1).is_truthy());
    }

    #[test]
    fn test_display_string() {
        assert_eq!(Value::Null.to_display_string(), "");
        assert_eq!(json!(3).to_display_string(), "3");
        assert_eq!(json!(2.5).to_display_string(), "2.5");
        assert_eq!(json!(true).to_display_string(), "true");
        assert_eq!(json!("red").to_display_string(), "red");
        assert_eq!(json!([1, "a", null]).to_display_string(), "1,a,");
        assert_eq!(json!({"a": 1}).to_display_string(), r#"{"a":1}"#);
    }

    #[test]
    fn test_number_value_keeps_integers_integral() {
        assert_eq!(number_value(3.0), json!(3));
        assert_eq!(number_value(-2.0), json!(-2));
        assert_eq!(number_value(0.25), json!(0.25));
        assert_eq!(number_value(f64::NAN), Value::Null);
    }

    #[test]
    fn test_length() {
        assert_eq!(json!("héllo").js_length(), Some(5));
        assert_eq!(json!([1, 2]).js_length(), Some(2));
        assert_eq!(json!(1).js_length(), None);
    }
}
