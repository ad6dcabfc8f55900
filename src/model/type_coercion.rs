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

//! Type coercion and comparison utilities
//!
//! Mirrors the loose JavaScript rules templates are written against: `+`
//! concatenates as soon as one side is a string, relational operators compare
//! strings lexically and everything else numerically.

use super::value::{ValueExt, number_value};
use serde_json::Value;
use std::cmp::Ordering;

/// Type coercion utility for template values
pub struct TypeCoercion;

impl TypeCoercion {
    /// Coerce a value to a number (`NaN` when not convertible)
    pub fn to_number(value: &Value) -> f64 {
        match value {
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse::<f64>().unwrap_or(f64::NAN)
                }
            }
            Value::Array(items) => match items.as_slice() {
                [] => 0.0,
                [single] => Self::to_number(single),
                _ => f64::NAN,
            },
            Value::Object(_) => f64::NAN,
        }
    }

    /// `+`: string concatenation when either side is a string, else addition
    pub fn add(left: &Value, right: &Value) -> Value {
        if left.is_string() || right.is_string() {
            let mut text = left.to_display_string();
            text.push_str(&right.to_display_string());
            Value::String(text)
        } else {
            number_value(Self::to_number(left) + Self::to_number(right))
        }
    }

    /// Numeric binary operation with JSON-safe result
    pub fn arithmetic(left: &Value, right: &Value, op: impl Fn(f64, f64) -> f64) -> Value {
        number_value(op(Self::to_number(left), Self::to_number(right)))
    }

    /// `===`: same type and same value
    pub fn strict_equals(left: &Value, right: &Value) -> bool {
        match (left, right) {
            (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
            _ => left == right,
        }
    }

    /// `==`: like `===`, but numbers, numeric strings and booleans compare by value
    pub fn loose_equals(left: &Value, right: &Value) -> bool {
        match (left, right) {
            (Value::Null, Value::Null) => true,
            (Value::Null, _) | (_, Value::Null) => false,
            (Value::Number(_) | Value::Bool(_), Value::String(_) | Value::Number(_) | Value::Bool(_))
            | (Value::String(_), Value::Number(_) | Value::Bool(_)) => {
                Self::to_number(left) == Self::to_number(right)
            }
            _ => Self::strict_equals(left, right),
        }
    }

    /// Relational comparison; `None` when the operands are unordered
    pub fn compare(left: &Value, right: &Value) -> Option<Ordering> {
        match (left, right) {
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            _ => Self::to_number(left).partial_cmp(&Self::to_number(right)),
        }
    }
}
