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

//! AST interpreter for template expressions

use super::context::{EvalContext, VAR_CONTEXT};
use super::error::{EvaluationError, EvaluationResult};
use crate::ast::{
    BinaryOpData, BinaryOperator, CallData, ConditionalData, ExpressionNode, LiteralValue,
    UnaryOperator,
};
use crate::model::{TypeCoercion, ValueExt, number_value};
use serde_json::{Map, Value};
use smallvec::SmallVec;
use std::cmp::Ordering;

/// Evaluates expression trees against one context
pub struct Interpreter<'a> {
    context: &'a mut EvalContext,
}

impl<'a> Interpreter<'a> {
    /// Create an interpreter bound to `context`
    pub fn new(context: &'a mut EvalContext) -> Self {
        Self { context }
    }

    /// Evaluate an expression node
    pub fn evaluate(&mut self, node: &ExpressionNode) -> EvaluationResult<Value> {
        match node {
            ExpressionNode::Literal(literal) => Ok(literal_value(literal)),
            ExpressionNode::Identifier(name) => self.resolve_identifier(name),
            ExpressionNode::Member { base, property } => {
                let base = self.evaluate(base)?;
                member(&base, property)
            }
            ExpressionNode::Index { base, index } => {
                let base = self.evaluate(base)?;
                let index = self.evaluate(index)?;
                index_value(&base, &index)
            }
            ExpressionNode::Call(call) => self.evaluate_call(call),
            ExpressionNode::UnaryOp { op, operand } => {
                let operand = self.evaluate(operand)?;
                Ok(unary(*op, &operand))
            }
            ExpressionNode::BinaryOp(data) => self.evaluate_binary(data),
            ExpressionNode::Conditional(data) => self.evaluate_conditional(data),
            ExpressionNode::Array(items) => items
                .iter()
                .map(|item| self.evaluate(item))
                .collect::<EvaluationResult<Vec<_>>>()
                .map(Value::Array),
            ExpressionNode::Object(entries) => {
                let mut map = Map::new();
                for (key, value) in entries {
                    map.insert(key.clone(), self.evaluate(value)?);
                }
                Ok(Value::Object(map))
            }
            ExpressionNode::Assign { name, value } => {
                let value = self.evaluate(value)?;
                self.context.set_variable(name.clone(), value.clone());
                Ok(value)
            }
        }
    }

    fn resolve_identifier(&self, name: &str) -> EvaluationResult<Value> {
        if let Some(value) = self.context.variable(name) {
            return Ok(value.clone());
        }
        if name == VAR_CONTEXT {
            return Ok(self.context.snapshot());
        }
        match self.context.data() {
            Value::Object(map) if map.contains_key(name) => Ok(map[name].clone()),
            _ => Err(EvaluationError::UnresolvedReference {
                name: name.to_string(),
            }),
        }
    }

    fn evaluate_call(&mut self, call: &CallData) -> EvaluationResult<Value> {
        let mut args: SmallVec<[Value; 4]> = SmallVec::new();
        if let Some(receiver) = &call.receiver {
            args.push(self.evaluate(receiver)?);
        }
        for arg in &call.args {
            args.push(self.evaluate(arg)?);
        }
        match self.context.functions().call(&call.name, &args) {
            Some(result) => Ok(result?),
            None => Err(EvaluationError::UnknownFunction {
                name: call.name.clone(),
            }),
        }
    }

    fn evaluate_binary(&mut self, data: &BinaryOpData) -> EvaluationResult<Value> {
        let left = self.evaluate(&data.left)?;
        match data.op {
            BinaryOperator::And if !left.is_truthy() => return Ok(left),
            BinaryOperator::Or if left.is_truthy() => return Ok(left),
            BinaryOperator::And | BinaryOperator::Or => return self.evaluate(&data.right),
            _ => {}
        }
        let right = self.evaluate(&data.right)?;
        Ok(binary(data.op, &left, &right))
    }

    fn evaluate_conditional(&mut self, data: &ConditionalData) -> EvaluationResult<Value> {
        if self.evaluate(&data.condition)?.is_truthy() {
            self.evaluate(&data.then_expr)
        } else {
            self.evaluate(&data.else_expr)
        }
    }
}

fn literal_value(literal: &LiteralValue) -> Value {
    match literal {
        LiteralValue::Null => Value::Null,
        LiteralValue::Boolean(b) => Value::Bool(*b),
        LiteralValue::Number(n) => Value::Number(n.clone()),
        LiteralValue::String(s) => Value::String(s.clone()),
    }
}

fn member(base: &Value, property: &str) -> EvaluationResult<Value> {
    match base {
        Value::Null => Err(EvaluationError::type_error(format!(
            "cannot read property '{property}' of null"
        ))),
        Value::Object(map) => Ok(map.get(property).cloned().unwrap_or(Value::Null)),
        Value::Array(_) | Value::String(_) if property == "length" => {
            Ok(base.js_length().map_or(Value::Null, Value::from))
        }
        Value::Array(items) => Ok(property
            .parse::<usize>()
            .ok()
            .and_then(|i| items.get(i).cloned())
            .unwrap_or(Value::Null)),
        _ => Ok(Value::Null),
    }
}

fn index_value(base: &Value, index: &Value) -> EvaluationResult<Value> {
    match (base, index) {
        (Value::Null, _) => Err(EvaluationError::type_error(format!(
            "cannot read property '{}' of null",
            index.to_display_string()
        ))),
        (Value::Array(items), Value::Number(n)) => Ok(n
            .as_u64()
            .and_then(|i| items.get(i as usize).cloned())
            .unwrap_or(Value::Null)),
        (Value::String(s), Value::Number(n)) => Ok(n
            .as_u64()
            .and_then(|i| s.chars().nth(i as usize))
            .map_or(Value::Null, |c| Value::String(c.to_string()))),
        _ => member(base, &index.to_display_string()),
    }
}

fn unary(op: UnaryOperator, operand: &Value) -> Value {
    match op {
        UnaryOperator::Not => Value::Bool(!operand.is_truthy()),
        UnaryOperator::Negate => number_value(-TypeCoercion::to_number(operand)),
        UnaryOperator::Plus => number_value(TypeCoercion::to_number(operand)),
    }
}

fn binary(op: BinaryOperator, left: &Value, right: &Value) -> Value {
    let ordering = || TypeCoercion::compare(left, right);
    match op {
        BinaryOperator::Add => TypeCoercion::add(left, right),
        BinaryOperator::Subtract => TypeCoercion::arithmetic(left, right, |a, b| a - b),
        BinaryOperator::Multiply => TypeCoercion::arithmetic(left, right, |a, b| a * b),
        BinaryOperator::Divide => TypeCoercion::arithmetic(left, right, |a, b| a / b),
        BinaryOperator::Modulo => TypeCoercion::arithmetic(left, right, |a, b| a % b),
        BinaryOperator::LessThan => Value::Bool(ordering() == Some(Ordering::Less)),
        BinaryOperator::LessThanOrEqual => {
            Value::Bool(matches!(ordering(), Some(Ordering::Less | Ordering::Equal)))
        }
        BinaryOperator::GreaterThan => Value::Bool(ordering() == Some(Ordering::Greater)),
        BinaryOperator::GreaterThanOrEqual => {
            Value::Bool(matches!(ordering(), Some(Ordering::Greater | Ordering::Equal)))
        }
        BinaryOperator::Equal => Value::Bool(TypeCoercion::loose_equals(left, right)),
        BinaryOperator::NotEqual => Value::Bool(!TypeCoercion::loose_equals(left, right)),
        BinaryOperator::StrictEqual => Value::Bool(TypeCoercion::strict_equals(left, right)),
        BinaryOperator::StrictNotEqual => Value::Bool(!TypeCoercion::strict_equals(left, right)),
        // Short-circuit operators are handled before the right side is evaluated
        BinaryOperator::And | BinaryOperator::Or => Value::Null,
    }
}
