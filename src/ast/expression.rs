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

//! Expression AST node definitions

use crate::ast::operator::{BinaryOperator, UnaryOperator};
use serde_json::Number;
use smallvec::SmallVec;

/// AST representation of a binding expression
///
/// Large variants are boxed to keep the enum small; the hot variants
/// (literals, identifiers, member access) come first.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionNode {
    /// Literal value (string, number, boolean, null)
    Literal(LiteralValue),

    /// Bare identifier, resolved against variables and then the current data
    Identifier(String),

    /// Member access (`base.property`)
    Member {
        /// Base expression
        base: Box<ExpressionNode>,
        /// Property name
        property: String,
    },

    /// Index access (`base[index]`)
    Index {
        /// Base expression
        base: Box<ExpressionNode>,
        /// Index expression
        index: Box<ExpressionNode>,
    },

    /// Function or method call (boxed for size optimization)
    Call(Box<CallData>),

    /// Unary operation
    UnaryOp {
        /// The operator
        op: UnaryOperator,
        /// The operand
        operand: Box<ExpressionNode>,
    },

    /// Binary operation (boxed for size optimization)
    BinaryOp(Box<BinaryOpData>),

    /// Conditional expression (`cond ? a : b`)
    Conditional(Box<ConditionalData>),

    /// Array literal (`[a, b, c]`)
    Array(Vec<ExpressionNode>),

    /// Object literal (`{key: value}`), in source order
    Object(Vec<(String, ExpressionNode)>),

    /// Variable assignment (`$name = value`)
    Assign {
        /// Variable name
        name: String,
        /// Assigned value
        value: Box<ExpressionNode>,
    },
}

/// Binary operation data (separate struct to optimize enum size)
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryOpData {
    /// The operator
    pub op: BinaryOperator,
    /// Left operand
    pub left: ExpressionNode,
    /// Right operand
    pub right: ExpressionNode,
}

/// Call data (separate struct to optimize enum size)
///
/// A method call `x.f(y)` is stored with `receiver = Some(x)` and is
/// dispatched as `f(x, y)`.
#[derive(Debug, Clone, PartialEq)]
pub struct CallData {
    /// Function name
    pub name: String,
    /// Receiver of a method call
    pub receiver: Option<ExpressionNode>,
    /// Call arguments (SmallVec for the common case of few args)
    pub args: SmallVec<[ExpressionNode; 4]>,
}

/// Conditional expression data
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalData {
    /// Condition
    pub condition: ExpressionNode,
    /// Value when the condition is truthy
    pub then_expr: ExpressionNode,
    /// Value when the condition is falsy
    pub else_expr: ExpressionNode,
}

/// Literal values
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    /// `null` or `undefined`
    Null,
    /// Boolean literal
    Boolean(bool),
    /// Numeric literal
    Number(Number),
    /// String literal, escapes already resolved
    String(String),
}

impl ExpressionNode {
    /// Create a literal expression
    pub fn literal(value: LiteralValue) -> Self {
        Self::Literal(value)
    }

    /// Create an identifier expression
    pub fn identifier(name: impl Into<String>) -> Self {
        Self::Identifier(name.into())
    }

    /// Create a member access expression
    pub fn member(base: ExpressionNode, property: impl Into<String>) -> Self {
        Self::Member {
            base: Box::new(base),
            property: property.into(),
        }
    }

    /// Create an index access expression
    pub fn index(base: ExpressionNode, index: ExpressionNode) -> Self {
        Self::Index {
            base: Box::new(base),
            index: Box::new(index),
        }
    }

    /// Create a plain function call expression
    pub fn function_call(
        name: impl Into<String>,
        args: impl Into<SmallVec<[ExpressionNode; 4]>>,
    ) -> Self {
        Self::Call(Box::new(CallData {
            name: name.into(),
            receiver: None,
            args: args.into(),
        }))
    }

    /// Create a method call expression
    pub fn method_call(
        receiver: ExpressionNode,
        name: impl Into<String>,
        args: impl Into<SmallVec<[ExpressionNode; 4]>>,
    ) -> Self {
        Self::Call(Box::new(CallData {
            name: name.into(),
            receiver: Some(receiver),
            args: args.into(),
        }))
    }

    /// Create a unary operation expression
    pub fn unary_op(op: UnaryOperator, operand: ExpressionNode) -> Self {
        Self::UnaryOp {
            op,
            operand: Box::new(operand),
        }
    }

    /// Create a binary operation expression
    pub fn binary_op(op: BinaryOperator, left: ExpressionNode, right: ExpressionNode) -> Self {
        Self::BinaryOp(Box::new(BinaryOpData { op, left, right }))
    }

    /// Create a conditional expression
    pub fn conditional(
        condition: ExpressionNode,
        then_expr: ExpressionNode,
        else_expr: ExpressionNode,
    ) -> Self {
        Self::Conditional(Box::new(ConditionalData {
            condition,
            then_expr,
            else_expr,
        }))
    }

    /// Create an assignment expression
    pub fn assign(name: impl Into<String>, value: ExpressionNode) -> Self {
        Self::Assign {
            name: name.into(),
            value: Box::new(value),
        }
    }

    /// Whether this expression is a plain literal
    pub fn is_literal(&self) -> bool {
        matches!(self, Self::Literal(_))
    }
}

impl LiteralValue {
    /// Create a numeric literal from a float, keeping integral values integral
    pub fn number(value: f64) -> Self {
        if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
            Self::Number(Number::from(value as i64))
        } else {
            Number::from_f64(value).map_or(Self::Null, Self::Number)
        }
    }
}
