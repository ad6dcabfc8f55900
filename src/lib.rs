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

//! Declarative tree templating with incremental re-rendering
//!
//! Nodes carry binding attributes (`data-jst-select`, `data-jst-content`,
//! `data-jst-values`, ...) whose values are small JavaScript-flavoured
//! expressions. Rendering evaluates them against JSON data and mutates the
//! tree in place; rendering the same tree again with new data updates it with
//! minimal churn, reusing the nodes produced for list elements that survive.
//!
//! The engine talks to the host tree only through the [`tree::Tree`] trait.
//! [`dom::Document`] is the bundled in-memory implementation.

pub mod annotation;
pub mod ast;
pub mod compiler;
pub mod config;
pub mod dom;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod model;
pub mod parser;
pub mod registry;
pub mod template;
pub mod tree;

// Re-export main types
pub use annotation::{AnnotationCache, AnnotationSet, Binding};
pub use compiler::{CacheStats, CompileFailurePolicy, Evaluator, ExpressionCompiler};
pub use config::{EngineConfig, EngineConfigBuilder};
pub use engine::Engine;
pub use error::{TemplateError, TemplateResult};
pub use evaluator::{EvalContext, EvaluationError};
pub use parser::{ParseError, parse};
pub use registry::{FunctionError, FunctionRegistry};
pub use template::{TemplateHandle, TemplateLoader, TemplateRegistry};
pub use tree::{AnnotationSlot, InstanceMarker, NodeCallback, Tree};
