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

//! Expression evaluation
//!
//! Compiled expressions are interpreted against an [`EvalContext`]. Contexts
//! used by the traversal live in a [`ContextPool`].

pub mod context;
pub mod error;
pub mod interpreter;
pub mod pool;

pub use context::{
    EvalContext, VAR_CONTEXT, VAR_DEFAULT, VAR_INDEX, VAR_LENGTH, VAR_THIS, VAR_TOP, VarMap,
};
pub use error::{EvaluationError, EvaluationResult};
pub use interpreter::Interpreter;
pub use pool::{ContextId, ContextPool};
