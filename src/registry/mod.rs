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

//! Function registry for template expressions
//!
//! Expressions call functions by name (`upper(name)`) or as methods
//! (`name.upper()`, which passes the receiver as the first argument). The
//! registry maps those names to host implementations.

pub mod function;
pub mod functions;

pub use function::{FunctionError, FunctionImpl, FunctionRegistry, FunctionResult};

/// Create a registry with every built-in function registered
pub fn create_standard_registry() -> FunctionRegistry {
    let mut registry = FunctionRegistry::new();
    functions::register_builtin_functions(&mut registry);
    registry
}
