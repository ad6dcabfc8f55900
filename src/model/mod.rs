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

//! Data model for template rendering
//!
//! Template data is plain JSON ([`serde_json::Value`]). This module adds the
//! JavaScript-flavoured coercions the expression language relies on.

pub mod type_coercion;
pub mod value;

pub use serde_json::Value;
pub use type_coercion::TypeCoercion;
pub use value::{ValueExt, number_value};
