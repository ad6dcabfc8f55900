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

//! Engine configuration

use crate::compiler::CompileFailurePolicy;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default namespace prefix of binding attributes
pub const DEFAULT_ATTRIBUTE_PREFIX: &str = "data-jst-";
/// Default identity attribute
pub const DEFAULT_ID_ATTRIBUTE: &str = "id";
/// Default id of the hidden container holding loaded templates
pub const DEFAULT_TEMPLATE_CONTAINER: &str = "js-templates";

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Namespace prefix of binding attributes (`data-jst-select`, ...)
    pub attribute_prefix: String,
    /// Attribute carrying node identity
    pub id_attribute: String,
    /// Id of the hidden container loaded templates are inserted into
    pub template_container_id: String,
    /// Handling of expressions that fail to compile
    pub compile_failure_policy: CompileFailurePolicy,
    /// Value substituted for failed evaluations (`$default`)
    pub default_value: Value,
    /// Reuse evaluation contexts across renders
    pub context_pooling: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            attribute_prefix: DEFAULT_ATTRIBUTE_PREFIX.to_string(),
            id_attribute: DEFAULT_ID_ATTRIBUTE.to_string(),
            template_container_id: DEFAULT_TEMPLATE_CONTAINER.to_string(),
            compile_failure_policy: CompileFailurePolicy::default(),
            default_value: Value::Null,
            context_pooling: true,
        }
    }
}

impl EngineConfig {
    /// Start a builder from the defaults
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::new()
    }
}

/// Builder for engine configuration with fluent API
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the binding attribute prefix
    pub fn with_attribute_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.attribute_prefix = prefix.into();
        self
    }

    /// Set the identity attribute
    pub fn with_id_attribute(mut self, name: impl Into<String>) -> Self {
        self.config.id_attribute = name.into();
        self
    }

    /// Set the loaded-template container id
    pub fn with_template_container_id(mut self, id: impl Into<String>) -> Self {
        self.config.template_container_id = id.into();
        self
    }

    /// Set the compile failure policy
    pub fn with_compile_failure_policy(mut self, policy: CompileFailurePolicy) -> Self {
        self.config.compile_failure_policy = policy;
        self
    }

    /// Set the `$default` value
    pub fn with_default_value(mut self, value: Value) -> Self {
        self.config.default_value = value;
        self
    }

    /// Enable or disable context pooling
    pub fn with_context_pooling(mut self, enabled: bool) -> Self {
        self.config.context_pooling = enabled;
        self
    }

    /// Build the configuration
    pub fn build(self) -> EngineConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_overrides_defaults() {
        let config = EngineConfig::builder()
            .with_attribute_prefix("jst:")
            .with_default_value(json!("?"))
            .with_context_pooling(false)
            .build();
        assert_eq!(config.attribute_prefix, "jst:");
        assert_eq!(config.default_value, json!("?"));
        assert!(!config.context_pooling);
        assert_eq!(config.id_attribute, "id");
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"compile_failure_policy": "retry"}"#).unwrap();
        assert_eq!(config.compile_failure_policy, CompileFailurePolicy::Retry);
        assert_eq!(config.template_container_id, "js-templates");
    }
}
