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

//! Rendering engine
//!
//! [`Engine`] owns every cache a render touches: compiled expressions,
//! annotation sets, pooled evaluation contexts, globals and host functions.
//! Independent engines never share state.
//!
//! ```
//! use jstemplate::{Engine, dom::Document, tree::Tree};
//! use serde_json::json;
//!
//! let mut doc = Document::parse(r#"<p data-jst-content="greeting"></p>"#).unwrap();
//! let p = doc.element_children(&doc.root())[0];
//! let mut engine = Engine::new();
//! engine.render_in_place(&mut doc, json!({"greeting": "hello"}), &p);
//! assert_eq!(doc.to_markup(), r#"<p data-jst-content="greeting">hello</p>"#);
//! ```

mod binder;
mod select;
pub mod traversal;
pub mod values;

pub use binder::Step;
pub use traversal::{TraversalStats, WorkHandler, WorkQueue, WorkStack};

use crate::annotation::AnnotationCache;
use crate::compiler::{CacheStats, ExpressionCompiler};
use crate::config::EngineConfig;
use crate::error::TemplateResult;
use crate::evaluator::{ContextPool, EvalContext, VAR_DEFAULT, VarMap};
use crate::registry::{FunctionRegistry, FunctionResult, create_standard_registry};
use crate::template::{TemplateHandle, TemplateLoader, TemplateRegistry};
use crate::tree::Tree;
use binder::Binder;
use serde_json::Value;
use std::sync::Arc;

/// Template rendering engine
pub struct Engine {
    config: EngineConfig,
    compiler: ExpressionCompiler,
    annotations: AnnotationCache,
    functions: Arc<FunctionRegistry>,
    globals: VarMap,
    pool: ContextPool,
    templates: TemplateRegistry,
    loader: Option<Box<dyn TemplateLoader>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("compiler", &self.compiler.stats())
            .field("annotations", &self.annotations.stats())
            .field("globals", &self.globals)
            .field("loader", &self.loader.is_some())
            .finish()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Create an engine with the default configuration
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Create an engine with a custom configuration
    pub fn with_config(config: EngineConfig) -> Self {
        let functions = Arc::new(create_standard_registry());
        let mut globals = VarMap::default();
        globals.insert(VAR_DEFAULT.to_string(), config.default_value.clone());
        Self {
            compiler: ExpressionCompiler::with_policy(config.compile_failure_policy),
            annotations: AnnotationCache::new(&config.attribute_prefix),
            pool: ContextPool::new(Arc::clone(&functions), config.context_pooling),
            templates: TemplateRegistry::new(&config.id_attribute, &config.template_container_id),
            functions,
            globals,
            loader: None,
            config,
        }
    }

    /// Active configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Set a variable visible to every root context
    ///
    /// Setting `$default` changes the value substituted for failed
    /// evaluations.
    pub fn set_global(&mut self, name: impl Into<String>, value: Value) {
        self.globals.insert(name.into(), value);
    }

    /// Read a global variable
    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// Make a host function callable from expressions
    pub fn register_function<F>(&mut self, name: impl Into<String>, min: usize, max: Option<usize>, f: F)
    where
        F: Fn(&[Value]) -> FunctionResult<Value> + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.functions).register(name, min, max, f);
        self.pool = ContextPool::new(Arc::clone(&self.functions), self.config.context_pooling);
    }

    /// Install the loader used when a template id is missing from the tree
    pub fn set_template_loader<L: TemplateLoader + 'static>(&mut self, loader: L) {
        self.loader = Some(Box::new(loader));
    }

    /// Remove the template loader
    pub fn clear_template_loader(&mut self) {
        self.loader = None;
    }

    /// Compiled expression cache statistics
    pub fn compiler_stats(&self) -> CacheStats {
        self.compiler.stats()
    }

    /// Annotation cache statistics
    pub fn annotation_stats(&self) -> CacheStats {
        self.annotations.stats()
    }

    /// Annotation cache, for inspection
    pub fn annotations(&self) -> &AnnotationCache {
        &self.annotations
    }

    /// Drop all cached expressions and annotation sets
    ///
    /// Nodes rendered before the call are rescanned on their next render.
    pub fn clear_caches(&mut self) {
        self.compiler.clear();
        self.annotations.clear();
    }

    /// Evaluate one expression against `data` in a fresh root context
    pub fn evaluate(&mut self, source: &str, data: Value) -> Value {
        let evaluator = self.compiler.compile(source);
        let mut context = EvalContext::root(data, &self.globals, Arc::clone(&self.functions));
        context.execute(&evaluator)
    }

    /// Render `data` into `node`, keeping identity attributes
    pub fn render_in_place<T: Tree>(&mut self, tree: &mut T, data: Value, node: &T::Node) -> TraversalStats {
        self.render_with_parent(tree, data, None, node, true)
    }

    /// Render `data` into a detached, id-less copy of `node` and return it
    pub fn render_clone<T: Tree>(&mut self, tree: &mut T, data: Value, node: &T::Node) -> T::Node {
        let copy = self
            .templates
            .clone_template(tree, node, &mut self.annotations, &mut self.compiler);
        self.render_with_parent(tree, data, None, &copy, false);
        copy
    }

    /// Render `data` into `node`
    ///
    /// With `parent_data`, the root context inherits from a context built
    /// over it, so `$top` refers to the parent data. Unless `inplace`, every
    /// identity attribute not produced by an `id`/`idexpr` binding is removed.
    pub fn render_with_parent<T: Tree>(
        &mut self,
        tree: &mut T,
        data: Value,
        parent_data: Option<Value>,
        node: &T::Node,
        inplace: bool,
    ) -> TraversalStats {
        let parent = parent_data.map(|parent| self.pool.create_root(parent, &self.globals));
        let context = match parent {
            Some(parent) => self.pool.create_child(data, parent),
            None => self.pool.create_root(data, &self.globals),
        };

        self.annotations.prime(tree, node, &mut self.compiler);
        let mut binder = Binder {
            tree,
            compiler: &mut self.compiler,
            annotations: &mut self.annotations,
            pool: &mut self.pool,
            templates: &self.templates,
            loader: self.loader.as_deref(),
            inplace,
        };
        let stats = traversal::run(Step::Outer(context, node.clone()), &mut binder);
        log::trace!(
            "Rendered {node:?}: {} steps, depth {}",
            stats.items,
            stats.max_depth
        );

        self.pool.recycle(context);
        if let Some(parent) = parent {
            self.pool.recycle(parent);
        }
        stats
    }

    /// Locate a template node without cloning it
    pub fn find_template<T: Tree>(&self, tree: &mut T, id: &str) -> Option<T::Node> {
        self.templates.find(tree, id, self.loader.as_deref())
    }

    /// Resolve a template reference to a fresh, id-less copy
    pub fn resolve_template<T: Tree>(&mut self, tree: &mut T, reference: &str) -> Option<T::Node> {
        self.templates.resolve(
            tree,
            reference,
            self.loader.as_deref(),
            &mut self.annotations,
            &mut self.compiler,
        )
    }

    /// Resolve a template reference that must exist
    pub fn resolve_template_or_fail<T: Tree>(
        &mut self,
        tree: &mut T,
        reference: &str,
    ) -> TemplateResult<T::Node> {
        self.templates.resolve_or_fail(
            tree,
            reference,
            self.loader.as_deref(),
            &mut self.annotations,
            &mut self.compiler,
        )
    }

    /// Handle rendering in place into the template `id`
    pub fn get_template<T: Tree>(&self, tree: &mut T, id: &str) -> TemplateHandle<T::Node> {
        TemplateHandle::inplace(self.find_template(tree, id))
    }

    /// Handle rendering into a fresh copy of the template `id`
    pub fn clone_template<T: Tree>(&mut self, tree: &mut T, id: &str) -> TemplateHandle<T::Node> {
        TemplateHandle::cloned(self.resolve_template(tree, id))
    }
}
