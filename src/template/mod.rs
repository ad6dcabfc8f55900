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

//! Template lookup, lazy loading and handles

use crate::annotation::AnnotationCache;
use crate::compiler::ExpressionCompiler;
use crate::engine::Engine;
use crate::error::{TemplateError, TemplateResult};
use crate::tree::Tree;
use serde_json::Value;

/// Source of template markup for ids missing from the document
pub trait TemplateLoader {
    /// Markup expected to contain an element identified by `reference`
    fn load(&self, reference: &str) -> Option<String>;
}

impl<F> TemplateLoader for F
where
    F: Fn(&str) -> Option<String>,
{
    fn load(&self, reference: &str) -> Option<String> {
        self(reference)
    }
}

/// Resolves template references to nodes of a tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateRegistry {
    id_attribute: String,
    container_id: String,
}

impl TemplateRegistry {
    /// Create a registry looking nodes up by `id_attribute`
    ///
    /// Loaded markup goes under the hidden container `container_id`.
    pub fn new(id_attribute: impl Into<String>, container_id: impl Into<String>) -> Self {
        Self {
            id_attribute: id_attribute.into(),
            container_id: container_id.into(),
        }
    }

    /// Identity attribute used for lookups
    pub fn id_attribute(&self) -> &str {
        &self.id_attribute
    }

    /// Locate the template node itself, loading markup if necessary
    pub fn find<T: Tree>(
        &self,
        tree: &mut T,
        reference: &str,
        loader: Option<&dyn TemplateLoader>,
    ) -> Option<T::Node> {
        if reference.is_empty() {
            return None;
        }
        if let Some(node) = tree.find_by_id(&self.id_attribute, reference) {
            return Some(node);
        }
        let loader = loader?;

        match loader.load(reference) {
            Some(markup) => {
                let container = match tree.find_by_id(&self.id_attribute, &self.container_id) {
                    Some(container) => container,
                    None => tree.create_hidden_container(&self.id_attribute, &self.container_id),
                };
                if let Err(err) = tree.append_markup(&container, &markup) {
                    log::error!("Loaded markup for template '{reference}' does not parse: {err}");
                    return None;
                }
            }
            None => log::debug!("Loader returned nothing for template '{reference}'"),
        }

        let node = tree.find_by_id(&self.id_attribute, reference);
        if node.is_none() {
            log::error!("Template loader did not provide the id '{reference}'");
        }
        node
    }

    /// Detached, id-less copy of `template`, with its annotations primed
    pub fn clone_template<T: Tree>(
        &self,
        tree: &mut T,
        template: &T::Node,
        annotations: &mut AnnotationCache,
        compiler: &mut ExpressionCompiler,
    ) -> T::Node {
        annotations.prime(tree, template, compiler);
        let copy = tree.deep_clone(template);
        tree.remove_attribute(&copy, &self.id_attribute);
        copy
    }

    /// Resolve `reference` to a fresh copy of its template
    pub fn resolve<T: Tree>(
        &self,
        tree: &mut T,
        reference: &str,
        loader: Option<&dyn TemplateLoader>,
        annotations: &mut AnnotationCache,
        compiler: &mut ExpressionCompiler,
    ) -> Option<T::Node> {
        let template = self.find(tree, reference, loader)?;
        Some(self.clone_template(tree, &template, annotations, compiler))
    }

    /// Like [`TemplateRegistry::resolve`], failing when the template is absent
    pub fn resolve_or_fail<T: Tree>(
        &self,
        tree: &mut T,
        reference: &str,
        loader: Option<&dyn TemplateLoader>,
        annotations: &mut AnnotationCache,
        compiler: &mut ExpressionCompiler,
    ) -> TemplateResult<T::Node> {
        self.resolve(tree, reference, loader, annotations, compiler)
            .ok_or_else(|| TemplateError::template_not_found(reference))
    }
}

/// A template node bound to a rendering mode
///
/// In-place handles render into the node itself and keep its identity
/// attributes; cloned handles render into a detached copy. A handle over a
/// missing node does nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateHandle<N> {
    node: Option<N>,
    inplace: bool,
}

impl<N: Clone + PartialEq + std::fmt::Debug> TemplateHandle<N> {
    /// Handle rendering directly into `node`
    pub fn inplace(node: Option<N>) -> Self {
        Self {
            node,
            inplace: true,
        }
    }

    /// Handle rendering into an already-cloned `node`
    pub fn cloned(node: Option<N>) -> Self {
        Self {
            node,
            inplace: false,
        }
    }

    /// The node rendered by this handle
    pub fn node(&self) -> Option<&N> {
        self.node.as_ref()
    }

    /// Whether the handle renders in place
    pub fn is_inplace(&self) -> bool {
        self.inplace
    }

    /// Render `data` into the handle's node
    pub fn process<T: Tree<Node = N>>(&self, engine: &mut Engine, tree: &mut T, data: Value) {
        if let Some(node) = &self.node {
            engine.render_with_parent(tree, data, None, node, self.inplace);
        }
    }
}
