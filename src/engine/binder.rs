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

//! Per-visit binding interpretation
//!
//! The binder is the [`WorkHandler`] driving a render. `Outer` resolves the
//! node-replacing bindings (include, select); `Inner` applies every other
//! binding of one node and queues its element children.

use super::select;
use super::traversal::{WorkHandler, WorkStack};
use super::values::{apply_content, apply_data, apply_values, apply_vars};
use crate::annotation::{AnnotationCache, AnnotationSet, Transclude};
use crate::compiler::ExpressionCompiler;
use crate::evaluator::{ContextId, ContextPool, EvalContext};
use crate::model::ValueExt;
use crate::template::{TemplateLoader, TemplateRegistry};
use crate::tree::Tree;
use serde_json::Value;
use std::sync::Arc;

/// Unit of traversal work
#[derive(Debug, Clone, PartialEq)]
pub enum Step<N> {
    /// Resolve include/select bindings of a node
    Outer(ContextId, N),
    /// Apply the remaining bindings and descend
    Inner(ContextId, N),
    /// Release a list-item context
    Recycle(ContextId),
}

/// Mutable engine state borrowed for one render
pub(crate) struct Binder<'a, T: Tree> {
    pub(crate) tree: &'a mut T,
    pub(crate) compiler: &'a mut ExpressionCompiler,
    pub(crate) annotations: &'a mut AnnotationCache,
    pub(crate) pool: &'a mut ContextPool,
    pub(crate) templates: &'a TemplateRegistry,
    pub(crate) loader: Option<&'a dyn TemplateLoader>,
    pub(crate) inplace: bool,
}

impl<T: Tree> WorkHandler<Step<T::Node>> for Binder<'_, T> {
    fn handle(&mut self, item: Step<T::Node>, stack: &mut WorkStack<Step<T::Node>>) {
        match item {
            Step::Outer(context, node) => self.outer(context, node, stack),
            Step::Inner(context, node) => self.inner(context, node, stack),
            Step::Recycle(context) => self.pool.recycle(context),
        }
    }
}

impl<T: Tree> Binder<'_, T> {
    fn annotations_of(&mut self, node: &T::Node) -> Arc<AnnotationSet> {
        self.annotations.lookup(self.tree, node, self.compiler)
    }

    pub(crate) fn context_mut(&mut self, id: ContextId) -> Option<&mut EvalContext> {
        let context = self.pool.get_mut(id);
        if context.is_none() {
            log::warn!("Skipping work for recycled context {id:?}");
        }
        context
    }

    fn outer(&mut self, context: ContextId, node: T::Node, stack: &mut WorkStack<Step<T::Node>>) {
        let set = self.annotations_of(&node);
        log::trace!("Outer {node:?} [{}]", set.fingerprint);

        if let Some(include) = &set.include {
            self.transclude(context, node, include, stack);
        } else if let Some(selection) = &set.select {
            let Some(value) = self.context_mut(context).map(|c| c.execute(selection)) else {
                return;
            };
            select::reconcile(self, context, node, value, stack);
        } else {
            self.inner(context, node, stack);
        }
    }

    fn transclude(
        &mut self,
        context: ContextId,
        node: T::Node,
        include: &Transclude,
        stack: &mut WorkStack<Step<T::Node>>,
    ) {
        let reference = match include {
            Transclude::Literal(id) => id.clone(),
            Transclude::Expression(evaluator) => match self.context_mut(context) {
                Some(ctx) => match ctx.execute(evaluator) {
                    Value::Null => String::new(),
                    value => value.to_display_string(),
                },
                None => return,
            },
        };

        let resolved = self.templates.resolve(
            self.tree,
            &reference,
            self.loader,
            self.annotations,
            self.compiler,
        );
        match resolved {
            Some(replacement) => {
                self.tree.replace(&replacement, &node);
                let mut queue = stack.create_queue();
                queue.push(Step::Outer(context, replacement));
                stack.push(queue);
            }
            None => {
                log::debug!("Template '{reference}' not found, removing {node:?}");
                self.tree.remove(&node);
            }
        }
    }

    fn inner(&mut self, context: ContextId, node: T::Node, stack: &mut WorkStack<Step<T::Node>>) {
        let set = self.annotations_of(&node);
        log::trace!("Inner {node:?} [{}]", set.fingerprint);
        let id_attribute = self.templates.id_attribute();
        let tree = &mut *self.tree;
        let Some(ctx) = self.pool.get_mut(context) else {
            log::warn!("Skipping work for recycled context {context:?}");
            return;
        };

        if !self.inplace {
            tree.remove_attribute(&node, id_attribute);
        }
        if let Some(id) = &set.id {
            tree.set_attribute(&node, id_attribute, id);
        } else if let Some(id_expr) = &set.id_expr {
            let id = ctx.execute(id_expr);
            if id.is_truthy() {
                tree.set_attribute(&node, id_attribute, &id.to_display_string());
            }
        }

        if let Some(display) = &set.display {
            if !ctx.execute(display).is_truthy() {
                tree.set_visible(&node, false);
                return;
            }
            tree.set_visible(&node, true);
        }

        if let Some(vars) = &set.vars {
            apply_vars(ctx, vars);
        }
        if let Some(values) = &set.values {
            apply_values(tree, &node, ctx, values);
        }
        if let Some(data) = &set.data {
            apply_data(tree, &node, ctx, data);
        }

        for callback in tree.callbacks(&node) {
            if let Err(err) = callback(&mut *ctx) {
                log::warn!("Template callback on {node:?} failed: {err}");
            }
        }

        if let Some(eval) = &set.eval {
            for evaluator in eval {
                ctx.execute(evaluator);
            }
        }

        if set.show.as_ref().is_some_and(|show| ctx.execute(show).is_truthy()) {
            tree.set_visible(&node, true);
        }
        if set.hide.as_ref().is_some_and(|hide| ctx.execute(hide).is_truthy()) {
            tree.set_visible(&node, false);
        }
        if set.skip.as_ref().is_some_and(|skip| ctx.execute(skip).is_truthy()) {
            return;
        }

        if let Some(content) = &set.content {
            let value = ctx.execute(content);
            apply_content(tree, &node, &value, set.clears_content());
            return;
        }

        // Snapshot first: nodes created while processing children are not revisited
        let children = tree.element_children(&node);
        if !children.is_empty() {
            let mut queue = stack.create_queue();
            for child in children {
                queue.push(Step::Outer(context, child));
            }
            stack.push(queue);
        }
    }
}
