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

//! Context allocation with optional recycling
//!
//! The traversal refers to contexts by [`ContextId`] so queued work items stay
//! plain data. Recycled contexts are cleared and kept on a freelist for reuse
//! when pooling is enabled, otherwise they are dropped.

use super::context::{EvalContext, VarMap};
use crate::registry::FunctionRegistry;
use serde_json::Value;
use std::sync::Arc;

/// Handle to a context owned by a [`ContextPool`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(usize);

/// Arena of live evaluation contexts
#[derive(Debug)]
pub struct ContextPool {
    slots: Vec<Option<EvalContext>>,
    free_slots: Vec<usize>,
    spare: Vec<EvalContext>,
    pooling: bool,
    functions: Arc<FunctionRegistry>,
}

impl ContextPool {
    /// Create a pool whose contexts call into `functions`
    pub fn new(functions: Arc<FunctionRegistry>, pooling: bool) -> Self {
        Self {
            slots: Vec::new(),
            free_slots: Vec::new(),
            spare: Vec::new(),
            pooling,
            functions,
        }
    }

    fn take_spare(&mut self) -> EvalContext {
        self.spare
            .pop()
            .unwrap_or_else(|| EvalContext::empty(Arc::clone(&self.functions)))
    }

    fn store(&mut self, context: EvalContext) -> ContextId {
        match self.free_slots.pop() {
            Some(slot) => {
                self.slots[slot] = Some(context);
                ContextId(slot)
            }
            None => {
                self.slots.push(Some(context));
                ContextId(self.slots.len() - 1)
            }
        }
    }

    /// Allocate a root context seeded with `globals`
    pub fn create_root(&mut self, data: Value, globals: &VarMap) -> ContextId {
        let mut context = self.take_spare();
        context.reset_root(data, globals);
        self.store(context)
    }

    /// Allocate a child of `parent`; a dead parent yields an unseeded context
    pub fn create_child(&mut self, data: Value, parent: ContextId) -> ContextId {
        let mut context = self.take_spare();
        match self.get(parent) {
            Some(parent) => context.reset_child(data, parent),
            None => {
                log::warn!("Context {parent:?} used after recycle");
                context.reset_root(data, &VarMap::default());
            }
        }
        self.store(context)
    }

    /// Allocate a list-item child of `parent`
    pub fn clone_item(&mut self, parent: ContextId, item: Value, index: usize, count: usize) -> ContextId {
        let id = self.create_child(item, parent);
        if let Some(context) = self.get_mut(id) {
            context.set_position(index, count);
        }
        id
    }

    /// Borrow a live context
    pub fn get(&self, id: ContextId) -> Option<&EvalContext> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    /// Mutably borrow a live context
    pub fn get_mut(&mut self, id: ContextId) -> Option<&mut EvalContext> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Release a context; its id must not be used afterwards
    pub fn recycle(&mut self, id: ContextId) {
        let Some(mut context) = self.slots.get_mut(id.0).and_then(Option::take) else {
            return;
        };
        self.free_slots.push(id.0);
        if self.pooling {
            context.clear();
            self.spare.push(context);
        }
    }

    /// Number of contexts currently in use
    pub fn live(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Number of cleared contexts waiting for reuse
    pub fn spare(&self) -> usize {
        self.spare.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::context::VAR_THIS;
    use serde_json::json;

    fn pool(pooling: bool) -> ContextPool {
        ContextPool::new(Arc::new(FunctionRegistry::new()), pooling)
    }

    #[test]
    fn test_recycled_context_is_cleared_before_reuse() {
        let mut pool = pool(true);
        let root = pool.create_root(json!({"a": 1}), &VarMap::default());
        let item = pool.clone_item(root, json!("x"), 0, 1);
        pool.get_mut(item).unwrap().set_variable("leak", json!(true));
        pool.recycle(item);

        assert_eq!(pool.live(), 1);
        assert_eq!(pool.spare(), 1);
        assert!(pool.get(item).is_none());

        let reused = pool.create_child(json!("y"), root);
        assert_eq!(pool.spare(), 0);
        let context = pool.get(reused).unwrap();
        assert_eq!(context.variable("leak"), None);
        assert_eq!(context.variable(VAR_THIS), Some(&json!("y")));
    }

    #[test]
    fn test_without_pooling_contexts_are_dropped() {
        let mut pool = pool(false);
        let root = pool.create_root(json!(null), &VarMap::default());
        pool.recycle(root);
        pool.recycle(root);
        assert_eq!(pool.live(), 0);
        assert_eq!(pool.spare(), 0);
    }
}
