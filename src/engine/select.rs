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

//! List reconciliation for the `select` binding
//!
//! A node bound to a list stands for one instance per element. Instances
//! carry an [`InstanceMarker`] so that a re-render reuses them: surviving
//! positions keep their node, growth clones the terminal instance, shrinking
//! removes the surplus.

use super::binder::{Binder, Step};
use super::traversal::{WorkQueue, WorkStack};
use crate::evaluator::ContextId;
use crate::tree::{InstanceMarker, Tree};
use serde_json::Value;

/// Apply a select value to `node`
pub(crate) fn reconcile<T: Tree>(
    binder: &mut Binder<'_, T>,
    context: ContextId,
    node: T::Node,
    value: Value,
    stack: &mut WorkStack<Step<T::Node>>,
) {
    match value {
        Value::Array(items) => reconcile_list(binder, context, node, items, stack),
        Value::Null => binder.tree.set_visible(&node, false),
        single => {
            binder.tree.set_visible(&node, true);
            let mut queue = stack.create_queue();
            schedule(binder, &mut queue, context, node, single, 0, 1);
            stack.push(queue);
        }
    }
}

fn reconcile_list<T: Tree>(
    binder: &mut Binder<'_, T>,
    context: ContextId,
    node: T::Node,
    mut items: Vec<Value>,
    stack: &mut WorkStack<Step<T::Node>>,
) {
    let count = items.len();
    let marker = binder.tree.instance_marker(&node);

    if count == 0 {
        match marker {
            None | Some(InstanceMarker { index: 0, .. }) => {
                binder
                    .tree
                    .set_instance_marker(&node, Some(InstanceMarker::new(0, true)));
                binder.tree.set_visible(&node, false);
            }
            Some(_) => binder.tree.remove(&node),
        }
        return;
    }

    let mut take = |index: usize| std::mem::take(&mut items[index]);
    let last = count - 1;
    let mut queue = stack.create_queue();

    match marker {
        None => {
            binder.tree.set_visible(&node, true);
            for index in 0..last {
                let clone = binder.tree.deep_clone(&node);
                binder.tree.insert_before(&clone, &node);
                stamp(binder, &clone, index, count);
                schedule(binder, &mut queue, context, clone, take(index), index, count);
            }
            stamp(binder, &node, last, count);
            schedule(binder, &mut queue, context, node, take(last), last, count);
        }
        Some(marker) if marker.is_last && marker.index < last => {
            binder.tree.set_visible(&node, true);
            let mut anchor = node.clone();
            let mut clones = Vec::with_capacity(last - marker.index);
            for _ in marker.index..last {
                let clone = binder.tree.deep_clone(&node);
                binder.tree.insert_after(&clone, &anchor);
                anchor = clone.clone();
                clones.push(clone);
            }
            stamp(binder, &node, marker.index, count);
            schedule(binder, &mut queue, context, node, take(marker.index), marker.index, count);
            for (offset, clone) in clones.into_iter().enumerate() {
                let index = marker.index + 1 + offset;
                stamp(binder, &clone, index, count);
                schedule(binder, &mut queue, context, clone, take(index), index, count);
            }
        }
        Some(marker) if marker.index < count => {
            binder.tree.set_visible(&node, true);
            stamp(binder, &node, marker.index, count);
            schedule(binder, &mut queue, context, node, take(marker.index), marker.index, count);
        }
        Some(_) => binder.tree.remove(&node),
    }
    stack.push(queue);
}

fn stamp<T: Tree>(binder: &mut Binder<'_, T>, node: &T::Node, index: usize, count: usize) {
    binder
        .tree
        .set_instance_marker(node, Some(InstanceMarker::new(index, index + 1 == count)));
}

/// Queue `Inner` for one instance followed by the release of its context
fn schedule<T: Tree>(
    binder: &mut Binder<'_, T>,
    queue: &mut WorkQueue<Step<T::Node>>,
    parent: ContextId,
    node: T::Node,
    item: Value,
    index: usize,
    count: usize,
) {
    let item_context = binder.pool.clone_item(parent, item, index, count);
    queue.push(Step::Inner(item_context, node));
    queue.push(Step::Recycle(item_context));
}
