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

//! Tree API consumed by the engine
//!
//! The engine never manipulates nodes directly. Everything it needs from the
//! host document goes through [`Tree`], so the same engine drives the bundled
//! [`crate::dom::Document`] or any other node store.

use crate::error::TemplateResult;
use crate::evaluator::EvalContext;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Position of a list-multiplied node within its list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceMarker {
    /// 0-based position in the list
    pub index: usize,
    /// Whether this is the terminal instance of the list
    pub is_last: bool,
}

impl InstanceMarker {
    /// Create a marker
    pub fn new(index: usize, is_last: bool) -> Self {
        Self { index, is_last }
    }
}

impl fmt::Display for InstanceMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_last {
            write!(f, "*{}", self.index)
        } else {
            write!(f, "{}", self.index)
        }
    }
}

/// Annotation set reference recorded on a node
///
/// Only the cache that issued a slot can resolve it; any other cache, or the
/// same cache after it was cleared, treats the slot as absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnnotationSlot {
    /// Identity of the issuing cache
    pub cache: u64,
    /// Position of the set within that cache
    pub index: u32,
}

/// Host callback run against a node's context during rendering
pub type NodeCallback = Arc<dyn Fn(&mut EvalContext) -> TemplateResult<()> + Send + Sync>;

/// Node store the engine renders into
///
/// Node handles are cheap to clone and compare. A handle stays valid while
/// its node is detached; it becomes meaningless once the node is removed.
pub trait Tree {
    /// Node handle
    type Node: Clone + PartialEq + fmt::Debug;

    /// Attribute value, if present
    fn attribute(&self, node: &Self::Node, name: &str) -> Option<&str>;

    /// Set an attribute, replacing any previous value
    fn set_attribute(&mut self, node: &Self::Node, name: &str, value: &str);

    /// Remove an attribute if present
    fn remove_attribute(&mut self, node: &Self::Node, name: &str);

    /// Element children in document order
    fn element_children(&self, node: &Self::Node) -> Vec<Self::Node>;

    /// Parent node, if attached
    fn parent(&self, node: &Self::Node) -> Option<Self::Node>;

    /// Detached deep copy of `node`
    ///
    /// The copy carries attributes, children, visibility, annotation slots,
    /// instance markers, node properties, node data and callbacks.
    fn deep_clone(&mut self, node: &Self::Node) -> Self::Node;

    /// Insert `new` as the previous sibling of `reference`
    fn insert_before(&mut self, new: &Self::Node, reference: &Self::Node);

    /// Insert `new` as the next sibling of `reference`
    fn insert_after(&mut self, new: &Self::Node, reference: &Self::Node);

    /// Put `new` where `old` is and detach `old`
    fn replace(&mut self, new: &Self::Node, old: &Self::Node);

    /// Detach and discard `node`
    fn remove(&mut self, node: &Self::Node);

    /// Serialized content of `node`, excluding the node itself
    fn inner_markup(&self, node: &Self::Node) -> String;

    /// Remove every child of `node`
    fn clear_children(&mut self, node: &Self::Node);

    /// Append a text child
    fn append_text(&mut self, node: &Self::Node, text: &str);

    /// Parse `markup` and append the resulting nodes under `parent`
    fn append_markup(&mut self, parent: &Self::Node, markup: &str) -> TemplateResult<()>;

    /// Show or hide `node`
    fn set_visible(&mut self, node: &Self::Node, visible: bool);

    /// Whether `node` is shown
    fn is_visible(&self, node: &Self::Node) -> bool;

    /// Attached node whose `id_attribute` equals `id`
    fn find_by_id(&self, id_attribute: &str, id: &str) -> Option<Self::Node>;

    /// Append a hidden container identified by `id_attribute=id` to the document root
    fn create_hidden_container(&mut self, id_attribute: &str, id: &str) -> Self::Node;

    /// Node-local property store written by `.path` value labels
    fn properties_mut(&mut self, node: &Self::Node) -> &mut Map<String, Value>;

    /// Node-local auxiliary data written by the `data` binding
    fn data_mut(&mut self, node: &Self::Node) -> &mut Map<String, Value>;

    /// Cached annotation set reference
    fn annotation_slot(&self, node: &Self::Node) -> Option<AnnotationSlot>;

    /// Record the annotation set reference
    fn set_annotation_slot(&mut self, node: &Self::Node, slot: AnnotationSlot);

    /// List instance marker
    fn instance_marker(&self, node: &Self::Node) -> Option<InstanceMarker>;

    /// Record or clear the list instance marker
    fn set_instance_marker(&mut self, node: &Self::Node, marker: Option<InstanceMarker>);

    /// Callbacks attached to `node`
    fn callbacks(&self, node: &Self::Node) -> Vec<NodeCallback>;

    /// Attach a callback to `node`
    fn attach_callback(&mut self, node: &Self::Node, callback: NodeCallback);

    /// Remove every callback from `node`
    fn detach_callbacks(&mut self, node: &Self::Node);
}
