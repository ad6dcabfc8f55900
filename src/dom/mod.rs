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

//! In-memory reference document
//!
//! [`Document`] is an arena of nodes implementing [`Tree`]. It parses and
//! serializes an HTML subset, models visibility as a `display:none` style,
//! and counts every mutation that changes the serialized output so callers
//! can observe redundant writes.

pub mod markup;
pub mod serialize;

use crate::error::TemplateResult;
use crate::tree::{AnnotationSlot, InstanceMarker, NodeCallback, Tree};
use indexmap::IndexMap;
use markup::MarkupNode;
use serde_json::{Map, Value};
use std::fmt;

/// Handle to a node of a [`Document`]
///
/// The generation distinguishes successive occupants of a reused slot, so a
/// handle to a removed node never resolves to its replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum NodeKind {
    Root,
    Element {
        tag: String,
        attributes: IndexMap<String, String>,
    },
    Text(String),
    Comment(String),
}

#[derive(Clone)]
pub(crate) struct NodeData {
    pub(crate) kind: NodeKind,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) visible: bool,
    annotation_slot: Option<AnnotationSlot>,
    instance_marker: Option<InstanceMarker>,
    properties: Map<String, Value>,
    data: Map<String, Value>,
    callbacks: Vec<NodeCallback>,
}

impl NodeData {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
            visible: true,
            annotation_slot: None,
            instance_marker: None,
            properties: Map::new(),
            data: Map::new(),
            callbacks: Vec::new(),
        }
    }
}

#[derive(Clone)]
struct Slot {
    generation: u32,
    data: Option<NodeData>,
}

/// Arena-backed document
///
/// Removing a node or clearing children frees the whole subtree; freed slots
/// are reused with a new generation. Stale handles read as an empty detached
/// node and writes through them are dropped.
#[derive(Clone)]
pub struct Document {
    nodes: Vec<Slot>,
    free: Vec<u32>,
    vacant: NodeData,
    root: NodeId,
    mutations: u64,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("nodes", &self.node_count())
            .field("mutations", &self.mutations)
            .field("markup", &self.to_markup())
            .finish()
    }
}

impl Document {
    /// Create an empty document
    pub fn new() -> Self {
        Self {
            nodes: vec![Slot {
                generation: 0,
                data: Some(NodeData::new(NodeKind::Root)),
            }],
            free: Vec::new(),
            vacant: NodeData::new(NodeKind::Root),
            root: NodeId {
                index: 0,
                generation: 0,
            },
            mutations: 0,
        }
    }

    /// Parse markup into a new document
    pub fn parse(markup: &str) -> TemplateResult<Self> {
        let mut document = Self::new();
        let root = document.root;
        document.append_parsed(root, markup::parse_fragment(markup)?);
        document.mutations = 0;
        Ok(document)
    }

    /// Document root; its children are the top-level nodes
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub(crate) fn node(&self, id: NodeId) -> &NodeData {
        self.nodes
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.data.as_ref())
            .unwrap_or(&self.vacant)
    }

    fn node_mut(&mut self, id: NodeId) -> &mut NodeData {
        let live = self
            .nodes
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.data.as_mut());
        match live {
            Some(data) => data,
            None => {
                log::warn!("Write through stale node handle {id:?} ignored");
                self.vacant = NodeData::new(NodeKind::Root);
                &mut self.vacant
            }
        }
    }

    fn alloc(&mut self, data: NodeData) -> NodeId {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.nodes[index as usize];
                slot.data = Some(data);
                NodeId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.nodes.push(Slot {
                    generation: 0,
                    data: Some(data),
                });
                NodeId {
                    index: (self.nodes.len() - 1) as u32,
                    generation: 0,
                }
            }
        }
    }

    /// Free `node` and its descendants
    fn release(&mut self, node: NodeId) {
        let mut pending = vec![node];
        while let Some(current) = pending.pop() {
            let Some(slot) = self
                .nodes
                .get_mut(current.index as usize)
                .filter(|slot| slot.generation == current.generation)
            else {
                continue;
            };
            if let Some(data) = slot.data.take() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(current.index);
                pending.extend(data.children);
            }
        }
    }

    /// Whether `node` refers to a live node
    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes
            .get(node.index as usize)
            .is_some_and(|slot| slot.generation == node.generation && slot.data.is_some())
    }

    /// Number of live nodes, attached or detached, including the root
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    /// Create a detached element
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.alloc(NodeData::new(NodeKind::Element {
            tag: tag.to_string(),
            attributes: IndexMap::new(),
        }))
    }

    /// Append a detached node as the last child of `parent`
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.node_mut(child).parent = Some(parent);
        self.node_mut(parent).children.push(child);
        self.mutations += 1;
    }

    fn append_parsed(&mut self, parent: NodeId, parsed: Vec<MarkupNode>) {
        let mut pending: Vec<(NodeId, MarkupNode)> =
            parsed.into_iter().rev().map(|node| (parent, node)).collect();
        while let Some((parent, node)) = pending.pop() {
            let (kind, children) = match node {
                MarkupNode::Element {
                    tag,
                    attributes,
                    children,
                } => (
                    NodeKind::Element {
                        tag,
                        attributes: attributes.into_iter().collect(),
                    },
                    children,
                ),
                MarkupNode::Text(text) => (NodeKind::Text(text), Vec::new()),
                MarkupNode::Comment(body) => (NodeKind::Comment(body), Vec::new()),
            };
            let mut data = NodeData::new(kind);
            if let NodeKind::Element { attributes, .. } = &mut data.kind {
                if let Some(style) = attributes.get("style") {
                    let (hidden, rest) = serialize::take_hidden_style(style);
                    if hidden {
                        data.visible = false;
                        if rest.is_empty() {
                            attributes.shift_remove("style");
                        } else {
                            attributes.insert("style".to_string(), rest);
                        }
                    }
                }
            }
            data.parent = Some(parent);
            let id = self.alloc(data);
            self.node_mut(parent).children.push(id);
            pending.extend(children.into_iter().rev().map(|child| (id, child)));
        }
    }

    fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.node_mut(node).parent.take() {
            self.node_mut(parent).children.retain(|child| *child != node);
        }
    }

    fn position_in_parent(&self, node: NodeId) -> Option<(NodeId, usize)> {
        let parent = self.node(node).parent?;
        let index = self.node(parent).children.iter().position(|c| *c == node)?;
        Some((parent, index))
    }

    fn insert_at(&mut self, new: NodeId, parent: NodeId, index: usize) {
        self.node_mut(new).parent = Some(parent);
        self.node_mut(parent).children.insert(index, new);
        self.mutations += 1;
    }

    /// Serialize the whole document
    pub fn to_markup(&self) -> String {
        let mut out = String::new();
        self.write_children(self.root, &mut out);
        out
    }

    /// Serialize `node` including its own tag
    pub fn outer_markup(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.write_node(node, &mut out);
        out
    }

    /// Tag name of an element
    pub fn tag_name(&self, node: NodeId) -> Option<&str> {
        match &self.node(node).kind {
            NodeKind::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    /// Concatenated text of the subtree
    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        let mut pending = vec![node];
        while let Some(current) = pending.pop() {
            let data = self.node(current);
            if let NodeKind::Text(text) = &data.kind {
                out.push_str(text);
            }
            pending.extend(data.children.iter().rev());
        }
        out
    }

    /// Node-local properties
    pub fn properties(&self, node: NodeId) -> &Map<String, Value> {
        &self.node(node).properties
    }

    /// Node-local auxiliary data
    pub fn data(&self, node: NodeId) -> &Map<String, Value> {
        &self.node(node).data
    }

    /// Whether `node` is reachable from the root
    pub fn is_attached(&self, node: NodeId) -> bool {
        let mut current = node;
        while let Some(parent) = self.node(current).parent {
            current = parent;
        }
        current == self.root
    }

    /// Number of output-changing mutations so far
    pub fn mutations(&self) -> u64 {
        self.mutations
    }

    /// Reset the mutation counter
    pub fn reset_mutations(&mut self) {
        self.mutations = 0;
    }

    /// Elements of the subtree in document order, `node` first
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut pending = vec![node];
        while let Some(current) = pending.pop() {
            if matches!(self.node(current).kind, NodeKind::Element { .. }) {
                out.push(current);
            }
            pending.extend(self.node(current).children.iter().rev());
        }
        out
    }
}

impl Tree for Document {
    type Node = NodeId;

    fn attribute(&self, node: &NodeId, name: &str) -> Option<&str> {
        match &self.node(*node).kind {
            NodeKind::Element { attributes, .. } => attributes.get(name).map(String::as_str),
            _ => None,
        }
    }

    fn set_attribute(&mut self, node: &NodeId, name: &str, value: &str) {
        let changed = match &mut self.node_mut(*node).kind {
            NodeKind::Element { attributes, .. }
                if attributes.get(name).map(String::as_str) != Some(value) =>
            {
                attributes.insert(name.to_string(), value.to_string());
                true
            }
            _ => false,
        };
        if changed {
            self.mutations += 1;
        }
    }

    fn remove_attribute(&mut self, node: &NodeId, name: &str) {
        let removed = match &mut self.node_mut(*node).kind {
            NodeKind::Element { attributes, .. } => attributes.shift_remove(name).is_some(),
            _ => false,
        };
        if removed {
            self.mutations += 1;
        }
    }

    fn element_children(&self, node: &NodeId) -> Vec<NodeId> {
        self.node(*node)
            .children
            .iter()
            .copied()
            .filter(|child| matches!(self.node(*child).kind, NodeKind::Element { .. }))
            .collect()
    }

    fn parent(&self, node: &NodeId) -> Option<NodeId> {
        self.node(*node).parent
    }

    fn deep_clone(&mut self, node: &NodeId) -> NodeId {
        let mut copy = self.node(*node).clone();
        copy.parent = None;
        copy.children.clear();
        let root = self.alloc(copy);

        let mut pending: Vec<(NodeId, NodeId)> = self
            .node(*node)
            .children
            .iter()
            .rev()
            .map(|child| (*child, root))
            .collect();
        while let Some((source, parent)) = pending.pop() {
            let mut copy = self.node(source).clone();
            copy.parent = Some(parent);
            copy.children.clear();
            let id = self.alloc(copy);
            self.node_mut(parent).children.push(id);
            pending.extend(self.node(source).children.iter().rev().map(|child| (*child, id)));
        }
        root
    }

    fn insert_before(&mut self, new: &NodeId, reference: &NodeId) {
        self.detach(*new);
        if let Some((parent, index)) = self.position_in_parent(*reference) {
            self.insert_at(*new, parent, index);
        }
    }

    fn insert_after(&mut self, new: &NodeId, reference: &NodeId) {
        self.detach(*new);
        if let Some((parent, index)) = self.position_in_parent(*reference) {
            self.insert_at(*new, parent, index + 1);
        }
    }

    fn replace(&mut self, new: &NodeId, old: &NodeId) {
        self.detach(*new);
        if let Some((parent, index)) = self.position_in_parent(*old) {
            self.node_mut(parent).children[index] = *new;
            self.node_mut(*new).parent = Some(parent);
            self.node_mut(*old).parent = None;
            self.mutations += 1;
        }
    }

    fn remove(&mut self, node: &NodeId) {
        if *node == self.root || !self.contains(*node) {
            return;
        }
        if self.node(*node).parent.is_some() {
            self.detach(*node);
            self.mutations += 1;
        }
        self.release(*node);
    }

    fn inner_markup(&self, node: &NodeId) -> String {
        let mut out = String::new();
        self.write_children(*node, &mut out);
        out
    }

    fn clear_children(&mut self, node: &NodeId) {
        let children = std::mem::take(&mut self.node_mut(*node).children);
        if !children.is_empty() {
            for child in children {
                self.release(child);
            }
            self.mutations += 1;
        }
    }

    fn append_text(&mut self, node: &NodeId, text: &str) {
        let id = self.alloc(NodeData::new(NodeKind::Text(text.to_string())));
        self.append_child(*node, id);
    }

    fn append_markup(&mut self, parent: &NodeId, markup: &str) -> TemplateResult<()> {
        let parsed = markup::parse_fragment(markup)?;
        if !parsed.is_empty() {
            self.append_parsed(*parent, parsed);
            self.mutations += 1;
        }
        Ok(())
    }

    fn set_visible(&mut self, node: &NodeId, visible: bool) {
        let data = self.node_mut(*node);
        if data.visible != visible {
            data.visible = visible;
            self.mutations += 1;
        }
    }

    fn is_visible(&self, node: &NodeId) -> bool {
        self.node(*node).visible
    }

    fn find_by_id(&self, id_attribute: &str, id: &str) -> Option<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .find(|node| self.attribute(node, id_attribute) == Some(id))
    }

    fn create_hidden_container(&mut self, id_attribute: &str, id: &str) -> NodeId {
        let container = self.create_element("div");
        self.set_attribute(&container, id_attribute, id);
        self.node_mut(container).visible = false;
        let root = self.root;
        self.append_child(root, container);
        container
    }

    fn properties_mut(&mut self, node: &NodeId) -> &mut Map<String, Value> {
        &mut self.node_mut(*node).properties
    }

    fn data_mut(&mut self, node: &NodeId) -> &mut Map<String, Value> {
        &mut self.node_mut(*node).data
    }

    fn annotation_slot(&self, node: &NodeId) -> Option<AnnotationSlot> {
        self.node(*node).annotation_slot
    }

    fn set_annotation_slot(&mut self, node: &NodeId, slot: AnnotationSlot) {
        self.node_mut(*node).annotation_slot = Some(slot);
    }

    fn instance_marker(&self, node: &NodeId) -> Option<InstanceMarker> {
        self.node(*node).instance_marker
    }

    fn set_instance_marker(&mut self, node: &NodeId, marker: Option<InstanceMarker>) {
        self.node_mut(*node).instance_marker = marker;
    }

    fn callbacks(&self, node: &NodeId) -> Vec<NodeCallback> {
        self.node(*node).callbacks.clone()
    }

    fn attach_callback(&mut self, node: &NodeId, callback: NodeCallback) {
        self.node_mut(*node).callbacks.push(callback);
    }

    fn detach_callbacks(&mut self, node: &NodeId) {
        self.node_mut(*node).callbacks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_serialize_roundtrip() {
        let source = r#"<div id="a" class="x"><p>one &amp; two</p><br><!-- c --></div>"#;
        let doc = Document::parse(source).unwrap();
        assert_eq!(doc.to_markup(), source);
        assert_eq!(doc.mutations(), 0);
    }

    #[test]
    fn test_hidden_style_maps_to_visibility() {
        let mut doc = Document::parse(r#"<p style="display:none; color:red">x</p>"#).unwrap();
        let p = doc.element_children(&doc.root())[0];
        assert!(!doc.is_visible(&p));
        assert_eq!(doc.attribute(&p, "style"), Some("color:red"));

        doc.set_visible(&p, true);
        assert_eq!(doc.to_markup(), r#"<p style="color:red">x</p>"#);
        doc.set_visible(&p, false);
        assert_eq!(doc.to_markup(), r#"<p style="display:none;color:red">x</p>"#);
    }

    #[test]
    fn test_mutation_counter_ignores_no_op_writes() {
        let mut doc = Document::parse(r#"<p class="a"></p>"#).unwrap();
        let p = doc.element_children(&doc.root())[0];
        doc.set_attribute(&p, "class", "a");
        doc.set_visible(&p, true);
        doc.remove_attribute(&p, "missing");
        assert_eq!(doc.mutations(), 0);

        doc.set_attribute(&p, "class", "b");
        doc.append_text(&p, "hi");
        assert_eq!(doc.mutations(), 2);
    }

    #[test]
    fn test_insert_replace_remove() {
        let mut doc = Document::parse("<ul><li>a</li></ul>").unwrap();
        let ul = doc.element_children(&doc.root())[0];
        let li = doc.element_children(&ul)[0];

        let before = doc.deep_clone(&li);
        doc.clear_children(&before);
        doc.append_text(&before, "0");
        doc.insert_before(&before, &li);

        let after = doc.create_element("li");
        doc.append_text(&after, "z");
        doc.insert_after(&after, &li);
        assert_eq!(doc.to_markup(), "<ul><li>0</li><li>a</li><li>z</li></ul>");

        let span = doc.create_element("span");
        doc.replace(&span, &li);
        doc.remove(&after);
        assert_eq!(doc.to_markup(), "<ul><li>0</li><span></span></ul>");
        assert!(!doc.is_attached(li));
    }

    #[test]
    fn test_deep_clone_carries_metadata() {
        let mut doc = Document::parse(r#"<div><b>x</b></div>"#).unwrap();
        let div = doc.element_children(&doc.root())[0];
        let slot = AnnotationSlot { cache: 7, index: 3 };
        doc.set_annotation_slot(&div, slot);
        doc.set_instance_marker(&div, Some(InstanceMarker::new(1, true)));
        doc.properties_mut(&div).insert("k".to_string(), Value::from(1));

        let copy = doc.deep_clone(&div);
        assert_eq!(doc.annotation_slot(&copy), Some(slot));
        assert_eq!(doc.instance_marker(&copy), Some(InstanceMarker::new(1, true)));
        assert_eq!(doc.properties(copy).get("k"), Some(&Value::from(1)));
        assert_eq!(doc.outer_markup(copy), "<div><b>x</b></div>");
        assert_eq!(doc.parent(&copy), None);
    }

    #[test]
    fn test_removed_subtrees_are_reclaimed() {
        let mut doc = Document::parse("<ul><li><b>a</b></li><li>b</li></ul>").unwrap();
        let ul = doc.element_children(&doc.root())[0];
        let first = doc.element_children(&ul)[0];
        let bold = doc.element_children(&first)[0];
        let before = doc.node_count();

        doc.remove(&first);
        assert_eq!(doc.node_count(), before - 3);
        assert!(!doc.contains(first));
        assert!(!doc.contains(bold));

        // Reused slots get a fresh generation
        let fresh = doc.create_element("li");
        assert!(doc.contains(fresh));
        assert_ne!(fresh, first);
        assert_ne!(fresh, bold);
        assert_eq!(doc.tag_name(first), None);
        doc.set_attribute(&first, "class", "stale");
        assert_eq!(doc.attribute(&fresh, "class"), None);

        doc.clear_children(&ul);
        assert_eq!(doc.to_markup(), "<ul></ul>");
        assert_eq!(doc.node_count(), 3);
    }

    #[test]
    fn test_repeated_text_replacement_stays_bounded() {
        let mut doc = Document::parse("<p>0</p>").unwrap();
        let p = doc.element_children(&doc.root())[0];
        let before = doc.node_count();
        for i in 0..1_000 {
            doc.clear_children(&p);
            doc.append_text(&p, &i.to_string());
        }
        assert_eq!(doc.node_count(), before);
        assert_eq!(doc.to_markup(), "<p>999</p>");
    }

    #[test]
    fn test_root_cannot_be_removed() {
        let mut doc = Document::parse("<p></p>").unwrap();
        let root = doc.root();
        doc.remove(&root);
        assert!(doc.contains(root));
        assert_eq!(doc.to_markup(), "<p></p>");
    }

    #[test]
    fn test_find_by_id_and_hidden_container() {
        let mut doc = Document::parse(r#"<div><p id="t">x</p></div>"#).unwrap();
        assert!(doc.find_by_id("id", "t").is_some());
        assert!(doc.find_by_id("id", "js-templates").is_none());

        let container = doc.create_hidden_container("id", "js-templates");
        doc.append_markup(&container, r#"<i id="late"></i>"#).unwrap();
        assert!(doc.find_by_id("id", "late").is_some());
        assert!(doc.to_markup().ends_with(r#"<div id="js-templates" style="display:none"><i id="late"></i></div>"#));
    }
}
