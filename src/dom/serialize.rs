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

//! Markup serialization for the reference document

use super::markup::is_void;
use super::{Document, NodeId, NodeKind};

const HIDDEN_STYLE: &str = "display:none";

/// Escape text content
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape a double-quoted attribute value
pub fn escape_attribute(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Split a `display:none` declaration out of a style attribute
///
/// Returns whether the declaration was present and the remaining style.
pub fn take_hidden_style(style: &str) -> (bool, String) {
    let mut hidden = false;
    let rest: Vec<&str> = style
        .split(';')
        .map(str::trim)
        .filter(|declaration| {
            let compact: String = declaration.chars().filter(|c| !c.is_whitespace()).collect();
            if compact.eq_ignore_ascii_case(HIDDEN_STYLE) {
                hidden = true;
                false
            } else {
                !declaration.is_empty()
            }
        })
        .collect();
    (hidden, rest.join(";"))
}

enum Emit<'a> {
    Node(NodeId),
    Close(&'a str),
}

impl Document {
    pub(super) fn write_children(&self, node: NodeId, out: &mut String) {
        let pending = self.node(node).children.iter().rev().map(|child| Emit::Node(*child)).collect();
        self.write_pending(pending, out);
    }

    pub(super) fn write_node(&self, node: NodeId, out: &mut String) {
        self.write_pending(vec![Emit::Node(node)], out);
    }

    fn write_pending<'a>(&'a self, mut pending: Vec<Emit<'a>>, out: &mut String) {
        while let Some(emit) = pending.pop() {
            let node = match emit {
                Emit::Node(node) => node,
                Emit::Close(tag) => {
                    out.push_str("</");
                    out.push_str(tag);
                    out.push('>');
                    continue;
                }
            };
            let data = self.node(node);
            match &data.kind {
                NodeKind::Root => {
                    pending.extend(data.children.iter().rev().map(|child| Emit::Node(*child)));
                }
                NodeKind::Text(text) => out.push_str(&escape_text(text)),
                NodeKind::Comment(body) => {
                    out.push_str("<!--");
                    out.push_str(body);
                    out.push_str("-->");
                }
                NodeKind::Element { tag, attributes } => {
                    out.push('<');
                    out.push_str(tag);
                    let mut wrote_style = false;
                    for (name, value) in attributes {
                        out.push(' ');
                        out.push_str(name);
                        if name == "style" && !data.visible {
                            wrote_style = true;
                            out.push_str("=\"");
                            out.push_str(HIDDEN_STYLE);
                            if !value.is_empty() {
                                out.push(';');
                                out.push_str(&escape_attribute(value));
                            }
                            out.push('"');
                        } else if !value.is_empty() {
                            out.push_str("=\"");
                            out.push_str(&escape_attribute(value));
                            out.push('"');
                        }
                    }
                    if !data.visible && !wrote_style {
                        out.push_str(" style=\"");
                        out.push_str(HIDDEN_STYLE);
                        out.push('"');
                    }
                    out.push('>');
                    if is_void(tag) {
                        continue;
                    }
                    pending.push(Emit::Close(tag));
                    pending.extend(data.children.iter().rev().map(|child| Emit::Node(*child)));
                }
            }
        }
    }
}
