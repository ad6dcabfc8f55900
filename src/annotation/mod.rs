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

//! Annotation sets: the compiled bindings of a node shape
//!
//! Nodes whose recognized binding attributes are textually identical share one
//! [`AnnotationSet`]. The cache key is the fingerprint: `name=value` pairs in
//! canonical binding order joined by `&`, with `%`, `&` and `=` in values
//! percent-encoded.

use crate::compiler::{CacheStats, Evaluator, ExpressionCompiler};
use crate::tree::{AnnotationSlot, Tree};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Marker distinguishing a literal transclusion reference from an expression
pub const LITERAL_REFERENCE_PREFIX: char = '#';

/// Fingerprint pair separator
pub const FINGERPRINT_SEPARATOR: char = '&';

/// A recognized binding attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Binding {
    /// List or optional context selection
    Select,
    /// Visibility gate
    Display,
    /// Attribute, variable and property assignments
    Values,
    /// Local variable bindings
    Vars,
    /// Side-effecting expressions
    Eval,
    /// Subtree substitution
    Include,
    /// Content replacement
    Content,
    /// Abort processing when truthy
    Skip,
    /// Force-hide when truthy
    Hide,
    /// Force-show when truthy
    Show,
    /// Static identity
    Id,
    /// Computed identity
    IdExpr,
    /// Content clearing policy
    Overwrite,
    /// Node-local auxiliary data
    Data,
}

/// How a binding's raw value is compiled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingForm {
    /// One expression
    Scalar,
    /// `label=expr | label=expr`
    List,
    /// `expr; expr`
    Sequence,
    /// Literal text, or an expression when not prefixed with `#`
    Reference,
    /// Literal text
    Literal,
}

impl Binding {
    /// Every binding, in canonical fingerprint order
    pub const ALL: [Binding; 14] = [
        Binding::Select,
        Binding::Display,
        Binding::Values,
        Binding::Vars,
        Binding::Eval,
        Binding::Include,
        Binding::Content,
        Binding::Skip,
        Binding::Hide,
        Binding::Show,
        Binding::Id,
        Binding::IdExpr,
        Binding::Overwrite,
        Binding::Data,
    ];

    /// Attribute name without the namespace prefix
    pub fn suffix(self) -> &'static str {
        match self {
            Binding::Select => "select",
            Binding::Display => "if",
            Binding::Values => "values",
            Binding::Vars => "vars",
            Binding::Eval => "eval",
            Binding::Include => "include",
            Binding::Content => "content",
            Binding::Skip => "skip",
            Binding::Hide => "hide",
            Binding::Show => "show",
            Binding::Id => "id",
            Binding::IdExpr => "idexpr",
            Binding::Overwrite => "overwrite",
            Binding::Data => "data",
        }
    }

    /// Compiled form of the binding's value
    pub fn form(self) -> BindingForm {
        match self {
            Binding::Values | Binding::Vars | Binding::Data => BindingForm::List,
            Binding::Eval => BindingForm::Sequence,
            Binding::Include => BindingForm::Reference,
            Binding::Id | Binding::Overwrite => BindingForm::Literal,
            _ => BindingForm::Scalar,
        }
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Resolved target of an include binding
#[derive(Debug, Clone, PartialEq)]
pub enum Transclude {
    /// Template id used verbatim
    Literal(String),
    /// Expression producing the template id
    Expression(Evaluator),
}

/// `(label, evaluator)` pairs of a list binding
pub type LabeledEvaluators = Vec<(String, Evaluator)>;

/// Compiled bindings shared by every node with the same fingerprint
#[derive(Debug, Default, PartialEq)]
pub struct AnnotationSet {
    /// Cache key this set was built for (empty for the shared empty set)
    pub fingerprint: String,
    /// `select`
    pub select: Option<Evaluator>,
    /// `if`
    pub display: Option<Evaluator>,
    /// `values`
    pub values: Option<LabeledEvaluators>,
    /// `vars`
    pub vars: Option<LabeledEvaluators>,
    /// `eval`
    pub eval: Option<Vec<Evaluator>>,
    /// `include`
    pub include: Option<Transclude>,
    /// `content`
    pub content: Option<Evaluator>,
    /// `skip`
    pub skip: Option<Evaluator>,
    /// `hide`
    pub hide: Option<Evaluator>,
    /// `show`
    pub show: Option<Evaluator>,
    /// `id`
    pub id: Option<String>,
    /// `idexpr`
    pub id_expr: Option<Evaluator>,
    /// `overwrite`
    pub overwrite: Option<String>,
    /// `data`
    pub data: Option<LabeledEvaluators>,
}

impl AnnotationSet {
    /// Whether no binding is present
    pub fn is_empty(&self) -> bool {
        self.fingerprint.is_empty()
    }

    /// Whether existing content must be cleared before writing new content
    pub fn clears_content(&self) -> bool {
        self.overwrite.as_deref().is_none_or(|flag| flag == "true")
    }

    fn build(fingerprint: String, raw: &[(Binding, String)], compiler: &mut ExpressionCompiler) -> Self {
        let mut set = AnnotationSet {
            fingerprint,
            ..AnnotationSet::default()
        };
        for (binding, value) in raw {
            match binding {
                Binding::Select => set.select = Some(compiler.compile(value)),
                Binding::Display => set.display = Some(compiler.compile(value)),
                Binding::Values => set.values = Some(compiler.compile_list(value)),
                Binding::Vars => set.vars = Some(compiler.compile_list(value)),
                Binding::Eval => set.eval = Some(compiler.compile_sequence(value)),
                Binding::Include => {
                    set.include = Some(match value.strip_prefix(LITERAL_REFERENCE_PREFIX) {
                        Some(id) => Transclude::Literal(id.to_string()),
                        None => Transclude::Expression(compiler.compile(value)),
                    })
                }
                Binding::Content => set.content = Some(compiler.compile(value)),
                Binding::Skip => set.skip = Some(compiler.compile(value)),
                Binding::Hide => set.hide = Some(compiler.compile(value)),
                Binding::Show => set.show = Some(compiler.compile(value)),
                Binding::Id => set.id = Some(value.clone()),
                Binding::IdExpr => set.id_expr = Some(compiler.compile(value)),
                Binding::Overwrite => set.overwrite = Some(value.clone()),
                Binding::Data => set.data = Some(compiler.compile_list(value)),
            }
        }
        set
    }
}

static NEXT_CACHE_ID: AtomicU64 = AtomicU64::new(1);

fn next_cache_id() -> u64 {
    NEXT_CACHE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Fingerprint-keyed store of annotation sets
///
/// Slot 0 always holds the shared empty set. Nodes remember their slot, so a
/// second lookup on the same node (or a clone of it) skips the attribute scan.
/// Slots are tagged with the cache identity, which [`AnnotationCache::clear`]
/// renews.
#[derive(Debug)]
pub struct AnnotationCache {
    id: u64,
    prefix: String,
    attribute_names: [String; 14],
    sets: Vec<Arc<AnnotationSet>>,
    by_fingerprint: FxHashMap<String, u32>,
    hits: u64,
    misses: u64,
}

impl AnnotationCache {
    /// Create a cache recognizing attributes named `<prefix><binding>`
    pub fn new(prefix: &str) -> Self {
        Self {
            id: next_cache_id(),
            prefix: prefix.to_string(),
            attribute_names: Binding::ALL.map(|binding| format!("{prefix}{}", binding.suffix())),
            sets: vec![Arc::new(AnnotationSet::default())],
            by_fingerprint: FxHashMap::default(),
            hits: 0,
            misses: 0,
        }
    }

    /// Attribute namespace prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Full attribute name of a binding
    pub fn attribute_name(&self, binding: Binding) -> &str {
        let position = Binding::ALL.iter().position(|b| *b == binding).unwrap_or(0);
        &self.attribute_names[position]
    }

    /// The shared empty annotation set
    pub fn empty_set(&self) -> Arc<AnnotationSet> {
        Arc::clone(&self.sets[0])
    }

    /// Raw recognized bindings of `node`, in canonical order
    pub fn raw_bindings<T: Tree>(&self, tree: &T, node: &T::Node) -> Vec<(Binding, String)> {
        Binding::ALL
            .iter()
            .zip(self.attribute_names.iter())
            .filter_map(|(binding, name)| {
                tree.attribute(node, name)
                    .map(|value| (*binding, value.to_string()))
            })
            .collect()
    }

    /// Index of the set recorded on `node`, if this cache recorded it
    pub fn slot_of<T: Tree>(&self, tree: &T, node: &T::Node) -> Option<u32> {
        tree.annotation_slot(node)
            .filter(|slot| slot.cache == self.id)
            .map(|slot| slot.index)
    }

    /// Annotation set of `node`, building and caching it on first sight
    pub fn lookup<T: Tree>(
        &mut self,
        tree: &mut T,
        node: &T::Node,
        compiler: &mut ExpressionCompiler,
    ) -> Arc<AnnotationSet> {
        if let Some(set) = self
            .slot_of(tree, node)
            .and_then(|index| self.sets.get(index as usize))
        {
            return Arc::clone(set);
        }

        let raw = self.raw_bindings(tree, node);
        let slot = if raw.is_empty() {
            0
        } else {
            let fingerprint = fingerprint(&raw);
            match self.by_fingerprint.get(&fingerprint) {
                Some(&slot) => {
                    self.hits += 1;
                    slot
                }
                None => {
                    self.misses += 1;
                    log::trace!("New annotation set: {fingerprint}");
                    let set = AnnotationSet::build(fingerprint.clone(), &raw, compiler);
                    let slot = self.sets.len() as u32;
                    self.sets.push(Arc::new(set));
                    self.by_fingerprint.insert(fingerprint, slot);
                    slot
                }
            }
        };
        tree.set_annotation_slot(
            node,
            AnnotationSlot {
                cache: self.id,
                index: slot,
            },
        );
        Arc::clone(&self.sets[slot as usize])
    }

    /// Look up every node in the subtree rooted at `node`
    pub fn prime<T: Tree>(&mut self, tree: &mut T, node: &T::Node, compiler: &mut ExpressionCompiler) {
        let mut pending = vec![node.clone()];
        while let Some(current) = pending.pop() {
            self.lookup(tree, &current, compiler);
            pending.extend(tree.element_children(&current));
        }
    }

    /// All distinct non-empty sets, in creation order
    pub fn sets(&self) -> impl Iterator<Item = &Arc<AnnotationSet>> {
        self.sets.iter().skip(1)
    }

    /// Fingerprint lookup statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.sets.len() - 1,
        }
    }

    /// Drop every cached set
    ///
    /// Slots recorded on nodes before the call no longer resolve, so those
    /// nodes are rescanned on their next lookup.
    pub fn clear(&mut self) {
        self.id = next_cache_id();
        self.sets.truncate(1);
        self.by_fingerprint.clear();
        self.hits = 0;
        self.misses = 0;
    }
}

/// Fingerprint of raw bindings
pub fn fingerprint(raw: &[(Binding, String)]) -> String {
    let mut key = String::new();
    for (i, (binding, value)) in raw.iter().enumerate() {
        if i > 0 {
            key.push(FINGERPRINT_SEPARATOR);
        }
        key.push_str(binding.suffix());
        key.push('=');
        for c in value.chars() {
            match c {
                '%' => key.push_str("%25"),
                FINGERPRINT_SEPARATOR => key.push_str("%26"),
                '=' => key.push_str("%3D"),
                _ => key.push(c),
            }
        }
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;
    use pretty_assertions::assert_eq;

    const PREFIX: &str = "data-jst-";

    #[test]
    fn test_fingerprint_is_canonical() {
        let raw = vec![
            (Binding::Select, "items".to_string()),
            (Binding::Content, "name".to_string()),
        ];
        assert_eq!(fingerprint(&raw), "select=items&content=name");
    }

    #[test]
    fn test_fingerprint_escapes_separators_in_values() {
        let merged = vec![(Binding::Display, "x&content=y".to_string())];
        let split = vec![
            (Binding::Display, "x".to_string()),
            (Binding::Content, "y".to_string()),
        ];
        assert_eq!(fingerprint(&merged), "if=x%26content%3Dy");
        assert_ne!(fingerprint(&merged), fingerprint(&split));
        assert_eq!(
            fingerprint(&[(Binding::Values, "a=b%c".to_string())]),
            "values=a%3Db%25c"
        );
    }

    #[test]
    fn test_slots_from_another_cache_are_ignored() {
        let mut doc = Document::parse(r#"<p data-jst-content="a"></p><i data-jst-content="b"></i>"#).unwrap();
        let mut first = AnnotationCache::new(PREFIX);
        let mut second = AnnotationCache::new(PREFIX);
        let mut compiler = ExpressionCompiler::new();
        let nodes = doc.element_children(&doc.root());

        first.lookup(&mut doc, &nodes[0], &mut compiler);
        second.lookup(&mut doc, &nodes[1], &mut compiler);
        let set = second.lookup(&mut doc, &nodes[0], &mut compiler);

        assert_eq!(set.fingerprint, "content=a");
        assert_eq!(first.slot_of(&doc, &nodes[0]), None);
        assert_eq!(second.slot_of(&doc, &nodes[0]), Some(2));
    }

    #[test]
    fn test_clear_invalidates_recorded_slots() {
        let mut doc = Document::parse(r#"<p data-jst-content="a"></p><i data-jst-content="b"></i>"#).unwrap();
        let mut cache = AnnotationCache::new(PREFIX);
        let mut compiler = ExpressionCompiler::new();
        let nodes = doc.element_children(&doc.root());

        cache.lookup(&mut doc, &nodes[0], &mut compiler);
        cache.clear();
        assert_eq!(cache.slot_of(&doc, &nodes[0]), None);

        assert_eq!(cache.lookup(&mut doc, &nodes[1], &mut compiler).fingerprint, "content=b");
        assert_eq!(cache.lookup(&mut doc, &nodes[0], &mut compiler).fingerprint, "content=a");
        assert_eq!(cache.stats().entries, 2);
    }

    #[test]
    fn test_identical_nodes_share_a_set() {
        let mut doc = Document::parse(
            r#"<ul><li data-jst-content="name" data-jst-if="ok">a</li><li data-jst-if="ok" data-jst-content="name">b</li><li>c</li></ul>"#,
        )
        .unwrap();
        let mut cache = AnnotationCache::new(PREFIX);
        let mut compiler = ExpressionCompiler::new();
        let ul = doc.element_children(&doc.root())[0];
        let items = doc.element_children(&ul);

        let first = cache.lookup(&mut doc, &items[0], &mut compiler);
        let second = cache.lookup(&mut doc, &items[1], &mut compiler);
        let plain = cache.lookup(&mut doc, &items[2], &mut compiler);

        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&plain, &cache.empty_set()));
        assert_eq!(first.fingerprint, "if=ok&content=name");
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1, entries: 1 });
    }

    #[test]
    fn test_slot_short_circuits_rescan() {
        let mut doc = Document::parse(r#"<p data-jst-content="x"></p>"#).unwrap();
        let mut cache = AnnotationCache::new(PREFIX);
        let mut compiler = ExpressionCompiler::new();
        let p = doc.element_children(&doc.root())[0];

        cache.lookup(&mut doc, &p, &mut compiler);
        doc.remove_attribute(&p, "data-jst-content");
        let again = cache.lookup(&mut doc, &p, &mut compiler);

        assert_eq!(again.fingerprint, "content=x");
        assert_eq!(cache.stats().hits, 0);
    }

    #[test]
    fn test_compiled_forms() {
        let mut doc = Document::parse(
            r##"<div data-jst-values="a=1 | b=2" data-jst-eval="x; y" data-jst-include="#tpl" data-jst-id="fixed" data-jst-overwrite="false"></div>"##,
        )
        .unwrap();
        let mut cache = AnnotationCache::new(PREFIX);
        let mut compiler = ExpressionCompiler::new();
        let div = doc.element_children(&doc.root())[0];
        let set = cache.lookup(&mut doc, &div, &mut compiler);

        assert_eq!(set.values.as_ref().map(Vec::len), Some(2));
        assert_eq!(set.eval.as_ref().map(Vec::len), Some(2));
        assert_eq!(set.include, Some(Transclude::Literal("tpl".to_string())));
        assert_eq!(set.id.as_deref(), Some("fixed"));
        assert!(!set.clears_content());
    }

    #[test]
    fn test_custom_prefix() {
        let mut doc = Document::parse(r#"<p jst:content="x" data-jst-content="y"></p>"#).unwrap();
        let mut cache = AnnotationCache::new("jst:");
        let mut compiler = ExpressionCompiler::new();
        let p = doc.element_children(&doc.root())[0];
        assert_eq!(cache.lookup(&mut doc, &p, &mut compiler).fingerprint, "content=x");
        assert_eq!(cache.attribute_name(Binding::IdExpr), "jst:idexpr");
    }
}
