//! Declarative view description.
//!
//! The view pipeline produces a [`VNode`] tree with no knowledge of the
//! surface it will be painted on. [`diff`] compares two trees positionally
//! so a rendering adapter can skip work when nothing changed.

use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VNode {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: &'static str,
    pub key: Option<String>,
    pub classes: Vec<String>,
    pub attrs: BTreeMap<String, String>,
    pub hidden: bool,
    pub children: Vec<VNode>,
}

impl Element {
    pub fn new(tag: &'static str) -> Self {
        Self {
            tag,
            key: None,
            classes: Vec::new(),
            attrs: BTreeMap::new(),
            hidden: false,
            children: Vec::new(),
        }
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    pub fn class_if(self, cond: bool, class: impl Into<String>) -> Self {
        if cond { self.class(class) } else { self }
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn child(mut self, child: impl Into<VNode>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn children<I>(mut self, children: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<VNode>,
    {
        self.children.extend(children.into_iter().map(Into::into));
        self
    }

    pub fn text(self, text: impl Into<String>) -> Self {
        self.child(VNode::Text(text.into()))
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    pub fn attr_value(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    /// Concatenated text of all descendants.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }

    /// Depth-first search for the first element carrying `class`.
    pub fn find_class(&self, class: &str) -> Option<&Element> {
        if self.has_class(class) {
            return Some(self);
        }
        self.children.iter().find_map(|child| match child {
            VNode::Element(el) => el.find_class(class),
            VNode::Text(_) => None,
        })
    }

    /// All descendant elements carrying `class`, in document order.
    pub fn find_all_class<'a>(&'a self, class: &str, out: &mut Vec<&'a Element>) {
        if self.has_class(class) {
            out.push(self);
        }
        for child in &self.children {
            if let VNode::Element(el) = child {
                el.find_all_class(class, out);
            }
        }
    }

    fn same_shape(&self, other: &Element) -> bool {
        self.tag == other.tag && self.key == other.key
    }
}

fn collect_text(children: &[VNode], out: &mut String) {
    for child in children {
        match child {
            VNode::Text(text) => out.push_str(text),
            VNode::Element(el) => collect_text(&el.children, out),
        }
    }
}

impl From<Element> for VNode {
    fn from(value: Element) -> Self {
        Self::Element(value)
    }
}

impl From<&str> for VNode {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for VNode {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Child indices from the root down to the patched node.
pub type NodePath = Vec<usize>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patch {
    Replace { path: NodePath, node: VNode },
    SetText { path: NodePath, text: String },
    SetProps { path: NodePath },
    Insert { path: NodePath, index: usize, node: VNode },
    Remove { path: NodePath, index: usize },
}

/// Positional diff. Nodes with a different tag or key are replaced whole;
/// surplus children are inserted or removed at the tail.
pub fn diff(old: &VNode, new: &VNode) -> Vec<Patch> {
    let mut patches = Vec::new();
    diff_node(old, new, &mut Vec::new(), &mut patches);
    patches
}

fn diff_node(old: &VNode, new: &VNode, path: &mut NodePath, out: &mut Vec<Patch>) {
    match (old, new) {
        (VNode::Text(a), VNode::Text(b)) => {
            if a != b {
                out.push(Patch::SetText {
                    path: path.clone(),
                    text: b.clone(),
                });
            }
        }
        (VNode::Element(a), VNode::Element(b)) if a.same_shape(b) => {
            if a.classes != b.classes || a.attrs != b.attrs || a.hidden != b.hidden {
                out.push(Patch::SetProps { path: path.clone() });
            }

            let shared = a.children.len().min(b.children.len());
            for idx in 0..shared {
                path.push(idx);
                diff_node(&a.children[idx], &b.children[idx], path, out);
                path.pop();
            }
            for idx in shared..b.children.len() {
                out.push(Patch::Insert {
                    path: path.clone(),
                    index: idx,
                    node: b.children[idx].clone(),
                });
            }
            // Highest index first so earlier removals do not shift later ones.
            for idx in (shared..a.children.len()).rev() {
                out.push(Patch::Remove {
                    path: path.clone(),
                    index: idx,
                });
            }
        }
        _ => out.push(Patch::Replace {
            path: path.clone(),
            node: new.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(items: &[&str]) -> VNode {
        Element::new("ul")
            .children(items.iter().map(|item| Element::new("li").key(*item).text(*item)))
            .into()
    }

    #[test]
    fn identical_trees_produce_no_patches() {
        assert!(diff(&list(&["a", "b"]), &list(&["a", "b"])).is_empty());
    }

    #[test]
    fn appended_children_are_inserted() {
        let patches = diff(&list(&["a"]), &list(&["a", "b"]));
        assert_eq!(patches.len(), 1);
        assert!(matches!(&patches[0], Patch::Insert { index: 1, .. }));
    }

    #[test]
    fn removed_children_are_dropped_from_the_tail() {
        let patches = diff(&list(&["a", "b", "c"]), &list(&["a"]));
        assert_eq!(
            patches,
            vec![
                Patch::Remove { path: vec![], index: 2 },
                Patch::Remove { path: vec![], index: 1 },
            ]
        );
    }

    #[test]
    fn different_keys_replace_the_node() {
        let patches = diff(&list(&["a"]), &list(&["z"]));
        assert!(matches!(&patches[0], Patch::Replace { path, .. } if path == &vec![0]));
    }

    #[test]
    fn attribute_changes_patch_props() {
        let old: VNode = Element::new("main").attr("data-theme", "light").into();
        let new: VNode = Element::new("main").attr("data-theme", "dark").into();
        assert_eq!(diff(&old, &new), vec![Patch::SetProps { path: vec![] }]);
    }

    #[test]
    fn find_class_walks_descendants() {
        let tree = Element::new("main").child(Element::new("section").child(Element::new("p").class("empty").text("Nothing")));
        let found = tree.find_class("empty").expect("present");
        assert_eq!(found.text_content(), "Nothing");
    }
}
