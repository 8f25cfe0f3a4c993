//! In-memory document used off-wasm.
//!
//! Just enough of the DOM to exercise grafting: element tree, ids, classes,
//! attributes, inline styles and a per-node table standing in for computed
//! styles. Nodes can be poisoned so every mutation on them fails, which is how
//! tests simulate a hostile page.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};

use super::{Dom, InlineStyle};
use crate::error::DomError;

/// Handle to a [`MemoryDom`] element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Default)]
struct NodeData {
    tag: String,
    id: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    classes: Vec<String>,
    attributes: BTreeMap<String, String>,
    inline: BTreeMap<String, InlineStyle>,
    computed: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct Tree {
    nodes: Vec<NodeData>,
    poisoned: HashSet<NodeId>,
}

/// In-memory [`Dom`] implementation.
#[derive(Debug)]
pub struct MemoryDom {
    tree: RefCell<Tree>,
    html: NodeId,
    head: NodeId,
    body: NodeId,
}

impl Default for MemoryDom {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDom {
    /// Create a document with `<html>`, `<head>` and `<body>`.
    #[must_use]
    pub fn new() -> Self {
        let mut tree = Tree::default();
        let html = push(&mut tree, "HTML");
        let head = push(&mut tree, "HEAD");
        let body = push(&mut tree, "BODY");
        link(&mut tree, html, head);
        link(&mut tree, html, body);
        Self {
            tree: RefCell::new(tree),
            html,
            head,
            body,
        }
    }

    /// The `<head>` element.
    #[must_use]
    pub const fn head(&self) -> NodeId {
        self.head
    }

    /// The `<html>` element.
    #[must_use]
    pub const fn html(&self) -> NodeId {
        self.html
    }

    /// The `<body>` element.
    #[must_use]
    pub const fn body_node(&self) -> NodeId {
        self.body
    }

    /// Create an element under `parent` and return it.
    pub fn append(&self, parent: NodeId, tag: &str) -> NodeId {
        let mut tree = self.tree.borrow_mut();
        let node = push(&mut tree, &tag.to_ascii_uppercase());
        link(&mut tree, parent, node);
        node
    }

    /// Create an element with an id under `parent`.
    pub fn append_with_id(&self, parent: NodeId, tag: &str, id: &str) -> NodeId {
        let node = self.append(parent, tag);
        self.tree.borrow_mut().nodes[node.0].id = id.to_string();
        node
    }

    /// Set the value `computed_style` reports for `property`.
    pub fn set_computed(&self, node: NodeId, property: &str, value: &str) {
        self.tree.borrow_mut().nodes[node.0]
            .computed
            .insert(property.to_string(), value.to_string());
    }

    /// Make every mutation of `node` fail.
    pub fn poison(&self, node: NodeId) {
        self.tree.borrow_mut().poisoned.insert(node);
    }

    /// Undo [`MemoryDom::poison`].
    pub fn heal(&self, node: NodeId) {
        self.tree.borrow_mut().poisoned.remove(&node);
    }

    /// Detach every child of `node`, like `innerHTML = ""`.
    pub fn clear_children(&self, node: NodeId) {
        let mut tree = self.tree.borrow_mut();
        let children = std::mem::take(&mut tree.nodes[node.0].children);
        for child in children {
            tree.nodes[child.0].parent = None;
        }
    }

    /// Tag names of the children of `node`, for assertions.
    #[must_use]
    pub fn child_tags(&self, node: NodeId) -> Vec<String> {
        let tree = self.tree.borrow();
        tree.nodes[node.0]
            .children
            .iter()
            .map(|c| tree.nodes[c.0].tag.clone())
            .collect()
    }

    fn check(&self, node: NodeId) -> Result<(), DomError> {
        let tree = self.tree.borrow();
        if node.0 >= tree.nodes.len() {
            return Err(DomError::Detached);
        }
        if tree.poisoned.contains(&node) {
            return Err(DomError::Platform(format!("mutation of {node:?} rejected")));
        }
        Ok(())
    }

    fn collect_descendants(tree: &Tree, node: NodeId, out: &mut Vec<NodeId>) {
        for child in &tree.nodes[node.0].children {
            out.push(*child);
            Self::collect_descendants(tree, *child, out);
        }
    }
}

fn push(tree: &mut Tree, tag: &str) -> NodeId {
    tree.nodes.push(NodeData {
        tag: tag.to_string(),
        ..NodeData::default()
    });
    NodeId(tree.nodes.len() - 1)
}

fn unlink(tree: &mut Tree, node: NodeId) {
    if let Some(parent) = tree.nodes[node.0].parent.take() {
        tree.nodes[parent.0].children.retain(|c| *c != node);
    }
}

fn link(tree: &mut Tree, parent: NodeId, node: NodeId) {
    unlink(tree, node);
    tree.nodes[node.0].parent = Some(parent);
    tree.nodes[parent.0].children.push(node);
}

impl Dom for MemoryDom {
    type Node = NodeId;

    fn document_element(&self) -> Result<NodeId, DomError> {
        Ok(self.html)
    }

    fn body(&self) -> Result<NodeId, DomError> {
        let tree = self.tree.borrow();
        if tree.nodes[self.body.0].parent == Some(self.html) {
            Ok(self.body)
        } else {
            Err(DomError::MissingBody)
        }
    }

    fn children(&self, node: &NodeId) -> Vec<NodeId> {
        self.tree
            .borrow()
            .nodes
            .get(node.0)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    fn parent(&self, node: &NodeId) -> Option<NodeId> {
        self.tree.borrow().nodes.get(node.0)?.parent
    }

    fn contains(&self, ancestor: &NodeId, node: &NodeId) -> bool {
        let tree = self.tree.borrow();
        let mut current = Some(*node);
        while let Some(n) = current {
            if n == *ancestor {
                return true;
            }
            current = tree.nodes.get(n.0).and_then(|d| d.parent);
        }
        false
    }

    fn tag_name(&self, node: &NodeId) -> String {
        self.tree
            .borrow()
            .nodes
            .get(node.0)
            .map(|n| n.tag.clone())
            .unwrap_or_default()
    }

    fn id(&self, node: &NodeId) -> String {
        self.tree
            .borrow()
            .nodes
            .get(node.0)
            .map(|n| n.id.clone())
            .unwrap_or_default()
    }

    fn descendant_count(&self, node: &NodeId) -> usize {
        let tree = self.tree.borrow();
        let mut out = Vec::new();
        Self::collect_descendants(&tree, *node, &mut out);
        out.len()
    }

    fn create_element(&self, tag: &str) -> Result<NodeId, DomError> {
        Ok(push(&mut self.tree.borrow_mut(), &tag.to_ascii_uppercase()))
    }

    fn set_id(&self, node: &NodeId, id: &str) -> Result<(), DomError> {
        self.check(*node)?;
        self.tree.borrow_mut().nodes[node.0].id = id.to_string();
        Ok(())
    }

    fn append_child(&self, parent: &NodeId, child: &NodeId) -> Result<(), DomError> {
        self.check(*parent)?;
        self.check(*child)?;
        if self.contains(child, parent) {
            return Err(DomError::Platform("hierarchy request error".to_string()));
        }
        link(&mut self.tree.borrow_mut(), *parent, *child);
        Ok(())
    }

    fn insert_before(&self, parent: &NodeId, child: &NodeId, reference: &NodeId) -> Result<(), DomError> {
        self.check(*parent)?;
        self.check(*child)?;
        if self.parent(reference) != Some(*parent) {
            return Err(DomError::NotAChild);
        }
        let mut tree = self.tree.borrow_mut();
        unlink(&mut tree, *child);
        let index = tree.nodes[parent.0]
            .children
            .iter()
            .position(|c| c == reference)
            .ok_or(DomError::NotAChild)?;
        tree.nodes[parent.0].children.insert(index, *child);
        tree.nodes[child.0].parent = Some(*parent);
        Ok(())
    }

    fn remove(&self, node: &NodeId) -> Result<(), DomError> {
        self.check(*node)?;
        unlink(&mut self.tree.borrow_mut(), *node);
        Ok(())
    }

    fn classes(&self, node: &NodeId) -> Vec<String> {
        self.tree
            .borrow()
            .nodes
            .get(node.0)
            .map(|n| n.classes.clone())
            .unwrap_or_default()
    }

    fn add_class(&self, node: &NodeId, class: &str) -> Result<(), DomError> {
        self.check(*node)?;
        let mut tree = self.tree.borrow_mut();
        let classes = &mut tree.nodes[node.0].classes;
        if !classes.iter().any(|c| c == class) {
            classes.push(class.to_string());
        }
        Ok(())
    }

    fn remove_class(&self, node: &NodeId, class: &str) -> Result<(), DomError> {
        self.check(*node)?;
        self.tree.borrow_mut().nodes[node.0]
            .classes
            .retain(|c| c != class);
        Ok(())
    }

    fn attribute(&self, node: &NodeId, name: &str) -> Option<String> {
        self.tree.borrow().nodes.get(node.0)?.attributes.get(name).cloned()
    }

    fn set_attribute(&self, node: &NodeId, name: &str, value: &str) -> Result<(), DomError> {
        self.check(*node)?;
        self.tree.borrow_mut().nodes[node.0]
            .attributes
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn remove_attribute(&self, node: &NodeId, name: &str) -> Result<(), DomError> {
        self.check(*node)?;
        self.tree.borrow_mut().nodes[node.0].attributes.remove(name);
        Ok(())
    }

    fn computed_style(&self, node: &NodeId, property: &str) -> Option<String> {
        let tree = self.tree.borrow();
        let data = tree.nodes.get(node.0)?;
        if let Some(inline) = data.inline.get(property) {
            return Some(inline.value.clone());
        }
        data.computed.get(property).cloned().or_else(|| match property {
            "display" => Some("block".to_string()),
            "overflow" => Some("visible".to_string()),
            _ => None,
        })
    }

    fn inline_style(&self, node: &NodeId, property: &str) -> Option<InlineStyle> {
        self.tree.borrow().nodes.get(node.0)?.inline.get(property).cloned()
    }

    fn set_inline_style(&self, node: &NodeId, property: &str, style: &InlineStyle) -> Result<(), DomError> {
        self.check(*node)?;
        self.tree.borrow_mut().nodes[node.0]
            .inline
            .insert(property.to_string(), style.clone());
        Ok(())
    }

    fn remove_inline_style(&self, node: &NodeId, property: &str) -> Result<(), DomError> {
        self.check(*node)?;
        self.tree.borrow_mut().nodes[node.0].inline.remove(property);
        Ok(())
    }

    fn elements_with_class(&self, class: &str) -> Vec<NodeId> {
        let tree = self.tree.borrow();
        let mut all = vec![self.html];
        Self::collect_descendants(&tree, self.html, &mut all);
        all.into_iter()
            .filter(|n| tree.nodes[n.0].classes.iter().any(|c| c == class))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_document() {
        let dom = MemoryDom::new();
        assert_eq!(dom.child_tags(dom.html()), vec!["HEAD", "BODY"]);
        assert_eq!(dom.body().unwrap(), dom.body_node());
    }

    #[test]
    fn test_append_moves_node() {
        let dom = MemoryDom::new();
        let a = dom.append(dom.body_node(), "div");
        let b = dom.append(dom.body_node(), "div");
        dom.append_child(&a, &b).unwrap();
        assert_eq!(dom.children(&dom.body_node()), vec![a]);
        assert_eq!(dom.parent(&b), Some(a));
        assert!(dom.contains(&dom.html(), &b));
        assert_eq!(dom.descendant_count(&dom.body_node()), 2);
    }

    #[test]
    fn test_insert_before() {
        let dom = MemoryDom::new();
        let a = dom.append(dom.body_node(), "div");
        let b = dom.append(dom.body_node(), "p");
        let c = dom.create_element("span").unwrap();
        dom.insert_before(&dom.body_node(), &c, &b).unwrap();
        assert_eq!(dom.children(&dom.body_node()), vec![a, c, b]);
        assert_eq!(
            dom.insert_before(&a, &c, &b),
            Err(DomError::NotAChild)
        );
    }

    #[test]
    fn test_cycle_rejected() {
        let dom = MemoryDom::new();
        let a = dom.append(dom.body_node(), "div");
        assert!(dom.append_child(&a, &dom.body_node()).is_err());
    }

    #[test]
    fn test_classes_and_poison() {
        let dom = MemoryDom::new();
        let a = dom.append(dom.body_node(), "div");
        dom.add_class(&a, "x").unwrap();
        dom.add_class(&a, "x").unwrap();
        assert_eq!(dom.classes(&a), vec!["x"]);
        dom.poison(a);
        assert!(dom.add_class(&a, "y").is_err());
        dom.heal(a);
        dom.remove_class(&a, "x").unwrap();
        assert!(!dom.has_class(&a, "x"));
    }

    #[test]
    fn test_computed_defaults_and_inline() {
        let dom = MemoryDom::new();
        let a = dom.append(dom.body_node(), "div");
        assert_eq!(dom.computed_style(&a, "overflow").as_deref(), Some("visible"));
        dom.set_computed(a, "display", "contents");
        assert_eq!(dom.computed_style(&a, "display").as_deref(), Some("contents"));
        dom.set_inline_style(&a, "display", &InlineStyle::new("block", "important"))
            .unwrap();
        assert_eq!(dom.computed_style(&a, "display").as_deref(), Some("block"));
    }

    #[test]
    fn test_elements_with_class_document_order() {
        let dom = MemoryDom::new();
        let a = dom.append(dom.body_node(), "div");
        let b = dom.append(a, "div");
        let c = dom.append(dom.body_node(), "div");
        for n in [c, b] {
            dom.add_class(&n, "w").unwrap();
        }
        assert_eq!(dom.elements_with_class("w"), vec![b, c]);
        dom.clear_children(dom.body_node());
        assert!(dom.elements_with_class("w").is_empty());
    }
}
