//! Document access abstraction.
//!
//! The graft, the integrity checks and widget discovery are written against
//! [`Dom`] so they run both over the real browser document (see the
//! `playlight` crate) and over [`MemoryDom`] in host tests.

mod memory;

pub use memory::{MemoryDom, NodeId};

use crate::error::DomError;

/// An inline style value together with its priority (`""` or `"important"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineStyle {
    /// Property value.
    pub value: String,
    /// Property priority.
    pub priority: String,
}

impl InlineStyle {
    /// Create an inline style entry.
    #[must_use]
    pub fn new(value: impl Into<String>, priority: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            priority: priority.into(),
        }
    }
}

/// Read/write access to an HTML document.
///
/// Handles are cheap clones. Tag names are reported upper-case, as the
/// browser does for HTML documents.
pub trait Dom {
    /// Handle to an element.
    type Node: Clone + PartialEq + std::fmt::Debug;

    /// The `<html>` element.
    fn document_element(&self) -> Result<Self::Node, DomError>;
    /// The `<body>` element.
    fn body(&self) -> Result<Self::Node, DomError>;

    /// Element children in document order.
    fn children(&self, node: &Self::Node) -> Vec<Self::Node>;
    /// Parent element, if attached.
    fn parent(&self, node: &Self::Node) -> Option<Self::Node>;
    /// Inclusive descendant check.
    fn contains(&self, ancestor: &Self::Node, node: &Self::Node) -> bool;
    /// Upper-case tag name.
    fn tag_name(&self, node: &Self::Node) -> String;
    /// Element id, empty when unset.
    fn id(&self, node: &Self::Node) -> String;
    /// Number of element descendants.
    fn descendant_count(&self, node: &Self::Node) -> usize;

    /// Create a detached element.
    fn create_element(&self, tag: &str) -> Result<Self::Node, DomError>;
    /// Set the element id.
    fn set_id(&self, node: &Self::Node, id: &str) -> Result<(), DomError>;
    /// Append `child` to `parent`, moving it if already attached.
    fn append_child(&self, parent: &Self::Node, child: &Self::Node) -> Result<(), DomError>;
    /// Insert `child` before `reference`, a child of `parent`.
    fn insert_before(
        &self,
        parent: &Self::Node,
        child: &Self::Node,
        reference: &Self::Node,
    ) -> Result<(), DomError>;
    /// Detach the element from its parent.
    fn remove(&self, node: &Self::Node) -> Result<(), DomError>;

    /// Class list in order.
    fn classes(&self, node: &Self::Node) -> Vec<String>;
    /// Whether the class list contains `class`.
    fn has_class(&self, node: &Self::Node, class: &str) -> bool {
        self.classes(node).iter().any(|c| c == class)
    }
    /// Add a class (no-op when present).
    fn add_class(&self, node: &Self::Node, class: &str) -> Result<(), DomError>;
    /// Remove a class (no-op when absent).
    fn remove_class(&self, node: &Self::Node, class: &str) -> Result<(), DomError>;

    /// Attribute value.
    fn attribute(&self, node: &Self::Node, name: &str) -> Option<String>;
    /// Set an attribute.
    fn set_attribute(&self, node: &Self::Node, name: &str, value: &str) -> Result<(), DomError>;
    /// Remove an attribute.
    fn remove_attribute(&self, node: &Self::Node, name: &str) -> Result<(), DomError>;

    /// Resolved value of a CSS property.
    fn computed_style(&self, node: &Self::Node, property: &str) -> Option<String>;
    /// Inline style declaration for `property`, if any.
    fn inline_style(&self, node: &Self::Node, property: &str) -> Option<InlineStyle>;
    /// Set an inline style declaration.
    fn set_inline_style(
        &self,
        node: &Self::Node,
        property: &str,
        style: &InlineStyle,
    ) -> Result<(), DomError>;
    /// Remove an inline style declaration.
    fn remove_inline_style(&self, node: &Self::Node, property: &str) -> Result<(), DomError>;

    /// Attached elements carrying `class`, in document order.
    fn elements_with_class(&self, class: &str) -> Vec<Self::Node>;
}
