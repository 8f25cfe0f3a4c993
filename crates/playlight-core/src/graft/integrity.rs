use std::fmt;

use super::{GraftSession, BODY_CLASS, HTML_CLASS};
use crate::dom::Dom;

/// Damage to an established graft.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityBreach {
    /// `<html>` lost its structural class.
    RootClassMissing,
    /// `<body>` lost its structural class.
    BodyClassMissing,
    /// The inner wrapper is no longer inside `<body>`.
    WrapperDetached,
    /// The sidebar mount node is no longer in the document.
    SidebarDetached,
}

impl fmt::Display for IntegrityBreach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::RootClassMissing => "root structural class removed",
            Self::BodyClassMissing => "body structural class removed",
            Self::WrapperDetached => "inner wrapper detached",
            Self::SidebarDetached => "sidebar mount detached",
        })
    }
}

/// First breach found in the session's structure, if any.
///
/// Runs on every observed class or child-list mutation, so it only reads.
pub fn check_integrity<D: Dom>(dom: &D, session: &GraftSession<D::Node>) -> Option<IntegrityBreach> {
    let Ok(html) = dom.document_element() else {
        return Some(IntegrityBreach::RootClassMissing);
    };
    if !dom.has_class(&html, HTML_CLASS) {
        return Some(IntegrityBreach::RootClassMissing);
    }
    let body = match dom.body() {
        Ok(body) if dom.has_class(&body, BODY_CLASS) => body,
        _ => return Some(IntegrityBreach::BodyClassMissing),
    };
    if !dom.contains(&body, &session.inner_wrapper) {
        return Some(IntegrityBreach::WrapperDetached);
    }
    match &session.sidebar_mount {
        Some(mount) if !dom.contains(&html, mount) => Some(IntegrityBreach::SidebarDetached),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::super::{GraftOptions, SidebarLayout};
    use super::*;
    use crate::dom::MemoryDom;

    fn grafted() -> (MemoryDom, SidebarLayout<crate::dom::NodeId>) {
        let dom = MemoryDom::new();
        let app = dom.append_with_id(dom.body_node(), "div", "app");
        dom.append(app, "p");
        let mut layout = SidebarLayout::new(GraftOptions::default());
        layout.setup(&dom, &mut ());
        (dom, layout)
    }

    #[test]
    fn test_intact_graft() {
        let (dom, layout) = grafted();
        assert_eq!(check_integrity(&dom, layout.session().unwrap()), None);
    }

    #[test]
    fn test_class_removed() {
        let (dom, layout) = grafted();
        dom.remove_class(&dom.html(), HTML_CLASS).unwrap();
        assert_eq!(
            check_integrity(&dom, layout.session().unwrap()),
            Some(IntegrityBreach::RootClassMissing)
        );
    }

    #[test]
    fn test_body_wiped() {
        let (dom, layout) = grafted();
        dom.clear_children(dom.body_node());
        assert_eq!(
            check_integrity(&dom, layout.session().unwrap()),
            Some(IntegrityBreach::WrapperDetached)
        );
    }

    #[test]
    fn test_wrapper_moved_out_of_body() {
        let (dom, layout) = grafted();
        let wrapper = layout.session().unwrap().inner_wrapper;
        dom.append_child(&dom.html(), &wrapper).unwrap();
        assert!(dom.contains(&dom.html(), &wrapper));
        assert_eq!(
            check_integrity(&dom, layout.session().unwrap()),
            Some(IntegrityBreach::WrapperDetached)
        );
    }

    #[test]
    fn test_sidebar_removed() {
        let (dom, layout) = grafted();
        let mount = layout.session().unwrap().sidebar_mount.unwrap();
        dom.remove(&mount).unwrap();
        assert_eq!(
            check_integrity(&dom, layout.session().unwrap()),
            Some(IntegrityBreach::SidebarDetached)
        );
    }
}
