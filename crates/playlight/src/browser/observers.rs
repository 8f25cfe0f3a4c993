//! Mutation and resize observers.
//!
//! Both observers are disconnected when dropped, so the graft's watchers are
//! torn down simply by dropping them.

use js_sys::Array;
use playlight_core::DomError;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{
    Element, HtmlLinkElement, MutationObserver, MutationObserverInit, MutationRecord, Node,
    ResizeObserver,
};

use super::dom::platform;

/// A `MutationObserver` that may watch several targets.
pub struct MutationWatch {
    observer: MutationObserver,
    _callback: Closure<dyn FnMut(Array, MutationObserver)>,
}

impl MutationWatch {
    /// Create an observer calling `handler` with each batch of records.
    pub fn new<F>(mut handler: F) -> Result<Self, DomError>
    where
        F: FnMut(Vec<MutationRecord>) + 'static,
    {
        let callback = Closure::<dyn FnMut(Array, MutationObserver)>::new(
            move |records: Array, _observer: MutationObserver| {
                handler(records.iter().filter_map(|r| r.dyn_into().ok()).collect());
            },
        );
        let observer = MutationObserver::new(callback.as_ref().unchecked_ref()).map_err(platform)?;
        Ok(Self {
            observer,
            _callback: callback,
        })
    }

    /// Start watching `target`.
    pub fn observe(&self, target: &Node, options: &MutationObserverInit) -> Result<(), DomError> {
        self.observer
            .observe_with_options(target, options)
            .map_err(platform)
    }
}

impl Drop for MutationWatch {
    fn drop(&mut self) {
        self.observer.disconnect();
    }
}

impl std::fmt::Debug for MutationWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationWatch").finish_non_exhaustive()
    }
}

/// A `ResizeObserver` on one element.
pub struct ResizeWatch {
    observer: ResizeObserver,
    _callback: Closure<dyn FnMut(Array)>,
}

impl ResizeWatch {
    /// Call `handler` whenever `target` changes size, and once after observing.
    pub fn observe<F>(target: &Element, mut handler: F) -> Result<Self, DomError>
    where
        F: FnMut() + 'static,
    {
        let callback = Closure::<dyn FnMut(Array)>::new(move |_entries: Array| handler());
        let observer = ResizeObserver::new(callback.as_ref().unchecked_ref()).map_err(platform)?;
        observer.observe(target);
        Ok(Self {
            observer,
            _callback: callback,
        })
    }
}

impl Drop for ResizeWatch {
    fn drop(&mut self) {
        self.observer.disconnect();
    }
}

impl std::fmt::Debug for ResizeWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResizeWatch").finish_non_exhaustive()
    }
}

/// Options for the stylesheet watch on `<head>`: added nodes, and `rel`
/// flips on links (a `preload` link becoming a stylesheet).
pub fn stylesheet_options() -> MutationObserverInit {
    let options = MutationObserverInit::new();
    options.set_child_list(true);
    options.set_subtree(true);
    options.set_attributes(true);
    options.set_attribute_filter(&Array::of1(&"rel".into()));
    options
}

/// Options for the root element: marker class and direct children.
pub fn root_options() -> MutationObserverInit {
    let options = MutationObserverInit::new();
    options.set_child_list(true);
    options.set_attributes(true);
    options.set_attribute_filter(&Array::of1(&"class".into()));
    options
}

/// Options for `<body>`: direct children only.
pub fn children_options() -> MutationObserverInit {
    let options = MutationObserverInit::new();
    options.set_child_list(true);
    options
}

/// Options for the document-wide widget watch.
pub fn subtree_options() -> MutationObserverInit {
    let options = children_options();
    options.set_subtree(true);
    options
}

/// What a batch of head mutations means for stylesheets.
#[derive(Debug, Default)]
pub struct StylesheetMutations {
    /// A sheet is ready to be taken over now.
    pub ready: bool,
    /// Linked sheets still loading; refresh once they fire `load`.
    pub loading: Vec<HtmlLinkElement>,
}

fn is_stylesheet_link(link: &HtmlLinkElement) -> bool {
    link.rel()
        .split_ascii_whitespace()
        .any(|rel| rel.eq_ignore_ascii_case("stylesheet"))
}

impl StylesheetMutations {
    /// Classify a batch of records.
    pub fn classify(records: &[MutationRecord]) -> Self {
        let mut result = Self::default();
        for record in records {
            if record.type_() == "attributes" {
                if let Some(link) = record.target().and_then(|t| t.dyn_into::<HtmlLinkElement>().ok()) {
                    result.consider_link(link);
                }
                continue;
            }
            let added = record.added_nodes();
            for i in 0..added.length() {
                let Some(node) = added.item(i) else { continue };
                match node.dyn_into::<HtmlLinkElement>() {
                    Ok(link) => result.consider_link(link),
                    Err(node) => {
                        if node
                            .dyn_ref::<Element>()
                            .is_some_and(|e| e.tag_name().eq_ignore_ascii_case("style"))
                        {
                            result.ready = true;
                        }
                    }
                }
            }
        }
        result
    }

    fn consider_link(&mut self, link: HtmlLinkElement) {
        if !is_stylesheet_link(&link) {
            return;
        }
        if link.sheet().is_some() {
            self.ready = true;
        } else {
            self.loading.push(link);
        }
    }
}
