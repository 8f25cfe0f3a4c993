//! Layout grafting.
//!
//! Establishes the sidebar layout on a host page and reverses it. The page's
//! content root is either adopted (a detected framework root) or wrapped in a
//! synthesized element; structural classes let the SDK stylesheet lay out the
//! sidebar and the content side by side.
//!
//! Every step runs through [`guard_phase`] so a hostile page can leave the
//! graft partially applied, but never aborts setup or teardown halfway.

mod detect;
mod integrity;

pub use detect::{largest_index, DescendantRatio, FrameworkRootHint, RootDetector};
pub use integrity::{check_integrity, IntegrityBreach};

use tracing::{debug, error, info, warn};

use crate::dom::{Dom, InlineStyle};
use crate::error::{guard_phase, DomError, SdkError};

/// Structural class on `<html>`.
pub const HTML_CLASS: &str = "playlight-sdk-html";
/// Structural class on `<body>`.
pub const BODY_CLASS: &str = "playlight-sdk-body";
/// Structural class on the inner wrapper.
pub const INNER_WRAPPER_CLASS: &str = "playlight-sdk-inner-wrapper";
/// Id given to a synthesized inner wrapper.
pub const INNER_WRAPPER_ID: &str = "playlight-sdk-inner-wrapper";
/// Classes of the sidebar mount node.
pub const SIDEBAR_CLASSES: [&str; 2] = ["playlight-sdk", "playlight-sdk-container-sidebar"];
/// Prefix shared by every SDK class.
pub const SDK_CLASS_PREFIX: &str = "playlight";

/// Tags considered container-like when looking for a framework root.
pub const CONTAINER_TAGS: [&str; 9] = [
    "DIV", "MAIN", "ARTICLE", "SECTION", "HEADER", "FOOTER", "NAV", "ASIDE", "FORM",
];

/// Tags never moved into a synthesized wrapper.
const PINNED_TAGS: [&str; 2] = ["SCRIPT", "STYLE"];

/// Platform side effects of the graft.
///
/// The graft calls these in a fixed order: polyfills, then stylesheets, then
/// the sidebar fragment. Each call is guarded individually.
pub trait GraftHooks<N> {
    /// Patch the window viewport surface to report the wrapper's geometry.
    fn install_polyfills(&mut self, wrapper: &N) -> Result<(), SdkError>;
    /// Take over host stylesheets and start refreshing them.
    fn activate_stylesheets(&mut self, wrapper: &N) -> Result<(), SdkError>;
    /// Render the sidebar fragment into its mount node.
    fn mount_sidebar(&mut self, mount: &N) -> Result<(), SdkError>;
    /// Dispose of the sidebar fragment.
    fn unmount_sidebar(&mut self, mount: &N) -> Result<(), SdkError>;
    /// Reinstate the original window surface.
    fn restore_polyfills(&mut self) -> Result<(), SdkError>;
    /// Hand every managed stylesheet back in its original form.
    fn deactivate_stylesheets(&mut self) -> Result<(), SdkError>;
}

impl<N> GraftHooks<N> for () {
    fn install_polyfills(&mut self, _wrapper: &N) -> Result<(), SdkError> {
        Ok(())
    }

    fn activate_stylesheets(&mut self, _wrapper: &N) -> Result<(), SdkError> {
        Ok(())
    }

    fn mount_sidebar(&mut self, _mount: &N) -> Result<(), SdkError> {
        Ok(())
    }

    fn unmount_sidebar(&mut self, _mount: &N) -> Result<(), SdkError> {
        Ok(())
    }

    fn restore_polyfills(&mut self) -> Result<(), SdkError> {
        Ok(())
    }

    fn deactivate_stylesheets(&mut self) -> Result<(), SdkError> {
        Ok(())
    }
}

/// Whether a node belongs to the SDK rather than the host.
pub fn is_sdk_owned<D: Dom>(dom: &D, node: &D::Node) -> bool {
    dom.id(node).contains(SDK_CLASS_PREFIX)
        || dom
            .classes(node)
            .iter()
            .any(|class| class.starts_with(SDK_CLASS_PREFIX))
}

/// A host class moved from the body to the wrapper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferredClass {
    /// Class name.
    pub name: String,
    /// False when the wrapper already carried the class before the transfer.
    pub added_to_wrapper: bool,
}

/// An inline style overridden on the wrapper, with the value it replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForcedStyle {
    /// CSS property.
    pub property: String,
    /// Inline declaration present before the override.
    pub previous: Option<InlineStyle>,
}

/// State of one established graft.
#[derive(Debug, Clone)]
pub struct GraftSession<N> {
    /// Element acting as the page's logical body.
    pub inner_wrapper: N,
    /// Node the sidebar fragment renders into.
    pub sidebar_mount: Option<N>,
    /// True when the wrapper was synthesized and must be unwrapped on teardown.
    pub wrapper_created: bool,
    /// Host classes carried over from the body, in order.
    pub transferred_classes: Vec<TransferredClass>,
    /// Inline overrides applied to the wrapper.
    pub forced_styles: Vec<ForcedStyle>,
    /// Moved children paired with the first unmoved sibling that followed them.
    placements: Vec<(N, Option<N>)>,
}

impl<N: Clone> GraftSession<N> {
    /// Children that were moved into a synthesized wrapper.
    pub fn moved_children(&self) -> impl Iterator<Item = &N> {
        self.placements.iter().map(|(child, _)| child)
    }
}

/// Options controlling how the content root is chosen.
#[derive(Debug)]
pub struct GraftOptions {
    /// `sidebar.hasFrameworkRoot` setting.
    pub framework_root: FrameworkRootHint,
    /// Heuristic used when several candidates exist.
    pub detector: Box<dyn RootDetector>,
}

impl Default for GraftOptions {
    fn default() -> Self {
        Self {
            framework_root: FrameworkRootHint::Auto,
            detector: Box::new(DescendantRatio::default()),
        }
    }
}

impl GraftOptions {
    /// Options with the default detector and the given hint.
    #[must_use]
    pub fn with_hint(framework_root: FrameworkRootHint) -> Self {
        Self {
            framework_root,
            ..Self::default()
        }
    }
}

/// Owner of the single active graft.
#[derive(Debug)]
pub struct SidebarLayout<N> {
    options: GraftOptions,
    session: Option<GraftSession<N>>,
}

impl<N> Default for SidebarLayout<N> {
    fn default() -> Self {
        Self {
            options: GraftOptions::default(),
            session: None,
        }
    }
}

impl<N: Clone + PartialEq + std::fmt::Debug> SidebarLayout<N> {
    /// Create an inactive layout.
    #[must_use]
    pub fn new(options: GraftOptions) -> Self {
        Self {
            options,
            session: None,
        }
    }

    /// Whether a graft is established.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// The active session.
    #[must_use]
    pub const fn session(&self) -> Option<&GraftSession<N>> {
        self.session.as_ref()
    }

    /// Replace the detection options; applies from the next setup.
    pub fn set_options(&mut self, options: GraftOptions) {
        self.options = options;
    }

    /// Establish the graft. Returns false when already set up or when the
    /// page offers no body to graft onto.
    pub fn setup<D, H>(&mut self, dom: &D, hooks: &mut H) -> bool
    where
        D: Dom<Node = N>,
        H: GraftHooks<N>,
    {
        if self.session.is_some() {
            debug!("sidebar layout already set up");
            return false;
        }
        match establish(dom, &self.options, hooks) {
            Ok(session) => {
                info!(adopted = !session.wrapper_created, "sidebar layout established");
                self.session = Some(session);
                true
            }
            Err(err) => {
                error!(error = %err, "sidebar layout setup failed");
                false
            }
        }
    }

    /// Reverse the graft. Returns false when nothing was set up.
    pub fn remove<D, H>(&mut self, dom: &D, hooks: &mut H) -> bool
    where
        D: Dom<Node = N>,
        H: GraftHooks<N>,
    {
        let Some(session) = self.session.take() else {
            debug!("sidebar layout not set up, nothing to remove");
            return false;
        };
        teardown(dom, session, hooks);
        info!("sidebar layout removed");
        true
    }

    /// Tear down and re-establish after the host damaged the structure.
    pub fn heal<D, H>(&mut self, dom: &D, hooks: &mut H) -> bool
    where
        D: Dom<Node = N>,
        H: GraftHooks<N>,
    {
        if self.session.is_none() {
            return false;
        }
        warn!("sidebar structure damaged, re-establishing");
        self.remove(dom, hooks);
        self.setup(dom, hooks)
    }
}

/// Candidate framework roots among the body's children.
pub fn framework_candidates<D: Dom>(dom: &D, body: &D::Node) -> Vec<D::Node> {
    dom.children(body)
        .into_iter()
        .filter(|child| {
            CONTAINER_TAGS.contains(&dom.tag_name(child).as_str())
                && !is_sdk_owned(dom, child)
                && !dom.children(child).is_empty()
        })
        .collect()
}

/// Pick the element to adopt as the inner wrapper, if any.
pub fn detect_framework_root<D: Dom>(
    dom: &D,
    body: &D::Node,
    options: &GraftOptions,
) -> Option<D::Node> {
    if options.framework_root == FrameworkRootHint::Disabled {
        return None;
    }
    let mut candidates = framework_candidates(dom, body);
    let index = match candidates.len() {
        0 => None,
        1 => Some(0),
        _ => {
            let counts: Vec<usize> = candidates
                .iter()
                .map(|c| dom.descendant_count(c))
                .collect();
            match options.framework_root {
                FrameworkRootHint::Forced => largest_index(&counts),
                _ => options.detector.select(&counts),
            }
        }
    }?;
    Some(candidates.swap_remove(index))
}

fn establish<D, H>(
    dom: &D,
    options: &GraftOptions,
    hooks: &mut H,
) -> Result<GraftSession<D::Node>, DomError>
where
    D: Dom,
    H: GraftHooks<D::Node>,
{
    let html = dom.document_element()?;
    let body = dom.body()?;

    let (inner_wrapper, wrapper_created, placements) =
        match detect_framework_root(dom, &body, options) {
            Some(root) => {
                debug!(id = %dom.id(&root), "adopting framework root as inner wrapper");
                (root, false, Vec::new())
            }
            None => {
                let (wrapper, placements) = synthesize_wrapper(dom, &body)?;
                (wrapper, true, placements)
            }
        };

    guard_phase("mark html", dom.add_class(&html, HTML_CLASS));
    guard_phase("mark body", dom.add_class(&body, BODY_CLASS));
    guard_phase("mark wrapper", dom.add_class(&inner_wrapper, INNER_WRAPPER_CLASS));

    guard_phase("install polyfills", hooks.install_polyfills(&inner_wrapper));
    guard_phase("activate stylesheets", hooks.activate_stylesheets(&inner_wrapper));

    let transferred_classes = transfer_classes(dom, &body, &inner_wrapper);
    let forced_styles = force_wrapper_styles(dom, &inner_wrapper);

    let sidebar_mount = match create_sidebar_mount(dom, &html) {
        Ok(mount) => {
            guard_phase("mount sidebar", hooks.mount_sidebar(&mount));
            Some(mount)
        }
        Err(err) => {
            error!(error = %err, "sidebar mount node could not be created");
            None
        }
    };

    Ok(GraftSession {
        inner_wrapper,
        sidebar_mount,
        wrapper_created,
        transferred_classes,
        forced_styles,
        placements,
    })
}

type Placements<N> = Vec<(N, Option<N>)>;

fn synthesize_wrapper<D: Dom>(
    dom: &D,
    body: &D::Node,
) -> Result<(D::Node, Placements<D::Node>), DomError> {
    let wrapper = dom.create_element("div")?;
    dom.set_id(&wrapper, INNER_WRAPPER_ID)?;

    let children = dom.children(body);
    let movable: Vec<bool> = children
        .iter()
        .map(|child| {
            !PINNED_TAGS.contains(&dom.tag_name(child).as_str()) && !is_sdk_owned(dom, child)
        })
        .collect();

    dom.append_child(body, &wrapper)?;

    let mut placements = Vec::new();
    for (i, child) in children.iter().enumerate() {
        if !movable[i] {
            continue;
        }
        let anchor = children[i + 1..]
            .iter()
            .zip(&movable[i + 1..])
            .find(|(_, moved)| !**moved)
            .map(|(node, _)| node.clone());
        if guard_phase("move child into wrapper", dom.append_child(&wrapper, child)) {
            placements.push((child.clone(), anchor));
        }
    }
    debug!(moved = placements.len(), "synthesized inner wrapper");
    Ok((wrapper, placements))
}

fn transfer_classes<D: Dom>(
    dom: &D,
    body: &D::Node,
    wrapper: &D::Node,
) -> Vec<TransferredClass> {
    let mut transferred = Vec::new();
    for name in dom.classes(body) {
        if name.starts_with(SDK_CLASS_PREFIX) {
            continue;
        }
        let added_to_wrapper = !dom.has_class(wrapper, &name);
        if added_to_wrapper && !guard_phase("transfer class", dom.add_class(wrapper, &name)) {
            continue;
        }
        guard_phase("transfer class", dom.remove_class(body, &name));
        transferred.push(TransferredClass {
            name,
            added_to_wrapper,
        });
    }
    transferred
}

fn force_wrapper_styles<D: Dom>(dom: &D, wrapper: &D::Node) -> Vec<ForcedStyle> {
    let overrides = [("display", "contents", "block"), ("overflow", "visible", "auto")];
    let mut forced = Vec::new();
    for (property, collapsing, replacement) in overrides {
        let Some(current) = dom.computed_style(wrapper, property) else {
            warn!(property, "computed style unavailable on inner wrapper");
            continue;
        };
        if current != collapsing {
            continue;
        }
        let previous = dom.inline_style(wrapper, property);
        let style = InlineStyle::new(replacement, "important");
        if guard_phase("force wrapper style", dom.set_inline_style(wrapper, property, &style)) {
            forced.push(ForcedStyle {
                property: property.to_string(),
                previous,
            });
        }
    }
    forced
}

fn create_sidebar_mount<D: Dom>(dom: &D, html: &D::Node) -> Result<D::Node, DomError> {
    let mount = dom.create_element("div")?;
    for class in SIDEBAR_CLASSES {
        dom.add_class(&mount, class)?;
    }
    dom.append_child(html, &mount)?;
    Ok(mount)
}

fn teardown<D, H>(dom: &D, session: GraftSession<D::Node>, hooks: &mut H)
where
    D: Dom,
    H: GraftHooks<D::Node>,
{
    let html = dom.document_element();
    let body = dom.body();

    if let Some(mount) = &session.sidebar_mount {
        guard_phase("unmount sidebar", hooks.unmount_sidebar(mount));
        if dom.parent(mount).is_some() {
            guard_phase("remove sidebar mount", dom.remove(mount));
        }
    }

    match (&html, &body) {
        (Ok(html), Ok(body)) => {
            guard_phase("unmark html", dom.remove_class(html, HTML_CLASS));
            guard_phase("unmark body", dom.remove_class(body, BODY_CLASS));
            for class in &session.transferred_classes {
                guard_phase("restore class", dom.add_class(body, &class.name));
                if class.added_to_wrapper {
                    guard_phase(
                        "restore class",
                        dom.remove_class(&session.inner_wrapper, &class.name),
                    );
                }
            }
        }
        _ => error!("document root unavailable during teardown"),
    }

    let wrapper = &session.inner_wrapper;
    if session.wrapper_created {
        match &body {
            Ok(body) => unwrap_children(dom, body, wrapper, &session.placements),
            Err(err) => error!(error = %err, "cannot unwrap without a body"),
        }
        if dom.parent(wrapper).is_some() {
            guard_phase("remove wrapper", dom.remove(wrapper));
        }
    } else {
        guard_phase("unmark wrapper", dom.remove_class(wrapper, INNER_WRAPPER_CLASS));
        for forced in session.forced_styles.iter().rev() {
            let result = match &forced.previous {
                Some(previous) => dom.set_inline_style(wrapper, &forced.property, previous),
                None => dom.remove_inline_style(wrapper, &forced.property),
            };
            guard_phase("restore wrapper style", result);
        }
    }

    guard_phase("restore polyfills", hooks.restore_polyfills());
    guard_phase("deactivate stylesheets", hooks.deactivate_stylesheets());
}

fn unwrap_children<D: Dom>(
    dom: &D,
    body: &D::Node,
    wrapper: &D::Node,
    placements: &[(D::Node, Option<D::Node>)],
) {
    let wrapper_in_body = dom.parent(wrapper).as_ref() == Some(body);
    for child in dom.children(wrapper) {
        let anchor = placements
            .iter()
            .find(|(moved, _)| *moved == child)
            .and_then(|(_, anchor)| anchor.clone())
            .filter(|anchor| dom.parent(anchor).as_ref() == Some(body));
        let result = match (anchor, wrapper_in_body) {
            (Some(anchor), _) => dom.insert_before(body, &child, &anchor),
            (None, true) => dom.insert_before(body, &child, wrapper),
            (None, false) => dom.append_child(body, &child),
        };
        guard_phase("move child out of wrapper", result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{MemoryDom, NodeId};

    #[derive(Default)]
    struct Recorder {
        calls: Vec<&'static str>,
        fail_polyfills: bool,
    }

    impl GraftHooks<NodeId> for Recorder {
        fn install_polyfills(&mut self, _wrapper: &NodeId) -> Result<(), SdkError> {
            self.calls.push("install_polyfills");
            if self.fail_polyfills {
                return Err(DomError::Platform("defineProperty refused".into()).into());
            }
            Ok(())
        }

        fn activate_stylesheets(&mut self, _wrapper: &NodeId) -> Result<(), SdkError> {
            self.calls.push("activate_stylesheets");
            Ok(())
        }

        fn mount_sidebar(&mut self, _mount: &NodeId) -> Result<(), SdkError> {
            self.calls.push("mount_sidebar");
            Ok(())
        }

        fn unmount_sidebar(&mut self, _mount: &NodeId) -> Result<(), SdkError> {
            self.calls.push("unmount_sidebar");
            Ok(())
        }

        fn restore_polyfills(&mut self) -> Result<(), SdkError> {
            self.calls.push("restore_polyfills");
            Ok(())
        }

        fn deactivate_stylesheets(&mut self) -> Result<(), SdkError> {
            self.calls.push("deactivate_stylesheets");
            Ok(())
        }
    }

    #[test]
    fn test_single_container_adopted() {
        let dom = MemoryDom::new();
        let app = dom.append_with_id(dom.body_node(), "div", "app");
        dom.append(app, "p");

        let mut layout = SidebarLayout::new(GraftOptions::default());
        assert!(layout.setup(&dom, &mut ()));
        let session = layout.session().unwrap();
        assert_eq!(session.inner_wrapper, app);
        assert!(!session.wrapper_created);
        assert!(dom.has_class(&app, INNER_WRAPPER_CLASS));
    }

    #[test]
    fn test_hooks_called_in_order() {
        let dom = MemoryDom::new();
        dom.append(dom.body_node(), "p");
        let mut hooks = Recorder::default();
        let mut layout = SidebarLayout::new(GraftOptions::default());
        layout.setup(&dom, &mut hooks);
        layout.remove(&dom, &mut hooks);
        assert_eq!(
            hooks.calls,
            vec![
                "install_polyfills",
                "activate_stylesheets",
                "mount_sidebar",
                "unmount_sidebar",
                "restore_polyfills",
                "deactivate_stylesheets",
            ]
        );
    }

    #[test]
    fn test_failing_phase_does_not_abort() {
        let dom = MemoryDom::new();
        dom.append(dom.body_node(), "p");
        let mut hooks = Recorder {
            fail_polyfills: true,
            ..Recorder::default()
        };
        let mut layout = SidebarLayout::new(GraftOptions::default());
        assert!(layout.setup(&dom, &mut hooks));
        assert!(hooks.calls.contains(&"mount_sidebar"));
        assert!(layout.session().unwrap().sidebar_mount.is_some());
    }

    #[test]
    fn test_second_setup_short_circuits() {
        let dom = MemoryDom::new();
        let mut layout = SidebarLayout::new(GraftOptions::default());
        assert!(layout.setup(&dom, &mut ()));
        assert!(!layout.setup(&dom, &mut ()));
        assert_eq!(dom.elements_with_class(INNER_WRAPPER_CLASS).len(), 1);
    }

    #[test]
    fn test_disabled_hint_always_synthesizes() {
        let dom = MemoryDom::new();
        let app = dom.append_with_id(dom.body_node(), "div", "app");
        dom.append(app, "p");
        let mut layout = SidebarLayout::new(GraftOptions::with_hint(FrameworkRootHint::Disabled));
        layout.setup(&dom, &mut ());
        let session = layout.session().unwrap();
        assert!(session.wrapper_created);
        assert_eq!(dom.parent(&app), Some(session.inner_wrapper));
    }

    #[test]
    fn test_forced_hint_picks_largest() {
        let dom = MemoryDom::new();
        let body = dom.body_node();
        let small = dom.append(body, "header");
        dom.append(small, "h1");
        let big = dom.append(body, "main");
        dom.append(big, "p");
        dom.append(big, "p");
        let mut layout = SidebarLayout::new(GraftOptions::with_hint(FrameworkRootHint::Forced));
        layout.setup(&dom, &mut ());
        assert_eq!(layout.session().unwrap().inner_wrapper, big);
    }

    #[test]
    fn test_sdk_owned_and_empty_containers_ignored() {
        let dom = MemoryDom::new();
        let body = dom.body_node();
        let own = dom.append_with_id(body, "div", "playlight-sdk-container");
        dom.append(own, "span");
        dom.append(body, "div");
        let candidates = framework_candidates(&dom, &body);
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_scripts_stay_in_body() {
        let dom = MemoryDom::new();
        let body = dom.body_node();
        dom.append(body, "p");
        let script = dom.append(body, "script");
        let mut layout = SidebarLayout::new(GraftOptions::default());
        layout.setup(&dom, &mut ());
        assert_eq!(dom.parent(&script), Some(body));
    }

    #[test]
    fn test_collapsing_display_forced_and_restored() {
        let dom = MemoryDom::new();
        let app = dom.append_with_id(dom.body_node(), "div", "app");
        dom.append(app, "p");
        dom.set_computed(app, "display", "contents");
        dom.set_inline_style(&app, "display", &InlineStyle::new("contents", ""))
            .unwrap();

        let mut layout = SidebarLayout::new(GraftOptions::default());
        layout.setup(&dom, &mut ());
        assert_eq!(
            dom.inline_style(&app, "display"),
            Some(InlineStyle::new("block", "important"))
        );
        layout.remove(&dom, &mut ());
        assert_eq!(
            dom.inline_style(&app, "display"),
            Some(InlineStyle::new("contents", ""))
        );
        assert_eq!(dom.inline_style(&app, "overflow"), None);
    }

    #[test]
    fn test_shared_class_not_stripped_from_adopted_root() {
        let dom = MemoryDom::new();
        let body = dom.body_node();
        dom.add_class(&body, "dark").unwrap();
        let app = dom.append_with_id(body, "div", "app");
        dom.append(app, "p");
        dom.add_class(&app, "dark").unwrap();

        let mut layout = SidebarLayout::new(GraftOptions::default());
        layout.setup(&dom, &mut ());
        assert!(!dom.has_class(&body, "dark"));
        layout.remove(&dom, &mut ());
        assert!(dom.has_class(&body, "dark"));
        assert!(dom.has_class(&app, "dark"));
    }

    #[test]
    fn test_heal_requires_active_session() {
        let dom = MemoryDom::new();
        let mut layout: SidebarLayout<NodeId> = SidebarLayout::new(GraftOptions::default());
        assert!(!layout.heal(&dom, &mut ()));
        assert!(!layout.remove(&dom, &mut ()));
    }
}
