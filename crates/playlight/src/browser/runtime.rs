//! The live sidebar graft: layout, hooks, watchers and the refresh loop.
//!
//! One [`Runtime`] exists per SDK instance, shared as `Rc<RefCell<_>>` with
//! the observer and timer callbacks, which hold only a `Weak`. No borrow is
//! ever held while host code runs: media query listeners and the synthetic
//! `resize` event are dispatched after the borrow is released.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use js_sys::Function;
use playlight_core::css::TransformParams;
use playlight_core::graft::{check_integrity, GraftHooks, GraftOptions, IntegrityBreach, SidebarLayout};
use playlight_core::media_query::MediaQueryChange;
use playlight_core::scheduler::{Debouncer, RefreshScheduler, Ticket};
use playlight_core::stylesheet::StylesheetInterceptor;
use playlight_core::viewport::Geometry;
use playlight_core::{guard_phase, DomError, SdkError};
use tracing::{debug, warn};
use wasm_bindgen::JsCast;
use web_sys::{Element, HtmlElement};

use super::dom::BrowserDom;
use super::events::{dispatch_resize, request_frame, set_timeout, Listener};
use super::media::dispatch_changes;
use super::observers::{
    children_options, root_options, stylesheet_options, MutationWatch, ResizeWatch, StylesheetMutations,
};
use super::polyfill::WindowPolyfill;
use super::styles::BrowserStyleHost;

/// Attribute naming the UI fragment rendered into a mount point.
pub(crate) const VIEW_ATTRIBUTE: &str = "data-playlight-view";

pub(crate) type SharedRuntime = Rc<RefCell<Runtime>>;

/// Platform side of the graft steps.
#[derive(Debug)]
pub(crate) struct BrowserHooks {
    styles: BrowserStyleHost,
    polyfill: WindowPolyfill,
    interceptor: StylesheetInterceptor<Element>,
    layout_sheet: Option<Element>,
}

impl BrowserHooks {
    fn new(dom: &BrowserDom) -> Self {
        Self {
            styles: BrowserStyleHost::new(dom.document().clone()),
            polyfill: WindowPolyfill::new(dom.window().clone()),
            interceptor: StylesheetInterceptor::new(),
            layout_sheet: None,
        }
    }

    fn params(&self) -> TransformParams {
        Geometry::measure(&self.polyfill).transform_params()
    }
}

impl GraftHooks<Element> for BrowserHooks {
    fn install_polyfills(&mut self, wrapper: &Element) -> Result<(), SdkError> {
        let wrapper = wrapper
            .dyn_ref::<HtmlElement>()
            .ok_or_else(|| DomError::Platform("inner wrapper is not an HTML element".into()))?;
        self.polyfill.install(wrapper)
    }

    fn activate_stylesheets(&mut self, _wrapper: &Element) -> Result<(), SdkError> {
        if self.layout_sheet.is_none() {
            self.layout_sheet = Some(self.styles.inject_layout()?);
        }
        let params = self.params();
        let rewritten = self.interceptor.refresh(&self.styles, params);
        debug!(rewritten, "stylesheet interception active");
        Ok(())
    }

    fn mount_sidebar(&mut self, mount: &Element) -> Result<(), SdkError> {
        mount
            .set_attribute(VIEW_ATTRIBUTE, "sidebar")
            .map_err(super::dom::platform)?;
        Ok(())
    }

    fn unmount_sidebar(&mut self, mount: &Element) -> Result<(), SdkError> {
        mount.set_inner_html("");
        mount
            .remove_attribute(VIEW_ATTRIBUTE)
            .map_err(super::dom::platform)?;
        Ok(())
    }

    fn restore_polyfills(&mut self) -> Result<(), SdkError> {
        self.polyfill.restore()
    }

    fn deactivate_stylesheets(&mut self) -> Result<(), SdkError> {
        let restored = self.interceptor.restore_all(&self.styles);
        if let Some(sheet) = self.layout_sheet.take() {
            sheet.remove();
        }
        debug!(restored, "stylesheet interception released");
        Ok(())
    }
}

/// Observers alive while the graft is established.
#[derive(Debug)]
struct Watchers {
    _resize: ResizeWatch,
    _stylesheets: MutationWatch,
    _structure: MutationWatch,
}

/// Sidebar graft state of one SDK instance.
#[derive(Debug)]
pub(crate) struct Runtime {
    dom: BrowserDom,
    layout: SidebarLayout<Element>,
    hooks: BrowserHooks,
    scheduler: RefreshScheduler,
    reconcile: Debouncer,
    watchers: Option<Watchers>,
    pending_links: Vec<Listener>,
}

impl Runtime {
    pub(crate) fn shared(dom: BrowserDom) -> SharedRuntime {
        Rc::new(RefCell::new(Self {
            hooks: BrowserHooks::new(&dom),
            dom,
            layout: SidebarLayout::default(),
            scheduler: RefreshScheduler::default(),
            reconcile: Debouncer::new(0),
            watchers: None,
            pending_links: Vec::new(),
        }))
    }

    pub(crate) fn is_active(&self) -> bool {
        self.layout.is_active()
    }

    pub(crate) fn set_options(&mut self, options: GraftOptions) {
        self.layout.set_options(options);
    }

    pub(crate) fn integrity_breach(&self) -> Option<IntegrityBreach> {
        self.layout
            .session()
            .and_then(|session| check_integrity(&self.dom, session))
    }

    fn wrapper(&self) -> Option<Element> {
        self.layout.session().map(|s| s.inner_wrapper.clone())
    }

    fn attach_watchers(&mut self, handle: &Weak<RefCell<Self>>) {
        let Some(wrapper) = self.wrapper() else {
            return;
        };
        match watch(&self.dom, &wrapper, handle) {
            Ok(watchers) => self.watchers = Some(watchers),
            Err(err) => warn!(error = %err, "graft watchers unavailable, layout will not follow resizes"),
        }
    }

    fn detach_watchers(&mut self) {
        self.watchers = None;
        self.pending_links.clear();
        self.scheduler.reset();
        self.reconcile.cancel();
    }

    /// Collect the media query flips of one refresh pass, after rewriting
    /// every managed stylesheet.
    fn refresh_pass(&mut self) -> Vec<MediaQueryChange<Function>> {
        if !self.layout.is_active() {
            return Vec::new();
        }
        let params = self.hooks.params();
        let rewritten = self.hooks.interceptor.refresh(&self.hooks.styles, params);
        debug!(
            rewritten,
            adjusted_width = params.adjusted_width,
            sidebar_width = params.sidebar_width,
            "refresh pass"
        );
        self.hooks.polyfill.media_tick(params)
    }
}

/// Establish the graft and start watching it.
pub(crate) fn establish(runtime: &SharedRuntime) -> bool {
    let handle = Rc::downgrade(runtime);
    let mut rt = runtime.borrow_mut();
    let Runtime {
        dom, layout, hooks, ..
    } = &mut *rt;
    let established = layout.setup(&*dom, hooks);
    if established {
        rt.attach_watchers(&handle);
    }
    established
}

/// Stop watching and reverse the graft.
pub(crate) fn dismantle(runtime: &SharedRuntime) -> bool {
    let mut rt = runtime.borrow_mut();
    rt.detach_watchers();
    let Runtime {
        dom, layout, hooks, ..
    } = &mut *rt;
    layout.remove(&*dom, hooks)
}

fn watch(dom: &BrowserDom, wrapper: &Element, handle: &Weak<RefCell<Runtime>>) -> Result<Watchers, DomError> {
    let on_resize = handle.clone();
    let resize = ResizeWatch::observe(wrapper, move || resized(&on_resize))?;

    let on_sheets = handle.clone();
    let stylesheets = MutationWatch::new(move |records| stylesheets_changed(&on_sheets, &records))?;
    stylesheets.observe(dom.head()?.as_ref(), &stylesheet_options())?;

    let on_structure = handle.clone();
    let structure = MutationWatch::new(move |_records| schedule_reconcile(&on_structure))?;
    structure.observe(dom.document_element()?.as_ref(), &root_options())?;
    structure.observe(dom.body()?.as_ref(), &children_options())?;

    Ok(Watchers {
        _resize: resize,
        _stylesheets: stylesheets,
        _structure: structure,
    })
}

fn resized(handle: &Weak<RefCell<Runtime>>) {
    let Some(runtime) = handle.upgrade() else {
        return;
    };
    let (ticket, delay, window) = {
        let mut rt = runtime.borrow_mut();
        (rt.scheduler.on_resize(), rt.scheduler.resize_delay_ms(), rt.dom.window().clone())
    };
    let settled = handle.clone();
    let armed = set_timeout(&window, delay, move || resize_settled(&settled, ticket));
    guard_phase("resize debounce", armed.map(drop));
}

fn resize_settled(handle: &Weak<RefCell<Runtime>>, ticket: Ticket) {
    let Some(runtime) = handle.upgrade() else {
        return;
    };
    let needs_frame = runtime.borrow_mut().scheduler.on_resize_settled(ticket);
    if needs_frame {
        schedule_frame(handle, &runtime);
    }
}

fn stylesheets_changed(handle: &Weak<RefCell<Runtime>>, records: &[web_sys::MutationRecord]) {
    let Some(runtime) = handle.upgrade() else {
        return;
    };
    let mutations = StylesheetMutations::classify(records);
    for link in mutations.loading {
        let on_load = handle.clone();
        match Listener::attach(link.as_ref(), "load", move |_| stylesheet_loaded(&on_load)) {
            Ok(listener) => runtime.borrow_mut().pending_links.push(listener),
            Err(err) => warn!(href = %link.href(), error = %err, "cannot wait for stylesheet load"),
        }
    }
    if mutations.ready {
        stylesheet_loaded(handle);
    }
}

fn stylesheet_loaded(handle: &Weak<RefCell<Runtime>>) {
    let Some(runtime) = handle.upgrade() else {
        return;
    };
    let needs_frame = runtime.borrow_mut().scheduler.on_mutation();
    if needs_frame {
        schedule_frame(handle, &runtime);
    }
}

fn schedule_frame(handle: &Weak<RefCell<Runtime>>, runtime: &SharedRuntime) {
    let window = runtime.borrow().dom.window().clone();
    let on_frame = handle.clone();
    guard_phase(
        "animation frame",
        request_frame(&window, move || run_frame(&on_frame)).map(drop),
    );
}

fn run_frame(handle: &Weak<RefCell<Runtime>>) {
    let Some(runtime) = handle.upgrade() else {
        return;
    };
    let (changes, window) = {
        let mut rt = runtime.borrow_mut();
        if !rt.scheduler.on_frame() {
            return;
        }
        (rt.refresh_pass(), rt.dom.window().clone())
    };
    dispatch_changes(changes);
    dispatch_resize(&window);
}

fn schedule_reconcile(handle: &Weak<RefCell<Runtime>>) {
    let Some(runtime) = handle.upgrade() else {
        return;
    };
    let (ticket, window) = {
        let mut rt = runtime.borrow_mut();
        (rt.reconcile.schedule(), rt.dom.window().clone())
    };
    let on_tick = handle.clone();
    guard_phase(
        "integrity check",
        set_timeout(&window, 0, move || reconcile(&on_tick, ticket)).map(drop),
    );
}

/// Re-establish a damaged graft once the mutation batch has settled.
fn reconcile(handle: &Weak<RefCell<Runtime>>, ticket: Ticket) {
    let Some(runtime) = handle.upgrade() else {
        return;
    };
    let breach = {
        let mut rt = runtime.borrow_mut();
        if !rt.reconcile.fire(ticket) {
            return;
        }
        rt.integrity_breach()
    };
    let Some(breach) = breach else {
        return;
    };
    debug!(%breach, "integrity breach detected");
    let mut rt = runtime.borrow_mut();
    rt.detach_watchers();
    let Runtime {
        dom, layout, hooks, ..
    } = &mut *rt;
    let healed = layout.heal(&*dom, hooks);
    if healed {
        rt.attach_watchers(handle);
    }
}
