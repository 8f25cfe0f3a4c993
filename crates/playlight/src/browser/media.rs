//! Adjusted `matchMedia` results.
//!
//! While the graft is live, `window.matchMedia(query)` returns an
//! [`AdjustedMediaQueryList`]: it evaluates the breakpoint-shifted query
//! against the real browser but reports the host's original query string,
//! and its change listeners are driven by the geometry tick rather than by
//! the browser.

use std::cell::RefCell;
use std::rc::Rc;

use js_sys::{Function, Reflect};
use playlight_core::css::TransformParams;
use playlight_core::media_query::{MediaQueryChange, MediaQueryRegistry};
use tracing::warn;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Event, MediaQueryListEvent, MediaQueryListEventInit, Window};

use super::polyfill::LiveViewport;

/// Shared state behind every adjusted media query list.
#[derive(Debug)]
pub(crate) struct MediaState {
    window: Window,
    native: Function,
    params: TransformParams,
    viewport: Option<LiveViewport>,
    registry: MediaQueryRegistry<Function>,
}

pub(crate) type SharedMedia = Rc<RefCell<MediaState>>;

impl MediaState {
    /// `native` is the browser's own `matchMedia`, captured before patching.
    pub(crate) fn shared(window: Window, native: Function, params: TransformParams) -> SharedMedia {
        Rc::new(RefCell::new(Self {
            window,
            native,
            params,
            viewport: None,
            registry: MediaQueryRegistry::new(),
        }))
    }

    /// Measure `viewport` on every evaluation from now on.
    pub(crate) fn track(&mut self, viewport: LiveViewport) {
        self.viewport = Some(viewport);
    }

    /// Live geometry when tracking, else the last tick's.
    fn current_params(&self) -> TransformParams {
        self.viewport.as_ref().map_or(self.params, LiveViewport::params)
    }

    pub(crate) fn matches(&self, query: &str) -> bool {
        let adjusted = MediaQueryRegistry::<Function>::adjusted_query(query, &self.current_params());
        evaluate(&self.window, &self.native, &adjusted)
    }

    /// Store new geometry and collect the listener sets whose query flipped.
    pub(crate) fn tick(&mut self, params: TransformParams) -> Vec<MediaQueryChange<Function>> {
        self.params = params;
        let Self {
            window,
            native,
            params,
            registry,
            ..
        } = self;
        registry.tick(params, |adjusted| evaluate(window, native, adjusted))
    }

    /// Forget every listener and stop adjusting queries.
    pub(crate) fn reset(&mut self, params: TransformParams) {
        self.registry.clear();
        self.viewport = None;
        self.params = params;
    }
}

fn evaluate(window: &Window, native: &Function, query: &str) -> bool {
    native
        .call1(window, &JsValue::from_str(query))
        .ok()
        .and_then(|list| Reflect::get(&list, &JsValue::from_str("matches")).ok())
        .and_then(|matches| matches.as_bool())
        .unwrap_or(false)
}

/// Notify listener sets. Must run with no SDK state borrowed, since
/// listeners are host code.
pub(crate) fn dispatch_changes(changes: Vec<MediaQueryChange<Function>>) {
    for change in changes {
        match change_event(&change.media, change.matches) {
            Ok(event) => notify(&change.media, &change.listeners, &event),
            Err(err) => warn!(media = %change.media, error = ?err, "media query change event not built"),
        }
    }
}

fn notify(media: &str, listeners: &[Function], event: &Event) {
    for listener in listeners {
        if let Err(err) = listener.call1(&JsValue::NULL, event) {
            warn!(%media, error = ?err, "media query listener threw");
        }
    }
}

fn change_event(media: &str, matches: bool) -> Result<Event, JsValue> {
    let init = MediaQueryListEventInit::new();
    init.set_media(media);
    init.set_matches(matches);
    MediaQueryListEvent::new_with_event_init_dict("change", &init).map(Into::into)
}

/// Stand-in for `MediaQueryList` returned by the patched `matchMedia`.
#[wasm_bindgen]
pub struct AdjustedMediaQueryList {
    query: String,
    state: SharedMedia,
    onchange: Option<Function>,
}

impl AdjustedMediaQueryList {
    pub(crate) fn new(query: String, state: SharedMedia) -> Self {
        Self {
            query,
            state,
            onchange: None,
        }
    }
}

#[wasm_bindgen]
impl AdjustedMediaQueryList {
    /// Whether the adjusted query currently matches.
    #[wasm_bindgen(getter)]
    pub fn matches(&self) -> bool {
        self.state.borrow().matches(&self.query)
    }

    /// The query as the caller wrote it.
    #[wasm_bindgen(getter)]
    pub fn media(&self) -> String {
        self.query.clone()
    }

    /// Handler property; `null` when unset.
    #[wasm_bindgen(getter)]
    pub fn onchange(&self) -> JsValue {
        self.onchange.clone().map_or(JsValue::NULL, Into::into)
    }

    /// Replaces the previous handler. Non-functions clear it.
    #[wasm_bindgen(setter)]
    pub fn set_onchange(&mut self, handler: JsValue) {
        if let Some(previous) = self.onchange.take() {
            self.remove_listener(previous.into());
        }
        if let Some(handler) = handler.dyn_ref::<Function>() {
            self.add_listener(handler.clone().into());
            self.onchange = Some(handler.clone());
        }
    }

    /// Legacy listener registration.
    #[wasm_bindgen(js_name = addListener)]
    pub fn add_listener(&self, listener: JsValue) {
        let Some(listener) = listener.dyn_ref::<Function>() else {
            return;
        };
        let current = self.matches();
        self.state
            .borrow_mut()
            .registry
            .add_listener(&self.query, listener.clone(), current);
    }

    /// Legacy listener removal.
    #[wasm_bindgen(js_name = removeListener)]
    pub fn remove_listener(&self, listener: JsValue) {
        if let Some(listener) = listener.dyn_ref::<Function>() {
            self.state
                .borrow_mut()
                .registry
                .remove_listener(&self.query, listener);
        }
    }

    /// `EventTarget` style registration; only `change` is delivered.
    #[wasm_bindgen(js_name = addEventListener)]
    pub fn add_event_listener(&self, kind: &str, listener: JsValue) {
        if kind == "change" {
            self.add_listener(listener);
        }
    }

    /// `EventTarget` style removal.
    #[wasm_bindgen(js_name = removeEventListener)]
    pub fn remove_event_listener(&self, kind: &str, listener: JsValue) {
        if kind == "change" {
            self.remove_listener(listener);
        }
    }

    /// Deliver a `change` event to every listener of this query. Returns
    /// false when a listener cancelled it.
    #[wasm_bindgen(js_name = dispatchEvent)]
    pub fn dispatch_event(&self, event: Event) -> bool {
        if event.type_() == "change" {
            let listeners = self.state.borrow().registry.listeners(&self.query);
            notify(&self.query, &listeners, &event);
        }
        !event.default_prevented()
    }
}
