//! Window capability polyfill.
//!
//! While the graft is live the page scrolls inside the inner wrapper and is
//! narrower than the window, so the window's geometry surface is patched to
//! describe the wrapper instead:
//! - `innerWidth` reads the wrapper width
//! - `scrollX`/`scrollY` and `pageXOffset`/`pageYOffset` read wrapper offsets
//! - `scrollTo`/`scroll`/`scrollBy` scroll the wrapper
//! - wrapper `scroll` events are re-dispatched on the window
//! - `matchMedia` evaluates breakpoint-shifted queries
//!
//! Every property descriptor is saved before patching and put back exactly
//! on restore; each restore step is guarded on its own.

use js_sys::{Array, Function, Object, Reflect};
use playlight_core::css::TransformParams;
use playlight_core::media_query::MediaQueryChange;
use playlight_core::{guard_phase, Geometry, SdkError, ViewportSource};
use tracing::debug;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Event, HtmlElement, Window};

use super::dom::platform;
use super::media::{AdjustedMediaQueryList, MediaState, SharedMedia};

const WIDTH_PROPERTY: &str = "innerWidth";
const SCROLL_X_PROPERTIES: [&str; 2] = ["scrollX", "pageXOffset"];
const SCROLL_Y_PROPERTIES: [&str; 2] = ["scrollY", "pageYOffset"];
const SCROLL_METHODS: [&str; 3] = ["scrollTo", "scroll", "scrollBy"];
const MATCH_MEDIA: &str = "matchMedia";

#[derive(Debug)]
struct SavedProperty {
    name: &'static str,
    /// Own descriptor before patching; `undefined` when the property was
    /// inherited.
    descriptor: JsValue,
}

/// Geometry of the grafted page, read on demand. Bypasses the patched
/// `innerWidth` through the saved native getter.
#[derive(Debug, Clone)]
pub(crate) struct LiveViewport {
    window: Window,
    wrapper: HtmlElement,
    native_width: Option<Function>,
}

impl LiveViewport {
    pub(crate) fn params(&self) -> TransformParams {
        Geometry::measure(self).transform_params()
    }
}

impl ViewportSource for LiveViewport {
    fn window_width(&self) -> f64 {
        native_inner_width(&self.window, self.native_width.as_ref())
    }

    fn window_height(&self) -> f64 {
        self.window
            .inner_height()
            .ok()
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0)
    }

    fn content_width(&self) -> Option<f64> {
        Some(f64::from(self.wrapper.offset_width()))
    }
}

/// Patches the window for the lifetime of one graft.
#[derive(Debug)]
pub struct WindowPolyfill {
    window: Window,
    wrapper: Option<HtmlElement>,
    saved: Vec<SavedProperty>,
    scroll_forwarder: Option<Function>,
    media: SharedMedia,
}

impl WindowPolyfill {
    /// Prepare a polyfill for `window`. Nothing is patched yet.
    pub fn new(window: Window) -> Self {
        let native = Reflect::get(&window, &MATCH_MEDIA.into())
            .ok()
            .and_then(|f| f.dyn_into::<Function>().ok())
            .unwrap_or_else(|| Function::new_no_args("return { matches: false };"));
        let params = identity_params(&window);
        Self {
            media: MediaState::shared(window.clone(), native, params),
            window,
            wrapper: None,
            saved: Vec::new(),
            scroll_forwarder: None,
        }
    }

    /// Whether the window is currently patched.
    pub fn is_installed(&self) -> bool {
        self.wrapper.is_some()
    }

    /// Patch the window to describe `wrapper`.
    pub fn install(&mut self, wrapper: &HtmlElement) -> Result<(), SdkError> {
        if self.is_installed() {
            return Ok(());
        }
        self.wrapper = Some(wrapper.clone());

        let target = wrapper.clone();
        guard_phase(
            WIDTH_PROPERTY,
            self.patch_getter(WIDTH_PROPERTY, move || f64::from(target.offset_width())),
        );
        for name in SCROLL_X_PROPERTIES {
            let target = wrapper.clone();
            guard_phase(name, self.patch_getter(name, move || f64::from(target.scroll_left())));
        }
        for name in SCROLL_Y_PROPERTIES {
            let target = wrapper.clone();
            guard_phase(name, self.patch_getter(name, move || f64::from(target.scroll_top())));
        }
        for name in SCROLL_METHODS {
            guard_phase(name, self.patch_scroll_method(name, wrapper));
        }
        guard_phase("scroll forwarding", self.forward_scroll_events(wrapper));
        guard_phase(MATCH_MEDIA, self.patch_match_media());
        self.media.borrow_mut().track(LiveViewport {
            window: self.window.clone(),
            wrapper: wrapper.clone(),
            native_width: self.native_width(),
        });

        debug!(patched = self.saved.len(), "window polyfill installed");
        Ok(())
    }

    /// Put every saved descriptor back. Each property is restored on its
    /// own, so one failure does not block the rest.
    pub fn restore(&mut self) -> Result<(), SdkError> {
        let Some(wrapper) = self.wrapper.take() else {
            return Ok(());
        };
        for saved in std::mem::take(&mut self.saved).into_iter().rev() {
            guard_phase(saved.name, self.restore_property(&saved));
        }
        if let Some(forwarder) = self.scroll_forwarder.take() {
            guard_phase(
                "scroll forwarding",
                wrapper
                    .remove_event_listener_with_callback("scroll", &forwarder)
                    .map_err(platform),
            );
        }
        self.media.borrow_mut().reset(identity_params(&self.window));
        debug!("window polyfill restored");
        Ok(())
    }

    /// Feed new geometry to adjusted media queries. The returned changes
    /// must be dispatched once no SDK state is borrowed.
    pub(crate) fn media_tick(&self, params: TransformParams) -> Vec<MediaQueryChange<Function>> {
        self.media.borrow_mut().tick(params)
    }

    /// The browser's own `innerWidth`, bypassing the patch.
    pub fn true_width(&self) -> f64 {
        native_inner_width(&self.window, self.native_width().as_ref())
    }

    fn native_width(&self) -> Option<Function> {
        self.saved
            .iter()
            .find(|saved| saved.name == WIDTH_PROPERTY)
            .and_then(|saved| Reflect::get(&saved.descriptor, &"get".into()).ok())
            .and_then(|getter| getter.dyn_into::<Function>().ok())
    }

    fn save(&mut self, name: &'static str) {
        let descriptor = Object::get_own_property_descriptor(&self.window, &name.into());
        self.saved.push(SavedProperty { name, descriptor });
    }

    fn define(&mut self, name: &'static str, descriptor: &Object) -> Result<(), SdkError> {
        self.save(name);
        let defined = Reflect::define_property(&self.window, &name.into(), descriptor).map_err(platform)?;
        if !defined {
            self.saved.pop();
            return Err(platform(JsValue::from_str(&format!("{name} is not configurable"))).into());
        }
        Ok(())
    }

    fn patch_getter<F>(&mut self, name: &'static str, getter: F) -> Result<(), SdkError>
    where
        F: Fn() -> f64 + 'static,
    {
        let getter = Closure::<dyn Fn() -> f64>::new(getter).into_js_value();
        let descriptor = Object::new();
        Reflect::set(&descriptor, &"get".into(), &getter).map_err(platform)?;
        Reflect::set(&descriptor, &"configurable".into(), &true.into()).map_err(platform)?;
        Reflect::set(&descriptor, &"enumerable".into(), &true.into()).map_err(platform)?;
        self.define(name, &descriptor)
    }

    fn patch_value(&mut self, name: &'static str, value: &JsValue) -> Result<(), SdkError> {
        let descriptor = Object::new();
        Reflect::set(&descriptor, &"value".into(), value).map_err(platform)?;
        Reflect::set(&descriptor, &"writable".into(), &true.into()).map_err(platform)?;
        Reflect::set(&descriptor, &"configurable".into(), &true.into()).map_err(platform)?;
        self.define(name, &descriptor)
    }

    fn patch_scroll_method(&mut self, name: &'static str, wrapper: &HtmlElement) -> Result<(), SdkError> {
        let target = wrapper.clone();
        let method = Closure::<dyn Fn(JsValue, JsValue)>::new(move |first: JsValue, second: JsValue| {
            let args = if second.is_undefined() {
                Array::of1(&first)
            } else {
                Array::of2(&first, &second)
            };
            let forwarded = Reflect::get(&target, &name.into())
                .and_then(JsCast::dyn_into::<Function>)
                .and_then(|f| Reflect::apply(&f, &target, &args));
            if let Err(err) = forwarded {
                tracing::warn!(method = name, error = ?err, "scroll redirect failed");
            }
        })
        .into_js_value();
        self.patch_value(name, &method)
    }

    fn forward_scroll_events(&mut self, wrapper: &HtmlElement) -> Result<(), SdkError> {
        let window = self.window.clone();
        let forwarder: Function = Closure::<dyn Fn()>::new(move || {
            if let Ok(event) = Event::new("scroll") {
                let _ = window.dispatch_event(&event);
            }
        })
        .into_js_value()
        .unchecked_into();
        wrapper
            .add_event_listener_with_callback("scroll", &forwarder)
            .map_err(platform)?;
        self.scroll_forwarder = Some(forwarder);
        Ok(())
    }

    fn patch_match_media(&mut self) -> Result<(), SdkError> {
        let state = self.media.clone();
        let match_media = Closure::<dyn Fn(JsValue) -> JsValue>::new(move |query: JsValue| {
            let query = query.as_string().unwrap_or_default();
            AdjustedMediaQueryList::new(query, state.clone()).into()
        })
        .into_js_value();
        self.patch_value(MATCH_MEDIA, &match_media)
    }

    fn restore_property(&self, saved: &SavedProperty) -> Result<(), SdkError> {
        let key = JsValue::from_str(saved.name);
        let restored = if saved.descriptor.is_undefined() {
            Reflect::delete_property(&self.window, &key)
        } else {
            Reflect::define_property(&self.window, &key, saved.descriptor.unchecked_ref())
        }
        .map_err(platform)?;
        if restored {
            Ok(())
        } else {
            Err(platform(JsValue::from_str(&format!("{} could not be restored", saved.name))).into())
        }
    }
}

impl ViewportSource for WindowPolyfill {
    fn window_width(&self) -> f64 {
        self.true_width()
    }

    fn window_height(&self) -> f64 {
        self.window
            .inner_height()
            .ok()
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0)
    }

    fn content_width(&self) -> Option<f64> {
        self.wrapper.as_ref().map(|w| f64::from(w.offset_width()))
    }
}

fn native_inner_width(window: &Window, getter: Option<&Function>) -> f64 {
    let width = match getter {
        Some(getter) => getter.call0(window),
        None => window.inner_width(),
    };
    width.ok().and_then(|v| v.as_f64()).unwrap_or(0.0)
}

fn identity_params(window: &Window) -> TransformParams {
    let width = window.inner_width().ok().and_then(|v| v.as_f64()).unwrap_or(0.0);
    let height = window.inner_height().ok().and_then(|v| v.as_f64()).unwrap_or(0.0);
    TransformParams::identity(width, height)
}
