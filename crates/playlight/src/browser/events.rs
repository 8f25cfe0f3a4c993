//! Browser event plumbing: DOM listeners, timers, animation frames and
//! host callbacks.

use std::future::Future;
use std::task::Context;

use js_sys::{Function, Promise};
use playlight_core::{DomError, SdkError};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{Event, EventTarget, MouseEvent, Window};

use super::dom::{describe, platform};

/// A DOM event listener, removed when dropped.
pub struct Listener {
    target: EventTarget,
    kind: &'static str,
    callback: Closure<dyn FnMut(Event)>,
}

impl Listener {
    /// Listen for `kind` events on `target`.
    pub fn attach<F>(target: &EventTarget, kind: &'static str, handler: F) -> Result<Self, DomError>
    where
        F: FnMut(Event) + 'static,
    {
        let callback = Closure::<dyn FnMut(Event)>::new(handler);
        target
            .add_event_listener_with_callback(kind, callback.as_ref().unchecked_ref())
            .map_err(platform)?;
        Ok(Self {
            target: target.clone(),
            kind,
            callback,
        })
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        let _ = self
            .target
            .remove_event_listener_with_callback(self.kind, self.callback.as_ref().unchecked_ref());
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener").field("kind", &self.kind).finish_non_exhaustive()
    }
}

/// Pointer position relevant to exit intent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerSample {
    /// Viewport-relative vertical position.
    pub y: f64,
    /// The pointer left the document entirely.
    pub leaving_document: bool,
}

/// Convert a `mousemove`/`mouseout` event to a pointer sample.
pub fn pointer_sample(event: &Event) -> Option<PointerSample> {
    let mouse = event.dyn_ref::<MouseEvent>()?;
    Some(PointerSample {
        y: f64::from(mouse.client_y()),
        leaving_document: event.type_() == "mouseout" && mouse.related_target().is_none(),
    })
}

/// Run `f` once after `delay_ms`.
pub fn set_timeout<F>(window: &Window, delay_ms: u32, f: F) -> Result<i32, DomError>
where
    F: FnOnce() + 'static,
{
    let callback = Closure::once_into_js(f);
    window
        .set_timeout_with_callback_and_timeout_and_arguments_0(
            callback.unchecked_ref(),
            i32::try_from(delay_ms).unwrap_or(i32::MAX),
        )
        .map_err(platform)
}

/// Run `f` once on the next animation frame.
pub fn request_frame<F>(window: &Window, f: F) -> Result<i32, DomError>
where
    F: FnOnce() + 'static,
{
    let callback = Closure::once_into_js(f);
    window
        .request_animation_frame(callback.unchecked_ref())
        .map_err(platform)
}

/// Dispatch a plain `resize` event on the window.
pub fn dispatch_resize(window: &Window) {
    match Event::new("resize") {
        Ok(event) => {
            let _ = window.dispatch_event(&event);
        }
        Err(err) => tracing::warn!(error = %platform(err), "could not create resize event"),
    }
}

/// Call one host callback and wait for a returned promise to settle.
pub async fn invoke_callback(callback: Function) -> Result<(), SdkError> {
    let returned = callback
        .call0(&JsValue::NULL)
        .map_err(|err| SdkError::Callback(describe(&err)))?;
    if let Ok(promise) = returned.dyn_into::<Promise>() {
        JsFuture::from(promise)
            .await
            .map_err(|err| SdkError::Callback(describe(&err)))?;
    }
    Ok(())
}

/// Run `task` up to its first wait right now; only the remainder goes to
/// the executor.
pub fn spawn_eager<F>(task: F)
where
    F: Future<Output = ()> + 'static,
{
    let mut task = Box::pin(task);
    let mut cx = Context::from_waker(futures::task::noop_waker_ref());
    if task.as_mut().poll(&mut cx).is_pending() {
        wasm_bindgen_futures::spawn_local(task);
    }
}
