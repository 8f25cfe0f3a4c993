//! [`Transport`] over the browser `fetch` API.

use futures::future::{FutureExt, LocalBoxFuture};
use playlight_core::api::{ApiRequest, ApiResponse, Transport};
use playlight_core::TransportError;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{Headers, Request, RequestInit, Response};

use super::dom::describe;

/// JSON requests through `window.fetch`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchTransport;

impl Transport for FetchTransport {
    fn send(&self, request: ApiRequest) -> LocalBoxFuture<'static, Result<ApiResponse, TransportError>> {
        fetch(request).boxed_local()
    }
}

async fn fetch(request: ApiRequest) -> Result<ApiResponse, TransportError> {
    let network = |err: JsValue| TransportError::Network(describe(&err));
    let window = web_sys::window().ok_or_else(|| TransportError::Network("no window".into()))?;

    let headers = Headers::new().map_err(network)?;
    headers.set("Content-Type", "application/json").map_err(network)?;
    let init = RequestInit::new();
    init.set_method(request.method.as_str());
    init.set_headers(&headers);
    if let Some(body) = &request.body {
        init.set_body(&JsValue::from_str(body));
    }

    let request = Request::new_with_str_and_init(&request.url, &init).map_err(network)?;
    let response: Response = JsFuture::from(window.fetch_with_request(&request))
        .await
        .map_err(network)?
        .dyn_into()
        .map_err(|_| TransportError::Network("fetch did not return a response".into()))?;

    let decode = |err: JsValue| TransportError::Decode(describe(&err));
    let body = JsFuture::from(response.text().map_err(decode)?)
        .await
        .map_err(decode)?
        .as_string()
        .unwrap_or_default();

    Ok(ApiResponse {
        status: response.status(),
        body,
    })
}
