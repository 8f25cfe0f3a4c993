//! Browser runtime for the Playlight SDK.
//!
//! This module binds the platform-independent core to `web-sys`: document
//! access, stylesheet hosting, the window polyfill, observers and the
//! exported SDK object.

// WASM-only modules
#[cfg(target_arch = "wasm32")]
pub mod dom;
#[cfg(target_arch = "wasm32")]
pub mod events;
#[cfg(target_arch = "wasm32")]
pub mod fetch;
#[cfg(target_arch = "wasm32")]
pub mod media;
#[cfg(target_arch = "wasm32")]
pub mod observers;
#[cfg(target_arch = "wasm32")]
pub mod polyfill;
#[cfg(target_arch = "wasm32")]
mod runtime;
#[cfg(target_arch = "wasm32")]
pub mod sdk;
#[cfg(target_arch = "wasm32")]
pub mod styles;

// Cross-platform modules
pub mod logging;
pub mod storage;

#[cfg(target_arch = "wasm32")]
pub use dom::BrowserDom;
#[cfg(target_arch = "wasm32")]
pub use fetch::FetchTransport;
#[cfg(target_arch = "wasm32")]
pub use media::AdjustedMediaQueryList;
#[cfg(target_arch = "wasm32")]
pub use polyfill::WindowPolyfill;
#[cfg(target_arch = "wasm32")]
pub use sdk::PlaylightSdk;
#[cfg(target_arch = "wasm32")]
pub use styles::BrowserStyleHost;
pub use logging::ConsoleLayer;
pub use storage::{Storage, StorageError};
