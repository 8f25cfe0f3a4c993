//! Playlight: embeddable game discovery for partner sites.
//!
//! Browser bindings over [`playlight_core`]. Loading the module installs the
//! console logger, exposes `window.PlayLightSDK` and, when the page defines
//! `window.PlaylightConfig`, initializes itself.
//!
//! # Browser Usage (WASM)
//!
//! ```javascript
//! import init from './playlight.js';
//!
//! window.PlaylightConfig = { sidebar: { forceVisible: true } };
//! await init();
//! window.PlayLightSDK.on('discoveryOpen', () => console.log('opened'));
//! window.PlayLightSDK.setDiscovery(true);
//! ```

#![allow(
    clippy::doc_markdown,
    clippy::missing_const_for_fn,
    clippy::needless_pass_by_value,
    clippy::future_not_send,
    clippy::cast_possible_wrap,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::use_self,
    clippy::unused_self,
    unreachable_pub
)]

pub use playlight_core::*;

pub mod browser;

#[cfg(target_arch = "wasm32")]
pub use browser::PlaylightSdk;

pub use browser::{ConsoleLayer, Storage, StorageError};
