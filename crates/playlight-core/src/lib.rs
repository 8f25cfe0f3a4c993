//! Platform-independent core of the Playlight SDK.
//!
//! This crate holds everything that decides *what* happens when the SDK
//! grafts its sidebar onto a host page, without touching a browser:
//! - Stylesheet rewriting: [`css::transform_stylesheet`] and the
//!   [`StylesheetInterceptor`] that owns managed sheets
//! - Layout grafting over a [`Dom`]: [`SidebarLayout`], [`check_integrity`]
//! - Geometry and media queries: [`Geometry`], [`MediaQueryRegistry`]
//! - Scheduling primitives: [`RefreshScheduler`], [`Debouncer`]
//! - Configuration, events, exit intent, referral and the [`ApiClient`]
//!
//! The `playlight` crate binds all of this to `web-sys`.

pub mod api;
pub mod config;
pub mod css;
pub mod dom;
mod error;
pub mod events;
pub mod exit_intent;
pub mod graft;
pub mod media_query;
pub mod recommendations;
pub mod referral;
pub mod scheduler;
pub mod sdk;
pub mod stylesheet;
pub mod viewport;
pub mod widgets;

pub use api::{ApiClient, ApiRequest, ApiResponse, Game, GameId, Method, Suggestions, Transport};
pub use config::{ButtonPosition, ConfigStore, SdkConfig};
pub use dom::{Dom, InlineStyle, MemoryDom, NodeId};
pub use error::{guard_phase, ConfigError, DomError, SdkError, StyleError, TransportError};
pub use events::{EventBus, SdkEvent};
pub use exit_intent::ExitIntentDetector;
pub use graft::{
    check_integrity, FrameworkRootHint, GraftHooks, GraftOptions, GraftSession, IntegrityBreach,
    RootDetector, SidebarLayout,
};
pub use media_query::{MediaQueryChange, MediaQueryRegistry};
pub use scheduler::{Debouncer, FrameGate, RefreshScheduler, Ticket};
pub use sdk::{BodyScrollLock, Effect, SdkMessage, SdkState};
pub use stylesheet::{ManagedStylesheet, SheetKind, SheetSnapshot, StyleHost, StylesheetInterceptor};
pub use viewport::{Geometry, ViewportSource};
