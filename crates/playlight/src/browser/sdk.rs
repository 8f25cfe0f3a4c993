//! The `PlayLightSDK` object handed to host pages.
//!
//! Every public method is total: failures are logged to the console and the
//! call becomes a no-op, so a broken SDK never breaks the host page. State
//! transitions are decided by [`SdkState`]; this module only performs the
//! resulting [`Effect`]s.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use js_sys::{Function, Promise, Reflect, JSON};
use playlight_core::api::{ApiClient, Game, GameId};
use playlight_core::config::{ConfigStore, SdkConfig};
use playlight_core::events::{EventBus, SdkEvent};
use playlight_core::exit_intent::ExitIntentDetector;
use playlight_core::graft::GraftOptions;
use playlight_core::recommendations::{quick_recommendations, recommended_games, DEFAULT_THRESHOLD};
use playlight_core::referral::{detect_referral, game_url};
use playlight_core::scheduler::{Debouncer, Ticket};
use playlight_core::sdk::{BodyScrollLock, Effect, SdkMessage, SdkState};
use playlight_core::widgets::{discover_widgets, mount_app_container, restore_app_container};
use playlight_core::{guard_phase, ConfigError, SdkError};
use serde::Serialize;
use tracing::{debug, error, info, info_span, warn, Level};
use url::Url;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{future_to_promise, spawn_local};
use web_sys::{CustomEvent, CustomEventInit, Element, Event};

use super::dom::{describe, platform, BrowserDom};
use super::events::{invoke_callback, pointer_sample, set_timeout, spawn_eager, Listener};
use super::fetch::FetchTransport;
use super::logging;
use super::observers::{subtree_options, MutationWatch};
use super::runtime::{dismantle, establish, Runtime, SharedRuntime, VIEW_ATTRIBUTE};
use super::storage::Storage;

/// DOM event carrying user-facing API failure messages.
pub const NOTIFICATION_EVENT: &str = "playlight:notification";
/// Global the host may define before the module loads.
const CONFIG_GLOBAL: &str = "PlaylightConfig";
/// Global the SDK object is published under.
const SDK_GLOBAL: &str = "PlayLightSDK";

type SharedSdk = Rc<RefCell<SdkInner>>;

struct SdkInner {
    dom: BrowserDom,
    state: SdkState,
    config: ConfigStore,
    bus: EventBus<Function>,
    api: Option<ApiClient<FetchTransport>>,
    runtime: SharedRuntime,
    scroll_lock: BodyScrollLock,
    exit_intent: Option<ExitIntentDetector>,
    app_container: Option<Element>,
    container_check: Debouncer,
    listeners: Vec<Listener>,
    widget_watch: Option<MutationWatch>,
}

/// Playlight SDK instance exposed to JavaScript.
#[wasm_bindgen]
pub struct PlaylightSdk {
    inner: SharedSdk,
}

#[wasm_bindgen]
impl PlaylightSdk {
    /// Bind a fresh, uninitialized SDK to the current page.
    #[wasm_bindgen(constructor)]
    pub fn new() -> Result<PlaylightSdk, JsValue> {
        let dom = BrowserDom::new().map_err(|err| JsValue::from_str(&err.to_string()))?;
        Ok(Self {
            inner: Rc::new(RefCell::new(SdkInner {
                runtime: Runtime::shared(dom.clone()),
                dom,
                state: SdkState::new(),
                config: ConfigStore::default(),
                bus: EventBus::new(),
                api: None,
                scroll_lock: BodyScrollLock::default(),
                exit_intent: None,
                app_container: None,
                container_check: Debouncer::new(0),
                listeners: Vec::new(),
                widget_watch: None,
            })),
        })
    }

    /// Initialize with a partial configuration object. Only the first call
    /// has any effect.
    pub fn init(&self, config: JsValue) {
        let _span = info_span!("init").entered();
        if self.inner.borrow().state.is_initialized() {
            warn!("already initialized, ignoring init");
            return;
        }
        let config = match js_to_json(&config).and_then(|patch| Ok(SdkConfig::from_json(&patch)?)) {
            Ok(config) => config,
            Err(err) => {
                error!(error = %err, "invalid configuration");
                return;
            }
        };

        let location = self.inner.borrow().dom.window().location();
        let page = location.href().ok().and_then(|href| Url::parse(&href).ok());
        let from_partner = detect_referral(page.as_ref(), &Storage::session());
        let host = location.hostname().unwrap_or_default();

        let effects = {
            let mut inner = self.inner.borrow_mut();
            let effects = match inner.state.init(config.clone(), from_partner) {
                Ok(effects) => effects,
                Err(err) => {
                    warn!(error = %err, "init rejected");
                    return;
                }
            };
            inner.config.set(config.clone());

            let api = ApiClient::new(FetchTransport, config.api.base_url.clone(), &host);
            let document = inner.dom.document().clone();
            api.set_notifier(move |message| notify_host(&document, message));
            inner.api = Some(api);

            inner
                .runtime
                .borrow_mut()
                .set_options(GraftOptions::with_hint(config.sidebar.has_framework_root.into()));

            let viewport_height = inner
                .dom
                .window()
                .inner_height()
                .ok()
                .and_then(|h| h.as_f64())
                .unwrap_or_default();
            inner.exit_intent = Some(ExitIntentDetector::new(config.exit_intent.clone(), viewport_height));

            match mount_app_container(&inner.dom) {
                Ok(container) => inner.app_container = Some(container),
                Err(err) => error!(error = %err, "app container could not be mounted"),
            }
            effects
        };

        let weak = Rc::downgrade(&self.inner);
        let store = self.inner.borrow().config.clone();
        store.subscribe(move |config| config_changed(&weak, config));

        let listeners = watch_pointer(&self.inner);
        let widget_watch = watch_body(&self.inner);
        {
            let mut inner = self.inner.borrow_mut();
            inner.listeners = listeners;
            inner.widget_watch = widget_watch;
        }
        scan_widgets(&self.inner);

        apply(&self.inner, effects);
        info!(from_partner, "initialized");
    }

    /// Open or close the discovery overlay. `format` names the placement
    /// that opened it.
    #[wasm_bindgen(js_name = setDiscovery)]
    pub fn set_discovery(&self, open: bool, format: Option<String>) {
        dispatch(&self.inner, SdkMessage::SetDiscovery { open, format });
    }

    /// Merge a partial configuration object into the active one.
    #[wasm_bindgen(js_name = setConfig)]
    pub fn set_config(&self, patch: JsValue) {
        let store = self.inner.borrow().config.clone();
        let updated = js_to_json(&patch).and_then(|patch| Ok(store.update(&patch)?));
        if let Err(err) = updated {
            error!(error = %err, "configuration update rejected");
        }
    }

    /// Register `callback` for a named event.
    pub fn on(&self, event: &str, callback: Function) {
        if let Ok(event) = self.inner.borrow_mut().bus.on(event, callback) {
            debug!(event = event.as_str(), "callback registered");
        }
    }

    /// Move the floating button: `top-left`, `top-right`, `bottom-left`
    /// or `bottom-right`.
    #[wasm_bindgen(js_name = setPosition)]
    pub fn set_position(&self, position: &str) {
        dispatch(&self.inner, SdkMessage::SetPosition(position.to_string()));
    }

    /// Resolves to up to ten games, for `category` when given.
    #[wasm_bindgen(js_name = getRecommendedGames)]
    pub fn get_recommended_games(&self, category: Option<String>) -> Promise {
        let api = self.inner.borrow().api.clone();
        future_to_promise(async move {
            let Some(api) = api else {
                warn!("getRecommendedGames called before init");
                return Ok(JsValue::NULL);
            };
            to_js(&recommended_games(&api, category.as_deref(), DEFAULT_THRESHOLD).await)
        })
    }

    /// Resolves to games matching the current game's category.
    #[wasm_bindgen(js_name = getQuickRecommendations)]
    pub fn get_quick_recommendations(&self) -> Promise {
        let api = self.inner.borrow().api.clone();
        future_to_promise(async move {
            let Some(api) = api else {
                warn!("getQuickRecommendations called before init");
                return Ok(JsValue::NULL);
            };
            to_js(&quick_recommendations(&api, DEFAULT_THRESHOLD).await)
        })
    }

    /// Resolves to the game served from this host, or `null`.
    #[wasm_bindgen(js_name = getCurrentGame)]
    pub fn get_current_game(&self) -> Promise {
        let api = self.inner.borrow().api.clone();
        future_to_promise(async move {
            match api {
                Some(api) => to_js(&api.get_current_game_info().await),
                None => Ok(JsValue::NULL),
            }
        })
    }

    /// Resolves to the like state the platform reports.
    #[wasm_bindgen(js_name = toggleLike)]
    pub fn toggle_like(&self, game_id: JsValue, liked: bool) -> Promise {
        let api = self.inner.borrow().api.clone();
        let id = js_to_json(&game_id)
            .ok()
            .and_then(|v| serde_json::from_value::<GameId>(v).ok());
        future_to_promise(async move {
            match (api, id) {
                (Some(api), Some(id)) => Ok(JsValue::from_bool(api.toggle_like(&id, liked).await)),
                _ => {
                    warn!("toggleLike needs an initialized SDK and a game id");
                    Ok(JsValue::FALSE)
                }
            }
        })
    }

    /// Record a click and open the game in a new tab.
    #[wasm_bindgen(js_name = openGame)]
    pub fn open_game(&self, game: JsValue, format: Option<String>) {
        let game = js_to_json(&game)
            .ok()
            .and_then(|v| serde_json::from_value::<Game>(v).ok());
        let Some(game) = game else {
            error!("openGame needs a game with an id");
            return;
        };
        let Some(url) = game.domain.as_deref().and_then(game_url) else {
            error!(id = %game.id, "game has no domain");
            return;
        };
        let (api, window) = {
            let inner = self.inner.borrow();
            (inner.api.clone(), inner.dom.window().clone())
        };
        if let Some(api) = api {
            spawn_local(async move { api.track_click(&game.id, format.as_deref()).await });
        }
        if let Err(err) = window.open_with_url_and_target(url.as_str(), "_blank") {
            warn!(url = %url, error = %describe(&err), "could not open game");
        }
    }

    /// Whether the discovery overlay is open.
    #[wasm_bindgen(getter, js_name = isDiscoveryOpen)]
    pub fn is_discovery_open(&self) -> bool {
        self.inner.borrow().state.discovery_open()
    }

    /// Whether the sidebar is enabled.
    #[wasm_bindgen(getter, js_name = isSidebarEnabled)]
    pub fn is_sidebar_enabled(&self) -> bool {
        self.inner.borrow().state.sidebar_enabled()
    }

    /// Whether the sidebar graft is currently in place.
    #[wasm_bindgen(getter, js_name = isSidebarActive)]
    pub fn is_sidebar_active(&self) -> bool {
        let runtime = self.inner.borrow().runtime.clone();
        let active = runtime.borrow().is_active();
        active
    }
}

/// Module entry point: logging, then the global SDK object.
#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
    logging::init(Level::INFO);

    let sdk = match PlaylightSdk::new() {
        Ok(sdk) => sdk,
        Err(err) => {
            error!(error = %describe(&err), "SDK unavailable");
            return;
        }
    };
    let window = sdk.inner.borrow().dom.window().clone();
    match Reflect::get(&window, &CONFIG_GLOBAL.into()) {
        Ok(config) if !config.is_undefined() && !config.is_null() => sdk.init(config),
        _ => debug!("no page configuration, waiting for init"),
    }
    if let Err(err) = Reflect::set(&window, &SDK_GLOBAL.into(), &sdk.into()) {
        error!(error = %describe(&err), "could not publish SDK object");
    }
}

fn dispatch(inner: &SharedSdk, message: SdkMessage) {
    let result = inner.borrow_mut().state.update(message);
    match result {
        Ok(effects) => apply(inner, effects),
        Err(err) => warn!(error = %err, "call ignored"),
    }
}

fn apply(inner: &SharedSdk, effects: Vec<Effect>) {
    for effect in effects {
        match effect {
            Effect::Emit(event) => {
                reflect_discovery(inner, event);
                let emission = inner.borrow().bus.emit(event, invoke_callback);
                spawn_eager(async move {
                    emission.await;
                });
            }
            Effect::SetupSidebar => {
                let runtime = inner.borrow().runtime.clone();
                if !establish(&runtime) {
                    warn!("sidebar could not be established");
                }
            }
            Effect::RemoveSidebar => {
                let runtime = inner.borrow().runtime.clone();
                dismantle(&runtime);
            }
            Effect::LockBodyScroll => {
                let mut guard = inner.borrow_mut();
                let SdkInner { dom, scroll_lock, .. } = &mut *guard;
                guard_phase("lock body scroll", scroll_lock.lock(&*dom));
            }
            Effect::UnlockBodyScroll => {
                let mut guard = inner.borrow_mut();
                let SdkInner { dom, scroll_lock, .. } = &mut *guard;
                guard_phase("unlock body scroll", scroll_lock.unlock(&*dom));
            }
            Effect::TrackOpen(format) => {
                if let Some(api) = inner.borrow().api.clone() {
                    spawn_local(async move { api.track_open(format.as_deref()).await });
                }
            }
            Effect::SetButtonPosition(position) => {
                if let Some(container) = &inner.borrow().app_container {
                    guard_phase(
                        "button position",
                        container
                            .set_attribute("data-position", position.as_str())
                            .map_err(platform),
                    );
                }
            }
        }
    }
}

/// Mirror the overlay state on the app container for the host's styles.
fn reflect_discovery(inner: &SharedSdk, event: SdkEvent) {
    let state = match event {
        SdkEvent::DiscoveryOpen => "open",
        SdkEvent::DiscoveryClose => "closed",
        _ => return,
    };
    if let Some(container) = &inner.borrow().app_container {
        guard_phase(
            "discovery state",
            container.set_attribute("data-discovery", state).map_err(platform),
        );
    }
}

fn config_changed(weak: &Weak<RefCell<SdkInner>>, config: &SdkConfig) {
    let Some(inner) = weak.upgrade() else {
        return;
    };
    {
        let mut guard = inner.borrow_mut();
        guard
            .runtime
            .borrow_mut()
            .set_options(GraftOptions::with_hint(config.sidebar.has_framework_root.into()));
        if let Some(detector) = guard.exit_intent.as_mut() {
            detector.reconfigure(config.exit_intent.clone());
        }
    }
    dispatch(&inner, SdkMessage::ConfigChanged(config.clone()));
}

fn watch_pointer(inner: &SharedSdk) -> Vec<Listener> {
    let document = inner.borrow().dom.document().clone();
    let mut listeners = Vec::new();
    for kind in ["mousemove", "mouseout"] {
        let weak = Rc::downgrade(inner);
        match Listener::attach(document.as_ref(), kind, move |event| pointer_moved(&weak, &event)) {
            Ok(listener) => listeners.push(listener),
            Err(err) => warn!(kind, error = %err, "exit intent listener unavailable"),
        }
    }
    listeners
}

fn pointer_moved(weak: &Weak<RefCell<SdkInner>>, event: &Event) {
    let Some(sample) = pointer_sample(event) else {
        return;
    };
    let Some(inner) = weak.upgrade() else {
        return;
    };
    let (timing, window) = {
        let mut guard = inner.borrow_mut();
        let Some(detector) = guard.exit_intent.as_mut() else {
            return;
        };
        let fired = if sample.leaving_document {
            detector.on_pointer_leave(sample.y)
        } else if event.type_() == "mousemove" {
            detector.on_pointer_move(sample.y)
        } else {
            false
        };
        if !fired {
            return;
        }
        let timing = (detector.config().delay_ms, detector.config().cooldown_ms);
        (timing, guard.dom.window().clone())
    };
    let (delay_ms, cooldown_ms) = timing;
    debug!(delay_ms, "exit intent detected");

    let on_delay = weak.clone();
    let opened = set_timeout(&window, delay_ms, move || {
        if let Some(inner) = on_delay.upgrade() {
            dispatch(&inner, SdkMessage::ExitIntent);
        }
    });
    guard_phase("exit intent delay", opened.map(drop));

    let on_cooldown = weak.clone();
    let rearmed = set_timeout(&window, cooldown_ms, move || {
        if let Some(inner) = on_cooldown.upgrade() {
            if let Some(detector) = inner.borrow_mut().exit_intent.as_mut() {
                detector.rearm();
            }
        }
    });
    guard_phase("exit intent cooldown", rearmed.map(drop));
}

/// One observer on the body subtree: widget discovery and app container
/// restoration.
fn watch_body(inner: &SharedSdk) -> Option<MutationWatch> {
    let weak = Rc::downgrade(inner);
    let body = inner.borrow().dom.document().body()?;
    let watch = MutationWatch::new(move |_records| body_mutated(&weak));
    let watching = watch.and_then(|watch| {
        watch.observe(body.as_ref(), &subtree_options())?;
        Ok(watch)
    });
    match watching {
        Ok(watch) => Some(watch),
        Err(err) => {
            warn!(error = %err, "widget watch unavailable, late widgets will not mount");
            None
        }
    }
}

fn body_mutated(weak: &Weak<RefCell<SdkInner>>) {
    let Some(inner) = weak.upgrade() else {
        return;
    };
    scan_widgets(&inner);
    let (ticket, window) = {
        let mut guard = inner.borrow_mut();
        (guard.container_check.schedule(), guard.dom.window().clone())
    };
    let on_tick = weak.clone();
    guard_phase(
        "app container check",
        set_timeout(&window, 0, move || check_container(&on_tick, ticket)).map(drop),
    );
}

fn check_container(weak: &Weak<RefCell<SdkInner>>, ticket: Ticket) {
    let Some(inner) = weak.upgrade() else {
        return;
    };
    let mut guard = inner.borrow_mut();
    if !guard.container_check.fire(ticket) {
        return;
    }
    let Some(container) = guard.app_container.clone() else {
        return;
    };
    match restore_app_container(&guard.dom, &container) {
        Ok(true) => info!("app container restored"),
        Ok(false) => {}
        Err(err) => warn!(error = %err, "app container could not be restored"),
    }
}

fn scan_widgets(inner: &SharedSdk) {
    let (dom, marker) = {
        let guard = inner.borrow();
        (guard.dom.clone(), guard.config.get().widgets.marker_class)
    };
    discover_widgets(&dom, &marker, |container| {
        container
            .set_attribute(VIEW_ATTRIBUTE, "widget")
            .map_err(|err| SdkError::from(platform(err)))
    });
}

fn notify_host(document: &web_sys::Document, message: &str) {
    let init = CustomEventInit::new();
    init.set_detail(&JsValue::from_str(message));
    let dispatched = CustomEvent::new_with_event_init_dict(NOTIFICATION_EVENT, &init)
        .and_then(|event| document.dispatch_event(&event));
    if let Err(err) = dispatched {
        warn!(error = %describe(&err), "notification not delivered");
    }
}

fn js_to_json(value: &JsValue) -> Result<serde_json::Value, SdkError> {
    if value.is_undefined() || value.is_null() {
        return Ok(serde_json::Value::Null);
    }
    let text: String = JSON::stringify(value)
        .map_err(|err| ConfigError::Invalid(describe(&err)))?
        .into();
    serde_json::from_str(&text).map_err(|err| ConfigError::Invalid(err.to_string()).into())
}

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    let text = serde_json::to_string(value).map_err(|err| JsValue::from_str(&err.to_string()))?;
    JSON::parse(&text)
}
