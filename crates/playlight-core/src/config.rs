//! SDK configuration.
//!
//! The host passes a partial JSON object; it is merged over the defaults and
//! then deserialized. The store hands out snapshots and tells subscribers
//! about every accepted update.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ConfigError, SdkError};

/// Corner the floating discovery button sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ButtonPosition {
    /// Top left corner.
    TopLeft,
    /// Top right corner.
    TopRight,
    /// Bottom left corner.
    BottomLeft,
    /// Bottom right corner.
    #[default]
    BottomRight,
}

impl ButtonPosition {
    /// Every accepted position.
    pub const ALL: [Self; 4] = [Self::TopLeft, Self::TopRight, Self::BottomLeft, Self::BottomRight];

    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TopLeft => "top-left",
            Self::TopRight => "top-right",
            Self::BottomLeft => "bottom-left",
            Self::BottomRight => "bottom-right",
        }
    }
}

impl fmt::Display for ButtonPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ButtonPosition {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| SdkError::InvalidPosition(s.to_string()))
    }
}

/// `button` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ButtonConfig {
    /// Corner of the floating button.
    pub position: ButtonPosition,
    /// Whether the button is shown.
    pub visible: bool,
}

impl Default for ButtonConfig {
    fn default() -> Self {
        Self {
            position: ButtonPosition::BottomRight,
            visible: true,
        }
    }
}

/// `exitIntent` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExitIntentConfig {
    /// Whether exit intent opens discovery.
    pub enabled: bool,
    /// Height of the top band, in CSS pixels.
    pub sensitivity_px: f64,
    /// Delay between detection and opening.
    pub delay_ms: u32,
    /// Quiet period after a trigger.
    pub cooldown_ms: u32,
}

impl Default for ExitIntentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sensitivity_px: 20.0,
            delay_ms: 500,
            cooldown_ms: 5000,
        }
    }
}

/// `sidebar` section.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SidebarConfig {
    /// Whether the page is owned by a single-root view library; unset lets
    /// the detector decide.
    pub has_framework_root: Option<bool>,
    /// Show the sidebar regardless of referral.
    pub force_visible: bool,
    /// Opt into beta sidebar content.
    pub enable_beta: bool,
}

/// `widgets` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WidgetConfig {
    /// Class marking widget containers.
    pub marker_class: String,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            marker_class: crate::widgets::WIDGET_MARKER_CLASS.to_string(),
        }
    }
}

/// `api` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiConfig {
    /// Platform API root.
    pub base_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: crate::api::DEFAULT_API_URL.to_string(),
        }
    }
}

/// Full SDK configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SdkConfig {
    /// Floating button.
    pub button: ButtonConfig,
    /// Exit intent detection.
    pub exit_intent: ExitIntentConfig,
    /// Sidebar layout.
    pub sidebar: SidebarConfig,
    /// Inline widgets.
    pub widgets: WidgetConfig,
    /// Platform API.
    pub api: ApiConfig,
}

impl SdkConfig {
    /// Merge a partial JSON object over the defaults.
    pub fn from_json(patch: &Value) -> Result<Self, ConfigError> {
        Self::default().merged(patch)
    }

    /// Merge a partial JSON object over this configuration.
    pub fn merged(&self, patch: &Value) -> Result<Self, ConfigError> {
        if !(patch.is_object() || patch.is_null()) {
            return Err(ConfigError::Invalid("configuration must be an object".into()));
        }
        let mut base = serde_json::to_value(self)?;
        merge_json(&mut base, patch);
        Ok(serde_json::from_value(base)?)
    }

    /// Whether the sidebar should be shown for a visit.
    #[must_use]
    pub const fn sidebar_visible(&self, from_partner: bool) -> bool {
        self.sidebar.force_visible || from_partner
    }
}

/// Recursive merge: objects merge key by key, anything else replaces.
pub fn merge_json(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                match base.get_mut(key) {
                    Some(existing) if value.is_object() => merge_json(existing, value),
                    _ => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (_, Value::Null) => {}
        (base, patch) => *base = patch.clone(),
    }
}

type Subscriber = Box<dyn Fn(&SdkConfig)>;

struct StoreInner {
    value: SdkConfig,
    subscribers: Vec<Subscriber>,
}

/// Reactive configuration holder shared by the SDK components.
///
/// Clones share state. Subscribers run synchronously after each update and
/// must not update the store themselves.
#[derive(Clone)]
pub struct ConfigStore {
    inner: Rc<RefCell<StoreInner>>,
}

impl ConfigStore {
    /// Create a store holding `value`.
    #[must_use]
    pub fn new(value: SdkConfig) -> Self {
        Self {
            inner: Rc::new(RefCell::new(StoreInner {
                value,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Snapshot of the current configuration.
    #[must_use]
    pub fn get(&self) -> SdkConfig {
        self.inner.borrow().value.clone()
    }

    /// Replace the configuration.
    pub fn set(&self, value: SdkConfig) {
        self.inner.borrow_mut().value = value;
        self.notify();
    }

    /// Merge a partial JSON object into the configuration. An invalid patch
    /// leaves the configuration untouched.
    pub fn update(&self, patch: &Value) -> Result<(), ConfigError> {
        let merged = self.inner.borrow().value.merged(patch)?;
        self.set(merged);
        Ok(())
    }

    /// Run `callback` after every update.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&SdkConfig) + 'static,
    {
        self.inner.borrow_mut().subscribers.push(Box::new(callback));
    }

    fn notify(&self) {
        let inner = self.inner.borrow();
        for subscriber in &inner.subscribers {
            subscriber(&inner.value);
        }
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(SdkConfig::default())
    }
}

impl fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigStore")
            .field("value", &self.inner.borrow().value)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;

    #[test]
    fn test_defaults() {
        let config = SdkConfig::default();
        assert_eq!(config.button.position, ButtonPosition::BottomRight);
        assert!(config.button.visible);
        assert!(config.exit_intent.enabled);
        assert_eq!(config.exit_intent.sensitivity_px, 20.0);
        assert_eq!(config.exit_intent.delay_ms, 500);
        assert_eq!(config.exit_intent.cooldown_ms, 5000);
        assert_eq!(config.sidebar.has_framework_root, None);
        assert_eq!(config.widgets.marker_class, "playlight-widget-carousel");
        assert_eq!(config.api.base_url, "https://api.playlight.dev/platform");
    }

    #[test]
    fn test_partial_object_merges() {
        let config = SdkConfig::from_json(&json!({
            "button": { "position": "top-left" },
            "sidebar": { "hasFrameworkRoot": true }
        }))
        .unwrap();
        assert_eq!(config.button.position, ButtonPosition::TopLeft);
        assert!(config.button.visible);
        assert_eq!(config.sidebar.has_framework_root, Some(true));
        assert!(!config.sidebar.force_visible);
    }

    #[test]
    fn test_invalid_patch_rejected() {
        assert!(SdkConfig::from_json(&json!({ "button": { "position": "middle" } })).is_err());
        assert!(SdkConfig::from_json(&json!([1, 2])).is_err());
        assert!(SdkConfig::from_json(&Value::Null).is_ok());
    }

    #[test]
    fn test_merge_json_semantics() {
        let mut base = json!({ "a": { "b": 1, "c": [1, 2] }, "d": 1 });
        merge_json(&mut base, &json!({ "a": { "c": [3] }, "e": { "f": true } }));
        assert_eq!(base, json!({ "a": { "b": 1, "c": [3] }, "d": 1, "e": { "f": true } }));
    }

    #[test]
    fn test_position_parse() {
        assert_eq!("top-right".parse::<ButtonPosition>(), Ok(ButtonPosition::TopRight));
        assert_eq!(
            "centre".parse::<ButtonPosition>(),
            Err(SdkError::InvalidPosition("centre".into()))
        );
    }

    #[test]
    fn test_sidebar_visibility() {
        let mut config = SdkConfig::default();
        assert!(!config.sidebar_visible(false));
        assert!(config.sidebar_visible(true));
        config.sidebar.force_visible = true;
        assert!(config.sidebar_visible(false));
    }

    #[test]
    fn test_store_notifies_and_keeps_state_on_error() {
        let store = ConfigStore::default();
        let seen = Rc::new(Cell::new(0));
        let counter = Rc::clone(&seen);
        store.subscribe(move |_| counter.set(counter.get() + 1));

        store.update(&json!({ "sidebar": { "forceVisible": true } })).unwrap();
        assert!(store.get().sidebar.force_visible);
        assert_eq!(seen.get(), 1);

        assert!(store.update(&json!({ "exitIntent": { "delayMs": "soon" } })).is_err());
        assert_eq!(seen.get(), 1);
        assert_eq!(store.get().exit_intent.delay_ms, 500);
    }
}
