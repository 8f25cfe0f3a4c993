//! SDK lifecycle state.
//!
//! `SdkState + SdkMessage -> Vec<Effect>`: the state machine decides what
//! must happen, the browser facade performs the effects in order. Keeping the
//! decisions here makes every transition testable without a document.

use tracing::warn;

use crate::config::{ButtonPosition, SdkConfig};
use crate::dom::{Dom, InlineStyle};
use crate::error::{DomError, SdkError};
use crate::events::SdkEvent;

/// Input to the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum SdkMessage {
    /// Open or close the discovery overlay.
    SetDiscovery {
        /// Target visibility.
        open: bool,
        /// Placement that triggered the open, for tracking.
        format: Option<String>,
    },
    /// The configuration store accepted an update.
    ConfigChanged(SdkConfig),
    /// The referral flag became known.
    ReferralDetected(bool),
    /// Host asked to move the button.
    SetPosition(String),
    /// The exit intent delay elapsed.
    ExitIntent,
}

/// Side effect requested by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Notify host callbacks.
    Emit(SdkEvent),
    /// Establish the sidebar graft.
    SetupSidebar,
    /// Remove the sidebar graft.
    RemoveSidebar,
    /// Stop the page behind the overlay from scrolling.
    LockBodyScroll,
    /// Undo [`Effect::LockBodyScroll`].
    UnlockBodyScroll,
    /// Record an overlay open with the platform.
    TrackOpen(Option<String>),
    /// Move the floating button.
    SetButtonPosition(ButtonPosition),
}

/// Lifecycle state of one SDK instance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SdkState {
    initialized: bool,
    config: SdkConfig,
    from_partner: bool,
    discovery_open: bool,
    sidebar_enabled: bool,
}

impl SdkState {
    /// Create an uninitialized state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `init` ran.
    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Whether the overlay is open.
    #[must_use]
    pub const fn discovery_open(&self) -> bool {
        self.discovery_open
    }

    /// Whether the sidebar is enabled.
    #[must_use]
    pub const fn sidebar_enabled(&self) -> bool {
        self.sidebar_enabled
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &SdkConfig {
        &self.config
    }

    /// First initialization. A second call is rejected.
    pub fn init(&mut self, config: SdkConfig, from_partner: bool) -> Result<Vec<Effect>, SdkError> {
        if self.initialized {
            return Err(SdkError::AlreadyInitialized);
        }
        self.initialized = true;
        self.config = config;
        self.from_partner = from_partner;
        let mut effects = vec![Effect::SetButtonPosition(self.config.button.position)];
        effects.extend(self.derive_sidebar());
        Ok(effects)
    }

    /// Apply a message.
    pub fn update(&mut self, message: SdkMessage) -> Result<Vec<Effect>, SdkError> {
        if !self.initialized {
            return Err(SdkError::NotInitialized);
        }
        match message {
            SdkMessage::SetDiscovery { open: true, format } => Ok(self.open_discovery(format)),
            SdkMessage::SetDiscovery { open: false, .. } => Ok(self.close_discovery()),
            SdkMessage::ConfigChanged(config) => {
                self.config = config;
                Ok(self.derive_sidebar())
            }
            SdkMessage::ReferralDetected(from_partner) => {
                self.from_partner = self.from_partner || from_partner;
                Ok(self.derive_sidebar())
            }
            SdkMessage::SetPosition(position) => {
                let position: ButtonPosition = position.parse()?;
                self.config.button.position = position;
                Ok(vec![Effect::SetButtonPosition(position)])
            }
            SdkMessage::ExitIntent => {
                if self.discovery_open || !self.config.exit_intent.enabled {
                    return Ok(Vec::new());
                }
                let mut effects = vec![Effect::Emit(SdkEvent::ExitIntent)];
                effects.extend(self.open_discovery(Some("exit-intent".to_string())));
                Ok(effects)
            }
        }
    }

    fn open_discovery(&mut self, format: Option<String>) -> Vec<Effect> {
        if self.discovery_open {
            return Vec::new();
        }
        if format.is_none() {
            warn!("discovery opened without a format");
        }
        self.discovery_open = true;
        vec![
            Effect::Emit(SdkEvent::DiscoveryOpen),
            Effect::LockBodyScroll,
            Effect::TrackOpen(format),
        ]
    }

    fn close_discovery(&mut self) -> Vec<Effect> {
        if !self.discovery_open {
            return Vec::new();
        }
        self.discovery_open = false;
        vec![Effect::Emit(SdkEvent::DiscoveryClose), Effect::UnlockBodyScroll]
    }

    fn derive_sidebar(&mut self) -> Vec<Effect> {
        let enabled = self.config.sidebar_visible(self.from_partner);
        if enabled == self.sidebar_enabled {
            return Vec::new();
        }
        self.sidebar_enabled = enabled;
        if enabled {
            vec![Effect::SetupSidebar, Effect::Emit(SdkEvent::SidebarEnable)]
        } else {
            vec![Effect::RemoveSidebar, Effect::Emit(SdkEvent::SidebarDisable)]
        }
    }
}

/// Saved body `overflow` while the overlay is open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BodyScrollLock {
    saved: Option<Option<InlineStyle>>,
}

impl BodyScrollLock {
    /// Force `overflow: hidden !important` on the body, remembering the old value.
    pub fn lock<D: Dom>(&mut self, dom: &D) -> Result<(), DomError> {
        if self.saved.is_some() {
            return Ok(());
        }
        let body = dom.body()?;
        let previous = dom.inline_style(&body, "overflow");
        dom.set_inline_style(&body, "overflow", &InlineStyle::new("hidden", "important"))?;
        self.saved = Some(previous);
        Ok(())
    }

    /// Put the remembered `overflow` back.
    pub fn unlock<D: Dom>(&mut self, dom: &D) -> Result<(), DomError> {
        let Some(previous) = self.saved.take() else {
            return Ok(());
        };
        let body = dom.body()?;
        match previous {
            Some(style) => dom.set_inline_style(&body, "overflow", &style),
            None => dom.remove_inline_style(&body, "overflow"),
        }
    }

    /// Whether the body is currently locked.
    #[must_use]
    pub const fn is_locked(&self) -> bool {
        self.saved.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::MemoryDom;

    fn forced() -> SdkConfig {
        let mut config = SdkConfig::default();
        config.sidebar.force_visible = true;
        config
    }

    #[test]
    fn test_init_once() {
        let mut state = SdkState::new();
        let effects = state.init(SdkConfig::default(), false).unwrap();
        assert_eq!(effects, vec![Effect::SetButtonPosition(ButtonPosition::BottomRight)]);
        assert_eq!(
            state.init(SdkConfig::default(), false),
            Err(SdkError::AlreadyInitialized)
        );
    }

    #[test]
    fn test_actions_before_init_rejected() {
        let mut state = SdkState::new();
        assert_eq!(
            state.update(SdkMessage::SetPosition("top-left".into())),
            Err(SdkError::NotInitialized)
        );
    }

    #[test]
    fn test_forced_sidebar_on_init() {
        let mut state = SdkState::new();
        let effects = state.init(forced(), false).unwrap();
        assert_eq!(
            &effects[1..],
            &[Effect::SetupSidebar, Effect::Emit(SdkEvent::SidebarEnable)]
        );
    }

    #[test]
    fn test_sidebar_follows_config_transitions_only() {
        let mut state = SdkState::new();
        state.init(SdkConfig::default(), false).unwrap();
        let on = state.update(SdkMessage::ConfigChanged(forced())).unwrap();
        assert_eq!(on, vec![Effect::SetupSidebar, Effect::Emit(SdkEvent::SidebarEnable)]);
        assert!(state.update(SdkMessage::ConfigChanged(forced())).unwrap().is_empty());
        let off = state
            .update(SdkMessage::ConfigChanged(SdkConfig::default()))
            .unwrap();
        assert_eq!(off, vec![Effect::RemoveSidebar, Effect::Emit(SdkEvent::SidebarDisable)]);
    }

    #[test]
    fn test_referral_keeps_sidebar() {
        let mut state = SdkState::new();
        state.init(SdkConfig::default(), false).unwrap();
        state.update(SdkMessage::ReferralDetected(true)).unwrap();
        assert!(state.sidebar_enabled());
        assert!(state
            .update(SdkMessage::ConfigChanged(SdkConfig::default()))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_discovery_toggle() {
        let mut state = SdkState::new();
        state.init(SdkConfig::default(), false).unwrap();
        let open = SdkMessage::SetDiscovery {
            open: true,
            format: Some("button".into()),
        };
        assert_eq!(
            state.update(open.clone()).unwrap(),
            vec![
                Effect::Emit(SdkEvent::DiscoveryOpen),
                Effect::LockBodyScroll,
                Effect::TrackOpen(Some("button".into())),
            ]
        );
        assert!(state.update(open).unwrap().is_empty());
        let close = SdkMessage::SetDiscovery {
            open: false,
            format: None,
        };
        assert_eq!(
            state.update(close.clone()).unwrap(),
            vec![Effect::Emit(SdkEvent::DiscoveryClose), Effect::UnlockBodyScroll]
        );
        assert!(state.update(close).unwrap().is_empty());
    }

    #[test]
    fn test_exit_intent_opens_discovery() {
        let mut state = SdkState::new();
        state.init(SdkConfig::default(), false).unwrap();
        let effects = state.update(SdkMessage::ExitIntent).unwrap();
        assert_eq!(effects[0], Effect::Emit(SdkEvent::ExitIntent));
        assert!(state.discovery_open());
        assert!(state.update(SdkMessage::ExitIntent).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_position() {
        let mut state = SdkState::new();
        state.init(SdkConfig::default(), false).unwrap();
        assert_eq!(
            state.update(SdkMessage::SetPosition("center".into())),
            Err(SdkError::InvalidPosition("center".into()))
        );
        assert_eq!(
            state.update(SdkMessage::SetPosition("top-left".into())).unwrap(),
            vec![Effect::SetButtonPosition(ButtonPosition::TopLeft)]
        );
    }

    #[test]
    fn test_body_scroll_lock_restores_inline_value() {
        let dom = MemoryDom::new();
        let body = dom.body_node();
        dom.set_inline_style(&body, "overflow", &InlineStyle::new("scroll", ""))
            .unwrap();
        let mut lock = BodyScrollLock::default();
        lock.lock(&dom).unwrap();
        lock.lock(&dom).unwrap();
        assert_eq!(
            dom.inline_style(&body, "overflow"),
            Some(InlineStyle::new("hidden", "important"))
        );
        lock.unlock(&dom).unwrap();
        assert_eq!(
            dom.inline_style(&body, "overflow"),
            Some(InlineStyle::new("scroll", ""))
        );
        assert!(!lock.is_locked());
    }
}
