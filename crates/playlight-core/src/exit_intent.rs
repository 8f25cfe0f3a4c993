//! Exit intent detection.
//!
//! Fed with pointer coordinates by the browser layer. A trigger disarms the
//! detector; the caller opens discovery after `delay_ms` and re-arms after a
//! further `cooldown_ms`.

use crate::config::ExitIntentConfig;

/// Pointer-based exit intent detector.
#[derive(Debug, Clone)]
pub struct ExitIntentDetector {
    config: ExitIntentConfig,
    armed: bool,
    pointer_in_page: bool,
    last_y: f64,
}

impl ExitIntentDetector {
    /// Create a detector. `viewport_height` seeds the last pointer position.
    #[must_use]
    pub fn new(config: ExitIntentConfig, viewport_height: f64) -> Self {
        Self {
            armed: config.enabled,
            config,
            pointer_in_page: false,
            last_y: viewport_height,
        }
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &ExitIntentConfig {
        &self.config
    }

    /// Whether a trigger is currently possible.
    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.armed
    }

    /// Pointer moved to `y`. True when exit intent fired.
    pub fn on_pointer_move(&mut self, y: f64) -> bool {
        if !self.pointer_in_page {
            self.pointer_in_page = true;
            self.last_y = y;
            return false;
        }
        let upward_into_band = y < self.last_y && y < self.config.sensitivity_px;
        self.last_y = y;
        upward_into_band && self.trigger()
    }

    /// Pointer left the document at `y`. True when exit intent fired.
    pub fn on_pointer_leave(&mut self, y: f64) -> bool {
        self.pointer_in_page = false;
        y <= 0.0 && self.trigger()
    }

    fn trigger(&mut self) -> bool {
        if !self.armed {
            return false;
        }
        self.armed = false;
        true
    }

    /// End of the cooldown.
    pub fn rearm(&mut self) {
        self.armed = self.config.enabled;
    }

    /// Enable or disable detection.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
        self.armed = enabled;
    }

    /// Adopt a new configuration. A pending cooldown survives unless the
    /// enabled flag flipped.
    pub fn reconfigure(&mut self, config: ExitIntentConfig) {
        let toggled = config.enabled != self.config.enabled;
        self.config = config;
        if toggled || !self.config.enabled {
            self.armed = self.config.enabled;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> ExitIntentDetector {
        ExitIntentDetector::new(ExitIntentConfig::default(), 900.0)
    }

    #[test]
    fn test_first_move_only_records() {
        let mut d = detector();
        assert!(!d.on_pointer_move(5.0));
        assert!(d.on_pointer_move(2.0));
    }

    #[test]
    fn test_upward_into_band_fires_once() {
        let mut d = detector();
        d.on_pointer_move(300.0);
        assert!(!d.on_pointer_move(100.0));
        assert!(d.on_pointer_move(15.0));
        assert!(!d.on_pointer_move(3.0));
        assert!(!d.is_armed());
        d.rearm();
        d.on_pointer_move(200.0);
        assert!(d.on_pointer_move(10.0));
    }

    #[test]
    fn test_downward_in_band_ignored() {
        let mut d = detector();
        d.on_pointer_move(2.0);
        assert!(!d.on_pointer_move(10.0));
    }

    #[test]
    fn test_leave_through_top() {
        let mut d = detector();
        assert!(!d.on_pointer_leave(400.0));
        assert!(d.on_pointer_leave(-1.0));
    }

    #[test]
    fn test_disabled_never_fires() {
        let config = ExitIntentConfig {
            enabled: false,
            ..ExitIntentConfig::default()
        };
        let mut d = ExitIntentDetector::new(config, 900.0);
        assert!(!d.on_pointer_leave(0.0));
        d.rearm();
        assert!(!d.on_pointer_leave(0.0));
    }

    #[test]
    fn test_reconfigure_keeps_cooldown() {
        let mut d = detector();
        assert!(d.on_pointer_leave(0.0));
        d.reconfigure(ExitIntentConfig {
            sensitivity_px: 40.0,
            ..ExitIntentConfig::default()
        });
        assert!(!d.is_armed());
        assert_eq!(d.config().sensitivity_px, 40.0);

        d.reconfigure(ExitIntentConfig {
            enabled: false,
            ..ExitIntentConfig::default()
        });
        d.rearm();
        assert!(!d.on_pointer_leave(0.0));
    }
}
