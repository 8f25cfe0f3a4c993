//! Partner referral flag.
//!
//! A visit arriving with `utm_source=playlight` is remembered for the rest of
//! the tab's session; such visitors always get the sidebar.

use tracing::warn;
use url::Url;

/// Query parameter carrying the referral source.
pub const REFERRAL_PARAM: &str = "utm_source";
/// Referral source value for partner traffic.
pub const REFERRAL_SOURCE: &str = "playlight";
/// Session storage key of the flag.
pub const SESSION_KEY: &str = "playlight:fromPartner";

/// Session-scoped key-value storage.
pub trait SessionStore {
    /// Error raised by writes.
    type Error: std::fmt::Display;

    /// Read a value.
    fn get(&self, key: &str) -> Option<String>;
    /// Write a value.
    fn set(&self, key: &str, value: &str) -> Result<(), Self::Error>;
}

/// Whether `url` carries the partner referral parameter.
#[must_use]
pub fn is_referral_url(url: &Url) -> bool {
    url.query_pairs()
        .any(|(key, value)| key == REFERRAL_PARAM && value == REFERRAL_SOURCE)
}

/// Resolve the flag for this page view, persisting it when the page URL
/// carries the referral parameter.
pub fn detect_referral<S: SessionStore + ?Sized>(page: Option<&Url>, store: &S) -> bool {
    if page.is_some_and(is_referral_url) {
        if let Err(err) = store.set(SESSION_KEY, "true") {
            warn!(error = %err, "could not persist referral flag");
        }
        return true;
    }
    store.get(SESSION_KEY).as_deref() == Some("true")
}

/// Address of a partner game, tagged as Playlight traffic.
#[must_use]
pub fn game_url(domain: &str) -> Option<Url> {
    let domain = domain.trim();
    if domain.is_empty() {
        return None;
    }
    let mut url = Url::parse(&format!("https://{domain}")).ok()?;
    url.query_pairs_mut().append_pair(REFERRAL_PARAM, REFERRAL_SOURCE);
    Some(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MemorySession(RefCell<HashMap<String, String>>);

    impl SessionStore for MemorySession {
        type Error = std::convert::Infallible;

        fn get(&self, key: &str) -> Option<String> {
            self.0.borrow().get(key).cloned()
        }

        fn set(&self, key: &str, value: &str) -> Result<(), Self::Error> {
            self.0.borrow_mut().insert(key.to_string(), value.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_referral_param_detected() {
        let url = Url::parse("https://game.example/play?level=2&utm_source=playlight").unwrap();
        assert!(is_referral_url(&url));
        let other = Url::parse("https://game.example/?utm_source=newsletter").unwrap();
        assert!(!is_referral_url(&other));
    }

    #[test]
    fn test_flag_persists_for_session() {
        let store = MemorySession::default();
        let landing = Url::parse("https://game.example/?utm_source=playlight").unwrap();
        let next = Url::parse("https://game.example/level/3").unwrap();

        assert!(!detect_referral(Some(&next), &store));
        assert!(detect_referral(Some(&landing), &store));
        assert!(detect_referral(Some(&next), &store));
        assert!(detect_referral(None, &store));
    }

    #[test]
    fn test_game_url_tags_source() {
        let url = game_url("puzzle.example").unwrap();
        assert_eq!(url.as_str(), "https://puzzle.example/?utm_source=playlight");
        assert!(is_referral_url(&url));
        assert!(game_url("  ").is_none());
    }
}
