//! Browser storage bindings for sessionStorage.
//!
//! The SDK persists a single session-scoped flag, whether the visit came
//! from a partner referral, through [`SessionStore`].
//!
//! # Example
//!
//! ```ignore
//! use playlight::browser::storage::Storage;
//! use playlight::referral::detect_referral;
//!
//! let from_partner = detect_referral(page_url.as_ref(), &Storage::session());
//! ```

use playlight_core::referral::SessionStore;
#[cfg(not(target_arch = "wasm32"))]
use std::collections::HashMap;
use thiserror::Error;

/// Session-scoped browser storage.
///
/// In WASM, this uses the window's sessionStorage.
/// In tests/non-WASM, this uses an in-memory fallback.
#[derive(Debug, Default)]
pub struct Storage {
    /// In-memory fallback for non-WASM environments
    #[cfg(not(target_arch = "wasm32"))]
    memory: std::sync::Mutex<HashMap<String, String>>,
}

impl Storage {
    /// Create sessionStorage instance.
    #[must_use]
    pub fn session() -> Self {
        Self::default()
    }

    /// Get a value from storage.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        #[cfg(target_arch = "wasm32")]
        {
            self.web_storage()?.get_item(key).ok()?
        }
        #[cfg(not(target_arch = "wasm32"))]
        {
            self.memory.lock().ok()?.get(key).cloned()
        }
    }

    /// Set a value in storage.
    pub fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        #[cfg(target_arch = "wasm32")]
        {
            self.web_storage()
                .ok_or(StorageError::NotAvailable)?
                .set_item(key, value)
                .map_err(|_| StorageError::QuotaExceeded)
        }
        #[cfg(not(target_arch = "wasm32"))]
        {
            self.memory
                .lock()
                .map_err(|_| StorageError::AccessDenied)?
                .insert(key.to_string(), value.to_string());
            Ok(())
        }
    }

    // Sandboxed iframes and some privacy modes throw on access; treated as absent.
    #[cfg(target_arch = "wasm32")]
    fn web_storage(&self) -> Option<web_sys::Storage> {
        web_sys::window()?.session_storage().ok()?
    }
}

impl SessionStore for Storage {
    type Error = StorageError;

    fn get(&self, key: &str) -> Option<String> {
        Self::get(self, key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        Self::set(self, key, value)
    }
}

/// Storage error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// Storage is not available (e.g., in incognito mode)
    #[error("storage not available")]
    NotAvailable,
    /// Storage quota exceeded
    #[error("storage quota exceeded")]
    QuotaExceeded,
    /// Access denied
    #[error("storage access denied")]
    AccessDenied,
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use playlight_core::referral::{detect_referral, SESSION_KEY};
    use url::Url;

    #[test]
    fn test_memory_fallback() {
        let storage = Storage::session();
        assert_eq!(storage.get("missing"), None);
        storage.set("key", "value").unwrap();
        assert_eq!(storage.get("key").as_deref(), Some("value"));
        storage.set("key", "other").unwrap();
        assert_eq!(storage.get("key").as_deref(), Some("other"));
        assert_eq!(Storage::session().get("key"), None);
    }

    #[test]
    fn test_referral_flag_survives_navigation() {
        let storage = Storage::session();
        let landing = Url::parse("https://partner.io/play?utm_source=playlight").unwrap();
        assert!(detect_referral(Some(&landing), &storage));
        assert_eq!(storage.get(SESSION_KEY).as_deref(), Some("true"));

        let next = Url::parse("https://partner.io/level-2").unwrap();
        assert!(detect_referral(Some(&next), &storage));
    }

    #[test]
    fn test_plain_visit_not_referred() {
        let storage = Storage::session();
        let page = Url::parse("https://partner.io/?utm_source=newsletter").unwrap();
        assert!(!detect_referral(Some(&page), &storage));
        assert!(!detect_referral(None, &storage));
    }

    #[test]
    fn test_error_display() {
        assert_eq!(StorageError::NotAvailable.to_string(), "storage not available");
    }
}
