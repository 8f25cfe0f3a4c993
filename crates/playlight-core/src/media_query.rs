//! Media query subscriptions.
//!
//! Host code listening for media query changes must be told about flips of
//! the *adjusted* query, which the browser cannot do by itself since the
//! adjusted query changes with the sidebar width. The registry keeps one
//! record per original query string and reports flips on each geometry tick.

use std::collections::BTreeMap;

use crate::css::{transform_media_query, TransformParams};

/// A listener set that must be notified of a new match value.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaQueryChange<L> {
    /// Original query string, as the host wrote it.
    pub media: String,
    /// New match value.
    pub matches: bool,
    /// Listeners to notify, in registration order.
    pub listeners: Vec<L>,
}

#[derive(Debug, Clone)]
struct QueryRecord<L> {
    listeners: Vec<L>,
    last_match: Option<bool>,
}

/// Registry of media queries with change listeners.
#[derive(Debug, Clone)]
pub struct MediaQueryRegistry<L> {
    records: BTreeMap<String, QueryRecord<L>>,
}

impl<L> Default for MediaQueryRegistry<L> {
    fn default() -> Self {
        Self {
            records: BTreeMap::new(),
        }
    }
}

impl<L: Clone + PartialEq> MediaQueryRegistry<L> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Query to hand to the real media query API.
    #[must_use]
    pub fn adjusted_query(query: &str, params: &TransformParams) -> String {
        transform_media_query(query, params)
    }

    /// Add a listener for `query`. `current` is the match value the caller
    /// has just observed; it seeds the record the first time. Returns false
    /// when the listener was already registered.
    pub fn add_listener(&mut self, query: &str, listener: L, current: bool) -> bool {
        let record = self
            .records
            .entry(query.to_string())
            .or_insert_with(|| QueryRecord {
                listeners: Vec::new(),
                last_match: Some(current),
            });
        if record.listeners.contains(&listener) {
            return false;
        }
        record.listeners.push(listener);
        true
    }

    /// Remove a listener. The record is dropped with its last listener.
    pub fn remove_listener(&mut self, query: &str, listener: &L) -> bool {
        let Some(record) = self.records.get_mut(query) else {
            return false;
        };
        let before = record.listeners.len();
        record.listeners.retain(|l| l != listener);
        let removed = record.listeners.len() != before;
        if record.listeners.is_empty() {
            self.records.remove(query);
        }
        removed
    }

    /// Re-evaluate every query. `evaluate` receives the adjusted query and
    /// returns whether it currently matches.
    pub fn tick<F>(&mut self, params: &TransformParams, mut evaluate: F) -> Vec<MediaQueryChange<L>>
    where
        F: FnMut(&str) -> bool,
    {
        let mut changes = Vec::new();
        for (query, record) in &mut self.records {
            let matches = evaluate(&transform_media_query(query, params));
            let flipped = record.last_match.is_some_and(|last| last != matches);
            record.last_match = Some(matches);
            if flipped {
                changes.push(MediaQueryChange {
                    media: query.clone(),
                    matches,
                    listeners: record.listeners.clone(),
                });
            }
        }
        changes
    }

    /// Listeners registered for `query`, in registration order.
    #[must_use]
    pub fn listeners(&self, query: &str) -> Vec<L> {
        self.records
            .get(query)
            .map(|r| r.listeners.clone())
            .unwrap_or_default()
    }

    /// Last recorded match value for `query`.
    #[must_use]
    pub fn last_match(&self, query: &str) -> Option<bool> {
        self.records.get(query).and_then(|r| r.last_match)
    }

    /// Number of distinct queries tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no query is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop every record.
    pub fn clear(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn params(sidebar: f64) -> TransformParams {
        TransformParams::new(1000.0 - sidebar, 800.0, sidebar)
    }

    /// Evaluates `(max-width: Npx)` against a fixed true width.
    fn max_width_eval(true_width: f64) -> impl FnMut(&str) -> bool {
        move |query: &str| {
            let n: f64 = query
                .trim_start_matches("(max-width:")
                .trim_end_matches("px)")
                .trim()
                .parse()
                .unwrap();
            true_width <= n
        }
    }

    #[test]
    fn test_one_record_per_query() {
        let mut reg = MediaQueryRegistry::new();
        assert!(reg.add_listener("(max-width: 900px)", 1, false));
        assert!(reg.add_listener("(max-width: 900px)", 2, false));
        assert!(!reg.add_listener("(max-width: 900px)", 1, false));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_fires_only_on_flip() {
        let mut reg = MediaQueryRegistry::new();
        reg.add_listener("(max-width: 900px)", 7, false);

        assert!(reg.tick(&params(0.0), max_width_eval(1000.0)).is_empty());

        // 900 + 200 = 1100 >= 1000 now matches
        let changes = reg.tick(&params(200.0), max_width_eval(1000.0));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].media, "(max-width: 900px)");
        assert!(changes[0].matches);
        assert_eq!(changes[0].listeners, vec![7]);

        assert!(reg.tick(&params(200.0), max_width_eval(1000.0)).is_empty());
    }

    #[test]
    fn test_remove_last_listener_drops_record() {
        let mut reg = MediaQueryRegistry::new();
        reg.add_listener("(max-width: 900px)", 1, true);
        assert!(reg.remove_listener("(max-width: 900px)", &1));
        assert!(!reg.remove_listener("(max-width: 900px)", &1));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_listeners_in_registration_order() {
        let mut reg = MediaQueryRegistry::new();
        reg.add_listener("(max-width: 900px)", 3, false);
        reg.add_listener("(max-width: 900px)", 1, false);
        reg.add_listener("(min-width: 10px)", 2, true);
        assert_eq!(reg.listeners("(max-width: 900px)"), vec![3, 1]);
        assert!(reg.listeners("(orientation: portrait)").is_empty());
    }

    proptest! {
        #[test]
        fn prop_change_iff_flip(values in proptest::collection::vec(any::<bool>(), 1..20)) {
            let mut reg = MediaQueryRegistry::new();
            reg.add_listener("(orientation: portrait)", 0u8, values[0]);
            let mut last = values[0];
            for v in values.iter().skip(1) {
                let changes = reg.tick(&params(0.0), |_| *v);
                prop_assert_eq!(changes.len(), usize::from(*v != last));
                last = *v;
            }
            prop_assert_eq!(reg.last_match("(orientation: portrait)"), Some(last));
        }
    }
}
