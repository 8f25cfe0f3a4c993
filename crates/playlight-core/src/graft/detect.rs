//! Framework root detection.
//!
//! Deciding whether a page is owned by a single-root view library can only be
//! approximated. The default heuristic adopts a container whose descendant
//! count dwarfs its siblings'; callers can swap in their own [`RootDetector`].

/// How the `sidebar.hasFrameworkRoot` setting constrains detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameworkRootHint {
    /// Setting absent: a single container is adopted, otherwise the detector decides.
    #[default]
    Auto,
    /// `true`: always adopt the largest container.
    Forced,
    /// `false`: never adopt, always synthesize a wrapper.
    Disabled,
}

impl From<Option<bool>> for FrameworkRootHint {
    fn from(value: Option<bool>) -> Self {
        match value {
            None => Self::Auto,
            Some(true) => Self::Forced,
            Some(false) => Self::Disabled,
        }
    }
}

/// Picks the framework root among several candidate containers.
pub trait RootDetector: std::fmt::Debug {
    /// Given the descendant count of each candidate, return the index to
    /// adopt, or `None` to synthesize a wrapper.
    fn select(&self, descendant_counts: &[usize]) -> Option<usize>;
}

/// Adopt the largest candidate when it has more than `multiplier` times the
/// mean descendant count of the other candidates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DescendantRatio {
    /// Required ratio between the largest candidate and its siblings' mean.
    pub multiplier: f64,
}

impl DescendantRatio {
    /// Default multiplier.
    pub const DEFAULT_MULTIPLIER: f64 = 3.0;
}

impl Default for DescendantRatio {
    fn default() -> Self {
        Self {
            multiplier: Self::DEFAULT_MULTIPLIER,
        }
    }
}

impl RootDetector for DescendantRatio {
    fn select(&self, descendant_counts: &[usize]) -> Option<usize> {
        let largest = largest_index(descendant_counts)?;
        if descendant_counts.len() == 1 {
            return Some(largest);
        }
        let others: usize = descendant_counts
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != largest)
            .map(|(_, c)| *c)
            .sum();
        let mean = others as f64 / (descendant_counts.len() - 1) as f64;
        (descendant_counts[largest] as f64 > mean * self.multiplier).then_some(largest)
    }
}

/// Index of the first maximal count.
#[must_use]
pub fn largest_index(counts: &[usize]) -> Option<usize> {
    let max = *counts.iter().max()?;
    counts.iter().position(|c| *c == max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hint_from_setting() {
        assert_eq!(FrameworkRootHint::from(None), FrameworkRootHint::Auto);
        assert_eq!(FrameworkRootHint::from(Some(true)), FrameworkRootHint::Forced);
        assert_eq!(FrameworkRootHint::from(Some(false)), FrameworkRootHint::Disabled);
    }

    #[test]
    fn test_dominant_candidate_adopted() {
        let detector = DescendantRatio::default();
        assert_eq!(detector.select(&[2, 400, 3]), Some(1));
    }

    #[test]
    fn test_balanced_candidates_rejected() {
        let detector = DescendantRatio::default();
        assert_eq!(detector.select(&[20, 40, 30]), None);
    }

    #[test]
    fn test_threshold_is_strict() {
        let detector = DescendantRatio::default();
        assert_eq!(detector.select(&[10, 30]), None);
        assert_eq!(detector.select(&[10, 31]), Some(1));
    }

    #[test]
    fn test_custom_multiplier() {
        let detector = DescendantRatio { multiplier: 1.5 };
        assert_eq!(detector.select(&[20, 40, 30]), Some(1));
    }

    #[test]
    fn test_empty_and_single() {
        let detector = DescendantRatio::default();
        assert_eq!(detector.select(&[]), None);
        assert_eq!(detector.select(&[0]), Some(0));
    }
}
