//! Stylesheet transform engine.
//!
//! Pure text rewriting of host CSS so that it keeps looking right once the
//! sidebar has taken part of the viewport:
//! - viewport-width units are scaled to the content area
//! - width breakpoints are shifted by the sidebar width
//! - orientation queries become width queries
//! - `body` selectors retarget the inner wrapper
//! - relative `url(...)` references are absolutized for converted link sheets
//!
//! Every rewrite starts from pristine source text; nothing here reads or
//! writes the DOM.

mod scan;
mod transform;
mod urls;

pub use transform::{
    format_number, rewrite_body_selector, rewrite_breakpoints, rewrite_orientation,
    scale_viewport_units, selector_targets_root, strip_important, transform_media_query,
    transform_stylesheet, TransformOptions,
};
pub use urls::absolutize_urls;

use crate::graft::INNER_WRAPPER_CLASS;

/// Geometry inputs of one transform pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformParams {
    /// Width of the content area the host page now lives in.
    pub adjusted_width: f64,
    /// True window height.
    pub window_height: f64,
    /// Horizontal space taken by the sidebar.
    pub sidebar_width: f64,
}

impl TransformParams {
    /// Create transform parameters.
    #[must_use]
    pub const fn new(adjusted_width: f64, window_height: f64, sidebar_width: f64) -> Self {
        Self {
            adjusted_width,
            window_height,
            sidebar_width,
        }
    }

    /// Parameters that leave every length untouched.
    #[must_use]
    pub const fn identity(width: f64, height: f64) -> Self {
        Self::new(width, height, 0.0)
    }

    /// Factor applied to viewport-width lengths.
    #[must_use]
    pub fn viewport_ratio(&self) -> f64 {
        let actual = self.adjusted_width + self.sidebar_width;
        if actual <= 0.0 {
            1.0
        } else {
            self.adjusted_width / actual
        }
    }

    /// Width at which the true aspect ratio flips between portrait and landscape.
    #[must_use]
    pub fn orientation_breakpoint(&self) -> f64 {
        self.window_height + self.sidebar_width
    }
}

/// Selector that replaces `body` in rewritten host rules.
#[must_use]
pub fn wrapper_selector() -> String {
    format!(".{INNER_WRAPPER_CLASS}")
}
