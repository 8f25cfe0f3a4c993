//! Viewport geometry.
//!
//! The sidebar width is never configured directly; it is whatever the true
//! window width minus the inner wrapper width turns out to be after layout.

use crate::css::TransformParams;

/// Reads true and adjusted viewport dimensions.
///
/// The browser implementation reads the *original* window accessors, not the
/// patched ones, so geometry never feeds back into itself.
pub trait ViewportSource {
    /// True window width.
    fn window_width(&self) -> f64;
    /// True window height.
    fn window_height(&self) -> f64;
    /// Rendered width of the inner wrapper, if it is laid out.
    fn content_width(&self) -> Option<f64>;
}

/// Measured geometry of one refresh tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    /// Width host code should see.
    pub adjusted_width: f64,
    /// True window height.
    pub window_height: f64,
    /// Space taken by the sidebar.
    pub sidebar_width: f64,
}

impl Geometry {
    /// Measure from a viewport source.
    ///
    /// A wrapper without a usable width is treated as spanning the window.
    pub fn measure<V: ViewportSource + ?Sized>(source: &V) -> Self {
        let window_width = source.window_width().max(0.0);
        let adjusted_width = source
            .content_width()
            .filter(|w| w.is_finite() && *w > 0.0)
            .unwrap_or(window_width);
        Self {
            adjusted_width,
            window_height: source.window_height(),
            sidebar_width: (window_width - adjusted_width).max(0.0),
        }
    }

    /// Parameters for the stylesheet transform.
    #[must_use]
    pub const fn transform_params(&self) -> TransformParams {
        TransformParams::new(self.adjusted_width, self.window_height, self.sidebar_width)
    }
}

/// A fixed viewport, for tests and for hosts without layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedViewport {
    /// True window width.
    pub width: f64,
    /// True window height.
    pub height: f64,
    /// Inner wrapper width.
    pub content: Option<f64>,
}

impl ViewportSource for FixedViewport {
    fn window_width(&self) -> f64 {
        self.width
    }

    fn window_height(&self) -> f64 {
        self.height
    }

    fn content_width(&self) -> Option<f64> {
        self.content
    }
}
