//! Chart pattern detectors
//!
//! All detectors read closing prices only, through a [`crate::CloseSeries`].
//!
//! # Building blocks
//!
//! - **Extrema**: local maxima/minima under a symmetric, inclusive window.
//! - **Trendline**: least-squares line through an ordered run of extrema.
//!
//! # Pattern Families
//!
//! - **Doubles**: Double Top / Double Bottom from adjacent matching extrema.
//! - **Head-and-Shoulders**: regular and inverse, three consecutive extrema.
//! - **Triangles**: Ascending, Descending, Symmetrical from trendline slopes.
//! - **Wedges**: Rising and Falling from trendline slopes.

pub mod helpers;

/// Generate `with_defaults()` -> `Self::default()` for multiple detector types.
macro_rules! impl_with_defaults {
  ($($detector:ty),* $(,)?) => {
    $(impl $detector {
      pub fn with_defaults() -> Self { Self::default() }
    })*
  };
}

pub mod doubles;
pub mod extrema;
pub mod head_shoulders;
pub mod trendline;
pub mod triangles;
pub mod wedges;

// Re-export all detectors for convenience
pub use doubles::*;
pub use extrema::*;
pub use head_shoulders::*;
pub use helpers::*;
pub use trendline::*;
pub use triangles::*;
pub use wedges::*;
