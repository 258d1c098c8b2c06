//! Least-squares trendline over an ordered run of values.

use serde::Serialize;

/// Fewer points than this never produce a trendline.
pub const MIN_TRENDLINE_POINTS: usize = 3;

/// `y = slope * x + intercept`, with x the position in the fitted run
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Trendline {
    pub slope: f64,
    pub intercept: f64,
}

/// Ordinary least-squares fit of `points` against `0..n`.
///
/// Returns `None` for fewer than [`MIN_TRENDLINE_POINTS`] points.
pub fn fit_trendline(points: &[f64]) -> Option<Trendline> {
    let n = points.len();
    if n < MIN_TRENDLINE_POINTS {
        return None;
    }

    let nf = n as f64;
    let mean_x = (nf - 1.0) / 2.0;
    let mean_y = points.iter().sum::<f64>() / nf;

    let (sxy, sxx) = points
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(sxy, sxx), (i, &y)| {
            let dx = i as f64 - mean_x;
            (sxy + dx * (y - mean_y), sxx + dx * dx)
        });

    let slope = sxy / sxx;
    Some(Trendline {
        slope,
        intercept: mean_y - slope * mean_x,
    })
}
