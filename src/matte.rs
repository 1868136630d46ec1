//! Matte post-processing: polarity correction and contrast normalization
//!
//! A segmentation model produces an S×S grid of raw foreground confidences.
//! Some exports score the background high and the subject low, so the grid is
//! first checked for inversion by comparing the mean confidence along the
//! border with the mean inside a central box. The corrected grid is then
//! stretched to the full `[0, 1]` range.
//!
//! The inversion check assumes a roughly centered subject. It is a heuristic
//! and can misfire on off-center subjects, which is why it sits behind the
//! [`OrientationCorrector`] trait.

use crate::{
    config::OrientationThresholds,
    types::{NormalizedMatte, ProbabilityGrid},
};
use serde::Serialize;

/// Floor applied to `hi - lo` during normalization
pub const NORMALIZE_EPSILON: f32 = 1e-6;

/// What an orientation corrector measured and whether it inverted the grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OrientationDecision {
    pub edge_mean: f32,
    pub center_mean: f32,
    pub inverted: bool,
}

/// Strategy deciding whether a probability grid has inverted polarity
pub trait OrientationCorrector: Send + Sync + std::fmt::Debug {
    /// Short identifier for logs
    fn name(&self) -> &'static str;

    /// Return the grid with corrected polarity and the decision taken
    fn correct(&self, grid: ProbabilityGrid) -> (ProbabilityGrid, OrientationDecision);
}

/// Inverts the grid when the edge band is brighter than the center box
#[derive(Debug, Clone, Copy, Default)]
pub struct EdgeCenterCorrector {
    thresholds: OrientationThresholds,
}

impl EdgeCenterCorrector {
    #[must_use]
    pub fn new(thresholds: OrientationThresholds) -> Self {
        Self { thresholds }
    }

    #[must_use]
    pub fn thresholds(&self) -> &OrientationThresholds {
        &self.thresholds
    }
}

impl OrientationCorrector for EdgeCenterCorrector {
    fn name(&self) -> &'static str {
        "edge-center"
    }

    fn correct(&self, grid: ProbabilityGrid) -> (ProbabilityGrid, OrientationDecision) {
        let (edge_mean, center_mean) = region_means(&grid, &self.thresholds);
        let inverted = edge_mean > center_mean;
        let decision = OrientationDecision {
            edge_mean: edge_mean as f32,
            center_mean: center_mean as f32,
            inverted,
        };

        tracing::debug!(
            edge_mean = decision.edge_mean,
            center_mean = decision.center_mean,
            inverted,
            side = grid.side(),
            "orientation check"
        );

        let grid = if inverted { grid.inverted() } else { grid };
        (grid, decision)
    }
}

/// Leaves every grid untouched, still reporting region means
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughCorrector {
    thresholds: OrientationThresholds,
}

impl PassthroughCorrector {
    #[must_use]
    pub fn new(thresholds: OrientationThresholds) -> Self {
        Self { thresholds }
    }

    #[must_use]
    pub fn thresholds(&self) -> &OrientationThresholds {
        &self.thresholds
    }
}

impl OrientationCorrector for PassthroughCorrector {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn correct(&self, grid: ProbabilityGrid) -> (ProbabilityGrid, OrientationDecision) {
        let (edge_mean, center_mean) = region_means(&grid, &self.thresholds);
        let decision = OrientationDecision {
            edge_mean: edge_mean as f32,
            center_mean: center_mean as f32,
            inverted: false,
        };
        (grid, decision)
    }
}

/// Mean confidence of the edge band and of the center box
///
/// The two regions may overlap on small grids. An empty region has mean 0.
#[must_use]
pub fn region_means(grid: &ProbabilityGrid, thresholds: &OrientationThresholds) -> (f64, f64) {
    let side = grid.side();
    let border = thresholds.border_width(side);
    let center = thresholds.center_range(side);

    let mut edge_sum = 0.0f64;
    let mut edge_count = 0usize;
    let mut center_sum = 0.0f64;
    let mut center_count = 0usize;

    for (index, &value) in grid.values().iter().enumerate() {
        let (x, y) = (index % side, index / side);
        let value = f64::from(value);

        let is_edge = x < border || y < border || x + border >= side || y + border >= side;
        if is_edge {
            edge_sum += value;
            edge_count += 1;
        }
        if center.contains(&x) && center.contains(&y) {
            center_sum += value;
            center_count += 1;
        }
    }

    (
        edge_sum / edge_count.max(1) as f64,
        center_sum / center_count.max(1) as f64,
    )
}

/// Invert the grid if its edge band outscores its center box (default thresholds)
#[must_use]
pub fn correct_orientation(grid: ProbabilityGrid) -> ProbabilityGrid {
    EdgeCenterCorrector::default().correct(grid).0
}

/// Min-max stretch to `[0, 1]`; a constant grid becomes all zeros
#[must_use]
pub fn normalize_contrast(grid: &ProbabilityGrid) -> NormalizedMatte {
    let (lo, hi) = grid
        .values()
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let denom = (hi - lo).max(NORMALIZE_EPSILON);

    let values = grid
        .values()
        .iter()
        .map(|&v| ((v - lo) / denom).clamp(0.0, 1.0))
        .collect();

    NormalizedMatte::from_normalized(grid.side(), values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring_grid(side: usize, edge: f32, inner: f32) -> ProbabilityGrid {
        let values = (0..side * side)
            .map(|i| {
                let (x, y) = (i % side, i / side);
                if x == 0 || y == 0 || x == side - 1 || y == side - 1 {
                    edge
                } else {
                    inner
                }
            })
            .collect();
        ProbabilityGrid::new(side, values).unwrap()
    }

    fn one_cell_border() -> OrientationThresholds {
        OrientationThresholds {
            min_border: 1,
            ..OrientationThresholds::default()
        }
    }

    #[test]
    fn test_region_means_ring() {
        let grid = ring_grid(4, 0.9, 0.1);
        let (edge, center) = region_means(&grid, &one_cell_border());
        assert!((edge - 0.9).abs() < 1e-6);
        assert!((center - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_region_means_default_border_on_small_grid() {
        // A 4x4 grid with a 2-cell border is all edge
        let grid = ring_grid(4, 0.9, 0.1);
        let (edge, center) = region_means(&grid, &OrientationThresholds::default());
        assert!((edge - 0.7).abs() < 1e-6);
        assert!((center - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_region_means_empty_center() {
        let grid = ProbabilityGrid::new(1, vec![0.4]).unwrap();
        let (edge, center) = region_means(&grid, &OrientationThresholds::default());
        assert!((edge - 0.4).abs() < 1e-6);
        assert_eq!(center, 0.0);
    }

    #[test]
    fn test_inverts_bright_border() {
        let corrector = EdgeCenterCorrector::new(one_cell_border());
        let (grid, decision) = corrector.correct(ring_grid(4, 0.9, 0.1));
        assert!(decision.inverted);
        assert!((grid.get(0, 0).unwrap() - 0.1).abs() < 1e-6);
        assert!((grid.get(1, 1).unwrap() - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_keeps_bright_center() {
        let original = ring_grid(8, 0.05, 0.95);
        let (grid, decision) = EdgeCenterCorrector::default().correct(original.clone());
        assert!(!decision.inverted);
        assert_eq!(grid, original);
    }

    #[test]
    fn test_equal_means_do_not_invert() {
        let original = ProbabilityGrid::new(6, vec![0.5; 36]).unwrap();
        assert_eq!(correct_orientation(original.clone()), original);
    }

    #[test]
    fn test_passthrough_never_inverts() {
        let original = ring_grid(8, 0.9, 0.1);
        let (grid, decision) = PassthroughCorrector::default().correct(original.clone());
        assert!(!decision.inverted);
        assert!(decision.edge_mean > decision.center_mean);
        assert_eq!(grid, original);
    }

    #[test]
    fn test_passthrough_measures_with_configured_thresholds() {
        let grid = ring_grid(4, 0.9, 0.1);

        let (_, default_decision) = PassthroughCorrector::default().correct(grid.clone());
        assert!((default_decision.edge_mean - 0.7).abs() < 1e-6);

        let corrector = PassthroughCorrector::new(one_cell_border());
        assert_eq!(corrector.thresholds(), &one_cell_border());
        let (kept, decision) = corrector.correct(grid.clone());
        assert!(!decision.inverted);
        assert!((decision.edge_mean - 0.9).abs() < 1e-6);
        assert!((decision.center_mean - 0.1).abs() < 1e-6);
        assert_eq!(kept, grid);
    }

    #[test]
    fn test_normalize_stretches_range() {
        let grid = ProbabilityGrid::from_rows(&[[0.2, 0.4], [0.3, 0.6]]).unwrap();
        let matte = normalize_contrast(&grid);
        let values = matte.values();
        assert_eq!(values[0], 0.0);
        assert_eq!(values[3], 1.0);
        assert!((values[1] - 0.5).abs() < 1e-6);
        assert!((values[2] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_handles_unbounded_input() {
        let grid = ProbabilityGrid::from_rows(&[[-4.0, 12.0], [4.0, 0.0]]).unwrap();
        let matte = normalize_contrast(&grid);
        assert_eq!(matte.values(), &[0.0, 1.0, 0.5, 0.25]);
    }

    #[test]
    fn test_normalize_constant_grid_is_zero() {
        for value in [0.0f32, 0.5, -3.0, 1e6] {
            let grid = ProbabilityGrid::new(5, vec![value; 25]).unwrap();
            let matte = normalize_contrast(&grid);
            assert!(matte.values().iter().all(|&v| v == 0.0));
        }
    }

    #[test]
    fn test_normalize_tiny_range_stays_in_bounds() {
        let grid = ProbabilityGrid::from_rows(&[[0.5, 0.5000001], [0.5, 0.5]]).unwrap();
        let matte = normalize_contrast(&grid);
        assert!(matte.values().iter().all(|v| (0.0..=1.0).contains(v)));
    }
}
