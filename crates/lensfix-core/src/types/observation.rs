//! Point correspondences gathered from calibration images.

use crate::{Pt2, Pt3};
use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

/// Chessboard corners of one image: board-plane points (`z = 0`) paired with
/// their refined pixel positions.
///
/// ```
/// use lensfix_core::{CorrespondenceView, Pt2, Pt3};
///
/// let view = CorrespondenceView::new(
///     vec![Pt3::new(0.0, 0.0, 0.0), Pt3::new(1.0, 0.0, 0.0)],
///     vec![Pt2::new(320.0, 240.0), Pt2::new(352.0, 240.0)],
/// )
/// .unwrap();
/// assert_eq!(view.len(), 2);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrespondenceView {
    /// Points in the board frame.
    pub points_3d: Vec<Pt3>,
    /// Matching pixel observations.
    pub points_2d: Vec<Pt2>,
}

impl CorrespondenceView {
    /// # Errors
    ///
    /// Returns an error if the 3D and 2D point counts don't match.
    pub fn new(points_3d: Vec<Pt3>, points_2d: Vec<Pt2>) -> Result<Self> {
        ensure!(
            points_3d.len() == points_2d.len(),
            "3D / 2D point counts must match: {} vs {}",
            points_3d.len(),
            points_2d.len()
        );
        Ok(Self {
            points_3d,
            points_2d,
        })
    }

    /// Board points with `z` dropped, as used for homographies.
    pub fn planar_points(&self) -> Vec<Pt2> {
        self.points_3d.iter().map(|p| Pt2::new(p.x, p.y)).collect()
    }

    /// `true` when every board point lies on `z = 0`.
    pub fn is_planar(&self) -> bool {
        self.points_3d.iter().all(|p| p.z.abs() < 1e-12)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points_3d.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points_3d.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Pt3, &Pt2)> {
        self.points_3d.iter().zip(self.points_2d.iter())
    }
}

/// Summary statistics for reprojection errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReprojectionStats {
    /// Mean reprojection error in pixels.
    pub mean: f64,
    /// Root mean square error in pixels.
    pub rms: f64,
    /// Maximum reprojection error in pixels.
    pub max: f64,
    /// Number of points evaluated.
    pub count: usize,
}

impl ReprojectionStats {
    pub fn from_errors(errors: &[f64]) -> Self {
        if errors.is_empty() {
            return Self::default();
        }

        let sum: f64 = errors.iter().sum();
        let sum_sq: f64 = errors.iter().map(|e| e * e).sum();
        let max = errors.iter().copied().fold(0.0_f64, f64::max);
        let n = errors.len() as f64;

        Self {
            mean: sum / n,
            rms: (sum_sq / n).sqrt(),
            max,
            count: errors.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_count_mismatch() {
        let p3 = vec![Pt3::new(0.0, 0.0, 0.0)];
        let p2 = vec![Pt2::new(320.0, 240.0), Pt2::new(400.0, 240.0)];
        assert!(CorrespondenceView::new(p3, p2).is_err());
    }

    #[test]
    fn planar_points_drop_z() {
        let view = CorrespondenceView::new(
            vec![Pt3::new(1.0, 2.0, 0.0), Pt3::new(3.0, 4.0, 0.0)],
            vec![Pt2::new(0.0, 0.0), Pt2::new(1.0, 1.0)],
        )
        .unwrap();
        assert!(view.is_planar());
        assert_eq!(view.planar_points()[1], Pt2::new(3.0, 4.0));
    }

    #[test]
    fn reprojection_stats_computation() {
        let stats = ReprojectionStats::from_errors(&[1.0, 2.0, 3.0]);

        assert_eq!(stats.count, 3);
        assert!((stats.mean - 2.0).abs() < 1e-10);
        assert!((stats.rms - (14.0_f64 / 3.0).sqrt()).abs() < 1e-10);
        assert!((stats.max - 3.0).abs() < 1e-10);
        assert_eq!(ReprojectionStats::from_errors(&[]).count, 0);
    }
}
