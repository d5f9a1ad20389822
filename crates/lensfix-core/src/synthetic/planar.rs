//! Planar chessboard grids, board poses and their projections.

use crate::{
    models::{DistortionModel, IntrinsicsModel, ProjectionModel},
    Camera, CorrespondenceView, Iso3, Pt3, Real,
};
use anyhow::Result;
use nalgebra::{Translation3, UnitQuaternion, Vector3};

/// Inner-corner grid of a chessboard with `cols * rows` points on `z = 0`.
///
/// Row-major order (Y major), matching the order corners are reported in.
pub fn grid_points(cols: usize, rows: usize, square: Real) -> Vec<Pt3> {
    let mut points = Vec::with_capacity(cols * rows);
    for j in 0..rows {
        for i in 0..cols {
            points.push(Pt3::new(i as Real * square, j as Real * square, 0.0));
        }
    }
    points
}

/// `n_views` board poses cycling through tilts about both in-plane axes.
///
/// The board is centred on the optical axis at `distance`, scaled for a grid
/// of about 0.2 units across. Tilts stay within ±0.35 rad so the board is
/// always in front of the camera.
pub fn poses_tilted(n_views: usize, distance: Real) -> Vec<Iso3> {
    const TILTS: [(Real, Real, Real); 6] = [
        (0.30, 0.00, 0.00),
        (-0.25, 0.20, 0.05),
        (0.05, -0.35, -0.05),
        (0.20, 0.30, 0.10),
        (-0.30, -0.15, -0.10),
        (0.10, 0.25, 0.02),
    ];
    (0..n_views)
        .map(|idx| {
            let (rx, ry, rz) = TILTS[idx % TILTS.len()];
            let rotation = UnitQuaternion::from_scaled_axis(Vector3::new(rx, ry, rz));
            let offset = rotation * Vector3::new(0.1, 0.07, 0.0);
            let z = distance * (1.0 + 0.05 * idx as Real);
            Iso3::from_parts(
                Translation3::new(-offset.x, -offset.y, z - offset.z),
                rotation,
            )
        })
        .collect()
}

/// Project a planar target into the camera, requiring every point to be projectable.
///
/// `cam_from_target` maps target-frame points into the camera frame.
pub fn project_view_all<P, D, K>(
    camera: &Camera<Real, P, D, K>,
    cam_from_target: &Iso3,
    target_points: &[Pt3],
) -> Result<CorrespondenceView>
where
    P: ProjectionModel<Real>,
    D: DistortionModel<Real>,
    K: IntrinsicsModel<Real>,
{
    let mut pixels = Vec::with_capacity(target_points.len());
    for (idx, pw) in target_points.iter().enumerate() {
        let pc = cam_from_target.transform_point(pw);
        let Some(uv) = camera.project_point(&pc) else {
            anyhow::bail!("point {idx} not projectable (z={:.6})", pc.z);
        };
        pixels.push(uv.into());
    }

    CorrespondenceView::new(target_points.to_vec(), pixels)
}

/// Project every pose; fails if any point of any view is behind the camera.
pub fn project_views_all<P, D, K>(
    camera: &Camera<Real, P, D, K>,
    target_points: &[Pt3],
    cam_from_target: &[Iso3],
) -> Result<Vec<CorrespondenceView>>
where
    P: ProjectionModel<Real>,
    D: DistortionModel<Real>,
    K: IntrinsicsModel<Real>,
{
    cam_from_target
        .iter()
        .map(|pose| project_view_all(camera, pose, target_points))
        .collect()
}
