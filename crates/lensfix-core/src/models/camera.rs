use nalgebra::{Point3, RealField, Vector2, Vector3};

use super::{DistortionModel, IntrinsicsModel, ProjectionModel};

/// Unit viewing ray in the camera frame.
#[derive(Clone, Copy, Debug)]
pub struct Ray<S: RealField + Copy> {
    pub dir: Vector3<S>,
}

#[derive(Clone, Debug)]
pub struct Camera<S, P, D, K>
where
    S: RealField + Copy,
    P: ProjectionModel<S>,
    D: DistortionModel<S>,
    K: IntrinsicsModel<S>,
{
    pub proj: P,
    pub dist: D,
    pub k: K,
    _phantom: core::marker::PhantomData<S>,
}

impl<S, P, D, K> Camera<S, P, D, K>
where
    S: RealField + Copy,
    P: ProjectionModel<S>,
    D: DistortionModel<S>,
    K: IntrinsicsModel<S>,
{
    pub fn new(proj: P, dist: D, k: K) -> Self {
        Self {
            proj,
            dist,
            k,
            _phantom: core::marker::PhantomData,
        }
    }

    pub fn project_point_c(&self, p_c: &Vector3<S>) -> Option<Vector2<S>> {
        let n_u = self.proj.project_dir(p_c)?;
        let n_d = self.dist.distort(&n_u);
        Some(self.k.to_pixel(&n_d))
    }

    pub fn project_point(&self, p_c: &Point3<S>) -> Option<Vector2<S>> {
        self.project_point_c(&p_c.coords)
    }

    pub fn backproject_pixel(&self, px: &Vector2<S>) -> Ray<S> {
        let n_d = self.k.from_pixel(px);
        let n_u = self.dist.undistort(&n_d);
        let dir = self.proj.unproject_dir(&n_u);
        let dir = dir / dir.norm();
        Ray { dir }
    }
}

/// Camera type produced by calibration.
pub type PinholeCamera =
    Camera<f64, super::Pinhole, super::BrownConrady5<f64>, super::FxFyCxCySkew<f64>>;
