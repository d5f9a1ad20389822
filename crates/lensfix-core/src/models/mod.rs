//! Camera model building blocks and composable pipelines.
//!
//! The camera is composed of three stages:
//!
//! 1. `ProjectionModel`: map a 3D ray to normalized coordinates (pinhole).
//! 2. `DistortionModel`: apply radial/tangential distortion in normalized space.
//! 3. `IntrinsicsModel`: map normalized coordinates to pixels (K matrix).
//!
//! The combined mapping is `pixel = intrinsics(distortion(projection(dir)))`.

mod camera;
mod coeffs;
mod distortion;
mod intrinsics;
mod projection;

pub use camera::*;
pub use coeffs::*;
pub use distortion::*;
pub use intrinsics::*;
pub use projection::*;

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector2;

    #[test]
    fn roundtrip_backproject_project_with_distortion() {
        let k = FxFyCxCySkew {
            fx: 800.0,
            fy: 810.0,
            cx: 640.0,
            cy: 360.0,
            skew: 0.0,
        };
        let dist = BrownConrady5 {
            k1: -0.12,
            k2: 0.03,
            k3: 0.0,
            p1: 0.001,
            p2: -0.0005,
            iters: 10,
        };
        let cam = Camera::new(Pinhole, dist, k);

        let px = Vector2::new(900.0, 200.0);
        let ray = cam.backproject_pixel(&px);
        let p = ray.dir * 2.5;
        let px2 = cam.project_point_c(&p).unwrap();

        let err = (px2 - px).norm();
        assert!(err < 1e-6, "err={err}");
    }
}
