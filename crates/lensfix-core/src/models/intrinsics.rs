use nalgebra::{Matrix3, RealField, Vector2};
use serde::{Deserialize, Serialize};

/// Intrinsics that map normalized coordinates to pixel coordinates.
pub trait IntrinsicsModel<S: RealField + Copy> {
    /// Convert normalized coordinates into pixel coordinates.
    fn to_pixel(&self, n: &Vector2<S>) -> Vector2<S>;
    /// Convert pixel coordinates into normalized coordinates.
    fn from_pixel(&self, pixel: &Vector2<S>) -> Vector2<S>;
}

/// Standard pinhole intrinsics with optional skew.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FxFyCxCySkew<S: RealField + Copy> {
    /// Focal length in pixels along X.
    pub fx: S,
    /// Focal length in pixels along Y.
    pub fy: S,
    /// Principal point X coordinate in pixels.
    pub cx: S,
    /// Principal point Y coordinate in pixels.
    pub cy: S,
    /// Skew term (typically 0).
    pub skew: S,
}

impl<S: RealField + Copy> FxFyCxCySkew<S> {
    /// Return the 3x3 camera intrinsics matrix K.
    pub fn k_matrix(&self) -> Matrix3<S> {
        Matrix3::new(
            self.fx,
            self.skew,
            self.cx,
            S::zero(),
            self.fy,
            self.cy,
            S::zero(),
            S::zero(),
            S::one(),
        )
    }

    /// Read intrinsics back from an upper-triangular K.
    pub fn from_k_matrix(k: &Matrix3<S>) -> Self {
        Self {
            fx: k[(0, 0)],
            fy: k[(1, 1)],
            cx: k[(0, 2)],
            cy: k[(1, 2)],
            skew: k[(0, 1)],
        }
    }
}

impl<S: RealField + Copy> IntrinsicsModel<S> for FxFyCxCySkew<S> {
    fn to_pixel(&self, n: &Vector2<S>) -> Vector2<S> {
        let u = self.fx * n.x + self.skew * n.y + self.cx;
        let v = self.fy * n.y + self.cy;
        Vector2::new(u, v)
    }

    fn from_pixel(&self, pixel: &Vector2<S>) -> Vector2<S> {
        let sy = (pixel.y - self.cy) / self.fy;
        let sx = (pixel.x - self.cx - self.skew * sy) / self.fx;
        Vector2::new(sx, sy)
    }
}

/// Camera used by the slider-driven distortion tools, derived only from the
/// image size: `fx = fy = width`, principal point at the image centre.
///
/// Apply and correct share this matrix, so correcting with the coefficients
/// used to apply a distortion restores the image.
pub fn synthetic_intrinsics(width: u32, height: u32) -> FxFyCxCySkew<f64> {
    let w = f64::from(width);
    let h = f64::from(height);
    FxFyCxCySkew {
        fx: w,
        fy: w,
        cx: w / 2.0,
        cy: h / 2.0,
        skew: 0.0,
    }
}

/// [`synthetic_intrinsics`] as a 3×3 matrix.
pub fn synthetic_camera_matrix(width: u32, height: u32) -> Matrix3<f64> {
    synthetic_intrinsics(width, height).k_matrix()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_matrix_centres_principal_point() {
        let k = synthetic_camera_matrix(640, 480);
        assert_eq!(k[(0, 0)], 640.0);
        assert_eq!(k[(1, 1)], 640.0);
        assert_eq!(k[(0, 2)], 320.0);
        assert_eq!(k[(1, 2)], 240.0);
        assert_eq!(k[(2, 2)], 1.0);
    }

    #[test]
    fn k_matrix_roundtrip() {
        let k = FxFyCxCySkew {
            fx: 812.0,
            fy: 798.5,
            cx: 331.2,
            cy: 242.9,
            skew: 0.0,
        };
        assert_eq!(FxFyCxCySkew::from_k_matrix(&k.k_matrix()), k);
    }
}
