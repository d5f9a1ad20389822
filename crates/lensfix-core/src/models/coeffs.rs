//! Distortion coefficient vectors in OpenCV ordering.
//!
//! Every image operation in the workspace takes its distortion as
//! `(k1, k2, p1, p2[, k3])`. [`DistortionCoeffs`] is the only way to build
//! such a vector, so a length other than 4 or 5 can never reach a remap.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::BrownConrady5;

/// Smallest coefficient reachable from a slider.
pub const SLIDER_MIN: f64 = -1.0;
/// Largest coefficient reachable from a slider.
pub const SLIDER_MAX: f64 = 1.0;
/// Slider resolution.
pub const SLIDER_STEP: f64 = 0.01;
/// Slider ticks on each side of zero.
pub const SLIDER_TICKS: i32 = 100;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoeffsError {
    #[error("distortion vector must have 4 or 5 entries (k1, k2, p1, p2[, k3]), got {0}")]
    BadLength(usize),
    #[error("distortion coefficient {index} is not finite")]
    NonFinite { index: usize },
    #[error("slider value {value} outside [-1, 1]")]
    OutOfRange { value: f64 },
    #[error("slider position {0} outside [-100, 100]")]
    TickOutOfRange(i32),
}

/// Validated `(k1, k2, p1, p2[, k3])` vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct DistortionCoeffs(Vec<f64>);

impl DistortionCoeffs {
    pub fn from_slice(values: &[f64]) -> Result<Self, CoeffsError> {
        if !(values.len() == 4 || values.len() == 5) {
            return Err(CoeffsError::BadLength(values.len()));
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(CoeffsError::NonFinite { index });
        }
        Ok(Self(values.to_vec()))
    }

    /// Four-term vector, `k3` implied zero.
    pub fn radial_tangential(k1: f64, k2: f64, p1: f64, p2: f64) -> Self {
        Self(vec![k1, k2, p1, p2])
    }

    /// Full five-term vector.
    pub fn full(k1: f64, k2: f64, p1: f64, p2: f64, k3: f64) -> Self {
        Self(vec![k1, k2, p1, p2, k3])
    }

    pub fn zero() -> Self {
        Self(vec![0.0; 5])
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn k1(&self) -> f64 {
        self.0[0]
    }

    pub fn k2(&self) -> f64 {
        self.0[1]
    }

    pub fn p1(&self) -> f64 {
        self.0[2]
    }

    pub fn p2(&self) -> f64 {
        self.0[3]
    }

    /// `k3`, or zero for a four-term vector.
    pub fn k3(&self) -> f64 {
        self.0.get(4).copied().unwrap_or(0.0)
    }

    /// Extend a four-term vector with `k3 = 0`.
    pub fn to_five(&self) -> Self {
        Self::full(self.k1(), self.k2(), self.p1(), self.p2(), self.k3())
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|v| *v == 0.0)
    }

    pub fn to_brown_conrady(&self, iters: u32) -> BrownConrady5<f64> {
        BrownConrady5 {
            k1: self.k1(),
            k2: self.k2(),
            k3: self.k3(),
            p1: self.p1(),
            p2: self.p2(),
            iters,
        }
    }

    pub fn from_brown_conrady(d: &BrownConrady5<f64>) -> Self {
        Self::full(d.k1, d.k2, d.p1, d.p2, d.k3)
    }
}

impl TryFrom<Vec<f64>> for DistortionCoeffs {
    type Error = CoeffsError;

    fn try_from(values: Vec<f64>) -> Result<Self, Self::Error> {
        Self::from_slice(&values)
    }
}

impl From<DistortionCoeffs> for Vec<f64> {
    fn from(c: DistortionCoeffs) -> Self {
        c.0
    }
}

/// Coefficient for a slider position in `-100..=100`.
pub fn slider_value(ticks: i32) -> Result<f64, CoeffsError> {
    if ticks.abs() > SLIDER_TICKS {
        return Err(CoeffsError::TickOutOfRange(ticks));
    }
    Ok(f64::from(ticks) / f64::from(SLIDER_TICKS))
}

/// Check a typed-in coefficient against the slider range and snap it to the
/// nearest slider step.
pub fn quantize_slider(value: f64) -> Result<f64, CoeffsError> {
    if !value.is_finite() || !(SLIDER_MIN..=SLIDER_MAX).contains(&value) {
        return Err(CoeffsError::OutOfRange { value });
    }
    slider_value((value / SLIDER_STEP).round() as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_lengths() {
        assert_eq!(
            DistortionCoeffs::from_slice(&[0.1, 0.2, 0.3]),
            Err(CoeffsError::BadLength(3))
        );
        assert_eq!(
            DistortionCoeffs::from_slice(&[0.0; 6]),
            Err(CoeffsError::BadLength(6))
        );
        assert!(DistortionCoeffs::from_slice(&[0.0; 4]).is_ok());
        assert!(DistortionCoeffs::from_slice(&[0.0; 5]).is_ok());
    }

    #[test]
    fn rejects_nan() {
        assert_eq!(
            DistortionCoeffs::from_slice(&[0.0, f64::NAN, 0.0, 0.0]),
            Err(CoeffsError::NonFinite { index: 1 })
        );
    }

    #[test]
    fn four_term_vector_implies_zero_k3() {
        let c = DistortionCoeffs::radial_tangential(0.1, -0.2, 0.01, 0.02);
        assert_eq!(c.k3(), 0.0);
        assert_eq!(c.to_five().as_slice(), &[0.1, -0.2, 0.01, 0.02, 0.0]);

        let bc = c.to_brown_conrady(5);
        assert_eq!((bc.k1, bc.k2, bc.p1, bc.p2, bc.k3), (0.1, -0.2, 0.01, 0.02, 0.0));
    }

    #[test]
    fn serde_validates_length() {
        let ok: DistortionCoeffs = serde_json::from_str("[0.1, 0.0, 0.0, 0.0, 0.0]").unwrap();
        assert_eq!(ok.len(), 5);
        assert!(serde_json::from_str::<DistortionCoeffs>("[0.1, 0.0]").is_err());
    }

    #[test]
    fn slider_range_and_step() {
        assert_eq!(slider_value(-100).unwrap(), -1.0);
        assert_eq!(slider_value(25).unwrap(), 0.25);
        assert!(slider_value(101).is_err());

        assert_eq!(quantize_slider(0.123).unwrap(), 0.12);
        assert_eq!(quantize_slider(-1.0).unwrap(), -1.0);
        assert!(quantize_slider(1.5).is_err());
        assert!(quantize_slider(f64::NAN).is_err());
    }
}
