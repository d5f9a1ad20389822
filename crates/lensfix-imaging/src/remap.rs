//! Coordinate tables and bilinear resampling.
//!
//! A [`RemapTable`] stores, for every output pixel, the source position it
//! samples. Positions outside the source image render black.

use crate::ImagingError;
use image::{DynamicImage, ImageBuffer, Pixel};
use lensfix_core::{
    distort_to_pixel, normalized_to_pixel, pixel_to_normalized, undistort_pixel, DistortionCoeffs,
    DistortionModel, Mat3, Pt2,
};

/// Newton iteration cap for the undistortion used by [`distort_map`].
pub const REMAP_UNDISTORT_ITERS: u32 = 20;

/// Normalized-coordinate residual above which an inverse lookup counts as unsolved.
const INVERSE_TOLERANCE: f64 = 1e-6;

/// Source coordinates within this distance of an integer are snapped to it.
const SNAP_EPS: f32 = 1e-3;

#[derive(Debug, Clone)]
pub struct RemapTable {
    width: u32,
    height: u32,
    /// Row-major source positions; NaN marks "no source".
    coords: Vec<[f32; 2]>,
}

impl RemapTable {
    /// Build a table by evaluating `f` at every output pixel.
    pub fn from_fn<F>(width: u32, height: u32, mut f: F) -> Self
    where
        F: FnMut(u32, u32) -> Option<Pt2>,
    {
        let mut coords = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                let entry = match f(x, y) {
                    Some(p) if p.x.is_finite() && p.y.is_finite() => [p.x as f32, p.y as f32],
                    _ => [f32::NAN, f32::NAN],
                };
                coords.push(entry);
            }
        }
        Self {
            width,
            height,
            coords,
        }
    }

    pub fn identity(width: u32, height: u32) -> Self {
        Self::from_fn(width, height, |x, y| Some(Pt2::new(x as f64, y as f64)))
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn source(&self, x: u32, y: u32) -> Option<[f32; 2]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let c = self.coords[y as usize * self.width as usize + x as usize];
        (!c[0].is_nan()).then_some(c)
    }
}

fn invert_k(k: &Mat3) -> Result<Mat3, ImagingError> {
    k.try_inverse().ok_or(ImagingError::SingularCameraMatrix)
}

/// Table for removing distortion: each ideal output pixel samples the source
/// where the lens would have imaged it.
pub fn undistort_map(
    k: &Mat3,
    coeffs: &DistortionCoeffs,
    width: u32,
    height: u32,
) -> Result<RemapTable, ImagingError> {
    let k_inv = invert_k(k)?;
    let model = coeffs.to_brown_conrady(REMAP_UNDISTORT_ITERS);
    Ok(RemapTable::from_fn(width, height, |x, y| {
        let n = pixel_to_normalized(Pt2::new(x as f64, y as f64), &k_inv);
        Some(distort_to_pixel(n, k, &model))
    }))
}

/// Table for synthesizing distortion: each distorted output pixel samples the
/// ideal source point that maps onto it.
///
/// Output pixels with no ideal preimage (beyond the fold of strong barrel
/// distortion) are left without a source.
pub fn distort_map(
    k: &Mat3,
    coeffs: &DistortionCoeffs,
    width: u32,
    height: u32,
) -> Result<RemapTable, ImagingError> {
    let k_inv = invert_k(k)?;
    let model = coeffs.to_brown_conrady(REMAP_UNDISTORT_ITERS);
    Ok(RemapTable::from_fn(width, height, |x, y| {
        let pixel = Pt2::new(x as f64, y as f64);
        let ideal = undistort_pixel(pixel, &k_inv, &model);
        let residual = model.distort(&ideal) - pixel_to_normalized(pixel, &k_inv);
        (residual.norm() < INVERSE_TOLERANCE).then(|| normalized_to_pixel(ideal, k))
    }))
}

/// Resample `img` through `table`. The output takes the table's dimensions
/// and the input's pixel layout for 8-bit gray/RGB(A); other layouts come
/// back as RGBA8.
pub fn remap(img: &DynamicImage, table: &RemapTable) -> DynamicImage {
    match img {
        DynamicImage::ImageLuma8(buf) => DynamicImage::ImageLuma8(remap_buffer(buf, table)),
        DynamicImage::ImageLumaA8(buf) => DynamicImage::ImageLumaA8(remap_buffer(buf, table)),
        DynamicImage::ImageRgb8(buf) => DynamicImage::ImageRgb8(remap_buffer(buf, table)),
        DynamicImage::ImageRgba8(buf) => DynamicImage::ImageRgba8(remap_buffer(buf, table)),
        other => DynamicImage::ImageRgba8(remap_buffer(&other.to_rgba8(), table)),
    }
}

fn snap(v: f32) -> f32 {
    let r = v.round();
    if (v - r).abs() < SNAP_EPS {
        r
    } else {
        v
    }
}

fn remap_buffer<P>(src: &ImageBuffer<P, Vec<u8>>, table: &RemapTable) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8>,
{
    let (width, height) = table.dimensions();
    let mut out = ImageBuffer::<P, Vec<u8>>::new(width, height);
    if src.width() == 0 || src.height() == 0 {
        return out;
    }
    for (x, y, px) in out.enumerate_pixels_mut() {
        if let Some([sx, sy]) = table.source(x, y) {
            sample_bilinear(src, snap(sx), snap(sy), px.channels_mut());
        }
    }
    out
}

/// Bilinear sample into `out`; positions more than half a pixel outside the
/// source leave `out` untouched (black).
fn sample_bilinear<P>(src: &ImageBuffer<P, Vec<u8>>, x: f32, y: f32, out: &mut [u8])
where
    P: Pixel<Subpixel = u8>,
{
    let max_x = (src.width() - 1) as f32;
    let max_y = (src.height() - 1) as f32;
    if x < -0.5 || y < -0.5 || x > max_x + 0.5 || y > max_y + 0.5 {
        return;
    }
    let x = x.clamp(0.0, max_x);
    let y = y.clamp(0.0, max_y);

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(src.width() - 1);
    let y1 = (y0 + 1).min(src.height() - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = src.get_pixel(x0, y0).channels();
    let p10 = src.get_pixel(x1, y0).channels();
    let p01 = src.get_pixel(x0, y1).channels();
    let p11 = src.get_pixel(x1, y1).channels();

    for (c, dst) in out.iter_mut().enumerate() {
        let top = f32::from(p00[c]) * (1.0 - fx) + f32::from(p10[c]) * fx;
        let bottom = f32::from(p01[c]) * (1.0 - fx) + f32::from(p11[c]) * fx;
        *dst = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};
    use lensfix_core::synthetic_camera_matrix;

    fn gradient(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| Luma([((x * 7 + y * 3) % 256) as u8]))
    }

    #[test]
    fn identity_table_reproduces_input() {
        let img = DynamicImage::ImageLuma8(gradient(31, 17));
        let out = remap(&img, &RemapTable::identity(31, 17));
        assert_eq!(out.as_bytes(), img.as_bytes());
    }

    #[test]
    fn half_pixel_shift_averages_neighbours() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_fn(2, 1, |x, _| Luma([[0, 200][x as usize]])));
        let table = RemapTable::from_fn(1, 1, |_, _| Some(Pt2::new(0.5, 0.0)));
        let out = remap(&img, &table).to_luma8();
        assert_eq!(out.get_pixel(0, 0)[0], 100);
    }

    #[test]
    fn out_of_bounds_and_missing_sources_are_black() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([255, 255, 255])));
        let table = RemapTable::from_fn(3, 1, |x, _| match x {
            0 => Some(Pt2::new(-3.0, 1.0)),
            1 => None,
            _ => Some(Pt2::new(3.4, 3.4)),
        });
        let out = remap(&img, &table).to_rgb8();
        assert_eq!(out.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(out.get_pixel(1, 0), &Rgb([0, 0, 0]));
        assert_eq!(out.get_pixel(2, 0), &Rgb([255, 255, 255]));
    }

    #[test]
    fn zero_distortion_maps_are_identity() {
        let k = synthetic_camera_matrix(40, 30);
        let zero = DistortionCoeffs::zero();
        for table in [
            undistort_map(&k, &zero, 40, 30).unwrap(),
            distort_map(&k, &zero, 40, 30).unwrap(),
        ] {
            for (x, y) in [(0, 0), (39, 29), (17, 4)] {
                let [sx, sy] = table.source(x, y).unwrap();
                assert!((sx - x as f32).abs() < 1e-4 && (sy - y as f32).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn distort_map_inverts_undistort_map() {
        let k = synthetic_camera_matrix(64, 48);
        let coeffs = DistortionCoeffs::radial_tangential(0.3, -0.1, 0.01, 0.005);
        let fwd = undistort_map(&k, &coeffs, 64, 48).unwrap();
        let inv = distort_map(&k, &coeffs, 64, 48).unwrap();

        // the distorted position of an ideal pixel, pulled back by the inverse table,
        // lands on the ideal pixel again
        let k_inv = k.try_inverse().unwrap();
        let model = coeffs.to_brown_conrady(REMAP_UNDISTORT_ITERS);
        let ideal = Pt2::new(50.0, 10.0);
        let [dx, dy] = fwd.source(50, 10).unwrap();
        let expected = distort_to_pixel(pixel_to_normalized(ideal, &k_inv), &k, &model);
        assert!((dx as f64 - expected.x).abs() < 1e-3 && (dy as f64 - expected.y).abs() < 1e-3);

        let [ix, iy] = inv.source(10, 40).unwrap();
        let ideal = Pt2::new(f64::from(ix), f64::from(iy));
        let back = distort_to_pixel(pixel_to_normalized(ideal, &k_inv), &k, &model);
        assert!((back.x - 10.0).abs() < 1e-2 && (back.y - 40.0).abs() < 1e-2);
    }

    #[test]
    fn strong_barrel_leaves_unreachable_corners_without_source() {
        let k = synthetic_camera_matrix(100, 100);
        let coeffs = DistortionCoeffs::radial_tangential(-1.0, 0.0, 0.0, 0.0);
        let table = distort_map(&k, &coeffs, 100, 100).unwrap();
        assert!(table.source(0, 0).is_none());
        assert!(table.source(50, 50).is_some());
    }

    #[test]
    fn singular_camera_matrix_is_rejected() {
        let err = undistort_map(&Mat3::zeros(), &DistortionCoeffs::zero(), 4, 4).unwrap_err();
        assert!(matches!(err, ImagingError::SingularCameraMatrix));
    }
}
