//! HSV colour segmentation.
//!
//! Hue uses the 8-bit convention `0..180` (degrees halved); saturation and
//! value use `0..=255`.

use image::{DynamicImage, GrayImage, Luma, RgbImage};
use serde::{Deserialize, Serialize};

/// Inclusive HSV box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HsvRange {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl Default for HsvRange {
    /// Light, weakly saturated pixels: the white squares of a printed board
    /// under indoor light, excluding blown-out highlights.
    fn default() -> Self {
        Self {
            lower: [0, 0, 143],
            upper: [179, 61, 252],
        }
    }
}

impl HsvRange {
    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        (0..3).all(|c| self.lower[c] <= hsv[c] && hsv[c] <= self.upper[c])
    }
}

pub fn rgb_to_hsv(rgb: [u8; 3]) -> [u8; 3] {
    let [r, g, b] = rgb.map(f32::from);
    let v = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = v - min;

    let s = if v > 0.0 { 255.0 * delta / v } else { 0.0 };
    let mut h = if delta == 0.0 {
        0.0
    } else if v == r {
        60.0 * (g - b) / delta
    } else if v == g {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    if h < 0.0 {
        h += 360.0;
    }
    // 360 degrees wraps to hue 0 after halving
    let h = ((h / 2.0).round() as u32 % 180) as u8;
    [h, s.round() as u8, v as u8]
}

/// 255 where the pixel falls inside `range`, 0 elsewhere.
pub fn color_mask(img: &RgbImage, range: &HsvRange) -> GrayImage {
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let inside = range.contains(rgb_to_hsv(img.get_pixel(x, y).0));
        Luma([if inside { 255 } else { 0 }])
    })
}

/// Detector input for colour-segmented boards: the inverted [`color_mask`],
/// so in-range squares turn black and everything else white.
pub fn segment_by_color(img: &DynamicImage, range: &HsvRange) -> GrayImage {
    let mut mask = color_mask(&img.to_rgb8(), range);
    image::imageops::invert(&mut mask);
    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn hsv_matches_eight_bit_convention() {
        assert_eq!(rgb_to_hsv([255, 0, 0]), [0, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 255, 0]), [60, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 0, 255]), [120, 255, 255]);
        assert_eq!(rgb_to_hsv([200, 200, 200]), [0, 0, 200]);
        assert_eq!(rgb_to_hsv([0, 0, 0]), [0, 0, 0]);
        // hue just below 360 degrees wraps to zero rather than 180
        assert_eq!(rgb_to_hsv([255, 0, 1]), [0, 255, 255]);
    }

    #[test]
    fn default_range_keeps_light_grey_and_drops_extremes() {
        let range = HsvRange::default();
        assert!(range.contains(rgb_to_hsv([200, 200, 200])));
        assert!(range.contains(rgb_to_hsv([230, 220, 200])));
        assert!(!range.contains(rgb_to_hsv([255, 255, 255])));
        assert!(!range.contains(rgb_to_hsv([20, 20, 20])));
        assert!(!range.contains(rgb_to_hsv([220, 40, 40])));
    }

    #[test]
    fn segmentation_inverts_mask() {
        let img = RgbImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                Rgb([200, 200, 200])
            } else {
                Rgb([10, 10, 10])
            }
        });
        let mask = color_mask(&img, &HsvRange::default());
        assert_eq!(mask.as_raw(), &vec![255, 0]);

        let seg = segment_by_color(&DynamicImage::ImageRgb8(img), &HsvRange::default());
        assert_eq!(seg.as_raw(), &vec![0, 255]);
    }
}
