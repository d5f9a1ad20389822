//! Sub-pixel corner refinement.
//!
//! For a saddle corner `q`, the image gradient at every nearby pixel `p` is
//! orthogonal to `p - q`. Each iteration solves the weighted normal equations
//! `sum(g gᵀ) q = sum(g gᵀ p)` over a window around the current estimate and
//! moves the window to the solution.

use image::GrayImage;
use lensfix_core::Pt2;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubpixConfig {
    /// Half side of the search window; the window spans `2 * half_window + 1` pixels.
    pub half_window: u32,
    pub max_iters: usize,
    /// Stop once a step moves the corner by less than this many pixels.
    pub epsilon: f64,
}

impl Default for SubpixConfig {
    fn default() -> Self {
        Self {
            half_window: 11,
            max_iters: 30,
            epsilon: 0.001,
        }
    }
}

/// Refine `corners` in place on `gray`.
pub fn refine_corners_subpix(gray: &GrayImage, corners: &mut [Pt2], cfg: &SubpixConfig) {
    if gray.width() < 3 || gray.height() < 3 || cfg.half_window == 0 {
        return;
    }
    let weights = window_weights(cfg.half_window);
    for corner in corners.iter_mut() {
        *corner = refine_one(gray, *corner, cfg, &weights);
    }
}

/// Separable Gaussian-like weights `exp(-(d / half)^2)` over the window.
fn window_weights(half: u32) -> Vec<f64> {
    let half_f = f64::from(half);
    let side = 2 * half as i64 + 1;
    let axis: Vec<f64> = (0..side)
        .map(|i| {
            let d = (i - half as i64) as f64 / half_f;
            (-d * d).exp()
        })
        .collect();
    let mut w = Vec::with_capacity((side * side) as usize);
    for wy in &axis {
        for wx in &axis {
            w.push(wy * wx);
        }
    }
    w
}

fn refine_one(gray: &GrayImage, start: Pt2, cfg: &SubpixConfig, weights: &[f64]) -> Pt2 {
    let half = cfg.half_window as i64;
    let side = 2 * half + 1;
    // window plus a one pixel border for central differences
    let patch_side = side + 2;
    let mut patch = vec![0.0f64; (patch_side * patch_side) as usize];
    let eps2 = cfg.epsilon * cfg.epsilon;
    let (w, h) = (f64::from(gray.width()), f64::from(gray.height()));

    let mut current = start;
    for _ in 0..cfg.max_iters {
        for py in 0..patch_side {
            for px in 0..patch_side {
                let sx = current.x + (px - half - 1) as f64;
                let sy = current.y + (py - half - 1) as f64;
                patch[(py * patch_side + px) as usize] = sample(gray, sx, sy);
            }
        }

        let (mut a, mut b, mut c, mut bb1, mut bb2) = (0.0, 0.0, 0.0, 0.0, 0.0);
        for i in 0..side {
            let dy = (i - half) as f64;
            for j in 0..side {
                let dx = (j - half) as f64;
                let at = |oy: i64, ox: i64| patch[((i + 1 + oy) * patch_side + j + 1 + ox) as usize];
                let gx = at(0, 1) - at(0, -1);
                let gy = at(1, 0) - at(-1, 0);
                let m = weights[(i * side + j) as usize];

                let gxx = gx * gx * m;
                let gxy = gx * gy * m;
                let gyy = gy * gy * m;
                a += gxx;
                b += gxy;
                c += gyy;
                bb1 += gxx * dx + gxy * dy;
                bb2 += gxy * dx + gyy * dy;
            }
        }

        let det = a * c - b * b;
        if det.abs() <= f64::EPSILON * f64::EPSILON {
            break;
        }
        let next = Pt2::new(
            current.x + (c * bb1 - b * bb2) / det,
            current.y + (a * bb2 - b * bb1) / det,
        );
        let step2 = (next - current).norm_squared();
        current = next;
        if current.x < 0.0 || current.x >= w || current.y < 0.0 || current.y >= h {
            break;
        }
        if step2 <= eps2 {
            break;
        }
    }

    let reach = cfg.half_window as f64;
    if (current.x - start.x).abs() > reach
        || (current.y - start.y).abs() > reach
        || !current.x.is_finite()
        || !current.y.is_finite()
    {
        return start;
    }
    current
}

/// Bilinear sample with edge replication.
fn sample(gray: &GrayImage, x: f64, y: f64) -> f64 {
    let max_x = f64::from(gray.width() - 1);
    let max_y = f64::from(gray.height() - 1);
    let x = x.clamp(0.0, max_x);
    let y = y.clamp(0.0, max_y);
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(gray.width() - 1);
    let y1 = (y0 + 1).min(gray.height() - 1);
    let fx = x - f64::from(x0);
    let fy = y - f64::from(y0);
    let v = |px: u32, py: u32| f64::from(gray.get_pixel(px, py)[0]);
    let top = v(x0, y0) * (1.0 - fx) + v(x1, y0) * fx;
    let bottom = v(x0, y1) * (1.0 - fx) + v(x1, y1) * fx;
    top * (1.0 - fy) + bottom * fy
}
