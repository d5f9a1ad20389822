//! End-to-end calibration on rendered chessboard photos.

use image::{DynamicImage, GrayImage, Luma};
use lensfix_core::{BrownConrady5, DistortionModel, FxFyCxCySkew, Iso3, Pt3, Real, Vec2, Vec3};
use nalgebra::{Translation3, UnitQuaternion, Vector3};
use lensfix_imaging::save_image;
use lensfix_pipeline::{calibrate_images, CalibrateConfig, Workbench};
use std::path::PathBuf;

const WIDTH: u32 = 640;
const HEIGHT: u32 = 480;
const SQUARE: Real = 0.02;
const SUPERSAMPLE: u32 = 2;

fn camera() -> (FxFyCxCySkew<Real>, BrownConrady5<Real>) {
    (
        FxFyCxCySkew {
            fx: 800.0,
            fy: 800.0,
            cx: 320.0,
            cy: 240.0,
            skew: 0.0,
        },
        BrownConrady5 {
            k1: -0.1,
            k2: 0.02,
            k3: 0.0,
            p1: 0.0,
            p2: 0.0,
            iters: 20,
        },
    )
}

/// Board intensity at board-plane point `(x, y)`; a 10x7-square board with
/// its first inner corner at the origin on a white surround.
fn board_value(x: Real, y: Real) -> f64 {
    let inside = (-SQUARE..9.0 * SQUARE).contains(&x) && (-SQUARE..6.0 * SQUARE).contains(&y);
    if !inside {
        return 220.0;
    }
    let parity = ((x / SQUARE).floor() as i64 + (y / SQUARE).floor() as i64).rem_euclid(2);
    if parity == 0 {
        30.0
    } else {
        220.0
    }
}

/// Board poses spreading the board over the centre and the four quadrants
/// of the frame, each tilted towards the camera.
///
/// Entries are `(u, v, rx, ry)`: where the board centre lands in normalized
/// image coordinates, and the tilt about the board's x and y axes.
fn frame_covering_poses() -> Vec<Iso3> {
    const DISTANCE: Real = 0.4;
    const PLACEMENTS: [(Real, Real, Real, Real); 5] = [
        (0.0, 0.0, 0.3, 0.0),
        (0.09, 0.065, -0.25, 0.25),
        (-0.09, 0.065, -0.25, -0.25),
        (0.09, -0.065, 0.25, 0.25),
        (-0.09, -0.065, 0.25, -0.25),
    ];
    // Middle of the 9x6 inner-corner grid in board coordinates.
    let centre = Vector3::new(4.0 * SQUARE, 2.5 * SQUARE, 0.0);
    PLACEMENTS
        .iter()
        .map(|&(u, v, rx, ry)| {
            let rotation = UnitQuaternion::from_scaled_axis(Vector3::new(rx, ry, 0.0));
            let target = Vector3::new(u * DISTANCE, v * DISTANCE, DISTANCE);
            Iso3::from_parts(Translation3::from(target - rotation * centre), rotation)
        })
        .collect()
}

fn render(pose: &Iso3) -> GrayImage {
    let (k, dist) = camera();
    let origin = pose.inverse_transform_point(&Pt3::origin());
    GrayImage::from_fn(WIDTH, HEIGHT, |px, py| {
        let mut acc = 0.0;
        for sy in 0..SUPERSAMPLE {
            for sx in 0..SUPERSAMPLE {
                let u = f64::from(px) + (f64::from(sx) + 0.5) / f64::from(SUPERSAMPLE) - 0.5;
                let v = f64::from(py) + (f64::from(sy) + 0.5) / f64::from(SUPERSAMPLE) - 0.5;
                let nd = Vec2::new((u - k.cx) / k.fx, (v - k.cy) / k.fy);
                let n = dist.undistort(&nd);
                let dir = pose.inverse_transform_vector(&Vec3::new(n.x, n.y, 1.0));
                let t = -origin.z / dir.z;
                acc += if dir.z.abs() < 1e-12 || t <= 0.0 {
                    128.0
                } else {
                    board_value(origin.x + t * dir.x, origin.y + t * dir.y)
                };
            }
        }
        Luma([(acc / f64::from(SUPERSAMPLE * SUPERSAMPLE)).round() as u8])
    })
}

#[test]
fn rendered_boards_calibrate_and_feed_the_workbench() {
    let dir = tempfile::tempdir().unwrap();
    let mut paths: Vec<PathBuf> = frame_covering_poses()
        .iter()
        .enumerate()
        .map(|(idx, pose)| {
            let path = dir.path().join(format!("board_{idx}.png"));
            save_image(&DynamicImage::ImageLuma8(render(pose)), &path).unwrap();
            path
        })
        .collect();
    let blank = dir.path().join("blank.png");
    save_image(
        &DynamicImage::ImageLuma8(GrayImage::from_pixel(WIDTH, HEIGHT, Luma([200]))),
        &blank,
    )
    .unwrap();
    paths.push(blank.clone());

    let config = CalibrateConfig {
        square_size: SQUARE,
        ..CalibrateConfig::default()
    };
    let result = calibrate_images(&paths, &config).unwrap();

    assert_eq!(result.views_used, 5);
    assert_eq!(result.skipped, vec![blank]);
    assert_eq!(result.image_size, (WIDTH, HEIGHT));
    let k = result.k_matrix();
    assert!((k[(0, 0)] - 800.0).abs() / 800.0 < 0.03, "fx {}", k[(0, 0)]);
    assert!((k[(1, 1)] - 800.0).abs() / 800.0 < 0.03, "fy {}", k[(1, 1)]);
    assert!((k[(0, 2)] - 320.0).abs() < 15.0, "cx {}", k[(0, 2)]);
    assert!((k[(1, 2)] - 240.0).abs() < 15.0, "cy {}", k[(1, 2)]);
    assert!(result.dist_coeffs.k1() < 0.0, "k1 {}", result.dist_coeffs.k1());
    assert!(result.rms_error < 0.5, "rms {}", result.rms_error);

    let mut bench = Workbench::new(config);
    bench.load_calibration(result).unwrap();
    let report = bench
        .batch_correct(dir.path(), &Default::default())
        .unwrap();
    assert_eq!(report.written.len(), 6);
}
