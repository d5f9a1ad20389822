//! Chessboard inner-corner detection.
//!
//! Detection runs the ChESS corner detector followed by grid assembly from
//! `calib-targets`; this module pins the expected pattern size and normalizes
//! the grid labels so `(0, 0)` is the first corner and `i` runs along the
//! pattern's `cols` direction.

use calib_targets::chessboard::ChessboardDetectionResult;
use calib_targets::{detect, ChessboardParams};
use image::GrayImage;
use lensfix_core::{Pt2, Pt3};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Inner-corner count of a chessboard, e.g. 9×6 for a 10×7-square board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternSize {
    pub cols: u32,
    pub rows: u32,
}

impl Default for PatternSize {
    fn default() -> Self {
        Self { cols: 9, rows: 6 }
    }
}

impl PatternSize {
    pub fn corner_count(&self) -> usize {
        self.cols as usize * self.rows as usize
    }
}

impl fmt::Display for PatternSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}

impl FromStr for PatternSize {
    type Err = String;

    /// Parse `COLSxROWS`, e.g. `9x6`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (cols, rows) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("expected COLSxROWS, got '{s}'"))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<u32>()
                .map_err(|e| format!("bad pattern dimension '{v}': {e}"))
        };
        let size = Self {
            cols: parse(cols)?,
            rows: parse(rows)?,
        };
        if size.cols < 2 || size.rows < 2 {
            return Err(format!("pattern {size} needs at least 2x2 inner corners"));
        }
        Ok(size)
    }
}

/// A detected corner with its grid label.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridCorner {
    pub i: u32,
    pub j: u32,
    pub position: Pt2,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoardDetection {
    pub corners: Vec<GridCorner>,
}

impl BoardDetection {
    pub fn len(&self) -> usize {
        self.corners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.corners.is_empty()
    }

    /// Every inner corner of `pattern` present exactly once.
    pub fn is_complete(&self, pattern: PatternSize) -> bool {
        if self.corners.len() != pattern.corner_count() {
            return false;
        }
        let mut seen = vec![false; pattern.corner_count()];
        for c in &self.corners {
            if c.i >= pattern.cols || c.j >= pattern.rows {
                return false;
            }
            let idx = (c.j * pattern.cols + c.i) as usize;
            if std::mem::replace(&mut seen[idx], true) {
                return false;
            }
        }
        true
    }

    /// Board-plane points `(i * square, j * square, 0)` paired with pixels.
    pub fn correspondences(&self, square_size: f64) -> (Vec<Pt3>, Vec<Pt2>) {
        self.corners
            .iter()
            .map(|c| {
                (
                    Pt3::new(f64::from(c.i) * square_size, f64::from(c.j) * square_size, 0.0),
                    c.position,
                )
            })
            .unzip()
    }

    pub fn positions(&self) -> Vec<Pt2> {
        self.corners.iter().map(|c| c.position).collect()
    }

    pub fn set_positions(&mut self, positions: &[Pt2]) {
        for (c, p) in self.corners.iter_mut().zip(positions) {
            c.position = *p;
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChessboardDetector {
    pattern: PatternSize,
    params: ChessboardParams,
}

impl ChessboardDetector {
    pub fn new(pattern: PatternSize) -> Self {
        let params = ChessboardParams {
            expected_rows: Some(pattern.rows),
            expected_cols: Some(pattern.cols),
            ..ChessboardParams::default()
        };
        Self { pattern, params }
    }

    pub fn pattern(&self) -> PatternSize {
        self.pattern
    }

    /// Detect the board; `None` when no grid is assembled.
    pub fn detect(&self, gray: &GrayImage) -> Option<BoardDetection> {
        let chess_cfg = detect::default_chess_config();
        let result = detect::detect_chessboard(gray, &chess_cfg, self.params.clone())?;
        let detection = self.label(result);
        debug!(
            "chessboard {}: {} labelled corners",
            self.pattern,
            detection.len()
        );
        (!detection.is_empty()).then_some(detection)
    }

    fn label(&self, result: ChessboardDetectionResult) -> BoardDetection {
        let raw: Vec<(i32, i32, Pt2)> = result
            .detection
            .corners
            .into_iter()
            .filter_map(|corner| {
                let grid = corner.grid?;
                let p = Pt2::new(f64::from(corner.position.x), f64::from(corner.position.y));
                Some((grid.i as i32, grid.j as i32, p))
            })
            .collect();
        normalize_grid(raw, self.pattern)
    }
}

/// Shift labels to start at zero and swap axes when the detector's `i` runs
/// along the pattern rows.
fn normalize_grid(raw: Vec<(i32, i32, Pt2)>, pattern: PatternSize) -> BoardDetection {
    let (Some(min_i), Some(min_j)) = (
        raw.iter().map(|c| c.0).min(),
        raw.iter().map(|c| c.1).min(),
    ) else {
        return BoardDetection { corners: Vec::new() };
    };
    let span_i = raw.iter().map(|c| c.0 - min_i).max().unwrap_or(0) as u32;
    let span_j = raw.iter().map(|c| c.1 - min_j).max().unwrap_or(0) as u32;
    let transposed = pattern.cols != pattern.rows
        && span_i + 1 == pattern.rows
        && span_j + 1 == pattern.cols;

    let mut corners: Vec<GridCorner> = raw
        .into_iter()
        .map(|(i, j, position)| {
            let (i, j) = ((i - min_i) as u32, (j - min_j) as u32);
            let (i, j) = if transposed { (j, i) } else { (i, j) };
            GridCorner { i, j, position }
        })
        .collect();
    corners.sort_by_key(|c| (c.j, c.i));
    BoardDetection { corners }
}
