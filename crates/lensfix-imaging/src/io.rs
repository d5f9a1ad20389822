//! Image files on disk.

use crate::ImagingError;
use image::{DynamicImage, ImageReader};
use log::warn;
use std::path::Path;

/// Extensions accepted for calibration and batch input, compared case-insensitively.
pub const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// Decode an image, sniffing the format from content when the extension lies.
pub fn load_image(path: &Path) -> Result<DynamicImage, ImagingError> {
    let read_err = |source| ImagingError::Read {
        path: path.to_path_buf(),
        source,
    };
    ImageReader::open(path)
        .map_err(|e| read_err(image::ImageError::IoError(e)))?
        .with_guessed_format()
        .map_err(|e| read_err(image::ImageError::IoError(e)))?
        .decode()
        .map_err(read_err)
}

/// [`load_image`] that logs and swallows failures, for callers that skip
/// unreadable files.
pub fn try_load_image(path: &Path) -> Option<DynamicImage> {
    match load_image(path) {
        Ok(img) => Some(img),
        Err(err) => {
            warn!("{err}");
            None
        }
    }
}

/// Encode by the extension of `path`. JPEG has no alpha channel, so alpha is
/// dropped for `.jpg`/`.jpeg` targets.
pub fn save_image(img: &DynamicImage, path: &Path) -> Result<(), ImagingError> {
    let is_jpeg = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"));

    let result = if is_jpeg && img.color().has_alpha() {
        DynamicImage::ImageRgb8(img.to_rgb8()).save(path)
    } else {
        img.save(path)
    };
    result.map_err(|source| ImagingError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn extension_filter_is_case_insensitive() {
        assert!(is_image_path(Path::new("a/board.PNG")));
        assert!(is_image_path(Path::new("shot.JpEg")));
        assert!(is_image_path(Path::new("x.bmp")));
        assert!(!is_image_path(Path::new("notes.txt")));
        assert!(!is_image_path(Path::new("README")));
        assert!(!is_image_path(Path::new("archive.png.gz")));
    }

    #[test]
    fn save_then_load_png_and_rgba_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 6, Rgba([10, 200, 30, 128])));

        let png = dir.path().join("a.png");
        save_image(&img, &png).unwrap();
        let back = load_image(&png).unwrap();
        assert_eq!(back.to_rgba8(), img.to_rgba8());

        let jpg = dir.path().join("a.jpg");
        save_image(&img, &jpg).unwrap();
        assert_eq!(load_image(&jpg).unwrap().width(), 8);
    }

    #[test]
    fn unreadable_file_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("broken.png");
        std::fs::write(&bogus, b"not an image").unwrap();

        assert!(load_image(&bogus).is_err());
        assert!(try_load_image(&bogus).is_none());
        assert!(try_load_image(&dir.path().join("missing.png")).is_none());
    }
}
