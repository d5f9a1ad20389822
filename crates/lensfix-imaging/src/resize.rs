use image::{imageops::FilterType, DynamicImage};

/// Resize keeping the aspect ratio.
///
/// With `width` given the height follows as `floor(h * width / w)`, otherwise
/// `height` drives the width the same way; `width` wins when both are set.
/// With neither, the image is returned unchanged. Shrinking averages source
/// pixels over each target pixel, enlarging interpolates bilinearly.
pub fn resize_image(img: &DynamicImage, width: Option<u32>, height: Option<u32>) -> DynamicImage {
    let (w, h) = (img.width(), img.height());
    if w == 0 || h == 0 {
        return img.clone();
    }
    let (new_w, new_h) = match (width, height) {
        (None, None) => return img.clone(),
        (Some(tw), _) => (tw, scaled(h, tw, w)),
        (None, Some(th)) => (scaled(w, th, h), th),
    };
    let (new_w, new_h) = (new_w.max(1), new_h.max(1));
    if (new_w, new_h) == (w, h) {
        return img.clone();
    }

    if new_w <= w && new_h <= h {
        img.thumbnail_exact(new_w, new_h)
    } else {
        img.resize_exact(new_w, new_h, FilterType::Triangle)
    }
}

/// `floor(other * target / driver)`.
fn scaled(other: u32, target: u32, driver: u32) -> u32 {
    (u64::from(other) * u64::from(target) / u64::from(driver)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn gray(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(w, h, Luma([90])))
    }

    #[test]
    fn width_drives_height() {
        let out = resize_image(&gray(640, 480), Some(320), None);
        assert_eq!((out.width(), out.height()), (320, 240));
    }

    #[test]
    fn height_drives_width_with_truncation() {
        let out = resize_image(&gray(1000, 750), None, Some(333));
        assert_eq!((out.width(), out.height()), (444, 333));
    }

    #[test]
    fn width_wins_over_height() {
        let out = resize_image(&gray(300, 200), Some(150), Some(999));
        assert_eq!((out.width(), out.height()), (150, 100));
    }

    #[test]
    fn no_target_returns_input_unchanged() {
        let img = gray(37, 11);
        let out = resize_image(&img, None, None);
        assert_eq!(out.as_bytes(), img.as_bytes());
        assert_eq!((out.width(), out.height()), (37, 11));
    }

    #[test]
    fn aspect_ratio_preserved_when_enlarging() {
        let out = resize_image(&gray(160, 90), Some(1600), None);
        assert_eq!((out.width(), out.height()), (1600, 900));
        assert_eq!(out.to_luma8().get_pixel(800, 450)[0], 90);
    }
}
