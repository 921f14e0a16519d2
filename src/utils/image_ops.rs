use image::{DynamicImage, GrayImage, Luma, RgbImage};

/// Resize an image preserving aspect ratio so its longer side equals
/// `target_size`, then center it on a zero-filled square canvas.
///
/// The output is always exactly `target_size` x `target_size`; the letterbox
/// borders are black. Degenerate aspect ratios that would round a side down
/// to zero are clamped to one pixel.
pub fn resize_and_pad(img: &DynamicImage, target_size: u32) -> RgbImage {
    let (w, h) = (img.width(), img.height());

    let (new_w, new_h) = if h > w {
        let scaled = (w as f32 * (target_size as f32 / h as f32)) as u32;
        (scaled.max(1), target_size)
    } else {
        let scaled = (h as f32 * (target_size as f32 / w as f32)) as u32;
        (target_size, scaled.max(1))
    };

    let resized = img
        .resize_exact(new_w, new_h, image::imageops::FilterType::Triangle)
        .to_rgb8();

    let mut canvas = RgbImage::new(target_size, target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;
    image::imageops::replace(&mut canvas, &resized, pad_x as i64, pad_y as i64);
    canvas
}

/// Scale every pixel by `gain` with saturation, boosting contrast of
/// grayscale scans before thresholding.
pub fn boost_contrast(img: &GrayImage, gain: f32) -> GrayImage {
    let mut out = img.clone();
    for pixel in out.pixels_mut() {
        let scaled = (pixel[0] as f32 * gain).clamp(0.0, 255.0);
        *pixel = Luma([scaled as u8]);
    }
    out
}

/// Expand a detected box by `padding` pixels on every side and clamp it to
/// the image bounds. Returns `None` for boxes that fall outside the image or
/// collapse to zero area after clamping.
pub fn expand_and_clamp(
    left: i32,
    top: i32,
    width: i32,
    height: i32,
    padding: i32,
    img_width: u32,
    img_height: u32,
) -> Option<(u32, u32, u32, u32)> {
    let x = (left - padding).max(0);
    let y = (top - padding).max(0);
    if x >= img_width as i32 || y >= img_height as i32 {
        return None;
    }

    let w = (width + 2 * padding).min(img_width as i32 - x);
    let h = (height + 2 * padding).min(img_height as i32 - y);
    if w <= 0 || h <= 0 {
        return None;
    }

    Some((x as u32, y as u32, w as u32, h as u32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid(width: u32, height: u32, value: u8) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(
            width,
            height,
            Rgb([value, value, value]),
        ))
    }

    #[test]
    fn letterbox_is_always_target_square() {
        for (w, h) in [(10, 100), (100, 10), (50, 50), (1, 300), (300, 1)] {
            let out = resize_and_pad(&solid(w, h, 200), 384);
            assert_eq!(out.width(), 384);
            assert_eq!(out.height(), 384);
        }
    }

    #[test]
    fn letterbox_centers_content_and_zero_fills_borders() {
        // A wide white image letterboxed into a square: bands above and
        // below must be zero, the middle row must be white.
        let out = resize_and_pad(&solid(200, 100, 255), 200);
        assert_eq!(out.get_pixel(100, 0)[0], 0);
        assert_eq!(out.get_pixel(100, 199)[0], 0);
        assert_eq!(out.get_pixel(100, 100)[0], 255);

        // Padding is split evenly: content occupies rows 50..150.
        assert_eq!(out.get_pixel(100, 49)[0], 0);
        assert_eq!(out.get_pixel(100, 51)[0], 255);
    }

    #[test]
    fn letterbox_tall_image_pads_horizontally() {
        let out = resize_and_pad(&solid(100, 200, 255), 200);
        assert_eq!(out.get_pixel(0, 100)[0], 0);
        assert_eq!(out.get_pixel(199, 100)[0], 0);
        assert_eq!(out.get_pixel(100, 100)[0], 255);
    }

    #[test]
    fn contrast_gain_saturates() {
        let img = GrayImage::from_pixel(2, 1, Luma([200]));
        let out = boost_contrast(&img, 1.5);
        assert_eq!(out.get_pixel(0, 0)[0], 255);

        let img = GrayImage::from_pixel(1, 1, Luma([100]));
        let out = boost_contrast(&img, 1.5);
        assert_eq!(out.get_pixel(0, 0)[0], 150);
    }

    #[test]
    fn clamp_never_exceeds_bounds() {
        // Box flush against the top-left corner
        let (x, y, w, h) = expand_and_clamp(0, 0, 10, 10, 5, 100, 100).unwrap();
        assert_eq!((x, y), (0, 0));
        assert_eq!((w, h), (20, 20));

        // Box flush against the bottom-right corner
        let (x, y, w, h) = expand_and_clamp(90, 90, 10, 10, 5, 100, 100).unwrap();
        assert_eq!((x, y), (85, 85));
        assert_eq!((w, h), (15, 15));
        assert!(x + w <= 100 && y + h <= 100);
    }

    #[test]
    fn clamp_drops_degenerate_boxes() {
        assert!(expand_and_clamp(0, 0, 0, 0, 0, 100, 100).is_none());
        assert!(expand_and_clamp(150, 10, 10, 10, 5, 100, 100).is_none());
        assert!(expand_and_clamp(10, 150, 10, 10, 5, 100, 100).is_none());
    }
}
