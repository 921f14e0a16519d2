// Word segmentation: binarize the page, run a bounding-box text-detection
// pass, and crop each detected word from the original image.

use crate::core::config::Config;
use crate::core::errors::{SegmentationError, SegmentationResult};
use crate::core::types::WordBox;
use crate::utils::image_ops::{boost_contrast, expand_and_clamp};
use crate::utils::scratch::words_dir_for;
use image::{DynamicImage, GrayImage};
use imageproc::contrast::adaptive_threshold;
use imageproc::distance_transform::Norm;
use imageproc::filter::median_filter;
use imageproc::morphology::dilate;
use rusty_tesseract::Args;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};

pub struct WordSegmenter {
    config: Arc<Config>,
}

impl WordSegmenter {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Segment a page of handwriting into word crops.
    ///
    /// The page is binarized and handed to the detection engine; every token
    /// containing at least one alphanumeric character is padded, clamped to
    /// the image bounds, cropped from the *original* (non-binarized) image,
    /// and saved as a sequentially numbered file under the per-image crop
    /// directory. Returns the crop paths in the engine's native record order
    /// (not coordinate-sorted; the engine does not guarantee reading order).
    pub fn separate_words(&self, image_path: &Path) -> SegmentationResult<Vec<PathBuf>> {
        let original =
            image::open(image_path).map_err(|source| SegmentationError::ImageUnreadable {
                path: image_path.display().to_string(),
                source,
            })?;

        let binary = self.binarize(&original);
        let boxes = self.detect_word_boxes(&binary)?;
        debug!("Detected {} candidate tokens", boxes.len());

        let words_dir = words_dir_for(image_path, Path::new(self.config.output_dir()));
        std::fs::create_dir_all(&words_dir)?;

        let ext = image_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("png")
            .to_lowercase();

        let padding = self.config.segmenter.crop_padding;
        let mut crop_paths = Vec::new();
        let mut index = 1;

        for word in &boxes {
            let Some((x, y, w, h)) = expand_and_clamp(
                word.left,
                word.top,
                word.width,
                word.height,
                padding,
                original.width(),
                original.height(),
            ) else {
                trace!("Dropping degenerate box for token {:?}", word.text);
                continue;
            };

            let crop = original.crop_imm(x, y, w, h);
            let crop_path = words_dir.join(format!("{index}.{ext}"));
            crop.save(&crop_path)
                .map_err(|source| SegmentationError::CropWriteFailed {
                    path: crop_path.display().to_string(),
                    source,
                })?;
            crop_paths.push(crop_path);
            index += 1;
        }

        debug!("Saved {} word crops to {}", crop_paths.len(), words_dir.display());
        Ok(crop_paths)
    }

    /// Grayscale → denoise → contrast boost → adaptive threshold (inverted,
    /// strokes white) → dilate to merge close strokes.
    fn binarize(&self, img: &DynamicImage) -> GrayImage {
        let seg = &self.config.segmenter;

        let gray = img.to_luma8();
        let denoised = median_filter(&gray, seg.denoise_radius, seg.denoise_radius);
        let boosted = boost_contrast(&denoised, seg.contrast_gain);

        let mut binary = adaptive_threshold(&boosted, seg.threshold_block_radius);
        image::imageops::invert(&mut binary);

        dilate(&binary, Norm::LInf, seg.dilate_radius)
    }

    /// Run the bounding-box detection pass over the binary image and keep
    /// tokens containing at least one alphanumeric character.
    fn detect_word_boxes(&self, binary: &GrayImage) -> SegmentationResult<Vec<WordBox>> {
        let seg = &self.config.segmenter;

        let args = Args {
            lang: seg.lang.clone(),
            config_variables: HashMap::new(),
            dpi: None,
            psm: Some(seg.psm),
            oem: Some(seg.oem),
        };

        let engine_image =
            rusty_tesseract::Image::from_dynamic_image(&DynamicImage::ImageLuma8(binary.clone()))
                .map_err(|e| SegmentationError::DetectionFailed(e.to_string()))?;

        let data = rusty_tesseract::image_to_data(&engine_image, &args)
            .map_err(|e| SegmentationError::DetectionFailed(e.to_string()))?;

        // The engine emits one record per layout level; only word-level
        // records carry text. Record order is preserved as-is.
        let boxes = data
            .data
            .iter()
            .filter(|record| has_alphanumeric(record.text.trim()))
            .map(|record| WordBox {
                text: record.text.trim().to_string(),
                left: record.left,
                top: record.top,
                width: record.width,
                height: record.height,
            })
            .collect();

        Ok(boxes)
    }
}

fn has_alphanumeric(text: &str) -> bool {
    text.chars().any(|c| c.is_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alphanumeric_filter() {
        assert!(has_alphanumeric("Hello"));
        assert!(has_alphanumeric("a."));
        assert!(has_alphanumeric("42"));
        assert!(!has_alphanumeric(""));
        assert!(!has_alphanumeric("---"));
        assert!(!has_alphanumeric("!?."));
    }

    #[test]
    fn binarize_produces_same_dimensions() {
        let config = Arc::new(test_config());
        let segmenter = WordSegmenter::new(config);

        let img = DynamicImage::ImageLuma8(GrayImage::from_fn(64, 32, |x, _| {
            // Vertical dark stroke on a light background
            if (30..34).contains(&x) {
                image::Luma([20])
            } else {
                image::Luma([230])
            }
        }));

        let binary = segmenter.binarize(&img);
        assert_eq!(binary.dimensions(), (64, 32));
        // Binary output: every pixel is fully on or fully off
        assert!(binary.pixels().all(|p| p[0] == 0 || p[0] == 255));
    }

    #[test]
    fn binarize_inverts_strokes_to_white() {
        let config = Arc::new(test_config());
        let segmenter = WordSegmenter::new(config);

        let img = DynamicImage::ImageLuma8(GrayImage::from_fn(64, 64, |x, y| {
            if (28..36).contains(&x) && (28..36).contains(&y) {
                image::Luma([10])
            } else {
                image::Luma([240])
            }
        }));

        let binary = segmenter.binarize(&img);
        // The dark square becomes white in the inverted binary image
        assert_eq!(binary.get_pixel(32, 32)[0], 255);
    }

    fn test_config() -> Config {
        // Safe: the test does not touch the environment, so defaults apply
        Config::new().expect("default config is valid")
    }
}
