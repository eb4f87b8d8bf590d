//! Bounding-box cropping of rendered melody images.
//!
//! Source renders carry a header and footer at fixed positions and a variable
//! amount of whitespace to the right of the music. The cropper removes the
//! fixed bands, then finds the ink on what remains and keeps only the rows
//! that contain it, plus everything from the left edge to a padded right
//! boundary.

use crate::error::{Error, Result};
use image::{imageops, DynamicImage, GrayImage, ImageFormat, ImageReader, Luma};
use imageproc::contrast::{threshold, ThresholdType};
use imageproc::morphology::{grayscale_dilate, grayscale_erode, Mask};
use std::path::Path;

/// Foreground value in binary masks.
const INK: u8 = 255;

/// Tunable constants for the crop heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropConfig {
    /// Rows removed from the top before searching for ink.
    pub top_margin: u32,
    /// Rows removed from the bottom before searching for ink.
    pub bottom_margin: u32,
    /// Gray levels strictly below this value count as ink.
    pub threshold: u8,
    /// Columns kept to the right of the rightmost ink.
    pub right_padding: u32,
}

impl Default for CropConfig {
    fn default() -> Self {
        Self {
            top_margin: 40,
            bottom_margin: 70,
            threshold: 128,
            right_padding: 100,
        }
    }
}

impl CropConfig {
    /// Create a config with the default margins for hymnal renders.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the top and bottom bands removed before ink detection.
    pub fn with_margins(mut self, top: u32, bottom: u32) -> Self {
        self.top_margin = top;
        self.bottom_margin = bottom;
        self
    }

    /// Set the ink threshold.
    pub fn with_threshold(mut self, threshold: u8) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the padding added past the rightmost ink.
    pub fn with_right_padding(mut self, padding: u32) -> Self {
        self.right_padding = padding;
        self
    }
}

/// A crop rectangle in the coordinates of the original image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Result of cropping one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropOutcome {
    /// The file was rewritten with this rectangle.
    Cropped(CropRect),
    /// No ink was found; the file was left untouched.
    Blank,
}

/// Crop the image at `path` in place.
///
/// The image keeps its on-disk format. Blank images (no ink after the
/// fixed bands are removed) are not modified.
pub fn crop_image(path: &Path, config: &CropConfig) -> Result<CropOutcome> {
    let reader = ImageReader::open(path)?.with_guessed_format()?;
    let format = reader
        .format()
        .ok_or_else(|| Error::ImageError(format!("Unrecognized image: {}", path.display())))?;
    let img = reader.decode()?;

    let Some(rect) = compute_crop(&img, config) else {
        log::warn!("No content found in {}, leaving it as is", path.display());
        return Ok(CropOutcome::Blank);
    };

    log::debug!(
        "Cropping {} from {}x{} to {}x{} at y={}",
        path.display(),
        img.width(),
        img.height(),
        rect.width,
        rect.height,
        rect.y
    );

    let cropped = img.crop_imm(rect.x, rect.y, rect.width, rect.height);
    let cropped = match format {
        // JPEG has no alpha channel
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(cropped.to_rgb8()),
        _ => cropped,
    };
    cropped.save_with_format(path, format)?;

    Ok(CropOutcome::Cropped(rect))
}

/// Compute the crop rectangle for an image, or `None` when it holds no ink.
pub fn compute_crop(img: &DynamicImage, config: &CropConfig) -> Option<CropRect> {
    let (width, height) = (img.width(), img.height());
    let band_top = config.top_margin;
    let band_height = height
        .checked_sub(config.top_margin)?
        .checked_sub(config.bottom_margin)?;
    if band_height == 0 || width == 0 {
        return None;
    }

    let band = img.crop_imm(0, band_top, width, band_height).to_luma8();
    let mask = ink_mask(&band, config.threshold);
    let (x, y, w, h) = bounding_box(&mask)?;

    let right = (x + w).saturating_add(config.right_padding).min(width);

    Some(CropRect {
        x: 0,
        y: band_top + y,
        width: right,
        height: h,
    })
}

/// Binarize a grayscale image (ink = 255) and remove single-pixel noise.
pub fn ink_mask(gray: &GrayImage, level: u8) -> GrayImage {
    if level == 0 {
        return GrayImage::new(gray.width(), gray.height());
    }
    // BinaryInverted maps values <= the cutoff to 255
    let binary = threshold(gray, level - 1, ThresholdType::BinaryInverted);
    open_2x2(&binary)
}

/// Morphological opening with a 2x2 square element.
///
/// Keeps exactly the union of 2x2 squares that lie entirely in the
/// foreground, so the result is always a subset of the input. The erosion
/// anchors the square at its top-left pixel and the dilation at its
/// bottom-right one, so surviving strokes stay where they were. Pixels
/// outside the image count as background.
pub fn open_2x2(mask: &GrayImage) -> GrayImage {
    let (w, h) = mask.dimensions();
    let square = GrayImage::from_pixel(2, 2, Luma([INK]));

    let mut padded = GrayImage::new(w + 2, h + 2);
    imageops::replace(&mut padded, mask, 1, 1);

    let eroded = grayscale_erode(&padded, &Mask::from_image(&square, 0, 0));
    let opened = grayscale_dilate(&eroded, &Mask::from_image(&square, 1, 1));
    imageops::crop_imm(&opened, 1, 1, w, h).to_image()
}

/// Axis-aligned bounding box `(x, y, width, height)` of all non-zero pixels.
pub fn bounding_box(mask: &GrayImage) -> Option<(u32, u32, u32, u32)> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;

    for (x, y, pixel) in mask.enumerate_pixels() {
        if pixel[0] == 0 {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((min_x, min_y, max_x, max_y)) => {
                (min_x.min(x), min_y.min(y), max_x.max(x), max_y.max(y))
            }
        });
    }

    bounds.map(|(min_x, min_y, max_x, max_y)| (min_x, min_y, max_x - min_x + 1, max_y - min_y + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    /// White canvas with black filled rectangles `(x, y, w, h)`.
    fn canvas(width: u32, height: u32, blocks: &[(u32, u32, u32, u32)]) -> DynamicImage {
        let mut img = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
        for &(bx, by, bw, bh) in blocks {
            for y in by..by + bh {
                for x in bx..bx + bw {
                    img.put_pixel(x, y, Rgb([0, 0, 0]));
                }
            }
        }
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_opening_removes_isolated_pixels() {
        let mut mask = GrayImage::new(10, 10);
        mask.put_pixel(2, 2, Luma([INK]));
        mask.put_pixel(7, 3, Luma([INK]));
        let opened = open_2x2(&mask);
        assert!(opened.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn test_opening_preserves_small_strokes() {
        let mut mask = GrayImage::new(10, 10);
        for (x, y) in [(4, 4), (5, 4), (4, 5), (5, 5)] {
            mask.put_pixel(x, y, Luma([INK]));
        }
        assert_eq!(open_2x2(&mask), mask);
    }

    #[test]
    fn test_opening_is_subset_of_input() {
        let mut mask = GrayImage::new(12, 8);
        for x in 1..9 {
            mask.put_pixel(x, 3, Luma([INK]));
        }
        for y in 2..6 {
            mask.put_pixel(5, y, Luma([INK]));
            mask.put_pixel(6, y, Luma([INK]));
        }
        let opened = open_2x2(&mask);
        for (x, y, p) in opened.enumerate_pixels() {
            if p[0] != 0 {
                assert_ne!(mask.get_pixel(x, y)[0], 0, "({x}, {y}) grew");
            }
        }
        assert_eq!(bounding_box(&opened), Some((5, 2, 2, 4)));
    }

    #[test]
    fn test_opening_at_image_border() {
        let mut mask = GrayImage::new(6, 5);
        // 2x2 block in the bottom-right corner survives
        for (x, y) in [(4, 3), (5, 3), (4, 4), (5, 4)] {
            mask.put_pixel(x, y, Luma([INK]));
        }
        // One pixel wide stroke along the left edge does not
        for y in 0..3 {
            mask.put_pixel(0, y, Luma([INK]));
        }
        // Nor does a one pixel tall stroke along the top edge
        for x in 2..6 {
            mask.put_pixel(x, 0, Luma([INK]));
        }

        let opened = open_2x2(&mask);
        assert_eq!(opened.dimensions(), (6, 5));
        assert_eq!(bounding_box(&opened), Some((4, 3, 2, 2)));
        assert_eq!(opened.pixels().filter(|p| p[0] == INK).count(), 4);
    }

    #[test]
    fn test_ink_mask_threshold_boundary() {
        let mut gray = GrayImage::from_pixel(4, 4, Luma([128]));
        let mask = ink_mask(&gray, 128);
        assert!(mask.pixels().all(|p| p[0] == 0));

        for p in gray.pixels_mut() {
            *p = Luma([127]);
        }
        let mask = ink_mask(&gray, 128);
        assert!(mask.pixels().all(|p| p[0] == INK));
    }

    #[test]
    fn test_bounding_box_empty() {
        assert_eq!(bounding_box(&GrayImage::new(5, 5)), None);
    }

    #[test]
    fn test_compute_crop_contains_content() {
        let config = CropConfig::default();
        let img = canvas(800, 600, &[(30, 100, 200, 50), (300, 300, 120, 40)]);
        let rect = compute_crop(&img, &config).unwrap();

        assert_eq!(rect.x, 0);
        assert_eq!(rect.y, 100);
        assert_eq!(rect.height, 240);
        assert_eq!(rect.width, 420 + 100);

        // Every ink pixel lies inside the rectangle
        assert!(rect.y <= 100 && rect.y + rect.height >= 340);
        assert!(rect.x <= 30 && rect.x + rect.width >= 420);
    }

    #[test]
    fn test_compute_crop_ignores_header_and_footer() {
        let config = CropConfig::default();
        // Header ink in the top 40 rows, footer ink in the bottom 70
        let img = canvas(500, 400, &[(0, 5, 500, 20), (0, 350, 500, 30), (50, 150, 100, 60)]);
        let rect = compute_crop(&img, &config).unwrap();
        assert_eq!(rect.y, 150);
        assert_eq!(rect.height, 60);
        assert_eq!(rect.width, 250);
    }

    #[test]
    fn test_compute_crop_padding_clamped_to_width() {
        let config = CropConfig::default();
        let img = canvas(300, 300, &[(100, 100, 180, 20)]);
        let rect = compute_crop(&img, &config).unwrap();
        assert_eq!(rect.width, 300);
    }

    #[test]
    fn test_compute_crop_blank() {
        let config = CropConfig::default();
        assert_eq!(compute_crop(&canvas(400, 300, &[]), &config), None);
        // Only noise pixels
        assert_eq!(compute_crop(&canvas(400, 300, &[(200, 150, 1, 1)]), &config), None);
        // Nothing left once the bands are removed
        assert_eq!(compute_crop(&canvas(400, 100, &[(0, 0, 400, 100)]), &config), None);
    }

    #[test]
    fn test_recrop_does_not_grow() {
        let config = CropConfig::default().with_margins(0, 0);
        let img = canvas(640, 480, &[(40, 60, 300, 200)]);

        let first = compute_crop(&img, &config).unwrap();
        let once = img.crop_imm(first.x, first.y, first.width, first.height);
        let second = compute_crop(&once, &config).unwrap();

        assert_eq!(second.y, 0);
        assert_eq!(second.height, first.height);
        assert!(second.width <= first.width);
        assert!(first.width - second.width <= config.right_padding);
    }

    #[test]
    fn test_crop_image_rewrites_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1.png");
        canvas(800, 600, &[(20, 120, 300, 80)]).save(&path).unwrap();

        let outcome = crop_image(&path, &CropConfig::default()).unwrap();
        assert_eq!(
            outcome,
            CropOutcome::Cropped(CropRect {
                x: 0,
                y: 120,
                width: 420,
                height: 80
            })
        );
        assert_eq!(image::image_dimensions(&path).unwrap(), (420, 80));
    }

    #[test]
    fn test_crop_image_blank_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2.png");
        canvas(320, 240, &[]).save(&path).unwrap();
        let before = std::fs::read(&path).unwrap();

        let outcome = crop_image(&path, &CropConfig::default()).unwrap();
        assert_eq!(outcome, CropOutcome::Blank);
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[test]
    fn test_crop_image_not_an_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("3.png");
        std::fs::write(&path, b"definitely not a picture").unwrap();
        assert!(crop_image(&path, &CropConfig::default()).is_err());
    }
}
