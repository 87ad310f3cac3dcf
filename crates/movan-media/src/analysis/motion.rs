//! Frame-difference motion estimation.
//!
//! Each frame is reduced to one channel, differenced against its predecessor
//! and thresholded. The result is kept per pixel (for the heatmap) and pooled
//! into a [`BLOCK_GRID`] x [`BLOCK_GRID`] block field (for zones).

use image::{imageops, GrayImage, RgbImage};

use super::config::{AnalysisConfig, Preprocess, BLOCK_GRID};
use crate::error::{MediaError, MediaResult};

/// Motion between one frame and its predecessor.
#[derive(Debug, Clone)]
pub struct MotionField {
    pub width: u32,
    pub height: u32,
    /// Thresholded absolute difference per pixel, row-major
    pub pixels: Vec<u8>,
    /// Sum of `pixels` per block, row-major over the block grid
    pub blocks: Vec<f64>,
    /// Mean of `pixels` (0-255)
    pub intensity: f64,
    /// False for the first frame of a stream, whose field is all zero
    pub has_predecessor: bool,
}

impl MotionField {
    fn empty(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize],
            blocks: vec![0.0; BLOCK_GRID * BLOCK_GRID],
            intensity: 0.0,
            has_predecessor: false,
        }
    }

    /// Block value at grid column `bx`, row `by`.
    pub fn block(&self, bx: usize, by: usize) -> f64 {
        self.blocks[by * BLOCK_GRID + bx]
    }
}

/// Stateful estimator; holds the previous preprocessed frame.
pub struct MotionEstimator {
    preprocess: Preprocess,
    blur_sigma: f32,
    noise_threshold: u8,
    prev: Option<GrayImage>,
}

impl MotionEstimator {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            preprocess: config.preprocess,
            blur_sigma: config.blur_sigma,
            noise_threshold: config.noise_threshold,
            prev: None,
        }
    }

    /// Estimate motion for the next frame of the stream.
    ///
    /// All frames of a stream must share the same dimensions.
    pub fn estimate(&mut self, frame: &RgbImage) -> MediaResult<MotionField> {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return Err(MediaError::decode("Empty frame"));
        }
        let current = self.prepare(frame);

        let field = match self.prev.as_ref() {
            None => MotionField::empty(width, height),
            Some(prev) if prev.dimensions() != (width, height) => {
                return Err(MediaError::decode(format!(
                    "Frame size changed mid-stream: {}x{} -> {}x{}",
                    prev.width(),
                    prev.height(),
                    width,
                    height
                )));
            }
            Some(prev) => difference(prev, &current, self.noise_threshold),
        };

        self.prev = Some(current);
        Ok(field)
    }

    fn prepare(&self, frame: &RgbImage) -> GrayImage {
        let gray = imageops::grayscale(frame);
        let reduced = match self.preprocess {
            Preprocess::Grayscale => gray,
            Preprocess::Sobel => sobel(&quantize(gray)),
        };
        if self.blur_sigma > 0.0 {
            imageops::blur(&reduced, self.blur_sigma)
        } else {
            reduced
        }
    }
}

fn difference(prev: &GrayImage, current: &GrayImage, threshold: u8) -> MotionField {
    let (width, height) = current.dimensions();
    let (w, h) = (width as usize, height as usize);
    let mut pixels = vec![0u8; w * h];
    let mut blocks = vec![0.0f64; BLOCK_GRID * BLOCK_GRID];
    let mut total: u64 = 0;

    let prev_raw = prev.as_raw();
    let cur_raw = current.as_raw();

    for y in 0..h {
        let by = y * BLOCK_GRID / h;
        for x in 0..w {
            let i = y * w + x;
            let d = prev_raw[i].abs_diff(cur_raw[i]);
            if d < threshold {
                continue;
            }
            pixels[i] = d;
            total += d as u64;
            blocks[by * BLOCK_GRID + x * BLOCK_GRID / w] += d as f64;
        }
    }

    MotionField {
        width,
        height,
        pixels,
        blocks,
        intensity: total as f64 / (w * h) as f64,
        has_predecessor: true,
    }
}

/// Keep the top 4 bits of each sample.
fn quantize(mut image: GrayImage) -> GrayImage {
    for p in image.pixels_mut() {
        p.0[0] &= 0xF0;
    }
    image
}

/// 3x3 Sobel gradient magnitude, edges clamped, saturated to 255.
fn sobel(image: &GrayImage) -> GrayImage {
    let (width, height) = image.dimensions();
    let (w, h) = (width as i64, height as i64);
    let raw = image.as_raw();
    let at = |x: i64, y: i64| -> i32 {
        let x = x.clamp(0, w - 1);
        let y = y.clamp(0, h - 1);
        raw[(y * w + x) as usize] as i32
    };

    let mut out = GrayImage::new(width, height);
    for y in 0..h {
        for x in 0..w {
            let gx = at(x + 1, y - 1) + 2 * at(x + 1, y) + at(x + 1, y + 1)
                - at(x - 1, y - 1)
                - 2 * at(x - 1, y)
                - at(x - 1, y + 1);
            let gy = at(x - 1, y + 1) + 2 * at(x, y + 1) + at(x + 1, y + 1)
                - at(x - 1, y - 1)
                - 2 * at(x, y - 1)
                - at(x + 1, y - 1);
            let magnitude = ((gx * gx + gy * gy) as f64).sqrt().min(255.0);
            out.put_pixel(x as u32, y as u32, image::Luma([magnitude as u8]));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid(width: u32, height: u32, value: u8) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([value, value, value]))
    }

    #[test]
    fn test_first_frame_has_no_predecessor() {
        let mut estimator = MotionEstimator::new(&AnalysisConfig::default());
        let field = estimator.estimate(&solid(48, 48, 10)).unwrap();
        assert!(!field.has_predecessor);
        assert_eq!(field.intensity, 0.0);
        assert_eq!(field.blocks.len(), BLOCK_GRID * BLOCK_GRID);
    }

    #[test]
    fn test_identical_frames_are_still() {
        let mut estimator = MotionEstimator::new(&AnalysisConfig::default());
        estimator.estimate(&solid(48, 48, 90)).unwrap();
        let field = estimator.estimate(&solid(48, 48, 90)).unwrap();
        assert!(field.has_predecessor);
        assert_eq!(field.intensity, 0.0);
        assert!(field.blocks.iter().all(|b| *b == 0.0));
    }

    #[test]
    fn test_small_changes_are_noise() {
        let mut estimator = MotionEstimator::new(&AnalysisConfig::default());
        estimator.estimate(&solid(48, 48, 100)).unwrap();
        let field = estimator.estimate(&solid(48, 48, 120)).unwrap();
        assert_eq!(field.intensity, 0.0);
    }

    #[test]
    fn test_change_lands_in_its_block() {
        let mut estimator = MotionEstimator::new(&AnalysisConfig::default());
        estimator.estimate(&solid(48, 48, 0)).unwrap();

        // 48 / 24 = 2 pixels per block; light up block (0, 0) only
        let mut next = solid(48, 48, 0);
        for y in 0..2 {
            for x in 0..2 {
                next.put_pixel(x, y, Rgb([200, 200, 200]));
            }
        }
        let field = estimator.estimate(&next).unwrap();

        assert_eq!(field.block(0, 0), 800.0);
        assert_eq!(field.blocks.iter().sum::<f64>(), 800.0);
        assert!((field.intensity - 800.0 / (48.0 * 48.0)).abs() < 1e-9);
        assert_eq!(field.pixels[0], 200);
    }

    #[test]
    fn test_size_change_is_error() {
        let mut estimator = MotionEstimator::new(&AnalysisConfig::default());
        estimator.estimate(&solid(48, 48, 0)).unwrap();
        assert!(estimator.estimate(&solid(24, 24, 0)).is_err());
    }

    #[test]
    fn test_sobel_flat_image_has_no_edges() {
        let gray = quantize(imageops::grayscale(&solid(16, 16, 77)));
        assert!(sobel(&gray).pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn test_sobel_detects_vertical_edge() {
        let mut frame = solid(16, 16, 0);
        for y in 0..16 {
            for x in 8..16 {
                frame.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }
        let edges = sobel(&quantize(imageops::grayscale(&frame)));
        assert_eq!(edges.get_pixel(8, 8).0[0], 255);
        assert_eq!(edges.get_pixel(2, 8).0[0], 0);
    }

    #[test]
    fn test_quantize_drops_low_bits() {
        let gray = quantize(imageops::grayscale(&solid(2, 2, 0x3F)));
        assert!(gray.pixels().all(|p| p.0[0] == 0x30));
    }
}
