//! Pixel kernels: Laplacian sharpness, exposure/glare statistics and the
//! Sobel gradient field used by the subject heuristics.
//!
//! All kernels skip the one-pixel border.

use crate::frame::{luma_of, FrameSample, GrayFrame};

/// Variance of the 4-neighbour Laplacian (`4p - up - down - left - right`).
///
/// In-focus edges give large second derivatives of both signs; defocus
/// flattens them, so the variance drops as a frame blurs.
pub fn laplacian_variance(gray: &GrayFrame) -> f64 {
    let (w, h) = (gray.width as usize, gray.height as usize);
    if w < 3 || h < 3 {
        return 0.0;
    }
    let px = &gray.luma;

    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let mut count = 0u64;
    for y in 1..h - 1 {
        let row = y * w;
        for x in 1..w - 1 {
            let i = row + x;
            let v = 4 * px[i] as i32
                - px[i - 1] as i32
                - px[i + 1] as i32
                - px[i - w] as i32
                - px[i + w] as i32;
            let v = v as f64;
            sum += v;
            sum_sq += v * v;
            count += 1;
        }
    }

    if count == 0 {
        return 0.0;
    }
    let mean = sum / count as f64;
    (sum_sq / count as f64 - mean * mean).max(0.0)
}

/// Whole-frame luma statistics and near-saturation share.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExposureStats {
    pub mean: f64,
    pub variance: f64,
    pub glare_fraction: f64,
}

impl ExposureStats {
    /// Single pass over the RGB frame. A pixel is glare when all three
    /// channels exceed `glare_threshold`.
    pub fn measure(frame: &FrameSample, glare_threshold: u8) -> Self {
        let mut sum = 0.0f64;
        let mut sum_sq = 0.0f64;
        let mut whites = 0u64;
        let mut n = 0u64;

        for px in frame.as_raw().chunks_exact(3) {
            let (r, g, b) = (px[0], px[1], px[2]);
            if r > glare_threshold && g > glare_threshold && b > glare_threshold {
                whites += 1;
            }
            let luma = luma_of(r, g, b);
            sum += luma;
            sum_sq += luma * luma;
            n += 1;
        }

        let n = n.max(1) as f64;
        let mean = sum / n;
        Self {
            mean,
            variance: (sum_sq / n - mean * mean).max(0.0),
            glare_fraction: whites as f64 / n,
        }
    }
}

/// Sobel gradient magnitude at every interior pixel.
#[derive(Debug, Clone)]
pub struct GradientField {
    width: u32,
    height: u32,
    magnitudes: Vec<f32>,
    total: f64,
}

impl GradientField {
    pub fn sobel(gray: &GrayFrame) -> Self {
        let (w, h) = (gray.width as usize, gray.height as usize);
        let mut magnitudes = vec![0.0f32; w * h];
        let mut total = 0.0f64;

        if w >= 3 && h >= 3 {
            let p = |i: usize| gray.luma[i] as f32;
            for y in 1..h - 1 {
                for x in 1..w - 1 {
                    let i = y * w + x;
                    let gx = -p(i - w - 1) - 2.0 * p(i - 1) - p(i + w - 1)
                        + p(i - w + 1)
                        + 2.0 * p(i + 1)
                        + p(i + w + 1);
                    let gy = p(i - w - 1) + 2.0 * p(i - w) + p(i - w + 1)
                        - p(i + w - 1)
                        - 2.0 * p(i + w)
                        - p(i + w + 1);
                    let m = gx.hypot(gy);
                    magnitudes[i] = m;
                    total += m as f64;
                }
            }
        }

        Self {
            width: gray.width,
            height: gray.height,
            magnitudes,
            total,
        }
    }

    /// Total edge energy over the frame.
    pub fn total(&self) -> f64 {
        self.total
    }

    /// Share of total edge energy at interior pixels selected by `inside`.
    ///
    /// Returns 0 for an essentially edgeless frame.
    pub fn share_where<F>(&self, inside: F) -> f64
    where
        F: Fn(u32, u32) -> bool,
    {
        if self.total <= 1.0 || self.width < 3 || self.height < 3 {
            return 0.0;
        }
        let mut acc = 0.0f64;
        for y in 1..self.height - 1 {
            for x in 1..self.width - 1 {
                if inside(x, y) {
                    acc += self.magnitudes[(y * self.width + x) as usize] as f64;
                }
            }
        }
        acc / self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{imageops, Rgb, RgbImage};

    fn gray(img: RgbImage) -> GrayFrame {
        FrameSample::new(img).unwrap().to_gray()
    }

    fn checkerboard(size: u32, cell: u32) -> RgbImage {
        RgbImage::from_fn(size, size, |x, y| {
            if ((x / cell) + (y / cell)) % 2 == 0 {
                Rgb([40, 40, 40])
            } else {
                Rgb([210, 210, 210])
            }
        })
    }

    #[test]
    fn test_flat_frame_has_no_sharpness() {
        let flat = gray(RgbImage::from_pixel(32, 32, Rgb([128, 128, 128])));
        assert_eq!(laplacian_variance(&flat), 0.0);
    }

    #[test]
    fn test_blur_lowers_sharpness() {
        let crisp = checkerboard(64, 4);
        let blurred = imageops::blur(&crisp, 2.0);
        let a = laplacian_variance(&gray(crisp));
        let b = laplacian_variance(&gray(blurred));
        assert!(b < a, "blurred {b} should be below crisp {a}");
    }

    #[test]
    fn test_exposure_stats_uniform() {
        let frame = FrameSample::new(RgbImage::from_pixel(10, 10, Rgb([128, 128, 128]))).unwrap();
        let stats = ExposureStats::measure(&frame, 245);
        assert!((stats.mean - 128.0).abs() < 1e-6);
        assert!(stats.variance < 1e-6);
        assert_eq!(stats.glare_fraction, 0.0);
    }

    #[test]
    fn test_glare_counts_only_saturated_triples() {
        let img = RgbImage::from_fn(10, 10, |x, _| match x {
            0 => Rgb([255, 255, 255]),
            1 => Rgb([255, 255, 100]),
            _ => Rgb([90, 90, 90]),
        });
        let stats = ExposureStats::measure(&FrameSample::new(img).unwrap(), 245);
        assert!((stats.glare_fraction - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_gradient_share_of_vertical_edge() {
        let img = RgbImage::from_fn(20, 20, |x, _| {
            if x < 10 {
                Rgb([0, 0, 0])
            } else {
                Rgb([200, 200, 200])
            }
        });
        let field = GradientField::sobel(&gray(img));
        assert!(field.total() > 1.0);
        assert!((field.share_where(|x, _| x == 9 || x == 10) - 1.0).abs() < 1e-9);
        assert_eq!(field.share_where(|x, _| x < 5), 0.0);
    }

    #[test]
    fn test_edgeless_share_is_zero() {
        let field = GradientField::sobel(&gray(RgbImage::from_pixel(8, 8, Rgb([5, 5, 5]))));
        assert_eq!(field.share_where(|_, _| true), 0.0);
    }
}
