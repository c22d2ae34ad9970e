use image::{DynamicImage, GrayImage, Luma, RgbImage};
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;

/// Convert image to grayscale
pub fn to_grayscale(img: &DynamicImage) -> GrayImage {
    img.to_luma8()
}

/// Apply Gaussian blur to reduce noise
pub fn apply_blur(img: &GrayImage, sigma: f32) -> GrayImage {
    gaussian_blur_f32(img, sigma)
}

/// Detect edges using Canny edge detector
pub fn detect_edges(img: &GrayImage, low_threshold: f32, high_threshold: f32) -> GrayImage {
    canny(img, low_threshold, high_threshold)
}

/// Fraction of non-zero pixels in an edge map
pub fn edge_density(edges: &GrayImage) -> f32 {
    let total = edges.width() as usize * edges.height() as usize;
    if total == 0 {
        return 0.0;
    }
    let on = edges.pixels().filter(|p| p[0] > 0).count();
    on as f32 / total as f32
}

/// Population mean, standard deviation and variance of a grayscale image
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct GrayStats {
    pub mean: f32,
    pub stddev: f32,
    pub variance: f32,
}

pub fn gray_stats(img: &GrayImage) -> GrayStats {
    let total = img.width() as f64 * img.height() as f64;
    if total == 0.0 {
        return GrayStats {
            mean: 0.0,
            stddev: 0.0,
            variance: 0.0,
        };
    }
    let mut sum = 0f64;
    let mut sum_sq = 0f64;
    for p in img.pixels() {
        let v = p[0] as f64;
        sum += v;
        sum_sq += v * v;
    }
    let mean = sum / total;
    let variance = (sum_sq / total - mean * mean).max(0.0);
    GrayStats {
        mean: mean as f32,
        stddev: variance.sqrt() as f32,
        variance: variance as f32,
    }
}

/// 8-bit HSV with hue in [0, 180) and saturation/value in [0, 255]
#[derive(Debug, Clone)]
pub struct HsvImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<[u8; 3]>,
}

impl HsvImage {
    pub fn from_rgb(rgb: &RgbImage) -> Self {
        Self {
            width: rgb.width(),
            height: rgb.height(),
            pixels: rgb.pixels().map(|p| rgb_to_hsv(p.0)).collect(),
        }
    }

    /// Fraction of pixels inside `range`
    pub fn ratio(&self, range: &HsvRange) -> f32 {
        if self.pixels.is_empty() {
            return 0.0;
        }
        let hits = self.pixels.iter().filter(|p| range.contains(p)).count();
        hits as f32 / self.pixels.len() as f32
    }

    /// Binary mask (255 inside `range`)
    pub fn mask(&self, range: &HsvRange) -> GrayImage {
        self.mask_any(std::slice::from_ref(range))
    }

    /// Union of several ranges, white where any of them matches
    pub fn mask_any(&self, ranges: &[HsvRange]) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            let idx = (y * self.width + x) as usize;
            if ranges.iter().any(|r| r.contains(&self.pixels[idx])) {
                Luma([255u8])
            } else {
                Luma([0u8])
            }
        })
    }
}

pub fn rgb_to_hsv([r, g, b]: [u8; 3]) -> [u8; 3] {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    let v = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = v - min;

    let s = if v > 0.0 { delta * 255.0 / v } else { 0.0 };

    let mut h = if delta == 0.0 {
        0.0
    } else if v == r {
        60.0 * (g - b) / delta
    } else if v == g {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    if h < 0.0 {
        h += 360.0;
    }
    let h = (h / 2.0).round();
    let h = if h >= 180.0 { 0.0 } else { h };

    [h as u8, s.round() as u8, v as u8]
}

/// Inclusive HSV box, like a cv::inRange call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HsvRange {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl HsvRange {
    pub const fn new(lower: [u8; 3], upper: [u8; 3]) -> Self {
        Self { lower, upper }
    }

    pub fn contains(&self, p: &[u8; 3]) -> bool {
        (0..3).all(|i| p[i] >= self.lower[i] && p[i] <= self.upper[i])
    }
}
