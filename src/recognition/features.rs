use image::{DynamicImage, GrayImage};
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, warn};

use crate::config::FeatureConfig;
use crate::error::FeatureError;
use crate::models::Contour;
use crate::recognition::category::Category;
use crate::recognition::contours::{find_external_contours, largest_contour};
use crate::recognition::preprocessing::{self, HsvImage, HsvRange};

pub const WHITE: HsvRange = HsvRange::new([0, 0, 200], [180, 30, 255]);
pub const GRAY: HsvRange = HsvRange::new([0, 0, 50], [180, 50, 200]);
pub const BLACK: HsvRange = HsvRange::new([0, 0, 0], [180, 255, 50]);
pub const GREEN: HsvRange = HsvRange::new([40, 40, 40], [80, 255, 255]);
pub const BLUE: HsvRange = HsvRange::new([100, 40, 40], [130, 255, 255]);
pub const BROWN: HsvRange = HsvRange::new([10, 50, 50], [20, 255, 255]);
pub const ORANGE: HsvRange = HsvRange::new([5, 50, 50], [15, 255, 255]);
/// Saturated water-tank blue
pub const TANK_BLUE: HsvRange = HsvRange::new([100, 50, 50], [130, 255, 255]);

/// Fur tones: brown, gray, white, orange, black
pub const FUR: [HsvRange; 5] = [
    HsvRange::new([5, 20, 20], [30, 255, 255]),
    HsvRange::new([0, 0, 30], [180, 50, 200]),
    HsvRange::new([0, 0, 120], [180, 50, 255]),
    HsvRange::new([5, 50, 50], [20, 255, 255]),
    HsvRange::new([0, 0, 0], [180, 255, 80]),
];

/// Heuristic that contributed to a score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Shape,
    NeutralColor,
    SmoothSurface,
    NaturalColor,
    ComplexTexture,
    Roundness,
    OrganicColor,
    HighContrast,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ContourShape {
    pub area: f64,
    pub circularity: f64,
    pub aspect_ratio: f32,
}

impl From<&Contour> for ContourShape {
    fn from(c: &Contour) -> Self {
        Self {
            area: c.area(),
            circularity: c.circularity(),
            aspect_ratio: c.aspect_ratio(),
        }
    }
}

/// Raw image statistics the heuristics are evaluated on
#[derive(Debug, Clone, Default, Serialize)]
pub struct Measurements {
    pub width: u32,
    pub height: u32,
    pub largest_contour: Option<ContourShape>,
    #[serde(skip)]
    pub contours: Vec<ContourShape>,
    pub white_ratio: f32,
    pub gray_ratio: f32,
    pub black_ratio: f32,
    pub green_ratio: f32,
    pub blue_ratio: f32,
    pub brown_ratio: f32,
    pub orange_ratio: f32,
    pub fur_ratio: f32,
    pub tank_blue_ratio: f32,
    pub edge_density: f32,
    pub contrast: f32,
}

impl Measurements {
    pub fn pixel_count(&self) -> f64 {
        self.width as f64 * self.height as f64
    }

    pub fn neutral_ratio(&self) -> f32 {
        self.white_ratio + self.gray_ratio + self.black_ratio
    }

    pub fn natural_ratio(&self) -> f32 {
        self.green_ratio + self.blue_ratio + self.brown_ratio + self.orange_ratio
    }
}

/// Scored image statistics
#[derive(Debug, Clone, Serialize)]
pub struct ImageFeatures {
    pub appliance_score: f32,
    pub non_appliance_score: f32,
    pub signals: Vec<Signal>,
    /// Image-only bonus per category, in category declaration order
    pub category_scores: Vec<(Category, f32)>,
    pub measurements: Measurements,
}

impl ImageFeatures {
    pub fn category_score(&self, category: Category) -> f32 {
        self.category_scores
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, s)| *s)
            .unwrap_or(0.0)
    }
}

pub struct ImageFeatureAnalyzer {
    config: FeatureConfig,
}

impl ImageFeatureAnalyzer {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    pub fn analyze(&self, img: &DynamicImage) -> Result<ImageFeatures, FeatureError> {
        self.analyze_with_stages(img).map(|(features, _)| features)
    }

    /// Score `img` and hand back the intermediate buffers it was measured on.
    ///
    /// A panic inside the image operations (for example a blur sigma the
    /// filter rejects) is caught and reported as [`FeatureError::Aborted`].
    pub fn analyze_with_stages(
        &self,
        img: &DynamicImage,
    ) -> Result<(ImageFeatures, StageImages), FeatureError> {
        let measured = panic::catch_unwind(AssertUnwindSafe(|| self.measure_stages(img)))
            .map_err(|payload| {
                let reason = panic_message(payload.as_ref());
                warn!(reason = %reason, "feature analysis panicked");
                FeatureError::Aborted(reason)
            })?;
        let (measurements, stages) = measured?;

        let features = score(measurements, &self.config);
        debug!(
            appliance = features.appliance_score,
            non_appliance = features.non_appliance_score,
            signals = ?features.signals,
            "image features scored"
        );
        Ok((features, stages))
    }

    pub fn measure(&self, img: &DynamicImage) -> Result<Measurements, FeatureError> {
        self.measure_stages(img).map(|(m, _)| m)
    }

    fn measure_stages(
        &self,
        img: &DynamicImage,
    ) -> Result<(Measurements, StageImages), FeatureError> {
        let (width, height) = (img.width(), img.height());
        if width == 0 || height == 0 {
            return Err(FeatureError::EmptyImage { width, height });
        }

        let gray = preprocessing::to_grayscale(img);
        let edges =
            preprocessing::detect_edges(&gray, self.config.canny_low, self.config.canny_high);
        let contours = find_external_contours(&edges);
        let hsv = HsvImage::from_rgb(&img.to_rgb8());
        let blurred = preprocessing::apply_blur(&gray, self.config.contrast_blur_sigma);

        let measurements = Measurements {
            width,
            height,
            largest_contour: largest_contour(&contours).map(ContourShape::from),
            contours: contours.iter().map(ContourShape::from).collect(),
            white_ratio: hsv.ratio(&WHITE),
            gray_ratio: hsv.ratio(&GRAY),
            black_ratio: hsv.ratio(&BLACK),
            green_ratio: hsv.ratio(&GREEN),
            blue_ratio: hsv.ratio(&BLUE),
            brown_ratio: hsv.ratio(&BROWN),
            orange_ratio: hsv.ratio(&ORANGE),
            fur_ratio: FUR.iter().map(|r| hsv.ratio(r)).sum(),
            tank_blue_ratio: hsv.ratio(&TANK_BLUE),
            edge_density: preprocessing::edge_density(&edges),
            contrast: preprocessing::gray_stats(&blurred).stddev,
        };
        Ok((measurements, StageImages { gray, edges, hsv }))
    }
}

/// Buffers computed while measuring, kept for the debug dump
pub struct StageImages {
    pub gray: GrayImage,
    pub edges: GrayImage,
    pub hsv: HsvImage,
}

impl StageImages {
    /// Debug images in stage order
    pub fn into_debug_images(self) -> Vec<(&'static str, DynamicImage)> {
        let neutral = self.hsv.mask_any(&[WHITE, GRAY, BLACK]);
        let natural = self.hsv.mask_any(&[GREEN, BLUE, BROWN, ORANGE]);
        vec![
            ("grayscale", DynamicImage::ImageLuma8(self.gray)),
            ("edges", DynamicImage::ImageLuma8(self.edges)),
            ("neutral_mask", DynamicImage::ImageLuma8(neutral)),
            ("natural_mask", DynamicImage::ImageLuma8(natural)),
        ]
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Evaluate the appliance / non-appliance heuristics on measured statistics
pub fn score(m: Measurements, cfg: &FeatureConfig) -> ImageFeatures {
    let pixels = m.pixel_count();
    let mut appliance = 0.0f32;
    let mut non_appliance = 0.0f32;
    let mut signals = Vec::new();

    if let Some(largest) = m.largest_contour {
        if largest.area > pixels * cfg.shape_min_area_fraction as f64
            && (cfg.shape_min_aspect..=cfg.shape_max_aspect).contains(&largest.aspect_ratio)
        {
            appliance += cfg.shape_bonus;
            signals.push(Signal::Shape);
        }
    }

    if m.neutral_ratio() > cfg.neutral_min_ratio {
        appliance += cfg.neutral_bonus;
        signals.push(Signal::NeutralColor);
    }

    if m.edge_density < cfg.smooth_max_edge_density {
        appliance += cfg.smooth_bonus;
        signals.push(Signal::SmoothSurface);
    }

    if m.natural_ratio() > cfg.natural_min_ratio {
        non_appliance += cfg.natural_bonus;
        signals.push(Signal::NaturalColor);
    }

    if m.edge_density > cfg.complex_min_edge_density {
        non_appliance += cfg.complex_bonus;
        signals.push(Signal::ComplexTexture);
    }

    let round = m.contours.iter().any(|c| {
        c.area > pixels * cfg.round_min_area_fraction as f64
            && c.circularity > cfg.round_min_circularity as f64
    });
    if round {
        non_appliance += cfg.round_bonus;
        signals.push(Signal::Roundness);
    }

    if m.fur_ratio > cfg.organic_min_ratio {
        non_appliance += cfg.organic_bonus;
        signals.push(Signal::OrganicColor);
    }

    if m.contrast > cfg.contrast_min_stddev {
        non_appliance += cfg.contrast_bonus;
        signals.push(Signal::HighContrast);
    }

    let category_scores = Category::ALL
        .iter()
        .map(|c| (*c, c.image_bonus(&m, cfg)))
        .collect();

    ImageFeatures {
        appliance_score: appliance.clamp(0.0, 1.0),
        non_appliance_score: non_appliance.clamp(0.0, 1.0),
        signals,
        category_scores,
        measurements: m,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn neutral_smooth() -> Measurements {
        Measurements {
            width: 100,
            height: 100,
            largest_contour: Some(ContourShape {
                area: 4000.0,
                circularity: 0.5,
                aspect_ratio: 1.0,
            }),
            contours: vec![ContourShape {
                area: 4000.0,
                circularity: 0.5,
                aspect_ratio: 1.0,
            }],
            white_ratio: 0.5,
            edge_density: 0.05,
            ..Default::default()
        }
    }

    #[test]
    fn neutral_smooth_box_scores_as_appliance() {
        let features = score(neutral_smooth(), &FeatureConfig::default());
        assert!((features.appliance_score - 0.9).abs() < 1e-6);
        assert_eq!(features.non_appliance_score, 0.0);
        assert_eq!(
            features.signals,
            vec![Signal::Shape, Signal::NeutralColor, Signal::SmoothSurface]
        );
    }

    #[test]
    fn natural_textured_round_scene_scores_as_non_appliance() {
        let m = Measurements {
            width: 100,
            height: 100,
            contours: vec![
                ContourShape { area: 200.0, circularity: 0.9, aspect_ratio: 1.0 },
                ContourShape { area: 500.0, circularity: 0.8, aspect_ratio: 1.0 },
                ContourShape { area: 600.0, circularity: 0.7, aspect_ratio: 1.0 },
            ],
            green_ratio: 0.2,
            brown_ratio: 0.1,
            fur_ratio: 0.3,
            edge_density: 0.2,
            contrast: 45.0,
            ..Default::default()
        };
        let features = score(m, &FeatureConfig::default());
        assert_eq!(features.appliance_score, 0.0);
        // 0.4 + 0.4 + 0.3 + 0.6 + 0.3, clamped
        assert_eq!(features.non_appliance_score, 1.0);
        assert_eq!(
            features.signals,
            vec![
                Signal::NaturalColor,
                Signal::ComplexTexture,
                Signal::Roundness,
                Signal::OrganicColor,
                Signal::HighContrast,
            ]
        );
    }

    #[test]
    fn small_round_contours_are_ignored() {
        let m = Measurements {
            width: 100,
            height: 100,
            contours: vec![ContourShape { area: 250.0, circularity: 0.95, aspect_ratio: 1.0 }],
            edge_density: 0.11,
            ..Default::default()
        };
        let features = score(m, &FeatureConfig::default());
        assert!(!features.signals.contains(&Signal::Roundness));
        assert!(features.signals.is_empty());
    }

    #[test]
    fn elongated_largest_contour_earns_no_shape_bonus() {
        let mut m = neutral_smooth();
        m.largest_contour = Some(ContourShape { area: 4000.0, circularity: 0.2, aspect_ratio: 3.0 });
        let features = score(m, &FeatureConfig::default());
        assert!(!features.signals.contains(&Signal::Shape));
    }

    #[test]
    fn thresholds_come_from_config() {
        let mut cfg = FeatureConfig::default();
        cfg.neutral_min_ratio = 0.6;
        let features = score(neutral_smooth(), &cfg);
        assert!(!features.signals.contains(&Signal::NeutralColor));
    }

    #[test]
    fn measures_solid_white_image() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 48, Rgb([255, 255, 255])));
        let analyzer = ImageFeatureAnalyzer::new(FeatureConfig::default());
        let m = analyzer.measure(&img).unwrap();
        assert_eq!(m.white_ratio, 1.0);
        assert_eq!(m.edge_density, 0.0);
        assert!(m.contrast < 1.0);
        assert!(m.largest_contour.is_none());

        let features = score(m, analyzer.config());
        assert!(features.signals.contains(&Signal::NeutralColor));
        assert!(features.signals.contains(&Signal::SmoothSurface));
        // white also reads as light fur
        assert!(features.signals.contains(&Signal::OrganicColor));
    }

    #[test]
    fn empty_image_is_an_error() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
        let analyzer = ImageFeatureAnalyzer::new(FeatureConfig::default());
        assert!(matches!(
            analyzer.analyze(&img),
            Err(FeatureError::EmptyImage { .. })
        ));
    }

    #[test]
    fn filter_panic_becomes_an_error() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb([200, 200, 200])));
        let cfg = FeatureConfig {
            contrast_blur_sigma: 0.0,
            ..FeatureConfig::default()
        };
        let err = ImageFeatureAnalyzer::new(cfg).analyze(&img).unwrap_err();
        assert!(matches!(err, FeatureError::Aborted(ref msg) if msg.contains("sigma")));
    }

    #[test]
    fn stages_carry_combined_color_masks() {
        // left half white, right half green
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(20, 10, |x, _| {
            if x < 10 { Rgb([255, 255, 255]) } else { Rgb([0, 200, 0]) }
        }));
        let analyzer = ImageFeatureAnalyzer::new(FeatureConfig::default());
        let (features, stages) = analyzer.analyze_with_stages(&img).unwrap();
        assert_eq!(features.measurements.width, 20);

        let images = stages.into_debug_images();
        let names: Vec<_> = images.iter().map(|(name, _)| *name).collect();
        assert_eq!(names, vec!["grayscale", "edges", "neutral_mask", "natural_mask"]);

        let neutral = images[2].1.to_luma8();
        let natural = images[3].1.to_luma8();
        assert_eq!(neutral.get_pixel(2, 5)[0], 255);
        assert_eq!(neutral.get_pixel(17, 5)[0], 0);
        assert_eq!(natural.get_pixel(2, 5)[0], 0);
        assert_eq!(natural.get_pixel(17, 5)[0], 255);
    }

    #[test]
    fn blue_image_favors_humidifier() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 40, Rgb([0, 0, 255])));
        let analyzer = ImageFeatureAnalyzer::new(FeatureConfig::default());
        let features = analyzer.analyze(&img).unwrap();
        assert_eq!(features.category_score(Category::Humidifier), 2.0);
        assert_eq!(features.category_score(Category::AirFryer), 0.0);
    }
}
