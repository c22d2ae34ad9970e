use imageproc::geometry::{arc_length, contour_area};
use imageproc::point::Point;
use serde::{Deserialize, Serialize};

use crate::recognition::features::ImageFeatures;

/// Axis-aligned bounding box in source image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// One recognized text region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedText {
    pub text: String,
    pub confidence: f32,
    pub bbox: Option<BoundingBox>,
}

impl ExtractedText {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
            bbox: None,
        }
    }

    pub fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = Some(bbox);
        self
    }
}

/// Closed outer border traced from an edge map
#[derive(Debug, Clone)]
pub struct Contour {
    pub points: Vec<Point<i32>>,
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

impl Contour {
    pub fn from_points(points: Vec<Point<i32>>) -> Option<Self> {
        let first = *points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Self {
            points,
            min_x,
            min_y,
            max_x,
            max_y,
        })
    }

    pub fn width(&self) -> u32 {
        (self.max_x - self.min_x + 1) as u32
    }

    pub fn height(&self) -> u32 {
        (self.max_y - self.min_y + 1) as u32
    }

    /// Enclosed polygon area
    pub fn area(&self) -> f64 {
        contour_area(&self.points)
    }

    /// Length of the closed polyline through all points
    pub fn perimeter(&self) -> f64 {
        arc_length(&self.points, true)
    }

    /// Circularity = 4π × area / perimeter², 1.0 for a perfect circle
    pub fn circularity(&self) -> f64 {
        let perimeter = self.perimeter();
        if perimeter == 0.0 {
            return 0.0;
        }
        4.0 * std::f64::consts::PI * self.area() / (perimeter * perimeter)
    }

    pub fn aspect_ratio(&self) -> f32 {
        let h = self.height() as f32;
        if h == 0.0 {
            return 0.0;
        }
        self.width() as f32 / h
    }
}

/// Which signal produced an appliance verdict
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Evidence {
    Brand { brand: String },
    Keywords { keywords: Vec<String> },
    Features { features: ImageFeatures },
}

/// Gate decision states, in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    BrandDetected,
    KeywordAffirmed,
    KeywordDenied,
    FeatureFallback,
    /// Feature computation failed and the gate let the image through
    ErrorFallback,
}

/// Appliance vs non-appliance decision
#[derive(Debug, Clone, Serialize)]
pub struct ApplianceVerdict {
    pub state: GateState,
    pub is_appliance: bool,
    pub confidence: f32,
    pub reason: String,
    pub evidence: Option<Evidence>,
}

/// Terminal state of one classification call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Category decided from text and image features
    Classified,
    /// Category decided and a candidate product matched visually
    Matched,
    /// No brand in the photo, default category applied
    BrandUndetermined,
    NotAppliance,
    Unclassifiable,
    Unreadable,
    TimedOut,
    Failed,
}

pub const NOT_APPLIANCE: &str = "NOT_APPLIANCE";
pub const UNCLASSIFIABLE: &str = "UNCLASSIFIABLE";
pub const UNKNOWN_BRAND: &str = "unknown";
pub const NO_BRAND: &str = "n/a";

/// Final record returned for one photo
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationResult {
    pub success: bool,
    pub outcome: Outcome,
    pub category: String,
    pub brand: String,
    pub model: String,
    pub confidence: f32,
    pub message: String,
    pub extracted_texts: Vec<String>,
    pub similarity: Option<f32>,
    pub product_title: Option<String>,
    pub source: Option<String>,
    pub verdict: Option<ApplianceVerdict>,
    pub notes: Vec<String>,
}

impl ClassificationResult {
    /// A failed record with no category information
    pub fn failure(outcome: Outcome, message: impl Into<String>) -> Self {
        Self {
            success: false,
            outcome,
            category: String::new(),
            brand: String::new(),
            model: String::new(),
            confidence: 0.0,
            message: message.into(),
            extracted_texts: Vec::new(),
            similarity: None,
            product_title: None,
            source: None,
            verdict: None,
            notes: Vec::new(),
        }
    }
}

/// Product listing supplied by the candidate search collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateProduct {
    pub title: String,
    #[serde(default)]
    pub model: String,
    pub image_url: String,
    #[serde(default)]
    pub source: String,
}

/// Best visual match among the candidates
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub product: CandidateProduct,
    pub similarity: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(side: i32) -> Contour {
        Contour::from_points(vec![
            Point::new(0, 0),
            Point::new(side, 0),
            Point::new(side, side),
            Point::new(0, side),
        ])
        .unwrap()
    }

    #[test]
    fn square_geometry() {
        let c = square(10);
        assert_eq!(c.area(), 100.0);
        assert_eq!(c.perimeter(), 40.0);
        assert_eq!(c.width(), 11);
        assert_eq!(c.aspect_ratio(), 1.0);
        // π/4 for a square
        assert!((c.circularity() - std::f64::consts::FRAC_PI_4).abs() < 1e-9);
    }

    #[test]
    fn clockwise_and_counter_clockwise_agree() {
        let mut reversed = square(10).points;
        reversed.reverse();
        let c = Contour::from_points(reversed).unwrap();
        assert_eq!(c.area(), 100.0);
        assert_eq!(c.perimeter(), 40.0);
    }

    #[test]
    fn degenerate_contours_have_zero_area() {
        let line = Contour::from_points(vec![Point::new(0, 0), Point::new(5, 0)]).unwrap();
        assert_eq!(line.area(), 0.0);
        assert_eq!(line.circularity(), 0.0);
        assert!(Contour::from_points(vec![]).is_none());
    }

    #[test]
    fn candidate_deserializes_without_optional_fields() {
        let c: CandidateProduct =
            serde_json::from_str(r#"{"title":"LG 가습기","image_url":"a.png"}"#).unwrap();
        assert_eq!(c.model, "");
        assert_eq!(c.source, "");
    }
}
