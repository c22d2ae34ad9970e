//! PaddleOCR models run through oar-ocr. Unlike the stock ocrs models these
//! read Hangul, so Korean brand names and keywords reach the lexicon.

use image::DynamicImage;
use oar_ocr::oarocr::{OAROCR, OAROCRBuilder};
use std::path::Path;

use crate::models::ExtractedText;
use crate::recognition::ocr::{TextRecognizer, require_model_files};

pub const DETECTION_MODEL: &str = "text-detection.onnx";
pub const RECOGNITION_MODEL: &str = "text-recognition.onnx";
pub const DICTIONARY: &str = "dictionary.txt";

pub struct OarRecognizer {
    ocr: OAROCR,
}

impl OarRecognizer {
    pub fn load(model_dir: &Path) -> anyhow::Result<Self> {
        let [detection, recognition, dictionary] =
            require_model_files(model_dir, [DETECTION_MODEL, RECOGNITION_MODEL, DICTIONARY])?;
        let ocr = OAROCRBuilder::new(detection, recognition, dictionary).build()?;
        Ok(Self { ocr })
    }
}

impl TextRecognizer for OarRecognizer {
    fn recognize(&self, img: &DynamicImage) -> anyhow::Result<Vec<ExtractedText>> {
        let results = self.ocr.predict(vec![img.to_rgb8()])?;
        Ok(results
            .into_iter()
            .flat_map(|result| result.text_regions)
            .filter_map(|region| {
                let text = region.text?;
                Some(ExtractedText::new(
                    text.to_string(),
                    region.confidence.unwrap_or(0.0),
                ))
            })
            .collect())
    }

    fn name(&self) -> &str {
        "oar-ocr"
    }
}
