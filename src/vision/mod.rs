//! Vision Layer
//!
//! Recognition services the pipeline calls as black boxes: barcode
//! decoding, text-region detection, OCR and lexeme analysis of OCR text.
//! Each sits behind a trait so the pipeline can run against scripted
//! implementations in tests.

pub mod analysis;
pub mod barcode;
pub mod detection;
pub mod ocr;
pub mod ocr_preprocess;

use image::DynamicImage;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::SampleResult;
use crate::sample::TextArea;

pub use analysis::HttpLexemeService;
pub use barcode::ZbarDecoder;
pub use detection::ContourTextDetector;
pub use ocr::TesseractCli;

/// Reads barcode/QR payloads from an image
pub trait BarcodeDecoder: Send + Sync {
    /// Non-empty payload strings; no codes is an empty list, not an error
    fn decode(&self, image: &DynamicImage) -> SampleResult<Vec<String>>;
}

/// Locates text on a label image
pub trait TextRegionDetector: Send + Sync {
    fn detect(&self, image: &DynamicImage) -> SampleResult<Vec<TextArea>>;
}

/// Turns an image (or a crop of one) into text
pub trait OcrEngine: Send + Sync {
    /// Recognized text; a timeout yields an empty string
    fn recognize(&self, image: &DynamicImage) -> SampleResult<String>;
}

/// Maps OCR text to (field, value) pairs
pub trait LexemeAnalyzer: Send + Sync {
    /// Best effort: any failure yields an empty list
    fn analyze(&self, text: &str) -> Vec<(String, String)>;
}

/// The recognition services one pipeline run uses
#[derive(Clone)]
pub struct Collaborators {
    pub decoder: Arc<dyn BarcodeDecoder>,
    pub detector: Arc<dyn TextRegionDetector>,
    pub ocr: Arc<dyn OcrEngine>,
    pub analyzer: Option<Arc<dyn LexemeAnalyzer>>,
}

impl Collaborators {
    /// External tools and services as configured
    pub fn from_config(config: &AppConfig) -> Self {
        let analyzer = match (&config.analysis.endpoint, config.postprocessor.ocr_analysis) {
            (Some(endpoint), true) => match HttpLexemeService::new(endpoint, config.analysis.timeout_secs) {
                Ok(service) => Some(Arc::new(service) as Arc<dyn LexemeAnalyzer>),
                Err(e) => {
                    tracing::warn!("Lexeme analysis disabled: {:#}", e);
                    None
                }
            },
            _ => None,
        };

        Self {
            decoder: Arc::new(ZbarDecoder::new(&config.barcodes.zbar_command)),
            detector: Arc::new(ContourTextDetector::new(config.ocr.max_text_areas)),
            ocr: Arc::new(TesseractCli::from_config(&config.ocr)),
            analyzer,
        }
    }
}
