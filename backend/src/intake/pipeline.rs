use image::{ImageFormat, RgbImage};
use log::{debug, info};
use shared::AnalyzeResponse;
use std::sync::Arc;

use super::decode::{decode, parse_format_tag};
use super::error::AnalyzeError;
use super::normalize::normalize;
use crate::config::{ConfigError, IntakeConfig};
use crate::model::{Classifier, ClassifyError};

pub struct IntakePipeline {
    max_upload_bytes: usize,
    max_dimension: u32,
    max_pixels: u64,
    allowed_tags: Vec<String>,
    allowed_formats: Vec<ImageFormat>,
    classifier: Arc<dyn Classifier>,
}

impl IntakePipeline {
    pub fn new(config: &IntakeConfig, classifier: Arc<dyn Classifier>) -> Result<Self, ConfigError> {
        let allowed_formats = config
            .allowed_formats
            .iter()
            .map(|tag| parse_format_tag(tag).ok_or_else(|| ConfigError::UnknownFormat(tag.clone())))
            .collect::<Result<Vec<_>, _>>()?;
        if allowed_formats.is_empty() {
            return Err(ConfigError::EmptyAllowList);
        }

        Ok(Self {
            max_upload_bytes: config.max_upload_bytes,
            max_dimension: config.max_dimension,
            max_pixels: config.max_pixels,
            allowed_tags: config.allowed_formats.clone(),
            allowed_formats,
            classifier,
        })
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    /// Runs the full intake for one upload. The first failing step ends it.
    pub fn analyze(&self, bytes: &[u8], filename: &str) -> Result<AnalyzeResponse, AnalyzeError> {
        let image = self.prepare(bytes, filename)?;

        let classification = self.classifier.classify(&image)?;
        if !(0.0..=1.0).contains(&classification.confidence) {
            return Err(AnalyzeError::Classification(ClassifyError::Model(format!(
                "confidence {} outside [0, 1]",
                classification.confidence
            ))));
        }

        Ok(AnalyzeResponse {
            variety: classification.variety,
            grade: classification.grade,
            confidence: round_confidence(classification.confidence),
        })
    }

    /// Size check, decode, format check and normalization.
    pub fn prepare(&self, bytes: &[u8], filename: &str) -> Result<RgbImage, AnalyzeError> {
        info!(
            "File size for {}: {:.2}MB",
            filename,
            bytes.len() as f64 / 1024.0 / 1024.0
        );
        if bytes.len() > self.max_upload_bytes {
            return Err(AnalyzeError::PayloadTooLarge {
                size: bytes.len(),
                limit: self.max_upload_bytes,
            });
        }

        let decoded = decode(bytes, self.max_pixels)?;
        debug!(
            "Image format: {}, size: {}x{}, color: {:?}",
            decoded.format_tag(),
            decoded.width(),
            decoded.height(),
            decoded.color()
        );

        if !self.allowed_formats.contains(&decoded.format) {
            return Err(AnalyzeError::UnsupportedFormat {
                found: decoded.format_tag(),
                allowed: self.allowed_tags.clone(),
            });
        }

        normalize(decoded.pixels, self.max_dimension)
    }
}

fn round_confidence(confidence: f64) -> f64 {
    (confidence * 1000.0).round() / 1000.0
}
