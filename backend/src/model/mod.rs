pub mod random;

use image::RgbImage;
use shared::{Grade, Variety};

pub use random::RandomClassifier;

#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("Classifier state lock poisoned")]
    Poisoned,
    #[error("Model error: {0}")]
    Model(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub variety: Variety,
    pub grade: Grade,
    pub confidence: f64,
}

/// Anything that can label a normalized tea-leaf image.
pub trait Classifier: Send + Sync {
    fn classify(&self, image: &RgbImage) -> Result<Classification, ClassifyError>;
}
