use image::RgbImage;
use rand::rngs::StdRng;
use rand::seq::IteratorRandom;
use rand::{Rng, SeedableRng};
use shared::{Grade, Variety};
use std::sync::Mutex;
use strum::IntoEnumIterator;

use super::{Classification, Classifier, ClassifyError};

pub const MIN_CONFIDENCE: f64 = 0.7;
pub const MAX_CONFIDENCE: f64 = 1.0;

/// Stand-in until a trained model is wired up: ignores the pixels and draws
/// a uniform label with confidence in `[0.7, 1.0]`.
pub struct RandomClassifier {
    rng: Mutex<StdRng>,
}

impl RandomClassifier {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            rng: Mutex::new(rng),
        }
    }
}

impl Classifier for RandomClassifier {
    fn classify(&self, _image: &RgbImage) -> Result<Classification, ClassifyError> {
        let mut rng = self.rng.lock().map_err(|_| ClassifyError::Poisoned)?;

        let variety = Variety::iter()
            .choose(&mut *rng)
            .ok_or_else(|| ClassifyError::Model("no varieties defined".to_string()))?;
        let grade = Grade::iter()
            .choose(&mut *rng)
            .ok_or_else(|| ClassifyError::Model("no grades defined".to_string()))?;
        let confidence = rng.random_range(MIN_CONFIDENCE..=MAX_CONFIDENCE);

        Ok(Classification {
            variety,
            grade,
            confidence,
        })
    }
}
