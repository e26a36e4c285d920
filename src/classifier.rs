use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::features::{FeatureVector, FEATURE_COUNT};

/// Pre-trained binary classifier over the fixed-order feature vector.
pub trait Classifier: Send + Sync {
    fn predict(&self, vector: &FeatureVector) -> anyhow::Result<i8>;

    /// Per-label probabilities, for models that expose them.
    fn predict_proba(&self, _vector: &FeatureVector) -> Option<anyhow::Result<Vec<(i8, f64)>>> {
        None
    }

    fn name(&self) -> &str;
}

/// Logistic model serialized as JSON:
///
/// ```json
/// {"weights": [..22 values..], "intercept": -0.3, "positive_label": 1, "negative_label": -1}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearModel {
    pub weights: Vec<f64>,
    pub intercept: f64,
    #[serde(default = "default_positive_label")]
    pub positive_label: i8,
    #[serde(default = "default_negative_label")]
    pub negative_label: i8,
}

fn default_positive_label() -> i8 {
    1
}

fn default_negative_label() -> i8 {
    -1
}

impl LinearModel {
    pub fn new(weights: Vec<f64>, intercept: f64) -> anyhow::Result<Self> {
        let model = Self {
            weights,
            intercept,
            positive_label: default_positive_label(),
            negative_label: default_negative_label(),
        };
        model.validate()?;
        Ok(model)
    }

    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read model file {path}"))?;
        let model: LinearModel = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse model file {path}"))?;
        model.validate()?;
        log::info!("Loaded linear model from {path}");
        Ok(model)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.weights.len() != FEATURE_COUNT {
            anyhow::bail!(
                "model has {} weights, expected {}",
                self.weights.len(),
                FEATURE_COUNT
            );
        }
        if self.positive_label == self.negative_label {
            anyhow::bail!("positive and negative labels must differ");
        }
        if self.weights.iter().any(|w| !w.is_finite()) || !self.intercept.is_finite() {
            anyhow::bail!("model coefficients must be finite");
        }
        Ok(())
    }

    fn positive_probability(&self, vector: &FeatureVector) -> f64 {
        let score: f64 = self
            .weights
            .iter()
            .zip(vector.to_f64())
            .map(|(weight, value)| weight * value)
            .sum::<f64>()
            + self.intercept;
        1.0 / (1.0 + (-score).exp())
    }
}

impl Classifier for LinearModel {
    fn predict(&self, vector: &FeatureVector) -> anyhow::Result<i8> {
        if self.positive_probability(vector) >= 0.5 {
            Ok(self.positive_label)
        } else {
            Ok(self.negative_label)
        }
    }

    fn predict_proba(&self, vector: &FeatureVector) -> Option<anyhow::Result<Vec<(i8, f64)>>> {
        let positive = self.positive_probability(vector);
        Some(Ok(vec![
            (self.negative_label, 1.0 - positive),
            (self.positive_label, positive),
        ]))
    }

    fn name(&self) -> &str {
        "linear"
    }
}
