//! Predictor abstraction over the bound model artifact.
//!
//! Provides a `Predictor` trait with implementations for:
//! - **ONNX**: exported scikit-learn / XGBoost models run through ONNX Runtime
//! - **Linear**: a JSON artifact holding regression or logistic coefficients

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::encoder::FeatureVector;
use crate::error::{InferenceError, ModelError};
use crate::onnx_model::OnnxPredictor;

/// What the model returned for a single row.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutput {
    /// Regression output.
    Value(f64),
    /// Classification output: per-class probabilities and the predicted class,
    /// when the model emits an integer class label.
    Class {
        label: Option<i64>,
        probabilities: Vec<f64>,
    },
}

impl ModelOutput {
    /// Probability of class 1, if this is a binary classification output.
    pub fn positive_probability(&self) -> Option<f64> {
        match self {
            ModelOutput::Class { probabilities, .. } => probabilities.get(1).copied(),
            ModelOutput::Value(_) => None,
        }
    }

    pub fn class_label(&self) -> Option<i64> {
        match self {
            ModelOutput::Class { label, .. } => *label,
            ModelOutput::Value(_) => None,
        }
    }
}

#[async_trait]
pub trait Predictor: Send + Sync {
    async fn predict(&self, features: &FeatureVector) -> Result<ModelOutput, InferenceError>;

    /// Input width, when the artifact declares it.
    fn n_features(&self) -> Option<usize> {
        None
    }

    /// Per-column importances in training order, when the artifact ships them.
    fn feature_importances(&self) -> Option<&[f64]> {
        None
    }

    /// Backend name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Linear artifact
// ============================================================================

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LinearKind {
    Regression,
    Logistic,
}

/// `{"kind": "logistic", "coefficients": [...], "intercept": -1.2}`
#[derive(Debug, Clone, Deserialize)]
pub struct LinearModel {
    pub kind: LinearKind,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    /// Decision threshold on the class-1 probability.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default)]
    pub feature_importances: Option<Vec<f64>>,
}

fn default_threshold() -> f64 {
    0.5
}

impl LinearModel {
    pub fn from_json(contents: &str) -> Result<Self, ModelError> {
        let model: LinearModel =
            serde_json::from_str(contents).map_err(|e| ModelError::Invalid(e.to_string()))?;
        if model.coefficients.is_empty() {
            return Err(ModelError::Invalid("coefficients must not be empty".to_string()));
        }
        if let Some(importances) = &model.feature_importances {
            if importances.len() != model.coefficients.len() {
                return Err(ModelError::Invalid(format!(
                    "{} feature importances for {} coefficients",
                    importances.len(),
                    model.coefficients.len()
                )));
            }
        }
        Ok(model)
    }

    pub fn from_file(path: &Path) -> Result<Self, ModelError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ModelError::Invalid(format!(
            "{}: {}",
            path.display(),
            e
        )))?;
        Self::from_json(&contents)
    }

    fn score(&self, features: &FeatureVector) -> Result<f64, InferenceError> {
        if features.len() != self.coefficients.len() {
            return Err(InferenceError::FeatureCount {
                expected: self.coefficients.len(),
                actual: features.len(),
            });
        }
        Ok(self
            .coefficients
            .iter()
            .zip(features.as_slice())
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + self.intercept)
    }
}

#[async_trait]
impl Predictor for LinearModel {
    async fn predict(&self, features: &FeatureVector) -> Result<ModelOutput, InferenceError> {
        let z = self.score(features)?;
        match self.kind {
            LinearKind::Regression => Ok(ModelOutput::Value(z)),
            LinearKind::Logistic => {
                let p = 1.0 / (1.0 + (-z).exp());
                Ok(ModelOutput::Class {
                    label: Some(i64::from(p >= self.threshold)),
                    probabilities: vec![1.0 - p, p],
                })
            }
        }
    }

    fn n_features(&self) -> Option<usize> {
        Some(self.coefficients.len())
    }

    fn feature_importances(&self) -> Option<&[f64]> {
        self.feature_importances.as_deref()
    }

    fn name(&self) -> &str {
        match self.kind {
            LinearKind::Regression => "linear-regression",
            LinearKind::Logistic => "logistic-regression",
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

/// Expand `~` and `$VARS` in a configured model path.
pub fn resolve_model_path(model_path: &str) -> Result<PathBuf, ModelError> {
    let expanded = shellexpand::full(model_path)
        .map_err(|e| ModelError::Invalid(format!("cannot expand '{}': {}", model_path, e)))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

/// Load the artifact at `model_path`, picking the backend from the file extension.
pub fn load_predictor(
    model_path: &str,
    input_name: &str,
) -> Result<Arc<dyn Predictor>, ModelError> {
    let path = resolve_model_path(model_path)?;
    if !path.exists() {
        return Err(ModelError::NotFound {
            path: path.display().to_string(),
        });
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    let predictor: Arc<dyn Predictor> = match extension.as_deref() {
        Some("onnx") => Arc::new(OnnxPredictor::new(&path, input_name)?),
        Some("json") => Arc::new(LinearModel::from_file(&path)?),
        _ => {
            return Err(ModelError::UnsupportedFormat {
                path: path.display().to_string(),
            })
        }
    };

    tracing::info!(path = %path.display(), backend = predictor.name(), "Model artifact loaded");
    Ok(predictor)
}

/// Refuse a model whose declared input width differs from the domain's feature list.
pub fn check_feature_count(predictor: &dyn Predictor, expected: usize) -> Result<(), ModelError> {
    match predictor.n_features() {
        Some(n) if n != expected => Err(ModelError::FeatureMismatch {
            expected: n,
            actual: expected,
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(values: &[f64]) -> FeatureVector {
        FeatureVector::from(values.to_vec())
    }

    #[tokio::test]
    async fn test_regression_is_dot_product_plus_intercept() {
        let model = LinearModel::from_json(
            r#"{"kind": "regression", "coefficients": [2.0, -1.0], "intercept": 10.0}"#,
        )
        .unwrap();
        let out = model.predict(&vector(&[3.0, 4.0])).await.unwrap();
        assert_eq!(out, ModelOutput::Value(12.0));
        assert_eq!(model.n_features(), Some(2));
        assert_eq!(model.name(), "linear-regression");
    }

    #[tokio::test]
    async fn test_logistic_returns_class_and_probabilities() {
        let model = LinearModel::from_json(
            r#"{"kind": "logistic", "coefficients": [1.0], "intercept": 0.0}"#,
        )
        .unwrap();

        match model.predict(&vector(&[0.0])).await.unwrap() {
            ModelOutput::Class { label, probabilities } => {
                assert_eq!(label, Some(1), "p = 0.5 meets the default threshold");
                assert!((probabilities[0] - 0.5).abs() < 1e-12);
                assert!((probabilities[1] - 0.5).abs() < 1e-12);
            }
            other => panic!("Expected Class, got {other:?}"),
        }

        let out = model.predict(&vector(&[-4.0])).await.unwrap();
        assert!(matches!(out, ModelOutput::Class { label: Some(0), .. }));
        assert!(out.positive_probability().unwrap() < 0.05);
    }

    #[tokio::test]
    async fn test_wrong_width_is_inference_error() {
        let model = LinearModel::from_json(
            r#"{"kind": "regression", "coefficients": [1.0, 1.0], "intercept": 0.0}"#,
        )
        .unwrap();
        match model.predict(&vector(&[1.0])).await {
            Err(InferenceError::FeatureCount { expected, actual }) => {
                assert_eq!(expected, 2);
                assert_eq!(actual, 1);
            }
            other => panic!("Expected FeatureCount, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_artifacts_rejected() {
        assert!(LinearModel::from_json("not json").is_err());
        assert!(LinearModel::from_json(
            r#"{"kind": "regression", "coefficients": [], "intercept": 0.0}"#
        )
        .is_err());
        assert!(LinearModel::from_json(
            r#"{"kind": "regression", "coefficients": [1.0], "intercept": 0.0, "feature_importances": [0.5, 0.5]}"#
        )
        .is_err());
    }

    #[test]
    fn test_check_feature_count() {
        let model = LinearModel::from_json(
            r#"{"kind": "regression", "coefficients": [1.0, 2.0, 3.0], "intercept": 0.0}"#,
        )
        .unwrap();
        assert!(check_feature_count(&model, 3).is_ok());
        assert!(matches!(
            check_feature_count(&model, 6),
            Err(ModelError::FeatureMismatch { expected: 3, actual: 6 })
        ));
    }

    #[test]
    fn test_load_predictor_missing_file() {
        match load_predictor("/nonexistent/model.json", "float_input") {
            Err(ModelError::NotFound { path }) => assert!(path.contains("nonexistent")),
            Err(other) => panic!("Expected NotFound, got: {other:?}"),
            Ok(_) => panic!("Expected NotFound, got a predictor"),
        }
    }

    #[test]
    fn test_load_predictor_json_and_unsupported() {
        let dir = std::env::temp_dir().join(format!("augur-model-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();

        let json_path = dir.join("model.json");
        std::fs::write(
            &json_path,
            r#"{"kind": "logistic", "coefficients": [0.1, 0.2], "intercept": 0.0}"#,
        )
        .unwrap();
        let predictor = load_predictor(json_path.to_str().unwrap(), "float_input").unwrap();
        assert_eq!(predictor.name(), "logistic-regression");
        assert_eq!(predictor.n_features(), Some(2));

        let pkl_path = dir.join("model.pkl");
        std::fs::write(&pkl_path, b"\x80\x04").unwrap();
        assert!(matches!(
            load_predictor(pkl_path.to_str().unwrap(), "float_input"),
            Err(ModelError::UnsupportedFormat { .. })
        ));

        std::fs::remove_dir_all(&dir).ok();
    }
}
