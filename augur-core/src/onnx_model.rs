//! ONNX model backend: local inference for exported tabular models
//!
//! Uses the `ort` crate for ONNX Runtime. Expects the export conventions of
//! skl2onnx / onnxmltools with `zipmap` disabled:
//! - one float input of shape `[1, n_features]`
//! - regressors: a single float output (`variable`)
//! - classifiers: `label` followed by `probabilities` (float, `[1, classes]`). The
//!   label is read as int64, or parsed from a string tensor; domains that only
//!   use probabilities do not need it.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ort::session::Session;
use ort::value::{DynValue, Tensor};

use crate::encoder::FeatureVector;
use crate::error::{InferenceError, ModelError};
use crate::predictor::{ModelOutput, Predictor};

pub struct OnnxPredictor {
    session: Arc<Mutex<Session>>,
    input_name: String,
    n_features: Option<usize>,
    importances: Option<Vec<f64>>,
}

impl std::fmt::Debug for OnnxPredictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxPredictor")
            .field("input_name", &self.input_name)
            .field("n_features", &self.n_features)
            .finish_non_exhaustive()
    }
}

impl OnnxPredictor {
    /// Load the ONNX model at `model_path`.
    ///
    /// A sibling `<stem>-importances.json` holding a float array is picked up as the
    /// model's feature importances when present.
    pub fn new(model_path: &Path, input_name: &str) -> Result<Self, ModelError> {
        if !model_path.exists() {
            return Err(ModelError::NotFound {
                path: model_path.display().to_string(),
            });
        }

        let session = Session::builder()
            .and_then(|b| b.with_intra_threads(1))
            .and_then(|b| b.commit_from_file(model_path))
            .map_err(|e| ModelError::Onnx(e.to_string()))?;

        let input = session
            .inputs()
            .iter()
            .find(|i| i.name() == input_name)
            .ok_or_else(|| {
                let names: Vec<&str> = session.inputs().iter().map(|i| i.name()).collect();
                ModelError::Invalid(format!(
                    "{} has no input named '{}' (inputs: {:?})",
                    model_path.display(),
                    input_name,
                    names
                ))
            })?;
        let n_features = input.dtype().tensor_shape().and_then(|shape| fixed_width(shape));

        let importances_path = importances_path(model_path);
        let importances = if importances_path.exists() {
            let contents = std::fs::read_to_string(&importances_path)
                .map_err(|e| ModelError::Invalid(e.to_string()))?;
            let values: Vec<f64> = serde_json::from_str(&contents).map_err(|e| {
                ModelError::Invalid(format!("{}: {}", importances_path.display(), e))
            })?;
            Some(values)
        } else {
            None
        };

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            input_name: input_name.to_string(),
            n_features,
            importances,
        })
    }
}

#[async_trait]
impl Predictor for OnnxPredictor {
    async fn predict(&self, features: &FeatureVector) -> Result<ModelOutput, InferenceError> {
        // CPU-bound; run on the blocking thread pool.
        let session = Arc::clone(&self.session);
        let input_name = self.input_name.clone();
        let row = features.to_f32();

        tokio::task::spawn_blocking(move || {
            let mut session_guard = session
                .lock()
                .map_err(|e| InferenceError::Onnx(format!("session lock poisoned: {e}")))?;
            predict_sync(&mut session_guard, &input_name, row)
        })
        .await
        .map_err(|e| InferenceError::Onnx(format!("spawn_blocking join error: {e}")))?
    }

    fn n_features(&self) -> Option<usize> {
        self.n_features
    }

    fn feature_importances(&self) -> Option<&[f64]> {
        self.importances.as_deref()
    }

    fn name(&self) -> &str {
        "onnx"
    }
}

/// Run one row through the session synchronously.
fn predict_sync(
    session: &mut Session,
    input_name: &str,
    row: Vec<f32>,
) -> Result<ModelOutput, InferenceError> {
    let shape = vec![1i64, row.len() as i64];
    let input = Tensor::from_array((shape, row)).map_err(|e| InferenceError::Onnx(e.to_string()))?;

    let inputs = ort::inputs! {
        input_name => input,
    };

    let outputs = session
        .run(inputs)
        .map_err(|e| InferenceError::Onnx(e.to_string()))?;

    match outputs.len() {
        0 => Err(InferenceError::UnexpectedOutput("model produced no outputs".to_string())),
        1 => {
            let (_, data) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| InferenceError::Onnx(e.to_string()))?;
            let value = data.first().copied().ok_or_else(|| {
                InferenceError::UnexpectedOutput("empty regression output".to_string())
            })?;
            Ok(ModelOutput::Value(f64::from(value)))
        }
        _ => {
            // Expected shape: [1, n_classes]
            let (prob_shape, probs) = outputs[1]
                .try_extract_tensor::<f32>()
                .map_err(|e| InferenceError::Onnx(e.to_string()))?;
            let n_classes = prob_shape.last().copied().unwrap_or(0) as usize;
            if n_classes == 0 || probs.len() < n_classes {
                return Err(InferenceError::UnexpectedOutput(format!(
                    "probability output has shape {:?}",
                    &prob_shape[..]
                )));
            }

            Ok(ModelOutput::Class {
                label: decode_label(&outputs[0]),
                probabilities: probs[..n_classes].iter().map(|&p| f64::from(p)).collect(),
            })
        }
    }
}

/// Class label from an int64 tensor, or from a string tensor holding an integer.
fn decode_label(value: &DynValue) -> Option<i64> {
    if let Ok((_, labels)) = value.try_extract_tensor::<i64>() {
        return labels.first().copied();
    }
    let (_, labels) = value.try_extract_strings().ok()?;
    labels.first().and_then(|label| parse_label(label))
}

fn parse_label(label: &str) -> Option<i64> {
    label.trim().parse().ok()
}

/// Feature count of a `[batch, n_features]` input, when the export fixes it.
fn fixed_width(shape: &[i64]) -> Option<usize> {
    match shape {
        [_, width] if *width > 0 => usize::try_from(*width).ok(),
        _ => None,
    }
}

/// Sidecar importances file for a model: `/m/loan.onnx` → `/m/loan-importances.json`.
pub fn importances_path(model_path: &Path) -> PathBuf {
    let stem = model_path
        .file_stem()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();
    model_path.with_file_name(format!("{stem}-importances.json"))
}
