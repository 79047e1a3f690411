//! Next-day rainfall (binary classifier) from seven weather readings.

use serde_json::{json, Value};

use super::{mean, positive_probability, Domain, Outcome};
use crate::classifier::round_to;
use crate::encoder::{FeatureEncoder, FeatureSpec};
use crate::error::InferenceError;
use crate::predictor::ModelOutput;
use crate::sink::PredictionRecord;

static FEATURES: [FeatureSpec; 7] = [
    FeatureSpec::float("pressure"),
    FeatureSpec::float("dewpoint"),
    FeatureSpec::float("humidity"),
    FeatureSpec::float("cloud"),
    FeatureSpec::float("sunshine"),
    FeatureSpec::float("winddirection"),
    FeatureSpec::float("windspeed"),
];

static ENCODER: FeatureEncoder = FeatureEncoder::new(&FEATURES);

const RAIN: &str = "Rainfall Expected";
const NO_RAIN: &str = "No Rainfall Expected";

pub struct Rainfall;

impl Domain for Rainfall {
    fn name(&self) -> &'static str {
        "rainfall"
    }

    fn table(&self) -> &'static str {
        "rain_predictions"
    }

    fn encoder(&self) -> &'static FeatureEncoder {
        &ENCODER
    }

    fn interpret(&self, output: &ModelOutput) -> Result<Outcome, InferenceError> {
        let prob = positive_probability(self.name(), output)?;
        let label = match output.class_label() {
            Some(1) => RAIN,
            Some(_) => NO_RAIN,
            None => {
                return Err(InferenceError::UnexpectedOutput(format!(
                    "rainfall model must return a class label, got {output:?}"
                )))
            }
        };
        let percent = round_to(prob * 100.0, 2);

        Ok(Outcome {
            value: percent,
            label: Some(label.to_string()),
            probability: Some(percent),
            risk_level: None,
        })
    }

    fn respond(&self, outcome: &Outcome) -> Value {
        json!({
            "prediction": outcome.label,
            "probability": outcome.value,
        })
    }

    fn history_limit(&self) -> i64 {
        20
    }

    fn dashboard(&self, records: &[PredictionRecord]) -> Value {
        json!({
            "total": records.len(),
            "rain_expected": records
                .iter()
                .filter(|r| r.label.as_deref() == Some(RAIN))
                .count(),
            "avg_probability": round_to(mean(records.iter().map(|r| r.predicted_value)), 2),
        })
    }
}
