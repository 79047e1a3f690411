//! Medical insurance charges (regression) with a four-tier cost risk bucket.

use serde_json::{json, Value};

use super::{mean, Domain, Outcome};
use crate::classifier::{round_to, RiskTiers};
use crate::encoder::{CategoryTable, FeatureEncoder, FeatureSpec};
use crate::error::InferenceError;
use crate::predictor::ModelOutput;
use crate::sink::PredictionRecord;

static SEX: CategoryTable = CategoryTable::case_folded(&[("male", 0), ("female", 1)]);
static SMOKER: CategoryTable = CategoryTable::case_folded(&[("no", 0), ("yes", 1)]);
static REGION: CategoryTable = CategoryTable::case_folded(&[
    ("southeast", 0),
    ("southwest", 1),
    ("northeast", 2),
    ("northwest", 3),
]);

static FEATURES: [FeatureSpec; 6] = [
    FeatureSpec::integer("age"),
    FeatureSpec::categorical("sex", &SEX),
    FeatureSpec::float("bmi"),
    FeatureSpec::integer("children"),
    FeatureSpec::categorical("smoker", &SMOKER),
    FeatureSpec::categorical("region", &REGION),
];

static ENCODER: FeatureEncoder = FeatureEncoder::new(&FEATURES);

pub static RISK: RiskTiers = RiskTiers::new(
    &[(40000.0, "Very High"), (25000.0, "High"), (12000.0, "Medium")],
    "Low",
);

/// Charges at or above this count as high cost on the dashboard.
const HIGH_COST: f64 = 25000.0;

const DASHBOARD_WINDOW: i64 = 100;

pub struct Insurance;

impl Domain for Insurance {
    fn name(&self) -> &'static str {
        "insurance"
    }

    fn table(&self) -> &'static str {
        "insurance_predictions"
    }

    fn encoder(&self) -> &'static FeatureEncoder {
        &ENCODER
    }

    fn interpret(&self, output: &ModelOutput) -> Result<Outcome, InferenceError> {
        let charges = match output {
            ModelOutput::Value(v) => round_to(*v, 2),
            other => {
                return Err(InferenceError::UnexpectedOutput(format!(
                    "insurance model must be a regressor, got {other:?}"
                )))
            }
        };
        Ok(Outcome {
            value: charges,
            label: None,
            probability: None,
            risk_level: Some(RISK.classify(charges).to_string()),
        })
    }

    fn respond(&self, outcome: &Outcome) -> Value {
        json!({
            "predicted_charges": outcome.value,
            "risk_level": outcome.risk_level,
        })
    }

    fn history_limit(&self) -> i64 {
        20
    }

    fn dashboard_window(&self) -> Option<i64> {
        Some(DASHBOARD_WINDOW)
    }

    fn dashboard(&self, records: &[PredictionRecord]) -> Value {
        let charges: Vec<f64> = records.iter().map(|r| r.predicted_value).collect();
        let smoker = |r: &&PredictionRecord| r.input_str("smoker") == Some("yes");
        let non_smoker = |r: &&PredictionRecord| r.input_str("smoker") == Some("no");

        let mut age_buckets = [0u64; 4];
        for age in records.iter().filter_map(|r| r.input_f64("age")) {
            let bucket = if age <= 30.0 {
                0
            } else if age <= 45.0 {
                1
            } else if age <= 60.0 {
                2
            } else {
                3
            };
            age_buckets[bucket] += 1;
        }

        json!({
            "total": records.len(),
            "avg_charges": round_to(mean(charges.iter().copied()), 2),
            "high_cost": charges.iter().filter(|&&c| c >= HIGH_COST).count(),
            "smokers": records.iter().filter(smoker).count(),
            "distribution": super::count_known(
                &RISK.labels(),
                records.iter().map(|r| r.risk_level.as_deref()),
            ),
            "charges_over_time": charges,
            "age_buckets": {
                "18-30": age_buckets[0],
                "31-45": age_buckets[1],
                "46-60": age_buckets[2],
                "60+": age_buckets[3],
            },
            "smoker_avg": round_to(
                mean(records.iter().filter(smoker).map(|r| r.predicted_value)),
                2,
            ),
            "nonsmoker_avg": round_to(
                mean(records.iter().filter(non_smoker).map(|r| r.predicted_value)),
                2,
            ),
        })
    }
}
