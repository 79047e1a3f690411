//! Telco customer churn (binary classifier) with a four-tier risk bucket on the
//! churn probability percentage.

use serde_json::{json, Value};

use super::{mean, positive_probability, Domain, Outcome};
use crate::classifier::{round_to, RiskTiers};
use crate::encoder::{CategoryTable, FeatureEncoder, FeatureSpec};
use crate::error::InferenceError;
use crate::predictor::ModelOutput;
use crate::sink::PredictionRecord;

// Label-encoder codes: classes in sorted order.
static GENDER: CategoryTable = CategoryTable::new(&[("Female", 0), ("Male", 1)]);
static YES_NO: CategoryTable = CategoryTable::new(&[("No", 0), ("Yes", 1)]);
static MULTIPLE_LINES: CategoryTable =
    CategoryTable::new(&[("No", 0), ("No phone service", 1), ("Yes", 2)]);
static INTERNET_SERVICE: CategoryTable =
    CategoryTable::new(&[("DSL", 0), ("Fiber optic", 1), ("No", 2)]);
static INTERNET_ADDON: CategoryTable =
    CategoryTable::new(&[("No", 0), ("No internet service", 1), ("Yes", 2)]);
static CONTRACT: CategoryTable =
    CategoryTable::new(&[("Month-to-month", 0), ("One year", 1), ("Two year", 2)]);
static PAYMENT_METHOD: CategoryTable = CategoryTable::new(&[
    ("Bank transfer (automatic)", 0),
    ("Credit card (automatic)", 1),
    ("Electronic check", 2),
    ("Mailed check", 3),
]);

static FEATURES: [FeatureSpec; 19] = [
    FeatureSpec::categorical("gender", &GENDER),
    FeatureSpec::integer("SeniorCitizen"),
    FeatureSpec::categorical("Partner", &YES_NO),
    FeatureSpec::categorical("Dependents", &YES_NO),
    FeatureSpec::integer("tenure"),
    FeatureSpec::categorical("PhoneService", &YES_NO),
    FeatureSpec::categorical("MultipleLines", &MULTIPLE_LINES),
    FeatureSpec::categorical("InternetService", &INTERNET_SERVICE),
    FeatureSpec::categorical("OnlineSecurity", &INTERNET_ADDON),
    FeatureSpec::categorical("OnlineBackup", &INTERNET_ADDON),
    FeatureSpec::categorical("DeviceProtection", &INTERNET_ADDON),
    FeatureSpec::categorical("TechSupport", &INTERNET_ADDON),
    FeatureSpec::categorical("StreamingTV", &INTERNET_ADDON),
    FeatureSpec::categorical("StreamingMovies", &INTERNET_ADDON),
    FeatureSpec::categorical("Contract", &CONTRACT),
    FeatureSpec::categorical("PaperlessBilling", &YES_NO),
    FeatureSpec::categorical("PaymentMethod", &PAYMENT_METHOD),
    FeatureSpec::float("MonthlyCharges"),
    FeatureSpec::float("TotalCharges"),
];

static ENCODER: FeatureEncoder = FeatureEncoder::new(&FEATURES);

/// Tiers over the churn probability in percent.
pub static RISK: RiskTiers = RiskTiers::new(
    &[(80.0, "Critical"), (60.0, "High"), (40.0, "Medium")],
    "Low",
);

/// Class-1 probability at or above which the customer is labelled as churning.
const CHURN_THRESHOLD: f64 = 0.5;

/// Percentage at or above which a record counts as high risk on the dashboard.
const HIGH_RISK_PERCENT: f64 = 60.0;

pub struct Churn;

impl Domain for Churn {
    fn name(&self) -> &'static str {
        "churn"
    }

    fn table(&self) -> &'static str {
        "churn_predictions"
    }

    fn encoder(&self) -> &'static FeatureEncoder {
        &ENCODER
    }

    fn interpret(&self, output: &ModelOutput) -> Result<Outcome, InferenceError> {
        let prob = positive_probability(self.name(), output)?;
        let label = if prob >= CHURN_THRESHOLD { "Churn" } else { "No Churn" };
        let percent = round_to(prob * 100.0, 2);

        Ok(Outcome {
            value: percent,
            label: Some(label.to_string()),
            probability: Some(percent),
            risk_level: Some(RISK.classify(percent).to_string()),
        })
    }

    fn respond(&self, outcome: &Outcome) -> Value {
        json!({
            "prediction": outcome.label,
            "churn_probability": outcome.value,
            "risk_level": outcome.risk_level,
        })
    }

    fn history_limit(&self) -> i64 {
        20
    }

    fn dashboard(&self, records: &[PredictionRecord]) -> Value {
        json!({
            "total": records.len(),
            "avg_prob": round_to(mean(records.iter().map(|r| r.predicted_value)), 2),
            "high_risk": records
                .iter()
                .filter(|r| r.predicted_value >= HIGH_RISK_PERCENT)
                .count(),
            "distribution": super::count_known(
                &RISK.labels(),
                records.iter().map(|r| r.risk_level.as_deref()),
            ),
        })
    }
}
