//! Loan approval (binary classifier). Requests use snake_case keys; the model was
//! trained on the dataset's capitalised column names.

use serde_json::{json, Value};

use super::{mean, Domain, Outcome};
use crate::classifier::round_to;
use crate::encoder::{CategoryTable, FeatureEncoder, FeatureSpec, RawRequest};
use crate::error::{InferenceError, ValidationError};
use crate::predictor::ModelOutput;
use crate::sink::PredictionRecord;

static GENDER: CategoryTable = CategoryTable::new(&[("Male", 1), ("Female", 0)]);
static MARRIED: CategoryTable = CategoryTable::new(&[("Yes", 1), ("No", 0)]);
static EDUCATION: CategoryTable = CategoryTable::new(&[("Graduate", 1), ("Not Graduate", 0)]);
static SELF_EMPLOYED: CategoryTable = CategoryTable::new(&[("Yes", 1), ("No", 0)]);
static PROPERTY_AREA: CategoryTable =
    CategoryTable::new(&[("Urban", 2), ("Semiurban", 1), ("Rural", 0)]);

static FEATURES: [FeatureSpec; 11] = [
    FeatureSpec::categorical("Gender", &GENDER).from_key("gender"),
    FeatureSpec::categorical("Married", &MARRIED).from_key("married"),
    FeatureSpec::integer("Dependents").from_key("dependents"),
    FeatureSpec::categorical("Education", &EDUCATION).from_key("education"),
    FeatureSpec::categorical("Self_Employed", &SELF_EMPLOYED).from_key("self_employed"),
    FeatureSpec::float("ApplicantIncome").from_key("applicant_income"),
    FeatureSpec::float("CoapplicantIncome").from_key("coapplicant_income"),
    FeatureSpec::float("LoanAmount").from_key("loan_amount"),
    FeatureSpec::float("Loan_Amount_Term").from_key("loan_term"),
    FeatureSpec::float("Credit_History").from_key("credit_history"),
    FeatureSpec::categorical("Property_Area", &PROPERTY_AREA).from_key("property_area"),
];

static ENCODER: FeatureEncoder = FeatureEncoder::new(&FEATURES);

const APPROVED: &str = "Approved";
const REJECTED: &str = "Rejected";

pub struct Loan;

/// Numeric view of a request field, if it parses. Non-numeric input is left
/// for the encoder to reject with its own message.
fn number(raw: &RawRequest, key: &str) -> Option<f64> {
    match raw.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl Domain for Loan {
    fn name(&self) -> &'static str {
        "loan"
    }

    fn table(&self) -> &'static str {
        "loan_predictions"
    }

    fn encoder(&self) -> &'static FeatureEncoder {
        &ENCODER
    }

    fn check_rules(&self, raw: &RawRequest) -> Result<(), ValidationError> {
        if let Some(missing) = FEATURES.iter().find(|f| !raw.contains_key(f.key)) {
            return Err(ValidationError::MissingField(missing.key.to_string()));
        }
        if number(raw, "applicant_income").is_some_and(|v| v <= 0.0) {
            return Err(ValidationError::Rule(
                "Applicant income must be greater than 0".to_string(),
            ));
        }
        if number(raw, "loan_amount").is_some_and(|v| v <= 0.0) {
            return Err(ValidationError::Rule(
                "Loan amount must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    fn interpret(&self, output: &ModelOutput) -> Result<Outcome, InferenceError> {
        let (label, probabilities) = match output {
            ModelOutput::Class {
                label: Some(label),
                probabilities,
            } if !probabilities.is_empty() => (*label, probabilities),
            other => {
                return Err(InferenceError::UnexpectedOutput(format!(
                    "loan model must return a class label and probabilities, got {other:?}"
                )))
            }
        };
        let top = probabilities.iter().copied().fold(f64::MIN, f64::max);
        let confidence = round_to(top * 100.0, 1);
        let decision = if label == 1 { APPROVED } else { REJECTED };

        Ok(Outcome {
            value: confidence,
            label: Some(decision.to_string()),
            probability: Some(confidence),
            risk_level: None,
        })
    }

    fn respond(&self, outcome: &Outcome) -> Value {
        json!({
            "prediction": outcome.label,
            "confidence": outcome.value,
        })
    }

    fn history_limit(&self) -> i64 {
        30
    }

    fn dashboard(&self, records: &[PredictionRecord]) -> Value {
        let approved = records
            .iter()
            .filter(|r| r.label.as_deref() == Some(APPROVED))
            .count();

        let by_credit = |credit: f64, decision: &str| {
            records
                .iter()
                .filter(|r| {
                    r.input_f64("credit_history") == Some(credit)
                        && r.label.as_deref() == Some(decision)
                })
                .count()
        };

        json!({
            "total": records.len(),
            "approved": approved,
            "rejected": records.len() - approved,
            "avg_conf": round_to(mean(records.iter().map(|r| r.predicted_value)), 1),
            "avg_income": round_to(
                mean(records.iter().map(|r| r.input_f64("applicant_income").unwrap_or(0.0))),
                0,
            ),
            "area_counts": super::count_known(
                &PROPERTY_AREA.options(),
                records.iter().map(|r| r.input_str("property_area")),
            ),
            "edu_counts": super::count_known(
                &EDUCATION.options(),
                records.iter().map(|r| r.input_str("education")),
            ),
            "credit_history": {
                "good_approved": by_credit(1.0, APPROVED),
                "good_rejected": by_credit(1.0, REJECTED),
                "bad_approved": by_credit(0.0, APPROVED),
                "bad_rejected": by_credit(0.0, REJECTED),
            },
            "predictions_timeline": records
                .iter()
                .filter_map(|r| r.label.as_deref())
                .collect::<Vec<_>>(),
        })
    }
}
