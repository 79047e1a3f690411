//! Domain catalogue: the five prediction applications.
//!
//! A domain owns everything that differs between applications: the feature list
//! in training order, the categorical tables, extra request rules, how a raw model
//! output becomes a label / probability / risk bucket, the response shape, and the
//! dashboard aggregation. Everything else (encoding, inference, persistence, HTTP)
//! is shared.

pub mod bigmart;
pub mod churn;
pub mod insurance;
pub mod loan;
pub mod rainfall;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::encoder::{FeatureEncoder, FeatureKind, RawRequest};
use crate::error::{InferenceError, ValidationError};
use crate::predictor::ModelOutput;
use crate::sink::PredictionRecord;

/// Interpreted model result for one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome {
    /// Regression value, or the percentage the domain reports for classifiers.
    pub value: f64,
    pub label: Option<String>,
    pub probability: Option<f64>,
    pub risk_level: Option<String>,
}

impl Outcome {
    pub fn value(value: f64) -> Self {
        Self {
            value,
            label: None,
            probability: None,
            risk_level: None,
        }
    }

    pub fn from_record(record: &PredictionRecord) -> Self {
        Self {
            value: record.predicted_value,
            label: record.label.clone(),
            probability: record.probability,
            risk_level: record.risk_level.clone(),
        }
    }
}

pub trait Domain: Send + Sync {
    fn name(&self) -> &'static str;

    /// Prediction table in the record store.
    fn table(&self) -> &'static str;

    fn encoder(&self) -> &'static FeatureEncoder;

    /// Request rules checked before encoding.
    fn check_rules(&self, _raw: &RawRequest) -> Result<(), ValidationError> {
        Ok(())
    }

    fn interpret(&self, output: &ModelOutput) -> Result<Outcome, InferenceError>;

    /// Success body for a prediction.
    fn respond(&self, outcome: &Outcome) -> Value;

    /// Error body for a failed request.
    fn error_body(&self, message: &str) -> Value {
        json!({ "error": message })
    }

    /// Rows returned by `/history` when no limit is given.
    fn history_limit(&self) -> i64;

    /// Rows aggregated by `/dashboard`; `None` means every row.
    fn dashboard_window(&self) -> Option<i64> {
        None
    }

    /// Aggregate records (chronological order) into the dashboard body.
    fn dashboard(&self, records: &[PredictionRecord]) -> Value;

    fn history_row(&self, record: &PredictionRecord) -> Value {
        let mut row = record.inputs.as_object().cloned().unwrap_or_default();
        if let Value::Object(outcome) = self.respond(&Outcome::from_record(record)) {
            row.extend(outcome);
        }
        row.insert("created_at".to_string(), json!(record.created_at));
        Value::Object(row)
    }

    /// Feature list with valid options, served from the domain index route.
    fn describe(&self) -> Value {
        let features: Vec<Value> = self
            .encoder()
            .features()
            .iter()
            .map(|f| match &f.kind {
                FeatureKind::Float => json!({"key": f.key, "column": f.column, "type": "float"}),
                FeatureKind::Integer => {
                    json!({"key": f.key, "column": f.column, "type": "integer"})
                }
                FeatureKind::Categorical(table) => json!({
                    "key": f.key,
                    "column": f.column,
                    "type": "categorical",
                    "options": table.options(),
                }),
            })
            .collect();
        json!({ "domain": self.name(), "features": features })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DomainKind {
    BigMart,
    Churn,
    Insurance,
    Loan,
    Rainfall,
}

impl DomainKind {
    pub const ALL: [DomainKind; 5] = [
        DomainKind::BigMart,
        DomainKind::Churn,
        DomainKind::Insurance,
        DomainKind::Loan,
        DomainKind::Rainfall,
    ];

    pub fn domain(self) -> &'static dyn Domain {
        match self {
            DomainKind::BigMart => &bigmart::BigMart,
            DomainKind::Churn => &churn::Churn,
            DomainKind::Insurance => &insurance::Insurance,
            DomainKind::Loan => &loan::Loan,
            DomainKind::Rainfall => &rainfall::Rainfall,
        }
    }

    pub fn name(self) -> &'static str {
        self.domain().name()
    }
}

impl FromStr for DomainKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DomainKind::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| {
                let names: Vec<&str> = DomainKind::ALL.iter().map(|k| k.name()).collect();
                format!("unknown domain '{}' (expected one of {:?})", s, names)
            })
    }
}

impl fmt::Display for DomainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Narrows a history listing. The default filter keeps every record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    /// Input field and the values accepted for it.
    pub inputs: Vec<(&'static str, Vec<String>)>,
    /// Inclusive bounds on the stored numeric outcome.
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
}

impl RecordFilter {
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty() && self.min_value.is_none() && self.max_value.is_none()
    }

    pub fn matches(&self, record: &PredictionRecord) -> bool {
        let inputs_match = self.inputs.iter().all(|(key, accepted)| {
            record
                .input_str(key)
                .is_some_and(|value| accepted.iter().any(|a| a == value))
        });
        inputs_match
            && self.min_value.map_or(true, |min| record.predicted_value >= min)
            && self.max_value.map_or(true, |max| record.predicted_value <= max)
    }
}

// ============================================================================
// Aggregation helpers shared by the dashboards
// ============================================================================

/// Arithmetic mean, 0 for an empty input.
pub(crate) fn mean(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, n) = values
        .into_iter()
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// Count occurrences of each known key; keys outside `known` are ignored.
pub(crate) fn count_known<'a>(
    known: &[&str],
    values: impl IntoIterator<Item = Option<&'a str>>,
) -> Map<String, Value> {
    let mut counts: Vec<u64> = vec![0; known.len()];
    for value in values.into_iter().flatten() {
        if let Some(i) = known.iter().position(|k| *k == value) {
            counts[i] += 1;
        }
    }
    known
        .iter()
        .zip(counts)
        .map(|(k, c)| (k.to_string(), Value::from(c)))
        .collect()
}

/// Mean of `value` grouped by `key`, groups in name order, rounded to 2 dp.
pub(crate) fn mean_by<'a>(
    rows: impl IntoIterator<Item = (Option<&'a str>, f64)>,
) -> BTreeMap<String, f64> {
    let mut groups: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for (key, value) in rows {
        if let Some(key) = key {
            let entry = groups.entry(key.to_string()).or_insert((0.0, 0));
            entry.0 += value;
            entry.1 += 1;
        }
    }
    groups
        .into_iter()
        .map(|(k, (sum, n))| (k, crate::classifier::round_to(sum / n as f64, 2)))
        .collect()
}

/// Probability of class 1 from a binary classifier output.
pub(crate) fn positive_probability(
    domain: &str,
    output: &ModelOutput,
) -> Result<f64, InferenceError> {
    output.positive_probability().ok_or_else(|| {
        InferenceError::UnexpectedOutput(format!(
            "{domain} model must return class probabilities, got {output:?}"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_names_round_trip_through_from_str() {
        for kind in DomainKind::ALL {
            assert_eq!(kind.name().parse::<DomainKind>().unwrap(), kind);
        }
        assert!("weather".parse::<DomainKind>().is_err());
    }

    #[test]
    fn test_tables_are_distinct() {
        let mut tables: Vec<&str> = DomainKind::ALL.iter().map(|k| k.domain().table()).collect();
        tables.sort_unstable();
        tables.dedup();
        assert_eq!(tables.len(), DomainKind::ALL.len());
    }

    #[test]
    fn test_every_categorical_table_is_a_bijection() {
        for kind in DomainKind::ALL {
            for feature in kind.domain().encoder().features() {
                if let FeatureKind::Categorical(table) = &feature.kind {
                    let mut labels: Vec<&str> = table.codes.iter().map(|(l, _)| *l).collect();
                    let mut codes: Vec<i64> = table.codes.iter().map(|(_, c)| *c).collect();
                    labels.sort_unstable();
                    labels.dedup();
                    codes.sort_unstable();
                    codes.dedup();
                    assert_eq!(labels.len(), table.codes.len(), "{kind}/{}", feature.column);
                    assert_eq!(codes.len(), table.codes.len(), "{kind}/{}", feature.column);
                    for (alias, canonical) in table.aliases {
                        assert!(
                            table.code(canonical).is_some(),
                            "{kind}/{}: alias {alias} points at unknown label {canonical}",
                            feature.column
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_mean_and_counts() {
        assert_eq!(mean(Vec::<f64>::new()), 0.0);
        assert_eq!(mean([1.0, 2.0, 3.0]), 2.0);

        let counts = count_known(
            &["Low", "High"],
            [Some("Low"), Some("High"), Some("Low"), None, Some("Odd")],
        );
        assert_eq!(counts["Low"], 2);
        assert_eq!(counts["High"], 1);
        assert!(!counts.contains_key("Odd"));

        let by = mean_by([(Some("a"), 1.0), (Some("a"), 2.0), (Some("b"), 5.0), (None, 9.0)]);
        assert_eq!(by["a"], 1.5);
        assert_eq!(by["b"], 5.0);
        assert_eq!(by.len(), 2);
    }

    #[test]
    fn test_record_filter_matches_inputs_and_range() {
        let record = |outlet: &str, value: f64| {
            let inputs = json!({"Outlet_Type": outlet});
            PredictionRecord::new(inputs.as_object().unwrap().clone(), &Outcome::value(value))
        };
        let filter = RecordFilter {
            inputs: vec![("Outlet_Type", vec!["Grocery Store".to_string()])],
            min_value: Some(100.0),
            max_value: Some(500.0),
        };
        assert!(filter.matches(&record("Grocery Store", 100.0)));
        assert!(filter.matches(&record("Grocery Store", 500.0)));
        assert!(!filter.matches(&record("Grocery Store", 500.5)));
        assert!(!filter.matches(&record("Supermarket Type1", 300.0)));
        assert!(!filter.is_empty());

        let everything = RecordFilter::default();
        assert!(everything.is_empty());
        assert!(everything.matches(&record("Anything", -1.0)));
    }
}
