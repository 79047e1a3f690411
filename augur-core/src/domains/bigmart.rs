//! BigMart outlet sales (regression). Categorical inputs are label-encoded with
//! the tables used at training time, after correcting the dataset's known dirty
//! spellings.

use serde::Serialize;
use serde_json::{json, Value};

use super::{mean, mean_by, Domain, Outcome, RecordFilter};
use crate::classifier::round_to;
use crate::encoder::{CategoryTable, FeatureEncoder, FeatureKind, FeatureSpec};
use crate::error::{InferenceError, ValidationError};
use crate::predictor::ModelOutput;
use crate::sink::PredictionRecord;

static FAT_CONTENT: CategoryTable = CategoryTable::with_aliases(
    &[("Low Fat", 0), ("Regular", 1)],
    &[
        ("LF", "Low Fat"),
        ("low fat", "Low Fat"),
        ("reg", "Regular"),
        ("REG", "Regular"),
    ],
);

static ITEM_TYPE: CategoryTable = CategoryTable::new(&[
    ("Baking Goods", 0),
    ("Breads", 1),
    ("Breakfast", 2),
    ("Canned", 3),
    ("Dairy", 4),
    ("Frozen Foods", 5),
    ("Fruits and Vegetables", 6),
    ("Hard Drinks", 7),
    ("Health and Hygiene", 8),
    ("Household", 9),
    ("Meat", 10),
    ("Others", 11),
    ("Seafood", 12),
    ("Snack Foods", 13),
    ("Soft Drinks", 14),
    ("Starchy Foods", 15),
]);

static OUTLET_IDENTIFIER: CategoryTable = CategoryTable::new(&[
    ("OUT010", 0),
    ("OUT013", 1),
    ("OUT017", 2),
    ("OUT018", 3),
    ("OUT019", 4),
    ("OUT027", 5),
    ("OUT035", 6),
    ("OUT045", 7),
    ("OUT046", 8),
    ("OUT049", 9),
]);

static OUTLET_SIZE: CategoryTable = CategoryTable::with_aliases(
    &[("High", 0), ("Medium", 1), ("Small", 2)],
    &[("high", "High"), ("medium", "Medium"), ("small", "Small")],
);

static LOCATION_TYPE: CategoryTable =
    CategoryTable::new(&[("Tier 1", 0), ("Tier 2", 1), ("Tier 3", 2)]);

static OUTLET_TYPE: CategoryTable = CategoryTable::new(&[
    ("Grocery Store", 0),
    ("Supermarket Type1", 1),
    ("Supermarket Type2", 2),
    ("Supermarket Type3", 3),
]);

static FEATURES: [FeatureSpec; 10] = [
    FeatureSpec::float("Item_Weight"),
    FeatureSpec::categorical("Item_Fat_Content", &FAT_CONTENT),
    FeatureSpec::float("Item_Visibility"),
    FeatureSpec::categorical("Item_Type", &ITEM_TYPE),
    FeatureSpec::float("Item_MRP"),
    FeatureSpec::categorical("Outlet_Identifier", &OUTLET_IDENTIFIER),
    FeatureSpec::integer("Outlet_Establishment_Year"),
    FeatureSpec::categorical("Outlet_Size", &OUTLET_SIZE),
    FeatureSpec::categorical("Outlet_Location_Type", &LOCATION_TYPE),
    FeatureSpec::categorical("Outlet_Type", &OUTLET_TYPE),
];

static ENCODER: FeatureEncoder = FeatureEncoder::new(&FEATURES);

pub struct BigMart;

impl Domain for BigMart {
    fn name(&self) -> &'static str {
        "bigmart"
    }

    fn table(&self) -> &'static str {
        "bigmart_predictions"
    }

    fn encoder(&self) -> &'static FeatureEncoder {
        &ENCODER
    }

    fn interpret(&self, output: &ModelOutput) -> Result<Outcome, InferenceError> {
        match output {
            ModelOutput::Value(v) => Ok(Outcome::value(round_to(*v, 2))),
            other => Err(InferenceError::UnexpectedOutput(format!(
                "bigmart model must be a regressor, got {other:?}"
            ))),
        }
    }

    fn respond(&self, outcome: &Outcome) -> Value {
        json!({ "success": true, "prediction": outcome.value })
    }

    fn error_body(&self, message: &str) -> Value {
        json!({ "success": false, "error": message })
    }

    /// Every stored prediction.
    fn history_limit(&self) -> i64 {
        i64::MAX
    }

    fn history_row(&self, record: &PredictionRecord) -> Value {
        let mut row = record.inputs.as_object().cloned().unwrap_or_default();
        row.insert("predicted_sales".to_string(), json!(record.predicted_value));
        row.insert("created_at".to_string(), json!(record.created_at));
        Value::Object(row)
    }

    fn dashboard(&self, records: &[PredictionRecord]) -> Value {
        let sales: Vec<f64> = records.iter().map(|r| r.predicted_value).collect();
        let by = |key: &str| {
            mean_by(
                records
                    .iter()
                    .map(|r| (r.input_str(key), r.predicted_value)),
            )
        };
        let max = sales.iter().copied().fold(None, |acc: Option<f64>, v| {
            Some(acc.map_or(v, |a| a.max(v)))
        });
        let min = sales.iter().copied().fold(None, |acc: Option<f64>, v| {
            Some(acc.map_or(v, |a| a.min(v)))
        });
        // [Item_MRP, predicted sales] points
        let mrp_vs_sales: Vec<[f64; 2]> = records
            .iter()
            .filter_map(|r| r.input_f64("Item_MRP").map(|mrp| [mrp, r.predicted_value]))
            .collect();

        json!({
            "total": records.len(),
            "mean_sales": round_to(mean(sales.iter().copied()), 2),
            "max_sales": max,
            "min_sales": min,
            "series": sales,
            "mrp_vs_sales": mrp_vs_sales,
            "by_outlet_type": by("Outlet_Type"),
            "by_item_type": by("Item_Type"),
            "by_location_type": by("Outlet_Location_Type"),
            "by_fat_content": by("Item_Fat_Content"),
        })
    }
}

/// History filter: comma-separated outlet identifiers and outlet types, plus an
/// inclusive predicted-sales range. Blank lists are ignored.
pub fn history_filter(
    outlet_identifier: Option<&str>,
    outlet_type: Option<&str>,
    min_sales: Option<f64>,
    max_sales: Option<f64>,
) -> Result<RecordFilter, ValidationError> {
    let mut filter = RecordFilter {
        min_value: min_sales,
        max_value: max_sales,
        ..RecordFilter::default()
    };

    let lists = [
        ("outlet_identifier", "Outlet_Identifier", &OUTLET_IDENTIFIER, outlet_identifier),
        ("outlet_type", "Outlet_Type", &OUTLET_TYPE, outlet_type),
    ];
    for (param, column, table, list) in lists {
        let values: Vec<String> = list
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect();
        if let Some(unknown) = values.iter().find(|v| table.code(v).is_none()) {
            return Err(ValidationError::UnknownCategory {
                field: param.to_string(),
                value: unknown.clone(),
                options: table.options(),
            });
        }
        if !values.is_empty() {
            filter.inputs.push((column, values));
        }
    }

    for (param, bound) in [("min_sales", min_sales), ("max_sales", max_sales)] {
        if let Some(v) = bound.filter(|v| !v.is_finite()) {
            return Err(ValidationError::NotNumeric {
                field: param.to_string(),
                value: v.to_string(),
            });
        }
    }
    if let (Some(min), Some(max)) = (min_sales, max_sales) {
        if min > max {
            return Err(ValidationError::Rule(
                "min_sales must not be greater than max_sales".to_string(),
            ));
        }
    }

    Ok(filter)
}

/// Importance of one input feature, summed over its encoded columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub score: f64,
    /// Share of the total importance, in percent.
    pub pct: f64,
}

/// Group per-column importances by parent feature and sort by descending score.
///
/// Columns that start with a categorical feature's name (one-hot expansions such
/// as `Outlet_Type_Grocery Store`) are folded into that feature. Display names
/// use spaces instead of underscores.
pub fn feature_importance(columns: &[&str], scores: &[f64]) -> Vec<FeatureImportance> {
    let categoricals: Vec<&str> = FEATURES
        .iter()
        .filter(|f| matches!(f.kind, FeatureKind::Categorical(_)))
        .map(|f| f.column)
        .collect();

    let mut groups: Vec<(String, f64)> = Vec::new();
    for (column, score) in columns.iter().zip(scores) {
        let parent = categoricals
            .iter()
            .find(|cat| column.starts_with(**cat))
            .copied()
            .unwrap_or(*column)
            .replace('_', " ");
        match groups.iter_mut().find(|(name, _)| *name == parent) {
            Some((_, total)) => *total += score,
            None => groups.push((parent, *score)),
        }
    }

    groups.sort_by(|a, b| b.1.total_cmp(&a.1));
    let total: f64 = groups.iter().map(|(_, s)| s).sum();

    groups
        .into_iter()
        .map(|(feature, score)| FeatureImportance {
            feature,
            score: round_to(score, 6),
            pct: if total > 0.0 {
                round_to(score / total * 100.0, 1)
            } else {
                0.0
            },
        })
        .collect()
}
