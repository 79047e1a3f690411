//! Feature encoder: raw request payload to the model's ordered input vector.
//!
//! Every domain declares its features as a `&'static` slice in training-time
//! column order. Categorical features carry a closed label→code table and an
//! optional alias table applied before lookup. Unknown or missing values are
//! rejected before the model is ever called.

use serde_json::{Map, Value};

use crate::error::ValidationError;

/// Raw request body: feature key to string or number.
pub type RawRequest = Map<String, Value>;

/// Closed mapping from accepted label to integer code, fixed at training time.
#[derive(Debug)]
pub struct CategoryTable {
    pub codes: &'static [(&'static str, i64)],
    /// Known dirty aliases corrected before lookup (`"LF"` → `"Low Fat"`).
    pub aliases: &'static [(&'static str, &'static str)],
    /// Lower-case the value before alias and code lookup.
    pub fold_case: bool,
}

impl CategoryTable {
    pub const fn new(codes: &'static [(&'static str, i64)]) -> Self {
        Self {
            codes,
            aliases: &[],
            fold_case: false,
        }
    }

    pub const fn with_aliases(
        codes: &'static [(&'static str, i64)],
        aliases: &'static [(&'static str, &'static str)],
    ) -> Self {
        Self {
            codes,
            aliases,
            fold_case: false,
        }
    }

    pub const fn case_folded(codes: &'static [(&'static str, i64)]) -> Self {
        Self {
            codes,
            aliases: &[],
            fold_case: true,
        }
    }

    pub fn options(&self) -> Vec<&'static str> {
        self.codes.iter().map(|(label, _)| *label).collect()
    }

    pub fn code(&self, label: &str) -> Option<i64> {
        self.codes
            .iter()
            .find(|(l, _)| *l == label)
            .map(|(_, code)| *code)
    }

    /// Canonical label for a trimmed raw value, or the value itself when no alias applies.
    pub fn normalize(&self, raw: &str) -> String {
        let value = if self.fold_case {
            raw.to_lowercase()
        } else {
            raw.to_string()
        };
        self.aliases
            .iter()
            .find(|(alias, _)| *alias == value)
            .map(|(_, canonical)| canonical.to_string())
            .unwrap_or(value)
    }
}

#[derive(Debug)]
pub enum FeatureKind {
    Float,
    Integer,
    Categorical(&'static CategoryTable),
}

/// One model input column.
#[derive(Debug)]
pub struct FeatureSpec {
    /// Column name the model was trained with.
    pub column: &'static str,
    /// Key in the request body.
    pub key: &'static str,
    pub kind: FeatureKind,
}

impl FeatureSpec {
    pub const fn float(name: &'static str) -> Self {
        Self {
            column: name,
            key: name,
            kind: FeatureKind::Float,
        }
    }

    pub const fn integer(name: &'static str) -> Self {
        Self {
            column: name,
            key: name,
            kind: FeatureKind::Integer,
        }
    }

    pub const fn categorical(name: &'static str, table: &'static CategoryTable) -> Self {
        Self {
            column: name,
            key: name,
            kind: FeatureKind::Categorical(table),
        }
    }

    /// Read this feature from a different request key.
    pub const fn from_key(self, key: &'static str) -> Self {
        Self { key, ..self }
    }
}

/// Ordered numeric model input. Length and order match the training columns.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector(Vec<f64>);

impl FeatureVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_f32(&self) -> Vec<f32> {
        self.0.iter().map(|&v| v as f32).collect()
    }
}

impl From<Vec<f64>> for FeatureVector {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

/// Encoder output: the model vector plus the canonical inputs that get persisted.
#[derive(Debug, Clone)]
pub struct EncodedRequest {
    pub vector: FeatureVector,
    /// Request key → parsed number or canonical label.
    pub canonical: Map<String, Value>,
}

#[derive(Debug)]
pub struct FeatureEncoder {
    features: &'static [FeatureSpec],
}

impl FeatureEncoder {
    pub const fn new(features: &'static [FeatureSpec]) -> Self {
        Self { features }
    }

    pub fn features(&self) -> &'static [FeatureSpec] {
        self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn columns(&self) -> Vec<&'static str> {
        self.features.iter().map(|f| f.column).collect()
    }

    /// Encode a raw request. Fails on the first invalid feature, in column order.
    pub fn encode(&self, raw: &RawRequest) -> Result<EncodedRequest, ValidationError> {
        let mut values = Vec::with_capacity(self.features.len());
        let mut canonical = Map::new();

        for feature in self.features {
            let raw_value = raw.get(feature.key);
            match &feature.kind {
                FeatureKind::Float => {
                    let v = coerce_float(feature.key, raw_value)?;
                    values.push(v);
                    canonical.insert(feature.key.to_string(), Value::from(v));
                }
                FeatureKind::Integer => {
                    let v = coerce_integer(feature.key, raw_value)?;
                    values.push(v as f64);
                    canonical.insert(feature.key.to_string(), Value::from(v));
                }
                FeatureKind::Categorical(table) => {
                    let (label, code) = encode_category(feature.key, table, raw_value)?;
                    values.push(code as f64);
                    canonical.insert(feature.key.to_string(), Value::String(label));
                }
            }
        }

        Ok(EncodedRequest {
            vector: FeatureVector(values),
            canonical,
        })
    }
}

/// Accept a JSON object; anything else is a validation failure.
pub fn as_request(body: Value) -> Result<RawRequest, ValidationError> {
    match body {
        Value::Object(map) => Ok(map),
        _ => Err(ValidationError::NotAnObject),
    }
}

fn encode_category(
    field: &str,
    table: &CategoryTable,
    raw: Option<&Value>,
) -> Result<(String, i64), ValidationError> {
    let text = match raw {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => other.to_string(),
    };
    if text.is_empty() {
        return Err(ValidationError::MissingValue(field.to_string()));
    }

    let label = table.normalize(&text);
    if label.is_empty() {
        return Err(ValidationError::MissingValue(field.to_string()));
    }

    match table.code(&label) {
        Some(code) => Ok((label, code)),
        None => Err(ValidationError::UnknownCategory {
            field: field.to_string(),
            value: label,
            options: table.options(),
        }),
    }
}

fn coerce_float(key: &str, raw: Option<&Value>) -> Result<f64, ValidationError> {
    let not_numeric = |value: String| ValidationError::NotNumeric {
        field: key.to_string(),
        value,
    };

    let v = match raw {
        None | Some(Value::Null) => return Err(ValidationError::MissingField(key.to_string())),
        Some(Value::Number(n)) => n.as_f64().ok_or_else(|| not_numeric(n.to_string()))?,
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Err(ValidationError::MissingField(key.to_string()));
            }
            trimmed
                .parse::<f64>()
                .map_err(|_| not_numeric(trimmed.to_string()))?
        }
        Some(other) => return Err(not_numeric(other.to_string())),
    };

    if !v.is_finite() {
        return Err(not_numeric(v.to_string()));
    }
    Ok(v)
}

fn coerce_integer(key: &str, raw: Option<&Value>) -> Result<i64, ValidationError> {
    if let Some(Value::Number(n)) = raw {
        if let Some(i) = n.as_i64() {
            return Ok(i);
        }
    }

    let v = coerce_float(key, raw)?;
    if v.fract() != 0.0 || v.abs() > i64::MAX as f64 {
        return Err(ValidationError::NotInteger {
            field: key.to_string(),
            value: v.to_string(),
        });
    }
    Ok(v as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    static FAT: CategoryTable = CategoryTable::with_aliases(
        &[("Low Fat", 0), ("Regular", 1)],
        &[("LF", "Low Fat"), ("low fat", "Low Fat"), ("reg", "Regular")],
    );
    static SEX: CategoryTable = CategoryTable::case_folded(&[("male", 0), ("female", 1)]);

    static FEATURES: [FeatureSpec; 4] = [
        FeatureSpec::float("weight"),
        FeatureSpec::categorical("Item_Fat_Content", &FAT),
        FeatureSpec::integer("year").from_key("established"),
        FeatureSpec::categorical("sex", &SEX),
    ];
    static ENCODER: FeatureEncoder = FeatureEncoder::new(&FEATURES);

    fn request(value: Value) -> RawRequest {
        as_request(value).unwrap()
    }

    #[test]
    fn test_encode_preserves_column_order() {
        let raw = request(json!({
            "sex": "female",
            "established": 1999,
            "Item_Fat_Content": "Regular",
            "weight": 9.3,
        }));
        let encoded = ENCODER.encode(&raw).unwrap();
        assert_eq!(encoded.vector.as_slice(), &[9.3, 1.0, 1999.0, 1.0]);
        assert_eq!(ENCODER.columns(), vec!["weight", "Item_Fat_Content", "year", "sex"]);
    }

    #[test]
    fn test_alias_normalizes_before_lookup() {
        let raw = request(json!({
            "weight": "12.5", "Item_Fat_Content": " LF ", "established": "2004", "sex": "male",
        }));
        let encoded = ENCODER.encode(&raw).unwrap();
        assert_eq!(encoded.vector.as_slice()[1], 0.0);
        assert_eq!(encoded.canonical["Item_Fat_Content"], "Low Fat");
        assert_eq!(encoded.canonical["weight"], json!(12.5));
        assert_eq!(encoded.canonical["established"], json!(2004));
    }

    #[test]
    fn test_case_folding() {
        let raw = request(json!({
            "weight": 1, "Item_Fat_Content": "Regular", "established": 2000, "sex": "FEMALE",
        }));
        let encoded = ENCODER.encode(&raw).unwrap();
        assert_eq!(encoded.vector.as_slice()[3], 1.0);
        assert_eq!(encoded.canonical["sex"], "female");
    }

    #[test]
    fn test_unknown_category_lists_options() {
        let raw = request(json!({
            "weight": 1, "Item_Fat_Content": "unknown", "established": 2000, "sex": "male",
        }));
        let err = ENCODER.encode(&raw).unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnknownCategory {
                field: "Item_Fat_Content".to_string(),
                value: "unknown".to_string(),
                options: vec!["Low Fat", "Regular"],
            }
        );
        assert_eq!(
            err.to_string(),
            r#"Unknown value 'unknown' for Item_Fat_Content. Valid options: ["Low Fat", "Regular"]"#
        );
    }

    #[test]
    fn test_empty_or_absent_category_is_missing() {
        for body in [
            json!({"weight": 1, "Item_Fat_Content": "   ", "established": 2000, "sex": "male"}),
            json!({"weight": 1, "established": 2000, "sex": "male"}),
            json!({"weight": 1, "Item_Fat_Content": null, "established": 2000, "sex": "male"}),
        ] {
            let err = ENCODER.encode(&request(body)).unwrap_err();
            assert_eq!(err, ValidationError::MissingValue("Item_Fat_Content".to_string()));
        }
    }

    #[test]
    fn test_non_numeric_rejected() {
        let raw = request(json!({
            "weight": "heavy", "Item_Fat_Content": "LF", "established": 2000, "sex": "male",
        }));
        let err = ENCODER.encode(&raw).unwrap_err();
        assert!(matches!(err, ValidationError::NotNumeric { ref field, .. } if field == "weight"));

        let raw = request(json!({
            "weight": true, "Item_Fat_Content": "LF", "established": 2000, "sex": "male",
        }));
        assert!(matches!(
            ENCODER.encode(&raw).unwrap_err(),
            ValidationError::NotNumeric { .. }
        ));
    }

    #[test]
    fn test_missing_numeric_reports_request_key() {
        let raw = request(json!({"weight": 1, "Item_Fat_Content": "LF", "sex": "male"}));
        assert_eq!(
            ENCODER.encode(&raw).unwrap_err(),
            ValidationError::MissingField("established".to_string())
        );
    }

    #[test]
    fn test_fractional_integer_rejected() {
        let raw = request(json!({
            "weight": 1, "Item_Fat_Content": "LF", "established": 1999.5, "sex": "male",
        }));
        assert!(matches!(
            ENCODER.encode(&raw).unwrap_err(),
            ValidationError::NotInteger { .. }
        ));

        let raw = request(json!({
            "weight": 1, "Item_Fat_Content": "LF", "established": "1999.0", "sex": "male",
        }));
        assert_eq!(ENCODER.encode(&raw).unwrap().vector.as_slice()[2], 1999.0);
    }

    #[test]
    fn test_non_finite_rejected() {
        let raw = request(json!({
            "weight": "NaN", "Item_Fat_Content": "LF", "established": 2000, "sex": "male",
        }));
        assert!(matches!(
            ENCODER.encode(&raw).unwrap_err(),
            ValidationError::NotNumeric { .. }
        ));
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let raw = request(json!({
            "weight": 4.2, "Item_Fat_Content": "reg", "established": 1987, "sex": "male",
        }));
        let a = ENCODER.encode(&raw).unwrap();
        let b = ENCODER.encode(&raw).unwrap();
        assert_eq!(a.vector, b.vector);
    }

    #[test]
    fn test_as_request_rejects_non_objects() {
        assert_eq!(as_request(json!([1, 2])).unwrap_err(), ValidationError::NotAnObject);
        assert_eq!(as_request(json!("x")).unwrap_err(), ValidationError::NotAnObject);
    }
}
