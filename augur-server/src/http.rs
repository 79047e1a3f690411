//! Augur HTTP API
//!
//! Every enabled domain is nested under `/<domain>`:
//! - GET  /<domain>           feature list with valid options
//! - POST /<domain>/predict   run and persist one prediction
//! - GET  /<domain>/history   most recent predictions (`?limit=N`, `?format=csv`)
//! - GET  /<domain>/dashboard aggregates over stored predictions
//!
//! Domain extras:
//! - POST /rainfall/result                 form-encoded predict, persisted
//! - POST /rainfall/api/predict            what-if predict, not persisted
//! - POST /bigmart/api/predict             same as /bigmart/predict
//! - POST /bigmart/api/compare             two scenarios side by side, not persisted
//! - GET  /bigmart/api/feature-importance  grouped model importances
//! - GET  /bigmart/history also filters by `outlet_identifier`, `outlet_type`
//!   (comma-separated) and `min_sales` / `max_sales`
//!
//! Top level: GET /health, GET /version.
//!
//! Each endpoint has a thin axum handler that delegates to an inner function
//! returning `(StatusCode, Value)`, so the logic is testable without dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use augur_core::config::HttpConfig;
use augur_core::domains::bigmart;
use augur_core::{as_request, DomainKind, RawRequest, RecordFilter, ValidationError};
use axum::extract::rejection::{FormRejection, JsonRejection, QueryRejection};
use axum::extract::{Form, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::context::{AppContext, DomainState};
use crate::subsystems::predict::{self, PredictError};
use crate::subsystems::records;

/// Top-level router: `/health`, `/version` and one nested router per domain.
pub fn build_router(ctx: Arc<AppContext>) -> Router {
    let mut router = Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .with_state(Arc::clone(&ctx));

    for state in &ctx.domains {
        let prefix = format!("/{}", state.domain.name());
        router = router.nest(&prefix, domain_router(Arc::clone(state)));
    }
    router
}

/// Routes for one domain, mounted under its name by `build_router`.
pub fn domain_router(state: Arc<DomainState>) -> Router {
    let router = Router::new()
        .route("/", get(describe_handler))
        .route("/predict", post(predict_handler))
        .route("/history", get(history_handler))
        .route("/dashboard", get(dashboard_handler));

    let router = match state.kind {
        DomainKind::Rainfall => router
            .route("/result", post(form_predict_handler))
            .route("/api/predict", post(whatif_handler)),
        DomainKind::BigMart => router
            .route("/api/predict", post(predict_handler))
            .route("/api/compare", post(compare_handler))
            .route("/api/feature-importance", get(feature_importance_handler)),
        DomainKind::Churn | DomainKind::Insurance | DomainKind::Loan => router,
    };

    router.with_state(state)
}

/// Serve until the broadcast shutdown signal fires.
pub async fn start_http_server(
    ctx: Arc<AppContext>,
    http: &HttpConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", http.host, http.port);
    let app = build_router(ctx);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Augur HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request DTOs
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct HistoryParams {
    pub limit: Option<i64>,
    /// `json` (default) or `csv`.
    pub format: Option<String>,
    pub outlet_identifier: Option<String>,
    pub outlet_type: Option<String>,
    pub min_sales: Option<f64>,
    pub max_sales: Option<f64>,
}

impl HistoryParams {
    fn has_sales_filter(&self) -> bool {
        self.outlet_identifier.is_some()
            || self.outlet_type.is_some()
            || self.min_sales.is_some()
            || self.max_sales.is_some()
    }
}

// ============================================================================
// Inner (directly testable) functions
// ============================================================================

/// Store status plus the hosted domains and their model backends.
pub async fn health_inner(ctx: &AppContext) -> (StatusCode, Value) {
    let domains: Vec<Value> = ctx
        .domains
        .iter()
        .map(|d| json!({"domain": d.domain.name(), "model": d.predictor.name()}))
        .collect();

    match ctx.sink.health().await {
        Ok(store_version) => (
            StatusCode::OK,
            json!({
                "status": "healthy",
                "version": env!("CARGO_PKG_VERSION"),
                "store": ctx.sink.name(),
                "store_version": store_version,
                "domains": domains,
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            json!({
                "status": "unhealthy",
                "store": ctx.sink.name(),
                "error": e.to_string(),
            }),
        ),
    }
}

pub fn version_inner() -> Value {
    let domains: Vec<&str> = DomainKind::ALL.iter().map(|k| k.name()).collect();
    json!({
        "version": env!("CARGO_PKG_VERSION"),
        "domains": domains,
    })
}

pub fn describe_inner(state: &DomainState) -> (StatusCode, Value) {
    let mut body = state.domain.describe();
    body["model"] = json!(state.predictor.name());
    (StatusCode::OK, body)
}

/// Predict and persist.
pub async fn predict_inner(state: &DomainState, body: Value) -> (StatusCode, Value) {
    let raw = match as_request(body) {
        Ok(raw) => raw,
        Err(e) => return failure(state, e.into()),
    };
    match predict::predict_and_record(state, &raw).await {
        Ok(outcome) => (StatusCode::OK, state.domain.respond(&outcome)),
        Err(e) => failure(state, e),
    }
}

/// Predict without persisting.
pub async fn whatif_inner(state: &DomainState, body: Value) -> (StatusCode, Value) {
    let raw = match as_request(body) {
        Ok(raw) => raw,
        Err(e) => return failure(state, e.into()),
    };
    match predict::predict(state.domain, state.predictor.as_ref(), &raw).await {
        Ok(prediction) => (StatusCode::OK, state.domain.respond(&prediction.outcome)),
        Err(e) => failure(state, e),
    }
}

/// Predict scenarios `a` and `b` from one body. Neither is persisted.
pub async fn compare_inner(state: &DomainState, body: Value) -> (StatusCode, Value) {
    let mut values = Vec::with_capacity(2);
    for key in ["a", "b"] {
        let raw = match body.get(key).cloned() {
            Some(scenario) => as_request(scenario),
            None => Err(ValidationError::MissingField(key.to_string())),
        };
        let raw = match raw {
            Ok(raw) => raw,
            Err(e) => return failure(state, e.into()),
        };
        match predict::predict(state.domain, state.predictor.as_ref(), &raw).await {
            Ok(prediction) => values.push(prediction.outcome.value),
            Err(e) => return failure(state, e),
        }
    }

    (
        StatusCode::OK,
        json!({ "success": true, "a": values[0], "b": values[1] }),
    )
}

pub fn feature_importance_inner(state: &DomainState) -> (StatusCode, Value) {
    let columns = state.domain.encoder().columns();
    match state.predictor.feature_importances() {
        Some(scores) if scores.len() == columns.len() => (
            StatusCode::OK,
            json!({
                "success": true,
                "data": bigmart::feature_importance(&columns, scores),
            }),
        ),
        Some(scores) => {
            tracing::error!(
                domain = state.domain.name(),
                expected = columns.len(),
                actual = scores.len(),
                "Feature importance width does not match the feature list"
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                state.domain.error_body("Feature importances unavailable"),
            )
        }
        None => (
            StatusCode::NOT_FOUND,
            state
                .domain
                .error_body("Model does not expose feature importances"),
        ),
    }
}

/// Recent records. A store read failure is logged and served as an empty list.
pub async fn history_inner(state: &DomainState, params: &HistoryParams) -> (StatusCode, Value) {
    match load_history(state, params).await {
        Ok(rows) => (
            StatusCode::OK,
            json!({
                "domain": state.domain.name(),
                "count": rows.len(),
                "records": rows,
            }),
        ),
        Err(failure) => failure,
    }
}

/// The same rows as `history_inner`, rendered as CSV.
pub async fn history_csv_inner(
    state: &DomainState,
    params: &HistoryParams,
) -> Result<String, (StatusCode, Value)> {
    let rows = load_history(state, params).await?;
    records::history_csv(state.domain, &rows).map_err(|e| {
        tracing::error!(domain = state.domain.name(), error = %e, "CSV export failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            state.domain.error_body("CSV export failed"),
        )
    })
}

async fn load_history(
    state: &DomainState,
    params: &HistoryParams,
) -> Result<Vec<Value>, (StatusCode, Value)> {
    if matches!(params.limit, Some(n) if n < 1) {
        return Err(bad_request(state, "limit must be a positive integer"));
    }
    let filter = history_filter(state, params).map_err(|e| bad_request(state, &e.to_string()))?;

    match records::history(state, params.limit, &filter).await {
        Ok(rows) => Ok(rows),
        Err(e) => {
            tracing::warn!(domain = state.domain.name(), error = %e, "History query failed");
            Ok(Vec::new())
        }
    }
}

fn history_filter(
    state: &DomainState,
    params: &HistoryParams,
) -> Result<RecordFilter, ValidationError> {
    match state.kind {
        DomainKind::BigMart => bigmart::history_filter(
            params.outlet_identifier.as_deref(),
            params.outlet_type.as_deref(),
            params.min_sales,
            params.max_sales,
        ),
        _ if params.has_sales_filter() => Err(ValidationError::Rule(format!(
            "History filters are not available for {}",
            state.domain.name()
        ))),
        _ => Ok(RecordFilter::default()),
    }
}

/// Dashboard aggregates. A store read failure is logged and served as an empty dashboard.
pub async fn dashboard_inner(state: &DomainState) -> (StatusCode, Value) {
    let body = match records::dashboard(state).await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(domain = state.domain.name(), error = %e, "Dashboard query failed");
            state.domain.dashboard(&[])
        }
    };
    (StatusCode::OK, body)
}

// ============================================================================
// Axum handler wrappers (thin, delegate to inner functions)
// ============================================================================

pub async fn health_handler(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    let (status, body) = health_inner(&ctx).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn describe_handler(State(state): State<Arc<DomainState>>) -> impl IntoResponse {
    let (status, body) = describe_inner(&state);
    (status, Json(body))
}

pub async fn predict_handler(
    State(state): State<Arc<DomainState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> impl IntoResponse {
    let (status, body) = match body {
        Ok(Json(body)) => predict_inner(&state, body).await,
        Err(rejection) => bad_request(&state, &rejection.body_text()),
    };
    (status, Json(body))
}

pub async fn form_predict_handler(
    State(state): State<Arc<DomainState>>,
    form: Result<Form<HashMap<String, String>>, FormRejection>,
) -> impl IntoResponse {
    let (status, body) = match form {
        Ok(Form(fields)) => predict_inner(&state, Value::Object(form_to_request(fields))).await,
        Err(rejection) => bad_request(&state, &rejection.body_text()),
    };
    (status, Json(body))
}

pub async fn whatif_handler(
    State(state): State<Arc<DomainState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> impl IntoResponse {
    let (status, body) = match body {
        Ok(Json(body)) => whatif_inner(&state, body).await,
        Err(rejection) => bad_request(&state, &rejection.body_text()),
    };
    (status, Json(body))
}

pub async fn compare_handler(
    State(state): State<Arc<DomainState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> impl IntoResponse {
    let (status, body) = match body {
        Ok(Json(body)) => compare_inner(&state, body).await,
        Err(rejection) => bad_request(&state, &rejection.body_text()),
    };
    (status, Json(body))
}

pub async fn feature_importance_handler(
    State(state): State<Arc<DomainState>>,
) -> impl IntoResponse {
    let (status, body) = feature_importance_inner(&state);
    (status, Json(body))
}

pub async fn history_handler(
    State(state): State<Arc<DomainState>>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> Response {
    let params = match params {
        Ok(Query(params)) => params,
        Err(rejection) => return json_response(bad_request(&state, &rejection.body_text())),
    };

    match params.format.as_deref() {
        None | Some("json") => json_response(history_inner(&state, &params).await),
        Some("csv") => match history_csv_inner(&state, &params).await {
            Ok(csv) => {
                let disposition = format!("attachment; filename=\"{}.csv\"", state.domain.table());
                (
                    [
                        (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                        (header::CONTENT_DISPOSITION, disposition),
                    ],
                    csv,
                )
                    .into_response()
            }
            Err(failure) => json_response(failure),
        },
        Some(other) => json_response(bad_request(
            &state,
            &format!("Unsupported format '{other}' (expected json or csv)"),
        )),
    }
}

pub async fn dashboard_handler(State(state): State<Arc<DomainState>>) -> impl IntoResponse {
    let (status, body) = dashboard_inner(&state).await;
    (status, Json(body))
}

// ============================================================================
// Helpers
// ============================================================================

/// Map a pipeline failure to a status and the domain's error body. Inference
/// details stay in the server log.
pub fn failure(state: &DomainState, err: PredictError) -> (StatusCode, Value) {
    match err {
        PredictError::Validation(e) => (
            StatusCode::BAD_REQUEST,
            state.domain.error_body(&e.to_string()),
        ),
        PredictError::Inference(e) => {
            tracing::error!(domain = state.domain.name(), error = %e, "Prediction failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                state.domain.error_body("Prediction failed"),
            )
        }
    }
}

fn bad_request(state: &DomainState, message: &str) -> (StatusCode, Value) {
    (StatusCode::BAD_REQUEST, state.domain.error_body(message))
}

fn json_response((status, body): (StatusCode, Value)) -> Response {
    (status, Json(body)).into_response()
}

/// Form fields arrive as strings; the encoder coerces them per feature.
pub fn form_to_request(fields: HashMap<String, String>) -> RawRequest {
    fields
        .into_iter()
        .map(|(key, value)| (key, Value::String(value)))
        .collect()
}

// ============================================================================
// Unit Tests: call inner functions directly
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use augur_core::{LinearModel, MemoryRecordSink, RecordSink};

    fn linear(kind: &str, width: usize, importances: Option<Vec<f64>>) -> LinearModel {
        let mut model = LinearModel::from_json(&format!(
            r#"{{"kind": "{kind}", "coefficients": [{}], "intercept": 0.0}}"#,
            vec!["0.0"; width].join(", ")
        ))
        .unwrap();
        model.feature_importances = importances;
        model
    }

    fn bigmart_state(importances: Option<Vec<f64>>) -> DomainState {
        DomainState::new(
            DomainKind::BigMart,
            Arc::new(linear("regression", 10, importances)),
            Arc::new(MemoryRecordSink::new()),
        )
    }

    fn bigmart_item() -> Value {
        json!({
            "Item_Weight": 9.3, "Item_Fat_Content": "LF", "Item_Visibility": 0.016,
            "Item_Type": "Dairy", "Item_MRP": 249.81, "Outlet_Identifier": "OUT049",
            "Outlet_Establishment_Year": 1999, "Outlet_Size": "Medium",
            "Outlet_Location_Type": "Tier 1", "Outlet_Type": "Supermarket Type1",
        })
    }

    // ========================================================================
    // TEST 1: version_inner is pure and lists every domain
    // ========================================================================
    #[test]
    fn test_version_inner_pure() {
        let v = version_inner();
        assert_eq!(v["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(v["domains"].as_array().unwrap().len(), 5);
    }

    // ========================================================================
    // TEST 2: describe_inner lists options and the model backend
    // ========================================================================
    #[test]
    fn test_describe_inner() {
        let state = bigmart_state(None);
        let (status, body) = describe_inner(&state);
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["domain"], "bigmart");
        assert_eq!(body["model"], "linear-regression");
        assert_eq!(body["features"][1]["options"], json!(["Low Fat", "Regular"]));
    }

    // ========================================================================
    // TEST 3: compare_inner returns both predictions and persists nothing
    // ========================================================================
    #[tokio::test]
    async fn test_compare_inner_not_persisted() {
        let sink = Arc::new(MemoryRecordSink::new());
        let state = DomainState::new(
            DomainKind::BigMart,
            Arc::new(linear("regression", 10, None)),
            sink.clone(),
        );
        let (status, body) =
            compare_inner(&state, json!({"a": bigmart_item(), "b": bigmart_item()})).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["success"], true);
        assert_eq!(body["a"], 0.0);
        assert_eq!(body["b"], 0.0);
        assert_eq!(sink.len("bigmart_predictions"), 0);
    }

    // ========================================================================
    // TEST 4: compare_inner without scenario b is a 400 with success=false
    // ========================================================================
    #[tokio::test]
    async fn test_compare_inner_missing_scenario() {
        let state = bigmart_state(None);
        let (status, body) = compare_inner(&state, json!({"a": bigmart_item()})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Missing field: b");
    }

    // ========================================================================
    // TEST 5: feature importances grouped, or 404 when the model has none
    // ========================================================================
    #[test]
    fn test_feature_importance_inner() {
        let state = bigmart_state(Some(vec![0.1, 0.0, 0.1, 0.0, 0.6, 0.0, 0.0, 0.0, 0.0, 0.2]));
        let (status, body) = feature_importance_inner(&state);
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["feature"], "Item MRP");
        assert_eq!(body["data"][0]["pct"], 60.0);
        assert_eq!(body["data"][1]["feature"], "Outlet Type");

        let (status, body) = feature_importance_inner(&bigmart_state(None));
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
    }

    // ========================================================================
    // TEST 6: non-object body is a validation failure
    // ========================================================================
    #[tokio::test]
    async fn test_predict_inner_rejects_array_body() {
        let state = bigmart_state(None);
        let (status, body) = predict_inner(&state, json!([1, 2, 3])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Request body must be a JSON object");
    }

    // ========================================================================
    // TEST 7: inference failures hide details behind a generic message
    // ========================================================================
    #[tokio::test]
    async fn test_inference_failure_is_generic_500() {
        // Logistic output where a regressor is expected.
        let state = DomainState::new(
            DomainKind::BigMart,
            Arc::new(linear("logistic", 10, None)),
            Arc::new(MemoryRecordSink::new()),
        );
        let (status, body) = predict_inner(&state, bigmart_item()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"success": false, "error": "Prediction failed"}));
    }

    // ========================================================================
    // TEST 8: history_inner rejects non-positive limits
    // ========================================================================
    #[tokio::test]
    async fn test_history_inner_rejects_zero_limit() {
        let state = bigmart_state(None);
        let zero = HistoryParams {
            limit: Some(0),
            ..Default::default()
        };
        let (status, _) = history_inner(&state, &zero).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = history_inner(&state, &HistoryParams::default()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 0);
    }

    // ========================================================================
    // TEST 9: form fields become string values for the encoder
    // ========================================================================
    #[test]
    fn test_form_to_request() {
        let mut fields = HashMap::new();
        fields.insert("pressure".to_string(), "1015.9".to_string());
        let raw = form_to_request(fields);
        assert_eq!(raw["pressure"], "1015.9");
    }

    // ========================================================================
    // TEST 10: health_inner reports the memory store and hosted domains
    // ========================================================================
    #[tokio::test]
    async fn test_health_inner_memory_store() {
        let sink: Arc<dyn RecordSink> = Arc::new(MemoryRecordSink::new());
        let state = Arc::new(DomainState::new(
            DomainKind::BigMart,
            Arc::new(linear("regression", 10, None)),
            Arc::clone(&sink),
        ));
        let ctx = AppContext::new(sink, vec![state]);
        let (status, body) = health_inner(&ctx).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["store"], "memory");
        assert_eq!(body["domains"][0]["domain"], "bigmart");
    }

    // ========================================================================
    // TEST 11: outlet filters only apply to bigmart history
    // ========================================================================
    #[tokio::test]
    async fn test_history_filters_outside_bigmart_are_rejected() {
        let state = DomainState::new(
            DomainKind::Insurance,
            Arc::new(linear("regression", 8, None)),
            Arc::new(MemoryRecordSink::new()),
        );
        let params = HistoryParams {
            outlet_type: Some("Grocery Store".to_string()),
            ..Default::default()
        };
        let (status, body) = history_inner(&state, &params).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .contains("not available for insurance"));

        let bigmart = bigmart_state(None);
        let bad_type = HistoryParams {
            outlet_type: Some("Kiosk".to_string()),
            ..Default::default()
        };
        let (status, _) = history_inner(&bigmart, &bad_type).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let csv = history_csv_inner(&bigmart, &HistoryParams::default())
            .await
            .unwrap();
        assert!(csv.starts_with("Item_Weight,"));
    }
}
