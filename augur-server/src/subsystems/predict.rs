//! Prediction pipeline: rules, encoding, model call, interpretation, and the
//! record append for requests that are persisted.

use augur_core::{
    Domain, EncodedRequest, InferenceError, Outcome, PredictionRecord, Predictor, RawRequest,
    ValidationError,
};
use thiserror::Error;

use crate::context::DomainState;

#[derive(Debug, Error)]
pub enum PredictError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

#[derive(Debug, Clone)]
pub struct Prediction {
    pub encoded: EncodedRequest,
    pub outcome: Outcome,
}

/// Validate, encode and run one request. Nothing is persisted.
///
/// Validation always completes before the model is called.
pub async fn predict(
    domain: &dyn Domain,
    predictor: &dyn Predictor,
    raw: &RawRequest,
) -> Result<Prediction, PredictError> {
    domain.check_rules(raw)?;
    let encoded = domain.encoder().encode(raw)?;
    let output = predictor.predict(&encoded.vector).await?;
    let outcome = domain.interpret(&output)?;
    Ok(Prediction { encoded, outcome })
}

/// Run one request and append it to the domain's table.
///
/// A failed append is logged and does not change the returned outcome.
pub async fn predict_and_record(
    state: &DomainState,
    raw: &RawRequest,
) -> Result<Outcome, PredictError> {
    let Prediction { encoded, outcome } =
        predict(state.domain, state.predictor.as_ref(), raw).await?;

    let record = PredictionRecord::new(encoded.canonical, &outcome);
    if let Err(e) = state.sink.append(state.domain.table(), &record).await {
        tracing::warn!(
            domain = state.domain.name(),
            sink = state.sink.name(),
            error = %e,
            "Failed to persist prediction"
        );
    }

    Ok(outcome)
}
