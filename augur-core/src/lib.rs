pub mod classifier;
pub mod config;
pub mod db;
pub mod domains;
pub mod encoder;
pub mod error;
pub mod onnx_model;
pub mod predictor;
pub mod sink;

pub use classifier::{round_to, RiskTiers};
pub use config::{AugurConfig, DomainConfig, StoreBackend};
pub use domains::{Domain, DomainKind, Outcome, RecordFilter};
pub use encoder::{as_request, EncodedRequest, FeatureEncoder, FeatureVector, RawRequest};
pub use error::{AugurError, InferenceError, ModelError, PersistenceError, ValidationError};
pub use onnx_model::OnnxPredictor;
pub use predictor::{load_predictor, LinearModel, ModelOutput, Predictor};
pub use sink::{MemoryRecordSink, PgRecordSink, PredictionRecord, RecordSink};
