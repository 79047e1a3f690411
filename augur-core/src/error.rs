use thiserror::Error;

/// Startup and wiring failures. Any of these aborts the process.
#[derive(Error, Debug)]
pub enum AugurError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Missing environment variable {0}")]
    MissingEnv(&'static str),

    #[error("Other error: {0}")]
    Other(String),
}

/// Bad, missing or unknown input. User-correctable, reported as HTTP 400.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Request body must be a JSON object")]
    NotAnObject,

    #[error("Missing field: {0}")]
    MissingField(String),

    #[error("Missing value for {0}")]
    MissingValue(String),

    #[error("Unknown value '{value}' for {field}. Valid options: {options:?}")]
    UnknownCategory {
        field: String,
        value: String,
        options: Vec<&'static str>,
    },

    #[error("{field} must be a number, got '{value}'")]
    NotNumeric { field: String, value: String },

    #[error("{field} must be a whole number, got '{value}'")]
    NotInteger { field: String, value: String },

    /// Domain rule violated (e.g. non-positive income).
    #[error("{0}")]
    Rule(String),
}

/// The model call failed or returned something the domain cannot interpret.
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Model expects {expected} features, got {actual}")]
    FeatureCount { expected: usize, actual: usize },

    #[error("ONNX inference error: {0}")]
    Onnx(String),

    #[error("Unexpected model output: {0}")]
    UnexpectedOutput(String),
}

/// Record sink write or read failed. Logged by the caller, never surfaced.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Record sink unavailable: {0}")]
    Unavailable(String),
}

/// Model artifact could not be loaded.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Model artifact not found at {path}")]
    NotFound { path: String },

    #[error("Unsupported model artifact '{path}' (expected .onnx or .json)")]
    UnsupportedFormat { path: String },

    #[error("Invalid model artifact: {0}")]
    Invalid(String),

    #[error("Model expects {expected} features but the domain supplies {actual}")]
    FeatureMismatch { expected: usize, actual: usize },

    #[error("ONNX runtime error: {0}")]
    Onnx(String),
}
