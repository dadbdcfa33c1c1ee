//! Error taxonomy shared by every layer of the widget pipeline.

use thiserror::Error;

/// Engine error types.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A template references a parameter that is unknown or was not provided.
    #[error("placeholder {{{{{0}}}}} is not bound")]
    PlaceholderUnbound(String),
    /// The injection target is not a well-formed bool query.
    #[error("invalid bool query: {0}")]
    InvalidBoolQuery(String),
    /// Document-store, RPC or HTTP call failed.
    #[error("transport error: {0}")]
    Transport(String),
    /// A required aggregation path is of an unexpected type.
    #[error("unexpected aggregation shape at {0}")]
    BadAggregationShape(String),
    #[error("request canceled")]
    Canceled,
    #[error("invalid parameters: {0}")]
    InvalidParams(String),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        EngineError::Transport(e.to_string())
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
