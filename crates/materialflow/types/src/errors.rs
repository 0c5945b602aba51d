//! Error types for the materialflow domain types

/// Errors raised while interpreting an external event
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("Malformed event JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown event type: {0}")]
    UnknownType(String),

    #[error("Event '{event_type}' is missing field '{field}'")]
    MissingField {
        event_type: String,
        field: &'static str,
    },

    #[error("Unknown order step status: {0}")]
    UnknownStatus(String),

    #[error("Unrecognized event text: {0}")]
    Unrecognized(String),
}
