//! Parse errors for wire messages and ontology payloads

use thiserror::Error;

/// Why an inbound payload could not be turned into a typed value.
///
/// Returned from every parse step so callers can log and drop the message
/// without touching any shared state.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown performative: {0}")]
    UnknownPerformative(String),

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl ParseError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

pub type ParseResult<T> = std::result::Result<T, ParseError>;
