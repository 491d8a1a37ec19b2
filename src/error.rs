use thiserror::Error;

use crate::models::AlertStatus;

/// Reasons an incoming alert record is refused before it reaches policy logic.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("confidence {value} for `{field}` is outside [0, 1]")]
    ConfidenceOutOfRange { field: &'static str, value: f64 },

    #[error("unparsable timestamp `{0}`")]
    InvalidTimestamp(String),

    #[error("unknown alert kind `{0}`")]
    UnknownKind(String),

    #[error("unknown severity `{0}`")]
    UnknownSeverity(String),

    #[error("unknown status `{0}`")]
    UnknownStatus(String),

    #[error("unknown source type `{0}`")]
    UnknownSourceType(String),

    #[error("score {0} is outside [0, 1]")]
    ScoreOutOfRange(f64),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("cannot move alert from {from} to {to}")]
    InvalidTransition { from: AlertStatus, to: AlertStatus },
}
