use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("cannot set status: {0} is not a status of this entity's kind")]
    WrongStatusKind(String),

    #[error("unsupported transition ({from} => {to})")]
    UnsupportedTransition { from: String, to: String },

    #[error("unexpected status value: {0}")]
    UnexpectedStatus(String),

    #[error("value is not of the expected entity kind: {0}")]
    WrongThingKind(String),

    #[error("missing required user variable: {0}")]
    MissingVariable(String),

    #[error("unsupported or incorrect user variables for provider {provider}: {reason}")]
    InvalidUserVariables { provider: String, reason: String },

    #[error("malformed parameter file {path}: {reason}")]
    MalformedParameters { path: String, reason: String },

    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("{0}")]
    Other(String),
}
