use thiserror::Error;

use meridian_domain::DomainError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("cannot reach {desired} from {current}")]
    NoChain { current: String, desired: String },

    #[error("execute: blocked execution - nothing runs but no candidate found")]
    Deadlocked,
}
