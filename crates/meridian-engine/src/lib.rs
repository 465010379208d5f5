//! Goal-driven transition engine: given a [`meridian_domain::Target`], works
//! out the chain of [`meridian_domain::Action`]s needed to reach it and runs
//! as many of them concurrently as the admission rules allow.

mod error;
mod executor;
mod transition;

pub use error::EngineError;
pub use executor::Executor;
pub use transition::Transition;

use meridian_domain::Target;

/// Convenience entry point: drive a single target to completion with a
/// fresh executor. Equivalent to `Executor::new(simulate).execute(target)`.
pub async fn reach_target(target: Target, simulate: bool) -> Result<(), EngineError> {
    Executor::new(simulate).execute(target).await
}
