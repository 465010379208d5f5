use std::any::Any;
use std::fmt::Display;
use std::sync::Arc;

use async_trait::async_trait;

use crate::action::Action;
use crate::error::DomainError;
use crate::status::StatusValue;

/// A managed entity: image, cluster, storage node, or run-task. `Thing` is
/// the polymorphic seam the planner and executor operate over — they never
/// need to know which concrete kind they're driving.
#[async_trait]
pub trait Thing: Display + Send + Sync {
    /// Current status, read fresh (after whatever the last `set_status`
    /// committed).
    async fn status(&self) -> Box<dyn StatusValue>;

    /// Update in-memory status and persist it. Persistence is part of the
    /// contract: a write failure must surface as an error, not be silently
    /// swallowed (Invariant I1).
    async fn set_status(&self, status: Box<dyn StatusValue>) -> Result<(), DomainError>;

    /// All legal predecessor statuses for a direct transition into `to`. An
    /// empty result for a non-initial status means that status is
    /// unreachable.
    fn get_transitions(&self, to: &dyn StatusValue) -> Result<Vec<Box<dyn StatusValue>>, DomainError>;

    /// The action for one hop `current -> target`. Pairs absent from the
    /// transition table fail with `UnsupportedTransition`.
    async fn get_action(
        &self,
        current: &dyn StatusValue,
        target: &dyn StatusValue,
    ) -> Result<Arc<dyn Action>, DomainError>;

    /// Structural identity: status, identity path, provider identity,
    /// template/config paths, and variable fingerprint all compared.
    fn equals(&self, other: &dyn Thing) -> bool;

    fn as_any(&self) -> &dyn Any;
}
