use std::fmt::Display;

use async_trait::async_trait;

use crate::error::DomainError;
use crate::target::Target;

/// An opaque unit of externally-visible work bound to one status hop of one
/// entity. `apply()` may block, shell out, and take minutes; the executor's
/// job is making sure it's only ever run when safe to do so concurrently
/// with whatever else is in flight.
#[async_trait]
pub trait Action: Display + Send + Sync {
    async fn apply(&self) -> Result<(), DomainError>;

    /// True means no other action — of any kind, on any entity — may run
    /// while this one is in flight.
    fn is_exclusive(&self) -> bool;

    /// Must be a pure function: repeated calls return equal lists.
    fn prerequisites(&self) -> Result<Vec<Target>, DomainError>;
}
