use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use meridian_domain::{Action, StatusValue, Target};

/// Internal planning artifact: one chosen hop, from `from_status` to
/// `target.desired_status`, plus the prerequisites that had to already be
/// satisfied for `action` to be runnable.
pub struct Transition {
    pub target: Target,
    pub action: Arc<dyn Action>,
    pub from_status: Box<dyn StatusValue>,
    pub prerequisites: Vec<Target>,
    pub started: Instant,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} => {})", self.action, self.from_status, self.target.desired_status)
    }
}

/// Visited-set membership test keyed by status equality rather than a hash
/// — status sets per entity kind are tiny (at most six values), so a linear
/// scan is simpler than requiring `StatusValue: Hash`.
pub(crate) fn visited_contains(visited: &[Box<dyn StatusValue>], status: &dyn StatusValue) -> bool {
    visited.iter().any(|v| v.equals(status))
}
