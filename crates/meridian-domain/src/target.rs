use std::fmt;
use std::sync::Arc;

use crate::status::StatusValue;
use crate::thing::Thing;

/// A user- or planner-issued goal: an entity and a desired status, with a
/// flag controlling whether `satisfies` or `equals` decides "are we there".
#[derive(Clone)]
pub struct Target {
    pub thing: Arc<dyn Thing>,
    pub desired_status: Box<dyn StatusValue>,
    pub match_exact: bool,
}

impl Target {
    pub fn new(thing: Arc<dyn Thing>, desired_status: Box<dyn StatusValue>, match_exact: bool) -> Self {
        Target { thing, desired_status, match_exact }
    }

    /// `compareStatus` in the source system: dispatches to `equals` or
    /// `satisfies` depending on `match_exact`.
    pub fn compare(current: &dyn StatusValue, desired: &dyn StatusValue, match_exact: bool) -> bool {
        if match_exact {
            current.equals(desired)
        } else {
            current.satisfies(desired)
        }
    }

    /// True iff this target is already satisfied by the entity's current
    /// status.
    pub async fn is_done(&self) -> bool {
        let current = self.thing.status().await;
        Target::compare(current.as_ref(), self.desired_status.as_ref(), self.match_exact)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} (exact={})",
            self.thing, self.desired_status, self.match_exact
        )
    }
}

/// Two targets conflict — and so must not both be in flight — unless they
/// reference different entities, or each target's own desired status is
/// satisfied by the other's under its own `match_exact` setting.
pub fn targets_conflict(a: &Target, b: &Target) -> bool {
    if !a.thing.equals(b.thing.as_ref()) {
        return false;
    }

    let mutually_satisfied = Target::compare(a.desired_status.as_ref(), b.desired_status.as_ref(), a.match_exact)
        && Target::compare(b.desired_status.as_ref(), a.desired_status.as_ref(), b.match_exact);

    !mutually_satisfied
}

/// Targets are equal when they name the same entity and the same desired
/// status — used for one-to-one constraint bookkeeping (removing exactly
/// one matching entry, not a set-union removal).
pub fn targets_equal(a: &Target, b: &Target) -> bool {
    a.thing.equals(b.thing.as_ref()) && a.desired_status.equals(b.desired_status.as_ref())
}
