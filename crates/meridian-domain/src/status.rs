use std::any::Any;
use std::fmt::{Debug, Display};

/// An opaque status value with a *satisfies* preorder and an *equals*
/// equivalence. Concrete entity kinds implement this over their own
/// status enum; cross-kind comparisons must gracefully return `false`
/// rather than panicking, so the planner can stay polymorphic.
pub trait StatusValue: Debug + Display + Send + Sync {
    /// True when reaching `self` is at least as much work as reaching `other`
    /// — i.e. `self` already satisfies the `other` requirement.
    fn satisfies(&self, other: &dyn StatusValue) -> bool;

    /// True only when `other` is exactly this status (same kind, same value).
    fn equals(&self, other: &dyn StatusValue) -> bool;

    fn clone_box(&self) -> Box<dyn StatusValue>;

    fn as_any(&self) -> &dyn Any;
}

impl Clone for Box<dyn StatusValue> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Helper for entity-kind status enums: downcasts `other` to `Self` and
/// applies `f`, returning `false` on a kind mismatch. Mirrors the
/// `other.(Status)` type assertion used throughout the source system this
/// was modeled on.
pub fn downcast_compare<S, F>(other: &dyn StatusValue, f: F) -> bool
where
    S: StatusValue + 'static,
    F: FnOnce(&S) -> bool,
{
    match other.as_any().downcast_ref::<S>() {
        Some(casted) => f(casted),
        None => false,
    }
}
