//! Core vocabulary of the goal-driven transition engine: status values,
//! entities ("things"), actions, and targets. This crate has no I/O of its
//! own — every concrete entity kind and every driver lives downstream.

mod action;
mod error;
mod status;
mod target;
mod thing;

pub use action::Action;
pub use error::DomainError;
pub use status::{downcast_compare, StatusValue};
pub use target::{targets_conflict, targets_equal, Target};
pub use thing::Thing;
