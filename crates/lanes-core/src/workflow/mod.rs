//! Workflow rules: the transition guard and the ancestor cascade planner.
//!
//! Both are pure functions over a [`HierarchyIndex`](crate::graph::HierarchyIndex)
//! snapshot. The board runs them in order: [`validate`] first, then
//! [`propagate`] for allowed moves.

pub mod cascade;
pub mod validate;

pub use cascade::{CascadePolicy, Effect, propagate};
pub use validate::{BlockingTicket, Denial, DenyReason, Verdict, validate};
