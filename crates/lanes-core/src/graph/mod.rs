//! Graph-level views over a project's tickets.
//!
//! ## Submodules
//!
//! - [`hierarchy`]: arena-backed parent/child index, cycle detection and
//!   degraded-subtree tracking.

pub mod hierarchy;

pub use hierarchy::{HierarchyError, HierarchyIndex};
