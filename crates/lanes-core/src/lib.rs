//! lanes-core library.
//!
//! # Conventions
//!
//! - **Errors**: library errors are `thiserror` enums that map to a stable
//!   [`error::ErrorCode`]; setup paths (config, opening a store) return
//!   `anyhow::Result`.
//! - **Logging**: use `tracing` macros (`info!`, `warn!`, `debug!`, `trace!`).
//!
//! # Layout
//!
//! - [`model`]: tickets, statuses, drafts and patches.
//! - [`graph`]: the parent/child index.
//! - [`workflow`]: the transition guard and the cascade planner.
//! - [`board`]: optimistic board reconciliation and the store-backed session.
//! - [`store`]: the persistence trait with SQLite and in-memory backends.
//! - [`bus`]: board event publish/subscribe.
//! - [`config`]: `.lanes/config.toml` loading.

pub mod board;
pub mod bus;
pub mod config;
pub mod error;
pub mod graph;
pub mod model;
pub mod store;
pub mod workflow;

pub use board::{Board, EffectPlan, MoveResult, Session};
pub use error::ErrorCode;
pub use model::{Status, Ticket, TicketId};
