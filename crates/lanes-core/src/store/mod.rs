//! Persistence collaborator.
//!
//! The board never talks to storage directly; [`Session`](crate::board::Session)
//! and the simulation harness drive a [`TicketStore`] and feed confirmed state
//! back into the board.
//!
//! Two implementations ship:
//!
//! - [`SqliteStore`] keeps tickets in a single SQLite table (`.lanes/lanes.db`).
//! - [`MemoryStore`] is a mutex-guarded map with failure injection for tests
//!   and simulation.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::ErrorCode;
use crate::model::{DeleteMode, Status, Ticket, TicketDraft, TicketId, TicketPatch};

/// Errors reported by a [`TicketStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("ticket not found: '{0}'")]
    NotFound(TicketId),

    #[error("key '{key}' already exists in project '{project_id}'")]
    DuplicateKey { project_id: String, key: String },

    #[error("invalid parent '{parent_id}': {reason}")]
    InvalidParent { parent_id: TicketId, reason: String },

    /// Transient failure; the same call may succeed later.
    #[error("persistence unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
}

impl StoreError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::TicketNotFound,
            Self::DuplicateKey { .. } => ErrorCode::DuplicateKey,
            Self::InvalidParent { .. } => ErrorCode::InvalidParent,
            Self::Unavailable(_) => ErrorCode::PersistenceUnavailable,
            Self::Db(_) => ErrorCode::StoreFailure,
        }
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }
}

/// Durable ticket storage.
///
/// Every method is a single persistence call. Status updates are idempotent:
/// writing the current status again succeeds and returns the stored
/// ticket without touching `updated_at_us`.
pub trait TicketStore {
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if no ticket has this id.
    fn get_ticket(&self, id: &TicketId) -> Result<Ticket, StoreError>;

    /// # Errors
    ///
    /// [`StoreError::NotFound`] or any backend failure.
    fn update_ticket_status(&self, id: &TicketId, status: Status) -> Result<Ticket, StoreError>;

    /// Direct children of `parent_id`, oldest first.
    ///
    /// # Errors
    ///
    /// Backend failures only; an unknown parent has no children.
    fn get_children(&self, parent_id: &TicketId) -> Result<Vec<Ticket>, StoreError>;

    /// # Errors
    ///
    /// [`StoreError::DuplicateKey`] if the key is taken in the project,
    /// [`StoreError::InvalidParent`] if the parent is missing or belongs to
    /// another project.
    fn create_ticket(&self, draft: &TicketDraft) -> Result<Ticket, StoreError>;

    /// Delete a ticket. Returns the ids that were removed (the ticket itself,
    /// plus its descendants in [`DeleteMode::Cascade`]).
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] or any backend failure.
    fn delete_ticket(&self, id: &TicketId, mode: DeleteMode) -> Result<Vec<TicketId>, StoreError>;

    /// Every ticket in the project, oldest first.
    ///
    /// # Errors
    ///
    /// Backend failures only.
    fn list_tickets(&self, project_id: &str) -> Result<Vec<Ticket>, StoreError>;

    /// Apply a patch to the mutable non-status fields.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`], or [`StoreError::InvalidParent`] when the
    /// new parent is missing, in another project, or a descendant.
    fn update_ticket(&self, id: &TicketId, patch: &TicketPatch) -> Result<Ticket, StoreError>;
}

fn invalid_parent(parent_id: &TicketId, reason: &str) -> StoreError {
    StoreError::InvalidParent {
        parent_id: parent_id.clone(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_stable_codes() {
        assert_eq!(
            StoreError::NotFound("tk-1".into()).code(),
            ErrorCode::TicketNotFound
        );
        assert_eq!(
            StoreError::DuplicateKey {
                project_id: "PRJ".into(),
                key: "PRJ-1".into()
            }
            .code()
            .code(),
            "E2005"
        );
        assert!(StoreError::Unavailable("flaky".into()).is_retryable());
        assert!(!invalid_parent(&"tk-2".into(), "missing").is_retryable());
    }

    #[test]
    fn store_error_messages_name_the_subject() {
        let err = StoreError::DuplicateKey {
            project_id: "PRJ".into(),
            key: "PRJ-1".into(),
        };
        assert_eq!(err.to_string(), "key 'PRJ-1' already exists in project 'PRJ'");
        assert_eq!(
            invalid_parent(&"tk-2".into(), "descendant of ticket").to_string(),
            "invalid parent 'tk-2': descendant of ticket"
        );
    }
}
