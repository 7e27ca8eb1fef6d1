//! A board paired with a store: the synchronous driver of the optimistic
//! flow. Every persistence call completes before the method returns, so
//! confirmations arrive in plan order.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::{Board, BoardError, ConfirmOutcome, EffectFailure, MoveResult};
use crate::bus::Notifier;
use crate::error::ErrorCode;
use crate::model::{DeleteMode, Status, Ticket, TicketDraft, TicketId, TicketPatch};
use crate::store::{StoreError, TicketStore};
use crate::workflow::CascadePolicy;

/// Failures of session operations other than moves.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Board(#[from] BoardError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SessionError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Board(err) => err.code(),
            Self::Store(err) => err.code(),
        }
    }
}

/// Outcome of [`Session::move_ticket`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveReport {
    pub result: MoveResult,
    /// Sequences whose writes succeeded.
    pub confirmed: Vec<u64>,
    /// Writes that failed, in plan order.
    pub failures: Vec<EffectFailure>,
}

impl MoveReport {
    #[must_use]
    pub const fn is_denied(&self) -> bool {
        self.result.is_denied()
    }

    /// Applied and every write persisted.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        !self.is_denied() && self.failures.is_empty()
    }
}

/// Board plus store for one project.
#[derive(Debug)]
pub struct Session<S: TicketStore> {
    store: S,
    board: Board,
}

impl<S: TicketStore> Session<S> {
    /// Load every ticket of `project_id` from `store` into a fresh board.
    ///
    /// # Errors
    ///
    /// Returns the store error if listing tickets fails.
    pub fn open(
        store: S,
        project_id: impl Into<String>,
        policy: CascadePolicy,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, StoreError> {
        let project_id = project_id.into();
        let tickets = store.list_tickets(&project_id)?;
        let board = Board::load(project_id, tickets, policy, notifier);
        Ok(Self { store, board })
    }

    #[must_use]
    pub const fn board(&self) -> &Board {
        &self.board
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Apply a move and persist each of its effects independently.
    pub fn move_ticket(&mut self, id: &TicketId, status: Status) -> MoveReport {
        let result = self.board.apply_move(id, status);
        let mut confirmed = Vec::new();
        let mut failures = Vec::new();

        if let MoveResult::Applied(plan) = &result {
            for planned in &plan.effects {
                let effect = &planned.effect;
                match self.store.update_ticket_status(&effect.ticket_id, effect.to) {
                    Ok(ticket) => {
                        if self.board.confirm(planned.seq, ticket) == ConfirmOutcome::Applied {
                            confirmed.push(planned.seq);
                        }
                    }
                    Err(err) => {
                        if let Some(failure) = self.board.fail(planned.seq, &err) {
                            failures.push(failure);
                        }
                    }
                }
            }
        }

        MoveReport {
            result,
            confirmed,
            failures,
        }
    }

    /// Stage, persist and reconcile a new ticket.
    ///
    /// # Errors
    ///
    /// Board refusals leave everything untouched; store failures drop the
    /// pending ticket again.
    pub fn create_ticket(&mut self, draft: &TicketDraft) -> Result<Ticket, SessionError> {
        let pending = self.board.stage_create(draft)?;
        match self.store.create_ticket(draft) {
            Ok(ticket) => {
                self.board.apply_create(ticket.clone());
                info!(ticket_id = %ticket.id, key = %ticket.key, "ticket created");
                Ok(ticket)
            }
            Err(err) => {
                warn!(key = %draft.key, error = %err, "create failed; pending ticket discarded");
                self.board.discard_pending(&pending.id)?;
                Err(err.into())
            }
        }
    }

    /// Persist a patch and apply the confirmed ticket.
    ///
    /// # Errors
    ///
    /// Refuses unknown tickets and cyclic reparenting before touching the
    /// store; store errors are passed through.
    pub fn update_ticket(&mut self, id: &TicketId, patch: &TicketPatch) -> Result<Ticket, SessionError> {
        self.board.check_patch(id, patch)?;
        let ticket = self.store.update_ticket(id, patch)?;
        self.board.apply_remote_update(ticket.clone());
        Ok(ticket)
    }

    /// Delete locally, persist, and restore the board if the store refuses.
    ///
    /// # Errors
    ///
    /// [`BoardError::TicketNotFound`] or the store error.
    pub fn delete_ticket(&mut self, id: &TicketId, mode: DeleteMode) -> Result<Vec<TicketId>, SessionError> {
        let removal = self.board.apply_delete(id, mode)?;
        match self.store.delete_ticket(id, mode) {
            Ok(removed) => Ok(removed),
            Err(err) => {
                warn!(ticket_id = %id, error = %err, "delete failed; restoring");
                self.board.restore(removal);
                Err(err.into())
            }
        }
    }

    /// Reload the project from the store.
    ///
    /// # Errors
    ///
    /// Returns the store error if listing tickets fails; the board is left
    /// as it was.
    pub fn refresh(&mut self) -> Result<(), StoreError> {
        let tickets = self.store.list_tickets(self.board.project_id())?;
        self.board.refresh(tickets);
        Ok(())
    }
}
