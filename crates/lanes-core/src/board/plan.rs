//! Values handed back by the board for the caller to persist or display.

use serde::Serialize;

use crate::error::ErrorCode;
use crate::model::{Status, Ticket, TicketId};
use crate::store::StoreError;
use crate::workflow::{Denial, Effect};

/// An applied effect tagged with the write sequence its persistence call
/// must report back with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedEffect {
    pub seq: u64,
    #[serde(flatten)]
    pub effect: Effect,
}

/// Every effect of one accepted move, originating ticket first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectPlan {
    pub ticket_id: TicketId,
    pub target: Status,
    pub effects: Vec<PlannedEffect>,
}

impl EffectPlan {
    /// Plan for a move to the ticket's current status.
    #[must_use]
    pub const fn noop(ticket_id: TicketId, target: Status) -> Self {
        Self {
            ticket_id,
            target,
            effects: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.effects.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.effects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Ancestor effects, i.e. everything after the originating ticket.
    pub fn cascaded(&self) -> impl Iterator<Item = &PlannedEffect> {
        self.effects.iter().skip(1)
    }
}

/// Result of [`Board::apply_move`](super::Board::apply_move).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "kebab-case")]
pub enum MoveResult {
    Applied(EffectPlan),
    Denied(Denial),
}

impl MoveResult {
    #[must_use]
    pub const fn plan(&self) -> Option<&EffectPlan> {
        match self {
            Self::Applied(plan) => Some(plan),
            Self::Denied(_) => None,
        }
    }

    #[must_use]
    pub const fn denial(&self) -> Option<&Denial> {
        match self {
            Self::Applied(_) => None,
            Self::Denied(denial) => Some(denial),
        }
    }

    #[must_use]
    pub const fn is_denied(&self) -> bool {
        matches!(self, Self::Denied(_))
    }
}

/// What a confirmation did to the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfirmOutcome {
    /// The confirmed ticket replaced the local snapshot.
    Applied,
    /// A newer write for the ticket was issued after this one; ignored.
    Stale,
    /// Unknown or already-settled sequence, or the ticket left the board.
    Ignored,
}

/// A failed effect write, surfaced to the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectFailure {
    pub seq: u64,
    #[serde(flatten)]
    pub effect: Effect,
    /// `true` if the ticket was put back to `effect.from`; `false` when a
    /// newer write already owns the ticket.
    pub reverted: bool,
    pub code: ErrorCode,
    pub message: String,
    pub retryable: bool,
}

impl EffectFailure {
    pub(crate) fn new(seq: u64, effect: Effect, reverted: bool, error: &StoreError) -> Self {
        let code = error.code();
        Self {
            seq,
            effect,
            reverted,
            code,
            message: error.to_string(),
            retryable: code.is_retryable(),
        }
    }
}

/// Tickets taken off the board by a delete, kept so the delete can be
/// undone if persistence refuses it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Removal {
    /// Deleted tickets, the requested one first.
    pub removed: Vec<Ticket>,
    /// Children whose parent reference was cleared, as they were before.
    pub detached: Vec<Ticket>,
}

impl Removal {
    #[must_use]
    pub fn removed_ids(&self) -> Vec<TicketId> {
        self.removed.iter().map(|t| t.id.clone()).collect()
    }
}
