//! Hierarchy-aware guard for status changes.
//!
//! The only hard rule: a parent may not move ahead of its slowest child, and
//! may only be done when every child is done. Backward moves and moves of
//! leaf tickets are always allowed; their effect on ancestors is the cascade
//! planner's business, not the validator's.

use serde::Serialize;
use std::fmt;

use crate::error::ErrorCode;
use crate::graph::HierarchyIndex;
use crate::model::{Status, Ticket, TicketId};

/// Outcome of validating a proposed status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Deny(Denial),
}

impl Verdict {
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Why a status change was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DenyReason {
    /// Moving a parent to done while a child is not done.
    ChildrenNotDone,
    /// Moving a parent forward past at least one child.
    AheadOfChildren,
    /// The ticket is not on the board.
    TicketNotFound,
    /// The ticket's parent reference cannot be resolved.
    ParentNotFound,
}

impl DenyReason {
    /// Short reason string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ChildrenNotDone => "children not done",
            Self::AheadOfChildren => "would move ahead of children",
            Self::TicketNotFound => "ticket not found",
            Self::ParentNotFound => "parent not found",
        }
    }

    #[must_use]
    pub const fn code(self) -> ErrorCode {
        match self {
            Self::ChildrenNotDone | Self::AheadOfChildren => ErrorCode::TransitionDenied,
            Self::TicketNotFound => ErrorCode::TicketNotFound,
            Self::ParentNotFound => ErrorCode::ParentNotFound,
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A child ticket that stands in the way of a parent's move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockingTicket {
    pub id: TicketId,
    pub key: String,
    pub status: Status,
}

impl From<&Ticket> for BlockingTicket {
    fn from(ticket: &Ticket) -> Self {
        Self {
            id: ticket.id.clone(),
            key: ticket.key.clone(),
            status: ticket.status,
        }
    }
}

/// A refused status change, ready to show to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Denial {
    pub ticket_id: TicketId,
    pub from: Option<Status>,
    pub to: Status,
    pub reason: DenyReason,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub blocking: Vec<BlockingTicket>,
}

impl Denial {
    /// Denial for a ticket id that could not be found at all.
    #[must_use]
    pub const fn not_found(ticket_id: TicketId, to: Status) -> Self {
        Self {
            ticket_id,
            from: None,
            to,
            reason: DenyReason::TicketNotFound,
            blocking: Vec::new(),
        }
    }

    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        self.reason.code()
    }

    /// User-facing sentence describing the refusal.
    #[must_use]
    pub fn message(&self) -> String {
        let blocking = self
            .blocking
            .iter()
            .map(|b| format!("{} ({})", b.key, b.status))
            .collect::<Vec<_>>()
            .join(", ");
        match self.reason {
            DenyReason::ChildrenNotDone => format!(
                "All child tickets must be done before moving parent to done. Not done: {blocking}"
            ),
            DenyReason::AheadOfChildren => format!(
                "A parent cannot move to {} ahead of its children. Behind: {blocking}",
                self.to
            ),
            DenyReason::TicketNotFound => format!("Ticket '{}' was not found.", self.ticket_id),
            DenyReason::ParentNotFound => format!(
                "The parent of ticket '{}' was not found; refresh the board before moving it.",
                self.ticket_id
            ),
        }
    }
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

/// Decide whether `ticket` may move to `new_status`.
#[must_use]
pub fn validate(ticket: &Ticket, new_status: Status, index: &HierarchyIndex) -> Verdict {
    if ticket.status == new_status {
        return Verdict::Allow;
    }

    let deny = |reason: DenyReason, blocking: Vec<BlockingTicket>| {
        Verdict::Deny(Denial {
            ticket_id: ticket.id.clone(),
            from: Some(ticket.status),
            to: new_status,
            reason,
            blocking,
        })
    };

    if !index.contains(&ticket.id) {
        return deny(DenyReason::TicketNotFound, Vec::new());
    }
    if index.dangling_parent(&ticket.id).is_some() {
        return deny(DenyReason::ParentNotFound, Vec::new());
    }

    if !Status::is_forward(ticket.status, new_status) {
        return Verdict::Allow;
    }

    let children = index.children_of(&ticket.id);
    if children.is_empty() {
        return Verdict::Allow;
    }

    if new_status.is_done() {
        let blocking: Vec<BlockingTicket> = children
            .iter()
            .filter(|child| !child.status.is_done())
            .map(|child| BlockingTicket::from(*child))
            .collect();
        if blocking.is_empty() {
            Verdict::Allow
        } else {
            deny(DenyReason::ChildrenNotDone, blocking)
        }
    } else {
        let blocking: Vec<BlockingTicket> = children
            .iter()
            .filter(|child| child.status.index() < new_status.index())
            .map(|child| BlockingTicket::from(*child))
            .collect();
        if blocking.is_empty() {
            Verdict::Allow
        } else {
            deny(DenyReason::AheadOfChildren, blocking)
        }
    }
}
