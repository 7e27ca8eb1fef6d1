use serde::Serialize;
use std::fmt;

use crate::graph::{HierarchyError, HierarchyIndex};
use crate::model::{Status, TicketId};

/// Structural state of a board's hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoardHealth {
    /// `true` when at least one parent cycle was severed.
    pub degraded: bool,
    /// Cycles found by the last index rebuild.
    #[serde(serialize_with = "serialize_errors")]
    pub errors: Vec<HierarchyError>,
    /// Tickets whose parent reference does not resolve on this board.
    pub dangling: Vec<TicketId>,
    /// Tickets with cascading disabled.
    pub degraded_tickets: Vec<TicketId>,
}

impl BoardHealth {
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        !self.degraded && self.dangling.is_empty()
    }

    pub(crate) fn from_index(index: &HierarchyIndex, errors: &[HierarchyError]) -> Self {
        let mut dangling = Vec::new();
        let mut degraded_tickets = Vec::new();
        for ticket in index.tickets() {
            if index.dangling_parent(&ticket.id).is_some() {
                dangling.push(ticket.id.clone());
            }
            if index.is_degraded(&ticket.id) {
                degraded_tickets.push(ticket.id.clone());
            }
        }
        dangling.sort();
        degraded_tickets.sort();
        Self {
            degraded: !errors.is_empty(),
            errors: errors.to_vec(),
            dangling,
            degraded_tickets,
        }
    }
}

fn serialize_errors<S>(errors: &[HierarchyError], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_seq(errors.iter().map(ToString::to_string))
}

/// A parent/child pair breaking the hierarchy-status rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub parent_id: TicketId,
    pub parent_status: Status,
    pub child_id: TicketId,
    pub child_status: Status,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.parent_status.is_done() {
            write!(
                f,
                "{} is done but child {} is {}",
                self.parent_id, self.child_id, self.child_status
            )
        } else {
            write!(
                f,
                "{} ({}) is ahead of child {} ({})",
                self.parent_id, self.parent_status, self.child_id, self.child_status
            )
        }
    }
}

/// Every parent/child pair in `index` where the parent is ahead of the
/// child, or done while the child is not.
#[must_use]
pub fn find_violations(index: &HierarchyIndex) -> Vec<Violation> {
    let mut violations = Vec::new();
    for parent in index.tickets() {
        for child in index.children_of(&parent.id) {
            let broken = if parent.status.is_done() {
                !child.status.is_done()
            } else {
                parent.status.index() > child.status.index()
            };
            if broken {
                violations.push(Violation {
                    parent_id: parent.id.clone(),
                    parent_status: parent.status,
                    child_id: child.id.clone(),
                    child_status: child.status,
                });
            }
        }
    }
    violations
}
