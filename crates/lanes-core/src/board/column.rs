use serde::Serialize;

use crate::model::{Status, TicketId};

/// One status column: the ids of the tickets currently in that status.
///
/// A ticket id appears at most once per column; the board guarantees it
/// appears in exactly one column overall.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    status: Status,
    ticket_ids: Vec<TicketId>,
}

impl Column {
    #[must_use]
    pub const fn new(status: Status) -> Self {
        Self {
            status,
            ticket_ids: Vec::new(),
        }
    }

    #[must_use]
    pub const fn status(&self) -> Status {
        self.status
    }

    #[must_use]
    pub fn ticket_ids(&self) -> &[TicketId] {
        &self.ticket_ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ticket_ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ticket_ids.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: &TicketId) -> bool {
        self.ticket_ids.contains(id)
    }

    /// Append `id` unless it is already present.
    pub(crate) fn insert(&mut self, id: TicketId) {
        if !self.contains(&id) {
            self.ticket_ids.push(id);
        }
    }

    /// Remove every occurrence of `id`; returns whether anything was removed.
    pub(crate) fn remove(&mut self, id: &TicketId) -> bool {
        let before = self.ticket_ids.len();
        self.ticket_ids.retain(|existing| existing != id);
        self.ticket_ids.len() != before
    }

    pub(crate) fn clear(&mut self) {
        self.ticket_ids.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_idempotent_and_remove_reports() {
        let mut column = Column::new(Status::Todo);
        column.insert("a".into());
        column.insert("b".into());
        column.insert("a".into());
        assert_eq!(column.len(), 2);
        assert!(column.remove(&"a".into()));
        assert!(!column.remove(&"a".into()));
        assert_eq!(column.ticket_ids(), [TicketId::from("b")]);
        assert_eq!(column.status(), Status::Todo);
    }
}
