//! In-memory ticket store with failure injection.
//!
//! Ids are sequential (`tk-` + 10 hex digits) and timestamps come from a
//! logical clock that advances by one millisecond per write, so runs are
//! reproducible.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use super::{StoreError, TicketStore, invalid_parent};
use crate::model::{DeleteMode, Status, Ticket, TicketDraft, TicketId, TicketPatch};

const CLOCK_EPOCH_US: i64 = 1_700_000_000_000_000;
const CLOCK_STEP_US: i64 = 1_000;

#[derive(Debug, Default)]
struct MemoryState {
    tickets: HashMap<TicketId, Ticket>,
    next_id: u64,
    clock_us: i64,
    failing_status: HashSet<TicketId>,
    fail_creates: usize,
    fail_deletes: usize,
    fail_updates: usize,
}

impl MemoryState {
    fn tick(&mut self) -> i64 {
        if self.clock_us == 0 {
            self.clock_us = CLOCK_EPOCH_US;
        }
        self.clock_us += CLOCK_STEP_US;
        self.clock_us
    }

    fn get(&self, id: &TicketId) -> Result<&Ticket, StoreError> {
        self.tickets
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    fn check_parent(
        &self,
        ticket_id: Option<&TicketId>,
        project_id: &str,
        parent_id: &TicketId,
    ) -> Result<(), StoreError> {
        let parent = self
            .tickets
            .get(parent_id)
            .ok_or_else(|| invalid_parent(parent_id, "no such ticket"))?;
        if parent.project_id != project_id {
            return Err(invalid_parent(parent_id, "belongs to another project"));
        }
        let Some(ticket_id) = ticket_id else {
            return Ok(());
        };

        let mut current = Some(parent_id);
        let mut steps = 0;
        while let Some(id) = current {
            if id == ticket_id {
                return Err(invalid_parent(parent_id, "would create a parent cycle"));
            }
            steps += 1;
            if steps > self.tickets.len() {
                break;
            }
            current = self.tickets.get(id).and_then(|t| t.parent_id.as_ref());
        }
        Ok(())
    }

    fn sorted(mut tickets: Vec<Ticket>) -> Vec<Ticket> {
        tickets.sort_by(|a, b| {
            a.created_at_us
                .cmp(&b.created_at_us)
                .then_with(|| a.key.cmp(&b.key))
        });
        tickets
    }
}

/// Mutex-guarded map implementing [`TicketStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `tickets`, inserted verbatim.
    #[must_use]
    pub fn with_tickets<I>(tickets: I) -> Self
    where
        I: IntoIterator<Item = Ticket>,
    {
        let store = Self::new();
        for ticket in tickets {
            store.insert(ticket);
        }
        store
    }

    /// Insert or replace a ticket without any validation.
    pub fn insert(&self, ticket: Ticket) {
        let mut state = self.lock();
        state.clock_us = state.clock_us.max(ticket.updated_at_us);
        state.tickets.insert(ticket.id.clone(), ticket);
    }

    /// Every stored ticket, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Ticket> {
        MemoryState::sorted(self.lock().tickets.values().cloned().collect())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().tickets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().tickets.is_empty()
    }

    /// Make every status update of `id` fail until [`Self::clear_failures`].
    pub fn fail_status_updates_for(&self, id: &TicketId) {
        self.lock().failing_status.insert(id.clone());
    }

    /// Make the next `create_ticket` call fail.
    pub fn fail_next_create(&self) {
        self.lock().fail_creates += 1;
    }

    /// Make the next `delete_ticket` call fail.
    pub fn fail_next_delete(&self) {
        self.lock().fail_deletes += 1;
    }

    /// Make the next `update_ticket` call fail.
    pub fn fail_next_update(&self) {
        self.lock().fail_updates += 1;
    }

    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.failing_status.clear();
        state.fail_creates = 0;
        state.fail_deletes = 0;
        state.fail_updates = 0;
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn injected(what: &str) -> StoreError {
    StoreError::Unavailable(format!("injected {what} failure"))
}

fn take_failure(counter: &mut usize) -> bool {
    if *counter > 0 {
        *counter -= 1;
        true
    } else {
        false
    }
}

impl TicketStore for MemoryStore {
    fn get_ticket(&self, id: &TicketId) -> Result<Ticket, StoreError> {
        self.lock().get(id).cloned()
    }

    fn update_ticket_status(&self, id: &TicketId, status: Status) -> Result<Ticket, StoreError> {
        let mut state = self.lock();
        if state.failing_status.contains(id) {
            return Err(injected("status update"));
        }
        let current = state.get(id)?;
        if current.status == status {
            return Ok(current.clone());
        }
        let now = state.tick();
        let ticket = state
            .tickets
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        ticket.status = status;
        ticket.updated_at_us = now;
        Ok(ticket.clone())
    }

    fn get_children(&self, parent_id: &TicketId) -> Result<Vec<Ticket>, StoreError> {
        let state = self.lock();
        let children = state
            .tickets
            .values()
            .filter(|t| t.parent_id.as_ref() == Some(parent_id))
            .cloned()
            .collect();
        Ok(MemoryState::sorted(children))
    }

    fn create_ticket(&self, draft: &TicketDraft) -> Result<Ticket, StoreError> {
        let mut state = self.lock();
        if take_failure(&mut state.fail_creates) {
            return Err(injected("create"));
        }
        if state
            .tickets
            .values()
            .any(|t| t.project_id == draft.project_id && t.key == draft.key)
        {
            return Err(StoreError::DuplicateKey {
                project_id: draft.project_id.clone(),
                key: draft.key.clone(),
            });
        }
        if let Some(parent_id) = &draft.parent_id {
            state.check_parent(None, &draft.project_id, parent_id)?;
        }

        state.next_id += 1;
        let id = TicketId::new(format!("tk-{:010x}", state.next_id));
        let now = state.tick();
        let ticket = Ticket::from_draft(id, draft, now);
        state.tickets.insert(ticket.id.clone(), ticket.clone());
        debug!(ticket_id = %ticket.id, key = %ticket.key, "memory store created ticket");
        Ok(ticket)
    }

    fn delete_ticket(&self, id: &TicketId, mode: DeleteMode) -> Result<Vec<TicketId>, StoreError> {
        let mut state = self.lock();
        if take_failure(&mut state.fail_deletes) {
            return Err(injected("delete"));
        }
        state.get(id)?;

        let mut removed = vec![id.clone()];
        match mode {
            DeleteMode::Cascade => {
                let mut cursor = 0;
                while cursor < removed.len() {
                    let parent = removed[cursor].clone();
                    let mut kids: Vec<TicketId> = state
                        .tickets
                        .values()
                        .filter(|t| t.parent_id.as_ref() == Some(&parent))
                        .map(|t| t.id.clone())
                        .filter(|kid| !removed.contains(kid))
                        .collect();
                    kids.sort();
                    removed.extend(kids);
                    cursor += 1;
                }
            }
            DeleteMode::Detach => {
                let now = state.tick();
                for ticket in state.tickets.values_mut() {
                    if ticket.parent_id.as_ref() == Some(id) {
                        ticket.parent_id = None;
                        ticket.updated_at_us = now;
                    }
                }
            }
        }

        for gone in &removed {
            state.tickets.remove(gone);
        }
        Ok(removed)
    }

    fn list_tickets(&self, project_id: &str) -> Result<Vec<Ticket>, StoreError> {
        let state = self.lock();
        let tickets = state
            .tickets
            .values()
            .filter(|t| t.project_id == project_id)
            .cloned()
            .collect();
        Ok(MemoryState::sorted(tickets))
    }

    fn update_ticket(&self, id: &TicketId, patch: &TicketPatch) -> Result<Ticket, StoreError> {
        let mut state = self.lock();
        if take_failure(&mut state.fail_updates) {
            return Err(injected("update"));
        }
        let project_id = state.get(id)?.project_id.clone();
        if let Some(Some(parent_id)) = &patch.parent_id {
            state.check_parent(Some(id), &project_id, parent_id)?;
        }

        let now = state.tick();
        let ticket = state
            .tickets
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        patch.apply_to(ticket);
        ticket.updated_at_us = now;
        Ok(ticket.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::IssueType;

    fn draft(key: &str) -> TicketDraft {
        TicketDraft::new("PRJ", key, format!("Summary of {key}"), IssueType::Task)
    }

    #[test]
    fn create_assigns_ids_and_rejects_duplicate_keys() {
        let store = MemoryStore::new();
        let first = store.create_ticket(&draft("PRJ-1")).unwrap();
        assert_eq!(first.id.as_str(), "tk-0000000001");
        assert_eq!(first.status, Status::Backlog);

        let err = store.create_ticket(&draft("PRJ-1")).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { .. }));
        assert_eq!(store.len(), 1);

        let mut other_project = draft("PRJ-1");
        other_project.project_id = "OPS".into();
        assert!(store.create_ticket(&other_project).is_ok());
    }

    #[test]
    fn status_changes_bump_updated_at() {
        let store = MemoryStore::new();
        let ticket = store.create_ticket(&draft("PRJ-1")).unwrap();

        let review = store.update_ticket_status(&ticket.id, Status::Review).unwrap();
        let done = store.update_ticket_status(&ticket.id, Status::Done).unwrap();
        assert_eq!(review.status, Status::Review);
        assert!(review.updated_at_us > ticket.updated_at_us);
        assert!(done.updated_at_us > review.updated_at_us);
    }

    #[test]
    fn repeating_a_status_update_leaves_the_ticket_untouched() {
        let store = MemoryStore::new();
        let ticket = store.create_ticket(&draft("PRJ-1")).unwrap();

        let once = store.update_ticket_status(&ticket.id, Status::Review).unwrap();
        let twice = store.update_ticket_status(&ticket.id, Status::Review).unwrap();
        assert_eq!(once, twice);
        assert_eq!(store.get_ticket(&ticket.id).unwrap(), once);
    }

    #[test]
    fn injected_failures_are_retryable() {
        let store = MemoryStore::new();
        let ticket = store.create_ticket(&draft("PRJ-1")).unwrap();

        store.fail_status_updates_for(&ticket.id);
        let err = store
            .update_ticket_status(&ticket.id, Status::Done)
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(store.get_ticket(&ticket.id).unwrap().status, Status::Backlog);

        store.clear_failures();
        assert!(store.update_ticket_status(&ticket.id, Status::Done).is_ok());

        store.fail_next_create();
        assert!(store.create_ticket(&draft("PRJ-2")).is_err());
        assert!(store.create_ticket(&draft("PRJ-2")).is_ok());
    }

    #[test]
    fn delete_detaches_or_cascades() {
        let store = MemoryStore::new();
        let parent = store.create_ticket(&draft("PRJ-1")).unwrap();
        let child = store
            .create_ticket(&draft("PRJ-2").with_parent(parent.id.clone()))
            .unwrap();
        let grandchild = store
            .create_ticket(&draft("PRJ-3").with_parent(child.id.clone()))
            .unwrap();

        let removed = store.delete_ticket(&parent.id, DeleteMode::Detach).unwrap();
        assert_eq!(removed, vec![parent.id]);
        assert_eq!(store.get_ticket(&child.id).unwrap().parent_id, None);

        let removed = store.delete_ticket(&child.id, DeleteMode::Cascade).unwrap();
        assert_eq!(removed, vec![child.id, grandchild.id]);
        assert!(store.is_empty());
    }

    #[test]
    fn reparenting_rejects_cycles_and_foreign_parents() {
        let store = MemoryStore::new();
        let epic = store.create_ticket(&draft("PRJ-1")).unwrap();
        let story = store
            .create_ticket(&draft("PRJ-2").with_parent(epic.id.clone()))
            .unwrap();
        let mut foreign = draft("OPS-1");
        foreign.project_id = "OPS".into();
        let foreign = store.create_ticket(&foreign).unwrap();

        let into_child = TicketPatch {
            parent_id: Some(Some(story.id.clone())),
            ..TicketPatch::default()
        };
        assert!(matches!(
            store.update_ticket(&epic.id, &into_child),
            Err(StoreError::InvalidParent { .. })
        ));

        let cross = TicketPatch {
            parent_id: Some(Some(foreign.id)),
            ..TicketPatch::default()
        };
        assert!(store.update_ticket(&story.id, &cross).is_err());

        let detach = TicketPatch {
            parent_id: Some(None),
            summary: Some("Standalone".into()),
            ..TicketPatch::default()
        };
        let updated = store.update_ticket(&story.id, &detach).unwrap();
        assert_eq!(updated.parent_id, None);
        assert_eq!(updated.summary, "Standalone");
    }

    #[test]
    fn listing_is_scoped_and_ordered() {
        let store = MemoryStore::new();
        for key in ["PRJ-1", "PRJ-2", "PRJ-3"] {
            store.create_ticket(&draft(key)).unwrap();
        }
        let keys: Vec<String> = store
            .list_tickets("PRJ")
            .unwrap()
            .into_iter()
            .map(|t| t.key)
            .collect();
        assert_eq!(keys, ["PRJ-1", "PRJ-2", "PRJ-3"]);
        assert!(store.list_tickets("OPS").unwrap().is_empty());
    }
}
