//! Board reconciliation: the authoritative five-column layout of one project.
//!
//! The board applies every user action optimistically and hands back
//! sequence-tagged effects. Whoever performs the persistence calls (a
//! [`Session`], the simulation harness, an async adapter) reports each
//! outcome through [`Board::confirm`] or [`Board::fail`], in any order.
//!
//! # Ordering
//!
//! Every effect gets a fresh write sequence. The board remembers the newest
//! sequence issued per ticket; confirmations and failures carrying an older
//! sequence for that ticket are stale. Last write wins.
//!
//! # Deduplication
//!
//! Tickets are keyed by id. A ticket arriving under a confirmed id replaces a
//! pending ticket with the same key; children pointing at the pending id are
//! re-pointed. Two confirmed ids sharing one key keep the most recently
//! updated ticket.

#![allow(clippy::module_name_repetitions)]

mod column;
mod health;
mod plan;
mod session;

pub use column::Column;
pub use health::{BoardHealth, Violation, find_violations};
pub use plan::{ConfirmOutcome, EffectFailure, EffectPlan, MoveResult, PlannedEffect, Removal};
pub use session::{MoveReport, Session, SessionError};

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::bus::{BoardEvent, Notifier, NullNotifier};
use crate::error::ErrorCode;
use crate::graph::{HierarchyError, HierarchyIndex};
use crate::model::{DeleteMode, Status, Ticket, TicketDraft, TicketId, TicketPatch};
use crate::store::StoreError;
use crate::workflow::{CascadePolicy, Denial, Effect, Verdict, propagate, validate};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Board-level refusals for creates, patches and deletes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    #[error("ticket not found: '{0}'")]
    TicketNotFound(TicketId),

    #[error("parent not found: '{0}'")]
    ParentNotFound(TicketId),

    #[error("key '{key}' already exists in project '{project_id}'")]
    DuplicateKey { project_id: String, key: String },

    #[error("ticket belongs to project '{got}', board is for '{expected}'")]
    ForeignProject { expected: String, got: String },

    #[error("making '{parent_id}' the parent of '{ticket_id}' would create a cycle")]
    Cycle {
        ticket_id: TicketId,
        parent_id: TicketId,
    },

    #[error("ticket '{0}' is not pending")]
    NotPending(TicketId),
}

impl BoardError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::TicketNotFound(_) | Self::NotPending(_) => ErrorCode::TicketNotFound,
            Self::ParentNotFound(_) => ErrorCode::ParentNotFound,
            Self::DuplicateKey { .. } => ErrorCode::DuplicateKey,
            Self::ForeignProject { .. } => ErrorCode::InvalidParent,
            Self::Cycle { .. } => ErrorCode::CycleDetected,
        }
    }
}

// ---------------------------------------------------------------------------
// Board
// ---------------------------------------------------------------------------

/// Authoritative in-memory board for one project.
pub struct Board {
    project_id: String,
    tickets: HashMap<TicketId, Ticket>,
    keys: HashMap<String, TicketId>,
    columns: [Column; 5],
    index: HierarchyIndex,
    structural: Vec<HierarchyError>,
    policy: CascadePolicy,
    notifier: Arc<dyn Notifier>,
    next_seq: u64,
    next_pending: u64,
    /// Newest write sequence issued per ticket.
    latest: HashMap<TicketId, u64>,
    /// Writes issued but not yet confirmed or failed.
    in_flight: BTreeMap<u64, Effect>,
}

impl std::fmt::Debug for Board {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Board")
            .field("project_id", &self.project_id)
            .field("tickets", &self.tickets.len())
            .field("in_flight", &self.in_flight.len())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Board {
    /// Empty board that drops all events.
    #[must_use]
    pub fn new(project_id: impl Into<String>, policy: CascadePolicy) -> Self {
        Self::with_notifier(project_id, policy, Arc::new(NullNotifier))
    }

    #[must_use]
    pub fn with_notifier(
        project_id: impl Into<String>,
        policy: CascadePolicy,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            tickets: HashMap::new(),
            keys: HashMap::new(),
            columns: Status::ALL.map(Column::new),
            index: HierarchyIndex::default(),
            structural: Vec::new(),
            policy,
            notifier,
            next_seq: 0,
            next_pending: 0,
            latest: HashMap::new(),
            in_flight: BTreeMap::new(),
        }
    }

    /// Board built from a full ticket collection.
    #[must_use]
    pub fn load<I>(
        project_id: impl Into<String>,
        tickets: I,
        policy: CascadePolicy,
        notifier: Arc<dyn Notifier>,
    ) -> Self
    where
        I: IntoIterator<Item = Ticket>,
    {
        let mut board = Self::with_notifier(project_id, policy, notifier);
        board.refresh(tickets);
        board
    }

    // -----------------------------------------------------------------------
    // Read access
    // -----------------------------------------------------------------------

    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    #[must_use]
    pub const fn policy(&self) -> CascadePolicy {
        self.policy
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    #[must_use]
    pub fn ticket(&self, id: &TicketId) -> Option<&Ticket> {
        self.tickets.get(id)
    }

    #[must_use]
    pub fn ticket_by_key(&self, key: &str) -> Option<&Ticket> {
        self.keys.get(key).and_then(|id| self.tickets.get(id))
    }

    /// Look a ticket up by id, then by exact key, then by key ignoring case.
    #[must_use]
    pub fn resolve(&self, id_or_key: &str) -> Option<&Ticket> {
        self.tickets
            .get(id_or_key)
            .or_else(|| self.ticket_by_key(id_or_key))
            .or_else(|| {
                self.tickets
                    .values()
                    .find(|t| t.key.eq_ignore_ascii_case(id_or_key))
            })
    }

    /// All tickets, in column order.
    pub fn tickets(&self) -> impl Iterator<Item = &Ticket> {
        self.columns
            .iter()
            .flat_map(|column| column.ticket_ids())
            .filter_map(|id| self.tickets.get(id))
    }

    #[must_use]
    pub const fn column(&self, status: Status) -> &Column {
        &self.columns[status.index()]
    }

    #[must_use]
    pub const fn columns(&self) -> &[Column; 5] {
        &self.columns
    }

    #[must_use]
    pub const fn index(&self) -> &HierarchyIndex {
        &self.index
    }

    #[must_use]
    pub fn health(&self) -> BoardHealth {
        BoardHealth::from_index(&self.index, &self.structural)
    }

    #[must_use]
    pub fn violations(&self) -> Vec<Violation> {
        find_violations(&self.index)
    }

    /// Number of writes issued and not yet settled.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Newest write sequence issued for `id`, if any.
    #[must_use]
    pub fn latest_seq(&self, id: &TicketId) -> Option<u64> {
        self.latest.get(id).copied()
    }

    // -----------------------------------------------------------------------
    // Moves
    // -----------------------------------------------------------------------

    /// Validate, plan and optimistically apply a status change.
    pub fn apply_move(&mut self, ticket_id: &TicketId, target: Status) -> MoveResult {
        let Some(ticket) = self.tickets.get(ticket_id) else {
            debug!(%ticket_id, "move of unknown ticket denied");
            return MoveResult::Denied(Denial::not_found(ticket_id.clone(), target));
        };
        if ticket.status == target {
            return MoveResult::Applied(EffectPlan::noop(ticket_id.clone(), target));
        }

        if let Verdict::Deny(denial) = validate(ticket, target, &self.index) {
            info!(%ticket_id, from = %ticket.status, to = %target, reason = %denial.reason, "move denied");
            return MoveResult::Denied(denial);
        }

        let effects = propagate(ticket_id, target, &self.index, self.policy);
        let mut planned = Vec::with_capacity(effects.len());
        for (position, effect) in effects.into_iter().enumerate() {
            if effect.from == effect.to {
                continue;
            }
            let seq = self.issue_seq(&effect.ticket_id);
            self.place(&effect.ticket_id, effect.to);
            self.in_flight.insert(seq, effect.clone());

            self.notifier.notify(&BoardEvent::Moved {
                ticket_id: effect.ticket_id.clone(),
                from: effect.from,
                to: effect.to,
            });
            if position > 0 {
                self.notifier.notify(&BoardEvent::ParentUpdated {
                    parent_id: effect.ticket_id.clone(),
                    new_status: effect.to,
                });
            }
            planned.push(PlannedEffect { seq, effect });
        }
        self.rebuild_index();

        info!(
            %ticket_id,
            to = %target,
            effects = planned.len(),
            "move applied"
        );
        MoveResult::Applied(EffectPlan {
            ticket_id: ticket_id.clone(),
            target,
            effects: planned,
        })
    }

    /// Settle write `seq` with the ticket state persistence returned.
    pub fn confirm(&mut self, seq: u64, ticket: Ticket) -> ConfirmOutcome {
        if self.in_flight.remove(&seq).is_none() {
            debug!(seq, "confirmation for unknown write ignored");
            return ConfirmOutcome::Ignored;
        }
        if self.latest.get(&ticket.id).is_some_and(|&newest| newest > seq) {
            debug!(seq, ticket_id = %ticket.id, "stale confirmation ignored");
            return ConfirmOutcome::Stale;
        }
        if !self.tickets.contains_key(&ticket.id) {
            debug!(seq, ticket_id = %ticket.id, "confirmation for ticket no longer on board");
            return ConfirmOutcome::Ignored;
        }

        let changed = self.tickets.get(&ticket.id) != Some(&ticket);
        let id = ticket.id.clone();
        self.upsert(ticket);
        self.rebuild_index();
        if changed {
            self.notifier.notify(&BoardEvent::Updated { ticket_id: id });
        }
        debug!(seq, "write confirmed");
        ConfirmOutcome::Applied
    }

    /// Settle write `seq` as failed.
    ///
    /// Reverts the effect when it is still the newest write for its ticket.
    /// Returns `None` for unknown or already-settled sequences.
    pub fn fail(&mut self, seq: u64, error: &StoreError) -> Option<EffectFailure> {
        let effect = self.in_flight.remove(&seq)?;
        let newest = self.latest.get(&effect.ticket_id).copied();
        let reverted = newest == Some(seq) && self.tickets.contains_key(&effect.ticket_id);

        if reverted {
            self.place(&effect.ticket_id, effect.from);
            self.rebuild_index();
            self.notifier.notify(&BoardEvent::Updated {
                ticket_id: effect.ticket_id.clone(),
            });
            warn!(seq, ticket_id = %effect.ticket_id, back_to = %effect.from, error = %error, "write failed; reverted");
        } else {
            warn!(seq, ticket_id = %effect.ticket_id, error = %error, "superseded write failed; not reverted");
        }

        Some(EffectFailure::new(seq, effect, reverted, error))
    }

    // -----------------------------------------------------------------------
    // Merges
    // -----------------------------------------------------------------------

    /// Rebuild the whole board from a full ticket collection.
    ///
    /// Pending tickets whose key is not in the collection are kept: their
    /// creation is still in flight. Children of a pending ticket whose key
    /// is in the collection move to the confirmed ticket.
    pub fn refresh<I>(&mut self, tickets: I)
    where
        I: IntoIterator<Item = Ticket>,
    {
        let pending: Vec<Ticket> = self
            .tickets
            .values()
            .filter(|t| t.is_pending())
            .cloned()
            .collect();

        self.tickets.clear();
        self.keys.clear();
        for column in &mut self.columns {
            column.clear();
        }

        let mut incoming: Vec<Ticket> = tickets
            .into_iter()
            .filter(|t| {
                let ours = t.project_id == self.project_id;
                if !ours {
                    debug!(ticket_id = %t.id, project = %t.project_id, "foreign ticket skipped");
                }
                ours
            })
            .collect();
        sort_for_layout(&mut incoming);
        for ticket in incoming {
            self.merge(ticket);
        }
        let mut confirmed = Vec::new();
        for ticket in pending {
            match self.keys.get(&ticket.key) {
                Some(id) => confirmed.push((ticket.id, id.clone())),
                None => {
                    self.merge(ticket);
                }
            }
        }
        for (pending_id, id) in &confirmed {
            debug!(pending = %pending_id, confirmed = %id, "pending ticket confirmed by refresh");
            self.repoint_children(pending_id, id);
        }

        self.rebuild_index();
        info!(project = %self.project_id, tickets = self.tickets.len(), "board refreshed");
    }

    /// Full-field replace of a ticket from persistence or another view.
    ///
    /// Returns the id the ticket is held under, or `None` if it belongs to
    /// another project.
    pub fn apply_remote_update(&mut self, ticket: Ticket) -> Option<TicketId> {
        if ticket.project_id != self.project_id {
            debug!(ticket_id = %ticket.id, "remote update for foreign project ignored");
            return None;
        }
        let id = self.merge(ticket);
        self.rebuild_index();
        self.notifier.notify(&BoardEvent::Updated {
            ticket_id: id.clone(),
        });
        Some(id)
    }

    /// Merge a created ticket, reconciling it with a pending twin.
    ///
    /// Emits `created` for a ticket new to the board and `updated` when it
    /// replaces a pending twin, which already announced the creation.
    pub fn apply_create(&mut self, ticket: Ticket) -> Option<TicketId> {
        if ticket.project_id != self.project_id {
            debug!(ticket_id = %ticket.id, "create for foreign project ignored");
            return None;
        }
        let key = ticket.key.clone();
        let reconciles_pending = self
            .keys
            .get(&key)
            .is_some_and(|existing| *existing != ticket.id && existing.is_pending());
        let id = self.merge(ticket);
        self.rebuild_index();
        let event = if reconciles_pending {
            BoardEvent::Updated {
                ticket_id: id.clone(),
            }
        } else {
            BoardEvent::Created {
                ticket_id: id.clone(),
                key,
            }
        };
        self.notifier.notify(&event);
        Some(id)
    }

    /// Merge one ticket into the maps and columns, deduplicating by id and
    /// key. Does not rebuild the index.
    fn merge(&mut self, incoming: Ticket) -> TicketId {
        let twin = self
            .keys
            .get(&incoming.key)
            .filter(|existing| **existing != incoming.id)
            .cloned();

        if let Some(existing_id) = twin {
            let Some(existing) = self.tickets.get(&existing_id) else {
                self.keys.remove(&incoming.key);
                return self.upsert(incoming);
            };
            match (existing.is_pending(), incoming.is_pending()) {
                (true, false) => {
                    debug!(pending = %existing_id, confirmed = %incoming.id, "pending ticket confirmed");
                    self.take(&existing_id);
                    self.repoint_children(&existing_id, &incoming.id);
                }
                (false, true) => {
                    debug!(pending = %incoming.id, confirmed = %existing_id, "pending twin of confirmed ticket dropped");
                    return existing_id;
                }
                _ => {
                    if incoming.updated_at_us < existing.updated_at_us {
                        warn!(key = %incoming.key, kept = %existing_id, dropped = %incoming.id, "duplicate key; keeping most recently updated");
                        return existing_id;
                    }
                    warn!(key = %incoming.key, kept = %incoming.id, dropped = %existing_id, "duplicate key; keeping most recently updated");
                    self.take(&existing_id);
                }
            }
        }

        self.upsert(incoming)
    }

    /// Insert or replace by id and re-place in the column of its status.
    fn upsert(&mut self, ticket: Ticket) -> TicketId {
        let id = ticket.id.clone();
        if let Some(old) = self.tickets.get(&id) {
            self.columns[old.status.index()].remove(&id);
            if old.key != ticket.key && self.keys.get(&old.key) == Some(&id) {
                self.keys.remove(&old.key);
            }
        }
        self.columns[ticket.status.index()].insert(id.clone());
        self.keys.insert(ticket.key.clone(), id.clone());
        self.tickets.insert(id.clone(), ticket);
        id
    }

    /// Remove a ticket from every map and column. Does not touch children.
    fn take(&mut self, id: &TicketId) -> Option<Ticket> {
        let ticket = self.tickets.remove(id)?;
        for column in &mut self.columns {
            column.remove(id);
        }
        if self.keys.get(&ticket.key) == Some(id) {
            self.keys.remove(&ticket.key);
        }
        Some(ticket)
    }

    fn repoint_children(&mut self, from: &TicketId, to: &TicketId) {
        for ticket in self.tickets.values_mut() {
            if ticket.parent_id.as_ref() == Some(from) {
                ticket.parent_id = Some(to.clone());
            }
        }
        if let Some(seq) = self.latest.remove(from) {
            self.latest.insert(to.clone(), seq);
        }
    }

    // -----------------------------------------------------------------------
    // Creates
    // -----------------------------------------------------------------------

    /// Put a draft on the board under a fresh pending id.
    ///
    /// # Errors
    ///
    /// Refuses drafts for another project, with a key already on the board,
    /// or with a parent that is not on the board. Nothing is mutated then.
    pub fn stage_create(&mut self, draft: &TicketDraft) -> Result<Ticket, BoardError> {
        if draft.project_id != self.project_id {
            return Err(BoardError::ForeignProject {
                expected: self.project_id.clone(),
                got: draft.project_id.clone(),
            });
        }
        if self.keys.contains_key(&draft.key) {
            return Err(BoardError::DuplicateKey {
                project_id: draft.project_id.clone(),
                key: draft.key.clone(),
            });
        }
        if let Some(parent_id) = &draft.parent_id {
            if !self.tickets.contains_key(parent_id) {
                return Err(BoardError::ParentNotFound(parent_id.clone()));
            }
        }

        self.next_pending += 1;
        let ticket = Ticket::from_draft(
            TicketId::pending(self.next_pending),
            draft,
            self.layout_clock(),
        );
        self.upsert(ticket.clone());
        self.rebuild_index();
        self.notifier.notify(&BoardEvent::Created {
            ticket_id: ticket.id.clone(),
            key: ticket.key.clone(),
        });
        debug!(ticket_id = %ticket.id, key = %ticket.key, "create staged");
        Ok(ticket)
    }

    /// Drop a pending ticket whose creation failed.
    ///
    /// # Errors
    ///
    /// [`BoardError::NotPending`] for confirmed ids,
    /// [`BoardError::TicketNotFound`] if it is not on the board.
    pub fn discard_pending(&mut self, id: &TicketId) -> Result<Ticket, BoardError> {
        if !id.is_pending() {
            return Err(BoardError::NotPending(id.clone()));
        }
        let ticket = self
            .take(id)
            .ok_or_else(|| BoardError::TicketNotFound(id.clone()))?;
        for child in self.tickets.values_mut() {
            if child.parent_id.as_ref() == Some(id) {
                child.parent_id = None;
            }
        }
        self.latest.remove(id);
        self.rebuild_index();
        self.notifier.notify(&BoardEvent::Deleted {
            ticket_id: id.clone(),
        });
        debug!(ticket_id = %id, "pending ticket discarded");
        Ok(ticket)
    }

    /// Creation timestamp for pending tickets: just after the newest ticket
    /// on the board, so they sort last until confirmed.
    fn layout_clock(&self) -> i64 {
        self.tickets
            .values()
            .map(|t| t.created_at_us)
            .max()
            .map_or(0, |newest| newest + 1)
    }

    // -----------------------------------------------------------------------
    // Patches and deletes
    // -----------------------------------------------------------------------

    /// Check a patch against the board before it is persisted.
    ///
    /// # Errors
    ///
    /// Refuses unknown tickets, unknown parents, and reparenting that would
    /// close a cycle.
    pub fn check_patch(&self, id: &TicketId, patch: &TicketPatch) -> Result<(), BoardError> {
        if !self.tickets.contains_key(id) {
            return Err(BoardError::TicketNotFound(id.clone()));
        }
        if let Some(Some(parent_id)) = &patch.parent_id {
            if !self.tickets.contains_key(parent_id) {
                return Err(BoardError::ParentNotFound(parent_id.clone()));
            }
            if self.index.would_create_cycle(id, parent_id) {
                return Err(BoardError::Cycle {
                    ticket_id: id.clone(),
                    parent_id: parent_id.clone(),
                });
            }
        }
        Ok(())
    }

    /// Take a ticket off the board.
    ///
    /// Cascade mode removes the whole subtree; detach mode clears the parent
    /// reference of direct children. The returned [`Removal`] can be handed
    /// to [`Self::restore`] if persistence refuses the delete.
    ///
    /// # Errors
    ///
    /// [`BoardError::TicketNotFound`] if `id` is not on the board.
    pub fn apply_delete(&mut self, id: &TicketId, mode: DeleteMode) -> Result<Removal, BoardError> {
        if !self.tickets.contains_key(id) {
            return Err(BoardError::TicketNotFound(id.clone()));
        }

        let doomed = match mode {
            DeleteMode::Cascade => self.index.subtree(id),
            DeleteMode::Detach => vec![id.clone()],
        };

        let mut removal = Removal::default();
        for gone in &doomed {
            if let Some(ticket) = self.take(gone) {
                self.latest.remove(gone);
                removal.removed.push(ticket);
            }
        }

        for child in self.tickets.values_mut() {
            if child.parent_id.as_ref() == Some(id) {
                removal.detached.push(child.clone());
                child.parent_id = None;
            }
        }
        self.rebuild_index();

        for ticket in &removal.removed {
            self.notifier.notify(&BoardEvent::Deleted {
                ticket_id: ticket.id.clone(),
            });
        }
        for child in &removal.detached {
            self.notifier.notify(&BoardEvent::Updated {
                ticket_id: child.id.clone(),
            });
        }

        info!(ticket_id = %id, %mode, removed = removal.removed.len(), detached = removal.detached.len(), "delete applied");
        Ok(removal)
    }

    /// Undo an [`apply_delete`](Self::apply_delete).
    pub fn restore(&mut self, removal: Removal) {
        for ticket in removal.removed {
            let id = ticket.id.clone();
            let key = ticket.key.clone();
            self.merge(ticket);
            self.notifier.notify(&BoardEvent::Created { ticket_id: id, key });
        }
        for child in removal.detached {
            let id = child.id.clone();
            self.merge(child);
            self.notifier.notify(&BoardEvent::Updated { ticket_id: id });
        }
        self.rebuild_index();
        debug!("delete restored");
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn issue_seq(&mut self, id: &TicketId) -> u64 {
        self.next_seq += 1;
        self.latest.insert(id.clone(), self.next_seq);
        self.next_seq
    }

    /// Set a ticket's status and move it to the matching column.
    fn place(&mut self, id: &TicketId, status: Status) {
        let Some(ticket) = self.tickets.get_mut(id) else {
            return;
        };
        let from = ticket.status;
        ticket.status = status;
        if from != status {
            self.columns[from.index()].remove(id);
        }
        self.columns[status.index()].insert(id.clone());
    }

    fn rebuild_index(&mut self) {
        let mut tickets: Vec<Ticket> = self.tickets.values().cloned().collect();
        sort_for_layout(&mut tickets);
        let (index, errors) = HierarchyIndex::build_lenient(tickets);
        self.index = index;
        self.structural = errors;
    }
}

fn sort_for_layout(tickets: &mut [Ticket]) {
    tickets.sort_by(|a, b| {
        a.created_at_us
            .cmp(&b.created_at_us)
            .then_with(|| a.key.cmp(&b.key))
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use crate::model::IssueType;
    use std::sync::mpsc::Receiver;

    fn ticket(id: &str, status: Status, parent: Option<&str>) -> Ticket {
        let mut draft = TicketDraft::new("PRJ", id.to_uppercase(), id, IssueType::Task)
            .with_status(status);
        draft.parent_id = parent.map(TicketId::from);
        Ticket::from_draft(TicketId::from(id), &draft, 0)
    }

    fn board_with_events(tickets: Vec<Ticket>) -> (Board, Receiver<BoardEvent>) {
        let bus = Arc::new(EventBus::new());
        let (_, rx) = bus.subscribe_channel();
        let board = Board::load("PRJ", tickets, CascadePolicy::default(), bus);
        (board, rx)
    }

    fn status_of(board: &Board, id: &str) -> Status {
        board.ticket(&id.into()).expect("ticket on board").status
    }

    fn unavailable() -> StoreError {
        StoreError::Unavailable("offline".into())
    }

    #[test]
    fn move_applies_cascade_and_emits_events() {
        let (mut board, rx) = board_with_events(vec![
            ticket("s", Status::InProgress, None),
            ticket("t", Status::InProgress, Some("s")),
        ]);

        let result = board.apply_move(&"t".into(), Status::Done);
        let plan = result.plan().expect("applied");
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.effects[0].seq, 1);
        assert_eq!(plan.effects[1].seq, 2);
        assert_eq!(plan.cascaded().count(), 1);

        assert_eq!(status_of(&board, "s"), Status::Done);
        assert!(board.column(Status::Done).contains(&"t".into()));
        assert!(board.column(Status::InProgress).is_empty());
        assert_eq!(board.in_flight(), 2);

        let kinds: Vec<&str> = rx.try_iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, ["moved", "moved", "parent-updated"]);
    }

    #[test]
    fn denied_move_leaves_board_untouched() {
        let (mut board, rx) = board_with_events(vec![
            ticket("s", Status::InProgress, None),
            ticket("t1", Status::Done, Some("s")),
            ticket("t2", Status::InProgress, Some("s")),
        ]);

        let result = board.apply_move(&"s".into(), Status::Done);
        let denial = result.denial().expect("denied");
        assert_eq!(denial.blocking[0].id.as_str(), "t2");
        assert_eq!(status_of(&board, "s"), Status::InProgress);
        assert_eq!(board.in_flight(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn noop_and_unknown_moves() {
        let mut board = Board::load(
            "PRJ",
            vec![ticket("t", Status::Todo, None)],
            CascadePolicy::default(),
            Arc::new(NullNotifier),
        );
        let noop = board.apply_move(&"t".into(), Status::Todo);
        assert!(noop.plan().is_some_and(EffectPlan::is_noop));
        assert_eq!(board.latest_seq(&"t".into()), None);

        let unknown = board.apply_move(&"ghost".into(), Status::Done);
        assert!(unknown.is_denied());
    }

    #[test]
    fn stale_confirmation_is_ignored() {
        let mut board = Board::new("PRJ", CascadePolicy::default());
        board.refresh(vec![ticket("t", Status::Todo, None)]);

        let first = board.apply_move(&"t".into(), Status::Review);
        let second = board.apply_move(&"t".into(), Status::Done);
        let seq1 = first.plan().unwrap().effects[0].seq;
        let seq2 = second.plan().unwrap().effects[0].seq;

        let mut confirmed = ticket("t", Status::Done, None);
        confirmed.updated_at_us = 20;
        assert_eq!(board.confirm(seq2, confirmed), ConfirmOutcome::Applied);

        let mut late = ticket("t", Status::Review, None);
        late.updated_at_us = 10;
        assert_eq!(board.confirm(seq1, late), ConfirmOutcome::Stale);
        assert_eq!(status_of(&board, "t"), Status::Done);
        assert_eq!(board.confirm(seq1, ticket("t", Status::Review, None)), ConfirmOutcome::Ignored);
        assert_eq!(board.in_flight(), 0);
    }

    #[test]
    fn failure_reverts_only_newest_write() {
        let mut board = Board::new("PRJ", CascadePolicy::default());
        board.refresh(vec![ticket("t", Status::Todo, None)]);

        let seq1 = board.apply_move(&"t".into(), Status::Review).plan().unwrap().effects[0].seq;
        let seq2 = board.apply_move(&"t".into(), Status::Done).plan().unwrap().effects[0].seq;

        let superseded = board.fail(seq1, &unavailable()).expect("known write");
        assert!(!superseded.reverted);
        assert_eq!(status_of(&board, "t"), Status::Done);

        let newest = board.fail(seq2, &unavailable()).expect("known write");
        assert!(newest.reverted);
        assert!(newest.retryable);
        assert_eq!(newest.code, ErrorCode::PersistenceUnavailable);
        assert_eq!(status_of(&board, "t"), Status::Review);
        assert!(board.fail(seq2, &unavailable()).is_none());
    }

    #[test]
    fn reverting_a_failed_write_announces_an_update() {
        let (mut board, rx) = board_with_events(vec![ticket("t", Status::Todo, None)]);
        let seq1 = board.apply_move(&"t".into(), Status::Review).plan().unwrap().effects[0].seq;
        let seq2 = board.apply_move(&"t".into(), Status::Done).plan().unwrap().effects[0].seq;
        rx.try_iter().for_each(drop);

        board.fail(seq1, &unavailable());
        assert!(rx.try_recv().is_err());

        board.fail(seq2, &unavailable());
        let events: Vec<BoardEvent> = rx.try_iter().collect();
        assert_eq!(events, [BoardEvent::Updated { ticket_id: "t".into() }]);
    }

    #[test]
    fn failed_cascade_effect_keeps_sibling_effects() {
        let mut board = Board::new("PRJ", CascadePolicy::default());
        board.refresh(vec![
            ticket("s", Status::Review, None),
            ticket("t", Status::Review, Some("s")),
        ]);
        let plan = board
            .apply_move(&"t".into(), Status::Done)
            .plan()
            .cloned()
            .expect("applied");

        board.fail(plan.effects[1].seq, &unavailable());
        assert_eq!(status_of(&board, "t"), Status::Done);
        assert_eq!(status_of(&board, "s"), Status::Review);
    }

    #[test]
    fn pending_create_is_reconciled_to_confirmed_id() {
        let (mut board, rx) = board_with_events(vec![ticket("epic", Status::Todo, None)]);

        let draft = TicketDraft::new("PRJ", "PRJ-9", "New story", IssueType::Story)
            .with_status(Status::Todo)
            .with_parent("epic".into());
        let pending = board.stage_create(&draft).expect("staged");
        assert!(pending.is_pending());

        let child_draft = TicketDraft::new("PRJ", "PRJ-10", "Sub task", IssueType::Task)
            .with_status(Status::Todo)
            .with_parent(pending.id.clone());
        let child = board.stage_create(&child_draft).expect("staged child");

        let confirmed = Ticket::from_draft("tk-confirmed".into(), &draft, 5);
        let id = board.apply_create(confirmed).expect("same project");
        assert_eq!(id.as_str(), "tk-confirmed");
        assert!(board.ticket(&pending.id).is_none());
        assert_eq!(board.ticket_by_key("PRJ-9").unwrap().id, id);
        assert_eq!(
            board.ticket(&child.id).unwrap().parent_id.as_ref(),
            Some(&id)
        );
        assert_eq!(board.len(), 3);
        assert_eq!(board.column(Status::Todo).len(), 3);

        let events: Vec<BoardEvent> = rx.try_iter().collect();
        assert_eq!(
            events,
            [
                BoardEvent::Created {
                    ticket_id: pending.id.clone(),
                    key: "PRJ-9".into(),
                },
                BoardEvent::Created {
                    ticket_id: child.id.clone(),
                    key: "PRJ-10".into(),
                },
                BoardEvent::Updated { ticket_id: id },
            ]
        );
    }

    #[test]
    fn create_without_pending_twin_announces_creation() {
        let (mut board, rx) = board_with_events(Vec::new());
        let draft = TicketDraft::new("PRJ", "PRJ-1", "Direct", IssueType::Task);
        let id = board
            .apply_create(Ticket::from_draft("tk-1".into(), &draft, 1))
            .expect("same project");

        let events: Vec<BoardEvent> = rx.try_iter().collect();
        assert_eq!(
            events,
            [BoardEvent::Created {
                ticket_id: id,
                key: "PRJ-1".into(),
            }]
        );
    }

    #[test]
    fn duplicate_key_create_is_refused_without_mutation() {
        let mut board = Board::new("PRJ", CascadePolicy::default());
        board.refresh(vec![ticket("t", Status::Todo, None)]);

        let draft = TicketDraft::new("PRJ", "T", "Clash", IssueType::Task);
        let err = board.stage_create(&draft).unwrap_err();
        assert_eq!(err.code(), ErrorCode::DuplicateKey);
        assert_eq!(board.len(), 1);

        let orphan = TicketDraft::new("PRJ", "NEW", "Orphan", IssueType::Task)
            .with_parent("ghost".into());
        assert!(matches!(
            board.stage_create(&orphan),
            Err(BoardError::ParentNotFound(_))
        ));
    }

    #[test]
    fn discard_pending_removes_only_pending() {
        let mut board = Board::new("PRJ", CascadePolicy::default());
        board.refresh(vec![ticket("t", Status::Todo, None)]);
        let pending = board
            .stage_create(&TicketDraft::new("PRJ", "NEW", "Temp", IssueType::Task))
            .unwrap();

        assert!(matches!(
            board.discard_pending(&"t".into()),
            Err(BoardError::NotPending(_))
        ));
        board.discard_pending(&pending.id).expect("discarded");
        assert_eq!(board.len(), 1);
        assert!(board.column(Status::Backlog).is_empty());
    }

    #[test]
    fn merging_same_id_twice_keeps_one_entry() {
        let mut board = Board::new("PRJ", CascadePolicy::default());
        let mut newer = ticket("t", Status::Review, None);
        newer.updated_at_us = 9;
        board.refresh(vec![ticket("t", Status::Todo, None), newer]);

        assert_eq!(board.len(), 1);
        let total: usize = board.columns().iter().map(Column::len).sum();
        assert_eq!(total, 1);
        assert_eq!(status_of(&board, "t"), Status::Review);
    }

    #[test]
    fn confirmed_key_collision_keeps_most_recent() {
        let mut board = Board::new("PRJ", CascadePolicy::default());
        let mut old = ticket("a", Status::Todo, None);
        old.key = "PRJ-1".into();
        old.updated_at_us = 1;
        let mut new = ticket("b", Status::Review, None);
        new.key = "PRJ-1".into();
        new.updated_at_us = 2;

        board.refresh(vec![new.clone(), old]);
        assert_eq!(board.len(), 1);
        assert_eq!(board.ticket_by_key("PRJ-1").unwrap().id, new.id);
    }

    #[test]
    fn remote_update_replaces_fields() {
        let (mut board, rx) = board_with_events(vec![ticket("t", Status::Todo, None)]);
        let mut remote = ticket("t", Status::InProgress, None);
        remote.summary = "Renamed".into();
        remote.assignee = Some("kai".into());

        board.apply_remote_update(remote);
        let held = board.ticket(&"t".into()).unwrap();
        assert_eq!(held.summary, "Renamed");
        assert!(board.column(Status::InProgress).contains(&"t".into()));
        assert!(!board.column(Status::Todo).contains(&"t".into()));
        assert_eq!(rx.try_iter().map(|e| e.kind()).collect::<Vec<_>>(), ["updated"]);

        let mut foreign = ticket("x", Status::Todo, None);
        foreign.project_id = "OPS".into();
        assert!(board.apply_remote_update(foreign).is_none());
    }

    #[test]
    fn delete_modes_and_restore() {
        let tickets = vec![
            ticket("epic", Status::Todo, None),
            ticket("story", Status::Todo, Some("epic")),
            ticket("task", Status::Todo, Some("story")),
        ];
        let (mut board, rx) = board_with_events(tickets);

        let removal = board
            .apply_delete(&"story".into(), DeleteMode::Cascade)
            .expect("on board");
        assert_eq!(removal.removed_ids(), vec![TicketId::from("story"), "task".into()]);
        assert_eq!(board.len(), 1);
        assert_eq!(rx.try_iter().filter(|e| e.kind() == "deleted").count(), 2);

        board.restore(removal);
        assert_eq!(board.len(), 3);
        assert_eq!(
            board.index().parent_of(&"task".into()).map(|t| t.id.as_str()),
            Some("story")
        );

        rx.try_iter().for_each(drop);
        let removal = board
            .apply_delete(&"epic".into(), DeleteMode::Detach)
            .expect("on board");
        assert_eq!(removal.detached.len(), 1);
        let events: Vec<BoardEvent> = rx.try_iter().collect();
        assert_eq!(
            events,
            [
                BoardEvent::Deleted { ticket_id: "epic".into() },
                BoardEvent::Updated { ticket_id: "story".into() },
            ]
        );
        assert_eq!(board.ticket(&"story".into()).unwrap().parent_id, None);

        board.restore(removal);
        assert_eq!(
            board.ticket(&"story".into()).unwrap().parent_id,
            Some(TicketId::from("epic"))
        );
    }

    #[test]
    fn check_patch_refuses_cycles() {
        let mut board = Board::new("PRJ", CascadePolicy::default());
        board.refresh(vec![
            ticket("epic", Status::Todo, None),
            ticket("story", Status::Todo, Some("epic")),
        ]);
        let patch = TicketPatch {
            parent_id: Some(Some("story".into())),
            ..TicketPatch::default()
        };
        assert!(matches!(
            board.check_patch(&"epic".into(), &patch),
            Err(BoardError::Cycle { .. })
        ));
        assert!(board.check_patch(&"story".into(), &TicketPatch::default()).is_ok());
    }

    #[test]
    fn cyclic_hierarchy_degrades_but_allows_moves() {
        let mut board = Board::new("PRJ", CascadePolicy::default());
        board.refresh(vec![
            ticket("a", Status::Todo, Some("b")),
            ticket("b", Status::Todo, Some("a")),
            ticket("c", Status::Todo, Some("a")),
        ]);
        let health = board.health();
        assert!(health.degraded);
        assert_eq!(health.errors.len(), 1);

        let result = board.apply_move(&"c".into(), Status::Done);
        assert_eq!(result.plan().map(EffectPlan::len), Some(1));
    }

    #[test]
    fn refresh_keeps_in_flight_pending_creates() {
        let mut board = Board::new("PRJ", CascadePolicy::default());
        board.refresh(vec![ticket("t", Status::Todo, None)]);
        let pending = board
            .stage_create(&TicketDraft::new("PRJ", "NEW", "Temp", IssueType::Task))
            .unwrap();

        board.refresh(vec![ticket("t", Status::Todo, None)]);
        assert!(board.ticket(&pending.id).is_some());

        let confirmed = Ticket::from_draft(
            "tk-new".into(),
            &TicketDraft::new("PRJ", "NEW", "Temp", IssueType::Task),
            1,
        );
        board.refresh(vec![ticket("t", Status::Todo, None), confirmed]);
        assert!(board.ticket(&pending.id).is_none());
        assert_eq!(board.len(), 2);
    }

    #[test]
    fn refresh_moves_pending_children_to_the_confirmed_parent() {
        let mut board = Board::new("PRJ", CascadePolicy::default());
        let parent_draft = TicketDraft::new("PRJ", "PRJ-9", "Parent", IssueType::Story);
        let parent = board.stage_create(&parent_draft).unwrap();
        let child = board
            .stage_create(
                &TicketDraft::new("PRJ", "PRJ-10", "Child", IssueType::Task)
                    .with_parent(parent.id.clone()),
            )
            .unwrap();

        board.refresh(vec![Ticket::from_draft("tk-9".into(), &parent_draft, 1)]);

        assert!(board.ticket(&parent.id).is_none());
        assert_eq!(
            board.ticket(&child.id).unwrap().parent_id,
            Some(TicketId::from("tk-9"))
        );
        assert_eq!(
            board.index().parent_of(&child.id).map(|t| t.id.as_str()),
            Some("tk-9")
        );
        assert!(board.health().dangling.is_empty());
    }
}
