//! Parent-child index over a flat ticket collection.
//!
//! The index is built once per reconciliation batch and answers hierarchy
//! questions without touching the store:
//!
//! - Which tickets are children of a given ticket?
//! - What is a ticket's parent, and its chain of ancestors?
//! - What is the full subtree of a ticket?
//! - Would reparenting a ticket create a cycle?
//!
//! # Layout
//!
//! Tickets live in a dense `Vec`; parent and child edges are slot indices
//! into it. Lookups by id go through a single `HashMap<TicketId, usize>`.
//!
//! # Cycles
//!
//! [`HierarchyIndex::build`] refuses a collection whose parent references
//! form a loop. [`HierarchyIndex::build_lenient`] accepts it instead: the
//! parent edges of every ticket on a loop are severed, those tickets and all
//! of their descendants are marked *degraded* (no cascading), and the loops
//! are reported as [`HierarchyError::Cycle`] values.
//!
//! # Dangling parents
//!
//! A `parent_id` that names no ticket in the collection, or a ticket of a
//! different project, is recorded as dangling. The ticket is treated as a
//! root for traversal purposes.

#![allow(
    clippy::must_use_candidate,
    clippy::module_name_repetitions,
    clippy::doc_markdown
)]

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{debug, warn};

use crate::error::ErrorCode;
use crate::model::{Ticket, TicketId};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Structural problems found while indexing a ticket collection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HierarchyError {
    /// Parent references form a loop. The path starts and ends at the same
    /// ticket, e.g. `["A", "B", "C", "A"]`; a self-parent is `["A", "A"]`.
    #[error("parent cycle detected: {}", join_path(.cycle))]
    Cycle { cycle: Vec<TicketId> },

    /// A lookup named a ticket that is not in the index.
    #[error("ticket not found: '{0}'")]
    TicketNotFound(TicketId),
}

impl HierarchyError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Cycle { .. } => ErrorCode::CycleDetected,
            Self::TicketNotFound(_) => ErrorCode::TicketNotFound,
        }
    }
}

fn join_path(path: &[TicketId]) -> String {
    path.iter()
        .map(TicketId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

// ---------------------------------------------------------------------------
// Index
// ---------------------------------------------------------------------------

/// Arena-style parent/child index for one project snapshot.
#[derive(Debug, Clone, Default)]
pub struct HierarchyIndex {
    tickets: Vec<Ticket>,
    slots: HashMap<TicketId, usize>,
    parents: Vec<Option<usize>>,
    children: Vec<Vec<usize>>,
    dangling: Vec<bool>,
    degraded: Vec<bool>,
}

impl HierarchyIndex {
    /// Build the index, failing on the first parent cycle.
    ///
    /// # Errors
    ///
    /// Returns [`HierarchyError::Cycle`] if any ticket is its own
    /// transitive ancestor.
    pub fn build<I>(tickets: I) -> Result<Self, HierarchyError>
    where
        I: IntoIterator<Item = Ticket>,
    {
        let (index, mut errors) = Self::build_lenient(tickets);
        if errors.is_empty() {
            Ok(index)
        } else {
            Err(errors.swap_remove(0))
        }
    }

    /// Build the index, severing parent cycles instead of failing.
    ///
    /// Returns the index together with every cycle found. Tickets on a cycle,
    /// and their descendants, report `true` from [`Self::is_degraded`].
    pub fn build_lenient<I>(tickets: I) -> (Self, Vec<HierarchyError>)
    where
        I: IntoIterator<Item = Ticket>,
    {
        let mut index = Self::default();
        for ticket in tickets {
            if let Some(&slot) = index.slots.get(&ticket.id) {
                debug!(ticket_id = %ticket.id, "duplicate ticket id while indexing; keeping last");
                index.tickets[slot] = ticket;
                continue;
            }
            index.slots.insert(ticket.id.clone(), index.tickets.len());
            index.tickets.push(ticket);
        }

        let n = index.tickets.len();
        index.parents = vec![None; n];
        index.dangling = vec![false; n];
        index.degraded = vec![false; n];

        for slot in 0..n {
            let ticket = &index.tickets[slot];
            let Some(parent_id) = &ticket.parent_id else {
                continue;
            };
            match index.slots.get(parent_id) {
                Some(&parent) if index.tickets[parent].project_id == ticket.project_id => {
                    index.parents[slot] = Some(parent);
                }
                _ => index.dangling[slot] = true,
            }
        }

        let cycles = index.find_cycles();
        let mut errors = Vec::with_capacity(cycles.len());
        for cycle in cycles {
            for &slot in &cycle {
                index.parents[slot] = None;
                index.degraded[slot] = true;
            }
            let mut path: Vec<TicketId> =
                cycle.iter().map(|&s| index.tickets[s].id.clone()).collect();
            path.push(path[0].clone());
            warn!(cycle = %join_path(&path), "parent cycle severed; cascade disabled for subtree");
            errors.push(HierarchyError::Cycle { cycle: path });
        }

        index.children = vec![Vec::new(); n];
        for slot in 0..n {
            if let Some(parent) = index.parents[slot] {
                index.children[parent].push(slot);
            }
        }
        for kids in &mut index.children {
            let tickets = &index.tickets;
            kids.sort_by(|&a, &b| {
                tickets[a]
                    .created_at_us
                    .cmp(&tickets[b].created_at_us)
                    .then_with(|| tickets[a].key.cmp(&tickets[b].key))
            });
        }

        if !errors.is_empty() {
            index.propagate_degraded();
        }

        (index, errors)
    }

    /// Every parent pointer has out-degree one, so loops are found by
    /// walking each chain once with a three-colour marking.
    fn find_cycles(&self) -> Vec<Vec<usize>> {
        const UNSEEN: u8 = 0;
        const ON_PATH: u8 = 1;
        const FINISHED: u8 = 2;

        let mut colour = vec![UNSEEN; self.tickets.len()];
        let mut cycles = Vec::new();

        for start in 0..self.tickets.len() {
            if colour[start] != UNSEEN {
                continue;
            }
            let mut path = Vec::new();
            let mut current = Some(start);
            while let Some(slot) = current {
                match colour[slot] {
                    UNSEEN => {
                        colour[slot] = ON_PATH;
                        path.push(slot);
                        current = self.parents[slot];
                    }
                    ON_PATH => {
                        let begin = path.iter().position(|&s| s == slot).unwrap_or(0);
                        cycles.push(path[begin..].to_vec());
                        break;
                    }
                    _ => break,
                }
            }
            for slot in path {
                colour[slot] = FINISHED;
            }
        }

        cycles
    }

    fn propagate_degraded(&mut self) {
        let mut queue: VecDeque<usize> = (0..self.tickets.len())
            .filter(|&slot| self.degraded[slot])
            .collect();
        while let Some(slot) = queue.pop_front() {
            for &child in &self.children[slot] {
                if !self.degraded[child] {
                    self.degraded[child] = true;
                    queue.push_back(child);
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Queries by id
    // -----------------------------------------------------------------------

    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    pub fn contains(&self, id: &TicketId) -> bool {
        self.slots.contains_key(id)
    }

    pub fn ticket(&self, id: &TicketId) -> Option<&Ticket> {
        self.slot(id).map(|slot| &self.tickets[slot])
    }

    /// All indexed tickets in insertion order.
    pub fn tickets(&self) -> &[Ticket] {
        &self.tickets
    }

    /// Direct children, oldest first. Empty for leaves and unknown ids.
    pub fn children_of(&self, id: &TicketId) -> Vec<&Ticket> {
        self.slot(id)
            .map(|slot| {
                self.children[slot]
                    .iter()
                    .map(|&child| &self.tickets[child])
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn has_children(&self, id: &TicketId) -> bool {
        self.slot(id)
            .is_some_and(|slot| !self.children[slot].is_empty())
    }

    /// The indexed parent, if any. Dangling and severed parents yield `None`.
    pub fn parent_of(&self, id: &TicketId) -> Option<&Ticket> {
        let slot = self.slot(id)?;
        self.parents[slot].map(|parent| &self.tickets[parent])
    }

    /// Ancestor chain from the immediate parent up to the root.
    pub fn ancestors(&self, id: &TicketId) -> Vec<&Ticket> {
        let mut chain = Vec::new();
        let mut current = self.slot(id).and_then(|slot| self.parents[slot]);
        while let Some(slot) = current {
            chain.push(&self.tickets[slot]);
            current = self.parents[slot];
        }
        chain
    }

    /// Ids in the subtree rooted at `id` (inclusive), breadth-first.
    ///
    /// Returns an empty vec for unknown ids.
    pub fn subtree(&self, id: &TicketId) -> Vec<TicketId> {
        let Some(root) = self.slot(id) else {
            return Vec::new();
        };
        let mut result = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([root]);
        while let Some(slot) = queue.pop_front() {
            if !visited.insert(slot) {
                continue;
            }
            result.push(self.tickets[slot].id.clone());
            queue.extend(self.children[slot].iter().copied());
        }
        result
    }

    /// Number of ancestors above `id`; roots have depth 0.
    pub fn depth(&self, id: &TicketId) -> Option<usize> {
        self.slot(id).map(|slot| self.depth_of_slot(slot))
    }

    /// Number of tickets on the longest root-to-leaf chain (0 when empty).
    pub fn height(&self) -> usize {
        (0..self.tickets.len())
            .filter(|&slot| self.children[slot].is_empty())
            .map(|slot| self.depth_of_slot(slot) + 1)
            .max()
            .unwrap_or(0)
    }

    /// `true` when the ticket sits on, or below, a severed parent cycle.
    pub fn is_degraded(&self, id: &TicketId) -> bool {
        self.slot(id).is_some_and(|slot| self.degraded[slot])
    }

    /// `true` if any ticket in the index is degraded.
    pub fn has_degraded(&self) -> bool {
        self.degraded.iter().any(|&d| d)
    }

    /// The unresolvable parent reference of `id`, if it has one.
    pub fn dangling_parent(&self, id: &TicketId) -> Option<&TicketId> {
        let slot = self.slot(id)?;
        if self.dangling[slot] {
            self.tickets[slot].parent_id.as_ref()
        } else {
            None
        }
    }

    /// Would setting `new_parent` as the parent of `id` close a loop?
    pub fn would_create_cycle(&self, id: &TicketId, new_parent: &TicketId) -> bool {
        if id == new_parent {
            return true;
        }
        let Some(mut current) = self.slot(new_parent) else {
            return false;
        };
        let mut steps = 0;
        loop {
            if self.tickets[current].id == *id {
                return true;
            }
            steps += 1;
            match self.parents[current] {
                Some(parent) if steps <= self.tickets.len() => current = parent,
                _ => return false,
            }
        }
    }

    // -----------------------------------------------------------------------
    // Slot-level access for the workflow engine
    // -----------------------------------------------------------------------

    pub(crate) fn slot(&self, id: &TicketId) -> Option<usize> {
        self.slots.get(id).copied()
    }

    pub(crate) fn ticket_at(&self, slot: usize) -> &Ticket {
        &self.tickets[slot]
    }

    pub(crate) fn parent_slot(&self, slot: usize) -> Option<usize> {
        self.parents[slot]
    }

    pub(crate) fn child_slots(&self, slot: usize) -> &[usize] {
        &self.children[slot]
    }

    pub(crate) fn slot_degraded(&self, slot: usize) -> bool {
        self.degraded[slot]
    }

    fn depth_of_slot(&self, slot: usize) -> usize {
        let mut depth = 0;
        let mut current = self.parents[slot];
        while let Some(parent) = current {
            depth += 1;
            current = self.parents[parent];
        }
        depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{IssueType, Status, TicketDraft};

    fn ticket(id: &str, parent: Option<&str>, ts: i64) -> Ticket {
        let mut draft = TicketDraft::new("PRJ", id.to_uppercase(), id, IssueType::Task)
            .with_status(Status::Todo);
        draft.parent_id = parent.map(TicketId::from);
        Ticket::from_draft(TicketId::from(id), &draft, ts)
    }

    fn ids(tickets: &[&Ticket]) -> Vec<String> {
        tickets.iter().map(|t| t.id.to_string()).collect()
    }

    fn tree() -> HierarchyIndex {
        // epic
        //  ├── feat
        //  │   ├── story
        //  │   │   └── task
        //  │   └── bug
        //  └── feat2
        HierarchyIndex::build(vec![
            ticket("epic", None, 1),
            ticket("feat", Some("epic"), 2),
            ticket("feat2", Some("epic"), 3),
            ticket("story", Some("feat"), 4),
            ticket("bug", Some("feat"), 5),
            ticket("task", Some("story"), 6),
        ])
        .expect("acyclic tree")
    }

    #[test]
    fn children_and_parent_lookups() {
        let index = tree();
        assert_eq!(ids(&index.children_of(&"epic".into())), ["feat", "feat2"]);
        assert_eq!(ids(&index.children_of(&"feat".into())), ["story", "bug"]);
        assert!(index.children_of(&"task".into()).is_empty());
        assert!(index.children_of(&"missing".into()).is_empty());

        assert_eq!(
            index.parent_of(&"story".into()).map(|t| t.id.as_str()),
            Some("feat")
        );
        assert!(index.parent_of(&"epic".into()).is_none());
        assert!(index.has_children(&"story".into()));
        assert!(!index.has_children(&"bug".into()));
    }

    #[test]
    fn ancestors_subtree_depth_height() {
        let index = tree();
        assert_eq!(ids(&index.ancestors(&"task".into())), ["story", "feat", "epic"]);
        assert!(index.ancestors(&"epic".into()).is_empty());

        let subtree: Vec<String> = index
            .subtree(&"feat".into())
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(subtree, ["feat", "story", "bug", "task"]);

        assert_eq!(index.depth(&"task".into()), Some(3));
        assert_eq!(index.height(), 4);
        assert_eq!(HierarchyIndex::default().height(), 0);
    }

    #[test]
    fn children_are_ordered_by_creation_time() {
        let index = HierarchyIndex::build(vec![
            ticket("p", None, 1),
            ticket("late", Some("p"), 9),
            ticket("early", Some("p"), 2),
        ])
        .unwrap();
        assert_eq!(ids(&index.children_of(&"p".into())), ["early", "late"]);
    }

    #[test]
    fn strict_build_rejects_cycle() {
        let err = HierarchyIndex::build(vec![
            ticket("a", Some("c"), 1),
            ticket("b", Some("a"), 2),
            ticket("c", Some("b"), 3),
        ])
        .unwrap_err();

        let HierarchyError::Cycle { cycle } = &err else {
            panic!("expected cycle, got {err:?}");
        };
        assert_eq!(cycle.len(), 4);
        assert_eq!(cycle.first(), cycle.last());
        assert_eq!(err.code(), ErrorCode::CycleDetected);
        assert!(err.to_string().contains("->"));
    }

    #[test]
    fn strict_build_rejects_self_parent() {
        let err = HierarchyIndex::build(vec![ticket("a", Some("a"), 1)]).unwrap_err();
        assert_eq!(
            err,
            HierarchyError::Cycle {
                cycle: vec!["a".into(), "a".into()]
            }
        );
    }

    #[test]
    fn lenient_build_severs_cycle_and_degrades_descendants() {
        let (index, errors) = HierarchyIndex::build_lenient(vec![
            ticket("a", Some("b"), 1),
            ticket("b", Some("a"), 2),
            ticket("child", Some("a"), 3),
            ticket("grandchild", Some("child"), 4),
            ticket("healthy", None, 5),
            ticket("leaf", Some("healthy"), 6),
        ]);

        assert_eq!(errors.len(), 1);
        assert!(index.parent_of(&"a".into()).is_none());
        assert!(index.parent_of(&"b".into()).is_none());
        assert_eq!(
            index.parent_of(&"child".into()).map(|t| t.id.as_str()),
            Some("a")
        );

        for id in ["a", "b", "child", "grandchild"] {
            assert!(index.is_degraded(&id.into()), "{id} should be degraded");
        }
        assert!(!index.is_degraded(&"healthy".into()));
        assert!(!index.is_degraded(&"leaf".into()));
        assert!(index.has_degraded());
    }

    #[test]
    fn dangling_and_cross_project_parents_are_recorded() {
        let mut foreign = ticket("foreign", None, 1);
        foreign.project_id = "OTHER".into();
        let index = HierarchyIndex::build(vec![
            foreign,
            ticket("orphan", Some("ghost"), 2),
            ticket("crosser", Some("foreign"), 3),
        ])
        .unwrap();

        assert_eq!(
            index.dangling_parent(&"orphan".into()).map(TicketId::as_str),
            Some("ghost")
        );
        assert_eq!(
            index.dangling_parent(&"crosser".into()).map(TicketId::as_str),
            Some("foreign")
        );
        assert!(index.parent_of(&"crosser".into()).is_none());
        assert!(index.dangling_parent(&"foreign".into()).is_none());
    }

    #[test]
    fn reparent_cycle_detection() {
        let index = tree();
        assert!(index.would_create_cycle(&"feat".into(), &"task".into()));
        assert!(index.would_create_cycle(&"feat".into(), &"feat".into()));
        assert!(!index.would_create_cycle(&"task".into(), &"feat2".into()));
        assert!(!index.would_create_cycle(&"task".into(), &"unknown".into()));
    }

    #[test]
    fn duplicate_ids_keep_the_last_copy() {
        let mut newer = ticket("a", None, 1);
        newer.status = Status::Done;
        let index = HierarchyIndex::build(vec![ticket("a", None, 1), newer]).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.ticket(&"a".into()).unwrap().status, Status::Done);
    }
}
