//! Ancestor cascade planning.
//!
//! When a ticket changes status its ancestors may have to follow:
//!
//! - **Done roll-up**: when the last open child of a parent is done, the
//!   parent becomes done too (and so on upward).
//! - **Pull back**: when a child moves behind its parent, the parent is
//!   pulled back to the child's status.
//! - **Pull forward**: when a child moves ahead of its parent and every
//!   sibling is at least as far along, the parent follows.
//!
//! Cascades only ever flow toward the root. The planner returns the effects
//! without applying them; the board applies and persists them.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use tracing::debug;

use crate::config::ProjectConfig;
use crate::graph::HierarchyIndex;
use crate::model::{Status, TicketId};

/// One planned status change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Effect {
    pub ticket_id: TicketId,
    pub from: Status,
    pub to: Status,
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} -> {}", self.ticket_id, self.from, self.to)
    }
}

/// Which optional cascade branches are active.
///
/// Pull-back has no switch: without it a backward move could leave a parent
/// ahead of its child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadePolicy {
    /// Roll a parent up to done when all of its children are done.
    pub auto_complete: bool,
    /// Pull a parent forward when all of its children have moved past it.
    pub pull_forward: bool,
}

impl Default for CascadePolicy {
    fn default() -> Self {
        Self {
            auto_complete: true,
            pull_forward: true,
        }
    }
}

impl CascadePolicy {
    /// Map project-level config into a cascade policy.
    #[must_use]
    pub const fn from_project_config(config: &ProjectConfig) -> Self {
        Self {
            auto_complete: config.cascade.auto_complete,
            pull_forward: config.cascade.pull_forward,
        }
    }

    /// Policy with every optional branch switched off.
    #[must_use]
    pub const fn manual() -> Self {
        Self {
            auto_complete: false,
            pull_forward: false,
        }
    }
}

/// Plan the effects of moving `changed` to `new_status`.
///
/// The originating ticket is always the first effect. Returns an empty plan
/// if `changed` is not in the index. Tickets flagged as degraded by the
/// index never cascade.
#[must_use]
pub fn propagate(
    changed: &TicketId,
    new_status: Status,
    index: &HierarchyIndex,
    policy: CascadePolicy,
) -> Vec<Effect> {
    let Some(start) = index.slot(changed) else {
        return Vec::new();
    };

    let mut effects = Vec::new();
    let mut visited = HashSet::new();
    let mut current = start;
    let mut target = new_status;

    while visited.insert(current) {
        let ticket = index.ticket_at(current);
        effects.push(Effect {
            ticket_id: ticket.id.clone(),
            from: ticket.status,
            to: target,
        });

        if index.slot_degraded(current) {
            debug!(ticket_id = %ticket.id, "cascade stopped at degraded ticket");
            break;
        }
        let Some(parent) = index.parent_slot(current) else {
            break;
        };

        match next_parent_status(index, parent, current, target, policy) {
            Some(next) => {
                current = parent;
                target = next;
            }
            None => break,
        }
    }

    debug!(
        ticket_id = %changed,
        status = %new_status,
        effects = effects.len(),
        "cascade planned"
    );
    effects
}

/// Status the parent must take after `child` moves to `child_status`, or
/// `None` if the parent stays put.
fn next_parent_status(
    index: &HierarchyIndex,
    parent: usize,
    child: usize,
    child_status: Status,
    policy: CascadePolicy,
) -> Option<Status> {
    let parent_status = index.ticket_at(parent).status;
    let mut siblings = index
        .child_slots(parent)
        .iter()
        .filter(|&&s| s != child)
        .map(|&s| index.ticket_at(s).status);

    if child_status.is_done() {
        if !policy.auto_complete || parent_status.is_done() {
            return None;
        }
        return siblings.all(Status::is_done).then_some(Status::Done);
    }

    if child_status.index() < parent_status.index() {
        return Some(child_status);
    }

    if policy.pull_forward
        && child_status.index() > parent_status.index()
        && siblings.all(|s| s.index() >= child_status.index())
    {
        return Some(child_status);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{IssueType, Ticket, TicketDraft};

    fn ticket(id: &str, status: Status, parent: Option<&str>) -> Ticket {
        let mut draft = TicketDraft::new("PRJ", id.to_uppercase(), id, IssueType::Task)
            .with_status(status);
        draft.parent_id = parent.map(TicketId::from);
        Ticket::from_draft(TicketId::from(id), &draft, 0)
    }

    fn plan(tickets: Vec<Ticket>, id: &str, to: Status) -> Vec<(String, Status)> {
        let index = HierarchyIndex::build(tickets).expect("acyclic");
        propagate(&id.into(), to, &index, CascadePolicy::default())
            .into_iter()
            .map(|e| (e.ticket_id.to_string(), e.to))
            .collect()
    }

    fn pairs(expected: &[(&str, Status)]) -> Vec<(String, Status)> {
        expected.iter().map(|(id, s)| ((*id).to_string(), *s)).collect()
    }

    #[test]
    fn only_child_done_completes_parent() {
        let effects = plan(
            vec![
                ticket("s", Status::InProgress, None),
                ticket("t", Status::InProgress, Some("s")),
            ],
            "t",
            Status::Done,
        );
        assert_eq!(effects, pairs(&[("t", Status::Done), ("s", Status::Done)]));
    }

    #[test]
    fn done_rolls_up_through_every_finished_level() {
        let effects = plan(
            vec![
                ticket("epic", Status::Review, None),
                ticket("feat", Status::Review, Some("epic")),
                ticket("story", Status::Review, Some("feat")),
                ticket("task", Status::Review, Some("story")),
                ticket("sibling", Status::Done, Some("story")),
            ],
            "task",
            Status::Done,
        );
        assert_eq!(
            effects,
            pairs(&[
                ("task", Status::Done),
                ("story", Status::Done),
                ("feat", Status::Done),
                ("epic", Status::Done),
            ])
        );
    }

    #[test]
    fn unfinished_sibling_keeps_parent_open() {
        let effects = plan(
            vec![
                ticket("s", Status::InProgress, None),
                ticket("t1", Status::InProgress, Some("s")),
                ticket("t2", Status::Todo, Some("s")),
            ],
            "t1",
            Status::Done,
        );
        assert_eq!(effects, pairs(&[("t1", Status::Done)]));
    }

    #[test]
    fn backward_move_pulls_parent_back() {
        let effects = plan(
            vec![
                ticket("f", Status::Review, None),
                ticket("t", Status::Review, Some("f")),
                ticket("t2", Status::Done, Some("f")),
            ],
            "t",
            Status::Todo,
        );
        assert_eq!(effects, pairs(&[("t", Status::Todo), ("f", Status::Todo)]));
    }

    #[test]
    fn reopening_child_reopens_done_ancestors() {
        let effects = plan(
            vec![
                ticket("epic", Status::Done, None),
                ticket("story", Status::Done, Some("epic")),
                ticket("task", Status::Done, Some("story")),
            ],
            "task",
            Status::InProgress,
        );
        assert_eq!(
            effects,
            pairs(&[
                ("task", Status::InProgress),
                ("story", Status::InProgress),
                ("epic", Status::InProgress),
            ])
        );
    }

    #[test]
    fn forward_move_pulls_parent_only_when_siblings_caught_up() {
        let tickets = vec![
            ticket("s", Status::Todo, None),
            ticket("t1", Status::Todo, Some("s")),
            ticket("t2", Status::Review, Some("s")),
        ];
        assert_eq!(
            plan(tickets.clone(), "t1", Status::Review),
            pairs(&[("t1", Status::Review), ("s", Status::Review)])
        );
        assert_eq!(
            plan(tickets, "t1", Status::InProgress),
            pairs(&[("t1", Status::InProgress), ("s", Status::InProgress)])
        );

        let lagging = vec![
            ticket("s", Status::Todo, None),
            ticket("t1", Status::Todo, Some("s")),
            ticket("t2", Status::Todo, Some("s")),
        ];
        assert_eq!(
            plan(lagging, "t1", Status::Review),
            pairs(&[("t1", Status::Review)])
        );
    }

    #[test]
    fn policy_switches_disable_optional_branches() {
        let index = HierarchyIndex::build(vec![
            ticket("s", Status::Todo, None),
            ticket("t", Status::Todo, Some("s")),
        ])
        .unwrap();

        let manual = CascadePolicy::manual();
        assert_eq!(propagate(&"t".into(), Status::Done, &index, manual).len(), 1);
        assert_eq!(propagate(&"t".into(), Status::Review, &index, manual).len(), 1);

        let index = HierarchyIndex::build(vec![
            ticket("s", Status::Review, None),
            ticket("t", Status::Review, Some("s")),
        ])
        .unwrap();
        assert_eq!(propagate(&"t".into(), Status::Todo, &index, manual).len(), 2);
    }

    #[test]
    fn degraded_tickets_do_not_cascade() {
        let (index, errors) = HierarchyIndex::build_lenient(vec![
            ticket("a", Status::Todo, Some("b")),
            ticket("b", Status::Todo, Some("a")),
            ticket("child", Status::Todo, Some("a")),
        ]);
        assert_eq!(errors.len(), 1);

        let effects = propagate(&"child".into(), Status::Done, &index, CascadePolicy::default());
        assert_eq!(effects.len(), 1);
        assert_eq!(effects[0].ticket_id.as_str(), "child");
    }

    #[test]
    fn unknown_ticket_yields_empty_plan() {
        let index = HierarchyIndex::default();
        assert!(propagate(&"nope".into(), Status::Done, &index, CascadePolicy::default()).is_empty());
    }

    #[test]
    fn effect_display_is_compact() {
        let effect = Effect {
            ticket_id: "t".into(),
            from: Status::Todo,
            to: Status::Review,
        };
        assert_eq!(effect.to_string(), "t: todo -> review");
    }
}
