//! Post-run invariant checks over a settled board and its store.

use std::collections::{HashMap, HashSet};
use std::fmt;

use lanes_core::model::{Status, Ticket, TicketId};
use lanes_core::Board;
use serde::Serialize;

// ── Core result types ─────────────────────────────────────────────────────────

/// Result of one or more invariant checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OracleResult {
    /// `true` iff no violations were found.
    pub passed: bool,
    pub violations: Vec<InvariantViolation>,
}

impl OracleResult {
    #[must_use]
    pub const fn pass() -> Self {
        Self {
            passed: true,
            violations: Vec::new(),
        }
    }

    #[must_use]
    pub const fn fail(violations: Vec<InvariantViolation>) -> Self {
        Self {
            passed: false,
            violations,
        }
    }

    fn from_violations(violations: Vec<InvariantViolation>) -> Self {
        if violations.is_empty() {
            Self::pass()
        } else {
            Self::fail(violations)
        }
    }

    /// Merge another result into this one (failures accumulate).
    #[must_use]
    pub fn merge(mut self, other: Self) -> Self {
        if !other.passed {
            self.passed = false;
            self.violations.extend(other.violations);
        }
        self
    }
}

// ── Invariant violation diagnostics ──────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "invariant", rename_all = "kebab-case")]
pub enum InvariantViolation {
    /// A ticket id sits in more than one column, or twice in one column.
    DuplicateEntry { ticket_id: TicketId, columns: Vec<Status> },

    /// A ticket sits in a column other than its status, or in none.
    Misplaced {
        ticket_id: TicketId,
        status: Status,
        column: Option<Status>,
    },

    /// Column sizes do not add up to the number of tickets.
    ColumnCountMismatch { in_columns: usize, tickets: usize },

    /// Two tickets on the board share a key.
    DuplicateKey { key: String },

    /// A parent is ahead of one of its children.
    HierarchyRule { message: String },

    /// Writes are still outstanding after the final drain.
    Unsettled { in_flight: usize },

    /// The board and the store disagree about a ticket.
    Divergence {
        ticket_id: TicketId,
        board: Option<Status>,
        store: Option<Status>,
    },
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateEntry { ticket_id, columns } => {
                let names: Vec<String> = columns.iter().map(ToString::to_string).collect();
                write!(f, "{ticket_id} appears in columns [{}]", names.join(", "))
            }
            Self::Misplaced {
                ticket_id,
                status,
                column,
            } => match column {
                Some(column) => write!(f, "{ticket_id} is {status} but sits in {column}"),
                None => write!(f, "{ticket_id} is {status} but sits in no column"),
            },
            Self::ColumnCountMismatch { in_columns, tickets } => {
                write!(f, "columns hold {in_columns} entries for {tickets} tickets")
            }
            Self::DuplicateKey { key } => write!(f, "key {key} is held by more than one ticket"),
            Self::HierarchyRule { message } => write!(f, "hierarchy rule broken: {message}"),
            Self::Unsettled { in_flight } => write!(f, "{in_flight} write(s) never settled"),
            Self::Divergence {
                ticket_id,
                board,
                store,
            } => write!(
                f,
                "{ticket_id} diverged: board={} store={}",
                show(*board),
                show(*store)
            ),
        }
    }
}

fn show(status: Option<Status>) -> String {
    status.map_or_else(|| "absent".to_string(), |s| s.to_string())
}

// ── Oracle ────────────────────────────────────────────────────────────────────

/// Invariant checks for a settled board.
///
/// # Invariants checked
///
/// 1. **Column placement** (`check_columns`): every ticket is in exactly the
///    column of its status, and keys are unique.
/// 2. **Hierarchy rule** (`check_hierarchy`): no parent is ahead of a child.
/// 3. **Settlement** (`check_settled`): no write is left in flight.
/// 4. **Convergence** (`check_convergence`): board statuses equal the store's.
pub struct BoardOracle;

impl BoardOracle {
    #[must_use]
    pub fn check_columns(board: &Board) -> OracleResult {
        let mut violations = Vec::new();
        let mut placements: HashMap<&TicketId, Vec<Status>> = HashMap::new();
        let mut in_columns = 0;
        for column in board.columns() {
            in_columns += column.len();
            for id in column.ticket_ids() {
                placements.entry(id).or_default().push(column.status());
            }
        }

        let mut seen_keys = HashSet::new();
        let mut tickets = 0;
        for ticket in all_tickets(board) {
            tickets += 1;
            let columns = placements.get(&ticket.id).cloned().unwrap_or_default();
            if columns.len() > 1 {
                violations.push(InvariantViolation::DuplicateEntry {
                    ticket_id: ticket.id.clone(),
                    columns: columns.clone(),
                });
            }
            if columns.first() != Some(&ticket.status) {
                violations.push(InvariantViolation::Misplaced {
                    ticket_id: ticket.id.clone(),
                    status: ticket.status,
                    column: columns.first().copied(),
                });
            }
            if !seen_keys.insert(ticket.key.as_str()) {
                violations.push(InvariantViolation::DuplicateKey {
                    key: ticket.key.clone(),
                });
            }
        }

        if in_columns != tickets || tickets != board.len() {
            violations.push(InvariantViolation::ColumnCountMismatch {
                in_columns,
                tickets: board.len(),
            });
        }
        OracleResult::from_violations(violations)
    }

    #[must_use]
    pub fn check_hierarchy(board: &Board) -> OracleResult {
        OracleResult::from_violations(
            board
                .violations()
                .into_iter()
                .map(|violation| InvariantViolation::HierarchyRule {
                    message: violation.to_string(),
                })
                .collect(),
        )
    }

    #[must_use]
    pub fn check_settled(board: &Board) -> OracleResult {
        match board.in_flight() {
            0 => OracleResult::pass(),
            in_flight => OracleResult::fail(vec![InvariantViolation::Unsettled { in_flight }]),
        }
    }

    /// Compare board statuses against `stored`, the store's full contents.
    #[must_use]
    pub fn check_convergence(board: &Board, stored: &[Ticket]) -> OracleResult {
        let mut violations = Vec::new();
        let mut store_ids = HashSet::new();
        for ticket in stored {
            store_ids.insert(&ticket.id);
            let local = board.ticket(&ticket.id).map(|t| t.status);
            if local != Some(ticket.status) {
                violations.push(InvariantViolation::Divergence {
                    ticket_id: ticket.id.clone(),
                    board: local,
                    store: Some(ticket.status),
                });
            }
        }
        for ticket in all_tickets(board) {
            if !store_ids.contains(&ticket.id) {
                violations.push(InvariantViolation::Divergence {
                    ticket_id: ticket.id.clone(),
                    board: Some(ticket.status),
                    store: None,
                });
            }
        }
        OracleResult::from_violations(violations)
    }

    /// Run every check. With `strict` unset, only the checks that hold
    /// under injected write failures run.
    #[must_use]
    pub fn check_all(board: &Board, stored: &[Ticket], strict: bool) -> OracleResult {
        let base = Self::check_columns(board).merge(Self::check_settled(board));
        if strict {
            base.merge(Self::check_hierarchy(board))
                .merge(Self::check_convergence(board, stored))
        } else {
            base
        }
    }
}

/// Every ticket the board holds, independent of column layout.
fn all_tickets(board: &Board) -> impl Iterator<Item = &Ticket> {
    board.index().tickets().iter()
}
