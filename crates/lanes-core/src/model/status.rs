//! The five workflow statuses and their total order.
//!
//! Every forward/backward decision in the engine goes through
//! [`Status::index`], [`Status::compare`] and [`Status::is_forward`].

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::{fmt, str::FromStr};

use super::ParseEnumError;

/// Workflow status of a ticket, in board order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    Backlog,
    Todo,
    InProgress,
    Review,
    Done,
}

impl Status {
    /// All statuses in column order.
    pub const ALL: [Self; 5] = [
        Self::Backlog,
        Self::Todo,
        Self::InProgress,
        Self::Review,
        Self::Done,
    ];

    /// Position in the workflow: backlog = 0 … done = 4.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Backlog => 0,
            Self::Todo => 1,
            Self::InProgress => 2,
            Self::Review => 3,
            Self::Done => 4,
        }
    }

    /// Inverse of [`Status::index`].
    #[must_use]
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Backlog),
            1 => Some(Self::Todo),
            2 => Some(Self::InProgress),
            3 => Some(Self::Review),
            4 => Some(Self::Done),
            _ => None,
        }
    }

    /// Compare two statuses by workflow position.
    ///
    /// `Less` means `a` comes before `b` on the board.
    #[must_use]
    pub fn compare(a: Self, b: Self) -> Ordering {
        a.index().cmp(&b.index())
    }

    /// Returns `true` when `to` is strictly after `from`.
    #[must_use]
    pub const fn is_forward(from: Self, to: Self) -> bool {
        to.index() > from.index()
    }

    /// Returns `true` when `to` is strictly before `from`.
    #[must_use]
    pub const fn is_backward(from: Self, to: Self) -> bool {
        to.index() < from.index()
    }

    #[must_use]
    pub const fn is_done(self) -> bool {
        matches!(self, Self::Done)
    }

    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Backlog => "backlog",
            Self::Todo => "todo",
            Self::InProgress => "in-progress",
            Self::Review => "review",
            Self::Done => "done",
        }
    }
}

impl PartialOrd for Status {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Status {
    fn cmp(&self, other: &Self) -> Ordering {
        Self::compare(*self, *other)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Status {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = super::normalize(s);
        match normalized.as_str() {
            "backlog" => Ok(Self::Backlog),
            "todo" | "to-do" => Ok(Self::Todo),
            "in-progress" | "in_progress" | "inprogress" => Ok(Self::InProgress),
            "review" => Ok(Self::Review),
            "done" => Ok(Self::Done),
            _ => Err(ParseEnumError {
                expected: "status",
                got: s.to_string(),
            }),
        }
    }
}
