use serde::{Deserialize, Serialize};
use std::{borrow::Borrow, fmt, str::FromStr};

use super::{ParseEnumError, Status, normalize};

/// Prefix of client-side ids held before the store confirms a creation.
pub const PENDING_ID_PREFIX: &str = "pending-";

/// Opaque ticket identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(String);

impl TicketId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Temporary id for an optimistic create.
    #[must_use]
    pub fn pending(seq: u64) -> Self {
        Self(format!("{PENDING_ID_PREFIX}{seq}"))
    }

    /// Returns `true` for ids that have not been confirmed by persistence.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.0.starts_with(PENDING_ID_PREFIX)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for TicketId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TicketId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for TicketId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Level in the issue hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueType {
    Epic,
    Feature,
    Story,
    Task,
    Bug,
}

impl IssueType {
    pub const ALL: [Self; 5] = [Self::Epic, Self::Feature, Self::Story, Self::Task, Self::Bug];

    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Epic => "epic",
            Self::Feature => "feature",
            Self::Story => "story",
            Self::Task => "task",
            Self::Bug => "bug",
        }
    }
}

/// Ticket priority.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Lowest,
    Low,
    #[default]
    Medium,
    High,
    Highest,
}

impl Priority {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Lowest => "lowest",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Highest => "highest",
        }
    }
}

/// How a delete treats the children of the deleted ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteMode {
    /// Delete only this ticket; children lose their parent reference.
    Detach,
    /// Delete this ticket and all of its descendants.
    Cascade,
}

/// A ticket as stored and as held on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub key: String,
    pub project_id: String,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: Status,
    pub issue_type: IssueType,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<TicketId>,
    pub created_at_us: i64,
    pub updated_at_us: i64,
}

impl Ticket {
    /// Materialize a draft under the given id.
    #[must_use]
    pub fn from_draft(id: TicketId, draft: &TicketDraft, now_us: i64) -> Self {
        Self {
            id,
            key: draft.key.clone(),
            project_id: draft.project_id.clone(),
            summary: draft.summary.clone(),
            description: draft.description.clone(),
            status: draft.status,
            issue_type: draft.issue_type,
            priority: draft.priority,
            assignee: draft.assignee.clone(),
            parent_id: draft.parent_id.clone(),
            created_at_us: now_us,
            updated_at_us: now_us,
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.id.is_pending()
    }
}

/// Creation payload handed to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketDraft {
    pub key: String,
    pub project_id: String,
    pub summary: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: Status,
    pub issue_type: IssueType,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub parent_id: Option<TicketId>,
}

impl TicketDraft {
    /// Minimal draft: backlog status, medium priority, no parent.
    #[must_use]
    pub fn new(
        project_id: impl Into<String>,
        key: impl Into<String>,
        summary: impl Into<String>,
        issue_type: IssueType,
    ) -> Self {
        Self {
            key: key.into(),
            project_id: project_id.into(),
            summary: summary.into(),
            description: None,
            status: Status::Backlog,
            issue_type,
            priority: Priority::default(),
            assignee: None,
            parent_id: None,
        }
    }

    #[must_use]
    pub const fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn with_parent(mut self, parent_id: TicketId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }
}

/// Partial update of the mutable, non-status fields.
///
/// `None` leaves a field untouched. For nullable fields the inner `Option`
/// is the new value, so `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketPatch {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub assignee: Option<Option<String>>,
    #[serde(default)]
    pub parent_id: Option<Option<TicketId>>,
}

impl TicketPatch {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.summary.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.assignee.is_none()
            && self.parent_id.is_none()
    }

    /// Write every set field onto `ticket`.
    pub fn apply_to(&self, ticket: &mut Ticket) {
        if let Some(summary) = &self.summary {
            ticket.summary.clone_from(summary);
        }
        if let Some(description) = &self.description {
            ticket.description.clone_from(description);
        }
        if let Some(priority) = self.priority {
            ticket.priority = priority;
        }
        if let Some(assignee) = &self.assignee {
            ticket.assignee.clone_from(assignee);
        }
        if let Some(parent_id) = &self.parent_id {
            ticket.parent_id.clone_from(parent_id);
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl fmt::Display for DeleteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Detach => "detach",
            Self::Cascade => "cascade",
        })
    }
}

impl FromStr for IssueType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = normalize(s);
        match normalized.as_str() {
            "epic" => Ok(Self::Epic),
            "feature" => Ok(Self::Feature),
            "story" => Ok(Self::Story),
            "task" => Ok(Self::Task),
            "bug" => Ok(Self::Bug),
            _ => Err(ParseEnumError {
                expected: "issue type",
                got: s.to_string(),
            }),
        }
    }
}

impl FromStr for Priority {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = normalize(s);
        match normalized.as_str() {
            "lowest" => Ok(Self::Lowest),
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "highest" => Ok(Self::Highest),
            _ => Err(ParseEnumError {
                expected: "priority",
                got: s.to_string(),
            }),
        }
    }
}
