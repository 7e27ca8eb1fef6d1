//! Ticket data model: statuses, issue types, priorities, drafts and patches.

pub mod status;
pub mod ticket;

use std::fmt;

pub use status::Status;
pub use ticket::{
    DeleteMode, IssueType, PENDING_ID_PREFIX, Priority, Ticket, TicketDraft, TicketId,
    TicketPatch,
};

/// Error returned when parsing an enum value from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub expected: &'static str,
    pub got: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: '{}'", self.expected, self.got)
    }
}

impl std::error::Error for ParseEnumError {}

fn normalize(input: &str) -> String {
    input.trim().to_ascii_lowercase()
}
