use std::fmt;

/// Machine-readable error codes for UI and scripting decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotInitialized,
    ConfigParseError,
    TicketNotFound,
    ParentNotFound,
    TransitionDenied,
    CycleDetected,
    DuplicateKey,
    InvalidEnumValue,
    InvalidParent,
    PersistenceUnavailable,
    StoreFailure,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotInitialized => "E1001",
            Self::ConfigParseError => "E1002",
            Self::TicketNotFound => "E2001",
            Self::ParentNotFound => "E2002",
            Self::TransitionDenied => "E2003",
            Self::CycleDetected => "E2004",
            Self::DuplicateKey => "E2005",
            Self::InvalidEnumValue => "E2006",
            Self::InvalidParent => "E2007",
            Self::PersistenceUnavailable => "E5001",
            Self::StoreFailure => "E5002",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotInitialized => "Project not initialized",
            Self::ConfigParseError => "Config file parse error",
            Self::TicketNotFound => "Ticket not found",
            Self::ParentNotFound => "Parent ticket not found",
            Self::TransitionDenied => "Status change denied by hierarchy rules",
            Self::CycleDetected => "Parent cycle detected",
            Self::DuplicateKey => "Ticket key already exists in project",
            Self::InvalidEnumValue => "Invalid status/type/priority value",
            Self::InvalidParent => "Invalid parent reference",
            Self::PersistenceUnavailable => "Persistence temporarily unavailable",
            Self::StoreFailure => "Ticket store failure",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint surfaced next to the message.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run `lanes init` to initialize this directory."),
            Self::ConfigParseError => Some("Fix syntax in .lanes/config.toml and retry."),
            Self::TicketNotFound | Self::ParentNotFound => {
                Some("Run `lanes board` to list ticket keys, or refresh the board.")
            }
            Self::TransitionDenied => Some(
                "A parent may not move ahead of its slowest child, and may only be done \
                 when every child is done.",
            ),
            Self::CycleDetected => Some("Reparent one ticket in the loop to break the cycle."),
            Self::DuplicateKey => Some("Choose a different key or omit it to auto-number."),
            Self::InvalidEnumValue => Some("Use one of the documented status/type/priority values."),
            Self::InvalidParent => Some("Parents must exist in the same project and not be descendants."),
            Self::PersistenceUnavailable => Some("Retry the change; it was rolled back locally."),
            Self::StoreFailure => Some("Check the database file and permissions."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }

    /// Whether the failed operation can be retried unchanged.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::PersistenceUnavailable | Self::StoreFailure)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl serde::Serialize for ErrorCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}
