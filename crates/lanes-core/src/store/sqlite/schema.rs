//! SQLite schema for the ticket store.
//!
//! One `tickets` table holds every project. Enum columns are CHECK-constrained
//! to the canonical text forms so a row can always be parsed back.

/// Migration v1: the tickets table and its lookup indexes.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS tickets (
    ticket_id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL CHECK (length(trim(project_id)) > 0),
    ticket_key TEXT NOT NULL CHECK (length(trim(ticket_key)) > 0),
    summary TEXT NOT NULL,
    description TEXT,
    status TEXT NOT NULL
        CHECK (status IN ('backlog', 'todo', 'in-progress', 'review', 'done')),
    issue_type TEXT NOT NULL
        CHECK (issue_type IN ('epic', 'feature', 'story', 'task', 'bug')),
    priority TEXT NOT NULL DEFAULT 'medium'
        CHECK (priority IN ('lowest', 'low', 'medium', 'high', 'highest')),
    assignee TEXT,
    parent_id TEXT REFERENCES tickets(ticket_id) ON DELETE SET NULL,
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL,
    CHECK (ticket_id LIKE 'tk-%'),
    CHECK (parent_id IS NULL OR parent_id <> ticket_id)
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_tickets_project_key
    ON tickets(project_id, ticket_key);

CREATE INDEX IF NOT EXISTS idx_tickets_parent
    ON tickets(parent_id);
";

/// Migration v2: board loads filter by project and group by status.
pub const MIGRATION_V2_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_tickets_project_status
    ON tickets(project_id, status, created_at_us);
";

/// Indexes that must exist after all migrations.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_tickets_project_key",
    "idx_tickets_parent",
    "idx_tickets_project_status",
];

/// Column list shared by every ticket SELECT, in `row_to_ticket` order.
pub const TICKET_COLUMNS: &str = "ticket_id, ticket_key, project_id, summary, description, \
     status, issue_type, priority, assignee, parent_id, created_at_us, updated_at_us";
