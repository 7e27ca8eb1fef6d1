//! SQLite-backed ticket store.
//!
//! Runtime defaults match every other lanes database handle:
//! - `journal_mode = WAL` so the CLI can read while another process writes
//! - `busy_timeout = 5s` to ride out short lock contention
//! - `foreign_keys = ON` so `parent_id` always names a real row

pub mod migrations;
pub mod schema;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params, types::Type};
use std::{path::Path, str::FromStr, time::Duration};
use tracing::{debug, info};

use super::{StoreError, TicketStore, invalid_parent};
use crate::model::{DeleteMode, Status, Ticket, TicketDraft, TicketId, TicketPatch};
use schema::TICKET_COLUMNS;

/// Busy timeout used for store connections.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Length of the hash-derived part of a ticket id.
const ID_HASH_LEN: usize = 10;

/// Ticket store over a single SQLite connection.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database at `path`, apply pragmas and migrate.
    ///
    /// # Errors
    ///
    /// Returns an error if opening, configuring or migrating fails.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create database directory {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("open ticket database {}", path.display()))?;
        Self::from_connection(conn)
    }

    /// Fresh in-memory database, mostly for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if configuring or migrating fails.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory ticket database")?;
        Self::from_connection(conn)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        configure_connection(&conn).context("configure sqlite pragmas")?;
        let version = migrations::migrate(&mut conn).context("apply ticket store migrations")?;
        debug!(schema_version = version, "ticket store ready");
        Ok(Self { conn })
    }

    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Next free `PREFIX-n` key in the project.
    ///
    /// # Errors
    ///
    /// Returns an error if the key query fails.
    pub fn next_key(&self, project_id: &str, prefix: &str) -> Result<String, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT ticket_key FROM tickets WHERE project_id = ?1")?;
        let keys = stmt.query_map(params![project_id], |row| row.get::<_, String>(0))?;

        let mut highest = 0_u64;
        for key in keys {
            let key = key?;
            let number = key
                .strip_prefix(prefix)
                .and_then(|rest| rest.strip_prefix('-'))
                .and_then(|n| n.parse::<u64>().ok());
            if let Some(n) = number {
                highest = highest.max(n);
            }
        }
        Ok(format!("{prefix}-{}", highest + 1))
    }

    fn find(&self, id: &TicketId) -> Result<Option<Ticket>, StoreError> {
        let sql = format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE ticket_id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id.as_str()], row_to_ticket)
            .optional()?)
    }

    fn query_many(&self, filter: &str, arg: &str) -> Result<Vec<Ticket>, StoreError> {
        let sql = format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE {filter} \
             ORDER BY created_at_us, ticket_key"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![arg], row_to_ticket)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn key_taken(&self, project_id: &str, key: &str) -> Result<bool, StoreError> {
        Ok(self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM tickets WHERE project_id = ?1 AND ticket_key = ?2)",
            params![project_id, key],
            |row| row.get(0),
        )?)
    }

    /// Reject parents that are missing, foreign, or (for an existing ticket)
    /// the ticket itself or one of its descendants.
    fn check_parent(
        &self,
        ticket_id: Option<&TicketId>,
        project_id: &str,
        parent_id: &TicketId,
    ) -> Result<(), StoreError> {
        let parent = self
            .find(parent_id)?
            .ok_or_else(|| invalid_parent(parent_id, "no such ticket"))?;
        if parent.project_id != project_id {
            return Err(invalid_parent(parent_id, "belongs to another project"));
        }
        let Some(ticket_id) = ticket_id else {
            return Ok(());
        };

        let descendant: bool = self.conn.query_row(
            "WITH RECURSIVE chain(id) AS (
                 SELECT ?1
                 UNION
                 SELECT t.parent_id FROM tickets t JOIN chain ON t.ticket_id = chain.id
                 WHERE t.parent_id IS NOT NULL
             )
             SELECT EXISTS(SELECT 1 FROM chain WHERE id = ?2)",
            params![parent_id.as_str(), ticket_id.as_str()],
            |row| row.get(0),
        )?;
        if descendant {
            return Err(invalid_parent(parent_id, "would create a parent cycle"));
        }
        Ok(())
    }
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    Ok(())
}

/// `tk-` followed by the first hex chars of a blake3 hash over the
/// project, key and creation time.
fn generate_id(project_id: &str, key: &str, created_at_us: i64) -> TicketId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(project_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(key.as_bytes());
    hasher.update(b"\0");
    hasher.update(&created_at_us.to_le_bytes());
    let hex = hasher.finalize().to_hex();
    TicketId::new(format!("tk-{}", &hex[..ID_HASH_LEN]))
}

fn now_us() -> i64 {
    chrono::Utc::now().timestamp_micros()
}

fn parse_column<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_ticket(row: &rusqlite::Row<'_>) -> rusqlite::Result<Ticket> {
    Ok(Ticket {
        id: TicketId::new(row.get::<_, String>(0)?),
        key: row.get(1)?,
        project_id: row.get(2)?,
        summary: row.get(3)?,
        description: row.get(4)?,
        status: parse_column(row, 5)?,
        issue_type: parse_column(row, 6)?,
        priority: parse_column(row, 7)?,
        assignee: row.get(8)?,
        parent_id: row.get::<_, Option<String>>(9)?.map(TicketId::new),
        created_at_us: row.get(10)?,
        updated_at_us: row.get(11)?,
    })
}

impl TicketStore for SqliteStore {
    fn get_ticket(&self, id: &TicketId) -> Result<Ticket, StoreError> {
        self.find(id)?
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    fn update_ticket_status(&self, id: &TicketId, status: Status) -> Result<Ticket, StoreError> {
        let current = self.get_ticket(id)?;
        if current.status == status {
            return Ok(current);
        }
        let changed = self.conn.execute(
            "UPDATE tickets SET status = ?1, updated_at_us = ?2 WHERE ticket_id = ?3",
            params![status.as_str(), now_us(), id.as_str()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.clone()));
        }
        self.get_ticket(id)
    }

    fn get_children(&self, parent_id: &TicketId) -> Result<Vec<Ticket>, StoreError> {
        self.query_many("parent_id = ?1", parent_id.as_str())
    }

    fn create_ticket(&self, draft: &TicketDraft) -> Result<Ticket, StoreError> {
        if self.key_taken(&draft.project_id, &draft.key)? {
            return Err(StoreError::DuplicateKey {
                project_id: draft.project_id.clone(),
                key: draft.key.clone(),
            });
        }
        if let Some(parent_id) = &draft.parent_id {
            self.check_parent(None, &draft.project_id, parent_id)?;
        }

        let created_at_us = now_us();
        let id = generate_id(&draft.project_id, &draft.key, created_at_us);
        let ticket = Ticket::from_draft(id, draft, created_at_us);

        self.conn.execute(
            "INSERT INTO tickets (ticket_id, ticket_key, project_id, summary, description, \
             status, issue_type, priority, assignee, parent_id, created_at_us, updated_at_us) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                ticket.id.as_str(),
                ticket.key,
                ticket.project_id,
                ticket.summary,
                ticket.description,
                ticket.status.as_str(),
                ticket.issue_type.as_str(),
                ticket.priority.as_str(),
                ticket.assignee,
                ticket.parent_id.as_ref().map(TicketId::as_str),
                ticket.created_at_us,
                ticket.updated_at_us,
            ],
        )?;

        info!(ticket_id = %ticket.id, key = %ticket.key, "ticket created");
        Ok(ticket)
    }

    fn delete_ticket(&self, id: &TicketId, mode: DeleteMode) -> Result<Vec<TicketId>, StoreError> {
        if self.find(id)?.is_none() {
            return Err(StoreError::NotFound(id.clone()));
        }

        let tx = self.conn.unchecked_transaction()?;
        let removed: Vec<TicketId> = match mode {
            DeleteMode::Cascade => {
                let mut stmt = tx.prepare(
                    "WITH RECURSIVE subtree(id) AS (
                         SELECT ?1
                         UNION
                         SELECT t.ticket_id FROM tickets t JOIN subtree ON t.parent_id = subtree.id
                     )
                     SELECT id FROM subtree",
                )?;
                let ids = stmt
                    .query_map(params![id.as_str()], |row| row.get::<_, String>(0))?
                    .map(|r| r.map(TicketId::new))
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                drop(stmt);
                for gone in ids.iter().rev() {
                    tx.execute(
                        "DELETE FROM tickets WHERE ticket_id = ?1",
                        params![gone.as_str()],
                    )?;
                }
                ids
            }
            DeleteMode::Detach => {
                tx.execute(
                    "UPDATE tickets SET parent_id = NULL, updated_at_us = ?1 WHERE parent_id = ?2",
                    params![now_us(), id.as_str()],
                )?;
                tx.execute(
                    "DELETE FROM tickets WHERE ticket_id = ?1",
                    params![id.as_str()],
                )?;
                vec![id.clone()]
            }
        };
        tx.commit()?;

        info!(ticket_id = %id, %mode, removed = removed.len(), "ticket deleted");
        Ok(removed)
    }

    fn list_tickets(&self, project_id: &str) -> Result<Vec<Ticket>, StoreError> {
        self.query_many("project_id = ?1", project_id)
    }

    fn update_ticket(&self, id: &TicketId, patch: &TicketPatch) -> Result<Ticket, StoreError> {
        let mut ticket = self.get_ticket(id)?;
        if let Some(Some(parent_id)) = &patch.parent_id {
            self.check_parent(Some(id), &ticket.project_id, parent_id)?;
        }

        patch.apply_to(&mut ticket);
        ticket.updated_at_us = now_us();
        self.conn.execute(
            "UPDATE tickets SET summary = ?1, description = ?2, priority = ?3, assignee = ?4, \
             parent_id = ?5, updated_at_us = ?6 WHERE ticket_id = ?7",
            params![
                ticket.summary,
                ticket.description,
                ticket.priority.as_str(),
                ticket.assignee,
                ticket.parent_id.as_ref().map(TicketId::as_str),
                ticket.updated_at_us,
                id.as_str(),
            ],
        )?;
        Ok(ticket)
    }
}
