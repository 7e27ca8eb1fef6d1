//! Subcommand handlers. Each `run_*` takes its parsed args, the output mode
//! and the directory the command was started in.

pub mod board;
pub mod check;
pub mod completions;
pub mod create;
pub mod delete;
pub mod init;
pub mod move_cmd;
pub mod show;
pub mod update;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use chrono::{DateTime, Local, Utc};
use lanes_core::board::Session;
use lanes_core::bus::EventBus;
use lanes_core::config::{self, ProjectConfig};
use lanes_core::error::ErrorCode;
use lanes_core::model::Ticket;
use lanes_core::store::SqliteStore;
use lanes_core::workflow::CascadePolicy;
use lanes_core::Board;
use tracing::debug;

use crate::output::{CliError, OutputMode, fail};

/// An opened project: its config and a session over its database.
pub struct Project {
    pub config: ProjectConfig,
    pub session: Session<SqliteStore>,
}

/// Locate the project enclosing `start`, load its config and its board.
///
/// # Errors
///
/// Renders and returns `E1001` outside a project and `E1002` for an
/// unreadable config; database failures are returned with context.
pub fn open_project(start: &Path, output: OutputMode) -> anyhow::Result<Project> {
    let Some(root) = config::find_project_root(start) else {
        return Err(fail(
            output,
            &CliError::with_code(
                ErrorCode::NotInitialized,
                format!(
                    "no {} directory found in {} or its parents",
                    config::LANES_DIR,
                    start.display()
                ),
            ),
        ));
    };

    let config = match config::load_project_config(&root) {
        Ok(config) => config,
        Err(err) => {
            return Err(fail(
                output,
                &CliError::with_code(ErrorCode::ConfigParseError, format!("{err:#}")),
            ));
        }
    };

    let store = SqliteStore::open(&config::db_path(&root))?;
    let bus = Arc::new(EventBus::new());
    // Never unsubscribed; the subscription lasts for the process.
    let _subscription = bus.subscribe(|event| {
        debug!(event = event.kind(), ticket_id = %event.ticket_id(), "board event");
    });

    let policy = CascadePolicy::from_project_config(&config);
    let session = Session::open(store, config.project.id.clone(), policy, bus)
        .with_context(|| format!("load tickets of project {}", config.project.id))?;
    Ok(Project { config, session })
}

/// Resolve an id or key to a ticket on `board`, rendering `E2001` if absent.
///
/// # Errors
///
/// Returns the rendered not-found error.
pub fn resolve_ticket(board: &Board, raw: &str, output: OutputMode) -> anyhow::Result<Ticket> {
    board.resolve(raw).cloned().ok_or_else(|| {
        fail(
            output,
            &CliError::with_code(ErrorCode::TicketNotFound, format!("ticket not found: '{raw}'")),
        )
    })
}

/// Key of `id` on `board`, or the id itself when it is gone.
pub fn display_key(board: &Board, id: &lanes_core::TicketId) -> String {
    board
        .ticket(id)
        .map_or_else(|| id.to_string(), |t| t.key.clone())
}

/// Local wall-clock rendering of a microsecond timestamp.
pub fn micros_to_local_datetime(us: i64) -> String {
    DateTime::<Utc>::from_timestamp_micros(us)
        .map(|ts| {
            ts.with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| us.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lanes_core::model::{IssueType, Status, TicketDraft, TicketId};
    use tempfile::TempDir;

    #[test]
    fn open_project_outside_a_project_fails() {
        let dir = TempDir::new().unwrap();
        let err = open_project(dir.path(), OutputMode::Json)
            .err()
            .expect("no project");
        assert!(err.to_string().contains(".lanes"));
    }

    #[test]
    fn open_project_finds_enclosing_root() {
        let dir = TempDir::new().unwrap();
        config::save_project_config(dir.path(), &ProjectConfig::default()).unwrap();
        let nested = dir.path().join("src/deep");
        std::fs::create_dir_all(&nested).unwrap();

        let project = open_project(&nested, OutputMode::Text).unwrap();
        assert_eq!(project.config.project.id, "PRJ");
        assert!(project.session.board().is_empty());
        assert!(config::db_path(dir.path()).exists());
    }

    #[test]
    fn resolve_ticket_accepts_key_or_id() {
        let mut board = Board::new("PRJ", CascadePolicy::default());
        let draft = TicketDraft::new("PRJ", "PRJ-1", "One", IssueType::Task);
        board.refresh(vec![Ticket::from_draft(TicketId::from("tk-1"), &draft, 1)]);

        assert_eq!(resolve_ticket(&board, "PRJ-1", OutputMode::Text).unwrap().id, TicketId::from("tk-1"));
        assert_eq!(resolve_ticket(&board, "tk-1", OutputMode::Text).unwrap().status, Status::Backlog);
        assert!(resolve_ticket(&board, "PRJ-9", OutputMode::Text).is_err());
        assert_eq!(display_key(&board, &TicketId::from("tk-1")), "PRJ-1");
        assert_eq!(display_key(&board, &TicketId::from("tk-9")), "tk-9");
    }

    #[test]
    fn invalid_timestamps_render_raw() {
        assert_eq!(micros_to_local_datetime(i64::MAX), i64::MAX.to_string());
    }
}
