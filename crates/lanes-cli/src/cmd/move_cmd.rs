//! `lanes move`: change a ticket's status through the workflow engine.
//!
//! The move is validated, cascaded to ancestors, applied to the board and
//! persisted effect by effect. A denial or a failed write exits non-zero.

use std::io::Write;
use std::path::Path;

use clap::Args;
use lanes_core::board::{MoveReport, MoveResult};
use lanes_core::model::Status;
use lanes_core::Board;
use serde::Serialize;

use super::{Project, display_key, open_project, resolve_ticket};
use crate::output::{CliError, OutputMode, fail, render_mode};

#[derive(Args, Debug)]
pub struct MoveArgs {
    /// Ticket id or key.
    pub id: String,

    /// Target status: backlog, todo, in-progress, review or done.
    pub status: Status,
}

/// One status change as shown to the user.
#[derive(Debug, Serialize)]
pub struct ChangeLine {
    pub key: String,
    pub from: Status,
    pub to: Status,
    pub cascaded: bool,
}

#[derive(Debug, Serialize)]
pub struct MoveOutput {
    pub key: String,
    pub target: Status,
    pub changes: Vec<ChangeLine>,
    #[serde(flatten)]
    pub report: MoveReport,
}

impl MoveOutput {
    fn new(board: &Board, key: String, target: Status, report: MoveReport) -> Self {
        let changes = report
            .result
            .plan()
            .map(|plan| {
                plan.effects
                    .iter()
                    .enumerate()
                    .map(|(i, planned)| ChangeLine {
                        key: display_key(board, &planned.effect.ticket_id),
                        from: planned.effect.from,
                        to: planned.effect.to,
                        cascaded: i > 0,
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self {
            key,
            target,
            changes,
            report,
        }
    }
}

pub fn run_move(args: &MoveArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let Project { mut session, .. } = open_project(project_root, output)?;
    let ticket = resolve_ticket(session.board(), &args.id, output)?;

    let report = session.move_ticket(&ticket.id, args.status);

    if let MoveResult::Denied(denial) = &report.result {
        return Err(fail(
            output,
            &CliError::with_code(denial.code(), denial.message()),
        ));
    }

    let failures = report.failures.len();
    let view = MoveOutput::new(session.board(), ticket.key, args.status, report);
    render_mode(output, &view, render_move_text, render_move_pretty)?;

    if failures > 0 {
        let first = &view.report.failures[0];
        return Err(fail(
            output,
            &CliError::with_code(
                first.code,
                format!("{failures} of {} writes failed; first: {}", view.changes.len(), first.message),
            ),
        ));
    }
    Ok(())
}

fn render_move_text(view: &MoveOutput, w: &mut dyn Write) -> std::io::Result<()> {
    for change in &view.changes {
        writeln!(w, "{}\t{}\t{}", change.key, change.from, change.to)?;
    }
    for failure in &view.report.failures {
        writeln!(w, "failed\t{}\t{}", failure.effect.ticket_id, failure.message)?;
    }
    Ok(())
}

fn render_move_pretty(view: &MoveOutput, w: &mut dyn Write) -> std::io::Result<()> {
    if view.changes.is_empty() {
        return writeln!(w, "• {} is already {}", view.key, view.target);
    }
    for change in &view.changes {
        let marker = if change.cascaded { "  ↳" } else { "✓" };
        writeln!(w, "{marker} {}: {} -> {}", change.key, change.from, change.to)?;
    }
    for failure in &view.report.failures {
        let state = if failure.reverted { "reverted" } else { "kept" };
        writeln!(
            w,
            "✗ {} ({state}): {}",
            failure.effect, failure.message
        )?;
    }
    Ok(())
}
