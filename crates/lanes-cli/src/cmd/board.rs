//! `lanes board`: print the five status columns.

use std::io::Write;
use std::path::Path;

use clap::Args;
use lanes_core::model::{IssueType, Priority, Status, TicketId};
use lanes_core::Board;
use serde::Serialize;

use super::{Project, display_key, open_project};
use crate::output::{OutputMode, pretty_section, render_mode};

#[derive(Args, Debug, Default)]
pub struct BoardArgs {
    /// Skip empty columns in pretty output.
    #[arg(long)]
    pub compact: bool,
}

#[derive(Debug, Serialize)]
pub struct BoardView {
    pub project_id: String,
    pub columns: Vec<ColumnView>,
    pub degraded: bool,
}

#[derive(Debug, Serialize)]
pub struct ColumnView {
    pub status: Status,
    pub tickets: Vec<CardView>,
}

#[derive(Debug, Serialize)]
pub struct CardView {
    pub id: TicketId,
    pub key: String,
    pub summary: String,
    pub issue_type: IssueType,
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

impl BoardView {
    pub fn from_board(board: &Board) -> Self {
        let columns = board
            .columns()
            .iter()
            .map(|column| ColumnView {
                status: column.status(),
                tickets: column
                    .ticket_ids()
                    .iter()
                    .filter_map(|id| board.ticket(id))
                    .map(|t| CardView {
                        id: t.id.clone(),
                        key: t.key.clone(),
                        summary: t.summary.clone(),
                        issue_type: t.issue_type,
                        priority: t.priority,
                        parent: t.parent_id.as_ref().map(|p| display_key(board, p)),
                    })
                    .collect(),
            })
            .collect();
        Self {
            project_id: board.project_id().to_string(),
            columns,
            degraded: board.health().degraded,
        }
    }
}

pub fn run_board(args: &BoardArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let Project { session, .. } = open_project(project_root, output)?;
    let view = BoardView::from_board(session.board());
    let compact = args.compact;
    render_mode(output, &view, render_board_text, |v, w| {
        render_board_pretty(v, compact, w)
    })
}

fn render_board_text(view: &BoardView, w: &mut dyn Write) -> std::io::Result<()> {
    for column in &view.columns {
        for card in &column.tickets {
            writeln!(
                w,
                "{}\t{}\t{}\t{}",
                column.status, card.key, card.issue_type, card.summary
            )?;
        }
    }
    Ok(())
}

fn render_board_pretty(view: &BoardView, compact: bool, w: &mut dyn Write) -> std::io::Result<()> {
    writeln!(w, "Board {}", view.project_id)?;
    if view.degraded {
        writeln!(w, "⚠ hierarchy has cycles; run `lanes check` for details")?;
    }
    for column in &view.columns {
        if compact && column.tickets.is_empty() {
            continue;
        }
        writeln!(w)?;
        pretty_section(w, &format!("{} ({})", column.status, column.tickets.len()))?;
        for card in &column.tickets {
            let parent = card
                .parent
                .as_deref()
                .map(|p| format!("  ↑ {p}"))
                .unwrap_or_default();
            writeln!(
                w,
                "  {:<10} {:<8} {}{parent}",
                card.key, card.issue_type, card.summary
            )?;
        }
    }
    Ok(())
}
