//! `lanes show`: one ticket with its parent and children.

use std::io::Write;
use std::path::Path;

use clap::Args;
use lanes_core::model::{Status, Ticket};
use lanes_core::Board;
use serde::Serialize;

use super::{Project, micros_to_local_datetime, open_project, resolve_ticket};
use crate::output::{OutputMode, pretty_kv, pretty_rule, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Ticket id or key.
    pub id: String,
}

/// A related ticket in `show` output.
#[derive(Debug, Serialize)]
pub struct Related {
    pub key: String,
    pub status: Status,
    pub summary: String,
}

impl From<&Ticket> for Related {
    fn from(ticket: &Ticket) -> Self {
        Self {
            key: ticket.key.clone(),
            status: ticket.status,
            summary: ticket.summary.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ShowTicket {
    #[serde(flatten)]
    pub ticket: Ticket,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<Related>,
    pub children: Vec<Related>,
}

impl ShowTicket {
    fn from_board(board: &Board, ticket: Ticket) -> Self {
        let index = board.index();
        let parent = index.parent_of(&ticket.id).map(Related::from);
        let children = index
            .children_of(&ticket.id)
            .into_iter()
            .map(Related::from)
            .collect();
        Self {
            ticket,
            parent,
            children,
        }
    }
}

pub fn run_show(args: &ShowArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let Project { session, .. } = open_project(project_root, output)?;
    let ticket = resolve_ticket(session.board(), &args.id, output)?;
    let view = ShowTicket::from_board(session.board(), ticket);
    render_mode(output, &view, render_show_text, render_show_pretty)
}

fn render_show_text(view: &ShowTicket, w: &mut dyn Write) -> std::io::Result<()> {
    let t = &view.ticket;
    writeln!(w, "key\t{}", t.key)?;
    writeln!(w, "id\t{}", t.id)?;
    writeln!(w, "status\t{}", t.status)?;
    writeln!(w, "type\t{}", t.issue_type)?;
    writeln!(w, "priority\t{}", t.priority)?;
    writeln!(w, "summary\t{}", t.summary)?;
    if let Some(parent) = &view.parent {
        writeln!(w, "parent\t{}", parent.key)?;
    }
    for child in &view.children {
        writeln!(w, "child\t{}\t{}", child.key, child.status)?;
    }
    Ok(())
}

fn render_show_pretty(view: &ShowTicket, w: &mut dyn Write) -> std::io::Result<()> {
    let t = &view.ticket;
    pretty_section(w, &format!("{} {}", t.key, t.summary))?;
    pretty_kv(w, "ID", t.id.as_str())?;
    pretty_kv(w, "Status", t.status.to_string())?;
    pretty_kv(w, "Type", t.issue_type.to_string())?;
    pretty_kv(w, "Priority", t.priority.to_string())?;
    if let Some(assignee) = &t.assignee {
        pretty_kv(w, "Assignee", assignee)?;
    }
    if let Some(parent) = &view.parent {
        pretty_kv(w, "Parent", format!("{} ({})", parent.key, parent.status))?;
    }
    pretty_kv(w, "Created", micros_to_local_datetime(t.created_at_us))?;
    pretty_kv(w, "Updated", micros_to_local_datetime(t.updated_at_us))?;

    if let Some(description) = &t.description {
        writeln!(w)?;
        writeln!(w, "{description}")?;
    }

    if !view.children.is_empty() {
        writeln!(w)?;
        pretty_section(w, &format!("Children ({})", view.children.len()))?;
        for child in &view.children {
            writeln!(w, "  {:<10} {:<12} {}", child.key, child.status, child.summary)?;
        }
    }
    pretty_rule(w)
}
