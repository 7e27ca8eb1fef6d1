//! `lanes update`: edit the non-status fields of a ticket.

use std::io::Write;
use std::path::Path;

use clap::Args;
use lanes_core::model::{Priority, Ticket, TicketPatch};

use super::{Project, open_project, resolve_ticket};
use crate::output::{CliError, OutputMode, fail, render};

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Ticket id or key.
    pub id: String,

    #[arg(short, long)]
    pub summary: Option<String>,

    /// New description; an empty string clears it.
    #[arg(short, long)]
    pub description: Option<String>,

    #[arg(short, long)]
    pub priority: Option<Priority>,

    /// New assignee; an empty string clears it.
    #[arg(short, long)]
    pub assignee: Option<String>,

    /// New parent ticket id or key.
    #[arg(long, conflicts_with = "clear_parent")]
    pub parent: Option<String>,

    /// Make the ticket top-level.
    #[arg(long)]
    pub clear_parent: bool,
}

fn clearable(value: Option<&String>) -> Option<Option<String>> {
    value.map(|v| {
        let v = v.trim();
        if v.is_empty() { None } else { Some(v.to_string()) }
    })
}

pub fn run_update(args: &UpdateArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let Project { mut session, .. } = open_project(project_root, output)?;
    let ticket = resolve_ticket(session.board(), &args.id, output)?;

    let parent_id = if args.clear_parent {
        Some(None)
    } else {
        match &args.parent {
            Some(raw) => Some(Some(resolve_ticket(session.board(), raw, output)?.id)),
            None => None,
        }
    };

    let patch = TicketPatch {
        summary: args.summary.as_ref().map(|s| s.trim().to_string()),
        description: clearable(args.description.as_ref()),
        priority: args.priority,
        assignee: clearable(args.assignee.as_ref()),
        parent_id,
    };
    if patch.is_empty() {
        return Err(fail(
            output,
            &CliError::new("nothing to update; pass at least one field flag"),
        ));
    }

    let updated = match session.update_ticket(&ticket.id, &patch) {
        Ok(updated) => updated,
        Err(err) => return Err(fail(output, &CliError::with_code(err.code(), err.to_string()))),
    };

    let violations = session
        .board()
        .violations()
        .into_iter()
        .filter(|v| v.parent_id == updated.id || v.child_id == updated.id)
        .collect::<Vec<_>>();
    for violation in &violations {
        tracing::warn!(%violation, "hierarchy rule broken by reparenting");
    }

    render(output, &updated, |t: &Ticket, w: &mut dyn Write| {
        writeln!(w, "✓ Updated {} ({})", t.key, t.id)?;
        for violation in &violations {
            writeln!(w, "  ⚠ {violation}")?;
        }
        Ok(())
    })
}
