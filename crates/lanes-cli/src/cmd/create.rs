//! `lanes create`: stage, persist and reconcile a new ticket.

use std::io::Write;
use std::path::Path;

use clap::Args;
use lanes_core::model::{IssueType, Priority, Status, Ticket, TicketDraft};

use super::{Project, open_project, resolve_ticket};
use crate::output::{CliError, OutputMode, fail, render_mode};

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// One-line summary of the ticket.
    #[arg(short, long)]
    pub summary: String,

    /// Explicit key; the next free `PREFIX-n` is used when omitted.
    #[arg(short, long)]
    pub key: Option<String>,

    /// Issue type: epic, feature, story, task or bug.
    #[arg(short = 't', long = "type", default_value = "task")]
    pub issue_type: IssueType,

    /// Initial status.
    #[arg(long, default_value = "backlog")]
    pub status: Status,

    /// Priority: lowest, low, medium, high or highest.
    #[arg(short, long, default_value = "medium")]
    pub priority: Priority,

    /// Parent ticket id or key.
    #[arg(long)]
    pub parent: Option<String>,

    #[arg(short, long)]
    pub assignee: Option<String>,

    #[arg(short, long)]
    pub description: Option<String>,
}

pub fn run_create(args: &CreateArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let Project {
        config,
        mut session,
    } = open_project(project_root, output)?;

    let parent_id = match &args.parent {
        Some(raw) => Some(resolve_ticket(session.board(), raw, output)?.id),
        None => None,
    };

    let key = match &args.key {
        Some(key) => key.trim().to_string(),
        None => session
            .store()
            .next_key(&config.project.id, config.project.key_prefix())?,
    };
    if key.is_empty() {
        return Err(fail(output, &CliError::new("ticket key must not be empty")));
    }

    let mut draft = TicketDraft::new(&config.project.id, key, args.summary.trim(), args.issue_type)
        .with_status(args.status);
    draft.priority = args.priority;
    draft.parent_id = parent_id;
    draft.assignee.clone_from(&args.assignee);
    draft.description.clone_from(&args.description);

    let ticket = match session.create_ticket(&draft) {
        Ok(ticket) => ticket,
        Err(err) => return Err(fail(output, &CliError::with_code(err.code(), err.to_string()))),
    };

    render_mode(output, &ticket, render_created_text, render_created_pretty)
}

fn render_created_text(ticket: &Ticket, w: &mut dyn Write) -> std::io::Result<()> {
    writeln!(w, "{}\t{}\t{}", ticket.key, ticket.id, ticket.status)
}

fn render_created_pretty(ticket: &Ticket, w: &mut dyn Write) -> std::io::Result<()> {
    writeln!(
        w,
        "✓ Created {} {} ({}) in {}",
        ticket.issue_type, ticket.key, ticket.id, ticket.status
    )?;
    writeln!(w, "  {}", ticket.summary)
}
