//! `lanes delete`: remove a ticket, optionally with its subtree.

use std::io::Write;
use std::path::Path;

use clap::Args;
use lanes_core::model::{DeleteMode, TicketId};
use serde::Serialize;

use super::{Project, open_project, resolve_ticket};
use crate::output::{CliError, OutputMode, fail, render};

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Ticket id or key.
    pub id: String,

    /// Also delete every descendant; otherwise children become top-level.
    #[arg(long)]
    pub cascade: bool,
}

impl DeleteArgs {
    const fn mode(&self) -> DeleteMode {
        if self.cascade {
            DeleteMode::Cascade
        } else {
            DeleteMode::Detach
        }
    }
}

#[derive(Debug, Serialize)]
struct DeleteOutput {
    key: String,
    mode: DeleteMode,
    removed: Vec<TicketId>,
}

pub fn run_delete(args: &DeleteArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let Project { mut session, .. } = open_project(project_root, output)?;
    let ticket = resolve_ticket(session.board(), &args.id, output)?;

    let removed = match session.delete_ticket(&ticket.id, args.mode()) {
        Ok(removed) => removed,
        Err(err) => return Err(fail(output, &CliError::with_code(err.code(), err.to_string()))),
    };

    let payload = DeleteOutput {
        key: ticket.key,
        mode: args.mode(),
        removed,
    };
    render(output, &payload, |p, w: &mut dyn Write| {
        writeln!(w, "✓ Deleted {} ({} ticket(s), {})", p.key, p.removed.len(), p.mode)
    })
}
