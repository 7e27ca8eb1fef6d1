//! `lanes check`: hierarchy health and status-rule violations.

use std::io::Write;
use std::path::Path;

use clap::Args;
use lanes_core::board::{BoardHealth, Violation};
use serde::Serialize;

use super::{Project, open_project};
use crate::output::{CliError, OutputMode, fail, render};
use lanes_core::error::ErrorCode;

#[derive(Args, Debug, Default)]
pub struct CheckArgs {
    /// Exit zero even when problems are found.
    #[arg(long)]
    pub no_fail: bool,
}

#[derive(Debug, Serialize)]
struct CheckOutput {
    tickets: usize,
    #[serde(flatten)]
    health: BoardHealth,
    #[serde(serialize_with = "serialize_violations")]
    violations: Vec<Violation>,
}

impl CheckOutput {
    fn is_clean(&self) -> bool {
        self.health.is_healthy() && self.violations.is_empty()
    }
}

fn serialize_violations<S>(violations: &[Violation], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    #[derive(Serialize)]
    struct Entry<'a> {
        #[serde(flatten)]
        violation: &'a Violation,
        message: String,
    }
    serializer.collect_seq(violations.iter().map(|violation| Entry {
        violation,
        message: violation.to_string(),
    }))
}

pub fn run_check(args: &CheckArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let Project { session, .. } = open_project(project_root, output)?;
    let board = session.board();
    let report = CheckOutput {
        tickets: board.len(),
        health: board.health(),
        violations: board.violations(),
    };

    render(output, &report, render_check_human)?;

    if !report.is_clean() && !args.no_fail {
        let code = if report.health.degraded {
            ErrorCode::CycleDetected
        } else {
            ErrorCode::TransitionDenied
        };
        return Err(fail(
            output,
            &CliError::with_code(
                code,
                format!(
                    "{} violation(s), {} cycle(s), {} dangling parent(s)",
                    report.violations.len(),
                    report.health.errors.len(),
                    report.health.dangling.len()
                ),
            ),
        ));
    }
    Ok(())
}

fn render_check_human(report: &CheckOutput, w: &mut dyn Write) -> std::io::Result<()> {
    let status = |ok: bool| if ok { "✓" } else { "⚠" };
    writeln!(w, "Checked {} ticket(s)", report.tickets)?;
    writeln!(
        w,
        "{} cycles: {}",
        status(report.health.errors.is_empty()),
        report.health.errors.len()
    )?;
    for error in &report.health.errors {
        writeln!(w, "    {error}")?;
    }
    writeln!(
        w,
        "{} dangling parents: {}",
        status(report.health.dangling.is_empty()),
        report.health.dangling.len()
    )?;
    for id in &report.health.dangling {
        writeln!(w, "    {id}")?;
    }
    writeln!(
        w,
        "{} status violations: {}",
        status(report.violations.is_empty()),
        report.violations.len()
    )?;
    for violation in &report.violations {
        writeln!(w, "    {violation}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lanes_core::model::{IssueType, Status, Ticket, TicketDraft};
    use lanes_core::workflow::CascadePolicy;
    use lanes_core::Board;

    fn report(tickets: Vec<Ticket>) -> CheckOutput {
        let mut board = Board::new("PRJ", CascadePolicy::default());
        board.refresh(tickets);
        CheckOutput {
            tickets: board.len(),
            health: board.health(),
            violations: board.violations(),
        }
    }

    fn ticket(id: &str, status: Status, parent: Option<&str>) -> Ticket {
        let mut draft = TicketDraft::new("PRJ", id.to_uppercase(), id, IssueType::Task)
            .with_status(status);
        draft.parent_id = parent.map(Into::into);
        Ticket::from_draft(id.into(), &draft, 0)
    }

    #[test]
    fn clean_board_reports_clean() {
        let report = report(vec![
            ticket("p", Status::Todo, None),
            ticket("c", Status::Review, Some("p")),
        ]);
        assert!(report.is_clean());
        let mut buf = Vec::new();
        render_check_human(&report, &mut buf).unwrap();
        assert!(String::from_utf8(buf).unwrap().contains("✓ status violations: 0"));
    }

    #[test]
    fn violations_are_serialized_with_messages() {
        let report = report(vec![
            ticket("p", Status::Review, None),
            ticket("c", Status::Todo, Some("p")),
        ]);
        assert!(!report.is_clean());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["violations"][0]["parent_id"], "p");
        assert_eq!(
            json["violations"][0]["message"],
            "p (review) is ahead of child c (todo)"
        );
        assert_eq!(json["degraded"], false);
    }
}
