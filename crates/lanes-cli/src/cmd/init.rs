//! `lanes init`: create `.lanes/` with a config file and an empty database.

use std::path::Path;

use anyhow::Result;
use clap::Args;
use lanes_core::config::{self, ProjectConfig};
use lanes_core::store::SqliteStore;
use serde::Serialize;

use crate::output::{CliError, OutputMode, fail, render};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Project id stored on every ticket.
    #[arg(long, default_value = "PRJ")]
    pub project: String,

    /// Prefix for generated ticket keys (defaults to the project id).
    #[arg(long)]
    pub prefix: Option<String>,

    /// Rewrite the config even if `.lanes/` already exists.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
struct InitOutput {
    project_id: String,
    key_prefix: String,
    config: String,
    database: String,
}

/// Execute `lanes init`. Creates the project skeleton:
///
/// ```text
/// .lanes/
///   config.toml   (project id, key prefix, cascade policy)
///   lanes.db      (ticket store, migrated to the latest schema)
/// ```
///
/// # Errors
///
/// Returns an error if `.lanes/` already exists and `--force` is not set,
/// or if writing the config or creating the database fails.
pub fn run_init(args: &InitArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let project_id = args.project.trim();
    if project_id.is_empty() {
        return Err(fail(output, &CliError::new("project id must not be empty")));
    }

    if config::lanes_dir(project_root).exists() && !args.force {
        return Err(fail(
            output,
            &CliError::new(".lanes/ already exists. Use `lanes init --force` to reinitialize."),
        ));
    }

    let mut cfg = ProjectConfig::default();
    cfg.project.id = project_id.to_string();
    cfg.project.key_prefix = args
        .prefix
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string);

    let config_path = config::save_project_config(project_root, &cfg)?;
    let db_path = config::db_path(project_root);
    SqliteStore::open(&db_path)?;

    tracing::info!(project = %cfg.project.id, "project initialized");

    let payload = InitOutput {
        project_id: cfg.project.id.clone(),
        key_prefix: cfg.project.key_prefix().to_string(),
        config: config_path.display().to_string(),
        database: db_path.display().to_string(),
    };
    render(output, &payload, |p, w| {
        writeln!(w, "✓ Initialized .lanes/ for project {}.", p.project_id)?;
        writeln!(w)?;
        writeln!(w, "  Config:    {}", p.config)?;
        writeln!(w, "  Database:  {}", p.database)?;
        writeln!(w, "  Keys:      {}-1, {}-2, ...", p.key_prefix, p.key_prefix)?;
        writeln!(w)?;
        writeln!(w, "Next steps:")?;
        writeln!(w, "  lanes create --summary \"First ticket\"")?;
        writeln!(w, "  lanes board")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args(project: &str, prefix: Option<&str>, force: bool) -> InitArgs {
        InitArgs {
            project: project.to_string(),
            prefix: prefix.map(str::to_string),
            force,
        }
    }

    #[test]
    fn init_writes_config_and_database() {
        let dir = TempDir::new().unwrap();
        run_init(&args("OPS", Some("OP"), false), OutputMode::Json, dir.path()).unwrap();

        let cfg = config::load_project_config(dir.path()).unwrap();
        assert_eq!(cfg.project.id, "OPS");
        assert_eq!(cfg.project.key_prefix(), "OP");
        assert!(config::db_path(dir.path()).exists());
    }

    #[test]
    fn init_refuses_existing_project_without_force() {
        let dir = TempDir::new().unwrap();
        run_init(&args("PRJ", None, false), OutputMode::Json, dir.path()).unwrap();
        assert!(run_init(&args("PRJ", None, false), OutputMode::Json, dir.path()).is_err());
        assert!(run_init(&args("NEW", None, true), OutputMode::Json, dir.path()).is_ok());
        assert_eq!(config::load_project_config(dir.path()).unwrap().project.id, "NEW");
    }

    #[test]
    fn blank_prefix_falls_back_to_project_id() {
        let dir = TempDir::new().unwrap();
        run_init(&args("CORE", Some("  "), false), OutputMode::Json, dir.path()).unwrap();
        let cfg = config::load_project_config(dir.path()).unwrap();
        assert_eq!(cfg.project.key_prefix(), "CORE");
    }
}
