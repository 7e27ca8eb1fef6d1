#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{CommandFactory, Parser, Subcommand};
use output::resolve_output_mode;
use std::env;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "lanes: a ticket board whose columns follow the issue hierarchy",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Setup",
        about = "Initialize a lanes project",
        long_about = "Create .lanes/ with a config file and an empty ticket database.",
        after_help = "EXAMPLES:\n    # Initialize with the default project id\n    lanes init\n\n    # Pick a project id and key prefix\n    lanes init --project SHOP --prefix SH"
    )]
    Init(cmd::init::InitArgs),

    #[command(
        next_help_heading = "Tickets",
        about = "Create a ticket",
        after_help = "EXAMPLES:\n    # Create a task in the backlog\n    lanes create --summary \"Fix login timeout\"\n\n    # Create a story under an epic\n    lanes create -s \"Checkout\" -t story --parent PRJ-1"
    )]
    Create(cmd::create::CreateArgs),

    #[command(
        next_help_heading = "Read",
        about = "Show the board",
        long_about = "Print the five status columns of the project."
    )]
    Board(cmd::board::BoardArgs),

    #[command(
        next_help_heading = "Read",
        about = "Show one ticket",
        after_help = "EXAMPLES:\n    # By key\n    lanes show PRJ-3\n\n    # Emit machine-readable output\n    lanes show PRJ-3 --json"
    )]
    Show(cmd::show::ShowArgs),

    #[command(
        next_help_heading = "Tickets",
        about = "Move a ticket to another status",
        long_about = "Move a ticket to another status. Parents follow their children: \
                      finishing the last open child completes the parent, and moving a \
                      child back pulls its ancestors back with it.",
        after_help = "EXAMPLES:\n    # Finish a task\n    lanes move PRJ-4 done\n\n    # Send a ticket back\n    lanes move PRJ-4 todo"
    )]
    Move(cmd::move_cmd::MoveArgs),

    #[command(next_help_heading = "Tickets", about = "Edit ticket fields")]
    Update(cmd::update::UpdateArgs),

    #[command(next_help_heading = "Tickets", about = "Delete a ticket")]
    Delete(cmd::delete::DeleteArgs),

    #[command(
        next_help_heading = "Read",
        about = "Check hierarchy health",
        long_about = "Report parent cycles, dangling parents and parents that are ahead of their children."
    )]
    Check(cmd::check::CheckArgs),

    #[command(
        next_help_heading = "Setup",
        about = "Generate shell completions",
        after_help = "EXAMPLES:\n    lanes completions bash > ~/.local/share/bash-completion/completions/lanes"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn default_filter(verbose: bool) -> &'static str {
    if verbose || env::var("DEBUG").is_ok() {
        "lanes=debug,info"
    } else {
        "lanes=info,warn"
    }
}

fn init_tracing(verbose: bool, quiet: bool) {
    let filter = EnvFilter::try_from_env("LANES_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if quiet { "error" } else { default_filter(verbose) })
    });

    let format = env::var("LANES_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let project_root = env::current_dir()?;
    let output = resolve_output_mode(cli.json, &project_root);
    debug!(?output, root = %project_root.display(), "starting");

    match cli.command {
        Commands::Init(ref args) => cmd::init::run_init(args, output, &project_root),
        Commands::Create(ref args) => cmd::create::run_create(args, output, &project_root),
        Commands::Board(ref args) => cmd::board::run_board(args, output, &project_root),
        Commands::Show(ref args) => cmd::show::run_show(args, output, &project_root),
        Commands::Move(ref args) => cmd::move_cmd::run_move(args, output, &project_root),
        Commands::Update(ref args) => cmd::update::run_update(args, output, &project_root),
        Commands::Delete(ref args) => cmd::delete::run_delete(args, output, &project_root),
        Commands::Check(ref args) => cmd::check::run_check(args, output, &project_root),
        Commands::Completions(ref args) => {
            let mut command = Cli::command();
            cmd::completions::run_completions(args.shell, &mut command)
        }
    }
}
