#![forbid(unsafe_code)]

use std::process::ExitCode;

use anyhow::{Result, bail};
use clap::Parser;
use lanes_sim::campaign::{CampaignConfig, replay_seed, run_campaign};
use tracing_subscriber::EnvFilter;

/// Run deterministic board simulations over a range of seeds.
#[derive(Parser, Debug)]
#[command(name = "lanes-sim", version, about, long_about = None)]
struct Args {
    /// First seed (inclusive).
    #[arg(long, default_value_t = 0)]
    seed_start: u64,

    /// Number of seeds to run.
    #[arg(long, default_value_t = 100)]
    seeds: u64,

    /// Replay a single seed and print its full trace.
    #[arg(long, conflicts_with_all = ["seed_start", "seeds"])]
    replay: Option<u64>,

    #[arg(long, default_value_t = 2)]
    epics: usize,

    #[arg(long, default_value_t = 3)]
    max_children: usize,

    #[arg(long, default_value_t = 20)]
    rounds: u64,

    #[arg(long, default_value_t = 3)]
    moves_per_round: usize,

    /// Disable rolling parents up to done.
    #[arg(long)]
    no_auto_complete: bool,

    /// Disable pulling parents forward.
    #[arg(long)]
    no_pull_forward: bool,

    #[arg(long, default_value_t = 3)]
    max_delay: u8,

    /// Percent chance a delivered batch is shuffled.
    #[arg(long, default_value_t = 50)]
    reorder: u8,

    /// Percent chance a status write fails.
    #[arg(long, default_value_t = 0)]
    failure: u8,

    /// Percent chance per round of reloading the board from the store.
    #[arg(long, default_value_t = 10)]
    refresh: u8,

    /// Emit JSON instead of a summary line.
    #[arg(long)]
    json: bool,
}

impl Args {
    fn campaign(&self) -> Result<CampaignConfig> {
        let Some(end) = self.seed_start.checked_add(self.seeds) else {
            bail!("seed range overflows u64");
        };
        Ok(CampaignConfig {
            seed_range: self.seed_start..end,
            epics: self.epics,
            max_children: self.max_children,
            rounds: self.rounds,
            moves_per_round: self.moves_per_round,
            auto_complete: !self.no_auto_complete,
            pull_forward: !self.no_pull_forward,
            fault_max_delay: self.max_delay,
            fault_reorder_percent: self.reorder,
            fault_failure_percent: self.failure,
            fault_refresh_percent: self.refresh,
        })
    }
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("LANES_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let args = Args::parse();
    let config = args.campaign()?;

    if let Some(seed) = args.replay {
        config.validate()?;
        let result = replay_seed(seed, &config)?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else {
            for event in &result.trace {
                println!("round {:>3}  {}", event.round, serde_json::to_string(&event.kind)?);
            }
            println!(
                "seed {seed}: passed={} interesting={} moves={} stale={} reverted={}",
                result.oracle.passed,
                result.interesting_state_reached,
                result.stats.moves_applied,
                result.stats.stale,
                result.stats.reverted
            );
            for violation in &result.oracle.violations {
                println!("  violation: {violation}");
            }
        }
        return Ok(if result.oracle.passed {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    let report = run_campaign(&config)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "campaign complete: seeds={} passed={} interesting={} first_failure={}",
            report.seeds_run,
            report.seeds_passed,
            report.interesting_states_reached,
            report
                .first_failure
                .map_or_else(|| "none".to_string(), |seed| seed.to_string())
        );
        for failure in &report.failures {
            println!("  seed {}: {}", failure.seed, failure.violations.join("; "));
        }
    }

    Ok(if report.all_passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
