//! Campaign runner for deterministic simulation campaigns.
//!
//! Executes many seeds with one parameter set, collecting pass/fail results
//! and identifying the first failing seed for replay.

use std::ops::Range;

use anyhow::{Result, bail};
use lanes_core::workflow::CascadePolicy;
use serde::{Deserialize, Serialize};

use crate::oracle::InvariantViolation;
use crate::queue::FaultConfig;
use crate::{SimulationConfig, SimulationResult, Simulator};

/// Campaign-level configuration: which seeds to run and with what
/// parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignConfig {
    /// Range of seeds to execute, e.g., `0..100`.
    pub seed_range: Range<u64>,
    pub epics: usize,
    pub max_children: usize,
    pub rounds: u64,
    pub moves_per_round: usize,
    pub auto_complete: bool,
    pub pull_forward: bool,
    /// Maximum response delay in rounds.
    pub fault_max_delay: u8,
    /// Chance that a delivered batch is shuffled (percent, 0–100).
    pub fault_reorder_percent: u8,
    /// Chance that a status write fails (percent, 0–100).
    pub fault_failure_percent: u8,
    /// Chance of a full reload from the store per round (percent, 0–100).
    pub fault_refresh_percent: u8,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        let sim = SimulationConfig::default();
        Self {
            seed_range: 0..100,
            epics: sim.epics,
            max_children: sim.max_children,
            rounds: sim.rounds,
            moves_per_round: sim.moves_per_round,
            auto_complete: sim.policy.auto_complete,
            pull_forward: sim.policy.pull_forward,
            fault_max_delay: sim.fault.max_delay_rounds,
            fault_reorder_percent: sim.fault.reorder_rate_percent,
            fault_failure_percent: sim.fault.failure_rate_percent,
            fault_refresh_percent: sim.fault.refresh_rate_percent,
        }
    }
}

impl CampaignConfig {
    /// Build a [`SimulationConfig`] for a specific seed.
    #[must_use]
    pub const fn sim_config_for_seed(&self, seed: u64) -> SimulationConfig {
        SimulationConfig {
            seed,
            epics: self.epics,
            max_children: self.max_children,
            rounds: self.rounds,
            moves_per_round: self.moves_per_round,
            policy: CascadePolicy {
                auto_complete: self.auto_complete,
                pull_forward: self.pull_forward,
            },
            fault: FaultConfig {
                max_delay_rounds: self.fault_max_delay,
                reorder_rate_percent: self.fault_reorder_percent,
                failure_rate_percent: self.fault_failure_percent,
                refresh_rate_percent: self.fault_refresh_percent,
            },
        }
    }

    /// Validate configuration before running.
    ///
    /// # Errors
    ///
    /// Returns an error if any parameter is out of valid range.
    pub fn validate(&self) -> Result<()> {
        if self.seed_range.is_empty() {
            bail!("seed_range must not be empty");
        }
        self.sim_config_for_seed(self.seed_range.start).validate()
    }
}

/// Failure details for a single seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedFailure {
    pub seed: u64,
    pub violations: Vec<String>,
}

/// Aggregate report produced by a campaign run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignReport {
    pub seeds_run: usize,
    pub seeds_passed: usize,
    /// First seed that failed (for prioritized replay).
    pub first_failure: Option<u64>,
    pub failures: Vec<SeedFailure>,
    /// Seeds that hit stale confirmations, reordering or reverts.
    pub interesting_states_reached: usize,
}

impl CampaignReport {
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Run a full campaign across all seeds in the config.
///
/// # Errors
///
/// Returns an error if config validation fails or a simulation encounters
/// an internal error.
pub fn run_campaign(config: &CampaignConfig) -> Result<CampaignReport> {
    config.validate()?;

    let mut report = CampaignReport {
        seeds_run: 0,
        seeds_passed: 0,
        first_failure: None,
        failures: Vec::new(),
        interesting_states_reached: 0,
    };

    for seed in config.seed_range.clone() {
        report.seeds_run += 1;
        let result = replay_seed(seed, config)?;
        if result.interesting_state_reached {
            report.interesting_states_reached += 1;
        }

        if result.oracle.passed {
            report.seeds_passed += 1;
        } else {
            if report.first_failure.is_none() {
                report.first_failure = Some(seed);
            }
            report.failures.push(SeedFailure {
                seed,
                violations: result.oracle.violations.iter().map(format_violation).collect(),
            });
        }
    }

    tracing::info!(
        seeds = report.seeds_run,
        passed = report.seeds_passed,
        first_failure = ?report.first_failure,
        "campaign finished"
    );
    Ok(report)
}

/// Run a single seed and return `Ok(())` on pass, `Err(violations)` on
/// failure.
///
/// # Errors
///
/// The outer error is an internal simulation error (invalid config, etc).
/// The inner `Result` distinguishes pass from invariant violations.
pub fn run_single_seed(
    seed: u64,
    config: &CampaignConfig,
) -> Result<std::result::Result<(), Vec<InvariantViolation>>> {
    let result = replay_seed(seed, config)?;
    if result.oracle.passed {
        Ok(Ok(()))
    } else {
        Ok(Err(result.oracle.violations))
    }
}

/// Replay a single seed with its full trace for debugging.
///
/// # Errors
///
/// Returns an error when config validation or simulation fails.
pub fn replay_seed(seed: u64, config: &CampaignConfig) -> Result<SimulationResult> {
    let sim_config = config.sim_config_for_seed(seed);
    Simulator::new(sim_config)?.run()
}

fn format_violation(violation: &InvariantViolation) -> String {
    violation.to_string()
}
