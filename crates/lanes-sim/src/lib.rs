//! lanes-sim library.
//!
//! Seed-driven simulation of the optimistic board against a [`MemoryStore`]
//! whose write responses arrive late, out of order, or as failures.
//!
//! # Conventions
//!
//! - **Errors**: Use `anyhow::Result` for return types.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `debug!`, `trace!`).

pub mod campaign;
pub mod oracle;
pub mod queue;
pub mod rng;

use std::sync::Arc;
use std::sync::mpsc::Receiver;

use anyhow::{Context, Result, bail};
use lanes_core::board::{ConfirmOutcome, MoveResult, PlannedEffect};
use lanes_core::bus::{BoardEvent, EventBus};
use lanes_core::model::{IssueType, Status, TicketDraft, TicketId};
use lanes_core::store::{MemoryStore, TicketStore};
use lanes_core::workflow::CascadePolicy;
use lanes_core::Board;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::oracle::{BoardOracle, OracleResult};
use crate::queue::{FaultConfig, InFlightWrite, WriteQueue, WriteResponse};
use crate::rng::DeterministicRng;

/// Project every simulated ticket belongs to.
pub const PROJECT: &str = "SIM";

// ── Configuration ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub seed: u64,
    /// Number of top-level epics.
    pub epics: usize,
    /// Upper bound on children per ticket at each level.
    pub max_children: usize,
    pub rounds: u64,
    /// Random moves attempted per round.
    pub moves_per_round: usize,
    pub policy: CascadePolicy,
    pub fault: FaultConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            epics: 2,
            max_children: 3,
            rounds: 20,
            moves_per_round: 3,
            policy: CascadePolicy::default(),
            fault: FaultConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// # Errors
    ///
    /// Returns an error if any parameter is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.epics == 0 {
            bail!("epics must be > 0");
        }
        if self.max_children == 0 {
            bail!("max_children must be > 0");
        }
        if self.rounds == 0 {
            bail!("rounds must be > 0");
        }
        for (name, percent) in [
            ("reorder_rate_percent", self.fault.reorder_rate_percent),
            ("failure_rate_percent", self.fault.failure_rate_percent),
            ("refresh_rate_percent", self.fault.refresh_rate_percent),
        ] {
            if percent > 100 {
                bail!("{name} must be <= 100, got {percent}");
            }
        }
        Ok(())
    }

    /// Whether the run is expected to converge and keep the hierarchy rule.
    #[must_use]
    pub const fn is_failure_free(&self) -> bool {
        self.fault.failure_rate_percent == 0
    }
}

// ── Trace ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEvent {
    pub round: u64,
    pub kind: TraceEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TraceEventKind {
    Move {
        ticket_id: TicketId,
        to: Status,
        effects: usize,
    },
    Denied {
        ticket_id: TicketId,
        to: Status,
        reason: String,
    },
    Confirm {
        seq: u64,
        ticket_id: TicketId,
        outcome: ConfirmOutcome,
    },
    Fail {
        seq: u64,
        ticket_id: TicketId,
        reverted: bool,
    },
    Refresh {
        tickets: usize,
    },
}

/// Counters collected over one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationStats {
    pub tickets: usize,
    pub moves_applied: usize,
    pub moves_denied: usize,
    pub noop_moves: usize,
    pub cascaded_effects: usize,
    pub parent_updates: usize,
    pub writes_issued: usize,
    pub confirmed: usize,
    pub stale: usize,
    pub ignored: usize,
    pub failed: usize,
    pub reverted: usize,
    pub reordered_batches: usize,
    pub refreshes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulationResult {
    pub seed: u64,
    pub trace: Vec<TraceEvent>,
    pub stats: SimulationStats,
    /// Stale confirmations, reordered batches or reverted failures occurred.
    pub interesting_state_reached: bool,
    /// Checks run during and after the run.
    pub oracle: OracleResult,
    /// Final board status per ticket, in key order.
    pub final_statuses: Vec<(String, Status)>,
}

// ── Hierarchy generation ──────────────────────────────────────────────────────

struct Node {
    issue_type: IssueType,
    parent: Option<usize>,
    status: Status,
}

const LEVELS: [IssueType; 4] = [
    IssueType::Epic,
    IssueType::Feature,
    IssueType::Story,
    IssueType::Task,
];

/// Random epic→feature→story→task forest that satisfies the hierarchy rule.
///
/// Nodes are returned parents-first.
fn generate_hierarchy(config: &SimulationConfig, rng: &mut DeterministicRng) -> Vec<Node> {
    let mut nodes = Vec::new();
    let mut frontier: Vec<usize> = Vec::new();
    for _ in 0..config.epics {
        frontier.push(nodes.len());
        nodes.push(Node {
            issue_type: LEVELS[0],
            parent: None,
            status: Status::Backlog,
        });
    }

    for (depth, issue_type) in LEVELS.iter().enumerate().skip(1) {
        let mut next = Vec::new();
        for &parent in &frontier {
            // Tasks are optional so some stories end up as leaves.
            let min = usize::from(depth < LEVELS.len() - 1);
            let count = min + rng.next_index(config.max_children + 1 - min);
            for _ in 0..count {
                next.push(nodes.len());
                nodes.push(Node {
                    issue_type: *issue_type,
                    parent: Some(parent),
                    status: Status::Backlog,
                });
            }
        }
        frontier = next;
    }

    // Children always follow their parent, so a reverse sweep settles every
    // child before its parent.
    let mut slowest_child: Vec<Option<Status>> = vec![None; nodes.len()];
    for i in (0..nodes.len()).rev() {
        let status = match slowest_child[i] {
            None => rng.status(),
            Some(ceiling) => {
                Status::from_index(rng.next_index(ceiling.index() + 1)).unwrap_or(Status::Backlog)
            }
        };
        nodes[i].status = status;
        if let Some(parent) = nodes[i].parent {
            let slot = &mut slowest_child[parent];
            *slot = Some(match *slot {
                Some(current) if current.index() <= status.index() => current,
                _ => status,
            });
        }
    }
    nodes
}

fn seed_store(store: &MemoryStore, nodes: &[Node]) -> Result<()> {
    let mut ids: Vec<TicketId> = Vec::with_capacity(nodes.len());
    for (i, node) in nodes.iter().enumerate() {
        let key = format!("{PROJECT}-{}", i + 1);
        let summary = format!("{} {}", node.issue_type, i + 1);
        let mut draft =
            TicketDraft::new(PROJECT, key.as_str(), summary, node.issue_type).with_status(node.status);
        draft.parent_id = node.parent.and_then(|p| ids.get(p).cloned());
        let ticket = store
            .create_ticket(&draft)
            .with_context(|| format!("failed to seed {key}"))?;
        ids.push(ticket.id);
    }
    Ok(())
}

// ── Simulator ─────────────────────────────────────────────────────────────────

/// One seeded run: a board, its store, and the queue between them.
pub struct Simulator {
    config: SimulationConfig,
    rng: DeterministicRng,
    store: MemoryStore,
    board: Board,
    queue: WriteQueue,
    events: Receiver<BoardEvent>,
    trace: Vec<TraceEvent>,
    stats: SimulationStats,
    oracle: OracleResult,
}

impl Simulator {
    /// Generate the hierarchy for `config.seed` and load the board.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or seeding the store fails.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let mut rng = DeterministicRng::new(config.seed);

        let store = MemoryStore::new();
        let nodes = generate_hierarchy(&config, &mut rng);
        seed_store(&store, &nodes)?;

        let bus = Arc::new(EventBus::new());
        let (_, events) = bus.subscribe_channel();
        let tickets = store.list_tickets(PROJECT).context("failed to list seeded tickets")?;
        let board = Board::load(PROJECT, tickets, config.policy, bus);
        debug!(seed = config.seed, tickets = board.len(), "simulation seeded");

        let stats = SimulationStats {
            tickets: board.len(),
            ..SimulationStats::default()
        };
        Ok(Self {
            config,
            rng,
            store,
            board,
            queue: WriteQueue::new(config.fault),
            events,
            trace: Vec::new(),
            stats,
            oracle: OracleResult::pass(),
        })
    }

    #[must_use]
    pub const fn board(&self) -> &Board {
        &self.board
    }

    #[must_use]
    pub const fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Drive every round, drain the queue, and run the final checks.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be listed for a refresh.
    pub fn run(mut self) -> Result<SimulationResult> {
        for round in 0..self.config.rounds {
            self.step(round)?;
        }

        let outcome = self.queue.drain(&mut self.rng);
        if outcome.reordered {
            self.stats.reordered_batches += 1;
        }
        for write in outcome.delivered {
            self.settle(write, self.config.rounds);
        }

        self.stats.parent_updates = self
            .events
            .try_iter()
            .filter(|event| matches!(event, BoardEvent::ParentUpdated { .. }))
            .count();

        let stored = self.store.snapshot();
        let final_check =
            BoardOracle::check_all(&self.board, &stored, self.config.is_failure_free());
        let oracle = self.oracle.merge(final_check);

        let mut final_statuses: Vec<(String, Status)> = self
            .board
            .tickets()
            .map(|t| (t.key.clone(), t.status))
            .collect();
        final_statuses.sort_by(|a, b| a.0.cmp(&b.0));

        let stats = self.stats;
        info!(
            seed = self.config.seed,
            passed = oracle.passed,
            moves = stats.moves_applied,
            stale = stats.stale,
            reverted = stats.reverted,
            "simulation finished"
        );
        Ok(SimulationResult {
            seed: self.config.seed,
            trace: self.trace,
            stats,
            interesting_state_reached: stats.stale > 0
                || stats.reordered_batches > 0
                || stats.reverted > 0,
            oracle,
            final_statuses,
        })
    }

    fn step(&mut self, round: u64) -> Result<()> {
        for _ in 0..self.config.moves_per_round {
            let ids: Vec<TicketId> = self.board.tickets().map(|t| t.id.clone()).collect();
            let Some(id) = self.rng.pick(&ids).cloned() else {
                break;
            };
            let target = self.rng.status();
            self.attempt_move(&id, target, round);
        }

        if self.rng.hit_rate_percent(self.config.fault.refresh_rate_percent) {
            let tickets = self.store.list_tickets(PROJECT).context("refresh failed")?;
            self.record(round, TraceEventKind::Refresh {
                tickets: tickets.len(),
            });
            self.board.refresh(tickets);
            self.stats.refreshes += 1;
        }

        let outcome = self.queue.deliver_ready(round, &mut self.rng);
        if outcome.reordered {
            self.stats.reordered_batches += 1;
        }
        for write in outcome.delivered {
            self.settle(write, round);
        }

        self.check(BoardOracle::check_columns(&self.board));
        Ok(())
    }

    fn attempt_move(&mut self, id: &TicketId, target: Status, round: u64) {
        match self.board.apply_move(id, target) {
            MoveResult::Denied(denial) => {
                self.stats.moves_denied += 1;
                self.record(round, TraceEventKind::Denied {
                    ticket_id: id.clone(),
                    to: target,
                    reason: denial.reason.as_str().to_string(),
                });
            }
            MoveResult::Applied(plan) if plan.is_noop() => {
                self.stats.noop_moves += 1;
            }
            MoveResult::Applied(plan) => {
                self.stats.moves_applied += 1;
                self.stats.cascaded_effects += plan.cascaded().count();
                self.record(round, TraceEventKind::Move {
                    ticket_id: id.clone(),
                    to: target,
                    effects: plan.len(),
                });
                for planned in plan.effects {
                    self.issue(planned, round);
                }
                if self.config.is_failure_free() {
                    self.check(BoardOracle::check_hierarchy(&self.board));
                }
            }
        }
    }

    /// Persist one effect now and queue the store's answer.
    fn issue(&mut self, planned: PlannedEffect, round: u64) {
        let PlannedEffect { seq, effect } = planned;
        let inject = self.rng.hit_rate_percent(self.config.fault.failure_rate_percent);
        if inject {
            self.store.fail_status_updates_for(&effect.ticket_id);
        }
        let response = match self.store.update_ticket_status(&effect.ticket_id, effect.to) {
            Ok(ticket) => WriteResponse::Confirmed(ticket),
            Err(err) => WriteResponse::Failed(err),
        };
        if inject {
            self.store.clear_failures();
        }

        self.stats.writes_issued += 1;
        let delay = self.queue.enqueue(
            InFlightWrite {
                seq,
                ticket_id: effect.ticket_id,
                response,
            },
            round,
            &mut self.rng,
        );
        trace!(seq, delay, "write queued");
    }

    fn settle(&mut self, write: InFlightWrite, round: u64) {
        let InFlightWrite {
            seq,
            ticket_id,
            response,
        } = write;
        match response {
            WriteResponse::Confirmed(ticket) => {
                let outcome = self.board.confirm(seq, ticket);
                match outcome {
                    ConfirmOutcome::Applied => self.stats.confirmed += 1,
                    ConfirmOutcome::Stale => self.stats.stale += 1,
                    ConfirmOutcome::Ignored => self.stats.ignored += 1,
                }
                self.record(round, TraceEventKind::Confirm {
                    seq,
                    ticket_id,
                    outcome,
                });
            }
            WriteResponse::Failed(err) => {
                if let Some(failure) = self.board.fail(seq, &err) {
                    self.stats.failed += 1;
                    if failure.reverted {
                        self.stats.reverted += 1;
                    }
                    self.record(round, TraceEventKind::Fail {
                        seq,
                        ticket_id,
                        reverted: failure.reverted,
                    });
                }
            }
        }
    }

    /// Keep the first failing mid-run check; later ones usually repeat it.
    fn check(&mut self, result: OracleResult) {
        if self.oracle.passed && !result.passed {
            self.oracle = result;
        }
    }

    fn record(&mut self, round: u64, kind: TraceEventKind) {
        self.trace.push(TraceEvent { round, kind });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calm(seed: u64) -> SimulationConfig {
        SimulationConfig {
            seed,
            fault: FaultConfig::calm(),
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn generated_hierarchy_respects_the_rule() {
        for seed in 0..20 {
            let sim = Simulator::new(calm(seed)).unwrap();
            assert!(sim.board().violations().is_empty(), "seed {seed}");
            assert!(!sim.board().health().degraded);
            assert_eq!(sim.board().len(), sim.store().len());
        }
    }

    #[test]
    fn hierarchy_has_epics_features_and_stories() {
        let config = SimulationConfig {
            max_children: 2,
            ..calm(1)
        };
        let sim = Simulator::new(config).unwrap();
        let types: Vec<IssueType> = sim.board().tickets().map(|t| t.issue_type).collect();
        assert!(types.contains(&IssueType::Epic));
        assert!(types.contains(&IssueType::Feature));
        assert!(types.contains(&IssueType::Story));
    }

    #[test]
    fn calm_run_settles_and_converges() {
        let result = Simulator::new(calm(3)).unwrap().run().unwrap();
        assert!(result.oracle.passed, "{:?}", result.oracle.violations);
        assert_eq!(result.stats.failed, 0);
        assert_eq!(result.stats.reordered_batches, 0);
        assert_eq!(
            result.stats.writes_issued,
            result.stats.confirmed + result.stats.stale + result.stats.ignored
        );
    }

    #[test]
    fn same_seed_same_trace() {
        let config = SimulationConfig {
            seed: 9,
            fault: FaultConfig {
                failure_rate_percent: 20,
                ..FaultConfig::default()
            },
            ..SimulationConfig::default()
        };
        let a = Simulator::new(config).unwrap().run().unwrap();
        let b = Simulator::new(config).unwrap().run().unwrap();
        assert_eq!(a.trace, b.trace);
        assert_eq!(a.final_statuses, b.final_statuses);
        assert_eq!(a.stats, b.stats);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = SimulationConfig {
            epics: 0,
            ..SimulationConfig::default()
        };
        assert!(Simulator::new(config).is_err());

        let config = SimulationConfig {
            fault: FaultConfig {
                failure_rate_percent: 150,
                ..FaultConfig::default()
            },
            ..SimulationConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn trace_event_serializes_with_kind_tag() {
        let event = TraceEvent {
            round: 2,
            kind: TraceEventKind::Fail {
                seq: 7,
                ticket_id: TicketId::from("tk-1"),
                reverted: true,
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"]["kind"], "fail");
        assert_eq!(json["kind"]["reverted"], true);
    }
}
