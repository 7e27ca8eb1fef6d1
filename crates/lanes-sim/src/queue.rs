//! Delayed, reorderable delivery of write responses.
//!
//! The store applies each write when it is issued; only the response travels
//! through this queue, so the board sees confirmations late and out of order.

use lanes_core::model::{Ticket, TicketId};
use lanes_core::store::StoreError;
use serde::{Deserialize, Serialize};

use crate::rng::DeterministicRng;

/// Fault knobs for one simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultConfig {
    /// Responses wait up to this many rounds before delivery.
    pub max_delay_rounds: u8,
    /// Chance that a round's ready batch is shuffled before delivery.
    pub reorder_rate_percent: u8,
    /// Chance that a status write fails in the store.
    pub failure_rate_percent: u8,
    /// Chance that the board reloads from the store at the end of a round.
    pub refresh_rate_percent: u8,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            max_delay_rounds: 3,
            reorder_rate_percent: 50,
            failure_rate_percent: 0,
            refresh_rate_percent: 10,
        }
    }
}

impl FaultConfig {
    /// No delay, no reordering, no failures.
    #[must_use]
    pub const fn calm() -> Self {
        Self {
            max_delay_rounds: 0,
            reorder_rate_percent: 0,
            failure_rate_percent: 0,
            refresh_rate_percent: 0,
        }
    }
}

/// What the store answered for one write.
#[derive(Debug)]
pub enum WriteResponse {
    Confirmed(Ticket),
    Failed(StoreError),
}

/// A write response waiting to reach the board.
#[derive(Debug)]
pub struct InFlightWrite {
    pub seq: u64,
    pub ticket_id: TicketId,
    pub response: WriteResponse,
}

#[derive(Debug)]
struct Pending {
    deliver_at_round: u64,
    write: InFlightWrite,
}

/// Responses released by [`WriteQueue::deliver_ready`].
#[derive(Debug, Default)]
pub struct DeliverOutcome {
    pub delivered: Vec<InFlightWrite>,
    /// Whether the batch was shuffled out of issue order.
    pub reordered: bool,
}

#[derive(Debug)]
pub struct WriteQueue {
    config: FaultConfig,
    pending: Vec<Pending>,
}

impl WriteQueue {
    #[must_use]
    pub const fn new(config: FaultConfig) -> Self {
        Self {
            config,
            pending: Vec::new(),
        }
    }

    /// Queue a response; returns the delay it was given.
    pub fn enqueue(&mut self, write: InFlightWrite, round: u64, rng: &mut DeterministicRng) -> u8 {
        let delay = if self.config.max_delay_rounds == 0 {
            0
        } else {
            u8::try_from(rng.next_bounded(u64::from(self.config.max_delay_rounds) + 1))
                .unwrap_or(self.config.max_delay_rounds)
        };
        self.pending.push(Pending {
            deliver_at_round: round.saturating_add(u64::from(delay)),
            write,
        });
        delay
    }

    /// Release every response due at or before `round`.
    pub fn deliver_ready(&mut self, round: u64, rng: &mut DeterministicRng) -> DeliverOutcome {
        let (ready, waiting): (Vec<_>, Vec<_>) = self
            .pending
            .drain(..)
            .partition(|p| p.deliver_at_round <= round);
        self.pending = waiting;

        let mut delivered: Vec<InFlightWrite> = ready.into_iter().map(|p| p.write).collect();
        let reordered = delivered.len() > 1 && rng.hit_rate_percent(self.config.reorder_rate_percent);
        if reordered {
            rng.shuffle(&mut delivered);
        }
        DeliverOutcome {
            delivered,
            reordered,
        }
    }

    /// Release everything still queued, shuffled under the same reorder odds.
    pub fn drain(&mut self, rng: &mut DeterministicRng) -> DeliverOutcome {
        self.deliver_ready(u64::MAX, rng)
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lanes_core::model::{IssueType, TicketDraft};

    fn write(seq: u64) -> InFlightWrite {
        let draft = TicketDraft::new("SIM", format!("SIM-{seq}"), "t", IssueType::Task);
        let id = TicketId::new(format!("tk-{seq}"));
        InFlightWrite {
            seq,
            ticket_id: id.clone(),
            response: WriteResponse::Confirmed(lanes_core::Ticket::from_draft(id, &draft, 0)),
        }
    }

    #[test]
    fn calm_queue_delivers_in_issue_order() {
        let mut queue = WriteQueue::new(FaultConfig::calm());
        let mut rng = DeterministicRng::new(1);
        for seq in 1..=4 {
            assert_eq!(queue.enqueue(write(seq), 0, &mut rng), 0);
        }
        let outcome = queue.deliver_ready(0, &mut rng);
        assert!(!outcome.reordered);
        let seqs: Vec<u64> = outcome.delivered.iter().map(|w| w.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4]);
        assert_eq!(queue.pending_len(), 0);
    }

    #[test]
    fn delayed_responses_wait_for_their_round() {
        let config = FaultConfig {
            max_delay_rounds: 5,
            reorder_rate_percent: 0,
            ..FaultConfig::calm()
        };
        let mut queue = WriteQueue::new(config);
        let mut rng = DeterministicRng::new(42);
        let delays: Vec<u8> = (1..=20).map(|seq| queue.enqueue(write(seq), 10, &mut rng)).collect();
        assert!(delays.iter().all(|d| *d <= 5));

        let mut seen = 0;
        for round in 10..=15 {
            let outcome = queue.deliver_ready(round, &mut rng);
            seen += outcome.delivered.len();
        }
        assert_eq!(seen, 20);
        assert_eq!(queue.pending_len(), 0);
    }

    #[test]
    fn full_reorder_rate_shuffles_batches() {
        let config = FaultConfig {
            reorder_rate_percent: 100,
            ..FaultConfig::calm()
        };
        let mut queue = WriteQueue::new(config);
        let mut rng = DeterministicRng::new(3);
        for seq in 1..=8 {
            queue.enqueue(write(seq), 0, &mut rng);
        }
        let outcome = queue.drain(&mut rng);
        assert!(outcome.reordered);
        let mut seqs: Vec<u64> = outcome.delivered.iter().map(|w| w.seq).collect();
        seqs.sort_unstable();
        assert_eq!(seqs, (1..=8).collect::<Vec<_>>());
    }

    #[test]
    fn single_response_is_never_reordered() {
        let config = FaultConfig {
            reorder_rate_percent: 100,
            ..FaultConfig::calm()
        };
        let mut queue = WriteQueue::new(config);
        let mut rng = DeterministicRng::new(3);
        queue.enqueue(write(1), 0, &mut rng);
        assert!(!queue.drain(&mut rng).reordered);
    }
}
