use chrono::Utc;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

use super::messages::{CoordinatorStatus, Event, RoundPhase, WorkDescriptor};
use crate::blockchain::{Block, Blockchain};
use crate::error::{ChainError, Result};
use crate::mempool::Mempool;
use crate::transaction::Transaction;

#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    /// Coinbase recipient written into work descriptors.
    pub reward_address: String,
    pub round_timeout: Duration,
    pub block_interval: Duration,
    pub start_delay: Duration,
    pub max_txs_per_block: usize,
    pub storage_retries: u32,
}

enum Round {
    Idle { next_open: Instant },
    Open { work: WorkDescriptor, deadline: Instant },
    Committing { block: Block, next_open: Instant },
}

#[derive(Debug, Clone, Default)]
struct WorkerInfo {
    registered_at: i64,
    submissions: u64,
    accepted: u64,
}

/// Owner of the ledger, the mempool and the round state machine.
///
/// Every method takes `&mut self`; the actor in `actor.rs` is the only
/// caller in production, which makes each call a critical section.
pub struct Coordinator {
    ledger: Blockchain,
    mempool: Mempool,
    settings: CoordinatorSettings,
    round: Round,
    next_round_id: u64,
    timeouts: u64,
    workers: HashMap<String, WorkerInfo>,
    events: broadcast::Sender<Event>,
}

impl Coordinator {
    pub fn new(
        ledger: Blockchain,
        settings: CoordinatorSettings,
        events: broadcast::Sender<Event>,
        now: Instant,
    ) -> Self {
        let next_open = now + settings.start_delay;
        Self {
            ledger,
            mempool: Mempool::new(),
            settings,
            round: Round::Idle { next_open },
            next_round_id: 1,
            timeouts: 0,
            workers: HashMap::new(),
            events,
        }
    }

    pub fn ledger(&self) -> &Blockchain {
        &self.ledger
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    pub fn phase(&self) -> RoundPhase {
        match self.round {
            Round::Idle { .. } => RoundPhase::Idle,
            Round::Open { .. } => RoundPhase::RoundOpen,
            Round::Committing { .. } => RoundPhase::Committing,
        }
    }

    pub fn current_work(&self) -> Option<WorkDescriptor> {
        match &self.round {
            Round::Open { work, .. } => Some(work.clone()),
            _ => None,
        }
    }

    /// When the actor should next call `on_timer`.
    pub fn next_wakeup(&self) -> Option<Instant> {
        match &self.round {
            Round::Idle { next_open } => Some(*next_open),
            Round::Open { deadline, .. } => Some(*deadline),
            Round::Committing { .. } => None,
        }
    }

    /// Open the next round if its timer is due; restart an expired round.
    pub fn on_timer(&mut self, now: Instant) {
        match &self.round {
            Round::Idle { next_open } if *next_open <= now => {
                self.open_round(now);
            }
            Round::Open { work, deadline } if *deadline <= now => {
                warn!(
                    "ROUND #{} timed out with no valid submission, restarting",
                    work.round_id
                );
                self.timeouts += 1;
                self.open_round(now);
            }
            _ => {}
        }
    }

    /// Snapshot the mempool, mint the coinbase and broadcast fresh work.
    pub fn open_round(&mut self, now: Instant) -> WorkDescriptor {
        let selected = self
            .mempool
            .select_for_block(Some(self.settings.max_txs_per_block), &self.ledger);
        let candidate = self.ledger.candidate(
            &self.settings.reward_address,
            selected,
            Utc::now().timestamp_millis(),
        );

        let round_id = self.next_round_id;
        self.next_round_id += 1;
        let work = WorkDescriptor {
            round_id,
            height: candidate.height,
            previous_hash: candidate.previous_hash,
            difficulty: self.ledger.difficulty(),
            timestamp: candidate.timestamp,
            transactions: candidate.transactions,
        };
        info!(
            "ROUND #{} open: height={} txs={} diff={} workers={}",
            round_id,
            work.height,
            work.transactions.len(),
            work.difficulty,
            self.workers.len()
        );

        self.round = Round::Open {
            work: work.clone(),
            deadline: now + self.settings.round_timeout,
        };
        self.broadcast(Event::RoundOpened(work.clone()));
        work
    }

    /// Transaction intake.
    pub fn admit_transaction(&mut self, tx: Transaction) -> Result<()> {
        self.mempool.admit(tx.clone(), &self.ledger)?;
        info!("TX {} admitted (mempool size {})", tx.id, self.mempool.len());
        self.broadcast(Event::TransactionAdmitted(tx));
        Ok(())
    }

    /// Register (or re-register) a worker; returns the open round's work, if any.
    pub fn register_worker(&mut self, worker_id: &str) -> Option<WorkDescriptor> {
        match self.workers.get(worker_id) {
            Some(w) => debug!(
                "worker {} re-registered (since {}, {} submissions)",
                worker_id, w.registered_at, w.submissions
            ),
            None => {
                info!("worker {} registered", worker_id);
                self.workers.insert(
                    worker_id.to_string(),
                    WorkerInfo {
                        registered_at: Utc::now().timestamp_millis(),
                        ..WorkerInfo::default()
                    },
                );
            }
        }
        self.current_work()
    }

    /// Handle a worker's candidate block for `round_id`.
    ///
    /// The first submission that passes ledger validation wins the round;
    /// everything arriving afterwards is stale. Rejections leave ledger and
    /// mempool untouched. A win leaves the round in `Committing` until
    /// `finish_commit` runs.
    pub fn submit(
        &mut self,
        worker_id: &str,
        round_id: u64,
        block: Block,
        now: Instant,
    ) -> Result<Block> {
        let Some(worker) = self.workers.get_mut(worker_id) else {
            return Err(ChainError::UnknownWorker(worker_id.to_string()));
        };
        worker.submissions += 1;

        let open_round = match &self.round {
            Round::Open { work, .. } => Some(work.round_id),
            _ => None,
        };
        if open_round != Some(round_id) {
            debug!(
                "stale submission from {} for round {} (open: {:?})",
                worker_id, round_id, open_round
            );
            return Err(ChainError::StaleSubmission(round_id));
        }

        let committed = match self.append_with_retry(block) {
            Ok(b) => b,
            Err(e) if e.is_fatal() => {
                error!(
                    "ROUND #{} aborted: block from {} validated but could not be stored: {}",
                    round_id, worker_id, e
                );
                self.open_round(now);
                return Err(e);
            }
            Err(e) => {
                warn!("ROUND #{} rejected block from {}: {}", round_id, worker_id, e);
                return Err(e);
            }
        };

        let wins = match self.workers.get_mut(worker_id) {
            Some(w) => {
                w.accepted += 1;
                w.accepted
            }
            None => 0,
        };
        self.mempool.reconcile(&committed.transactions);
        info!(
            "ROUND #{} won by {} (win #{}): block #{} hash={} nonce={}",
            round_id, worker_id, wins, committed.height, committed.hash, committed.nonce
        );
        self.round = Round::Committing {
            block: committed.clone(),
            next_open: now + self.settings.block_interval,
        };
        Ok(committed)
    }

    /// Leave `Committing`: announce the new tip with the remaining pending
    /// set, then idle until the inter-block interval has passed.
    pub fn finish_commit(&mut self) {
        let Round::Committing { block, next_open } = &self.round else {
            return;
        };
        let (block, next_open) = (block.clone(), *next_open);
        self.broadcast(Event::RoundCommitted {
            block,
            pending: self.mempool.pending(),
        });
        self.round = Round::Idle { next_open };
    }

    fn append_with_retry(&mut self, block: Block) -> Result<Block> {
        let mut attempt = 0;
        loop {
            match self.ledger.append(block.clone()) {
                Ok(committed) => return Ok(committed.clone()),
                Err(e) if e.is_fatal() && attempt < self.settings.storage_retries => {
                    attempt += 1;
                    error!(
                        "persisting block #{} failed (attempt {}): {}",
                        block.height, attempt, e
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub fn status(&self) -> CoordinatorStatus {
        let round_id = match &self.round {
            Round::Open { work, .. } => Some(work.round_id),
            _ => None,
        };
        CoordinatorStatus {
            phase: self.phase(),
            round_id,
            height: self.ledger.tip().height,
            chain_length: self.ledger.len(),
            difficulty: self.ledger.difficulty(),
            block_reward: self.ledger.block_reward(),
            mempool_size: self.mempool.len(),
            workers: self.workers.len(),
            rounds_opened: self.next_round_id - 1,
            rounds_timed_out: self.timeouts,
        }
    }

    #[cfg(test)]
    pub fn worker_stats(&self, worker_id: &str) -> Option<(i64, u64, u64)> {
        self.workers
            .get(worker_id)
            .map(|w| (w.registered_at, w.submissions, w.accepted))
    }

    fn broadcast(&self, event: Event) {
        if self.events.send(event).is_err() {
            debug!("no listeners for coordinator event");
        }
    }
}
