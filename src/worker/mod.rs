//! In-process mining worker.
//!
//! A worker shares nothing with the coordinator but a `CoordinatorHandle`:
//! it receives work over the broadcast channel and answers with complete
//! candidate blocks, which the coordinator re-validates from scratch.

use log::{debug, error, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast::error::RecvError;

use crate::blockchain::pow;
use crate::coordinator::{CoordinatorHandle, Event, WorkDescriptor};
use crate::error::{ChainError, Result};

/// Spacing between the starting nonces of consecutive local workers.
pub const NONCE_STRIDE: u64 = 1 << 40;

pub struct MinerWorker {
    id: String,
    reward_address: Option<String>,
    nonce_offset: u64,
}

struct Job {
    round_id: u64,
    cancel: Arc<AtomicBool>,
}

impl Job {
    fn stop(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }
}

impl MinerWorker {
    pub fn new(id: impl Into<String>, reward_address: Option<String>, nonce_offset: u64) -> Self {
        Self {
            id: id.into(),
            reward_address,
            nonce_offset,
        }
    }

    /// Register, then mine every round until the coordinator goes away.
    pub async fn run(self, handle: CoordinatorHandle) -> Result<()> {
        let mut events = handle.subscribe();
        let mut job: Option<Job> = None;

        if let Some(work) = handle.register_worker(&self.id).await? {
            job = Some(self.start(work, &handle));
        }

        loop {
            match events.recv().await {
                Ok(Event::RoundOpened(work)) => {
                    if job.as_ref().map(|j| j.round_id) == Some(work.round_id) {
                        continue; // already picked up at registration
                    }
                    if let Some(old) = job.take() {
                        old.stop();
                    }
                    job = Some(self.start(work, &handle));
                }
                Ok(Event::RoundCommitted { block, .. }) => {
                    if let Some(old) = job.take() {
                        debug!(
                            "WORKER {} - round {} closed by block #{}",
                            self.id, old.round_id, block.height
                        );
                        old.stop();
                    }
                }
                Ok(Event::TransactionAdmitted(_)) => {}
                Err(RecvError::Lagged(missed)) => {
                    warn!("WORKER {} - missed {} events, resyncing", self.id, missed);
                    if let Some(old) = job.take() {
                        old.stop();
                    }
                    if let Some(work) = handle.current_work().await? {
                        job = Some(self.start(work, &handle));
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }

        if let Some(old) = job {
            old.stop();
        }
        Err(ChainError::CoordinatorUnavailable)
    }

    /// Mine `work` on the blocking pool and submit the result unless cancelled.
    fn start(&self, work: WorkDescriptor, handle: &CoordinatorHandle) -> Job {
        let cancel = Arc::new(AtomicBool::new(false));
        let job = Job {
            round_id: work.round_id,
            cancel: cancel.clone(),
        };
        let id = self.id.clone();
        let offset = self.nonce_offset;
        let candidate = work.candidate(self.reward_address.as_deref());
        let handle = handle.clone();
        debug!(
            "WORKER {} - mining round {} (height {}, {} txs)",
            id,
            work.round_id,
            work.height,
            work.transactions.len()
        );

        tokio::spawn(async move {
            let flag = cancel.clone();
            let difficulty = work.difficulty;
            let searched = tokio::task::spawn_blocking(move || {
                let mut block = candidate;
                let found = pow::mine_from(&mut block, difficulty, offset, &flag);
                (found, block)
            })
            .await;

            let block = match searched {
                Ok((true, block)) if !cancel.load(Ordering::Relaxed) => block,
                Ok(_) => {
                    debug!("WORKER {} - round {} search cancelled", id, work.round_id);
                    return;
                }
                Err(e) => {
                    error!("WORKER {} - search task failed: {}", id, e);
                    return;
                }
            };

            match handle.submit_block(&id, work.round_id, block).await {
                Ok(b) => info!(
                    "WORKER {} - won round {} with block #{} (nonce={})",
                    id, work.round_id, b.height, b.nonce
                ),
                Err(ChainError::StaleSubmission(round)) => {
                    debug!("WORKER {} - round {} already closed", id, round)
                }
                Err(e) => warn!("WORKER {} - submission rejected: {}", id, e),
            }
        });

        job
    }
}
