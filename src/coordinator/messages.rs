use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::oneshot;

use crate::blockchain::Block;
use crate::error::Result;
use crate::transaction::Transaction;

/// Everything a worker needs to mine the current round. The timestamp is
/// fixed so that every worker starts from the same preimage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkDescriptor {
    pub round_id: u64,
    pub height: u64,
    pub previous_hash: String,
    pub difficulty: u32,
    pub timestamp: i64,
    pub transactions: Vec<Transaction>, // coinbase first
}

impl WorkDescriptor {
    /// Unmined block for this round, optionally paying the coinbase to
    /// `reward_address` instead of the coordinator's default.
    pub fn candidate(&self, reward_address: Option<&str>) -> Block {
        let mut transactions = self.transactions.clone();
        if let (Some(addr), Some(cb)) = (reward_address, transactions.first()) {
            if cb.is_coinbase() {
                transactions[0] = Transaction::coinbase(addr.to_string(), cb.amount);
            }
        }
        Block::new_with_timestamp(
            self.height,
            self.previous_hash.clone(),
            transactions,
            self.timestamp,
        )
    }
}

/// Coordinator → workers/observers.
#[derive(Debug, Clone)]
pub enum Event {
    RoundOpened(WorkDescriptor),
    RoundCommitted {
        block: Block,
        pending: Vec<Transaction>,
    },
    TransactionAdmitted(Transaction),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundPhase {
    Idle,
    RoundOpen,
    Committing,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorStatus {
    pub phase: RoundPhase,
    pub round_id: Option<u64>,
    pub height: u64,
    pub chain_length: usize,
    pub difficulty: u32,
    pub block_reward: u64,
    pub mempool_size: usize,
    pub workers: usize,
    pub rounds_opened: u64,
    pub rounds_timed_out: u64,
}

/// Requests handled by the coordinator task, one at a time.
pub enum Command {
    SubmitTransaction {
        tx: Transaction,
        reply: oneshot::Sender<Result<()>>,
    },
    RegisterWorker {
        worker_id: String,
        reply: oneshot::Sender<Option<WorkDescriptor>>,
    },
    SubmitBlock {
        worker_id: String,
        round_id: u64,
        block: Box<Block>,
        reply: oneshot::Sender<Result<Block>>,
    },
    CurrentWork {
        reply: oneshot::Sender<Option<WorkDescriptor>>,
    },
    Chain {
        reply: oneshot::Sender<Vec<Block>>,
    },
    Pending {
        reply: oneshot::Sender<Vec<Transaction>>,
    },
    Balance {
        address: String,
        reply: oneshot::Sender<i128>,
    },
    Balances {
        reply: oneshot::Sender<BTreeMap<String, i128>>,
    },
    Validate {
        reply: oneshot::Sender<bool>,
    },
    Status {
        reply: oneshot::Sender<CoordinatorStatus>,
    },
}
