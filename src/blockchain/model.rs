use log::{debug, info, warn};
use std::collections::{BTreeMap, HashMap, HashSet};

use super::Block;
use super::block::GENESIS_PREVIOUS_HASH;
use super::pow::meets_difficulty;
use crate::error::{ChainError, Result};
use crate::storage::BlockStore;
use crate::transaction::{COINBASE_SENDER, Transaction};

/// Fixed parameters of a ledger instance.
#[derive(Debug, Clone)]
pub struct LedgerParams {
    pub difficulty: u32,
    pub block_reward: u64,
    pub genesis_address: String,
    pub genesis_supply: u64,
}

/// Append-only chain of validated blocks with Proof-of-Work.
///
/// Balances are kept in an index updated on every commit; `balance_of_scan`
/// recomputes the same figure from scratch.
pub struct Blockchain {
    chain: Vec<Block>,
    difficulty: u32,
    block_reward: u64,
    balances: HashMap<String, i128>,
    committed_ids: HashSet<String>,
    store: Box<dyn BlockStore>,
}

impl Blockchain {
    /// Rebuild the ledger from `store`, or create and persist a genesis
    /// block when the store is empty.
    pub fn open(store: Box<dyn BlockStore>, params: &LedgerParams) -> Result<Self> {
        let mut bc = Self {
            chain: Vec::new(),
            difficulty: params.difficulty,
            block_reward: params.block_reward,
            balances: HashMap::new(),
            committed_ids: HashSet::new(),
            store,
        };

        let stored = bc.store.load_all()?;
        if stored.is_empty() {
            let genesis = Block::genesis(&params.genesis_address, params.genesis_supply);
            bc.store.persist(&genesis)?;
            info!(
                "created genesis block {} ({} -> {})",
                genesis.hash, params.genesis_supply, params.genesis_address
            );
            bc.index_block(&genesis);
            bc.chain.push(genesis);
            return Ok(bc);
        }

        for block in stored {
            bc.index_block(&block);
            bc.chain.push(block);
        }
        if !bc.is_valid_chain() {
            return Err(ChainError::CorruptLedger(format!(
                "stored chain of {} blocks failed the integrity audit",
                bc.chain.len()
            )));
        }
        info!("loaded {} blocks, tip {}", bc.chain.len(), bc.tip().hash);
        Ok(bc)
    }

    /// Return the last block in the chain.
    pub fn tip(&self) -> &Block {
        // open() always leaves at least the genesis block in place
        &self.chain[self.chain.len() - 1]
    }

    pub fn blocks(&self) -> &[Block] {
        &self.chain
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn block_reward(&self) -> u64 {
        self.block_reward
    }

    pub fn contains_transaction(&self, id: &str) -> bool {
        self.committed_ids.contains(id)
    }

    /// Unmined candidate on top of the current tip: coinbase to
    /// `reward_address`, then `txs` in the given order.
    pub fn candidate(&self, reward_address: &str, txs: Vec<Transaction>, timestamp: i64) -> Block {
        let mut transactions = Vec::with_capacity(1 + txs.len());
        transactions.push(Transaction::coinbase(
            reward_address.to_string(),
            self.block_reward,
        ));
        transactions.extend(txs);
        let tip = self.tip();
        Block::new_with_timestamp(tip.height + 1, tip.hash.clone(), transactions, timestamp)
    }

    /// Ledger-derived balance. Senders pay `amount + fee`, recipients
    /// receive `amount`; the coinbase sentinel is not an account.
    pub fn balance_of(&self, address: &str) -> i128 {
        self.balances.get(address).copied().unwrap_or(0)
    }

    /// Reference implementation of `balance_of`: a full scan of every block.
    #[cfg(test)]
    pub fn balance_of_scan(&self, address: &str) -> i128 {
        let mut balance: i128 = 0;
        for block in &self.chain {
            for tx in &block.transactions {
                if !tx.is_coinbase() && tx.sender == address {
                    balance -= tx.total_debit() as i128;
                }
                if tx.recipient == address {
                    balance += tx.amount as i128;
                }
            }
        }
        balance
    }

    /// All known balances, sorted by address.
    pub fn balances(&self) -> BTreeMap<String, i128> {
        self.balances
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    /// Validate `block` against the tip, persist it, then commit it.
    /// Any error leaves the ledger exactly as it was.
    pub fn append(&mut self, block: Block) -> Result<&Block> {
        self.validate_candidate(&block)?;
        self.store.persist(&block)?;
        self.index_block(&block);
        self.chain.push(block);
        let tip = self.tip();
        info!(
            "appended block #{} ({} txs, hash={})",
            tip.height,
            tip.transactions.len(),
            tip.hash
        );
        Ok(tip)
    }

    /// Every check `append` performs, without side effects.
    pub fn validate_candidate(&self, block: &Block) -> Result<()> {
        let tip = self.tip();
        if block.previous_hash != tip.hash {
            return Err(ChainError::ChainLinkageError(format!(
                "previous hash {} does not match tip {}",
                block.previous_hash, tip.hash
            )));
        }
        if block.height != tip.height + 1 {
            return Err(ChainError::ChainLinkageError(format!(
                "height {} does not follow tip height {}",
                block.height, tip.height
            )));
        }

        if block.hash != block.compute_hash() {
            return Err(ChainError::ProofOfWorkError(
                "hash does not match block content".into(),
            ));
        }
        if !meets_difficulty(&block.hash, self.difficulty) {
            return Err(ChainError::ProofOfWorkError(format!(
                "hash does not meet difficulty {}",
                self.difficulty
            )));
        }

        self.validate_transactions(block)
    }

    fn validate_transactions(&self, block: &Block) -> Result<()> {
        let coinbase = block.coinbase().ok_or_else(|| {
            ChainError::InvalidTransaction("first transaction must be a coinbase".into())
        })?;
        if coinbase.amount != self.block_reward || coinbase.fee != 0 {
            return Err(ChainError::InvalidTransaction(format!(
                "coinbase must pay exactly {} with no fee",
                self.block_reward
            )));
        }

        let mut seen: HashSet<&str> = HashSet::new();
        // Running balance changes inside this block, applied in order.
        let mut delta: HashMap<&str, i128> = HashMap::new();

        for (i, tx) in block.transactions.iter().enumerate() {
            if !seen.insert(tx.id.as_str()) || self.committed_ids.contains(&tx.id) {
                return Err(ChainError::InvalidTransaction(format!(
                    "transaction {} is already included",
                    tx.id
                )));
            }
            if i > 0 {
                if tx.is_coinbase() {
                    return Err(ChainError::InvalidTransaction(
                        "only one coinbase per block".into(),
                    ));
                }
                if !tx.is_valid() {
                    return Err(ChainError::InvalidTransaction(format!(
                        "signature check failed for {}",
                        tx.id
                    )));
                }
                if tx.amount == 0 {
                    return Err(ChainError::InvalidTransaction(format!(
                        "transaction {} moves no value",
                        tx.id
                    )));
                }
                let debit = tx.total_debit() as i128;
                let pending = delta.get(tx.sender.as_str()).copied().unwrap_or(0);
                let available = self.balance_of(&tx.sender) + pending;
                if available < debit {
                    return Err(ChainError::InvalidTransaction(format!(
                        "sender of {} cannot cover {} (has {})",
                        tx.id, debit, available
                    )));
                }
                *delta.entry(tx.sender.as_str()).or_insert(0) -= debit;
            }
            *delta.entry(tx.recipient.as_str()).or_insert(0) += tx.amount as i128;
        }
        Ok(())
    }

    fn index_block(&mut self, block: &Block) {
        for tx in &block.transactions {
            if !tx.is_coinbase() && tx.sender != COINBASE_SENDER {
                *self.balances.entry(tx.sender.clone()).or_insert(0) -= tx.total_debit() as i128;
            }
            *self.balances.entry(tx.recipient.clone()).or_insert(0) += tx.amount as i128;
            self.committed_ids.insert(tx.id.clone());
        }
        debug!(
            "indexed block #{} ({} accounts known)",
            block.height,
            self.balances.len()
        );
    }

    /// Full audit: genesis, every hash recomputation, linkage, heights and
    /// transaction signatures. Difficulty is not re-checked here.
    pub fn is_valid_chain(&self) -> bool {
        let Some(genesis) = self.chain.first() else {
            return false;
        };
        if genesis.height != 0
            || genesis.previous_hash != GENESIS_PREVIOUS_HASH
            || genesis.hash != genesis.compute_hash()
            || !genesis.has_valid_transactions()
        {
            warn!("audit: genesis block failed");
            return false;
        }

        for pair in self.chain.windows(2) {
            let (prev, current) = (&pair[0], &pair[1]);
            if current.previous_hash != prev.hash || current.height != prev.height + 1 {
                warn!("audit: linkage broken at #{}", current.height);
                return false;
            }
            if current.hash != current.compute_hash() {
                warn!("audit: hash mismatch at #{}", current.height);
                return false;
            }
            if !current.has_valid_transactions() {
                warn!("audit: invalid transaction in #{}", current.height);
                return false;
            }
        }

        true
    }
}
