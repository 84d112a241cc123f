//! Pending transactions waiting for a block.
//!
//! Admission reserves `amount + fee` against the sender, so the sum of a
//! sender's pending debits never exceeds their ledger balance at admission
//! time.

use log::{debug, warn};
use std::collections::{HashMap, HashSet};

use crate::blockchain::Blockchain;
use crate::error::{ChainError, Result};
use crate::transaction::Transaction;

struct Entry {
    tx: Transaction,
    seq: u64,
}

#[derive(Default)]
pub struct Mempool {
    entries: HashMap<String, Entry>,
    reserved: HashMap<String, u128>,
    next_seq: u64,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Sum of `amount + fee` over the sender's pending transactions.
    pub fn reserved_by(&self, sender: &str) -> u128 {
        self.reserved.get(sender).copied().unwrap_or(0)
    }

    /// Validate `tx` against the ledger and the pending set, then insert it.
    pub fn admit(&mut self, tx: Transaction, ledger: &Blockchain) -> Result<()> {
        if !tx.is_valid() {
            warn!("mempool - rejected {}: invalid signature", tx.id);
            return Err(ChainError::InvalidSignature);
        }
        if tx.is_coinbase() {
            return Err(ChainError::InvalidTransaction(
                "coinbase transactions are minted by the coordinator".into(),
            ));
        }
        if tx.amount == 0 {
            return Err(ChainError::InvalidAmount);
        }
        if self.contains(&tx.id) || ledger.contains_transaction(&tx.id) {
            return Err(ChainError::DuplicateTransaction(tx.id));
        }

        let required = tx.total_debit();
        let balance = ledger.balance_of(&tx.sender);
        let available = balance - self.covered_reservation(&tx.sender, balance);
        if available < required as i128 {
            warn!(
                "mempool - rejected {}: needs {}, sender has {} available",
                tx.id, required, available
            );
            return Err(ChainError::InsufficientBalance {
                required,
                available,
            });
        }

        *self.reserved.entry(tx.sender.clone()).or_insert(0) += required;
        let seq = self.next_seq;
        self.next_seq += 1;
        debug!(
            "mempool - admitted {} (fee={}, size {} -> {})",
            tx.id,
            tx.fee,
            self.entries.len(),
            self.entries.len() + 1
        );
        self.entries.insert(tx.id.clone(), Entry { tx, seq });
        Ok(())
    }

    /// Part of the sender's reservation that `balance` still covers, walking
    /// their entries in selection order. An entry a block already drained
    /// the funds for reserves nothing.
    fn covered_reservation(&self, sender: &str, balance: i128) -> i128 {
        let mut covered: i128 = 0;
        for entry in self.ordered().into_iter().filter(|e| e.tx.sender == sender) {
            let debit = entry.tx.total_debit() as i128;
            if covered + debit <= balance {
                covered += debit;
            }
        }
        covered
    }

    fn ordered(&self) -> Vec<&Entry> {
        let mut entries: Vec<&Entry> = self.entries.values().collect();
        entries.sort_by(|a, b| b.tx.fee.cmp(&a.tx.fee).then_with(|| a.seq.cmp(&b.seq)));
        entries
    }

    /// Every pending transaction, fee descending, ties in insertion order.
    pub fn pending(&self) -> Vec<Transaction> {
        self.ordered().into_iter().map(|e| e.tx.clone()).collect()
    }

    /// Working set for a block: fee ordered, capped at `limit`. Entries the
    /// sender can no longer cover against the current ledger are skipped
    /// and stay pending.
    pub fn select_for_block(&self, limit: Option<usize>, ledger: &Blockchain) -> Vec<Transaction> {
        let cap = limit.unwrap_or(usize::MAX);
        let mut spent: HashMap<String, i128> = HashMap::new();
        let mut picked = Vec::new();

        for tx in self.pending() {
            if picked.len() >= cap {
                break;
            }
            let already = spent.get(&tx.sender).copied().unwrap_or(0);
            let debit = tx.total_debit() as i128;
            if ledger.balance_of(&tx.sender) - already < debit {
                debug!("mempool - skipping {}: sender no longer covers it", tx.id);
                continue;
            }
            *spent.entry(tx.sender.clone()).or_insert(0) += debit;
            picked.push(tx);
        }
        picked
    }

    /// Drop every pending entry whose id appears in `included`.
    pub fn reconcile(&mut self, included: &[Transaction]) {
        if self.is_empty() {
            return;
        }
        let ids: HashSet<&str> = included.iter().map(|t| t.id.as_str()).collect();
        let before = self.entries.len();
        for id in ids {
            let Some(entry) = self.entries.remove(id) else {
                continue;
            };
            let sender = &entry.tx.sender;
            if let Some(r) = self.reserved.get_mut(sender) {
                *r = r.saturating_sub(entry.tx.total_debit());
                if *r == 0 {
                    self.reserved.remove(sender);
                }
            }
        }
        debug!(
            "mempool cleaned: {} -> {} (removed {})",
            before,
            self.entries.len(),
            before - self.entries.len()
        );
    }
}
