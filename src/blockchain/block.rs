use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::pow::meets_difficulty;
use crate::transaction::Transaction;

/// Previous-hash sentinel carried by the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// A single block in the blockchain holding a list of transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub height: u64,
    pub timestamp: i64, // Unix timestamp in milliseconds (UTC)
    pub previous_hash: String,
    pub nonce: u64,   // Proof-of-Work nonce
    pub hash: String, // Cached hash of the block
    pub transactions: Vec<Transaction>, // coinbase first
}

impl Block {
    /// Create the genesis block: one coinbase of `supply` to `address`, never mined.
    pub fn genesis(address: &str, supply: u64) -> Self {
        Self::new(
            0,
            GENESIS_PREVIOUS_HASH.to_string(),
            vec![Transaction::coinbase(address.to_string(), supply)],
        )
    }

    /// Create a new block (not mined yet). Run the PoW engine on it before submitting.
    pub fn new(height: u64, previous_hash: String, transactions: Vec<Transaction>) -> Self {
        Self::new_with_timestamp(
            height,
            previous_hash,
            transactions,
            Utc::now().timestamp_millis(),
        )
    }

    /// Same as `new` but with a fixed timestamp, so every worker hashing a
    /// round's work starts from the same preimage.
    pub fn new_with_timestamp(
        height: u64,
        previous_hash: String,
        transactions: Vec<Transaction>,
        timestamp: i64,
    ) -> Self {
        let mut block = Self {
            height,
            timestamp,
            previous_hash,
            nonce: 0,
            hash: String::new(),
            transactions,
        };
        block.hash = block.compute_hash();
        block
    }

    /// Compute the SHA-256 hash of this block using its fields
    /// (excluding the `hash` field itself). Every transaction contributes
    /// its full content, signature included.
    pub fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        let header = format!(
            "{}:{}:{}:{}:",
            self.height, self.timestamp, self.previous_hash, self.nonce
        );
        hasher.update(header.as_bytes());
        for tx in &self.transactions {
            hasher.update(tx.content_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// Validate that the block's cached `hash` matches its content and
    /// satisfies the PoW difficulty. (Does NOT validate chain linkage.)
    pub fn is_valid(&self, difficulty: u32) -> bool {
        self.hash == self.compute_hash() && meets_difficulty(&self.hash, difficulty)
    }

    /// Every transaction passes its own signature check.
    pub fn has_valid_transactions(&self) -> bool {
        self.transactions.iter().all(Transaction::is_valid)
    }

    pub fn coinbase(&self) -> Option<&Transaction> {
        self.transactions.first().filter(|tx| tx.is_coinbase())
    }
}

#[cfg(test)]
mod tests {
    use super::Block;
    use crate::blockchain::pow;
    use crate::transaction::Transaction;
    use crate::wallet::generate_keypair_hex;

    fn signed_tx() -> Transaction {
        let (sk, pk, _) = generate_keypair_hex();
        let mut tx = Transaction::new(pk, "addr".into(), 1, 0);
        tx.sign(&sk).unwrap();
        tx
    }

    #[test]
    fn genesis_has_valid_hash() {
        let b = Block::genesis("alice", 100);
        assert_eq!(b.hash, b.compute_hash());
        assert_eq!(b.height, 0);
        assert_eq!(b.previous_hash, "0");
        assert_eq!(b.coinbase().map(|cb| cb.amount), Some(100));
    }

    #[test]
    fn mining_produces_leading_zeros() {
        let mut b = Block::new(1, "prev".into(), vec![signed_tx()]);
        pow::mine(&mut b, 2);
        assert!(b.hash.starts_with("00"));
        assert!(b.is_valid(2));
    }

    #[test]
    fn invalid_when_mutated() {
        let mut b = Block::new(2, "prev".into(), vec![signed_tx()]);
        pow::mine(&mut b, 2);
        let old_hash = b.hash.clone();

        // Mutate: add a new tx (tampering)
        b.transactions.push(signed_tx());

        assert_ne!(old_hash, b.compute_hash());
        assert!(!b.is_valid(2));
    }

    #[test]
    fn hash_commits_to_signatures() {
        let mut b = Block::new(1, "prev".into(), vec![signed_tx()]);
        let before = b.compute_hash();
        b.transactions[0].signature = Some("00".into());
        assert_ne!(before, b.compute_hash());
        assert!(!b.has_valid_transactions());
    }

    #[test]
    fn coinbase_is_only_reported_in_first_slot() {
        let b = Block::new(1, "prev".into(), vec![signed_tx()]);
        assert!(b.coinbase().is_none());
    }
}
