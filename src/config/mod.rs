use log::warn;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::blockchain::LedgerParams;

/// Default Proof-of-Work difficulty (number of leading zero hex digits).
pub const DEFAULT_DIFFICULTY: u32 = 3;

/// Block subsidy paid by every coinbase.
pub const BASE_REWARD: u64 = 50;

/// Amount credited to the genesis address.
pub const GENESIS_SUPPLY: u64 = 100;

/// Upper bound on non-coinbase transactions per block.
pub const MAX_TXS_PER_BLOCK: usize = 100;

/// `DB_PATH` value that keeps the chain in memory only.
pub const MEMORY_DB_PATH: &str = ":memory:";

/// Process configuration, read from the environment (after `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub difficulty: u32,
    pub block_reward: u64,
    pub genesis_address: String,
    pub genesis_supply: u64,
    /// Coinbase recipient for the coordinator's own work descriptors.
    pub reward_address: Option<String>,
    pub round_timeout: Duration,
    pub block_interval: Duration,
    pub start_delay: Duration,
    pub max_txs_per_block: usize,
    pub storage_retries: u32,
    pub db_path: String,
    pub local_miners: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            difficulty: DEFAULT_DIFFICULTY,
            block_reward: BASE_REWARD,
            genesis_address: "GENESIS_ADDRESS".to_string(),
            genesis_supply: GENESIS_SUPPLY,
            reward_address: None,
            round_timeout: Duration::from_secs(60),
            block_interval: Duration::from_secs(10),
            start_delay: Duration::from_secs(5),
            max_txs_per_block: MAX_TXS_PER_BLOCK,
            storage_retries: 3,
            db_path: "./db".to_string(),
            local_miners: 1,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; missing keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let d = Self::default();
        let secs = |key: &str, default: Duration| {
            Duration::from_secs(parsed(&lookup, key, default.as_secs()))
        };
        Self {
            host: lookup("HOST").unwrap_or(d.host),
            port: parsed(&lookup, "PORT", d.port),
            difficulty: parsed(&lookup, "DIFFICULTY", d.difficulty),
            block_reward: parsed(&lookup, "BLOCK_REWARD", d.block_reward),
            genesis_address: lookup("GENESIS_ADDRESS").unwrap_or(d.genesis_address),
            genesis_supply: parsed(&lookup, "GENESIS_SUPPLY", d.genesis_supply),
            reward_address: lookup("REWARD_ADDRESS").filter(|a| !a.trim().is_empty()),
            round_timeout: secs("ROUND_TIMEOUT_SECS", d.round_timeout),
            block_interval: secs("BLOCK_INTERVAL_SECS", d.block_interval),
            start_delay: secs("START_DELAY_SECS", d.start_delay),
            max_txs_per_block: parsed(&lookup, "MAX_TXS_PER_BLOCK", d.max_txs_per_block),
            storage_retries: parsed(&lookup, "STORAGE_RETRIES", d.storage_retries),
            db_path: lookup("DB_PATH").unwrap_or(d.db_path),
            local_miners: parsed(&lookup, "LOCAL_MINERS", d.local_miners),
        }
    }

    /// True when blocks should not outlive the process.
    pub fn in_memory(&self) -> bool {
        self.db_path.trim() == MEMORY_DB_PATH
    }

    pub fn ledger_params(&self) -> LedgerParams {
        LedgerParams {
            difficulty: self.difficulty,
            block_reward: self.block_reward,
            genesis_address: self.genesis_address.clone(),
            genesis_supply: self.genesis_supply,
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("config: could not parse {key}={raw:?}, using default");
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = from_pairs(&[]);
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.difficulty, DEFAULT_DIFFICULTY);
        assert_eq!(cfg.block_reward, 50);
        assert_eq!(cfg.genesis_supply, 100);
        assert!(cfg.reward_address.is_none());
        assert_eq!(cfg.round_timeout, Duration::from_secs(60));
    }

    #[test]
    fn reads_and_falls_back_per_key() {
        let cfg = from_pairs(&[
            ("PORT", "9000"),
            ("DIFFICULTY", "five"),
            ("ROUND_TIMEOUT_SECS", " 2 "),
            ("REWARD_ADDRESS", "  "),
            ("DB_PATH", "/tmp/chain"),
        ]);
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.difficulty, DEFAULT_DIFFICULTY);
        assert_eq!(cfg.round_timeout, Duration::from_secs(2));
        assert!(cfg.reward_address.is_none());
        assert_eq!(cfg.db_path, "/tmp/chain");
        assert!(!cfg.in_memory());
        assert_eq!(cfg.ledger_params().difficulty, DEFAULT_DIFFICULTY);
    }

    #[test]
    fn memory_db_path_selects_ephemeral_store() {
        assert!(from_pairs(&[("DB_PATH", ":memory:")]).in_memory());
        assert!(!from_pairs(&[]).in_memory());
    }
}
