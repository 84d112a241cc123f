//! Proof-of-Work search and acceptance check.
//!
//! A hash satisfies difficulty `d` when its first `d` hex characters are `0`.
//! The search is a plain monotonically increasing nonce scan, so two workers
//! starting from the same nonce race identically; workers pick distinct
//! starting offsets instead.

use std::sync::atomic::{AtomicBool, Ordering};

use super::Block;

/// How many nonces are tried between two looks at the cancellation flag.
const CANCEL_POLL_INTERVAL: u64 = 1024;

/// Acceptance check, always derived from the hash string itself.
pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    let d = difficulty as usize;
    hash.len() >= d && hash.bytes().take(d).all(|c| c == b'0')
}

/// Find a nonce from 0 upwards. Unbounded; only returns once solved.
#[cfg(test)]
pub fn mine(block: &mut Block, difficulty: u32) {
    let never = AtomicBool::new(false);
    mine_from(block, difficulty, 0, &never);
}

/// Search from `start_nonce` upwards until the hash meets `difficulty` or
/// `cancel` is raised. Returns `true` when `block` now carries a solution.
pub fn mine_from(
    block: &mut Block,
    difficulty: u32,
    start_nonce: u64,
    cancel: &AtomicBool,
) -> bool {
    block.nonce = start_nonce;
    let mut tries: u64 = 0;
    loop {
        block.hash = block.compute_hash();
        if meets_difficulty(&block.hash, difficulty) {
            return true;
        }
        tries = tries.wrapping_add(1);
        if tries % CANCEL_POLL_INTERVAL == 0 && cancel.load(Ordering::Relaxed) {
            return false;
        }
        block.nonce = block.nonce.wrapping_add(1);
    }
}
