//! Mining round coordination.
//!
//! A single task owns the ledger, the mempool and the round state. Workers
//! and API handlers talk to it through a `CoordinatorHandle`; the task
//! answers one message at a time, so "first valid submission wins" and
//! "check balance then admit" are never interleaved.
//!
//! Round lifecycle: `Idle` → `RoundOpen` → `Committing` → `Idle`, with an
//! expired `RoundOpen` restarting itself from a fresh mempool snapshot.

mod actor;
pub mod messages;
mod round;

pub use actor::{CoordinatorHandle, spawn};
pub use messages::{CoordinatorStatus, Event, RoundPhase, WorkDescriptor};
pub use round::{Coordinator, CoordinatorSettings};
