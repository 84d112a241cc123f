pub mod block;
pub mod model;
pub mod pow;

pub use block::Block;
pub use model::{Blockchain, LedgerParams};
