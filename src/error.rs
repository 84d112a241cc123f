use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChainError>;

/// Every way a transaction, block or submission can be turned away.
///
/// All variants except `StorageError` are rejections of the offending input:
/// they are returned before any ledger or mempool state is touched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: u128, available: i128 },

    #[error("chain linkage error: {0}")]
    ChainLinkageError(String),

    #[error("proof of work error: {0}")]
    ProofOfWorkError(String),

    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("amount must be greater than zero")]
    InvalidAmount,

    #[error("duplicate transaction {0}")]
    DuplicateTransaction(String),

    #[error("stale submission for round {0}")]
    StaleSubmission(u64),

    #[error("unknown worker {0}")]
    UnknownWorker(String),

    #[error("corrupt ledger: {0}")]
    CorruptLedger(String),

    #[error("coordinator unavailable")]
    CoordinatorUnavailable,
}

impl ChainError {
    /// A block that validated but could not be recorded.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ChainError::StorageError(_))
    }
}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::StorageError(err.to_string())
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::StorageError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::ChainError;

    #[test]
    fn only_storage_errors_are_fatal() {
        assert!(ChainError::StorageError("disk full".into()).is_fatal());
        assert!(!ChainError::InvalidSignature.is_fatal());
        assert!(!ChainError::StaleSubmission(3).is_fatal());
    }

    #[test]
    fn io_errors_become_storage_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        assert_eq!(
            ChainError::from(io),
            ChainError::StorageError("boom".into())
        );
    }
}
