// weave-core/src/lib.rs

//! Core blockweave data structures and logic
//!
//! This crate provides:
//! - Transaction construction, pricing and verification
//! - The wallet-list ledger reducer and mining rewards
//! - Block records, recall-block selection and the mining data segment
//! - Difficulty retargeting
//! - Whole-block validation
//! - The pending-transaction pool

pub mod block;
pub mod ledger;
pub mod mempool;
pub mod retarget;
pub mod tx;
pub mod types;
pub mod validate;

pub use block::{Block, FullBlock};
pub use ledger::{WalletEntry, WalletList};
pub use mempool::Mempool;
pub use tx::{Tag, Transaction};
pub use types::*;

use weave_crypto::Hash;

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Result type for per-transaction checks
pub type TxResult<T> = Result<T, TxError>;

/// Errors that can occur in core blockweave operations
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid block: {0}")]
    InvalidBlock(String),

    #[error("Invalid transaction: {0}")]
    InvalidTransaction(#[from] TxError),

    #[error("Block not found: {0}")]
    BlockNotFound(Hash),

    #[error("Transaction pool full")]
    PoolFull,

    #[error("Cryptographic error: {0}")]
    CryptoError(#[from] weave_crypto::CryptoError),
}

/// Per-transaction rejection reasons
///
/// The display strings are the stable reason codes recorded when a
/// transaction is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TxError {
    #[error("tx_signature_not_valid")]
    SignatureNotValid,

    #[error("tx_too_cheap")]
    TooCheap,

    #[error("tx_fields_too_large")]
    FieldsTooLarge,

    #[error("tag_field_illegally_specified")]
    TagFieldIllegallySpecified,

    #[error("last_tx_not_valid")]
    LastTxNotValid,

    #[error("tx_id_not_valid")]
    IdNotValid,

    #[error("tx_self_target")]
    SelfTarget,

    #[error("tx_overspend")]
    Overspend,
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_basic_imports() {
        // Smoke test to ensure all modules compile
    }
}
