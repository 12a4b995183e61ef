// weave-crypto/src/lib.rs

//! Cryptographic primitives for the blockweave node
//!
//! This crate provides:
//! - Hashing functions (SHA256 default, SHA3, Blake3)
//! - Digital signatures (Ed25519, SECP256k1)
//! - Wallet keypair generation and management
//! - Addresses derived by hashing the owner public key

pub mod hash;
pub mod signature;
pub mod wallet;

pub use hash::{Hash, HashAlgorithm, Hashable, HASH_SIZE};
pub use signature::{Signature, SignatureScheme};
pub use wallet::{Address, PublicKey, SecretKey, Wallet};

/// Result type for cryptographic operations
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur during cryptographic operations
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Invalid public key")]
    InvalidPublicKey,

    #[error("Invalid secret key")]
    InvalidSecretKey,

    #[error("Invalid hash")]
    InvalidHash,

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}
