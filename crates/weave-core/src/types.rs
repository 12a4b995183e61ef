// weave-core/src/types.rs

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};

/// Block height
pub type Height = u64;

/// Timestamp in Unix epoch seconds
pub type Timestamp = u64;

/// Difficulty: required leading zero bits of the proof-of-work hash
pub type Difficulty = u32;

/// Blocks between difficulty retargets
pub const RETARGET_BLOCKS: u64 = 10;

/// Desired seconds per block
pub const TARGET_TIME: u64 = 120;

/// Fraction of the retarget period treated as on-time
pub const RETARGET_TOLERANCE: f64 = 0.1;

/// Difficulty bounds
pub const MIN_DIFF: Difficulty = 1;
pub const MAX_DIFF: Difficulty = 64;

/// Genesis difficulty when not configured
pub const DEFAULT_DIFF: Difficulty = 8;

/// Maximum recoverable fork depth
pub const STORE_BLOCKS_BEHIND_CURRENT: u64 = 50;

/// Initial token supply (whole tokens)
pub const GENESIS_TOKENS: u64 = 55_000_000;

/// Base units per token
pub const WINSTON_PER_TOKEN: u64 = 1_000_000_000_000;

/// Mining reward half-life in blocks
pub const REWARD_DECAY_BLOCKS: u64 = 105_120;

/// Pricing baseline, winston per byte
pub const COST_PER_BYTE: f64 = 0.00001;

/// Pricing difficulty centre
pub const DIFF_CENTER: Difficulty = 40;

/// Transaction field size caps, in bytes
pub const MAX_ID_BYTES: usize = 32;
pub const MAX_LAST_TX_BYTES: usize = 32;
pub const MAX_OWNER_BYTES: usize = 512;
pub const MAX_TAGS_BYTES: usize = 2048;
pub const MAX_TARGET_BYTES: usize = 32;
pub const MAX_QUANTITY_DIGITS: usize = 21;
pub const MAX_DATA_BYTES: usize = 6_000_000;
pub const MAX_SIGNATURE_BYTES: usize = 512;
pub const MAX_REWARD_DIGITS: usize = 21;

/// Token amount in winston (arbitrary precision; quantities may exceed u64)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Winston(BigUint);

impl Winston {
    pub fn new(value: BigUint) -> Self {
        Self(value)
    }

    pub fn zero() -> Self {
        Self(BigUint::from(0u64))
    }

    pub fn from_u64(value: u64) -> Self {
        Self(BigUint::from(value))
    }

    /// Whole tokens, scaled to winston
    pub fn from_tokens(tokens: u64) -> Self {
        Self(BigUint::from(tokens) * BigUint::from(WINSTON_PER_TOKEN))
    }

    pub fn inner(&self) -> &BigUint {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == BigUint::from(0u64)
    }

    /// Decimal digit count, used for the quantity/reward size caps
    pub fn digits(&self) -> usize {
        self.0.to_str_radix(10).len()
    }

    /// ASCII decimal encoding, used in canonical byte segments
    pub fn to_ascii(&self) -> Vec<u8> {
        self.0.to_str_radix(10).into_bytes()
    }

    pub fn checked_add(&self, other: &Winston) -> Option<Winston> {
        Some(Winston(&self.0 + &other.0))
    }

    pub fn checked_sub(&self, other: &Winston) -> Option<Winston> {
        if self.0 < other.0 {
            None
        } else {
            Some(Winston(&self.0 - &other.0))
        }
    }
}

impl Add for Winston {
    type Output = Winston;

    fn add(self, other: Winston) -> Winston {
        Winston(&self.0 + &other.0)
    }
}

impl Sub for Winston {
    type Output = Winston;

    fn sub(self, other: Winston) -> Winston {
        Winston(&self.0 - &other.0)
    }
}

impl Default for Winston {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for Winston {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_winston_arithmetic() {
        let a = Winston::from_u64(100);
        let b = Winston::from_u64(50);

        let sum = a.checked_add(&b).unwrap();
        assert_eq!(sum, Winston::from_u64(150));

        let diff = sum.checked_sub(&b).unwrap();
        assert_eq!(diff, Winston::from_u64(100));
    }

    #[test]
    fn test_winston_underflow() {
        let a = Winston::from_u64(50);
        let b = Winston::from_u64(100);

        assert!(a.checked_sub(&b).is_none());
    }

    #[test]
    fn test_winston_ascii() {
        assert_eq!(Winston::from_u64(9000).to_ascii(), b"9000".to_vec());
        assert_eq!(Winston::zero().to_ascii(), b"0".to_vec());
    }

    #[test]
    fn test_token_scaling() {
        let one = Winston::from_tokens(1);
        assert_eq!(one, Winston::from_u64(WINSTON_PER_TOKEN));
        // 21 digit quantities fit
        let supply = Winston::from_tokens(GENESIS_TOKENS);
        assert!(supply.digits() <= MAX_QUANTITY_DIGITS);
    }
}
