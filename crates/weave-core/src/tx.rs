// weave-core/src/tx.rs

use crate::{ledger::WalletList, types::*, TxError, TxResult};
use serde::{Deserialize, Serialize};
use weave_crypto::{hash::Hashable, Address, Hash, PublicKey, Signature, Wallet};

/// A named tag attached to a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: Vec<u8>,
    pub value: Vec<u8>,
}

impl Tag {
    pub fn new(name: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A transfer or data-bearing transaction
///
/// After signing, `id = H(signature)` and the signature covers the canonical
/// signature segment. A transaction with no owner is a genesis/system
/// transaction and bypasses last_tx checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction id, the hash of the signature bytes
    pub id: Hash,
    /// Sender's most recent transaction id (replay protection)
    pub last_tx: Option<Hash>,
    /// Sender public key; `None` marks a system transaction
    pub owner: Option<PublicKey>,
    /// Recipient address; `None` for a data-only transaction
    pub target: Option<Address>,
    /// Amount transferred to `target`
    pub quantity: Winston,
    /// Opaque stored data
    pub data: Vec<u8>,
    /// Mining reward offered
    pub reward: Winston,
    /// Ordered (name, value) byte pairs
    pub tags: Vec<Tag>,
    /// Signature over the canonical segment
    pub signature: Option<Signature>,
}

impl Transaction {
    /// Create an unsigned transfer
    pub fn transfer(
        owner: PublicKey,
        target: Address,
        quantity: Winston,
        reward: Winston,
        last_tx: Option<Hash>,
    ) -> Self {
        Self {
            id: Hash::zero(),
            last_tx,
            owner: Some(owner),
            target: Some(target),
            quantity,
            data: Vec::new(),
            reward,
            tags: Vec::new(),
            signature: None,
        }
    }

    /// Create an unsigned data-bearing transaction
    pub fn with_data(
        owner: PublicKey,
        data: Vec<u8>,
        reward: Winston,
        last_tx: Option<Hash>,
    ) -> Self {
        Self {
            id: Hash::zero(),
            last_tx,
            owner: Some(owner),
            target: None,
            quantity: Winston::zero(),
            data,
            reward,
            tags: Vec::new(),
            signature: None,
        }
    }

    /// Whether this is a genesis/system transaction
    pub fn is_system(&self) -> bool {
        self.owner.is_none()
    }

    /// The sender's address, when there is a sender
    pub fn sender(&self) -> Option<Address> {
        self.owner.as_ref().map(|pk| pk.to_address())
    }

    /// Stored data size in bytes
    pub fn data_size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Canonical signature segment:
    /// `owner ‖ target ‖ data ‖ ascii(quantity) ‖ ascii(reward) ‖ last_tx ‖ tags`
    pub fn signature_segment(&self) -> Vec<u8> {
        let mut segment = Vec::with_capacity(self.data.len() + 128);
        if let Some(owner) = &self.owner {
            segment.extend_from_slice(owner.as_bytes());
        }
        if let Some(target) = &self.target {
            segment.extend_from_slice(target.as_bytes());
        }
        segment.extend_from_slice(&self.data);
        segment.extend_from_slice(&self.quantity.to_ascii());
        segment.extend_from_slice(&self.reward.to_ascii());
        if let Some(last_tx) = &self.last_tx {
            segment.extend_from_slice(last_tx.as_bytes());
        }
        for tag in &self.tags {
            segment.extend_from_slice(&tag.name);
            segment.extend_from_slice(&tag.value);
        }
        segment
    }

    /// Sign the transaction and set its id
    pub fn sign(&mut self, wallet: &Wallet) -> weave_crypto::CryptoResult<()> {
        let signature = wallet.sign(&self.signature_segment())?;
        self.id = signature.as_bytes().hash();
        self.signature = Some(signature);
        Ok(())
    }

    /// Verify this transaction against the given difficulty and ledger
    ///
    /// Checks, in order: field size caps, tag well-formedness, self-transfer,
    /// pricing, last_tx threading, id derivation, signature, and that the
    /// sender can fund the spend.
    pub fn verify(&self, diff: Difficulty, wallets: &WalletList) -> TxResult<()> {
        self.check_field_sizes()?;
        self.check_tags()?;

        // System transactions carry no signature and skip the remaining checks
        let owner = match &self.owner {
            Some(owner) => owner,
            None => return Ok(()),
        };
        let sender = owner.to_address();

        if self.target == Some(sender) {
            return Err(TxError::SelfTarget);
        }

        let min = min_tx_cost(self.data.len(), diff);
        if self.reward < Winston::from_u64(min) {
            return Err(TxError::TooCheap);
        }

        match wallets.get(&sender) {
            Some(entry) => {
                if entry.last_tx != self.last_tx {
                    return Err(TxError::LastTxNotValid);
                }
            }
            // An unknown sender is acceptable only on an empty ledger
            None => {
                if !wallets.is_empty() {
                    return Err(TxError::LastTxNotValid);
                }
            }
        }

        let signature = self.signature.as_ref().ok_or(TxError::SignatureNotValid)?;
        if self.id != signature.as_bytes().hash() {
            return Err(TxError::IdNotValid);
        }
        if !signature
            .verify(&self.signature_segment(), owner)
            .unwrap_or(false)
        {
            return Err(TxError::SignatureNotValid);
        }

        let spend = if self.target.is_some() {
            self.quantity
                .checked_add(&self.reward)
                .ok_or(TxError::Overspend)?
        } else {
            self.reward.clone()
        };
        if wallets.balance(&sender) < spend {
            return Err(TxError::Overspend);
        }

        Ok(())
    }

    fn check_field_sizes(&self) -> TxResult<()> {
        let owner_len = self.owner.as_ref().map_or(0, |o| o.as_bytes().len());
        let signature_len = self.signature.as_ref().map_or(0, |s| s.as_bytes().len());
        let tags_len: usize = self
            .tags
            .iter()
            .map(|t| t.name.len() + t.value.len())
            .sum();

        let ok = owner_len <= MAX_OWNER_BYTES
            && signature_len <= MAX_SIGNATURE_BYTES
            && tags_len <= MAX_TAGS_BYTES
            && self.data.len() <= MAX_DATA_BYTES
            && self.quantity.digits() <= MAX_QUANTITY_DIGITS
            && self.reward.digits() <= MAX_REWARD_DIGITS;

        if ok {
            Ok(())
        } else {
            Err(TxError::FieldsTooLarge)
        }
    }

    fn check_tags(&self) -> TxResult<()> {
        for tag in &self.tags {
            if tag.name.is_empty() || tag.value.is_empty() {
                return Err(TxError::TagFieldIllegallySpecified);
            }
        }
        Ok(())
    }
}

/// Minimum acceptable reward for storing `data_size` bytes at difficulty `diff`
///
/// Cost falls as difficulty rises above the pricing centre; below the centre
/// the centre itself is used.
pub fn min_tx_cost(data_size: usize, diff: Difficulty) -> u64 {
    let d = if diff >= DIFF_CENTER { diff } else { DIFF_CENTER };
    let s = data_size as f64 + 3210.0;
    let denom = (d.saturating_sub(DIFF_CENTER - 2) as f64).max(2.0);
    let cost = 2.0 * s * COST_PER_BYTE / denom * 1.2f64.powf(s / 1_048_576.0);
    cost.trunc() as u64
}

/// Verify an ordered transaction list against a ledger
///
/// Order-sensitive: each verified transaction is applied before the next is
/// checked. Returns the ledger after all transactions.
pub fn verify_list(
    txs: &[Transaction],
    diff: Difficulty,
    wallets: &WalletList,
) -> TxResult<WalletList> {
    let mut running = wallets.clone();
    for tx in txs {
        tx.verify(diff, &running)?;
        running.apply_tx(tx);
    }
    Ok(running)
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_crypto::SignatureScheme;

    fn funded_wallet() -> (Wallet, WalletList) {
        let wallet = Wallet::generate(SignatureScheme::Ed25519).unwrap();
        let wallets = WalletList::with_balances(vec![(
            wallet.address(),
            Winston::from_u64(10_000),
        )]);
        (wallet, wallets)
    }

    #[test]
    fn test_sign_verify_round_trip() {
        let (wallet, wallets) = funded_wallet();
        let target = Wallet::generate(SignatureScheme::Ed25519).unwrap().address();

        let mut tx = Transaction::transfer(
            wallet.public_key().clone(),
            target,
            Winston::from_u64(100),
            Winston::from_u64(1),
            None,
        );
        tx.sign(&wallet).unwrap();

        assert!(tx.verify(1, &wallets).is_ok());
    }

    #[test]
    fn test_forged_data_rejected() {
        let (wallet, wallets) = funded_wallet();
        let target = Wallet::generate(SignatureScheme::Ed25519).unwrap().address();

        let mut tx = Transaction::transfer(
            wallet.public_key().clone(),
            target,
            Winston::from_u64(100),
            Winston::from_u64(1),
            None,
        );
        tx.sign(&wallet).unwrap();
        tx.quantity = Winston::from_u64(9_999);

        assert_eq!(tx.verify(1, &wallets), Err(TxError::SignatureNotValid));
    }

    #[test]
    fn test_id_must_match_signature() {
        let (wallet, wallets) = funded_wallet();
        let target = Wallet::generate(SignatureScheme::Ed25519).unwrap().address();

        let mut tx = Transaction::transfer(
            wallet.public_key().clone(),
            target,
            Winston::from_u64(100),
            Winston::from_u64(1),
            None,
        );
        tx.sign(&wallet).unwrap();
        tx.id = Hash::zero();

        assert_eq!(tx.verify(1, &wallets), Err(TxError::IdNotValid));
    }

    #[test]
    fn test_self_transfer_rejected() {
        let (wallet, wallets) = funded_wallet();

        let mut tx = Transaction::transfer(
            wallet.public_key().clone(),
            wallet.address(),
            Winston::from_u64(100),
            Winston::from_u64(1),
            None,
        );
        tx.sign(&wallet).unwrap();

        assert_eq!(tx.verify(1, &wallets), Err(TxError::SelfTarget));
    }

    #[test]
    fn test_bad_last_tx_rejected() {
        let (wallet, wallets) = funded_wallet();
        let target = Wallet::generate(SignatureScheme::Ed25519).unwrap().address();

        let mut tx = Transaction::transfer(
            wallet.public_key().clone(),
            target,
            Winston::from_u64(100),
            Winston::from_u64(1),
            Some(b"bogus anchor".to_vec().hash()),
        );
        tx.sign(&wallet).unwrap();

        assert_eq!(tx.verify(1, &wallets), Err(TxError::LastTxNotValid));
    }

    #[test]
    fn test_overspend_rejected() {
        let (wallet, wallets) = funded_wallet();
        let target = Wallet::generate(SignatureScheme::Ed25519).unwrap().address();

        let mut tx = Transaction::transfer(
            wallet.public_key().clone(),
            target,
            Winston::from_u64(10_000),
            Winston::from_u64(1),
            None,
        );
        tx.sign(&wallet).unwrap();

        assert_eq!(tx.verify(1, &wallets), Err(TxError::Overspend));
    }

    #[test]
    fn test_empty_tag_rejected() {
        let (wallet, wallets) = funded_wallet();
        let target = Wallet::generate(SignatureScheme::Ed25519).unwrap().address();

        let mut tx = Transaction::transfer(
            wallet.public_key().clone(),
            target,
            Winston::from_u64(100),
            Winston::from_u64(1),
            None,
        );
        tx.tags.push(Tag::new("", "value"));
        tx.sign(&wallet).unwrap();

        assert_eq!(
            tx.verify(1, &wallets),
            Err(TxError::TagFieldIllegallySpecified)
        );
    }

    #[test]
    fn test_oversized_tags_rejected() {
        let (wallet, wallets) = funded_wallet();
        let target = Wallet::generate(SignatureScheme::Ed25519).unwrap().address();

        let mut tx = Transaction::transfer(
            wallet.public_key().clone(),
            target,
            Winston::from_u64(100),
            Winston::from_u64(1),
            None,
        );
        tx.tags.push(Tag::new(vec![b'n'; 1025], vec![b'v'; 1024]));
        tx.sign(&wallet).unwrap();

        assert_eq!(tx.verify(1, &wallets), Err(TxError::FieldsTooLarge));
    }

    #[test]
    fn test_underpriced_data_rejected() {
        let wallet = Wallet::generate(SignatureScheme::Ed25519).unwrap();
        let wallets = WalletList::with_balances(vec![(
            wallet.address(),
            Winston::from_tokens(1),
        )]);

        // A megabyte of data prices well above one winston
        let mut tx = Transaction::with_data(
            wallet.public_key().clone(),
            vec![0u8; 1_048_576],
            Winston::from_u64(1),
            None,
        );
        tx.sign(&wallet).unwrap();

        assert_eq!(tx.verify(1, &wallets), Err(TxError::TooCheap));
        assert!(min_tx_cost(1_048_576, 1) > 1);
    }

    #[test]
    fn test_min_cost_falls_with_difficulty() {
        let cheap = min_tx_cost(1_048_576, DIFF_CENTER + 20);
        let base = min_tx_cost(1_048_576, DIFF_CENTER);
        assert!(cheap < base);
        // Below the centre, the centre price applies
        assert_eq!(min_tx_cost(1_048_576, 1), base);
    }

    #[test]
    fn test_verify_list_is_order_sensitive() {
        let (wallet, wallets) = funded_wallet();
        let target = Wallet::generate(SignatureScheme::Ed25519).unwrap().address();

        let mut tx1 = Transaction::transfer(
            wallet.public_key().clone(),
            target,
            Winston::from_u64(1_000),
            Winston::from_u64(1),
            None,
        );
        tx1.sign(&wallet).unwrap();

        let mut tx2 = Transaction::transfer(
            wallet.public_key().clone(),
            target,
            Winston::from_u64(1_000),
            Winston::from_u64(1),
            Some(tx1.id),
        );
        tx2.sign(&wallet).unwrap();

        // Correct order threads last_tx through the running ledger
        let after = verify_list(
            &[tx1.clone(), tx2.clone()],
            1,
            &wallets,
        )
        .unwrap();
        assert_eq!(after.balance(&target), Winston::from_u64(2_000));

        // Reversed order breaks the thread
        assert_eq!(
            verify_list(&[tx2, tx1], 1, &wallets),
            Err(TxError::LastTxNotValid)
        );
    }
}
