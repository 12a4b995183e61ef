// weave-core/src/block.rs

use crate::{
    ledger::WalletList,
    tx::{Tag, Transaction},
    types::*,
};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use weave_crypto::{hash::Hashable, Address, Hash};

/// A block of the weave, in canonical form: transactions appear as ids
///
/// `hash_list` holds the independent hashes of all ancestors, newest first,
/// so its length always equals the block height.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Hash over the canonical encoding of every other field; the block's identity
    pub indep_hash: Hash,
    /// Independent hash of the predecessor
    pub prev_hash: Hash,
    pub height: Height,
    /// Nonce found by the miner
    pub nonce: Vec<u8>,
    /// The proof-of-work hash: `H(prev.hash ‖ data_segment ‖ nonce)`
    pub hash: Hash,
    pub diff: Difficulty,
    pub timestamp: Timestamp,
    /// Timestamp of the most recent retarget block
    pub last_retarget: Timestamp,
    /// Ancestor independent hashes, newest first
    pub hash_list: Vec<Hash>,
    /// Ledger snapshot after applying this block
    pub wallet_list: WalletList,
    /// Included transaction ids, in order
    pub txs: Vec<Hash>,
    /// Reward destination; `None` leaves the reward unclaimed
    pub reward_addr: Option<Address>,
    /// Cumulative stored data size across the whole chain
    pub weave_size: u64,
    /// Stored data size of this block's transactions
    pub block_size: u64,
    pub tags: Vec<Tag>,
}

impl Block {
    /// Build the genesis block for the given allocations
    ///
    /// All fields are fixed (timestamp zero, empty nonce, zero PoW hash) so
    /// nodes configured identically derive the same genesis hash.
    pub fn genesis(wallet_list: WalletList, diff: Difficulty) -> Self {
        let mut block = Self {
            indep_hash: Hash::zero(),
            prev_hash: Hash::zero(),
            height: 0,
            nonce: Vec::new(),
            hash: Hash::zero(),
            diff,
            timestamp: 0,
            last_retarget: 0,
            hash_list: Vec::new(),
            wallet_list,
            txs: Vec::new(),
            reward_addr: None,
            weave_size: 0,
            block_size: 0,
            tags: Vec::new(),
        };
        block.indep_hash = block.compute_indep_hash();
        block
    }

    /// Whether this is a genesis block
    pub fn is_genesis(&self) -> bool {
        self.height == 0 && self.prev_hash == Hash::zero()
    }

    /// Canonical independent hash: every field except `indep_hash` itself,
    /// in fixed order
    pub fn compute_indep_hash(&self) -> Hash {
        let mut bytes = Vec::with_capacity(256 + self.hash_list.len() * 32);
        bytes.extend_from_slice(self.prev_hash.as_bytes());
        bytes.extend_from_slice(&self.height.to_be_bytes());
        bytes.extend_from_slice(&self.nonce);
        bytes.extend_from_slice(self.hash.as_bytes());
        bytes.extend_from_slice(&self.diff.to_be_bytes());
        bytes.extend_from_slice(&self.timestamp.to_be_bytes());
        bytes.extend_from_slice(&self.last_retarget.to_be_bytes());
        for ancestor in &self.hash_list {
            bytes.extend_from_slice(ancestor.as_bytes());
        }
        for (address, entry) in self.wallet_list.iter() {
            bytes.extend_from_slice(address.as_bytes());
            bytes.extend_from_slice(&entry.balance.to_ascii());
            if let Some(last_tx) = &entry.last_tx {
                bytes.extend_from_slice(last_tx.as_bytes());
            }
        }
        for id in &self.txs {
            bytes.extend_from_slice(id.as_bytes());
        }
        if let Some(reward_addr) = &self.reward_addr {
            bytes.extend_from_slice(reward_addr.as_bytes());
        }
        bytes.extend_from_slice(&self.weave_size.to_be_bytes());
        bytes.extend_from_slice(&self.block_size.to_be_bytes());
        for tag in &self.tags {
            bytes.extend_from_slice(&tag.name);
            bytes.extend_from_slice(&tag.value);
        }
        bytes.hash()
    }

    /// Height of the recall block selected when mining on this tip
    ///
    /// The tip's independent hash, read as a big-endian integer, picks a
    /// pseudo-random historical height. At height zero the tip recalls
    /// itself.
    pub fn recall_height(&self) -> Height {
        recall_height(&self.indep_hash, self.height)
    }

    /// Independent hash of the recall block for mining on this tip
    pub fn recall_hash(&self) -> Hash {
        if self.height == 0 {
            return self.indep_hash;
        }
        let recall = self.recall_height();
        self.hash_list[(self.height - 1 - recall) as usize]
    }
}

/// Recall-height selection: `decode_be(indep_hash) mod max(1, height)`
pub fn recall_height(indep_hash: &Hash, height: Height) -> Height {
    let n = BigUint::from_bytes_be(indep_hash.as_bytes());
    let r = n % BigUint::from(height.max(1));
    r.to_u64_digits().first().copied().unwrap_or(0)
}

/// Concatenated transaction ids, in list order
pub fn block_data(ids: &[Hash]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(ids.len() * 32);
    for id in ids {
        bytes.extend_from_slice(id.as_bytes());
    }
    bytes
}

/// The byte string mixed into the proof-of-work hash, binding a candidate
/// block to its transactions, its recall block and its reward address
pub fn data_segment(
    txs: &[Transaction],
    recall: &Block,
    reward_addr: Option<Address>,
) -> Vec<u8> {
    let ids: Vec<Hash> = txs.iter().map(|tx| tx.id).collect();
    let mut segment = block_data(&ids);
    segment.extend_from_slice(&recall.nonce);
    segment.extend_from_slice(recall.hash.as_bytes());
    segment.extend_from_slice(&block_data(&recall.txs));
    if let Some(reward_addr) = &reward_addr {
        segment.extend_from_slice(reward_addr.as_bytes());
    }
    segment
}

/// The proof-of-work hash for one nonce attempt
pub fn pow_hash(prev_pow: &Hash, segment: &[u8], nonce: &[u8]) -> Hash {
    let mut bytes = Vec::with_capacity(64 + segment.len() + nonce.len());
    bytes.extend_from_slice(prev_pow.as_bytes());
    bytes.extend_from_slice(segment);
    bytes.extend_from_slice(nonce);
    bytes.hash()
}

/// The mining predicate
pub fn pow_satisfies(hash: &Hash, diff: Difficulty) -> bool {
    hash.leading_zero_bits() >= diff
}

/// A block together with its transaction bodies, the in-transit form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullBlock {
    pub block: Block,
    pub txs: Vec<Transaction>,
}

impl FullBlock {
    /// Assemble the successor of `prev` from mined inputs
    pub fn assemble(
        prev: &Block,
        txs: Vec<Transaction>,
        wallet_list: WalletList,
        nonce: Vec<u8>,
        hash: Hash,
        diff: Difficulty,
        timestamp: Timestamp,
        last_retarget: Timestamp,
        reward_addr: Option<Address>,
    ) -> Self {
        let mut hash_list = Vec::with_capacity(prev.hash_list.len() + 1);
        hash_list.push(prev.indep_hash);
        hash_list.extend_from_slice(&prev.hash_list);

        let block_size: u64 = txs.iter().map(|tx| tx.data_size()).sum();
        let ids: Vec<Hash> = txs.iter().map(|tx| tx.id).collect();

        let mut block = Block {
            indep_hash: Hash::zero(),
            prev_hash: prev.indep_hash,
            height: prev.height + 1,
            nonce,
            hash,
            diff,
            timestamp,
            last_retarget,
            hash_list,
            wallet_list,
            txs: ids,
            reward_addr,
            weave_size: prev.weave_size + block_size,
            block_size,
            tags: Vec::new(),
        };
        block.indep_hash = block.compute_indep_hash();

        Self { block, txs }
    }

    /// Whether the carried bodies line up with the canonical id list
    pub fn ids_match(&self) -> bool {
        self.block.txs.len() == self.txs.len()
            && self
                .block
                .txs
                .iter()
                .zip(self.txs.iter())
                .all(|(id, tx)| *id == tx.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_crypto::{SignatureScheme, Wallet};

    fn genesis_with_balance() -> (Wallet, Block) {
        let wallet = Wallet::generate(SignatureScheme::Ed25519).unwrap();
        let wallets = WalletList::with_balances(vec![(
            wallet.address(),
            Winston::from_u64(10_000),
        )]);
        (wallet, Block::genesis(wallets, 1))
    }

    #[test]
    fn test_genesis_deterministic() {
        let wallet = Wallet::generate(SignatureScheme::Ed25519).unwrap();
        let balances =
            vec![(wallet.address(), Winston::from_u64(10_000))];
        let b1 = Block::genesis(WalletList::with_balances(balances.clone()), 1);
        let b2 = Block::genesis(WalletList::with_balances(balances), 1);
        assert_eq!(b1.indep_hash, b2.indep_hash);
        assert!(b1.is_genesis());
        assert_eq!(b1.height, 0);
        assert!(b1.hash_list.is_empty());
    }

    #[test]
    fn test_indep_hash_covers_fields() {
        let (_, genesis) = genesis_with_balance();
        let mut mutated = genesis.clone();
        mutated.timestamp = 1;
        assert_ne!(genesis.indep_hash, mutated.compute_indep_hash());
    }

    #[test]
    fn test_genesis_recalls_itself() {
        let (_, genesis) = genesis_with_balance();
        assert_eq!(genesis.recall_height(), 0);
        assert_eq!(genesis.recall_hash(), genesis.indep_hash);
    }

    #[test]
    fn test_recall_height_in_range() {
        let (_, genesis) = genesis_with_balance();
        for height in 1..64u64 {
            let r = recall_height(&genesis.indep_hash, height);
            assert!(r < height);
        }
    }

    #[test]
    fn test_assemble_extends_hash_list() {
        let (_, genesis) = genesis_with_balance();
        let next = FullBlock::assemble(
            &genesis,
            Vec::new(),
            genesis.wallet_list.clone(),
            b"nonce".to_vec(),
            Hash::zero(),
            genesis.diff,
            1,
            0,
            None,
        );

        assert_eq!(next.block.height, 1);
        assert_eq!(next.block.hash_list, vec![genesis.indep_hash]);
        assert_eq!(next.block.prev_hash, genesis.indep_hash);
        assert_eq!(next.block.hash_list.len() as u64, next.block.height);
        assert!(next.ids_match());
    }

    #[test]
    fn test_data_segment_binds_recall() {
        let (wallet, genesis) = genesis_with_balance();
        let mut tx = Transaction::with_data(
            wallet.public_key().clone(),
            b"bytes".to_vec(),
            Winston::from_u64(1),
            None,
        );
        tx.sign(&wallet).unwrap();

        let with_tx = data_segment(std::slice::from_ref(&tx), &genesis, None);
        let without = data_segment(&[], &genesis, None);
        assert_ne!(with_tx, without);

        let mut other_recall = genesis.clone();
        other_recall.nonce = b"different".to_vec();
        let rebound = data_segment(std::slice::from_ref(&tx), &other_recall, None);
        assert_ne!(with_tx, rebound);
    }

    #[test]
    fn test_pow_predicate() {
        let h = pow_hash(&Hash::zero(), b"segment", b"nonce");
        assert!(pow_satisfies(&h, 0));
        assert!(!pow_satisfies(&h, 256));
    }
}
