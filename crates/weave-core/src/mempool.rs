// weave-core/src/mempool.rs

use crate::{tx::Transaction, CoreError, CoreResult};
use std::collections::HashSet;
use weave_crypto::Hash;

/// Default cap on pending transactions
pub const DEFAULT_MEMPOOL_SIZE: usize = 10_000;

/// The pending-transaction pool
///
/// Order of arrival is preserved: candidate blocks include transactions in
/// the order the node first saw them, which keeps last_tx chains from the
/// same sender applicable.
#[derive(Debug)]
pub struct Mempool {
    txs: Vec<Transaction>,
    ids: HashSet<Hash>,
    max_size: usize,
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new(DEFAULT_MEMPOOL_SIZE)
    }
}

impl Mempool {
    pub fn new(max_size: usize) -> Self {
        Self {
            txs: Vec::new(),
            ids: HashSet::new(),
            max_size,
        }
    }

    /// Add a transaction; returns false when it is already pending
    pub fn add(&mut self, tx: Transaction) -> CoreResult<bool> {
        if self.ids.contains(&tx.id) {
            return Ok(false);
        }
        if self.txs.len() >= self.max_size {
            return Err(CoreError::PoolFull);
        }
        self.ids.insert(tx.id);
        self.txs.push(tx);
        Ok(true)
    }

    pub fn contains(&self, id: &Hash) -> bool {
        self.ids.contains(id)
    }

    /// The pending transactions, in arrival order
    pub fn txs(&self) -> &[Transaction] {
        &self.txs
    }

    pub fn len(&self) -> usize {
        self.txs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }

    /// Drop every transaction whose id appears in an accepted block
    pub fn remove_included(&mut self, included: &[Hash]) {
        let included: HashSet<&Hash> = included.iter().collect();
        self.txs.retain(|tx| !included.contains(&tx.id));
        self.ids.retain(|id| !included.contains(id));
    }

    /// Drop transactions that no longer satisfy the given filter
    ///
    /// Used after integrating a block, when sender last_tx threads may have
    /// moved beneath pending transactions.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&Transaction) -> bool,
    {
        let mut dropped = Vec::new();
        self.txs.retain(|tx| {
            if keep(tx) {
                true
            } else {
                dropped.push(tx.id);
                false
            }
        });
        for id in dropped {
            self.ids.remove(&id);
        }
    }

    pub fn clear(&mut self) {
        self.txs.clear();
        self.ids.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Winston;
    use weave_crypto::{SignatureScheme, Wallet};

    fn signed_tx() -> Transaction {
        let wallet = Wallet::generate(SignatureScheme::Ed25519).unwrap();
        let mut tx = Transaction::with_data(
            wallet.public_key().clone(),
            b"payload".to_vec(),
            Winston::from_u64(1),
            None,
        );
        tx.sign(&wallet).unwrap();
        tx
    }

    #[test]
    fn test_add_and_dedup() {
        let mut pool = Mempool::new(DEFAULT_MEMPOOL_SIZE);
        let tx = signed_tx();

        assert!(pool.add(tx.clone()).unwrap());
        assert!(!pool.add(tx.clone()).unwrap());
        assert_eq!(pool.len(), 1);
        assert!(pool.contains(&tx.id));
    }

    #[test]
    fn test_remove_included() {
        let mut pool = Mempool::new(DEFAULT_MEMPOOL_SIZE);
        let tx1 = signed_tx();
        let tx2 = signed_tx();

        pool.add(tx1.clone()).unwrap();
        pool.add(tx2.clone()).unwrap();

        pool.remove_included(&[tx1.id]);
        assert_eq!(pool.len(), 1);
        assert!(!pool.contains(&tx1.id));
        assert!(pool.contains(&tx2.id));
    }

    #[test]
    fn test_pool_full() {
        let mut pool = Mempool::new(1);
        pool.add(signed_tx()).unwrap();
        assert!(matches!(
            pool.add(signed_tx()),
            Err(CoreError::PoolFull)
        ));
    }

    #[test]
    fn test_arrival_order_preserved() {
        let mut pool = Mempool::new(DEFAULT_MEMPOOL_SIZE);
        let tx1 = signed_tx();
        let tx2 = signed_tx();

        pool.add(tx1.clone()).unwrap();
        pool.add(tx2.clone()).unwrap();

        let ids: Vec<_> = pool.txs().iter().map(|tx| tx.id).collect();
        assert_eq!(ids, vec![tx1.id, tx2.id]);
    }
}
