// weave-store/src/db.rs

use crate::{PruningMode, StorageError, StorageResult};
use rocksdb::{IteratorMode, Options, WriteBatch, DB};
use std::sync::Arc;
use weave_core::{Block, FullBlock, Transaction};
use weave_crypto::Hash;

/// Column families for different data types
#[derive(Debug, Clone, Copy)]
pub enum ColumnFamily {
    Blocks,
    Transactions,
    Meta,
}

impl ColumnFamily {
    fn as_str(&self) -> &'static str {
        match self {
            ColumnFamily::Blocks => "blocks",
            ColumnFamily::Transactions => "transactions",
            ColumnFamily::Meta => "meta",
        }
    }

    fn all() -> Vec<Self> {
        vec![Self::Blocks, Self::Transactions, Self::Meta]
    }
}

/// Store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub path: String,
    pub create_if_missing: bool,
    pub max_open_files: i32,
    pub cache_size: usize,
    pub pruning_mode: PruningMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "./data/db".to_string(),
            create_if_missing: true,
            max_open_files: 1024,
            cache_size: 256 * 1024 * 1024,
            pruning_mode: PruningMode::Archive,
        }
    }
}

const HASH_LIST_KEY: &str = "hash_list";

/// Content-addressed block and transaction store
///
/// Blocks are keyed by independent hash and transactions by id; both are
/// immutable once written, so a repeated put is a no-op rather than a
/// rewrite. The persisted hash list is the authoritative chain index.
pub struct BlockStore {
    db: Arc<DB>,
    config: StoreConfig,
}

impl BlockStore {
    /// Open or create the store
    pub fn open(config: StoreConfig) -> StorageResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(config.create_if_missing);
        opts.create_missing_column_families(true);
        opts.set_max_open_files(config.max_open_files);
        opts.increase_parallelism(num_cpus::get() as i32);

        let cfs: Vec<_> = ColumnFamily::all().iter().map(|cf| cf.as_str()).collect();

        let db = DB::open_cf(&opts, &config.path, &cfs)
            .map_err(|e| StorageError::DatabaseError(e.to_string()))?;

        tracing::debug!("block store opened at {}", config.path);

        Ok(Self {
            db: Arc::new(db),
            config,
        })
    }

    // ==================== BLOCK OPERATIONS ====================

    /// Store a block and its transaction bodies
    pub fn put_full_block(&self, full: &FullBlock) -> StorageResult<()> {
        self.put_block(&full.block)?;
        self.put_txs(&full.txs)
    }

    /// Store a block in canonical form (written at most once per hash)
    pub fn put_block(&self, block: &Block) -> StorageResult<()> {
        if self.has_block(&block.indep_hash)? {
            return Ok(());
        }

        let bytes = bincode::serialize(block)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        let cf = self.cf(ColumnFamily::Blocks)?;
        self.db
            .put_cf(cf, block.indep_hash.as_bytes(), &bytes)
            .map_err(|e| StorageError::DatabaseError(e.to_string()))?;

        tracing::debug!(height = block.height, hash = %block.indep_hash, "stored block");
        Ok(())
    }

    /// Get a block by independent hash
    pub fn get_block(&self, hash: &Hash) -> StorageResult<Option<Block>> {
        let cf = self.cf(ColumnFamily::Blocks)?;

        match self
            .db
            .get_cf(cf, hash.as_bytes())
            .map_err(|e| StorageError::DatabaseError(e.to_string()))?
        {
            Some(bytes) => {
                let block = bincode::deserialize(&bytes)
                    .map_err(|e| StorageError::SerializationError(e.to_string()))?;
                Ok(Some(block))
            }
            None => Ok(None),
        }
    }

    /// Get a block with its transaction bodies resolved
    pub fn get_full_block(&self, hash: &Hash) -> StorageResult<Option<FullBlock>> {
        let block = match self.get_block(hash)? {
            Some(block) => block,
            None => return Ok(None),
        };

        let mut txs = Vec::with_capacity(block.txs.len());
        for id in &block.txs {
            match self.get_tx(id)? {
                Some(tx) => txs.push(tx),
                None => {
                    return Err(StorageError::Corruption(format!(
                        "block {} references missing tx {}",
                        hash, id
                    )))
                }
            }
        }

        Ok(Some(FullBlock { block, txs }))
    }

    pub fn has_block(&self, hash: &Hash) -> StorageResult<bool> {
        let cf = self.cf(ColumnFamily::Blocks)?;
        Ok(self
            .db
            .get_cf(cf, hash.as_bytes())
            .map_err(|e| StorageError::DatabaseError(e.to_string()))?
            .is_some())
    }

    // ==================== TRANSACTION OPERATIONS ====================

    /// Store transaction bodies (each written at most once per id)
    pub fn put_txs(&self, txs: &[Transaction]) -> StorageResult<()> {
        let cf = self.cf(ColumnFamily::Transactions)?;
        let mut batch = WriteBatch::default();

        for tx in txs {
            if self.has_tx(&tx.id)? {
                continue;
            }
            let bytes = bincode::serialize(tx)
                .map_err(|e| StorageError::SerializationError(e.to_string()))?;
            batch.put_cf(cf, tx.id.as_bytes(), &bytes);
        }

        self.db
            .write(batch)
            .map_err(|e| StorageError::DatabaseError(e.to_string()))
    }

    /// Get a transaction by id
    pub fn get_tx(&self, id: &Hash) -> StorageResult<Option<Transaction>> {
        let cf = self.cf(ColumnFamily::Transactions)?;

        match self
            .db
            .get_cf(cf, id.as_bytes())
            .map_err(|e| StorageError::DatabaseError(e.to_string()))?
        {
            Some(bytes) => {
                let tx = bincode::deserialize(&bytes)
                    .map_err(|e| StorageError::SerializationError(e.to_string()))?;
                Ok(Some(tx))
            }
            None => Ok(None),
        }
    }

    pub fn has_tx(&self, id: &Hash) -> StorageResult<bool> {
        let cf = self.cf(ColumnFamily::Transactions)?;
        Ok(self
            .db
            .get_cf(cf, id.as_bytes())
            .map_err(|e| StorageError::DatabaseError(e.to_string()))?
            .is_some())
    }

    // ==================== CHAIN INDEX ====================

    /// Persist the node's hash list (newest first)
    pub fn put_hash_list(&self, hash_list: &[Hash]) -> StorageResult<()> {
        let bytes = bincode::serialize(hash_list)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        let cf = self.cf(ColumnFamily::Meta)?;
        self.db
            .put_cf(cf, HASH_LIST_KEY.as_bytes(), bytes)
            .map_err(|e| StorageError::DatabaseError(e.to_string()))
    }

    /// Load the persisted hash list, if the node has one
    pub fn get_hash_list(&self) -> StorageResult<Option<Vec<Hash>>> {
        let cf = self.cf(ColumnFamily::Meta)?;

        match self
            .db
            .get_cf(cf, HASH_LIST_KEY.as_bytes())
            .map_err(|e| StorageError::DatabaseError(e.to_string()))?
        {
            Some(bytes) => {
                let hash_list = bincode::deserialize(&bytes)
                    .map_err(|e| StorageError::SerializationError(e.to_string()))?;
                Ok(Some(hash_list))
            }
            None => Ok(None),
        }
    }

    // ==================== PRUNING ====================

    /// Prune block bodies deeper than the configured window below the tip
    ///
    /// The hash list indexes newest first, so the prune set is its tail.
    /// Genesis is always retained.
    pub fn prune(&self, hash_list: &[Hash]) -> StorageResult<u64> {
        let keep = match self.config.pruning_mode {
            PruningMode::Archive => {
                tracing::debug!("archive mode: skipping pruning");
                return Ok(0);
            }
            PruningMode::Pruned { keep_blocks } => keep_blocks as usize,
        };

        let mut pruned = 0u64;
        let cf = self.cf(ColumnFamily::Blocks)?;
        let prunable = &hash_list[keep.min(hash_list.len())..];
        for hash in prunable.iter().take(prunable.len().saturating_sub(1)) {
            if self.db.delete_cf(cf, hash.as_bytes()).is_ok() {
                pruned += 1;
            }
        }

        if pruned > 0 {
            tracing::info!("pruned {} block bodies", pruned);
        }
        Ok(pruned)
    }

    // ==================== UTILITY ====================

    /// Compact the database
    pub fn compact(&self) -> StorageResult<()> {
        for cf_type in ColumnFamily::all() {
            if let Ok(cf) = self.cf(cf_type) {
                self.db.compact_range_cf(cf, None::<&[u8]>, None::<&[u8]>);
            }
        }
        Ok(())
    }

    /// Number of stored transactions
    pub fn tx_count(&self) -> StorageResult<usize> {
        let cf = self.cf(ColumnFamily::Transactions)?;
        Ok(self.db.iterator_cf(cf, IteratorMode::Start).count())
    }

    fn cf(&self, cf_type: ColumnFamily) -> StorageResult<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(cf_type.as_str())
            .ok_or_else(|| StorageError::DatabaseError(format!("{} CF not found", cf_type.as_str())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use weave_core::{types::Winston, WalletList};
    use weave_crypto::{SignatureScheme, Wallet};

    fn create_test_store() -> (BlockStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = StoreConfig {
            path: temp_dir.path().to_str().unwrap().to_string(),
            ..Default::default()
        };
        let store = BlockStore::open(config).unwrap();
        (store, temp_dir)
    }

    fn genesis() -> Block {
        let wallet = Wallet::generate(SignatureScheme::Ed25519).unwrap();
        let wallets = WalletList::with_balances(vec![(
            wallet.address(),
            Winston::from_u64(10_000),
        )]);
        Block::genesis(wallets, 1)
    }

    #[test]
    fn test_store_retrieve_block() {
        let (store, _temp) = create_test_store();

        let block = genesis();
        store.put_block(&block).unwrap();

        let retrieved = store.get_block(&block.indep_hash).unwrap().unwrap();
        assert_eq!(retrieved.indep_hash, block.indep_hash);
        assert!(store.has_block(&block.indep_hash).unwrap());
        assert!(store.get_block(&Hash::zero()).unwrap().is_none());
    }

    #[test]
    fn test_full_block_round_trip() {
        let (store, _temp) = create_test_store();

        let wallet = Wallet::generate(SignatureScheme::Ed25519).unwrap();
        let mut tx = weave_core::Transaction::with_data(
            wallet.public_key().clone(),
            b"stored".to_vec(),
            Winston::from_u64(1),
            None,
        );
        tx.sign(&wallet).unwrap();

        let mut block = genesis();
        block.txs = vec![tx.id];
        block.indep_hash = block.compute_indep_hash();

        let full = FullBlock {
            block: block.clone(),
            txs: vec![tx.clone()],
        };
        store.put_full_block(&full).unwrap();

        let loaded = store.get_full_block(&block.indep_hash).unwrap().unwrap();
        assert_eq!(loaded.txs.len(), 1);
        assert_eq!(loaded.txs[0].id, tx.id);
        assert_eq!(store.get_tx(&tx.id).unwrap().unwrap().id, tx.id);
    }

    #[test]
    fn test_hash_list_round_trip() {
        let (store, _temp) = create_test_store();

        assert!(store.get_hash_list().unwrap().is_none());

        let block = genesis();
        let hash_list = vec![block.indep_hash];
        store.put_hash_list(&hash_list).unwrap();

        assert_eq!(store.get_hash_list().unwrap().unwrap(), hash_list);
    }

    #[test]
    fn test_put_block_is_write_once() {
        let (store, _temp) = create_test_store();

        let block = genesis();
        store.put_block(&block).unwrap();
        store.put_block(&block).unwrap();

        assert!(store.has_block(&block.indep_hash).unwrap());
    }
}
