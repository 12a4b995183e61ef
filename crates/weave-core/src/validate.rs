// weave-core/src/validate.rs

use crate::{
    block::{self, Block, FullBlock},
    retarget, tx, CoreError, CoreResult,
};

/// Validate a proposed block against its predecessor and resolved recall block
///
/// This is the single validation path for every accepted block, whether it
/// arrived over gossip, came back from the local miner, or is being replayed
/// during fork recovery.
pub fn validate_block(proposed: &FullBlock, prev: &Block, recall: &Block) -> CoreResult<()> {
    let b = &proposed.block;

    // Structure: the block extends its predecessor's ancestry by one
    if b.height != prev.height + 1 {
        return Err(invalid("height does not extend predecessor"));
    }
    if b.prev_hash != prev.indep_hash {
        return Err(invalid("prev_hash mismatch"));
    }
    if b.hash_list.len() as u64 != b.height {
        return Err(invalid("hash list length differs from height"));
    }
    if b.hash_list[0] != prev.indep_hash || b.hash_list[1..] != prev.hash_list[..] {
        return Err(invalid("hash list does not extend predecessor ancestry"));
    }

    // Identity: the carried independent hash and tx ids must re-derive
    if b.indep_hash != b.compute_indep_hash() {
        return Err(invalid("independent hash does not re-derive"));
    }
    if !proposed.ids_match() {
        return Err(invalid("tx ids do not match carried bodies"));
    }

    // Recall: the supplied recall block must sit at the selected index
    let recall_height = block::recall_height(&prev.indep_hash, prev.height);
    let expected_recall = b.hash_list[(b.height - 1 - recall_height) as usize];
    if recall.indep_hash != expected_recall {
        return Err(invalid("recall block not at the selected index"));
    }

    // Transactions: order-sensitive verification against the running ledger
    tx::verify_list(&proposed.txs, b.diff, &prev.wallet_list)?;

    // Ledger: replay must reproduce the carried wallet list
    let expected_wallets = prev
        .wallet_list
        .apply_txs(&proposed.txs)
        .apply_mining_reward(b.reward_addr, &proposed.txs, b.height);
    if b.wallet_list != expected_wallets {
        return Err(invalid("wallet list does not replay"));
    }
    if !b.wallet_list.all_positive() {
        return Err(invalid("wallet list carries a non-positive balance"));
    }

    // Proof of work over the data segment
    let segment = block::data_segment(&proposed.txs, recall, b.reward_addr);
    let pow = block::pow_hash(&prev.hash, &segment, &b.nonce);
    if pow != b.hash {
        return Err(invalid("proof-of-work hash does not re-derive"));
    }
    if !block::pow_satisfies(&pow, b.diff) {
        return Err(invalid("proof-of-work below difficulty"));
    }

    // Difficulty schedule
    if !retarget::retarget_ok(b, prev) {
        return Err(invalid("retarget rule violated"));
    }

    // Weave accounting
    let block_size: u64 = proposed.txs.iter().map(|t| t.data_size()).sum();
    if b.block_size != block_size || b.weave_size != prev.weave_size + block_size {
        return Err(invalid("weave size accounting mismatch"));
    }

    Ok(())
}

fn invalid(reason: &str) -> CoreError {
    CoreError::InvalidBlock(reason.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ledger::WalletList,
        retarget::maybe_retarget,
        tx::Transaction,
        types::*,
    };
    use weave_crypto::{Address, Hash, SignatureScheme, Wallet};

    /// Mine a successor of `prev` in-process (difficulty 1 terminates fast)
    fn mine_on(prev: &Block, recall: &Block, txs: Vec<Transaction>) -> FullBlock {
        let timestamp = prev.timestamp + TARGET_TIME;
        let (diff, last_retarget) =
            maybe_retarget(prev.height + 1, timestamp, prev.diff, prev.last_retarget);
        let segment = block::data_segment(&txs, recall, None);

        let mut nonce = 0u64;
        let hash = loop {
            let candidate = block::pow_hash(&prev.hash, &segment, &nonce.to_be_bytes());
            if block::pow_satisfies(&candidate, diff) {
                break candidate;
            }
            nonce += 1;
        };

        let wallet_list = prev
            .wallet_list
            .apply_txs(&txs)
            .apply_mining_reward(None, &txs, prev.height + 1);

        FullBlock::assemble(
            prev,
            txs,
            wallet_list,
            nonce.to_be_bytes().to_vec(),
            hash,
            diff,
            timestamp,
            last_retarget,
            None,
        )
    }

    fn funded_genesis() -> (Wallet, Block) {
        let wallet = Wallet::generate(SignatureScheme::Ed25519).unwrap();
        let wallets = WalletList::with_balances(vec![(
            wallet.address(),
            Winston::from_u64(10_000),
        )]);
        (wallet, Block::genesis(wallets, 1))
    }

    #[test]
    fn test_valid_block_accepted() {
        let (wallet, genesis) = funded_genesis();
        let target = Wallet::generate(SignatureScheme::Ed25519).unwrap().address();

        let mut tx = Transaction::transfer(
            wallet.public_key().clone(),
            target,
            Winston::from_u64(100),
            Winston::from_u64(1),
            None,
        );
        tx.sign(&wallet).unwrap();

        let b1 = mine_on(&genesis, &genesis, vec![tx]);
        assert!(validate_block(&b1, &genesis, &genesis).is_ok());
    }

    #[test]
    fn test_mutated_pow_hash_rejected() {
        let (_, genesis) = funded_genesis();
        let mut b1 = mine_on(&genesis, &genesis, Vec::new());
        b1.block.hash = Hash::zero();
        b1.block.indep_hash = b1.block.compute_indep_hash();

        assert!(validate_block(&b1, &genesis, &genesis).is_err());
    }

    #[test]
    fn test_mutated_wallet_list_rejected() {
        let (_, genesis) = funded_genesis();
        let mut b1 = mine_on(&genesis, &genesis, Vec::new());
        b1.block.wallet_list = WalletList::with_balances(vec![(
            Address::zero(),
            Winston::from_u64(1),
        )]);
        b1.block.indep_hash = b1.block.compute_indep_hash();

        assert!(validate_block(&b1, &genesis, &genesis).is_err());
    }

    #[test]
    fn test_stale_indep_hash_rejected() {
        let (_, genesis) = funded_genesis();
        let mut b1 = mine_on(&genesis, &genesis, Vec::new());
        b1.block.timestamp += 1;

        assert!(validate_block(&b1, &genesis, &genesis).is_err());
    }

    #[test]
    fn test_wrong_recall_block_rejected() {
        let (_, genesis) = funded_genesis();
        let b1 = mine_on(&genesis, &genesis, Vec::new());
        assert!(validate_block(&b1, &genesis, &genesis).is_ok());

        // Mining on b1 recalls genesis (the only ancestor); supplying b1
        // itself as the recall block must fail
        assert_eq!(b1.block.recall_hash(), genesis.indep_hash);
        let b2 = mine_on(&b1.block, &genesis, Vec::new());
        assert!(validate_block(&b2, &b1.block, &b1.block).is_err());
    }

    #[test]
    fn test_replayed_tx_rejected() {
        let (wallet, genesis) = funded_genesis();
        let target = Wallet::generate(SignatureScheme::Ed25519).unwrap().address();

        let mut tx = Transaction::transfer(
            wallet.public_key().clone(),
            target,
            Winston::from_u64(100),
            Winston::from_u64(1),
            None,
        );
        tx.sign(&wallet).unwrap();

        let b1 = mine_on(&genesis, &genesis, vec![tx.clone()]);
        assert!(validate_block(&b1, &genesis, &genesis).is_ok());

        // The same transaction in the next block no longer threads
        let b2 = mine_on(&b1.block, &genesis, vec![tx]);
        assert!(validate_block(&b2, &b1.block, &genesis).is_err());
    }
}
