// weave-core/src/ledger.rs

use crate::{tx::Transaction, types::*};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use weave_crypto::{Address, Hash};

/// A single wallet: balance plus the id of the last transaction that
/// mutated it (`None` for never-used wallets)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletEntry {
    pub balance: Winston,
    pub last_tx: Option<Hash>,
}

impl WalletEntry {
    pub fn new(balance: Winston) -> Self {
        Self {
            balance,
            last_tx: None,
        }
    }
}

/// The replicated ledger: one entry per funded address
///
/// Entries are keyed (and therefore canonically ordered) by address, and
/// zero-balance entries are removed whenever a transaction list is applied,
/// so two wallet lists compare equal iff the ledgers agree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletList(BTreeMap<Address, WalletEntry>);

impl WalletList {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Create a ledger from initial allocations
    pub fn with_balances(balances: Vec<(Address, Winston)>) -> Self {
        let mut map = BTreeMap::new();
        for (address, balance) in balances {
            if !balance.is_zero() {
                map.insert(address, WalletEntry::new(balance));
            }
        }
        Self(map)
    }

    pub fn get(&self, address: &Address) -> Option<&WalletEntry> {
        self.0.get(address)
    }

    /// Balance of an address, zero when absent
    pub fn balance(&self, address: &Address) -> Winston {
        self.0
            .get(address)
            .map(|entry| entry.balance.clone())
            .unwrap_or_else(Winston::zero)
    }

    /// Recorded last transaction id for an address
    pub fn last_tx(&self, address: &Address) -> Option<Hash> {
        self.0.get(address).and_then(|entry| entry.last_tx)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Address, &WalletEntry)> {
        self.0.iter()
    }

    /// Whether every entry holds a strictly positive balance
    pub fn all_positive(&self) -> bool {
        self.0.values().all(|entry| !entry.balance.is_zero())
    }

    /// Apply an ordered transaction list, yielding the successor ledger
    ///
    /// Transactions that cannot apply (unknown sender, broken last_tx
    /// thread, insufficient funds) are skipped with a log line; block
    /// validation rejects them before this point on the consensus path.
    pub fn apply_txs(&self, txs: &[Transaction]) -> WalletList {
        let mut next = self.clone();
        for tx in txs {
            next.apply_tx(tx);
        }
        next.filter_empty();
        next
    }

    /// Apply a single transaction in place, without zero filtering
    pub fn apply_tx(&mut self, tx: &Transaction) {
        let sender = match tx.sender() {
            Some(sender) => sender,
            None => {
                tracing::warn!(id = %tx.id, "skipping system tx in ledger reducer");
                return;
            }
        };

        let spend = if tx.target.is_some() {
            match tx.quantity.checked_add(&tx.reward) {
                Some(spend) => spend,
                None => return,
            }
        } else {
            tx.reward.clone()
        };

        let debited = match self.0.get_mut(&sender) {
            Some(entry) if entry.last_tx == tx.last_tx => {
                match entry.balance.checked_sub(&spend) {
                    Some(balance) => {
                        entry.balance = balance;
                        entry.last_tx = Some(tx.id);
                        true
                    }
                    None => false,
                }
            }
            _ => false,
        };
        if !debited {
            tracing::warn!(id = %tx.id, sender = %sender, "skipping unapplicable tx");
            return;
        }

        if let Some(target) = tx.target {
            let entry = self
                .0
                .entry(target)
                .or_insert_with(|| WalletEntry::new(Winston::zero()));
            entry.balance = entry
                .balance
                .checked_add(&tx.quantity)
                .unwrap_or_else(|| tx.quantity.clone());
        }
    }

    /// Credit the mining reward for a block at `height`
    ///
    /// An unclaimed reward address leaves the ledger unchanged (the reward
    /// is forfeited, transaction rewards included).
    pub fn apply_mining_reward(
        &self,
        reward_addr: Option<Address>,
        txs: &[Transaction],
        height: Height,
    ) -> WalletList {
        let reward_addr = match reward_addr {
            Some(addr) => addr,
            None => return self.clone(),
        };

        let mut total = Winston::from_u64(static_reward(height));
        for tx in txs {
            total = total + tx.reward.clone();
        }

        let mut next = self.clone();
        let entry = next
            .0
            .entry(reward_addr)
            .or_insert_with(|| WalletEntry::new(Winston::zero()));
        entry.balance = entry
            .balance
            .checked_add(&total)
            .unwrap_or_else(|| total.clone());
        next.filter_empty();
        next
    }

    fn filter_empty(&mut self) {
        self.0.retain(|_, entry| !entry.balance.is_zero());
    }
}

/// The emission schedule: an exponentially decaying per-block subsidy
///
/// `0.2 · GENESIS_TOKENS · 2^(−height/REWARD_DECAY_BLOCKS) · ln 2 /
/// REWARD_DECAY_BLOCKS`, truncated to whole winston.
pub fn static_reward(height: Height) -> u64 {
    let supply = GENESIS_TOKENS as f64 * WINSTON_PER_TOKEN as f64;
    let decay = (-(height as f64) / REWARD_DECAY_BLOCKS as f64).exp2();
    let reward = 0.2 * supply * decay * std::f64::consts::LN_2 / REWARD_DECAY_BLOCKS as f64;
    reward.trunc() as u64
}
