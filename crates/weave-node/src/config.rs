// weave-node/src/config.rs

use crate::{NodeError, NodeResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use weave_core::{types::*, WalletList};
use weave_crypto::Address;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub data_dir: String,
    /// Start without a chain and join from peers
    pub join: bool,
    /// Restart the miner after every integrated block
    pub automine: bool,
    /// Artificial delay per nonce batch, for simulation
    pub mining_delay_ms: u64,
    /// Reward destination (hex address); `None` leaves rewards unclaimed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward_addr: Option<String>,
    pub mempool_size: usize,
    pub genesis: GenesisConfig,
    pub net: NetConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisConfig {
    /// Starting difficulty (leading zero bits)
    pub diff: Difficulty,
    /// Initial allocations
    pub allocations: Vec<GenesisAlloc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisAlloc {
    /// Hex wallet address
    pub address: String,
    /// Balance in winston
    pub balance: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetConfig {
    /// Peer RPC timeout
    pub net_timeout_ms: u64,
    /// Back-off between join polling rounds
    pub rejoin_timeout_ms: u64,
    /// Interval between periodic tip polls
    pub poll_time_ms: u64,
    /// Simulated gossip loss probability (0.0 disables)
    pub gossip_loss: f64,
    /// Simulated gossip delivery delay (0 disables)
    pub gossip_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub cache_size_mb: usize,
    pub max_open_files: i32,
    /// "archive" or "pruned"
    pub pruning: String,
    pub keep_blocks: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".into(),
            join: false,
            automine: false,
            mining_delay_ms: 0,
            reward_addr: None,
            mempool_size: 10_000,
            genesis: GenesisConfig {
                diff: DEFAULT_DIFF,
                allocations: vec![],
            },
            net: NetConfig {
                net_timeout_ms: 5_000,
                rejoin_timeout_ms: 3_000,
                poll_time_ms: 10_000,
                gossip_loss: 0.0,
                gossip_delay_ms: 0,
            },
            storage: StorageConfig {
                cache_size_mb: 256,
                max_open_files: 1024,
                pruning: "archive".into(),
                keep_blocks: 5_000,
            },
        }
    }
}

impl NodeConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Parsed reward address
    pub fn reward_address(&self) -> NodeResult<Option<Address>> {
        match &self.reward_addr {
            Some(hex) => Ok(Some(Address::from_hex(hex).map_err(|e| {
                NodeError::Config(format!("bad reward address: {e}"))
            })?)),
            None => Ok(None),
        }
    }

    /// The genesis ledger from the configured allocations
    pub fn genesis_wallets(&self) -> NodeResult<WalletList> {
        let mut balances = Vec::with_capacity(self.genesis.allocations.len());
        for alloc in &self.genesis.allocations {
            let address = Address::from_hex(&alloc.address).map_err(|e| {
                NodeError::Config(format!("bad genesis address {}: {e}", alloc.address))
            })?;
            balances.push((address, Winston::from_u64(alloc.balance)));
        }
        Ok(WalletList::with_balances(balances))
    }

    pub fn net_timeout(&self) -> Duration {
        Duration::from_millis(self.net.net_timeout_ms)
    }

    pub fn rejoin_timeout(&self) -> Duration {
        Duration::from_millis(self.net.rejoin_timeout_ms)
    }

    pub fn poll_time(&self) -> Duration {
        Duration::from_millis(self.net.poll_time_ms)
    }

    pub fn mining_delay(&self) -> Duration {
        Duration::from_millis(self.mining_delay_ms)
    }

    /// The store configuration this node opens
    pub fn store_config(&self) -> weave_store::StoreConfig {
        let pruning_mode = if self.storage.pruning == "pruned" {
            weave_store::PruningMode::Pruned {
                keep_blocks: self.storage.keep_blocks,
            }
        } else {
            weave_store::PruningMode::Archive
        };

        weave_store::StoreConfig {
            path: format!("{}/db", self.data_dir),
            create_if_missing: true,
            max_open_files: self.storage.max_open_files,
            cache_size: self.storage.cache_size_mb * 1024 * 1024,
            pruning_mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default();
        assert!(!config.join);
        assert!(!config.automine);
        assert_eq!(config.genesis.diff, DEFAULT_DIFF);
        assert!(config.reward_address().unwrap().is_none());
        assert!(config.genesis_wallets().unwrap().is_empty());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = NodeConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: NodeConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.data_dir, config.data_dir);
        assert_eq!(parsed.net.net_timeout_ms, config.net.net_timeout_ms);
    }

    #[test]
    fn test_genesis_allocations_parse() {
        let mut config = NodeConfig::default();
        config.genesis.allocations.push(GenesisAlloc {
            address: Address::zero().to_hex(),
            balance: 10_000,
        });

        let wallets = config.genesis_wallets().unwrap();
        assert_eq!(
            wallets.balance(&Address::zero()),
            Winston::from_u64(10_000)
        );
    }
}
