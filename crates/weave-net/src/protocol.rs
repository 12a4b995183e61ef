// weave-net/src/protocol.rs

use crate::{gossip::GossipItem, peer::PeerId};
use serde::{Deserialize, Serialize};
use weave_core::{FullBlock, Height, Transaction};
use weave_crypto::Hash;

/// Gossip messages
///
/// Both variants carry full bodies; recipients re-derive ids before trusting
/// them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GossipData {
    /// A freshly accepted block with its recall block
    NewBlock {
        from: PeerId,
        height: Height,
        block: FullBlock,
        recall: FullBlock,
    },
    /// A transaction for the mempool
    AddTx { tx: Transaction },
}

impl GossipItem for GossipData {
    fn digest(&self) -> Hash {
        match self {
            GossipData::NewBlock { block, .. } => block.block.indep_hash,
            GossipData::AddTx { tx } => tx.id,
        }
    }
}

/// Result of asking a peer for a block
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResult<T> {
    /// The peer returned the requested item
    Found(T),
    /// The peer answered but does not hold the item
    NotFound,
    /// The peer did not answer within the timeout
    NoResponse,
}

impl<T> FetchResult<T> {
    pub fn found(self) -> Option<T> {
        match self {
            FetchResult::Found(item) => Some(item),
            _ => None,
        }
    }

    pub fn is_no_response(&self) -> bool {
        matches!(self, FetchResult::NoResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_result_found() {
        let r: FetchResult<u32> = FetchResult::Found(7);
        assert_eq!(r.found(), Some(7));

        let r: FetchResult<u32> = FetchResult::NotFound;
        assert_eq!(r.clone().found(), None);
        assert!(!r.is_no_response());

        let r: FetchResult<u32> = FetchResult::NoResponse;
        assert!(r.is_no_response());
    }
}
