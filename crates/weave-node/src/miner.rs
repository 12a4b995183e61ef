// weave-node/src/miner.rs

use crate::server::NodeMessage;
use std::time::Duration;
use tokio::sync::mpsc;
use weave_core::{block, tx::Transaction, types::Difficulty};
use weave_crypto::Hash;

/// Nonce attempts between command checks
const NONCE_BATCH: usize = 64;

/// A completed proof of work, reported back to the node server
#[derive(Debug, Clone)]
pub struct MinedWork {
    pub txs: Vec<Transaction>,
    /// The tip PoW hash the search ran against
    pub prev_pow: Hash,
    /// The found PoW hash
    pub hash: Hash,
    pub diff: Difficulty,
    pub nonce: Vec<u8>,
}

/// Commands the node server sends a running miner
#[derive(Debug)]
pub enum MinerCmd {
    /// Swap in a new data segment and candidate set atomically between
    /// attempts
    ChangeData {
        segment: Vec<u8>,
        txs: Vec<Transaction>,
    },
    Stop,
}

/// Handle to a running miner worker
pub struct MinerHandle {
    cmd: mpsc::Sender<MinerCmd>,
}

impl MinerHandle {
    /// Replace the miner's data segment and candidate transactions
    pub fn change_data(&self, segment: Vec<u8>, txs: Vec<Transaction>) {
        let _ = self.cmd.try_send(MinerCmd::ChangeData { segment, txs });
    }

    /// Cancel the search; safe to call more than once
    pub fn stop(&self) {
        let _ = self.cmd.try_send(MinerCmd::Stop);
    }
}

/// Spawn a miner over the given inputs
///
/// The worker samples fresh nonces until the PoW predicate holds, then sends
/// `WorkComplete` to its parent and exits. Commands are observed at every
/// batch boundary, so `change_data` and `stop` take effect promptly.
pub fn spawn_miner(
    prev_pow: Hash,
    diff: Difficulty,
    segment: Vec<u8>,
    txs: Vec<Transaction>,
    delay: Duration,
    parent: mpsc::Sender<NodeMessage>,
) -> MinerHandle {
    let (cmd_tx, mut cmd_rx) = mpsc::channel(16);

    tokio::spawn(async move {
        let mut segment = segment;
        let mut txs = txs;
        tracing::debug!(diff, "miner started");

        loop {
            while let Ok(cmd) = cmd_rx.try_recv() {
                match cmd {
                    MinerCmd::ChangeData {
                        segment: new_segment,
                        txs: new_txs,
                    } => {
                        segment = new_segment;
                        txs = new_txs;
                        tracing::debug!(txs = txs.len(), "miner data segment swapped");
                    }
                    MinerCmd::Stop => {
                        tracing::debug!("miner cancelled");
                        return;
                    }
                }
            }

            for _ in 0..NONCE_BATCH {
                let nonce: [u8; 32] = rand::random();
                let hash = block::pow_hash(&prev_pow, &segment, &nonce);
                if block::pow_satisfies(&hash, diff) {
                    tracing::debug!(%hash, diff, "proof of work found");
                    let work = MinedWork {
                        txs,
                        prev_pow,
                        hash,
                        diff,
                        nonce: nonce.to_vec(),
                    };
                    let _ = parent.send(NodeMessage::WorkComplete(work)).await;
                    return;
                }
            }

            if delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(delay).await;
            }
        }
    });

    MinerHandle { cmd: cmd_tx }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_miner_finds_work() {
        let (parent, mut rx) = mpsc::channel(8);
        let prev = Hash::zero();
        spawn_miner(prev, 1, b"segment".to_vec(), Vec::new(), Duration::ZERO, parent);

        let msg = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("miner should finish at difficulty 1")
            .expect("channel open");

        match msg {
            NodeMessage::WorkComplete(work) => {
                assert_eq!(work.prev_pow, prev);
                assert_eq!(work.diff, 1);
                let hash = block::pow_hash(&prev, b"segment", &work.nonce);
                assert_eq!(hash, work.hash);
                assert!(block::pow_satisfies(&hash, 1));
            }
            _ => panic!("unexpected message"),
        }
    }

    #[tokio::test]
    async fn test_miner_stop_is_idempotent() {
        let (parent, _rx) = mpsc::channel(8);
        // Difficulty 64 will not complete while we cancel
        let handle = spawn_miner(
            Hash::zero(),
            64,
            Vec::new(),
            Vec::new(),
            Duration::ZERO,
            parent,
        );

        handle.stop();
        handle.stop();
    }

    #[tokio::test]
    async fn test_change_data_rebinds_result() {
        let (parent, mut rx) = mpsc::channel(8);
        let handle = spawn_miner(
            Hash::zero(),
            64,
            b"old".to_vec(),
            Vec::new(),
            Duration::ZERO,
            parent,
        );

        // Unreachable difficulty, then swap to an instant one is not
        // possible (diff is fixed); instead verify the swap is accepted
        // without disturbing the worker.
        handle.change_data(b"new".to_vec(), Vec::new());
        handle.stop();
        assert!(rx.try_recv().is_err());
    }
}
