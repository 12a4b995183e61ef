// weave-node/src/recovery.rs

use crate::server::{NodeHandle, NodeMessage};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use weave_core::{types::*, validate, Block, FullBlock};
use weave_crypto::Hash;
use weave_net::FetchResult;
use weave_store::BlockStore;

/// Per-hash fetch retry budget
pub const FETCH_RETRIES: u32 = 5;

/// Join polling rounds before giving up
const JOIN_ROUNDS: u32 = 10;

/// Ways a recovery worker dies; the node clears the worker and retries later
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RecoveryError {
    #[error("block retrieval failed")]
    RetrievalFailed,

    #[error("fetched block failed validation")]
    BlockMalformed,

    #[error("target too far ahead of recoverable ancestry")]
    TooFarBehind,

    #[error("recovery walked back to genesis")]
    RecoveryToGenesis,
}

impl RecoveryError {
    /// Whether the node should clear its state and rejoin from peers
    pub fn requires_rejoin(&self) -> bool {
        matches!(
            self,
            RecoveryError::TooFarBehind | RecoveryError::RecoveryToGenesis
        )
    }
}

/// A target extension observed while recovering
pub struct TargetUpdate {
    pub block: Block,
    pub peer: Option<NodeHandle>,
}

/// Handle to a running fork-recovery or join worker
///
/// Superseded workers are simply abandoned: the node drops the handle and
/// length-checks whatever reply still arrives.
pub struct RecoveryHandle {
    update: mpsc::Sender<TargetUpdate>,
}

impl RecoveryHandle {
    /// Offer the worker a newer target block
    pub fn update_target(&self, block: Block, peer: Option<NodeHandle>) {
        let _ = self.update.try_send(TargetUpdate { block, peer });
    }
}

/// Spawn a worker that walks the target's ancestry back to the divergence
/// point and replays the missing blocks forward
///
/// `own_hash_list` is the node's full chain, newest first; `None` means the
/// node has not joined and the worker first adopts a peer's ancestry.
pub fn spawn_recovery(
    parent: mpsc::Sender<NodeMessage>,
    peers: Vec<NodeHandle>,
    target: Block,
    own_hash_list: Option<Vec<Hash>>,
    store: Arc<BlockStore>,
    rejoin_timeout: Duration,
) -> RecoveryHandle {
    let (update_tx, update_rx) = mpsc::channel(16);

    let worker = Worker {
        parent,
        peers,
        target,
        store,
        update_rx,
        rejoin_timeout,
    };
    tokio::spawn(worker.run(own_hash_list));

    RecoveryHandle { update: update_tx }
}

struct Worker {
    parent: mpsc::Sender<NodeMessage>,
    peers: Vec<NodeHandle>,
    target: Block,
    store: Arc<BlockStore>,
    update_rx: mpsc::Receiver<TargetUpdate>,
    rejoin_timeout: Duration,
}

enum StepError {
    /// The fetch produced a non-block; retry the hash
    Retry,
    Fatal(RecoveryError),
}

impl Worker {
    async fn run(mut self, own_hash_list: Option<Vec<Hash>>) {
        let base_oldest = match own_hash_list {
            Some(mut list) => {
                list.reverse();
                list
            }
            None => match self.join_base().await {
                Some(base) => base,
                None => return self.fail(RecoveryError::RetrievalFailed).await,
            },
        };

        let target_ancestry = {
            let mut ancestry = self.target.hash_list.clone();
            ancestry.reverse();
            ancestry
        };
        let common = common_prefix_len(&target_ancestry, &base_oldest);
        let mut schedule: VecDeque<Hash> = target_ancestry[common..].iter().copied().collect();
        schedule.push_back(self.target.indep_hash);

        tracing::info!(
            target = %self.target.indep_hash,
            target_height = self.target.height,
            divergent = schedule.len(),
            "fork recovery started"
        );

        // The shared prefix survives; divergent blocks replay on top of it
        let mut applied: Vec<Hash> = base_oldest[..common].to_vec();

        while let Some(next) = schedule.pop_front() {
            self.drain_target_updates(&mut schedule);

            match self.apply_one(next).await {
                Ok(()) => applied.push(next),
                Err(error) => return self.fail(error).await,
            }
        }

        applied.reverse();
        tracing::info!(height = applied.len(), "fork recovery complete");
        let _ = self
            .parent
            .send(NodeMessage::ForkRecovered { hash_list: applied })
            .await;
    }

    /// Join sub-state: poll peers for a current tip with back-off, adopt its
    /// ancestry as the base chain
    async fn join_base(&mut self) -> Option<Vec<Hash>> {
        for round in 0..JOIN_ROUNDS {
            for peer in self.peers.clone() {
                let full = match peer.get_current_block().await {
                    FetchResult::Found(full) => full,
                    _ => continue,
                };
                tracing::info!(
                    tip = %full.block.indep_hash,
                    height = full.block.height,
                    "joining on peer tip"
                );

                let _ = self.store.put_full_block(&full);
                // The tip's own recall block is what mining on it will need
                let recall_hash = full.block.recall_hash();
                if let Some(recall) = self.fetch_full_block(&recall_hash).await {
                    let _ = self.store.put_full_block(&recall);
                }

                // A polled tip extending the target branch becomes the target
                if on_same_branch(&self.target, &full.block) {
                    self.target = full.block.clone();
                }

                let mut base = full.block.hash_list.clone();
                base.reverse();
                base.push(full.block.indep_hash);
                return Some(base);
            }
            tracing::debug!(round, "join poll round failed; backing off");
            tokio::time::sleep(self.rejoin_timeout).await;
        }
        None
    }

    /// Accept target extensions that stay on the current target's branch
    fn drain_target_updates(&mut self, schedule: &mut VecDeque<Hash>) {
        while let Ok(update) = self.update_rx.try_recv() {
            if !on_same_branch(&self.target, &update.block) {
                tracing::debug!(
                    offered = %update.block.indep_hash,
                    "ignoring target update from another branch"
                );
                continue;
            }

            let chain = chain_oldest_first(&update.block);
            let position = chain
                .iter()
                .position(|hash| *hash == self.target.indep_hash)
                .unwrap_or(chain.len() - 1);
            for hash in &chain[position + 1..] {
                schedule.push_back(*hash);
            }

            tracing::info!(
                target = %update.block.indep_hash,
                height = update.block.height,
                "recovery target extended"
            );
            self.target = update.block;
            if let Some(peer) = update.peer {
                if !self.peers.iter().any(|p| p.id() == peer.id()) {
                    self.peers.push(peer);
                }
            }
        }
    }

    /// Fetch, validate and persist one scheduled block
    async fn apply_one(&mut self, next: Hash) -> Result<(), RecoveryError> {
        let mut attempts = 0u32;
        loop {
            match self.try_apply(next).await {
                Ok(()) => return Ok(()),
                Err(StepError::Fatal(error)) => return Err(error),
                Err(StepError::Retry) => {
                    attempts += 1;
                    if attempts > FETCH_RETRIES {
                        return Err(RecoveryError::RetrievalFailed);
                    }
                    tracing::debug!(hash = %next, attempts, "retrying block fetch");
                }
            }
        }
    }

    async fn try_apply(&mut self, next: Hash) -> Result<(), StepError> {
        let full = self
            .fetch_full_block(&next)
            .await
            .ok_or(StepError::Retry)?;

        // Height checks at entry: recovering to genesis and overlong forks
        // are both fatal
        if full.block.height == 0 {
            return Err(StepError::Fatal(RecoveryError::RecoveryToGenesis));
        }
        if self.target.height - full.block.height > STORE_BLOCKS_BEHIND_CURRENT {
            return Err(StepError::Fatal(RecoveryError::TooFarBehind));
        }

        let prev = self
            .fetch_block(&full.block.prev_hash)
            .await
            .ok_or(StepError::Retry)?;

        let recall = self
            .fetch_full_block(&prev.recall_hash())
            .await
            .ok_or(StepError::Retry)?;
        self.store
            .put_full_block(&recall)
            .map_err(|_| StepError::Retry)?;

        if let Err(error) = validate::validate_block(&full, &prev, &recall.block) {
            tracing::warn!(hash = %next, %error, "recovered block failed validation");
            return Err(StepError::Fatal(RecoveryError::BlockMalformed));
        }

        self.store
            .put_full_block(&full)
            .map_err(|_| StepError::Retry)?;
        tracing::debug!(hash = %next, height = full.block.height, "recovered block applied");
        Ok(())
    }

    async fn fetch_full_block(&self, hash: &Hash) -> Option<FullBlock> {
        if let Ok(Some(full)) = self.store.get_full_block(hash) {
            return Some(full);
        }
        for peer in &self.peers {
            if let FetchResult::Found(full) = peer.get_full_block(*hash).await {
                if full.block.indep_hash == *hash {
                    return Some(full);
                }
            }
        }
        None
    }

    async fn fetch_block(&self, hash: &Hash) -> Option<Block> {
        if let Ok(Some(block)) = self.store.get_block(hash) {
            return Some(block);
        }
        for peer in &self.peers {
            if let FetchResult::Found(block) = peer.get_block(*hash).await {
                if block.indep_hash == *hash {
                    return Some(block);
                }
            }
        }
        None
    }

    async fn fail(self, error: RecoveryError) {
        tracing::warn!(%error, "fork recovery failed");
        let _ = self
            .parent
            .send(NodeMessage::RecoveryFailed { error })
            .await;
    }
}

/// Whether `candidate` is the target itself or a descendant of it
fn on_same_branch(target: &Block, candidate: &Block) -> bool {
    candidate.indep_hash == target.indep_hash
        || candidate.hash_list.contains(&target.indep_hash)
}

/// A block's full chain, genesis first, tip last
fn chain_oldest_first(block: &Block) -> Vec<Hash> {
    let mut chain = block.hash_list.clone();
    chain.reverse();
    chain.push(block.indep_hash);
    chain
}

fn common_prefix_len(a: &[Hash], b: &[Hash]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}
