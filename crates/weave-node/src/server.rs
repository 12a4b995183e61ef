// weave-node/src/server.rs

use crate::{
    config::NodeConfig,
    miner::{spawn_miner, MinedWork, MinerHandle},
    recovery::{spawn_recovery, RecoveryError, RecoveryHandle},
    NodeError, NodeResult,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use weave_core::{block, retarget, types::*, validate, Block, FullBlock, Mempool, Transaction};
use weave_crypto::{Address, Hash};
use weave_net::{FetchResult, Gossip, GossipData, PeerId};
use weave_store::BlockStore;

/// Messages processed by the node server actor
pub enum NodeMessage {
    AddPeer {
        id: PeerId,
        handle: NodeHandle,
        ack: oneshot::Sender<()>,
    },
    /// Offer the current tip to every peer
    Announce,
    AddTx(Transaction),
    Mine,
    SetAutomine(bool),
    WorkComplete(MinedWork),
    ForkRecovered {
        hash_list: Vec<Hash>,
    },
    RecoveryFailed {
        error: RecoveryError,
    },
    GetInfo(oneshot::Sender<NodeInfo>),
    GetBalance {
        address: Address,
        reply: oneshot::Sender<Winston>,
    },
    GetLastTx {
        address: Address,
        reply: oneshot::Sender<Option<Hash>>,
    },
    GetCurrentBlock(oneshot::Sender<Option<FullBlock>>),
    GetBlock {
        hash: Hash,
        reply: oneshot::Sender<Option<Block>>,
    },
    GetFullBlock {
        hash: Hash,
        reply: oneshot::Sender<Option<FullBlock>>,
    },
    GetPeers(oneshot::Sender<Vec<PeerId>>),
    Stop,
}

/// A snapshot of observable node state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub joined: bool,
    pub height: Height,
    pub tip: Option<Hash>,
    pub mempool: usize,
    pub peers: usize,
}

/// The node server
pub struct Node;

impl Node {
    /// Start a node; must run inside a tokio runtime
    pub fn start(config: NodeConfig) -> NodeResult<NodeHandle> {
        std::fs::create_dir_all(&config.data_dir)
            .map_err(|e| NodeError::Config(format!("cannot create data dir: {e}")))?;
        let store = Arc::new(BlockStore::open(config.store_config())?);
        let reward_addr = config.reward_address()?;

        // Resume from the persisted chain index, or create genesis, or wait
        // to join
        let (hash_list, tip) = match store.get_hash_list()? {
            Some(list) if !list.is_empty() => {
                let tip = store.get_block(&list[0])?.ok_or_else(|| {
                    NodeError::Storage(weave_store::StorageError::Corruption(
                        "persisted hash list tip missing".into(),
                    ))
                })?;
                tracing::info!(height = tip.height, "resuming from persisted chain");
                (Some(list), Some(tip))
            }
            _ if config.join => (None, None),
            _ => {
                let genesis = Block::genesis(config.genesis_wallets()?, config.genesis.diff);
                store.put_block(&genesis)?;
                let list = vec![genesis.indep_hash];
                store.put_hash_list(&list)?;
                tracing::info!(hash = %genesis.indep_hash, "created genesis block");
                (Some(list), Some(genesis))
            }
        };

        let id = PeerId::random();
        let (msg_tx, msg_rx) = mpsc::channel(256);
        let (gossip_tx, gossip_rx) = mpsc::channel(256);

        let handle = NodeHandle {
            id,
            msg: msg_tx.clone(),
            gossip: gossip_tx,
            net_timeout: config.net_timeout(),
        };

        let gossip = if config.net.gossip_loss > 0.0 || config.net.gossip_delay_ms > 0 {
            Gossip::with_faults(
                Some(config.net.gossip_loss).filter(|l| *l > 0.0),
                Some(Duration::from_millis(config.net.gossip_delay_ms))
                    .filter(|d| !d.is_zero()),
            )
        } else {
            Gossip::new()
        };

        let state = NodeState {
            id,
            store,
            hash_list,
            tip,
            mempool: Mempool::new(config.mempool_size),
            gossip,
            peers: Vec::new(),
            miner: None,
            recovery: None,
            automine: config.automine,
            reward_addr,
            mining_delay: config.mining_delay(),
            rejoin_timeout: config.rejoin_timeout(),
            poll_time: config.poll_time(),
            self_sender: msg_tx,
        };
        tokio::spawn(state.run(msg_rx, gossip_rx));

        tracing::info!(node = %id, "node started");
        Ok(handle)
    }
}

/// Clonable handle to a running node: the request/reply surface and the
/// gossip inbox
#[derive(Clone)]
pub struct NodeHandle {
    id: PeerId,
    msg: mpsc::Sender<NodeMessage>,
    gossip: mpsc::Sender<GossipData>,
    net_timeout: Duration,
}

impl NodeHandle {
    pub fn id(&self) -> PeerId {
        self.id
    }

    /// The channel the gossip bus delivers into
    pub fn gossip_sender(&self) -> mpsc::Sender<GossipData> {
        self.gossip.clone()
    }

    /// Register `other` as a peer of this node; resolves once registered
    pub async fn add_peer(&self, other: &NodeHandle) -> NodeResult<()> {
        self.request(|ack| NodeMessage::AddPeer {
            id: other.id,
            handle: other.clone(),
            ack,
        })
        .await
    }

    /// Offer this node's tip to all of its peers
    pub async fn announce(&self) -> NodeResult<()> {
        self.send(NodeMessage::Announce).await
    }

    /// Submit a transaction to this node
    pub async fn add_tx(&self, tx: Transaction) -> NodeResult<()> {
        self.send(NodeMessage::AddTx(tx)).await
    }

    /// Start mining over the current mempool
    pub async fn mine(&self) -> NodeResult<()> {
        self.send(NodeMessage::Mine).await
    }

    pub async fn set_automine(&self, on: bool) -> NodeResult<()> {
        self.send(NodeMessage::SetAutomine(on)).await
    }

    pub async fn stop(&self) -> NodeResult<()> {
        self.send(NodeMessage::Stop).await
    }

    pub async fn info(&self) -> NodeResult<NodeInfo> {
        self.request(NodeMessage::GetInfo).await
    }

    /// Balance of an address at the node's tip
    pub async fn balance(&self, address: Address) -> NodeResult<Winston> {
        self.request(|reply| NodeMessage::GetBalance { address, reply })
            .await
    }

    /// The last transaction id recorded for an address, for threading
    pub async fn last_tx(&self, address: Address) -> NodeResult<Option<Hash>> {
        self.request(|reply| NodeMessage::GetLastTx { address, reply })
            .await
    }

    /// Push a block into this node's gossip inbox (`send_new_block`)
    pub async fn submit_block(
        &self,
        from: PeerId,
        block: FullBlock,
        recall: FullBlock,
    ) -> NodeResult<()> {
        let height = block.block.height;
        self.gossip
            .send(GossipData::NewBlock {
                from,
                height,
                block,
                recall,
            })
            .await
            .map_err(|_| NodeError::ChannelClosed)
    }

    // ---- peer RPC: bounded by the net timeout, absence of an answer is
    // ---- `NoResponse`, not an error

    pub async fn get_current_block(&self) -> FetchResult<FullBlock> {
        self.fetch(NodeMessage::GetCurrentBlock).await
    }

    pub async fn get_block(&self, hash: Hash) -> FetchResult<Block> {
        self.fetch(|reply| NodeMessage::GetBlock { hash, reply }).await
    }

    pub async fn get_full_block(&self, hash: Hash) -> FetchResult<FullBlock> {
        self.fetch(|reply| NodeMessage::GetFullBlock { hash, reply })
            .await
    }

    pub async fn get_peers(&self) -> FetchResult<Vec<PeerId>> {
        let (reply, rx) = oneshot::channel();
        if self.msg.send(NodeMessage::GetPeers(reply)).await.is_err() {
            return FetchResult::NoResponse;
        }
        match timeout(self.net_timeout, rx).await {
            Ok(Ok(peers)) => FetchResult::Found(peers),
            _ => FetchResult::NoResponse,
        }
    }

    async fn send(&self, msg: NodeMessage) -> NodeResult<()> {
        self.msg.send(msg).await.map_err(|_| NodeError::ChannelClosed)
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> NodeMessage,
    ) -> NodeResult<T> {
        let (reply, rx) = oneshot::channel();
        self.send(build(reply)).await?;
        rx.await.map_err(|_| NodeError::ChannelClosed)
    }

    async fn fetch<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Option<T>>) -> NodeMessage,
    ) -> FetchResult<T> {
        let (reply, rx) = oneshot::channel();
        if self.msg.send(build(reply)).await.is_err() {
            return FetchResult::NoResponse;
        }
        match timeout(self.net_timeout, rx).await {
            Ok(Ok(Some(item))) => FetchResult::Found(item),
            Ok(Ok(None)) => FetchResult::NotFound,
            _ => FetchResult::NoResponse,
        }
    }
}

/// All chain state, owned exclusively by the actor task
struct NodeState {
    id: PeerId,
    store: Arc<BlockStore>,
    /// Full own chain, newest first (tip included); `None` until joined
    hash_list: Option<Vec<Hash>>,
    /// Cached tip block; `None` until joined
    tip: Option<Block>,
    mempool: Mempool,
    gossip: Gossip<GossipData>,
    peers: Vec<NodeHandle>,
    miner: Option<MinerHandle>,
    recovery: Option<RecoveryHandle>,
    automine: bool,
    reward_addr: Option<Address>,
    mining_delay: Duration,
    rejoin_timeout: Duration,
    poll_time: Duration,
    self_sender: mpsc::Sender<NodeMessage>,
}

impl NodeState {
    async fn run(
        mut self,
        mut msg_rx: mpsc::Receiver<NodeMessage>,
        mut gossip_rx: mpsc::Receiver<GossipData>,
    ) {
        let mut poll = tokio::time::interval(self.poll_time);
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        poll.tick().await;

        if self.automine && self.tip.is_some() {
            self.start_miner().await;
        }

        loop {
            tokio::select! {
                maybe = msg_rx.recv() => match maybe {
                    Some(msg) => {
                        if !self.handle_message(msg).await {
                            break;
                        }
                    }
                    None => break,
                },
                maybe = gossip_rx.recv() => {
                    if let Some(data) = maybe {
                        self.handle_gossip(data).await;
                    }
                }
                _ = poll.tick() => self.poll_tip().await,
            }
        }

        if let Some(miner) = self.miner.take() {
            miner.stop();
        }
        tracing::debug!(node = %self.id, "node stopped");
    }

    async fn handle_message(&mut self, msg: NodeMessage) -> bool {
        match msg {
            NodeMessage::AddPeer { id, handle, ack } => {
                self.gossip.add_peer(id, handle.gossip_sender());
                self.peers.retain(|p| p.id() != id);
                self.peers.push(handle);
                tracing::debug!(peer = %id, peers = self.peers.len(), "peer added");
                let _ = ack.send(());
            }
            NodeMessage::Announce => {
                for peer in self.gossip.peer_ids() {
                    self.announce_tip(peer).await;
                }
            }
            NodeMessage::AddTx(tx) => self.handle_add_tx(tx).await,
            NodeMessage::Mine => self.start_miner().await,
            NodeMessage::SetAutomine(on) => {
                self.automine = on;
                if on && self.miner.is_none() && self.tip.is_some() {
                    self.start_miner().await;
                }
            }
            NodeMessage::WorkComplete(work) => self.handle_work_complete(work).await,
            NodeMessage::ForkRecovered { hash_list } => {
                self.handle_fork_recovered(hash_list).await
            }
            NodeMessage::RecoveryFailed { error } => {
                self.recovery = None;
                if error.requires_rejoin() {
                    self.rejoin();
                }
            }
            NodeMessage::GetInfo(reply) => {
                let _ = reply.send(self.info());
            }
            NodeMessage::GetBalance { address, reply } => {
                let balance = self
                    .tip
                    .as_ref()
                    .map(|tip| tip.wallet_list.balance(&address))
                    .unwrap_or_else(Winston::zero);
                let _ = reply.send(balance);
            }
            NodeMessage::GetLastTx { address, reply } => {
                let last = self
                    .tip
                    .as_ref()
                    .and_then(|tip| tip.wallet_list.last_tx(&address));
                let _ = reply.send(last);
            }
            NodeMessage::GetCurrentBlock(reply) => {
                let full = self
                    .tip
                    .as_ref()
                    .and_then(|tip| self.store.get_full_block(&tip.indep_hash).ok().flatten());
                let _ = reply.send(full);
            }
            NodeMessage::GetBlock { hash, reply } => {
                let _ = reply.send(self.store.get_block(&hash).ok().flatten());
            }
            NodeMessage::GetFullBlock { hash, reply } => {
                let _ = reply.send(self.store.get_full_block(&hash).ok().flatten());
            }
            NodeMessage::GetPeers(reply) => {
                let _ = reply.send(self.gossip.peer_ids());
            }
            NodeMessage::Stop => return false,
        }
        true
    }

    async fn handle_gossip(&mut self, data: GossipData) {
        match data {
            GossipData::AddTx { tx } => self.handle_add_tx(tx).await,
            GossipData::NewBlock {
                from,
                height: _,
                block,
                recall,
            } => self.handle_new_block(Some(from), block, Some(recall)).await,
        }
    }

    /// §4.7 `add_tx`: admit to the mempool unless already pending or on
    /// chain, then notify the miner and pass the transaction along
    async fn handle_add_tx(&mut self, tx: Transaction) {
        if !self.gossip.mark_seen(tx.id) {
            return;
        }
        let Some(tip) = self.tip.clone() else {
            return;
        };
        if self.mempool.contains(&tx.id) || self.store.has_tx(&tx.id).unwrap_or(false) {
            tracing::debug!(id = %tx.id, "ignoring known tx");
            return;
        }

        // Verify against the ledger with pending transactions applied, so a
        // sender can thread several transactions into one block
        let mut projected = tip.wallet_list.clone();
        for pending in self.mempool.txs() {
            projected.apply_tx(pending);
        }
        if let Err(reason) = tx.verify(tip.diff, &projected) {
            tracing::warn!(id = %tx.id, %reason, "dropping invalid tx");
            return;
        }

        if let Err(error) = self.mempool.add(tx.clone()) {
            tracing::warn!(id = %tx.id, %error, "mempool rejected tx");
            return;
        }
        tracing::debug!(id = %tx.id, pending = self.mempool.len(), "tx admitted");

        self.update_miner_data();
        self.gossip.forward(&GossipData::AddTx { tx }, None);
    }

    /// §4.7 `new_block`: the block-acceptance state machine
    async fn handle_new_block(
        &mut self,
        from: Option<PeerId>,
        full: FullBlock,
        recall: Option<FullBlock>,
    ) {
        if !self.gossip.mark_seen(full.block.indep_hash) {
            return;
        }

        let h_own = self.tip.as_ref().map(|tip| tip.height);
        if let Some(h_own) = h_own {
            if full.block.height <= h_own {
                tracing::debug!(height = full.block.height, h_own, "dropping stale block");
                return;
            }
        }

        // A running worker absorbs further targets instead of being replaced
        if let Some(recovery) = &self.recovery {
            recovery.update_target(full.block, self.peer_handle(from));
            return;
        }

        match h_own {
            None => self.spawn_worker(from, full.block, None),
            Some(h_own) if full.block.height == h_own + 1 => {
                self.try_accept(from, full, recall).await
            }
            Some(_) => {
                let own = self.hash_list.clone();
                self.spawn_worker(from, full.block, own);
            }
        }
    }

    /// Validate and integrate a direct successor of the tip
    async fn try_accept(
        &mut self,
        from: Option<PeerId>,
        full: FullBlock,
        recall: Option<FullBlock>,
    ) {
        let tip = match self.tip.clone() {
            Some(tip) => tip,
            None => return,
        };

        let recall_full = match recall {
            Some(recall) => recall,
            None => match self.store.get_full_block(&tip.recall_hash()).ok().flatten() {
                Some(recall) => recall,
                None => {
                    let own = self.hash_list.clone();
                    self.spawn_worker(from, full.block, own);
                    return;
                }
            },
        };

        match validate::validate_block(&full, &tip, &recall_full.block) {
            Ok(()) => {
                let height = full.block.height;
                self.integrate(full.clone(), recall_full.clone()).await;
                let msg = GossipData::NewBlock {
                    from: self.id,
                    height,
                    block: full,
                    recall: recall_full,
                };
                self.gossip.forward(&msg, from);
            }
            Err(error) => {
                // The sender may still be on a longer legitimate branch we
                // have not verified yet
                tracing::warn!(%error, "block failed validation; trying fork recovery");
                let own = self.hash_list.clone();
                self.spawn_worker(from, full.block, own);
            }
        }
    }

    /// §4.8: persist, advance the chain index, refresh mempool and miner
    async fn integrate(&mut self, full: FullBlock, recall: FullBlock) {
        if let Err(error) = self.store.put_full_block(&full) {
            tracing::error!(%error, "could not persist block; keeping old tip");
            return;
        }
        let _ = self.store.put_full_block(&recall);

        self.mempool.remove_included(&full.block.txs);

        let mut list = self.hash_list.take().unwrap_or_default();
        list.insert(0, full.block.indep_hash);
        let _ = self.store.put_hash_list(&list);
        let _ = self.store.prune(&list);
        self.hash_list = Some(list);
        self.tip = Some(full.block.clone());

        self.revalidate_mempool();

        tracing::info!(
            height = full.block.height,
            hash = %full.block.indep_hash,
            txs = full.txs.len(),
            "block integrated"
        );

        if let Some(miner) = self.miner.take() {
            miner.stop();
        }
        if self.automine {
            self.start_miner().await;
        }
    }

    /// §4.7 `work_complete`: assemble, validate locally, integrate and gossip
    async fn handle_work_complete(&mut self, work: MinedWork) {
        let tip = match self.tip.clone() {
            Some(tip) => tip,
            None => return,
        };
        if work.prev_pow != tip.hash {
            tracing::debug!("discarding stale proof of work");
            return;
        }
        self.miner = None;

        let timestamp = now_secs();
        let (diff, last_retarget) =
            retarget::maybe_retarget(tip.height + 1, timestamp, tip.diff, tip.last_retarget);
        let wallets = tip
            .wallet_list
            .apply_txs(&work.txs)
            .apply_mining_reward(self.reward_addr, &work.txs, tip.height + 1);
        let full = FullBlock::assemble(
            &tip,
            work.txs,
            wallets,
            work.nonce,
            work.hash,
            diff,
            timestamp,
            last_retarget,
            self.reward_addr,
        );

        let recall_full = match self.store.get_full_block(&tip.recall_hash()).ok().flatten() {
            Some(recall) => recall,
            None => {
                tracing::warn!("recall block missing; discarding mined block");
                return;
            }
        };

        match validate::validate_block(&full, &tip, &recall_full.block) {
            Ok(()) => {
                let height = full.block.height;
                self.integrate(full.clone(), recall_full.clone()).await;
                let msg = GossipData::NewBlock {
                    from: self.id,
                    height,
                    block: full,
                    recall: recall_full,
                };
                self.gossip.send(&msg, None);
            }
            Err(error) => {
                tracing::warn!(%error, "locally mined block failed validation; discarding");
                if self.automine {
                    self.start_miner().await;
                }
            }
        }
    }

    /// Adopt a recovered chain iff it is strictly longer than our own
    async fn handle_fork_recovered(&mut self, hash_list: Vec<Hash>) {
        self.recovery = None;

        let own_len = self.hash_list.as_ref().map_or(0, |list| list.len());
        if hash_list.len() <= own_len {
            tracing::debug!(
                recovered = hash_list.len(),
                own = own_len,
                "ignoring recovery result not longer than own chain"
            );
            return;
        }

        let tip = match self.store.get_block(&hash_list[0]).ok().flatten() {
            Some(tip) => tip,
            None => {
                tracing::warn!("recovered tip missing from store");
                return;
            }
        };

        let _ = self.store.put_hash_list(&hash_list);
        self.hash_list = Some(hash_list);
        self.tip = Some(tip.clone());
        self.drop_mined_txs();
        self.revalidate_mempool();

        tracing::info!(height = tip.height, hash = %tip.indep_hash, "adopted recovered chain");

        if let Some(miner) = self.miner.take() {
            miner.stop();
        }
        if self.automine {
            self.start_miner().await;
        }
    }

    /// §7 rejoin: clear state and return to not-joined
    fn rejoin(&mut self) {
        tracing::warn!("clearing state; node returns to not-joined");
        self.hash_list = None;
        self.tip = None;
        self.mempool.clear();
        if let Some(miner) = self.miner.take() {
            miner.stop();
        }
    }

    /// Periodic tip polling: treat a strictly higher peer tip like a
    /// received `new_block`
    async fn poll_tip(&mut self) {
        if self.recovery.is_some() || self.peers.is_empty() {
            return;
        }
        let peer = self.peers[rand::random::<usize>() % self.peers.len()].clone();
        if let FetchResult::Found(full) = peer.get_current_block().await {
            let higher = self
                .tip
                .as_ref()
                .map_or(true, |tip| full.block.height > tip.height);
            if higher {
                self.handle_new_block(Some(peer.id()), full, None).await;
            }
        }
    }

    /// Start (or restart) the miner over the current mempool
    async fn start_miner(&mut self) {
        let tip = match self.tip.clone() {
            Some(tip) => tip,
            None => {
                tracing::debug!("cannot mine before joining");
                return;
            }
        };
        if let Some(miner) = self.miner.take() {
            miner.stop();
        }

        let recall = match self.resolve_recall(&tip).await {
            Some(recall) => recall,
            None => {
                tracing::warn!("recall block unavailable; not mining");
                return;
            }
        };

        let timestamp = now_secs();
        let (diff, _) =
            retarget::maybe_retarget(tip.height + 1, timestamp, tip.diff, tip.last_retarget);
        let segment = block::data_segment(self.mempool.txs(), &recall, self.reward_addr);
        self.miner = Some(spawn_miner(
            tip.hash,
            diff,
            segment,
            self.mempool.txs().to_vec(),
            self.mining_delay,
            self.self_sender.clone(),
        ));
        tracing::info!(
            height = tip.height + 1,
            diff,
            txs = self.mempool.len(),
            "miner started"
        );
    }

    /// The recall block for mining on `tip`: local store first, peers second
    async fn resolve_recall(&self, tip: &Block) -> Option<Block> {
        let recall_hash = tip.recall_hash();
        if let Ok(Some(recall)) = self.store.get_block(&recall_hash) {
            return Some(recall);
        }
        for peer in &self.peers {
            if let FetchResult::Found(recall) = peer.get_block(recall_hash).await {
                if recall.indep_hash == recall_hash {
                    let _ = self.store.put_block(&recall);
                    return Some(recall);
                }
            }
        }
        None
    }

    /// Re-point a running miner at the current mempool
    fn update_miner_data(&mut self) {
        let (Some(miner), Some(tip)) = (&self.miner, &self.tip) else {
            return;
        };
        let Ok(Some(recall)) = self.store.get_block(&tip.recall_hash()) else {
            return;
        };
        let segment = block::data_segment(self.mempool.txs(), &recall, self.reward_addr);
        miner.change_data(segment, self.mempool.txs().to_vec());
    }

    /// Drop pending transactions that made it onto the adopted chain
    fn drop_mined_txs(&mut self) {
        let store = self.store.clone();
        self.mempool
            .retain(|tx| !store.has_tx(&tx.id).unwrap_or(false));
    }

    /// Re-verify the mempool against the new tip, threading pending
    /// transactions through a running ledger
    fn revalidate_mempool(&mut self) {
        let Some(tip) = self.tip.clone() else {
            return;
        };
        let mut running = tip.wallet_list.clone();
        self.mempool.retain(|tx| match tx.verify(tip.diff, &running) {
            Ok(()) => {
                running.apply_tx(tx);
                true
            }
            Err(reason) => {
                tracing::warn!(id = %tx.id, %reason, "dropping tx after integration");
                false
            }
        });
    }

    /// Offer our tip to a freshly added peer
    async fn announce_tip(&mut self, peer: PeerId) {
        let Some(tip) = self.tip.clone() else {
            return;
        };
        if tip.height == 0 {
            return;
        }
        let Ok(Some(full)) = self.store.get_full_block(&tip.indep_hash) else {
            return;
        };
        let Ok(Some(prev)) = self.store.get_block(&tip.prev_hash) else {
            return;
        };
        let Ok(Some(recall)) = self.store.get_full_block(&prev.recall_hash()) else {
            return;
        };
        let msg = GossipData::NewBlock {
            from: self.id,
            height: tip.height,
            block: full,
            recall,
        };
        self.gossip.send_to(peer, &msg);
    }

    fn spawn_worker(&mut self, from: Option<PeerId>, target: Block, own: Option<Vec<Hash>>) {
        let mut peers = self.peers.clone();
        if let Some(handle) = self.peer_handle(from) {
            // The sender goes first: it certainly holds the target
            peers.retain(|p| p.id() != handle.id());
            peers.insert(0, handle);
        }
        if peers.is_empty() {
            tracing::warn!("cannot recover without peers");
            return;
        }

        tracing::info!(
            target = %target.indep_hash,
            height = target.height,
            join = own.is_none(),
            "spawning recovery worker"
        );
        self.recovery = Some(spawn_recovery(
            self.self_sender.clone(),
            peers,
            target,
            own,
            self.store.clone(),
            self.rejoin_timeout,
        ));
    }

    fn peer_handle(&self, id: Option<PeerId>) -> Option<NodeHandle> {
        let id = id?;
        self.peers.iter().find(|p| p.id() == id).cloned()
    }

    fn info(&self) -> NodeInfo {
        NodeInfo {
            joined: self.tip.is_some(),
            height: self.tip.as_ref().map_or(0, |tip| tip.height),
            tip: self.tip.as_ref().map(|tip| tip.indep_hash),
            mempool: self.mempool.len(),
            peers: self.peers.len(),
        }
    }
}

fn now_secs() -> Timestamp {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> NodeConfig {
        let mut config = NodeConfig::default();
        config.data_dir = dir.path().to_str().unwrap().to_string();
        config.genesis.diff = 1;
        config.net.net_timeout_ms = 1_000;
        config.net.poll_time_ms = 60_000;
        config
    }

    #[tokio::test]
    async fn test_node_starts_at_genesis() {
        let dir = TempDir::new().unwrap();
        let handle = Node::start(test_config(&dir)).unwrap();

        let info = handle.info().await.unwrap();
        assert!(info.joined);
        assert_eq!(info.height, 0);
        assert!(info.tip.is_some());

        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_unjoined_node_reports_not_joined() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir);
        config.join = true;
        let handle = Node::start(config).unwrap();

        let info = handle.info().await.unwrap();
        assert!(!info.joined);
        assert_eq!(info.tip, None);

        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_current_block_rpc() {
        let dir = TempDir::new().unwrap();
        let handle = Node::start(test_config(&dir)).unwrap();

        let tip = handle.get_current_block().await;
        let full = tip.found().expect("genesis should be served");
        assert_eq!(full.block.height, 0);
        assert_eq!(
            handle.get_block(full.block.indep_hash).await.found().map(|b| b.indep_hash),
            Some(full.block.indep_hash)
        );
        assert_eq!(handle.get_block(Hash::zero()).await, FetchResult::NotFound);

        handle.stop().await.unwrap();
    }
}
