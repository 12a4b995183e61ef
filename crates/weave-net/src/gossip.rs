// weave-net/src/gossip.rs

use crate::peer::PeerId;
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::mpsc;
use weave_crypto::Hash;

/// Anything the bus can deduplicate
pub trait GossipItem {
    /// Stable digest of the message; the exactly-once-per-peer key
    fn digest(&self) -> Hash;
}

/// One subscribed peer
struct GossipLink<T> {
    id: PeerId,
    sender: mpsc::Sender<T>,
}

/// The gossip bus
///
/// Delivers each distinct message to every peer at most once. A message is
/// distinct by its digest; both outbound sends and observed inbound messages
/// enter the seen set, so a node never re-broadcasts what it has already
/// handled. Optional loss probability and delivery delay simulate an
/// unreliable network.
pub struct Gossip<T> {
    peers: Vec<GossipLink<T>>,
    seen: HashSet<Hash>,
    loss: Option<f64>,
    delay: Option<Duration>,
}

impl<T: GossipItem + Clone + Send + 'static> Default for Gossip<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Gossip<T>
where
    T: GossipItem + Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            peers: Vec::new(),
            seen: HashSet::new(),
            loss: None,
            delay: None,
        }
    }

    /// A bus that randomly drops and delays deliveries (simulation only)
    pub fn with_faults(loss: Option<f64>, delay: Option<Duration>) -> Self {
        Self {
            peers: Vec::new(),
            seen: HashSet::new(),
            loss,
            delay,
        }
    }

    /// Subscribe a peer; replaces any previous link with the same id
    pub fn add_peer(&mut self, id: PeerId, sender: mpsc::Sender<T>) {
        self.peers.retain(|link| link.id != id);
        self.peers.push(GossipLink { id, sender });
    }

    pub fn remove_peer(&mut self, id: PeerId) {
        self.peers.retain(|link| link.id != id);
    }

    pub fn peer_ids(&self) -> Vec<PeerId> {
        self.peers.iter().map(|link| link.id).collect()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Record an inbound message; returns false when it was already seen
    /// (and should be ignored)
    pub fn observe(&mut self, msg: &T) -> bool {
        self.seen.insert(msg.digest())
    }

    /// Enter a digest into the seen set; returns false when already present
    pub fn mark_seen(&mut self, digest: Hash) -> bool {
        self.seen.insert(digest)
    }

    /// Deliver to every subscribed peer except `exclude`
    ///
    /// Returns false when the message was already sent or observed, in which
    /// case nothing is delivered.
    pub fn send(&mut self, msg: &T, exclude: Option<PeerId>) -> bool {
        if !self.seen.insert(msg.digest()) {
            return false;
        }
        self.fan_out(msg, exclude);
        true
    }

    /// Deliver a message whose digest is already in the seen set (a handled
    /// inbound message being passed along)
    pub fn forward(&self, msg: &T, exclude: Option<PeerId>) {
        self.fan_out(msg, exclude);
    }

    /// Deliver to a single peer regardless of the seen set (tip announces)
    pub fn send_to(&self, peer: PeerId, msg: &T) {
        if let Some(link) = self.peers.iter().find(|link| link.id == peer) {
            self.deliver(link, msg);
        }
    }

    fn fan_out(&self, msg: &T, exclude: Option<PeerId>) {
        for link in &self.peers {
            if Some(link.id) == exclude {
                continue;
            }
            self.deliver(link, msg);
        }
    }

    fn deliver(&self, link: &GossipLink<T>, msg: &T) {
        if let Some(loss) = self.loss {
            if rand::random::<f64>() < loss {
                tracing::debug!(peer = %link.id, "gossip loss: dropping delivery");
                return;
            }
        }

        let sender = link.sender.clone();
        let msg = msg.clone();
        let delay = self.delay;
        tokio::spawn(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            // A closed receiver just means the peer went away
            let _ = sender.send(msg).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Note(u8);

    impl GossipItem for Note {
        fn digest(&self) -> Hash {
            use weave_crypto::hash::Hashable;
            vec![self.0].hash()
        }
    }

    #[tokio::test]
    async fn test_delivers_to_all_peers() {
        let mut bus = Gossip::new();
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        bus.add_peer(PeerId::random(), tx1);
        bus.add_peer(PeerId::random(), tx2);

        assert!(bus.send(&Note(1), None));
        assert_eq!(rx1.recv().await, Some(Note(1)));
        assert_eq!(rx2.recv().await, Some(Note(1)));
    }

    #[tokio::test]
    async fn test_exactly_once_per_peer() {
        let mut bus = Gossip::new();
        let (tx, mut rx) = mpsc::channel(8);
        bus.add_peer(PeerId::random(), tx);

        assert!(bus.send(&Note(1), None));
        assert!(!bus.send(&Note(1), None));

        assert_eq!(rx.recv().await, Some(Note(1)));
        // The duplicate send put nothing on the channel
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_exclude_origin() {
        let mut bus = Gossip::new();
        let origin = PeerId::random();
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        bus.add_peer(origin, tx1);
        bus.add_peer(PeerId::random(), tx2);

        assert!(bus.send(&Note(2), Some(origin)));
        assert_eq!(rx2.recv().await, Some(Note(2)));
        assert!(rx1.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_observed_messages_not_rebroadcast() {
        let mut bus = Gossip::new();
        let (tx, mut rx) = mpsc::channel(8);
        bus.add_peer(PeerId::random(), tx);

        assert!(bus.observe(&Note(3)));
        assert!(!bus.observe(&Note(3)));
        assert!(!bus.send(&Note(3), None));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_total_loss_drops_everything() {
        let mut bus = Gossip::with_faults(Some(1.0), None);
        let (tx, mut rx) = mpsc::channel(8);
        bus.add_peer(PeerId::random(), tx);

        assert!(bus.send(&Note(4), None));
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }
}
