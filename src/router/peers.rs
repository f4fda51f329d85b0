//! Peer registry: which nodes the router can currently reach.
//!
//! The registry is owned by the router's worker loop and is only mutated in response to
//! membership events. Readers get an immutable [`PeerSnapshot`]: mutation clones the
//! map when a snapshot is still alive, so an in-flight fan-out keeps seeing the peer
//! set it started with.

use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::membership::types::{NodeId, PeerHandle};

pub type PeerSnapshot = Arc<BTreeMap<NodeId, PeerHandle>>;

/// Outcome of [`PeerRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// Not a pending join, or the local node.
    Refused,
    Added,
    /// The id was already registered under another handle, which is no longer in use.
    Moved { from: PeerHandle },
}

/// Where a peer address is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Never seen, or departed: needs a fresh join.
    Unknown,
    /// Membership announced it, identity handshake still pending.
    Joined,
    /// Registered and monitored.
    Active,
}

#[derive(Debug)]
pub struct PeerRegistry {
    local_id: NodeId,
    local_handle: PeerHandle,
    peers: PeerSnapshot,
    joined: HashSet<SocketAddr>,
}

impl PeerRegistry {
    /// A registry containing only the local node.
    pub fn new(local_id: NodeId, local_handle: PeerHandle) -> Self {
        let peers = BTreeMap::from([(local_id.clone(), local_handle)]);
        Self {
            local_id,
            local_handle,
            peers: Arc::new(peers),
            joined: HashSet::new(),
        }
    }

    pub fn local_id(&self) -> &NodeId {
        &self.local_id
    }

    pub fn is_local(&self, handle: &PeerHandle) -> bool {
        *handle == self.local_handle
    }

    /// Records a membership join. Returns `false` for the local node or an active peer.
    ///
    /// A repeated join for an address still waiting on its handshake returns `true`, so
    /// the caller can start a fresh handshake.
    pub fn mark_joined(&mut self, address: SocketAddr) -> bool {
        if address == self.local_handle.http_addr || self.state(address) == PeerState::Active {
            return false;
        }
        self.joined.insert(address);
        true
    }

    pub fn state(&self, address: SocketAddr) -> PeerState {
        if self.peers.values().any(|handle| handle.http_addr == address) {
            PeerState::Active
        } else if self.joined.contains(&address) {
            PeerState::Joined
        } else {
            PeerState::Unknown
        }
    }

    /// Promotes a joined address to an active peer.
    ///
    /// Refused for the local id, and for addresses that did not go through a join since
    /// they were last removed. A peer that restarted under a new id replaces its old
    /// entry; an id that reappears at another address leaves the old address behind.
    pub fn register(&mut self, id: NodeId, handle: PeerHandle) -> Registration {
        if id == self.local_id || self.is_local(&handle) {
            return Registration::Refused;
        }
        if !self.joined.remove(&handle.http_addr) {
            return Registration::Refused;
        }

        let peers = Arc::make_mut(&mut self.peers);
        peers.retain(|_, existing| *existing != handle);
        match peers.insert(id, handle) {
            Some(previous) if previous != handle => Registration::Moved { from: previous },
            _ => Registration::Added,
        }
    }

    /// Removes the peer reachable through `handle`, returning its id.
    ///
    /// A pending join for that address is forgotten too. The local node is never removed.
    pub fn remove(&mut self, handle: &PeerHandle) -> Option<NodeId> {
        if self.is_local(handle) {
            return None;
        }
        self.joined.remove(&handle.http_addr);

        let id = self
            .peers
            .iter()
            .find(|(_, existing)| *existing == handle)
            .map(|(id, _)| id.clone())?;
        Arc::make_mut(&mut self.peers).remove(&id);
        Some(id)
    }

    pub fn snapshot(&self) -> PeerSnapshot {
        Arc::clone(&self.peers)
    }

    /// Known node ids in ascending order.
    pub fn ids(&self) -> Vec<NodeId> {
        self.peers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(port: u16) -> PeerHandle {
        PeerHandle::new(SocketAddr::from(([127, 0, 0, 1], port)))
    }

    fn registry() -> PeerRegistry {
        PeerRegistry::new(NodeId::from("local"), handle(6000))
    }

    #[test]
    fn starts_with_only_self() {
        let registry = registry();

        assert_eq!(registry.ids(), vec![NodeId::from("local")]);
        assert_eq!(registry.snapshot().get(&NodeId::from("local")), Some(&handle(6000)));
    }

    #[test]
    fn join_then_register_makes_peer_active() {
        let mut registry = registry();
        let peer = handle(6001);

        assert_eq!(registry.state(peer.http_addr), PeerState::Unknown);
        assert!(registry.mark_joined(peer.http_addr));
        assert_eq!(registry.state(peer.http_addr), PeerState::Joined);
        assert_eq!(registry.register(NodeId::from("peer-1"), peer), Registration::Added);
        assert_eq!(registry.state(peer.http_addr), PeerState::Active);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn register_without_join_is_refused() {
        let mut registry = registry();

        assert_eq!(registry.register(NodeId::from("peer-1"), handle(6001)), Registration::Refused);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn departed_peer_needs_fresh_join() {
        let mut registry = registry();
        let peer = handle(6001);
        registry.mark_joined(peer.http_addr);
        registry.register(NodeId::from("peer-1"), peer);

        assert_eq!(registry.remove(&peer), Some(NodeId::from("peer-1")));
        assert_eq!(registry.register(NodeId::from("peer-1"), peer), Registration::Refused);

        registry.mark_joined(peer.http_addr);
        assert_eq!(registry.register(NodeId::from("peer-1"), peer), Registration::Added);
    }

    #[test]
    fn self_cannot_be_removed_or_replaced() {
        let mut registry = registry();

        assert_eq!(registry.remove(&handle(6000)), None);
        assert!(!registry.mark_joined(handle(6000).http_addr));

        registry.mark_joined(handle(6001).http_addr);
        assert_eq!(registry.register(NodeId::from("local"), handle(6001)), Registration::Refused);
        assert_eq!(registry.snapshot().get(&NodeId::from("local")), Some(&handle(6000)));
    }

    #[test]
    fn snapshot_is_not_affected_by_later_mutation() {
        let mut registry = registry();
        registry.mark_joined(handle(6001).http_addr);
        registry.register(NodeId::from("peer-1"), handle(6001));

        let before = registry.snapshot();
        registry.remove(&handle(6001));
        registry.mark_joined(handle(6002).http_addr);
        registry.register(NodeId::from("peer-2"), handle(6002));

        assert_eq!(before.len(), 2);
        assert!(before.contains_key(&NodeId::from("peer-1")));
        assert!(!before.contains_key(&NodeId::from("peer-2")));
        assert_eq!(registry.ids(), vec![NodeId::from("local"), NodeId::from("peer-2")]);
    }

    #[test]
    fn restarted_peer_replaces_its_old_identity() {
        let mut registry = registry();
        registry.mark_joined(handle(6001).http_addr);
        registry.register(NodeId::from("old"), handle(6001));

        registry.remove(&handle(6001));
        registry.mark_joined(handle(6001).http_addr);
        registry.register(NodeId::from("new"), handle(6001));

        assert_eq!(registry.ids(), vec![NodeId::from("local"), NodeId::from("new")]);
    }

    #[test]
    fn repeated_join_while_pending_can_restart_handshake() {
        let mut registry = registry();
        let peer = handle(6001);

        assert!(registry.mark_joined(peer.http_addr));
        assert!(registry.mark_joined(peer.http_addr));
        assert_eq!(registry.state(peer.http_addr), PeerState::Joined);

        registry.register(NodeId::from("peer-1"), peer);
        assert!(!registry.mark_joined(peer.http_addr), "Active peers need no handshake");
    }

    #[test]
    fn id_registered_at_new_address_reports_the_old_one() {
        let mut registry = registry();
        registry.mark_joined(handle(6001).http_addr);
        registry.register(NodeId::from("peer-1"), handle(6001));

        registry.mark_joined(handle(6002).http_addr);
        let outcome = registry.register(NodeId::from("peer-1"), handle(6002));

        assert_eq!(outcome, Registration::Moved { from: handle(6001) });
        assert_eq!(registry.snapshot().get(&NodeId::from("peer-1")), Some(&handle(6002)));
        assert_eq!(registry.state(handle(6001).http_addr), PeerState::Unknown);
    }

    #[test]
    fn removing_unknown_handle_is_a_no_op() {
        let mut registry = registry();

        assert_eq!(registry.remove(&handle(7000)), None);
        assert_eq!(registry.len(), 1);
    }
}
