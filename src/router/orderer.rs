use std::sync::Arc;

use crate::membership::types::NodeId;

/// Placement contract: for a key and the known node ids, the replicas that hold it,
/// most preferred first. Must be deterministic for identical inputs.
pub trait ShardFunction: Send + Sync {
    fn replicas(&self, key: &str, nodes: &[NodeId], replica_count: usize) -> Vec<NodeId>;
}

impl<F> ShardFunction for F
where
    F: Fn(&str, &[NodeId], usize) -> Vec<NodeId> + Send + Sync,
{
    fn replicas(&self, key: &str, nodes: &[NodeId], replica_count: usize) -> Vec<NodeId> {
        self(key, nodes, replica_count)
    }
}

/// Candidate order for one key: the shard function's answer with the local node first.
#[derive(Clone)]
pub struct ShardOrderer {
    local_id: NodeId,
    sharding: Arc<dyn ShardFunction>,
}

impl ShardOrderer {
    pub fn new(local_id: NodeId, sharding: Arc<dyn ShardFunction>) -> Self {
        Self { local_id, sharding }
    }

    pub fn order(&self, key: &str, known: &[NodeId], replica_count: usize) -> Vec<NodeId> {
        let mut ordered = self.sharding.replicas(key, known, replica_count);
        ordered.truncate(replica_count);

        if let Some(pos) = ordered.iter().position(|id| *id == self.local_id) {
            ordered[..=pos].rotate_right(1);
        }
        ordered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<NodeId> {
        names.iter().map(|n| NodeId::from(*n)).collect()
    }

    fn fixed(order: &'static [&'static str]) -> Arc<dyn ShardFunction> {
        Arc::new(move |_: &str, _: &[NodeId], _: usize| ids(order))
    }

    #[test]
    fn local_node_moves_to_front_keeping_rest_in_order() {
        let orderer = ShardOrderer::new(NodeId::from("me"), fixed(&["a", "b", "me", "c"]));

        let ordered = orderer.order("key", &ids(&["a", "b", "c", "me"]), 4);

        assert_eq!(ordered, ids(&["me", "a", "b", "c"]));
    }

    #[test]
    fn order_untouched_when_local_is_not_a_replica() {
        let orderer = ShardOrderer::new(NodeId::from("me"), fixed(&["b", "a", "c"]));

        assert_eq!(orderer.order("key", &[], 3), ids(&["b", "a", "c"]));
    }

    #[test]
    fn local_already_first_stays_first() {
        let orderer = ShardOrderer::new(NodeId::from("me"), fixed(&["me", "a"]));

        assert_eq!(orderer.order("key", &[], 2), ids(&["me", "a"]));
    }

    #[test]
    fn extra_candidates_are_cut_to_replica_count() {
        let orderer = ShardOrderer::new(NodeId::from("me"), fixed(&["a", "b", "c", "me"]));

        // "me" falls outside the first two replicas, so it is not promoted.
        assert_eq!(orderer.order("key", &[], 2), ids(&["a", "b"]));
    }
}
