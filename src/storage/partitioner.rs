use crate::membership::types::NodeId;
use crate::router::orderer::ShardFunction;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

pub const DEFAULT_PARTITIONS: u32 = 256;

/// Default placement: keys hash into fixed partitions, partitions map onto the sorted
/// node list. The primary is `partition mod n`, replicas are the nodes that follow it.
pub struct PartitionManager {
    pub(crate) num_partitions: u32,
}

impl PartitionManager {
    pub fn new() -> Self {
        Self::with_partitions(DEFAULT_PARTITIONS)
    }

    pub fn with_partitions(num_partitions: u32) -> Self {
        Self {
            num_partitions: num_partitions.max(1),
        }
    }

    pub fn get_partition(&self, key: &str) -> u32 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let hash = hasher.finish() as u32;
        hash % self.num_partitions
    }

    pub fn get_owners(&self, partition: u32, nodes: &[NodeId], replica_count: usize) -> Vec<NodeId> {
        let mut node_ids = nodes.to_vec();
        node_ids.sort();
        node_ids.dedup();
        if node_ids.is_empty() {
            return vec![];
        }

        let primary_idx = (partition as usize) % node_ids.len();
        let count = replica_count.min(node_ids.len());
        (0..count)
            .map(|offset| node_ids[(primary_idx + offset) % node_ids.len()].clone())
            .collect()
    }
}

impl Default for PartitionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ShardFunction for PartitionManager {
    fn replicas(&self, key: &str, nodes: &[NodeId], replica_count: usize) -> Vec<NodeId> {
        self.get_owners(self.get_partition(key), nodes, replica_count)
    }
}
