//! Storage Module Tests
//!
//! Validates the placement logic and the local versioned store.
//!
//! ## Test Scopes
//! - **Partitioner**: Ensures deterministic hashing, fair distribution and replica selection.
//! - **MemoryStorage**: Verifies projection, missing keys and version switching.

#[cfg(test)]
mod tests {
    use crate::membership::types::NodeId;
    use crate::router::orderer::ShardFunction;
    use crate::router::types::{Request, Row};
    use crate::storage::Storage;
    use crate::storage::memory::MemoryStorage;
    use crate::storage::partitioner::PartitionManager;
    use serde_json::json;

    fn nodes(names: &[&str]) -> Vec<NodeId> {
        names.iter().map(|n| NodeId::from(*n)).collect()
    }

    fn row(pairs: &[(&str, serde_json::Value)]) -> Row {
        pairs
            .iter()
            .map(|(column, value)| (column.to_string(), value.clone()))
            .collect()
    }

    // ============================================================
    // PARTITIONER TESTS
    // ============================================================

    #[test]
    fn test_partition_is_deterministic() {
        let partitioner = PartitionManager::new();

        let p1 = partitioner.get_partition("book_100");
        let p2 = partitioner.get_partition("book_100");
        assert_eq!(p1, p2, "The same value should yield the same partition");
    }

    #[test]
    fn test_partition_is_within_range() {
        let partitioner = PartitionManager::new();

        for i in 0..1000 {
            let key = format!("test_key_{}", i);
            let partition = partitioner.get_partition(&key);
            assert!(
                partition < partitioner.num_partitions,
                "Partition {} should be < {}",
                partition,
                partitioner.num_partitions
            );
        }
    }

    #[test]
    fn test_partition_distribution() {
        let partitioner = PartitionManager::new();
        let mut partition_counts = std::collections::HashMap::new();

        for i in 0..10000 {
            let key = format!("book_{}", i);
            let partition = partitioner.get_partition(&key);
            *partition_counts.entry(partition).or_insert(0) += 1;
        }

        // With 256 partitions and 10000 keys, each should have ~39 keys.
        assert!(
            partition_counts.len() > 100,
            "Should have more than 100 distinct partitions used, got: {}",
            partition_counts.len()
        );
    }

    #[test]
    fn test_replicas_are_distinct_and_capped_by_cluster_size() {
        let partitioner = PartitionManager::new();
        let known = nodes(&["a", "b", "c"]);

        let replicas = partitioner.replicas("some-key", &known, 5);
        assert_eq!(replicas.len(), 3);

        let mut unique = replicas.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 3);
    }

    #[test]
    fn test_replicas_do_not_depend_on_input_order() {
        let partitioner = PartitionManager::new();

        let r1 = partitioner.replicas("key-9", &nodes(&["c", "a", "b"]), 2);
        let r2 = partitioner.replicas("key-9", &nodes(&["b", "c", "a"]), 2);
        assert_eq!(r1, r2);
    }

    #[test]
    fn test_replicas_follow_the_primary_in_sorted_order() {
        let partitioner = PartitionManager::with_partitions(4);
        let known = nodes(&["n0", "n1", "n2", "n3"]);

        let partition = partitioner.get_partition("key");
        let replicas = partitioner.get_owners(partition, &known, 2);

        let primary = partition as usize % 4;
        assert_eq!(replicas, vec![known[primary].clone(), known[(primary + 1) % 4].clone()]);
    }

    #[test]
    fn test_no_nodes_no_replicas() {
        let partitioner = PartitionManager::new();

        assert!(partitioner.replicas("key", &[], 3).is_empty());
    }

    // ============================================================
    // MEMORY STORAGE TESTS
    // ============================================================

    #[tokio::test]
    async fn test_staged_rows_invisible_until_switch() {
        let storage = MemoryStorage::new();
        storage.stage("books", "b1", row(&[("title", json!("Dune"))]));

        let request = Request::new("books", ["b1"], Vec::<String>::new());
        assert!(storage.retrieve(&request).await.is_empty());

        storage.switch().await;
        let result = storage.retrieve(&request).await;
        assert_eq!(result.content["b1"]["title"], json!("Dune"));
        assert_eq!(storage.version(), 1);
    }

    #[tokio::test]
    async fn test_switch_replaces_the_whole_version() {
        let storage = MemoryStorage::new();
        storage.stage("books", "b1", row(&[("title", json!("v1"))]));
        storage.switch().await;

        storage.stage("books", "b2", row(&[("title", json!("v2"))]));
        storage.switch().await;

        let result = storage
            .retrieve(&Request::new("books", ["b1", "b2"], Vec::<String>::new()))
            .await;
        assert!(!result.content.contains_key("b1"));
        assert!(result.content.contains_key("b2"));
        assert_eq!(storage.staged_row_count(), 0);
        assert_eq!(storage.live_row_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_keys_and_tables_are_absent_not_errors() {
        let storage = MemoryStorage::new();
        storage.stage("books", "b1", row(&[("title", json!("Dune"))]));
        storage.switch().await;

        let partial = storage
            .retrieve(&Request::new("books", ["b1", "nope"], Vec::<String>::new()))
            .await;
        assert_eq!(partial.content.len(), 1);

        let other_table = storage
            .retrieve(&Request::new("authors", ["b1"], Vec::<String>::new()))
            .await;
        assert!(other_table.is_empty());
    }

    #[tokio::test]
    async fn test_columns_project_rows() {
        let storage = MemoryStorage::new();
        storage.stage(
            "books",
            "b1",
            row(&[("title", json!("Dune")), ("year", json!(1965)), ("pages", json!(412))]),
        );
        storage.switch().await;

        let result = storage
            .retrieve(&Request::new("books", ["b1"], ["title", "year"]))
            .await;
        let projected = &result.content["b1"];
        assert_eq!(projected.len(), 2);
        assert!(!projected.contains_key("pages"));

        let unknown_column = storage
            .retrieve(&Request::new("books", ["b1"], ["isbn"]))
            .await;
        assert!(!unknown_column.has_data_for("b1"));
    }

    #[tokio::test]
    async fn test_stage_json_document() {
        let storage = MemoryStorage::new();
        let staged = storage
            .stage_json(&json!({
                "books": { "b1": { "title": "Dune" }, "b2": { "title": "Emma" } },
                "authors": { "a1": { "name": "Herbert" } }
            }))
            .unwrap();
        assert_eq!(staged, 3);

        storage.switch().await;
        assert_eq!(storage.live_row_count(), 3);
    }

    #[test]
    fn test_stage_json_rejects_wrong_shape() {
        let storage = MemoryStorage::new();

        assert!(storage.stage_json(&json!(["not", "a", "map"])).is_err());
    }
}
