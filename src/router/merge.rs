//! Folds per-key answers into one result.
//!
//! Each per-key answer covers exactly one key, so the union never has to pick between
//! two rows for the same key.

use super::types::QueryResult;

/// Pointwise union of key -> row maps. The empty result is the neutral element.
pub fn merge<I>(results: I) -> QueryResult
where
    I: IntoIterator<Item = QueryResult>,
{
    results.into_iter().fold(QueryResult::empty(), union)
}

pub fn union(mut left: QueryResult, right: QueryResult) -> QueryResult {
    left.content.extend(right.content);
    left
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::types::Row;
    use serde_json::json;

    fn single(key: &str, value: i64) -> QueryResult {
        let row: Row = [("v".to_string(), json!(value))].into_iter().collect();
        [(key.to_string(), row)].into_iter().collect()
    }

    #[test]
    fn empty_is_neutral() {
        let a = single("k1", 1);

        assert_eq!(merge([a.clone(), QueryResult::empty()]), a);
        assert_eq!(merge([QueryResult::empty(), a.clone()]), a);
        assert_eq!(merge(Vec::<QueryResult>::new()), QueryResult::empty());
    }

    #[test]
    fn order_does_not_matter() {
        let (a, b, c) = (single("k1", 1), single("k2", 2), single("k3", 3));

        let forward = merge([a.clone(), b.clone(), c.clone()]);
        let backward = merge([c.clone(), b.clone(), a.clone()]);
        let grouped = union(a, union(b, c));

        assert_eq!(forward, backward);
        assert_eq!(forward, grouped);
        assert_eq!(forward.content.len(), 3);
    }

    #[test]
    fn exhausted_keys_simply_do_not_appear() {
        let merged = merge([single("k1", 1), QueryResult::empty(), QueryResult::empty()]);

        assert_eq!(merged.content.len(), 1);
        assert!(merged.has_data_for("k1"));
    }
}
