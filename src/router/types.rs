use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::membership::types::{NodeId, PeerHandle};

/// Column name to value.
pub type Row = BTreeMap<String, serde_json::Value>;

/// A logical read: which keys of which table, restricted to which columns.
///
/// Keys and columns are ordered sets, so two requests with the same content are equal
/// and hash identically no matter how they were built. An empty `columns` set selects
/// every column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Request {
    pub table: String,
    pub keys: BTreeSet<String>,
    #[serde(default)]
    pub columns: BTreeSet<String>,
}

impl Request {
    pub fn new<K, C>(table: impl Into<String>, keys: K, columns: C) -> Self
    where
        K: IntoIterator,
        K::Item: Into<String>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        Self {
            table: table.into(),
            keys: keys.into_iter().map(Into::into).collect(),
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// The single-key lookup sent to one candidate of a fallback chain.
    pub fn single(table: &str, key: &str, columns: &BTreeSet<String>) -> Self {
        Self {
            table: table.to_string(),
            keys: BTreeSet::from([key.to_string()]),
            columns: columns.clone(),
        }
    }
}

/// Rows found for a request, keyed by logical key. Missing keys mean "no data".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub content: HashMap<String, Row>,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// `true` when `key` is present with at least one column.
    pub fn has_data_for(&self, key: &str) -> bool {
        self.content.get(key).is_some_and(|row| !row.is_empty())
    }

    /// Keeps only `key`, so a per-key answer never leaks rows for other keys.
    pub fn restrict_to(mut self, key: &str) -> Self {
        self.content.retain(|k, _| k == key);
        self
    }
}

impl FromIterator<(String, Row)> for QueryResult {
    fn from_iter<I: IntoIterator<Item = (String, Row)>>(iter: I) -> Self {
        Self {
            content: iter.into_iter().collect(),
        }
    }
}

/// One entry of a fallback chain: who to ask and how to reach them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub id: NodeId,
    pub handle: PeerHandle,
}
