use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::Storage;
use crate::router::types::{QueryResult, Request, Row};

/// table -> key -> row
type Dataset = HashMap<String, HashMap<String, Row>>;

/// In-memory storage with a live version and a staging area.
///
/// Reads are always served from the live dataset. `stage` fills the next version, and
/// `switch` promotes it wholesale, so readers never observe a half-loaded version.
pub struct MemoryStorage {
    live: RwLock<Arc<Dataset>>,
    staged: DashMap<String, DashMap<String, Row>>,
    version: AtomicU64,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            live: RwLock::new(Arc::new(Dataset::new())),
            staged: DashMap::new(),
            version: AtomicU64::new(0),
        }
    }

    /// Adds a row to the next version. Invisible to reads until `switch`.
    pub fn stage(&self, table: &str, key: &str, row: Row) {
        let table_map = self
            .staged
            .entry(table.to_string())
            .or_insert_with(DashMap::new);
        table_map.insert(key.to_string(), row);
    }

    /// Stages every row of a `{table: {key: {column: value}}}` document.
    pub fn stage_json(&self, document: &serde_json::Value) -> anyhow::Result<usize> {
        let tables: HashMap<String, HashMap<String, Row>> =
            serde_json::from_value(document.clone())?;
        let mut staged = 0;
        for (table, rows) in tables {
            for (key, row) in rows {
                self.stage(&table, &key, row);
                staged += 1;
            }
        }
        Ok(staged)
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    pub fn staged_row_count(&self) -> usize {
        self.staged.iter().map(|table| table.value().len()).sum()
    }

    pub fn live_row_count(&self) -> usize {
        self.live.read().values().map(HashMap::len).sum()
    }

    /// Looks up the requested keys in the live dataset, projected onto `columns`.
    pub fn get_local(&self, request: &Request) -> QueryResult {
        let live = Arc::clone(&self.live.read());
        let Some(table) = live.get(&request.table) else {
            return QueryResult::empty();
        };

        request
            .keys
            .iter()
            .filter_map(|key| {
                table
                    .get(key)
                    .map(|row| (key.clone(), project(row, &request.columns)))
            })
            .collect()
    }

    fn promote(&self) -> u64 {
        let mut next = Dataset::new();
        // Drain table by table so concurrent `stage` calls land in either version, never lost.
        let tables: Vec<String> = self.staged.iter().map(|entry| entry.key().clone()).collect();
        for table in tables {
            if let Some((name, rows)) = self.staged.remove(&table) {
                next.insert(name, rows.into_iter().collect());
            }
        }

        *self.live.write() = Arc::new(next);
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn retrieve(&self, request: &Request) -> QueryResult {
        self.get_local(request)
    }

    async fn switch(&self) {
        let rows = self.staged_row_count();
        let version = self.promote();
        tracing::info!("Switched storage to version {} ({} rows)", version, rows);
    }
}

fn project(row: &Row, columns: &BTreeSet<String>) -> Row {
    if columns.is_empty() {
        return row.clone();
    }
    row.iter()
        .filter(|(column, _)| columns.contains(*column))
        .map(|(column, value)| (column.clone(), value.clone()))
        .collect()
}
