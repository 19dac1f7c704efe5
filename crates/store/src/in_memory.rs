//! In-memory store — useful for testing and dry experiments.

use async_trait::async_trait;
use calsync_core::error::StoreError;
use calsync_core::storage::{DecisionRecord, DecisionStore};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// A store that keeps decision rows in a Vec, in insertion order.
pub struct InMemoryStore {
    records: Arc<RwLock<Vec<DecisionRecord>>>,
    failing: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(Vec::new())),
            failing: AtomicBool::new(false),
        }
    }

    /// Make subsequent writes fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Snapshot of every row, oldest first.
    pub async fn records(&self) -> Vec<DecisionRecord> {
        self.records.read().await.clone()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DecisionStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn record(&self, record: DecisionRecord) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Storage("store unavailable".into()));
        }
        self.records.write().await.push(record);
        Ok(())
    }

    async fn is_processed(&self, post_id: &str) -> Result<bool, StoreError> {
        Ok(self.records.read().await.iter().any(|r| r.post_id == post_id))
    }

    async fn records_for_post(&self, post_id: &str) -> Result<Vec<DecisionRecord>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|r| r.post_id == post_id)
            .cloned()
            .collect())
    }

    async fn history(&self, limit: usize) -> Result<Vec<DecisionRecord>, StoreError> {
        let records = self.records.read().await;
        // Stable sort over the reversed Vec keeps later inserts first on ties.
        let mut newest: Vec<DecisionRecord> = records.iter().rev().cloned().collect();
        newest.sort_by(|a, b| b.processed_at.cmp(&a.processed_at));
        newest.truncate(limit);
        Ok(newest)
    }

    async fn delete_post(&self, post_id: &str) -> Result<bool, StoreError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| r.post_id != post_id);
        Ok(records.len() < before)
    }

    async fn clear(&self) -> Result<u64, StoreError> {
        let mut records = self.records.write().await;
        let removed = records.len() as u64;
        records.clear();
        Ok(removed)
    }

    async fn total_cost(&self) -> Result<f64, StoreError> {
        Ok(self.records.read().await.iter().map(|r| r.cost_usd).sum())
    }
}
