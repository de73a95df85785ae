use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::database::{can_replace, CooldownStore, StoreResult};

/// Process-local store. Nothing survives a restart.
#[derive(Clone, Default, Debug)]
pub struct MemoryCooldownStore {
    records: Arc<RwLock<HashMap<String, i64>>>,
}

impl MemoryCooldownStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CooldownStore for MemoryCooldownStore {
    async fn get(&self, requester: &str) -> StoreResult<Option<i64>> {
        Ok(self.records.read().await.get(requester).copied())
    }

    async fn put(&self, requester: &str, timestamp: i64) -> StoreResult<()> {
        let mut records = self.records.write().await;
        let entry = records.entry(requester.to_string()).or_insert(timestamp);
        *entry = (*entry).max(timestamp);
        Ok(())
    }

    async fn compare_and_put(&self, requester: &str, expected: Option<i64>, timestamp: i64) -> StoreResult<bool> {
        let mut records = self.records.write().await;
        if !can_replace(records.get(requester).copied(), expected, timestamp) {
            return Ok(false);
        }
        records.insert(requester.to_string(), timestamp);
        Ok(true)
    }
}
