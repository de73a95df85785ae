use async_trait::async_trait;
use thiserror::Error;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryCooldownStore;
pub use sqlite::SqliteCooldownStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("could not prepare the database directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage task did not complete: {0}")]
    Task(String),
}

/// Last-disbursement timestamps (seconds since epoch), keyed by requester.
///
/// Timestamps only ever move forward: neither `put` nor `compare_and_put`
/// will replace a stored value with an earlier one.
#[async_trait]
pub trait CooldownStore: Send + Sync {
    async fn get(&self, requester: &str) -> StoreResult<Option<i64>>;

    /// Upserts the record. Durable once this returns `Ok`.
    async fn put(&self, requester: &str, timestamp: i64) -> StoreResult<()>;

    /// Writes `timestamp` only if the stored value still equals `expected`.
    /// Returns `false` when another writer got there first.
    async fn compare_and_put(&self, requester: &str, expected: Option<i64>, timestamp: i64) -> StoreResult<bool>;
}

pub(crate) fn can_replace(current: Option<i64>, expected: Option<i64>, timestamp: i64) -> bool {
    current == expected && current.map_or(true, |stored| timestamp >= stored)
}
