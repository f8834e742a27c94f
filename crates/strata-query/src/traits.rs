use crate::error::Result;
use crate::types::Capability;
use async_trait::async_trait;
use serde_json::Value;

/// Core trait that all adapters implement
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Get the type name of this data source
    fn source_type(&self) -> &'static str;

    /// Get all capabilities supported by this source
    fn capabilities(&self) -> Vec<Capability>;

    /// Check if a specific capability is supported
    fn supports(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Close the connection gracefully
    async fn close(&self) -> Result<()>;
}

/// Key/value access shared by the document store and the Redis cache.
///
/// Operations address the adapter's default namespace.
#[async_trait]
pub trait KeyValueStore: DataSource {
    /// Insert or overwrite the value stored under `key`
    async fn set(&self, key: &str, value: &Value) -> Result<()>;

    /// Fetch the value stored under `key`, `DataError::NotFound` if absent
    async fn get(&self, key: &str) -> Result<Value>;

    /// Whether `key` is present
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Remove `key`; absent keys are not an error
    async fn delete(&self, key: &str) -> Result<()>;
}
