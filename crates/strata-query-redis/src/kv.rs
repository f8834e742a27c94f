//! JSON key-value cache

use crate::{command_error, RedisStore};
use async_trait::async_trait;
use redis::AsyncCommands;
use serde_json::Value;
use strata_query::{DataError, KeyValueStore, Result};
use tracing::debug;

/// Stored text as JSON, or as a plain string when it is not JSON
fn decode(raw: String) -> Value {
    serde_json::from_str(&raw).unwrap_or(Value::String(raw))
}

impl RedisStore {
    /// Store `value` under `key` as JSON text
    pub async fn set_value(&self, key: &str, value: &Value) -> Result<()> {
        let serialized = serde_json::to_string(value)?;
        let mut conn = self.connection().await?;

        debug!("SET {} = {}", key, serialized);
        let _: () = conn
            .set(key, serialized)
            .await
            .map_err(command_error(format!("Failed to set {}", key)))?;
        Ok(())
    }

    /// Value stored under `key`; text that is not JSON comes back as a string
    pub async fn get_value(&self, key: &str) -> Result<Value> {
        let mut conn = self.connection().await?;

        debug!("GET {}", key);
        let raw: Option<String> = conn
            .get(key)
            .await
            .map_err(command_error(format!("Failed to get {}", key)))?;

        raw.map(decode).ok_or_else(|| {
            DataError::not_found(format!("key {} is not present in Redis", key))
        })
    }

    /// How many of `keys` exist; a key listed twice counts twice
    pub async fn exists_many(&self, keys: &[&str]) -> Result<usize> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut conn = self.connection().await?;

        debug!("EXISTS {:?}", keys);
        conn.exists(keys)
            .await
            .map_err(command_error(format!("Failed to check {:?}", keys)))
    }

    /// Remove `key`; absent keys are ignored
    pub async fn delete_value(&self, key: &str) -> Result<()> {
        let mut conn = self.connection().await?;

        debug!("DEL {}", key);
        let removed: usize = conn
            .del(key)
            .await
            .map_err(command_error(format!("Failed to delete {}", key)))?;
        debug!("DEL {} removed {} key(s)", key, removed);
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn set(&self, key: &str, value: &Value) -> Result<()> {
        self.set_value(key, value).await
    }

    async fn get(&self, key: &str) -> Result<Value> {
        self.get_value(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.exists_many(&[key]).await? > 0)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.delete_value(key).await
    }
}
