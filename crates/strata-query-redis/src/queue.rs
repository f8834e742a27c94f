//! FIFO task queues backed by Redis lists

use crate::{command_error, RedisStore};
use redis::AsyncCommands;
use serde_json::Value;
use std::time::Duration;
use strata_query::{DataError, Result};
use tracing::debug;

const QUEUE_PREFIX: &str = "queue:";

pub fn queue_key(queue: &str) -> String {
    format!("{}{}", QUEUE_PREFIX, queue)
}

impl RedisStore {
    /// Append a list or mapping to the tail of `queue`
    pub async fn push(&self, queue: &str, value: &Value) -> Result<()> {
        if !matches!(value, Value::Array(_) | Value::Object(_)) {
            return Err(DataError::Serialization(format!(
                "Queue entries must be a list or a mapping, got {}",
                value
            )));
        }

        let key = queue_key(queue);
        let payload = serde_json::to_string(value)?;
        let mut conn = self.connection().await?;

        debug!("RPUSH {} {}", key, payload);
        let _: i64 = conn
            .rpush(&key, payload)
            .await
            .map_err(command_error(format!("Failed to push onto {}", key)))?;
        Ok(())
    }

    /// Take the head of `queue`, waiting up to `timeout` for one to arrive.
    ///
    /// The wait is enforced by the server. A zero timeout blocks until an entry
    /// arrives.
    pub async fn pop(&self, queue: &str, timeout: Duration) -> Result<Option<Value>> {
        let key = queue_key(queue);
        let mut conn = self.connection().await?;

        debug!("BLPOP {} {:?}", key, timeout);
        let popped: Option<(String, String)> = conn
            .blpop(&key, timeout.as_secs_f64())
            .await
            .map_err(command_error(format!("Failed to pop from {}", key)))?;

        match popped {
            Some((_, payload)) => Ok(Some(serde_json::from_str(&payload)?)),
            None => {
                debug!("BLPOP {} timed out", key);
                Ok(None)
            }
        }
    }

    /// Number of entries waiting in `queue`
    pub async fn length(&self, queue: &str) -> Result<usize> {
        let key = queue_key(queue);
        let mut conn = self.connection().await?;

        conn.llen(&key)
            .await
            .map_err(command_error(format!("Failed to read length of {}", key)))
    }
}
