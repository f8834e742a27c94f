//! Redis adapter for strata-query
//!
//! One [`RedisStore`] covers three uses of the same server:
//! - FIFO task queues stored as lists under `queue:<name>` ([`queue`])
//! - a JSON key-value cache ([`kv`])
//! - publish/subscribe channels and a polling subscription loop ([`pubsub`],
//!   [`listener`])
//!
//! ## Example
//!
//! ```rust,no_run
//! use strata_query::ConnectionConfig;
//! use strata_query_redis::RedisStore;
//! use std::time::Duration;
//!
//! # async fn example() -> strata_query::Result<()> {
//! let store = RedisStore::new(ConnectionConfig::new("redis").with_host("localhost"))?;
//!
//! store.push("jobs", &serde_json::json!({"id": 1})).await?;
//! let job = store.pop("jobs", Duration::from_secs(1)).await?;
//! assert_eq!(job, Some(serde_json::json!({"id": 1})));
//! # Ok(())
//! # }
//! ```

pub mod kv;
pub mod listener;
pub mod pubsub;
pub mod queue;

pub use listener::{
    DetachedSubscription, ExecutionMode, MessageHandler, PrintingHandler, StopReason,
    SubscriptionOptions, SubscriptionOutcome, SubscriptionRun,
};
pub use pubsub::{ChannelMessage, Subscription};

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::RedisError;
use strata_query::{Capability, ConfigSource, ConnectionConfig, DataError, DataSource, Result};
use tracing::{debug, error};

pub const DEFAULT_PORT: u16 = 6379;

/// Map a failed command to a backend error, logging it first
pub(crate) fn command_error(context: String) -> impl FnOnce(RedisError) -> DataError {
    move |e| {
        error!("{}: {}", context, e);
        DataError::backend(context, e)
    }
}

/// Queue, cache and pub/sub adapter over one Redis database
#[derive(Debug, Clone)]
pub struct RedisStore {
    client: redis::Client,
    config: ConnectionConfig,
    db: i64,
}

impl RedisStore {
    /// Create the client. Nothing is connected until the first command.
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        let db = match config.database.as_deref() {
            Some(index) => index.parse::<i64>().map_err(|e| {
                DataError::invalid_configuration(format!(
                    "Redis database must be a numeric index, got '{}': {}",
                    index, e
                ))
            })?,
            None => 0,
        };

        let url = Self::connection_url(&config, db);
        debug!("Creating Redis client for {}", config.connection_string());

        let client = redis::Client::open(url).map_err(|e| {
            error!("Failed to create Redis client: {}", e);
            DataError::invalid_configuration(format!("Invalid Redis connection settings: {}", e))
        })?;

        Ok(Self { client, config, db })
    }

    /// Build a store from `REDIS_HOST` and `REDIS_PORT`, with optional `REDIS_DB`
    /// and `REDIS_PASSWORD`
    pub fn from_config<C: ConfigSource>(source: &C) -> Result<Self> {
        let mut config = ConnectionConfig::new("redis")
            .with_host(source.get_value("REDIS_HOST")?)
            .with_port(source.get_parsed::<u16>("REDIS_PORT")?);

        if let Some(db) = source.get_optional("REDIS_DB") {
            config = config.with_database(db);
        }
        if let Some(password) = source.get_optional("REDIS_PASSWORD") {
            config = config.with_password(password);
        }

        Self::new(config)
    }

    fn connection_url(config: &ConnectionConfig, db: i64) -> String {
        let credentials = match (&config.username, &config.password) {
            (Some(user), Some(password)) => format!(
                "{}:{}@",
                urlencoding::encode(user),
                urlencoding::encode(password)
            ),
            (None, Some(password)) => format!(":{}@", urlencoding::encode(password)),
            _ => String::new(),
        };

        format!(
            "redis://{}{}:{}/{}",
            credentials,
            config.host_or_default(),
            config.port_or(DEFAULT_PORT),
            db
        )
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Selected database index
    pub fn db(&self) -> i64 {
        self.db
    }

    pub(crate) fn client(&self) -> &redis::Client {
        &self.client
    }

    /// Open a connection for one operation
    pub(crate) async fn connection(&self) -> Result<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                error!(
                    "Failed to connect to Redis at {}: {}",
                    self.config.connection_string(),
                    e
                );
                DataError::backend(
                    format!(
                        "Failed to connect to Redis at {}",
                        self.config.connection_string()
                    ),
                    e,
                )
            })
    }
}

#[async_trait]
impl DataSource for RedisStore {
    fn source_type(&self) -> &'static str {
        "redis"
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![Capability::KeyValue, Capability::Queue, Capability::PubSub]
    }

    async fn close(&self) -> Result<()> {
        // Connections are scoped to each call
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_query::ConfigManager;

    #[test]
    fn test_connection_url() {
        let config = ConnectionConfig::new("redis")
            .with_host("cache")
            .with_password("s3cr#t");
        assert_eq!(
            RedisStore::connection_url(&config, 2),
            "redis://:s3cr%23t@cache:6379/2"
        );
    }

    #[test]
    fn test_database_index() {
        let store = RedisStore::new(ConnectionConfig::new("redis").with_database("3")).unwrap();
        assert_eq!(store.db(), 3);

        let store = RedisStore::new(ConnectionConfig::new("redis")).unwrap();
        assert_eq!(store.db(), 0);

        let err =
            RedisStore::new(ConnectionConfig::new("redis").with_database("cache")).unwrap_err();
        assert!(matches!(err, DataError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_from_config() {
        let source = ConfigManager::new()
            .with_override("REDIS_HOST", "cache.internal")
            .with_override("REDIS_PORT", "6380")
            .with_override("REDIS_DB", "1");

        let store = RedisStore::from_config(&source).unwrap();
        assert_eq!(store.config().connection_string(), "redis://cache.internal:6380/1");
        assert_eq!(store.db(), 1);
    }

    #[test]
    fn test_capabilities() {
        let store = RedisStore::new(ConnectionConfig::new("redis")).unwrap();
        assert_eq!(store.source_type(), "redis");
        assert!(store.supports(Capability::Queue));
        assert!(store.supports(Capability::PubSub));
        assert!(!store.supports(Capability::Document));
    }

    #[tokio::test]
    async fn test_connection_failure_is_backend_error() {
        let store =
            RedisStore::new(ConnectionConfig::new("redis").with_host("127.0.0.1").with_port(1))
                .unwrap();
        let err = store.length("jobs").await.unwrap_err();
        assert!(matches!(err, DataError::Backend { .. }));
    }
}
